//! Runtime configuration for the communication layer.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes:
//!
//! ```yaml
//! grid_url: http://grid.example.org:8001/
//! send_key: s3cret
//! recv_key: s3cret
//! timeouts:
//!   data_query: 5
//! failure_thresholds:
//!   prim_crossing: 2
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use worldgrid_common::duration_secs;
use worldgrid_directory::DirectoryTimeouts;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Families of cross-region operations that share a failure tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    /// Child-agent setup, teardown and logoff.
    ChildAgent,
    /// Periodic child-agent state sync.
    ChildAgentUpdate,
    AvatarCrossing,
    PrimCrossing,
    RegionUp,
    LandData,
    Presence,
}

/// Consecutive failures each operation class tolerates before calls to the
/// destination are suppressed. `None` never suppresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureThresholds {
    pub child_agent: Option<u32>,
    pub child_agent_update: Option<u32>,
    pub avatar_crossing: Option<u32>,
    pub prim_crossing: Option<u32>,
    pub region_up: Option<u32>,
    pub land_data: Option<u32>,
    pub presence: Option<u32>,
}

impl Default for FailureThresholds {
    fn default() -> Self {
        Self {
            child_agent: None,
            child_agent_update: Some(3),
            avatar_crossing: None,
            prim_crossing: Some(1),
            region_up: None,
            land_data: None,
            presence: None,
        }
    }
}

impl FailureThresholds {
    pub fn get(&self, class: OperationClass) -> Option<u32> {
        match class {
            OperationClass::ChildAgent => self.child_agent,
            OperationClass::ChildAgentUpdate => self.child_agent_update,
            OperationClass::AvatarCrossing => self.avatar_crossing,
            OperationClass::PrimCrossing => self.prim_crossing,
            OperationClass::RegionUp => self.region_up,
            OperationClass::LandData => self.land_data,
            OperationClass::Presence => self.presence,
        }
    }
}

/// Per-call-class timeouts, in seconds in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommsTimeouts {
    #[serde(flatten)]
    pub directory: DirectoryTimeouts,
    #[serde(with = "duration_secs")]
    pub peer_rpc: Duration,
    #[serde(with = "duration_secs")]
    pub land_data: Duration,
    #[serde(with = "duration_secs")]
    pub presence: Duration,
    #[serde(with = "duration_secs")]
    pub probe: Duration,
}

impl Default for CommsTimeouts {
    fn default() -> Self {
        Self {
            directory: DirectoryTimeouts::default(),
            peer_rpc: Duration::from_secs(10),
            land_data: Duration::from_secs(10),
            presence: Duration::from_secs(5),
            probe: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommsConfig {
    pub grid_url: String,
    /// Key presented to the grid authority.
    pub send_key: String,
    /// Key the grid authority presents back to us.
    pub recv_key: String,
    pub logins_enabled: bool,
    pub timeouts: CommsTimeouts,
    pub failure_thresholds: FailureThresholds,
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            grid_url: "http://127.0.0.1:8001/".to_string(),
            send_key: "null".to_string(),
            recv_key: "null".to_string(),
            logins_enabled: true,
            timeouts: CommsTimeouts::default(),
            failure_thresholds: FailureThresholds::default(),
        }
    }
}

impl CommsConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }
}

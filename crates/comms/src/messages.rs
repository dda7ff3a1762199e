//! Payloads carried between regions.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use worldgrid_common::{AgentId, ObjectId, RegionDescriptor, RegionHandle};

/// Everything a region needs to accept a new (child or root) agent circuit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCircuit {
    pub agent_id: AgentId,
    pub session_id: Uuid,
    pub secure_session_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub circuit_code: u32,
    pub caps_path: String,
    pub child: bool,
    pub start_pos: Vec3,
}

impl AgentCircuit {
    pub fn child(agent_id: AgentId, circuit_code: u32) -> Self {
        Self {
            agent_id,
            session_id: Uuid::new_v4(),
            secure_session_id: Uuid::new_v4(),
            first_name: String::new(),
            last_name: String::new(),
            circuit_code,
            caps_path: String::new(),
            child: true,
            start_pos: Vec3::new(128.0, 128.0, 70.0),
        }
    }
}

/// Periodic state of an agent, pushed to the regions holding its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildAgentState {
    pub agent_id: AgentId,
    pub position: Vec3,
    pub velocity: Vec3,
    pub draw_distance: f32,
    #[serde(default)]
    pub throttles: Vec<u8>,
}

/// A region announcing that it is up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionUpNotice {
    pub loc_x: u32,
    pub loc_y: u32,
    pub external_host: String,
    pub port: u16,
}

impl RegionUpNotice {
    /// Handle of the announcing region, or `None` when the advertised
    /// location lies outside the handle range.
    pub fn handle(&self) -> Option<RegionHandle> {
        RegionHandle::try_from_location(self.loc_x, self.loc_y)
    }
}

impl From<&RegionDescriptor> for RegionUpNotice {
    fn from(region: &RegionDescriptor) -> Self {
        Self {
            loc_x: region.loc_x,
            loc_y: region.loc_y,
            external_host: region.external_host.clone(),
            port: region.internal.port,
        }
    }
}

/// A request sent over the peer RPC channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum PeerCall {
    ExpectChildAgent {
        region_handle: RegionHandle,
        agent: AgentCircuit,
    },
    ChildAgentUpdate {
        region_handle: RegionHandle,
        state: ChildAgentState,
    },
    ExpectAvatarCrossing {
        region_handle: RegionHandle,
        agent_id: AgentId,
        position: Vec3,
        is_flying: bool,
    },
    ExpectPrimCrossing {
        region_handle: RegionHandle,
        object_id: ObjectId,
        /// Serialized object group.
        payload: String,
        crossing_method: i32,
    },
    CloseChildConnection {
        region_handle: RegionHandle,
        agent_id: AgentId,
    },
    RegionUp {
        region_handle: RegionHandle,
        notice: RegionUpNotice,
    },
    LogoffUser {
        region_handle: RegionHandle,
        agent_id: AgentId,
        region_secret: String,
        message: String,
    },
}

impl PeerCall {
    /// The region the call is addressed to.
    pub fn region_handle(&self) -> RegionHandle {
        match self {
            Self::ExpectChildAgent { region_handle, .. }
            | Self::ChildAgentUpdate { region_handle, .. }
            | Self::ExpectAvatarCrossing { region_handle, .. }
            | Self::ExpectPrimCrossing { region_handle, .. }
            | Self::CloseChildConnection { region_handle, .. }
            | Self::RegionUp { region_handle, .. }
            | Self::LogoffUser { region_handle, .. } => *region_handle,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ExpectChildAgent { .. } => "expect_child_agent",
            Self::ChildAgentUpdate { .. } => "child_agent_update",
            Self::ExpectAvatarCrossing { .. } => "expect_avatar_crossing",
            Self::ExpectPrimCrossing { .. } => "expect_prim_crossing",
            Self::CloseChildConnection { .. } => "close_child_connection",
            Self::RegionUp { .. } => "region_up",
            Self::LogoffUser { .. } => "logoff_user",
        }
    }
}

/// Answer to a [`PeerCall`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PeerReply {
    pub fn accepted() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    pub fn declined(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
        }
    }
}

impl From<bool> for PeerReply {
    fn from(success: bool) -> Self {
        Self {
            success,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn calls_are_tagged_by_method() {
        let call = PeerCall::CloseChildConnection {
            region_handle: RegionHandle::from_location(1, 2),
            agent_id: AgentId::NIL,
        };
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["method"], "close_child_connection");
        assert_eq!(value["params"]["region_handle"], json!(RegionHandle::from_location(1, 2).0));
        assert_eq!(call.name(), "close_child_connection");
    }

    #[test]
    fn unknown_method_does_not_decode() {
        let body = json!({"method": "format_disk", "params": {}});
        assert!(serde_json::from_value::<PeerCall>(body).is_err());
    }

    #[test]
    fn reply_reason_is_optional() {
        let reply: PeerReply = serde_json::from_value(json!({"success": true})).unwrap();
        assert_eq!(reply, PeerReply::accepted());
        let text = serde_json::to_string(&PeerReply::declined("banned")).unwrap();
        assert_eq!(text, r#"{"success":false,"reason":"banned"}"#);
    }

    #[test]
    fn notice_handle_is_the_announcers() {
        let region = RegionDescriptor::new(Default::default(), "A", 7, 9, "10.0.0.1");
        let notice = RegionUpNotice::from(&region);
        assert_eq!(notice.handle(), Some(region.handle()));
        assert_eq!(notice.port, RegionDescriptor::DEFAULT_SIM_PORT);
    }

    #[test]
    fn notice_beyond_handle_range_has_no_handle() {
        let notice = RegionUpNotice {
            loc_x: 20_000_000,
            loc_y: 9,
            external_host: "10.0.0.1".into(),
            port: 9000,
        };
        assert_eq!(notice.handle(), None);
    }
}

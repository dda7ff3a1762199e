//! Inter-region communication.
//!
//! [`RemoteRegionGateway`] is the single entry point scene logic uses to reach
//! another region. Every operation follows the same path: regions hosted in
//! this process are served in-process through [`LocalBackend`]; anything else
//! is checked against the [`FailureTracker`], resolved through the region
//! directory, and sent to the peer with a per-class timeout. [`PeerRpcServer`]
//! is the receiving end.
//!
//! # Invariants
//! - The in-process path never touches the failure tracker or the network.
//! - A suppressed destination costs no transport attempt.
//! - Failure counters only grow on failed calls and only reset on a liveness signal.
//! - Every gateway call ends in a value: `Ok` or a [`CommsError`], never a panic.

mod config;
mod error;
mod failure;
mod gateway;
mod local;
mod messages;
mod peer;
mod probe;
mod server;

pub use config::{CommsConfig, CommsTimeouts, ConfigError, FailureThresholds, OperationClass};
pub use error::CommsError;
pub use failure::FailureTracker;
pub use gateway::RemoteRegionGateway;
pub use local::{LocalBackend, RegionHandlers};
pub use messages::{AgentCircuit, ChildAgentState, PeerCall, PeerReply, RegionUpNotice};
pub use peer::{HttpPeerTransport, PeerClient, PeerTransport};
pub use probe::{LivenessProbe, probe};
pub use server::PeerRpcServer;

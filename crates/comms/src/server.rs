//! Receiving end of peer calls and data queries.
//!
//! The HTTP listener itself lives elsewhere; it hands decoded bodies to
//! [`PeerRpcServer::handle_peer_body`] (for `/peer`) or
//! [`PeerRpcServer::handle_query`] (for named queries) and writes back the
//! returned JSON.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use worldgrid_common::{FieldError, Fields, RegionHandle, UserId, field_value};

use crate::error::CommsError;
use crate::failure::FailureTracker;
use crate::local::{LocalBackend, RegionHandlers};
use crate::messages::{PeerCall, PeerReply};

const FAULT_UNKNOWN_METHOD: i64 = -32601;
const FAULT_BAD_PARAMS: i64 = -32602;

pub struct PeerRpcServer {
    local: Arc<LocalBackend>,
    failures: Arc<FailureTracker>,
}

impl PeerRpcServer {
    pub fn new(local: Arc<LocalBackend>, failures: Arc<FailureTracker>) -> Self {
        Self { local, failures }
    }

    /// Deliver one peer call to the hosted region it names.
    pub fn handle_call(&self, call: PeerCall) -> PeerReply {
        let handle = call.region_handle();

        if let PeerCall::RegionUp { notice, .. } = &call {
            let Some(announcer) = notice.handle() else {
                warn!(x = notice.loc_x, y = notice.loc_y, "region up notice outside the grid");
                return PeerReply::declined(format!(
                    "location {},{} is outside the grid",
                    notice.loc_x, notice.loc_y
                ));
            };
            info!(%announcer, host = %notice.external_host, "neighbour region reports up");
            self.failures.reset(announcer);
        }

        if let PeerCall::ExpectChildAgent { agent, .. } = &call {
            if let Err(e) = self.local.admit(handle, agent.agent_id) {
                info!(%handle, agent = %agent.agent_id, reason = %e, "refusing incoming agent");
                return match e {
                    CommsError::Policy(reason) => PeerReply::declined(reason),
                    other => PeerReply::declined(other.to_string()),
                };
            }
        }

        let Some(region) = self.local.handlers(handle) else {
            debug!(%handle, method = call.name(), "call for a region not hosted here");
            return PeerReply::declined(format!("region {handle} not hosted here"));
        };
        deliver(region.as_ref(), call)
    }

    /// Decode and handle a raw `/peer` body. Undecodable bodies are declined.
    pub fn handle_peer_body(&self, body: Value) -> Value {
        let reply = match serde_json::from_value::<PeerCall>(body) {
            Ok(call) => self.handle_call(call),
            Err(e) => {
                warn!(error = %e, "malformed peer call");
                PeerReply::declined(format!("malformed request: {e}"))
            }
        };
        serde_json::to_value(reply).unwrap_or(Value::Null)
    }

    /// Answer a named flat-map query: `land_data`, `check`,
    /// `presence_update_bulk` or `terminate_friend`. Errors come back as a
    /// fault map.
    pub fn handle_query(&self, method: &str, params: &Fields) -> Fields {
        let answer = match method {
            "land_data" => self.land_data(params),
            "check" => Ok(self.check()),
            "presence_update_bulk" => self.presence_update(params),
            "terminate_friend" => self.terminate_friend(params),
            other => {
                warn!(method = other, "unknown query method");
                return fault(FAULT_UNKNOWN_METHOD, &format!("unknown method {other}"));
            }
        };
        answer.unwrap_or_else(|e| {
            warn!(method, error = %e, "malformed query");
            fault(FAULT_BAD_PARAMS, &e.to_string())
        })
    }

    fn land_data(&self, params: &Fields) -> Result<Fields, FieldError> {
        let handle = RegionHandle(field_value(params, "region_handle")?);
        let x: u32 = field_value(params, "x")?;
        let y: u32 = field_value(params, "y")?;
        debug!(%handle, x, y, "land data requested");
        Ok(self
            .local
            .handlers(handle)
            .and_then(|region| region.land_data(x, y))
            .map(|land| land.to_fields())
            .unwrap_or_default())
    }

    fn check(&self) -> Fields {
        let mut answer = Fields::new();
        answer.insert("online".into(), Value::from("true"));
        answer.insert(
            "region_count".into(),
            Value::from(self.local.region_count().to_string()),
        );
        answer
    }

    fn presence_update(&self, params: &Fields) -> Result<Fields, FieldError> {
        let agent: UserId = field_value(params, "agentID")?;
        let online: bool = field_value(params, "agentOnline")?;
        let count: usize = field_value(params, "friendCount")?;
        let friends = (0..count.min(params.len()))
            .map(|i| field_value(params, &format!("friendID_{i}")))
            .collect::<Result<Vec<UserId>, _>>()?;

        let mut away: Vec<UserId> = Vec::new();
        for region in self.local.all_handlers() {
            for friend in region.presence_update(agent, &friends, online) {
                if !away.contains(&friend) {
                    away.push(friend);
                }
            }
        }

        let mut answer = Fields::new();
        for (i, friend) in away.iter().enumerate() {
            answer.insert(format!("friendID_{i}"), Value::from(friend.to_string()));
        }
        answer.insert("friendCount".into(), Value::from(away.len()));
        Ok(answer)
    }

    fn terminate_friend(&self, params: &Fields) -> Result<Fields, FieldError> {
        let agent: UserId = field_value(params, "agentID")?;
        let ex_friend: UserId = field_value(params, "friendID")?;
        let success = self
            .local
            .all_handlers()
            .iter()
            .fold(false, |done, region| region.terminate_friend(agent, ex_friend) || done);
        let mut answer = Fields::new();
        answer.insert("success".into(), Value::from(success));
        Ok(answer)
    }
}

fn deliver(region: &dyn RegionHandlers, call: PeerCall) -> PeerReply {
    let ok = match call {
        PeerCall::ExpectChildAgent { agent, .. } => region.expect_child_agent(&agent),
        PeerCall::ChildAgentUpdate { state, .. } => region.child_agent_update(&state),
        PeerCall::ExpectAvatarCrossing {
            agent_id,
            position,
            is_flying,
            ..
        } => {
            if region.is_banned(agent_id) {
                return PeerReply::declined(crate::local::BANNED);
            }
            region.expect_avatar_crossing(agent_id, position, is_flying)
        }
        PeerCall::ExpectPrimCrossing {
            object_id,
            payload,
            crossing_method,
            ..
        } => region.expect_prim_crossing(object_id, &payload, crossing_method),
        PeerCall::CloseChildConnection { agent_id, .. } => region.close_child_connection(agent_id),
        PeerCall::RegionUp { notice, .. } => region.region_up(&notice),
        PeerCall::LogoffUser {
            agent_id,
            region_secret,
            message,
            ..
        } => region.logoff_user(agent_id, &region_secret, &message),
    };
    PeerReply::from(ok)
}

fn fault(code: i64, message: &str) -> Fields {
    let mut f = Fields::new();
    f.insert("faultCode".into(), Value::from(code));
    f.insert("faultString".into(), Value::from(message));
    f
}

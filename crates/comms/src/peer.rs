//! Outbound calls to a peer region.

use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, trace};
use worldgrid_common::{
    AgentId, Fields, LandData, ObjectId, RegionDescriptor, UserId, field_str, field_value,
};

use crate::config::CommsTimeouts;
use crate::error::CommsError;
use crate::messages::{AgentCircuit, ChildAgentState, PeerCall, PeerReply, RegionUpNotice};

/// Carries calls to a peer process.
///
/// Two channels: typed [`PeerCall`]s to the peer RPC listener, and named
/// flat-map queries to the peer's HTTP listener (land data, presence).
pub trait PeerTransport: Send + Sync {
    fn invoke(&self, url: &str, call: &PeerCall, timeout: Duration) -> Result<PeerReply, CommsError>;

    fn query(
        &self,
        url: &str,
        method: &str,
        params: Fields,
        timeout: Duration,
    ) -> Result<Fields, CommsError>;
}

/// [`PeerTransport`] over HTTP using a blocking reqwest client.
#[derive(Clone)]
pub struct HttpPeerTransport {
    client: reqwest::blocking::Client,
}

impl HttpPeerTransport {
    pub fn new() -> Result<Self, CommsError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("worldgrid/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CommsError::Transport {
                target: "local".into(),
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    fn post(&self, url: &str, body: &Value, timeout: Duration) -> Result<Value, CommsError> {
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .map_err(|e| CommsError::Transport {
                target: url.to_string(),
                message: if e.is_timeout() {
                    format!("timed out after {timeout:?}")
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(CommsError::Auth {
                target: url.to_string(),
                message: format!("HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(CommsError::Protocol {
                target: url.to_string(),
                message: format!("HTTP {status}"),
            });
        }
        response.json().map_err(|e| CommsError::Protocol {
            target: url.to_string(),
            message: format!("undecodable body: {e}"),
        })
    }
}

impl PeerTransport for HttpPeerTransport {
    fn invoke(&self, url: &str, call: &PeerCall, timeout: Duration) -> Result<PeerReply, CommsError> {
        let body = serde_json::to_value(call).map_err(|e| CommsError::Protocol {
            target: url.to_string(),
            message: e.to_string(),
        })?;
        let answer = self.post(url, &body, timeout)?;
        serde_json::from_value(answer).map_err(|e| CommsError::Protocol {
            target: url.to_string(),
            message: format!("malformed reply: {e}"),
        })
    }

    fn query(
        &self,
        url: &str,
        method: &str,
        params: Fields,
        timeout: Duration,
    ) -> Result<Fields, CommsError> {
        let answer = self.post(url, &json!({ "method": method, "params": params }), timeout)?;
        match answer {
            Value::Object(fields) if fields.contains_key("faultCode") => Err(CommsError::Protocol {
                target: url.to_string(),
                message: fields
                    .get("faultString")
                    .and_then(Value::as_str)
                    .unwrap_or("fault")
                    .to_string(),
            }),
            Value::Object(fields) => Ok(fields),
            _ => Err(CommsError::Protocol {
                target: url.to_string(),
                message: "answer is not a map".into(),
            }),
        }
    }
}

/// Typed calls against one resolved peer region.
pub struct PeerClient<'a> {
    transport: &'a dyn PeerTransport,
    region: &'a RegionDescriptor,
    timeouts: &'a CommsTimeouts,
}

impl<'a> PeerClient<'a> {
    pub fn new(
        transport: &'a dyn PeerTransport,
        region: &'a RegionDescriptor,
        timeouts: &'a CommsTimeouts,
    ) -> Self {
        Self {
            transport,
            region,
            timeouts,
        }
    }

    pub fn region(&self) -> &RegionDescriptor {
        self.region
    }

    fn rpc_url(&self) -> String {
        format!("http://{}/peer", self.region.peer_rpc)
    }

    fn presence_url(&self) -> String {
        format!(
            "http://{}:{}/presence_update_bulk",
            self.region.external_host, self.region.http_port
        )
    }

    fn deliver(&self, call: PeerCall) -> Result<(), CommsError> {
        let url = self.rpc_url();
        debug!(method = call.name(), %url, "peer call");
        let reply = self.transport.invoke(&url, &call, self.timeouts.peer_rpc)?;
        if reply.success {
            Ok(())
        } else {
            Err(CommsError::Policy(
                reply
                    .reason
                    .unwrap_or_else(|| format!("declined by {}", self.region.name)),
            ))
        }
    }

    pub fn expect_child_agent(&self, agent: &AgentCircuit) -> Result<(), CommsError> {
        self.deliver(PeerCall::ExpectChildAgent {
            region_handle: self.region.handle(),
            agent: agent.clone(),
        })
    }

    pub fn child_agent_update(&self, state: &ChildAgentState) -> Result<(), CommsError> {
        self.deliver(PeerCall::ChildAgentUpdate {
            region_handle: self.region.handle(),
            state: state.clone(),
        })
    }

    pub fn expect_avatar_crossing(
        &self,
        agent_id: AgentId,
        position: glam::Vec3,
        is_flying: bool,
    ) -> Result<(), CommsError> {
        self.deliver(PeerCall::ExpectAvatarCrossing {
            region_handle: self.region.handle(),
            agent_id,
            position,
            is_flying,
        })
    }

    pub fn expect_prim_crossing(
        &self,
        object_id: ObjectId,
        payload: &str,
        crossing_method: i32,
    ) -> Result<(), CommsError> {
        self.deliver(PeerCall::ExpectPrimCrossing {
            region_handle: self.region.handle(),
            object_id,
            payload: payload.to_string(),
            crossing_method,
        })
    }

    pub fn close_child_connection(&self, agent_id: AgentId) -> Result<(), CommsError> {
        self.deliver(PeerCall::CloseChildConnection {
            region_handle: self.region.handle(),
            agent_id,
        })
    }

    pub fn region_up(&self, notice: &RegionUpNotice) -> Result<(), CommsError> {
        self.deliver(PeerCall::RegionUp {
            region_handle: self.region.handle(),
            notice: notice.clone(),
        })
    }

    pub fn logoff_user(&self, agent_id: AgentId, region_secret: &str, message: &str) -> Result<(), CommsError> {
        self.deliver(PeerCall::LogoffUser {
            region_handle: self.region.handle(),
            agent_id,
            region_secret: region_secret.to_string(),
            message: message.to_string(),
        })
    }

    /// Parcel at `(x, y)` in the peer region, via its data-query endpoint.
    /// An empty answer means there is no such parcel.
    pub fn land_data(&self, x: u32, y: u32) -> Result<Option<LandData>, CommsError> {
        let url = self.region.http_url();
        let mut params = Fields::new();
        params.insert("region_handle".into(), Value::from(self.region.handle().to_string()));
        params.insert("x".into(), Value::from(x.to_string()));
        params.insert("y".into(), Value::from(y.to_string()));
        let answer = self
            .transport
            .query(&url, "land_data", params, self.timeouts.land_data)?;
        if answer.is_empty() {
            return Ok(None);
        }
        let land = LandData::from_fields(&answer).map_err(|e| CommsError::Protocol {
            target: url,
            message: e.to_string(),
        })?;
        trace!(parcel = %land.name, "fetched remote land data");
        Ok(Some(land))
    }

    /// Announce `agent`'s presence change to friends in the peer region.
    /// Returns the friends the peer reports as gone from it.
    pub fn presence_update(
        &self,
        agent: UserId,
        friends: &[UserId],
        online: bool,
    ) -> Result<Vec<UserId>, CommsError> {
        let url = self.presence_url();
        let mut params = Fields::new();
        params.insert("agentID".into(), Value::from(agent.to_string()));
        params.insert("agentOnline".into(), Value::from(online));
        for (i, friend) in friends.iter().enumerate() {
            params.insert(format!("friendID_{i}"), Value::from(friend.to_string()));
        }
        params.insert("friendCount".into(), Value::from(friends.len()));
        let answer = self
            .transport
            .query(&url, "presence_update_bulk", params, self.timeouts.presence)?;
        let count: usize = field_value(&answer, "friendCount").map_err(|e| CommsError::Protocol {
            target: url.clone(),
            message: e.to_string(),
        })?;
        // Every listed friend is its own key, so the map size bounds the count.
        Ok((0..count.min(answer.len()))
            .filter_map(|i| field_str(&answer, &format!("friendID_{i}")).ok()?.parse().ok())
            .collect())
    }

    pub fn terminate_friend(&self, agent: UserId, ex_friend: UserId) -> Result<bool, CommsError> {
        let url = self.presence_url();
        let mut params = Fields::new();
        params.insert("agentID".into(), Value::from(agent.to_string()));
        params.insert("friendID".into(), Value::from(ex_friend.to_string()));
        let answer = self
            .transport
            .query(&url, "terminate_friend", params, self.timeouts.presence)?;
        field_value(&answer, "success").map_err(|e| CommsError::Protocol {
            target: url,
            message: e.to_string(),
        })
    }
}

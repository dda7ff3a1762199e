//! In-process grid authority.
//!
//! Serves the same methods as a remote authority from a table in memory, so a
//! single process can run a small grid without any external service.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};
use worldgrid_common::{
    Endpoint, FieldError, Fields, RegionDescriptor, RegionHandle, RegionId, UserId,
    field_location, field_str, field_uuid, field_value,
};

use crate::authority::GridAuthority;
use crate::error::AuthorityError;
use crate::wire::{descriptor_to_fields, map_entry};

const UNKNOWN_METHOD: i64 = -32601;

/// Grid authority backed by an in-memory region table.
#[derive(Debug)]
pub struct StandaloneAuthority {
    recv_key: Option<String>,
    allow_forceful_banlines: bool,
    regions: RwLock<BTreeMap<RegionHandle, RegionDescriptor>>,
}

impl Default for StandaloneAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl StandaloneAuthority {
    pub fn new() -> Self {
        Self {
            recv_key: None,
            allow_forceful_banlines: true,
            regions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Only accept registrations presenting `key`.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.recv_key = Some(key.into());
        self
    }

    pub fn with_forceful_banlines(mut self, allow: bool) -> Self {
        self.allow_forceful_banlines = allow;
        self
    }

    pub fn region_count(&self) -> usize {
        self.regions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn register(&self, params: &Fields) -> Fields {
        if let Some(expected) = &self.recv_key {
            if field_str(params, "auth_key").ok() != Some(expected.as_str()) {
                return error_answer("authentication failed");
            }
        }
        let region = match registration_descriptor(params) {
            Ok(region) => region,
            Err(e) => return error_answer(&e.to_string()),
        };
        let handle = region.handle();
        let mut regions = self.regions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = regions.get(&handle) {
            if existing.region_id != region.region_id {
                return error_answer(&format!("location occupied by {}", existing.name));
            }
        }
        info!(region = %region.name, %handle, "standalone authority registered region");
        regions.insert(handle, region);

        let mut answer = Fields::new();
        let banlines = if self.allow_forceful_banlines { "TRUE" } else { "FALSE" };
        answer.insert("allow_forceful_banlines".into(), Value::from(banlines));
        answer
    }

    fn deregister(&self, params: &Fields) -> Fields {
        let Ok(region_id) = field_uuid(params, "region_id").map(RegionId) else {
            return error_answer("missing region_id");
        };
        let mut regions = self.regions.write().unwrap_or_else(PoisonError::into_inner);
        let before = regions.len();
        regions.retain(|_, r| r.region_id != region_id);
        if regions.len() == before {
            return error_answer("region not registered");
        }
        debug!(%region_id, "standalone authority deregistered region");
        let mut answer = Fields::new();
        answer.insert("success".into(), Value::from("true"));
        answer
    }

    fn region_data(&self, params: &Fields) -> Fields {
        let regions = self.regions.read().unwrap_or_else(PoisonError::into_inner);
        let found = if let Ok(handle) = field_value::<u64>(params, "region_handle") {
            regions.get(&RegionHandle(handle))
        } else if let Ok(name) = field_str(params, "region_name_search") {
            regions.values().find(|r| r.name.eq_ignore_ascii_case(name))
        } else if let Ok(id) = field_uuid(params, "region_uuid") {
            regions.values().find(|r| r.region_id.0 == id)
        } else {
            None
        };
        match found {
            Some(region) => {
                let mut answer = Fields::new();
                descriptor_to_fields(region, "", &mut answer);
                answer
            }
            None => error_answer("region not found"),
        }
    }

    fn search_by_name(&self, params: &Fields) -> Fields {
        let name = field_str(params, "name").unwrap_or_default().to_lowercase();
        let max: usize = field_value(params, "maxNumber").unwrap_or(usize::MAX);
        let regions = self.regions.read().unwrap_or_else(PoisonError::into_inner);
        let mut answer = Fields::new();
        let mut found = 0;
        for region in regions
            .values()
            .filter(|r| r.name.to_lowercase().contains(&name))
            .take(max)
        {
            descriptor_to_fields(region, &format!("region{found}."), &mut answer);
            found += 1;
        }
        answer.insert("numFound".into(), Value::from(found.to_string()));
        answer
    }

    fn map_blocks(&self, params: &Fields) -> Result<Fields, FieldError> {
        let xmin: u32 = field_value(params, "xmin")?;
        let ymin: u32 = field_value(params, "ymin")?;
        let xmax: u32 = field_value(params, "xmax")?;
        let ymax: u32 = field_value(params, "ymax")?;
        let regions = self.regions.read().unwrap_or_else(PoisonError::into_inner);
        let entries: Vec<Value> = regions
            .values()
            .filter(|r| (xmin..=xmax).contains(&r.loc_x) && (ymin..=ymax).contains(&r.loc_y))
            .map(|r| Value::Object(map_entry(r)))
            .collect();
        let mut answer = Fields::new();
        answer.insert("sim-profiles".into(), Value::Array(entries));
        Ok(answer)
    }
}

impl GridAuthority for StandaloneAuthority {
    fn call(&self, method: &str, params: Fields, _timeout: Duration) -> Result<Fields, AuthorityError> {
        match method {
            "register_region" => Ok(self.register(&params)),
            "deregister_region" => Ok(self.deregister(&params)),
            "region_data_request" => Ok(self.region_data(&params)),
            "search_for_region_by_name" => Ok(self.search_by_name(&params)),
            "map_block_query" => self.map_blocks(&params).map_err(|e| AuthorityError::Fault {
                code: -32602,
                message: e.to_string(),
            }),
            other => Err(AuthorityError::Fault {
                code: UNKNOWN_METHOD,
                message: format!("unknown method {other}"),
            }),
        }
    }

    fn url(&self) -> &str {
        "standalone"
    }
}

fn error_answer(message: &str) -> Fields {
    let mut answer = Fields::new();
    answer.insert("error".into(), Value::from(message));
    answer
}

fn registration_descriptor(f: &Fields) -> Result<RegionDescriptor, FieldError> {
    let host = field_str(f, "sim_ip")?.to_string();
    let http_port: u16 = field_value(f, "http_port")?;
    let (loc_x, loc_y) = field_location(f, "region_locx", "region_locy")?;
    Ok(RegionDescriptor {
        region_id: RegionId(field_uuid(f, "region_id")?),
        name: field_str(f, "sim_name")?.to_string(),
        loc_x,
        loc_y,
        internal: Endpoint::new(host.clone(), field_value(f, "sim_port")?),
        peer_rpc: Endpoint::new(host.clone(), field_value(f, "peer_rpc_port")?),
        http_port,
        secret: field_str(f, "region_secret")?.to_string(),
        master_avatar: UserId(field_uuid(f, "master_avatar_uuid")?),
        map_image_id: field_uuid(f, "map_image_id")?,
        origin_id: RegionId(field_uuid(f, "origin_id")?),
        server_uri: field_str(f, "server_uri")?.to_string(),
        external_host: host,
    })
}

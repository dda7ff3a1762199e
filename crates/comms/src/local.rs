use glam::Vec3;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};
use worldgrid_common::{AgentId, LandData, ObjectId, RegionHandle, UserId};

use crate::error::CommsError;
use crate::messages::{AgentCircuit, ChildAgentState, RegionUpNotice};

pub(crate) const LOGINS_DISABLED: &str = "region login currently disabled";
pub(crate) const BANNED: &str = "banned";

/// What a hosted region does with calls addressed to it.
///
/// Implemented by the scene owning the region and handed to the
/// [`LocalBackend`] when the region comes up. Every delivery answers whether
/// the region accepted it.
pub trait RegionHandlers: Send + Sync {
    fn expect_child_agent(&self, agent: &AgentCircuit) -> bool;
    fn child_agent_update(&self, state: &ChildAgentState) -> bool;
    fn expect_avatar_crossing(&self, agent: AgentId, position: Vec3, is_flying: bool) -> bool;
    fn expect_prim_crossing(&self, object: ObjectId, payload: &str, crossing_method: i32) -> bool;
    fn close_child_connection(&self, agent: AgentId) -> bool;
    fn region_up(&self, neighbour: &RegionUpNotice) -> bool;

    fn agent_crossed(&self, _agent: AgentId) -> bool {
        true
    }

    fn prim_crossed(&self, _object: ObjectId) -> bool {
        true
    }

    /// Parcel at region-local metres `(x, y)`.
    fn land_data(&self, _x: u32, _y: u32) -> Option<LandData> {
        None
    }

    fn is_banned(&self, _agent: AgentId) -> bool {
        false
    }

    fn logoff_user(&self, _agent: AgentId, _region_secret: &str, _message: &str) -> bool {
        false
    }

    /// Tell `agent`'s friends here about a login or logout. Returns the
    /// friends that are no longer in this region.
    fn presence_update(&self, _agent: UserId, _friends: &[UserId], _online: bool) -> Vec<UserId> {
        Vec::new()
    }

    fn terminate_friend(&self, _agent: UserId, _ex_friend: UserId) -> bool {
        false
    }
}

/// Regions hosted by this process, dispatched to without any network hop.
pub struct LocalBackend {
    regions: RwLock<BTreeMap<RegionHandle, Arc<dyn RegionHandlers>>>,
    logins_enabled: AtomicBool,
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBackend {
    pub fn new() -> Self {
        Self {
            regions: RwLock::new(BTreeMap::new()),
            logins_enabled: AtomicBool::new(true),
        }
    }

    pub fn add_region(&self, handle: RegionHandle, handlers: Arc<dyn RegionHandlers>) {
        info!(%handle, "region attached to local backend");
        self.regions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, handlers);
    }

    pub fn remove_region(&self, handle: RegionHandle) -> bool {
        let removed = self
            .regions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle)
            .is_some();
        if removed {
            debug!(%handle, "region detached from local backend");
        }
        removed
    }

    pub fn handlers(&self, handle: RegionHandle) -> Option<Arc<dyn RegionHandlers>> {
        self.regions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
    }

    pub fn is_hosted(&self, handle: RegionHandle) -> bool {
        self.regions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&handle)
    }

    pub fn region_count(&self) -> usize {
        self.regions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Handlers of every hosted region, in handle order.
    pub fn all_handlers(&self) -> Vec<Arc<dyn RegionHandlers>> {
        self.regions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn logins_enabled(&self) -> bool {
        self.logins_enabled.load(Ordering::Acquire)
    }

    pub fn set_logins_enabled(&self, enabled: bool) {
        info!(enabled, "region logins toggled");
        self.logins_enabled.store(enabled, Ordering::Release);
    }

    /// The login gate: logins must be enabled, and `agent` must not be banned
    /// from the target region if that region is hosted here.
    pub fn admit(&self, handle: RegionHandle, agent: AgentId) -> Result<(), CommsError> {
        if !self.logins_enabled() {
            return Err(CommsError::Policy(LOGINS_DISABLED.to_string()));
        }
        if self.handlers(handle).is_some_and(|h| h.is_banned(agent)) {
            return Err(CommsError::Policy(BANNED.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BanAll;

    impl RegionHandlers for BanAll {
        fn expect_child_agent(&self, _: &AgentCircuit) -> bool {
            true
        }
        fn child_agent_update(&self, _: &ChildAgentState) -> bool {
            true
        }
        fn expect_avatar_crossing(&self, _: AgentId, _: Vec3, _: bool) -> bool {
            true
        }
        fn expect_prim_crossing(&self, _: ObjectId, _: &str, _: i32) -> bool {
            true
        }
        fn close_child_connection(&self, _: AgentId) -> bool {
            true
        }
        fn region_up(&self, _: &RegionUpNotice) -> bool {
            true
        }
        fn is_banned(&self, _: AgentId) -> bool {
            true
        }
    }

    #[test]
    fn gate_checks_logins_then_bans() {
        let backend = LocalBackend::new();
        let here = RegionHandle::from_location(1, 1);
        let elsewhere = RegionHandle::from_location(2, 2);
        backend.add_region(here, Arc::new(BanAll));

        assert_eq!(
            backend.admit(here, AgentId::new()),
            Err(CommsError::Policy(BANNED.into()))
        );
        assert_eq!(backend.admit(elsewhere, AgentId::new()), Ok(()));

        backend.set_logins_enabled(false);
        assert_eq!(
            backend.admit(elsewhere, AgentId::new()),
            Err(CommsError::Policy(LOGINS_DISABLED.into()))
        );
    }

    #[test]
    fn regions_attach_and_detach() {
        let backend = LocalBackend::new();
        let h = RegionHandle::from_location(3, 4);
        assert!(!backend.is_hosted(h));
        backend.add_region(h, Arc::new(BanAll));
        assert!(backend.is_hosted(h));
        assert_eq!(backend.region_count(), 1);
        assert!(backend.remove_region(h));
        assert!(!backend.remove_region(h));
        assert!(backend.handlers(h).is_none());
    }
}

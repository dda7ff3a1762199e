use glam::Vec3;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};
use worldgrid_common::{AgentId, LandData, ObjectId, RegionDescriptor, RegionHandle, UserId};
use worldgrid_directory::{HttpAuthority, RegionDirectory, Registration, RegistrationError};

use crate::config::{CommsConfig, CommsTimeouts, FailureThresholds, OperationClass};
use crate::error::CommsError;
use crate::failure::FailureTracker;
use crate::local::{BANNED, LocalBackend, RegionHandlers};
use crate::messages::{AgentCircuit, ChildAgentState, RegionUpNotice};
use crate::peer::{HttpPeerTransport, PeerClient, PeerTransport};
use crate::probe::probe;

/// Typed entry point for every operation addressed to another region.
///
/// Destinations hosted in this process are served in-process; everything else
/// goes through failure gating, directory resolution and the peer transport.
/// Calls block for at most their class's timeout and may run concurrently;
/// concurrent calls to the same dead peer are not coalesced, so a burst can
/// each time out before the failure count trips the threshold.
pub struct RemoteRegionGateway {
    directory: Arc<RegionDirectory>,
    failures: Arc<FailureTracker>,
    local: Arc<LocalBackend>,
    transport: Arc<dyn PeerTransport>,
    timeouts: CommsTimeouts,
    thresholds: FailureThresholds,
}

impl RemoteRegionGateway {
    pub fn new(
        directory: Arc<RegionDirectory>,
        failures: Arc<FailureTracker>,
        local: Arc<LocalBackend>,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        Self {
            directory,
            failures,
            local,
            transport,
            timeouts: CommsTimeouts::default(),
            thresholds: FailureThresholds::default(),
        }
    }

    /// Gateway talking HTTP to the configured grid authority and to peers.
    pub fn from_config(config: &CommsConfig) -> Result<Self, CommsError> {
        let authority = HttpAuthority::new(&config.grid_url).map_err(|e| CommsError::Transport {
            target: config.grid_url.clone(),
            message: e.to_string(),
        })?;
        let directory = RegionDirectory::new(
            Arc::new(authority),
            config.send_key.clone(),
            config.recv_key.clone(),
        )
        .with_timeouts(config.timeouts.directory);
        let local = LocalBackend::new();
        local.set_logins_enabled(config.logins_enabled);
        Ok(Self::new(
            Arc::new(directory),
            Arc::new(FailureTracker::new()),
            Arc::new(local),
            Arc::new(HttpPeerTransport::new()?),
        )
        .with_timeouts(config.timeouts)
        .with_thresholds(config.failure_thresholds.clone()))
    }

    pub fn with_timeouts(mut self, timeouts: CommsTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_thresholds(mut self, thresholds: FailureThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn directory(&self) -> &Arc<RegionDirectory> {
        &self.directory
    }

    pub fn failures(&self) -> &Arc<FailureTracker> {
        &self.failures
    }

    pub fn local(&self) -> &Arc<LocalBackend> {
        &self.local
    }

    /// Register `region` with the grid and start serving its calls in-process.
    pub fn attach_region(
        &self,
        region: RegionDescriptor,
        handlers: Arc<dyn RegionHandlers>,
    ) -> Result<Registration, RegistrationError> {
        let handle = region.handle();
        let registration = self.directory.register(region)?;
        self.local.add_region(handle, handlers);
        Ok(registration)
    }

    /// Stop serving `region` and withdraw it from the grid. Returns whether the
    /// authority confirmed the withdrawal.
    pub fn detach_region(&self, region: &RegionDescriptor) -> bool {
        self.local.remove_region(region.handle());
        self.directory.deregister(region)
    }

    // ---------------------------------------------------------------
    // Agent lifecycle
    // ---------------------------------------------------------------

    /// Prepare `handle` for an incoming agent circuit. Declined up front when
    /// logins are disabled here or the agent is banned from a region hosted here.
    pub fn expect_child_agent(&self, handle: RegionHandle, agent: &AgentCircuit) -> Result<(), CommsError> {
        if let Err(e) = self.local.admit(handle, agent.agent_id) {
            info!(%handle, agent = %agent.agent_id, reason = %e, "child agent declined");
            return Err(e);
        }
        self.dispatch(
            handle,
            OperationClass::ChildAgent,
            |h| accepted(h.expect_child_agent(agent), handle),
            |peer| peer.expect_child_agent(agent),
        )
    }

    pub fn child_agent_update(&self, handle: RegionHandle, state: &ChildAgentState) -> Result<(), CommsError> {
        self.dispatch(
            handle,
            OperationClass::ChildAgentUpdate,
            |h| accepted(h.child_agent_update(state), handle),
            |peer| peer.child_agent_update(state),
        )
    }

    pub fn close_child_connection(&self, handle: RegionHandle, agent: AgentId) -> Result<(), CommsError> {
        self.dispatch(
            handle,
            OperationClass::ChildAgent,
            |h| accepted(h.close_child_connection(agent), handle),
            |peer| peer.close_child_connection(agent),
        )
    }

    pub fn logoff_user(
        &self,
        handle: RegionHandle,
        agent: AgentId,
        region_secret: &str,
        message: &str,
    ) -> Result<(), CommsError> {
        self.dispatch(
            handle,
            OperationClass::ChildAgent,
            |h| accepted(h.logoff_user(agent, region_secret, message), handle),
            |peer| peer.logoff_user(agent, region_secret, message),
        )
    }

    // ---------------------------------------------------------------
    // Crossings
    // ---------------------------------------------------------------

    pub fn expect_avatar_crossing(
        &self,
        handle: RegionHandle,
        agent: AgentId,
        position: Vec3,
        is_flying: bool,
    ) -> Result<(), CommsError> {
        self.dispatch(
            handle,
            OperationClass::AvatarCrossing,
            |h| {
                if h.is_banned(agent) {
                    return Err(CommsError::Policy(BANNED.to_string()));
                }
                accepted(h.expect_avatar_crossing(agent, position, is_flying), handle)
            },
            |peer| peer.expect_avatar_crossing(agent, position, is_flying),
        )
    }

    pub fn expect_prim_crossing(
        &self,
        handle: RegionHandle,
        object: ObjectId,
        payload: &str,
        crossing_method: i32,
    ) -> Result<(), CommsError> {
        self.dispatch(
            handle,
            OperationClass::PrimCrossing,
            |h| accepted(h.expect_prim_crossing(object, payload, crossing_method), handle),
            |peer| peer.expect_prim_crossing(object, payload, crossing_method),
        )
    }

    /// Local only: a crossing can only be acknowledged to a region hosted here.
    pub fn acknowledge_agent_crossed(&self, handle: RegionHandle, agent: AgentId) -> Result<(), CommsError> {
        let handlers = self.local.handlers(handle).ok_or(CommsError::NotFound(handle))?;
        accepted(handlers.agent_crossed(agent), handle)
    }

    pub fn acknowledge_prim_crossed(&self, handle: RegionHandle, object: ObjectId) -> Result<(), CommsError> {
        let handlers = self.local.handlers(handle).ok_or(CommsError::NotFound(handle))?;
        accepted(handlers.prim_crossed(object), handle)
    }

    // ---------------------------------------------------------------
    // Liveness
    // ---------------------------------------------------------------

    /// Announce `ours` to the neighbour at `handle`. Delivery is itself proof
    /// the neighbour is alive, so its failure count is reset on success.
    pub fn region_up(&self, ours: &RegionDescriptor, handle: RegionHandle) -> Result<(), CommsError> {
        let notice = RegionUpNotice::from(ours);
        self.dispatch(
            handle,
            OperationClass::RegionUp,
            |h| accepted(h.region_up(&notice), handle),
            |peer| peer.region_up(&notice),
        )?;
        self.failures.reset(handle);
        Ok(())
    }

    /// Raw reachability check, independent of the failure counters.
    pub fn check_region(&self, address: &str, port: u16) -> bool {
        probe(address, port, self.timeouts.probe, true)
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Parcel at region-local `(x, y)`. `Ok(None)` when the region has no
    /// parcel there.
    pub fn request_land_data(&self, handle: RegionHandle, x: u32, y: u32) -> Result<Option<LandData>, CommsError> {
        self.dispatch(
            handle,
            OperationClass::LandData,
            |h| Ok(h.land_data(x, y)),
            |peer| peer.land_data(x, y),
        )
    }

    /// Tell friends in region `handle` that `agent` came online or went
    /// offline. Returns the friends reported as no longer there.
    pub fn inform_friends_in_other_region(
        &self,
        agent: UserId,
        handle: RegionHandle,
        friends: &[UserId],
        online: bool,
    ) -> Result<Vec<UserId>, CommsError> {
        self.dispatch(
            handle,
            OperationClass::Presence,
            |h| Ok(h.presence_update(agent, friends, online)),
            |peer| peer.presence_update(agent, friends, online),
        )
    }

    pub fn terminate_friend(&self, handle: RegionHandle, agent: UserId, ex_friend: UserId) -> Result<bool, CommsError> {
        self.dispatch(
            handle,
            OperationClass::Presence,
            |h| Ok(h.terminate_friend(agent, ex_friend)),
            |peer| peer.terminate_friend(agent, ex_friend),
        )
    }

    // ---------------------------------------------------------------
    // Dispatch
    // ---------------------------------------------------------------

    fn dispatch<T>(
        &self,
        handle: RegionHandle,
        class: OperationClass,
        local: impl FnOnce(&dyn RegionHandlers) -> Result<T, CommsError>,
        remote: impl FnOnce(&PeerClient<'_>) -> Result<T, CommsError>,
    ) -> Result<T, CommsError> {
        let _span = info_span!("dispatch", ?class, %handle).entered();

        if let Some(handlers) = self.local.handlers(handle) {
            debug!("destination hosted in-process");
            return local(handlers.as_ref());
        }

        if self
            .failures
            .should_short_circuit(handle, self.thresholds.get(class))
        {
            let failures = self.failures.failures(handle);
            debug!(failures, "destination suppressed");
            return Err(CommsError::Suppressed { handle, failures });
        }

        let Some(region) = self.directory.resolve_by_handle(handle) else {
            let failures = self.failures.note_failure(handle);
            warn!(failures, "destination region could not be resolved");
            return Err(CommsError::NotFound(handle));
        };

        let peer = PeerClient::new(self.transport.as_ref(), &region, &self.timeouts);
        remote(&peer).inspect_err(|e| {
            if e.counts_against_destination() {
                let failures = self.failures.note_failure(handle);
                warn!(region = %region.name, error = %e, kind = %e.kind(), failures, "call to peer region failed");
            } else {
                debug!(region = %region.name, error = %e, "peer region declined");
            }
        })
    }
}

fn accepted(ok: bool, handle: RegionHandle) -> Result<(), CommsError> {
    if ok {
        Ok(())
    } else {
        Err(CommsError::Policy(format!("declined by local region {handle}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use worldgrid_common::{Fields, ParcelId, RegionId};
    use worldgrid_directory::{GridAuthority, StandaloneAuthority, registration_fields};

    use crate::messages::{PeerCall, PeerReply};

    /// Peer transport whose every call fails or succeeds uniformly, counting
    /// invocations.
    struct Stub {
        up: Mutex<bool>,
        invocations: AtomicUsize,
        calls: Mutex<Vec<&'static str>>,
    }

    impl Stub {
        fn new(up: bool) -> Arc<Self> {
            Arc::new(Self {
                up: Mutex::new(up),
                invocations: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn set_up(&self, up: bool) {
            *self.up.lock().unwrap() = up;
        }

        fn count(&self) -> usize {
            self.invocations.load(Ordering::SeqCst)
        }

        fn fail_or<T>(&self, url: &str, ok: T) -> Result<T, CommsError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            if *self.up.lock().unwrap() {
                Ok(ok)
            } else {
                Err(CommsError::Transport {
                    target: url.to_string(),
                    message: "connection refused".into(),
                })
            }
        }
    }

    impl PeerTransport for Stub {
        fn invoke(&self, url: &str, call: &PeerCall, _: Duration) -> Result<PeerReply, CommsError> {
            self.calls.lock().unwrap().push(call.name());
            self.fail_or(url, PeerReply::accepted())
        }

        fn query(&self, url: &str, _: &str, _: Fields, _: Duration) -> Result<Fields, CommsError> {
            self.fail_or(url, Fields::new())
        }
    }

    #[derive(Default)]
    struct Recorder {
        banned: Vec<AgentId>,
        land: Option<LandData>,
        seen: Mutex<Vec<&'static str>>,
    }

    impl Recorder {
        fn saw(&self, what: &'static str) -> bool {
            self.seen.lock().unwrap().push(what);
            true
        }
    }

    impl RegionHandlers for Recorder {
        fn expect_child_agent(&self, _: &AgentCircuit) -> bool {
            self.saw("expect_child_agent")
        }
        fn child_agent_update(&self, _: &ChildAgentState) -> bool {
            self.saw("child_agent_update")
        }
        fn expect_avatar_crossing(&self, _: AgentId, _: Vec3, _: bool) -> bool {
            self.saw("expect_avatar_crossing")
        }
        fn expect_prim_crossing(&self, _: ObjectId, _: &str, _: i32) -> bool {
            self.saw("expect_prim_crossing")
        }
        fn close_child_connection(&self, _: AgentId) -> bool {
            self.saw("close_child_connection")
        }
        fn region_up(&self, _: &RegionUpNotice) -> bool {
            self.saw("region_up")
        }
        fn land_data(&self, _: u32, _: u32) -> Option<LandData> {
            self.land.clone()
        }
        fn is_banned(&self, agent: AgentId) -> bool {
            self.banned.contains(&agent)
        }
    }

    struct Grid {
        authority: Arc<StandaloneAuthority>,
        gateway: RemoteRegionGateway,
        transport: Arc<Stub>,
        remote: RegionDescriptor,
    }

    /// A gateway with one remote region known to the authority but not hosted here.
    fn grid(peer_up: bool) -> Grid {
        let authority = Arc::new(StandaloneAuthority::new());
        let remote = RegionDescriptor::new(RegionId::new(), "Remote", 1000, 1000, "10.9.9.9");
        authority
            .call("register_region", registration_fields(&remote, "k", "r"), Duration::from_secs(1))
            .unwrap();
        let transport = Stub::new(peer_up);
        let gateway = RemoteRegionGateway::new(
            Arc::new(RegionDirectory::new(authority.clone(), "k", "r")),
            Arc::new(FailureTracker::new()),
            Arc::new(LocalBackend::new()),
            transport.clone(),
        );
        Grid {
            authority,
            gateway,
            transport,
            remote,
        }
    }

    fn state() -> ChildAgentState {
        ChildAgentState {
            agent_id: AgentId::new(),
            position: Vec3::new(1.0, 2.0, 3.0),
            velocity: Vec3::ZERO,
            draw_distance: 64.0,
            throttles: Vec::new(),
        }
    }

    #[test]
    fn remote_call_reaches_peer() {
        let g = grid(true);
        g.gateway.child_agent_update(g.remote.handle(), &state()).unwrap();
        assert_eq!(g.transport.count(), 1);
        assert_eq!(*g.transport.calls.lock().unwrap(), vec!["child_agent_update"]);
    }

    #[test]
    fn suppressed_after_threshold_without_transport() {
        let g = grid(false);
        let h = g.remote.handle();
        // Threshold 3: four failures go out, the fifth is suppressed.
        for _ in 0..4 {
            assert!(matches!(
                g.gateway.child_agent_update(h, &state()),
                Err(CommsError::Transport { .. })
            ));
        }
        assert_eq!(g.transport.count(), 4);
        let err = g.gateway.child_agent_update(h, &state()).unwrap_err();
        assert_eq!(err, CommsError::Suppressed { handle: h, failures: 4 });
        assert_eq!(g.transport.count(), 4);
    }

    #[test]
    fn pre_tripped_destination_sees_zero_invocations() {
        let g = grid(true);
        let h = g.remote.handle();
        g.gateway.failures().note_failure(h);
        g.gateway.failures().note_failure(h);
        // prim crossing tolerates one failure
        assert!(matches!(
            g.gateway.expect_prim_crossing(h, ObjectId::new(), "<group/>", 0),
            Err(CommsError::Suppressed { .. })
        ));
        assert_eq!(g.transport.count(), 0);
        // an unlimited class still goes through
        g.gateway.close_child_connection(h, AgentId::new()).unwrap();
        assert_eq!(g.transport.count(), 1);
    }

    #[test]
    fn success_does_not_reset_the_counter() {
        let g = grid(true);
        let h = g.remote.handle();
        g.gateway.failures().note_failure(h);
        g.gateway.child_agent_update(h, &state()).unwrap();
        assert_eq!(g.gateway.failures().failures(h), 1);
    }

    #[test]
    fn region_up_resets_and_reenables() {
        let g = grid(false);
        let h = g.remote.handle();
        for _ in 0..5 {
            let _ = g.gateway.child_agent_update(h, &state());
        }
        assert!(matches!(
            g.gateway.child_agent_update(h, &state()),
            Err(CommsError::Suppressed { .. })
        ));

        g.transport.set_up(true);
        let ours = RegionDescriptor::new(RegionId::new(), "Ours", 1001, 1000, "10.0.0.1");
        g.gateway.region_up(&ours, h).unwrap();
        assert_eq!(g.gateway.failures().failures(h), 0);

        let before = g.transport.count();
        g.gateway.child_agent_update(h, &state()).unwrap();
        assert_eq!(g.transport.count(), before + 1);
    }

    #[test]
    fn unresolvable_destination_counts_as_failure() {
        let g = grid(true);
        let nowhere = RegionHandle::from_location(5000, 5000);
        assert_eq!(
            g.gateway.close_child_connection(nowhere, AgentId::new()),
            Err(CommsError::NotFound(nowhere))
        );
        assert_eq!(g.gateway.failures().failures(nowhere), 1);
        assert_eq!(g.transport.count(), 0);
    }

    #[test]
    fn hosted_destination_bypasses_tracker_and_transport() {
        let g = grid(false);
        let here = RegionDescriptor::new(RegionId::new(), "Here", 1, 1, "127.0.0.1");
        let handlers = Arc::new(Recorder::default());
        g.gateway.attach_region(here.clone(), handlers.clone()).unwrap();
        // even a tripped counter does not matter for in-process delivery
        for _ in 0..10 {
            g.gateway.failures().note_failure(here.handle());
        }
        g.gateway
            .expect_prim_crossing(here.handle(), ObjectId::new(), "", 0)
            .unwrap();
        g.gateway.child_agent_update(here.handle(), &state()).unwrap();
        assert_eq!(g.transport.count(), 0);
        assert_eq!(
            *handlers.seen.lock().unwrap(),
            vec!["expect_prim_crossing", "child_agent_update"]
        );
        assert_eq!(g.gateway.failures().failures(here.handle()), 10);
    }

    #[test]
    fn login_gate_declines_before_any_network() {
        let g = grid(true);
        g.gateway.local().set_logins_enabled(false);
        let err = g
            .gateway
            .expect_child_agent(g.remote.handle(), &AgentCircuit::child(AgentId::new(), 7))
            .unwrap_err();
        assert_eq!(err, CommsError::Policy("region login currently disabled".into()));
        assert_eq!(g.transport.count(), 0);
    }

    #[test]
    fn banned_agent_is_declined_for_local_region() {
        let g = grid(true);
        let villain = AgentId::new();
        let here = RegionDescriptor::new(RegionId::new(), "Here", 2, 2, "127.0.0.1");
        let handlers = Arc::new(Recorder {
            banned: vec![villain],
            ..Default::default()
        });
        g.gateway.attach_region(here.clone(), handlers.clone()).unwrap();

        let err = g
            .gateway
            .expect_child_agent(here.handle(), &AgentCircuit::child(villain, 1))
            .unwrap_err();
        assert_eq!(err, CommsError::Policy("banned".into()));
        let err = g
            .gateway
            .expect_avatar_crossing(here.handle(), villain, Vec3::ZERO, false)
            .unwrap_err();
        assert_eq!(err, CommsError::Policy("banned".into()));
        assert!(handlers.seen.lock().unwrap().is_empty());

        g.gateway
            .expect_child_agent(here.handle(), &AgentCircuit::child(AgentId::new(), 2))
            .unwrap();
    }

    #[test]
    fn land_data_prefers_local_and_reports_absence() {
        let g = grid(true);
        let here = RegionDescriptor::new(RegionId::new(), "Here", 3, 3, "127.0.0.1");
        let parcel = LandData::new(ParcelId::new(), UserId::new());
        g.gateway
            .attach_region(
                here.clone(),
                Arc::new(Recorder {
                    land: Some(parcel.clone()),
                    ..Default::default()
                }),
            )
            .unwrap();
        assert_eq!(g.gateway.request_land_data(here.handle(), 10, 10), Ok(Some(parcel)));
        // The stub answers remote queries with an empty map: no such parcel.
        assert_eq!(g.gateway.request_land_data(g.remote.handle(), 10, 10), Ok(None));
        assert_eq!(g.transport.count(), 1);
    }

    #[test]
    fn acknowledgements_are_local_only() {
        let g = grid(true);
        assert_eq!(
            g.gateway.acknowledge_agent_crossed(g.remote.handle(), AgentId::new()),
            Err(CommsError::NotFound(g.remote.handle()))
        );
        let here = RegionDescriptor::new(RegionId::new(), "Here", 4, 4, "127.0.0.1");
        g.gateway
            .attach_region(here.clone(), Arc::new(Recorder::default()))
            .unwrap();
        g.gateway.acknowledge_prim_crossed(here.handle(), ObjectId::new()).unwrap();
        assert_eq!(g.transport.count(), 0);
    }

    #[test]
    fn detach_withdraws_from_grid() {
        let g = grid(true);
        let here = RegionDescriptor::new(RegionId::new(), "Here", 6, 6, "127.0.0.1");
        g.gateway
            .attach_region(here.clone(), Arc::new(Recorder::default()))
            .unwrap();
        assert_eq!(g.authority.region_count(), 2);
        assert!(g.gateway.detach_region(&here));
        assert!(!g.gateway.local().is_hosted(here.handle()));
        assert_eq!(g.authority.region_count(), 1);
    }

    #[test]
    fn concurrent_burst_to_dead_peer_is_not_coalesced() {
        let g = grid(false);
        let h = g.remote.handle();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let _ = g.gateway.close_child_connection(h, AgentId::new());
                });
            }
        });
        // Unlimited class: every call went out and every failure was counted.
        assert_eq!(g.transport.count(), 8);
        assert_eq!(g.gateway.failures().failures(h), 8);
    }
}

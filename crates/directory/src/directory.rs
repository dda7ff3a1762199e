use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};
use worldgrid_common::{
    Fields, MapBlock, RegionDescriptor, RegionHandle, RegionId, duration_secs, field_value,
};

use crate::authority::GridAuthority;
use crate::error::{AuthorityError, RegistrationError};
use crate::resolver::{HostResolver, SystemResolver};
use crate::wire::{
    descriptor_from_fields, map_block_from_fields, map_entries, neighbour_from_entry,
    registration_fields,
};

/// How long each kind of authority request may block, and how long remote
/// descriptors stay cached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryTimeouts {
    #[serde(with = "duration_secs")]
    pub registration: Duration,
    #[serde(with = "duration_secs")]
    pub deregistration: Duration,
    #[serde(with = "duration_secs")]
    pub data_query: Duration,
    #[serde(with = "duration_secs")]
    pub map_block: Duration,
    #[serde(with = "duration_secs")]
    pub name_search: Duration,
    #[serde(with = "duration_secs")]
    pub remote_cache_ttl: Duration,
}

impl Default for DirectoryTimeouts {
    fn default() -> Self {
        Self {
            registration: Duration::from_secs(90),
            deregistration: Duration::from_secs(10),
            data_query: Duration::from_secs(3),
            map_block: Duration::from_secs(10),
            name_search: Duration::from_secs(10),
            remote_cache_ttl: Duration::from_secs(600),
        }
    }
}

/// Proof that the authority accepted a region. The region is now hosted and
/// reachable through the directory's local lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub handle: RegionHandle,
    pub region_id: RegionId,
}

#[derive(Debug, Clone)]
struct CachedRegion {
    region: RegionDescriptor,
    fetched: Instant,
}

/// Directory of regions known to this process.
pub struct RegionDirectory {
    authority: Arc<dyn GridAuthority>,
    resolver: Arc<dyn HostResolver>,
    send_key: String,
    recv_key: String,
    timeouts: DirectoryTimeouts,
    hosted: RwLock<BTreeMap<RegionHandle, RegionDescriptor>>,
    remote: Mutex<HashMap<RegionHandle, CachedRegion>>,
    grid_settings: Mutex<Vec<(String, String)>>,
}

impl RegionDirectory {
    pub fn new(
        authority: Arc<dyn GridAuthority>,
        send_key: impl Into<String>,
        recv_key: impl Into<String>,
    ) -> Self {
        Self {
            authority,
            resolver: Arc::new(SystemResolver),
            send_key: send_key.into(),
            recv_key: recv_key.into(),
            timeouts: DirectoryTimeouts::default(),
            hosted: RwLock::new(BTreeMap::new()),
            remote: Mutex::new(HashMap::new()),
            grid_settings: Mutex::new(Vec::new()),
        }
    }

    pub fn with_timeouts(mut self, timeouts: DirectoryTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn timeouts(&self) -> &DirectoryTimeouts {
        &self.timeouts
    }

    // ---------------------------------------------------------------
    // Hosted regions
    // ---------------------------------------------------------------

    /// Announce `region` to the authority and start hosting it.
    ///
    /// The region becomes locally resolvable only once the authority has
    /// accepted it. Settings the authority pushes back in its answer are
    /// queued for [`RegionDirectory::take_grid_settings`].
    pub fn register(&self, region: RegionDescriptor) -> Result<Registration, RegistrationError> {
        let url = self.authority.url().to_string();
        let Some(handle) = RegionHandle::try_from_location(region.loc_x, region.loc_y) else {
            return Err(RegistrationError::Rejected {
                url,
                reason: format!("location {},{} is outside the grid", region.loc_x, region.loc_y),
            });
        };
        let _span = info_span!("register_region", region = %region.name, %handle).entered();

        if let Some(existing) = self.hosted_region(handle) {
            if existing.region_id != region.region_id {
                return Err(RegistrationError::Rejected {
                    url,
                    reason: format!("location already hosted by {}", existing.name),
                });
            }
        }

        let params = registration_fields(&region, &self.send_key, &self.recv_key);
        let answer = self
            .authority
            .call("register_region", params, self.timeouts.registration)
            .map_err(|source| match source {
                AuthorityError::Fault { message, .. } => RegistrationError::Rejected {
                    url: url.clone(),
                    reason: message,
                },
                source => RegistrationError::Unreachable {
                    url: url.clone(),
                    source,
                },
            })?;

        if let Some(reason) = answer.get("error") {
            let reason = reason.as_str().map_or_else(|| reason.to_string(), str::to_string);
            warn!(%reason, "grid authority rejected region");
            return Err(RegistrationError::Rejected { url, reason });
        }

        // Only a refusal is queued; "TRUE" leaves the region default alone.
        if let Some(value) = answer.get("allow_forceful_banlines") {
            if value.as_str() != Some("TRUE") {
                self.grid_settings
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(("allow_forceful_banlines".to_string(), "FALSE".to_string()));
            }
        }

        let registration = Registration {
            handle,
            region_id: region.region_id,
        };
        self.remote
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
        self.hosted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, region);
        info!("region registered with grid authority");
        Ok(registration)
    }

    /// Withdraw `region` from the grid. The hosted entry is dropped whatever
    /// the authority answers; the return value only reports whether the
    /// authority confirmed it.
    pub fn deregister(&self, region: &RegionDescriptor) -> bool {
        let handle = region.handle();
        {
            let mut hosted = self.hosted.write().unwrap_or_else(PoisonError::into_inner);
            if hosted.get(&handle).is_some_and(|r| r.region_id == region.region_id) {
                hosted.remove(&handle);
            }
        }
        self.forget(handle);

        let mut params = Fields::new();
        params.insert("region_id".into(), Value::from(region.region_id.to_string()));
        params.insert("auth_key".into(), Value::from(self.send_key.clone()));
        match self
            .authority
            .call("deregister_region", params, self.timeouts.deregistration)
        {
            Ok(answer) if !answer.contains_key("error") => {
                info!(region = %region.name, %handle, "region deregistered");
                true
            }
            Ok(answer) => {
                warn!(region = %region.name, error = ?answer.get("error"), "grid authority refused deregistration");
                false
            }
            Err(e) => {
                warn!(region = %region.name, error = %e, "deregistration did not reach grid authority");
                false
            }
        }
    }

    pub fn is_local(&self, handle: RegionHandle) -> bool {
        self.hosted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&handle)
    }

    pub fn hosted_region(&self, handle: RegionHandle) -> Option<RegionDescriptor> {
        self.hosted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
    }

    pub fn hosted_regions(&self) -> Vec<RegionDescriptor> {
        self.hosted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Drain settings the authority sent back during registration.
    pub fn take_grid_settings(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.grid_settings.lock().unwrap_or_else(PoisonError::into_inner))
    }

    // ---------------------------------------------------------------
    // Lookups
    // ---------------------------------------------------------------

    pub fn resolve_by_handle(&self, handle: RegionHandle) -> Option<RegionDescriptor> {
        if let Some(region) = self.hosted_region(handle) {
            return Some(region);
        }
        if let Some(region) = self.cached(|r| r.handle() == handle) {
            return Some(region);
        }
        let mut params = self.keyed_params();
        params.insert("region_handle".into(), Value::from(handle.to_string()));
        let region = self.fetch_descriptor(params)?;
        if region.handle() != handle {
            warn!(%handle, answered = %region.handle(), "grid authority answered for a different region");
            return None;
        }
        Some(region)
    }

    pub fn resolve_by_name(&self, name: &str) -> Option<RegionDescriptor> {
        let matches = |r: &RegionDescriptor| r.name.eq_ignore_ascii_case(name);
        if let Some(region) = self
            .hosted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|r| matches(r))
        {
            return Some(region.clone());
        }
        if let Some(region) = self.cached(matches) {
            return Some(region);
        }
        let mut params = self.keyed_params();
        params.insert("region_name_search".into(), Value::from(name));
        self.fetch_descriptor(params)
    }

    pub fn resolve_by_region_id(&self, region_id: RegionId) -> Option<RegionDescriptor> {
        let matches = |r: &RegionDescriptor| r.region_id == region_id;
        if let Some(region) = self
            .hosted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|r| matches(r))
        {
            return Some(region.clone());
        }
        if let Some(region) = self.cached(matches) {
            return Some(region);
        }
        let mut params = self.keyed_params();
        params.insert("region_uuid".into(), Value::from(region_id.to_string()));
        self.fetch_descriptor(params)
    }

    /// Up to `max` regions whose name contains `name`. Malformed entries are
    /// skipped; an unreachable authority yields an empty list.
    pub fn resolve_named_regions(&self, name: &str, max: usize) -> Vec<RegionDescriptor> {
        let mut params = Fields::new();
        params.insert("name".into(), Value::from(name));
        params.insert("maxNumber".into(), Value::from(max.to_string()));
        let Some(answer) = self.query("search_for_region_by_name", params, self.timeouts.name_search)
        else {
            return Vec::new();
        };
        let found: usize = match field_value(&answer, "numFound") {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "name search answer without a count");
                return Vec::new();
            }
        };
        (0..found.min(max))
            .filter_map(|i| match descriptor_from_fields(&answer, &format!("region{i}.")) {
                Ok(region) => Some(region),
                Err(e) => {
                    debug!(index = i, error = %e, "skipping malformed name search entry");
                    None
                }
            })
            .collect()
    }

    /// Regions inside the inclusive rectangle, minus the one at its centre.
    ///
    /// Entries that fail to parse, or whose host does not resolve, are
    /// skipped. An unreachable authority yields an empty list.
    pub fn resolve_by_coordinate_range(
        &self,
        min_x: u32,
        min_y: u32,
        max_x: u32,
        max_y: u32,
    ) -> Vec<RegionDescriptor> {
        let centre = (midpoint(min_x, max_x), midpoint(min_y, max_y));
        let Some(answer) = self.map_block_query(min_x, min_y, max_x, max_y) else {
            return Vec::new();
        };

        let mut regions = Vec::new();
        for entry in map_entries(&answer) {
            let region = match neighbour_from_entry(entry) {
                Ok(region) => region,
                Err(e) => {
                    debug!(error = %e, "skipping malformed neighbour entry");
                    continue;
                }
            };
            if (region.loc_x, region.loc_y) == centre {
                continue;
            }
            if self.resolver.resolve(&region.external_host).is_none() {
                warn!(region = %region.name, host = %region.external_host, "neighbour host does not resolve; skipping");
                continue;
            }
            regions.push(region);
        }
        regions
    }

    /// The up to eight regions bordering `(x, y)`.
    pub fn request_neighbours(&self, x: u32, y: u32) -> Vec<RegionDescriptor> {
        self.resolve_by_coordinate_range(
            x.saturating_sub(1),
            y.saturating_sub(1),
            x.saturating_add(1),
            y.saturating_add(1),
        )
    }

    /// Map tiles inside the rectangle. Reversed bounds are swapped.
    pub fn request_map_blocks(&self, min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Vec<MapBlock> {
        let (min_x, max_x) = (min_x.min(max_x), min_x.max(max_x));
        let (min_y, max_y) = (min_y.min(max_y), min_y.max(max_y));
        let Some(answer) = self.map_block_query(min_x, min_y, max_x, max_y) else {
            return Vec::new();
        };
        map_entries(&answer)
            .filter_map(|entry| match map_block_from_fields(entry) {
                Ok(block) => Some(block),
                Err(e) => {
                    debug!(error = %e, "skipping malformed map block");
                    None
                }
            })
            .collect()
    }

    /// Drop a cached remote descriptor.
    pub fn forget(&self, handle: RegionHandle) {
        self.remote
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    fn keyed_params(&self) -> Fields {
        let mut params = Fields::new();
        params.insert("auth_key".into(), Value::from(self.send_key.clone()));
        params
    }

    fn cached(&self, matches: impl Fn(&RegionDescriptor) -> bool) -> Option<RegionDescriptor> {
        let ttl = self.timeouts.remote_cache_ttl;
        let mut remote = self.remote.lock().unwrap_or_else(PoisonError::into_inner);
        remote.retain(|_, c| c.fetched.elapsed() < ttl);
        remote
            .values()
            .find(|c| matches(&c.region))
            .map(|c| c.region.clone())
    }

    fn fetch_descriptor(&self, params: Fields) -> Option<RegionDescriptor> {
        let answer = self.query("region_data_request", params, self.timeouts.data_query)?;
        match descriptor_from_fields(&answer, "") {
            Ok(region) => {
                let handle = region.handle();
                if self.is_local(handle) {
                    return self.hosted_region(handle);
                }
                self.remote.lock().unwrap_or_else(PoisonError::into_inner).insert(
                    handle,
                    CachedRegion {
                        region: region.clone(),
                        fetched: Instant::now(),
                    },
                );
                Some(region)
            }
            Err(e) => {
                warn!(error = %e, "malformed region data from grid authority");
                None
            }
        }
    }

    fn map_block_query(&self, min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Option<Fields> {
        let mut params = Fields::new();
        params.insert("xmin".into(), Value::from(min_x));
        params.insert("ymin".into(), Value::from(min_y));
        params.insert("xmax".into(), Value::from(max_x));
        params.insert("ymax".into(), Value::from(max_y));
        self.query("map_block_query", params, self.timeouts.map_block)
    }

    /// Call the authority, folding both transport failures and `error`
    /// answers into `None`.
    fn query(&self, method: &str, params: Fields, timeout: Duration) -> Option<Fields> {
        match self.authority.call(method, params, timeout) {
            Ok(answer) => match answer.get("error") {
                Some(error) => {
                    debug!(method, %error, "grid authority reported an error");
                    None
                }
                None => Some(answer),
            },
            Err(e) => {
                warn!(method, error = %e, kind = %e.kind(), "grid authority request failed");
                None
            }
        }
    }
}

fn midpoint(a: u32, b: u32) -> u32 {
    ((u64::from(a) + u64::from(b)) / 2) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standalone::StandaloneAuthority;
    use std::net::IpAddr;

    /// Forwards to a standalone authority (or fails every call when there is
    /// none) while recording method names.
    struct Recording {
        inner: Option<StandaloneAuthority>,
        calls: Mutex<Vec<String>>,
    }

    impl Recording {
        fn live() -> Arc<Self> {
            Arc::new(Self {
                inner: Some(StandaloneAuthority::new()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn dead() -> Arc<Self> {
            Arc::new(Self {
                inner: None,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn count(&self, method: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|m| *m == method).count()
        }
    }

    impl GridAuthority for Recording {
        fn call(&self, method: &str, params: Fields, timeout: Duration) -> Result<Fields, AuthorityError> {
            self.calls.lock().unwrap().push(method.to_string());
            match &self.inner {
                Some(inner) => inner.call(method, params, timeout),
                None => Err(AuthorityError::Transport {
                    url: "http://grid.invalid/".into(),
                    message: "connection refused".into(),
                }),
            }
        }

        fn url(&self) -> &str {
            "http://grid.invalid/"
        }
    }

    struct NoDns;

    impl HostResolver for NoDns {
        fn resolve(&self, _host: &str) -> Option<IpAddr> {
            None
        }
    }

    /// Answers every call with a well-formed descriptor for (1, 1) except for
    /// one overridden field.
    struct Garbled {
        answer: Fields,
    }

    impl Garbled {
        fn answering(key: &str, value: &str) -> Self {
            let mut answer = Fields::new();
            crate::wire::descriptor_to_fields(&region("Faraway", 1, 1), "", &mut answer);
            answer.insert(key.into(), Value::from(value));
            Self { answer }
        }
    }

    impl GridAuthority for Garbled {
        fn call(&self, _: &str, _: Fields, _: Duration) -> Result<Fields, AuthorityError> {
            Ok(self.answer.clone())
        }

        fn url(&self) -> &str {
            "http://grid.invalid/"
        }
    }

    fn region(name: &str, x: u32, y: u32) -> RegionDescriptor {
        RegionDescriptor::new(RegionId::new(), name, x, y, "127.0.0.1")
    }

    fn directory(authority: Arc<dyn GridAuthority>) -> RegionDirectory {
        RegionDirectory::new(authority, "send", "recv")
    }

    #[test]
    fn registered_region_resolves_locally() {
        let authority = Recording::live();
        let dir = directory(authority.clone());
        let a = region("Alpha", 1000, 1000);
        let reg = dir.register(a.clone()).unwrap();
        assert_eq!(reg.handle, a.handle());
        assert!(dir.is_local(a.handle()));

        assert_eq!(dir.resolve_by_handle(a.handle()).unwrap().region_id, a.region_id);
        assert_eq!(dir.resolve_by_name("alpha").unwrap().region_id, a.region_id);
        assert_eq!(dir.resolve_by_region_id(a.region_id).unwrap().name, "Alpha");
        assert_eq!(authority.count("region_data_request"), 0);
    }

    #[test]
    fn unreachable_authority_fails_registration_without_hosting() {
        let dir = directory(Recording::dead());
        let a = region("Alpha", 1, 1);
        let err = dir.register(a.clone()).unwrap_err();
        assert!(matches!(err, RegistrationError::Unreachable { .. }));
        assert!(!dir.is_local(a.handle()));
    }

    #[test]
    fn refused_registration_is_rejected() {
        let authority = Arc::new(Recording {
            inner: Some(StandaloneAuthority::new().with_key("right")),
            calls: Mutex::new(Vec::new()),
        });
        let dir = RegionDirectory::new(authority, "wrong", "recv");
        let err = dir.register(region("Alpha", 1, 1)).unwrap_err();
        assert!(matches!(err, RegistrationError::Rejected { ref reason, .. } if reason == "authentication failed"));
    }

    #[test]
    fn second_region_at_same_handle_is_refused_locally() {
        let authority = Recording::live();
        let dir = directory(authority.clone());
        dir.register(region("Alpha", 3, 3)).unwrap();
        let err = dir.register(region("Beta", 3, 3)).unwrap_err();
        assert!(matches!(err, RegistrationError::Rejected { .. }));
        assert_eq!(authority.count("register_region"), 1);
    }

    #[test]
    fn deregister_drops_hosted_entry_even_when_authority_is_down() {
        let live = Recording::live();
        let dir = directory(live);
        let a = region("Alpha", 1, 1);
        dir.register(a.clone()).unwrap();

        let dead = directory(Recording::dead());
        // Simulate a region hosted by a directory whose authority has gone away.
        dead.hosted.write().unwrap().insert(a.handle(), a.clone());
        assert!(!dead.deregister(&a));
        assert!(!dead.is_local(a.handle()));

        assert!(dir.deregister(&a));
        assert!(!dir.is_local(a.handle()));
    }

    #[test]
    fn remote_lookup_is_cached() {
        let authority = Recording::live();
        let remote = region("Remote", 2000, 2000);
        authority
            .inner
            .as_ref()
            .unwrap()
            .call(
                "register_region",
                registration_fields(&remote, "k", "r"),
                Duration::from_secs(1),
            )
            .unwrap();

        let dir = directory(authority.clone());
        assert_eq!(dir.resolve_by_handle(remote.handle()).unwrap().region_id, remote.region_id);
        assert_eq!(dir.resolve_by_handle(remote.handle()).unwrap().region_id, remote.region_id);
        assert_eq!(authority.count("region_data_request"), 1);
        assert!(!dir.is_local(remote.handle()));

        dir.forget(remote.handle());
        dir.resolve_by_handle(remote.handle()).unwrap();
        assert_eq!(authority.count("region_data_request"), 2);
    }

    #[test]
    fn expired_cache_entries_are_refetched() {
        let authority = Recording::live();
        let remote = region("Remote", 7, 7);
        authority
            .inner
            .as_ref()
            .unwrap()
            .call("register_region", registration_fields(&remote, "k", "r"), Duration::from_secs(1))
            .unwrap();
        let dir = directory(authority.clone()).with_timeouts(DirectoryTimeouts {
            remote_cache_ttl: Duration::ZERO,
            ..Default::default()
        });
        dir.resolve_by_handle(remote.handle()).unwrap();
        dir.resolve_by_handle(remote.handle()).unwrap();
        assert_eq!(authority.count("region_data_request"), 2);
    }

    #[test]
    fn unknown_handle_is_none() {
        let dir = directory(Recording::live());
        assert!(dir.resolve_by_handle(RegionHandle::from_location(9, 9)).is_none());
        let dead = directory(Recording::dead());
        assert!(dead.resolve_by_handle(RegionHandle::from_location(9, 9)).is_none());
    }

    #[test]
    fn range_query_tracks_registration() {
        let authority = Recording::live();
        let dir = directory(authority);
        let a = region("A", 1, 1);
        let b = region("B", 1, 2);
        dir.register(a.clone()).unwrap();
        dir.register(b.clone()).unwrap();

        let around_a = dir.resolve_by_coordinate_range(0, 0, 2, 2);
        let ids: Vec<_> = around_a.iter().map(|r| r.region_id).collect();
        assert_eq!(ids, vec![b.region_id]);
        assert_eq!(dir.request_neighbours(1, 1).len(), 1);

        assert!(dir.deregister(&b));
        assert!(dir.resolve_by_coordinate_range(0, 0, 2, 2).is_empty());
    }

    #[test]
    fn neighbours_with_unresolvable_hosts_are_skipped() {
        let dir = directory(Recording::live()).with_resolver(Arc::new(NoDns));
        dir.register(region("A", 5, 5)).unwrap();
        dir.register(region("B", 5, 6)).unwrap();
        assert!(dir.request_neighbours(5, 5).is_empty());
    }

    #[test]
    fn unreachable_authority_yields_empty_range() {
        let dir = directory(Recording::dead());
        assert!(dir.request_neighbours(5, 5).is_empty());
        assert!(dir.request_map_blocks(0, 0, 10, 10).is_empty());
        assert!(dir.resolve_named_regions("x", 5).is_empty());
    }

    #[test]
    fn map_blocks_accept_reversed_bounds() {
        let dir = directory(Recording::live());
        dir.register(region("A", 10, 10)).unwrap();
        dir.register(region("B", 12, 11)).unwrap();
        dir.register(region("Far", 40, 40)).unwrap();
        let mut names: Vec<_> = dir
            .request_map_blocks(13, 12, 9, 9)
            .into_iter()
            .map(|b| b.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn named_search_respects_limit() {
        let dir = directory(Recording::live());
        for i in 0..4 {
            dir.register(region(&format!("Sandbox {i}"), i, 0)).unwrap();
        }
        assert_eq!(dir.resolve_named_regions("sandbox", 3).len(), 3);
        assert_eq!(dir.resolve_named_regions("sandbox", 10).len(), 4);
        assert!(dir.resolve_named_regions("nowhere", 10).is_empty());
    }

    #[test]
    fn accepted_banlines_queue_nothing() {
        let dir = directory(Recording::live());
        dir.register(region("A", 1, 1)).unwrap();
        assert!(dir.take_grid_settings().is_empty());
    }

    #[test]
    fn refused_banlines_are_queued_once() {
        let authority = Arc::new(Recording {
            inner: Some(StandaloneAuthority::new().with_forceful_banlines(false)),
            calls: Mutex::new(Vec::new()),
        });
        let dir = directory(authority);
        dir.register(region("A", 1, 1)).unwrap();
        assert_eq!(
            dir.take_grid_settings(),
            vec![("allow_forceful_banlines".to_string(), "FALSE".to_string())]
        );
        assert!(dir.take_grid_settings().is_empty());
    }

    #[test]
    fn lowercase_true_counts_as_refusal() {
        let dir = directory(Arc::new(Garbled::answering("allow_forceful_banlines", "true")));
        dir.register(region("A", 1, 1)).unwrap();
        assert_eq!(
            dir.take_grid_settings(),
            vec![("allow_forceful_banlines".to_string(), "FALSE".to_string())]
        );
    }

    #[test]
    fn out_of_range_answer_resolves_to_nothing() {
        let dir = directory(Arc::new(Garbled::answering("region_locx", "20000000")));
        assert!(dir.resolve_by_handle(RegionHandle::from_location(1, 1)).is_none());
        assert!(dir.resolve_by_name("Faraway").is_none());
    }

    #[test]
    fn out_of_range_region_is_not_registered() {
        let authority = Recording::live();
        let dir = directory(authority.clone());
        let err = dir.register(region("Faraway", 20_000_000, 1)).unwrap_err();
        assert!(matches!(err, RegistrationError::Rejected { .. }));
        assert_eq!(authority.count("register_region"), 0);
    }
}

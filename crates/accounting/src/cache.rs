use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use worldgrid_common::{LandData, ParcelId, UserId};
use worldgrid_scene::{LandView, SceneEvent, SceneObject, SceneView};

use crate::counts::{ParcelCounts, classify};

/// Derived tables plus the taint flag that guards them.
#[derive(Debug)]
struct Tables {
    tainted: bool,
    parcels: HashMap<ParcelId, ParcelCounts>,
    /// Parcel to parcel owner, captured at the last recount.
    owners: HashMap<ParcelId, UserId>,
    /// Parcel owner to parts across every parcel that owner holds.
    simwide: HashMap<UserId, usize>,
}

impl Tables {
    fn tainted() -> Self {
        Self {
            tainted: true,
            parcels: HashMap::new(),
            owners: HashMap::new(),
            simwide: HashMap::new(),
        }
    }
}

/// Tainted, lazily recomputed per-parcel object counts.
///
/// Starts tainted. While clean, added objects are folded in incrementally;
/// removals are not reversed in place and only take effect at the next full
/// recount. Any read on a tainted cache rebuilds everything from the scene
/// and land views under the same lock that guards the taint flag.
///
/// Scene owners must notify the cache after releasing their own scene lock;
/// a recount takes the scene's read lock while holding the cache lock.
pub struct ParcelAccountingCache {
    scene: Arc<dyn SceneView>,
    land: Arc<dyn LandView>,
    tables: Mutex<Tables>,
}

impl std::fmt::Debug for ParcelAccountingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParcelAccountingCache")
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}

impl ParcelAccountingCache {
    pub fn new(scene: Arc<dyn SceneView>, land: Arc<dyn LandView>) -> Self {
        Self {
            scene,
            land,
            tables: Mutex::new(Tables::tainted()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lock the tables, rebuilding them first if tainted.
    fn clean(&self) -> MutexGuard<'_, Tables> {
        let mut tables = self.lock();
        if tables.tainted {
            self.recount(&mut tables);
        }
        tables
    }

    pub fn is_tainted(&self) -> bool {
        self.lock().tainted
    }

    /// Mark every parcel stale.
    pub fn taint(&self) {
        self.lock().tainted = true;
    }

    /// Mark one parcel stale. Taint is region-wide, so this taints everything.
    pub fn taint_parcel(&self, land: &LandData) {
        tracing::trace!(parcel = %land.global_id, "parcel tainted");
        self.taint();
    }

    /// Mark the parcel at `(x, y)` stale. Taint is region-wide.
    pub fn taint_at(&self, x: f32, y: f32) {
        tracing::trace!(x, y, "parcel tainted by position");
        self.taint();
    }

    /// An object group entered the scene.
    pub fn add_object(&self, object: &SceneObject) {
        let mut tables = self.lock();
        // A tainted cache recounts on the next read anyway.
        if !tables.tainted {
            add_to_tables(self.land.as_ref(), &mut tables, object);
        }
    }

    /// An object group is leaving the scene.
    ///
    /// Removal is not reversed incrementally; the counts keep including the
    /// object until the next recount.
    pub fn remove_object(&self, object: &SceneObject) {
        let tables = self.lock();
        if !tables.tainted {
            tracing::trace!(object = %object.id, "removal deferred to next recount");
        }
    }

    /// Fold a scene event into the cache.
    pub fn apply_event(&self, event: &SceneEvent) {
        match event {
            SceneEvent::ObjectAdded(object) => self.add_object(object),
            SceneEvent::ObjectRemoved(object) => self.remove_object(object),
            SceneEvent::ObjectMoved { new, .. } => self.taint_at(new.x, new.y),
        }
    }

    pub fn owner_count(&self, parcel: ParcelId) -> usize {
        self.clean().parcels.get(&parcel).map_or(0, |c| c.owner)
    }

    pub fn group_count(&self, parcel: ParcelId) -> usize {
        self.clean().parcels.get(&parcel).map_or(0, |c| c.group)
    }

    pub fn others_count(&self, parcel: ParcelId) -> usize {
        self.clean().parcels.get(&parcel).map_or(0, |c| c.others)
    }

    /// Parts contributed to `parcel` by objects owned by `user`.
    pub fn user_count(&self, parcel: ParcelId, user: UserId) -> usize {
        self.clean()
            .parcels
            .get(&parcel)
            .and_then(|c| c.users.get(&user).copied())
            .unwrap_or(0)
    }

    /// Parts across every parcel held by the owner of `parcel`.
    pub fn simulator_count(&self, parcel: ParcelId) -> usize {
        let tables = self.clean();
        tables
            .owners
            .get(&parcel)
            .and_then(|owner| tables.simwide.get(owner).copied())
            .unwrap_or(0)
    }

    /// Copy of the counts for one parcel, if the parcel is known.
    pub fn parcel_counts(&self, parcel: ParcelId) -> Option<ParcelCounts> {
        self.clean().parcels.get(&parcel).cloned()
    }

    /// Copy of every parcel's counts, ordered by parcel id.
    pub fn snapshot(&self) -> BTreeMap<ParcelId, ParcelCounts> {
        self.clean()
            .parcels
            .iter()
            .map(|(id, counts)| (*id, counts.clone()))
            .collect()
    }

    /// Force a full rebuild now.
    pub fn recount_now(&self) {
        let mut tables = self.lock();
        self.recount(&mut tables);
    }

    /// Borrowed view of one parcel's counts.
    pub fn prim_counts(&self, parcel: ParcelId) -> PrimCounts<'_> {
        PrimCounts {
            cache: self,
            parcel,
        }
    }

    fn recount(&self, tables: &mut Tables) {
        let _span = tracing::info_span!("parcel_recount").entered();
        tables.parcels.clear();
        tables.owners.clear();
        tables.simwide.clear();

        for land in self.land.all_parcels() {
            tables.owners.insert(land.global_id, land.owner_id);
            tables.simwide.insert(land.owner_id, 0);
            tables.parcels.insert(land.global_id, ParcelCounts::default());
        }

        let mut objects = 0usize;
        self.scene.for_each_object(&mut |object| {
            objects += 1;
            add_to_tables(self.land.as_ref(), tables, object);
        });

        tables.tainted = false;
        tracing::debug!(parcels = tables.parcels.len(), objects, "parcel counts rebuilt");
    }
}

/// Fold one object into the tables. Caller holds the table lock.
fn add_to_tables(land_view: &dyn LandView, tables: &mut Tables, object: &SceneObject) {
    if !object.is_countable() {
        return;
    }
    let Some(land) = land_view.parcel_at(object.position.x, object.position.y) else {
        return;
    };
    // Unknown parcels are picked up by the next recount.
    let Some(counts) = tables.parcels.get_mut(&land.global_id) else {
        return;
    };
    let parts = object.part_count;
    let bucket = classify(&land, object);
    counts.add(bucket, object.owner_id, parts);
    *tables.simwide.entry(land.owner_id).or_insert(0) += parts;
    tracing::trace!(object = %object.id, parcel = %land.global_id, ?bucket, parts, "object counted");
}

/// Per-parcel view over a [`ParcelAccountingCache`]. Every read honours taint.
#[derive(Debug, Clone, Copy)]
pub struct PrimCounts<'a> {
    cache: &'a ParcelAccountingCache,
    parcel: ParcelId,
}

impl PrimCounts<'_> {
    pub fn parcel(&self) -> ParcelId {
        self.parcel
    }

    pub fn owner(&self) -> usize {
        self.cache.owner_count(self.parcel)
    }

    pub fn group(&self) -> usize {
        self.cache.group_count(self.parcel)
    }

    pub fn others(&self) -> usize {
        self.cache.others_count(self.parcel)
    }

    pub fn simulator(&self) -> usize {
        self.cache.simulator_count(self.parcel)
    }

    pub fn user(&self, user: UserId) -> usize {
        self.cache.user_count(self.parcel, user)
    }

    pub fn total(&self) -> usize {
        self.cache.parcel_counts(self.parcel).map_or(0, |c| c.total())
    }
}

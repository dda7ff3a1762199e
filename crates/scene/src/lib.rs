//! Region scene and land channel.
//!
//! The scene owns the live object groups of one region; the land channel owns
//! its parcel layout. Both are exposed to derived-state consumers through the
//! read-only [`SceneView`] and [`LandView`] traits.
//!
//! # Invariants
//! - Every scene mutation produces an event record.
//! - Every point inside the region belongs to exactly one parcel.
//! - Callers notify derived-state consumers after releasing any scene lock.

mod land;
mod scene;

pub use land::{CELL_SIZE, CELLS_PER_EDGE, LandChannel};
pub use scene::{Scene, SceneEvent, SceneObject};

use std::sync::RwLock;
use worldgrid_common::LandData;

/// Errors from scene and land mutations.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("object {0} not found")]
    ObjectNotFound(worldgrid_common::ObjectId),
    #[error("parcel {0} not found")]
    ParcelNotFound(worldgrid_common::ParcelId),
    #[error("parcel {0} already exists")]
    DuplicateParcel(worldgrid_common::ParcelId),
    #[error("rectangle ({x0},{y0})..({x1},{y1}) does not lie inside the region")]
    OutOfBounds { x0: f32, y0: f32, x1: f32, y1: f32 },
}

/// Read access to the live objects of a region.
pub trait SceneView: Send + Sync {
    /// Visit every live object group exactly once.
    fn for_each_object(&self, f: &mut dyn FnMut(&SceneObject));
}

/// Read access to the parcel layout of a region.
pub trait LandView: Send + Sync {
    /// Parcel covering region-local position `(x, y)`; positions outside the
    /// region are clamped to its edge.
    fn parcel_at(&self, x: f32, y: f32) -> Option<LandData>;

    /// Every parcel currently defined in the region.
    fn all_parcels(&self) -> Vec<LandData>;
}

impl SceneView for RwLock<Scene> {
    fn for_each_object(&self, f: &mut dyn FnMut(&SceneObject)) {
        let scene = self.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        scene.for_each_object(f);
    }
}

impl LandView for RwLock<LandChannel> {
    fn parcel_at(&self, x: f32, y: f32) -> Option<LandData> {
        let land = self.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        land.parcel_at(x, y).cloned()
    }

    fn all_parcels(&self) -> Vec<LandData> {
        let land = self.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        land.parcels().cloned().collect()
    }
}

use glam::Vec3;
use std::collections::BTreeMap;
use worldgrid_common::{LandData, ParcelId, REGION_SIZE, UserId};

use crate::SceneError;

/// Edge length of one land cell in metres.
pub const CELL_SIZE: f32 = 4.0;

/// Number of land cells along each region edge.
pub const CELLS_PER_EDGE: usize = (REGION_SIZE as usize) / (CELL_SIZE as usize);

/// Parcel layout of one region.
///
/// The region is divided into a fixed grid of `CELL_SIZE` metre cells, each
/// owned by exactly one parcel. Parcel area and bounding box are derived from
/// the cells and refreshed on every layout change.
#[derive(Debug, Clone)]
pub struct LandChannel {
    parcels: BTreeMap<ParcelId, LandData>,
    cells: Vec<ParcelId>,
}

impl LandChannel {
    /// A region covered by a single parcel owned by `owner`.
    pub fn new(owner: UserId) -> Self {
        Self::with_parcel(LandData::new(ParcelId::new(), owner))
    }

    /// A region covered entirely by `land`.
    pub fn with_parcel(land: LandData) -> Self {
        let id = land.global_id;
        let mut channel = Self {
            parcels: BTreeMap::from([(id, land)]),
            cells: vec![id; CELLS_PER_EDGE * CELLS_PER_EDGE],
        };
        channel.refresh_extents();
        channel
    }

    /// Cell containing region-local position `(x, y)`, clamped to the region.
    pub fn position_to_cell(x: f32, y: f32) -> (usize, usize) {
        let clamp = |v: f32| {
            let c = (v / CELL_SIZE).floor();
            if c.is_nan() || c < 0.0 {
                0
            } else {
                (c as usize).min(CELLS_PER_EDGE - 1)
            }
        };
        (clamp(x), clamp(y))
    }

    pub fn parcel_at(&self, x: f32, y: f32) -> Option<&LandData> {
        let (cx, cy) = Self::position_to_cell(x, y);
        self.parcels.get(&self.cells[cy * CELLS_PER_EDGE + cx])
    }

    pub fn parcel(&self, id: ParcelId) -> Option<&LandData> {
        self.parcels.get(&id)
    }

    pub fn parcels(&self) -> impl Iterator<Item = &LandData> {
        self.parcels.values()
    }

    pub fn parcel_count(&self) -> usize {
        self.parcels.len()
    }

    /// Replace the settings of an existing parcel (ownership, sale state, ...).
    ///
    /// Area and bounding box stay derived from the layout.
    pub fn update_parcel(&mut self, land: LandData) -> Result<(), SceneError> {
        let existing = self
            .parcels
            .get_mut(&land.global_id)
            .ok_or(SceneError::ParcelNotFound(land.global_id))?;
        let (area, aabb_min, aabb_max) = (existing.area, existing.aabb_min, existing.aabb_max);
        *existing = LandData {
            area,
            aabb_min,
            aabb_max,
            ..land
        };
        Ok(())
    }

    /// Carve the rectangle `(x0, y0)..(x1, y1)` (metres) out of whatever
    /// parcels cover it and assign it to `land`. Parcels left without any
    /// cell disappear.
    pub fn subdivide(
        &mut self,
        land: LandData,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
    ) -> Result<(), SceneError> {
        let edge = REGION_SIZE as f32;
        if !(0.0..edge).contains(&x0) || !(0.0..edge).contains(&y0) || x1 <= x0 || y1 <= y0 || x1 > edge || y1 > edge {
            return Err(SceneError::OutOfBounds { x0, y0, x1, y1 });
        }
        if self.parcels.contains_key(&land.global_id) {
            return Err(SceneError::DuplicateParcel(land.global_id));
        }
        let (cx0, cy0) = Self::position_to_cell(x0, y0);
        let cx1 = ((x1 / CELL_SIZE).ceil() as usize).min(CELLS_PER_EDGE);
        let cy1 = ((y1 / CELL_SIZE).ceil() as usize).min(CELLS_PER_EDGE);

        let id = land.global_id;
        for cy in cy0..cy1 {
            for cx in cx0..cx1 {
                self.cells[cy * CELLS_PER_EDGE + cx] = id;
            }
        }
        self.parcels.insert(id, land);
        self.refresh_extents();
        tracing::debug!(parcel = %id, parcels = self.parcels.len(), "subdivided land");
        Ok(())
    }

    fn refresh_extents(&mut self) {
        let mut extents: BTreeMap<ParcelId, (usize, (usize, usize), (usize, usize))> = BTreeMap::new();
        for (i, id) in self.cells.iter().enumerate() {
            let (cx, cy) = (i % CELLS_PER_EDGE, i / CELLS_PER_EDGE);
            let entry = extents.entry(*id).or_insert((0, (cx, cy), (cx, cy)));
            entry.0 += 1;
            entry.1 = (entry.1.0.min(cx), entry.1.1.min(cy));
            entry.2 = (entry.2.0.max(cx), entry.2.1.max(cy));
        }
        self.parcels.retain(|id, _| extents.contains_key(id));
        for (id, (count, min, max)) in extents {
            if let Some(land) = self.parcels.get_mut(&id) {
                land.area = (count as f32 * CELL_SIZE * CELL_SIZE) as i32;
                land.aabb_min = Vec3::new(min.0 as f32 * CELL_SIZE, min.1 as f32 * CELL_SIZE, 0.0);
                land.aabb_max = Vec3::new(
                    (max.0 + 1) as f32 * CELL_SIZE,
                    (max.1 + 1) as f32 * CELL_SIZE,
                    0.0,
                );
            }
        }
    }
}

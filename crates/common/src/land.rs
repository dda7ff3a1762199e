use glam::Vec3;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::fields::{FieldError, Fields, field_str, field_uuid, field_value, format_vec3, parse_vec3};
use crate::types::{GroupId, ParcelId, UserId};

/// Ownership and settings of one parcel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandData {
    pub global_id: ParcelId,
    pub name: String,
    pub description: String,
    pub owner_id: UserId,
    pub group_id: GroupId,
    pub is_group_owned: bool,
    pub area: i32,
    pub auction_id: u32,
    pub flags: u32,
    pub sale_price: i32,
    pub snapshot_id: Uuid,
    pub aabb_min: Vec3,
    pub aabb_max: Vec3,
    pub user_location: Vec3,
}

impl Default for LandData {
    fn default() -> Self {
        Self {
            global_id: ParcelId::NIL,
            name: "Your Parcel".into(),
            description: String::new(),
            owner_id: UserId::NIL,
            group_id: GroupId::NIL,
            is_group_owned: false,
            area: 0,
            auction_id: 0,
            flags: 0,
            sale_price: 0,
            snapshot_id: Uuid::nil(),
            aabb_min: Vec3::ZERO,
            aabb_max: Vec3::ZERO,
            user_location: Vec3::ZERO,
        }
    }
}

impl LandData {
    pub fn new(global_id: ParcelId, owner_id: UserId) -> Self {
        Self {
            global_id,
            owner_id,
            ..Self::default()
        }
    }

    /// Flatten into the string fields answered to a remote parcel query.
    ///
    /// Only the subset needed to describe a parcel to another region is sent;
    /// group ownership stays local.
    pub fn to_fields(&self) -> Fields {
        let mut f = Fields::new();
        let mut put = |k: &str, v: String| {
            f.insert(k.to_string(), Value::String(v));
        };
        put("AABBMax", format_vec3(self.aabb_max));
        put("AABBMin", format_vec3(self.aabb_min));
        put("Area", self.area.to_string());
        put("AuctionID", self.auction_id.to_string());
        put("Description", self.description.clone());
        put("Flags", self.flags.to_string());
        put("GlobalID", self.global_id.to_string());
        put("Name", self.name.clone());
        put("OwnerID", self.owner_id.to_string());
        put("SalePrice", self.sale_price.to_string());
        put("SnapshotID", self.snapshot_id.to_string());
        put("UserLocation", format_vec3(self.user_location));
        f
    }

    /// Rebuild a parcel record from a remote answer. Every field is required.
    pub fn from_fields(f: &Fields) -> Result<Self, FieldError> {
        let vec = |key: &str| -> Result<Vec3, FieldError> {
            let raw = field_str(f, key)?;
            parse_vec3(raw).ok_or_else(|| FieldError::Invalid {
                field: key.to_string(),
                value: raw.to_string(),
            })
        };
        Ok(Self {
            aabb_max: vec("AABBMax")?,
            aabb_min: vec("AABBMin")?,
            area: field_value(f, "Area")?,
            auction_id: field_value(f, "AuctionID")?,
            description: field_str(f, "Description")?.to_string(),
            flags: field_value(f, "Flags")?,
            global_id: ParcelId(field_uuid(f, "GlobalID")?),
            name: field_str(f, "Name")?.to_string(),
            owner_id: UserId(field_uuid(f, "OwnerID")?),
            sale_price: field_value(f, "SalePrice")?,
            snapshot_id: field_uuid(f, "SnapshotID")?,
            user_location: vec("UserLocation")?,
            ..Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parcel() -> LandData {
        LandData {
            name: "Harbour".into(),
            description: "Docks".into(),
            area: 4096,
            sale_price: 250,
            aabb_min: Vec3::new(0.0, 0.0, 0.0),
            aabb_max: Vec3::new(64.0, 64.0, 0.0),
            user_location: Vec3::new(10.0, 12.5, 22.0),
            ..LandData::new(ParcelId::new(), UserId::new())
        }
    }

    #[test]
    fn flattened_parcel_parses_back() {
        let land = parcel();
        let parsed = LandData::from_fields(&land.to_fields()).unwrap();
        assert_eq!(parsed, land);
    }

    #[test]
    fn missing_field_rejects_record() {
        let mut f = parcel().to_fields();
        f.remove("OwnerID");
        assert_eq!(
            LandData::from_fields(&f),
            Err(FieldError::Missing("OwnerID".into()))
        );
    }

    #[test]
    fn garbled_vector_rejects_record() {
        let mut f = parcel().to_fields();
        f.insert("AABBMax".into(), Value::String("<1, 2>".into()));
        assert!(matches!(
            LandData::from_fields(&f),
            Err(FieldError::Invalid { .. })
        ));
    }
}

//! Shared grid types: identifiers, region handles, region descriptors and
//! parcel records exchanged between regions and the grid authority.
//!
//! # Invariants
//! - A region handle is a pure, injective function of grid coordinates.
//! - Flat field maps are validated field by field; a missing field is an error, never a default.

pub mod duration_secs;
mod error;
mod fields;
mod land;
mod region;
mod types;

pub use error::ErrorKind;
pub use fields::{
    FieldError, Fields, field_location, field_str, field_uuid, field_value, format_vec3, parse_vec3,
};
pub use land::LandData;
pub use region::{Endpoint, MAX_LOCATION, MapBlock, REGION_SIZE, RegionDescriptor, RegionHandle};
pub use types::{AgentId, GroupId, ObjectId, ParcelId, RegionId, UserId};

//! Flat request/response maps.
//!
//! Grid-authority and peer answers arrive as flat maps whose values are
//! usually strings (numbers are sometimes sent unquoted). Every accessor here
//! fails closed: a missing or unparsable field is an error, never a default.

use glam::Vec3;
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

use crate::region::RegionHandle;

/// A flat field map, as carried on the wire.
pub type Fields = serde_json::Map<String, Value>;

/// A field was absent or could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("missing field `{0}`")]
    Missing(String),
    #[error("field `{field}` has invalid value `{value}`")]
    Invalid { field: String, value: String },
}

/// Borrow a string field.
pub fn field_str<'a>(fields: &'a Fields, key: &str) -> Result<&'a str, FieldError> {
    match fields.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(FieldError::Invalid {
            field: key.to_string(),
            value: other.to_string(),
        }),
        None => Err(FieldError::Missing(key.to_string())),
    }
}

/// Parse a field that may be sent either as a string or as a bare JSON scalar.
pub fn field_value<T: FromStr>(fields: &Fields, key: &str) -> Result<T, FieldError> {
    let raw = match fields.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => {
            return Err(FieldError::Invalid {
                field: key.to_string(),
                value: other.to_string(),
            });
        }
        None => return Err(FieldError::Missing(key.to_string())),
    };
    raw.parse().map_err(|_| FieldError::Invalid {
        field: key.to_string(),
        value: raw,
    })
}

/// Parse a UUID field.
pub fn field_uuid(fields: &Fields, key: &str) -> Result<Uuid, FieldError> {
    let raw = field_str(fields, key)?;
    Uuid::parse_str(raw.trim()).map_err(|_| FieldError::Invalid {
        field: key.to_string(),
        value: raw.to_string(),
    })
}

/// Parse a pair of grid coordinates, rejecting any that would not map to a
/// distinct region handle.
pub fn field_location(fields: &Fields, x_key: &str, y_key: &str) -> Result<(u32, u32), FieldError> {
    let x: u32 = field_value(fields, x_key)?;
    let y: u32 = field_value(fields, y_key)?;
    let out_of_range = |key: &str, value: u32| FieldError::Invalid {
        field: key.to_string(),
        value: value.to_string(),
    };
    match RegionHandle::try_from_location(x, y) {
        Some(_) => Ok((x, y)),
        None if RegionHandle::try_from_location(x, 0).is_none() => Err(out_of_range(x_key, x)),
        None => Err(out_of_range(y_key, y)),
    }
}

/// Format a vector the way the grid protocol does: `<x, y, z>`.
pub fn format_vec3(v: Vec3) -> String {
    format!("<{}, {}, {}>", v.x, v.y, v.z)
}

/// Parse `<x, y, z>` (angle brackets optional).
pub fn parse_vec3(s: &str) -> Option<Vec3> {
    let inner = s.trim().trim_start_matches('<').trim_end_matches('>');
    let mut parts = inner.split(',').map(|p| p.trim().parse::<f32>());
    let x = parts.next()?.ok()?;
    let y = parts.next()?.ok()?;
    let z = parts.next()?.ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(Vec3::new(x, y, z))
}

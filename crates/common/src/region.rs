use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{RegionId, UserId};

/// Edge length of a region in metres. Grid coordinates are in region units.
pub const REGION_SIZE: u32 = 256;

/// Largest grid coordinate for which the handle encoding stays injective.
pub const MAX_LOCATION: u32 = u32::MAX / REGION_SIZE;

/// Topology key derived from a region's grid coordinates.
///
/// Encodes the region's world-space origin in metres: the X origin in the
/// high 32 bits, the Y origin in the low 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionHandle(pub u64);

impl RegionHandle {
    /// Handle for grid location `(x, y)`.
    ///
    /// Coordinates above [`MAX_LOCATION`] would overlap neighbouring bits; use
    /// [`RegionHandle::try_from_location`] when the input is untrusted.
    pub fn from_location(x: u32, y: u32) -> Self {
        debug_assert!(x <= MAX_LOCATION && y <= MAX_LOCATION);
        let x = u64::from(x) * u64::from(REGION_SIZE);
        let y = u64::from(y) * u64::from(REGION_SIZE);
        Self((x << 32) | (y & 0xffff_ffff))
    }

    /// Checked variant of [`RegionHandle::from_location`].
    pub fn try_from_location(x: u32, y: u32) -> Option<Self> {
        (x <= MAX_LOCATION && y <= MAX_LOCATION).then(|| Self::from_location(x, y))
    }

    /// Grid coordinates this handle was derived from.
    pub fn to_location(self) -> (u32, u32) {
        let x = (self.0 >> 32) as u32 / REGION_SIZE;
        let y = (self.0 & 0xffff_ffff) as u32 / REGION_SIZE;
        (x, y)
    }
}

impl std::fmt::Display for RegionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RegionHandle {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// A host and port pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Everything another process needs to know to reach a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDescriptor {
    pub region_id: RegionId,
    pub name: String,
    pub loc_x: u32,
    pub loc_y: u32,
    /// Simulator endpoint the region listens on for clients.
    pub internal: Endpoint,
    /// Externally advertised host name; shares the internal port.
    pub external_host: String,
    /// Endpoint of the peer-to-peer RPC listener.
    pub peer_rpc: Endpoint,
    pub http_port: u16,
    pub secret: String,
    pub master_avatar: UserId,
    pub map_image_id: Uuid,
    pub origin_id: RegionId,
    pub server_uri: String,
}

impl RegionDescriptor {
    pub const DEFAULT_SIM_PORT: u16 = 9000;
    pub const DEFAULT_PEER_RPC_PORT: u16 = 8895;
    pub const DEFAULT_HTTP_PORT: u16 = 9000;

    /// A descriptor with every endpoint on `host` and default ports.
    pub fn new(region_id: RegionId, name: impl Into<String>, loc_x: u32, loc_y: u32, host: &str) -> Self {
        Self {
            region_id,
            name: name.into(),
            loc_x,
            loc_y,
            internal: Endpoint::new(host, Self::DEFAULT_SIM_PORT),
            external_host: host.to_string(),
            peer_rpc: Endpoint::new(host, Self::DEFAULT_PEER_RPC_PORT),
            http_port: Self::DEFAULT_HTTP_PORT,
            secret: String::new(),
            master_avatar: UserId::NIL,
            map_image_id: Uuid::nil(),
            origin_id: region_id,
            server_uri: format!("http://{host}:{}", Self::DEFAULT_HTTP_PORT),
        }
    }

    pub fn handle(&self) -> RegionHandle {
        RegionHandle::from_location(self.loc_x, self.loc_y)
    }

    /// Base URL of the region's HTTP listener on its external host.
    pub fn http_url(&self) -> String {
        format!("http://{}:{}/", self.external_host, self.http_port)
    }
}

/// One entry of a map-block query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapBlock {
    pub x: u16,
    pub y: u16,
    pub name: String,
    pub access: u8,
    pub region_flags: u32,
    pub water_height: u8,
    pub map_image_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn handle_is_deterministic() {
        assert_eq!(
            RegionHandle::from_location(1000, 1000),
            RegionHandle::from_location(1000, 1000)
        );
        assert_eq!(RegionHandle::from_location(1000, 1000).0, 1_099_511_628_032_000);
    }

    #[test]
    fn handle_is_injective_over_grid() {
        let mut seen = HashSet::new();
        for x in (0..4000).step_by(97) {
            for y in (0..4000).step_by(89) {
                assert!(seen.insert(RegionHandle::from_location(x, y)), "collision at {x},{y}");
            }
        }
        assert!(seen.insert(RegionHandle::from_location(MAX_LOCATION, 0)));
        assert!(seen.insert(RegionHandle::from_location(0, MAX_LOCATION)));
        assert!(seen.insert(RegionHandle::from_location(MAX_LOCATION, MAX_LOCATION)));
    }

    #[test]
    fn handle_inverts_to_location() {
        for (x, y) in [(0, 0), (1, 2), (1000, 1001), (MAX_LOCATION, 7)] {
            assert_eq!(RegionHandle::from_location(x, y).to_location(), (x, y));
        }
    }

    #[test]
    fn out_of_range_location_rejected() {
        assert!(RegionHandle::try_from_location(MAX_LOCATION + 1, 0).is_none());
        assert!(RegionHandle::try_from_location(0, MAX_LOCATION).is_some());
    }

    #[test]
    fn descriptor_handle_matches_location() {
        let d = RegionDescriptor::new(RegionId::new(), "Alpha", 1000, 1001, "10.0.0.1");
        assert_eq!(d.handle(), RegionHandle::from_location(1000, 1001));
        assert_eq!(d.http_url(), "http://10.0.0.1:9000/");
        assert_eq!(d.peer_rpc.to_string(), "10.0.0.1:8895");
    }
}

//! Field layouts exchanged with the grid authority.

use serde_json::Value;
use worldgrid_common::{
    Endpoint, FieldError, Fields, MapBlock, RegionDescriptor, RegionId, field_location, field_str,
    field_uuid, field_value,
};

/// Parameters of a `register_region` request.
pub fn registration_fields(region: &RegionDescriptor, send_key: &str, recv_key: &str) -> Fields {
    let mut f = Fields::new();
    let mut put = |k: &str, v: String| {
        f.insert(k.to_string(), Value::String(v));
    };
    put("auth_key", send_key.to_string());
    put("recv_key", recv_key.to_string());
    put("region_id", region.region_id.to_string());
    put("sim_ip", region.external_host.clone());
    put("sim_port", region.internal.port.to_string());
    put("region_locx", region.loc_x.to_string());
    put("region_locy", region.loc_y.to_string());
    put("sim_name", region.name.clone());
    put("http_port", region.http_port.to_string());
    put("peer_rpc_port", region.peer_rpc.port.to_string());
    put("map_image_id", region.map_image_id.to_string());
    put("origin_id", region.origin_id.to_string());
    put("server_uri", region.server_uri.clone());
    put("region_secret", region.secret.clone());
    put("master_avatar_uuid", region.master_avatar.to_string());
    f
}

/// Read a descriptor from an answer, every key carrying `prefix`.
///
/// `http_port` is optional (older authorities omit it); every other field is
/// required.
pub fn descriptor_from_fields(f: &Fields, prefix: &str) -> Result<RegionDescriptor, FieldError> {
    let key = |k: &str| format!("{prefix}{k}");
    let host = field_str(f, &key("sim_ip"))?.to_string();
    let (loc_x, loc_y) = field_location(f, &key("region_locx"), &key("region_locy"))?;
    let sim_port: u16 = field_value(f, &key("sim_port"))?;
    let peer_rpc_port: u16 = field_value(f, &key("peer_rpc_port"))?;
    let http_port = match field_value::<u16>(f, &key("http_port")) {
        Ok(port) => port,
        Err(FieldError::Missing(_)) => RegionDescriptor::DEFAULT_HTTP_PORT,
        Err(e) => return Err(e),
    };
    let region_id = RegionId(field_uuid(f, &key("region_uuid"))?);
    let name = field_str(f, &key("region_name"))?.to_string();
    let map_image_id = field_uuid(f, &key("map_uuid"))?;

    Ok(RegionDescriptor {
        region_id,
        name,
        loc_x,
        loc_y,
        internal: Endpoint::new(host.clone(), sim_port),
        peer_rpc: Endpoint::new(host.clone(), peer_rpc_port),
        http_port,
        secret: String::new(),
        master_avatar: Default::default(),
        map_image_id,
        origin_id: region_id,
        server_uri: format!("http://{host}:{http_port}"),
        external_host: host,
    })
}

/// Inverse of [`descriptor_from_fields`], used by authorities answering lookups.
pub(crate) fn descriptor_to_fields(region: &RegionDescriptor, prefix: &str, f: &mut Fields) {
    let mut put = |k: &str, v: String| {
        f.insert(format!("{prefix}{k}"), Value::String(v));
    };
    put("sim_ip", region.external_host.clone());
    put("region_locx", region.loc_x.to_string());
    put("region_locy", region.loc_y.to_string());
    put("sim_port", region.internal.port.to_string());
    put("peer_rpc_port", region.peer_rpc.port.to_string());
    put("http_port", region.http_port.to_string());
    put("region_uuid", region.region_id.to_string());
    put("region_name", region.name.clone());
    put("map_uuid", region.map_image_id.to_string());
}

/// One entry of a `map_block_query` answer.
pub(crate) fn map_entry(region: &RegionDescriptor) -> Fields {
    let mut f = Fields::new();
    let mut put = |k: &str, v: String| {
        f.insert(k.to_string(), Value::String(v));
    };
    put("x", region.loc_x.to_string());
    put("y", region.loc_y.to_string());
    put("name", region.name.clone());
    put("access", "13".to_string());
    put("region_flags", "0".to_string());
    put("water_height", "20".to_string());
    put("map_image_id", region.map_image_id.to_string());
    put("sim_ip", region.external_host.clone());
    put("sim_port", region.internal.port.to_string());
    put("peer_rpc_port", region.peer_rpc.port.to_string());
    put("http_port", region.http_port.to_string());
    put("uuid", region.region_id.to_string());
    f
}

/// Descriptor for one neighbour listed in a `map_block_query` answer.
pub(crate) fn neighbour_from_entry(f: &Fields) -> Result<RegionDescriptor, FieldError> {
    let host = field_str(f, "sim_ip")?.to_string();
    let (loc_x, loc_y) = field_location(f, "x", "y")?;
    let sim_port: u16 = field_value(f, "sim_port")?;
    let peer_rpc_port: u16 = field_value(f, "peer_rpc_port")?;
    let region_id = RegionId(field_uuid(f, "uuid")?);
    let http_port = match field_value::<u16>(f, "http_port") {
        Ok(port) => port,
        Err(FieldError::Missing(_)) => RegionDescriptor::DEFAULT_HTTP_PORT,
        Err(e) => return Err(e),
    };
    let name = match field_str(f, "name") {
        Ok(name) => name.to_string(),
        Err(FieldError::Missing(_)) => String::new(),
        Err(e) => return Err(e),
    };
    let map_image_id = match field_uuid(f, "map_image_id") {
        Ok(id) => id,
        Err(FieldError::Missing(_)) => uuid::Uuid::nil(),
        Err(e) => return Err(e),
    };

    let mut region = RegionDescriptor::new(region_id, name, loc_x, loc_y, &host);
    region.internal.port = sim_port;
    region.peer_rpc.port = peer_rpc_port;
    region.http_port = http_port;
    region.map_image_id = map_image_id;
    region.server_uri = format!("http://{host}:{http_port}");
    Ok(region)
}

/// A map tile from a `map_block_query` answer entry.
pub fn map_block_from_fields(f: &Fields) -> Result<MapBlock, FieldError> {
    Ok(MapBlock {
        x: field_value(f, "x")?,
        y: field_value(f, "y")?,
        name: field_str(f, "name")?.to_string(),
        access: field_value(f, "access")?,
        region_flags: field_value(f, "region_flags")?,
        water_height: field_value(f, "water_height")?,
        map_image_id: field_uuid(f, "map_image_id")?,
    })
}

/// Every map entry in an answer. Entries are grouped under arbitrary keys,
/// each holding a list of maps; anything else is ignored.
pub(crate) fn map_entries(answer: &Fields) -> impl Iterator<Item = &Fields> {
    answer
        .values()
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(Value::as_object)
}

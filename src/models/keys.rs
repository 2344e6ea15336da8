//! Tag keys written by association and enrichment.

pub const COUNTRY: &str = "country";
pub const COUNTRY_CODE: &str = "country_code";
pub const STATE: &str = "state";
pub const STATE_CODE: &str = "state_code";
pub const SKI_AREA: &str = "ski_area";

pub const SKI_AREA_ID: &str = "ski_area_id";
pub const SKI_AREA_TYPE: &str = "ski_area_type";
pub const SKI_AREA_NAME: &str = "ski_area_name";
pub const DISTANCE_METERS: &str = "distance_meters";

/// Identity columns written back to GeoJSON properties.
pub const OSM_TYPE: &str = "osm_type";
pub const OSM_ID: &str = "osm_id";

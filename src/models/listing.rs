use serde::{Deserialize, Serialize};

/// A record as it arrives from the search index. The schema is owned
/// upstream, so nothing about its shape is trusted until normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawListing(pub serde_json::Value);

impl From<serde_json::Value> for RawListing {
    fn from(v: serde_json::Value) -> Self {
        Self(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        valid.then_some(Self { lat, lng })
    }
}

/// Canonical listing the matcher operates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub title: String,

    // minor units (cents)
    pub price: Option<i64>,
    pub year: Option<i32>,
    pub location: Option<GeoPoint>,

    // unix millis
    pub source_timestamp: Option<i64>,
}

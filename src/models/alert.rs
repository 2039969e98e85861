use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::listing::GeoPoint;

/// Inclusive year bounds. `None` on either side means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub min: Option<i32>,
    pub max: Option<i32>,
}

impl YearRange {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn contains(&self, year: i32) -> bool {
        self.min.map_or(true, |min| year >= min) && self.max.map_or(true, |max| year <= max)
    }
}

/// The matchable part of an alert, produced by `services::criteria::validate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    pub model_query: String,
    pub year_range: YearRange,

    // minor units (cents)
    pub max_price: Option<i64>,
    pub max_distance_miles: Option<f64>,

    // where distances are measured from; absent => distance filter passes
    pub reference_location: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCriteria {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub owner_id: String,
    pub criteria: Criteria,

    // unix millis
    pub created_at: i64,
}

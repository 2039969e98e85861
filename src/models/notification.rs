use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::listing::Listing;

/// Dedup key. At most one notification is ever emitted per pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub alert_id: ObjectId,
    pub listing_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSummary {
    pub title: String,
    pub price: Option<i64>,
    pub year: Option<i32>,
}

impl From<&Listing> for ListingSummary {
    fn from(l: &Listing) -> Self {
        Self {
            title: l.title.clone(),
            price: l.price,
            year: l.year,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub alert_id: ObjectId,
    pub listing_id: String,
    pub first_matched_at: i64,

    // payload for the sink; may be discarded after handoff
    pub owner_id: String,
    pub listing: ListingSummary,
}

impl NotificationJob {
    pub fn key(&self) -> DedupKey {
        DedupKey {
            alert_id: self.alert_id,
            listing_id: self.listing_id.clone(),
        }
    }
}

/// A job whose delivery attempts were exhausted. Held for external inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub job: NotificationJob,
    pub attempts: u32,
    pub last_error: String,
    pub dead_lettered_at: i64,
}

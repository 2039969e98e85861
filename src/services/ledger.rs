//! Dedup keys and dead letters.
//!
//! `claim` is the only synchronization point between concurrent batches: it
//! atomically records `(alert_id, listing_id)` and reports whether this caller
//! was first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::Database;
use serde::{Deserialize, Serialize};

use crate::{
    error::StoreError,
    models::{DeadLetter, DedupKey},
};

pub const KEYS_COLLECTION: &str = "notification_keys";
pub const DEAD_LETTERS_COLLECTION: &str = "dead_letters";

const DUPLICATE_KEY: i32 = 11000;

#[async_trait]
pub trait NotificationLedger: Send + Sync {
    /// Insert-if-absent. `Ok(true)` means the key is new and the caller owns
    /// the notification.
    async fn claim(&self, key: &DedupKey) -> Result<bool, StoreError>;

    /// Drops every key of a deleted alert.
    async fn release_alert(&self, alert_id: ObjectId) -> Result<(), StoreError>;

    /// Drops keys claimed before `claimed_before` (unix millis) whose alert is
    /// not in `live`. Returns how many were dropped.
    async fn sweep(&self, live: &[ObjectId], claimed_before: i64) -> Result<u64, StoreError>;

    async fn dead_letter(&self, letter: DeadLetter) -> Result<(), StoreError>;

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyDoc {
    alert_id: ObjectId,
    listing_id: String,
    claimed_at: i64,
}

#[derive(Clone)]
pub struct MongoLedger {
    db: Database,
}

impl MongoLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    matches!(
        e.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl NotificationLedger for MongoLedger {
    async fn claim(&self, key: &DedupKey) -> Result<bool, StoreError> {
        let keys = self.db.collection::<KeyDoc>(KEYS_COLLECTION);
        let row = KeyDoc {
            alert_id: key.alert_id,
            listing_id: key.listing_id.clone(),
            claimed_at: chrono::Utc::now().timestamp_millis(),
        };

        // relies on the unique {alert_id, listing_id} index from db_init
        match keys.insert_one(&row, None).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn release_alert(&self, alert_id: ObjectId) -> Result<(), StoreError> {
        self.db
            .collection::<KeyDoc>(KEYS_COLLECTION)
            .delete_many(doc! { "alert_id": alert_id }, None)
            .await?;
        Ok(())
    }

    async fn sweep(&self, live: &[ObjectId], claimed_before: i64) -> Result<u64, StoreError> {
        let res = self
            .db
            .collection::<KeyDoc>(KEYS_COLLECTION)
            .delete_many(
                doc! { "alert_id": { "$nin": live }, "claimed_at": { "$lt": claimed_before } },
                None,
            )
            .await?;
        Ok(res.deleted_count)
    }

    async fn dead_letter(&self, letter: DeadLetter) -> Result<(), StoreError> {
        self.db
            .collection::<DeadLetter>(DEAD_LETTERS_COLLECTION)
            .insert_one(&letter, None)
            .await?;
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, StoreError> {
        let mut cursor = self
            .db
            .collection::<DeadLetter>(DEAD_LETTERS_COLLECTION)
            .find(doc! {}, None)
            .await?;

        let mut items = Vec::new();
        while let Some(res) = cursor.next().await {
            items.push(res?);
        }
        Ok(items)
    }
}

#[derive(Clone, Default)]
pub struct MemoryLedger {
    // key -> claimed_at
    keys: Arc<Mutex<HashMap<DedupKey, i64>>>,
    dead: Arc<Mutex<Vec<DeadLetter>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned<T>(_: T) -> StoreError {
        StoreError::Backend("ledger lock poisoned".into())
    }
}

#[async_trait]
impl NotificationLedger for MemoryLedger {
    async fn claim(&self, key: &DedupKey) -> Result<bool, StoreError> {
        let mut keys = self.keys.lock().map_err(Self::poisoned)?;
        if keys.contains_key(key) {
            return Ok(false);
        }
        keys.insert(key.clone(), chrono::Utc::now().timestamp_millis());
        Ok(true)
    }

    async fn release_alert(&self, alert_id: ObjectId) -> Result<(), StoreError> {
        let mut keys = self.keys.lock().map_err(Self::poisoned)?;
        keys.retain(|k, _| k.alert_id != alert_id);
        Ok(())
    }

    async fn sweep(&self, live: &[ObjectId], claimed_before: i64) -> Result<u64, StoreError> {
        let mut keys = self.keys.lock().map_err(Self::poisoned)?;
        let before = keys.len();
        keys.retain(|k, claimed_at| *claimed_at >= claimed_before || live.contains(&k.alert_id));
        Ok((before - keys.len()) as u64)
    }

    async fn dead_letter(&self, letter: DeadLetter) -> Result<(), StoreError> {
        self.dead.lock().map_err(Self::poisoned)?.push(letter);
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, StoreError> {
        Ok(self.dead.lock().map_err(Self::poisoned)?.clone())
    }
}

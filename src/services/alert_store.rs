use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::options::FindOptions;
use mongodb::Database;
use tokio::sync::RwLock;

use crate::{
    error::StoreError,
    models::{AlertCriteria, Criteria},
};

pub const ALERTS_COLLECTION: &str = "alerts";

/// Durable owner -> alerts mapping. There is no update; callers delete and
/// recreate.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create(&self, owner_id: &str, criteria: Criteria) -> Result<AlertCriteria, StoreError>;

    /// Owner's alerts in insertion order.
    async fn list(&self, owner_id: &str) -> Result<Vec<AlertCriteria>, StoreError>;

    /// `false` when the alert doesn't exist *or* belongs to someone else.
    async fn delete(&self, owner_id: &str, alert_id: ObjectId) -> Result<bool, StoreError>;

    /// Snapshot of every alert, used once per dispatch batch.
    async fn active(&self) -> Result<Vec<AlertCriteria>, StoreError>;
}

fn new_alert(owner_id: &str, criteria: Criteria) -> AlertCriteria {
    AlertCriteria {
        id: ObjectId::new(),
        owner_id: owner_id.to_string(),
        criteria,
        created_at: Utc::now().timestamp_millis(),
    }
}

#[derive(Clone)]
pub struct MongoAlertStore {
    db: Database,
}

impl MongoAlertStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn alerts(&self) -> mongodb::Collection<AlertCriteria> {
        self.db.collection::<AlertCriteria>(ALERTS_COLLECTION)
    }

    async fn find_sorted(&self, filter: mongodb::bson::Document) -> Result<Vec<AlertCriteria>, StoreError> {
        // ObjectIds are monotonic per process, which breaks created_at ties
        let find_opts = FindOptions::builder()
            .sort(doc! { "created_at": 1, "_id": 1 })
            .build();

        let mut cursor = self.alerts().find(filter, find_opts).await?;

        let mut items = Vec::new();
        while let Some(res) = cursor.next().await {
            items.push(res?);
        }
        Ok(items)
    }
}

#[async_trait]
impl AlertStore for MongoAlertStore {
    async fn create(&self, owner_id: &str, criteria: Criteria) -> Result<AlertCriteria, StoreError> {
        let alert = new_alert(owner_id, criteria);
        self.alerts().insert_one(&alert, None).await?;
        Ok(alert)
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<AlertCriteria>, StoreError> {
        self.find_sorted(doc! { "owner_id": owner_id }).await
    }

    async fn delete(&self, owner_id: &str, alert_id: ObjectId) -> Result<bool, StoreError> {
        let res = self
            .alerts()
            .delete_one(doc! { "_id": alert_id, "owner_id": owner_id }, None)
            .await?;
        Ok(res.deleted_count > 0)
    }

    async fn active(&self) -> Result<Vec<AlertCriteria>, StoreError> {
        self.find_sorted(doc! {}).await
    }
}

/// Process-local store for tests and `STORE_BACKEND=memory`. A single lock
/// makes every write linearizable, which covers the per-owner requirement.
#[derive(Clone, Default)]
pub struct MemoryAlertStore {
    alerts: Arc<RwLock<Vec<AlertCriteria>>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn create(&self, owner_id: &str, criteria: Criteria) -> Result<AlertCriteria, StoreError> {
        let alert = new_alert(owner_id, criteria);
        self.alerts.write().await.push(alert.clone());
        Ok(alert)
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<AlertCriteria>, StoreError> {
        let alerts = self.alerts.read().await;
        Ok(alerts.iter().filter(|a| a.owner_id == owner_id).cloned().collect())
    }

    async fn delete(&self, owner_id: &str, alert_id: ObjectId) -> Result<bool, StoreError> {
        let mut alerts = self.alerts.write().await;
        let before = alerts.len();
        alerts.retain(|a| !(a.id == alert_id && a.owner_id == owner_id));
        Ok(alerts.len() != before)
    }

    async fn active(&self) -> Result<Vec<AlertCriteria>, StoreError> {
        Ok(self.alerts.read().await.clone())
    }
}

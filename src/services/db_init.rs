use mongodb::{
    bson::doc,
    options::IndexOptions,
    Database, IndexModel,
};

use crate::error::StoreError;

use super::{
    alert_store::ALERTS_COLLECTION,
    ledger::{DEAD_LETTERS_COLLECTION, KEYS_COLLECTION},
};

pub async fn ensure_indexes(db: &Database) -> Result<(), StoreError> {
    // alerts: list by owner in insertion order
    {
        let col = db.collection::<mongodb::bson::Document>(ALERTS_COLLECTION);
        let model = IndexModel::builder()
            .keys(doc! { "owner_id": 1, "created_at": 1 })
            .build();

        col.create_index(model, None).await?;
    }

    // dedup keys: the unique index is what makes claim() an insert-if-absent
    {
        let col = db.collection::<mongodb::bson::Document>(KEYS_COLLECTION);
        let model = IndexModel::builder()
            .keys(doc! { "alert_id": 1, "listing_id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        col.create_index(model, None).await?;
    }

    // dead letters: looked up per alert when inspecting failures
    {
        let col = db.collection::<mongodb::bson::Document>(DEAD_LETTERS_COLLECTION);
        let model = IndexModel::builder()
            .keys(doc! { "job.alert_id": 1 })
            .build();

        col.create_index(model, None).await?;
    }

    Ok(())
}

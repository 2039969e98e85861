use mongodb::bson::oid::ObjectId;

use crate::{
    error::{AlertError, StoreError},
    events::OwnerEvent,
    models::AlertCriteria,
    AppState,
};

use super::criteria::{self, CreateAlertInput};

pub async fn create_alert(
    state: &AppState,
    owner_id: &str,
    input: &CreateAlertInput,
) -> Result<AlertCriteria, AlertError> {
    // validation runs before anything is written
    let criteria = criteria::validate(input)?;
    let alert = state.alerts.create(owner_id, criteria).await?;

    tracing::info!(owner_id, alert_id = %alert.id.to_hex(), "alert created");
    let _ = state.events_tx.send(OwnerEvent::new(owner_id, "alertsUpdated"));

    Ok(alert)
}

pub async fn list_alerts(state: &AppState, owner_id: &str) -> Result<Vec<AlertCriteria>, StoreError> {
    state.alerts.list(owner_id).await
}

/// `Ok(false)` for both unknown ids and alerts owned by someone else.
pub async fn delete_alert(state: &AppState, owner_id: &str, alert_id: ObjectId) -> Result<bool, StoreError> {
    if !state.alerts.delete(owner_id, alert_id).await? {
        return Ok(false);
    }

    // dedup keys live exactly as long as their alert
    if let Err(e) = state.ledger.release_alert(alert_id).await {
        tracing::warn!(alert_id = %alert_id.to_hex(), "failed to release dedup keys: {}", e);
    }

    tracing::info!(owner_id, alert_id = %alert_id.to_hex(), "alert deleted");
    let _ = state.events_tx.send(OwnerEvent::new(owner_id, "alertsUpdated"));

    Ok(true)
}

/// Parses a client-supplied id. Malformed ids can't name an alert, so they
/// collapse into the same outcome as a missing one.
pub fn parse_alert_id(id: &str) -> Option<ObjectId> {
    ObjectId::parse_str(id.trim()).ok()
}

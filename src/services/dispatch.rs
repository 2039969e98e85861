//! Dispatch coordinator.
//!
//! A batch moves through `RECEIVED -> NORMALIZED -> EVALUATED -> DISPATCHED`.
//! Every normalized listing is evaluated in its own task against one snapshot
//! of the alert store. Matches are claimed in the ledger *before* the sink is
//! called, so a crash between the two loses a notification rather than
//! duplicating it. The evaluation task spawns the delivery for each claim it
//! wins, so a claimed job reaches the sink or the dead letters even when the
//! caller of `dispatch_batch` goes away. Sink calls run in their own tasks so a
//! stalled sink never holds up evaluation of the rest of the batch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use exponential_backoff::Backoff;
use futures_util::stream::{FuturesUnordered, StreamExt};
use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::{
    config::Settings,
    error::{SinkError, StoreError},
    events::OwnerEvent,
    models::{AlertCriteria, DeadLetter, Listing, ListingSummary, NotificationJob, RawListing},
};

use super::{alert_store::AlertStore, ledger::NotificationLedger, matcher, normalizer, sink::NotificationSink};

#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            timeout: Duration::from_secs(5),
            backoff_min: Duration::from_millis(200),
            backoff_max: Duration::from_secs(30),
        }
    }
}

impl DeliveryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.sink_max_attempts.max(1),
            timeout: Duration::from_millis(settings.sink_timeout_ms),
            backoff_min: Duration::from_millis(settings.sink_backoff_min_ms),
            backoff_max: Duration::from_millis(settings.sink_backoff_max_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStage {
    Received,
    Normalized,
    Evaluated,
    Dispatched,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedListing {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingFailure {
    pub listing_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch_id: String,
    pub stage: BatchStage,
    pub received: usize,
    pub normalized: usize,
    pub skipped: Vec<SkippedListing>,
    pub matched: usize,
    pub suppressed: usize,
    pub dispatched: usize,
    pub dead_lettered: usize,
    pub failures: Vec<ListingFailure>,
}

impl BatchReport {
    fn new(batch_id: String, received: usize) -> Self {
        Self {
            batch_id,
            stage: BatchStage::Received,
            received,
            normalized: 0,
            skipped: Vec::new(),
            matched: 0,
            suppressed: 0,
            dispatched: 0,
            dead_lettered: 0,
            failures: Vec::new(),
        }
    }
}

/// Running totals. Missed or delayed notifications show up here even when
/// no user ever sees them.
#[derive(Debug, Default)]
pub struct DispatchStats {
    batches: AtomicU64,
    listings_received: AtomicU64,
    listings_skipped: AtomicU64,
    evaluation_failures: AtomicU64,
    matches: AtomicU64,
    duplicates_suppressed: AtomicU64,
    delivered: AtomicU64,
    delivery_retries: AtomicU64,
    dead_lettered: AtomicU64,
    dead_letter_write_failures: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub batches: u64,
    pub listings_received: u64,
    pub listings_skipped: u64,
    pub evaluation_failures: u64,
    pub matches: u64,
    pub duplicates_suppressed: u64,
    pub delivered: u64,
    pub delivery_retries: u64,
    pub dead_lettered: u64,
    pub dead_letter_write_failures: u64,
}

impl DispatchStats {
    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            batches: get(&self.batches),
            listings_received: get(&self.listings_received),
            listings_skipped: get(&self.listings_skipped),
            evaluation_failures: get(&self.evaluation_failures),
            matches: get(&self.matches),
            duplicates_suppressed: get(&self.duplicates_suppressed),
            delivered: get(&self.delivered),
            delivery_retries: get(&self.delivery_retries),
            dead_lettered: get(&self.dead_lettered),
            dead_letter_write_failures: get(&self.dead_letter_write_failures),
        }
    }
}

struct Inner {
    alerts: Arc<dyn AlertStore>,
    ledger: Arc<dyn NotificationLedger>,
    sink: Arc<dyn NotificationSink>,
    policy: DeliveryPolicy,
    stats: DispatchStats,
    events: Option<broadcast::Sender<OwnerEvent>>,
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Evaluation {
    matched: usize,
    suppressed: usize,
    deliveries: Vec<JoinHandle<Delivery>>,
    failures: Vec<String>,
}

enum Delivery {
    Delivered,
    DeadLettered,
}

impl Dispatcher {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        ledger: Arc<dyn NotificationLedger>,
        sink: Arc<dyn NotificationSink>,
        policy: DeliveryPolicy,
        events: Option<broadcast::Sender<OwnerEvent>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                alerts,
                ledger,
                sink,
                policy,
                stats: DispatchStats::default(),
                events,
            }),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>, StoreError> {
        self.inner.ledger.dead_letters().await
    }

    /// Runs one batch to completion. Never fails as a whole: per-listing
    /// problems are collected in the report and the rest of the batch goes on.
    pub async fn dispatch_batch(&self, raw: Vec<RawListing>) -> BatchReport {
        let started = Instant::now();
        let stats = &self.inner.stats;
        let mut report = BatchReport::new(ObjectId::new().to_hex(), raw.len());

        DispatchStats::add(&stats.batches, 1);
        DispatchStats::add(&stats.listings_received, raw.len());
        tracing::info!(batch_id = %report.batch_id, received = report.received, "batch received");

        // NORMALIZED
        let mut listings: Vec<Listing> = Vec::with_capacity(raw.len());
        for (index, r) in raw.iter().enumerate() {
            match normalizer::normalize(r) {
                Ok(l) => listings.push(l),
                Err(skip) => {
                    tracing::warn!(batch_id = %report.batch_id, index, "skipping listing: {}", skip);
                    report.skipped.push(SkippedListing {
                        index,
                        reason: skip.to_string(),
                    });
                }
            }
        }
        DispatchStats::add(&stats.listings_skipped, report.skipped.len());
        report.normalized = listings.len();
        report.stage = BatchStage::Normalized;

        let snapshot_at = Utc::now().timestamp_millis();
        let criteria = match self.inner.alerts.active().await {
            Ok(c) => Arc::new(c),
            Err(e) => {
                tracing::error!(batch_id = %report.batch_id, "alert snapshot failed: {}", e);
                DispatchStats::add(&stats.evaluation_failures, listings.len());
                report.failures = listings
                    .into_iter()
                    .map(|l| ListingFailure {
                        listing_id: l.id,
                        reason: format!("alert snapshot failed: {e}"),
                    })
                    .collect();
                return report;
            }
        };

        // EVALUATED
        let mut evaluations = FuturesUnordered::new();
        for listing in listings {
            let listing_id = listing.id.clone();
            let handle = tokio::spawn(evaluate(self.inner.clone(), listing, criteria.clone()));
            evaluations.push(async move { (listing_id, handle.await) });
        }

        let mut deliveries = FuturesUnordered::new();
        while let Some((listing_id, joined)) = evaluations.next().await {
            let eval = match joined {
                Ok(eval) => eval,
                Err(e) => {
                    tracing::error!(batch_id = %report.batch_id, listing_id = %listing_id, "evaluation aborted: {}", e);
                    DispatchStats::add(&stats.evaluation_failures, 1);
                    report.failures.push(ListingFailure {
                        listing_id,
                        reason: format!("evaluation aborted: {e}"),
                    });
                    continue;
                }
            };

            report.matched += eval.matched;
            report.suppressed += eval.suppressed;
            if !eval.failures.is_empty() {
                DispatchStats::add(&stats.evaluation_failures, 1);
            }
            report.failures.extend(eval.failures.into_iter().map(|reason| ListingFailure {
                listing_id: listing_id.clone(),
                reason,
            }));

            for handle in eval.deliveries {
                let listing_id = listing_id.clone();
                deliveries.push(async move { (listing_id, handle.await) });
            }
        }
        report.stage = BatchStage::Evaluated;
        tracing::info!(
            batch_id = %report.batch_id,
            normalized = report.normalized,
            skipped = report.skipped.len(),
            matched = report.matched,
            suppressed = report.suppressed,
            "batch evaluated"
        );

        // DISPATCHED
        while let Some((listing_id, joined)) = deliveries.next().await {
            match joined {
                Ok(Delivery::Delivered) => report.dispatched += 1,
                Ok(Delivery::DeadLettered) => report.dead_lettered += 1,
                Err(e) => {
                    tracing::error!(batch_id = %report.batch_id, listing_id = %listing_id, "delivery task aborted: {}", e);
                    report.failures.push(ListingFailure {
                        listing_id,
                        reason: format!("delivery aborted: {e}"),
                    });
                }
            }
        }
        report.stage = BatchStage::Dispatched;

        self.sweep_orphan_keys(&criteria, snapshot_at).await;

        tracing::info!(
            batch_id = %report.batch_id,
            dispatched = report.dispatched,
            dead_lettered = report.dead_lettered,
            failures = report.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch dispatched"
        );

        report
    }

    /// Drops dedup keys of alerts deleted before this batch's snapshot. A batch
    /// that snapshotted before a delete can claim keys after the delete already
    /// released them; the next batch cleans those up.
    async fn sweep_orphan_keys(&self, live: &[AlertCriteria], snapshot_at: i64) {
        let live_ids: Vec<ObjectId> = live.iter().map(|a| a.id).collect();
        match self.inner.ledger.sweep(&live_ids, snapshot_at).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(released = n, "released dedup keys of deleted alerts"),
            Err(e) => tracing::warn!("dedup key sweep failed: {}", e),
        }
    }
}

async fn evaluate(inner: Arc<Inner>, listing: Listing, criteria: Arc<Vec<AlertCriteria>>) -> Evaluation {
    let mut eval = Evaluation {
        matched: 0,
        suppressed: 0,
        deliveries: Vec::new(),
        failures: Vec::new(),
    };
    let now = Utc::now().timestamp_millis();

    let hits: Vec<&AlertCriteria> = criteria
        .iter()
        .filter(|a| matcher::matches(&listing, &a.criteria))
        .collect();
    eval.matched = hits.len();
    DispatchStats::add(&inner.stats.matches, hits.len());

    for alert in hits {
        let job = NotificationJob {
            alert_id: alert.id,
            listing_id: listing.id.clone(),
            first_matched_at: now,
            owner_id: alert.owner_id.clone(),
            listing: ListingSummary::from(&listing),
        };

        match inner.ledger.claim(&job.key()).await {
            // hand off right away; the claim is already durable
            Ok(true) => eval.deliveries.push(tokio::spawn(deliver(inner.clone(), job))),
            Ok(false) => {
                DispatchStats::add(&inner.stats.duplicates_suppressed, 1);
                eval.suppressed += 1;
            }
            Err(e) => {
                tracing::error!(alert_id = %alert.id.to_hex(), listing_id = %listing.id, "dedup claim failed: {}", e);
                eval.failures.push(format!("dedup claim for alert {} failed: {e}", alert.id.to_hex()));
            }
        }
    }

    eval
}

async fn deliver(inner: Arc<Inner>, job: NotificationJob) -> Delivery {
    let policy = &inner.policy;
    let max_attempts = policy.max_attempts.max(1);
    let backoff = Backoff::new(max_attempts, policy.backoff_min, Some(policy.backoff_max));

    let mut attempt = 0;
    loop {
        attempt += 1;

        let err = match tokio::time::timeout(policy.timeout, inner.sink.deliver(&job)).await {
            Ok(Ok(())) => {
                DispatchStats::add(&inner.stats.delivered, 1);
                if let Some(tx) = &inner.events {
                    let _ = tx.send(OwnerEvent::new(&job.owner_id, "dealMatched"));
                }
                return Delivery::Delivered;
            }
            Ok(Err(e)) => e,
            Err(_) => SinkError::Timeout(policy.timeout),
        };

        if attempt >= max_attempts {
            tracing::error!(
                alert_id = %job.alert_id.to_hex(),
                listing_id = %job.listing_id,
                attempts = attempt,
                "dead-lettering notification: {}",
                err
            );
            DispatchStats::add(&inner.stats.dead_lettered, 1);

            let letter = DeadLetter {
                job,
                attempts: attempt,
                last_error: err.to_string(),
                dead_lettered_at: Utc::now().timestamp_millis(),
            };
            if let Err(e) = inner.ledger.dead_letter(letter).await {
                DispatchStats::add(&inner.stats.dead_letter_write_failures, 1);
                tracing::error!("failed to record dead letter: {}", e);
            }
            return Delivery::DeadLettered;
        }

        let wait = backoff.next(attempt).unwrap_or(policy.backoff_max);
        DispatchStats::add(&inner.stats.delivery_retries, 1);
        tracing::warn!(
            alert_id = %job.alert_id.to_hex(),
            listing_id = %job.listing_id,
            attempt,
            wait_ms = wait.as_millis() as u64,
            "sink delivery failed, retrying: {}",
            err
        );
        tokio::time::sleep(wait).await;
    }
}

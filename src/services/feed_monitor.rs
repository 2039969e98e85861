use std::time::Duration;

use tokio::time;

use crate::{models::RawListing, AppState};

use super::{listing_feed::ListingFeedClient, normalizer};

/// Polls the listing feed and pushes each page through the dispatcher.
/// Runs until the process exits; a failed tick is logged and retried on the
/// next one.
pub fn spawn_listing_poller(state: AppState, feed: ListingFeedClient, every: Duration) {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        let mut since: Option<i64> = None;

        loop {
            interval.tick().await;

            match run_tick(&state, &feed, since).await {
                Ok(next) => since = next.or(since),
                Err(e) => tracing::warn!("[feed-poller] tick error: {}", e),
            }
        }
    });
}

/// Returns the newest source timestamp seen, to resume from next tick.
async fn run_tick(
    state: &AppState,
    feed: &ListingFeedClient,
    since: Option<i64>,
) -> Result<Option<i64>, crate::error::FeedError> {
    let page = feed.fetch(since).await?;
    if page.is_empty() {
        return Ok(None);
    }

    let newest = newest_timestamp(&page);
    let report = state.dispatcher.dispatch_batch(page).await;

    tracing::debug!(
        batch_id = %report.batch_id,
        received = report.received,
        dispatched = report.dispatched,
        "[feed-poller] batch done"
    );

    Ok(newest)
}

pub fn newest_timestamp(page: &[RawListing]) -> Option<i64> {
    page.iter()
        .filter_map(|r| normalizer::normalize(r).ok())
        .filter_map(|l| l.source_timestamp)
        .max()
}

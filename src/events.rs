use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures_util::stream::Stream;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{models::CurrentUser, AppState};

/// A named event addressed to one owner. Subscribers only ever see their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerEvent {
    pub owner_id: String,
    pub name: String,
}

impl OwnerEvent {
    pub fn new(owner_id: &str, name: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            name: name.to_string(),
        }
    }
}

// GET /events
pub async fn sse_events(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let rx = state.events_tx.subscribe();
    Sse::new(owner_stream(rx, u.id))
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(20))
                .text("keep-alive"),
        )
        .into_response()
}

fn owner_stream(
    rx: broadcast::Receiver<OwnerEvent>,
    owner_id: String,
) -> impl Stream<Item = Result<Event, Infallible>> {
    futures_util::stream::unfold((rx, owner_id), |(mut rx, owner_id)| async move {
        loop {
            let evt = match rx.recv().await {
                Ok(e) if e.owner_id == owner_id => Event::default().event(e.name).data("1"),
                Ok(_) => continue,
                Err(RecvError::Lagged(_)) => Event::default().event("ping").data("lagged"),
                Err(RecvError::Closed) => return None,
            };
            return Some((Ok(evt), (rx, owner_id)));
        }
    })
}

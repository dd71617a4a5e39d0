//! Server-Sent Events change feed.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use common::ItemId;
use domain::Catalog;
use futures_util::{Stream, StreamExt};
use movement_store::LedgerStore;
use projections::FeedEvent;
use serde::Deserialize;

use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedParams {
    pub item_id: Option<String>,
}

/// GET /feed?item_id=: stream movements and balance snapshots as they commit.
///
/// Events are named `movement`, `balance`, or `resync`; after `resync` the
/// client must re-read balances.
pub async fn subscribe<S: LedgerStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Query(params): Query<FeedParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let item_filter = params.item_id.filter(|id| !id.is_empty()).map(ItemId::new);
    tracing::debug!(item_id = ?item_filter, "feed subscriber connected");

    let events = state
        .ledger
        .feed()
        .subscribe(item_filter)
        .into_stream()
        .map(|event| Ok(to_sse(event)));

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn to_sse(event: FeedEvent) -> Event {
    match event {
        FeedEvent::Change(change) => Event::default()
            .event(change.event_name())
            .json_data(&change)
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "could not encode feed event");
                Event::default().event("resync").data("0")
            }),
        FeedEvent::Resync { missed } => Event::default().event("resync").data(missed.to_string()),
    }
}

//! Change notification feed.
//!
//! A lossy broadcast of committed movements and the balances they produced.
//! The feed is never a write path: publishing happens after a commit, and a
//! subscriber that falls behind is told to re-read instead of being replayed.

use common::{BalanceKey, ItemId};
use futures_util::{Stream, StreamExt};
use movement_store::{Balance, Committed, Movement};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

/// Default number of changes buffered per subscriber.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// One change to stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockChange {
    Movement(Movement),
    Balance { key: BalanceKey, balance: Balance },
}

impl StockChange {
    pub fn item_id(&self) -> &ItemId {
        match self {
            StockChange::Movement(movement) => &movement.item_id,
            StockChange::Balance { key, .. } => &key.item_id,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            StockChange::Movement(_) => "movement",
            StockChange::Balance { .. } => "balance",
        }
    }
}

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Change(StockChange),
    /// The subscriber lagged and `missed` changes were dropped. Balances
    /// must be re-read.
    Resync { missed: u64 },
}

/// Publishes stock changes to any number of subscribers.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<StockChange>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes one change. Returns how many subscribers received it.
    pub fn publish(&self, change: StockChange) -> usize {
        // No subscribers is not an error.
        self.sender.send(change).unwrap_or(0)
    }

    /// Publishes the movements of a commit, then the balances they produced.
    pub fn publish_committed(&self, committed: &Committed) {
        for movement in &committed.movements {
            self.publish(StockChange::Movement(movement.clone()));
        }
        for balance in &committed.balances {
            self.publish_balance(balance);
        }
        metrics::counter!("feed_changes_published_total")
            .increment((committed.movements.len() + committed.balances.len()) as u64);
    }

    pub fn publish_balance(&self, balance: &Balance) {
        self.publish(StockChange::Balance {
            key: balance.key(),
            balance: balance.clone(),
        });
    }

    /// Subscribes to changes, optionally for one item only.
    pub fn subscribe(&self, item_filter: Option<ItemId>) -> FeedSubscription {
        FeedSubscription {
            receiver: self.sender.subscribe(),
            item_filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A live subscription to the feed.
pub struct FeedSubscription {
    receiver: broadcast::Receiver<StockChange>,
    item_filter: Option<ItemId>,
}

impl FeedSubscription {
    /// Waits for the next matching event. Returns None once the feed is gone.
    pub async fn next(&mut self) -> Option<FeedEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if self.accepts(&change) => return Some(FeedEvent::Change(change)),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "feed subscriber lagged");
                    return Some(FeedEvent::Resync { missed });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Converts the subscription into a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = FeedEvent> + Send + 'static {
        let item_filter = self.item_filter;
        BroadcastStream::new(self.receiver).filter_map(move |result| {
            let event = match result {
                Ok(change) => item_filter
                    .as_ref()
                    .is_none_or(|item| change.item_id() == item)
                    .then_some(FeedEvent::Change(change)),
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    Some(FeedEvent::Resync { missed })
                }
            };
            std::future::ready(event)
        })
    }

    fn accepts(&self, change: &StockChange) -> bool {
        self.item_filter
            .as_ref()
            .is_none_or(|item| change.item_id() == item)
    }
}

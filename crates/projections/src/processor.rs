//! Projection processor for feeding ledger movements to projections.

use std::sync::Arc;

use futures_util::StreamExt;
use movement_store::{LedgerStore, Movement};

use crate::Result;
use crate::projection::Projection;

/// Replays movements from a ledger store into projections.
///
/// The processor supports:
/// - Catch-up: streams the whole ledger, skipping movements a projection has seen
/// - Single movement delivery
/// - Rebuild: resets all projections and replays from scratch
pub struct ProjectionProcessor<S: LedgerStore> {
    store: Arc<S>,
    projections: Vec<Box<dyn Projection>>,
}

impl<S: LedgerStore> ProjectionProcessor<S> {
    /// Creates a new processor reading from the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            projections: Vec::new(),
        }
    }

    /// Registers a projection with this processor.
    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Streams every movement in append order to each projection that has
    /// not already processed it. Returns the number of movements read.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let mut stream = self.store.stream_all().await?;
        let mut movements_read: u64 = 0;

        while let Some(result) = stream.next().await {
            let movement = result?;
            movements_read += 1;

            for projection in &self.projections {
                if !projection.position().await.has_seen(movement.sequence) {
                    projection.handle(&movement).await?;
                    metrics::counter!("projections_movements_processed").increment(1);
                }
            }
        }

        tracing::info!(movements_read, "catch-up complete");

        Ok(movements_read)
    }

    /// Delivers a single movement to all registered projections.
    #[tracing::instrument(skip(self, movement), fields(sequence = movement.sequence))]
    pub async fn process_movement(&self, movement: &Movement) -> Result<()> {
        for projection in &self.projections {
            if !projection.position().await.has_seen(movement.sequence) {
                projection.handle(movement).await?;
            }
        }
        Ok(())
    }

    /// Resets all projections and replays all movements from the store.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            tracing::debug!(projection = projection.name(), "resetting projection");
            projection.reset().await?;
        }
        self.run_catch_up().await
    }
}

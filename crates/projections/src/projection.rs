//! Core projection trait and position tracking.

use async_trait::async_trait;
use movement_store::Movement;

use crate::Result;

/// Tracks how far through the ledger a projection has read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    /// Number of movements processed by this projection.
    pub movements_processed: u64,

    /// Sequence of the last movement processed, 0 before the first.
    pub last_sequence: i64,
}

impl ProjectionPosition {
    /// Creates a new position at zero.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Advances the position past the movement with the given sequence.
    pub fn advance(&self, sequence: i64) -> Self {
        Self {
            movements_processed: self.movements_processed + 1,
            last_sequence: sequence,
        }
    }

    /// True if the movement with this sequence was already processed.
    pub fn has_seen(&self, sequence: i64) -> bool {
        sequence <= self.last_sequence
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "position({} @ seq {})",
            self.movements_processed, self.last_sequence
        )
    }
}

/// A projection folding ledger movements into a read model.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Handles a single movement, updating the projection's read model.
    async fn handle(&self, movement: &Movement) -> Result<()>;

    /// Returns the current position of this projection.
    async fn position(&self) -> ProjectionPosition;

    /// Resets the projection to its initial state.
    async fn reset(&self) -> Result<()>;
}

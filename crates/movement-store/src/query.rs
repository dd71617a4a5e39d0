use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CorrelationId, ItemId, Movement, MovementType, Reason, WarehouseId};

/// Page size used when a history query does not set one.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Largest page a history query may request.
pub const MAX_PAGE_SIZE: usize = 200;

/// Filter and keyset cursor for reading an item's movement history.
///
/// Results are ordered newest first. `cursor` is the `sequence` of the last
/// movement of the previous page; only older movements are returned.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub item_id: ItemId,

    /// Restrict to one warehouse.
    pub warehouse_id: Option<WarehouseId>,

    /// Restrict to these movement types (any of them).
    pub movement_types: Option<Vec<MovementType>>,

    pub reason: Option<Reason>,

    /// Restrict to the legs of one transfer.
    pub correlation_id: Option<CorrelationId>,

    /// Movements created at or after this timestamp.
    pub from_timestamp: Option<DateTime<Utc>>,

    /// Movements created at or before this timestamp.
    pub to_timestamp: Option<DateTime<Utc>>,

    pub cursor: Option<i64>,
    pub limit: Option<usize>,
}

impl HistoryQuery {
    /// Creates a query over every movement of an item.
    pub fn for_item(item_id: impl Into<ItemId>) -> Self {
        Self {
            item_id: item_id.into(),
            warehouse_id: None,
            movement_types: None,
            reason: None,
            correlation_id: None,
            from_timestamp: None,
            to_timestamp: None,
            cursor: None,
            limit: None,
        }
    }

    pub fn warehouse(mut self, warehouse_id: impl Into<WarehouseId>) -> Self {
        self.warehouse_id = Some(warehouse_id.into());
        self
    }

    pub fn movement_types(mut self, types: Vec<MovementType>) -> Self {
        self.movement_types = Some(types);
        self
    }

    pub fn reason(mut self, reason: Reason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    pub fn cursor(mut self, cursor: i64) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the requested page size clamped to `1..=MAX_PAGE_SIZE`.
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    /// Returns true if the movement passes every filter except the cursor.
    pub fn matches(&self, movement: &Movement) -> bool {
        if movement.item_id != self.item_id {
            return false;
        }
        if let Some(ref warehouse_id) = self.warehouse_id
            && &movement.warehouse_id != warehouse_id
        {
            return false;
        }
        if let Some(ref types) = self.movement_types
            && !types.contains(&movement.movement_type)
        {
            return false;
        }
        if self.reason.is_some_and(|reason| movement.reason != reason) {
            return false;
        }
        if self.correlation_id.is_some() && movement.correlation_id != self.correlation_id {
            return false;
        }
        if let Some(from) = self.from_timestamp
            && movement.created_at < from
        {
            return false;
        }
        if let Some(to) = self.to_timestamp
            && movement.created_at > to
        {
            return false;
        }
        true
    }
}

/// One page of results with the cursor for the next page, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<i64>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }

    /// Maps every item, keeping the cursor.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

impl Page<Movement> {
    /// Builds a page from newest-first rows fetched with one extra row of lookahead.
    pub fn from_lookahead(mut rows: Vec<Movement>, limit: usize) -> Self {
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = if has_more {
            rows.last().map(|m| m.sequence)
        } else {
            None
        };
        Self {
            items: rows,
            next_cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BalanceKey, Reason};

    fn movement(warehouse: &str, sequence: i64) -> Movement {
        let mut m = Movement::new(
            BalanceKey::new("FAB-001", warehouse),
            MovementType::In,
            1,
            Reason::ReceiptFromPurchase,
        );
        m.sequence = sequence;
        m
    }

    #[test]
    fn builder_chain() {
        let query = HistoryQuery::for_item("FAB-001")
            .warehouse("Main")
            .movement_types(vec![MovementType::In])
            .cursor(42)
            .limit(10);

        assert_eq!(query.item_id, ItemId::new("FAB-001"));
        assert_eq!(query.warehouse_id, Some(WarehouseId::new("Main")));
        assert_eq!(query.cursor, Some(42));
        assert_eq!(query.effective_limit(), 10);
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(
            HistoryQuery::for_item("X").effective_limit(),
            DEFAULT_PAGE_SIZE
        );
        assert_eq!(HistoryQuery::for_item("X").limit(0).effective_limit(), 1);
        assert_eq!(
            HistoryQuery::for_item("X").limit(10_000).effective_limit(),
            MAX_PAGE_SIZE
        );
    }

    #[test]
    fn matches_filters_by_warehouse() {
        let query = HistoryQuery::for_item("FAB-001").warehouse("Main");
        assert!(query.matches(&movement("Main", 1)));
        assert!(!query.matches(&movement("Branch", 2)));
    }

    #[test]
    fn matches_filters_by_reason_and_correlation() {
        let receipt = movement("Main", 1);
        let by_reason = HistoryQuery::for_item("FAB-001").reason(Reason::ReceiptFromPurchase);
        assert!(by_reason.matches(&receipt));
        assert!(!HistoryQuery::for_item("FAB-001")
            .reason(Reason::CustomerReturn)
            .matches(&receipt));

        let correlation_id = CorrelationId::new();
        let leg = Movement::new(
            BalanceKey::new("FAB-001", "Branch"),
            MovementType::TransferIn,
            5,
            Reason::InternalTransfer,
        )
        .correlated(correlation_id);
        let by_transfer = HistoryQuery::for_item("FAB-001").correlation_id(correlation_id);
        assert!(by_transfer.matches(&leg));
        assert!(!by_transfer.matches(&receipt));
    }

    #[test]
    fn lookahead_sets_next_cursor_only_when_more_rows_exist() {
        let rows = vec![movement("Main", 5), movement("Main", 4), movement("Main", 3)];
        let page = Page::from_lookahead(rows.clone(), 2);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_cursor, Some(4));

        let page = Page::from_lookahead(rows, 3);
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.next_cursor, None);
    }
}

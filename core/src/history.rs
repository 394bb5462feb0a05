//! Append-only, time-ordered history of requests.
//!
//! Positions are zero-based, assigned in send order and never reused. Retention may
//! drop the oldest prefix of the history; the positions of the remaining entries do
//! not change, so a position handed out once always means the same request.

use crate::error::OracleError;
use crate::types::{HistoryEntry, RequestStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A history record removed by retention, together with its final status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedRequest {
    /// Position the entry held in the history
    pub position: usize,
    /// The entry itself
    pub entry: HistoryEntry,
    /// Registry status at archival time
    pub status: RequestStatus,
}

/// Ordered request history with inclusive range pagination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryList {
    entries: VecDeque<HistoryEntry>,
    /// Position of `entries[0]`; grows as retention archives the front
    first: usize,
}

impl HistoryList {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return its position.
    pub fn append(&mut self, entry: HistoryEntry) -> usize {
        let position = self.len();
        self.entries.push_back(entry);
        position
    }

    /// Record the fulfillment of the entry at `position`.
    ///
    /// Only `data` and `timestamp` are replaced.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::IndexOutOfRange`] if no entry holds `position`.
    pub fn update(
        &mut self,
        position: usize,
        data: String,
        timestamp: DateTime<Utc>,
    ) -> Result<(), OracleError> {
        let len = self.len();
        let entry = position
            .checked_sub(self.first)
            .and_then(|offset| self.entries.get_mut(offset))
            .ok_or(OracleError::IndexOutOfRange { position, len })?;

        entry.data = data;
        entry.timestamp = timestamp;
        Ok(())
    }

    /// Entry at `position`, if it is still retained.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&HistoryEntry> {
        position
            .checked_sub(self.first)
            .and_then(|offset| self.entries.get(offset))
    }

    /// Copy of the entries at positions `start..=end`.
    ///
    /// Out-of-range windows are rejected, never clamped.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::InvalidRange`] unless
    /// `first_position() <= start <= end < len()`.
    pub fn range(&self, start: usize, end: usize) -> Result<Vec<HistoryEntry>, OracleError> {
        let len = self.len();
        if start > end || end >= len || start < self.first {
            return Err(OracleError::InvalidRange { start, end, len });
        }

        Ok(self
            .entries
            .range(start - self.first..=end - self.first)
            .cloned()
            .collect())
    }

    /// Copy of every retained entry, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::ListingTooLarge`] if `limit` is set and the history
    /// holds more entries than that.
    pub fn list_all(&self, limit: Option<usize>) -> Result<Vec<HistoryEntry>, OracleError> {
        match limit {
            Some(limit) if self.entries.len() > limit => Err(OracleError::ListingTooLarge {
                len: self.entries.len(),
                limit,
            }),
            _ => Ok(self.entries.iter().cloned().collect()),
        }
    }

    /// Most recently appended entry and its position.
    #[must_use]
    pub fn latest(&self) -> Option<(usize, &HistoryEntry)> {
        self.entries
            .back()
            .map(|entry| (self.len() - 1, entry))
    }

    /// Remove entries from the front for as long as `keep_going` approves them.
    ///
    /// Stops at the first entry that is refused, so retained positions stay
    /// contiguous.
    pub fn drain_front_while<F>(&mut self, mut keep_going: F) -> Vec<(usize, HistoryEntry)>
    where
        F: FnMut(usize, &HistoryEntry) -> bool,
    {
        let mut drained = Vec::new();
        while let Some(front) = self.entries.front() {
            if !keep_going(self.first, front) {
                break;
            }
            if let Some(entry) = self.entries.pop_front() {
                drained.push((self.first, entry));
                self.first += 1;
            }
        }
        drained
    }

    /// Number of positions assigned so far (retained plus archived).
    #[must_use]
    pub fn len(&self) -> usize {
        self.first + self.entries.len()
    }

    /// Whether nothing was ever appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries still held in memory.
    #[must_use]
    pub fn retained(&self) -> usize {
        self.entries.len()
    }

    /// Position of the oldest retained entry.
    #[must_use]
    pub const fn first_position(&self) -> usize {
        self.first
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use crate::types::{Originator, RequestId};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_737_244_800 + seconds, 0).unwrap()
    }

    fn entry(key: &str) -> HistoryEntry {
        HistoryEntry::pending(RequestId::new(), Originator::new("tester"), at(0), key, "")
    }

    fn history_of(count: usize) -> HistoryList {
        let mut history = HistoryList::new();
        for i in 0..count {
            history.append(entry(&format!("key-{i}")));
        }
        history
    }

    #[test]
    fn test_append_assigns_sequential_positions() {
        let mut history = HistoryList::new();
        assert!(history.is_empty());
        assert_eq!(history.append(entry("a")), 0);
        assert_eq!(history.append(entry("b")), 1);
        assert_eq!(history.append(entry("a")), 2);
        assert_eq!(history.len(), 3);
        assert_eq!(history.latest().map(|(pos, e)| (pos, e.lookup_key.as_str())), Some((2, "a")));
    }

    #[test]
    fn test_update_only_touches_data_and_timestamp() {
        let mut history = HistoryList::new();
        let original = entry("2025-01-19");
        let position = history.append(original.clone());

        history.update(position, "4.123".to_string(), at(30)).unwrap();

        let updated = history.get(position).unwrap();
        assert_eq!(updated.data, "4.123");
        assert_eq!(updated.timestamp, at(30));
        assert_eq!(updated.request_id, original.request_id);
        assert_eq!(updated.originator, original.originator);
        assert_eq!(updated.lookup_key, original.lookup_key);
        assert_eq!(updated.secondary_key, original.secondary_key);
    }

    #[test]
    fn test_update_out_of_range() {
        let mut history = history_of(2);
        assert_eq!(
            history.update(2, String::new(), at(0)),
            Err(OracleError::IndexOutOfRange { position: 2, len: 2 })
        );
    }

    #[test]
    fn test_single_entry_range() {
        let history = history_of(1);

        assert_eq!(history.range(0, 0).unwrap().len(), 1);
        assert_eq!(
            history.range(0, 5),
            Err(OracleError::InvalidRange { start: 0, end: 5, len: 1 })
        );
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        let history = history_of(4);
        assert_eq!(
            history.range(3, 1),
            Err(OracleError::InvalidRange { start: 3, end: 1, len: 4 })
        );
    }

    #[test]
    fn test_range_on_empty_history() {
        let history = HistoryList::new();
        assert!(history.range(0, 0).is_err());
        assert!(history.list_all(None).unwrap().is_empty());
    }

    #[test]
    fn test_list_all_respects_limit() {
        let history = history_of(3);
        assert_eq!(history.list_all(Some(3)).unwrap().len(), 3);
        assert_eq!(
            history.list_all(Some(2)),
            Err(OracleError::ListingTooLarge { len: 3, limit: 2 })
        );
    }

    #[test]
    fn test_drain_front_keeps_positions_stable() {
        let mut history = history_of(5);

        let drained = history.drain_front_while(|position, _| position < 2);

        assert_eq!(drained.iter().map(|(p, _)| *p).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(history.len(), 5);
        assert_eq!(history.retained(), 3);
        assert_eq!(history.first_position(), 2);
        assert!(history.get(1).is_none());
        assert_eq!(history.get(2).unwrap().lookup_key, "key-2");
        assert!(history.range(1, 3).is_err());
        assert_eq!(history.range(2, 4).unwrap().len(), 3);
        assert_eq!(history.append(entry("next")), 5);
    }

    #[test]
    fn test_drain_front_stops_at_first_refusal() {
        let mut history = history_of(4);

        let drained = history.drain_front_while(|_, e| e.lookup_key != "key-1");

        assert_eq!(drained.len(), 1);
        assert_eq!(history.first_position(), 1);
    }

    proptest! {
        #[test]
        fn prop_valid_range_returns_window_in_send_order(
            len in 1usize..40,
            a in 0usize..40,
            b in 0usize..40,
        ) {
            let history = history_of(len);
            let start = a.min(b) % len;
            let end = (a.max(b) % len).max(start);

            let page = history.range(start, end).unwrap();

            prop_assert_eq!(page.len(), end - start + 1);
            for (offset, item) in page.iter().enumerate() {
                prop_assert_eq!(&item.lookup_key, &format!("key-{}", start + offset));
            }
        }

        #[test]
        fn prop_out_of_range_end_is_rejected(len in 0usize..20, extra in 0usize..20, start in 0usize..20) {
            let history = history_of(len);
            let end = len + extra;
            let is_invalid_range = matches!(
                history.range(start.min(end), end),
                Err(OracleError::InvalidRange { .. })
            );
            prop_assert!(is_invalid_range);
        }

        #[test]
        fn prop_inverted_range_is_rejected(len in 2usize..20, start in 1usize..20) {
            let history = history_of(len);
            let start = start.min(len - 1);
            let is_invalid_range = matches!(
                history.range(start, start - 1),
                Err(OracleError::InvalidRange { .. })
            );
            prop_assert!(is_invalid_range);
        }
    }
}

//! Bounded per-stream history log

use std::collections::VecDeque;

use bytes::Bytes;

use crate::error::{BrokerError, Result};

/// How many TTLs an idle log outlives its last append
const LOG_DEADLINE_FACTOR: i64 = 10;

/// A stored history entry
#[derive(Debug, Clone)]
pub(crate) struct HistoryEntry {
    pub offset: u64,
    /// Unix time (seconds) of the append
    pub timestamp: i64,
    pub data: Bytes,
}

/// History of a single stream
///
/// Entries are kept in offset order. `low` is the offset of the oldest
/// retained entry (0 when the log is empty).
#[derive(Debug)]
pub(crate) struct HistoryLog {
    /// Last assigned offset
    offset: u64,
    /// Oldest retained offset
    low: u64,
    /// Unix time after which the whole log may be dropped
    deadline: i64,
    entries: VecDeque<HistoryEntry>,
    ttl: i64,
    limit: usize,
    /// Set by the sweep before the log leaves the map
    retired: bool,
}

impl HistoryLog {
    pub(crate) fn new(ttl_secs: u64, limit: usize) -> Self {
        Self {
            offset: 0,
            low: 0,
            deadline: 0,
            entries: VecDeque::new(),
            ttl: ttl_secs as i64,
            limit,
            retired: false,
        }
    }

    /// Append data under the next offset
    pub(crate) fn append(&mut self, data: Bytes, now: i64) -> u64 {
        self.offset += 1;

        self.push(
            HistoryEntry {
                offset: self.offset,
                timestamp: now,
                data,
            },
            now,
        );

        self.offset
    }

    /// Append data under an offset assigned elsewhere
    pub(crate) fn insert(&mut self, data: Bytes, offset: u64, timestamp: i64, now: i64) -> Result<u64> {
        if self.offset >= offset {
            return Err(BrokerError::OffsetTaken {
                offset,
                current: self.offset,
            });
        }

        self.offset = offset;

        self.push(
            HistoryEntry {
                offset,
                timestamp,
                data,
            },
            now,
        );

        Ok(offset)
    }

    fn push(&mut self, entry: HistoryEntry, now: i64) {
        self.entries.push_back(entry);

        if self.limit > 0 && self.entries.len() > self.limit {
            self.entries.pop_front();
        }

        self.update_low();

        // Logs still receiving traffic are kept around, so their offsets keep growing
        self.deadline = now + self.ttl * LOG_DEADLINE_FACTOR;
    }

    fn update_low(&mut self) {
        self.low = self.entries.front().map_or(0, |entry| entry.offset);
    }

    /// Drop entries older than the TTL
    ///
    /// Returns the number of evicted entries.
    pub(crate) fn expire(&mut self, now: i64) -> usize {
        let cutoff = now - self.ttl;
        let stale = self
            .entries
            .iter()
            .take_while(|entry| entry.timestamp < cutoff)
            .count();

        self.entries.drain(..stale);
        self.update_low();

        stale
    }

    /// Whether the log has been idle past its deadline
    pub(crate) fn is_dead(&self, now: i64) -> bool {
        self.deadline < now
    }

    /// Entries after `offset`
    ///
    /// Fails if `offset` has been evicted or not yet produced.
    pub(crate) fn after(&self, stream: &str, offset: u64) -> Result<Vec<HistoryEntry>> {
        let latest = match self.entries.back() {
            Some(entry) => entry.offset,
            None => return Err(BrokerError::StreamEmpty(stream.to_string())),
        };

        if self.low > offset {
            return Err(BrokerError::OffsetUnavailable {
                requested: offset,
                lowest: self.low,
            });
        }

        if offset > latest {
            return Err(BrokerError::OffsetAhead {
                requested: offset,
                latest,
            });
        }

        let start = self.entries.partition_point(|entry| entry.offset <= offset);

        Ok(self.entries.range(start..).cloned().collect())
    }

    /// Entries appended at or after the unix time `since`
    pub(crate) fn since(&self, since: i64) -> Vec<HistoryEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.timestamp >= since)
            .cloned()
            .collect()
    }

    /// Mark the log as dropped from the registry; writers must look it up again
    pub(crate) fn retire(&mut self) {
        self.retired = true;
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired
    }

    pub(crate) fn low(&self) -> u64 {
        self.low
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

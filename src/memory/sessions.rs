//! Session snapshot cache with a shared TTL

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use bytes::Bytes;

#[derive(Debug)]
struct SessionEntry {
    data: Bytes,
    expires_at: Instant,
}

/// Recovery id → serialized session state
///
/// Every entry shares the same TTL, so deadlines are pushed to the expiry
/// queue in non-decreasing order. Refreshing a session pushes a new record;
/// records whose deadline no longer matches the entry are skipped on sweep.
#[derive(Debug)]
pub(crate) struct SessionCache {
    entries: HashMap<String, SessionEntry>,
    expiry: VecDeque<(String, Instant)>,
    ttl: Duration,
}

impl SessionCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            expiry: VecDeque::new(),
            ttl,
        }
    }

    pub(crate) fn commit(&mut self, sid: &str, data: Bytes, now: Instant) {
        let expires_at = now + self.ttl;

        self.entries
            .insert(sid.to_string(), SessionEntry { data, expires_at });
        self.expiry.push_back((sid.to_string(), expires_at));
    }

    pub(crate) fn restore(&self, sid: &str, now: Instant) -> Option<Bytes> {
        self.entries
            .get(sid)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.data.clone())
    }

    /// Restart the countdown; returns false for unknown sessions
    pub(crate) fn touch(&mut self, sid: &str, now: Instant) -> bool {
        let expires_at = now + self.ttl;

        match self.entries.get_mut(sid) {
            Some(entry) => {
                entry.expires_at = expires_at;
                self.expiry.push_back((sid.to_string(), expires_at));
                true
            }
            None => false,
        }
    }

    /// Delete expired sessions, returns how many were removed
    pub(crate) fn expire(&mut self, now: Instant) -> usize {
        let mut removed = 0;

        while let Some((_, deadline)) = self.expiry.front() {
            if *deadline > now {
                break;
            }

            let Some((sid, deadline)) = self.expiry.pop_front() else {
                break;
            };

            let is_current = self
                .entries
                .get(&sid)
                .is_some_and(|entry| entry.expires_at == deadline);

            if is_current {
                self.entries.remove(&sid);
                removed += 1;
            }
        }

        removed
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

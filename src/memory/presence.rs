//! In-process presence tracking

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::broker::{PresenceEvent, PresenceInfo, PresenceInfoOptions};
use crate::error::{BrokerError, Result};

/// Streams a session is present in
#[derive(Debug)]
struct SessionPresence {
    /// stream → pid
    streams: HashMap<String, String>,
    deadline: Instant,
}

/// One presence id within a stream
#[derive(Debug)]
struct PresenceRecord {
    info: Value,
    sessions: Vec<String>,
}

impl PresenceRecord {
    /// Returns true when the last session is gone
    fn remove(&mut self, sid: &str) -> bool {
        self.sessions.retain(|s| s != sid);
        self.sessions.is_empty()
    }
}

/// stream → pid → record, plus the reverse index used for expiration
#[derive(Debug)]
pub(crate) struct PresenceState {
    streams: HashMap<String, BTreeMap<String, PresenceRecord>>,
    sessions: HashMap<String, SessionPresence>,
    ttl: Duration,
}

impl PresenceState {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            streams: HashMap::new(),
            sessions: HashMap::new(),
            ttl,
        }
    }

    pub(crate) fn add(
        &mut self,
        stream: &str,
        sid: &str,
        pid: &str,
        info: Value,
        now: Instant,
    ) -> Result<Option<PresenceEvent>> {
        let session = self
            .sessions
            .entry(sid.to_string())
            .or_insert_with(|| SessionPresence {
                streams: HashMap::new(),
                deadline: now + self.ttl,
            });

        if let Some(current) = session.streams.get(stream) {
            if current != pid {
                return Err(BrokerError::PresenceIdMismatch {
                    stream: stream.to_string(),
                    sid: sid.to_string(),
                });
            }
        }

        session.streams.insert(stream.to_string(), pid.to_string());

        let records = self.streams.entry(stream.to_string()).or_default();

        match records.get_mut(pid) {
            Some(record) => {
                if !record.sessions.iter().any(|s| s == sid) {
                    record.sessions.push(sid.to_string());
                }
                record.info = info;
                Ok(None)
            }
            None => {
                records.insert(
                    pid.to_string(),
                    PresenceRecord {
                        info: info.clone(),
                        sessions: vec![sid.to_string()],
                    },
                );
                Ok(Some(PresenceEvent::join(pid, info)))
            }
        }
    }

    pub(crate) fn remove(&mut self, stream: &str, sid: &str) -> Result<Option<PresenceEvent>> {
        let not_found = || BrokerError::PresenceNotFound {
            stream: stream.to_string(),
            sid: sid.to_string(),
        };

        let session = self.sessions.get_mut(sid).ok_or_else(not_found)?;
        let pid = session.streams.remove(stream).ok_or_else(not_found)?;

        if session.streams.is_empty() {
            self.sessions.remove(sid);
        }

        Ok(self.leave(stream, &pid, sid))
    }

    pub(crate) fn info(&self, stream: &str, opts: PresenceInfoOptions) -> PresenceInfo {
        let Some(records) = self.streams.get(stream) else {
            return PresenceInfo::default();
        };

        let list = opts.return_records.then(|| {
            records
                .iter()
                .map(|(pid, record)| PresenceEvent::record(pid.as_str(), record.info.clone()))
                .collect()
        });

        PresenceInfo {
            total: records.len(),
            records: list,
        }
    }

    pub(crate) fn touch(&mut self, sid: &str, now: Instant) {
        if let Some(session) = self.sessions.get_mut(sid) {
            session.deadline = now + self.ttl;
        }
    }

    /// Drop sessions past their deadline, returns the resulting leave events
    pub(crate) fn expire(&mut self, now: Instant) -> Vec<(String, PresenceEvent)> {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.deadline < now)
            .map(|(sid, _)| sid.clone())
            .collect();

        let mut events = Vec::new();

        for sid in expired {
            let Some(session) = self.sessions.remove(&sid) else {
                continue;
            };

            for (stream, pid) in session.streams {
                if let Some(event) = self.leave(&stream, &pid, &sid) {
                    events.push((stream, event));
                }
            }
        }

        events
    }

    /// Detach `sid` from the stream record of `pid`
    fn leave(&mut self, stream: &str, pid: &str, sid: &str) -> Option<PresenceEvent> {
        let records = self.streams.get_mut(stream)?;
        let gone = records.get_mut(pid)?.remove(sid);

        if gone {
            records.remove(pid);
        }

        if records.is_empty() {
            self.streams.remove(stream);
        }

        gone.then(|| PresenceEvent::leave(pid))
    }

    #[cfg(test)]
    pub(crate) fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const TTL: Duration = Duration::from_secs(15);

    fn ids(info: &PresenceInfo) -> Vec<&str> {
        info.records
            .as_ref()
            .map(|records| records.iter().map(|r| r.id.as_str()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_join_events() {
        let mut state = PresenceState::new(TTL);
        let now = Instant::now();

        let event = state.add("a", "s1", "user_1", json!({"name": "John"}), now).unwrap();
        assert_eq!(event, Some(PresenceEvent::join("user_1", json!({"name": "John"}))));

        // Second session of the same user
        let event = state.add("a", "s2", "user_1", json!({"name": "Jack"}), now).unwrap();
        assert_eq!(event, None);

        let event = state.add("a", "s3", "user_2", json!({"name": "Alice"}), now).unwrap();
        assert!(event.is_some());

        // Another stream is another join
        let event = state.add("b", "s3", "user_2", json!({"name": "Alice"}), now).unwrap();
        assert_eq!(event.map(|e| e.id), Some("user_2".to_string()));

        let info = state.info("a", PresenceInfoOptions::default());
        assert_eq!(info.total, 2);
        assert_eq!(ids(&info), vec!["user_1", "user_2"]);

        // The latest info wins
        let records = info.records.unwrap();
        assert_eq!(records[0].info, Some(json!({"name": "Jack"})));
    }

    #[test]
    fn test_pid_mismatch() {
        let mut state = PresenceState::new(TTL);
        let now = Instant::now();

        state.add("a", "s1", "user_1", json!(null), now).unwrap();

        let err = state.add("a", "s1", "user_2", json!(null), now).unwrap_err();
        assert!(matches!(err, BrokerError::PresenceIdMismatch { .. }));
        assert_eq!(state.info("a", PresenceInfoOptions::default()).total, 1);
    }

    #[test]
    fn test_leave_after_last_session() {
        let mut state = PresenceState::new(TTL);
        let now = Instant::now();

        state.add("a", "s1", "user_1", json!("john"), now).unwrap();
        state.add("a", "s2", "user_1", json!("john"), now).unwrap();
        state.add("a", "s3", "user_2", json!("kate"), now).unwrap();

        assert_eq!(state.remove("a", "s1").unwrap(), None);
        assert_eq!(state.info("a", PresenceInfoOptions::default()).total, 2);

        assert_eq!(
            state.remove("a", "s2").unwrap(),
            Some(PresenceEvent::leave("user_1"))
        );

        let info = state.info("a", PresenceInfoOptions::total_only());
        assert_eq!(info.total, 1);
        assert!(info.records.is_none());
    }

    #[test]
    fn test_remove_unknown() {
        let mut state = PresenceState::new(TTL);
        let now = Instant::now();

        let err = state.remove("a", "s1").unwrap_err();
        assert!(matches!(err, BrokerError::PresenceNotFound { .. }));

        state.add("a", "s1", "user_1", json!(null), now).unwrap();
        let err = state.remove("b", "s1").unwrap_err();
        assert!(matches!(err, BrokerError::PresenceNotFound { .. }));
    }

    #[test]
    fn test_info_unknown_stream() {
        let state = PresenceState::new(TTL);
        let info = state.info("missing", PresenceInfoOptions::default());

        assert_eq!(info.total, 0);
        assert!(info.records.is_none());
    }

    #[test]
    fn test_expire_untouched_sessions() {
        let mut state = PresenceState::new(Duration::from_secs(1));
        let t0 = Instant::now();

        state.add("a", "s1", "user_1", json!("john"), t0).unwrap();
        state.add("a", "s2", "user_2", json!("kate"), t0).unwrap();
        state.add("b", "s2", "user_2", json!("kate"), t0).unwrap();

        state.touch("s1", t0 + Duration::from_millis(500));
        state.touch("s1", t0 + Duration::from_millis(1000));
        state.touch("s1", t0 + Duration::from_millis(1500));

        let mut events = state.expire(t0 + Duration::from_millis(2000));
        events.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(
            events,
            vec![
                ("a".to_string(), PresenceEvent::leave("user_2")),
                ("b".to_string(), PresenceEvent::leave("user_2")),
            ]
        );

        let info = state.info("a", PresenceInfoOptions::default());
        assert_eq!(ids(&info), vec!["user_1"]);
        assert_eq!(state.info("b", PresenceInfoOptions::default()).total, 0);
        assert_eq!(state.session_count(), 1);
    }

    #[test]
    fn test_expire_keeps_user_with_live_session() {
        let mut state = PresenceState::new(Duration::from_secs(1));
        let t0 = Instant::now();

        state.add("a", "s1", "user_1", json!("john"), t0).unwrap();
        state.add("a", "s3", "user_1", json!("jack"), t0 + Duration::from_secs(2)).unwrap();

        // s1 expires, but user_1 is still here through s3
        let events = state.expire(t0 + Duration::from_millis(2500));
        assert!(events.is_empty());

        let info = state.info("a", PresenceInfoOptions::default());
        assert_eq!(info.total, 1);
        assert_eq!(info.records.unwrap()[0].info, Some(json!("jack")));
    }
}

//! In-process broker backend
//!
//! Keeps stream history and session snapshots in memory. Suitable for a single
//! instance only: history is lost on restart, which is signalled to clients by
//! a new epoch.
//!
//! # Layout
//!
//! ```text
//!                  Arc<MemoryState>
//!         ┌──────────────────────────────────┐
//!         │ streams: RwLock<HashMap<name,    │
//!         │   Arc<RwLock<HistoryLog>>>>      │
//!         │ sessions: RwLock<SessionCache>   │
//!         │ presence: RwLock<PresenceState>  │
//!         │ epoch                            │
//!         └───────┬──────────────────┬───────┘
//!                 │                  │
//!        handle_broadcast()     sweep task (1s)
//!        history_from()         expire entries,
//!        history_since()        drop idle logs,
//!        presence_*()           expire sessions,
//!                               broadcast presence leaves
//! ```
//!
//! The map lock is taken only to find or create a log; appends and reads lock
//! the individual log, so a busy stream doesn't block the others. A log dropped
//! by the sweep is marked retired first; writers that looked it up just before
//! look it up again.

mod broker;
mod history;
mod presence;
mod sessions;

pub use broker::MemoryBroker;

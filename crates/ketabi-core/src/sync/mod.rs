//! Sync engine
//!
//! Persists the store's changes to the project file.
//!
//! ## Protocol
//!
//! - The store sends partial updates (`{ pages }` or `{ meta }`) as it edits
//! - Updates received while a write is pending fold into one payload, and
//!   each one restarts the debounce timer
//! - When the timer fires the payload is merged onto the last written
//!   snapshot and written; only one write is ever in flight
//! - A failed write keeps its payload for the next attempt

pub mod engine;
pub mod merge;
pub mod schedule;

pub use engine::{spawn_sync_engine, SyncEvent, SyncHandle, SyncState};
pub use merge::merge;
pub use schedule::{cancel, schedule, TaskHandle};

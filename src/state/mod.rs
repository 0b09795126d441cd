//! State management for Strata.
//!
//! This module provides persistent state storage for tracking managed
//! resources: the snapshot types, the pluggable [`StateStore`] interface
//! with local-file and in-memory backends, locking, and the
//! [`WorkingState`] that graph walks write into.

mod local;
mod lock;
mod memory;
mod store;
mod types;
mod working;

pub use local::{LocalStateStore, STATE_DIR, STATE_FILE};
pub use lock::{generate_holder_id, LockInfo, LOCK_EXPIRY_SECS};
pub use memory::MemoryStateStore;
pub use store::StateStore;
pub use types::{
    fingerprint, HistoryEntry, Operation, OutputRecord, ResourceRecord, State, STATE_VERSION,
};
pub use working::WorkingState;

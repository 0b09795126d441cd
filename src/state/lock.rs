//! State locking.
//!
//! A lock guards a state snapshot for the duration of one command that may
//! write it. Locks expire so a crashed process does not block forever;
//! `state unlock --force` removes a live one.

use crate::error::StateError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lock expiry duration in seconds.
pub const LOCK_EXPIRY_SECS: i64 = 900;

/// A lock record, as written next to the state it guards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockInfo {
    /// Unique lock identifier, needed to release the lock.
    pub lock_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// The command that took the lock.
    #[serde(default)]
    pub operation: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock stops counting.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    /// Creates a lock for `operation`. An empty holder is replaced with
    /// [`generate_holder_id`].
    #[must_use]
    pub fn new(holder: &str, operation: &str) -> Self {
        let acquired_at = Utc::now();
        let holder = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };
        Self {
            lock_id: Uuid::new_v4().to_string(),
            holder,
            operation: operation.to_string(),
            acquired_at,
            expires_at: acquired_at + Duration::seconds(LOCK_EXPIRY_SECS),
        }
    }

    /// True once the lock may be taken over.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Seconds until the lock may be taken over, never negative.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }

    /// The error returned to anyone who asks for this lock while it is live.
    #[must_use]
    pub fn conflict(&self) -> StateError {
        StateError::LockedByOther {
            holder: self.holder.clone(),
            operation: self.operation.clone(),
            since: self.acquired_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        }
    }
}

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock {} held by {}", self.lock_id, self.holder)?;
        if !self.operation.is_empty() {
            write!(f, " for {}", self.operation)?;
        }
        write!(f, " since {}", self.acquired_at.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

/// Identifies this process as a lock holder: `host:pid/suffix`.
#[must_use]
pub fn generate_holder_id() -> String {
    let host = hostname::get().map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().into_owned());
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{host}:{}/{}", std::process::id(), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_lock_is_live() {
        let lock = LockInfo::new("ci-runner", "apply");
        assert_eq!(lock.holder, "ci-runner");
        assert!(!lock.is_expired());
        assert!(lock.remaining_secs() > LOCK_EXPIRY_SECS - 5);
        assert!(lock.to_string().contains("held by ci-runner for apply"));
    }

    #[test]
    fn test_empty_holder_is_generated() {
        let lock = LockInfo::new("", "refresh");
        assert!(lock.holder.contains(&format!(":{}/", std::process::id())));
        assert_ne!(generate_holder_id(), generate_holder_id());
    }

    #[test]
    fn test_expired_lock() {
        let mut lock = LockInfo::new("ci-runner", "plan");
        lock.expires_at = Utc::now() - Duration::seconds(1);
        assert!(lock.is_expired());
        assert_eq!(lock.remaining_secs(), 0);
    }

    #[test]
    fn test_conflict_names_holder_and_operation() {
        let lock = LockInfo::new("ci-runner", "destroy");
        let message = lock.conflict().to_string();
        assert!(message.contains("ci-runner"));
        assert!(message.contains("destroy"));
    }
}

//! Mutable state shared by the nodes of one walk.
//!
//! Each node writes only its own address, so writers never contend for the
//! same entry; the lock only keeps the map itself consistent. The walk
//! ends with a single [`WorkingState::commit`] that produces the next
//! snapshot.

use super::types::{HistoryEntry, Operation, OutputRecord, ResourceRecord, State};
use crate::addrs::ResourceAddress;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

/// Working copy of a state snapshot.
#[derive(Debug)]
pub struct WorkingState {
    prior: State,
    resources: RwLock<BTreeMap<ResourceAddress, ResourceRecord>>,
    outputs: RwLock<BTreeMap<String, OutputRecord>>,
}

impl WorkingState {
    /// Starts from a copy of `prior`.
    #[must_use]
    pub fn new(prior: State) -> Self {
        Self {
            resources: RwLock::new(prior.resources.clone()),
            outputs: RwLock::new(prior.outputs.clone()),
            prior,
        }
    }

    /// The snapshot this working copy started from.
    #[must_use]
    pub const fn prior(&self) -> &State {
        &self.prior
    }

    /// Reads the current record at `address`.
    #[must_use]
    pub fn get(&self, address: &ResourceAddress) -> Option<ResourceRecord> {
        self.resources.read().get(address).cloned()
    }

    /// Writes the record for its address.
    pub fn put(&self, record: ResourceRecord) {
        debug!("Working state: put {}", record.address);
        self.resources.write().insert(record.address.clone(), record);
    }

    /// Removes the record at `address`.
    pub fn remove(&self, address: &ResourceAddress) -> Option<ResourceRecord> {
        debug!("Working state: remove {address}");
        self.resources.write().remove(address)
    }

    /// All current addresses, in order.
    #[must_use]
    pub fn addresses(&self) -> Vec<ResourceAddress> {
        self.resources.read().keys().cloned().collect()
    }

    /// Records a root output value.
    pub fn set_output(&self, name: impl Into<String>, record: OutputRecord) {
        self.outputs.write().insert(name.into(), record);
    }

    /// Drops every output not in `keep`.
    pub fn retain_outputs(&self, keep: impl Fn(&str) -> bool) {
        self.outputs.write().retain(|name, _| keep(name));
    }

    /// The current contents as a snapshot, without touching serial or history.
    #[must_use]
    pub fn snapshot(&self) -> State {
        let mut state = self.prior.clone();
        state.resources = self.resources.read().clone();
        state.outputs = self.outputs.read().clone();
        state
    }

    /// Builds the next snapshot.
    ///
    /// Lineage is kept. The serial increments only when resources or outputs
    /// changed, so an apply without changes leaves the fingerprint alone.
    #[must_use]
    pub fn commit(&self, operation: Operation, error: Option<String>) -> State {
        let resources = self.resources.read().clone();
        let outputs = self.outputs.read().clone();

        let changed: Vec<String> = {
            let before = &self.prior.resources;
            let mut changed: Vec<String> = resources
                .iter()
                .filter(|(addr, rec)| before.get(*addr) != Some(*rec))
                .map(|(addr, _)| addr.to_string())
                .collect();
            changed.extend(
                before
                    .keys()
                    .filter(|addr| !resources.contains_key(*addr))
                    .map(ToString::to_string),
            );
            changed.sort();
            changed
        };

        let mut next = self.prior.clone();
        next.resources = resources;
        next.outputs = outputs;
        if !next.same_content(&self.prior) {
            next.serial += 1;
            next.last_updated = Utc::now();
        }

        let entry = HistoryEntry::new(operation, next.serial, changed);
        next.add_history(match error {
            Some(message) => entry.failed(message),
            None => entry,
        });
        next
    }
}

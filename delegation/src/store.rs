// delegation/src/store.rs
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

use crate::clock::Clock;

/// Authority a wallet address has delegated to an ephemeral key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegation {
    pub address: String,
    pub ephemeral_public_key: String,
    pub expires_at: DateTime<Utc>,
    pub counter: u64,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

/// Delegation summary returned to the client after login
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationDescriptor {
    pub ephemeral_public_key: String,
    pub expiration: DateTime<Utc>,
    pub counter: u64,
}

impl Delegation {
    /// New record with a zero counter; address and key are lowercased
    pub fn new(
        address: &str,
        ephemeral_public_key: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            address: address.trim().to_lowercase(),
            ephemeral_public_key: ephemeral_public_key.trim().to_lowercase(),
            expires_at,
            counter: 0,
            created_at: now,
            last_used: now,
        }
    }

    pub fn with_counter(mut self, counter: u64) -> Self {
        self.counter = counter;
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Record an accepted message
    pub fn record_use(&mut self, counter: u64, now: DateTime<Utc>) {
        self.counter = counter;
        self.last_used = now;
    }

    pub fn descriptor(&self) -> DelegationDescriptor {
        DelegationDescriptor {
            ephemeral_public_key: self.ephemeral_public_key.clone(),
            expiration: self.expires_at,
            counter: self.counter,
        }
    }
}

/// What `put` did with the incoming record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// No record existed for the address
    Inserted,
    /// A different key replaced the previous one; counter reset to zero
    Rotated,
    /// Same key re-delegated; counter kept at the larger of the two
    Refreshed,
}

fn normalize(address: &str) -> String {
    address.trim().to_lowercase()
}

/// At most one delegation per address, sharded by address
pub struct DelegationStore {
    records: DashMap<String, Delegation>,
    clock: Arc<dyn Clock>,
}

impl DelegationStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    /// Current delegation for `address`; an expired record is removed and reported absent
    pub fn get(&self, address: &str) -> Option<Delegation> {
        self.with_active(address, |delegation| delegation.clone())
    }

    /// Run `f` against the live record while holding its shard lock, so a
    /// read-compare-write sequence for one address cannot interleave with another.
    pub fn with_active<R>(
        &self,
        address: &str,
        f: impl FnOnce(&mut Delegation) -> R,
    ) -> Option<R> {
        let now = self.clock.now();
        match self.records.entry(normalize(address)) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.remove();
                    tracing::debug!("Dropped expired delegation for {}", normalize(address));
                    None
                } else {
                    Some(f(entry.get_mut()))
                }
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Insert or merge `incoming`, returning what happened and the record as
    /// stored, both read under the same entry lock.
    pub fn put(&self, incoming: Delegation) -> (PutOutcome, Delegation) {
        let mut incoming = incoming;
        incoming.address = normalize(&incoming.address);
        incoming.ephemeral_public_key = incoming.ephemeral_public_key.trim().to_lowercase();

        match self.records.entry(incoming.address.clone()) {
            Entry::Vacant(entry) => {
                let stored = entry.insert(incoming).clone();
                (PutOutcome::Inserted, stored)
            }
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                if existing.ephemeral_public_key != incoming.ephemeral_public_key {
                    // A new key starts a new signing stream
                    incoming.counter = 0;
                    *existing = incoming;
                    (PutOutcome::Rotated, existing.clone())
                } else {
                    existing.counter = existing.counter.max(incoming.counter);
                    existing.expires_at = incoming.expires_at;
                    existing.last_used = incoming.last_used;
                    (PutOutcome::Refreshed, existing.clone())
                }
            }
        }
    }

    /// Set the stored counter; false when the address has no record. The
    /// validator advances counters through `with_active` instead, which is the
    /// same update made under the entry lock it already holds.
    pub fn update_counter(&self, address: &str, counter: u64) -> bool {
        let now = self.clock.now();
        match self.records.get_mut(&normalize(address)) {
            Some(mut delegation) => {
                delegation.record_use(counter, now);
                true
            }
            None => false,
        }
    }

    /// Explicit logout
    pub fn remove(&self, address: &str) -> Option<Delegation> {
        self.records.remove(&normalize(address)).map(|(_, d)| d)
    }

    /// Drop expired delegations, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.records.retain(|_, delegation| {
            let keep = !delegation.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

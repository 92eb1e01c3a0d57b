// delegation/src/replay.rs
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

use crate::error::RejectReason;

/// Accepted message remembered for duplicate and burst detection
#[derive(Debug, Clone)]
pub struct ReplayCacheEntry {
    pub counter: u64,
    pub ephemeral_public_key: String,
    pub message_digest: [u8; 32],
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct ReplayPolicy {
    pub retention: Duration,
    pub burst_window: Duration,
    pub burst_limit: usize,
    pub capacity_per_address: usize,
}

impl Default for ReplayPolicy {
    fn default() -> Self {
        Self {
            retention: Duration::minutes(5),
            burst_window: Duration::seconds(10),
            burst_limit: 10,
            capacity_per_address: 128,
        }
    }
}

/// Recently accepted `(address, counter)` pairs, oldest first per address
pub struct ReplayCache {
    histories: DashMap<String, VecDeque<ReplayCacheEntry>>,
    policy: ReplayPolicy,
}

impl ReplayCache {
    pub fn new(policy: ReplayPolicy) -> Self {
        Self {
            histories: DashMap::new(),
            policy,
        }
    }

    /// Reject a duplicate `(address, counter)` under the same key, or a sender over
    /// the burst ceiling; otherwise remember the message.
    pub fn check_and_record(
        &self,
        address: &str,
        ephemeral_public_key: &str,
        counter: u64,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RejectReason> {
        let mut history = self.histories.entry(address.to_string()).or_insert_with(VecDeque::new);

        let cutoff = now - self.policy.retention;
        while history.front().is_some_and(|e| e.accepted_at <= cutoff) {
            history.pop_front();
        }

        if history
            .iter()
            .any(|e| e.counter == counter && e.ephemeral_public_key == ephemeral_public_key)
        {
            return Err(RejectReason::Replay);
        }

        let burst_start = now - self.policy.burst_window;
        let recent = history.iter().filter(|e| e.accepted_at > burst_start).count();
        if recent >= self.policy.burst_limit {
            return Err(RejectReason::Flood);
        }

        history.push_back(ReplayCacheEntry {
            counter,
            ephemeral_public_key: ephemeral_public_key.to_string(),
            message_digest: Sha256::digest(message.as_bytes()).into(),
            accepted_at: now,
        });
        while history.len() > self.policy.capacity_per_address {
            history.pop_front();
        }

        Ok(())
    }

    /// Drop entries older than the retention window, returning how many were removed
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.policy.retention;
        let mut removed = 0;
        self.histories.retain(|_, history| {
            while history.front().is_some_and(|e| e.accepted_at <= cutoff) {
                history.pop_front();
                removed += 1;
            }
            !history.is_empty()
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.histories.iter().map(|h| h.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x71c7656ec7ab88b098defb751b7401b5f6d8976f";
    const K1: &str = "0x1111111111111111111111111111111111111111";
    const K2: &str = "0x2222222222222222222222222222222222222222";

    #[test]
    fn duplicate_counter_is_replay() {
        let cache = ReplayCache::new(ReplayPolicy::default());
        let now = Utc::now();
        assert!(cache.check_and_record(ADDR, K1, 7, "hi", now).is_ok());
        assert_eq!(cache.check_and_record(ADDR, K1, 7, "hi", now), Err(RejectReason::Replay));
    }

    #[test]
    fn same_counter_under_new_key_is_not_replay() {
        let cache = ReplayCache::new(ReplayPolicy::default());
        let now = Utc::now();
        cache.check_and_record(ADDR, K1, 1, "hi", now).unwrap();
        assert!(cache.check_and_record(ADDR, K2, 1, "hi", now).is_ok());
    }

    #[test]
    fn burst_ceiling_is_enforced_per_window() {
        let cache = ReplayCache::new(ReplayPolicy::default());
        let now = Utc::now();
        for counter in 1..=10 {
            cache.check_and_record(ADDR, K1, counter, "m", now).unwrap();
        }
        assert_eq!(cache.check_and_record(ADDR, K1, 11, "m", now), Err(RejectReason::Flood));

        // Another sender is unaffected
        assert!(cache.check_and_record(K2, K2, 1, "m", now).is_ok());

        // Once the window passes the sender may continue
        let later = now + Duration::seconds(11);
        assert!(cache.check_and_record(ADDR, K1, 11, "m", later).is_ok());
    }

    #[test]
    fn entries_expire_after_retention() {
        let cache = ReplayCache::new(ReplayPolicy::default());
        let now = Utc::now();
        cache.check_and_record(ADDR, K1, 3, "m", now).unwrap();
        cache.check_and_record(K2, K2, 1, "m", now + Duration::minutes(3)).unwrap();

        assert_eq!(cache.sweep(now + Duration::minutes(6)), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.check_and_record(ADDR, K1, 3, "m", now + Duration::minutes(6)).is_ok());
    }

    #[test]
    fn capacity_bounds_history() {
        let policy = ReplayPolicy {
            burst_limit: 1000,
            capacity_per_address: 4,
            ..ReplayPolicy::default()
        };
        let cache = ReplayCache::new(policy);
        let now = Utc::now();
        for counter in 1..=10 {
            cache.check_and_record(ADDR, K1, counter, "m", now).unwrap();
        }
        assert_eq!(cache.len(), 4);
    }
}

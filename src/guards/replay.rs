//! Replay detection over command hashes.
//!
//! Remembers the hex hash of every accepted command and flags duplicates
//! inside the replay window. The stored timestamp is not refreshed on a
//! hit, so a replay storm cannot keep its own hash warm forever.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// Replay guard tuning.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Entries older than `window * prune_factor` are dropped.
    pub prune_factor: u32,
    /// Map size that triggers opportunistic pruning.
    pub max_entries: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            prune_factor: 10,
            max_entries: 4096,
        }
    }
}

/// Duplicate-command detector keyed by hex command hash.
///
/// The window is passed per call because it tracks the live security
/// configuration, which can change between commands.
pub struct ReplayGuard {
    seen: DashMap<String, Instant>,
    config: ReplayConfig,
}

impl ReplayGuard {
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            seen: DashMap::new(),
            config,
        }
    }

    /// Record a hash with the wall clock. True means replay.
    pub fn observe(&self, hash: &str, window: Duration) -> bool {
        self.observe_at(hash, window, Instant::now())
    }

    /// Record a hash. True when the same hash was seen strictly inside the
    /// window; an expired entry is re-armed at `now` instead.
    pub fn observe_at(&self, hash: &str, window: Duration, now: Instant) -> bool {
        if self.seen.len() > self.config.max_entries {
            self.prune_at(window, now);
        }

        match self.seen.entry(hash.to_string()) {
            Entry::Occupied(mut entry) => {
                if now.saturating_duration_since(*entry.get()) < window {
                    true
                } else {
                    *entry.get_mut() = now;
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                false
            }
        }
    }

    /// Remove entries past the retention horizon.
    pub fn prune_at(&self, window: Duration, now: Instant) {
        let horizon = window.saturating_mul(self.config.prune_factor);
        self.seen
            .retain(|_, seen_at| now.saturating_duration_since(*seen_at) <= horizon);
    }

    /// Drop all remembered hashes.
    pub fn flush(&self) {
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Canonical replay key: hex sha-256 over the speaker, the normalized
/// transcript, and the client-supplied timestamp.
pub fn command_hash(user_id: &str, command: &str, timestamp_ms: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(command.as_bytes());
    hasher.update(b":");
    hasher.update(timestamp_ms.to_le_bytes());
    hex::encode(hasher.finalize())
}

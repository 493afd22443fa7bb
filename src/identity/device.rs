//! Device fingerprints and the known-device registry.
//!
//! A fingerprint hashes whatever traits the client reports. The registry
//! remembers which hashes each user has been seen with; an unfamiliar hash
//! raises risk downstream but never denies on its own.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable identity for a client device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    /// Hex sha-256 over the sorted components.
    pub hash: String,
    pub components: BTreeMap<String, String>,
}

impl DeviceFingerprint {
    /// Hash the component map. The map is ordered, so two devices reporting
    /// the same traits in any order produce the same hash.
    pub fn from_components(components: BTreeMap<String, String>) -> Self {
        let mut hasher = Sha256::new();
        for (key, value) in &components {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"|");
        }
        Self {
            hash: hex::encode(hasher.finalize()),
            components,
        }
    }
}

/// Sighting record for one device hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownDevice {
    pub fingerprint: DeviceFingerprint,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Devices seen per user.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: DashMap<String, Vec<KnownDevice>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sighting with the wall clock.
    pub fn register(&self, user_id: &str, fingerprint: &DeviceFingerprint) -> bool {
        self.register_at(user_id, fingerprint, Utc::now())
    }

    /// Register a sighting. Returns true when the hash is new for this user;
    /// a repeat sighting only refreshes `last_seen`.
    pub fn register_at(
        &self,
        user_id: &str,
        fingerprint: &DeviceFingerprint,
        now: DateTime<Utc>,
    ) -> bool {
        let mut devices = self.devices.entry(user_id.to_string()).or_default();
        if let Some(known) = devices
            .iter_mut()
            .find(|d| d.fingerprint.hash == fingerprint.hash)
        {
            known.last_seen = now;
            false
        } else {
            devices.push(KnownDevice {
                fingerprint: fingerprint.clone(),
                first_seen: now,
                last_seen: now,
            });
            true
        }
    }

    /// Whether this user has been seen with this device hash.
    pub fn is_known(&self, user_id: &str, hash: &str) -> bool {
        self.devices
            .get(user_id)
            .map_or(false, |devices| {
                devices.iter().any(|d| d.fingerprint.hash == hash)
            })
    }

    /// Whether this user has any registered device at all.
    pub fn has_any(&self, user_id: &str) -> bool {
        self.devices
            .get(user_id)
            .map_or(false, |devices| !devices.is_empty())
    }

    pub fn devices_for(&self, user_id: &str) -> Vec<KnownDevice> {
        self.devices
            .get(user_id)
            .map_or_else(Vec::new, |devices| devices.clone())
    }

    /// Total registered devices across all users.
    pub fn device_count(&self) -> usize {
        self.devices.iter().map(|entry| entry.value().len()).sum()
    }

    /// Drop devices not seen since `cutoff`; users left with none disappear.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) {
        self.devices.retain(|_, devices| {
            devices.retain(|d| d.last_seen >= cutoff);
            !devices.is_empty()
        });
    }

    /// Ordered copy of the whole registry, for at-rest persistence.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<KnownDevice>> {
        self.devices
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Replace the registry contents with a snapshot.
    pub fn restore(&self, snapshot: BTreeMap<String, Vec<KnownDevice>>) {
        self.devices.clear();
        for (user_id, devices) in snapshot {
            self.devices.insert(user_id, devices);
        }
    }
}

#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Persisted state of the Restraint Warden engine.
//!
//! The [`Store`] owns the [`StoredData`] record: per-victim chaos cooldowns,
//! the best-known safe spot of every destination, the per-destination
//! blacklist of rejected spots, and a bounded audit log. The record is keyed
//! by a world identity string; opening the store for a different world wipes
//! everything recorded for the previous one.

use std::collections::{BTreeMap, VecDeque};

use glam::Vec3;
use restraint_warden_core::{ActorId, Choice, Destination, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

mod backend;

pub use backend::{JsonFileBackend, MemoryBackend, RecordBackend, StoreError};

/// Maximum number of audit log entries retained.
pub const LOG_CAPACITY: usize = 2_000;

/// Serializable record written by storage backends.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredData {
    /// Identity of the world the record belongs to.
    pub world_id: String,
    /// Last chaos trigger per victim.
    pub cooldowns: BTreeMap<ActorId, Timestamp>,
    /// Best-known safe spot per destination.
    pub cached_spots: BTreeMap<Destination, Vec3>,
    /// Rejected spots per destination, oldest first.
    pub blacklists: BTreeMap<Destination, Vec<Vec3>>,
    /// Audit log, oldest first.
    pub log: VecDeque<LogEntry>,
}

/// Audit record of a single enforcement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the limit was enforced.
    pub at: Timestamp,
    /// Released actor.
    pub victim: ActorId,
    /// Display name of the released actor at enforcement time.
    pub victim_name: String,
    /// Episode length in whole seconds.
    pub duration_secs: u64,
    /// Destination the actor was sent to.
    pub destination: Destination,
    /// Choice recorded during the episode.
    pub choice: Choice,
    /// Whether the chaos effect triggered.
    pub chaos_triggered: bool,
}

/// Parameters governing blacklist membership and size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlacklistPolicy {
    /// Points closer than this to a listed point count as blacklisted; zero disables.
    pub min_distance: f32,
    /// Maximum entries kept per destination; zero keeps every entry.
    pub capacity: usize,
}

impl Default for BlacklistPolicy {
    fn default() -> Self {
        Self {
            min_distance: 6.0,
            capacity: 50,
        }
    }
}

/// Owner of the persisted record and its backend.
pub struct Store {
    data: StoredData,
    backend: Box<dyn RecordBackend>,
    policy: BlacklistPolicy,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("data", &self.data)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Loads the record from the backend for the provided world.
    ///
    /// An unreadable record is replaced by an empty one. A record that belongs
    /// to a different world is wiped.
    pub fn open(
        mut backend: Box<dyn RecordBackend>,
        world_id: &str,
        policy: BlacklistPolicy,
    ) -> Self {
        let data = match backend.load() {
            Ok(Some(data)) => data,
            Ok(None) => StoredData::default(),
            Err(error) => {
                warn!(%error, "stored record unreadable; starting from an empty record");
                StoredData::default()
            }
        };

        let mut store = Self {
            data,
            backend,
            policy,
        };
        if store.data.world_id != world_id {
            store.wipe(world_id, "world identity changed");
        }
        store
    }

    /// Read-only access to the record.
    #[must_use]
    pub fn data(&self) -> &StoredData {
        &self.data
    }

    /// Blacklist parameters in effect.
    #[must_use]
    pub fn policy(&self) -> BlacklistPolicy {
        self.policy
    }

    /// Clears every entry and rebinds the record to `world_id`.
    pub fn wipe(&mut self, world_id: &str, reason: &str) {
        self.data = StoredData {
            world_id: world_id.to_owned(),
            ..StoredData::default()
        };
        self.flush();
        info!(world_id, reason, "stored data wiped");
    }

    /// Writes the record to the backend, logging failures.
    pub fn flush(&mut self) {
        if let Err(error) = self.backend.save(&self.data) {
            warn!(%error, "failed to save stored record");
        }
    }

    /// Best-known safe spot for the destination.
    #[must_use]
    pub fn cached_spot(&self, destination: Destination) -> Option<Vec3> {
        self.data.cached_spots.get(&destination).copied()
    }

    /// Records a confirmed safe spot, overwriting any previous one.
    pub fn cache_spot(&mut self, destination: Destination, spot: Vec3) {
        let _ = self.data.cached_spots.insert(destination, spot);
        self.flush();
    }

    /// Removes and returns the cached spot for the destination.
    pub fn evict_cached_spot(&mut self, destination: Destination) -> Option<Vec3> {
        let evicted = self.data.cached_spots.remove(&destination);
        if evicted.is_some() {
            self.flush();
        }
        evicted
    }

    /// Rejected spots recorded for the destination, oldest first.
    #[must_use]
    pub fn blacklist(&self, destination: Destination) -> &[Vec3] {
        self.data
            .blacklists
            .get(&destination)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Reports whether the candidate lies within the minimum distance of a rejected spot.
    #[must_use]
    pub fn is_blacklisted(&self, destination: Destination, candidate: Vec3) -> bool {
        let min_distance = self.policy.min_distance;
        if min_distance <= 0.0 {
            return false;
        }
        let limit = min_distance * min_distance;
        self.blacklist(destination)
            .iter()
            .any(|spot| candidate.distance_squared(*spot) <= limit)
    }

    /// Adds a rejected spot unless it is already covered, evicting the oldest
    /// entries beyond capacity.
    pub fn add_to_blacklist(&mut self, destination: Destination, spot: Vec3) {
        let covered = self.is_blacklisted(destination, spot);
        let capacity = self.policy.capacity;
        let list = self.data.blacklists.entry(destination).or_default();
        if !covered {
            list.push(spot);
        }
        if capacity > 0 && list.len() > capacity {
            let excess = list.len() - capacity;
            let _ = list.drain(..excess);
        }
        self.flush();
    }

    /// Last chaos trigger recorded for the victim.
    #[must_use]
    pub fn last_chaos(&self, victim: ActorId) -> Option<Timestamp> {
        self.data.cooldowns.get(&victim).copied()
    }

    /// Records a chaos trigger for the victim.
    pub fn mark_chaos(&mut self, victim: ActorId, at: Timestamp) {
        let _ = self.data.cooldowns.insert(victim, at);
        self.flush();
    }

    /// Appends an audit entry, evicting the oldest beyond [`LOG_CAPACITY`].
    pub fn append_log(&mut self, entry: LogEntry) {
        self.data.log.push_back(entry);
        while self.data.log.len() > LOG_CAPACITY {
            let _ = self.data.log.pop_front();
        }
        self.flush();
    }

    /// Audit entries, oldest first.
    pub fn log(&self) -> impl Iterator<Item = &LogEntry> {
        self.data.log.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(policy: BlacklistPolicy) -> Store {
        Store::open(Box::new(MemoryBackend::new()), "world", policy)
    }

    #[test]
    fn covered_spots_are_not_listed_twice() {
        let mut store = store_with(BlacklistPolicy::default());
        store.add_to_blacklist(Destination::Outpost, Vec3::ZERO);
        store.add_to_blacklist(Destination::Outpost, Vec3::new(1.0, 0.0, 0.0));

        assert_eq!(store.blacklist(Destination::Outpost), &[Vec3::ZERO]);
    }

    #[test]
    fn zero_min_distance_disables_blacklist_checks() {
        let mut store = store_with(BlacklistPolicy {
            min_distance: 0.0,
            capacity: 10,
        });
        store.add_to_blacklist(Destination::Outpost, Vec3::ZERO);

        assert!(!store.is_blacklisted(Destination::Outpost, Vec3::ZERO));
        assert_eq!(store.blacklist(Destination::Outpost).len(), 1);
    }
}

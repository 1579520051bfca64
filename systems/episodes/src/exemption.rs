//! Time-bounded cache of exemption permission lookups.

use std::{collections::BTreeMap, time::Duration};

use restraint_warden_core::{host::Permissions, ActorId, Timestamp, PERMISSION_EXEMPT};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CachedLookup {
    exempt: bool,
    expires_at: Timestamp,
}

/// Caches whether actors hold the exemption permission.
#[derive(Debug, Default)]
pub struct ExemptionCache {
    ttl: Duration,
    entries: BTreeMap<ActorId, CachedLookup>,
}

impl ExemptionCache {
    /// Creates a cache whose entries live for `ttl`; zero disables caching.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: BTreeMap::new(),
        }
    }

    /// Reports whether the actor is exempt, consulting the host when the
    /// cached lookup is missing or stale.
    pub fn is_exempt<P>(&mut self, actor: ActorId, now: Timestamp, permissions: &P) -> bool
    where
        P: Permissions + ?Sized,
    {
        if self.ttl.is_zero() {
            return permissions.has_permission(actor, PERMISSION_EXEMPT);
        }

        if let Some(cached) = self.entries.get(&actor) {
            if cached.expires_at > now {
                return cached.exempt;
            }
        }

        let exempt = permissions.has_permission(actor, PERMISSION_EXEMPT);
        let _ = self.entries.insert(
            actor,
            CachedLookup {
                exempt,
                expires_at: now.saturating_add(self.ttl),
            },
        );
        exempt
    }

    /// Forgets the cached lookup for the actor.
    pub fn forget(&mut self, actor: ActorId) {
        let _ = self.entries.remove(&actor);
    }

    /// Forgets every cached lookup.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

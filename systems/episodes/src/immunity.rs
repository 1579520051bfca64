//! Post-enforcement immunity windows.

use std::{collections::BTreeMap, time::Duration};

use restraint_warden_core::{ActorId, Timestamp};

/// Tracks actors that must not be restrained again for a while.
#[derive(Debug, Default)]
pub struct ImmunityTable {
    expiries: BTreeMap<ActorId, Timestamp>,
}

impl ImmunityTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants immunity lasting `duration` from `now`. Zero durations are ignored.
    pub fn grant(&mut self, actor: ActorId, now: Timestamp, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let _ = self.expiries.insert(actor, now.saturating_add(duration));
    }

    /// Reports whether the actor is immune at `now`, dropping a lapsed record.
    pub fn is_immune(&mut self, actor: ActorId, now: Timestamp) -> bool {
        match self.expiries.get(&actor) {
            Some(expires_at) if *expires_at > now => true,
            Some(_) => {
                let _ = self.expiries.remove(&actor);
                false
            }
            None => false,
        }
    }

    /// When the actor's immunity ends.
    #[must_use]
    pub fn expires_at(&self, actor: ActorId) -> Option<Timestamp> {
        self.expiries.get(&actor).copied()
    }

    /// Removes the actor's immunity.
    pub fn revoke(&mut self, actor: ActorId) {
        let _ = self.expiries.remove(&actor);
    }

    /// Removes every immunity.
    pub fn clear(&mut self) {
        self.expiries.clear();
    }
}

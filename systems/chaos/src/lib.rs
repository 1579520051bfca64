#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Chaos subsystem that decides whether a punitive effect follows enforcement.
//!
//! The gates run in a fixed order and the first failing one vetoes the
//! effect. Each victim can trigger the effect at most once per cooldown; the
//! last trigger time is persisted in the store so the cooldown survives
//! restarts.

use std::time::Duration;

use glam::Vec3;
use restraint_warden_core::{
    host::{WorldControl, WorldQuery},
    ActorId, ChaosVeto, Choice, Event, Timestamp,
};
use restraint_warden_store::Store;
use tracing::{info, warn};

/// Configuration parameters required to construct the chaos subsystem.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    enabled: bool,
    outside_safe_areas_only: bool,
    fuse: Duration,
    cooldown: Duration,
    crowd_radius: Option<f32>,
    crowd_cap: usize,
    requires_choice: bool,
}

impl Config {
    /// Creates a configuration that triggers only outside safe areas, with the
    /// given fuse and per-victim cooldown (zero disables the cooldown).
    #[must_use]
    pub const fn new(enabled: bool, fuse: Duration, cooldown: Duration) -> Self {
        Self {
            enabled,
            outside_safe_areas_only: true,
            fuse,
            cooldown,
            crowd_radius: None,
            crowd_cap: 0,
            requires_choice: false,
        }
    }

    /// Allows or forbids triggering at origins inside safe areas.
    #[must_use]
    pub const fn with_outside_safe_areas_only(mut self, only: bool) -> Self {
        self.outside_safe_areas_only = only;
        self
    }

    /// Vetoes the effect when more than `cap` other actors stand within `radius`.
    #[must_use]
    pub const fn with_crowd_limit(mut self, radius: f32, cap: usize) -> Self {
        self.crowd_radius = Some(radius);
        self.crowd_cap = cap;
        self
    }

    /// Requires the victim to have chosen to punish.
    #[must_use]
    pub const fn with_required_choice(mut self, required: bool) -> Self {
        self.requires_choice = required;
        self
    }

    /// Whether the subsystem is enabled.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Fuse handed to the host when spawning the effect.
    #[must_use]
    pub const fn fuse(&self) -> Duration {
        self.fuse
    }

    /// Per-victim cooldown; zero disables it.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(false, Duration::from_secs(10), Duration::from_secs(1_440 * 60))
    }
}

/// Facts about an enforcement the gates are evaluated against.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Enforcement {
    /// Released victim.
    pub victim: ActorId,
    /// Victim position before relocation.
    pub origin: Vec3,
    /// Whether the origin was inside a safe area.
    pub origin_in_safe_area: bool,
    /// Choice recorded during the episode.
    pub choice: Choice,
}

/// Pure gatekeeper over the chaos effect.
#[derive(Clone, Debug, Default)]
pub struct Chaos {
    config: Config,
}

impl Chaos {
    /// Creates the subsystem using the supplied configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Runs every gate without side effects.
    pub fn evaluate<W>(
        &self,
        enforcement: &Enforcement,
        now: Timestamp,
        world: &W,
        store: &Store,
    ) -> Result<(), ChaosVeto>
    where
        W: WorldQuery + ?Sized,
    {
        if !self.config.enabled {
            return Err(ChaosVeto::Disabled);
        }
        if self.config.requires_choice && enforcement.choice != Choice::Punish {
            return Err(ChaosVeto::NotChosen);
        }
        if self.config.outside_safe_areas_only && enforcement.origin_in_safe_area {
            return Err(ChaosVeto::SafeOrigin);
        }
        if let Some(radius) = self.config.crowd_radius {
            let crowd = population(world, enforcement.victim, enforcement.origin, radius);
            if crowd > self.config.crowd_cap {
                return Err(ChaosVeto::Crowded);
            }
        }
        if !self.cooldown_elapsed(enforcement.victim, now, store) {
            return Err(ChaosVeto::CoolingDown);
        }
        Ok(())
    }

    /// Evaluates the gates and, when they pass, spawns the effect and records
    /// the trigger. Returns whether the effect was spawned.
    pub fn trigger<H>(
        &self,
        enforcement: &Enforcement,
        now: Timestamp,
        host: &mut H,
        store: &mut Store,
        events: &mut Vec<Event>,
    ) -> bool
    where
        H: WorldQuery + WorldControl + ?Sized,
    {
        let victim = enforcement.victim;
        let veto = self.evaluate(enforcement, now, &*host, store).and_then(|()| {
            host.spawn_punitive_effect(enforcement.origin, self.config.fuse)
                .map_err(|error| {
                    warn!(%victim, %error, "failed to spawn punitive effect");
                    ChaosVeto::SpawnFailed
                })
        });

        match veto {
            Ok(()) => {
                store.mark_chaos(victim, now);
                info!(%victim, origin = ?enforcement.origin, "punitive effect spawned");
                events.push(Event::ChaosTriggered {
                    actor: victim,
                    origin: enforcement.origin,
                });
                true
            }
            Err(reason) => {
                events.push(Event::ChaosSkipped {
                    actor: victim,
                    reason,
                });
                false
            }
        }
    }

    /// Reports whether the victim's cooldown elapsed at `now`.
    #[must_use]
    pub fn cooldown_elapsed(&self, victim: ActorId, now: Timestamp, store: &Store) -> bool {
        if self.config.cooldown.is_zero() {
            return true;
        }
        store
            .last_chaos(victim)
            .map_or(true, |last| now.saturating_since(last) >= self.config.cooldown)
    }
}

fn population<W>(world: &W, victim: ActorId, origin: Vec3, radius: f32) -> usize
where
    W: WorldQuery + ?Sized,
{
    let limit = radius.max(0.0) * radius.max(0.0);
    world
        .connected_actors()
        .into_iter()
        .filter(|actor| *actor != victim && !world.is_dead(*actor))
        .filter_map(|actor| world.position(actor))
        .filter(|position| position.distance_squared(origin) <= limit)
        .count()
}

#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Teleport search protocol that relocates released actors into a safe area.
//!
//! Each released actor gets a [`PendingTeleportSearch`] session. Every
//! scheduling step proposes exactly one candidate: the cached safe spot of the
//! destination first, then the grounded destination center, then random
//! points on a disc around the center. Candidates are validated against the
//! destination blacklist and the spatial validator before the actor is
//! teleported; a landing check then either caches the landed position or
//! resumes the search. The search ends with a forced teleport to the grounded
//! center once attempts run out or the timeout elapses.

use std::{collections::BTreeMap, f32::consts::TAU, time::Duration};

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use restraint_warden_core::{
    host::{GeometryOracle, WorldQuery},
    ActorId, Command, Destination, Event, FallbackReason, RejectionReason, Task, Timestamp,
};
use restraint_warden_store::Store;
use restraint_warden_system_spatial::{Validator, Verdict};
use tracing::{debug, info};

/// Delay between a candidate teleport and its landing check.
pub const LANDING_CHECK_DELAY: Duration = Duration::from_millis(50);
/// Smallest distance from the center a random candidate is placed at.
const MIN_RING_DISTANCE: f32 = 0.1;
/// Squared distance under which an attempted point is considered the cached spot.
const CACHED_MATCH_DISTANCE_SQUARED: f32 = 0.25;

/// Configuration parameters required to construct the search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    radius: f32,
    attempts: u32,
    timeout: Duration,
    cache_spots: bool,
    rng_seed: u64,
}

impl Config {
    /// Creates a configuration from the search disc radius, the number of
    /// non-cache attempts, the overall timeout (zero disables it), whether
    /// confirmed spots are cached, and the seed of the candidate generator.
    #[must_use]
    pub const fn new(
        radius: f32,
        attempts: u32,
        timeout: Duration,
        cache_spots: bool,
        rng_seed: u64,
    ) -> Self {
        Self {
            radius,
            attempts,
            timeout,
            cache_spots,
            rng_seed,
        }
    }

    /// Radius of the disc random candidates are drawn from.
    #[must_use]
    pub const fn radius(&self) -> f32 {
        self.radius
    }

    /// Number of non-cache attempts before the forced fallback.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Search timeout; zero disables it.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether confirmed landings are cached and cached spots are proposed.
    #[must_use]
    pub const fn cache_spots(&self) -> bool {
        self.cache_spots
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(25.0, 8, Duration::from_secs(3), true, 0x5eed_7e1e_9047_0001)
    }
}

/// In-flight relocation of one actor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PendingTeleportSearch {
    /// Destination being searched.
    pub destination: Destination,
    /// Resolved destination anchor.
    pub center: Vec3,
    /// Radius of the candidate disc.
    pub radius: f32,
    /// Non-cache attempts left; the search falls back once this drops below zero.
    pub attempts_remaining: i32,
    /// Whether the cached spot was proposed.
    pub tried_cached: bool,
    /// Whether the grounded center was proposed.
    pub tried_center: bool,
    /// When the search began.
    pub started_at: Timestamp,
}

enum Step {
    Propose { candidate: Vec3, from_cache: bool },
    FallBack(FallbackReason),
}

/// Owner of every in-flight search session.
#[derive(Debug)]
pub struct TeleportSearch {
    config: Config,
    validator: Validator,
    rng: ChaCha8Rng,
    sessions: BTreeMap<ActorId, PendingTeleportSearch>,
}

impl TeleportSearch {
    /// Creates a search system validating candidates with `validator`.
    #[must_use]
    pub fn new(config: Config, validator: Validator) -> Self {
        Self {
            config,
            validator,
            rng: ChaCha8Rng::seed_from_u64(config.rng_seed),
            sessions: BTreeMap::new(),
        }
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Validator used for candidates and grounding.
    #[must_use]
    pub const fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Session currently pending for the actor.
    #[must_use]
    pub fn session(&self, actor: ActorId) -> Option<&PendingTeleportSearch> {
        self.sessions.get(&actor)
    }

    /// Starts a session and proposes its first candidate immediately.
    #[allow(clippy::too_many_arguments)]
    pub fn begin<G>(
        &mut self,
        actor: ActorId,
        destination: Destination,
        center: Vec3,
        now: Timestamp,
        oracle: &G,
        store: &mut Store,
        out: &mut Vec<Command>,
        events: &mut Vec<Event>,
    ) where
        G: GeometryOracle + ?Sized,
    {
        let attempts = i32::try_from(self.config.attempts).unwrap_or(i32::MAX);
        let _ = self.sessions.insert(
            actor,
            PendingTeleportSearch {
                destination,
                center,
                radius: self.config.radius.max(0.0),
                attempts_remaining: attempts,
                tried_cached: false,
                tried_center: false,
                started_at: now,
            },
        );
        debug!(%actor, %destination, ?center, "teleport search started");
        self.attempt(actor, now, oracle, store, out, events);
    }

    /// Proposes the next candidate of the actor's session, if one is pending.
    pub fn attempt<G>(
        &mut self,
        actor: ActorId,
        now: Timestamp,
        oracle: &G,
        store: &mut Store,
        out: &mut Vec<Command>,
        events: &mut Vec<Event>,
    ) where
        G: GeometryOracle + ?Sized,
    {
        let Some(session) = self.sessions.get_mut(&actor) else {
            return;
        };
        let destination = session.destination;

        let step = if timed_out(session, now, self.config.timeout) {
            Step::FallBack(FallbackReason::TimedOut)
        } else {
            let cached = if self.config.cache_spots && !session.tried_cached {
                store.cached_spot(destination)
            } else {
                None
            };
            match cached {
                Some(spot) => {
                    session.tried_cached = true;
                    Step::Propose {
                        candidate: spot,
                        from_cache: true,
                    }
                }
                None if session.attempts_remaining < 0 => {
                    Step::FallBack(FallbackReason::AttemptsExhausted)
                }
                None => {
                    let raw = if session.tried_center {
                        let angle = self.rng.gen_range(0.0..TAU);
                        let distance = self
                            .rng
                            .gen_range(MIN_RING_DISTANCE..=session.radius.max(MIN_RING_DISTANCE));
                        session.center
                            + Vec3::new(angle.cos() * distance, 0.0, angle.sin() * distance)
                    } else {
                        session.tried_center = true;
                        session.center
                    };
                    session.attempts_remaining -= 1;
                    Step::Propose {
                        candidate: self.validator.ground(raw, oracle),
                        from_cache: false,
                    }
                }
            }
        };

        let (candidate, from_cache) = match step {
            Step::Propose {
                candidate,
                from_cache,
            } => (candidate, from_cache),
            Step::FallBack(reason) => {
                self.fall_back(actor, reason, oracle, out, events);
                return;
            }
        };

        let verdict = if store.is_blacklisted(destination, candidate) {
            Verdict::Rejected(RejectionReason::Blacklisted)
        } else {
            self.validator.assess(candidate, oracle)
        };

        match verdict {
            Verdict::Clear => {
                out.push(Command::Teleport {
                    actor,
                    position: candidate,
                });
                out.push(Command::Schedule {
                    task: Task::ConfirmLanding {
                        actor,
                        attempted: candidate,
                    },
                    delay: LANDING_CHECK_DELAY,
                });
                events.push(Event::CandidateTeleported {
                    actor,
                    destination,
                    candidate,
                    from_cache,
                });
            }
            Verdict::Rejected(reason) => {
                if reason != RejectionReason::Blacklisted {
                    store.add_to_blacklist(destination, candidate);
                }
                if from_cache {
                    let _ = store.evict_cached_spot(destination);
                }
                debug!(%actor, %destination, ?candidate, ?reason, "teleport candidate rejected");
                events.push(Event::CandidateRejected {
                    actor,
                    destination,
                    candidate,
                    reason,
                });
                out.push(Command::Schedule {
                    task: Task::AttemptCandidate { actor },
                    delay: Duration::ZERO,
                });
            }
        }
    }

    /// Checks where the actor landed after a candidate teleport.
    ///
    /// Inside the safe area the landed position becomes the destination's
    /// cached spot and the session ends. Otherwise a failing cached spot is
    /// evicted and blacklisted, and the search continues on the next step.
    #[allow(clippy::too_many_arguments)]
    pub fn confirm_landing<H>(
        &mut self,
        actor: ActorId,
        attempted: Vec3,
        now: Timestamp,
        host: &H,
        store: &mut Store,
        out: &mut Vec<Command>,
        events: &mut Vec<Event>,
    ) where
        H: WorldQuery + GeometryOracle + ?Sized,
    {
        let Some(session) = self.sessions.get(&actor).copied() else {
            return;
        };
        let destination = session.destination;

        if timed_out(&session, now, self.config.timeout) {
            self.fall_back(actor, FallbackReason::TimedOut, host, out, events);
            return;
        }

        if host.is_in_safe_area(actor) {
            let position = host.position(actor).unwrap_or(attempted);
            if self.config.cache_spots {
                store.cache_spot(destination, position);
            }
            let _ = self.sessions.remove(&actor);
            info!(%actor, %destination, ?position, "safe landing confirmed");
            events.push(Event::LandingConfirmed {
                actor,
                destination,
                position,
            });
            return;
        }

        if self.config.cache_spots
            && store
                .cached_spot(destination)
                .is_some_and(|spot| {
                    spot.distance_squared(attempted) < CACHED_MATCH_DISTANCE_SQUARED
                })
        {
            let _ = store.evict_cached_spot(destination);
            store.add_to_blacklist(destination, attempted);
        }

        events.push(Event::LandingUnsafe {
            actor,
            destination,
            attempted,
        });
        out.push(Command::Schedule {
            task: Task::AttemptCandidate { actor },
            delay: Duration::ZERO,
        });
    }

    /// Teleports straight to the grounded center without a session.
    pub fn teleport_to_center<G>(
        &self,
        actor: ActorId,
        destination: Destination,
        center: Vec3,
        oracle: &G,
        out: &mut Vec<Command>,
        events: &mut Vec<Event>,
    ) where
        G: GeometryOracle + ?Sized,
    {
        out.push(Command::Teleport {
            actor,
            position: self.validator.ground(center, oracle),
        });
        events.push(Event::TeleportedToCenter { actor, destination });
    }

    /// Abandons the actor's session, returning whether one existed.
    pub fn cancel(&mut self, actor: ActorId) -> bool {
        self.sessions.remove(&actor).is_some()
    }

    /// Abandons every session.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    fn fall_back<G>(
        &mut self,
        actor: ActorId,
        reason: FallbackReason,
        oracle: &G,
        out: &mut Vec<Command>,
        events: &mut Vec<Event>,
    ) where
        G: GeometryOracle + ?Sized,
    {
        let Some(session) = self.sessions.remove(&actor) else {
            return;
        };
        info!(
            %actor,
            destination = %session.destination,
            ?reason,
            "teleport search fell back to destination center"
        );
        out.push(Command::Teleport {
            actor,
            position: self.validator.ground(session.center, oracle),
        });
        events.push(Event::SearchFellBack {
            actor,
            destination: session.destination,
            reason,
        });
    }
}

fn timed_out(session: &PendingTeleportSearch, now: Timestamp, timeout: Duration) -> bool {
    !timeout.is_zero() && now.saturating_since(session.started_at) > timeout
}

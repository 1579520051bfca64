#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Episode tracker that measures how long each actor stays restrained.
//!
//! The tracker owns one [`RestraintEpisode`] per restrained actor. The poll
//! driver reports whether every connected actor is restrained; the tracker
//! advances the episode state machine, emits the one-shot warning, hood, and
//! prompt commands, and hands an [`Expiry`] back once the limit is reached.
//! Short gaps in the restraint are merged into the running episode when the
//! actor is restrained again within the merge window.

use std::{
    collections::{btree_map::Entry, BTreeMap},
    time::Duration,
};

use restraint_warden_core::{ActorId, Choice, Command, DiscardReason, Event, Notice, Timestamp};
use tracing::debug;

mod exemption;
mod immunity;

pub use exemption::ExemptionCache;
pub use immunity::ImmunityTable;

/// Configuration parameters required to construct the episode tracker.
///
/// A zero threshold disables the corresponding one-shot trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    max_restrain: Duration,
    merge_window: Duration,
    warn_before: Duration,
    hood_before: Duration,
    prompt_before: Duration,
}

impl Config {
    /// Creates a configuration with the restraint limit and the merge window.
    ///
    /// Every one-shot trigger starts disabled.
    #[must_use]
    pub const fn new(max_restrain: Duration, merge_window: Duration) -> Self {
        Self {
            max_restrain,
            merge_window,
            warn_before: Duration::ZERO,
            hood_before: Duration::ZERO,
            prompt_before: Duration::ZERO,
        }
    }

    /// Warns the victim once when this much time remains.
    #[must_use]
    pub const fn with_warning(mut self, before: Duration) -> Self {
        self.warn_before = before;
        self
    }

    /// Removes the prisoner hood once when this much time remains.
    #[must_use]
    pub const fn with_hood_removal(mut self, before: Duration) -> Self {
        self.hood_before = before;
        self
    }

    /// Shows the punish-or-forgive prompt once when this much time remains.
    #[must_use]
    pub const fn with_prompt(mut self, before: Duration) -> Self {
        self.prompt_before = before;
        self
    }

    /// Restraint limit of regular episodes.
    #[must_use]
    pub const fn max_restrain(&self) -> Duration {
        self.max_restrain
    }

    /// Longest restraint gap merged into the running episode.
    #[must_use]
    pub const fn merge_window(&self) -> Duration {
        self.merge_window
    }

    /// Remaining time at which the victim is warned.
    #[must_use]
    pub const fn warn_before(&self) -> Duration {
        self.warn_before
    }

    /// Remaining time at which the hood is removed.
    #[must_use]
    pub const fn hood_before(&self) -> Duration {
        self.hood_before
    }

    /// Remaining time at which the prompt is shown.
    #[must_use]
    pub const fn prompt_before(&self) -> Duration {
        self.prompt_before
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Duration::from_secs(20 * 60), Duration::from_secs(60))
            .with_warning(Duration::from_secs(60))
    }
}

/// Continuous or merged span during which an actor is restrained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestraintEpisode {
    started_at: Timestamp,
    last_unrestrained_at: Option<Timestamp>,
    warned: bool,
    hood_removed: bool,
    prompt_shown: bool,
    choice: Choice,
    debug_limit: Option<Duration>,
    currently_restrained: bool,
}

impl RestraintEpisode {
    fn new(now: Timestamp, debug_limit: Option<Duration>) -> Self {
        Self {
            started_at: now,
            last_unrestrained_at: None,
            warned: false,
            hood_removed: false,
            prompt_shown: false,
            choice: Choice::None,
            debug_limit,
            currently_restrained: true,
        }
    }

    fn restart(&mut self, now: Timestamp) {
        *self = Self::new(now, self.debug_limit);
    }

    /// When the episode started.
    #[must_use]
    pub const fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// When the actor was last observed free, if ever during this episode.
    #[must_use]
    pub const fn last_unrestrained_at(&self) -> Option<Timestamp> {
        self.last_unrestrained_at
    }

    /// Time elapsed since the episode started.
    #[must_use]
    pub fn elapsed(&self, now: Timestamp) -> Duration {
        now.saturating_since(self.started_at)
    }

    /// Whether the victim was warned.
    #[must_use]
    pub const fn warned(&self) -> bool {
        self.warned
    }

    /// Whether the hood removal fired.
    #[must_use]
    pub const fn hood_removed(&self) -> bool {
        self.hood_removed
    }

    /// Whether the prompt was shown.
    #[must_use]
    pub const fn prompt_shown(&self) -> bool {
        self.prompt_shown
    }

    /// Choice recorded by the victim.
    #[must_use]
    pub const fn choice(&self) -> Choice {
        self.choice
    }

    /// Whether the episode is a debug session.
    #[must_use]
    pub const fn is_debug(&self) -> bool {
        self.debug_limit.is_some()
    }

    /// Whether the last observation found the actor restrained.
    #[must_use]
    pub const fn currently_restrained(&self) -> bool {
        self.currently_restrained
    }

    fn limit(&self, configured: Duration) -> Duration {
        match self.debug_limit {
            Some(limit) if !limit.is_zero() => limit,
            _ => configured,
        }
    }
}

/// Summary handed to enforcement when an episode reaches its limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Expiry {
    /// Actor whose episode expired.
    pub actor: ActorId,
    /// When the episode started.
    pub started_at: Timestamp,
    /// Episode length at expiry.
    pub elapsed: Duration,
    /// Choice recorded during the episode.
    pub choice: Choice,
    /// Whether the episode was a debug session.
    pub debug: bool,
}

/// Owner of every running episode.
#[derive(Debug, Default)]
pub struct EpisodeTracker {
    config: Config,
    episodes: BTreeMap<ActorId, RestraintEpisode>,
}

impl EpisodeTracker {
    /// Creates an empty tracker using the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            episodes: BTreeMap::new(),
        }
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Episode currently tracked for the actor.
    #[must_use]
    pub fn episode(&self, actor: ActorId) -> Option<&RestraintEpisode> {
        self.episodes.get(&actor)
    }

    /// Reports whether a debug episode is running for the actor.
    #[must_use]
    pub fn is_debug(&self, actor: ActorId) -> bool {
        self.episodes
            .get(&actor)
            .is_some_and(RestraintEpisode::is_debug)
    }

    /// Actors with a tracked episode.
    pub fn tracked(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.episodes.keys().copied()
    }

    /// Advances the actor's episode with the latest restraint observation.
    ///
    /// Returns the expiry summary when the limit is reached; the episode is
    /// removed before returning so it can be enforced only once.
    pub fn observe(
        &mut self,
        actor: ActorId,
        restrained: bool,
        now: Timestamp,
        out: &mut Vec<Command>,
        events: &mut Vec<Event>,
    ) -> Option<Expiry> {
        if restrained {
            self.observe_restrained(actor, now, out, events)
        } else {
            self.observe_free(actor, now, out, events);
            None
        }
    }

    fn observe_free(
        &mut self,
        actor: ActorId,
        now: Timestamp,
        out: &mut Vec<Command>,
        events: &mut Vec<Event>,
    ) {
        let Some(episode) = self.episodes.get_mut(&actor) else {
            return;
        };

        if episode.is_debug() {
            let _ = self.episodes.remove(&actor);
            out.push(Command::HidePrompt { actor });
            events.push(Event::EpisodeDiscarded {
                actor,
                reason: DiscardReason::DebugLifted,
            });
            return;
        }

        if episode.currently_restrained {
            episode.currently_restrained = false;
            episode.last_unrestrained_at = Some(now);
            out.push(Command::HidePrompt { actor });
            events.push(Event::EpisodeSuspended { actor });
            return;
        }

        if gap_exceeds(episode, now, self.config.merge_window) {
            let _ = self.episodes.remove(&actor);
            out.push(Command::HidePrompt { actor });
            events.push(Event::EpisodeDiscarded {
                actor,
                reason: DiscardReason::GraceExpired,
            });
        }
    }

    fn observe_restrained(
        &mut self,
        actor: ActorId,
        now: Timestamp,
        out: &mut Vec<Command>,
        events: &mut Vec<Event>,
    ) -> Option<Expiry> {
        let merge_window = self.config.merge_window;
        let episode = match self.episodes.entry(actor) {
            Entry::Occupied(entry) => {
                let episode = entry.into_mut();
                if !episode.currently_restrained {
                    if gap_exceeds(episode, now, merge_window) {
                        episode.restart(now);
                        events.push(Event::EpisodeRestarted { actor });
                    } else {
                        episode.currently_restrained = true;
                        debug!(%actor, "restraint gap merged into running episode");
                    }
                }
                episode
            }
            Entry::Vacant(entry) => {
                events.push(Event::EpisodeStarted {
                    actor,
                    debug: false,
                });
                entry.insert(RestraintEpisode::new(now, None))
            }
        };

        let limit = episode.limit(self.config.max_restrain);
        let elapsed = episode.elapsed(now);
        let remaining = limit.saturating_sub(elapsed);

        if within(remaining, self.config.warn_before) && !episode.warned {
            episode.warned = true;
            out.push(Command::Notify {
                actor,
                notice: Notice::VictimWarning {
                    remaining_secs: ceil_secs(remaining),
                },
            });
            events.push(Event::VictimWarned { actor, remaining });
        }

        if within(remaining, self.config.hood_before) && !episode.hood_removed {
            episode.hood_removed = true;
            out.push(Command::RemoveHood { actor });
            events.push(Event::HoodRemoved { actor });
        }

        if within(remaining, self.config.prompt_before) && !episode.prompt_shown {
            episode.prompt_shown = true;
            out.push(Command::ShowPrompt { actor });
            events.push(Event::PromptShown { actor });
        }

        if elapsed < limit {
            return None;
        }

        let episode = self.episodes.remove(&actor)?;
        Some(Expiry {
            actor,
            started_at: episode.started_at,
            elapsed,
            choice: episode.choice,
            debug: episode.is_debug(),
        })
    }

    /// Starts, or restarts, a debug episode with its own limit.
    pub fn start_debug(
        &mut self,
        actor: ActorId,
        now: Timestamp,
        limit: Duration,
        events: &mut Vec<Event>,
    ) {
        let _ = self
            .episodes
            .insert(actor, RestraintEpisode::new(now, Some(limit)));
        events.push(Event::EpisodeStarted { actor, debug: true });
    }

    /// Records the victim's retaliation choice.
    ///
    /// The choice can be set once per episode; later attempts, and attempts
    /// without a tracked episode, return `false`.
    pub fn record_choice(&mut self, actor: ActorId, choice: Choice) -> bool {
        if choice == Choice::None {
            return false;
        }
        match self.episodes.get_mut(&actor) {
            Some(episode) if episode.choice == Choice::None => {
                episode.choice = choice;
                true
            }
            _ => false,
        }
    }

    /// Drops the actor's episode without enforcement.
    pub fn discard(
        &mut self,
        actor: ActorId,
        reason: DiscardReason,
        events: &mut Vec<Event>,
    ) -> Option<RestraintEpisode> {
        let episode = self.episodes.remove(&actor)?;
        events.push(Event::EpisodeDiscarded { actor, reason });
        Some(episode)
    }

    /// Drops every episode.
    pub fn clear(&mut self) {
        self.episodes.clear();
    }
}

fn gap_exceeds(episode: &RestraintEpisode, now: Timestamp, merge_window: Duration) -> bool {
    episode
        .last_unrestrained_at
        .map_or(true, |at| now.saturating_since(at) > merge_window)
}

fn within(remaining: Duration, threshold: Duration) -> bool {
    !threshold.is_zero() && !remaining.is_zero() && remaining <= threshold
}

fn ceil_secs(duration: Duration) -> u64 {
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    millis.div_ceil(1_000)
}

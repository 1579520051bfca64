#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Restraint Warden engine that drives the systems against a host.
//!
//! [`Warden`] owns every per-victim table and the persisted store. The host
//! calls [`Warden::advance`] frequently with the current time; each call runs
//! the deferred tasks that were already due, then polls every connected actor
//! once the poll interval elapsed. Systems answer with [`Command`] values that
//! the engine executes against the host, and every step returns the [`Event`]
//! values describing what happened.

use std::collections::BTreeMap;

use glam::Vec3;
use restraint_warden_core::{
    host::Host, ActorId, Choice, ChoicePrompt, Command, Destination, DiscardReason, Event, Task,
    Timestamp,
};
use restraint_warden_store::{RecordBackend, Store};
use restraint_warden_system_chaos::Chaos;
use restraint_warden_system_episodes::{EpisodeTracker, ExemptionCache, ImmunityTable};
use restraint_warden_system_spatial::Validator;
use restraint_warden_system_teleport_search::TeleportSearch;
use tracing::{debug, info, warn};

mod admin;
mod config;
mod enforcement;
mod release;
mod scheduler;

pub use admin::{AdminMessage, AdminReply};
pub use config::{ConfigError, WardenConfig};

use scheduler::TaskQueue;

/// Delay before a release is checked for completeness.
pub const RELEASE_DIAGNOSIS_DELAY: std::time::Duration = std::time::Duration::from_millis(200);

/// Engine state shared by every step.
#[derive(Debug)]
pub struct Warden {
    config: WardenConfig,
    destination: Destination,
    prompt: ChoicePrompt,
    tracker: EpisodeTracker,
    immunity: ImmunityTable,
    exemptions: ExemptionCache,
    search: TeleportSearch,
    chaos: Chaos,
    store: Store,
    tasks: TaskQueue,
    centers: BTreeMap<Destination, Vec3>,
    next_poll: Option<Timestamp>,
}

impl Warden {
    /// Creates the engine and opens the store for `world_id`.
    ///
    /// The configuration is clamped before use.
    pub fn new(config: WardenConfig, backend: Box<dyn RecordBackend>, world_id: &str) -> Self {
        let config = config.clamped();
        let store = Store::open(backend, world_id, config.blacklist_policy());
        let validator = Validator::new(config.spatial_config());
        info!(
            world_id,
            destination = %config.destination(),
            max_restrain_minutes = config.max_restrain_minutes,
            "restraint warden started"
        );
        Self {
            destination: config.destination(),
            prompt: ChoicePrompt::default(),
            tracker: EpisodeTracker::new(config.episode_config()),
            immunity: ImmunityTable::new(),
            exemptions: ExemptionCache::new(config.exemption_ttl()),
            search: TeleportSearch::new(config.search_config(), validator),
            chaos: Chaos::new(config.chaos_config()),
            store,
            tasks: TaskQueue::default(),
            centers: BTreeMap::new(),
            next_poll: None,
            config,
        }
    }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Destination enforced actors are relocated to.
    #[must_use]
    pub fn destination(&self) -> Destination {
        self.destination
    }

    /// Episode tracker.
    #[must_use]
    pub fn tracker(&self) -> &EpisodeTracker {
        &self.tracker
    }

    /// Immunity table.
    #[must_use]
    pub fn immunity(&self) -> &ImmunityTable {
        &self.immunity
    }

    /// Teleport search sessions.
    #[must_use]
    pub fn search(&self) -> &TeleportSearch {
        &self.search
    }

    /// Persisted store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Number of deferred tasks waiting in the queue.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Runs one scheduling step at `now`.
    ///
    /// Deferred tasks due at `now` run first; tasks they queue wait for a
    /// later step. The poll runs on the first step and then once per interval.
    pub fn advance<H>(&mut self, now: Timestamp, host: &mut H) -> Vec<Event>
    where
        H: Host + ?Sized,
    {
        let mut events = Vec::new();

        let cutoff = self.tasks.cutoff();
        while let Some(task) = self.tasks.pop_due(now, cutoff) {
            self.run_task(task, now, host, &mut events);
        }

        if self.next_poll.map_or(true, |due| now >= due) {
            self.next_poll = Some(now.saturating_add(self.config.poll_interval()));
            if self.config.enabled {
                self.poll(now, host, &mut events);
            }
        }

        events
    }

    fn poll<H>(&mut self, now: Timestamp, host: &mut H, events: &mut Vec<Event>)
    where
        H: Host + ?Sized,
    {
        for actor in host.connected_actors() {
            if !host.is_connected(actor) || host.is_dead(actor) {
                continue;
            }

            if !self.tracker.is_debug(actor) && self.exemptions.is_exempt(actor, now, &*host) {
                if self
                    .tracker
                    .discard(actor, DiscardReason::Exempt, events)
                    .is_some()
                {
                    host.hide_choice_prompt(actor);
                }
                continue;
            }

            let restrained = host.is_restrained(actor);
            if restrained && self.immunity.is_immune(actor, now) {
                debug!(%actor, "immune actor restrained again; releasing");
                self.execute(vec![Command::Release { actor }], now, host);
                events.push(Event::ImmuneReleased { actor });
                continue;
            }

            let mut commands = Vec::new();
            let expiry = self
                .tracker
                .observe(actor, restrained, now, &mut commands, events);
            self.execute(commands, now, host);
            if let Some(expiry) = expiry {
                self.enforce(expiry, now, host, events);
            }
        }
    }

    fn run_task<H>(&mut self, task: Task, now: Timestamp, host: &mut H, events: &mut Vec<Event>)
    where
        H: Host + ?Sized,
    {
        let actor = task.actor();
        if !host.is_connected(actor) {
            debug!(%actor, ?task, "dropping task for disconnected actor");
            return;
        }

        let mut commands = Vec::new();
        match task {
            Task::AttemptCandidate { actor } => self.search.attempt(
                actor,
                now,
                &*host,
                &mut self.store,
                &mut commands,
                events,
            ),
            Task::ConfirmLanding { actor, attempted } => self.search.confirm_landing(
                actor,
                attempted,
                now,
                &*host,
                &mut self.store,
                &mut commands,
                events,
            ),
            Task::RecheckRelease { actor } => {
                if host.is_restrained(actor) {
                    let _ = release::release(host, actor);
                    events.push(Event::ReleaseRetried { actor });
                }
            }
            Task::DiagnoseRelease { actor } => {
                if host.is_restrained(actor) {
                    let name = host.display_name(actor).unwrap_or_default();
                    warn!(%actor, name, "restraint release appears incomplete");
                    events.push(Event::ReleaseIncomplete { actor });
                }
            }
        }
        self.execute(commands, now, host);
    }

    fn execute<H>(&mut self, commands: Vec<Command>, now: Timestamp, host: &mut H)
    where
        H: Host + ?Sized,
    {
        for command in commands {
            match command {
                Command::Notify { actor, notice } => host.notify(actor, &notice),
                Command::ShowPrompt { actor } => host.show_choice_prompt(actor, &self.prompt),
                Command::HidePrompt { actor } => host.hide_choice_prompt(actor),
                Command::RemoveHood { actor } => release::remove_hood(host, actor),
                Command::Release { actor } => {
                    let _ = release::release(host, actor);
                    self.tasks.schedule(
                        now,
                        std::time::Duration::ZERO,
                        Task::RecheckRelease { actor },
                    );
                    self.tasks
                        .schedule(now, RELEASE_DIAGNOSIS_DELAY, Task::DiagnoseRelease { actor });
                }
                Command::Teleport { actor, position } => release::move_actor(host, actor, position),
                Command::Schedule { task, delay } => self.tasks.schedule(now, delay, task),
            }
        }
    }

    /// Records the victim's punish-or-forgive choice and closes the prompt.
    pub fn record_choice<H>(&mut self, actor: ActorId, choice: Choice, host: &mut H) -> Vec<Event>
    where
        H: Host + ?Sized,
    {
        let mut events = Vec::new();
        if self.tracker.episode(actor).is_none() {
            return events;
        }
        if self.tracker.record_choice(actor, choice) {
            info!(%actor, ?choice, "victim recorded choice");
            events.push(Event::ChoiceRecorded { actor, choice });
        }
        host.hide_choice_prompt(actor);
        events
    }

    /// Drops every per-actor record of a disconnecting actor.
    pub fn on_disconnect<H>(&mut self, actor: ActorId, host: &mut H) -> Vec<Event>
    where
        H: Host + ?Sized,
    {
        self.forget_actor(actor, DiscardReason::Disconnected, host)
    }

    /// Drops every per-actor record of an actor that died.
    pub fn on_death<H>(&mut self, actor: ActorId, host: &mut H) -> Vec<Event>
    where
        H: Host + ?Sized,
    {
        self.forget_actor(actor, DiscardReason::Died, host)
    }

    fn forget_actor<H>(&mut self, actor: ActorId, reason: DiscardReason, host: &mut H) -> Vec<Event>
    where
        H: Host + ?Sized,
    {
        let mut events = Vec::new();
        host.hide_choice_prompt(actor);
        let _ = self.tracker.discard(actor, reason, &mut events);
        let _ = self.search.cancel(actor);
        self.immunity.revoke(actor);
        self.exemptions.forget(actor);
        events
    }

    /// Wipes persisted data when the world is regenerated.
    pub fn on_world_reset(&mut self, world_id: &str) {
        self.store.wipe(world_id, "world reset");
        self.centers.clear();
    }

    /// Hides every prompt, drops every table, and flushes the store.
    pub fn shutdown<H>(&mut self, host: &mut H)
    where
        H: Host + ?Sized,
    {
        for actor in host.connected_actors() {
            host.hide_choice_prompt(actor);
        }
        self.tracker.clear();
        self.immunity.clear();
        self.exemptions.clear();
        self.search.clear();
        self.tasks.clear();
        self.centers.clear();
        self.store.flush();
        info!("restraint warden stopped");
    }
}

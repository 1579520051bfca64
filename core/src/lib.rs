#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Restraint Warden engine.
//!
//! This crate defines the message surface that connects the host adapter,
//! the engine, and the pure systems. Systems read immutable views of the host
//! through the traits in [`host`] and respond with [`Command`] values
//! describing desired host mutations. The engine executes those commands and
//! broadcasts [`Event`] values describing what happened, which adapters may
//! log or inspect.

use std::{fmt, time::Duration};

use glam::Vec3;
use serde::{Deserialize, Serialize};

pub mod host;

/// Permission node that exempts an actor from restraint tracking.
pub const PERMISSION_EXEMPT: &str = "restraintwarden.exempt";

/// Permission node required to use the administrative command surface.
pub const PERMISSION_ADMIN: &str = "restraintwarden.admin";

/// Unique identifier assigned to an actor by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(u64);

impl ActorId {
    /// Creates a new actor identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point on the host clock measured in whole milliseconds.
///
/// The host decides where the clock starts. Persisted cooldowns compare
/// timestamps across restarts, so hosts should feed a wall clock.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp from milliseconds on the host clock.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Creates a timestamp from whole seconds on the host clock.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000))
    }

    /// Milliseconds elapsed since the start of the host clock.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Whole seconds elapsed since the start of the host clock.
    #[must_use]
    pub const fn as_secs(&self) -> u64 {
        self.0 / 1_000
    }

    /// Time elapsed since `earlier`, or zero when `earlier` lies in the future.
    #[must_use]
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    /// Timestamp shifted forward by the provided duration.
    #[must_use]
    pub fn saturating_add(self, delta: Duration) -> Self {
        let millis = u64::try_from(delta.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(millis))
    }
}

/// Named safe area an enforced actor is relocated to.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// The outpost compound.
    #[default]
    Outpost,
    /// The bandit camp town.
    BanditCamp,
}

impl Destination {
    /// Every destination, in the order administrative commands enumerate them.
    pub const ALL: [Destination; 2] = [Destination::Outpost, Destination::BanditCamp];

    /// Landmark name token that identifies the destination on the first pass.
    #[must_use]
    pub const fn primary_token(self) -> &'static str {
        match self {
            Self::Outpost => "outpost",
            Self::BanditCamp => "bandit",
        }
    }

    /// Landmark name token consulted when no primary match exists.
    #[must_use]
    pub const fn secondary_token(self) -> &'static str {
        match self {
            Self::Outpost => "compound",
            Self::BanditCamp => "town",
        }
    }

    /// Human readable label used in administrative responses.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Outpost => "Outpost",
            Self::BanditCamp => "Bandit",
        }
    }

    /// Parses a destination name, accepting numeric codes and common spellings.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "outpost" => Some(Self::Outpost),
            "2" | "bandit" | "banditcamp" | "bandit camp" => Some(Self::BanditCamp),
            _ => None,
        }
    }

    /// Parses a destination name, falling back to the outpost.
    #[must_use]
    pub fn parse_or_default(value: &str) -> Self {
        Self::parse(value).unwrap_or_default()
    }

    /// Resolves the world anchor of the destination among the provided landmarks.
    ///
    /// The first landmark whose name contains the primary token wins; failing
    /// that, the first landmark containing the secondary token. Matching is
    /// case-insensitive.
    #[must_use]
    pub fn resolve(self, landmarks: &[Landmark]) -> Option<Vec3> {
        let find = |token: &str| {
            landmarks
                .iter()
                .find(|landmark| landmark.name.to_ascii_lowercase().contains(token))
                .map(|landmark| landmark.position)
        };
        find(self.primary_token()).or_else(|| find(self.secondary_token()))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.primary_token())
    }
}

/// Named point of interest reported by the host.
#[derive(Clone, Debug, PartialEq)]
pub struct Landmark {
    /// Host-assigned landmark name.
    pub name: String,
    /// World-space anchor of the landmark.
    pub position: Vec3,
}

impl Landmark {
    /// Creates a landmark description.
    #[must_use]
    pub fn new(name: impl Into<String>, position: Vec3) -> Self {
        Self {
            name: name.into(),
            position,
        }
    }
}

/// Retaliation choice recorded by a restrained actor.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    /// No choice was made.
    #[default]
    None,
    /// The victim asked for the punitive effect.
    Punish,
    /// The victim declined the punitive effect.
    Forgive,
}

impl Choice {
    /// Parses the text a prompt button or command submits.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "punish" => Some(Self::Punish),
            "forgive" => Some(Self::Forgive),
            _ => None,
        }
    }
}

/// Inventory slots that may hold restraint items.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InventorySlot {
    /// Items currently worn by the actor.
    Wear,
    /// The actor's main backpack inventory.
    Main,
    /// The actor's hotbar.
    Belt,
}

impl InventorySlot {
    /// Slots cleared by a restraint release, in release order.
    pub const RELEASE_ORDER: [InventorySlot; 3] =
        [InventorySlot::Wear, InventorySlot::Main, InventorySlot::Belt];
}

/// Item worn by an actor, as reported to the `wear` administrative command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WornItem {
    /// Short item name.
    pub shortname: String,
    /// Numeric item definition identifier.
    pub item_id: i32,
}

/// Host classification of an entity returned by construction queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A player-constructed building block.
    BuildingBlock,
    /// A deployable that participates in decay.
    Decaying,
    /// Anything else; classified by prefab name.
    Other,
}

/// Entity found near a candidate position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NearbyEntity {
    /// Host classification of the entity.
    pub kind: EntityKind,
    /// Short prefab name of the entity.
    pub prefab: String,
}

impl NearbyEntity {
    /// Creates a nearby entity description.
    #[must_use]
    pub fn new(kind: EntityKind, prefab: impl Into<String>) -> Self {
        Self {
            kind,
            prefab: prefab.into(),
        }
    }
}

/// Messages delivered to actors; hosts may localize them.
///
/// The [`fmt::Display`] implementation yields the default English text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// Warns a victim that enforcement is approaching.
    VictimWarning {
        /// Whole seconds left before enforcement, rounded up.
        remaining_secs: u64,
    },
    /// Tells a victim they were released and relocated.
    Released,
    /// Confirms a debug episode started for the caller.
    DebugStarted {
        /// Debug episode limit in seconds.
        seconds: u64,
    },
    /// Confirms a debug episode stopped.
    DebugStopped,
    /// Reports that debug episodes are disabled.
    DebugDisabled,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VictimWarning { remaining_secs } => write!(
                f,
                "You have been restrained for a long time. If you are still restrained in \
                 {remaining_secs} seconds, you will be released and moved to a safe location."
            ),
            Self::Released => f.write_str(
                "You were restrained too long. You have been released and moved to a safe location.",
            ),
            Self::DebugStarted { seconds } => write!(
                f,
                "Debug test started: you have been restrained for {seconds} seconds."
            ),
            Self::DebugStopped => f.write_str("Debug test stopped."),
            Self::DebugDisabled => f.write_str("Debug mode is disabled in the config."),
        }
    }
}

/// Texts shown on the punish-or-forgive prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChoicePrompt {
    /// Prompt heading.
    pub title: &'static str,
    /// Prompt body.
    pub body: &'static str,
    /// Label of the punish button.
    pub punish_label: &'static str,
    /// Label of the forgive button.
    pub forgive_label: &'static str,
    /// Command submitted by the punish button.
    pub punish_command: &'static str,
    /// Command submitted by the forgive button.
    pub forgive_command: &'static str,
}

impl Default for ChoicePrompt {
    fn default() -> Self {
        Self {
            title: "Punish or Forgive?",
            body: "You're about to be freed. Choose what happens when you teleport out.",
            punish_label: "Punish",
            forgive_label: "Forgive",
            punish_command: "choice punish",
            forgive_command: "choice forgive",
        }
    }
}

/// Deferred continuation executed by the engine's task queue.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Task {
    /// Propose the next teleport candidate for the actor's pending search.
    AttemptCandidate {
        /// Actor whose search should advance.
        actor: ActorId,
    },
    /// Confirm that a teleport landed inside the safe area.
    ConfirmLanding {
        /// Actor that was teleported.
        actor: ActorId,
        /// Candidate the actor was teleported to.
        attempted: Vec3,
    },
    /// Repeat the restraint release if the actor still appears restrained.
    RecheckRelease {
        /// Actor that was released.
        actor: ActorId,
    },
    /// Report a restraint release that did not take.
    DiagnoseRelease {
        /// Actor that was released.
        actor: ActorId,
    },
}

impl Task {
    /// Actor the task refers to.
    #[must_use]
    pub const fn actor(&self) -> ActorId {
        match self {
            Self::AttemptCandidate { actor }
            | Self::ConfirmLanding { actor, .. }
            | Self::RecheckRelease { actor }
            | Self::DiagnoseRelease { actor } => *actor,
        }
    }
}

/// Commands that express every host mutation systems may request.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Delivers a notice to an actor.
    Notify {
        /// Recipient of the notice.
        actor: ActorId,
        /// Notice to deliver.
        notice: Notice,
    },
    /// Shows the punish-or-forgive prompt.
    ShowPrompt {
        /// Actor that should see the prompt.
        actor: ActorId,
    },
    /// Hides the punish-or-forgive prompt.
    HidePrompt {
        /// Actor whose prompt should close.
        actor: ActorId,
    },
    /// Drops the prisoner hood worn by an actor.
    RemoveHood {
        /// Actor wearing the hood.
        actor: ActorId,
    },
    /// Runs the restraint release routine.
    Release {
        /// Actor to release.
        actor: ActorId,
    },
    /// Moves an actor, falling back to a direct position write.
    Teleport {
        /// Actor to move.
        actor: ActorId,
        /// Destination position.
        position: Vec3,
    },
    /// Queues a deferred continuation.
    Schedule {
        /// Continuation to run.
        task: Task,
        /// Delay before the continuation becomes due; zero means the next step.
        delay: Duration,
    },
}

/// Why an episode was dropped without enforcement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    /// The merge grace window elapsed without renewed restraint.
    GraceExpired,
    /// The restraint on a debug episode was lifted.
    DebugLifted,
    /// The actor became exempt.
    Exempt,
    /// The actor disconnected.
    Disconnected,
    /// The actor died.
    Died,
    /// An administrator reset the actor.
    AdminReset,
    /// The debug episode was stopped on request.
    DebugStopped,
}

/// Why a teleport candidate was rejected before teleporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectionReason {
    /// The candidate lies near a blacklisted point.
    Blacklisted,
    /// The clearance capsule is obstructed.
    Obstructed,
    /// The candidate is too close to constructed or deployed structures.
    NearStructures,
    /// A geometry probe failed.
    ProbeFailed,
}

/// Why a search gave up and forced the fallback teleport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackReason {
    /// Every attempt was used.
    AttemptsExhausted,
    /// The search timeout elapsed.
    TimedOut,
}

/// Why the chaos effect did not trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChaosVeto {
    /// The subsystem is disabled.
    Disabled,
    /// The victim forgave, or did not choose while the prompt was enabled.
    NotChosen,
    /// The origin was inside a safe area.
    SafeOrigin,
    /// Too many actors stood near the origin.
    Crowded,
    /// The victim's cooldown has not elapsed.
    CoolingDown,
    /// The host failed to spawn the effect.
    SpawnFailed,
}

/// Events broadcast by the engine after processing a step.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A new episode started.
    EpisodeStarted {
        /// Restrained actor.
        actor: ActorId,
        /// Whether the episode is a debug session.
        debug: bool,
    },
    /// A tracked actor was observed free and the episode awaits the merge window.
    EpisodeSuspended {
        /// Actor observed free.
        actor: ActorId,
    },
    /// A restraint gap exceeded the merge window and the episode restarted.
    EpisodeRestarted {
        /// Restrained actor.
        actor: ActorId,
    },
    /// An episode was dropped without enforcement.
    EpisodeDiscarded {
        /// Actor whose episode was dropped.
        actor: ActorId,
        /// Why the episode was dropped.
        reason: DiscardReason,
    },
    /// The victim was warned about upcoming enforcement.
    VictimWarned {
        /// Warned actor.
        actor: ActorId,
        /// Time left before enforcement.
        remaining: Duration,
    },
    /// The prisoner hood removal fired.
    HoodRemoved {
        /// Actor whose hood was removed.
        actor: ActorId,
    },
    /// The punish-or-forgive prompt was shown.
    PromptShown {
        /// Actor shown the prompt.
        actor: ActorId,
    },
    /// The victim recorded a retaliation choice.
    ChoiceRecorded {
        /// Choosing actor.
        actor: ActorId,
        /// Recorded choice.
        choice: Choice,
    },
    /// The restraint limit was enforced.
    LimitEnforced {
        /// Released actor.
        actor: ActorId,
        /// Episode length at enforcement.
        elapsed: Duration,
        /// Choice recorded during the episode.
        choice: Choice,
        /// Whether the episode was a debug session.
        debug: bool,
    },
    /// An immune actor was found restrained and released again.
    ImmuneReleased {
        /// Released actor.
        actor: ActorId,
    },
    /// A teleport candidate was rejected before teleporting.
    CandidateRejected {
        /// Actor being relocated.
        actor: ActorId,
        /// Destination being searched.
        destination: Destination,
        /// Rejected candidate.
        candidate: Vec3,
        /// Why the candidate was rejected.
        reason: RejectionReason,
    },
    /// The actor was teleported to a candidate awaiting confirmation.
    CandidateTeleported {
        /// Actor being relocated.
        actor: ActorId,
        /// Destination being searched.
        destination: Destination,
        /// Candidate position.
        candidate: Vec3,
        /// Whether the candidate came from the safe-spot cache.
        from_cache: bool,
    },
    /// The host confirmed the actor landed inside the safe area.
    LandingConfirmed {
        /// Relocated actor.
        actor: ActorId,
        /// Destination searched.
        destination: Destination,
        /// Landed position, now cached.
        position: Vec3,
    },
    /// The actor landed outside the safe area and the search continues.
    LandingUnsafe {
        /// Relocated actor.
        actor: ActorId,
        /// Destination searched.
        destination: Destination,
        /// Candidate that failed confirmation.
        attempted: Vec3,
    },
    /// The search gave up and teleported to the grounded destination center.
    SearchFellBack {
        /// Relocated actor.
        actor: ActorId,
        /// Destination searched.
        destination: Destination,
        /// Why the search gave up.
        reason: FallbackReason,
    },
    /// The actor was teleported to the grounded destination center directly.
    TeleportedToCenter {
        /// Relocated actor.
        actor: ActorId,
        /// Destination used.
        destination: Destination,
    },
    /// The destination could not be resolved, so relocation was skipped.
    DestinationUnavailable {
        /// Actor that was not relocated.
        actor: ActorId,
        /// Destination that could not be resolved.
        destination: Destination,
    },
    /// The chaos effect was spawned at the enforcement origin.
    ChaosTriggered {
        /// Victim whose enforcement triggered the effect.
        actor: ActorId,
        /// Enforcement origin.
        origin: Vec3,
    },
    /// The chaos effect was considered but not spawned.
    ChaosSkipped {
        /// Victim whose enforcement was considered.
        actor: ActorId,
        /// Why the effect did not trigger.
        reason: ChaosVeto,
    },
    /// The release recheck found the actor restrained and released again.
    ReleaseRetried {
        /// Actor released again.
        actor: ActorId,
    },
    /// The release diagnosis found the actor still restrained.
    ReleaseIncomplete {
        /// Actor still restrained.
        actor: ActorId,
    },
}

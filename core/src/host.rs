//! Collaborator contracts the engine consumes from its host.
//!
//! Read-only queries take `&self`; mutations take `&mut self` and return
//! [`HostError`] when the host primitive fails. The engine treats every error
//! as transient: it logs, takes a fallback path, and carries on.

use std::time::Duration;

use glam::Vec3;
use thiserror::Error;

use crate::{ActorId, ChoicePrompt, InventorySlot, Landmark, NearbyEntity, Notice, WornItem};

/// Failure reported by a host primitive.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HostError {
    /// The host does not know the actor.
    #[error("actor {0} is not known to the host")]
    UnknownActor(ActorId),
    /// The host does not provide the primitive.
    #[error("{operation} is not supported by this host")]
    Unsupported {
        /// Name of the missing primitive.
        operation: &'static str,
    },
    /// The primitive ran and failed.
    #[error("{operation} failed: {reason}")]
    Failed {
        /// Name of the failing primitive.
        operation: &'static str,
        /// Host supplied description of the failure.
        reason: String,
    },
}

/// Read-only queries about actors.
pub trait WorldQuery {
    /// Actors currently connected to the world, in host order.
    fn connected_actors(&self) -> Vec<ActorId>;

    /// Reports whether the actor is connected.
    fn is_connected(&self, actor: ActorId) -> bool;

    /// Reports whether the actor is dead.
    fn is_dead(&self, actor: ActorId) -> bool;

    /// Reports whether the actor carries the restrained flag or wears a restraint.
    fn is_restrained(&self, actor: ActorId) -> bool;

    /// Display name of the actor, if the host knows it (connected or sleeping).
    fn display_name(&self, actor: ActorId) -> Option<String>;

    /// Current world position of the actor.
    fn position(&self, actor: ActorId) -> Option<Vec3>;

    /// Reports whether the host considers the actor inside a safe area.
    fn is_in_safe_area(&self, actor: ActorId) -> bool;

    /// Items the actor currently wears.
    fn worn_items(&self, actor: ActorId) -> Result<Vec<WornItem>, HostError>;
}

/// Host mutations the engine performs on actors and the world.
pub trait WorldControl {
    /// Teleports the actor using the host's primary primitive.
    fn teleport(&mut self, actor: ActorId, position: Vec3) -> Result<(), HostError>;

    /// Writes the actor position directly and resyncs; teleport fallback.
    fn write_position(&mut self, actor: ActorId, position: Vec3) -> Result<(), HostError>;

    /// Removes restraint items from a slot, returning how many were removed.
    fn remove_restraint_items(
        &mut self,
        actor: ActorId,
        slot: InventorySlot,
    ) -> Result<u32, HostError>;

    /// Clears any restrained status flag.
    fn clear_restrained_flag(&mut self, actor: ActorId) -> Result<(), HostError>;

    /// Forces the host to resynchronise the actor's state with clients.
    fn resync(&mut self, actor: ActorId) -> Result<(), HostError>;

    /// Drops the prisoner hood the actor wears, returning whether one was worn.
    fn drop_prisoner_hood(&mut self, actor: ActorId) -> Result<bool, HostError>;

    /// Puts a restraint on the actor for a debug episode.
    fn apply_debug_restraint(&mut self, actor: ActorId) -> Result<(), HostError>;

    /// Spawns the punitive effect at the origin with the provided fuse.
    fn spawn_punitive_effect(&mut self, origin: Vec3, fuse: Duration) -> Result<(), HostError>;
}

/// Geometry probes used to validate teleport candidates.
pub trait GeometryOracle {
    /// Terrain height at the horizontal coordinates.
    fn ground_height(&self, x: f32, z: f32) -> Result<f32, HostError>;

    /// Casts a ray straight down from `from`, returning the first world hit.
    fn raycast_down(&self, from: Vec3, max_distance: f32) -> Result<Option<Vec3>, HostError>;

    /// Reports whether a capsule between `bottom` and `top` overlaps world geometry.
    fn capsule_obstructed(&self, bottom: Vec3, top: Vec3, radius: f32) -> Result<bool, HostError>;

    /// Constructed or deployed entities within `radius` of `position`.
    fn nearby_construction(
        &self,
        position: Vec3,
        radius: f32,
    ) -> Result<Vec<NearbyEntity>, HostError>;
}

/// Source of named landmarks destinations resolve against.
pub trait LandmarkSource {
    /// Landmarks known to the host.
    fn landmarks(&self) -> Vec<Landmark>;
}

/// Permission lookup.
pub trait Permissions {
    /// Reports whether the actor holds the permission node.
    fn has_permission(&self, actor: ActorId, node: &str) -> bool;
}

/// Message delivery and prompt rendering.
pub trait Notifier {
    /// Delivers a notice to the actor.
    fn notify(&mut self, actor: ActorId, notice: &Notice);

    /// Shows the punish-or-forgive prompt.
    fn show_choice_prompt(&mut self, actor: ActorId, prompt: &ChoicePrompt);

    /// Hides the punish-or-forgive prompt if it is visible.
    fn hide_choice_prompt(&mut self, actor: ActorId);
}

/// Everything the engine needs from its host.
pub trait Host:
    WorldQuery + WorldControl + GeometryOracle + LandmarkSource + Permissions + Notifier
{
}

impl<T> Host for T where
    T: WorldQuery + WorldControl + GeometryOracle + LandmarkSource + Permissions + Notifier
{
}

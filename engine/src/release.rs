//! Best-effort restraint release and relocation primitives.

use glam::Vec3;
use restraint_warden_core::{
    host::{WorldControl, WorldQuery},
    ActorId, InventorySlot,
};
use tracing::{debug, warn};

/// Removes restraint items from every slot, clears the restrained flag, and
/// resyncs the actor. Every step runs even when an earlier one fails.
///
/// Returns how many restraint items were removed.
pub(crate) fn release<H>(host: &mut H, actor: ActorId) -> u32
where
    H: WorldQuery + WorldControl + ?Sized,
{
    let mut removed = 0_u32;
    for slot in InventorySlot::RELEASE_ORDER {
        match host.remove_restraint_items(actor, slot) {
            Ok(count) => removed = removed.saturating_add(count),
            Err(error) => warn!(%actor, ?slot, %error, "failed to remove restraint items"),
        }
    }
    if let Err(error) = host.clear_restrained_flag(actor) {
        warn!(%actor, %error, "failed to clear restrained flag");
    }
    if let Err(error) = host.resync(actor) {
        warn!(%actor, %error, "failed to resync released actor");
    }
    debug!(%actor, removed, "restraint released");
    removed
}

/// Moves the actor with the teleport primitive, falling back to a direct
/// position write.
pub(crate) fn move_actor<H>(host: &mut H, actor: ActorId, position: Vec3)
where
    H: WorldControl + ?Sized,
{
    let Err(error) = host.teleport(actor, position) else {
        return;
    };
    warn!(%actor, %error, ?position, "teleport failed; writing position directly");
    if let Err(error) = host.write_position(actor, position) {
        warn!(%actor, %error, ?position, "position write failed; actor not moved");
    }
}

/// Drops the prisoner hood the actor wears.
pub(crate) fn remove_hood<H>(host: &mut H, actor: ActorId)
where
    H: WorldControl + ?Sized,
{
    match host.drop_prisoner_hood(actor) {
        Ok(true) => debug!(%actor, "prisoner hood removed"),
        Ok(false) => debug!(%actor, "no prisoner hood worn"),
        Err(error) => warn!(%actor, %error, "failed to remove prisoner hood"),
    }
}

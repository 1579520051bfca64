#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic in-memory host for the Restraint Warden engine.
//!
//! The sandbox implements every collaborator trait over a flat world with
//! spherical obstacles, circular safe areas, and scripted failures. Tests and
//! the command-line adapter drive it directly and inspect what the engine did
//! through the recorded notices, teleports, and spawned effects.

use std::{
    cell::Cell,
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use glam::{Vec2, Vec3};
use restraint_warden_core::{
    host::{
        GeometryOracle, HostError, LandmarkSource, Notifier, Permissions, WorldControl, WorldQuery,
    },
    ActorId, ChoicePrompt, InventorySlot, Landmark, NearbyEntity, Notice, WornItem,
};

/// Short name of the restraint item.
pub const HANDCUFFS_SHORTNAME: &str = "handcuffs";
/// Item definition id of the restraint item.
pub const HANDCUFFS_ITEM_ID: i32 = -839_576_748;
/// Short name of the prisoner hood.
pub const HOOD_SHORTNAME: &str = "prisonerhood";
/// Item definition id of the prisoner hood.
pub const HOOD_ITEM_ID: i32 = -892_718_768;

/// Actor simulated by the sandbox.
#[derive(Clone, Debug, PartialEq)]
pub struct SandboxActor {
    /// Display name.
    pub name: String,
    /// Whether the actor is connected.
    pub connected: bool,
    /// Whether the actor is dead.
    pub dead: bool,
    /// Whether the host-side restrained flag is set.
    pub restrained_flag: bool,
    /// Current position.
    pub position: Vec3,
    /// Worn items.
    pub wear: Vec<WornItem>,
    /// Main inventory items.
    pub main: Vec<WornItem>,
    /// Hotbar items.
    pub belt: Vec<WornItem>,
}

impl SandboxActor {
    fn new(name: &str, position: Vec3) -> Self {
        Self {
            name: name.to_owned(),
            connected: true,
            dead: false,
            restrained_flag: false,
            position,
            wear: Vec::new(),
            main: Vec::new(),
            belt: Vec::new(),
        }
    }

    /// Reports whether the actor wears the restraint item.
    #[must_use]
    pub fn wears_handcuffs(&self) -> bool {
        self.wear.iter().any(is_handcuffs)
    }

    /// Reports whether the actor wears the prisoner hood.
    #[must_use]
    pub fn wears_hood(&self) -> bool {
        self.wear.iter().any(|item| item.shortname == HOOD_SHORTNAME)
    }

    fn slot_mut(&mut self, slot: InventorySlot) -> &mut Vec<WornItem> {
        match slot {
            InventorySlot::Wear => &mut self.wear,
            InventorySlot::Main => &mut self.main,
            InventorySlot::Belt => &mut self.belt,
        }
    }
}

/// Scripted host failures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Failures {
    /// The primary teleport primitive fails.
    pub teleport: bool,
    /// The direct position write fails.
    pub write_position: bool,
    /// Every geometry probe fails.
    pub geometry: bool,
    /// The grounding raycast misses everything.
    pub raycast_miss: bool,
    /// Spawning the punitive effect fails.
    pub spawn: bool,
    /// The restrained flag cannot be cleared.
    pub sticky_flag: bool,
}

/// Record of a successful relocation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Relocation {
    /// Moved actor.
    pub actor: ActorId,
    /// Requested position.
    pub position: Vec3,
    /// Whether the direct position write was used.
    pub fallback: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Sphere {
    center: Vec3,
    radius: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Circle {
    center: Vec2,
    radius: f32,
}

/// In-memory host implementing every collaborator trait.
#[derive(Debug, Default)]
pub struct SandboxHost {
    actors: BTreeMap<ActorId, SandboxActor>,
    ground: f32,
    landmarks: Vec<Landmark>,
    obstacles: Vec<Sphere>,
    structures: Vec<(Vec3, NearbyEntity)>,
    safe_areas: Vec<Circle>,
    permissions: BTreeMap<ActorId, BTreeSet<String>>,
    failures: Failures,
    notices: Vec<(ActorId, Notice)>,
    visible_prompts: BTreeSet<ActorId>,
    relocations: Vec<Relocation>,
    effects: Vec<(Vec3, Duration)>,
    resyncs: u32,
    permission_lookups: Cell<u32>,
}

impl SandboxHost {
    /// Creates an empty flat world at height zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the terrain height of the flat world.
    pub fn set_ground(&mut self, height: f32) {
        self.ground = height;
    }

    /// Adds a named landmark.
    pub fn add_landmark(&mut self, name: &str, position: Vec3) {
        self.landmarks.push(Landmark::new(name, position));
    }

    /// Adds a circular safe area measured on the horizontal plane.
    pub fn add_safe_area(&mut self, center: Vec3, radius: f32) {
        self.safe_areas.push(Circle {
            center: Vec2::new(center.x, center.z),
            radius,
        });
    }

    /// Adds a spherical obstacle that blocks clearance probes.
    pub fn add_obstacle(&mut self, center: Vec3, radius: f32) {
        self.obstacles.push(Sphere { center, radius });
    }

    /// Adds an entity reported by construction queries.
    pub fn add_structure(&mut self, position: Vec3, entity: NearbyEntity) {
        self.structures.push((position, entity));
    }

    /// Replaces the scripted failures.
    pub fn set_failures(&mut self, failures: Failures) {
        self.failures = failures;
    }

    /// Connects a new actor.
    pub fn spawn_actor(&mut self, actor: ActorId, name: &str, position: Vec3) {
        let _ = self.actors.insert(actor, SandboxActor::new(name, position));
    }

    /// Read-only access to an actor.
    #[must_use]
    pub fn actor(&self, actor: ActorId) -> Option<&SandboxActor> {
        self.actors.get(&actor)
    }

    /// Mutable access to an actor.
    pub fn actor_mut(&mut self, actor: ActorId) -> Option<&mut SandboxActor> {
        self.actors.get_mut(&actor)
    }

    /// Puts handcuffs on the actor and sets the restrained flag.
    pub fn restrain(&mut self, actor: ActorId) {
        if let Some(state) = self.actors.get_mut(&actor) {
            if !state.wears_handcuffs() {
                state.wear.push(handcuffs());
            }
            state.restrained_flag = true;
        }
    }

    /// Removes handcuffs and the restrained flag as a captor would.
    pub fn unrestrain(&mut self, actor: ActorId) {
        if let Some(state) = self.actors.get_mut(&actor) {
            state.wear.retain(|item| !is_handcuffs(item));
            state.restrained_flag = false;
        }
    }

    /// Puts the prisoner hood on the actor.
    pub fn hood(&mut self, actor: ActorId) {
        if let Some(state) = self.actors.get_mut(&actor) {
            state.wear.push(WornItem {
                shortname: HOOD_SHORTNAME.to_owned(),
                item_id: HOOD_ITEM_ID,
            });
        }
    }

    /// Moves an actor without going through the engine.
    pub fn place(&mut self, actor: ActorId, position: Vec3) {
        if let Some(state) = self.actors.get_mut(&actor) {
            state.position = position;
        }
    }

    /// Marks an actor disconnected.
    pub fn disconnect(&mut self, actor: ActorId) {
        if let Some(state) = self.actors.get_mut(&actor) {
            state.connected = false;
        }
    }

    /// Marks an actor dead.
    pub fn kill(&mut self, actor: ActorId) {
        if let Some(state) = self.actors.get_mut(&actor) {
            state.dead = true;
        }
    }

    /// Grants a permission node.
    pub fn grant(&mut self, actor: ActorId, node: &str) {
        let _ = self
            .permissions
            .entry(actor)
            .or_default()
            .insert(node.to_owned());
    }

    /// Revokes a permission node.
    pub fn revoke(&mut self, actor: ActorId, node: &str) {
        if let Some(nodes) = self.permissions.get_mut(&actor) {
            let _ = nodes.remove(node);
        }
    }

    /// Notices delivered to the actor, oldest first.
    #[must_use]
    pub fn notices_for(&self, actor: ActorId) -> Vec<Notice> {
        self.notices
            .iter()
            .filter(|(recipient, _)| *recipient == actor)
            .map(|(_, notice)| notice.clone())
            .collect()
    }

    /// Reports whether the choice prompt is visible to the actor.
    #[must_use]
    pub fn prompt_visible(&self, actor: ActorId) -> bool {
        self.visible_prompts.contains(&actor)
    }

    /// Successful relocations, oldest first.
    #[must_use]
    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    /// Spawned punitive effects with their fuses.
    #[must_use]
    pub fn effects(&self) -> &[(Vec3, Duration)] {
        &self.effects
    }

    /// Number of resyncs requested.
    #[must_use]
    pub fn resyncs(&self) -> u32 {
        self.resyncs
    }

    /// Number of permission lookups served.
    #[must_use]
    pub fn permission_lookups(&self) -> u32 {
        self.permission_lookups.get()
    }

    fn state(&self, actor: ActorId) -> Result<&SandboxActor, HostError> {
        self.actors.get(&actor).ok_or(HostError::UnknownActor(actor))
    }

    fn state_mut(&mut self, actor: ActorId) -> Result<&mut SandboxActor, HostError> {
        self.actors
            .get_mut(&actor)
            .ok_or(HostError::UnknownActor(actor))
    }

    fn geometry_check(&self, operation: &'static str) -> Result<(), HostError> {
        if self.failures.geometry {
            Err(HostError::Failed {
                operation,
                reason: "scripted geometry failure".to_owned(),
            })
        } else {
            Ok(())
        }
    }

    fn in_safe_area(&self, position: Vec3) -> bool {
        let point = Vec2::new(position.x, position.z);
        self.safe_areas
            .iter()
            .any(|area| point.distance(area.center) <= area.radius)
    }
}

impl WorldQuery for SandboxHost {
    fn connected_actors(&self) -> Vec<ActorId> {
        self.actors
            .iter()
            .filter(|(_, state)| state.connected)
            .map(|(id, _)| *id)
            .collect()
    }

    fn is_connected(&self, actor: ActorId) -> bool {
        self.actors.get(&actor).is_some_and(|state| state.connected)
    }

    fn is_dead(&self, actor: ActorId) -> bool {
        self.actors.get(&actor).is_some_and(|state| state.dead)
    }

    fn is_restrained(&self, actor: ActorId) -> bool {
        self.actors
            .get(&actor)
            .is_some_and(|state| state.restrained_flag || state.wears_handcuffs())
    }

    fn display_name(&self, actor: ActorId) -> Option<String> {
        self.actors.get(&actor).map(|state| state.name.clone())
    }

    fn position(&self, actor: ActorId) -> Option<Vec3> {
        self.actors.get(&actor).map(|state| state.position)
    }

    fn is_in_safe_area(&self, actor: ActorId) -> bool {
        self.actors
            .get(&actor)
            .is_some_and(|state| self.in_safe_area(state.position))
    }

    fn worn_items(&self, actor: ActorId) -> Result<Vec<WornItem>, HostError> {
        Ok(self.state(actor)?.wear.clone())
    }
}

impl WorldControl for SandboxHost {
    fn teleport(&mut self, actor: ActorId, position: Vec3) -> Result<(), HostError> {
        if self.failures.teleport {
            return Err(HostError::Failed {
                operation: "teleport",
                reason: "scripted teleport failure".to_owned(),
            });
        }
        self.state_mut(actor)?.position = position;
        self.relocations.push(Relocation {
            actor,
            position,
            fallback: false,
        });
        Ok(())
    }

    fn write_position(&mut self, actor: ActorId, position: Vec3) -> Result<(), HostError> {
        if self.failures.write_position {
            return Err(HostError::Failed {
                operation: "write_position",
                reason: "scripted position write failure".to_owned(),
            });
        }
        self.state_mut(actor)?.position = position;
        self.relocations.push(Relocation {
            actor,
            position,
            fallback: true,
        });
        Ok(())
    }

    fn remove_restraint_items(
        &mut self,
        actor: ActorId,
        slot: InventorySlot,
    ) -> Result<u32, HostError> {
        let items = self.state_mut(actor)?.slot_mut(slot);
        let before = items.len();
        items.retain(|item| !is_handcuffs(item));
        Ok(u32::try_from(before - items.len()).unwrap_or(u32::MAX))
    }

    fn clear_restrained_flag(&mut self, actor: ActorId) -> Result<(), HostError> {
        let sticky = self.failures.sticky_flag;
        let state = self.state_mut(actor)?;
        if !sticky {
            state.restrained_flag = false;
        }
        Ok(())
    }

    fn resync(&mut self, actor: ActorId) -> Result<(), HostError> {
        let _ = self.state(actor)?;
        self.resyncs = self.resyncs.saturating_add(1);
        Ok(())
    }

    fn drop_prisoner_hood(&mut self, actor: ActorId) -> Result<bool, HostError> {
        let state = self.state_mut(actor)?;
        let before = state.wear.len();
        state.wear.retain(|item| item.shortname != HOOD_SHORTNAME);
        Ok(state.wear.len() != before)
    }

    fn apply_debug_restraint(&mut self, actor: ActorId) -> Result<(), HostError> {
        let state = self.state_mut(actor)?;
        if !state.wears_handcuffs() {
            state.wear.push(handcuffs());
        }
        Ok(())
    }

    fn spawn_punitive_effect(&mut self, origin: Vec3, fuse: Duration) -> Result<(), HostError> {
        if self.failures.spawn {
            return Err(HostError::Failed {
                operation: "spawn_punitive_effect",
                reason: "scripted spawn failure".to_owned(),
            });
        }
        self.effects.push((origin, fuse));
        Ok(())
    }
}

impl GeometryOracle for SandboxHost {
    fn ground_height(&self, _x: f32, _z: f32) -> Result<f32, HostError> {
        self.geometry_check("ground_height")?;
        Ok(self.ground)
    }

    fn raycast_down(&self, from: Vec3, max_distance: f32) -> Result<Option<Vec3>, HostError> {
        self.geometry_check("raycast_down")?;
        if self.failures.raycast_miss || from.y - self.ground > max_distance {
            return Ok(None);
        }
        Ok(Some(Vec3::new(from.x, self.ground, from.z)))
    }

    fn capsule_obstructed(&self, bottom: Vec3, top: Vec3, radius: f32) -> Result<bool, HostError> {
        self.geometry_check("capsule_obstructed")?;
        Ok(self.obstacles.iter().any(|obstacle| {
            distance_to_segment(obstacle.center, bottom, top) <= obstacle.radius + radius
        }))
    }

    fn nearby_construction(
        &self,
        position: Vec3,
        radius: f32,
    ) -> Result<Vec<NearbyEntity>, HostError> {
        self.geometry_check("nearby_construction")?;
        Ok(self
            .structures
            .iter()
            .filter(|(at, _)| at.distance(position) <= radius)
            .map(|(_, entity)| entity.clone())
            .collect())
    }
}

impl LandmarkSource for SandboxHost {
    fn landmarks(&self) -> Vec<Landmark> {
        self.landmarks.clone()
    }
}

impl Permissions for SandboxHost {
    fn has_permission(&self, actor: ActorId, node: &str) -> bool {
        self.permission_lookups
            .set(self.permission_lookups.get().saturating_add(1));
        self.permissions
            .get(&actor)
            .is_some_and(|nodes| nodes.contains(node))
    }
}

impl Notifier for SandboxHost {
    fn notify(&mut self, actor: ActorId, notice: &Notice) {
        self.notices.push((actor, notice.clone()));
    }

    fn show_choice_prompt(&mut self, actor: ActorId, _prompt: &ChoicePrompt) {
        let _ = self.visible_prompts.insert(actor);
    }

    fn hide_choice_prompt(&mut self, actor: ActorId) {
        let _ = self.visible_prompts.remove(&actor);
    }
}

fn handcuffs() -> WornItem {
    WornItem {
        shortname: HANDCUFFS_SHORTNAME.to_owned(),
        item_id: HANDCUFFS_ITEM_ID,
    }
}

fn is_handcuffs(item: &WornItem) -> bool {
    item.item_id == HANDCUFFS_ITEM_ID || item.shortname.eq_ignore_ascii_case(HANDCUFFS_SHORTNAME)
}

fn distance_to_segment(point: Vec3, start: Vec3, end: Vec3) -> f32 {
    let segment = end - start;
    let length_squared = segment.length_squared();
    if length_squared <= f32::EPSILON {
        return point.distance(start);
    }
    let t = ((point - start).dot(segment) / length_squared).clamp(0.0, 1.0);
    point.distance(start + segment * t)
}

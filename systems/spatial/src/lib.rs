#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Spatial validator that decides whether an actor can occupy a position.
//!
//! All checks are pure predicates over the host's [`GeometryOracle`]. A
//! candidate is usable when it stands on resolved ground, a vertical capsule
//! the size of an actor fits above it, and no constructed or deployed
//! structure is within the rejection radius.

use glam::Vec3;
use restraint_warden_core::{
    host::{GeometryOracle, HostError},
    EntityKind, NearbyEntity, RejectionReason,
};
use tracing::warn;

/// Height above a position the grounding ray starts from.
const RAYCAST_LIFT: f32 = 200.0;
/// Length of the grounding ray.
const RAYCAST_DISTANCE: f32 = 400.0;
/// Gap kept between the ground and the bottom of the clearance capsule.
const CAPSULE_BASE_LIFT: f32 = 0.1;
/// Smallest clearance capsule height probed.
const MIN_CAPSULE_HEIGHT: f32 = 0.2;
/// Prefab name fragments that mark an entity as player construction.
const STRUCTURE_TOKENS: [&str; 7] = [
    "wall",
    "floor",
    "foundation",
    "roof",
    "building",
    "barricade",
    "deploy",
];

/// Configuration parameters required to construct the validator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    clearance_radius: f32,
    clearance_height: f32,
    structure_radius: f32,
    ground_offset: Vec3,
}

impl Config {
    /// Creates a configuration from the clearance capsule, the structure
    /// rejection radius and the offset applied after grounding.
    #[must_use]
    pub const fn new(
        clearance_radius: f32,
        clearance_height: f32,
        structure_radius: f32,
        ground_offset: Vec3,
    ) -> Self {
        Self {
            clearance_radius,
            clearance_height,
            structure_radius,
            ground_offset,
        }
    }

    /// Radius of the clearance capsule.
    #[must_use]
    pub const fn clearance_radius(&self) -> f32 {
        self.clearance_radius
    }

    /// Height of the clearance capsule.
    #[must_use]
    pub const fn clearance_height(&self) -> f32 {
        self.clearance_height
    }

    /// Radius within which structures reject a candidate.
    #[must_use]
    pub const fn structure_radius(&self) -> f32 {
        self.structure_radius
    }

    /// Offset added to every grounded position.
    #[must_use]
    pub const fn ground_offset(&self) -> Vec3 {
        self.ground_offset
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(0.6, 1.8, 6.0, Vec3::new(0.0, 1.5, 0.0))
    }
}

/// Outcome of validating a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The candidate can be occupied.
    Clear,
    /// The candidate must not be used.
    Rejected(RejectionReason),
}

/// Pure validator over host geometry.
#[derive(Clone, Debug, Default)]
pub struct Validator {
    config: Config,
}

impl Validator {
    /// Creates a validator using the supplied configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Snaps a position onto the ground and applies the configured offset.
    ///
    /// The ground is the first world hit of a ray cast down from high above;
    /// when nothing is hit, or the probe fails, the terrain height is used;
    /// when that fails too, the position keeps its height.
    #[must_use]
    pub fn ground<G>(&self, position: Vec3, oracle: &G) -> Vec3
    where
        G: GeometryOracle + ?Sized,
    {
        let start = position + Vec3::Y * RAYCAST_LIFT;
        let grounded = match oracle.raycast_down(start, RAYCAST_DISTANCE) {
            Ok(Some(hit)) => hit,
            Ok(None) => terrain_or_raw(position, oracle),
            Err(error) => {
                warn!(%error, "grounding raycast failed; using terrain height");
                terrain_or_raw(position, oracle)
            }
        };
        grounded + self.config.ground_offset
    }

    /// Reports whether the clearance capsule above the candidate is free.
    pub fn is_clear<G>(&self, candidate: Vec3, oracle: &G) -> Result<bool, HostError>
    where
        G: GeometryOracle + ?Sized,
    {
        let bottom = candidate + Vec3::Y * CAPSULE_BASE_LIFT;
        let top = candidate + Vec3::Y * self.config.clearance_height.max(MIN_CAPSULE_HEIGHT);
        oracle
            .capsule_obstructed(bottom, top, self.config.clearance_radius)
            .map(|obstructed| !obstructed)
    }

    /// Reports whether constructed or deployed structures stand near the candidate.
    pub fn is_near_structures<G>(&self, candidate: Vec3, oracle: &G) -> Result<bool, HostError>
    where
        G: GeometryOracle + ?Sized,
    {
        let radius = self.config.structure_radius.max(0.0);
        if radius <= 0.0 {
            return Ok(false);
        }
        let entities = oracle.nearby_construction(candidate, radius)?;
        Ok(entities.iter().any(is_structure))
    }

    /// Runs every geometric check, treating probe failures as rejections.
    #[must_use]
    pub fn assess<G>(&self, candidate: Vec3, oracle: &G) -> Verdict
    where
        G: GeometryOracle + ?Sized,
    {
        match self.is_clear(candidate, oracle) {
            Ok(true) => {}
            Ok(false) => return Verdict::Rejected(RejectionReason::Obstructed),
            Err(error) => {
                warn!(%error, ?candidate, "clearance probe failed; rejecting candidate");
                return Verdict::Rejected(RejectionReason::ProbeFailed);
            }
        }

        match self.is_near_structures(candidate, oracle) {
            Ok(false) => Verdict::Clear,
            Ok(true) => Verdict::Rejected(RejectionReason::NearStructures),
            Err(error) => {
                warn!(%error, ?candidate, "structure query failed; rejecting candidate");
                Verdict::Rejected(RejectionReason::ProbeFailed)
            }
        }
    }
}

fn terrain_or_raw<G>(position: Vec3, oracle: &G) -> Vec3
where
    G: GeometryOracle + ?Sized,
{
    match oracle.ground_height(position.x, position.z) {
        Ok(height) => Vec3::new(position.x, height, position.z),
        Err(error) => {
            warn!(%error, "terrain height unavailable; keeping raw height");
            position
        }
    }
}

fn is_structure(entity: &NearbyEntity) -> bool {
    match entity.kind {
        EntityKind::BuildingBlock | EntityKind::Decaying => true,
        EntityKind::Other => {
            let prefab = entity.prefab.to_ascii_lowercase();
            STRUCTURE_TOKENS.iter().any(|token| prefab.contains(token))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefab_tokens_classify_structures() {
        assert!(is_structure(&NearbyEntity::new(EntityKind::Other, "wall.low")));
        assert!(is_structure(&NearbyEntity::new(EntityKind::Other, "Barricade.Wood")));
        assert!(is_structure(&NearbyEntity::new(EntityKind::Decaying, "box")));
        assert!(!is_structure(&NearbyEntity::new(EntityKind::Other, "hemp-collectable")));
    }
}

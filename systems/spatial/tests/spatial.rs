use glam::Vec3;
use restraint_warden_core::{EntityKind, NearbyEntity, RejectionReason};
use restraint_warden_sandbox::{Failures, SandboxHost};
use restraint_warden_system_spatial::{Config, Validator, Verdict};

fn validator() -> Validator {
    Validator::new(Config::default())
}

#[test]
fn grounding_snaps_to_surface_and_applies_offset() {
    let mut host = SandboxHost::new();
    host.set_ground(12.0);

    let grounded = validator().ground(Vec3::new(4.0, 80.0, -3.0), &host);

    assert_eq!(grounded, Vec3::new(4.0, 13.5, -3.0));
}

#[test]
fn grounding_falls_back_to_terrain_height_when_raycast_misses() {
    let mut host = SandboxHost::new();
    host.set_ground(7.0);
    host.set_failures(Failures {
        raycast_miss: true,
        ..Failures::default()
    });

    let grounded = validator().ground(Vec3::new(1.0, 0.0, 1.0), &host);

    assert_eq!(grounded, Vec3::new(1.0, 8.5, 1.0));
}

#[test]
fn grounding_keeps_raw_height_when_every_probe_fails() {
    let mut host = SandboxHost::new();
    host.set_failures(Failures {
        geometry: true,
        ..Failures::default()
    });

    let grounded = validator().ground(Vec3::new(2.0, 30.0, 2.0), &host);

    assert_eq!(grounded, Vec3::new(2.0, 31.5, 2.0));
}

#[test]
fn open_ground_is_clear() {
    let host = SandboxHost::new();

    assert_eq!(validator().assess(Vec3::new(0.0, 1.5, 0.0), &host), Verdict::Clear);
}

#[test]
fn obstacles_inside_the_capsule_reject_the_candidate() {
    let mut host = SandboxHost::new();
    host.add_obstacle(Vec3::new(0.3, 2.0, 0.0), 0.5);

    assert_eq!(
        validator().assess(Vec3::new(0.0, 1.5, 0.0), &host),
        Verdict::Rejected(RejectionReason::Obstructed)
    );
    assert_eq!(
        validator().assess(Vec3::new(10.0, 1.5, 0.0), &host),
        Verdict::Clear,
        "distant candidates are unaffected"
    );
}

#[test]
fn structures_within_radius_reject_the_candidate() {
    let mut host = SandboxHost::new();
    host.add_structure(
        Vec3::new(4.0, 0.0, 0.0),
        NearbyEntity::new(EntityKind::BuildingBlock, "foundation"),
    );
    host.add_structure(
        Vec3::new(-4.0, 0.0, 0.0),
        NearbyEntity::new(EntityKind::Other, "hemp-collectable"),
    );

    assert_eq!(
        validator().assess(Vec3::new(2.0, 0.0, 0.0), &host),
        Verdict::Rejected(RejectionReason::NearStructures)
    );
    assert_eq!(
        validator().assess(Vec3::new(-6.0, 0.0, 0.0), &host),
        Verdict::Clear,
        "non-structure entities do not reject"
    );
}

#[test]
fn zero_structure_radius_skips_the_proximity_check() {
    let mut host = SandboxHost::new();
    host.add_structure(
        Vec3::ZERO,
        NearbyEntity::new(EntityKind::Decaying, "box.wooden.large"),
    );
    let validator = Validator::new(Config::new(0.6, 1.8, 0.0, Vec3::ZERO));

    assert_eq!(validator.is_near_structures(Vec3::ZERO, &host), Ok(false));
}

#[test]
fn probe_failures_reject_the_candidate() {
    let mut host = SandboxHost::new();
    host.set_failures(Failures {
        geometry: true,
        ..Failures::default()
    });

    assert_eq!(
        validator().assess(Vec3::ZERO, &host),
        Verdict::Rejected(RejectionReason::ProbeFailed)
    );
}

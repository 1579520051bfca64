use std::time::Duration;

use glam::Vec3;
use restraint_warden_core::{
    host::WorldQuery, ActorId, ChaosVeto, Choice, Destination, DiscardReason, Event, Notice,
    Timestamp, PERMISSION_ADMIN, PERMISSION_EXEMPT,
};
use restraint_warden_engine::{Warden, WardenConfig};
use restraint_warden_sandbox::{Failures, SandboxHost};
use restraint_warden_store::MemoryBackend;

const VICTIM: ActorId = ActorId::new(1);
const BYSTANDER: ActorId = ActorId::new(2);
const OUTPOST: Vec3 = Vec3::new(100.0, 0.0, 100.0);
const LANDING: Vec3 = Vec3::new(100.0, 1.5, 100.0);

fn config() -> WardenConfig {
    WardenConfig {
        check_interval_seconds: 1,
        max_restrain_minutes: 1,
        warn_victim: false,
        ..WardenConfig::default()
    }
}

fn world() -> SandboxHost {
    let mut host = SandboxHost::new();
    host.add_landmark("Outpost", OUTPOST);
    host.add_safe_area(OUTPOST, 30.0);
    host.spawn_actor(VICTIM, "Victim", Vec3::ZERO);
    host.spawn_actor(BYSTANDER, "Bystander", Vec3::new(40.0, 0.0, 0.0));
    host
}

fn warden(config: WardenConfig) -> Warden {
    Warden::new(config, Box::new(MemoryBackend::new()), "world-1")
}

fn secs(value: u64) -> Timestamp {
    Timestamp::from_secs(value)
}

fn enforced(events: &[Event]) -> Option<&Event> {
    events
        .iter()
        .find(|event| matches!(event, Event::LimitEnforced { .. }))
}

#[test]
fn expired_episode_releases_relocates_and_learns_the_landing_spot() {
    let mut host = world();
    let mut warden = warden(config());
    host.restrain(VICTIM);

    let events = warden.advance(secs(0), &mut host);
    assert!(events.contains(&Event::EpisodeStarted {
        actor: VICTIM,
        debug: false
    }));
    assert!(enforced(&warden.advance(secs(30), &mut host)).is_none());

    let events = warden.advance(secs(60), &mut host);
    assert_eq!(
        enforced(&events),
        Some(&Event::LimitEnforced {
            actor: VICTIM,
            elapsed: Duration::from_secs(60),
            choice: Choice::None,
            debug: false,
        })
    );
    assert!(events.contains(&Event::CandidateTeleported {
        actor: VICTIM,
        destination: Destination::Outpost,
        candidate: LANDING,
        from_cache: false,
    }));
    assert!(!host.is_restrained(VICTIM));
    assert_eq!(host.position(VICTIM), Some(LANDING));
    assert!(host.notices_for(VICTIM).contains(&Notice::Released));
    assert!(warden.tracker().episode(VICTIM).is_none());

    let events = warden.advance(Timestamp::from_millis(60_050), &mut host);
    assert!(events.contains(&Event::LandingConfirmed {
        actor: VICTIM,
        destination: Destination::Outpost,
        position: LANDING,
    }));
    assert_eq!(warden.store().cached_spot(Destination::Outpost), Some(LANDING));
    assert!(warden.search().session(VICTIM).is_none());

    let log: Vec<_> = warden.store().log().collect();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].victim, VICTIM);
    assert_eq!(log[0].victim_name, "Victim");
    assert_eq!(log[0].duration_secs, 60);
    assert!(!log[0].chaos_triggered);
    assert_eq!(warden.immunity().expires_at(VICTIM), Some(secs(360)));
}

#[test]
fn short_gaps_merge_into_one_episode() {
    let mut host = world();
    let mut warden = warden(config());
    host.restrain(VICTIM);
    let _ = warden.advance(secs(0), &mut host);

    host.unrestrain(VICTIM);
    let events = warden.advance(secs(20), &mut host);
    assert!(events.contains(&Event::EpisodeSuspended { actor: VICTIM }));

    host.restrain(VICTIM);
    let _ = warden.advance(secs(30), &mut host);
    let events = warden.advance(secs(60), &mut host);
    assert!(matches!(
        enforced(&events),
        Some(Event::LimitEnforced { elapsed, .. }) if *elapsed == Duration::from_secs(60)
    ));
}

#[test]
fn immune_victims_are_released_instead_of_tracked() {
    let mut host = world();
    let mut warden = warden(config());
    host.restrain(VICTIM);
    let _ = warden.advance(secs(0), &mut host);
    let _ = warden.advance(secs(60), &mut host);
    let _ = warden.advance(secs(61), &mut host);

    host.restrain(VICTIM);
    let events = warden.advance(secs(62), &mut host);
    assert!(events.contains(&Event::ImmuneReleased { actor: VICTIM }));
    assert!(!host.is_restrained(VICTIM));
    assert!(warden.tracker().episode(VICTIM).is_none());
}

#[test]
fn exempt_actors_are_never_enforced() {
    let mut host = world();
    host.grant(VICTIM, PERMISSION_EXEMPT);
    let mut warden = warden(config());
    host.restrain(VICTIM);

    for second in 0..=90 {
        let events = warden.advance(secs(second), &mut host);
        assert!(enforced(&events).is_none());
    }
    assert!(warden.tracker().episode(VICTIM).is_none());
    assert!(host.is_restrained(VICTIM));
}

#[test]
fn disabled_warden_does_not_poll() {
    let mut host = world();
    let mut warden = warden(WardenConfig {
        enabled: false,
        ..config()
    });
    host.restrain(VICTIM);

    assert!(warden.advance(secs(0), &mut host).is_empty());
    assert!(warden.advance(secs(120), &mut host).is_empty());
    assert!(host.is_restrained(VICTIM));
}

#[test]
fn punish_choice_triggers_chaos_at_the_origin() {
    let mut host = world();
    let mut warden = warden(WardenConfig {
        enable_punish_forgive_prompt: true,
        prompt_seconds_before_limit: 30,
        chaos_enabled: true,
        chaos_cooldown_minutes_per_victim: 1,
        ..config()
    });
    host.restrain(VICTIM);
    let _ = warden.advance(secs(0), &mut host);

    let events = warden.advance(secs(30), &mut host);
    assert!(events.contains(&Event::PromptShown { actor: VICTIM }));
    assert!(host.prompt_visible(VICTIM));

    let events = warden.record_choice(VICTIM, Choice::Punish, &mut host);
    assert_eq!(
        events,
        vec![Event::ChoiceRecorded {
            actor: VICTIM,
            choice: Choice::Punish
        }]
    );
    assert!(!host.prompt_visible(VICTIM));
    assert!(warden
        .record_choice(VICTIM, Choice::Forgive, &mut host)
        .is_empty());

    let events = warden.advance(secs(60), &mut host);
    assert!(events.contains(&Event::ChaosTriggered {
        actor: VICTIM,
        origin: Vec3::ZERO
    }));
    assert_eq!(host.effects(), &[(Vec3::ZERO, Duration::from_secs(10))]);
    let entry = warden.store().log().last().cloned();
    assert!(entry.is_some_and(|entry| entry.chaos_triggered && entry.choice == Choice::Punish));
}

#[test]
fn chaos_requires_a_punish_choice_when_prompting() {
    let mut host = world();
    let mut warden = warden(WardenConfig {
        enable_punish_forgive_prompt: true,
        prompt_seconds_before_limit: 30,
        chaos_enabled: true,
        ..config()
    });
    host.restrain(VICTIM);
    let _ = warden.advance(secs(0), &mut host);
    let _ = warden.advance(secs(30), &mut host);
    let _ = warden.record_choice(VICTIM, Choice::Forgive, &mut host);

    let events = warden.advance(secs(60), &mut host);
    assert!(events.contains(&Event::ChaosSkipped {
        actor: VICTIM,
        reason: ChaosVeto::NotChosen
    }));
    assert!(host.effects().is_empty());
}

#[test]
fn stuck_release_is_retried_once_then_diagnosed() {
    let mut host = world();
    host.set_failures(Failures {
        sticky_flag: true,
        ..Failures::default()
    });
    let mut warden = warden(config());
    host.restrain(VICTIM);
    let _ = warden.advance(secs(0), &mut host);
    let _ = warden.advance(secs(60), &mut host);
    assert!(host.is_restrained(VICTIM));

    let events = warden.advance(Timestamp::from_millis(60_050), &mut host);
    assert_eq!(
        events
            .iter()
            .filter(|event| matches!(event, Event::ReleaseRetried { .. }))
            .count(),
        1
    );

    let events = warden.advance(Timestamp::from_millis(60_200), &mut host);
    assert!(events.contains(&Event::ReleaseIncomplete { actor: VICTIM }));
}

#[test]
fn failed_teleport_falls_back_to_a_position_write() {
    let mut host = world();
    host.set_failures(Failures {
        teleport: true,
        ..Failures::default()
    });
    let mut warden = warden(config());
    host.restrain(VICTIM);
    let _ = warden.advance(secs(0), &mut host);
    let _ = warden.advance(secs(60), &mut host);

    let last = host.relocations().last().copied();
    assert!(last.is_some_and(|relocation| relocation.fallback && relocation.position == LANDING));
    let events = warden.advance(Timestamp::from_millis(60_050), &mut host);
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::LandingConfirmed { .. })));
}

#[test]
fn unknown_destination_skips_relocation() {
    let mut host = SandboxHost::new();
    host.spawn_actor(VICTIM, "Victim", Vec3::ZERO);
    let mut warden = warden(config());
    host.restrain(VICTIM);
    let _ = warden.advance(secs(0), &mut host);

    let events = warden.advance(secs(60), &mut host);
    assert!(events.contains(&Event::DestinationUnavailable {
        actor: VICTIM,
        destination: Destination::Outpost
    }));
    assert!(enforced(&events).is_some());
    assert!(!host.is_restrained(VICTIM));
    assert!(host.relocations().is_empty());
}

#[test]
fn direct_mode_teleports_to_the_center_without_a_search() {
    let mut host = world();
    let mut warden = warden(WardenConfig {
        teleport_only_within_safe_zone: false,
        ..config()
    });
    host.restrain(VICTIM);
    let _ = warden.advance(secs(0), &mut host);

    let events = warden.advance(secs(60), &mut host);
    assert!(events.contains(&Event::TeleportedToCenter {
        actor: VICTIM,
        destination: Destination::Outpost
    }));
    assert!(warden.search().session(VICTIM).is_none());
    assert_eq!(host.position(VICTIM), Some(LANDING));
}

#[test]
fn disconnect_drops_episode_and_pending_search() {
    let mut host = world();
    let mut warden = warden(config());
    host.restrain(VICTIM);
    let _ = warden.advance(secs(0), &mut host);

    host.disconnect(VICTIM);
    let events = warden.on_disconnect(VICTIM, &mut host);
    assert_eq!(
        events,
        vec![Event::EpisodeDiscarded {
            actor: VICTIM,
            reason: DiscardReason::Disconnected
        }]
    );
    assert!(warden.tracker().episode(VICTIM).is_none());
    assert!(enforced(&warden.advance(secs(60), &mut host)).is_none());
}

#[test]
fn tasks_for_disconnected_actors_are_dropped() {
    let mut host = world();
    let mut warden = warden(config());
    host.restrain(VICTIM);
    let _ = warden.advance(secs(0), &mut host);
    let _ = warden.advance(secs(60), &mut host);
    assert!(warden.pending_tasks() > 0);

    host.disconnect(VICTIM);
    let _ = warden.on_disconnect(VICTIM, &mut host);
    let events = warden.advance(Timestamp::from_millis(60_500), &mut host);
    assert!(events.is_empty());
    assert_eq!(warden.pending_tasks(), 0);
    assert_eq!(warden.store().cached_spot(Destination::Outpost), None);
}

#[test]
fn death_discards_the_episode() {
    let mut host = world();
    let mut warden = warden(config());
    host.restrain(VICTIM);
    let _ = warden.advance(secs(0), &mut host);

    host.kill(VICTIM);
    let events = warden.on_death(VICTIM, &mut host);
    assert!(events.contains(&Event::EpisodeDiscarded {
        actor: VICTIM,
        reason: DiscardReason::Died
    }));
}

#[test]
fn world_reset_forgets_learned_spots() {
    let mut host = world();
    let mut warden = warden(config());
    host.restrain(VICTIM);
    let _ = warden.advance(secs(0), &mut host);
    let _ = warden.advance(secs(60), &mut host);
    let _ = warden.advance(Timestamp::from_millis(60_050), &mut host);
    assert!(warden.store().cached_spot(Destination::Outpost).is_some());

    warden.on_world_reset("world-2");
    assert_eq!(warden.store().cached_spot(Destination::Outpost), None);
    assert_eq!(warden.store().log().count(), 0);
}

#[test]
fn shutdown_hides_prompts_and_clears_state() {
    let mut host = world();
    let mut warden = warden(WardenConfig {
        enable_punish_forgive_prompt: true,
        prompt_seconds_before_limit: 60,
        ..config()
    });
    host.restrain(VICTIM);
    let _ = warden.advance(secs(0), &mut host);
    assert!(host.prompt_visible(VICTIM));

    warden.shutdown(&mut host);
    assert!(!host.prompt_visible(VICTIM));
    assert!(warden.tracker().episode(VICTIM).is_none());
    assert_eq!(warden.pending_tasks(), 0);
}

#[test]
fn releasing_an_already_released_actor_is_a_no_op() {
    let mut host = world();
    host.grant(BYSTANDER, PERMISSION_ADMIN);
    let mut warden = warden(WardenConfig {
        debug_test_seconds: 5,
        ..config()
    });
    let _ = warden.execute_admin(BYSTANDER, &["debug"], secs(0), &mut host);
    let _ = warden.advance(secs(0), &mut host);
    let events = warden.advance(secs(5), &mut host);
    assert!(enforced(&events).is_some());
    let _ = warden.advance(secs(6), &mut host);
    assert!(!host.is_restrained(BYSTANDER));
    let released = host.actor(BYSTANDER).cloned();

    let mut events = warden
        .execute_admin(BYSTANDER, &["debugoff"], secs(7), &mut host)
        .events;
    for millis in [7_000, 7_050, 7_200, 8_000] {
        events.extend(warden.advance(Timestamp::from_millis(millis), &mut host));
    }

    assert!(!events.iter().any(|event| matches!(
        event,
        Event::ReleaseRetried { .. } | Event::ReleaseIncomplete { .. }
    )));
    assert_eq!(host.actor(BYSTANDER).cloned(), released);
    assert!(!host.is_restrained(BYSTANDER));
}

#[test]
fn oversized_config_durations_do_not_crash() {
    let config = WardenConfig::from_toml_str(
        "check_interval_seconds = 1\n\
         max_restrain_minutes = 1\n\
         teleport_attempt_timeout_seconds = 1e30\n\
         exempt_permission_cache_seconds = 1e30\n",
    )
    .expect("document parses");
    let mut host = world();
    let mut warden = warden(config);
    host.restrain(VICTIM);

    let _ = warden.advance(secs(0), &mut host);
    let events = warden.advance(secs(60), &mut host);
    assert!(enforced(&events).is_some());
    let events = warden.advance(Timestamp::from_millis(60_050), &mut host);
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::LandingConfirmed { .. })));
}

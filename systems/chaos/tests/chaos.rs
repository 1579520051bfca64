use std::time::Duration;

use glam::Vec3;
use restraint_warden_core::{ActorId, ChaosVeto, Choice, Event, Timestamp};
use restraint_warden_sandbox::{Failures, SandboxHost};
use restraint_warden_store::{BlacklistPolicy, MemoryBackend, Store};
use restraint_warden_system_chaos::{Chaos, Config, Enforcement};

const VICTIM: ActorId = ActorId::new(5);
const ORIGIN: Vec3 = Vec3::new(40.0, 0.0, 40.0);

fn store() -> Store {
    Store::open(
        Box::new(MemoryBackend::new()),
        "world",
        BlacklistPolicy::default(),
    )
}

fn host() -> SandboxHost {
    let mut host = SandboxHost::new();
    host.spawn_actor(VICTIM, "victim", ORIGIN);
    host
}

fn enforcement(choice: Choice) -> Enforcement {
    Enforcement {
        victim: VICTIM,
        origin: ORIGIN,
        origin_in_safe_area: false,
        choice,
    }
}

fn enabled(cooldown: Duration) -> Config {
    Config::new(true, Duration::from_secs(10), cooldown)
}

#[test]
fn cooldown_blocks_repeat_triggers_until_it_elapses() {
    let chaos = Chaos::new(enabled(Duration::from_secs(60)));
    let mut host = host();
    let mut store = store();
    let mut events = Vec::new();

    let first = chaos.trigger(
        &enforcement(Choice::None),
        Timestamp::from_secs(0),
        &mut host,
        &mut store,
        &mut events,
    );
    let second = chaos.trigger(
        &enforcement(Choice::None),
        Timestamp::from_secs(30),
        &mut host,
        &mut store,
        &mut events,
    );
    let third = chaos.trigger(
        &enforcement(Choice::None),
        Timestamp::from_secs(61),
        &mut host,
        &mut store,
        &mut events,
    );

    assert!(first, "first enforcement triggers");
    assert!(!second, "cooldown still running after 30 seconds");
    assert!(third, "cooldown elapsed after 61 seconds");
    assert_eq!(host.effects().len(), 2);
    assert_eq!(store.last_chaos(VICTIM), Some(Timestamp::from_secs(61)));
    assert!(events.contains(&Event::ChaosSkipped {
        actor: VICTIM,
        reason: ChaosVeto::CoolingDown,
    }));
}

#[test]
fn spawned_effect_uses_origin_and_fuse() {
    let chaos = Chaos::new(enabled(Duration::ZERO));
    let mut host = host();
    let mut store = store();

    assert!(chaos.trigger(
        &enforcement(Choice::None),
        Timestamp::from_secs(5),
        &mut host,
        &mut store,
        &mut Vec::new(),
    ));

    assert_eq!(host.effects(), &[(ORIGIN, Duration::from_secs(10))]);
}

#[test]
fn zero_cooldown_never_blocks() {
    let chaos = Chaos::new(enabled(Duration::ZERO));
    let mut store = store();
    store.mark_chaos(VICTIM, Timestamp::from_secs(100));

    assert!(chaos.cooldown_elapsed(VICTIM, Timestamp::from_secs(100), &store));
}

#[test]
fn disabled_subsystem_vetoes_first() {
    let chaos = Chaos::new(Config::default());

    assert_eq!(
        chaos.evaluate(&enforcement(Choice::Punish), Timestamp::default(), &host(), &store()),
        Err(ChaosVeto::Disabled)
    );
}

#[test]
fn required_choice_must_be_punish() {
    let chaos = Chaos::new(enabled(Duration::ZERO).with_required_choice(true));
    let host = host();
    let store = store();

    assert_eq!(
        chaos.evaluate(&enforcement(Choice::None), Timestamp::default(), &host, &store),
        Err(ChaosVeto::NotChosen)
    );
    assert_eq!(
        chaos.evaluate(&enforcement(Choice::Forgive), Timestamp::default(), &host, &store),
        Err(ChaosVeto::NotChosen)
    );
    assert_eq!(
        chaos.evaluate(&enforcement(Choice::Punish), Timestamp::default(), &host, &store),
        Ok(())
    );
}

#[test]
fn safe_origins_are_spared_unless_allowed() {
    let safe = Enforcement {
        origin_in_safe_area: true,
        ..enforcement(Choice::None)
    };
    let host = host();
    let store = store();

    assert_eq!(
        Chaos::new(enabled(Duration::ZERO)).evaluate(&safe, Timestamp::default(), &host, &store),
        Err(ChaosVeto::SafeOrigin)
    );
    assert_eq!(
        Chaos::new(enabled(Duration::ZERO).with_outside_safe_areas_only(false)).evaluate(
            &safe,
            Timestamp::default(),
            &host,
            &store
        ),
        Ok(())
    );
}

#[test]
fn crowd_limit_counts_living_connected_bystanders() {
    let chaos = Chaos::new(enabled(Duration::ZERO).with_crowd_limit(6.0, 1));
    let mut host = host();
    host.spawn_actor(ActorId::new(10), "near", ORIGIN + Vec3::X * 3.0);
    host.spawn_actor(ActorId::new(11), "dead", ORIGIN + Vec3::Z * 2.0);
    host.kill(ActorId::new(11));
    host.spawn_actor(ActorId::new(12), "gone", ORIGIN);
    host.disconnect(ActorId::new(12));
    host.spawn_actor(ActorId::new(13), "far", ORIGIN + Vec3::X * 30.0);
    let store = store();

    assert_eq!(
        chaos.evaluate(&enforcement(Choice::None), Timestamp::default(), &host, &store),
        Ok(()),
        "one bystander is within the cap"
    );

    host.spawn_actor(ActorId::new(14), "second", ORIGIN - Vec3::X * 4.0);
    assert_eq!(
        chaos.evaluate(&enforcement(Choice::None), Timestamp::default(), &host, &store),
        Err(ChaosVeto::Crowded)
    );
}

#[test]
fn spawn_failure_is_reported_and_not_recorded() {
    let chaos = Chaos::new(enabled(Duration::from_secs(60)));
    let mut host = host();
    host.set_failures(Failures {
        spawn: true,
        ..Failures::default()
    });
    let mut store = store();
    let mut events = Vec::new();

    let triggered = chaos.trigger(
        &enforcement(Choice::None),
        Timestamp::from_secs(1),
        &mut host,
        &mut store,
        &mut events,
    );

    assert!(!triggered);
    assert_eq!(store.last_chaos(VICTIM), None);
    assert_eq!(
        events,
        vec![Event::ChaosSkipped {
            actor: VICTIM,
            reason: ChaosVeto::SpawnFailed,
        }]
    );
}

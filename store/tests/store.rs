use glam::Vec3;
use restraint_warden_core::{ActorId, Choice, Destination, Timestamp};
use restraint_warden_store::{
    BlacklistPolicy, JsonFileBackend, LogEntry, MemoryBackend, Store, LOG_CAPACITY,
};

fn open(backend: &MemoryBackend, world_id: &str) -> Store {
    Store::open(Box::new(backend.clone()), world_id, BlacklistPolicy::default())
}

fn entry(victim: u64) -> LogEntry {
    LogEntry {
        at: Timestamp::from_secs(victim),
        victim: ActorId::new(victim),
        victim_name: format!("victim-{victim}"),
        duration_secs: 1_200,
        destination: Destination::Outpost,
        choice: Choice::None,
        chaos_triggered: false,
    }
}

#[test]
fn blacklist_membership_honours_min_distance() {
    let backend = MemoryBackend::new();
    let mut store = Store::open(
        Box::new(backend),
        "world",
        BlacklistPolicy {
            min_distance: 6.0,
            capacity: 50,
        },
    );
    store.add_to_blacklist(Destination::Outpost, Vec3::ZERO);

    assert!(store.is_blacklisted(Destination::Outpost, Vec3::new(0.0, 5.0, 0.0)));
    assert!(!store.is_blacklisted(Destination::Outpost, Vec3::new(0.0, 7.0, 0.0)));
    assert!(
        !store.is_blacklisted(Destination::BanditCamp, Vec3::new(0.0, 5.0, 0.0)),
        "blacklists are kept per destination"
    );
}

#[test]
fn blacklist_evicts_oldest_entries_beyond_capacity() {
    let mut store = Store::open(
        Box::new(MemoryBackend::new()),
        "world",
        BlacklistPolicy {
            min_distance: 1.0,
            capacity: 3,
        },
    );
    for index in 0..5 {
        store.add_to_blacklist(Destination::BanditCamp, Vec3::new(index as f32 * 10.0, 0.0, 0.0));
    }

    assert_eq!(
        store.blacklist(Destination::BanditCamp),
        &[
            Vec3::new(20.0, 0.0, 0.0),
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::new(40.0, 0.0, 0.0),
        ]
    );
}

#[test]
fn cached_spot_is_overwritten_and_evicted() {
    let backend = MemoryBackend::new();
    let mut store = open(&backend, "world");

    store.cache_spot(Destination::Outpost, Vec3::new(1.0, 2.0, 3.0));
    store.cache_spot(Destination::Outpost, Vec3::new(4.0, 5.0, 6.0));
    assert_eq!(
        store.cached_spot(Destination::Outpost),
        Some(Vec3::new(4.0, 5.0, 6.0))
    );

    assert_eq!(
        store.evict_cached_spot(Destination::Outpost),
        Some(Vec3::new(4.0, 5.0, 6.0))
    );
    assert_eq!(store.cached_spot(Destination::Outpost), None);
    assert_eq!(store.evict_cached_spot(Destination::Outpost), None);
}

#[test]
fn reopening_same_world_keeps_recorded_data() {
    let backend = MemoryBackend::new();
    {
        let mut store = open(&backend, "seed:4000:Procedural Map");
        store.cache_spot(Destination::BanditCamp, Vec3::new(10.0, 1.5, -4.0));
        store.mark_chaos(ActorId::new(7), Timestamp::from_secs(90));
        store.append_log(entry(7));
    }

    let store = open(&backend, "seed:4000:Procedural Map");
    assert_eq!(
        store.cached_spot(Destination::BanditCamp),
        Some(Vec3::new(10.0, 1.5, -4.0))
    );
    assert_eq!(store.last_chaos(ActorId::new(7)), Some(Timestamp::from_secs(90)));
    assert_eq!(store.log().count(), 1);
}

#[test]
fn opening_a_different_world_wipes_previous_data() {
    let backend = MemoryBackend::new();
    {
        let mut store = open(&backend, "old-world");
        store.cache_spot(Destination::Outpost, Vec3::ONE);
        store.add_to_blacklist(Destination::Outpost, Vec3::ZERO);
        store.mark_chaos(ActorId::new(1), Timestamp::from_secs(1));
    }

    let store = open(&backend, "new-world");
    assert_eq!(store.data().world_id, "new-world");
    assert_eq!(store.cached_spot(Destination::Outpost), None);
    assert!(store.blacklist(Destination::Outpost).is_empty());
    assert_eq!(store.last_chaos(ActorId::new(1)), None);
    assert!(
        backend
            .contents()
            .expect("wipe saves the record")
            .contains("new-world"),
        "the wiped record should be written back"
    );
}

#[test]
fn corrupt_record_resets_to_empty_default() {
    let backend = MemoryBackend::with_contents("{ this is not json");
    let store = open(&backend, "world");

    assert_eq!(store.data().world_id, "world");
    assert!(store.data().cached_spots.is_empty());
    assert_eq!(store.log().count(), 0);
}

#[test]
fn audit_log_is_bounded() {
    let mut store = open(&MemoryBackend::new(), "world");
    for victim in 0..(LOG_CAPACITY as u64 + 5) {
        store.append_log(entry(victim));
    }

    assert_eq!(store.log().count(), LOG_CAPACITY);
    assert_eq!(
        store.log().next().map(|entry| entry.victim),
        Some(ActorId::new(5)),
        "oldest entries are evicted first"
    );
}

#[test]
fn json_file_backend_round_trips_through_disk() {
    let directory = std::env::temp_dir().join(format!(
        "restraint-warden-store-{}",
        std::process::id()
    ));
    let path = directory.join("record.json");
    let _ = std::fs::remove_file(&path);

    {
        let mut store = Store::open(
            Box::new(JsonFileBackend::new(&path)),
            "disk-world",
            BlacklistPolicy::default(),
        );
        store.cache_spot(Destination::Outpost, Vec3::new(3.0, 4.0, 5.0));
    }

    let store = Store::open(
        Box::new(JsonFileBackend::new(&path)),
        "disk-world",
        BlacklistPolicy::default(),
    );
    assert_eq!(
        store.cached_spot(Destination::Outpost),
        Some(Vec3::new(3.0, 4.0, 5.0))
    );

    let _ = std::fs::remove_dir_all(&directory);
}

//! Integration tests for Holdings

use holdings::collection::{
    DatasetRemoval, ListParams, LocalSet, Set, SnapshotCodec, VersionInfo, WritableSet,
    DATASET_REMOVED, DATASET_SAVED,
};
use holdings::event::{Bus, EventBus, Shutdown};
use holdings::identity::ProfileId;
use holdings::HoldingsError;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn dataset(pid: ProfileId, init_id: &str, username: &str, name: &str) -> VersionInfo {
    VersionInfo::new(pid, init_id, username, name)
}

mod bus_driven_collection {
    use super::*;

    #[test]
    fn saved_events_populate_the_index() {
        init_logging();

        let set = Arc::new(LocalSet::in_memory());
        let bus = EventBus::new(Shutdown::new());
        LocalSet::subscribe(&set, &bus);
        assert_eq!(bus.num_subscribers(), 2);

        let alice = ProfileId::from_key_digest(b"alice");

        bus.publish(
            DATASET_SAVED,
            Arc::new(dataset(alice, "x1", "alice", "temps")),
        )
        .unwrap();
        bus.publish(
            DATASET_SAVED,
            Arc::new(dataset(alice, "x2", "alice", "survey")),
        )
        .unwrap();

        let names: Vec<_> = set
            .list(alice, ListParams::all())
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["survey", "temps"]);
    }

    #[test]
    fn removed_events_drop_entries() {
        let set = Arc::new(LocalSet::in_memory());
        let bus = EventBus::new(Shutdown::new());
        LocalSet::subscribe(&set, &bus);

        let alice = ProfileId::from_key_digest(b"alice");
        set.put(
            alice,
            vec![
                dataset(alice, "x1", "alice", "temps"),
                dataset(alice, "x2", "alice", "survey"),
            ],
        )
        .unwrap();

        bus.publish(
            DATASET_REMOVED,
            Arc::new(DatasetRemoval {
                profile_id: alice,
                init_id: "x1".to_string(),
            }),
        )
        .unwrap();

        let listed = set.list(alice, ListParams::all()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].init_id, "x2");
    }

    #[test]
    fn subscriber_failures_reach_the_publisher() {
        let set = Arc::new(LocalSet::in_memory());
        let bus = EventBus::new(Shutdown::new());
        LocalSet::subscribe(&set, &bus);

        let alice = ProfileId::from_key_digest(b"alice");

        // Removing from a profile with no collection fails inside the
        // handler; the publisher sees that exact error.
        let err = bus
            .publish(
                DATASET_REMOVED,
                Arc::new(DatasetRemoval {
                    profile_id: alice,
                    init_id: "x1".to_string(),
                }),
            )
            .unwrap_err();
        assert!(matches!(err, HoldingsError::CollectionNotFound { .. }));

        // An entry that fails validation is refused the same way
        let err = bus
            .publish(DATASET_SAVED, Arc::new(dataset(alice, "x1", "", "temps")))
            .unwrap_err();
        assert!(matches!(err, HoldingsError::MissingField { .. }));
        assert!(set.list(alice, ListParams::all()).is_err());
    }

    #[test]
    fn wrong_payload_type_is_rejected() {
        let set = Arc::new(LocalSet::in_memory());
        let bus = EventBus::new(Shutdown::new());
        LocalSet::subscribe(&set, &bus);

        let err = bus
            .publish(DATASET_SAVED, Arc::new("not a version info"))
            .unwrap_err();
        assert!(matches!(err, HoldingsError::UnexpectedPayload { .. }));
    }

    #[test]
    fn cancelled_scope_stops_index_updates() {
        let set = Arc::new(LocalSet::in_memory());
        let scope = Shutdown::new();
        let bus = EventBus::new(scope.clone());
        LocalSet::subscribe(&set, &bus);

        let alice = ProfileId::from_key_digest(b"alice");
        bus.publish(
            DATASET_SAVED,
            Arc::new(dataset(alice, "x1", "alice", "temps")),
        )
        .unwrap();

        scope.cancel();

        let err = bus
            .publish(
                DATASET_SAVED,
                Arc::new(dataset(alice, "x2", "alice", "survey")),
            )
            .unwrap_err();
        assert!(matches!(err, HoldingsError::BusClosed));

        // The index still holds exactly what arrived before the cutoff
        assert_eq!(set.list(alice, ListParams::all()).unwrap().len(), 1);
    }
}

mod persistence {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn full_cycle_survives_restart() {
        init_logging();

        for codec in [SnapshotCodec::Json, SnapshotCodec::Compact] {
            let dir = TempDir::new().unwrap();
            let alice = ProfileId::from_key_digest(b"alice");

            {
                let set = Arc::new(LocalSet::open(dir.path(), codec).unwrap());
                let bus = EventBus::new(Shutdown::new());
                LocalSet::subscribe(&set, &bus);

                bus.publish(
                    DATASET_SAVED,
                    Arc::new(dataset(alice, "x1", "alice", "temps")),
                )
                .unwrap();
                bus.publish(
                    DATASET_SAVED,
                    Arc::new(dataset(alice, "x2", "alice", "survey")),
                )
                .unwrap();
                bus.publish(
                    DATASET_SAVED,
                    Arc::new(dataset(alice, "x3", "alice", "birds")),
                )
                .unwrap();
                bus.publish(
                    DATASET_REMOVED,
                    Arc::new(DatasetRemoval {
                        profile_id: alice,
                        init_id: "x3".to_string(),
                    }),
                )
                .unwrap();
            }

            let reloaded = LocalSet::open(dir.path(), codec).unwrap();
            let names: Vec<_> = reloaded
                .list(alice, ListParams::all())
                .unwrap()
                .into_iter()
                .map(|e| e.name)
                .collect();
            assert_eq!(names, ["survey", "temps"], "codec {codec:?}");
        }
    }

    #[test]
    fn descriptive_fields_survive_restart() {
        for codec in [SnapshotCodec::Json, SnapshotCodec::Compact] {
            let dir = TempDir::new().unwrap();
            let alice = ProfileId::from_key_digest(b"alice");

            let mut info = dataset(alice, "x1", "alice", "temps");
            info.meta_title = "City temperatures".to_string();
            info.themes = vec!["weather".to_string(), "climate".to_string()];
            info.head_ref = "/store/QmHead".to_string();
            info.body_size = 4096;
            info.body_rows = 120;
            info.num_errors = 1;
            info.top_index = 5;
            info.cursor_index = 3;

            {
                let set = LocalSet::open(dir.path(), codec).unwrap();
                set.put(alice, vec![info.clone()]).unwrap();
            }

            let reloaded = LocalSet::open(dir.path(), codec).unwrap();
            let listed = reloaded.list(alice, ListParams::all()).unwrap();
            assert_eq!(listed, vec![info], "codec {codec:?}");
        }
    }
}

mod concurrency {
    use super::*;
    use std::thread;

    #[test]
    fn concurrent_writers_across_profiles() {
        let set = Arc::new(LocalSet::in_memory());

        let handles: Vec<_> = (0..8)
            .map(|w| {
                let set = Arc::clone(&set);
                thread::spawn(move || {
                    let pid = ProfileId::from_key_digest(format!("writer {w}").as_bytes());
                    for i in 0..50 {
                        set.put(
                            pid,
                            vec![dataset(
                                pid,
                                &format!("init-{w}-{i}"),
                                "worker",
                                &format!("ds-{i:03}"),
                            )],
                        )
                        .unwrap();
                    }
                    pid
                })
            })
            .collect();

        for handle in handles {
            let pid = handle.join().unwrap();
            let listed = set.list(pid, ListParams::all()).unwrap();
            assert_eq!(listed.len(), 50);

            // Sorted by name after the last mutation
            let names: Vec<_> = listed.iter().map(|e| e.name.as_str()).collect();
            let mut sorted = names.clone();
            sorted.sort_unstable();
            assert_eq!(names, sorted);
        }
    }

    #[test]
    fn same_profile_writers_serialize() {
        let set = Arc::new(LocalSet::in_memory());
        let pid = ProfileId::from_key_digest(b"shared profile");

        let handles: Vec<_> = (0..4)
            .map(|w| {
                let set = Arc::clone(&set);
                thread::spawn(move || {
                    for i in 0..25 {
                        set.put(
                            pid,
                            vec![dataset(pid, &format!("init-{w}-{i}"), "worker", "same-name")],
                        )
                        .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Every distinct lineage landed exactly once
        let listed = set.list(pid, ListParams::all()).unwrap();
        assert_eq!(listed.len(), 100);
    }
}

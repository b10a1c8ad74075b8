use std::sync::{Arc, Barrier};
use std::thread;

use xferlog_store::{
    Database, Direction, EntityKind, NewPath, PathStage, PathState, PeerId, StoreConfig,
    StoreError, TerminalPolicy, TransferId, TransferStage, TransferState,
};

fn open() -> Database {
    Database::open_in_memory(StoreConfig::default()).unwrap()
}

#[test]
fn outgoing_path_completes_and_stays_completed() {
    let db = open();
    let p1 = PeerId::from("P1");
    let t1 = TransferId::from("T1");

    db.create_peer(&p1).unwrap();
    db.create_transfer(&t1, &p1, Direction::Outgoing).unwrap();
    db.create_outgoing_path(&t1, "report.pdf", "PA1", 1000).unwrap();

    db.append_path_event(&t1, "PA1", PathStage::Pending).unwrap();
    db.append_path_event(&t1, "PA1", PathStage::Started { bytes: 0 }).unwrap();
    db.append_path_event(&t1, "PA1", PathStage::Started { bytes: 1000 }).unwrap();
    db.append_path_event(&t1, "PA1", PathStage::Completed { final_path: None })
        .unwrap();

    let snapshot = db.path_state(&t1, "PA1").unwrap();
    assert_eq!(snapshot.state, PathState::Completed);
    assert_eq!(snapshot.bytes, 1000);

    let err = db
        .append_path_event(
            &t1,
            "PA1",
            PathStage::Cancelled {
                by_peer: false,
                bytes: 1000,
            },
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::IllegalTransition { .. }));
    assert!(err.is_recoverable());

    for proposed in [PathStage::Started { bytes: 1000 }, PathStage::Pending] {
        assert!(matches!(
            db.validate_path_event(&t1, "PA1", &proposed),
            Err(StoreError::IllegalTransition { .. })
        ));
    }
    assert_eq!(db.path_history(&t1, "PA1").unwrap().len(), 4);
}

#[test]
fn cancellation_outranks_stale_started() {
    let db = open();
    let peer = PeerId::from("P1");
    let t = TransferId::from("T1");
    db.create_peer(&peer).unwrap();
    db.create_transfer(&t, &peer, Direction::Incoming).unwrap();
    db.create_incoming_path(&t, "movie.mkv", "f1", 5000).unwrap();

    db.append_path_event(&t, "f1", PathStage::Pending).unwrap();
    db.append_path_event(&t, "f1", PathStage::Started { bytes: 100 }).unwrap();
    db.append_path_event(
        &t,
        "f1",
        PathStage::Cancelled {
            by_peer: true,
            bytes: 100,
        },
    )
    .unwrap();
    db.append_path_event(&t, "f1", PathStage::Started { bytes: 100 }).unwrap();

    assert_eq!(db.path_state(&t, "f1").unwrap().state, PathState::Cancelled);
}

#[test]
fn regressed_counter_surfaces_on_read() {
    let db = open();
    let peer = PeerId::from("P1");
    let t = TransferId::from("T1");
    db.create_peer(&peer).unwrap();
    db.create_transfer(&t, &peer, Direction::Outgoing).unwrap();
    db.create_outgoing_path(&t, "a.bin", "f1", 200).unwrap();

    db.append_path_event(&t, "f1", PathStage::Pending).unwrap();
    db.append_path_event(&t, "f1", PathStage::Started { bytes: 100 }).unwrap();
    db.append_path_event(&t, "f1", PathStage::Started { bytes: 50 }).unwrap();

    let snapshot = db.path_state(&t, "f1").unwrap();
    assert_eq!(snapshot.state, PathState::Started);
    assert_eq!(snapshot.regressions.len(), 1);

    match db.checked_path_state(&t, "f1") {
        Err(StoreError::RegressedCounter {
            previous, observed, ..
        }) => {
            assert_eq!(previous, 100);
            assert_eq!(observed, 50);
        }
        other => panic!("expected RegressedCounter, got {other:?}"),
    }
}

#[test]
fn history_is_never_rewritten() {
    let db = open();
    let peer = PeerId::from("P1");
    let t = TransferId::from("T1");
    db.create_peer(&peer).unwrap();
    db.create_transfer(&t, &peer, Direction::Outgoing).unwrap();
    db.create_outgoing_path(&t, "a.bin", "f1", 10).unwrap();

    db.append_path_event(&t, "f1", PathStage::Pending).unwrap();
    db.append_path_event(&t, "f1", PathStage::Started { bytes: 3 }).unwrap();
    let before = db.path_history(&t, "f1").unwrap();

    db.append_path_event(&t, "f1", PathStage::Started { bytes: 7 }).unwrap();
    let _ = db.append_path_event(&t, "f1", PathStage::Pending);
    db.append_path_event(
        &t,
        "f1",
        PathStage::Failed {
            status_code: 9,
            bytes: 7,
        },
    )
    .unwrap();

    let after = db.path_history(&t, "f1").unwrap();
    assert_eq!(&after[..before.len()], &before[..]);
    assert_eq!(after.len(), 4);
}

#[test]
fn removing_a_peer_removes_its_whole_subtree() {
    let db = open();
    let doomed = PeerId::from("P1");
    let kept = PeerId::from("P2");
    for (peer, t) in [(&doomed, "T1"), (&kept, "T2")] {
        db.create_peer(peer).unwrap();
        db.create_transfer_with_paths(
            &t.into(),
            peer,
            Direction::Incoming,
            &[NewPath {
                path_id: "f1".into(),
                path: "a.txt".into(),
                bytes: 5,
            }],
        )
        .unwrap();
        db.append_path_event(&t.into(), "f1", PathStage::Started { bytes: 5 })
            .unwrap();
        db.append_transfer_event(&t.into(), TransferStage::Cancelled { by_peer: true })
            .unwrap();
    }

    db.remove_peer(&doomed).unwrap();

    assert!(matches!(
        db.get_peer(&doomed),
        Err(StoreError::UnknownEntity {
            kind: EntityKind::Peer,
            ..
        })
    ));
    assert!(matches!(
        db.transfer_state(&"T1".into()),
        Err(StoreError::UnknownEntity { .. })
    ));

    let conn = db.conn().unwrap();
    let count = |sql: &str| -> i64 { conn.query_row(sql, [], |row| row.get(0)).unwrap() };
    assert_eq!(count("SELECT COUNT(*) FROM transfers"), 1);
    assert_eq!(count("SELECT COUNT(*) FROM incoming_paths"), 1);
    assert_eq!(count("SELECT COUNT(*) FROM incoming_path_pending_states"), 1);
    assert_eq!(count("SELECT COUNT(*) FROM incoming_path_started_states"), 1);
    assert_eq!(count("SELECT COUNT(*) FROM transfer_active_states"), 1);
    assert_eq!(count("SELECT COUNT(*) FROM transfer_cancel_states"), 1);
    drop(conn);

    assert_eq!(
        db.transfer_state(&"T2".into()).unwrap().state,
        TransferState::Cancelled
    );
}

#[test]
fn racing_cancel_and_fail_on_one_path() {
    let db = Arc::new(open());
    let peer = PeerId::from("P1");
    let t = TransferId::from("T1");
    db.create_peer(&peer).unwrap();
    db.create_transfer(&t, &peer, Direction::Outgoing).unwrap();
    db.create_outgoing_path(&t, "a.bin", "f1", 10).unwrap();
    db.append_path_event(&t, "f1", PathStage::Pending).unwrap();
    db.append_path_event(&t, "f1", PathStage::Started { bytes: 4 }).unwrap();

    let writers: Vec<_> = (0..12u32)
        .map(|i| {
            let db = Arc::clone(&db);
            let t = t.clone();
            thread::spawn(move || {
                let stage = if i % 2 == 0 {
                    PathStage::Cancelled {
                        by_peer: false,
                        bytes: 4,
                    }
                } else {
                    PathStage::Failed {
                        status_code: i,
                        bytes: 4,
                    }
                };
                db.append_path_event(&t, "f1", stage)
            })
        })
        .collect();

    let accepted = writers
        .into_iter()
        .map(|w| w.join().unwrap())
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(accepted, 1);

    let terminal = db
        .path_history(&t, "f1")
        .unwrap()
        .into_iter()
        .filter(|e| e.stage.is_terminal())
        .count();
    assert_eq!(terminal, 1);
}

#[test]
fn last_wins_policy_applies_to_preexisting_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    {
        let db = Database::open_at(&path, StoreConfig::default()).unwrap();
        db.create_peer(&"P1".into()).unwrap();
        db.create_transfer(&"T1".into(), &"P1".into(), Direction::Outgoing)
            .unwrap();
        db.append_transfer_event(&"T1".into(), TransferStage::Failed { status_code: 3 })
            .unwrap();

        // a second terminal row written behind the guard's back
        db.conn()
            .unwrap()
            .execute(
                "INSERT INTO transfer_cancel_states (transfer_id, by_peer, created_at)
                 VALUES ('T1', 1, '2999-01-01 00:00:00.000')",
                [],
            )
            .unwrap();
    }

    let first = Database::open_at(&path, StoreConfig::default()).unwrap();
    assert_eq!(
        first.transfer_state(&"T1".into()).unwrap().state,
        TransferState::Failed
    );
    drop(first);

    let last = Database::open_at(
        &path,
        StoreConfig::default().with_terminal_policy(TerminalPolicy::LastWins),
    )
    .unwrap();
    assert_eq!(
        last.transfer_state(&"T1".into()).unwrap().state,
        TransferState::Cancelled
    );
}

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let t = TransferId::from("T1");

    {
        let db = Database::open_at(&path, StoreConfig::default()).unwrap();
        db.create_peer(&"P1".into()).unwrap();
        db.create_transfer(&t, &"P1".into(), Direction::Incoming).unwrap();
        db.create_incoming_path(&t, "a.txt", "f1", 3).unwrap();
        db.append_path_event(&t, "f1", PathStage::Pending).unwrap();
        db.append_path_event(&t, "f1", PathStage::Started { bytes: 2 }).unwrap();
    }

    let db = Database::open_at(&path, StoreConfig::default()).unwrap();
    let snapshot = db.path_state(&t, "f1").unwrap();
    assert_eq!(snapshot.state, PathState::Started);
    assert_eq!(snapshot.bytes, 2);

    // new appends sort after everything already on disk
    let record = db
        .append_path_event(
            &t,
            "f1",
            PathStage::Completed {
                final_path: Some("/dl/a.txt".into()),
            },
        )
        .unwrap();
    let history = db.path_history(&t, "f1").unwrap();
    assert_eq!(history.last(), Some(&record));
}

#[test]
fn peer_removal_excludes_concurrent_appends() {
    for round in 0..5 {
        let db = Arc::new(open());
        let peer = PeerId::from("P");
        db.create_peer(&peer).unwrap();
        let transfers: Vec<TransferId> = (0..8).map(|i| TransferId::from(format!("T{i}"))).collect();
        for t in &transfers {
            db.create_transfer_with_paths(
                t,
                &peer,
                Direction::Outgoing,
                &[NewPath {
                    path_id: "f1".into(),
                    path: "a.bin".into(),
                    bytes: 1_000,
                }],
            )
            .unwrap();
        }

        let barrier = Arc::new(Barrier::new(transfers.len() + 1));
        let writers: Vec<_> = transfers
            .iter()
            .cloned()
            .map(|t| {
                let db = Arc::clone(&db);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for bytes in (0..1_000).step_by(100) {
                        match db.append_path_event(&t, "f1", PathStage::Started { bytes }) {
                            Ok(_) => {}
                            // the subtree vanished underneath us
                            Err(StoreError::UnknownEntity { .. }) => break,
                            Err(other) => panic!("unexpected append error: {other}"),
                        }
                    }
                })
            })
            .collect();

        let remover = {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            let peer = peer.clone();
            thread::spawn(move || {
                barrier.wait();
                db.remove_peer(&peer)
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        remover.join().unwrap().unwrap();

        let conn = db.conn().unwrap();
        let count = |table: &str| -> i64 {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .unwrap()
        };
        for table in [
            "peers",
            "transfers",
            "outgoing_paths",
            "transfer_active_states",
            "outgoing_path_pending_states",
            "outgoing_path_started_states",
        ] {
            assert_eq!(count(table), 0, "round {round}: rows left in {table}");
        }

        let mut stmt = conn.prepare("PRAGMA foreign_key_check").unwrap();
        let dangling = stmt.query_map([], |_| Ok(())).unwrap().count();
        assert_eq!(dangling, 0, "round {round}: dangling foreign keys");
    }
}

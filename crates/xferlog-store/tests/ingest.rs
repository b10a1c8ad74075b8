use xferlog_shared::{Direction, EngineEvent, FileInfo, TransferInfo};
use xferlog_store::{Database, PathState, StoreConfig, StoreError, TransferId, TransferState};

fn offer(id: &str, direction: Direction, sizes: &[i64]) -> EngineEvent {
    EngineEvent::Pending {
        direction,
        transfer: TransferInfo {
            id: id.into(),
            peer: "laptop".into(),
            files: sizes
                .iter()
                .enumerate()
                .map(|(i, bytes)| FileInfo {
                    path_id: format!("file-{i}"),
                    path: format!("dir/file-{i}.dat"),
                    bytes: *bytes,
                })
                .collect(),
        },
    }
}

#[test]
fn download_session_end_to_end() {
    let db = Database::open_in_memory(StoreConfig::default()).unwrap();
    let t = TransferId::from("dl-1");

    db.ingest(&offer("dl-1", Direction::Incoming, &[10, 0])).unwrap();
    assert_eq!(db.list_peers().unwrap().len(), 1);

    db.ingest(&EngineEvent::FileStarted {
        transfer_id: t.clone(),
        path_id: "file-0".into(),
    })
    .unwrap();
    db.ingest(&EngineEvent::Progress {
        transfer_id: t.clone(),
        path_id: "file-0".into(),
        bytes: 10,
    })
    .unwrap();
    db.ingest(&EngineEvent::FileDownloadComplete {
        transfer_id: t.clone(),
        path_id: "file-0".into(),
        final_path: "/home/me/Downloads/file-0.dat".into(),
    })
    .unwrap();

    // empty file completes straight from pending
    db.ingest(&EngineEvent::FileDownloadComplete {
        transfer_id: t.clone(),
        path_id: "file-1".into(),
        final_path: "/home/me/Downloads/file-1.dat".into(),
    })
    .unwrap();

    let dump = db.transfer_dump(&t).unwrap();
    assert_eq!(dump.state.state, TransferState::Active);
    assert!(dump
        .paths
        .iter()
        .all(|p| p.state.state == PathState::Completed));
    assert_eq!(dump.paths[0].state.bytes, 10);
}

#[test]
fn second_terminal_report_is_rejected() {
    let db = Database::open_in_memory(StoreConfig::default()).unwrap();
    let t = TransferId::from("up-1");
    db.ingest(&offer("up-1", Direction::Outgoing, &[5])).unwrap();

    db.ingest(&EngineEvent::TransferCanceled {
        transfer_id: t.clone(),
        by_peer: false,
    })
    .unwrap();
    let err = db
        .ingest(&EngineEvent::TransferFailed {
            transfer_id: t.clone(),
            status_code: 27,
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::IllegalTransition { .. }));
    assert_eq!(db.transfer_state(&t).unwrap().state, TransferState::Cancelled);
}

#[test]
fn upload_complete_carries_no_final_path() {
    let db = Database::open_in_memory(StoreConfig::default()).unwrap();
    let t = TransferId::from("up-1");
    db.ingest(&offer("up-1", Direction::Outgoing, &[5])).unwrap();
    db.ingest(&EngineEvent::Progress {
        transfer_id: t.clone(),
        path_id: "file-0".into(),
        bytes: 5,
    })
    .unwrap();
    db.ingest(&EngineEvent::FileUploadComplete {
        transfer_id: t.clone(),
        path_id: "file-0".into(),
    })
    .unwrap();

    let snapshot = db.path_state(&t, "file-0").unwrap();
    assert_eq!(snapshot.state, PathState::Completed);
    assert!(snapshot.final_path.is_none());
}

#[test]
fn transfers_since_returns_recent_dumps() {
    let db = Database::open_in_memory(StoreConfig::default()).unwrap();
    db.ingest(&offer("a", Direction::Outgoing, &[1])).unwrap();
    let cutoff = db.get_transfer(&"a".into()).unwrap().created_at;
    db.ingest(&offer("b", Direction::Incoming, &[1, 2])).unwrap();

    let dumps = db.transfers_since(cutoff).unwrap();
    let ids: Vec<_> = dumps.iter().map(|d| d.transfer.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(dumps[1].paths.len(), 2);
}

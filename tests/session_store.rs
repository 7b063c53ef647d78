use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;
use vanguard_recon::core::models::{ResultTree, ResultValue};
use vanguard_recon::core::orchestrator::RunEvent;
use vanguard_recon::core::session::{SessionBuilder, SessionError, SessionListing, SessionStore};
use vanguard_recon::core::target::Target;

fn sample_results() -> BTreeMap<String, ResultTree> {
    let headers = ResultTree::new()
        .with("Status", 200u16)
        .with("Server", "nginx/1.25.3")
        .with("Cookies", vec!["sid", "csrftoken"])
        .with("Security Headers", ResultTree::new().with("x-frame-options", Option::<String>::None));
    let cert = ResultTree::new()
        .with("Valid", true)
        .with("Valid To", Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap())
        .with("Days Until Expiry", -3i64);
    BTreeMap::from([
        ("HTTP Headers".to_string(), headers),
        ("SSL/TLS Certificate".to_string(), cert),
        ("Reverse IP Lookup".to_string(), ResultTree::error("missing credential")),
    ])
}

fn open_store() -> (SessionStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path().join("sessions")).unwrap();
    (store, dir)
}

#[test]
fn save_then_load_round_trips() {
    let (store, _dir) = open_store();
    let target = Target::parse("example.com").unwrap();
    let timestamp = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
    let results = sample_results();

    let id = store.save(&target, timestamp, results.clone()).unwrap();
    let session = store.load(&id).unwrap();

    assert_eq!(session.id, id);
    assert_eq!(session.target, target.as_str());
    assert_eq!(session.timestamp, timestamp);
    assert_eq!(session.results, results);
}

#[test]
fn datetimes_are_stored_as_iso_strings() {
    let (store, _dir) = open_store();
    let target = Target::parse("example.com").unwrap();
    let id = store.save(&target, Utc::now(), sample_results()).unwrap();

    let raw = std::fs::read_to_string(store.dir().join(format!("session_{}.json", id))).unwrap();
    assert!(raw.contains("\"2030-01-02T03:04:05Z\""), "{}", raw);
}

#[test]
fn delete_then_load_is_not_found() {
    let (store, _dir) = open_store();
    let id = store
        .save(&Target::parse("example.com").unwrap(), Utc::now(), BTreeMap::new())
        .unwrap();

    store.delete(&id).unwrap();
    assert!(matches!(store.load(&id), Err(SessionError::NotFound(_))));
    assert!(matches!(store.delete(&id), Err(SessionError::NotFound(_))));
}

#[test]
fn list_is_most_recent_first() {
    let (store, _dir) = open_store();
    let first = store
        .save(&Target::parse("first.example").unwrap(), Utc::now(), BTreeMap::new())
        .unwrap();
    let second = store
        .save(&Target::parse("second.example").unwrap(), Utc::now(), BTreeMap::new())
        .unwrap();

    let listed = store.list().unwrap();
    let ids: Vec<&str> = listed.iter().map(SessionListing::id).collect();
    assert_eq!(ids, vec![second.as_str(), first.as_str()]);

    let SessionListing::Valid(summary) = &listed[0] else {
        panic!("expected a valid listing");
    };
    assert_eq!(summary.target, "https://second.example/");
}

#[test]
fn corrupt_file_is_listed_and_distinguishable_from_missing() {
    let (store, _dir) = open_store();
    let good = store
        .save(&Target::parse("example.com").unwrap(), Utc::now(), BTreeMap::new())
        .unwrap();
    std::fs::write(store.dir().join("session_19990101_000000_000000.json"), "{ truncated").unwrap();
    std::fs::write(store.dir().join("notes.txt"), "ignored").unwrap();

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id(), good);
    assert!(matches!(&listed[1], SessionListing::Corrupt { id, .. } if id == "19990101_000000_000000"));

    assert!(matches!(
        store.load("19990101_000000_000000"),
        Err(SessionError::Corrupt { .. })
    ));
    store.delete("19990101_000000_000000").unwrap();
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn no_temporary_files_are_left_behind() {
    let (store, _dir) = open_store();
    for _ in 0..5 {
        store
            .save(&Target::parse("example.com").unwrap(), Utc::now(), sample_results())
            .unwrap();
    }
    let names: Vec<String> = std::fs::read_dir(store.dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 5);
    assert!(names.iter().all(|n| n.starts_with("session_") && n.ends_with(".json")));
}

#[test]
fn path_like_ids_are_rejected() {
    let (store, _dir) = open_store();
    assert!(matches!(store.load("../config"), Err(SessionError::InvalidId(_))));
    assert!(matches!(store.delete("a/b"), Err(SessionError::InvalidId(_))));
}

#[test]
fn export_writes_a_loadable_copy() {
    let (store, dir) = open_store();
    let id = store
        .save(&Target::parse("example.com").unwrap(), Utc::now(), sample_results())
        .unwrap();
    let dest = dir.path().join("export.json");

    store.export(&id, &dest).unwrap();
    let exported: serde_json::Value = serde_json::from_slice(&std::fs::read(&dest).unwrap()).unwrap();
    assert_eq!(exported["id"], id.as_str());
    assert_eq!(exported["results"]["HTTP Headers"]["Server"], "nginx/1.25.3");
}

#[test]
fn builder_saves_a_cancelled_run() {
    let (store, _dir) = open_store();
    let mut builder = SessionBuilder::new(Target::parse("example.com").unwrap(), Utc::now());
    let events = [
        RunEvent::Started { module: "DNS Records" },
        RunEvent::Succeeded { module: "DNS Records", result: ResultTree::new().with("A", vec!["93.184.216.34"]) },
        RunEvent::Started { module: "Open Ports" },
        RunEvent::Failed { module: "Open Ports", error: "could not resolve".into() },
        RunEvent::Cancelled,
    ];
    for event in &events {
        builder.observe(event);
    }
    assert!(builder.was_cancelled());

    let id = builder.save(&store).unwrap();
    let session = store.load(&id).unwrap();
    assert_eq!(session.results.len(), 2);
    assert_eq!(
        session.results["Open Ports"].get("Error"),
        Some(&ResultValue::from("could not resolve"))
    );
}

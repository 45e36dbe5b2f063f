use std::collections::HashSet;
use std::sync::Arc;

use lan_pulse_rs::history::HistoryStore;
use lan_pulse_rs::store::{JsonRecordStore, RecordRepository};
use lan_pulse_rs::types::ProbeOutcome;
use time::macros::datetime;
use time::Duration;
use tokio::sync::oneshot;

#[tokio::test]
async fn sequential_appends_are_newest_first_and_capped() {
    let records = Arc::new(JsonRecordStore::in_memory());
    records.upsert_many(&["10.0.0.1".into()], None).await.unwrap();
    let history = HistoryStore::new(records.clone(), 50);
    let start = datetime!(2024-05-01 12:00 UTC);

    for i in 0..60u64 {
        let outcome = ProbeOutcome::online("10.0.0.1", i);
        let appended = history
            .append(&outcome, start + Duration::seconds(i as i64))
            .await
            .unwrap();
        assert!(appended);
    }

    let entries = history.entries("10.0.0.1").await.unwrap();
    assert_eq!(entries.len(), 50);
    let latencies: Vec<u64> = entries.iter().filter_map(|e| e.latency_ms).collect();
    let expected: Vec<u64> = (10..60).rev().collect();
    assert_eq!(latencies, expected);

    // History alone never touches the last status
    let record = records.get("10.0.0.1").await.unwrap().unwrap();
    assert!(record.is_pending());
}

#[tokio::test]
async fn concurrent_appends_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let records = Arc::new(
        JsonRecordStore::open(dir.path().join("ip-list.json"))
            .await
            .unwrap(),
    );
    records.upsert_many(&["10.0.0.1".into()], None).await.unwrap();
    let history = HistoryStore::new(records.clone(), 50);
    let at = datetime!(2024-05-01 12:00 UTC);

    let mut tasks = Vec::new();
    for i in 0..40u64 {
        let history = history.clone();
        tasks.push(tokio::spawn(async move {
            history
                .append(&ProbeOutcome::online("10.0.0.1", i), at)
                .await
                .unwrap()
        }));
    }
    for t in tasks {
        assert!(t.await.unwrap());
    }

    let entries = history.entries("10.0.0.1").await.unwrap();
    assert_eq!(entries.len(), 40);
    let unique: HashSet<u64> = entries.iter().filter_map(|e| e.latency_ms).collect();
    assert_eq!(unique.len(), 40);

    // And the file on disk agrees with memory
    let reopened = JsonRecordStore::open(dir.path().join("ip-list.json"))
        .await
        .unwrap();
    assert_eq!(reopened.get("10.0.0.1").await.unwrap().unwrap().history, entries);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_keep_call_order() {
    let records = Arc::new(JsonRecordStore::in_memory());
    records
        .upsert_many(&["10.0.0.1".into(), "10.0.0.2".into()], None)
        .await
        .unwrap();
    let history = HistoryStore::new(records.clone(), 50);
    let start = datetime!(2024-05-01 12:00 UTC);

    // Writer tasks wait on their own gate and are released one after another.
    let mut gates = Vec::new();
    let mut tasks = Vec::new();
    for i in 0..30u64 {
        let (open_tx, open_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let history = history.clone();
        tasks.push(tokio::spawn(async move {
            open_rx.await.unwrap();
            let appended = history
                .append(
                    &ProbeOutcome::online("10.0.0.1", i),
                    start + Duration::seconds(i as i64),
                )
                .await
                .unwrap();
            done_tx.send(()).unwrap();
            appended
        }));
        gates.push((open_tx, done_rx));
    }

    // Unrelated writers contend for the same store meanwhile.
    let mut noise = Vec::new();
    for i in 0..30u64 {
        let history = history.clone();
        noise.push(tokio::spawn(async move {
            history
                .record(&ProbeOutcome::online("10.0.0.2", i), start)
                .await
                .unwrap()
        }));
    }

    for (open_tx, done_rx) in gates {
        open_tx.send(()).unwrap();
        done_rx.await.unwrap();
    }
    for t in tasks.into_iter().chain(noise) {
        assert!(t.await.unwrap());
    }

    let entries = history.entries("10.0.0.1").await.unwrap();
    let latencies: Vec<u64> = entries.iter().filter_map(|e| e.latency_ms).collect();
    let expected: Vec<u64> = (0..30).rev().collect();
    assert_eq!(latencies, expected);
    assert!(entries.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
    assert_eq!(history.entries("10.0.0.2").await.unwrap().len(), 30);
}

#[tokio::test]
async fn unknown_address_is_not_created() {
    let records = Arc::new(JsonRecordStore::in_memory());
    let history = HistoryStore::new(records.clone(), 50);
    let appended = history
        .append(
            &ProbeOutcome::offline("10.0.0.9"),
            datetime!(2024-05-01 12:00 UTC),
        )
        .await
        .unwrap();
    assert!(!appended);
    assert!(records.list_all().await.unwrap().is_empty());
}

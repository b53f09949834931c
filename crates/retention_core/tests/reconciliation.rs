mod common;

use common::{draft_saved_days_ago, FlakyStore, GatedStore, NOW};
use retention_core::store::RecordCollection;
use retention_core::{
    quarantine_key, DraftService, ExpirationStatus, InitializeOutcome, Loaded, MemoryRecordStore,
    NewDraft,
    RecordStore, ReconciliationLog, ReconciliationScheduler, RetentionPolicy, SavedRecord,
    SchedulerState, SqliteRecordStore, TypedRecordStore, CHECK_INTERVAL_DAYS, DAY_MS,
    RECONCILIATION_LOG_KEY, SAVED_RECORDS_KEY,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn seeded_store(records: Vec<SavedRecord>) -> Arc<SqliteRecordStore> {
    let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());
    store
        .put_records(SAVED_RECORDS_KEY, &RecordCollection::from_records(records))
        .unwrap();
    store
}

fn saved_records<S: RecordStore>(store: &S) -> Vec<SavedRecord> {
    match store.load_records::<SavedRecord>(SAVED_RECORDS_KEY).unwrap() {
        Loaded::Found(collection) => collection.into_records(),
        other => panic!("expected saved records, got {other:?}"),
    }
}

fn stored_log<S: RecordStore>(store: &S) -> ReconciliationLog {
    match store.load_log().unwrap() {
        Loaded::Found(log) => log,
        other => panic!("expected reconciliation log, got {other:?}"),
    }
}

#[test]
fn urgent_draft_is_renewed_to_ten_days_remaining() {
    let store = seeded_store(vec![draft_saved_days_ago("urgent", 26)]);
    let policy = RetentionPolicy::default();
    let before = saved_records(store.as_ref());
    assert_eq!(policy.days_until_expiration(&before[0], NOW), 4);
    assert_eq!(policy.status(&before[0], NOW), ExpirationStatus::Urgent);

    let scheduler = ReconciliationScheduler::new(Arc::clone(&store));
    let report = scheduler.reconcile(NOW).unwrap();

    let after = saved_records(store.as_ref());
    assert_eq!(after[0].saved_at, NOW - 20 * DAY_MS);
    assert_eq!(policy.days_until_expiration(&after[0], NOW), 10);
    assert_eq!(report.log.records_updated_last_run, 1);
    assert!(report.collection_written);
}

#[test]
fn safe_and_boundary_drafts_are_left_unchanged() {
    let safe = draft_saved_days_ago("safe", 12);
    let boundary = draft_saved_days_ago("boundary", 25);
    let store = seeded_store(vec![safe.clone(), boundary.clone()]);
    let policy = RetentionPolicy::default();
    assert_eq!(policy.status(&safe, NOW), ExpirationStatus::Safe);
    assert_eq!(policy.status(&boundary, NOW), ExpirationStatus::Warning);

    let scheduler = ReconciliationScheduler::new(Arc::clone(&store));
    let report = scheduler.reconcile(NOW).unwrap();

    assert_eq!(saved_records(store.as_ref()), vec![safe, boundary]);
    assert_eq!(report.log.records_updated_last_run, 0);
    assert!(!report.collection_written);
    assert_eq!(store.write_count(SAVED_RECORDS_KEY).unwrap(), 1);
}

#[test]
fn mixed_collection_only_touches_drafts_needing_renewal() {
    let keep = draft_saved_days_ago("keep", 3);
    let store = seeded_store(vec![
        keep.clone(),
        draft_saved_days_ago("stale", 29),
        draft_saved_days_ago("expired", 40),
    ]);

    let scheduler = ReconciliationScheduler::new(Arc::clone(&store));
    let report = scheduler.reconcile(NOW).unwrap();

    let after = saved_records(store.as_ref());
    assert_eq!(after[0], keep);
    assert_eq!(after[1].saved_at, NOW - 20 * DAY_MS);
    assert_eq!(after[2].saved_at, NOW - 20 * DAY_MS);
    assert_eq!(after[1].progress_label, "section 3 of 7");
    assert_eq!(report.log.records_updated_last_run, 2);
    assert_eq!(report.log.total_records_last_run, 3);
}

#[test]
fn second_pass_at_same_time_renews_nothing() {
    let store = seeded_store(vec![
        draft_saved_days_ago("a", 27),
        draft_saved_days_ago("b", 31),
    ]);
    let scheduler = ReconciliationScheduler::new(Arc::clone(&store));

    let first = scheduler.reconcile(NOW).unwrap();
    let second = scheduler.reconcile(NOW).unwrap();

    assert_eq!(first.log.records_updated_last_run, 2);
    assert_eq!(second.log.records_updated_last_run, 0);
    assert!(!second.collection_written);
}

#[test]
fn log_records_interval_and_collection_size() {
    let store = seeded_store(vec![
        draft_saved_days_ago("a", 1),
        draft_saved_days_ago("b", 28),
    ]);
    let scheduler = ReconciliationScheduler::new(Arc::clone(&store));

    scheduler.reconcile(NOW).unwrap();

    let log = stored_log(store.as_ref());
    assert_eq!(log.last_check_at, NOW);
    assert_eq!(log.next_check_at, log.last_check_at + CHECK_INTERVAL_DAYS * DAY_MS);
    assert_eq!(log.total_records_last_run, 2);
    assert_eq!(log.records_updated_last_run, 1);
}

#[test]
fn empty_collection_skips_write_but_updates_log() {
    let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());
    let scheduler = ReconciliationScheduler::new(Arc::clone(&store));

    let report = scheduler.reconcile(NOW).unwrap();

    assert!(!report.collection_written);
    assert_eq!(store.get_raw(SAVED_RECORDS_KEY).unwrap(), None);
    assert_eq!(store.write_count(SAVED_RECORDS_KEY).unwrap(), 0);
    let log = stored_log(store.as_ref());
    assert_eq!(log.last_check_at, NOW);
    assert_eq!(log.next_check_at, NOW + 5 * DAY_MS);
    assert_eq!(log.total_records_last_run, 0);
}

#[test]
fn failed_collection_write_leaves_log_untouched_and_initialize_retries() {
    let store = Arc::new(FlakyStore::new());
    store
        .put_records(
            SAVED_RECORDS_KEY,
            &RecordCollection::from_records(vec![draft_saved_days_ago("a", 27)]),
        )
        .unwrap();
    let stale_log = ReconciliationLog::after_pass(NOW - 6 * DAY_MS, 5 * DAY_MS, 0, 1);
    store.put_log(&stale_log).unwrap();
    let scheduler = ReconciliationScheduler::new(Arc::clone(&store));

    store.set_fail_writes(true);
    let outcome = scheduler.initialize(NOW);
    assert!(matches!(outcome, InitializeOutcome::Failed(_)));
    assert!(scheduler.reconcile(NOW).is_err());
    assert_eq!(stored_log(store.as_ref()), stale_log);
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    store.set_fail_writes(false);
    let retry = scheduler.initialize(NOW + 60_000);
    let InitializeOutcome::Reconciled(report) = retry else {
        panic!("expected a retried pass, got {retry:?}");
    };
    assert_eq!(report.log.records_updated_last_run, 1);
    assert_eq!(stored_log(store.as_ref()).last_check_at, NOW + 60_000);
}

#[test]
fn unreadable_store_aborts_pass_without_log() {
    let store = Arc::new(FlakyStore::new());
    store.set_fail_reads(true);
    let scheduler = ReconciliationScheduler::new(Arc::clone(&store));

    assert!(matches!(
        scheduler.initialize(NOW),
        InitializeOutcome::Failed(_)
    ));

    store.set_fail_reads(false);
    assert_eq!(store.load_log().unwrap(), Loaded::NotFound);
}

#[test]
fn initialize_runs_when_no_log_and_skips_until_due() {
    let store = seeded_store(vec![draft_saved_days_ago("a", 26)]);
    let scheduler = ReconciliationScheduler::new(Arc::clone(&store));

    assert!(matches!(
        scheduler.initialize(NOW),
        InitializeOutcome::Reconciled(_)
    ));
    assert_eq!(
        scheduler.initialize(NOW + DAY_MS),
        InitializeOutcome::NotDue {
            next_check_at: NOW + 5 * DAY_MS
        }
    );
    assert!(matches!(
        scheduler.initialize(NOW + 5 * DAY_MS),
        InitializeOutcome::Reconciled(_)
    ));
}

#[test]
fn corrupt_log_counts_as_due() {
    let store = seeded_store(vec![]);
    store.put_raw(RECONCILIATION_LOG_KEY, "not json").unwrap();
    let scheduler = ReconciliationScheduler::new(Arc::clone(&store));

    assert!(matches!(
        scheduler.initialize(NOW),
        InitializeOutcome::Reconciled(_)
    ));
    assert_eq!(stored_log(store.as_ref()).last_check_at, NOW);
}

#[test]
fn unreadable_saved_collection_is_quarantined_and_the_pass_completes() {
    let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());
    store
        .put_raw(SAVED_RECORDS_KEY, "{\"drafts\":{}}")
        .unwrap();
    let scheduler = ReconciliationScheduler::new(Arc::clone(&store));

    assert!(matches!(
        scheduler.initialize(NOW),
        InitializeOutcome::Reconciled(_)
    ));
    assert_eq!(
        store.get_raw(SAVED_RECORDS_KEY).unwrap().as_deref(),
        Some("[]")
    );
    let kept: Vec<String> = serde_json::from_str(
        &store
            .get_raw(&quarantine_key(SAVED_RECORDS_KEY))
            .unwrap()
            .unwrap(),
    )
    .unwrap();
    assert_eq!(kept, vec!["{\"drafts\":{}}".to_string()]);
    assert_eq!(stored_log(store.as_ref()).total_records_last_run, 0);

    // The next startup finds a fresh log instead of failing again.
    assert!(matches!(
        scheduler.initialize(NOW + DAY_MS),
        InitializeOutcome::NotDue { .. }
    ));
}

#[test]
fn force_reconcile_ignores_due_time() {
    let store = seeded_store(vec![draft_saved_days_ago("a", 1)]);
    let scheduler = ReconciliationScheduler::new(Arc::clone(&store));
    scheduler.reconcile(NOW).unwrap();

    // Two days later nothing is due, and a forced pass still runs.
    let later = NOW + 2 * DAY_MS;
    let report = scheduler.force_reconcile(later).unwrap();

    assert_eq!(report.log.last_check_at, later);
    assert_eq!(report.log.next_check_at, later + 5 * DAY_MS);
    assert_eq!(stored_log(store.as_ref()), report.log);
}

#[test]
fn malformed_entries_survive_a_renewing_pass() {
    let store = Arc::new(MemoryRecordStore::new());
    let broken = json!({"id": "broken", "savedAt": "last tuesday"});
    let payload = json!([
        {
            "id": "stale",
            "subjectName": "Subject stale",
            "subjectId": "MRN-stale",
            "savedAt": NOW - 28 * DAY_MS,
            "progressLabel": "intake",
            "payerCode": "BCBS-22"
        },
        broken.clone(),
    ]);
    store
        .put_raw(SAVED_RECORDS_KEY, &payload.to_string())
        .unwrap();
    let scheduler = ReconciliationScheduler::new(Arc::clone(&store));

    let report = scheduler.reconcile(NOW).unwrap();

    assert_eq!(report.malformed_records, 1);
    assert_eq!(report.log.total_records_last_run, 1);
    let stored: Value =
        serde_json::from_str(&store.get_raw(SAVED_RECORDS_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(stored[0]["savedAt"], NOW - 20 * DAY_MS);
    assert_eq!(stored[0]["payerCode"], "BCBS-22");
    assert_eq!(stored[1], broken);
}

#[test]
fn status_reports_log_and_live_breakdown() {
    let store = seeded_store(vec![
        draft_saved_days_ago("urgent", 27),
        draft_saved_days_ago("warning", 22),
        draft_saved_days_ago("safe", 2),
    ]);
    let scheduler = ReconciliationScheduler::new(Arc::clone(&store));

    let before = scheduler.reconciliation_status(NOW);
    assert_eq!(before.log, None);
    assert!(before.due);
    assert_eq!(
        (before.urgent_count, before.warning_count, before.safe_count),
        (1, 1, 1)
    );

    scheduler.reconcile(NOW).unwrap();
    let after = scheduler.reconciliation_status(NOW);
    assert!(!after.due);
    assert_eq!(after.state, SchedulerState::Idle);
    assert_eq!(after.saved_count, 3);
    // The renewed draft now sits at 10 days remaining, which is safe.
    assert_eq!(
        (after.urgent_count, after.warning_count, after.safe_count),
        (0, 1, 2)
    );
    assert_eq!(after.log.map(|log| log.records_updated_last_run), Some(1));
}

#[test]
fn concurrent_draft_saves_and_passes_lose_nothing() {
    let store = seeded_store(vec![draft_saved_days_ago("stale", 29)]);
    let scheduler = Arc::new(ReconciliationScheduler::new(Arc::clone(&store)));
    let drafts = Arc::new(DraftService::new(Arc::clone(&store)));

    let writers: Vec<_> = (0..4)
        .map(|worker| {
            let drafts = Arc::clone(&drafts);
            std::thread::spawn(move || {
                for n in 0..10 {
                    drafts
                        .save_draft(
                            NewDraft {
                                subject_name: format!("worker {worker}"),
                                subject_id: format!("W{worker}-{n}"),
                                progress_label: "intake".to_string(),
                            },
                            NOW,
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    let reconciler = {
        let scheduler = Arc::clone(&scheduler);
        std::thread::spawn(move || {
            for _ in 0..10 {
                scheduler.force_reconcile(NOW).unwrap();
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    reconciler.join().unwrap();

    let records = saved_records(store.as_ref());
    assert_eq!(records.len(), 41);
    assert_eq!(records[0].saved_at, NOW - 20 * DAY_MS);
}

#[test]
fn pass_in_flight_reports_running_and_holds_off_a_forced_pass() {
    let (gated, entered, release) = GatedStore::new();
    let store = Arc::new(gated);
    let scheduler = Arc::new(ReconciliationScheduler::new(Arc::clone(&store)));

    let first = {
        let scheduler = Arc::clone(&scheduler);
        thread::spawn(move || scheduler.reconcile(NOW).unwrap())
    };
    entered.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Running);
    assert_eq!(
        scheduler.reconciliation_status(NOW).state,
        SchedulerState::Running
    );

    let later = NOW + DAY_MS;
    let forced = {
        let scheduler = Arc::clone(&scheduler);
        thread::spawn(move || scheduler.force_reconcile(later).unwrap())
    };
    thread::sleep(Duration::from_millis(100));
    assert!(!forced.is_finished());

    release.send(()).unwrap();
    assert_eq!(first.join().unwrap().log.last_check_at, NOW);
    let forced_report = forced.join().unwrap();
    assert_eq!(forced_report.log.last_check_at, later);
    assert_eq!(stored_log(store.as_ref()), forced_report.log);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

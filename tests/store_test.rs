use chrono::{DateTime, Duration, TimeZone, Utc};

use crosscheck_worker::engine::ledger::ArtifactLedger;
use crosscheck_worker::engine::quota::QuotaEnforcer;
use crosscheck_worker::fsutil;
use crosscheck_worker::source::traits::WorkId;

mod common;

const WORK_SIZE: usize = 4096;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
}

/// Unpack a single fixed-size file for `work_id` and index it at `ts`.
fn add_work(ledger: &ArtifactLedger, work_id: WorkId, ts: DateTime<Utc>) {
    let root = ledger.prepare_extraction(work_id).unwrap();
    std::fs::write(root.join("Main.cs"), vec![b'x'; WORK_SIZE]).unwrap();
    ledger.register(work_id, ts).unwrap();
}

fn store_size(ledger: &ArtifactLedger) -> u64 {
    fsutil::dir_size(ledger.layout().root()).unwrap()
}

#[test]
fn test_check_ends_under_limit_or_empty() {
    for limit in [0u64, 8 * 1024, 20_000, 40_000, 1 << 30] {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = common::open_ledger(dir.path());
        for id in 0..15 {
            add_work(&ledger, id, at(id as i64));
        }

        QuotaEnforcer::new(limit).check(&mut ledger).unwrap();

        assert!(
            store_size(&ledger) <= limit || ledger.is_empty().unwrap(),
            "limit {} left {} bytes in {} works",
            limit,
            store_size(&ledger),
            ledger.len().unwrap()
        );
    }
}

#[test]
fn test_check_evicts_least_recently_used_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut ledger = common::open_ledger(dir.path());
    for id in 0..12 {
        add_work(&ledger, id, at(id as i64));
    }
    ledger.touch(&[0], at(100)).unwrap();

    // One eviction round of ten works is enough.
    let limit = store_size(&ledger) - 10 * WORK_SIZE as u64;
    let report = QuotaEnforcer::new(limit).check(&mut ledger).unwrap();

    assert_eq!(report.evicted, (1..=10).collect::<Vec<WorkId>>());
    assert_eq!(report.reclaimed_bytes, 10 * WORK_SIZE as u64);
    assert!(ledger.get(0).unwrap().is_some());
    assert!(ledger.get(11).unwrap().is_some());
    for id in 1..=10 {
        assert!(ledger.get(id).unwrap().is_none());
        assert!(!ledger.layout().work_dir(id).exists());
    }
}

#[test]
fn test_second_check_evicts_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut ledger = common::open_ledger(dir.path());
    for id in 0..15 {
        add_work(&ledger, id, at(id as i64));
    }
    let quota = QuotaEnforcer::new(store_size(&ledger) / 2);

    let first = quota.check(&mut ledger).unwrap();
    assert!(!first.evicted.is_empty());

    let second = quota.check(&mut ledger).unwrap();
    assert!(second.evicted.is_empty());
    assert_eq!(second.reclaimed_bytes, 0);
}

#[test]
fn test_check_on_empty_store_succeeds_over_limit() {
    let dir = tempfile::tempdir().unwrap();
    let mut ledger = common::open_ledger(dir.path());

    let report = QuotaEnforcer::new(0).check(&mut ledger).unwrap();
    assert!(report.evicted.is_empty());
    assert!(ledger.is_empty().unwrap());
}

#[test]
fn test_eviction_with_missing_directory_still_drops_record() {
    let dir = tempfile::tempdir().unwrap();
    let mut ledger = common::open_ledger(dir.path());
    add_work(&ledger, 1, at(0));
    add_work(&ledger, 2, at(1));
    std::fs::remove_dir_all(ledger.layout().work_dir(1)).unwrap();

    let report = QuotaEnforcer::new(0).check(&mut ledger).unwrap();
    assert_eq!(report.evicted, vec![1, 2]);
    assert!(ledger.is_empty().unwrap());
}

#[test]
fn test_oldest_is_ordered_by_access_time_then_insertion() {
    let dir = tempfile::tempdir().unwrap();
    let mut ledger = common::open_ledger(dir.path());
    let times = [5, 1, 9, 1, 3, 7];
    for (id, secs) in times.iter().enumerate() {
        add_work(&ledger, id as WorkId, at(*secs));
    }
    ledger.touch(&[1], at(50)).unwrap();

    let oldest = ledger.oldest(10).unwrap();
    let ids: Vec<WorkId> = oldest.iter().map(|e| e.work_id).collect();
    assert_eq!(ids, vec![3, 4, 0, 5, 2, 1]);
    assert!(oldest
        .windows(2)
        .all(|w| w[0].last_access <= w[1].last_access));

    let first_two: Vec<WorkId> = ledger.oldest(2).unwrap().iter().map(|e| e.work_id).collect();
    assert_eq!(first_two, vec![3, 4]);
}

#[test]
fn test_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ledger = common::open_ledger(dir.path());
        add_work(&ledger, 42, at(0));
    }

    let mut ledger = common::open_ledger(dir.path());
    let entry = ledger.lookup(42).unwrap().unwrap();
    assert_eq!(entry.path, ledger.layout().work_dir(42));
    assert_eq!(entry.last_access, at(0));
    assert!(ledger.sweep_orphans().unwrap().is_empty());
}

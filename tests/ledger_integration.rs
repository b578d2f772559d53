// Audit ledger integration tests
// File-backed ledgers, concurrent appends, reopen, and fail-closed decisions.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};
use vantage_risk::{
    AuditLedger, ConstantScorer, Decision, DecisionEngine, DecisionEntry, LendingService,
    LoanApplication,
};

fn entry(worker: usize, seq: usize) -> DecisionEntry {
    let approve = seq % 3 != 0;
    DecisionEntry {
        timestamp: Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, (seq % 60) as u32).unwrap(),
        income: 40_000.0 + worker as f64,
        fico: 600.0 + seq as f64,
        dti: 18.5,
        loan_amount: 5_000.0 + seq as f64 * 10.0,
        risk_aversion: 1.25,
        expected_utility: if approve { 120.5 } else { -80.25 },
        decision: if approve { Decision::Approve } else { Decision::Reject },
    }
}

#[test]
fn test_concurrent_appends_get_unique_increasing_ids() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(AuditLedger::open(&dir.path().join("ledger.db")).unwrap());

    const WORKERS: usize = 8;
    const PER_WORKER: usize = 25;

    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                let mut ids = Vec::with_capacity(PER_WORKER);
                for seq in 0..PER_WORKER {
                    ids.push(ledger.append(&entry(worker, seq)).unwrap());
                }
                ids
            })
        })
        .collect();

    let mut all_ids = HashSet::new();
    for handle in handles {
        let ids = handle.join().unwrap();
        // each worker observes its own appends in increasing order
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        for id in ids {
            assert!(all_ids.insert(id), "duplicate id {id}");
        }
    }

    assert_eq!(all_ids.len(), WORKERS * PER_WORKER);
    assert_eq!(ledger.count().unwrap(), (WORKERS * PER_WORKER) as u64);

    let scanned = ledger.scan_descending(None).unwrap();
    assert_eq!(scanned.len(), WORKERS * PER_WORKER);
    assert!(scanned.windows(2).all(|w| w[0].id > w[1].id));

    assert!(ledger.verify_chain().unwrap().is_intact());
}

#[test]
fn test_reads_run_alongside_appends() {
    let ledger = Arc::new(AuditLedger::open_in_memory().unwrap());

    let writer = {
        let ledger = Arc::clone(&ledger);
        thread::spawn(move || {
            for seq in 0..100 {
                ledger.append(&entry(0, seq)).unwrap();
            }
        })
    };

    // every snapshot is internally consistent: summary total matches a full scan
    for _ in 0..20 {
        let (summary, page) = ledger.snapshot(1_000).unwrap();
        assert_eq!(summary.total as usize, page.len());
    }

    writer.join().unwrap();
    assert_eq!(ledger.count().unwrap(), 100);
}

#[test]
fn test_file_readers_run_alongside_appends() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(AuditLedger::open_with_readers(&dir.path().join("ledger.db"), 3).unwrap());

    let writer = {
        let ledger = Arc::clone(&ledger);
        thread::spawn(move || {
            for seq in 0..60 {
                ledger.append(&entry(0, seq)).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                let mut last_total = 0;
                for _ in 0..25 {
                    let (summary, page) = ledger.snapshot(1_000).unwrap();
                    assert_eq!(summary.total as usize, page.len());
                    // committed appends never disappear from later reads
                    assert!(summary.total >= last_total);
                    last_total = summary.total;
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(ledger.count().unwrap(), 60);
    assert!(ledger.verify_chain().unwrap().is_intact());
}

#[test]
fn test_records_survive_reopen_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("ledger.db");

    let entries: Vec<DecisionEntry> = (0..6).map(|seq| entry(1, seq)).collect();
    {
        let ledger = AuditLedger::open(&path).unwrap();
        for e in &entries {
            ledger.append(e).unwrap();
        }
    }

    let reopened = AuditLedger::open(&path).unwrap();
    let scanned = reopened.scan_descending(None).unwrap();
    let restored: Vec<DecisionEntry> = scanned.iter().rev().map(|r| r.entry()).collect();
    assert_eq!(restored, entries);

    // ids keep climbing after reopen
    let next = reopened.append(&entry(2, 0)).unwrap();
    assert!(next > scanned[0].id);
    assert!(reopened.verify_chain().unwrap().is_intact());
}

#[test]
fn test_ledger_failure_discards_decision() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let ledger = Arc::new(AuditLedger::open(&path).unwrap());

    let engine = DecisionEngine::new(Arc::new(ConstantScorer::new(0.05)));
    let service = LendingService::new(engine, Arc::clone(&ledger));
    let application = LoanApplication::new(60_000.0, 720.0, 20.0, 10_000.0, 1.0).unwrap();

    assert!(service.analyze(&application).is_ok());

    // break the backing store underneath the service
    let saboteur = rusqlite::Connection::open(&path).unwrap();
    saboteur.execute_batch("DROP TABLE audit_logs;").unwrap();

    let err = service.analyze(&application).unwrap_err();
    assert_eq!(err.code(), "VR-3001");
}

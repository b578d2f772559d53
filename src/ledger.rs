use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, SubsecRound, Timelike, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::decision::{Assessment, Decision, LoanApplication};
use crate::error::{LendingError, Result};

/// Timestamp layout stored in the ledger. Plain text so that date fragments
/// ("2026-10", "14:05") are searchable as substrings.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Digest the first record chains from.
const GENESIS_DIGEST: &str = "0000000000000000000000000000000000000000000000000000000000000000";

// ============================================================================
// RECORDS
// ============================================================================

/// A decision about to be written. The ledger assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionEntry {
    pub timestamp: DateTime<Utc>,
    pub income: f64,
    pub fico: f64,
    pub dti: f64,
    pub loan_amount: f64,
    pub risk_aversion: f64,
    pub expected_utility: f64,
    pub decision: Decision,
}

impl DecisionEntry {
    /// Entry stamped with the current time, truncated to the second the
    /// ledger stores.
    pub fn from_assessment(application: &LoanApplication, assessment: &Assessment) -> Self {
        Self::at(Utc::now(), application, assessment)
    }

    pub fn at(timestamp: DateTime<Utc>, application: &LoanApplication, assessment: &Assessment) -> Self {
        DecisionEntry {
            timestamp: timestamp.trunc_subsecs(0),
            income: application.income(),
            fico: application.fico(),
            dti: application.debt_to_income(),
            loan_amount: application.loan_amount(),
            risk_aversion: application.risk_aversion(),
            expected_utility: assessment.expected_utility,
            decision: assessment.decision,
        }
    }
}

/// An audited decision as persisted. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: i64,
    #[serde(with = "ledger_time")]
    pub timestamp: DateTime<Utc>,
    pub income: f64,
    pub fico: f64,
    pub dti: f64,
    #[serde(rename = "loan_amnt")]
    pub loan_amount: f64,
    #[serde(rename = "risk_lambda")]
    pub risk_aversion: f64,
    #[serde(rename = "utility")]
    pub expected_utility: f64,
    pub decision: Decision,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub digest: String,
}

impl DecisionRecord {
    pub fn entry(&self) -> DecisionEntry {
        DecisionEntry {
            timestamp: self.timestamp,
            income: self.income,
            fico: self.fico,
            dti: self.dti,
            loan_amount: self.loan_amount,
            risk_aversion: self.risk_aversion,
            expected_utility: self.expected_utility,
            decision: self.decision,
        }
    }
}

/// Aggregate view over every record in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AuditSummary {
    pub total: u64,
    pub approved: u64,
    /// Percent of records approved; 0 for an empty ledger.
    pub approval_rate: f64,
    /// Mean expected utility; 0 for an empty ledger.
    pub average_utility: f64,
}

/// Result of re-deriving the digest chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainReport {
    pub records_checked: u64,
    pub first_broken_id: Option<i64>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.first_broken_id.is_none()
    }
}

// ============================================================================
// AUDIT LEDGER
// ============================================================================

/// Append-only store of every decision.
///
/// Appends go through one writer connection behind a mutex (single writer),
/// each in its own SQL transaction, so a reader sees a record completely or
/// not at all. Ids come from AUTOINCREMENT and are never reused.
///
/// File-backed ledgers read through a small pool of read-only connections,
/// so scans and searches never queue behind an append. In-memory ledgers
/// have a single connection and read through the writer.
pub struct AuditLedger {
    writer: Mutex<Connection>,
    readers: Option<ReadPool>,
}

impl AuditLedger {
    /// Open (or create) a file-backed ledger in WAL mode.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_readers(path, DEFAULT_READERS)
    }

    /// Same as `open` with an explicit read pool size (clamped to 1..=8).
    pub fn open_with_readers(path: &Path, readers: usize) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LendingError::io(parent, e))?;
        }

        let conn = Connection::open(path)?;
        // Enable WAL mode for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        setup_ledger(&conn)?;

        // schema exists before any read-only connection opens
        let readers = ReadPool::open(path, readers)?;

        Ok(AuditLedger {
            writer: Mutex::new(conn),
            readers: Some(readers),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_ledger(&conn)?;
        Ok(AuditLedger {
            writer: Mutex::new(conn),
            readers: None,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| LendingError::persistence("lock", "ledger connection poisoned"))
    }

    fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        match &self.readers {
            Some(pool) => pool.with_conn(f),
            None => f(&*self.lock()?),
        }
    }

    /// Persist one decision and return its id.
    ///
    /// The stored timestamp has whole-second precision, so an entry whose
    /// timestamp carries sub-seconds is refused rather than silently
    /// truncated. Build entries with `DecisionEntry::at` or
    /// `from_assessment`.
    pub fn append(&self, entry: &DecisionEntry) -> Result<i64> {
        if entry.timestamp.nanosecond() != 0 {
            return Err(LendingError::persistence(
                "append",
                format!(
                    "timestamp {} has sub-second precision; the ledger stores whole seconds",
                    entry.timestamp
                ),
            ));
        }

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| LendingError::persistence("append", e))?;

        let previous: Option<String> = tx
            .query_row(
                "SELECT digest FROM audit_logs ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| LendingError::persistence("append", e))?;

        let timestamp = entry.timestamp.format(TIMESTAMP_FORMAT).to_string();
        let digest = chain_digest(previous.as_deref().unwrap_or(GENESIS_DIGEST), &timestamp, entry);

        tx.execute(
            "INSERT INTO audit_logs (
                timestamp, income, fico, dti, loan_amnt, risk_lambda, utility, decision, digest
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                timestamp,
                entry.income,
                entry.fico,
                entry.dti,
                entry.loan_amount,
                entry.risk_aversion,
                entry.expected_utility,
                entry.decision.as_str(),
                digest,
            ],
        )
        .map_err(|e| LendingError::persistence("append", e))?;

        let id = tx.last_insert_rowid();
        tx.commit()
            .map_err(|e| LendingError::persistence("append", e))?;

        tracing::debug!(id, decision = %entry.decision, "decision appended to audit ledger");
        Ok(id)
    }

    /// Records newest first. Each call reads a fresh snapshot; `limit`
    /// truncates to the most recent `n`.
    pub fn scan_descending(&self, limit: Option<usize>) -> Result<Vec<DecisionRecord>> {
        self.with_reader(|conn| scan(conn, limit))
    }

    /// Summary and the most recent `limit` records, read in one transaction
    /// so both reflect the same set of appends.
    pub fn snapshot(&self, limit: usize) -> Result<(AuditSummary, Vec<DecisionRecord>)> {
        self.with_reader(|conn| {
            // one read transaction: both queries see the same appends
            let tx = conn.unchecked_transaction()?;
            let summary = summarize(&tx)?;
            let records = scan(&tx, Some(limit))?;
            tx.commit()?;
            Ok((summary, records))
        })
    }

    /// Records whose fico, decision, or timestamp text contains `pattern`,
    /// newest first. Plain case-sensitive containment; `%` and `_` are
    /// literal characters. fico is matched on SQLite's text rendering of the
    /// stored REAL (`720.0`).
    pub fn search(&self, pattern: &str) -> Result<Vec<DecisionRecord>> {
        if pattern.is_empty() {
            return self.scan_descending(None);
        }

        self.with_reader(|conn| search(conn, pattern))
    }

    /// Count, approval rate, and mean utility, read in one statement.
    pub fn summarize(&self) -> Result<AuditSummary> {
        self.with_reader(summarize)
    }

    pub fn count(&self) -> Result<u64> {
        self.with_reader(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM audit_logs", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    /// Walk the ledger oldest first and re-derive every digest.
    pub fn verify_chain(&self) -> Result<ChainReport> {
        self.with_reader(verify_chain)
    }
}

// ============================================================================
// READ POOL
// ============================================================================

const DEFAULT_READERS: usize = 4;
const MAX_READERS: usize = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Read-only connections to a WAL database, handed out round-robin.
struct ReadPool {
    connections: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl ReadPool {
    fn open(path: &Path, size: usize) -> Result<Self> {
        let size = size.clamp(1, MAX_READERS);
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            connections.push(Mutex::new(conn));
        }
        Ok(ReadPool {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        let conn = self.connections[idx]
            .lock()
            .map_err(|_| LendingError::persistence("lock", "read connection poisoned"))?;
        f(&*conn)
    }
}

// ============================================================================
// QUERIES
// ============================================================================

fn search(conn: &Connection, pattern: &str) -> Result<Vec<DecisionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, timestamp, income, fico, dti, loan_amnt, risk_lambda, utility, decision, digest
         FROM audit_logs
         WHERE instr(CAST(fico AS TEXT), ?1) > 0
            OR instr(decision, ?1) > 0
            OR instr(timestamp, ?1) > 0
         ORDER BY id DESC",
    )?;

    let records = stmt
        .query_map([pattern], read_record)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(records)
}

fn verify_chain(conn: &Connection) -> Result<ChainReport> {
    let mut stmt = conn.prepare(
        "SELECT id, timestamp, income, fico, dti, loan_amnt, risk_lambda, utility, decision, digest
         FROM audit_logs
         ORDER BY id ASC",
    )?;
    let records = stmt.query_map([], read_record)?;

    let mut previous = GENESIS_DIGEST.to_string();
    let mut checked = 0;

    for record in records {
        let record = record?;
        checked += 1;

        let timestamp = record.timestamp.format(TIMESTAMP_FORMAT).to_string();
        let expected = chain_digest(&previous, &timestamp, &record.entry());
        if expected != record.digest {
            tracing::warn!(id = record.id, "audit chain broken");
            return Ok(ChainReport {
                records_checked: checked,
                first_broken_id: Some(record.id),
            });
        }
        previous = record.digest;
    }

    Ok(ChainReport {
        records_checked: checked,
        first_broken_id: None,
    })
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_ledger(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            income REAL NOT NULL,
            fico REAL NOT NULL,
            dti REAL NOT NULL,
            loan_amnt REAL NOT NULL,
            risk_lambda REAL NOT NULL,
            utility REAL NOT NULL,
            decision TEXT NOT NULL CHECK (decision IN ('APPROVE', 'REJECT')),
            digest TEXT NOT NULL
        )",
        [],
    )?;

    // Append-only: any mutation of an existing row aborts
    conn.execute_batch(
        "CREATE TRIGGER IF NOT EXISTS audit_logs_no_update
         BEFORE UPDATE ON audit_logs
         BEGIN
             SELECT RAISE(ABORT, 'audit_logs is append-only');
         END;

         CREATE TRIGGER IF NOT EXISTS audit_logs_no_delete
         BEFORE DELETE ON audit_logs
         BEGIN
             SELECT RAISE(ABORT, 'audit_logs is append-only');
         END;",
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_logs(timestamp)",
        [],
    )?;

    Ok(())
}

fn scan(conn: &Connection, limit: Option<usize>) -> Result<Vec<DecisionRecord>> {
    let limit = limit.map(|n| n as i64).unwrap_or(-1);

    let mut stmt = conn.prepare(
        "SELECT id, timestamp, income, fico, dti, loan_amnt, risk_lambda, utility, decision, digest
         FROM audit_logs
         ORDER BY id DESC
         LIMIT ?1",
    )?;

    let records = stmt
        .query_map([limit], read_record)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(records)
}

fn summarize(conn: &Connection) -> Result<AuditSummary> {
    let (total, approved, average): (i64, i64, f64) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN decision = 'APPROVE' THEN 1 ELSE 0 END), 0),
                COALESCE(AVG(utility), 0.0)
         FROM audit_logs",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let total = total as u64;
    let approved = approved as u64;
    let approval_rate = if total == 0 {
        0.0
    } else {
        approved as f64 / total as f64 * 100.0
    };

    Ok(AuditSummary {
        total,
        approved,
        approval_rate,
        average_utility: if total == 0 { 0.0 } else { average },
    })
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<DecisionRecord> {
    let timestamp_str: String = row.get(1)?;
    let decision_str: String = row.get(8)?;

    let timestamp = NaiveDateTime::parse_from_str(&timestamp_str, TIMESTAMP_FORMAT)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?
        .and_utc();

    let decision = decision_str.parse::<Decision>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })?;

    Ok(DecisionRecord {
        id: row.get(0)?,
        timestamp,
        income: row.get(2)?,
        fico: row.get(3)?,
        dti: row.get(4)?,
        loan_amount: row.get(5)?,
        risk_aversion: row.get(6)?,
        expected_utility: row.get(7)?,
        decision,
        digest: row.get(9)?,
    })
}

/// SHA-256 over the previous digest and the exact bit patterns of the row.
fn chain_digest(previous: &str, timestamp: &str, entry: &DecisionEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(timestamp.as_bytes());
    for value in [
        entry.income,
        entry.fico,
        entry.dti,
        entry.loan_amount,
        entry.risk_aversion,
        entry.expected_utility,
    ] {
        hasher.update(value.to_bits().to_be_bytes());
    }
    hasher.update(entry.decision.as_str().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Serde adapter for the ledger's timestamp text.
mod ledger_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(fico: f64, utility: f64, decision: Decision) -> DecisionEntry {
        DecisionEntry {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
            income: 60_000.0,
            fico,
            dti: 20.0,
            loan_amount: 10_000.0,
            risk_aversion: 1.0,
            expected_utility: utility,
            decision,
        }
    }

    #[test]
    fn test_ids_strictly_increase() {
        let ledger = AuditLedger::open_in_memory().unwrap();

        let mut last = 0;
        for i in 0..20 {
            let id = ledger
                .append(&entry(700.0 + i as f64, 10.0, Decision::Approve))
                .unwrap();
            assert!(id > last, "id {id} should exceed {last}");
            last = id;
        }
    }

    #[test]
    fn test_scan_is_reverse_insertion_order() {
        let ledger = AuditLedger::open_in_memory().unwrap();
        let entries: Vec<DecisionEntry> = (0..5)
            .map(|i| entry(600.0 + i as f64, i as f64, Decision::Approve))
            .collect();

        for e in &entries {
            ledger.append(e).unwrap();
        }

        let scanned = ledger.scan_descending(None).unwrap();
        assert_eq!(scanned.len(), 5);

        let round_tripped: Vec<DecisionEntry> = scanned.iter().rev().map(|r| r.entry()).collect();
        assert_eq!(round_tripped, entries);
    }

    #[test]
    fn test_scan_limit_returns_most_recent() {
        let ledger = AuditLedger::open_in_memory().unwrap();
        for i in 0..10 {
            ledger.append(&entry(700.0, i as f64, Decision::Approve)).unwrap();
        }

        let recent = ledger.scan_descending(Some(3)).unwrap();
        let utilities: Vec<f64> = recent.iter().map(|r| r.expected_utility).collect();
        assert_eq!(utilities, vec![9.0, 8.0, 7.0]);
    }

    #[test]
    fn test_summary_three_of_four_approved() {
        let ledger = AuditLedger::open_in_memory().unwrap();
        ledger.append(&entry(720.0, 100.0, Decision::Approve)).unwrap();
        ledger.append(&entry(700.0, 200.0, Decision::Approve)).unwrap();
        ledger.append(&entry(680.0, 300.0, Decision::Approve)).unwrap();
        ledger.append(&entry(500.0, -200.0, Decision::Reject)).unwrap();

        let summary = ledger.summarize().unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.approved, 3);
        assert_eq!(summary.approval_rate, 75.0);
        assert_eq!(summary.average_utility, 100.0);
    }

    #[test]
    fn test_summary_empty_ledger() {
        let ledger = AuditLedger::open_in_memory().unwrap();
        let summary = ledger.summarize().unwrap();

        assert_eq!(summary.total, 0);
        assert_eq!(summary.approval_rate, 0.0);
        assert_eq!(summary.average_utility, 0.0);
    }

    #[test]
    fn test_search_substring_semantics() {
        let ledger = AuditLedger::open_in_memory().unwrap();
        ledger.append(&entry(720.0, 100.0, Decision::Approve)).unwrap();
        ledger.append(&entry(580.0, -50.0, Decision::Reject)).unwrap();
        ledger.append(&entry(672.0, 10.0, Decision::Approve)).unwrap();

        let by_fico = ledger.search("72").unwrap();
        let ficos: Vec<f64> = by_fico.iter().map(|r| r.fico).collect();
        assert_eq!(ficos, vec![672.0, 720.0]);

        assert_eq!(ledger.search("REJECT").unwrap().len(), 1);
        assert_eq!(ledger.search("PROV").unwrap().len(), 2);
        assert_eq!(ledger.search("2026-03-14").unwrap().len(), 3);

        // containment is case-sensitive and does not treat % or _ as wildcards
        assert!(ledger.search("approve").unwrap().is_empty());
        assert!(ledger.search("%").unwrap().is_empty());
        assert!(ledger.search("_").unwrap().is_empty());
    }

    #[test]
    fn test_empty_search_returns_everything() {
        let ledger = AuditLedger::open_in_memory().unwrap();
        for i in 0..4 {
            ledger.append(&entry(700.0, i as f64, Decision::Reject)).unwrap();
        }

        let all = ledger.search("").unwrap();
        assert_eq!(all, ledger.scan_descending(None).unwrap());
    }

    #[test]
    fn test_records_cannot_be_mutated() {
        let ledger = AuditLedger::open_in_memory().unwrap();
        ledger.append(&entry(700.0, 1.0, Decision::Approve)).unwrap();

        let conn = ledger.lock().unwrap();
        assert!(conn
            .execute("UPDATE audit_logs SET decision = 'REJECT'", [])
            .is_err());
        assert!(conn.execute("DELETE FROM audit_logs", []).is_err());
        drop(conn);

        assert_eq!(ledger.count().unwrap(), 1);
        assert_eq!(
            ledger.scan_descending(None).unwrap()[0].decision,
            Decision::Approve
        );
    }

    #[test]
    fn test_chain_detects_tampering() {
        let ledger = AuditLedger::open_in_memory().unwrap();
        for i in 0..5 {
            ledger.append(&entry(700.0, i as f64, Decision::Approve)).unwrap();
        }

        let report = ledger.verify_chain().unwrap();
        assert!(report.is_intact());
        assert_eq!(report.records_checked, 5);

        {
            let conn = ledger.lock().unwrap();
            conn.execute_batch(
                "DROP TRIGGER audit_logs_no_update;
                 UPDATE audit_logs SET utility = 9999.0 WHERE id = 3;",
            )
            .unwrap();
        }

        let report = ledger.verify_chain().unwrap();
        assert_eq!(report.first_broken_id, Some(3));
    }

    #[test]
    fn test_timestamp_truncated_to_seconds() {
        let application = LoanApplication::new(50_000.0, 700.0, 10.0, 5_000.0, 1.0).unwrap();
        let assessment = Assessment {
            probability_of_default: 0.1,
            expected_utility: 175.0,
            decision: Decision::Approve,
        };
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap() + chrono::Duration::milliseconds(789);

        let e = DecisionEntry::at(at, &application, &assessment);
        assert_eq!(e.timestamp, Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap());

        let ledger = AuditLedger::open_in_memory().unwrap();
        ledger.append(&e).unwrap();
        assert_eq!(ledger.scan_descending(None).unwrap()[0].entry(), e);
    }

    #[test]
    fn test_file_reads_bypass_the_writer() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = AuditLedger::open(&dir.path().join("ledger.db")).unwrap();
        ledger.append(&entry(700.0, 10.0, Decision::Approve)).unwrap();
        ledger.append(&entry(610.0, -5.0, Decision::Reject)).unwrap();

        // writer held with an uncommitted insert in flight
        let writer = ledger.lock().unwrap();
        writer
            .execute_batch(
                "BEGIN IMMEDIATE;
                 INSERT INTO audit_logs (timestamp, income, fico, dti, loan_amnt, risk_lambda, utility, decision, digest)
                 VALUES ('2026-03-14 09:27:00', 1.0, 700.0, 1.0, 1.0, 1.0, 1.0, 'APPROVE', 'x');",
            )
            .unwrap();

        assert_eq!(ledger.scan_descending(None).unwrap().len(), 2);
        assert_eq!(ledger.count().unwrap(), 2);
        assert_eq!(ledger.search("REJECT").unwrap().len(), 1);
        let (summary, page) = ledger.snapshot(10).unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(page.len(), 2);

        writer.execute_batch("ROLLBACK;").unwrap();
        drop(writer);
        assert!(ledger.verify_chain().unwrap().is_intact());
    }

    #[test]
    fn test_sub_second_entry_is_refused() {
        let ledger = AuditLedger::open_in_memory().unwrap();
        let mut e = entry(700.0, 10.0, Decision::Approve);
        e.timestamp = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap() + chrono::Duration::milliseconds(789);

        let err = ledger.append(&e).unwrap_err();
        assert_eq!(err.code(), "VR-3001");
        assert_eq!(ledger.count().unwrap(), 0);

        // the same entry at whole seconds round-trips unchanged
        e.timestamp = e.timestamp.trunc_subsecs(0);
        ledger.append(&e).unwrap();
        assert_eq!(ledger.scan_descending(None).unwrap()[0].entry(), e);
    }

    #[test]
    fn test_record_json_shape() {
        let ledger = AuditLedger::open_in_memory().unwrap();
        ledger.append(&entry(720.0, 925.0, Decision::Approve)).unwrap();
        let record = ledger.scan_descending(None).unwrap().remove(0);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["timestamp"], "2026-03-14 09:26:53");
        assert_eq!(json["loan_amnt"], 10_000.0);
        assert_eq!(json["risk_lambda"], 1.0);
        assert_eq!(json["utility"], 925.0);
        assert_eq!(json["decision"], "APPROVE");
    }
}

//! SQLite database backing the job queue and the result store
//!
//! One file holds both tables so a server process and any number of worker
//! processes can share it. Every operation touches a single row or runs in
//! one immediate transaction.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{JobDescriptor, ResultPayload};

/// SQLite-based job database
pub struct JobDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl JobDatabase {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::store(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::store(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        // WAL lets worker processes claim while the server enqueues
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=5000;
        "#,
        )
        .map_err(|e| Error::store(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            -- Durable FIFO work queue; seq gives delivery order
            CREATE TABLE IF NOT EXISTS queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL UNIQUE,
                descriptor_json TEXT NOT NULL,
                status TEXT NOT NULL,
                timeout_secs INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                expired_count INTEGER NOT NULL DEFAULT 0,
                claimed_by TEXT,
                lease_expires_at INTEGER,
                last_error TEXT,
                enqueued_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_queue_status_seq ON queue(status, seq);
            CREATE INDEX IF NOT EXISTS idx_queue_lease ON queue(status, lease_expires_at);

            -- Terminal job outcomes; absence means still running
            CREATE TABLE IF NOT EXISTS results (
                job_id TEXT PRIMARY KEY,
                payload_json TEXT NOT NULL,
                is_error INTEGER NOT NULL,
                stored_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_results_stored_at ON results(stored_at);
        "#,
        )
        .map_err(|e| Error::store(format!("Failed to run migrations: {}", e)))?;

        tracing::debug!("Job database migrations complete");
        Ok(())
    }

    // ==================== Queue Operations ====================

    /// Append a job to the queue
    pub fn enqueue(&self, descriptor: &JobDescriptor, timeout: Duration) -> Result<()> {
        let conn = self.conn.lock();
        let descriptor_json = serde_json::to_string(descriptor)?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO queue (
                job_id, descriptor_json, status, timeout_secs, attempts, enqueued_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)
            "#,
            params![
                descriptor.id.to_string(),
                descriptor_json,
                QueueEntryStatus::Queued.as_str(),
                timeout.as_secs() as i64,
                now,
            ],
        )
        .map_err(|e| Error::store(format!("Failed to enqueue job {}: {}", descriptor.id, e)))?;

        Ok(())
    }

    /// Claim the oldest queued job, starting a lease of the entry's timeout.
    ///
    /// Returns the descriptor and the new attempt number, which doubles as the
    /// fencing token for this delivery.
    pub fn claim_next(
        &self,
        worker_id: &str,
        now_ms: i64,
    ) -> Result<Option<(JobDescriptor, u32, i64)>> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::store(format!("Failed to begin claim: {}", e)))?;

        let next = tx
            .query_row(
                r#"
                SELECT seq, descriptor_json, timeout_secs, attempts
                FROM queue WHERE status = 'queued'
                ORDER BY seq ASC LIMIT 1
                "#,
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| Error::store(format!("Failed to select next job: {}", e)))?;

        let Some((seq, descriptor_json, timeout_secs, attempts)) = next else {
            return Ok(None);
        };

        let token = attempts + 1;
        let expires_at = now_ms + timeout_secs * 1000;

        tx.execute(
            r#"
            UPDATE queue SET
                status = 'claimed',
                attempts = ?2,
                claimed_by = ?3,
                lease_expires_at = ?4,
                updated_at = ?5
            WHERE seq = ?1
            "#,
            params![seq, token, worker_id, expires_at, Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::store(format!("Failed to claim job: {}", e)))?;

        tx.commit()
            .map_err(|e| Error::store(format!("Failed to commit claim: {}", e)))?;

        let descriptor: JobDescriptor = serde_json::from_str(&descriptor_json)?;
        Ok(Some((descriptor, token as u32, expires_at)))
    }

    /// True while the entry is claimed under this fencing token
    pub fn lease_is_current(&self, job_id: Uuid, token: u32) -> Result<bool> {
        let conn = self.conn.lock();

        let row = conn
            .query_row(
                "SELECT status, attempts FROM queue WHERE job_id = ?1",
                params![job_id.to_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(|e| Error::store(format!("Failed to read lease: {}", e)))?;

        Ok(matches!(row, Some((status, attempts)) if status == "claimed" && attempts == token as i64))
    }

    /// Move a claimed entry to a new status if the token still matches.
    /// Returns false when the lease was lost.
    pub fn settle_lease(
        &self,
        job_id: Uuid,
        token: u32,
        status: QueueEntryStatus,
        error: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn.lock();

        let changed = conn
            .execute(
                r#"
                UPDATE queue SET
                    status = ?3,
                    claimed_by = NULL,
                    lease_expires_at = NULL,
                    last_error = COALESCE(?4, last_error),
                    updated_at = ?5
                WHERE job_id = ?1 AND attempts = ?2 AND status = 'claimed'
                "#,
                params![
                    job_id.to_string(),
                    token as i64,
                    status.as_str(),
                    error,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| Error::store(format!("Failed to settle job {}: {}", job_id, e)))?;

        Ok(changed == 1)
    }

    /// Handle claimed entries whose lease has expired.
    ///
    /// Each expiry counts against `max_attempts`; nacks do not. An entry below
    /// the cap goes back to the queue. An entry at the cap stays claimed under a
    /// fresh token owned by the reaper, with a lease that is already expired, and
    /// is returned as a dead letter. It only becomes `dead` once the caller has
    /// recorded its outcome and settles it, so a failed pass retries it.
    pub fn reap_expired(&self, now_ms: i64, max_attempts: u32) -> Result<ReapOutcome> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::store(format!("Failed to begin reap: {}", e)))?;

        let expired: Vec<(i64, String, i64, i64, Option<String>)> = {
            let mut stmt = tx
                .prepare(
                    r#"
                    SELECT seq, descriptor_json, attempts, expired_count, claimed_by FROM queue
                    WHERE status = 'claimed' AND lease_expires_at < ?1
                    ORDER BY seq ASC
                    "#,
                )
                .map_err(|e| Error::store(format!("Failed to prepare query: {}", e)))?;

            let rows = stmt
                .query_map(params![now_ms], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                })
                .map_err(|e| Error::store(format!("Failed to list expired leases: {}", e)))?;
            let expired = rows.filter_map(|r| r.ok()).collect();
            expired
        };

        let mut outcome = ReapOutcome::default();
        let now = Utc::now().to_rfc3339();

        for (seq, descriptor_json, attempts, expired_count, claimed_by) in expired {
            // A dead letter whose settlement failed last pass keeps its count
            let pending = claimed_by.as_deref() == Some(DEAD_LETTER_OWNER);
            let expired_count = if pending { expired_count } else { expired_count + 1 };

            if expired_count < max_attempts as i64 {
                tx.execute(
                    r#"
                    UPDATE queue SET
                        status = 'queued',
                        expired_count = ?2,
                        claimed_by = NULL,
                        lease_expires_at = NULL,
                        last_error = 'lease expired',
                        updated_at = ?3
                    WHERE seq = ?1
                    "#,
                    params![seq, expired_count, now],
                )
                .map_err(|e| Error::store(format!("Failed to requeue expired job: {}", e)))?;
                outcome.requeued += 1;
                continue;
            }

            let descriptor = match serde_json::from_str::<JobDescriptor>(&descriptor_json) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    tracing::error!("Dead letter {} has an unreadable descriptor: {}", seq, e);
                    tx.execute(
                        r#"
                        UPDATE queue SET
                            status = 'dead',
                            expired_count = ?2,
                            claimed_by = NULL,
                            lease_expires_at = NULL,
                            last_error = 'unreadable descriptor',
                            updated_at = ?3
                        WHERE seq = ?1
                        "#,
                        params![seq, expired_count, now],
                    )
                    .map_err(|e| Error::store(format!("Failed to bury job: {}", e)))?;
                    continue;
                }
            };

            let token = attempts + 1;
            tx.execute(
                r#"
                UPDATE queue SET
                    attempts = ?2,
                    expired_count = ?3,
                    claimed_by = ?4,
                    lease_expires_at = ?5,
                    last_error = 'lease expired',
                    updated_at = ?6
                WHERE seq = ?1
                "#,
                params![seq, token, expired_count, DEAD_LETTER_OWNER, now_ms, now],
            )
            .map_err(|e| Error::store(format!("Failed to hold dead letter: {}", e)))?;

            outcome.dead.push(DeadLetter {
                descriptor,
                token: token as u32,
                expired_count: expired_count as u32,
            });
        }

        tx.commit()
            .map_err(|e| Error::store(format!("Failed to commit reap: {}", e)))?;

        Ok(outcome)
    }

    /// Entry counts per status
    pub fn queue_counts(&self) -> Result<QueueCounts> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM queue GROUP BY status")
            .map_err(|e| Error::store(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|e| Error::store(format!("Failed to count queue: {}", e)))?;

        let mut counts = QueueCounts::default();
        for (status, count) in rows.filter_map(|r| r.ok()) {
            let count = count as usize;
            match QueueEntryStatus::parse(&status) {
                Some(QueueEntryStatus::Queued) => counts.queued = count,
                Some(QueueEntryStatus::Claimed) => counts.claimed = count,
                Some(QueueEntryStatus::Done) => counts.done = count,
                Some(QueueEntryStatus::Dead) => counts.dead = count,
                None => tracing::warn!("Unknown queue status '{}'", status),
            }
        }

        Ok(counts)
    }

    /// Queue status and attempt count for one job
    pub fn queue_entry(&self, job_id: Uuid) -> Result<Option<(QueueEntryStatus, u32)>> {
        let conn = self.conn.lock();

        let row = conn
            .query_row(
                "SELECT status, attempts FROM queue WHERE job_id = ?1",
                params![job_id.to_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(|e| Error::store(format!("Failed to read queue entry: {}", e)))?;

        Ok(row.and_then(|(status, attempts)| {
            QueueEntryStatus::parse(&status).map(|s| (s, attempts as u32))
        }))
    }

    // ==================== Result Operations ====================

    /// Insert or overwrite the result for a job
    pub fn put_result(&self, job_id: Uuid, payload: &ResultPayload) -> Result<()> {
        let conn = self.conn.lock();
        let payload_json = serde_json::to_string(payload)?;

        conn.execute(
            r#"
            INSERT INTO results (job_id, payload_json, is_error, stored_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(job_id) DO UPDATE SET
                payload_json = excluded.payload_json,
                is_error = excluded.is_error,
                stored_at = excluded.stored_at
            "#,
            params![
                job_id.to_string(),
                payload_json,
                payload.is_error() as i64,
                Utc::now().timestamp_millis(),
            ],
        )
        .map_err(|e| Error::store(format!("Failed to store result for {}: {}", job_id, e)))?;

        Ok(())
    }

    /// Read the result for a job
    pub fn get_result(&self, job_id: Uuid) -> Result<Option<ResultPayload>> {
        let conn = self.conn.lock();

        let payload_json: Option<String> = conn
            .query_row(
                "SELECT payload_json FROM results WHERE job_id = ?1",
                params![job_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::store(format!("Failed to read result for {}: {}", job_id, e)))?;

        payload_json
            .map(|json| serde_json::from_str(&json).map_err(Error::from))
            .transpose()
    }

    /// Delete results stored before the cutoff (retention)
    pub fn purge_results_before(&self, cutoff_ms: i64) -> Result<usize> {
        let conn = self.conn.lock();

        let count = conn
            .execute(
                "DELETE FROM results WHERE stored_at < ?1",
                params![cutoff_ms],
            )
            .map_err(|e| Error::store(format!("Failed to purge results: {}", e)))?;

        Ok(count)
    }

    /// Delete settled queue entries older than the cutoff
    pub fn purge_settled_entries_before(&self, cutoff: chrono::DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock();

        let count = conn
            .execute(
                "DELETE FROM queue WHERE status IN ('done', 'dead') AND updated_at < ?1",
                params![cutoff.to_rfc3339()],
            )
            .map_err(|e| Error::store(format!("Failed to purge queue entries: {}", e)))?;

        Ok(count)
    }
}

/// Lifecycle of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEntryStatus {
    Queued,
    Claimed,
    Done,
    Dead,
}

impl QueueEntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueEntryStatus::Queued => "queued",
            QueueEntryStatus::Claimed => "claimed",
            QueueEntryStatus::Done => "done",
            QueueEntryStatus::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(QueueEntryStatus::Queued),
            "claimed" => Some(QueueEntryStatus::Claimed),
            "done" => Some(QueueEntryStatus::Done),
            "dead" => Some(QueueEntryStatus::Dead),
            _ => None,
        }
    }
}

/// Queue entry counts
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueCounts {
    pub queued: usize,
    pub claimed: usize,
    pub done: usize,
    pub dead: usize,
}

/// `claimed_by` marker for dead letters the reaper is settling
const DEAD_LETTER_OWNER: &str = "reaper";

/// An entry out of attempts, held by the reaper until its outcome is recorded
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub descriptor: JobDescriptor,
    /// Token to settle the entry with
    pub token: u32,
    /// Lease expiries so far
    pub expired_count: u32,
}

/// Result of one reaper pass
#[derive(Debug, Default)]
pub struct ReapOutcome {
    /// Entries returned to the queue
    pub requeued: usize,
    pub dead: Vec<DeadLetter>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ArtifactRef;

    fn descriptor() -> JobDescriptor {
        let id = Uuid::new_v4();
        JobDescriptor {
            id,
            artifact: ArtifactRef {
                key: format!("{}_data.csv", id),
                filename: "data.csv".to_string(),
                size: 3,
                sha256: String::new(),
            },
            prompt: None,
            target: None,
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_claim_is_fifo_and_exclusive() {
        let db = JobDatabase::in_memory().unwrap();
        let first = descriptor();
        let second = descriptor();
        db.enqueue(&first, Duration::from_secs(900)).unwrap();
        db.enqueue(&second, Duration::from_secs(900)).unwrap();

        let (claimed, token, _) = db.claim_next("w1", 0).unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(token, 1);

        let (claimed, _, _) = db.claim_next("w2", 0).unwrap().unwrap();
        assert_eq!(claimed.id, second.id);

        assert!(db.claim_next("w3", 0).unwrap().is_none());
    }

    #[test]
    fn test_settle_requires_current_token() {
        let db = JobDatabase::in_memory().unwrap();
        let job = descriptor();
        db.enqueue(&job, Duration::from_secs(1)).unwrap();

        let (_, token, expires) = db.claim_next("w1", 0).unwrap().unwrap();
        assert_eq!(expires, 1000);

        assert!(!db.settle_lease(job.id, token + 1, QueueEntryStatus::Done, None).unwrap());
        assert!(db.settle_lease(job.id, token, QueueEntryStatus::Done, None).unwrap());
        assert!(!db.lease_is_current(job.id, token).unwrap());
        assert_eq!(
            db.queue_entry(job.id).unwrap(),
            Some((QueueEntryStatus::Done, 1))
        );
    }

    #[test]
    fn test_reap_requeues_then_dead_letters() {
        let db = JobDatabase::in_memory().unwrap();
        let job = descriptor();
        db.enqueue(&job, Duration::from_secs(1)).unwrap();

        db.claim_next("w1", 0).unwrap().unwrap();
        let outcome = db.reap_expired(5_000, 2).unwrap();
        assert_eq!(outcome.requeued, 1);
        assert!(outcome.dead.is_empty());

        let (_, token, _) = db.claim_next("w2", 10_000).unwrap().unwrap();
        assert_eq!(token, 2);
        let outcome = db.reap_expired(20_000, 2).unwrap();
        assert_eq!(outcome.requeued, 0);
        assert_eq!(outcome.dead.len(), 1);

        let letter = &outcome.dead[0];
        assert_eq!(letter.descriptor.id, job.id);
        assert_eq!(letter.expired_count, 2);
        assert_eq!(letter.token, 3);

        // The old holder is fenced out; the row is not dead until settled
        assert!(!db.lease_is_current(job.id, token).unwrap());
        assert_eq!(db.queue_counts().unwrap().claimed, 1);

        assert!(db
            .settle_lease(job.id, letter.token, QueueEntryStatus::Dead, Some("lease expired"))
            .unwrap());
        let counts = db.queue_counts().unwrap();
        assert_eq!(counts.dead, 1);
        assert_eq!(counts.queued, 0);
    }

    #[test]
    fn test_unsettled_dead_letter_is_offered_again() {
        let db = JobDatabase::in_memory().unwrap();
        let job = descriptor();
        db.enqueue(&job, Duration::from_secs(1)).unwrap();

        db.claim_next("w1", 0).unwrap().unwrap();
        let first = db.reap_expired(5_000, 1).unwrap();
        assert_eq!(first.dead.len(), 1);

        let again = db.reap_expired(6_000, 1).unwrap();
        assert_eq!(again.dead.len(), 1);
        assert_eq!(again.dead[0].expired_count, 1);
        assert!(again.dead[0].token > first.dead[0].token);
        assert!(!db
            .settle_lease(job.id, first.dead[0].token, QueueEntryStatus::Dead, None)
            .unwrap());
    }

    #[test]
    fn test_nacks_do_not_count_as_expiries() {
        let db = JobDatabase::in_memory().unwrap();
        let job = descriptor();
        db.enqueue(&job, Duration::from_secs(1)).unwrap();

        for _ in 0..2 {
            let (_, token, _) = db.claim_next("w1", 0).unwrap().unwrap();
            assert!(db
                .settle_lease(job.id, token, QueueEntryStatus::Queued, Some("store down"))
                .unwrap());
        }

        db.claim_next("w1", 0).unwrap().unwrap();
        let outcome = db.reap_expired(5_000, 3).unwrap();
        assert_eq!(outcome.requeued, 1);
        assert!(outcome.dead.is_empty());
        assert_eq!(db.queue_entry(job.id).unwrap(), Some((QueueEntryStatus::Queued, 3)));
    }

    #[test]
    fn test_purge_settled_entries_keeps_live_ones() {
        let db = JobDatabase::in_memory().unwrap();
        let done = descriptor();
        let waiting = descriptor();
        db.enqueue(&done, Duration::from_secs(60)).unwrap();
        db.enqueue(&waiting, Duration::from_secs(60)).unwrap();

        let (_, token, _) = db.claim_next("w1", 0).unwrap().unwrap();
        db.settle_lease(done.id, token, QueueEntryStatus::Done, None).unwrap();

        let purged = db
            .purge_settled_entries_before(Utc::now() + chrono::Duration::seconds(1))
            .unwrap();
        assert_eq!(purged, 1);
        assert!(db.queue_entry(done.id).unwrap().is_none());
        assert_eq!(
            db.queue_entry(waiting.id).unwrap(),
            Some((QueueEntryStatus::Queued, 0))
        );
    }

    #[test]
    fn test_put_overwrites_and_purges() {
        let db = JobDatabase::in_memory().unwrap();
        let id = Uuid::new_v4();

        db.put_result(id, &ResultPayload::failure("first")).unwrap();
        db.put_result(id, &ResultPayload::failure("second")).unwrap();
        assert_eq!(
            db.get_result(id).unwrap(),
            Some(ResultPayload::failure("second"))
        );

        let purged = db
            .purge_results_before(Utc::now().timestamp_millis() + 1_000)
            .unwrap();
        assert_eq!(purged, 1);
        assert!(db.get_result(id).unwrap().is_none());
    }
}

//! Feedback persistence
//!
//! Every write goes through one async mutex owned by [`FeedbackStore`], held
//! only for the commit itself: lookup + insert of a new fingerprint, a single
//! reconciliation upgrade, or a resolve. Reads go straight to the pool (WAL
//! gives them a consistent snapshot). The `UNIQUE(fingerprint)` constraint
//! backs the lock: a violation on insert is reported as an existing record.

use aegis_common::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::retry::{retry_on_lock, MAX_LOCK_WAIT};
use crate::models::{
    AiUpgrade, ClassificationSource, Department, FeedbackRecord, FeedbackStats, NewFeedback, Sentiment, Topic,
};

const RECORD_COLUMNS: &str = "guid, raw_content, sanitized_content, fingerprint, sentiment, topics, urgent, \
     source, provider, department, needs_review, resolved, resolution_note, created_at, updated_at";

/// Result of [`FeedbackStore::insert_if_absent`]
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// This call created the record
    Inserted(FeedbackRecord),
    /// A record with the same fingerprint was already committed
    Existing(FeedbackRecord),
}

/// Result of [`FeedbackStore::mark_resolved`]
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    Resolved(FeedbackRecord),
    AlreadyResolved,
    NotFound,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }

    pub fn into_record(self) -> FeedbackRecord {
        match self {
            InsertOutcome::Inserted(record) | InsertOutcome::Existing(record) => record,
        }
    }
}

/// Durable feedback repository with serialized writes
#[derive(Clone)]
pub struct FeedbackStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl FeedbackStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Record with this fingerprint, if one was ever committed
    pub async fn lookup(&self, fingerprint: &str) -> Result<Option<FeedbackRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM feedback WHERE fingerprint = ?", RECORD_COLUMNS))
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<FeedbackRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM feedback WHERE guid = ?", RECORD_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Create the record for a new fingerprint, or return the one already
    /// committed
    ///
    /// The only path that creates records. Called with an already-decided
    /// race outcome so the lock covers the commit only.
    pub async fn insert_if_absent(&self, new: NewFeedback) -> Result<InsertOutcome> {
        let _guard = self.write_lock.lock().await;
        retry_on_lock("insert feedback", MAX_LOCK_WAIT, || self.insert_transaction(&new)).await
    }

    async fn insert_transaction(&self, new: &NewFeedback) -> Result<InsertOutcome> {
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = fetch_by_fingerprint(&mut *tx, &new.fingerprint).await? {
            tx.commit().await?;
            return Ok(InsertOutcome::Existing(existing));
        }

        let record = new.clone().into_record(Utc::now());
        let insert = sqlx::query(
            r#"
            INSERT INTO feedback (guid, raw_content, sanitized_content, fingerprint, sentiment, topics,
                                  urgent, source, provider, department, needs_review, resolved,
                                  resolution_note, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.raw_content)
        .bind(&record.sanitized_content)
        .bind(&record.fingerprint)
        .bind(record.sentiment.as_str())
        .bind(topics_to_json(&record.topics)?)
        .bind(record.urgent)
        .bind(record.source.as_str())
        .bind(&record.provider)
        .bind(record.department.as_str())
        .bind(record.needs_review)
        .bind(timestamp(&record.created_at))
        .bind(timestamp(&record.updated_at))
        .execute(&mut *tx)
        .await;

        match insert {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await?;
                tracing::debug!(fingerprint = %new.fingerprint, "Fingerprint committed concurrently");
                return self
                    .lookup(&new.fingerprint)
                    .await?
                    .map(InsertOutcome::Existing)
                    .ok_or_else(|| Error::Internal("Unique violation without existing record".to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        // Read back so inserted and existing outcomes carry identical values
        let stored = fetch_by_fingerprint(&mut *tx, &new.fingerprint)
            .await?
            .ok_or_else(|| Error::Internal("Inserted record not readable".to_string()))?;
        tx.commit().await?;

        tracing::debug!(id = %stored.id, source = %stored.source, "Feedback committed");
        Ok(InsertOutcome::Inserted(stored))
    }

    /// Oldest FALLBACK records first
    pub async fn fallback_batch(&self, limit: usize) -> Result<Vec<FeedbackRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM feedback WHERE source = 'fallback' ORDER BY created_at ASC, rowid ASC LIMIT ?",
            RECORD_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Replace a FALLBACK classification with an AI one
    ///
    /// Touches the row only while its source is still `fallback`, so an
    /// AI record is never rewritten and repeated upgrades are no-ops.
    /// `needs_review` can be raised here but never cleared.
    /// Returns whether the row changed.
    pub async fn upgrade_to_ai(&self, id: Uuid, upgrade: &AiUpgrade) -> Result<bool> {
        let topics = topics_to_json(&upgrade.classification.topics)?;
        let department = upgrade.classification.department();
        let now = timestamp(&Utc::now());

        let _guard = self.write_lock.lock().await;
        let result = retry_on_lock("upgrade feedback", MAX_LOCK_WAIT, || async {
            sqlx::query(
                r#"
                UPDATE feedback
                SET sentiment = ?, topics = ?, urgent = ?, source = 'ai', provider = ?,
                    department = ?, needs_review = (needs_review OR ?), updated_at = ?
                WHERE guid = ? AND source = 'fallback'
                "#,
            )
            .bind(upgrade.classification.sentiment.as_str())
            .bind(&topics)
            .bind(upgrade.classification.urgent)
            .bind(&upgrade.provider)
            .bind(department.as_str())
            .bind(upgrade.needs_review)
            .bind(&now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::from)
        })
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Mark an open record resolved, clearing any review flag
    ///
    /// Only one of several concurrent calls for the same record resolves it;
    /// the others see `AlreadyResolved` and leave the note untouched.
    pub async fn mark_resolved(&self, id: Uuid, note: Option<&str>) -> Result<ResolveOutcome> {
        let now = timestamp(&Utc::now());

        let changed = {
            let _guard = self.write_lock.lock().await;
            retry_on_lock("resolve feedback", MAX_LOCK_WAIT, || async {
                sqlx::query(
                    r#"
                    UPDATE feedback
                    SET resolved = 1, needs_review = 0,
                        resolution_note = COALESCE(?, resolution_note), updated_at = ?
                    WHERE guid = ? AND resolved = 0
                    "#,
                )
                .bind(note)
                .bind(&now)
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .map_err(Error::from)
            })
            .await?
            .rows_affected()
        };

        let outcome = match self.get(id).await? {
            Some(record) if changed > 0 => ResolveOutcome::Resolved(record),
            Some(_) => ResolveOutcome::AlreadyResolved,
            None => ResolveOutcome::NotFound,
        };
        Ok(outcome)
    }

    /// Newest first
    pub async fn list(&self, offset: usize, limit: usize) -> Result<Vec<FeedbackRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM feedback ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            RECORD_COLUMNS
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Unresolved records flagged for human review, most recently changed first
    pub async fn review_queue(&self) -> Result<Vec<FeedbackRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM feedback WHERE needs_review = 1 AND resolved = 0 ORDER BY updated_at DESC",
            RECORD_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    pub async fn stats(&self) -> Result<FeedbackStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(urgent), 0) AS urgent,
                   COALESCE(SUM(CASE WHEN source = 'fallback' THEN 1 ELSE 0 END), 0) AS fallback,
                   COALESCE(SUM(CASE WHEN source = 'ai' THEN 1 ELSE 0 END), 0) AS ai,
                   COALESCE(SUM(resolved), 0) AS resolved,
                   COALESCE(SUM(needs_review), 0) AS needs_review
            FROM feedback
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(FeedbackStats {
            total: row.get("total"),
            urgent: row.get("urgent"),
            fallback: row.get("fallback"),
            ai: row.get("ai"),
            resolved: row.get("resolved"),
            needs_review: row.get("needs_review"),
        })
    }
}

async fn fetch_by_fingerprint(conn: &mut SqliteConnection, fingerprint: &str) -> Result<Option<FeedbackRecord>> {
    let row = sqlx::query(&format!("SELECT {} FROM feedback WHERE fingerprint = ?", RECORD_COLUMNS))
        .bind(fingerprint)
        .fetch_optional(conn)
        .await?;

    row.as_ref().map(record_from_row).transpose()
}

fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp '{}': {}", value, e)))
}

fn topics_to_json(topics: &BTreeSet<Topic>) -> Result<String> {
    serde_json::to_string(&topics.iter().map(Topic::as_str).collect::<Vec<_>>())
        .map_err(|e| Error::Internal(format!("Failed to encode topics: {}", e)))
}

fn topics_from_json(value: &str) -> Result<BTreeSet<Topic>> {
    let labels: Vec<String> =
        serde_json::from_str(value).map_err(|e| Error::Internal(format!("Invalid topics column: {}", e)))?;

    labels
        .iter()
        .map(|label| Topic::parse(label).ok_or_else(|| Error::Internal(format!("Unknown stored topic: {}", label))))
        .collect()
}

fn record_from_row(row: &SqliteRow) -> Result<FeedbackRecord> {
    let guid: String = row.get("guid");
    let id = Uuid::parse_str(&guid).map_err(|e| Error::Internal(format!("Invalid guid '{}': {}", guid, e)))?;

    let sentiment: String = row.get("sentiment");
    let source: String = row.get("source");
    let department: String = row.get("department");
    let topics: String = row.get("topics");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(FeedbackRecord {
        id,
        raw_content: row.get("raw_content"),
        sanitized_content: row.get("sanitized_content"),
        fingerprint: row.get("fingerprint"),
        sentiment: Sentiment::parse(&sentiment)
            .ok_or_else(|| Error::Internal(format!("Unknown stored sentiment: {}", sentiment)))?,
        topics: topics_from_json(&topics)?,
        urgent: row.get("urgent"),
        source: ClassificationSource::parse(&source)
            .ok_or_else(|| Error::Internal(format!("Unknown stored source: {}", source)))?,
        provider: row.get("provider"),
        department: Department::parse(&department)
            .ok_or_else(|| Error::Internal(format!("Unknown stored department: {}", department)))?,
        needs_review: row.get("needs_review"),
        resolved: row.get("resolved"),
        resolution_note: row.get("resolution_note"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

//! Storage layer for lecture engagement analytics.
//!
//! Provides the durable per-lecture record using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Concurrent writers each open their own `Database` on the same file. WAL
//! journaling plus a busy timeout make them queue inside SQLite instead of
//! failing, so callers never see writer contention.
//!
//! # Folds
//!
//! Every mutation is a [`Fold`] applied by [`Database::fold`] inside one
//! `IMMEDIATE` transaction. The new value of each counter or bucket is computed
//! by an SQL update expression against the row as it exists inside that
//! transaction; nothing is read out, modified in Rust and written back.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond precision
//! (e.g., `2024-01-15T10:30:00.000Z`), always UTC.
//!
//! ## Attention Buckets
//!
//! `attention_buckets` holds one row per `(lecture_id, second)`. `avg_score`
//! is REAL and `samples` INTEGER; the pair is only ever updated together.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use le_core::{AnalyticsRecord, AttentionPoint, Fold, LectureId, ValidationError};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use thiserror::Error;

/// How long a writer waits for the database lock before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Attention sample past the lecture's recorded duration.
    #[error("second {second} is past the end of lecture {lecture_id} ({duration}s)")]
    SecondOutOfRange {
        lecture_id: LectureId,
        second: u32,
        duration: u32,
    },
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for lecture {lecture_id}: {timestamp}")]
    TimestampParse {
        lecture_id: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored lecture id no longer passes validation.
    #[error("invalid stored lecture id {value:?}")]
    InvalidLectureId {
        value: String,
        #[source]
        source: ValidationError,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// One row of the lecture listing.
#[derive(Debug, Clone, PartialEq)]
pub struct LectureSummary {
    pub lecture_id: LectureId,
    pub total_views: u64,
    pub total_watch_time_sec: u64,
    pub duration_sec: Option<u32>,
    /// Number of playback seconds with at least one attention sample.
    pub timeline_seconds: u64,
    /// Mean of the per-second averages, if any samples exist.
    pub mean_attention: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            -- One row per lecture, created lazily by the first event.
            -- duration_sec: largest duration reported by watch events
            CREATE TABLE IF NOT EXISTS lecture_analytics (
                lecture_id TEXT PRIMARY KEY,
                total_views INTEGER NOT NULL DEFAULT 0,
                total_watch_time_sec INTEGER NOT NULL DEFAULT 0,
                duration_sec INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_lecture_analytics_updated
                ON lecture_analytics(updated_at);

            -- Running mean of attention scores per playback second
            CREATE TABLE IF NOT EXISTS attention_buckets (
                lecture_id TEXT NOT NULL,
                second INTEGER NOT NULL,
                avg_score REAL NOT NULL,
                samples INTEGER NOT NULL,
                PRIMARY KEY (lecture_id, second),
                FOREIGN KEY (lecture_id) REFERENCES lecture_analytics(lecture_id)
            );
            ",
        )?;
        Ok(())
    }

    /// Applies one fold atomically, creating the lecture's record if needed.
    ///
    /// On error nothing is written, including the lazily created record.
    pub fn fold(&mut self, lecture_id: &LectureId, fold: &Fold) -> Result<(), DbError> {
        self.fold_at(lecture_id, fold, Utc::now())
    }

    fn fold_at(
        &mut self,
        lecture_id: &LectureId,
        fold: &Fold,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let now = format_timestamp(now);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_record(&tx, lecture_id, &now)?;

        match *fold {
            Fold::Attention { second, score } => {
                let duration: Option<u32> = tx.query_row(
                    "SELECT duration_sec FROM lecture_analytics WHERE lecture_id = ?",
                    params![lecture_id.as_str()],
                    |row| row.get(0),
                )?;
                if let Some(duration) = duration.filter(|duration| second > *duration) {
                    return Err(DbError::SecondOutOfRange {
                        lecture_id: lecture_id.clone(),
                        second,
                        duration,
                    });
                }
                tx.execute(
                    "
                    INSERT INTO attention_buckets (lecture_id, second, avg_score, samples)
                    VALUES (?1, ?2, ?3, 1)
                    ON CONFLICT(lecture_id, second) DO UPDATE SET
                        avg_score = (attention_buckets.avg_score * attention_buckets.samples
                                     + excluded.avg_score)
                                    / (attention_buckets.samples + 1),
                        samples = attention_buckets.samples + 1
                    ",
                    params![lecture_id.as_str(), second, score],
                )?;
                touch(&tx, lecture_id, &now)?;
            }
            Fold::WatchTime { seconds, duration } => {
                tx.execute(
                    "
                    UPDATE lecture_analytics
                    SET total_watch_time_sec = total_watch_time_sec + ?2,
                        duration_sec = CASE
                            WHEN ?3 IS NULL THEN duration_sec
                            ELSE MAX(COALESCE(duration_sec, 0), ?3)
                        END,
                        updated_at = ?4
                    WHERE lecture_id = ?1
                    ",
                    params![lecture_id.as_str(), seconds, duration, now],
                )?;
            }
            Fold::View => {
                tx.execute(
                    "
                    UPDATE lecture_analytics
                    SET total_views = total_views + 1,
                        updated_at = ?2
                    WHERE lecture_id = ?1
                    ",
                    params![lecture_id.as_str(), now],
                )?;
            }
        }

        tx.commit()?;
        tracing::trace!(lecture_id = %lecture_id, ?fold, "fold applied");
        Ok(())
    }

    /// Creates a zero-valued record if none exists and returns the snapshot.
    pub fn ensure(&mut self, lecture_id: &LectureId) -> Result<AnalyticsRecord, DbError> {
        let now = format_timestamp(Utc::now());
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        if insert_record(&tx, lecture_id, &now)? {
            tracing::debug!(lecture_id = %lecture_id, "analytics record created");
        }
        let record = read_record(&tx, lecture_id)?;
        tx.commit()?;
        Ok(record)
    }

    /// Reads a consistent snapshot of one lecture.
    ///
    /// Lectures that have never received an event yield a zero-valued
    /// snapshot; no record is created.
    pub fn read(&self, lecture_id: &LectureId) -> Result<AnalyticsRecord, DbError> {
        let tx = self.conn.unchecked_transaction()?;
        let record = read_record(&tx, lecture_id)?;
        tx.commit()?;
        Ok(record)
    }

    /// Lists every lecture with a record, most recently updated first.
    pub fn list_lectures(&self) -> Result<Vec<LectureSummary>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT a.lecture_id, a.total_views, a.total_watch_time_sec, a.duration_sec,
                   a.updated_at, COUNT(b.second), AVG(b.avg_score)
            FROM lecture_analytics a
            LEFT JOIN attention_buckets b ON b.lecture_id = a.lecture_id
            GROUP BY a.lecture_id
            ORDER BY a.updated_at DESC, a.lecture_id
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, u64>(2)?,
                row.get::<_, Option<u32>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, u64>(5)?,
                row.get::<_, Option<f64>>(6)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (id, total_views, total_watch_time_sec, duration_sec, updated_at, seconds, mean) =
                row?;
            let updated_at = parse_timestamp(&updated_at, &id)?;
            summaries.push(LectureSummary {
                lecture_id: parse_lecture_id(id)?,
                total_views,
                total_watch_time_sec,
                duration_sec,
                timeline_seconds: seconds,
                mean_attention: mean,
                updated_at,
            });
        }
        Ok(summaries)
    }
}

/// Inserts a zero-valued record unless one exists. Returns whether it was created.
fn insert_record(tx: &Transaction<'_>, lecture_id: &LectureId, now: &str) -> Result<bool, DbError> {
    let inserted = tx.execute(
        "
        INSERT INTO lecture_analytics
        (lecture_id, total_views, total_watch_time_sec, duration_sec, created_at, updated_at)
        VALUES (?1, 0, 0, NULL, ?2, ?2)
        ON CONFLICT(lecture_id) DO NOTHING
        ",
        params![lecture_id.as_str(), now],
    )?;
    Ok(inserted > 0)
}

fn touch(tx: &Transaction<'_>, lecture_id: &LectureId, now: &str) -> Result<(), DbError> {
    tx.execute(
        "UPDATE lecture_analytics SET updated_at = ?2 WHERE lecture_id = ?1",
        params![lecture_id.as_str(), now],
    )?;
    Ok(())
}

fn read_record(tx: &Transaction<'_>, lecture_id: &LectureId) -> Result<AnalyticsRecord, DbError> {
    let row = tx
        .query_row(
            "
            SELECT total_views, total_watch_time_sec, duration_sec, created_at, updated_at
            FROM lecture_analytics
            WHERE lecture_id = ?
            ",
            params![lecture_id.as_str()],
            |row| {
                Ok((
                    row.get::<_, u64>(0)?,
                    row.get::<_, u64>(1)?,
                    row.get::<_, Option<u32>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let mut record = AnalyticsRecord::empty(lecture_id.clone());
    let Some((total_views, total_watch_time_sec, duration_sec, created_at, updated_at)) = row
    else {
        return Ok(record);
    };
    record.total_views = total_views;
    record.total_watch_time_sec = total_watch_time_sec;
    record.duration_sec = duration_sec;
    record.created_at = Some(parse_timestamp(&created_at, lecture_id.as_str())?);
    record.updated_at = Some(parse_timestamp(&updated_at, lecture_id.as_str())?);

    let mut stmt = tx.prepare(
        "
        SELECT second, avg_score, samples
        FROM attention_buckets
        WHERE lecture_id = ?
        ORDER BY second
        ",
    )?;
    let buckets = stmt.query_map(params![lecture_id.as_str()], |row| {
        Ok((
            row.get::<_, u32>(0)?,
            AttentionPoint {
                avg_score: row.get(1)?,
                samples: row.get(2)?,
            },
        ))
    })?;
    for bucket in buckets {
        let (second, point) = bucket?;
        record.attention_timeline.insert(second, point);
    }
    Ok(record)
}

fn parse_lecture_id(value: String) -> Result<LectureId, DbError> {
    LectureId::new(value.clone()).map_err(|source| DbError::InvalidLectureId { value, source })
}

fn parse_timestamp(timestamp: &str, lecture_id: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            lecture_id: lecture_id.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

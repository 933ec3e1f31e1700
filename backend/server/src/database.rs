//! # SQLite
//!
//! Durable store for proposals, votes and pending submissions.
//!
//! ## Tables
//! - `proposals`: one row per normalized model id (unique index)
//! - `votes`: `(proposal_id, voter_email)` primary key, insert only
//! - `pending_submissions`: one row per submission until verified or swept
//!
//! ## Access
//! One connection behind a mutex, WAL mode. Async callers go through
//! [`ProposalDb::call`], which runs the closure on the blocking pool. Writes
//! that span several statements open an immediate transaction so that the
//! write lock is held from the first read.
use std::{
    path::Path,
    str::FromStr,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};
use tracing::info;

use crate::{
    error::AppError,
    payloads::{Proposal, ProposalMode, ProposalStatus, SubmissionPayload},
};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS proposals (
      id TEXT PRIMARY KEY,
      model_id TEXT NOT NULL,
      model_key TEXT NOT NULL UNIQUE,
      submitter_email TEXT NOT NULL,
      reason TEXT,
      votes INTEGER NOT NULL DEFAULT 0 CHECK (votes >= 0),
      status TEXT NOT NULL DEFAULT 'pending',
      mode TEXT NOT NULL DEFAULT 'raw',
      created_at_ms INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS votes (
      proposal_id TEXT NOT NULL REFERENCES proposals(id),
      voter_email TEXT NOT NULL,
      created_at_ms INTEGER NOT NULL,
      PRIMARY KEY (proposal_id, voter_email)
    );

    CREATE TABLE IF NOT EXISTS pending_submissions (
      id TEXT PRIMARY KEY,
      email TEXT NOT NULL,
      payload_json TEXT NOT NULL,
      verification_token TEXT UNIQUE,
      consumed_token TEXT UNIQUE,
      is_verified INTEGER NOT NULL DEFAULT 0,
      created_at_ms INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_proposals_mode ON proposals(mode);
"#;

#[derive(Clone, Debug, PartialEq)]
pub struct PendingSubmission {
    pub id: String,
    pub email: String,
    pub payload: SubmissionPayload,
    pub verification_token: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

pub struct ProposalDb {
    conn: Mutex<Connection>,
}

impl ProposalDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        info!("Opening SQLite database at {}", path.display());

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AppError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs `f` with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut Connection) -> Result<T, AppError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| AppError::InternalError(format!("Lock poisoned: {e}")))?;

        f(&mut conn)
    }

    /// [`ProposalDb::with_conn`] on the blocking pool.
    pub async fn call<F, T>(self: &Arc<Self>, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut Connection) -> Result<T, AppError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(self);

        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| AppError::InternalError(format!("Database task failed: {e}")))?
    }
}

pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

pub fn proposal_exists(conn: &Connection, model_key: &str) -> Result<bool, AppError> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM proposals WHERE model_key = ?1",
            params![model_key],
            |_| Ok(()),
        )
        .optional()?
        .is_some();

    Ok(exists)
}

/// Ids from `ids` with no proposal row, in input order.
pub fn missing_proposals(conn: &Connection, ids: &[String]) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare_cached("SELECT 1 FROM proposals WHERE id = ?1")?;
    let mut missing = Vec::new();

    for id in ids {
        if !stmt.exists(params![id])? {
            missing.push(id.clone());
        }
    }

    Ok(missing)
}

/// Reads a text column through `FromStr`, failing the row on unknown values.
fn parse_column<T: FromStr<Err = String>>(row: &Row<'_>, name: &str) -> rusqlite::Result<T> {
    let value: String = row.get(name)?;

    value.parse().map_err(|e: String| {
        let index = row.as_ref().column_index(name).unwrap_or_default();
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, e.into())
    })
}

fn proposal_from_row(row: &Row<'_>) -> rusqlite::Result<Proposal> {
    Ok(Proposal {
        id: row.get("id")?,
        model_id: row.get("model_id")?,
        submitter_email: row.get("submitter_email")?,
        reason: row.get("reason")?,
        votes: row.get("votes")?,
        status: parse_column(row, "status")?,
        mode: parse_column(row, "mode")?,
        created_at: from_millis(row.get("created_at_ms")?),
    })
}

pub fn get_proposal(conn: &Connection, id: &str) -> Result<Option<Proposal>, AppError> {
    let proposal = conn
        .query_row(
            "SELECT * FROM proposals WHERE id = ?1",
            params![id],
            proposal_from_row,
        )
        .optional()?;

    Ok(proposal)
}

pub fn list_proposals(conn: &Connection, mode: Option<ProposalMode>) -> Result<Vec<Proposal>, AppError> {
    let mut stmt = conn.prepare_cached(
        "SELECT * FROM proposals
         WHERE ?1 IS NULL OR mode = ?1
         ORDER BY votes DESC, created_at_ms ASC, id ASC",
    )?;

    let rows = stmt.query_map(params![mode.map(|m| m.as_str())], proposal_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn insert_proposal(conn: &Connection, proposal: &Proposal) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO proposals
           (id, model_id, model_key, submitter_email, reason, votes, status, mode, created_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            proposal.id,
            proposal.model_id,
            crate::utils::normalize_model_id(&proposal.model_id),
            proposal.submitter_email,
            proposal.reason,
            proposal.votes,
            proposal.status.as_str(),
            proposal.mode.as_str(),
            to_millis(proposal.created_at),
        ],
    )?;

    Ok(())
}

/// Inserts a vote row. Returns `false` when the voter already voted.
pub fn insert_vote(
    conn: &Connection,
    proposal_id: &str,
    voter_email: &str,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO votes (proposal_id, voter_email, created_at_ms) VALUES (?1, ?2, ?3)",
        params![proposal_id, voter_email, to_millis(now)],
    )?;

    Ok(inserted == 1)
}

pub fn increment_votes(conn: &Connection, proposal_id: &str) -> Result<(), AppError> {
    conn.execute(
        "UPDATE proposals SET votes = votes + 1 WHERE id = ?1",
        params![proposal_id],
    )?;

    Ok(())
}

pub fn has_vote(conn: &Connection, proposal_id: &str, voter_email: &str) -> Result<bool, AppError> {
    let mut stmt =
        conn.prepare_cached("SELECT 1 FROM votes WHERE proposal_id = ?1 AND voter_email = ?2")?;

    Ok(stmt.exists(params![proposal_id, voter_email])?)
}

pub fn insert_pending(conn: &Connection, pending: &PendingSubmission) -> Result<(), AppError> {
    let payload_json = serde_json::to_string(&pending.payload)
        .map_err(|e| AppError::InternalError(format!("Encoding payload: {e}")))?;

    conn.execute(
        "INSERT INTO pending_submissions
           (id, email, payload_json, verification_token, is_verified, created_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            pending.id,
            pending.email,
            payload_json,
            pending.verification_token,
            pending.is_verified,
            to_millis(pending.created_at),
        ],
    )?;

    Ok(())
}

/// Looks a submission up by a live token or by the token it was consumed with.
pub fn find_pending_by_token(conn: &Connection, token: &str) -> Result<Option<PendingSubmission>, AppError> {
    let row = conn
        .query_row(
            "SELECT id, email, payload_json, verification_token, is_verified, created_at_ms
             FROM pending_submissions
             WHERE verification_token = ?1 OR consumed_token = ?1",
            params![token],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((id, email, payload_json, verification_token, is_verified, created_at_ms)) = row else {
        return Ok(None);
    };

    let payload = serde_json::from_str(&payload_json)
        .map_err(|e| AppError::InternalError(format!("Decoding payload of {id}: {e}")))?;

    Ok(Some(PendingSubmission {
        id,
        email,
        payload,
        verification_token,
        is_verified,
        created_at: from_millis(created_at_ms),
    }))
}

/// Flips a submission to verified if nobody else did first.
///
/// Returns `false` when the row was already consumed (or is gone).
pub fn consume_pending(conn: &Connection, id: &str, token: &str) -> Result<bool, AppError> {
    let updated = conn.execute(
        "UPDATE pending_submissions
         SET is_verified = 1, verification_token = NULL, consumed_token = ?2
         WHERE id = ?1 AND is_verified = 0",
        params![id, token],
    )?;

    Ok(updated == 1)
}

pub fn delete_pending(conn: &Connection, id: &str) -> Result<(), AppError> {
    conn.execute("DELETE FROM pending_submissions WHERE id = ?1", params![id])?;
    Ok(())
}

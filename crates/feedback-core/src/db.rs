//! SQLite persistence for feedback sessions.

use crate::Result;
use crate::codec::FeedbackDocument;
use chrono::{DateTime, Utc};
use feedback_types::{Session, SessionId, SessionStatus};
use rusqlite::{Connection, params};
use std::path::Path;
use uuid::Uuid;

/// SQLite-backed session table.
///
/// Owned by the session store actor; never shared between threads.
pub struct SessionDb {
    conn: Connection,
}

impl SessionDb {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Self {
            conn: Connection::open(path)?,
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS feedback_sessions (
                id TEXT PRIMARY KEY,
                project_directory TEXT NOT NULL,
                summary TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_heartbeat TEXT NOT NULL,
                status TEXT NOT NULL,
                feedback_result TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_feedback_sessions_heartbeat
                ON feedback_sessions(last_heartbeat);
            "#,
        )?;
        Ok(())
    }

    /// Insert or replace a session row.
    pub fn upsert(&self, session: &Session) -> Result<()> {
        let feedback_json = session
            .feedback_result
            .as_ref()
            .map(|r| serde_json::to_string(&FeedbackDocument::from_result(r)))
            .transpose()?;

        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO feedback_sessions (
                id, project_directory, summary, created_at, last_heartbeat, status, feedback_result
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                session.id.to_string(),
                session.project_directory.to_string_lossy(),
                session.summary,
                session.created_at.to_rfc3339(),
                session.last_heartbeat.to_rfc3339(),
                session.status.as_str(),
                feedback_json,
            ],
        )?;
        Ok(())
    }

    /// Write a batch of heartbeat timestamps in one transaction.
    pub fn update_heartbeats(&mut self, beats: &[(SessionId, DateTime<Utc>)]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("UPDATE feedback_sessions SET last_heartbeat = ?1 WHERE id = ?2")?;
            for (id, at) in beats {
                stmt.execute(params![at.to_rfc3339(), id.to_string()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete a set of sessions in one transaction.
    pub fn delete_many(&mut self, ids: &[SessionId]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM feedback_sessions WHERE id = ?1")?;
            for id in ids {
                stmt.execute(params![id.to_string()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Load every stored session, oldest first.
    pub fn load_all(&self) -> Result<Vec<Session>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM feedback_sessions ORDER BY created_at ASC")?;
        let sessions = stmt
            .query_map([], |row| Self::row_to_session(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
        let id: String = row.get("id")?;
        let project_directory: String = row.get("project_directory")?;
        let summary: String = row.get("summary")?;
        let created_at: String = row.get("created_at")?;
        let last_heartbeat: String = row.get("last_heartbeat")?;
        let status: String = row.get("status")?;
        let feedback_result: Option<String> = row.get("feedback_result")?;

        Ok(Session {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            project_directory: project_directory.into(),
            summary,
            created_at: parse_timestamp(&created_at),
            last_heartbeat: parse_timestamp(&last_heartbeat),
            status: status.parse().unwrap_or(SessionStatus::Expired),
            feedback_result: feedback_result
                .and_then(|json| serde_json::from_str::<FeedbackDocument>(&json).ok())
                .map(FeedbackDocument::into_result),
        })
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

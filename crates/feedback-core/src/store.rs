//! Session store actor.
//!
//! A single task owns the session table and its SQLite backing. Everything
//! else talks to it through [`SessionStore`], a cheap cloneable handle that
//! sends commands and awaits replies. Because only the actor mutates the
//! table, every snapshot it hands out is complete and heartbeat sweeps and
//! cleanups never interleave.

use crate::codec;
use crate::db::SessionDb;
use crate::{FeedbackError, Result};
use chrono::{DateTime, Utc};
use feedback_types::{FeedbackResult, Session, SessionId, SessionStatus};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 64;

/// Default spacing between heartbeat sweeps.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Sessions silent for longer than this are no longer listed as active, and
/// waiting sessions found at startup past this age are timed out.
pub const ACTIVITY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// How long a session may wait for feedback, counted from creation.
pub const WAITING_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for the session store.
#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    /// SQLite file; `None` keeps sessions in memory only.
    pub db_path: Option<PathBuf>,
    pub heartbeat_interval: Duration,
    pub activity_window: Duration,
    /// Waiting sessions older than this are timed out by the heartbeat sweep.
    pub waiting_window: Duration,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            db_path: dirs::cache_dir().map(|dir| dir.join("feedback-bridge").join("sessions.db")),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            activity_window: ACTIVITY_WINDOW,
            waiting_window: WAITING_WINDOW,
        }
    }
}

enum SessionCommand {
    Create {
        project_directory: PathBuf,
        summary: String,
        reply: oneshot::Sender<SessionId>,
    },
    UpdateFeedback {
        id: SessionId,
        result: FeedbackResult,
        reply: oneshot::Sender<Result<()>>,
    },
    UpdateLatestFeedback {
        result: FeedbackResult,
        reply: oneshot::Sender<Option<SessionId>>,
    },
    MarkStatus {
        id: SessionId,
        status: SessionStatus,
        reply: oneshot::Sender<Result<()>>,
    },
    Restore {
        id: SessionId,
        reply: oneshot::Sender<Option<Session>>,
    },
    Cleanup {
        max_age: chrono::Duration,
        reply: oneshot::Sender<Result<usize>>,
    },
    ListActive {
        reply: oneshot::Sender<Vec<Session>>,
    },
    StartHeartbeat {
        reply: oneshot::Sender<bool>,
    },
    HeartbeatRunning {
        reply: oneshot::Sender<bool>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the session store actor.
#[derive(Clone)]
pub struct SessionStore {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionStore {
    /// Open the store, restoring persisted sessions, and spawn its actor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: SessionStoreConfig) -> Result<Self> {
        let db = match &config.db_path {
            Some(path) => Some(SessionDb::open(path)?),
            None => None,
        };
        let sessions = match &db {
            Some(db) => db.load_all()?,
            None => Vec::new(),
        };
        Ok(Self::spawn(sessions, db, &config))
    }

    /// Store without disk persistence.
    pub fn in_memory() -> Self {
        let config = SessionStoreConfig {
            db_path: None,
            ..Default::default()
        };
        Self::spawn(Vec::new(), None, &config)
    }

    fn spawn(sessions: Vec<Session>, db: Option<SessionDb>, config: &SessionStoreConfig) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut actor = SessionActor {
            sessions,
            db,
            heartbeat: None,
            heartbeat_interval: config.heartbeat_interval,
            activity_window: to_chrono(config.activity_window),
            waiting_window: to_chrono(config.waiting_window),
            rx,
        };
        actor.time_out_orphans();
        tokio::spawn(actor.run());

        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| FeedbackError::StoreUnavailable)?;
        reply_rx.await.map_err(|_| FeedbackError::StoreUnavailable)
    }

    /// Allocate a new session waiting for feedback.
    pub async fn create_persistent_session(
        &self,
        project_directory: &Path,
        summary: &str,
    ) -> Result<SessionId> {
        self.request(|reply| SessionCommand::Create {
            project_directory: project_directory.to_path_buf(),
            summary: summary.to_string(),
            reply,
        })
        .await
    }

    /// Attach feedback to a session and mark it completed.
    pub async fn update_session_feedback(&self, id: SessionId, result: FeedbackResult) -> Result<()> {
        self.request(|reply| SessionCommand::UpdateFeedback { id, result, reply })
            .await?
    }

    /// Attach feedback to the most recently created open session.
    ///
    /// Returns the session that received it, or `None` (and does nothing)
    /// when no session is open. Prefer [`Self::update_session_feedback`].
    pub async fn update_latest_session_feedback(
        &self,
        result: FeedbackResult,
    ) -> Result<Option<SessionId>> {
        self.request(|reply| SessionCommand::UpdateLatestFeedback { result, reply })
            .await
    }

    /// Move a session forward in its lifecycle.
    pub async fn mark_session_status(&self, id: SessionId, status: SessionStatus) -> Result<()> {
        self.request(|reply| SessionCommand::MarkStatus { id, status, reply })
            .await?
    }

    /// Snapshot of a session, `None` if it is unknown.
    pub async fn restore_session(&self, id: SessionId) -> Result<Option<Session>> {
        self.request(|reply| SessionCommand::Restore { id, reply }).await
    }

    /// Remove every session whose last heartbeat is at least `max_age_hours` old.
    ///
    /// Returns how many sessions were removed.
    pub async fn cleanup_old_sessions(&self, max_age_hours: u64) -> Result<usize> {
        let max_age = i64::try_from(max_age_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .unwrap_or(chrono::Duration::MAX);
        self.request(|reply| SessionCommand::Cleanup { max_age, reply })
            .await?
    }

    /// Sessions with a heartbeat inside the activity window, oldest first.
    pub async fn get_active_sessions(&self) -> Result<Vec<Session>> {
        self.request(|reply| SessionCommand::ListActive { reply }).await
    }

    /// Start the heartbeat sweep. Returns `false` if it was already running.
    pub async fn start_heartbeat(&self) -> Result<bool> {
        self.request(|reply| SessionCommand::StartHeartbeat { reply })
            .await
    }

    pub async fn is_heartbeat_running(&self) -> Result<bool> {
        self.request(|reply| SessionCommand::HeartbeatRunning { reply })
            .await
    }

    /// Stop the actor. Later calls fail with `StoreUnavailable`.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Shutdown { reply }).await
    }
}

struct SessionActor {
    /// Sessions in creation order.
    sessions: Vec<Session>,
    db: Option<SessionDb>,
    heartbeat: Option<Interval>,
    heartbeat_interval: Duration,
    activity_window: chrono::Duration,
    waiting_window: chrono::Duration,
    rx: mpsc::Receiver<SessionCommand>,
}

impl SessionActor {
    async fn run(mut self) {
        debug!(target: "feedback::session", "Session store started with {} sessions", self.sessions.len());

        loop {
            tokio::select! {
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Shutdown { reply }) => {
                            let _ = reply.send(());
                            break;
                        }
                        Some(cmd) => self.handle(cmd),
                        None => break,
                    }
                }
                _ = next_beat(&mut self.heartbeat) => self.sweep_heartbeats(),
            }
        }

        debug!(target: "feedback::session", "Session store stopped");
    }

    fn handle(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Create {
                project_directory,
                summary,
                reply,
            } => {
                let _ = reply.send(self.create(project_directory, summary));
            }
            SessionCommand::UpdateFeedback { id, result, reply } => {
                let _ = reply.send(self.complete(id, result));
            }
            SessionCommand::UpdateLatestFeedback { result, reply } => {
                let latest = self
                    .sessions
                    .iter()
                    .rev()
                    .find(|s| !s.status.is_terminal())
                    .map(|s| s.id);
                let outcome = match latest {
                    Some(id) => self.complete(id, result).ok().map(|_| id),
                    None => {
                        debug!(target: "feedback::session", "No open session to attach feedback to");
                        None
                    }
                };
                let _ = reply.send(outcome);
            }
            SessionCommand::MarkStatus { id, status, reply } => {
                let _ = reply.send(self.transition(id, status).map(|_| ()));
            }
            SessionCommand::Restore { id, reply } => {
                let _ = reply.send(self.sessions.iter().find(|s| s.id == id).cloned());
            }
            SessionCommand::Cleanup { max_age, reply } => {
                let _ = reply.send(self.cleanup(max_age));
            }
            SessionCommand::ListActive { reply } => {
                let now = Utc::now();
                let active = self
                    .sessions
                    .iter()
                    .filter(|s| s.age_at(now) < self.activity_window)
                    .cloned()
                    .collect();
                let _ = reply.send(active);
            }
            SessionCommand::StartHeartbeat { reply } => {
                let started = self.heartbeat.is_none();
                if started {
                    let mut interval = interval_at(
                        Instant::now() + self.heartbeat_interval,
                        self.heartbeat_interval,
                    );
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.heartbeat = Some(interval);
                    info!(
                        target: "feedback::session",
                        "Heartbeat started (every {:?})",
                        self.heartbeat_interval
                    );
                }
                let _ = reply.send(started);
            }
            SessionCommand::HeartbeatRunning { reply } => {
                let _ = reply.send(self.heartbeat.is_some());
            }
            SessionCommand::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn create(&mut self, project_directory: PathBuf, summary: String) -> SessionId {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            project_directory,
            summary,
            created_at: now,
            last_heartbeat: now,
            status: SessionStatus::WaitingFeedback,
            feedback_result: None,
        };

        self.persist(&session);
        let id = session.id;
        self.sessions.push(session);

        info!(target: "feedback::session", "Created persistent session {}", id);
        id
    }

    fn complete(&mut self, id: SessionId, result: FeedbackResult) -> Result<()> {
        let canonical = codec::canonicalize(&result);
        let session = self.transition(id, SessionStatus::Completed)?;
        session.feedback_result = Some(canonical);
        let snapshot = session.clone();
        self.persist(&snapshot);

        info!(target: "feedback::session", "Session {} feedback recorded", id);
        Ok(())
    }

    /// Apply a forward transition and persist it.
    fn transition(&mut self, id: SessionId, to: SessionStatus) -> Result<&mut Session> {
        let index = self
            .sessions
            .iter()
            .position(|s| s.id == id)
            .ok_or(FeedbackError::SessionNotFound(id))?;

        let from = self.sessions[index].status;
        if !from.can_transition_to(to) {
            return Err(FeedbackError::InvalidTransition { id, from, to });
        }

        self.sessions[index].status = to;
        let snapshot = self.sessions[index].clone();
        self.persist(&snapshot);
        debug!(target: "feedback::session", "Session {} {} -> {}", id, from, to);

        Ok(&mut self.sessions[index])
    }

    /// Disk first: a failed delete leaves the table untouched.
    fn cleanup(&mut self, max_age: chrono::Duration) -> Result<usize> {
        let now = Utc::now();
        let ids: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|s| s.age_at(now) >= max_age)
            .map(|s| s.id)
            .collect();

        if ids.is_empty() {
            return Ok(0);
        }

        if let Some(db) = self.db.as_mut() {
            db.delete_many(&ids).inspect_err(|e| {
                warn!(target: "feedback::session", "Failed to delete sessions from database: {}", e);
            })?;
        }
        self.sessions.retain(|s| !ids.contains(&s.id));

        info!(
            target: "feedback::session",
            "Cleaned up {} sessions older than {} hours",
            ids.len(),
            max_age.num_hours()
        );
        Ok(ids.len())
    }

    fn sweep_heartbeats(&mut self) {
        let now = Utc::now();
        self.time_out_overdue(now);

        let mut beats: Vec<(SessionId, DateTime<Utc>)> = Vec::new();

        for session in self
            .sessions
            .iter_mut()
            .filter(|s| s.status == SessionStatus::WaitingFeedback)
        {
            session.last_heartbeat = session.last_heartbeat.max(now);
            beats.push((session.id, session.last_heartbeat));
        }

        if beats.is_empty() {
            return;
        }

        if let Some(db) = self.db.as_mut() {
            if let Err(e) = db.update_heartbeats(&beats) {
                warn!(target: "feedback::session", "Failed to persist heartbeats: {}", e);
            }
        }
        debug!(target: "feedback::session::heartbeat", "Heartbeat refreshed {} sessions", beats.len());
    }

    /// Nothing answers a session once its waiting window has passed, so it
    /// stops receiving heartbeats and ages out like any finished session.
    fn time_out_overdue(&mut self, now: DateTime<Utc>) {
        let window = self.waiting_window;
        let overdue: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|s| {
                s.status == SessionStatus::WaitingFeedback
                    && now.signed_duration_since(s.created_at) >= window
            })
            .map(|s| s.id)
            .collect();

        for id in &overdue {
            if let Err(e) = self.transition(*id, SessionStatus::TimedOut) {
                warn!(target: "feedback::session", "Failed to time out session {}: {}", id, e);
            }
        }

        if !overdue.is_empty() {
            info!(
                target: "feedback::session::heartbeat",
                "Timed out {} sessions past the waiting window",
                overdue.len()
            );
        }
    }

    /// Waiting sessions restored from disk whose heartbeat lapsed can no
    /// longer be answered; mark them timed out.
    fn time_out_orphans(&mut self) {
        let now = Utc::now();
        let window = self.activity_window;
        let orphaned: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|s| s.status == SessionStatus::WaitingFeedback && s.age_at(now) >= window)
            .map(|s| s.id)
            .collect();

        for id in &orphaned {
            if let Err(e) = self.transition(*id, SessionStatus::TimedOut) {
                warn!(target: "feedback::session", "Failed to time out orphaned session {}: {}", id, e);
            }
        }

        if !orphaned.is_empty() {
            info!(target: "feedback::session", "Timed out {} orphaned sessions", orphaned.len());
        }
    }

    fn persist(&self, session: &Session) {
        if let Some(db) = &self.db {
            if let Err(e) = db.upsert(session) {
                warn!(target: "feedback::session", "Failed to persist session {}: {}", session.id, e);
            }
        }
    }
}

async fn next_beat(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedback_types::{ImageAttachment, ImagePayload};
    use tempfile::TempDir;

    fn sample_result() -> FeedbackResult {
        FeedbackResult {
            interactive_feedback: Some("Looks good, but rename the flag".into()),
            command_logs: Some("$ make test\nall passed".into()),
            images: vec![
                ImageAttachment::from_bytes("first.png", vec![1, 2, 3]),
                ImageAttachment::from_base64("second.jpg", 2, "BAU="),
            ],
        }
    }

    fn old_session(hours: i64, status: SessionStatus) -> Session {
        let then = Utc::now() - chrono::Duration::hours(hours);
        Session {
            id: Uuid::new_v4(),
            project_directory: "/srv/project".into(),
            summary: "old work".into(),
            created_at: then,
            last_heartbeat: then,
            status,
            feedback_result: None,
        }
    }

    #[tokio::test]
    async fn test_create_update_restore() {
        let store = SessionStore::in_memory();
        let id = store
            .create_persistent_session(Path::new("/tmp/project"), "Added caching")
            .await
            .unwrap();

        let session = store.restore_session(id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::WaitingFeedback);
        assert_eq!(session.created_at, session.last_heartbeat);
        assert_eq!(session.summary, "Added caching");

        store.update_session_feedback(id, sample_result()).await.unwrap();

        let session = store.restore_session(id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        let result = session.feedback_result.unwrap();
        assert_eq!(
            result.interactive_feedback.as_deref(),
            Some("Looks good, but rename the flag")
        );
        assert_eq!(result.command_logs.as_deref(), Some("$ make test\nall passed"));

        let names: Vec<&str> = result.images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["first.png", "second.jpg"]);
        let bytes: Vec<Vec<u8>> = result
            .images
            .iter()
            .map(|i| codec::decode(i).unwrap())
            .collect();
        assert_eq!(bytes, vec![vec![1, 2, 3], vec![4, 5]]);
    }

    #[tokio::test]
    async fn test_session_ids_are_unique() {
        let store = SessionStore::in_memory();
        let a = store.create_persistent_session(Path::new("/a"), "a").await.unwrap();
        let b = store.create_persistent_session(Path::new("/b"), "b").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_restore_unknown_is_none() {
        let store = SessionStore::in_memory();
        assert!(store.restore_session(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_unknown_session_is_not_found() {
        let store = SessionStore::in_memory();
        let err = store
            .update_session_feedback(Uuid::new_v4(), sample_result())
            .await
            .unwrap_err();
        assert!(matches!(err, FeedbackError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_completed_session_cannot_move_back() {
        let store = SessionStore::in_memory();
        let id = store.create_persistent_session(Path::new("/p"), "s").await.unwrap();
        store.update_session_feedback(id, sample_result()).await.unwrap();

        let err = store
            .update_session_feedback(id, FeedbackResult::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FeedbackError::InvalidTransition { .. }));

        let err = store
            .mark_session_status(id, SessionStatus::Expired)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedbackError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_update_latest_targets_newest_open_session() {
        let store = SessionStore::in_memory();
        assert_eq!(
            store
                .update_latest_session_feedback(sample_result())
                .await
                .unwrap(),
            None
        );

        let first = store.create_persistent_session(Path::new("/p"), "one").await.unwrap();
        let second = store.create_persistent_session(Path::new("/p"), "two").await.unwrap();

        let target = store
            .update_latest_session_feedback(sample_result())
            .await
            .unwrap();
        assert_eq!(target, Some(second));

        let first_session = store.restore_session(first).await.unwrap().unwrap();
        assert_eq!(first_session.status, SessionStatus::WaitingFeedback);
    }

    #[tokio::test]
    async fn test_cleanup_zero_removes_everything() {
        let store = SessionStore::in_memory();
        for i in 0..3 {
            store
                .create_persistent_session(Path::new("/p"), &format!("s{}", i))
                .await
                .unwrap();
        }

        let removed = store.cleanup_old_sessions(0).await.unwrap();
        assert_eq!(removed, 3);
        assert!(store.get_active_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_respects_threshold_and_persists() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("sessions.db");
        let stale = old_session(48, SessionStatus::Completed);
        let recent = old_session(2, SessionStatus::Completed);
        {
            let db = SessionDb::open(&db_path).unwrap();
            db.upsert(&stale).unwrap();
            db.upsert(&recent).unwrap();
        }

        let config = SessionStoreConfig {
            db_path: Some(db_path.clone()),
            ..Default::default()
        };
        let store = SessionStore::open(config).unwrap();
        assert_eq!(store.cleanup_old_sessions(24).await.unwrap(), 1);

        let now = Utc::now();
        let remaining = store.get_active_sessions().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining.iter().all(|s| s.age_at(now) < chrono::Duration::hours(24)));
        assert!(store.restore_session(stale.id).await.unwrap().is_none());

        store.shutdown().await.unwrap();
        let reloaded = SessionDb::open(&db_path).unwrap().load_all().unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].id, recent.id);
    }

    #[tokio::test]
    async fn test_restores_sessions_and_times_out_orphans() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("sessions.db");
        let orphan = old_session(30, SessionStatus::WaitingFeedback);
        let waiting = old_session(1, SessionStatus::WaitingFeedback);
        {
            let db = SessionDb::open(&db_path).unwrap();
            db.upsert(&orphan).unwrap();
            db.upsert(&waiting).unwrap();
        }

        let store = SessionStore::open(SessionStoreConfig {
            db_path: Some(db_path),
            ..Default::default()
        })
        .unwrap();

        let orphan = store.restore_session(orphan.id).await.unwrap().unwrap();
        assert_eq!(orphan.status, SessionStatus::TimedOut);
        let waiting = store.restore_session(waiting.id).await.unwrap().unwrap();
        assert_eq!(waiting.status, SessionStatus::WaitingFeedback);

        let active = store.get_active_sessions().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, waiting.id);
    }

    #[tokio::test]
    async fn test_feedback_persisted_as_base64() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("sessions.db");
        let store = SessionStore::open(SessionStoreConfig {
            db_path: Some(db_path.clone()),
            ..Default::default()
        })
        .unwrap();

        let id = store.create_persistent_session(Path::new("/p"), "s").await.unwrap();
        store.update_session_feedback(id, sample_result()).await.unwrap();
        store.shutdown().await.unwrap();

        let reloaded = SessionDb::open(&db_path).unwrap().load_all().unwrap();
        let images = &reloaded[0].feedback_result.as_ref().unwrap().images;
        assert_eq!(images[0].data, Some(ImagePayload::Base64("AQID".into())));
    }

    #[tokio::test]
    async fn test_heartbeat_is_idempotent_and_refreshes_waiting_sessions() {
        let store = SessionStore::open(SessionStoreConfig {
            db_path: None,
            heartbeat_interval: Duration::from_millis(20),
            ..Default::default()
        })
        .unwrap();

        let waiting = store.create_persistent_session(Path::new("/p"), "w").await.unwrap();
        let done = store.create_persistent_session(Path::new("/p"), "d").await.unwrap();
        store.update_session_feedback(done, FeedbackResult::default()).await.unwrap();

        let waiting_before = store.restore_session(waiting).await.unwrap().unwrap().last_heartbeat;
        let done_before = store.restore_session(done).await.unwrap().unwrap().last_heartbeat;

        assert!(!store.is_heartbeat_running().await.unwrap());
        assert!(store.start_heartbeat().await.unwrap());
        assert!(!store.start_heartbeat().await.unwrap());
        assert!(store.is_heartbeat_running().await.unwrap());

        tokio::time::sleep(Duration::from_millis(120)).await;

        let waiting_after = store.restore_session(waiting).await.unwrap().unwrap().last_heartbeat;
        let done_after = store.restore_session(done).await.unwrap().unwrap().last_heartbeat;
        assert!(waiting_after > waiting_before);
        assert_eq!(done_after, done_before);
    }

    #[tokio::test]
    async fn test_heartbeat_times_out_sessions_past_waiting_window() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("sessions.db");
        let mut overdue = old_session(48, SessionStatus::WaitingFeedback);
        overdue.last_heartbeat = Utc::now() - chrono::Duration::hours(23);
        let fresh = old_session(1, SessionStatus::WaitingFeedback);
        {
            let db = SessionDb::open(&db_path).unwrap();
            db.upsert(&overdue).unwrap();
            db.upsert(&fresh).unwrap();
        }

        let store = SessionStore::open(SessionStoreConfig {
            db_path: Some(db_path.clone()),
            heartbeat_interval: Duration::from_millis(20),
            ..Default::default()
        })
        .unwrap();
        // Heartbeat still inside the activity window, so startup keeps it waiting.
        let before = store.restore_session(overdue.id).await.unwrap().unwrap();
        assert_eq!(before.status, SessionStatus::WaitingFeedback);

        store.start_heartbeat().await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        let after = store.restore_session(overdue.id).await.unwrap().unwrap();
        assert_eq!(after.status, SessionStatus::TimedOut);
        assert_eq!(after.last_heartbeat, before.last_heartbeat);
        let fresh_after = store.restore_session(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh_after.status, SessionStatus::WaitingFeedback);
        assert!(fresh_after.last_heartbeat > fresh.last_heartbeat);

        // No longer refreshed, so it ages out once its heartbeat passes the cutoff.
        assert_eq!(store.cleanup_old_sessions(23).await.unwrap(), 1);
        assert!(store.restore_session(overdue.id).await.unwrap().is_none());

        store.shutdown().await.unwrap();
        let reloaded = SessionDb::open(&db_path).unwrap().load_all().unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].id, fresh.id);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_sessions_when_delete_fails() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("sessions.db");
        let stale = old_session(48, SessionStatus::Completed);
        {
            let db = SessionDb::open(&db_path).unwrap();
            db.upsert(&stale).unwrap();
        }

        let store = SessionStore::open(SessionStoreConfig {
            db_path: Some(db_path.clone()),
            ..Default::default()
        })
        .unwrap();
        rusqlite::Connection::open(&db_path)
            .unwrap()
            .execute_batch("DROP TABLE feedback_sessions")
            .unwrap();

        let err = store.cleanup_old_sessions(24).await.unwrap_err();
        assert!(matches!(err, FeedbackError::Database(_)));
        assert!(store.restore_session(stale.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_shutdown_makes_store_unavailable() {
        let store = SessionStore::in_memory();
        store.shutdown().await.unwrap();
        let err = store.get_active_sessions().await.unwrap_err();
        assert!(matches!(err, FeedbackError::StoreUnavailable));
    }
}

//! Session and artifact storage.
//!
//! A session is created at upload time and holds everything the later stages need:
//! the original source bytes, the extracted document, and the analysis. Clients carry
//! only the session id between requests.
//!
//! Exported artifacts live under the work directory as `<session-id>-<artifact-id>.<ext>`,
//! so concurrent sessions never share a path, whatever the uploaded filename was.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::document::format::{Exported, SourceFormat};
use crate::errors::AppError;
use crate::tailoring::models::AnalysisResult;
use crate::tailoring::orchestrator::{ExtractedResume, PipelineStage};

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub filename: String,
    /// Original upload, kept as the export template.
    pub source: Bytes,
    pub job_description: String,
    pub resume: ExtractedResume,
    pub analysis: AnalysisResult,
    pub stage: PipelineStage,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        filename: String,
        source: Bytes,
        job_description: String,
        resume: ExtractedResume,
        analysis: AnalysisResult,
    ) -> Self {
        Session {
            id: Uuid::new_v4(),
            filename,
            source,
            job_description,
            resume,
            analysis,
            stage: PipelineStage::Analyzed,
            created_at: Utc::now(),
        }
    }

    pub fn format(&self) -> SourceFormat {
        self.resume.format
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }
}

/// In-memory session registry. Cloning shares the underlying map.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn insert(&self, session: Session) {
        self.sessions.write().await.insert(session.id, session);
    }

    /// Returns a snapshot of the session. Expired sessions are reported the same way as
    /// unknown ids but stay in the map, so the purge sweep still deletes their artifacts.
    pub async fn get(&self, id: Uuid) -> Result<Session, AppError> {
        let sessions = self.sessions.read().await;
        match sessions.get(&id) {
            Some(session) if !session.is_expired(Utc::now(), self.ttl) => Ok(session.clone()),
            Some(_) => {
                debug!("Session {id} expired; awaiting purge");
                Err(AppError::SessionExpired)
            }
            None => Err(AppError::SessionExpired),
        }
    }

    /// Records progress; stages never move backwards.
    pub async fn advance(&self, id: Uuid, stage: PipelineStage) -> Result<(), AppError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(AppError::SessionExpired)?;
        session.stage = session.stage.max(stage);
        Ok(())
    }

    /// Removes every expired session, returning their ids.
    pub async fn purge_expired(&self) -> Vec<Uuid> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let expired: Vec<Uuid> = sessions
            .values()
            .filter(|session| session.is_expired(now, self.ttl))
            .map(|session| session.id)
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        expired
    }
}

/// Exported files on disk, one directory for all sessions.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ArtifactStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the artifact atomically and returns its name.
    /// Blocking; call from `spawn_blocking`.
    pub fn write(&self, session_id: Uuid, exported: &Exported) -> anyhow::Result<String> {
        let name = format!(
            "{session_id}-{}.{}",
            Uuid::new_v4(),
            exported.format.extension()
        );
        let mut file = tempfile::NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("Failed to create temp file in {}", self.dir.display()))?;
        file.write_all(&exported.bytes)
            .context("Failed to write artifact")?;
        file.persist(self.dir.join(&name))
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to persist artifact {name}"))?;
        Ok(name)
    }

    /// Maps an artifact name from a download URL back to a path inside the work directory.
    /// Anything that is not a name this store could have produced is rejected.
    pub fn resolve(&self, name: &str) -> Option<(PathBuf, SourceFormat)> {
        let (stem, ext) = name.rsplit_once('.')?;
        let format = SourceFormat::from_extension(ext)?;
        let well_formed = stem.len() > 36
            && stem.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
            && Uuid::parse_str(&stem[..36]).is_ok();
        if !well_formed {
            return None;
        }
        Some((self.dir.join(name), format))
    }

    /// Deletes every artifact written for `session_id`, returning how many were removed.
    pub async fn remove_for_session(&self, session_id: Uuid) -> usize {
        let prefix = format!("{session_id}-");
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list work dir {}: {e}", self.dir.display());
                return 0;
            }
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(&prefix) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove artifact {:?}: {e}", name),
            }
        }
        removed
    }
}

/// Evicts expired sessions and deletes their artifacts. Returns the evicted ids.
pub async fn purge_once(sessions: &SessionStore, artifacts: &ArtifactStore) -> Vec<Uuid> {
    let expired = sessions.purge_expired().await;
    for id in &expired {
        let removed = artifacts.remove_for_session(*id).await;
        info!("Session {id} expired; removed {removed} artifacts");
    }
    expired
}

/// Periodically runs [`purge_once`].
pub fn spawn_purge_task(
    sessions: SessionStore,
    artifacts: ArtifactStore,
    period: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            purge_once(&sessions, &artifacts).await;
        }
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tailoring::orchestrator::extract_resume;

    fn session() -> Session {
        let source = Bytes::from_static(b"Managed a team of 5 developers.\n");
        let resume = extract_resume(SourceFormat::PlainText, &source).unwrap();
        Session::new(
            "resume.txt".to_string(),
            source,
            "Engineering manager".to_string(),
            resume,
            AnalysisResult::empty(),
        )
    }

    fn exported(format: SourceFormat, bytes: &[u8]) -> Exported {
        Exported {
            format,
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = SessionStore::new(Duration::minutes(60));
        let session = session();
        let id = session.id;
        store.insert(session).await;

        let found = store.get(id).await.unwrap();
        assert_eq!(found.filename, "resume.txt");
        assert_eq!(found.stage, PipelineStage::Analyzed);
        assert_eq!(found.format(), SourceFormat::PlainText);
    }

    #[tokio::test]
    async fn test_unknown_session_is_expired() {
        let store = SessionStore::new(Duration::minutes(60));
        assert!(matches!(
            store.get(Uuid::new_v4()).await,
            Err(AppError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn test_stale_session_is_rejected_but_left_for_purge() {
        let store = SessionStore::new(Duration::minutes(60));
        let mut session = session();
        session.created_at = Utc::now() - Duration::minutes(61);
        let id = session.id;
        store.insert(session).await;

        assert!(matches!(store.get(id).await, Err(AppError::SessionExpired)));
        assert_eq!(store.purge_expired().await, vec![id]);
        assert!(store.purge_expired().await.is_empty());
    }

    #[tokio::test]
    async fn test_purge_deletes_artifacts_of_session_seen_expired() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::new(dir.path());
        let sessions = SessionStore::new(Duration::minutes(60));
        let mut session = session();
        let id = session.id;
        let name = artifacts
            .write(id, &exported(SourceFormat::PlainText, b"Led a team.\n"))
            .unwrap();
        session.created_at = Utc::now() - Duration::minutes(61);
        sessions.insert(session).await;

        assert!(matches!(sessions.get(id).await, Err(AppError::SessionExpired)));
        assert_eq!(purge_once(&sessions, &artifacts).await, vec![id]);
        assert!(!dir.path().join(name).exists());
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired() {
        let store = SessionStore::new(Duration::minutes(60));
        let fresh = session();
        let mut stale = session();
        stale.created_at = Utc::now() - Duration::hours(3);
        let (fresh_id, stale_id) = (fresh.id, stale.id);
        store.insert(fresh).await;
        store.insert(stale).await;

        assert_eq!(store.purge_expired().await, vec![stale_id]);
        assert!(store.get(fresh_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_stage_never_moves_backwards() {
        let store = SessionStore::new(Duration::minutes(60));
        let session = session();
        let id = session.id;
        store.insert(session).await;

        store.advance(id, PipelineStage::Exported).await.unwrap();
        store.advance(id, PipelineStage::Edited).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().stage, PipelineStage::Exported);
    }

    #[test]
    fn test_artifact_names_are_unique_per_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let session_id = Uuid::new_v4();
        let artifact = exported(SourceFormat::PlainText, b"Led a team.\n");

        let first = store.write(session_id, &artifact).unwrap();
        let second = store.write(session_id, &artifact).unwrap();

        assert_ne!(first, second);
        assert!(first.starts_with(&session_id.to_string()));
        assert!(first.ends_with(".txt"));
        assert_eq!(
            std::fs::read(dir.path().join(&first)).unwrap(),
            b"Led a team.\n"
        );
    }

    #[test]
    fn test_resolve_accepts_only_store_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let name = store
            .write(Uuid::new_v4(), &exported(SourceFormat::Docx, b"PK"))
            .unwrap();

        let (path, format) = store.resolve(&name).unwrap();
        assert_eq!(path, dir.path().join(&name));
        assert_eq!(format, SourceFormat::Docx);

        assert!(store.resolve("../../etc/passwd.txt").is_none());
        assert!(store.resolve("resume.docx").is_none());
        assert!(store.resolve(&name.replace(".docx", ".exe")).is_none());
    }

    #[tokio::test]
    async fn test_remove_for_session_leaves_other_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let (mine, theirs) = (Uuid::new_v4(), Uuid::new_v4());
        let artifact = exported(SourceFormat::PlainText, b"text");
        store.write(mine, &artifact).unwrap();
        store.write(mine, &artifact).unwrap();
        let kept = store.write(theirs, &artifact).unwrap();

        assert_eq!(store.remove_for_session(mine).await, 2);
        assert!(dir.path().join(kept).exists());
    }
}

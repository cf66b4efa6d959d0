//! Session checkpoint storage

use crate::error::{Error, Result};
use crate::recipes::types::RecipeSession;
use std::path::PathBuf;
use tracing::{debug, warn};
use uuid::Uuid;

/// Trait for durable session checkpoint backends
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a session checkpoint, replacing any previous one
    async fn save(&self, session: &RecipeSession) -> Result<()>;

    /// Load a session checkpoint.
    ///
    /// Returns `Ok(None)` when the session is unknown; a checkpoint that
    /// exists but cannot be decoded is `Error::CheckpointCorrupt` and the
    /// stored bytes are left untouched.
    async fn load(&self, id: Uuid) -> Result<Option<RecipeSession>>;

    /// All decodable stored sessions
    async fn list(&self) -> Result<Vec<RecipeSession>>;

    /// Delete a session checkpoint (no-op when absent)
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// File-backed store: one JSON document per session.
///
/// Saves write to a temp file and rename into place, so a crash mid-save
/// never clobbers the previous checkpoint.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Create a store rooted at `dir`, creating it if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::Internal(format!("creating '{}': {e}", dir.display())))?;
        Ok(Self { dir })
    }

    fn path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait::async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session: &RecipeSession) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(session)
            .map_err(|e| Error::Internal(format!("encoding session {}: {e}", session.id)))?;

        let path = self.path(session.id);
        let tmp = self.dir.join(format!("{}.json.tmp", session.id));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| Error::Internal(format!("writing '{}': {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Internal(format!("renaming '{}': {e}", tmp.display())))?;

        debug!(session_id = %session.id, status = ?session.status, "Checkpointed session");
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<RecipeSession>> {
        let path = self.path(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Internal(format!(
                    "reading '{}': {e}",
                    path.display()
                )))
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::CheckpointCorrupt {
                id,
                detail: e.to_string(),
            })
    }

    async fn list(&self) -> Result<Vec<RecipeSession>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| Error::Internal(format!("listing '{}': {e}", self.dir.display())))?;

        let mut sessions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Internal(e.to_string()))?
        {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(id) = stem.parse::<Uuid>() else {
                continue;
            };
            match self.load(id).await {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {}
                Err(e) => {
                    // One bad checkpoint must not hide the others
                    warn!(session_id = %id, error = %e, "Skipping undecodable checkpoint");
                }
            }
        }
        Ok(sessions)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        match tokio::fs::remove_file(self.path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Internal(format!("deleting session {id}: {e}"))),
        }
    }
}

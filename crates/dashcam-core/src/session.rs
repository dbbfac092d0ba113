use crate::error::{CaptureError, FilenameError};
use crate::filename::{session_id, validate_component, DASHCAM_DIR};
use crate::fs::Filesystem;
use crate::types::SessionHandle;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Names and creates per-session directories under `<root>/dashcam`.
#[derive(Clone)]
pub struct SessionStore {
    root: PathBuf,
    fs: Arc<dyn Filesystem>,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn Filesystem>) -> Self {
        Self {
            root: root.into(),
            fs,
        }
    }

    /// Create (if missing) the directory for a session started at `now`.
    ///
    /// Sessions started within the same minute share a directory. Any failure
    /// to create it is reported with the attempted path.
    pub fn ensure_session(&self, now: DateTime<Local>) -> Result<SessionHandle, CaptureError> {
        let id = session_id(&now);
        let path = self.sessions_dir().join(&id);

        self.fs.create_dir_all(&path)?;
        info!("Session directory ready: {:?}", path);

        Ok(SessionHandle {
            id,
            path,
            created_at: now,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join(DASHCAM_DIR)
    }

    /// Path of an existing or future session, rejecting ids that would
    /// escape the sessions directory.
    pub fn session_path(&self, id: &str) -> Result<PathBuf, FilenameError> {
        Ok(self.sessions_dir().join(validate_component(id)?))
    }

    pub fn fs(&self) -> &Arc<dyn Filesystem> {
        &self.fs
    }
}

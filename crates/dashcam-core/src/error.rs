use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// A platform capability the capture loop depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Camera,
    Location,
    Storage,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Camera => "camera",
            Capability::Location => "location",
            Capability::Storage => "storage",
        };
        f.write_str(name)
    }
}

/// Failures surfaced by capture capabilities and the session store.
///
/// `PermissionDenied` and `StorageFailure` while creating a session directory
/// abort an activation. Everything else is scoped to a single tick.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("{0} permission not granted")]
    PermissionDenied(Capability),

    #[error("camera returned no frame: {0}")]
    CaptureFailure(String),

    #[error("no location fix: {0}")]
    LocationUnavailable(String),

    #[error("storage operation failed at {path}: {source}")]
    StorageFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CaptureError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CaptureError::StorageFailure {
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable label, used for skip reasons and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::PermissionDenied(_) => "permission_denied",
            CaptureError::CaptureFailure(_) => "capture_failure",
            CaptureError::LocationUnavailable(_) => "location_unavailable",
            CaptureError::StorageFailure { .. } => "storage_failure",
        }
    }
}

/// Errors from encoding or decoding the on-disk photo name schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilenameError {
    #[error("coordinate is not a finite number")]
    NonFinite,

    #[error("{axis} {value} is out of range")]
    OutOfRange { axis: &'static str, value: String },

    #[error("malformed coordinate '{0}'")]
    MalformedCoordinate(String),

    #[error("'{0}' does not follow <millis>_lat<lat>_lng<lng>.jpg")]
    MalformedName(String),

    #[error("'{0}' is not a valid session or photo name")]
    InvalidComponent(String),
}

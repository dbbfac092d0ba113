use crate::error::FilenameError;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single location reading in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
}

impl Fix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn validate(&self) -> Result<(), FilenameError> {
        check_axis("latitude", self.latitude, 90.0)?;
        check_axis("longitude", self.longitude, 180.0)
    }
}

fn check_axis(axis: &'static str, value: f64, limit: f64) -> Result<(), FilenameError> {
    if !value.is_finite() {
        return Err(FilenameError::NonFinite);
    }
    if value.abs() > limit {
        return Err(FilenameError::OutOfRange {
            axis,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// The directory one capture activation writes into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionHandle {
    pub id: String,
    pub path: PathBuf,
    pub created_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    #[default]
    Idle,
    Active,
}

/// A photo that has been persisted under a session directory.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedPhoto {
    pub session_id: String,
    pub captured_at_millis: i64,
    pub fix: Fix,
    pub path: PathBuf,
}

impl CapturedPhoto {
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.captured_at_millis)
    }
}

/// Why a tick ended without persisting a photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    CaptureFailure,
    LocationUnavailable,
    StorageFailure,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::CaptureFailure => "capture_failure",
            SkipReason::LocationUnavailable => "location_unavailable",
            SkipReason::StorageFailure => "storage_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_validate() {
        assert!(Fix::new(37.4245, -122.166).validate().is_ok());
        assert!(Fix::new(-90.0, 180.0).validate().is_ok());
        assert!(Fix::new(90.000001, 0.0).validate().is_err());
        assert_eq!(
            Fix::new(f64::INFINITY, 0.0).validate(),
            Err(FilenameError::NonFinite)
        );
    }
}

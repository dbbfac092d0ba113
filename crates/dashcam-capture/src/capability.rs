use async_trait::async_trait;
use dashcam_core::{CaptureError, Fix};
use std::path::PathBuf;

/// One still frame, stored in a temporary location until it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub temporary_path: PathBuf,
}

/// A device that produces still frames.
#[async_trait]
pub trait Camera: Send + Sync {
    /// Checked once per activation before any tick runs.
    async fn authorize(&self) -> Result<(), CaptureError> {
        Ok(())
    }

    /// Capture a still encoded at `quality` in (0, 1]. Lower values trade
    /// fidelity for latency and size.
    async fn capture(&self, quality: f32) -> Result<Frame, CaptureError>;
}

/// A source of location fixes.
#[async_trait]
pub trait Locator: Send + Sync {
    async fn authorize(&self) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn current_fix(&self) -> Result<Fix, CaptureError>;
}

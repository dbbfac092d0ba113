//! Camera backed by a spool directory that an external frame grabber keeps
//! filling with JPEG stills (for example `ffmpeg -f v4l2 ... -q:v 2 spool/%06d.jpg`).

use crate::capability::{Camera, Frame};
use async_trait::async_trait;
use dashcam_core::CaptureError;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

pub struct SpoolCamera {
    spool_dir: PathBuf,
    staging_dir: PathBuf,
}

impl SpoolCamera {
    /// `staging_dir` should live on the same filesystem as the session
    /// directories so frames can be renamed into place.
    pub fn new(spool_dir: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            staging_dir: staging_dir.into(),
        }
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }
}

#[async_trait]
impl Camera for SpoolCamera {
    async fn authorize(&self) -> Result<(), CaptureError> {
        if !self.spool_dir.is_dir() {
            return Err(CaptureError::CaptureFailure(format!(
                "spool directory {:?} does not exist",
                self.spool_dir
            )));
        }
        fs::create_dir_all(&self.staging_dir)
            .map_err(|e| CaptureError::storage(&self.staging_dir, e))
    }

    async fn capture(&self, quality: f32) -> Result<Frame, CaptureError> {
        let spool = self.spool_dir.clone();
        let staging = self.staging_dir.clone();

        tokio::task::spawn_blocking(move || grab_newest(&spool, &staging, quality))
            .await
            .map_err(|e| CaptureError::CaptureFailure(format!("frame task failed: {}", e)))?
    }
}

fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

fn is_jpeg(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()),
        Some(ext) if ext == "jpg" || ext == "jpeg"
    )
}

/// Take the newest spooled frame, drop the older ones, and re-encode it at
/// `quality` into the staging directory.
fn grab_newest(spool: &Path, staging: &Path, quality: f32) -> Result<Frame, CaptureError> {
    let mut frames: Vec<(SystemTime, PathBuf)> = fs::read_dir(spool)
        .map_err(|e| CaptureError::CaptureFailure(format!("cannot read spool: {}", e)))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_jpeg(path))
        .filter_map(|path| {
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((modified, path))
        })
        .collect();

    frames.sort();
    let Some((_, newest)) = frames.pop() else {
        return Err(CaptureError::CaptureFailure("no frame in spool".into()));
    };
    for (_, stale) in &frames {
        let _ = fs::remove_file(stale);
    }
    if !frames.is_empty() {
        debug!("Dropped {} stale spool frame(s)", frames.len());
    }

    let img = image::open(&newest)
        .map_err(|e| CaptureError::CaptureFailure(format!("cannot decode {:?}: {}", newest, e)))?
        .to_rgb8();

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let target = staging.join(format!("frame-{}.jpg", nanos));

    let file = File::create(&target).map_err(|e| CaptureError::storage(&target, e))?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, jpeg_quality(quality))
        .encode(img.as_raw(), img.width(), img.height(), ColorType::Rgb8)
        .map_err(|e| {
            let _ = fs::remove_file(&target);
            CaptureError::CaptureFailure(format!("cannot encode frame: {}", e))
        })?;
    writer.flush().map_err(|e| CaptureError::storage(&target, e))?;

    let _ = fs::remove_file(&newest);
    Ok(Frame {
        temporary_path: target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn write_frame(path: &Path, shade: u8) {
        let img = RgbImage::from_pixel(16, 16, Rgb([shade, shade, shade]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_jpeg_quality() {
        assert_eq!(jpeg_quality(0.2), 20);
        assert_eq!(jpeg_quality(1.0), 100);
        assert_eq!(jpeg_quality(0.001), 1);
    }

    #[tokio::test]
    async fn test_capture_takes_newest_frame_and_clears_spool() {
        let spool = tempdir().unwrap();
        let staging = tempdir().unwrap();
        write_frame(&spool.path().join("000001.jpg"), 10);
        std::thread::sleep(std::time::Duration::from_millis(20));
        write_frame(&spool.path().join("000002.jpg"), 200);
        std::fs::write(spool.path().join("grabber.log"), b"log").unwrap();

        let camera = SpoolCamera::new(spool.path(), staging.path());
        camera.authorize().await.unwrap();
        let frame = camera.capture(0.25).await.unwrap();

        assert!(frame.temporary_path.starts_with(staging.path()));
        let decoded = image::open(&frame.temporary_path).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (16, 16));
        assert!(decoded.get_pixel(8, 8)[0] > 150);

        let left: Vec<_> = std::fs::read_dir(spool.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![std::ffi::OsString::from("grabber.log")]);
    }

    #[tokio::test]
    async fn test_empty_spool_is_capture_failure() {
        let spool = tempdir().unwrap();
        let staging = tempdir().unwrap();
        let camera = SpoolCamera::new(spool.path(), staging.path());

        let err = camera.capture(0.2).await.unwrap_err();
        assert!(matches!(err, CaptureError::CaptureFailure(_)));
    }

    #[tokio::test]
    async fn test_missing_spool_fails_authorization() {
        let dir = tempdir().unwrap();
        let camera = SpoolCamera::new(dir.path().join("missing"), dir.path().join("staging"));
        assert!(camera.authorize().await.is_err());
    }
}

use anyhow::Context;
use chrono::{DateTime, Utc};
use dashcam_core::checksum::file_crc32;
use dashcam_core::{Gallery, PARTIAL_SUFFIX};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

pub const MANIFEST_NAME: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    pub session_id: String,
    pub exported_at: DateTime<Utc>,
    pub photos: Vec<ManifestPhoto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestPhoto {
    pub name: String,
    pub captured_at: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub size: u64,
    /// Lowercase hex, 8 digits.
    pub crc32: String,
}

/// Write `<out_dir>/<session>_<timestamp>.zip` holding every photo of the
/// session under `<session>/` plus a `manifest.json`. The bundle only
/// appears under its final name once it is complete.
pub fn export_session(gallery: &Gallery, session_id: &str, out_dir: &Path) -> anyhow::Result<PathBuf> {
    let photos = gallery.list_photos(session_id)?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create export directory {:?}", out_dir))?;

    let exported_at = Utc::now();
    let bundle_name = format!("{}_{}.zip", session_id, exported_at.format("%Y%m%dT%H%M%S"));
    let bundle_path = out_dir.join(&bundle_name);
    let partial_path = out_dir.join(format!(".{}{}", bundle_name, PARTIAL_SUFFIX));

    let result = write_bundle(session_id, exported_at, &photos, &partial_path);
    if result.is_err() {
        let _ = std::fs::remove_file(&partial_path);
    }
    let manifest = result?;

    std::fs::rename(&partial_path, &bundle_path)
        .with_context(|| format!("Failed to move bundle into {:?}", bundle_path))?;

    tracing::info!(
        "Session bundle exported: {:?} ({} photo(s))",
        bundle_path,
        manifest.photos.len()
    );
    Ok(bundle_path)
}

fn write_bundle(
    session_id: &str,
    exported_at: DateTime<Utc>,
    photos: &[dashcam_core::PhotoEntry],
    path: &Path,
) -> anyhow::Result<ExportManifest> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    // JPEGs are already compressed.
    let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut manifest = ExportManifest {
        session_id: session_id.to_string(),
        exported_at,
        photos: Vec::with_capacity(photos.len()),
    };

    for photo in photos {
        let (crc, size) = file_crc32(&photo.path)
            .with_context(|| format!("Failed to read {:?}", photo.path))?;

        zip.start_file(format!("{}/{}", session_id, photo.name), stored)?;
        let mut source = File::open(&photo.path)?;
        std::io::copy(&mut source, &mut zip)?;

        manifest.photos.push(ManifestPhoto {
            name: photo.name.clone(),
            captured_at: photo
                .fix
                .and(DateTime::from_timestamp_millis(photo.captured_at_millis)),
            latitude: photo.fix.map(|f| f.latitude),
            longitude: photo.fix.map(|f| f.longitude),
            size,
            crc32: format!("{:08x}", crc),
        });
    }

    zip.start_file(MANIFEST_NAME, deflated)?;
    zip.write_all(serde_json::to_string_pretty(&manifest)?.as_bytes())?;

    let mut writer = zip.finish()?;
    writer.flush()?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use dashcam_core::checksum::compute_crc32;
    use dashcam_core::{Fix, LocalFs, PhotoName, SessionStore};
    use std::io::Read;
    use std::sync::Arc;
    use tempfile::tempdir;
    use zip::ZipArchive;

    #[test]
    fn test_bundle_holds_photos_and_manifest() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path(), Arc::new(LocalFs));
        let session = store
            .ensure_session(Local.with_ymd_and_hms(2024, 9, 16, 14, 45, 3).unwrap())
            .unwrap();

        let first = PhotoName::new(1_726_497_903_123, Fix::new(37.4245, -122.166))
            .encode()
            .unwrap();
        let second = PhotoName::new(1_726_497_905_123, Fix::new(37.4246, -122.1661))
            .encode()
            .unwrap();
        std::fs::write(session.path.join(&first), b"first-jpeg").unwrap();
        std::fs::write(session.path.join(&second), b"second-jpeg-bytes").unwrap();
        std::fs::write(session.path.join("notes.txt"), b"ignored").unwrap();

        let gallery = Gallery::new(store);
        let out = dir.path().join("exports");
        let bundle = export_session(&gallery, &session.id, &out).unwrap();

        assert!(bundle.starts_with(&out));
        let leftovers: Vec<_> = std::fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers.len(), 1, "partial file left behind: {:?}", leftovers);

        let mut archive = ZipArchive::new(File::open(&bundle).unwrap()).unwrap();
        assert_eq!(archive.len(), 3);

        let mut bytes = Vec::new();
        archive
            .by_name(&format!("{}/{}", session.id, first))
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        assert_eq!(bytes, b"first-jpeg");

        let mut json = String::new();
        archive.by_name(MANIFEST_NAME).unwrap().read_to_string(&mut json).unwrap();
        let manifest: ExportManifest = serde_json::from_str(&json).unwrap();

        assert_eq!(manifest.session_id, "S_2024_9_16_14_45");
        assert_eq!(manifest.photos.len(), 2);
        // Newest first, as listed by the gallery.
        let newest = &manifest.photos[0];
        assert_eq!(newest.name, second);
        assert_eq!(newest.size, 17);
        assert_eq!(newest.crc32, format!("{:08x}", compute_crc32(b"second-jpeg-bytes")));
        assert_eq!(newest.latitude, Some(37.4246));
        assert_eq!(newest.longitude, Some(-122.1661));
        assert_eq!(
            newest.captured_at.unwrap().timestamp_millis(),
            1_726_497_905_123
        );
    }

    #[test]
    fn test_missing_session_is_an_error() {
        let dir = tempdir().unwrap();
        let gallery = Gallery::new(SessionStore::new(dir.path(), Arc::new(LocalFs)));

        let err = export_session(&gallery, "S_2024_1_1_0_0", &dir.path().join("exports")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<dashcam_core::GalleryError>(),
            Some(dashcam_core::GalleryError::SessionNotFound(_))
        ));
    }
}

//! Read side of the session layout: folder and photo listings, deletion,
//! copying to a media library. Nothing here feeds back into the capture loop.

use crate::error::{CaptureError, FilenameError};
use crate::filename::{is_photo_file, leading_millis, session_started_at, validate_component, PhotoName};
use crate::session::SessionStore;
use crate::types::Fix;
use serde::Serialize;
use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error(transparent)]
    Name(#[from] FilenameError),

    #[error(transparent)]
    Storage(#[from] CaptureError),

    #[error("session '{0}' not found")]
    SessionNotFound(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub path: PathBuf,
    pub photo_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoEntry {
    pub name: String,
    pub path: PathBuf,
    /// Leading integer of the name; 0 when the name has none.
    pub captured_at_millis: i64,
    pub fix: Option<Fix>,
    pub size: u64,
}

impl PhotoEntry {
    pub fn map_url(&self) -> Option<String> {
        self.fix.as_ref().map(map_url)
    }
}

/// Search link for a fix on Google Maps.
pub fn map_url(fix: &Fix) -> String {
    format!(
        "https://www.google.com/maps/search/?api=1&query={},{}",
        fix.latitude, fix.longitude
    )
}

pub struct Gallery {
    store: SessionStore,
}

impl Gallery {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// Session folders, newest first. Folders whose names carry no start time
    /// are listed last, by name.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, GalleryError> {
        let fs = self.store.fs();
        let mut sessions = Vec::new();

        let sessions_dir = self.store.sessions_dir();
        for entry in fs.read_dir(&sessions_dir)? {
            if !entry.is_dir {
                continue;
            }
            // listed names are single components already
            let path = sessions_dir.join(&entry.name);
            let photo_count = fs
                .read_dir(&path)?
                .iter()
                .filter(|e| !e.is_dir && is_photo_file(&e.name))
                .count();
            sessions.push(SessionSummary {
                id: entry.name,
                path,
                photo_count,
            });
        }

        sessions.sort_by(|a, b| {
            let ta = session_started_at(&a.id);
            let tb = session_started_at(&b.id);
            match (ta, tb) {
                (Some(ta), Some(tb)) => tb.cmp(&ta),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a.id.cmp(&b.id),
            }
        });
        Ok(sessions)
    }

    /// Photos of one session, newest first by the leading timestamp.
    pub fn list_photos(&self, session_id: &str) -> Result<Vec<PhotoEntry>, GalleryError> {
        let dir = self.existing_session(session_id)?;

        let mut photos: Vec<PhotoEntry> = self
            .store
            .fs()
            .read_dir(&dir)?
            .into_iter()
            .filter(|e| !e.is_dir && is_photo_file(&e.name))
            .map(|e| {
                let decoded = PhotoName::decode(&e.name).ok();
                PhotoEntry {
                    captured_at_millis: decoded
                        .map(|d| d.captured_at_millis)
                        .or_else(|| leading_millis(&e.name))
                        .unwrap_or(0),
                    fix: decoded.map(|d| d.fix),
                    path: dir.join(&e.name),
                    name: e.name,
                    size: e.len,
                }
            })
            .collect();

        photos.sort_by_key(|p| (Reverse(p.captured_at_millis), p.name.clone()));
        Ok(photos)
    }

    pub fn photo_path(&self, session_id: &str, name: &str) -> Result<PathBuf, GalleryError> {
        Ok(self.store.session_path(session_id)?.join(validate_component(name)?))
    }

    /// Delete photos by name. Names already gone are ignored.
    pub fn delete_photos(&self, session_id: &str, names: &[String]) -> Result<usize, GalleryError> {
        let mut removed = 0;
        for name in names {
            let path = self.photo_path(session_id, name)?;
            self.store.fs().remove_file(&path)?;
            debug!("Deleted photo {:?}", path);
            removed += 1;
        }
        info!("Deleted {} photo(s) from {}", removed, session_id);
        Ok(removed)
    }

    /// Delete whole session folders. Folders already gone are ignored.
    pub fn delete_sessions(&self, ids: &[String]) -> Result<usize, GalleryError> {
        let mut removed = 0;
        for id in ids {
            let path = self.store.session_path(id)?;
            self.store.fs().remove_dir_all(&path)?;
            removed += 1;
        }
        info!("Deleted {} session folder(s)", removed);
        Ok(removed)
    }

    /// Copy photos into a media library directory, keeping their names.
    /// An empty `names` slice saves the whole session.
    pub fn save_to_library(
        &self,
        session_id: &str,
        names: &[String],
        library_dir: &Path,
    ) -> Result<Vec<PathBuf>, GalleryError> {
        let names: Vec<String> = if names.is_empty() {
            self.list_photos(session_id)?.into_iter().map(|p| p.name).collect()
        } else {
            names.to_vec()
        };

        let fs = self.store.fs();
        fs.create_dir_all(library_dir)?;

        let mut saved = Vec::with_capacity(names.len());
        for name in &names {
            let from = self.photo_path(session_id, name)?;
            let to = library_dir.join(validate_component(name)?);
            fs.copy_file(&from, &to)?;
            saved.push(to);
        }
        info!("Saved {} photo(s) from {} to {:?}", saved.len(), session_id, library_dir);
        Ok(saved)
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    fn existing_session(&self, session_id: &str) -> Result<PathBuf, GalleryError> {
        let dir = self.store.session_path(session_id)?;
        if !dir.is_dir() {
            return Err(GalleryError::SessionNotFound(session_id.to_string()));
        }
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFs;
    use std::fs;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn gallery_with(sessions: &[(&str, &[&str])]) -> (TempDir, Gallery) {
        let dir = tempdir().unwrap();
        for (id, files) in sessions {
            let session_dir = dir.path().join("dashcam").join(id);
            fs::create_dir_all(&session_dir).unwrap();
            for f in *files {
                fs::write(session_dir.join(f), b"jpeg").unwrap();
            }
        }
        let gallery = Gallery::new(SessionStore::new(dir.path(), Arc::new(LocalFs)));
        (dir, gallery)
    }

    #[test]
    fn test_photos_are_newest_first_with_coordinates() {
        let (_dir, gallery) = gallery_with(&[(
            "S_2024_9_16_14_45",
            &[
                "1726497900000_lat37_424500_lng-122_166000.jpg",
                "1726497904000_lat37_424600_lng-122_166100.jpg",
                "1726497902000_lat37_424550_lng-122_166050.jpg",
                ".1726497906000_lat1_000000_lng1_000000.jpg.partial",
                "notes.txt",
            ],
        )]);

        let photos = gallery.list_photos("S_2024_9_16_14_45").unwrap();
        let stamps: Vec<i64> = photos.iter().map(|p| p.captured_at_millis).collect();
        assert_eq!(stamps, vec![1726497904000, 1726497902000, 1726497900000]);

        let oldest = photos.last().unwrap();
        assert_eq!(oldest.fix, Some(Fix::new(37.4245, -122.166)));
        assert_eq!(
            oldest.map_url().unwrap(),
            "https://www.google.com/maps/search/?api=1&query=37.4245,-122.166"
        );
    }

    #[test]
    fn test_legacy_names_sort_by_leading_integer_without_fix() {
        let (_dir, gallery) = gallery_with(&[("S_2024_9_16_14_45", &["1000.jpg", "2000.jpg", "photo.jpg"])]);

        let photos = gallery.list_photos("S_2024_9_16_14_45").unwrap();
        let names: Vec<&str> = photos.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["2000.jpg", "1000.jpg", "photo.jpg"]);
        assert!(photos.iter().all(|p| p.fix.is_none()));
    }

    #[test]
    fn test_sessions_are_newest_first() {
        let (_dir, gallery) = gallery_with(&[
            ("S_2024_9_16_14_45", &["1_lat1_000000_lng1_000000.jpg"]),
            ("S_2024_10_2_08_05", &[]),
            ("imported", &[]),
            ("S_2024_9_16_09_00", &["1.jpg", "2.jpg"]),
        ]);

        let sessions = gallery.list_sessions().unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["S_2024_10_2_08_05", "S_2024_9_16_14_45", "S_2024_9_16_09_00", "imported"]
        );
        assert_eq!(sessions[1].photo_count, 1);
        assert_eq!(sessions[2].photo_count, 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_odd_folder_names_do_not_break_listing() {
        let (_dir, gallery) = gallery_with(&[
            ("S_2024_9_16_14_45", &["1.jpg"]),
            ("backup\\old", &["2.jpg"]),
        ]);

        let sessions = gallery.list_sessions().unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["S_2024_9_16_14_45", "backup\\old"]);
        assert_eq!(sessions[1].photo_count, 1);
    }

    #[test]
    fn test_missing_root_lists_no_sessions() {
        let dir = tempdir().unwrap();
        let gallery = Gallery::new(SessionStore::new(dir.path(), Arc::new(LocalFs)));
        assert!(gallery.list_sessions().unwrap().is_empty());
        assert!(matches!(
            gallery.list_photos("S_2024_9_16_14_45"),
            Err(GalleryError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_delete_photos_and_sessions() {
        let (dir, gallery) = gallery_with(&[
            ("S_2024_9_16_14_45", &["1.jpg", "2.jpg"]),
            ("S_2024_9_16_15_00", &["3.jpg"]),
        ]);

        let removed = gallery
            .delete_photos("S_2024_9_16_14_45", &["1.jpg".into(), "missing.jpg".into()])
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(gallery.list_photos("S_2024_9_16_14_45").unwrap().len(), 1);

        gallery.delete_sessions(&["S_2024_9_16_15_00".into()]).unwrap();
        assert!(!dir.path().join("dashcam/S_2024_9_16_15_00").exists());

        assert!(gallery.delete_sessions(&["..".into()]).is_err());
        assert!(gallery.delete_photos("S_2024_9_16_14_45", &["../x".into()]).is_err());
    }

    #[test]
    fn test_save_whole_session_to_library() {
        let (dir, gallery) = gallery_with(&[("S_2024_9_16_14_45", &["1.jpg", "2.jpg"])]);
        let library = dir.path().join("library");

        let saved = gallery.save_to_library("S_2024_9_16_14_45", &[], &library).unwrap();

        assert_eq!(saved.len(), 2);
        assert!(library.join("1.jpg").exists());
        assert!(library.join("2.jpg").exists());
        // originals stay in place
        assert!(dir.path().join("dashcam/S_2024_9_16_14_45/1.jpg").exists());
    }
}

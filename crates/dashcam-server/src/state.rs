use crate::metrics;
use chrono::Utc;
use dashcam_capture::{CaptureEvent, CaptureLoop};
use dashcam_core::{Gallery, LoopHealth, OverallHealth, SkipReason};
use dashmap::DashMap;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

const EVENT_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub enum UiEvent {
    CaptureStarted { session_id: String },
    CaptureStopped { session_id: String },
    PhotoPersisted { session_id: String, name: String },
    TickSkipped { reason: SkipReason, error: String },
    SessionExported { session_id: String, path: String },
    SessionsDeleted { count: usize },
    PhotosDeleted { session_id: String, count: usize },
    SavedToLibrary { session_id: String, count: usize },
    Error(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct UiEventLogEntry {
    pub timestamp: chrono::DateTime<Utc>,
    pub event: UiEvent,
}

/// Tick outcomes attributed to one session since the server started.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub persisted: u64,
    pub skipped: u64,
    pub last_photo: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub capture: CaptureLoop,
    pub gallery: Arc<Gallery>,
    pub health: Arc<RwLock<LoopHealth>>,
    pub session_stats: Arc<DashMap<String, SessionStats>>,
    pub event_log: Arc<RwLock<VecDeque<UiEventLogEntry>>>, // Ring buffer for events
    pub library_dir: PathBuf,
    pub export_dir: PathBuf,
    pub metrics: Option<PrometheusHandle>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(capture: CaptureLoop, library_dir: PathBuf, export_dir: PathBuf) -> Self {
        let interval_ms = capture.config().interval.as_millis() as u64;
        Self {
            gallery: Arc::new(Gallery::new(capture.store().clone())),
            health: Arc::new(RwLock::new(LoopHealth::new(interval_ms))),
            session_stats: Arc::new(DashMap::new()),
            event_log: Arc::new(RwLock::new(VecDeque::new())),
            capture,
            library_dir,
            export_dir,
            metrics: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub async fn push_event(&self, event: UiEvent) {
        let mut log = self.event_log.write().await;
        log.push_back(UiEventLogEntry {
            timestamp: Utc::now(),
            event,
        });
        while log.len() > EVENT_LOG_CAPACITY {
            log.pop_front();
        }
    }

    pub async fn get_events(&self, limit: usize) -> Vec<UiEventLogEntry> {
        let log = self.event_log.read().await;
        let start = log.len().saturating_sub(limit);
        log.iter().skip(start).cloned().collect()
    }

    /// Fold one loop event into health, per-session stats, metrics and the
    /// event log.
    pub async fn apply_capture_event(&self, event: CaptureEvent) {
        let ui_event = {
            let mut health = self.health.write().await;
            match event {
                CaptureEvent::Started(session) => {
                    health.record_started(session.id.clone());
                    metrics::set_capture_active(true);
                    self.session_stats.entry(session.id.clone()).or_default();
                    UiEvent::CaptureStarted {
                        session_id: session.id,
                    }
                }
                CaptureEvent::Persisted(photo) => {
                    health.record_persisted();
                    metrics::record_persisted();
                    let name = photo
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let mut stats = self.session_stats.entry(photo.session_id.clone()).or_default();
                    stats.persisted += 1;
                    stats.last_photo = Some(name.clone());
                    UiEvent::PhotoPersisted {
                        session_id: photo.session_id,
                        name,
                    }
                }
                CaptureEvent::Skipped { reason, error } => {
                    health.record_skipped(reason);
                    metrics::record_skipped(reason);
                    if let Some(id) = &health.session_id {
                        self.session_stats.entry(id.clone()).or_default().skipped += 1;
                    }
                    UiEvent::TickSkipped { reason, error }
                }
                CaptureEvent::Stopped { session_id } => {
                    health.record_stopped();
                    metrics::set_capture_active(false);
                    UiEvent::CaptureStopped { session_id }
                }
            }
        };
        self.push_event(ui_event).await;
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub async fn overall_health(&self) -> OverallHealth {
        let capture = self.health.read().await.clone();
        OverallHealth {
            status: capture.status(),
            capture,
            uptime_seconds: self.uptime_seconds(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::test_state;
    use super::*;
    use chrono::Local;
    use dashcam_core::{CapturedPhoto, Fix, HealthStatus, LoopState, SessionHandle};
    use tempfile::tempdir;

    fn session(id: &str) -> SessionHandle {
        SessionHandle {
            id: id.to_string(),
            path: PathBuf::from("/data/dashcam").join(id),
            created_at: Local::now(),
        }
    }

    #[tokio::test]
    async fn test_capture_events_feed_health_and_stats() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        let id = "S_2024_9_16_14_45";

        state.apply_capture_event(CaptureEvent::Started(session(id))).await;
        state
            .apply_capture_event(CaptureEvent::Persisted(CapturedPhoto {
                session_id: id.to_string(),
                captured_at_millis: 1_726_497_903_123,
                fix: Fix::new(37.4245, -122.166),
                path: PathBuf::from("/data/dashcam")
                    .join(id)
                    .join("1726497903123_lat37_424500_lng-122_166000.jpg"),
            }))
            .await;
        state
            .apply_capture_event(CaptureEvent::Skipped {
                reason: SkipReason::LocationUnavailable,
                error: "no fix".into(),
            })
            .await;

        let health = state.overall_health().await;
        assert_eq!(health.capture.state, LoopState::Active);
        assert_eq!(health.capture.ticks, 2);
        assert_eq!(health.capture.persisted, 1);
        assert_eq!(health.capture.location_misses, 1);

        let stats = state.session_stats.get(id).unwrap().clone();
        assert_eq!(stats.persisted, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(
            stats.last_photo.as_deref(),
            Some("1726497903123_lat37_424500_lng-122_166000.jpg")
        );

        state
            .apply_capture_event(CaptureEvent::Stopped {
                session_id: id.to_string(),
            })
            .await;
        assert_eq!(state.overall_health().await.capture.state, LoopState::Idle);

        let events = state.get_events(10).await;
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0].event, UiEvent::CaptureStarted { .. }));
        assert!(matches!(events[3].event, UiEvent::CaptureStopped { .. }));
    }

    #[tokio::test]
    async fn test_event_log_is_bounded() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());

        for i in 0..(EVENT_LOG_CAPACITY + 20) {
            state.push_event(UiEvent::Error(format!("e{}", i))).await;
        }

        let events = state.get_events(usize::MAX).await;
        assert_eq!(events.len(), EVENT_LOG_CAPACITY);
        assert!(matches!(&events[0].event, UiEvent::Error(msg) if msg == "e20"));
        assert_eq!(state.get_events(3).await.len(), 3);
    }

    #[tokio::test]
    async fn test_fresh_state_is_healthy() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        let health = state.overall_health().await;
        assert_eq!(health.status, HealthStatus::Ok);
        assert_eq!(health.capture.interval_ms, 2000);
    }
}

use crate::capability::Locator;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashcam_core::{CaptureError, Fix};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Always reports the same position. Useful for a parked or bench setup.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocator {
    fix: Fix,
}

impl FixedLocator {
    pub fn new(fix: Fix) -> Self {
        Self { fix }
    }
}

#[async_trait]
impl Locator for FixedLocator {
    async fn current_fix(&self) -> Result<Fix, CaptureError> {
        Ok(self.fix)
    }
}

/// Fastest accepted track replay multiplier.
pub const MAX_TRACK_SPEED: f64 = 1000.0;

pub fn valid_track_speed(speed: f64) -> bool {
    speed.is_finite() && speed > 0.0 && speed <= MAX_TRACK_SPEED
}

/// One line of a recorded NDJSON track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackPoint {
    pub ts: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Replays a recorded track against wall time. The reported fix is the last
/// point whose offset from the first point has elapsed; once the track runs
/// out the final point holds.
pub struct TrackLocator {
    points: Vec<(Duration, Fix)>,
    speed: f64,
    start_time: Mutex<Option<Instant>>,
}

impl TrackLocator {
    pub fn load(path: &Path, speed: f64) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut points = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let point: TrackPoint = serde_json::from_str(&line)?;
            points.push(point);
        }

        info!("Loaded track of {} point(s) from {:?}", points.len(), path);
        Self::from_points(points, speed)
    }

    /// `speed` scales playback and must lie in `(0, MAX_TRACK_SPEED]`.
    pub fn from_points(mut points: Vec<TrackPoint>, speed: f64) -> anyhow::Result<Self> {
        if !valid_track_speed(speed) {
            anyhow::bail!("track speed {} outside (0, {}]", speed, MAX_TRACK_SPEED);
        }

        points.sort_by_key(|p| p.ts);
        let first_ts = points.first().map(|p| p.ts);

        let points = points
            .into_iter()
            .map(|p| {
                let offset = first_ts
                    .and_then(|first| (p.ts - first).to_std().ok())
                    .unwrap_or_default();
                (offset, Fix::new(p.latitude, p.longitude))
            })
            .collect();

        Ok(Self {
            points,
            speed,
            start_time: Mutex::new(None),
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn fix_at(&self, elapsed: Duration) -> Option<Fix> {
        // past the representable range every point has been reached
        let track_time = Duration::try_from_secs_f64(elapsed.as_secs_f64() * self.speed)
            .unwrap_or(Duration::MAX);
        let idx = self.points.partition_point(|(offset, _)| *offset <= track_time);
        self.points
            .get(idx.saturating_sub(1))
            .map(|(_, fix)| *fix)
    }
}

#[async_trait]
impl Locator for TrackLocator {
    async fn authorize(&self) -> Result<(), CaptureError> {
        if self.points.is_empty() {
            return Err(CaptureError::LocationUnavailable("track has no points".into()));
        }
        Ok(())
    }

    async fn current_fix(&self) -> Result<Fix, CaptureError> {
        let elapsed = {
            let mut start = self.start_time.lock().unwrap_or_else(|e| e.into_inner());
            start.get_or_insert_with(Instant::now).elapsed()
        };
        self.fix_at(elapsed)
            .ok_or_else(|| CaptureError::LocationUnavailable("track has no points".into()))
    }
}

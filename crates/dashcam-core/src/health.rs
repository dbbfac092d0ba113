use crate::types::{LoopState, SkipReason};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Running counters for one capture loop, fed from its tick outcomes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopHealth {
    pub state: LoopState,
    pub session_id: Option<String>,
    pub activations: u64,
    pub ticks: u64,
    pub persisted: u64,
    pub capture_failures: u64,
    pub location_misses: u64,
    pub storage_failures: u64,
    pub consecutive_failures: u64,
    pub last_persisted_ts: Option<DateTime<Utc>>,
    pub last_failure_ts: Option<DateTime<Utc>>,
    pub interval_ms: u64,
}

impl LoopHealth {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            ..Default::default()
        }
    }

    pub fn record_started(&mut self, session_id: String) {
        self.state = LoopState::Active;
        self.session_id = Some(session_id);
        self.activations += 1;
        self.consecutive_failures = 0;
    }

    pub fn record_stopped(&mut self) {
        self.state = LoopState::Idle;
    }

    pub fn record_persisted(&mut self) {
        self.ticks += 1;
        self.persisted += 1;
        self.consecutive_failures = 0;
        self.last_persisted_ts = Some(Utc::now());
    }

    pub fn record_skipped(&mut self, reason: SkipReason) {
        self.ticks += 1;
        match reason {
            SkipReason::CaptureFailure => self.capture_failures += 1,
            SkipReason::LocationUnavailable => self.location_misses += 1,
            SkipReason::StorageFailure => self.storage_failures += 1,
        }
        self.consecutive_failures += 1;
        self.last_failure_ts = Some(Utc::now());
    }

    pub fn success_rate(&self) -> f64 {
        if self.ticks == 0 {
            1.0
        } else {
            self.persisted as f64 / self.ticks as f64
        }
    }

    pub fn health_score(&self) -> u8 {
        if self.state == LoopState::Idle {
            return 100;
        }

        let mut score = 100u8;

        let fail_rate = 1.0 - self.success_rate();
        if fail_rate > 0.05 {
            score = score.saturating_sub((fail_rate * 100.0) as u8);
        }

        if self.consecutive_failures > 0 {
            score = score.saturating_sub((self.consecutive_failures.min(10) * 5) as u8);
        }

        // nothing persisted for ten intervals while active
        let stale_after = chrono::Duration::milliseconds((self.interval_ms.max(1) * 10) as i64);
        match self.last_persisted_ts {
            Some(last) if Utc::now().signed_duration_since(last) > stale_after => {
                score = score.saturating_sub(30);
            }
            None if self.ticks > 0 => {
                score = score.saturating_sub(30);
            }
            _ => {}
        }

        score
    }

    pub fn status(&self) -> HealthStatus {
        let score = self.health_score();
        if score >= 90 {
            HealthStatus::Ok
        } else if score >= 70 {
            HealthStatus::Warn
        } else {
            HealthStatus::Fail
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallHealth {
    pub status: HealthStatus,
    pub capture: LoopHealth,
    pub uptime_seconds: u64,
}

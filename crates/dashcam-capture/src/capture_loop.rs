use crate::capability::{Camera, Frame, Locator};
use dashcam_core::{
    Capability, CaptureError, CapturedPhoto, Clock, LoopState, PhotoName, SessionHandle,
    SessionStore, SkipReason,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub const MIN_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_QUALITY: f32 = 0.2;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("quality {0} is outside (0, 1]")]
    Quality(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureConfig {
    pub interval: Duration,
    pub quality: f32,
}

impl CaptureConfig {
    /// Intervals below [`MIN_INTERVAL`] are raised to it.
    pub fn new(interval: Duration, quality: f32) -> Result<Self, ConfigError> {
        if !(quality > 0.0 && quality <= 1.0) {
            return Err(ConfigError::Quality(quality));
        }
        let interval = if interval < MIN_INTERVAL {
            warn!(
                "Capture interval {:?} is below the {:?} floor, using the floor",
                interval, MIN_INTERVAL
            );
            MIN_INTERVAL
        } else {
            interval
        };
        Ok(Self { interval, quality })
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            quality: DEFAULT_QUALITY,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Started(SessionHandle),
    Persisted(CapturedPhoto),
    Skipped { reason: SkipReason, error: String },
    Stopped { session_id: String },
}

#[derive(Debug, Clone)]
pub enum TickOutcome {
    Persisted(CapturedPhoto),
    Skipped(SkipReason),
    /// Another tick was still running.
    Busy,
    /// The loop is idle.
    Inactive,
}

#[derive(Default)]
struct Activation {
    state: LoopState,
    generation: u64,
    session: Option<SessionHandle>,
    last_millis: Option<i64>,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    camera: Arc<dyn Camera>,
    locator: Arc<dyn Locator>,
    store: SessionStore,
    clock: Arc<dyn Clock>,
    config: CaptureConfig,
    tx: Option<mpsc::UnboundedSender<CaptureEvent>>,
    activation: Mutex<Activation>,
    in_flight: AtomicBool,
    start_lock: tokio::sync::Mutex<()>,
}

/// Periodic capture of geotagged stills into a session directory.
///
/// `start` creates the session directory and spawns one tick sequence on the
/// tokio runtime; `stop` ends it. Ticks never overlap, and no tick begins once
/// `stop` has returned.
#[derive(Clone)]
pub struct CaptureLoop {
    inner: Arc<Inner>,
}

impl CaptureLoop {
    pub fn new(
        camera: Arc<dyn Camera>,
        locator: Arc<dyn Locator>,
        store: SessionStore,
        clock: Arc<dyn Clock>,
        config: CaptureConfig,
    ) -> Self {
        Self::build(camera, locator, store, clock, config, None)
    }

    /// Same as [`CaptureLoop::new`], reporting every state change and tick
    /// outcome on `tx`.
    pub fn with_events(
        camera: Arc<dyn Camera>,
        locator: Arc<dyn Locator>,
        store: SessionStore,
        clock: Arc<dyn Clock>,
        config: CaptureConfig,
        tx: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Self {
        Self::build(camera, locator, store, clock, config, Some(tx))
    }

    fn build(
        camera: Arc<dyn Camera>,
        locator: Arc<dyn Locator>,
        store: SessionStore,
        clock: Arc<dyn Clock>,
        config: CaptureConfig,
        tx: Option<mpsc::UnboundedSender<CaptureEvent>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                camera,
                locator,
                store,
                clock,
                config,
                tx,
                activation: Mutex::new(Activation::default()),
                in_flight: AtomicBool::new(false),
                start_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Begin capturing. Calling it while already active returns the current
    /// session and changes nothing.
    ///
    /// Permission and session-directory failures are returned here; nothing
    /// is scheduled in that case.
    pub async fn start(&self) -> Result<SessionHandle, CaptureError> {
        let _guard = self.inner.start_lock.lock().await;

        if let Some(session) = self.active_session() {
            debug!("Capture already active in {}", session.id);
            return Ok(session);
        }

        self.inner.camera.authorize().await?;
        self.inner.locator.authorize().await?;

        let session = self.inner.store.ensure_session(self.inner.clock.now())?;

        {
            let mut act = self.inner.lock();
            act.generation += 1;
            act.state = LoopState::Active;
            act.session = Some(session.clone());
            act.last_millis = None;

            let generation = act.generation;
            let inner = Arc::clone(&self.inner);
            act.task = Some(tokio::spawn(run_ticks(inner, generation, session.clone())));
        }

        info!(
            "Capture started in {} (interval {:?}, quality {})",
            session.id, self.inner.config.interval, self.inner.config.quality
        );
        self.inner.emit(CaptureEvent::Started(session.clone()));
        Ok(session)
    }

    /// Stop capturing. A tick already running may finish; no new one starts.
    /// Returns the session that was active, if any.
    pub fn stop(&self) -> Option<SessionHandle> {
        let session = {
            let mut act = self.inner.lock();
            if act.state != LoopState::Active {
                return None;
            }
            act.state = LoopState::Idle;
            act.generation += 1;
            act.session.take()
        };

        if let Some(session) = &session {
            info!("Capture stopped in {}", session.id);
            self.inner.emit(CaptureEvent::Stopped {
                session_id: session.id.clone(),
            });
        }
        session
    }

    /// Stop, then wait for the tick sequence to wind down. The task notices
    /// the stop at its next scheduled tick, so this can take one interval.
    pub async fn shutdown(&self) -> Option<SessionHandle> {
        let task = self.inner.lock().task.take();
        let session = self.stop();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Tick sequence ended abnormally: {}", e);
            }
        }
        session
    }

    pub fn state(&self) -> LoopState {
        self.inner.lock().state
    }

    pub fn active_session(&self) -> Option<SessionHandle> {
        let act = self.inner.lock();
        match act.state {
            LoopState::Active => act.session.clone(),
            LoopState::Idle => None,
        }
    }

    pub fn config(&self) -> CaptureConfig {
        self.inner.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    /// Run one tick right now, outside the schedule. Honors the in-flight
    /// guard, so it never overlaps a scheduled tick.
    pub async fn tick_once(&self) -> TickOutcome {
        let Some((generation, session)) = self.inner.current_activation() else {
            return TickOutcome::Inactive;
        };
        self.inner.tick(generation, &session).await
    }
}

async fn run_ticks(inner: Arc<Inner>, generation: u64, session: SessionHandle) {
    let mut interval = tokio::time::interval(inner.config.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if !inner.is_current(generation) {
            break;
        }
        inner.tick(generation, &session).await;
    }

    debug!("Tick sequence {} for {} finished", generation, session.id);
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Activation> {
        self.activation.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        let act = self.lock();
        act.state == LoopState::Active && act.generation == generation
    }

    fn current_activation(&self) -> Option<(u64, SessionHandle)> {
        let act = self.lock();
        match (&act.state, &act.session) {
            (LoopState::Active, Some(session)) => Some((act.generation, session.clone())),
            _ => None,
        }
    }

    fn emit(&self, event: CaptureEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    /// Claim the in-flight slot, but only for a live activation. Checked under
    /// the activation lock so that `stop` and tick start are ordered.
    fn begin_tick(self: &Arc<Self>, generation: u64) -> Result<InFlight, TickOutcome> {
        let act = self.lock();
        if act.state != LoopState::Active || act.generation != generation {
            return Err(TickOutcome::Inactive);
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(TickOutcome::Busy);
        }
        Ok(InFlight(Arc::clone(self)))
    }

    async fn tick(self: &Arc<Self>, generation: u64, session: &SessionHandle) -> TickOutcome {
        let in_flight = match self.begin_tick(generation) {
            Ok(guard) => guard,
            Err(outcome) => {
                if matches!(outcome, TickOutcome::Busy) {
                    debug!("Previous tick still running, skipping this one");
                }
                return outcome;
            }
        };

        // The capture runs on its own task holding the slot, so a panicking
        // camera or locator costs one tick and the slot is still released.
        let inner = Arc::clone(self);
        let owned_session = session.clone();
        let capture = tokio::spawn(async move {
            let _in_flight = in_flight;
            inner.capture_one(generation, &owned_session).await
        });
        let result = match capture.await {
            Ok(result) => result,
            Err(e) => Err(CaptureError::CaptureFailure(format!("capture task failed: {}", e))),
        };

        match result {
            Ok(photo) => {
                info!("Photo saved: {:?}", photo.path);
                self.emit(CaptureEvent::Persisted(photo.clone()));
                TickOutcome::Persisted(photo)
            }
            Err(e) => {
                let reason = skip_reason(&e);
                warn!("Tick skipped ({}): {}", reason.as_str(), e);
                self.emit(CaptureEvent::Skipped {
                    reason,
                    error: e.to_string(),
                });
                TickOutcome::Skipped(reason)
            }
        }
    }

    async fn capture_one(
        &self,
        generation: u64,
        session: &SessionHandle,
    ) -> Result<CapturedPhoto, CaptureError> {
        let frame = self.camera.capture(self.config.quality).await?;

        let fix = match self.locator.current_fix().await {
            Ok(fix) => fix,
            Err(e) => {
                self.discard(&frame);
                return Err(e);
            }
        };

        let captured_at_millis = self.next_millis(generation);
        let name = match PhotoName::new(captured_at_millis, fix).encode() {
            Ok(name) => name,
            Err(e) => {
                self.discard(&frame);
                return Err(CaptureError::LocationUnavailable(format!(
                    "unusable fix {:?}: {}",
                    fix, e
                )));
            }
        };

        let path = session.path.join(name);
        if let Err(e) = self.store.fs().move_file(&frame.temporary_path, &path) {
            self.discard(&frame);
            return Err(e);
        }

        Ok(CapturedPhoto {
            session_id: session.id.clone(),
            captured_at_millis,
            fix,
            path,
        })
    }

    /// Capture time for the next photo; never lower than the previous one in
    /// this activation, and never equal, so names cannot collide.
    fn next_millis(&self, generation: u64) -> i64 {
        let now = self.clock.now().timestamp_millis();
        let mut act = self.lock();
        if act.generation != generation {
            return now;
        }
        let millis = match act.last_millis {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        act.last_millis = Some(millis);
        millis
    }

    fn discard(&self, frame: &Frame) {
        if let Err(e) = self.store.fs().remove_file(&frame.temporary_path) {
            error!("Failed to discard frame {:?}: {}", frame.temporary_path, e);
        }
    }
}

/// Holds the in-flight slot; dropping it, on any path, frees the slot.
struct InFlight(Arc<Inner>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

fn skip_reason(err: &CaptureError) -> SkipReason {
    match err {
        CaptureError::CaptureFailure(_) => SkipReason::CaptureFailure,
        CaptureError::LocationUnavailable(_) => SkipReason::LocationUnavailable,
        CaptureError::StorageFailure { .. } => SkipReason::StorageFailure,
        CaptureError::PermissionDenied(Capability::Location) => SkipReason::LocationUnavailable,
        CaptureError::PermissionDenied(Capability::Storage) => SkipReason::StorageFailure,
        CaptureError::PermissionDenied(Capability::Camera) => SkipReason::CaptureFailure,
    }
}

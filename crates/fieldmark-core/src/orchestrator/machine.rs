use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::device::{CaptureSurface, Geolocator};
use crate::gateway::{stored_coordinates, AttendanceGateway, GatewayError, CONFIRM_FIELDS};
use crate::idempotency::{IdempotencyResolver, TokenSource};
use crate::location::{LocationError, LocationProvider, LocationSample};
use crate::photo::{PhotoAsset, PhotoNormalizer};
use crate::types::{ActionRequest, LocationStatus, NewCheckin};

use super::state::{
    ActionOutcome, CompletionEvent, Diagnostics, OrchestratorError, PhaseTimings, Receipt,
    SettlementKind, SubmissionState,
};
use super::submit::create_or_reuse;

use SubmissionState as S;

const EVENT_CAPACITY: usize = 16;

/// Result of [`Orchestrator::capture`] and [`Orchestrator::retake`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStep {
    Captured,
    /// The surface closed without a file; the machine is idle again.
    Abandoned,
    Discarded,
}

/// Result of [`Orchestrator::locate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocateStep {
    /// A fresh enough sample was already cached; no sensor call was made.
    Cached(LocationSample),
    Acquired(LocationSample),
    Failed(LocationError),
    Discarded,
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

struct Pending {
    request: ActionRequest,
    photo: Option<PhotoAsset>,
    sample: Option<LocationSample>,
    force_fresh: bool,
    timings: PhaseTimings,
}

impl Pending {
    fn release_photo(&mut self) {
        if let Some(photo) = self.photo.take() {
            photo.release();
        }
    }
}

struct Machine {
    state: SubmissionState,
    /// Bumped on every new action and on abandonment. A step that awaited
    /// under an older attempt finds a mismatch and drops its results.
    attempt: u64,
    pending: Option<Pending>,
    diagnostics: Option<Diagnostics>,
    trail: Vec<SubmissionState>,
    settled_at: Option<Instant>,
}

impl Machine {
    fn enter(&mut self, next: SubmissionState) {
        debug!(from = %self.state, to = %next, attempt = self.attempt, "transition");
        self.state = next;
        self.trail.push(next);
    }

    fn clear_pending(&mut self) {
        if let Some(mut pending) = self.pending.take() {
            pending.release_photo();
        }
    }

    fn expect(&self, step: &'static str, allowed: &[SubmissionState]) -> Result<(), OrchestratorError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidStep {
                step,
                state: self.state,
            })
        }
    }

    fn pending_mut(&mut self, step: &'static str) -> Result<&mut Pending, OrchestratorError> {
        let state = self.state;
        self.pending
            .as_mut()
            .ok_or(OrchestratorError::InvalidStep { step, state })
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives one check-in or check-out at a time from request to settlement.
///
/// Each step takes `&self`, so a host can observe [`state`](Self::state) or
/// call [`abandon`](Self::abandon) while a step is awaiting a device or the
/// network. The internal lock is never held across an await.
pub struct Orchestrator {
    gateway: Arc<dyn AttendanceGateway>,
    capture: Arc<dyn CaptureSurface>,
    location: LocationProvider,
    normalizer: PhotoNormalizer,
    resolver: IdempotencyResolver,
    freshness: Duration,
    confirmation_window: Duration,
    machine: Mutex<Machine>,
    events: broadcast::Sender<CompletionEvent>,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn AttendanceGateway>,
        capture: Arc<dyn CaptureSurface>,
        geolocator: Arc<dyn Geolocator>,
        cfg: &Config,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            resolver: IdempotencyResolver::new(gateway.clone(), cfg.erp.checkin_doctype.clone()),
            gateway,
            capture,
            location: LocationProvider::new(geolocator, &cfg.location),
            normalizer: PhotoNormalizer::new(cfg.photo.jpeg_quality),
            freshness: cfg.location.freshness(),
            confirmation_window: cfg.submission.confirmation_window(),
            machine: Mutex::new(Machine {
                state: S::Idle,
                attempt: 0,
                pending: None,
                diagnostics: None,
                trail: Vec::new(),
                settled_at: None,
            }),
            events,
        }
    }

    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.resolver = self.resolver.with_token_source(tokens);
        self
    }

    /// Lock the machine, expiring a success confirmation whose window passed.
    fn machine(&self) -> MutexGuard<'_, Machine> {
        let mut m = self.machine.lock().unwrap_or_else(|e| e.into_inner());
        if m.state == S::Settled(SettlementKind::Success)
            && m.settled_at
                .is_some_and(|at| at.elapsed() >= self.confirmation_window)
        {
            m.settled_at = None;
            m.enter(S::Idle);
        }
        m
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.machine().attempt == attempt
    }

    // -- Observation --------------------------------------------------------

    pub fn state(&self) -> SubmissionState {
        self.machine().state
    }

    pub fn diagnostics(&self) -> Option<Diagnostics> {
        self.machine().diagnostics.clone()
    }

    /// States entered since the current action started.
    pub fn trail(&self) -> Vec<SubmissionState> {
        self.machine().trail.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CompletionEvent> {
        self.events.subscribe()
    }

    pub fn location(&self) -> &LocationProvider {
        &self.location
    }

    // -- Steps --------------------------------------------------------------

    /// Begin an action. Only accepted while idle.
    pub fn start_action(&self, request: ActionRequest) -> Result<(), OrchestratorError> {
        self.begin(request, false)
    }

    fn begin(&self, request: ActionRequest, force_fresh: bool) -> Result<(), OrchestratorError> {
        let mut m = self.machine();
        if m.state != S::Idle {
            return Err(OrchestratorError::Busy { state: m.state });
        }
        m.attempt += 1;
        m.trail.clear();
        m.diagnostics = None;
        info!(
            action = %request.action,
            actor = %request.actor,
            scope = %request.scope,
            attempt = m.attempt,
            "action requested"
        );
        m.pending = Some(Pending {
            request,
            photo: None,
            sample: None,
            force_fresh,
            timings: PhaseTimings::default(),
        });
        m.enter(S::ActionRequested);
        Ok(())
    }

    /// Open the capture surface and wait for a photo.
    pub async fn capture(&self) -> Result<CaptureStep, OrchestratorError> {
        let attempt = {
            let mut m = self.machine();
            m.expect("capture", &[S::ActionRequested])?;
            m.enter(S::CaptureOpening);
            m.attempt
        };
        Ok(self.await_capture(attempt).await)
    }

    /// Drop the current photo and capture again. No token is minted yet, so
    /// nothing about the eventual submission changes.
    pub async fn retake(&self) -> Result<CaptureStep, OrchestratorError> {
        let attempt = {
            let mut m = self.machine();
            m.expect("retake", &[S::CaptureComplete])?;
            let pending = m.pending_mut("retake")?;
            pending.release_photo();
            pending.sample = None;
            m.enter(S::CaptureOpening);
            m.attempt
        };
        Ok(self.await_capture(attempt).await)
    }

    async fn await_capture(&self, attempt: u64) -> CaptureStep {
        let started = Instant::now();
        let raw = self.capture.capture().await;
        let waited = started.elapsed();

        let Some(raw) = raw else {
            let mut m = self.machine();
            if m.attempt != attempt {
                return CaptureStep::Discarded;
            }
            info!("capture closed without a photo");
            m.clear_pending();
            m.enter(S::Idle);
            return CaptureStep::Abandoned;
        };

        let photo = self
            .normalizer
            .normalize_blocking(PhotoAsset::from_capture(raw))
            .await;

        let mut m = self.machine();
        if m.attempt != attempt {
            photo.release();
            return CaptureStep::Discarded;
        }
        match m.pending.as_mut() {
            Some(pending) => {
                pending.timings.capture_wait = Some(waited);
                pending.photo = Some(photo);
            }
            None => {
                photo.release();
                return CaptureStep::Discarded;
            }
        }
        m.enter(S::CaptureComplete);
        CaptureStep::Captured
    }

    /// Use a fresh cached sample, or acquire one.
    ///
    /// With a usable cached sample the state stays `CaptureComplete` and
    /// [`submit`](Self::submit) proceeds straight to `Submitting`.
    pub async fn locate(&self) -> Result<LocateStep, OrchestratorError> {
        let (attempt, force_fresh) = {
            let mut m = self.machine();
            m.expect("locate", &[S::CaptureComplete])?;
            let force_fresh = m.pending_mut("locate")?.force_fresh;

            if !force_fresh {
                if let Some(sample) = self.location.get_cached(self.freshness) {
                    debug!(lat = sample.lat, lng = sample.lng, "using cached location");
                    m.pending_mut("locate")?.sample = Some(sample);
                    return Ok(LocateStep::Cached(sample));
                }
            }
            m.enter(S::LocationAcquiring);
            (m.attempt, force_fresh)
        };

        let started = Instant::now();
        let result = if force_fresh {
            self.location.acquire_fresh().await
        } else {
            self.location.acquire_fast().await
        };
        let took = started.elapsed();

        let mut m = self.machine();
        if m.attempt != attempt {
            return Ok(LocateStep::Discarded);
        }
        let pending = m.pending_mut("locate")?;
        pending.timings.location = Some(took);

        match result {
            Ok(sample) => {
                pending.sample = Some(sample);
                m.enter(S::LocationReady);
                Ok(LocateStep::Acquired(sample))
            }
            Err(error) => {
                let request = pending.request.clone();
                m.enter(S::LocationFailed);
                m.clear_pending();
                warn!(
                    code = error.code(),
                    label = error.code_label(),
                    actor = %request.actor,
                    "location failed, photo discarded"
                );
                m.diagnostics = Some(Diagnostics::Location {
                    request,
                    error,
                    at: Utc::now(),
                });
                m.enter(S::Idle);
                Ok(LocateStep::Failed(error))
            }
        }
    }

    /// Resolve or create the record, attach the photo and confirm the stored
    /// coordinates.
    pub async fn submit(&self) -> Result<ActionOutcome, OrchestratorError> {
        let (attempt, request, sample, photo, mut timings) = {
            let mut m = self.machine();
            let ready = m.state == S::LocationReady
                || (m.state == S::CaptureComplete
                    && m.pending.as_ref().is_some_and(|p| p.sample.is_some()));
            if !ready {
                return Err(OrchestratorError::InvalidStep {
                    step: "submit",
                    state: m.state,
                });
            }
            let state = m.state;
            let pending = m.pending_mut("submit")?;
            let Some(sample) = pending.sample else {
                return Err(OrchestratorError::InvalidStep {
                    step: "submit",
                    state,
                });
            };
            let request = pending.request.clone();
            let photo = pending.photo.take();
            let timings = pending.timings;
            m.enter(S::Submitting);
            (m.attempt, request, sample, photo, timings)
        };

        let draft = NewCheckin {
            actor: request.actor.clone(),
            scope: request.scope.clone(),
            action: request.action,
            lat: Some(sample.lat),
            lng: Some(sample.lng),
            accuracy: sample.accuracy,
            location_status: LocationStatus::Ok,
            token: self.resolver.generate_token(),
        };

        let resolved = create_or_reuse(&*self.gateway, &self.resolver, &draft, &mut timings).await;
        if !self.is_current(attempt) {
            return Ok(discard(photo));
        }
        let resolved = match resolved {
            Ok(r) => r,
            Err(e) => return Ok(self.fail(attempt, request, e, photo)),
        };

        let mut photo_attached = false;
        if let Some(photo) = photo {
            if !resolved.reused {
                let started = Instant::now();
                match self.gateway.attach_file(&resolved.record_id, &photo).await {
                    Ok(()) => photo_attached = true,
                    Err(e) => warn!(
                        record_id = %resolved.record_id,
                        error = %e,
                        "photo attachment failed, record kept"
                    ),
                }
                timings.attach = Some(started.elapsed());
            }
            photo.release();
        }
        if !self.is_current(attempt) {
            return Ok(ActionOutcome::Discarded);
        }

        let started = Instant::now();
        let stored = match self.gateway.fetch(&resolved.record_id, CONFIRM_FIELDS).await {
            Ok(row) => Some(stored_coordinates(&row)),
            Err(e) => {
                warn!(record_id = %resolved.record_id, error = %e, "could not read back record");
                None
            }
        };
        timings.fetch = Some(started.elapsed());

        let receipt = Receipt {
            action: request.action,
            actor: request.actor,
            record_id: resolved.record_id,
            reused: resolved.reused,
            token: draft.token,
            photo_attached,
            stored,
            timings,
        };

        {
            let mut m = self.machine();
            if m.attempt != attempt {
                return Ok(ActionOutcome::Discarded);
            }
            m.pending = None;
            m.settled_at = Some(Instant::now());
            m.enter(S::Settled(SettlementKind::Success));
        }

        timings.log(&receipt.record_id);
        // No subscribers is fine.
        let _ = self.events.send(CompletionEvent {
            action: receipt.action,
            record_id: receipt.record_id.clone(),
            actor: receipt.actor.clone(),
        });
        Ok(ActionOutcome::Success(receipt))
    }

    fn fail(
        &self,
        attempt: u64,
        request: ActionRequest,
        error: GatewayError,
        photo: Option<PhotoAsset>,
    ) -> ActionOutcome {
        if let Some(photo) = photo {
            photo.release();
        }
        let mut m = self.machine();
        if m.attempt != attempt {
            return ActionOutcome::Discarded;
        }
        let cause = error.user_message();
        warn!(actor = %request.actor, error = %error, "submission failed");
        m.pending = None;
        m.enter(S::Settled(SettlementKind::Failed));
        m.diagnostics = Some(Diagnostics::Submission {
            request,
            cause: cause.clone(),
            at: Utc::now(),
        });
        m.enter(S::Idle);
        ActionOutcome::Failed { cause }
    }

    // -- Composite ----------------------------------------------------------

    /// Run an action end to end.
    pub async fn perform(&self, request: ActionRequest) -> Result<ActionOutcome, OrchestratorError> {
        self.start_action(request)?;
        self.drive().await
    }

    /// Re-run the last failed action. After a location failure the retry
    /// insists on a fresh fix.
    pub async fn retry(&self) -> Result<ActionOutcome, OrchestratorError> {
        let (request, force_fresh) = {
            let m = self.machine();
            match &m.diagnostics {
                Some(d @ Diagnostics::Location { .. }) => (d.request().clone(), true),
                Some(d @ Diagnostics::Submission { .. }) => (d.request().clone(), false),
                None => return Err(OrchestratorError::NothingToRetry),
            }
        };
        self.begin(request, force_fresh)?;
        self.drive().await
    }

    async fn drive(&self) -> Result<ActionOutcome, OrchestratorError> {
        match self.capture().await? {
            CaptureStep::Captured => {}
            CaptureStep::Abandoned => return Ok(ActionOutcome::Abandoned),
            CaptureStep::Discarded => return Ok(ActionOutcome::Discarded),
        }
        match self.locate().await? {
            LocateStep::Cached(_) | LocateStep::Acquired(_) => {}
            LocateStep::Failed(e) => return Ok(ActionOutcome::LocationFailed(e)),
            LocateStep::Discarded => return Ok(ActionOutcome::Discarded),
        }
        self.submit().await
    }

    // -- Teardown -----------------------------------------------------------

    /// Close the action: release the photo, go idle, and invalidate any step
    /// still in flight.
    pub fn abandon(&self) {
        let mut m = self.machine();
        m.diagnostics = None;
        if m.state == S::Idle {
            return;
        }
        info!(state = %m.state, attempt = m.attempt, "action abandoned");
        m.attempt += 1;
        m.clear_pending();
        m.settled_at = None;
        m.enter(S::Idle);
    }

    /// Dismiss a success confirmation before its window elapses.
    pub fn acknowledge(&self) {
        let mut m = self.machine();
        if m.state == S::Settled(SettlementKind::Success) {
            m.settled_at = None;
            m.enter(S::Idle);
        }
    }
}

fn discard(photo: Option<PhotoAsset>) -> ActionOutcome {
    if let Some(photo) = photo {
        photo.release();
    }
    debug!("submission result discarded after abandonment");
    ActionOutcome::Discarded
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

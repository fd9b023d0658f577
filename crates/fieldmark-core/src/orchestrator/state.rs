//! Submission state, outcomes, and the diagnostics kept after a failure.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::idempotency::ClientToken;
use crate::location::LocationError;
use crate::types::{ActionRequest, LogType, StoredCoordinates};

// ---------------------------------------------------------------------------
// SubmissionState
// ---------------------------------------------------------------------------

/// Where the current action is.
///
/// `Idle → ActionRequested → CaptureOpening → CaptureComplete →
/// LocationAcquiring → {LocationReady | LocationFailed} → Submitting →
/// Settled{Success | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionState {
    Idle,
    ActionRequested,
    CaptureOpening,
    CaptureComplete,
    LocationAcquiring,
    LocationReady,
    LocationFailed,
    Submitting,
    Settled(SettlementKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettlementKind {
    Success,
    Failed,
}

impl SubmissionState {
    pub fn is_idle(self) -> bool {
        self == SubmissionState::Idle
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionState::Idle => "idle",
            SubmissionState::ActionRequested => "action_requested",
            SubmissionState::CaptureOpening => "capture_opening",
            SubmissionState::CaptureComplete => "capture_complete",
            SubmissionState::LocationAcquiring => "location_acquiring",
            SubmissionState::LocationReady => "location_ready",
            SubmissionState::LocationFailed => "location_failed",
            SubmissionState::Submitting => "submitting",
            SubmissionState::Settled(SettlementKind::Success) => "settled_success",
            SubmissionState::Settled(SettlementKind::Failed) => "settled_failed",
        }
    }
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SubmissionState {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OrchestratorError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    /// One action at a time; a second request is rejected, never queued.
    #[error("another action is in progress ({state})")]
    Busy { state: SubmissionState },

    #[error("cannot {step} while {state}")]
    InvalidStep {
        step: &'static str,
        state: SubmissionState,
    },

    #[error("there is no failed action to retry")]
    NothingToRetry,
}

// ---------------------------------------------------------------------------
// PhaseTimings
// ---------------------------------------------------------------------------

/// Per-phase durations. Observability only; nothing branches on them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseTimings {
    #[serde(serialize_with = "serialize_ms_opt")]
    pub capture_wait: Option<Duration>,
    #[serde(serialize_with = "serialize_ms_opt")]
    pub location: Option<Duration>,
    #[serde(serialize_with = "serialize_ms_opt")]
    pub lookup: Option<Duration>,
    #[serde(serialize_with = "serialize_ms_opt")]
    pub create: Option<Duration>,
    #[serde(serialize_with = "serialize_ms_opt")]
    pub attach: Option<Duration>,
    #[serde(serialize_with = "serialize_ms_opt")]
    pub fetch: Option<Duration>,
}

fn serialize_ms_opt<S>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match d {
        Some(dur) => s.serialize_some(&(dur.as_millis() as u64)),
        None => s.serialize_none(),
    }
}

fn ms(d: Option<Duration>) -> u64 {
    d.map(|d| d.as_millis() as u64).unwrap_or(0)
}

impl PhaseTimings {
    pub(crate) fn log(&self, record_id: &str) {
        tracing::info!(
            record_id,
            capture_wait_ms = ms(self.capture_wait),
            location_ms = ms(self.location),
            lookup_ms = ms(self.lookup),
            create_ms = ms(self.create),
            attach_ms = ms(self.attach),
            fetch_ms = ms(self.fetch),
            "submission settled"
        );
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What a successful settlement produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    pub action: LogType,
    pub actor: String,
    pub record_id: String,
    /// `true` when an existing record for the token was found and reused.
    pub reused: bool,
    pub token: ClientToken,
    pub photo_attached: bool,
    /// Coordinates read back from the store; `None` if the read failed.
    pub stored: Option<StoredCoordinates>,
    pub timings: PhaseTimings,
}

/// Broadcast to the roster collaborator on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionEvent {
    pub action: LogType,
    pub record_id: String,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Success(Receipt),
    /// Record creation failed; nothing exists remotely.
    Failed { cause: String },
    /// No fix; the photo was discarded.
    LocationFailed(LocationError),
    /// The capture surface closed without a file.
    Abandoned,
    /// The action was abandoned while this step was in flight.
    Discarded,
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Kept after a user-visible failure, until the next action starts.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostics {
    Location {
        request: ActionRequest,
        error: LocationError,
        at: DateTime<Utc>,
    },
    Submission {
        request: ActionRequest,
        cause: String,
        at: DateTime<Utc>,
    },
}

impl Diagnostics {
    pub fn request(&self) -> &ActionRequest {
        match self {
            Diagnostics::Location { request, .. } | Diagnostics::Submission { request, .. } => {
                request
            }
        }
    }

    pub fn code_label(&self) -> Option<&'static str> {
        match self {
            Diagnostics::Location { error, .. } => Some(error.code_label()),
            Diagnostics::Submission { .. } => None,
        }
    }

    /// Text to show the user.
    pub fn message(&self) -> String {
        match self {
            Diagnostics::Location { error, .. } => {
                format!("{} ({})", error.guidance(), error.code_label())
            }
            Diagnostics::Submission { cause, .. } => cause.clone(),
        }
    }
}

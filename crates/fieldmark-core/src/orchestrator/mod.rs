//! Submission Orchestrator: the state machine that drives one check-in or
//! check-out from request to settlement.
//!
//! Photo capture comes first, then location, then the idempotent
//! create-or-reuse against the store, then the photo attachment. At most one
//! action is in flight per orchestrator.

mod machine;
mod state;
mod submit;

pub use machine::{CaptureStep, LocateStep, Orchestrator};
pub use state::{
    ActionOutcome, CompletionEvent, Diagnostics, OrchestratorError, PhaseTimings, Receipt,
    SettlementKind, SubmissionState,
};
pub use submit::{create_or_reuse, Resolved};

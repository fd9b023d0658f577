use std::time::Instant;
use tracing::{debug, info};

use crate::gateway::{AttendanceGateway, GatewayError};
use crate::idempotency::IdempotencyResolver;
use crate::types::NewCheckin;

use super::state::PhaseTimings;

/// The record a submission landed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub record_id: String,
    pub reused: bool,
}

/// Look the token up, then create only if nothing was found.
///
/// The lookup always precedes creation for a given token, so repeating this
/// with the same `(actor, token)` lands on the same record as long as one
/// of the lookups succeeds.
pub async fn create_or_reuse(
    gateway: &dyn AttendanceGateway,
    resolver: &IdempotencyResolver,
    draft: &NewCheckin,
    timings: &mut PhaseTimings,
) -> Result<Resolved, GatewayError> {
    let started = Instant::now();
    let existing = resolver.find_existing(&draft.actor, &draft.token).await;
    timings.lookup = Some(started.elapsed());

    if let Some(record_id) = existing {
        info!(record_id, token = %draft.token, "reusing existing record");
        return Ok(Resolved {
            record_id,
            reused: true,
        });
    }

    let started = Instant::now();
    let created = gateway.create(draft).await;
    timings.create = Some(started.elapsed());
    let record_id = created?;
    debug!(record_id, token = %draft.token, "record created");

    Ok(Resolved {
        record_id,
        reused: false,
    })
}

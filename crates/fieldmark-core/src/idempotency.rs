//! Idempotency Resolver: mints one client token per submission attempt and
//! asks the store whether a record for that token already exists.
//!
//! The resolver never creates anything; it only informs the reuse-vs-create
//! decision. Its guarantee is best-effort: when both lookup strategies fail
//! it answers "no existing record" and the caller creates.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::gateway::{row_name, AttendanceGateway, Filter, RecordQuery};

/// Record field holding the client token.
pub const TOKEN_FIELD: &str = "custom_client_uuid";
/// Record field holding the actor id.
pub const ACTOR_FIELD: &str = "employee";

// ---------------------------------------------------------------------------
// ClientToken
// ---------------------------------------------------------------------------

/// Opaque per-attempt submission token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientToken(String);

impl ClientToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ClientToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Token generation
// ---------------------------------------------------------------------------

pub trait TokenSource: Send + Sync {
    fn next_token(&self) -> ClientToken;
}

/// OS randomness, falling back to a time + PRNG composite.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecureTokenSource;

impl TokenSource for SecureTokenSource {
    fn next_token(&self) -> ClientToken {
        generate_token()
    }
}

/// A random v4 UUID from OS entropy.
pub fn generate_token() -> ClientToken {
    let mut bytes = [0u8; 16];
    match getrandom::fill(&mut bytes) {
        Ok(()) => ClientToken(
            uuid::Builder::from_random_bytes(bytes)
                .into_uuid()
                .to_string(),
        ),
        Err(e) => {
            warn!(error = %e, "secure randomness unavailable, using composite token");
            composite_token(SystemTime::now())
        }
    }
}

static COMPOSITE_SEQ: AtomicU64 = AtomicU64::new(0);

fn composite_token(now: SystemTime) -> ClientToken {
    let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    let seq = COMPOSITE_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut rng = StdRng::seed_from_u64(since_epoch.as_nanos() as u64 ^ seq.rotate_left(32));
    let random: u64 = rng.gen();
    ClientToken(format!(
        "client-{}{}",
        base36(random),
        base36(since_epoch.as_millis() as u64)
    ))
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// IdempotencyResolver
// ---------------------------------------------------------------------------

pub struct IdempotencyResolver {
    gateway: Arc<dyn AttendanceGateway>,
    tokens: Arc<dyn TokenSource>,
    doctype: String,
}

impl IdempotencyResolver {
    pub fn new(gateway: Arc<dyn AttendanceGateway>, doctype: impl Into<String>) -> Self {
        Self {
            gateway,
            tokens: Arc::new(SecureTokenSource),
            doctype: doctype.into(),
        }
    }

    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn generate_token(&self) -> ClientToken {
        self.tokens.next_token()
    }

    /// `actor = <actor> AND token field = <token>`, one row.
    pub fn lookup_query(&self, actor: &str, token: &ClientToken) -> RecordQuery {
        RecordQuery {
            doctype: self.doctype.clone(),
            filters: vec![
                Filter::eq(&self.doctype, ACTOR_FIELD, actor),
                Filter::eq(&self.doctype, TOKEN_FIELD, token.as_str()),
            ],
            fields: vec!["name".to_string()],
            limit: 1,
        }
    }

    /// Id of the record already created for `(actor, token)`, if any.
    ///
    /// Tries the direct query first and the structured-body procedure second.
    /// If both fail the answer is `None`: duplicates become possible during a
    /// sustained lookup outage, and that is logged rather than hidden.
    pub async fn find_existing(&self, actor: &str, token: &ClientToken) -> Option<String> {
        let query = self.lookup_query(actor, token);

        let rows = match self.gateway.query(&query).await {
            Ok(rows) => rows,
            Err(primary) => {
                warn!(error = %primary, %token, "lookup failed, retrying as structured query");
                match self.gateway.query_structured(&query).await {
                    Ok(rows) => rows,
                    Err(fallback) => {
                        warn!(
                            primary = %primary,
                            fallback = %fallback,
                            %token,
                            "both lookups failed, assuming no existing record"
                        );
                        return None;
                    }
                }
            }
        };

        let existing = rows.iter().find_map(row_name).map(str::to_string);
        debug!(%token, existing = ?existing, "idempotency lookup");
        existing
    }
}

//! The remote record store, seen from the orchestrator.
//!
//! Implementations live outside this crate (`erpnext-client`). Whatever wire
//! envelope the store uses, rows reach callers as one canonical [`Row`]
//! sequence via [`normalize_rows`].

use async_trait::async_trait;
use serde::ser::{Serialize, SerializeTuple, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::photo::PhotoAsset;
use crate::types::{NewCheckin, StoredCoordinates};

/// One record as a field map.
pub type Row = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// GatewayError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Status { status: u16, message: Option<String> },

    /// The response arrived but its body was not what was expected.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Transport(_))
    }

    /// Human-readable cause, preferring the server's own words.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Status {
                message: Some(m), ..
            } if !m.trim().is_empty() => m.clone(),
            GatewayError::Status { status: 401, .. } => {
                "Not signed in or the session expired. Sign in again.".to_string()
            }
            GatewayError::Status { status: 403, .. } => {
                "Your account is not permitted to record attendance for this employee.".to_string()
            }
            GatewayError::Status { status: 417, .. } => {
                "The server rejected the record. Check the employee and try again.".to_string()
            }
            GatewayError::Status { status, .. } if *status >= 500 => {
                "Server error. Try again later or contact support if it persists.".to_string()
            }
            GatewayError::Transport(_) => {
                "Could not reach the server. Check the network connection and try again."
                    .to_string()
            }
            _ => "Unable to record check.".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Filter / RecordQuery
// ---------------------------------------------------------------------------

/// One `(resource type, field, operator, value)` condition. Serializes as a
/// four-element array, the shape the store's list endpoints expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub doctype: String,
    pub field: String,
    pub operator: String,
    pub value: String,
}

impl Filter {
    pub fn eq(doctype: &str, field: &str, value: impl Into<String>) -> Self {
        Self {
            doctype: doctype.to_string(),
            field: field.to_string(),
            operator: "=".to_string(),
            value: value.into(),
        }
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut t = s.serialize_tuple(4)?;
        t.serialize_element(&self.doctype)?;
        t.serialize_element(&self.field)?;
        t.serialize_element(&self.operator)?;
        t.serialize_element(&self.value)?;
        t.end()
    }
}

/// A conjunction of filters over one resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub doctype: String,
    pub filters: Vec<Filter>,
    pub fields: Vec<String>,
    pub limit: u32,
}

// ---------------------------------------------------------------------------
// AttendanceGateway
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AttendanceGateway: Send + Sync {
    /// Create a record; returns its id.
    async fn create(&self, record: &NewCheckin) -> Result<String, GatewayError>;

    /// Filtered list query, filters encoded in the request itself.
    async fn query(&self, query: &RecordQuery) -> Result<Vec<Row>, GatewayError>;

    /// The same query through the alternate procedure that takes the filters
    /// as a structured body.
    async fn query_structured(&self, query: &RecordQuery) -> Result<Vec<Row>, GatewayError>;

    /// Upload `photo` and attach it to `record_id`.
    async fn attach_file(&self, record_id: &str, photo: &PhotoAsset) -> Result<(), GatewayError>;

    /// Read the requested fields of one record.
    async fn fetch(&self, record_id: &str, fields: &[&str]) -> Result<Row, GatewayError>;
}

/// Fields read back after create or reuse to confirm stored coordinates.
pub const CONFIRM_FIELDS: &[&str] = &["name", "latitude", "longitude", "custom_lat", "custom_lng"];

/// Stored coordinates from a fetched row, standard fields first.
pub fn stored_coordinates(row: &Row) -> StoredCoordinates {
    let num = |keys: &[&str]| {
        keys.iter()
            .filter_map(|k| row.get(*k))
            .find_map(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
    };
    StoredCoordinates {
        lat: num(&["latitude", "custom_lat"]),
        lng: num(&["longitude", "custom_lng"]),
    }
}

// ---------------------------------------------------------------------------
// Envelope normalization
// ---------------------------------------------------------------------------

/// Flatten the store's response envelopes into a row list.
///
/// Accepts a bare list, `{"data": [...]}` or `{"message": [...]}`. Non-object
/// list entries are skipped; any other shape yields an empty list.
pub fn normalize_rows(value: Value) -> Vec<Row> {
    let list = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match (obj.remove("data"), obj.remove("message")) {
            (Some(Value::Array(items)), _) => items,
            (_, Some(Value::Array(items))) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    list.into_iter()
        .filter_map(|item| match item {
            Value::Object(row) => Some(row),
            _ => None,
        })
        .collect()
}

/// The `name` of a row, the store's record id.
pub fn row_name(row: &Row) -> Option<&str> {
    row.get("name").and_then(Value::as_str).filter(|s| !s.is_empty())
}

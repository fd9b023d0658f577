use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FieldmarkError;
use crate::idempotency::ClientToken;

// ---------------------------------------------------------------------------
// LogType
// ---------------------------------------------------------------------------

/// Direction of an attendance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogType {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
}

impl LogType {
    pub fn as_str(self) -> &'static str {
        match self {
            LogType::In => "IN",
            LogType::Out => "OUT",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogType {
    type Err = FieldmarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IN" => Ok(LogType::In),
            "OUT" => Ok(LogType::Out),
            _ => Err(FieldmarkError::InvalidLogType(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// LocationStatus
// ---------------------------------------------------------------------------

/// How the coordinates on a record were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStatus {
    Ok,
    Denied,
    Unavailable,
}

impl LocationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LocationStatus::Ok => "ok",
            LocationStatus::Denied => "denied",
            LocationStatus::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for LocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LocationStatus {
    type Err = FieldmarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(LocationStatus::Ok),
            "denied" => Ok(LocationStatus::Denied),
            "unavailable" => Ok(LocationStatus::Unavailable),
            _ => Err(FieldmarkError::InvalidLocationStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Employee
// ---------------------------------------------------------------------------

/// An actor as the remote roster describes it. `name` is the record id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_email: Option<String>,
}

impl Employee {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Display name, falling back to the record id.
    pub fn display_name(&self) -> &str {
        self.employee_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.name)
    }
}

// ---------------------------------------------------------------------------
// ActionRequest / NewCheckin
// ---------------------------------------------------------------------------

/// Who is being recorded, by whom, and in which direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub action: LogType,
    /// Employee id of the actor being checked in or out.
    pub actor: String,
    /// Employee id of the supervisor recording the action.
    pub scope: String,
}

impl ActionRequest {
    pub fn new(action: LogType, actor: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            action,
            actor: actor.into(),
            scope: scope.into(),
        }
    }
}

/// The body of a record creation, independent of the wire format.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCheckin {
    pub actor: String,
    pub scope: String,
    pub action: LogType,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub accuracy: Option<f64>,
    pub location_status: LocationStatus,
    pub token: ClientToken,
}

impl NewCheckin {
    /// `"lat,lng"` when both coordinates are present.
    pub fn combined_location(&self) -> Option<String> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(format!("{lat},{lng}")),
            _ => None,
        }
    }
}

/// Coordinates as the remote store reports them after a create or reuse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredCoordinates {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

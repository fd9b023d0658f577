//! Request bodies and response fragments specific to the Frappe REST API.

use fieldmark_core::gateway::Row;
use fieldmark_core::types::NewCheckin;
use serde_json::{json, Value};

/// Employee fields requested for roster listings.
pub(crate) const EMPLOYEE_FIELDS: &[&str] = &[
    "name",
    "employee_name",
    "department",
    "designation",
    "company",
    "user_id",
    "personal_email",
    "company_email",
];

/// Field on the Employee resource naming the site supervisor.
pub(crate) const SUPERVISOR_FIELD: &str = "custom_site_supervisor";

/// Create body for a check-in record. Coordinates go into both the custom
/// fields and the standard ones, plus the combined `"lat,lng"` text.
pub(crate) fn checkin_body(rec: &NewCheckin) -> Value {
    let mut body = json!({
        "employee": rec.actor,
        "log_type": rec.action.as_str(),
        "custom_site_supervisor": rec.scope,
        "custom_location_status": rec.location_status,
        "location_status": rec.location_status,
        "custom_client_uuid": rec.token,
    });
    if let Value::Object(map) = &mut body {
        if let (Some(lat), Some(lng)) = (rec.lat, rec.lng) {
            map.insert("custom_lat".into(), json!(lat));
            map.insert("custom_lng".into(), json!(lng));
            map.insert("latitude".into(), json!(lat));
            map.insert("longitude".into(), json!(lng));
        }
        if let Some(accuracy) = rec.accuracy {
            map.insert("custom_accuracy".into(), json!(accuracy));
        }
        if let Some(location) = rec.combined_location() {
            map.insert("location".into(), Value::String(location));
        }
    }
    body
}

/// `data` of a `{"data": {...}}` envelope.
pub(crate) fn data_object(value: Value) -> Option<Row> {
    match value {
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Object(row)) => Some(row),
            _ => None,
        },
        _ => None,
    }
}

/// Best human-readable message in a Frappe error body.
///
/// Frappe puts user-facing text in `_server_messages` (a JSON-encoded list of
/// JSON-encoded objects), sometimes in `message`, and the raw exception in
/// `exception`.
pub(crate) fn server_message(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;

    if let Some(raw) = v.get("_server_messages").and_then(Value::as_str) {
        let messages: Vec<String> = serde_json::from_str::<Vec<String>>(raw)
            .unwrap_or_default()
            .iter()
            .filter_map(|s| serde_json::from_str::<Value>(s).ok())
            .filter_map(|m| m.get("message").and_then(Value::as_str).map(strip_tags))
            .filter(|m| !m.is_empty())
            .collect();
        if !messages.is_empty() {
            return Some(messages.join("; "));
        }
    }

    if let Some(m) = v.get("message").and_then(Value::as_str) {
        let m = strip_tags(m);
        if !m.is_empty() {
            return Some(m);
        }
    }

    v.get("exception")
        .and_then(Value::as_str)
        .map(|e| e.split_once(": ").map(|(_, msg)| msg).unwrap_or(e))
        .map(strip_tags)
        .filter(|m| !m.is_empty())
}

fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

//! Supervisor scope: who is recording, and which actors they may record.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::gateway::GatewayError;
use crate::types::Employee;

#[async_trait]
pub trait RosterProvider: Send + Sync {
    /// Map a login name to the supervisor's own employee record.
    async fn resolve_supervisor(&self, user: &str) -> Result<Option<Employee>, GatewayError>;

    /// Employees whose site supervisor is `supervisor`.
    async fn managed_employees(&self, supervisor: &Employee)
        -> Result<Vec<Employee>, GatewayError>;
}

/// Supervisor first, then the managed list, without duplicate ids.
pub fn display_roster(supervisor: Option<&Employee>, managed: &[Employee]) -> Vec<Employee> {
    let mut seen = HashSet::new();
    supervisor
        .into_iter()
        .chain(managed.iter())
        .filter(|e| !e.name.is_empty() && seen.insert(e.name.clone()))
        .cloned()
        .collect()
}

/// Case-insensitive match on name, id, department or designation.
pub fn filter_roster<'a>(roster: &'a [Employee], term: &str) -> Vec<&'a Employee> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return roster.iter().collect();
    }
    let hit = |field: &Option<String>| {
        field
            .as_deref()
            .is_some_and(|v| v.to_lowercase().contains(&term))
    };
    roster
        .iter()
        .filter(|e| {
            e.name.to_lowercase().contains(&term)
                || hit(&e.employee_name)
                || hit(&e.department)
                || hit(&e.designation)
        })
        .collect()
}

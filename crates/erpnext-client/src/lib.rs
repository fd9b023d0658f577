//! `erpnext-client`: async HTTP gateway to an ERPNext/Frappe site.
//!
//! [`ErpClient`] implements the two seams `fieldmark-core` awaits on:
//!
//! ```text
//! Orchestrator ──► AttendanceGateway ─┐
//!                                     ├─► ErpClient ──► /api/resource/…
//! CLI roster   ──► RosterProvider  ───┘                 /api/method/…
//! ```
//!
//! Authentication is either an API key pair sent on every request or a
//! password login whose session cookie stays in the client's cookie store.

pub mod client;
pub mod error;
mod wire;

pub use client::ErpClient;
pub use error::ErpError;

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ErpError>;

pub mod auth;
pub mod config;
pub mod device;
pub mod error;
pub mod gateway;
pub mod idempotency;
pub mod io;
pub mod location;
pub mod orchestrator;
pub mod paths;
pub mod photo;
pub mod roster;
pub mod types;

#[cfg(test)]
pub(crate) mod fakes;

pub use error::{FieldmarkError, Result};

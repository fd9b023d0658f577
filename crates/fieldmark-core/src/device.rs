//! Device capabilities the orchestrator awaits on: the capture surface and
//! the geolocation sensor. Both are owned by the host (browser, phone, CLI);
//! this crate only sees them as awaitable operations.

use async_trait::async_trait;
use std::time::Duration;

use crate::location::LocationError;

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// A picture as it comes off the capture surface, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCapture {
    pub bytes: Vec<u8>,
    /// Declared media type, if the surface reported one.
    pub media_type: Option<String>,
    pub file_name: String,
}

#[async_trait]
pub trait CaptureSurface: Send + Sync {
    /// Open the surface and wait for the user.
    ///
    /// Returns `None` when the surface was closed without producing a file.
    async fn capture(&self) -> Option<RawCapture>;
}

// ---------------------------------------------------------------------------
// Geolocation
// ---------------------------------------------------------------------------

/// Options passed to a single position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    /// Upper bound on how long the sensor may take.
    pub timeout: Duration,
    /// How old an OS-cached fix may be and still be returned.
    /// `Duration::ZERO` forces a fresh fix.
    pub maximum_age: Duration,
}

/// A raw position from the sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: Option<f64>,
}

#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_position(&self, opts: PositionOptions) -> Result<Fix, LocationError>;
}

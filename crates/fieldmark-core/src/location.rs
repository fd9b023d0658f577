//! Location Provider: acquires device position and keeps the single most
//! recent sample for the session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::LocationConfig;
use crate::device::{Geolocator, PositionOptions};

// ---------------------------------------------------------------------------
// LocationError
// ---------------------------------------------------------------------------

/// Why a position could not be obtained. Never retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("timed out waiting for a location fix")]
    Timeout,
    #[error("geolocation is not supported on this device")]
    Unsupported,
}

impl LocationError {
    pub fn code(self) -> u16 {
        match self {
            LocationError::PermissionDenied => 1,
            LocationError::PositionUnavailable => 2,
            LocationError::Timeout => 3,
            LocationError::Unsupported => 0,
        }
    }

    pub fn code_label(self) -> &'static str {
        match self {
            LocationError::PermissionDenied => "PERMISSION_DENIED",
            LocationError::PositionUnavailable => "POSITION_UNAVAILABLE",
            LocationError::Timeout => "TIMEOUT",
            LocationError::Unsupported => "UNSUPPORTED",
        }
    }

    /// What the user can do about it.
    pub fn guidance(self) -> &'static str {
        match self {
            LocationError::PermissionDenied => {
                "Location access was denied. Allow location for this app in the device settings, then try again."
            }
            LocationError::PositionUnavailable => {
                "The device could not determine its position. Move to an open area or enable GPS, then try again."
            }
            LocationError::Timeout => {
                "Getting a location fix took too long. Check that GPS is on and try again."
            }
            LocationError::Unsupported => {
                "This device cannot provide a location. Use a device with location services."
            }
        }
    }
}

// ---------------------------------------------------------------------------
// LocationSample
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl LocationSample {
    /// A sample is fresh iff `now - timestamp <= max_age`.
    pub fn is_fresh_at(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        let age_ms = (now - self.timestamp).num_milliseconds();
        let max_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        age_ms <= max_ms
    }
}

// ---------------------------------------------------------------------------
// LocationProvider
// ---------------------------------------------------------------------------

/// Owns the session's "last known location" slot.
///
/// The slot has one writer (the acquire methods) and the lock is never held
/// across an await, so it is only ever taken uncontended.
pub struct LocationProvider {
    geolocator: Arc<dyn Geolocator>,
    timeout: Duration,
    fast_max_age: Duration,
    last: Mutex<Option<LocationSample>>,
}

impl LocationProvider {
    pub fn new(geolocator: Arc<dyn Geolocator>, cfg: &LocationConfig) -> Self {
        Self {
            geolocator,
            timeout: cfg.timeout(),
            fast_max_age: cfg.fast_max_age(),
            last: Mutex::new(None),
        }
    }

    /// The cached sample if it is no older than `max_age`. No side effects.
    pub fn get_cached(&self, max_age: Duration) -> Option<LocationSample> {
        self.cached_at(max_age, Utc::now())
    }

    fn cached_at(&self, max_age: Duration, now: DateTime<Utc>) -> Option<LocationSample> {
        let last = *self.last.lock().unwrap_or_else(|e| e.into_inner());
        last.filter(|s| s.is_fresh_at(max_age, now))
    }

    /// High-accuracy fix that tolerates an OS-cached position.
    pub async fn acquire_fast(&self) -> Result<LocationSample, LocationError> {
        self.acquire(PositionOptions {
            high_accuracy: true,
            timeout: self.timeout,
            maximum_age: self.fast_max_age,
        })
        .await
    }

    /// Like [`acquire_fast`](Self::acquire_fast) but forces a fresh fix.
    pub async fn acquire_fresh(&self) -> Result<LocationSample, LocationError> {
        self.acquire(PositionOptions {
            high_accuracy: true,
            timeout: self.timeout,
            maximum_age: Duration::ZERO,
        })
        .await
    }

    async fn acquire(&self, opts: PositionOptions) -> Result<LocationSample, LocationError> {
        let fix = tokio::time::timeout(opts.timeout, self.geolocator.current_position(opts))
            .await
            .map_err(|_| LocationError::Timeout)??;

        let sample = LocationSample {
            lat: fix.lat,
            lng: fix.lng,
            accuracy: fix.accuracy,
            timestamp: Utc::now(),
        };
        debug!(
            lat = sample.lat,
            lng = sample.lng,
            accuracy = ?sample.accuracy,
            fresh = opts.maximum_age.is_zero(),
            "location acquired"
        );
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(sample);
        Ok(sample)
    }

    #[cfg(test)]
    pub(crate) fn prime(&self, sample: LocationSample) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(sample);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Device stand-ins for a terminal: a photo file is the capture surface and
//! the fix comes from flags.

use async_trait::async_trait;
use fieldmark_core::device::{CaptureSurface, Fix, Geolocator, PositionOptions, RawCapture};
use fieldmark_core::location::LocationError;
use std::path::PathBuf;
use tracing::warn;

/// Reads one photo from disk. An unreadable file counts as a closed surface.
pub struct FileCapture {
    path: PathBuf,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CaptureSurface for FileCapture {
    async fn capture(&self) -> Option<RawCapture> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) if !b.is_empty() => b,
            Ok(_) => {
                warn!(path = %self.path.display(), "photo file is empty");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read photo");
                return None;
            }
        };
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo.jpg".to_string());
        Some(RawCapture {
            bytes,
            media_type: mime_guess::from_path(&self.path)
                .first()
                .map(|m| m.essence_str().to_string()),
            file_name,
        })
    }
}

/// Answers every position request with the same fix or error.
pub struct FixedGeolocator {
    result: Result<Fix, LocationError>,
}

impl FixedGeolocator {
    pub fn new(lat: Option<f64>, lng: Option<f64>, accuracy: Option<f64>, deny: bool) -> Self {
        let result = match (deny, lat, lng) {
            (true, _, _) => Err(LocationError::PermissionDenied),
            (false, Some(lat), Some(lng)) => Ok(Fix { lat, lng, accuracy }),
            _ => Err(LocationError::PositionUnavailable),
        };
        Self { result }
    }
}

#[async_trait]
impl Geolocator for FixedGeolocator {
    async fn current_position(&self, _opts: PositionOptions) -> Result<Fix, LocationError> {
        self.result
    }
}

//! Photo Normalizer: re-encodes a captured picture into a canonical
//! orientation and format before upload.
//!
//! Phone cameras usually store pixels in sensor orientation and record the
//! intended rotation in EXIF tag 0x0112. Decoding, applying that rotation and
//! re-encoding produces an image that displays correctly everywhere, and
//! drops the EXIF block in the process.
//!
//! Normalization never blocks a submission: anything that cannot be decoded
//! or re-encoded is passed through untouched.

use image::{DynamicImage, ImageFormat, ImageOutputFormat};
use std::fmt;
use std::io::Cursor;
use tracing::{debug, warn};

use crate::device::RawCapture;

/// Re-encode quality for JPEG output.
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

const FALLBACK_MEDIA_TYPE: &str = "image/jpeg";

// ---------------------------------------------------------------------------
// PhotoAsset
// ---------------------------------------------------------------------------

/// A photo owned by exactly one pending action.
///
/// Not `Clone`: whoever holds it is the owner, and [`release`](Self::release)
/// (or dropping) ends its life on retake, close, or teardown.
pub struct PhotoAsset {
    bytes: Vec<u8>,
    media_type: String,
    file_name: String,
}

impl PhotoAsset {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
            file_name: file_name.into(),
        }
    }

    pub fn from_capture(raw: RawCapture) -> Self {
        let media_type = raw
            .media_type
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| FALLBACK_MEDIA_TYPE.to_string());
        Self::new(raw.bytes, media_type, raw.file_name)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Explicitly give up the photo.
    pub fn release(self) {
        debug!(file = %self.file_name, bytes = self.bytes.len(), "photo released");
    }
}

impl fmt::Debug for PhotoAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhotoAsset")
            .field("file_name", &self.file_name)
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PhotoNormalizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct PhotoNormalizer {
    jpeg_quality: u8,
}

impl Default for PhotoNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl PhotoNormalizer {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// [`normalize`](Self::normalize) on tokio's blocking pool. If the
    /// worker dies the original photo comes back, as with any other failure.
    pub async fn normalize_blocking(&self, photo: PhotoAsset) -> PhotoAsset {
        let normalizer = *self;
        let original = PhotoAsset::new(
            photo.bytes.clone(),
            photo.media_type.clone(),
            photo.file_name.clone(),
        );
        match tokio::task::spawn_blocking(move || normalizer.normalize(photo)).await {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(file = %original.file_name, error = %e, "photo normalization task failed");
                original
            }
        }
    }

    /// Decode honoring EXIF orientation and re-encode.
    ///
    /// PNG input stays PNG; everything else that decodes becomes JPEG at the
    /// configured quality. On any failure the original photo is returned.
    pub fn normalize(&self, photo: PhotoAsset) -> PhotoAsset {
        match self.reencode(&photo) {
            Ok(normalized) => {
                debug!(
                    file = %normalized.file_name,
                    before = photo.len(),
                    after = normalized.len(),
                    media_type = %normalized.media_type,
                    "photo normalized"
                );
                normalized
            }
            Err(e) => {
                debug!(file = %photo.file_name, error = %e, "photo passed through unnormalized");
                photo
            }
        }
    }

    fn reencode(&self, photo: &PhotoAsset) -> image::ImageResult<PhotoAsset> {
        let format = image::guess_format(&photo.bytes)?;
        let decoded = image::load_from_memory_with_format(&photo.bytes, format)?;
        let oriented = apply_orientation(decoded, read_exif_orientation(&photo.bytes));

        let mut buf = Vec::new();
        let media_type = match format {
            ImageFormat::Png => {
                oriented.write_to(&mut buf, ImageOutputFormat::Png)?;
                "image/png"
            }
            _ => {
                let rgb = DynamicImage::ImageRgb8(oriented.to_rgb8());
                rgb.write_to(&mut buf, ImageOutputFormat::Jpeg(self.jpeg_quality))?;
                "image/jpeg"
            }
        };

        Ok(PhotoAsset::new(buf, media_type, photo.file_name.clone()))
    }
}

/// Read EXIF orientation from raw image bytes.
/// Returns 1 (normal) if there is no EXIF block or no orientation tag.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let exif = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(e) => e,
        Err(_) => return 1,
    };

    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// 1 normal, 2 mirrored, 3 180°, 4 flipped, 5 mirrored + 90° CW,
/// 6 90° CW, 7 mirrored + 270° CW, 8 270° CW.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{sample_jpeg, sample_png, with_orientation};
    use image::GenericImageView;

    #[test]
    fn undecodable_input_is_returned_unchanged() {
        let original = b"definitely not an image".to_vec();
        let photo = PhotoAsset::new(original.clone(), "image/heic", "p.heic");
        let out = PhotoNormalizer::default().normalize(photo);
        assert_eq!(out.bytes(), original.as_slice());
        assert_eq!(out.media_type(), "image/heic");
        assert_eq!(out.file_name(), "p.heic");
    }

    #[test]
    fn truncated_jpeg_is_returned_unchanged() {
        let mut bytes = sample_jpeg(8, 4);
        bytes.truncate(24);
        let photo = PhotoAsset::new(bytes.clone(), "image/jpeg", "cut.jpg");
        let out = PhotoNormalizer::default().normalize(photo);
        assert_eq!(out.bytes(), bytes.as_slice());
    }

    #[test]
    fn png_stays_png() {
        let photo = PhotoAsset::new(sample_png(4, 2), "image/png", "a.png");
        let out = PhotoNormalizer::default().normalize(photo);
        assert_eq!(out.media_type(), "image/png");
        let decoded = image::load_from_memory(out.bytes()).unwrap();
        assert_eq!(decoded.dimensions(), (4, 2));
    }

    #[test]
    fn jpeg_orientation_is_applied() {
        let bytes = with_orientation(&sample_jpeg(8, 4), 6);
        assert_eq!(read_exif_orientation(&bytes), 6);

        let photo = PhotoAsset::new(bytes, "image/jpeg", "rot.jpg");
        let out = PhotoNormalizer::default().normalize(photo);
        assert_eq!(out.media_type(), "image/jpeg");
        let decoded = image::load_from_memory(out.bytes()).unwrap();
        assert_eq!(decoded.dimensions(), (4, 8));
        // Re-encoding drops the EXIF block, so the output is canonical.
        assert_eq!(read_exif_orientation(out.bytes()), 1);
    }

    #[tokio::test]
    async fn blocking_pool_normalization_matches_inline() {
        let bytes = with_orientation(&sample_jpeg(8, 4), 6);
        let photo = PhotoAsset::new(bytes, "image/jpeg", "rot.jpg");
        let out = PhotoNormalizer::default().normalize_blocking(photo).await;
        let decoded = image::load_from_memory(out.bytes()).unwrap();
        assert_eq!(decoded.dimensions(), (4, 8));
        assert_eq!(out.file_name(), "rot.jpg");

        let junk = PhotoAsset::new(b"junk".to_vec(), "image/heic", "p.heic");
        let out = PhotoNormalizer::default().normalize_blocking(junk).await;
        assert_eq!(out.bytes(), b"junk");
        assert_eq!(out.media_type(), "image/heic");
    }

    #[test]
    fn orientation_defaults_to_normal_without_exif() {
        assert_eq!(read_exif_orientation(&sample_png(2, 2)), 1);
        assert_eq!(read_exif_orientation(b""), 1);
    }

    #[test]
    fn capture_without_media_type_defaults_to_jpeg() {
        let raw = RawCapture {
            bytes: vec![1, 2, 3],
            media_type: None,
            file_name: "x".into(),
        };
        let photo = PhotoAsset::from_capture(raw);
        assert_eq!(photo.media_type(), "image/jpeg");
        assert_eq!(photo.len(), 3);
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(PhotoNormalizer::new(0).jpeg_quality, 1);
        assert_eq!(PhotoNormalizer::new(250).jpeg_quality, 100);
    }
}

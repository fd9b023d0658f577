use crate::error::{FieldmarkError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ErpConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErpConfig {
    pub base_url: String,
    #[serde(default = "default_checkin_doctype")]
    pub checkin_doctype: String,
    #[serde(default = "default_employee_doctype")]
    pub employee_doctype: String,
}

fn default_checkin_doctype() -> String {
    "Employee Checkin".to_string()
}

fn default_employee_doctype() -> String {
    "Employee".to_string()
}

impl ErpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            checkin_doctype: default_checkin_doctype(),
            employee_doctype: default_employee_doctype(),
        }
    }
}

// ---------------------------------------------------------------------------
// LocationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Maximum age of the session's cached sample before a new fix is needed.
    #[serde(default = "default_freshness_ms")]
    pub freshness_ms: u64,
    /// Upper bound on a single acquisition.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// How old an OS-cached fix the fast path accepts.
    #[serde(default = "default_fast_max_age_ms")]
    pub fast_max_age_ms: u64,
}

fn default_freshness_ms() -> u64 {
    30_000
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_fast_max_age_ms() -> u64 {
    60_000
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            freshness_ms: default_freshness_ms(),
            timeout_ms: default_timeout_ms(),
            fast_max_age_ms: default_fast_max_age_ms(),
        }
    }
}

impl LocationConfig {
    pub fn freshness(&self) -> Duration {
        Duration::from_millis(self.freshness_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn fast_max_age(&self) -> Duration {
        Duration::from_millis(self.fast_max_age_ms)
    }
}

// ---------------------------------------------------------------------------
// PhotoConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoConfig {
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_jpeg_quality() -> u8 {
    crate::photo::DEFAULT_JPEG_QUALITY
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

// ---------------------------------------------------------------------------
// SubmissionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// How long a successful settlement stays visible before the machine
    /// reads as idle again.
    #[serde(default = "default_confirmation_window_ms")]
    pub confirmation_window_ms: u64,
}

fn default_confirmation_window_ms() -> u64 {
    1_500
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            confirmation_window_ms: default_confirmation_window_ms(),
        }
    }
}

impl SubmissionConfig {
    pub fn confirmation_window(&self) -> Duration {
        Duration::from_millis(self.confirmation_window_ms)
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub erp: ErpConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub photo: PhotoConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            version: 1,
            erp: ErpConfig::new(base_url),
            location: LocationConfig::default(),
            photo: PhotoConfig::default(),
            submission: SubmissionConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(FieldmarkError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let base = self.erp.base_url.trim();
        if base.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "erp.base_url is empty".to_string(),
            });
        } else if !(base.starts_with("http://") || base.starts_with("https://")) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("erp.base_url '{base}' must start with http:// or https://"),
            });
        } else if base.starts_with("http://") {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "erp.base_url uses plain http; credentials travel unencrypted"
                    .to_string(),
            });
        }

        if self.erp.checkin_doctype.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "erp.checkin_doctype is empty".to_string(),
            });
        }

        if self.location.timeout_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "location.timeout_ms must be greater than zero".to_string(),
            });
        }

        if self.location.freshness_ms > self.location.fast_max_age_ms {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "location.freshness_ms ({}) exceeds fast_max_age_ms ({}); cached samples may outlive OS fixes",
                    self.location.freshness_ms, self.location.fast_max_age_ms
                ),
            });
        }

        if !(1..=100).contains(&self.photo.jpeg_quality) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "photo.jpeg_quality {} is outside 1..=100",
                    self.photo.jpeg_quality
                ),
            });
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_acquisition_policy() {
        let cfg = Config::new("https://erp.example.com");
        assert_eq!(cfg.location.freshness(), Duration::from_secs(30));
        assert_eq!(cfg.location.timeout(), Duration::from_secs(10));
        assert_eq!(cfg.location.fast_max_age(), Duration::from_secs(60));
        assert_eq!(cfg.photo.jpeg_quality, 92);
        assert_eq!(cfg.erp.checkin_doctype, "Employee Checkin");
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn load_without_file_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(FieldmarkError::NotInitialized)
        ));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("https://erp.example.com");
        cfg.location.freshness_ms = 5_000;
        cfg.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.erp.base_url, "https://erp.example.com");
        assert_eq!(loaded.location.freshness_ms, 5_000);
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let cfg: Config = serde_yaml::from_str("erp:\n  base_url: https://x.test\n").unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.submission.confirmation_window_ms, 1_500);
        assert_eq!(cfg.erp.employee_doctype, "Employee");
    }

    #[test]
    fn validate_flags_bad_values() {
        let mut cfg = Config::new("ftp://erp");
        cfg.photo.jpeg_quality = 0;
        cfg.location.timeout_ms = 0;
        let warnings = cfg.validate();
        let errors = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .count();
        assert_eq!(errors, 3);
    }

    #[test]
    fn validate_warns_on_plain_http_and_long_freshness() {
        let mut cfg = Config::new("http://erp.local");
        cfg.location.freshness_ms = 120_000;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.level == WarnLevel::Warning));
    }
}

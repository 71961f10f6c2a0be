//! Application settings loading from config.toml
//!
//! Settings are read from `config.toml` (or the file named by `CONFIG_PATH`) and a few
//! secrets can be overridden from the environment, which `dotenvy` populates from `.env`.

use crate::config::tiers::TierConfig;
use crate::core::qr::QrCodec;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

const fn default_interval_secs() -> u64 {
    24 * 3600
}

/// Root of config.toml
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// QR token signing settings
    pub qr: QrSettings,
    /// Background job cadence
    #[serde(default)]
    pub schedule: ScheduleSettings,
    /// Membership tiers and their benefits
    #[serde(default)]
    pub tiers: Vec<TierConfig>,
}

/// QR token signing settings
#[derive(Debug, Deserialize, Clone)]
pub struct QrSettings {
    /// HMAC key for ticket tokens
    #[serde(default)]
    pub signing_key: String,
}

/// How often the daemon fires each job
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ScheduleSettings {
    /// Seconds between allocation ticks
    #[serde(default = "default_interval_secs")]
    pub allocation_interval_secs: u64,
    /// Seconds between expiration sweeps
    #[serde(default = "default_interval_secs")]
    pub expiration_interval_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            allocation_interval_secs: default_interval_secs(),
            expiration_interval_secs: default_interval_secs(),
        }
    }
}

impl Settings {
    /// Parses settings from a TOML string and validates them.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let settings: Self = toml::from_str(contents).map_err(|e| Error::Config {
            message: format!("Failed to parse config.toml: {e}"),
        })?;
        Ok(settings)
    }

    /// Checks invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.qr.signing_key.trim().is_empty() {
            return Err(Error::Config {
                message: "qr.signing_key is empty (set it in config.toml or QR_SIGNING_KEY)"
                    .to_string(),
            });
        }
        for tier in &self.tiers {
            if tier.quarterly_credits < 0
                || tier.companion_slots < 0
                || tier.vip_vouchers_per_quarter < 0
            {
                return Err(Error::Config {
                    message: format!("tier {} has a negative benefit", tier.name),
                });
            }
        }
        Ok(())
    }

    /// Builds the ticket token codec from the signing key.
    #[must_use]
    pub fn qr_codec(&self) -> QrCodec {
        QrCodec::new(self.qr.signing_key.as_bytes())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("QR_SIGNING_KEY") {
            self.qr.signing_key = key;
        }
    }
}

/// Loads settings from a TOML file, applies environment overrides and validates.
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - The signing key is missing or a tier has negative benefits
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    debug!("Loading settings from {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    let mut settings = Settings::from_toml_str(&contents)?;
    settings.apply_env_overrides();
    settings.validate()?;
    info!(tiers = settings.tiers.len(), "Settings loaded");
    Ok(settings)
}

/// Loads settings from `CONFIG_PATH`, defaulting to ./config.toml
pub fn load_default_settings() -> Result<Settings> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_settings(path)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_settings() {
        let toml_str = r#"
            [qr]
            signing_key = "test-key"

            [schedule]
            expiration_interval_secs = 600

            [[tiers]]
            name = "insider"
            quarterly_credits = 2
        "#;

        let settings = Settings::from_toml_str(toml_str).unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.qr.signing_key, "test-key");
        assert_eq!(settings.schedule.expiration_interval_secs, 600);
        assert_eq!(settings.schedule.allocation_interval_secs, 86_400);
        assert_eq!(settings.tiers.len(), 1);
    }

    #[test]
    fn test_empty_signing_key_is_rejected() {
        let settings = Settings::from_toml_str("[qr]\nsigning_key = \"  \"\n").unwrap();
        assert!(matches!(settings.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_negative_tier_benefit_is_rejected() {
        let toml_str = r#"
            [qr]
            signing_key = "k"

            [[tiers]]
            name = "broken"
            quarterly_credits = -1
        "#;
        let settings = Settings::from_toml_str(toml_str).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let settings = Settings::from_toml_str(include_str!("../../config.toml")).unwrap();
        settings.validate().unwrap();
        assert!(crate::config::tiers::find_tier(&settings.tiers, "legend").is_some());
    }

    #[test]
    fn test_missing_file() {
        let result = load_settings("/nonexistent/config.toml");
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}

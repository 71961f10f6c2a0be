/// Database connection and schema creation
pub mod database;

/// Application settings loading from config.toml and the environment
pub mod settings;

/// Membership tier benefits
pub mod tiers;

pub use settings::{QrSettings, ScheduleSettings, Settings, load_default_settings, load_settings};
pub use tiers::TierConfig;

//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod instant;
pub mod logging;
pub mod media;
pub mod store;
pub mod sweep;
pub mod uploader;

use serde::{Deserialize, Serialize};

use self::instant::InstantUploadConfig;
use self::logging::LoggingConfig;
use self::media::MediaConfig;
use self::store::StoreConfig;
use self::sweep::SweepConfig;
use self::uploader::UploaderConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Durable queue store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Upload scheduler settings.
    #[serde(default)]
    pub uploader: UploaderConfig,
    /// Media export preferences.
    #[serde(default)]
    pub media: MediaConfig,
    /// Instant upload settings.
    #[serde(default)]
    pub instant_upload: InstantUploadConfig,
    /// Periodic sweep settings.
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `SHOEBOX__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("SHOEBOX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}

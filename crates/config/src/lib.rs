//! Application settings stored as a single JSON file.
//!
//! Every section is optional in the file; missing fields take their
//! defaults. A missing file is the default configuration.

use envprobe_kernel::RaceConfig;
use envprobe_render::{EnvironmentConfig, MaterialSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("environment resolution {0} is not a power of two")]
    Resolution(u32),
    #[error("refractive index must be positive, got {0}")]
    RefractiveIndex(f32),
    #[error("race.{field} must be positive")]
    Race { field: &'static str },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub race: RaceConfig,
    pub environment: EnvironmentConfig,
    pub material: MaterialSettings,
}

impl AppConfig {
    /// Read and validate `path`; defaults if it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let config: Self = serde_json::from_reader(std::fs::File::open(path)?)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        self.validate()?;
        serde_json::to_writer_pretty(std::fs::File::create(path)?, self)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.environment.is_valid() {
            return Err(ConfigError::Resolution(self.environment.resolution));
        }
        let ior = self.material.refractive_index;
        if !(ior > 0.0 && ior.is_finite()) {
            return Err(ConfigError::RefractiveIndex(ior));
        }
        if self.race.updates_per_second == 0 {
            return Err(ConfigError::Race {
                field: "updates_per_second",
            });
        }
        if self.race.time_limit_secs == 0 {
            return Err(ConfigError::Race {
                field: "time_limit_secs",
            });
        }
        Ok(())
    }
}

//! Engine configuration
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{PlaybackError, Result};
use crate::queue::WINDOW_RADIUS;
use crate::types::AudioQuality;

/// Tunables for the playback engine
///
/// The recovery constants are safe defaults rather than fixed law; hosts can
/// override them from a file or the environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlaybackConfig {
    /// Tracks kept on each side of the current one in the published window
    #[serde(default = "default_window_radius")]
    pub window_radius: usize,

    /// Time allowed from switch start to the first "playable" signal
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    /// Time allowed without progress once the sink reports a stall
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,

    /// In-place stall retries per switch before giving up on the track
    #[serde(default = "default_max_stall_retries")]
    pub max_stall_retries: u32,

    /// Consecutive failures after which playback halts
    #[serde(default = "default_failure_ceiling")]
    pub failure_ceiling: u32,

    /// Delay before an automatic advance after a failure
    #[serde(default = "default_advance_delay_ms")]
    pub advance_delay_ms: u64,

    /// Quality requested from deferred resolvers
    #[serde(default)]
    pub default_quality: AudioQuality,
}

impl PlaybackConfig {
    /// Load configuration from an optional TOML file and the environment
    ///
    /// Environment variables use the `LINKTUNE_` prefix, e.g.
    /// `LINKTUNE_LOAD_TIMEOUT_MS=15000`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        if let Some(path) = path {
            settings = settings.add_source(config::File::from(path).required(false));
        }

        settings = settings.add_source(
            config::Environment::with_prefix("LINKTUNE")
                .prefix_separator("_")
                .try_parsing(true),
        );

        let config: Self = settings
            .build()
            .map_err(|e| PlaybackError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| PlaybackError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.load_timeout_ms == 0 {
            return Err(PlaybackError::Config(
                "load_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.stall_timeout_ms == 0 {
            return Err(PlaybackError::Config(
                "stall_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.failure_ceiling == 0 {
            return Err(PlaybackError::Config(
                "failure_ceiling must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    pub fn advance_delay(&self) -> Duration {
        Duration::from_millis(self.advance_delay_ms)
    }
}

// Default values
fn default_window_radius() -> usize {
    WINDOW_RADIUS
}

fn default_load_timeout_ms() -> u64 {
    20_000
}

fn default_stall_timeout_ms() -> u64 {
    12_000
}

fn default_max_stall_retries() -> u32 {
    1
}

fn default_failure_ceiling() -> u32 {
    5
}

fn default_advance_delay_ms() -> u64 {
    500
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            window_radius: default_window_radius(),
            load_timeout_ms: default_load_timeout_ms(),
            stall_timeout_ms: default_stall_timeout_ms(),
            max_stall_retries: default_max_stall_retries(),
            failure_ceiling: default_failure_ceiling(),
            advance_delay_ms: default_advance_delay_ms(),
            default_quality: AudioQuality::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PlaybackConfig::default();
        assert_eq!(config.window_radius, 50);
        assert_eq!(config.load_timeout(), Duration::from_secs(20));
        assert_eq!(config.stall_timeout(), Duration::from_secs(12));
        assert_eq!(config.max_stall_retries, 1);
        assert_eq!(config.failure_ceiling, 5);
        assert_eq!(config.advance_delay(), Duration::from_millis(500));
        assert_eq!(config.default_quality, AudioQuality::High);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linktune.toml");
        std::fs::write(
            &path,
            "failure_ceiling = 3\nstall_timeout_ms = 8000\ndefault_quality = \"medium\"\n",
        )
        .unwrap();

        let config = PlaybackConfig::load(Some(&path)).unwrap();
        assert_eq!(config.failure_ceiling, 3);
        assert_eq!(config.stall_timeout_ms, 8000);
        assert_eq!(config.default_quality, AudioQuality::Medium);
        assert_eq!(config.load_timeout_ms, 20_000);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlaybackConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, PlaybackConfig::default());
    }

    #[test]
    fn zero_ceiling_is_rejected() {
        let config = PlaybackConfig {
            failure_ceiling: 0,
            ..PlaybackConfig::default()
        };
        assert!(matches!(config.validate(), Err(PlaybackError::Config(_))));
    }
}

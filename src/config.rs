//! Configuration loading for the chamber acquisition core.
//!
//! Configuration is loaded with figment from:
//! 1. a TOML file (base configuration)
//! 2. environment variables prefixed with `CHAMBER_`
//!
//! After loading, [`ChamberConfig::validate`] performs the semantic checks
//! that parsing alone cannot express (positive intervals, a history window
//! at least as long as one poll period, a sane failure threshold).
//!
//! # Example
//! ```no_run
//! use chamber_daq::config::ChamberConfig;
//!
//! # fn main() -> chamber_daq::AppResult<()> {
//! let config = ChamberConfig::load_from("config/chamber.toml")?;
//! config.validate()?;
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppResult, ChamberError};

/// Top-level configuration for the acquisition core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChamberConfig {
    /// Serial link settings.
    #[serde(default)]
    pub serial: SerialConfig,
    /// Polling-loop settings.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Charting-history settings.
    #[serde(default)]
    pub chart: ChartConfig,
    /// Session-log settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port path, e.g. `/dev/ttyACM0`.
    pub port: String,
    /// Baud rate.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Per-query reply timeout in milliseconds.
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_ms: u64,
}

/// Polling-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Poll period in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Consecutive poll failures that trip the connection-lost condition.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

/// Charting-history settings.
///
/// The per-quantity buffer capacity is derived as history window divided
/// by poll interval; it is not configured independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Length of the in-memory charting window in seconds.
    #[serde(default = "default_history_window")]
    pub history_window_secs: u64,
    /// Suggested chart redraw period for the presentation layer, ms.
    #[serde(default = "default_redraw_interval")]
    pub redraw_interval_ms: u64,
}

/// Session-log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory session log files are created in.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

// Default value functions

fn default_baud_rate() -> u32 {
    115_200
}

fn default_reply_timeout() -> u64 {
    500
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_failure_threshold() -> u32 {
    1
}

fn default_history_window() -> u64 {
    3600
}

fn default_redraw_interval() -> u64 {
    500
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud_rate(),
            reply_timeout_ms: default_reply_timeout(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            history_window_secs: default_history_window(),
            redraw_interval_ms: default_redraw_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl Default for ChamberConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            acquisition: AcquisitionConfig::default(),
            chart: ChartConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ChamberConfig {
    /// Load configuration from a TOML file merged with `CHAMBER_`-prefixed
    /// environment variables.
    ///
    /// Example override: `CHAMBER_ACQUISITION_POLL_INTERVAL_MS=500`.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CHAMBER_").split("_"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> AppResult<()> {
        if self.acquisition.poll_interval_ms == 0 {
            return Err(ChamberError::ConfigValidation(
                "acquisition.poll_interval_ms must be > 0".into(),
            ));
        }
        if self.acquisition.failure_threshold == 0 {
            return Err(ChamberError::ConfigValidation(
                "acquisition.failure_threshold must be >= 1".into(),
            ));
        }
        let window_ms = self.chart.history_window_secs.checked_mul(1000);
        if window_ms.is_some_and(|ms| ms < self.acquisition.poll_interval_ms) {
            return Err(ChamberError::ConfigValidation(format!(
                "chart.history_window_secs ({} s) is shorter than one poll interval ({} ms)",
                self.chart.history_window_secs, self.acquisition.poll_interval_ms
            )));
        }
        if self.serial.reply_timeout_ms == 0 {
            return Err(ChamberError::ConfigValidation(
                "serial.reply_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Poll period as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.acquisition.poll_interval_ms)
    }

    /// Charting window as a [`Duration`].
    pub fn history_window(&self) -> Duration {
        Duration::from_secs(self.chart.history_window_secs)
    }

    /// Per-query reply timeout as a [`Duration`].
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.serial.reply_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ChamberConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.acquisition.poll_interval_ms, 1000);
        assert_eq!(config.acquisition.failure_threshold, 1);
        assert_eq!(config.chart.history_window_secs, 3600);
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let mut config = ChamberConfig::default();
        config.acquisition.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_failure_threshold_rejected() {
        let mut config = ChamberConfig::default();
        config.acquisition.failure_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn window_shorter_than_poll_interval_rejected() {
        let mut config = ChamberConfig::default();
        config.acquisition.poll_interval_ms = 5000;
        config.chart.history_window_secs = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn huge_history_window_validates_without_overflow() {
        let mut config = ChamberConfig::default();
        config.chart.history_window_secs = u64::MAX;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chamber.toml");
        std::fs::write(
            &path,
            r#"
[serial]
port = "/dev/ttyACM0"
baud_rate = 115200

[acquisition]
poll_interval_ms = 250

[logging]
output_dir = "/tmp/chamber-logs"
"#,
        )
        .unwrap();

        let config = ChamberConfig::load_from(&path).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.acquisition.poll_interval_ms, 250);
        // Unspecified sections fall back to defaults.
        assert_eq!(config.chart.redraw_interval_ms, 500);
        assert_eq!(config.logging.output_dir, PathBuf::from("/tmp/chamber-logs"));
        assert!(config.validate().is_ok());
    }
}

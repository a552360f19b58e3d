//! Scanner configuration
//!
//! Loaded from the OS config directory with sensible defaults, covering:
//! - Device channel command line and per-command timeout
//! - Scheduler worker pool and deadlines
//! - Continuous / extended sampling cadence and total scan budget
//! - Report output destination

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub device: DeviceConfig,
    pub scheduler: SchedulerConfig,
    pub monitor: MonitorConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Command line prefix for the device channel, e.g. `adb -s SERIAL`.
    pub command: String,
    pub command_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_workers: usize,
    pub task_timeout_secs: u64,
    pub overall_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub sample_period_secs: u64,
    pub monitor_duration_secs: u64,
    pub extended_period_secs: u64,
    /// Total wall-clock budget for a scan; leftover time after the main probe
    /// batch is spent on extended sampling, minus a reserve for the report.
    pub scan_budget_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReportConfig {
    /// Local file the rendered report is written to, in addition to stdout.
    pub output_path: Option<PathBuf>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            command: "adb".to_string(),
            command_timeout_secs: 45,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            task_timeout_secs: 180,
            overall_timeout_secs: 720,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_period_secs: 5,
            monitor_duration_secs: 600,
            extended_period_secs: 8,
            scan_budget_secs: 600,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            scheduler: SchedulerConfig::default(),
            monitor: MonitorConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Load config from the OS-specific location, falling back to defaults
    /// when no file exists yet.
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;

        if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path).await?;
            let config: ScanConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get OS-specific config file path.
    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        path.push("veriscan");
        path.push("config.toml");
        Ok(path)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.device.command_timeout_secs)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.scheduler.task_timeout_secs)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.scheduler.overall_timeout_secs)
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_secs(self.monitor.sample_period_secs)
    }

    pub fn monitor_duration(&self) -> Duration {
        Duration::from_secs(self.monitor.monitor_duration_secs)
    }

    pub fn extended_period(&self) -> Duration {
        Duration::from_secs(self.monitor.extended_period_secs)
    }

    pub fn scan_budget(&self) -> Duration {
        Duration::from_secs(self.monitor.scan_budget_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScanConfig::default();
        assert_eq!(config.device.command, "adb");
        assert_eq!(config.scheduler.max_workers, 4);
        assert_eq!(config.command_timeout(), Duration::from_secs(45));
        assert_eq!(config.scan_budget(), Duration::from_secs(600));
    }

    #[test]
    fn test_config_file_path() {
        let path = ScanConfig::config_file_path().unwrap();
        assert!(path.to_string_lossy().contains("veriscan"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: ScanConfig = toml::from_str(
            r#"
            [device]
            command = "adb -s emulator-5554"

            [scheduler]
            max_workers = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.device.command, "adb -s emulator-5554");
        assert_eq!(config.device.command_timeout_secs, 45);
        assert_eq!(config.scheduler.max_workers, 2);
        assert_eq!(config.monitor.sample_period_secs, 5);
    }
}

//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the data response monitor."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_cycle_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_response_delay_min() -> Duration {
    Duration::from_millis(100)
}

fn default_response_delay_max() -> Duration {
    Duration::from_millis(200)
}

fn default_max_cycles() -> u32 {
    100
}

fn default_replay_directory() -> PathBuf {
    PathBuf::from("data")
}

fn default_replay_files() -> IndexMap<String, PathBuf> {
    let mut files = IndexMap::new();
    files.insert("inverter".to_owned(), PathBuf::from("hybrid_sim_2000.txt"));
    files.insert("bms".to_owned(), PathBuf::from("bms_sim_2000.txt"));
    files.insert("sensor".to_owned(), PathBuf::from("sensor_sim_2000.txt"));
    files
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

/// Primary configuration object for the data response monitor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where a [`MonitorConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedMonitorConfig {
    pub config: MonitorConfig,
    /// `None` when no file was found and built-in defaults apply.
    pub source: Option<PathBuf>,
}

impl MonitorConfig {
    pub const ENV_CONFIG_PATH: &str = "R_EMS_MONITOR_CONFIG";

    /// Load configuration from disk, respecting the `R_EMS_MONITOR_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration together with the effective source path.
    ///
    /// An explicit environment override must exist. Candidate paths are tried in
    /// order and built-in defaults are used when none of them is present.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedMonitorConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedMonitorConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedMonitorConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        debug!("no configuration file found, using built-in defaults");
        Ok(LoadedMonitorConfig {
            config: Self::default(),
            source: None,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<MonitorConfig>()
            .with_context(|| format!("failed to load config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.simulation.validate()?;
        if self.replay.files.is_empty() {
            return Err(anyhow!("replay.files must name at least one device"));
        }
        Ok(())
    }
}

impl std::str::FromStr for MonitorConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: MonitorConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Exchange pacing. Defaults: 500 ms cycle, 100-200 ms response delay, 100 cycles.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_cycle_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub cycle_interval: Duration,
    #[serde(default = "default_response_delay_min")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub response_delay_min: Duration,
    #[serde(default = "default_response_delay_max")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub response_delay_max: Duration,
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cycle_interval: default_cycle_interval(),
            response_delay_min: default_response_delay_min(),
            response_delay_max: default_response_delay_max(),
            max_cycles: default_max_cycles(),
            random_seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cycle_interval.is_zero() {
            return Err(anyhow!("simulation.cycle_interval must be non-zero"));
        }
        if self.response_delay_min > self.response_delay_max {
            return Err(anyhow!(
                "simulation.response_delay_min ({} ms) exceeds response_delay_max ({} ms)",
                self.response_delay_min.as_millis(),
                self.response_delay_max.as_millis()
            ));
        }
        if self.response_delay_max >= self.cycle_interval {
            return Err(anyhow!(
                "simulation.response_delay_max ({} ms) must be below cycle_interval ({} ms)",
                self.response_delay_max.as_millis(),
                self.cycle_interval.as_millis()
            ));
        }
        if self.max_cycles == 0 {
            return Err(anyhow!("simulation.max_cycles must be at least 1"));
        }
        Ok(())
    }
}

/// Location of the per-device replay files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayConfig {
    #[serde(default = "default_replay_directory")]
    pub directory: PathBuf,
    /// Device identifier to file name, relative to `directory` unless absolute.
    #[serde(default = "default_replay_files")]
    pub files: IndexMap<String, PathBuf>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            directory: default_replay_directory(),
            files: default_replay_files(),
        }
    }
}

impl ReplayConfig {
    /// Resolve every configured file against the replay directory.
    pub fn resolved_files(&self) -> IndexMap<String, PathBuf> {
        self.files
            .iter()
            .map(|(device, file)| {
                let path = if file.is_absolute() {
                    file.clone()
                } else {
                    self.directory.join(file)
                };
                (device.clone(), path)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Optional directory for a daily rolling JSON log file.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_fixed_parameters() {
        let config = MonitorConfig::default();
        assert_eq!(config.simulation.cycle_interval, Duration::from_millis(500));
        assert_eq!(config.simulation.response_delay_min, Duration::from_millis(100));
        assert_eq!(config.simulation.response_delay_max, Duration::from_millis(200));
        assert_eq!(config.simulation.max_cycles, 100);
        assert_eq!(config.replay.files.len(), 3);
        config.validate().unwrap();
    }

    #[test]
    fn parses_partial_toml() {
        let config: MonitorConfig = r#"
            [simulation]
            random_seed = 7

            [replay]
            directory = "/srv/replay"

            [replay.files]
            inverter = "inv.txt"
            bms = "/abs/bms.txt"
        "#
        .parse()
        .unwrap();
        assert_eq!(config.simulation.random_seed, Some(7));
        assert_eq!(config.simulation.max_cycles, 100);
        let files = config.replay.resolved_files();
        assert_eq!(files["inverter"], PathBuf::from("/srv/replay/inv.txt"));
        assert_eq!(files["bms"], PathBuf::from("/abs/bms.txt"));
        assert!(!files.contains_key("sensor"));
    }

    #[test]
    fn rejects_inverted_delay_window() {
        let err = r#"
            [simulation]
            response_delay_min = 300
            response_delay_max = 200
        "#
        .parse::<MonitorConfig>()
        .unwrap_err();
        assert!(format!("{err:#}").contains("response_delay_min"));
    }

    #[test]
    fn rejects_delay_reaching_cycle_interval() {
        let err = r#"
            [simulation]
            cycle_interval = 200
            response_delay_min = 100
            response_delay_max = 200
        "#
        .parse::<MonitorConfig>()
        .unwrap_err();
        assert!(format!("{err:#}").contains("must be below cycle_interval"));
    }

    #[test]
    fn loads_first_existing_candidate() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "[simulation]\nmax_cycles = 10")?;
        file.flush()?;
        let loaded =
            MonitorConfig::load_with_source(&[Path::new("/nonexistent/monitor.toml"), file.path()])?;
        assert_eq!(loaded.config.simulation.max_cycles, 10);
        assert_eq!(loaded.source.as_deref(), Some(file.path()));
        Ok(())
    }
}

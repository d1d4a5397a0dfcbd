use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Agent configuration. Every section is optional; missing values fall back
/// to defaults.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub engine: EngineConfig,
    pub cluster: ClusterConfig,
    #[serde(deserialize_with = "readiness_poll")]
    pub readiness: PollConfig,
    pub verify: VerifyConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Path or name of the restic binary.
    pub restic_binary: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            restic_binary: "restic".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ClusterConfig {
    /// Path or name of the kubectl binary.
    pub kubectl_binary: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubectl_binary: "kubectl".to_string(),
        }
    }
}

/// A fixed-interval poll with a retry ceiling.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct PollConfig {
    pub interval_secs: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
}

impl PollConfig {
    /// Repository readiness: 5s x 360 ~ 30 minutes.
    pub const READINESS: PollConfig = PollConfig {
        interval_secs: 5,
        max_retries: 360,
    };
    pub const EVENT: PollConfig = PollConfig {
        interval_secs: 10,
        max_retries: 12,
    };
    pub const TEARDOWN: PollConfig = PollConfig {
        interval_secs: 20,
        max_retries: 6,
    };

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::READINESS
    }
}

/// A poll section as written in the file; missing keys keep the section's
/// own defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct PollOverride {
    interval_secs: Option<u64>,
    max_retries: Option<u32>,
}

impl PollOverride {
    fn over(self, base: PollConfig) -> PollConfig {
        PollConfig {
            interval_secs: self.interval_secs.unwrap_or(base.interval_secs),
            max_retries: self.max_retries.unwrap_or(base.max_retries),
        }
    }
}

fn readiness_poll<'de, D: Deserializer<'de>>(d: D) -> Result<PollConfig, D::Error> {
    Ok(PollOverride::deserialize(d)?.over(PollConfig::READINESS))
}

fn event_poll<'de, D: Deserializer<'de>>(d: D) -> Result<PollConfig, D::Error> {
    Ok(PollOverride::deserialize(d)?.over(PollConfig::EVENT))
}

fn teardown_poll<'de, D: Deserializer<'de>>(d: D) -> Result<PollConfig, D::Error> {
    Ok(PollOverride::deserialize(d)?.over(PollConfig::TEARDOWN))
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct VerifyConfig {
    #[serde(deserialize_with = "event_poll")]
    pub event: PollConfig,
    #[serde(deserialize_with = "teardown_poll")]
    pub teardown: PollConfig,
    /// Name of the helper container expected to disappear after a backup.
    pub sidecar_name: String,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            event: PollConfig::EVENT,
            teardown: PollConfig::TEARDOWN,
            sidecar_name: "stash".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.restic_binary.trim().is_empty() {
            return Err(ConfigError::Validation(
                "engine.restic_binary must not be empty".to_string(),
            ));
        }
        if self.cluster.kubectl_binary.trim().is_empty() {
            return Err(ConfigError::Validation(
                "cluster.kubectl_binary must not be empty".to_string(),
            ));
        }
        if self.verify.sidecar_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "verify.sidecar_name must not be empty".to_string(),
            ));
        }
        for (name, poll) in [
            ("readiness", &self.readiness),
            ("verify.event", &self.verify.event),
            ("verify.teardown", &self.verify.teardown),
        ] {
            if poll.interval_secs == 0 {
                return Err(ConfigError::Validation(format!(
                    "{}.interval_secs must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Loads the configuration from `explicit`, the `STOWAGE_CONFIG` environment
/// variable, or the default location (`~/.config/stowage/config.toml`).
///
/// A missing file at the default location yields the defaults; a missing
/// file that was asked for explicitly is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<AgentConfig, ConfigError> {
    let requested = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("STOWAGE_CONFIG").map(PathBuf::from));

    let path = match requested {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Config file not found: {:?}", path),
                )));
            }
            path
        }
        None => {
            let path = crate::paths::config_path();
            if !path.exists() {
                return Ok(AgentConfig::default());
            }
            path
        }
    };

    let content = std::fs::read_to_string(path)?;
    let config: AgentConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.engine.restic_binary, "restic");
        assert_eq!(config.readiness.interval(), Duration::from_secs(5));
        assert_eq!(config.verify.event.max_retries, 12);
        assert_eq!(config.verify.teardown.interval_secs, 20);
        assert_eq!(config.verify.sidecar_name, "stash");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_poll_sections_keep_their_defaults() {
        let config: AgentConfig = toml::from_str(
            r#"
[readiness]
interval_secs = 10

[verify.teardown]
max_retries = 2
"#,
        )
        .unwrap();

        assert_eq!(
            config.readiness,
            PollConfig {
                interval_secs: 10,
                max_retries: 360
            }
        );
        assert_eq!(
            config.verify.teardown,
            PollConfig {
                interval_secs: 20,
                max_retries: 2
            }
        );
        assert_eq!(config.verify.event, PollConfig::EVENT);
    }

    #[test]
    #[serial]
    fn test_partial_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[engine]
restic_binary = "/usr/local/bin/restic"

[verify.event]
interval_secs = 1
max_retries = 3
"#
        )
        .unwrap();

        std::env::set_var("STOWAGE_CONFIG", file.path());
        let config = load_config(None).unwrap();
        std::env::remove_var("STOWAGE_CONFIG");

        assert_eq!(config.engine.restic_binary, "/usr/local/bin/restic");
        assert_eq!(config.verify.event.max_retries, 3);
        assert_eq!(config.verify.teardown, VerifyConfig::default().teardown);
        assert_eq!(config.cluster.kubectl_binary, "kubectl");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let result = load_config(Some(Path::new("/nonexistent/stowage.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config: AgentConfig = toml::from_str(
            r#"
[readiness]
interval_secs = 0
max_retries = 1
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("readiness.interval_secs"));
    }
}

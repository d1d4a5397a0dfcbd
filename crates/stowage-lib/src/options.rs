use crate::config::ConfigError;
use crate::error::BackupError;
use crate::paths;
use globset::Glob;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable holding the CPU scheduling niceness adjustment.
pub const ENV_NICE_ADJUSTMENT: &str = "NICE_ADJUSTMENT";
/// Environment variable holding the I/O scheduling class.
pub const ENV_IONICE_CLASS: &str = "IONICE_CLASS";
/// Environment variable holding the I/O scheduling class data (priority).
pub const ENV_IONICE_CLASS_DATA: &str = "IONICE_CLASS_DATA";

/// Providers the engine knows how to address.
pub const PROVIDERS: &[&str] = &["local", "s3", "gcs", "azure", "swift", "b2", "rest"];

/// CPU scheduling niceness applied to the engine process.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct NiceSettings {
    pub adjustment: i32,
}

/// I/O scheduling class and priority applied to the engine process.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct IoNiceSettings {
    pub class: i32,
    pub class_data: Option<i32>,
}

impl NiceSettings {
    /// Reads `NICE_ADJUSTMENT`. Unset or empty means no adjustment.
    pub fn from_env() -> Result<Option<Self>, BackupError> {
        let Some(adjustment) = env_i32(ENV_NICE_ADJUSTMENT)? else {
            return Ok(None);
        };
        if !(-20..=19).contains(&adjustment) {
            return Err(BackupError::Environment(format!(
                "{} must be between -20 and 19, got {}",
                ENV_NICE_ADJUSTMENT, adjustment
            )));
        }
        Ok(Some(Self { adjustment }))
    }
}

impl IoNiceSettings {
    /// Reads `IONICE_CLASS` and `IONICE_CLASS_DATA`. Class data without a
    /// class is rejected.
    pub fn from_env() -> Result<Option<Self>, BackupError> {
        let class = env_i32(ENV_IONICE_CLASS)?;
        let class_data = env_i32(ENV_IONICE_CLASS_DATA)?;
        let Some(class) = class else {
            if class_data.is_some() {
                return Err(BackupError::Environment(format!(
                    "{} is set but {} is missing",
                    ENV_IONICE_CLASS_DATA, ENV_IONICE_CLASS
                )));
            }
            return Ok(None);
        };
        if !(0..=3).contains(&class) {
            return Err(BackupError::Environment(format!(
                "{} must be between 0 and 3, got {}",
                ENV_IONICE_CLASS, class
            )));
        }
        if let Some(data) = class_data {
            if !(0..=7).contains(&data) {
                return Err(BackupError::Environment(format!(
                    "{} must be between 0 and 7, got {}",
                    ENV_IONICE_CLASS_DATA, data
                )));
            }
        }
        Ok(Some(Self { class, class_data }))
    }
}

fn env_i32(key: &str) -> Result<Option<i32>, BackupError> {
    match std::env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => v.trim().parse::<i32>().map(Some).map_err(|e| {
            BackupError::Environment(format!("{} has invalid value '{}': {}", key, v, e))
        }),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(BackupError::Environment(format!("{}: {}", key, e))),
    }
}

/// Destination configuration for the engine.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SetupOptions {
    /// Backend provider (local, s3, gcs, azure, swift, b2, rest).
    pub provider: String,
    /// Bucket/container name, or the mount path for the local provider.
    pub bucket: String,
    pub endpoint: String,
    pub region: String,
    /// Directory inside the bucket where data is stored.
    pub path: String,
    /// Directory where the storage secret is mounted.
    pub secret_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub enable_cache: bool,
    /// Max backend connections. Zero leaves the engine default.
    pub max_connections: u32,
    pub nice: Option<NiceSettings>,
    pub ionice: Option<IoNiceSettings>,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            provider: String::new(),
            bucket: String::new(),
            endpoint: String::new(),
            region: String::new(),
            path: String::new(),
            secret_dir: PathBuf::new(),
            scratch_dir: PathBuf::from(paths::DEFAULT_SCRATCH_DIR),
            enable_cache: false,
            max_connections: 0,
            nice: None,
            ionice: None,
        }
    }
}

impl SetupOptions {
    /// Resolves process-priority hints from the environment and returns the
    /// finalized options handed to the engine.
    pub fn with_priority_from_env(mut self) -> Result<Self, BackupError> {
        self.nice = NiceSettings::from_env()?;
        self.ionice = IoNiceSettings::from_env()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.is_empty() {
            return Err(ConfigError::MissingField("provider".to_string()));
        }
        if !PROVIDERS.contains(&self.provider.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Unknown provider '{}', expected one of: {}",
                self.provider,
                PROVIDERS.join(", ")
            )));
        }
        if self.secret_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("secret-dir".to_string()));
        }
        Ok(())
    }
}

/// Rules deciding which snapshots are kept.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct RetentionPolicy {
    pub name: String,
    pub keep_last: Option<u32>,
    pub keep_hourly: Option<u32>,
    pub keep_daily: Option<u32>,
    pub keep_weekly: Option<u32>,
    pub keep_monthly: Option<u32>,
    pub keep_yearly: Option<u32>,
    #[serde(default)]
    pub keep_tags: Vec<String>,
    /// Remove unreferenced data after forgetting snapshots.
    #[serde(default)]
    pub prune: bool,
    /// Select snapshots without removing anything.
    #[serde(default)]
    pub dry_run: bool,
}

impl RetentionPolicy {
    /// Whether any keep rule is set. Forgetting without one would remove
    /// every snapshot of the host.
    pub fn has_keep_rules(&self) -> bool {
        self.keep_last.is_some()
            || self.keep_hourly.is_some()
            || self.keep_daily.is_some()
            || self.keep_weekly.is_some()
            || self.keep_monthly.is_some()
            || self.keep_yearly.is_some()
            || !self.keep_tags.is_empty()
    }
}

/// Per-run backup parameters.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BackupOptions {
    /// Host identity statistics and snapshots are recorded under.
    pub host: String,
    pub backup_paths: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub retention_policy: RetentionPolicy,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            host: paths::DEFAULT_HOST.to_string(),
            backup_paths: Vec::new(),
            exclude: Vec::new(),
            retention_policy: RetentionPolicy::default(),
        }
    }
}

impl BackupOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backup_paths.iter().all(|p| p.trim().is_empty()) {
            return Err(ConfigError::MissingField("backup-paths".to_string()));
        }
        for pattern in &self.exclude {
            Glob::new(pattern).map_err(|e| {
                ConfigError::Validation(format!("Invalid exclude pattern '{}': {}", pattern, e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_priority_env() {
        std::env::remove_var(ENV_NICE_ADJUSTMENT);
        std::env::remove_var(ENV_IONICE_CLASS);
        std::env::remove_var(ENV_IONICE_CLASS_DATA);
    }

    #[test]
    #[serial]
    fn test_priority_unset() {
        clear_priority_env();
        let setup = SetupOptions::default().with_priority_from_env().unwrap();
        assert_eq!(setup.nice, None);
        assert_eq!(setup.ionice, None);
    }

    #[test]
    #[serial]
    fn test_priority_from_env() {
        clear_priority_env();
        std::env::set_var(ENV_NICE_ADJUSTMENT, "5");
        std::env::set_var(ENV_IONICE_CLASS, "2");
        std::env::set_var(ENV_IONICE_CLASS_DATA, "7");
        let setup = SetupOptions::default().with_priority_from_env().unwrap();
        clear_priority_env();
        assert_eq!(setup.nice, Some(NiceSettings { adjustment: 5 }));
        assert_eq!(
            setup.ionice,
            Some(IoNiceSettings {
                class: 2,
                class_data: Some(7)
            })
        );
    }

    #[test]
    #[serial]
    fn test_malformed_nice_is_rejected() {
        clear_priority_env();
        std::env::set_var(ENV_NICE_ADJUSTMENT, "fast");
        let result = SetupOptions::default().with_priority_from_env();
        clear_priority_env();
        assert!(matches!(result, Err(BackupError::Environment(_))));
    }

    #[test]
    #[serial]
    fn test_out_of_range_ionice_is_rejected() {
        clear_priority_env();
        std::env::set_var(ENV_IONICE_CLASS, "9");
        let result = SetupOptions::default().with_priority_from_env();
        clear_priority_env();
        let err = result.unwrap_err();
        assert!(err.to_string().contains(ENV_IONICE_CLASS));
    }

    #[test]
    fn test_required_setup_fields() {
        let mut setup = SetupOptions::default();
        assert!(matches!(
            setup.validate(),
            Err(ConfigError::MissingField(f)) if f == "provider"
        ));
        setup.provider = "s3".to_string();
        assert!(matches!(
            setup.validate(),
            Err(ConfigError::MissingField(f)) if f == "secret-dir"
        ));
        setup.secret_dir = PathBuf::from("/etc/secret");
        assert!(setup.validate().is_ok());
        setup.provider = "ftp".to_string();
        assert!(matches!(setup.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_backup_paths_required() {
        let mut opts = BackupOptions::default();
        assert!(opts.validate().is_err());
        opts.backup_paths = vec!["/data".to_string()];
        assert!(opts.validate().is_ok());
        opts.exclude = vec!["[unclosed".to_string()];
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_keep_rules() {
        let mut policy = RetentionPolicy {
            prune: true,
            ..Default::default()
        };
        assert!(!policy.has_keep_rules());
        policy.keep_tags = vec!["weekly".to_string()];
        assert!(policy.has_keep_rules());
    }
}

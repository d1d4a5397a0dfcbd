use crate::config::ConfigError;
use crate::types::TargetRef;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while running a backup for one target.
///
/// Everything except `Engine` aborts the run before an output is produced.
/// Engine failures are folded into a `Failed` host stat by the result builder
/// and only surface here when no output sink is configured.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Lookup error: {0:#}")]
    Lookup(anyhow::Error),
    #[error("Pre-backup action '{action}' failed for {target}: {error:#}")]
    Hook {
        action: String,
        target: TargetRef,
        error: anyhow::Error,
    },
    #[error("Repository for {target} not ready after {attempts} attempts{}", last_error.as_ref().map(|e| format!(": {e}")).unwrap_or_default())]
    ReadinessTimeout {
        target: TargetRef,
        attempts: u32,
        last_error: Option<String>,
    },
    #[error("Invalid environment: {0}")]
    Environment(String),
    #[error("{0:#}")]
    Engine(anyhow::Error),
    #[error("Failed to write output to {path:?}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Verification failures. Each variant maps to a distinct way a poll can end
/// without confirming the expected cluster state.
#[derive(Debug, Error, PartialEq)]
pub enum VerifyError {
    #[error("Could not observe event '{name}' after {attempts} attempts: {last_error}")]
    Unobserved {
        name: String,
        attempts: u32,
        last_error: String,
    },
    #[error("Event '{name}' reported a failed backup{}", message.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
    ObservedFailure {
        name: String,
        message: Option<String>,
    },
    #[error("Sidecar '{sidecar}' still present in {workload} after {attempts} attempts{}", last_error.as_ref().map(|e| format!(" (last error: {e})")).unwrap_or_default())]
    TeardownUnconfirmed {
        workload: String,
        sidecar: String,
        attempts: u32,
        last_error: Option<String>,
    },
}

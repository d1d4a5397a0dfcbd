use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Host identity used when the target does not imply one.
pub const DEFAULT_HOST: &str = "host-0";
/// Scratch directory used when none is configured.
pub const DEFAULT_SCRATCH_DIR: &str = "/tmp";
/// File name the backup output is written to inside the output directory.
pub const OUTPUT_FILE_NAME: &str = "output.json";
/// File inside the secret directory holding the repository password.
pub const PASSWORD_FILE_NAME: &str = "RESTIC_PASSWORD";
/// Namespace file mounted into pods with a service account.
pub const SERVICE_ACCOUNT_NAMESPACE_FILE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "stowage")
}

/// Returns the configuration directory: `~/.config/stowage/`
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| {
            let mut path = std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp"));
            path.push(".config");
            path.push("stowage");
            path
        })
}

/// Returns the path to the config file: `~/.config/stowage/config.toml`
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Returns the output file path inside `output_dir`.
pub fn output_path(output_dir: &Path) -> PathBuf {
    output_dir.join(OUTPUT_FILE_NAME)
}

/// Returns the repository password file inside `secret_dir`.
pub fn password_path(secret_dir: &Path) -> PathBuf {
    secret_dir.join(PASSWORD_FILE_NAME)
}

/// Returns the engine cache directory inside `scratch_dir`.
pub fn cache_dir(scratch_dir: &Path) -> PathBuf {
    scratch_dir.join("restic-cache")
}

/// Namespace this process runs in: `POD_NAMESPACE`, then the service
/// account namespace file, then `default`.
pub fn current_namespace() -> String {
    if let Ok(ns) = std::env::var("POD_NAMESPACE") {
        if !ns.trim().is_empty() {
            return ns.trim().to_string();
        }
    }
    std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE_FILE)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "default".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_config_paths() {
        assert!(config_dir().ends_with("stowage"));
        assert!(config_path().ends_with("stowage/config.toml"));
    }

    #[test]
    fn test_output_and_secret_paths() {
        assert_eq!(
            output_path(Path::new("/out")),
            PathBuf::from("/out/output.json")
        );
        assert_eq!(
            password_path(Path::new("/etc/secret")),
            PathBuf::from("/etc/secret/RESTIC_PASSWORD")
        );
        assert_eq!(
            cache_dir(Path::new("/tmp")),
            PathBuf::from("/tmp/restic-cache")
        );
    }

    #[test]
    #[serial]
    fn test_namespace_from_env() {
        std::env::set_var("POD_NAMESPACE", "demo");
        assert_eq!(current_namespace(), "demo");
        std::env::remove_var("POD_NAMESPACE");
    }
}

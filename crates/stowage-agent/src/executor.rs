use crate::backup::BackupEngine;
use crate::hooks::{ActionContext, PreBackupAction};
use crate::readiness::RepositoryProbe;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use stowage_lib::options::{BackupOptions, RetentionPolicy, SetupOptions};
use stowage_lib::paths;
use stowage_lib::types::{
    BackupOutput, FileStats, HostBackupPhase, HostBackupStat, SnapshotStats, TargetRef,
};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Exit code restic (0.17+) uses when the repository does not exist.
const EXIT_REPOSITORY_MISSING: i32 = 10;

/// Stderr fragments restic prints when the repository config is absent.
const REPOSITORY_MISSING_MARKERS: &[&str] = &[
    "repository does not exist",
    "config file not found",
    "Is there a repository at the following location?",
];

/// A restic run that exited unsuccessfully.
#[derive(Debug, Error)]
#[error("Restic error: {}", stderr.trim())]
pub struct ResticFailure {
    pub code: Option<i32>,
    pub stderr: String,
}

impl ResticFailure {
    pub fn repository_missing(&self) -> bool {
        self.code == Some(EXIT_REPOSITORY_MISSING)
            || REPOSITORY_MISSING_MARKERS
                .iter()
                .any(|marker| self.stderr.contains(marker))
    }
}

/// Credential files read from the secret directory per provider, exported
/// under the same name.
fn credential_keys(provider: &str) -> &'static [&'static str] {
    match provider {
        "s3" => &["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY", "CA_CERT_DATA"],
        "gcs" => &["GOOGLE_PROJECT_ID"],
        "azure" => &["AZURE_ACCOUNT_NAME", "AZURE_ACCOUNT_KEY"],
        "swift" => &[
            "OS_USERNAME",
            "OS_PASSWORD",
            "OS_AUTH_URL",
            "OS_REGION_NAME",
            "OS_TENANT_NAME",
            "OS_PROJECT_NAME",
        ],
        "b2" => &["B2_ACCOUNT_ID", "B2_ACCOUNT_KEY"],
        _ => &[],
    }
}

/// Key file for gcs; restic wants a path, not the content.
const GOOGLE_SERVICE_ACCOUNT_KEY: &str = "GOOGLE_SERVICE_ACCOUNT_JSON_KEY";

#[derive(Debug, Deserialize)]
struct ResticSummary {
    // message_type is "summary"
    #[serde(default)]
    files_new: u64,
    #[serde(default)]
    files_changed: u64,
    #[serde(default)]
    files_unmodified: u64,
    #[serde(default)]
    total_files_processed: u64,
    data_added: u64,
    #[serde(default)]
    total_bytes_processed: u64,
    total_duration: f64,
    snapshot_id: String,
}

/// Restic invocation bound to one repository.
#[derive(Debug, Clone)]
pub struct ResticWrapper {
    binary: String,
    setup: SetupOptions,
    repository: String,
    env: Vec<(String, String)>,
}

impl ResticWrapper {
    /// Builds the wrapper from finalized setup options: repository URL,
    /// credential environment and priority prefix are fixed from here on.
    pub fn new(binary: &str, setup: SetupOptions) -> Result<Self> {
        let repository = repository_url(&setup)?;
        let env = credential_env(&setup)?;
        Ok(Self {
            binary: binary.to_string(),
            setup,
            repository,
            env,
        })
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Arguments shared by every subcommand.
    fn global_args(&self) -> Vec<String> {
        let mut args = vec![
            "--repo".to_string(),
            self.repository.clone(),
            "--password-file".to_string(),
            paths::password_path(&self.setup.secret_dir)
                .to_string_lossy()
                .to_string(),
        ];

        if self.setup.enable_cache {
            args.push("--cache-dir".to_string());
            args.push(
                paths::cache_dir(&self.setup.scratch_dir)
                    .to_string_lossy()
                    .to_string(),
            );
        } else {
            args.push("--no-cache".to_string());
        }

        if self.setup.max_connections > 0 {
            if let Some(prefix) = connections_option(&self.setup.provider) {
                args.push("-o".to_string());
                args.push(format!("{}={}", prefix, self.setup.max_connections));
            }
        }
        args
    }

    /// Full command line: optional `nice`/`ionice` wrappers, the restic
    /// binary, then the arguments.
    pub fn command_line(&self, subcommand: Vec<String>) -> Vec<String> {
        let mut line = Vec::new();
        if let Some(nice) = self.setup.nice {
            line.extend(["nice".to_string(), "-n".to_string(), nice.adjustment.to_string()]);
        }
        if let Some(ionice) = self.setup.ionice {
            line.extend(["ionice".to_string(), "-c".to_string(), ionice.class.to_string()]);
            if let Some(data) = ionice.class_data {
                line.extend(["-n".to_string(), data.to_string()]);
            }
        }
        line.push(self.binary.clone());
        line.extend(subcommand);
        line.extend(self.global_args());
        line
    }

    async fn run_restic(&self, subcommand: Vec<String>) -> Result<(String, String)> {
        let is_backup = subcommand.first().map(String::as_str) == Some("backup");
        let line = self.command_line(subcommand);
        let (program, args) = line
            .split_first()
            .ok_or_else(|| anyhow!("Empty restic command line"))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Running restic command: {}", line.join(" "));
        let output = cmd.output().await.context("Failed to execute restic")?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            // Restic backup returns 3 when some files were unreadable but the
            // snapshot was still saved; only a summary line proves that.
            if is_backup && parse_summary(&stdout).is_ok() {
                warn!(
                    "Restic backup returned non-zero ({}) but saved a snapshot: {}",
                    output.status,
                    stderr.trim()
                );
            } else {
                error!("Restic failed: {}", stderr.trim());
                return Err(ResticFailure {
                    code: output.status.code(),
                    stderr,
                }
                .into());
            }
        }

        Ok((stdout, stderr))
    }

    /// Whether the repository config object exists. Only a missing
    /// repository is `Ok(false)`; any other failure is returned.
    pub async fn repository_exists(&self) -> Result<bool> {
        match self.run_restic(vec!["cat".to_string(), "config".to_string()]).await {
            Ok(_) => Ok(true),
            Err(e) => match e.downcast_ref::<ResticFailure>() {
                Some(failure) if failure.repository_missing() => {
                    debug!("Repository {} does not exist yet", self.repository);
                    Ok(false)
                }
                _ => Err(e),
            },
        }
    }

    pub async fn init(&self) -> Result<()> {
        info!("Initializing restic repository at {}", self.repository);
        self.run_restic(vec!["init".to_string()]).await?;
        Ok(())
    }

    pub async fn backup(&self, opts: &BackupOptions) -> Result<SnapshotStats> {
        info!("Starting backup of {:?} as host {}", opts.backup_paths, opts.host);
        let (stdout, _) = self.run_restic(backup_args(opts)).await?;
        let mut stats = parse_summary(&stdout)?;
        stats.path = opts.backup_paths.join(",");
        Ok(stats)
    }

    /// Applies the retention policy to snapshots of `host`.
    pub async fn forget(&self, host: &str, policy: &RetentionPolicy) -> Result<()> {
        // Forgetting without keep rules would drop every snapshot of the host.
        if !policy.has_keep_rules() {
            bail!("Retention policy '{}' has no keep rules", policy.name);
        }
        info!(
            "Applying retention policy '{}' for host {} (prune: {}, dry run: {})",
            policy.name, host, policy.prune, policy.dry_run
        );
        self.run_restic(forget_args(host, policy)).await?;
        Ok(())
    }
}

fn repository_url(setup: &SetupOptions) -> Result<String> {
    let prefix = setup.path.trim_matches('/');
    let url = match setup.provider.as_str() {
        "local" => Path::new(&setup.bucket)
            .join(prefix)
            .to_string_lossy()
            .to_string(),
        "s3" => {
            let endpoint = if setup.endpoint.is_empty() {
                "s3.amazonaws.com"
            } else {
                setup.endpoint.trim_end_matches('/')
            };
            format!("s3:{}/{}/{}", endpoint, setup.bucket, prefix)
        }
        "gcs" => format!("gs:{}:/{}", setup.bucket, prefix),
        "azure" => format!("azure:{}:/{}", setup.bucket, prefix),
        "swift" => format!("swift:{}:/{}", setup.bucket, prefix),
        "b2" => format!("b2:{}:{}", setup.bucket, prefix),
        "rest" => {
            if setup.endpoint.is_empty() {
                bail!("Provider 'rest' requires an endpoint");
            }
            format!("rest:{}/{}", setup.endpoint.trim_end_matches('/'), prefix)
        }
        other => bail!("Unknown provider '{}'", other),
    };
    Ok(url.trim_end_matches('/').to_string())
}

fn connections_option(provider: &str) -> Option<&'static str> {
    match provider {
        "s3" => Some("s3.connections"),
        "gcs" => Some("gs.connections"),
        "azure" => Some("azure.connections"),
        "b2" => Some("b2.connections"),
        "rest" => Some("rest.connections"),
        "local" => Some("local.connections"),
        _ => None,
    }
}

fn credential_env(setup: &SetupOptions) -> Result<Vec<(String, String)>> {
    let mut env = Vec::new();
    for key in credential_keys(&setup.provider) {
        let file = setup.secret_dir.join(key);
        if file.exists() {
            let value = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read credential file {:?}", file))?;
            env.push((key.to_string(), value.trim_end().to_string()));
        }
    }
    if setup.provider == "gcs" {
        let key_file = setup.secret_dir.join(GOOGLE_SERVICE_ACCOUNT_KEY);
        if key_file.exists() {
            env.push((
                "GOOGLE_APPLICATION_CREDENTIALS".to_string(),
                key_file.to_string_lossy().to_string(),
            ));
        }
    }
    if setup.provider == "s3" && !setup.region.is_empty() {
        env.push(("AWS_DEFAULT_REGION".to_string(), setup.region.clone()));
    }
    Ok(env)
}

fn backup_args(opts: &BackupOptions) -> Vec<String> {
    let mut args = vec![
        "backup".to_string(),
        "--json".to_string(),
        "--host".to_string(),
        opts.host.clone(),
    ];
    for exclude in &opts.exclude {
        args.push("--exclude".to_string());
        args.push(exclude.clone());
    }
    args.extend(opts.backup_paths.iter().cloned());
    args
}

fn forget_args(host: &str, policy: &RetentionPolicy) -> Vec<String> {
    let mut args = vec!["forget".to_string(), "--host".to_string(), host.to_string()];
    let keeps = [
        ("--keep-last", policy.keep_last),
        ("--keep-hourly", policy.keep_hourly),
        ("--keep-daily", policy.keep_daily),
        ("--keep-weekly", policy.keep_weekly),
        ("--keep-monthly", policy.keep_monthly),
        ("--keep-yearly", policy.keep_yearly),
    ];
    for (flag, value) in keeps {
        if let Some(n) = value {
            args.push(flag.to_string());
            args.push(n.to_string());
        }
    }
    for tag in &policy.keep_tags {
        args.push("--keep-tag".to_string());
        args.push(tag.clone());
    }
    if policy.prune {
        args.push("--prune".to_string());
    }
    if policy.dry_run {
        args.push("--dry-run".to_string());
    }
    args
}

/// Restic prints one JSON object per line; the last `summary` one carries
/// the snapshot statistics.
fn parse_summary(stdout: &str) -> Result<SnapshotStats> {
    for line in stdout.lines().rev() {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(line) {
            if map.get("message_type").and_then(|v| v.as_str()) == Some("summary") {
                let summary: ResticSummary = serde_json::from_value(Value::Object(map))
                    .context("Failed to parse restic summary JSON")?;
                return Ok(SnapshotStats {
                    name: summary.snapshot_id,
                    path: String::new(),
                    total_size: summary.total_bytes_processed,
                    uploaded: summary.data_added,
                    processing_time_secs: summary.total_duration,
                    file_stats: FileStats {
                        new: summary.files_new,
                        modified: summary.files_changed,
                        unmodified: summary.files_unmodified,
                        total: summary.total_files_processed,
                    },
                });
            }
        }
    }
    bail!("Could not find summary in restic output")
}

/// Restic as the backup engine, repository probe and repository initializer.
#[derive(Debug, Clone)]
pub struct ResticEngine {
    binary: String,
}

impl ResticEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn wrapper(&self, setup: &SetupOptions) -> Result<ResticWrapper> {
        ResticWrapper::new(&self.binary, setup.clone())
    }
}

#[async_trait]
impl BackupEngine for ResticEngine {
    async fn backup(
        &self,
        setup: SetupOptions,
        opts: &BackupOptions,
        target: &TargetRef,
    ) -> Result<BackupOutput> {
        let wrapper = ResticWrapper::new(&self.binary, setup)?;
        let started = Instant::now();

        let snapshot = wrapper.backup(opts).await?;
        if opts.retention_policy.has_keep_rules() {
            wrapper.forget(&opts.host, &opts.retention_policy).await?;
        }

        let stat = HostBackupStat {
            hostname: opts.host.clone(),
            phase: HostBackupPhase::Succeeded,
            snapshots: vec![snapshot],
            duration_secs: Some(started.elapsed().as_secs_f64()),
            completed_at: Some(Utc::now()),
            error: None,
        };
        Ok(BackupOutput::new(target.clone(), vec![stat]))
    }
}

#[async_trait]
impl RepositoryProbe for ResticEngine {
    async fn is_ready(&self, ctx: &ActionContext<'_>) -> Result<bool> {
        self.wrapper(ctx.setup)?.repository_exists().await
    }
}

/// `InitializeBackendRepository`: creates the repository unless it exists.
#[derive(Debug, Clone)]
pub struct InitializeRepository {
    engine: ResticEngine,
}

impl InitializeRepository {
    pub fn new(engine: ResticEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl PreBackupAction for InitializeRepository {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let wrapper = self.engine.wrapper(ctx.setup)?;
        if wrapper.repository_exists().await? {
            debug!("Repository {} already initialized", wrapper.repository());
            return Ok(());
        }
        wrapper.init().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::build_output;
    use crate::readiness::wait_for_repository;
    use serial_test::serial;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use stowage_lib::config::PollConfig;
    use stowage_lib::error::BackupError;
    use stowage_lib::options::{IoNiceSettings, NiceSettings};
    use tempfile::{tempdir, TempDir};

    /// Writes an executable shell script standing in for restic.
    fn fake_restic(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("restic");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    fn backup_opts() -> BackupOptions {
        BackupOptions {
            backup_paths: vec!["/data".to_string()],
            ..Default::default()
        }
    }

    fn setup(provider: &str) -> SetupOptions {
        SetupOptions {
            provider: provider.to_string(),
            bucket: "backups".to_string(),
            path: "/demo/app-x/".to_string(),
            secret_dir: PathBuf::from("/etc/secret"),
            ..Default::default()
        }
    }

    #[test]
    fn test_repository_urls() {
        let cases = [
            ("s3", "s3:s3.amazonaws.com/backups/demo/app-x"),
            ("gcs", "gs:backups:/demo/app-x"),
            ("azure", "azure:backups:/demo/app-x"),
            ("swift", "swift:backups:/demo/app-x"),
            ("b2", "b2:backups:demo/app-x"),
        ];
        for (provider, expected) in cases {
            assert_eq!(repository_url(&setup(provider)).unwrap(), expected);
        }

        let mut local = setup("local");
        local.bucket = "/safe/data".to_string();
        assert_eq!(repository_url(&local).unwrap(), "/safe/data/demo/app-x");

        let mut minio = setup("s3");
        minio.endpoint = "http://minio:9000/".to_string();
        assert_eq!(
            repository_url(&minio).unwrap(),
            "s3:http://minio:9000/backups/demo/app-x"
        );

        assert!(repository_url(&setup("rest")).is_err());
        assert!(repository_url(&setup("ftp")).is_err());
    }

    #[test]
    fn test_command_line_with_priority_and_cache() {
        let mut s = setup("s3");
        s.nice = Some(NiceSettings { adjustment: 5 });
        s.ionice = Some(IoNiceSettings {
            class: 2,
            class_data: Some(7),
        });
        s.max_connections = 4;
        let wrapper = ResticWrapper::new("restic", s).unwrap();
        let line = wrapper.command_line(vec!["snapshots".to_string()]);
        assert_eq!(
            line,
            vec![
                "nice",
                "-n",
                "5",
                "ionice",
                "-c",
                "2",
                "-n",
                "7",
                "restic",
                "snapshots",
                "--repo",
                "s3:s3.amazonaws.com/backups/demo/app-x",
                "--password-file",
                "/etc/secret/RESTIC_PASSWORD",
                "--no-cache",
                "-o",
                "s3.connections=4",
            ]
        );

        let mut cached = setup("gcs");
        cached.enable_cache = true;
        cached.scratch_dir = PathBuf::from("/scratch");
        let line = ResticWrapper::new("restic", cached)
            .unwrap()
            .command_line(vec![]);
        assert_eq!(line[0], "restic");
        assert!(line.windows(2).any(|w| w == ["--cache-dir", "/scratch/restic-cache"]));
    }

    #[test]
    fn test_backup_args() {
        let opts = BackupOptions {
            host: "host-0".to_string(),
            backup_paths: vec!["/data".to_string(), "/conf".to_string()],
            exclude: vec!["*.tmp".to_string()],
            retention_policy: RetentionPolicy::default(),
        };
        assert_eq!(
            backup_args(&opts),
            vec![
                "backup", "--json", "--host", "host-0", "--exclude", "*.tmp", "/data", "/conf"
            ]
        );
    }

    #[test]
    fn test_forget_args() {
        let policy = RetentionPolicy {
            name: "keep-some".to_string(),
            keep_last: Some(5),
            keep_monthly: Some(2),
            keep_tags: vec!["release".to_string()],
            prune: true,
            dry_run: true,
            ..Default::default()
        };
        assert_eq!(
            forget_args("host-1", &policy),
            vec![
                "forget",
                "--host",
                "host-1",
                "--keep-last",
                "5",
                "--keep-monthly",
                "2",
                "--keep-tag",
                "release",
                "--prune",
                "--dry-run"
            ]
        );
    }

    #[test]
    fn test_parse_summary() {
        let stdout = r#"{"message_type":"status","percent_done":0.5}
{"message_type":"summary","files_new":3,"files_changed":1,"files_unmodified":10,"total_files_processed":14,"data_added":2048,"total_bytes_processed":8192,"total_duration":1.5,"snapshot_id":"4f2a9c1d"}"#;
        let stats = parse_summary(stdout).unwrap();
        assert_eq!(stats.name, "4f2a9c1d");
        assert_eq!(stats.uploaded, 2048);
        assert_eq!(stats.total_size, 8192);
        assert_eq!(stats.file_stats.total, 14);
        assert_eq!(stats.file_stats.modified, 1);

        assert!(parse_summary(r#"{"message_type":"status"}"#).is_err());
    }

    #[test]
    fn test_credentials_from_secret_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("AWS_ACCESS_KEY_ID"), "key-id\n").unwrap();
        std::fs::write(dir.path().join("AWS_SECRET_ACCESS_KEY"), "secret").unwrap();

        let mut s = setup("s3");
        s.secret_dir = dir.path().to_path_buf();
        s.region = "eu-west-1".to_string();
        let env = credential_env(&s).unwrap();
        assert!(env.contains(&("AWS_ACCESS_KEY_ID".to_string(), "key-id".to_string())));
        assert!(env.contains(&("AWS_SECRET_ACCESS_KEY".to_string(), "secret".to_string())));
        assert!(env.contains(&("AWS_DEFAULT_REGION".to_string(), "eu-west-1".to_string())));
        assert_eq!(env.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_binary_is_engine_error() {
        let engine = ResticEngine::new("/nonexistent/restic-binary");
        let opts = BackupOptions {
            backup_paths: vec!["/data".to_string()],
            ..Default::default()
        };
        let err = engine
            .backup(setup("s3"), &opts, &TargetRef::new("Deployment", "app-x"))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to execute restic"));
    }

    #[tokio::test]
    #[serial]
    async fn test_failed_backup_reports_restic_stderr() {
        let dir = tempdir().unwrap();
        let restic = fake_restic(
            &dir,
            r#"echo '{"message_type":"status","percent_done":0.1}'
echo 'Fatal: unable to save snapshot: connection refused' >&2
exit 1"#,
        );
        let engine = ResticEngine::new(restic);
        let target = TargetRef::new("Deployment", "app-x");

        let outcome = engine.backup(setup("s3"), &backup_opts(), &target).await;
        let run = build_output(&target, "host-0", outcome);

        assert!(!run.succeeded());
        assert_eq!(
            run.output.stats()[0].error.as_deref(),
            Some("Restic error: Fatal: unable to save snapshot: connection refused")
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_partial_backup_with_summary_succeeds() {
        let dir = tempdir().unwrap();
        let restic = fake_restic(
            &dir,
            r#"echo '{"message_type":"summary","data_added":10,"total_duration":0.5,"snapshot_id":"5e6f7a8b"}'
echo 'error: open /data/locked: permission denied' >&2
exit 3"#,
        );
        let wrapper = ResticWrapper::new(&restic, setup("s3")).unwrap();

        let stats = wrapper.backup(&backup_opts()).await.unwrap();
        assert_eq!(stats.name, "5e6f7a8b");
        assert_eq!(stats.path, "/data");
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_repository_is_not_ready() {
        let dir = tempdir().unwrap();
        let restic = fake_restic(
            &dir,
            r#"echo 'Fatal: repository does not exist: unable to open config file' >&2
exit 10"#,
        );
        let wrapper = ResticWrapper::new(&restic, setup("s3")).unwrap();
        assert!(!wrapper.repository_exists().await.unwrap());
    }

    #[tokio::test]
    #[serial]
    async fn test_repository_check_propagates_other_failures() {
        let dir = tempdir().unwrap();
        let restic = fake_restic(
            &dir,
            r#"echo 'Fatal: wrong password or no key found' >&2
exit 12"#,
        );
        let wrapper = ResticWrapper::new(&restic, setup("s3")).unwrap();
        let err = wrapper.repository_exists().await.unwrap_err();
        assert!(err.to_string().contains("wrong password"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_timeout_carries_restic_cause() {
        let engine = ResticEngine::new("/nonexistent/restic-binary");
        let target = TargetRef::new("Deployment", "app-x");
        let setup = setup("s3");
        let ctx = ActionContext {
            target: &target,
            setup: &setup,
            session: "",
            namespace: "demo",
        };
        let policy = PollConfig {
            interval_secs: 5,
            max_retries: 1,
        };

        let err = wait_for_repository(&engine, &ctx, policy).await.unwrap_err();
        match &err {
            BackupError::ReadinessTimeout {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(*attempts, 2);
                assert!(last_error
                    .as_deref()
                    .is_some_and(|e| e.contains("Failed to execute restic")));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("Failed to execute restic"));
    }
}

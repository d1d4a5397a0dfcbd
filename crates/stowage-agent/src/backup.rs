use crate::hooks::{execute_pre_backup_actions, ActionContext, ActionRegistry, SessionStore};
use crate::readiness::{wait_for_repository, RepositoryProbe};
use crate::resolver::{host_identity, resolve, Resolution};
use anyhow::Result;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stowage_lib::config::PollConfig;
use stowage_lib::error::BackupError;
use stowage_lib::options::{BackupOptions, SetupOptions};
use stowage_lib::paths;
use stowage_lib::types::{BackupOutput, HostBackupStat, InvokerInfo, TargetRef};
use tempfile::NamedTempFile;
use tracing::{error, info, warn};

/// Read-only lookup of invokers and the targets they own.
#[async_trait]
pub trait InvokerStore: Send + Sync {
    async fn invoker(&self, kind: &str, name: &str, namespace: &str) -> Result<InvokerInfo>;
}

/// The data-transfer engine. Consumes finalized setup options and returns
/// per-host statistics, or the failure without fabricating a result.
#[async_trait]
pub trait BackupEngine: Send + Sync {
    async fn backup(
        &self,
        setup: SetupOptions,
        opts: &BackupOptions,
        target: &TargetRef,
    ) -> Result<BackupOutput>;
}

/// Collaborators for one process run, built once at startup.
#[derive(Clone)]
pub struct BackupContext {
    pub invokers: Arc<dyn InvokerStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub actions: ActionRegistry,
    pub repository: Arc<dyn RepositoryProbe>,
    pub engine: Arc<dyn BackupEngine>,
    pub readiness: PollConfig,
}

/// Parameters of one backup invocation.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub namespace: String,
    pub invoker_kind: String,
    pub invoker_name: String,
    pub target_kind: String,
    pub target_name: String,
    pub backup_session: String,
    /// Pod name used to derive StatefulSet host identities.
    pub pod_name: Option<String>,
    pub setup: SetupOptions,
    pub backup: BackupOptions,
}

impl BackupRequest {
    /// Required parameters must be present before anything touches the
    /// cluster.
    pub fn validate(&self) -> Result<(), BackupError> {
        self.backup.validate()?;
        self.setup.validate()?;
        Ok(())
    }
}

/// Outcome of a run that reached the engine.
#[derive(Debug)]
pub struct BackupRun {
    pub output: BackupOutput,
    /// The engine failure folded into `output`, if any.
    pub engine_error: Option<anyhow::Error>,
}

impl BackupRun {
    pub fn succeeded(&self) -> bool {
        self.engine_error.is_none()
    }
}

/// Turns the engine result into an output. Success passes through
/// untouched; failure becomes a single `Failed` stat for `host`.
pub fn build_output(target: &TargetRef, host: &str, outcome: Result<BackupOutput>) -> BackupRun {
    match outcome {
        Ok(output) => BackupRun {
            output,
            engine_error: None,
        },
        Err(e) => BackupRun {
            output: BackupOutput::new(
                target.clone(),
                vec![HostBackupStat::failed(host, format!("{:#}", e))],
            ),
            engine_error: Some(e),
        },
    }
}

/// Runs the backup of the selected target.
///
/// Returns `Ok(None)` when the invoker owns no matching target. Failures
/// before the engine stage are returned as errors and produce no output;
/// engine failures are reported inside the returned `BackupRun`.
pub async fn run_backup(
    ctx: &BackupContext,
    mut request: BackupRequest,
) -> Result<Option<BackupRun>, BackupError> {
    request.validate()?;

    let invoker = ctx
        .invokers
        .invoker(&request.invoker_kind, &request.invoker_name, &request.namespace)
        .await
        .map_err(BackupError::Lookup)?;

    let target = match resolve(&invoker.targets, &request.target_kind, &request.target_name) {
        Resolution::Found(target) => target,
        Resolution::NotFound => {
            warn!(
                "Invoker {}/{} has no target {}/{}",
                invoker.kind, invoker.name, request.target_kind, request.target_name
            );
            return Ok(None);
        }
    };
    let target_ref = target.target_ref.clone();
    request.backup.host = host_identity(target, request.pod_name.as_deref())?;
    info!("Backing up {} as host {}", target_ref, request.backup.host);

    let action_ctx = ActionContext {
        target: &target_ref,
        setup: &request.setup,
        session: &request.backup_session,
        namespace: &request.namespace,
    };
    execute_pre_backup_actions(ctx.sessions.as_ref(), &ctx.actions, &action_ctx).await?;
    wait_for_repository(ctx.repository.as_ref(), &action_ctx, ctx.readiness).await?;

    let setup = request.setup.clone().with_priority_from_env()?;
    let outcome = ctx.engine.backup(setup, &request.backup, &target_ref).await;
    let run = build_output(&target_ref, &request.backup.host, outcome);
    if let Some(e) = &run.engine_error {
        error!("Backup of {} failed: {:#}", target_ref, e);
    } else {
        info!("Backup of {} succeeded", target_ref);
    }
    Ok(Some(run))
}

/// Writes `output` to `<output_dir>/output.json`, replacing any previous
/// file in one rename.
pub fn write_output(output: &BackupOutput, output_dir: &Path) -> Result<PathBuf, BackupError> {
    let path = paths::output_path(output_dir);
    let io_err = |source: std::io::Error| BackupError::Output {
        path: path.clone(),
        source,
    };

    std::fs::create_dir_all(output_dir).map_err(io_err)?;
    let json = serde_json::to_vec_pretty(output)
        .map_err(|e| io_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    // The temp file is removed on drop if anything below fails.
    let mut file = NamedTempFile::new_in(output_dir).map_err(io_err)?;
    file.write_all(&json).map_err(io_err)?;
    file.as_file().sync_all().map_err(io_err)?;
    file.persist(&path).map_err(|e| io_err(e.error))?;
    Ok(path)
}

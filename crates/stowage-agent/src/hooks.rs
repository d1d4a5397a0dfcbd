use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use stowage_lib::error::BackupError;
use stowage_lib::options::SetupOptions;
use stowage_lib::types::TargetRef;
use tracing::{debug, info};

/// Action that prepares the repository before the first backup writes to it.
pub const INITIALIZE_BACKEND_REPOSITORY: &str = "InitializeBackendRepository";

/// Everything a pre-backup action or readiness probe gets to see.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub target: &'a TargetRef,
    pub setup: &'a SetupOptions,
    pub session: &'a str,
    pub namespace: &'a str,
}

#[async_trait]
pub trait PreBackupAction: Send + Sync {
    async fn execute(&self, ctx: &ActionContext<'_>) -> anyhow::Result<()>;
}

/// Lookup of the actions a backup session assigned to a target.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn pre_backup_actions(
        &self,
        namespace: &str,
        session: &str,
        target: &TargetRef,
    ) -> anyhow::Result<Vec<String>>;
}

/// Named pre-backup actions.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn PreBackupAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, action: Arc<dyn PreBackupAction>) {
        self.actions.insert(name.into(), action);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn PreBackupAction>> {
        self.actions.get(name)
    }
}

/// Runs the actions assigned to `ctx.target` in order, stopping at the first
/// failure. Without a session there is nothing to run.
pub async fn execute_pre_backup_actions(
    sessions: &dyn SessionStore,
    registry: &ActionRegistry,
    ctx: &ActionContext<'_>,
) -> Result<(), BackupError> {
    if ctx.session.is_empty() {
        debug!("No backup session given, skipping pre-backup actions");
        return Ok(());
    }

    let names = sessions
        .pre_backup_actions(ctx.namespace, ctx.session, ctx.target)
        .await
        .map_err(BackupError::Lookup)?;

    for name in names {
        let action = registry.get(&name).ok_or_else(|| BackupError::Hook {
            action: name.clone(),
            target: ctx.target.clone(),
            error: anyhow::anyhow!("no such action registered"),
        })?;
        info!("Executing pre-backup action {} for {}", name, ctx.target);
        action.execute(ctx).await.map_err(|error| BackupError::Hook {
            action: name.clone(),
            target: ctx.target.clone(),
            error,
        })?;
    }
    Ok(())
}

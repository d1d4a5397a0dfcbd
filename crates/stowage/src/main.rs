mod logging;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use stowage_agent::backup::{run_backup, write_output, BackupContext, BackupRequest};
use stowage_agent::cluster::Kubectl;
use stowage_agent::executor::{InitializeRepository, ResticEngine};
use stowage_agent::hooks::{ActionRegistry, INITIALIZE_BACKEND_REPOSITORY};
use stowage_agent::verify::{poll_event_outcome, poll_sidecar_teardown, WorkloadKind};
use stowage_lib::config::{load_config, AgentConfig};
use stowage_lib::options::{BackupOptions, RetentionPolicy, SetupOptions};
use stowage_lib::paths;
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the agent configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a backup of one target of a backup invoker
    BackupPvc(Box<BackupArgs>),
    /// Wait for a backup event and check its outcome
    VerifyEvent {
        #[command(flatten)]
        cluster: ClusterArgs,
        /// Name of the event
        #[arg(long)]
        name: String,
    },
    /// Wait for the backup sidecar to be removed from a workload
    VerifyTeardown {
        #[command(flatten)]
        cluster: ClusterArgs,
        /// Workload kind (ReplicationController, ReplicaSet, Deployment, DaemonSet)
        #[arg(long)]
        kind: WorkloadKind,
        /// Workload name
        #[arg(long)]
        name: String,
        /// Sidecar container name, overrides the configured one
        #[arg(long)]
        sidecar: Option<String>,
    },
}

#[derive(Args)]
struct ClusterArgs {
    /// The address of the Kubernetes API server (overrides any value in kubeconfig)
    #[arg(long)]
    master: Option<String>,
    /// Path to kubeconfig file with authorization information
    #[arg(long)]
    kubeconfig: Option<PathBuf>,
    /// Namespace of the objects. Defaults to the namespace this pod runs in
    #[arg(long)]
    namespace: Option<String>,
}

impl ClusterArgs {
    fn namespace(&self) -> String {
        self.namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(paths::current_namespace)
    }

    fn kubectl(&self, config: &AgentConfig) -> Kubectl {
        Kubectl::new(config.cluster.kubectl_binary.clone())
            .with_kubeconfig(self.kubeconfig.clone())
            .with_server(self.master.clone())
    }
}

#[derive(Args)]
struct BackupArgs {
    #[command(flatten)]
    cluster: ClusterArgs,

    /// Backend provider (local, s3, gcs, azure, swift, b2, rest)
    #[arg(long, default_value_t)]
    provider: String,
    /// Name of the cloud bucket/container (mount path for local backend)
    #[arg(long, default_value_t)]
    bucket: String,
    /// Endpoint for s3/s3 compatible backend or REST server URL
    #[arg(long, default_value_t)]
    endpoint: String,
    /// Region for s3/s3 compatible backend
    #[arg(long, default_value_t)]
    region: String,
    /// Directory inside the bucket where backed up data will be stored
    #[arg(long, default_value_t)]
    path: String,
    /// Directory where storage secret has been mounted
    #[arg(long)]
    secret_dir: Option<PathBuf>,
    /// Temporary directory
    #[arg(long, default_value = paths::DEFAULT_SCRATCH_DIR)]
    scratch_dir: PathBuf,
    /// Use the engine cache inside the scratch directory
    #[arg(long)]
    enable_cache: bool,
    /// Max number of parallel backend connections (0 keeps the engine default)
    #[arg(long, default_value_t = 0)]
    max_connections: u32,

    /// Name of the backup session
    #[arg(long = "backupsession", default_value_t)]
    backup_session: String,
    /// Kind of the backup invoker
    #[arg(long, default_value_t)]
    invoker_kind: String,
    /// Name of the backup invoker
    #[arg(long, default_value_t)]
    invoker_name: String,
    /// Kind of the target
    #[arg(long, default_value_t)]
    target_kind: String,
    /// Name of the target
    #[arg(long, default_value_t)]
    target_name: String,

    /// Name of the host machine, replaced by the identity derived from the target
    #[arg(long, default_value = paths::DEFAULT_HOST)]
    hostname: String,

    /// Comma separated list of paths to back up
    #[arg(long, alias = "backup-dirs", value_delimiter = ',')]
    backup_paths: Vec<String>,
    /// Comma separated list of patterns to exclude
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Name of the retention policy
    #[arg(long, default_value_t)]
    retention_name: String,
    #[arg(long)]
    retention_keep_last: Option<u32>,
    #[arg(long)]
    retention_keep_hourly: Option<u32>,
    #[arg(long)]
    retention_keep_daily: Option<u32>,
    #[arg(long)]
    retention_keep_weekly: Option<u32>,
    #[arg(long)]
    retention_keep_monthly: Option<u32>,
    #[arg(long)]
    retention_keep_yearly: Option<u32>,
    #[arg(long, value_delimiter = ',')]
    retention_keep_tags: Vec<String>,
    /// Prune old snapshot data
    #[arg(long)]
    retention_prune: bool,
    /// Test the retention policy without deleting actual data
    #[arg(long)]
    retention_dry_run: bool,

    /// Directory where output.json will be written (keep empty to get the result as exit status)
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl BackupArgs {
    fn request(&self) -> BackupRequest {
        BackupRequest {
            namespace: self.cluster.namespace(),
            invoker_kind: self.invoker_kind.clone(),
            invoker_name: self.invoker_name.clone(),
            target_kind: self.target_kind.clone(),
            target_name: self.target_name.clone(),
            backup_session: self.backup_session.clone(),
            pod_name: std::env::var("POD_NAME").ok(),
            setup: SetupOptions {
                provider: self.provider.clone(),
                bucket: self.bucket.clone(),
                endpoint: self.endpoint.clone(),
                region: self.region.clone(),
                path: self.path.clone(),
                secret_dir: self.secret_dir.clone().unwrap_or_default(),
                scratch_dir: self.scratch_dir.clone(),
                enable_cache: self.enable_cache,
                max_connections: self.max_connections,
                nice: None,
                ionice: None,
            },
            backup: BackupOptions {
                host: self.hostname.clone(),
                backup_paths: self.backup_paths.clone(),
                exclude: self.exclude.clone(),
                retention_policy: RetentionPolicy {
                    name: self.retention_name.clone(),
                    keep_last: self.retention_keep_last,
                    keep_hourly: self.retention_keep_hourly,
                    keep_daily: self.retention_keep_daily,
                    keep_weekly: self.retention_keep_weekly,
                    keep_monthly: self.retention_keep_monthly,
                    keep_yearly: self.retention_keep_yearly,
                    keep_tags: self.retention_keep_tags.clone(),
                    prune: self.retention_prune,
                    dry_run: self.retention_dry_run,
                },
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::BackupPvc(args) => {
            handle_backup(&args, &config).await?;
        }
        Commands::VerifyEvent { cluster, name } => {
            handle_verify_event(&cluster, &name, &config).await?;
        }
        Commands::VerifyTeardown {
            cluster,
            kind,
            name,
            sidecar,
        } => {
            handle_verify_teardown(&cluster, kind, &name, sidecar, &config).await?;
        }
    }

    Ok(())
}

async fn handle_backup(args: &BackupArgs, config: &AgentConfig) -> anyhow::Result<()> {
    let request = args.request();
    // Fail on missing parameters before any cluster client is built.
    request.validate()?;

    let kubectl = Arc::new(args.cluster.kubectl(config));
    let engine = ResticEngine::new(config.engine.restic_binary.clone());
    let mut actions = ActionRegistry::new();
    actions.register(
        INITIALIZE_BACKEND_REPOSITORY,
        Arc::new(InitializeRepository::new(engine.clone())),
    );
    let engine = Arc::new(engine);

    let ctx = BackupContext {
        invokers: kubectl.clone(),
        sessions: kubectl,
        actions,
        repository: engine.clone(),
        engine,
        readiness: config.readiness,
    };

    let Some(run) = run_backup(&ctx, request).await? else {
        info!("No matching target found, nothing was backed up");
        return Ok(());
    };

    match &args.output_dir {
        Some(dir) => {
            let path = write_output(&run.output, dir)?;
            info!("Backup output written to {:?}", path);
            if let Some(e) = &run.engine_error {
                error!("Backup failed, reported in {:?}: {:#}", path, e);
            }
            Ok(())
        }
        None => match run.engine_error {
            Some(e) => Err(e.context("Backup failed")),
            None => Ok(()),
        },
    }
}

async fn handle_verify_event(
    cluster: &ClusterArgs,
    name: &str,
    config: &AgentConfig,
) -> anyhow::Result<()> {
    let kubectl = cluster.kubectl(config);
    let namespace = cluster.namespace();

    let outcome = poll_event_outcome(&kubectl, &namespace, name, config.verify.event).await;
    let attempts = outcome.attempts();
    let event = outcome.into_result(name)?;
    println!(
        "Event {} observed after {} attempt(s) with reason '{}'",
        name, attempts, event.reason
    );
    Ok(())
}

async fn handle_verify_teardown(
    cluster: &ClusterArgs,
    kind: WorkloadKind,
    name: &str,
    sidecar: Option<String>,
    config: &AgentConfig,
) -> anyhow::Result<()> {
    let kubectl = cluster.kubectl(config);
    let namespace = cluster.namespace();
    let sidecar = sidecar.unwrap_or_else(|| config.verify.sidecar_name.clone());

    let outcome = poll_sidecar_teardown(
        &kubectl,
        &namespace,
        kind,
        name,
        &sidecar,
        config.verify.teardown,
    )
    .await;
    outcome.into_result(kind, name, &sidecar)?;
    println!("Sidecar {} removed from {}/{}", sidecar, kind, name);
    Ok(())
}

use crate::backup::InvokerStore;
use crate::hooks::SessionStore;
use crate::verify::{EventSource, WorkloadKind, WorkloadSource};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use stowage_lib::types::{BackupTarget, InvokerInfo, TargetInfo, TargetRef};
use tokio::process::Command;
use tracing::debug;

pub const KIND_BACKUP_CONFIGURATION: &str = "BackupConfiguration";
pub const KIND_BACKUP_BATCH: &str = "BackupBatch";

const RESOURCE_BACKUP_CONFIGURATION: &str = "backupconfigurations.stash.appscode.com";
const RESOURCE_BACKUP_BATCH: &str = "backupbatches.stash.appscode.com";
const RESOURCE_BACKUP_SESSION: &str = "backupsessions.stash.appscode.com";

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct PodTemplateSpec {
    #[serde(default)]
    pub spec: PodSpec,
}

/// Anything carrying a pod template.
pub trait PodTemplated {
    fn pod_template(&self) -> Option<&PodTemplateSpec>;

    fn containers(&self) -> &[Container] {
        self.pod_template()
            .map(|t| t.spec.containers.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct ReplicationControllerSpec {
    #[serde(default)]
    pub template: Option<PodTemplateSpec>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct TemplatedSpec {
    #[serde(default)]
    pub template: PodTemplateSpec,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ReplicationController {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ReplicationControllerSpec,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ReplicaSet {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: TemplatedSpec,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Deployment {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: TemplatedSpec,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DaemonSet {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: TemplatedSpec,
}

impl PodTemplated for ReplicationController {
    fn pod_template(&self) -> Option<&PodTemplateSpec> {
        self.spec.template.as_ref()
    }
}

impl PodTemplated for ReplicaSet {
    fn pod_template(&self) -> Option<&PodTemplateSpec> {
        Some(&self.spec.template)
    }
}

impl PodTemplated for Deployment {
    fn pod_template(&self) -> Option<&PodTemplateSpec> {
        Some(&self.spec.template)
    }
}

impl PodTemplated for DaemonSet {
    fn pod_template(&self) -> Option<&PodTemplateSpec> {
        Some(&self.spec.template)
    }
}

/// A workload of one of the supported kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Workload {
    ReplicationController(ReplicationController),
    ReplicaSet(ReplicaSet),
    Deployment(Deployment),
    DaemonSet(DaemonSet),
}

impl Workload {
    /// Decodes an API object of the given kind.
    pub fn from_json(kind: WorkloadKind, json: &str) -> Result<Self> {
        let workload = match kind {
            WorkloadKind::ReplicationController => {
                Workload::ReplicationController(serde_json::from_str(json)?)
            }
            WorkloadKind::ReplicaSet => Workload::ReplicaSet(serde_json::from_str(json)?),
            WorkloadKind::Deployment => Workload::Deployment(serde_json::from_str(json)?),
            WorkloadKind::DaemonSet => Workload::DaemonSet(serde_json::from_str(json)?),
        };
        Ok(workload)
    }

    pub fn kind(&self) -> WorkloadKind {
        match self {
            Workload::ReplicationController(_) => WorkloadKind::ReplicationController,
            Workload::ReplicaSet(_) => WorkloadKind::ReplicaSet,
            Workload::Deployment(_) => WorkloadKind::Deployment,
            Workload::DaemonSet(_) => WorkloadKind::DaemonSet,
        }
    }

    fn templated(&self) -> &dyn PodTemplated {
        match self {
            Workload::ReplicationController(w) => w,
            Workload::ReplicaSet(w) => w,
            Workload::Deployment(w) => w,
            Workload::DaemonSet(w) => w,
        }
    }

    pub fn containers(&self) -> &[Container] {
        self.templated().containers()
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.containers().iter().any(|c| c.name == name)
    }
}

/// Core event object; only the fields verification looks at.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct Event {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvokerObject<S> {
    spec: S,
}

#[derive(Debug, Deserialize)]
struct LocalObjectRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BackupConfigurationSpec {
    #[serde(default)]
    repository: Option<LocalObjectRef>,
    #[serde(default)]
    target: Option<BackupTarget>,
}

#[derive(Debug, Deserialize)]
struct BackupBatchMember {
    #[serde(default)]
    target: Option<BackupTarget>,
}

#[derive(Debug, Deserialize)]
struct BackupBatchSpec {
    #[serde(default)]
    repository: Option<LocalObjectRef>,
    #[serde(default)]
    members: Vec<BackupBatchMember>,
}

/// Decodes an invoker object into its target list.
pub fn parse_invoker(kind: &str, name: &str, json: &str) -> Result<InvokerInfo> {
    let (repository, targets) = match kind {
        KIND_BACKUP_CONFIGURATION => {
            let obj: InvokerObject<BackupConfigurationSpec> = serde_json::from_str(json)
                .with_context(|| format!("Failed to parse {} {}", kind, name))?;
            (
                obj.spec.repository,
                vec![TargetInfo {
                    target: obj.spec.target,
                }],
            )
        }
        KIND_BACKUP_BATCH => {
            let obj: InvokerObject<BackupBatchSpec> = serde_json::from_str(json)
                .with_context(|| format!("Failed to parse {} {}", kind, name))?;
            let targets = obj
                .spec
                .members
                .into_iter()
                .map(|m| TargetInfo { target: m.target })
                .collect();
            (obj.spec.repository, targets)
        }
        other => bail!("Unknown invoker kind '{}'", other),
    };

    Ok(InvokerInfo {
        kind: kind.to_string(),
        name: name.to_string(),
        repository: repository.map(|r| r.name),
        targets,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionTargetStatus {
    #[serde(rename = "ref")]
    target_ref: TargetRef,
    #[serde(default)]
    pre_backup_actions: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionStatus {
    #[serde(default)]
    targets: Vec<SessionTargetStatus>,
}

#[derive(Debug, Deserialize)]
struct BackupSessionObject {
    #[serde(default)]
    status: SessionStatus,
}

/// Pre-backup actions a backup session assigned to `target`.
pub fn parse_session_actions(json: &str, target: &TargetRef) -> Result<Vec<String>> {
    let session: BackupSessionObject =
        serde_json::from_str(json).context("Failed to parse backup session")?;
    Ok(session
        .status
        .targets
        .into_iter()
        .find(|t| t.target_ref.matches(&target.kind, &target.name))
        .map(|t| t.pre_backup_actions)
        .unwrap_or_default())
}

/// Cluster access through `kubectl get ... -o json`.
#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: String,
    kubeconfig: Option<PathBuf>,
    server: Option<String>,
}

impl Kubectl {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            kubeconfig: None,
            server: None,
        }
    }

    pub fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    pub fn with_server(mut self, server: Option<String>) -> Self {
        self.server = server.filter(|s| !s.is_empty());
        self
    }

    pub fn get_args(&self, resource: &str, namespace: &str, name: &str) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(kubeconfig) = &self.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(kubeconfig.to_string_lossy().to_string());
        }
        if let Some(server) = &self.server {
            args.push("--server".to_string());
            args.push(server.clone());
        }
        args.extend([
            "get".to_string(),
            resource.to_string(),
            name.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
            "--output".to_string(),
            "json".to_string(),
        ]);
        args
    }

    async fn get_raw(&self, resource: &str, namespace: &str, name: &str) -> Result<String> {
        let args = self.get_args(resource, namespace, name);
        debug!("Running {} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to execute kubectl")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "kubectl get {} {}/{}: {}",
                resource,
                namespace,
                name,
                stderr.trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn get<T: DeserializeOwned>(&self, resource: &str, namespace: &str, name: &str) -> Result<T> {
        let raw = self.get_raw(resource, namespace, name).await?;
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse {} {}", resource, name))
    }
}

#[async_trait]
impl InvokerStore for Kubectl {
    async fn invoker(&self, kind: &str, name: &str, namespace: &str) -> Result<InvokerInfo> {
        let resource = match kind {
            KIND_BACKUP_CONFIGURATION => RESOURCE_BACKUP_CONFIGURATION,
            KIND_BACKUP_BATCH => RESOURCE_BACKUP_BATCH,
            other => bail!("Unknown invoker kind '{}'", other),
        };
        let raw = self.get_raw(resource, namespace, name).await?;
        parse_invoker(kind, name, &raw)
    }
}

#[async_trait]
impl SessionStore for Kubectl {
    async fn pre_backup_actions(
        &self,
        namespace: &str,
        session: &str,
        target: &TargetRef,
    ) -> Result<Vec<String>> {
        let raw = self.get_raw(RESOURCE_BACKUP_SESSION, namespace, session).await?;
        parse_session_actions(&raw, target)
    }
}

#[async_trait]
impl EventSource for Kubectl {
    async fn event(&self, namespace: &str, name: &str) -> Result<Event> {
        self.get("events", namespace, name).await
    }
}

#[async_trait]
impl WorkloadSource for Kubectl {
    async fn workload(&self, kind: WorkloadKind, namespace: &str, name: &str) -> Result<Workload> {
        let raw = self.get_raw(kind.resource(), namespace, name).await?;
        Workload::from_json(kind, &raw)
            .with_context(|| format!("Failed to parse {} {}", kind, name))
    }
}

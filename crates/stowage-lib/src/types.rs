use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a backup target: the workload/resource kind and its name.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    pub kind: String,
    pub name: String,
}

impl TargetRef {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: None,
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Exact string match on kind and name. `api_version` is ignored.
    pub fn matches(&self, kind: &str, name: &str) -> bool {
        self.kind == kind && self.name == name
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.to_lowercase(), self.name)
    }
}

/// A resolved backup target as described by its invoker.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupTarget {
    #[serde(rename = "ref")]
    pub target_ref: TargetRef,
    /// Overrides the host identity statistics are recorded under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// One entry of an invoker's target list. `target` is empty when the entry
/// does not point at a concrete workload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TargetInfo {
    pub target: Option<BackupTarget>,
}

/// Invoker metadata: the entity owning one or more backup targets.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokerInfo {
    pub kind: String,
    pub name: String,
    pub repository: Option<String>,
    pub targets: Vec<TargetInfo>,
}

/// Outcome phase for one host.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum HostBackupPhase {
    Succeeded,
    Failed,
}

/// File counters reported by the engine for one snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FileStats {
    pub new: u64,
    pub modified: u64,
    pub unmodified: u64,
    pub total: u64,
}

/// Statistics for one snapshot taken during a backup.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStats {
    /// Engine snapshot ID.
    pub name: String,
    /// Paths included in the snapshot, comma separated.
    pub path: String,
    /// Total bytes processed.
    pub total_size: u64,
    /// Bytes newly added to the repository.
    pub uploaded: u64,
    pub processing_time_secs: f64,
    pub file_stats: FileStats,
}

/// Backup outcome for a single host of a target.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostBackupStat {
    pub hostname: String,
    pub phase: HostBackupPhase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshots: Vec<SnapshotStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HostBackupStat {
    /// A failed stat carrying only the host and the failure description.
    pub fn failed(hostname: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            phase: HostBackupPhase::Failed,
            snapshots: Vec::new(),
            duration_secs: None,
            completed_at: None,
            error: Some(error.into()),
        }
    }
}

/// Status of one target: its reference and the ordered per-host stats.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupTargetStatus {
    #[serde(rename = "ref")]
    pub target_ref: TargetRef,
    #[serde(default)]
    pub stats: Vec<HostBackupStat>,
}

/// Top-level envelope written to the output sink.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupOutput {
    pub backup_target_status: BackupTargetStatus,
}

impl BackupOutput {
    pub fn new(target_ref: TargetRef, stats: Vec<HostBackupStat>) -> Self {
        Self {
            backup_target_status: BackupTargetStatus { target_ref, stats },
        }
    }

    pub fn target_ref(&self) -> &TargetRef {
        &self.backup_target_status.target_ref
    }

    pub fn stats(&self) -> &[HostBackupStat] {
        &self.backup_target_status.stats
    }
}

//! Out-of-band checks that a backup left the cluster in the expected state.
//!
//! Both polls use a fixed interval and a hard retry ceiling, so a poll that
//! never succeeds ends after roughly `interval * max_retries`.

use crate::cluster::{Event, Workload};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use stowage_lib::config::PollConfig;
use stowage_lib::error::VerifyError;
use tracing::{debug, info, warn};

/// Event reason marking a failed backup.
pub const REASON_FAILED: &str = "Failed";

#[async_trait]
pub trait EventSource: Send + Sync {
    async fn event(&self, namespace: &str, name: &str) -> Result<Event>;
}

/// Fetches a workload of the given kind. One lookup for every kind.
#[async_trait]
pub trait WorkloadSource: Send + Sync {
    async fn workload(&self, kind: WorkloadKind, namespace: &str, name: &str) -> Result<Workload>;
}

/// Workload shapes the sidecar can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    ReplicationController,
    ReplicaSet,
    Deployment,
    DaemonSet,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::ReplicationController => "ReplicationController",
            WorkloadKind::ReplicaSet => "ReplicaSet",
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::DaemonSet => "DaemonSet",
        }
    }

    /// kubectl resource name.
    pub fn resource(&self) -> &'static str {
        match self {
            WorkloadKind::ReplicationController => "replicationcontrollers",
            WorkloadKind::ReplicaSet => "replicasets",
            WorkloadKind::Deployment => "deployments",
            WorkloadKind::DaemonSet => "daemonsets",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replicationcontroller" | "rc" => Ok(WorkloadKind::ReplicationController),
            "replicaset" | "rs" => Ok(WorkloadKind::ReplicaSet),
            "deployment" | "deploy" => Ok(WorkloadKind::Deployment),
            "daemonset" | "ds" => Ok(WorkloadKind::DaemonSet),
            _ => Err(format!(
                "unknown workload kind '{}' (expected ReplicationController, ReplicaSet, Deployment or DaemonSet)",
                s
            )),
        }
    }
}

/// How an event-outcome poll ended.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    ObservedSuccess { event: Event, attempts: u32 },
    ObservedFailure { event: Event, attempts: u32 },
    TimedOut { attempts: u32, last_error: String },
}

impl EventOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            EventOutcome::ObservedSuccess { attempts, .. }
            | EventOutcome::ObservedFailure { attempts, .. }
            | EventOutcome::TimedOut { attempts, .. } => *attempts,
        }
    }

    pub fn into_result(self, name: &str) -> Result<Event, VerifyError> {
        match self {
            EventOutcome::ObservedSuccess { event, .. } => Ok(event),
            EventOutcome::ObservedFailure { event, .. } => Err(VerifyError::ObservedFailure {
                name: name.to_string(),
                message: event.message,
            }),
            EventOutcome::TimedOut {
                attempts,
                last_error,
            } => Err(VerifyError::Unobserved {
                name: name.to_string(),
                attempts,
                last_error,
            }),
        }
    }
}

/// Polls for the event `name` until it can be fetched.
///
/// Only fetch failures consume retries. Once fetched, a `Failed` reason is an
/// observed failure and anything else an observed success.
pub async fn poll_event_outcome(
    source: &dyn EventSource,
    namespace: &str,
    name: &str,
    policy: PollConfig,
) -> EventOutcome {
    let mut retries = 0;
    loop {
        match source.event(namespace, name).await {
            Ok(event) => {
                let attempts = retries + 1;
                debug!("Event {} observed with reason '{}'", name, event.reason);
                return if event.reason == REASON_FAILED {
                    EventOutcome::ObservedFailure { event, attempts }
                } else {
                    EventOutcome::ObservedSuccess { event, attempts }
                };
            }
            Err(e) => {
                if retries >= policy.max_retries {
                    warn!("Giving up on event {} after {} attempts", name, retries + 1);
                    return EventOutcome::TimedOut {
                        attempts: retries + 1,
                        last_error: format!("{:#}", e),
                    };
                }
                info!(
                    "Waiting {}s for event {} of the backup process",
                    policy.interval_secs, name
                );
                tokio::time::sleep(policy.interval()).await;
                retries += 1;
            }
        }
    }
}

/// How a teardown-confirmation poll ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TeardownOutcome {
    Confirmed {
        attempts: u32,
    },
    GaveUp {
        attempts: u32,
        last_error: Option<String>,
    },
}

impl TeardownOutcome {
    pub fn into_result(
        self,
        kind: WorkloadKind,
        name: &str,
        sidecar: &str,
    ) -> Result<(), VerifyError> {
        match self {
            TeardownOutcome::Confirmed { .. } => Ok(()),
            TeardownOutcome::GaveUp {
                attempts,
                last_error,
            } => Err(VerifyError::TeardownUnconfirmed {
                workload: format!("{}/{}", kind, name),
                sidecar: sidecar.to_string(),
                attempts,
                last_error,
            }),
        }
    }
}

/// Polls the workload until `sidecar` is gone from its pod template.
///
/// Every attempt waits one interval first, since removal happens after the
/// backup finishes. Only a successful fetch can confirm the teardown; a fetch
/// error counts as an unconfirmed attempt.
pub async fn poll_sidecar_teardown(
    source: &dyn WorkloadSource,
    namespace: &str,
    kind: WorkloadKind,
    name: &str,
    sidecar: &str,
    policy: PollConfig,
) -> TeardownOutcome {
    let mut attempts = 0;
    loop {
        info!(
            "Waiting {}s before checking {} removal from {}/{}",
            policy.interval_secs, sidecar, kind, name
        );
        tokio::time::sleep(policy.interval()).await;
        attempts += 1;

        let last_error = match source.workload(kind, namespace, name).await {
            Ok(workload) if !workload.has_container(sidecar) => {
                debug!("Sidecar {} removed from {}/{}", sidecar, kind, name);
                return TeardownOutcome::Confirmed { attempts };
            }
            Ok(_) => {
                debug!("Sidecar {} still present in {}/{}", sidecar, kind, name);
                None
            }
            Err(e) => {
                warn!("Failed to fetch {}/{}: {:#}", kind, name, e);
                Some(format!("{:#}", e))
            }
        };

        if attempts > policy.max_retries {
            return TeardownOutcome::GaveUp {
                attempts,
                last_error,
            };
        }
    }
}

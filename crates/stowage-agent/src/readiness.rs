use crate::hooks::ActionContext;
use async_trait::async_trait;
use stowage_lib::config::PollConfig;
use stowage_lib::error::BackupError;
use tracing::{debug, info, warn};

/// Checks whether the backend repository is initialized and usable.
#[async_trait]
pub trait RepositoryProbe: Send + Sync {
    async fn is_ready(&self, ctx: &ActionContext<'_>) -> anyhow::Result<bool>;
}

/// Blocks until the repository for `ctx.target` is ready.
///
/// Checks once immediately, then up to `policy.max_retries` more times with
/// a fixed sleep in between. A failing probe counts as "not ready yet".
/// Returns the number of checks performed.
pub async fn wait_for_repository(
    probe: &dyn RepositoryProbe,
    ctx: &ActionContext<'_>,
    policy: PollConfig,
) -> Result<u32, BackupError> {
    let mut retries = 0;
    let mut last_error = None;
    loop {
        match probe.is_ready(ctx).await {
            Ok(true) => {
                debug!("Repository for {} ready after {} checks", ctx.target, retries + 1);
                return Ok(retries + 1);
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Repository check for {} failed: {:#}", ctx.target, e);
                last_error = Some(format!("{:#}", e));
            }
        }

        if retries >= policy.max_retries {
            return Err(BackupError::ReadinessTimeout {
                target: ctx.target.clone(),
                attempts: retries + 1,
                last_error,
            });
        }
        info!(
            "Waiting {}s for repository of {} to be initialized",
            policy.interval_secs, ctx.target
        );
        tokio::time::sleep(policy.interval()).await;
        retries += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use stowage_lib::options::SetupOptions;
    use stowage_lib::types::TargetRef;

    /// Ready from the `ready_at`-th check on.
    struct CountingProbe {
        calls: AtomicU32,
        ready_at: Option<u32>,
    }

    #[async_trait]
    impl RepositoryProbe for CountingProbe {
        async fn is_ready(&self, _ctx: &ActionContext<'_>) -> anyhow::Result<bool> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 1 {
                anyhow::bail!("bucket unreachable");
            }
            Ok(self.ready_at.is_some_and(|at| n >= at))
        }
    }

    fn policy() -> PollConfig {
        PollConfig {
            interval_secs: 5,
            max_retries: 3,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_repository_returns_after_retries() {
        let probe = CountingProbe {
            calls: AtomicU32::new(0),
            ready_at: Some(3),
        };
        let target = TargetRef::new("Deployment", "app-x");
        let setup = SetupOptions::default();
        let ctx = ActionContext {
            target: &target,
            setup: &setup,
            session: "",
            namespace: "demo",
        };

        let start = tokio::time::Instant::now();
        let checks = wait_for_repository(&probe, &ctx, policy()).await.unwrap();
        assert_eq!(checks, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_ready_times_out() {
        let probe = CountingProbe {
            calls: AtomicU32::new(0),
            ready_at: None,
        };
        let target = TargetRef::new("Deployment", "app-x");
        let setup = SetupOptions::default();
        let ctx = ActionContext {
            target: &target,
            setup: &setup,
            session: "",
            namespace: "demo",
        };

        let err = wait_for_repository(&probe, &ctx, policy()).await.unwrap_err();
        match err {
            BackupError::ReadinessTimeout {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(last_error.as_deref(), Some("bucket unreachable"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
    }
}

use stowage_lib::error::BackupError;
use stowage_lib::paths::DEFAULT_HOST;
use stowage_lib::types::{BackupTarget, TargetInfo};

/// Result of looking a target up in an invoker's target list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution<'a> {
    Found(&'a BackupTarget),
    NotFound,
}

impl<'a> Resolution<'a> {
    pub fn found(self) -> Option<&'a BackupTarget> {
        match self {
            Resolution::Found(target) => Some(target),
            Resolution::NotFound => None,
        }
    }
}

/// Returns the first target whose reference matches `kind` and `name`
/// exactly. Entries without a concrete target are skipped.
pub fn resolve<'a>(targets: &'a [TargetInfo], kind: &str, name: &str) -> Resolution<'a> {
    targets
        .iter()
        .filter_map(|info| info.target.as_ref())
        .find(|target| target.target_ref.matches(kind, name))
        .map_or(Resolution::NotFound, Resolution::Found)
}

/// Host identity backup statistics are recorded under.
///
/// An alias always wins. StatefulSet replicas are recorded as
/// `host-<ordinal>`, the ordinal taken from the pod name. A PVC uses its own
/// name. Everything else shares the default host.
pub fn host_identity(target: &BackupTarget, pod_name: Option<&str>) -> Result<String, BackupError> {
    if let Some(alias) = target.alias.as_deref().filter(|a| !a.is_empty()) {
        return Ok(alias.to_string());
    }

    match target.target_ref.kind.as_str() {
        "StatefulSet" => {
            let pod_name = pod_name.filter(|p| !p.is_empty()).ok_or_else(|| {
                BackupError::Lookup(anyhow::anyhow!(
                    "missing POD_NAME for {}",
                    target.target_ref
                ))
            })?;
            let ordinal = pod_name.rsplit('-').next().unwrap_or(pod_name);
            Ok(format!("host-{}", ordinal))
        }
        "PersistentVolumeClaim" => Ok(target.target_ref.name.clone()),
        _ => Ok(DEFAULT_HOST.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_lib::types::TargetRef;

    fn target(kind: &str, name: &str) -> BackupTarget {
        BackupTarget {
            target_ref: TargetRef::new(kind, name),
            alias: None,
        }
    }

    fn info(kind: &str, name: &str) -> TargetInfo {
        TargetInfo {
            target: Some(target(kind, name)),
        }
    }

    #[test]
    fn test_resolve_finds_matching_target() {
        let targets = vec![
            info("StatefulSet", "db"),
            TargetInfo::default(),
            info("Deployment", "app-x"),
        ];
        let found = resolve(&targets, "Deployment", "app-x").found().unwrap();
        assert_eq!(found.target_ref, TargetRef::new("Deployment", "app-x"));
    }

    #[test]
    fn test_resolve_first_match_wins() {
        let mut first = target("Deployment", "app-x");
        first.alias = Some("first".to_string());
        let targets = vec![
            TargetInfo {
                target: Some(first),
            },
            info("Deployment", "app-x"),
        ];
        let found = resolve(&targets, "Deployment", "app-x").found().unwrap();
        assert_eq!(found.alias.as_deref(), Some("first"));
    }

    #[test]
    fn test_resolve_not_found_for_any_list_size() {
        for n in 0..5 {
            let targets: Vec<TargetInfo> = (0..n)
                .map(|i| {
                    if i % 2 == 0 {
                        info("Deployment", &format!("app-{}", i))
                    } else {
                        TargetInfo::default()
                    }
                })
                .collect();
            assert_eq!(
                resolve(&targets, "Deployment", "missing"),
                Resolution::NotFound
            );
            assert_eq!(
                resolve(&targets, "deployment", "app-0"),
                Resolution::NotFound
            );
        }
    }

    #[test]
    fn test_host_identity_rules() {
        let mut t = target("Deployment", "app-x");
        assert_eq!(host_identity(&t, None).unwrap(), "host-0");

        t.alias = Some("primary".to_string());
        assert_eq!(host_identity(&t, None).unwrap(), "primary");

        let pvc = target("PersistentVolumeClaim", "data-pvc");
        assert_eq!(host_identity(&pvc, None).unwrap(), "data-pvc");

        let sts = target("StatefulSet", "db");
        assert_eq!(host_identity(&sts, Some("db-2")).unwrap(), "host-2");
        assert!(matches!(
            host_identity(&sts, None),
            Err(BackupError::Lookup(_))
        ));
    }
}

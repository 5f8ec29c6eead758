//! Workspace assembly for CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use custodian_engine::{Coordinator, FileAuditSink, FsSideEffector};
use custodian_registry::{FileRegistry, Registry};
use custodian_types::EnginePolicy;

/// An opened workspace: registry, coordinator, and policy over one root.
pub struct Workspace {
    /// Workspace root.
    pub root: PathBuf,

    /// Registry handle.
    pub registry: Arc<dyn Registry>,

    /// The coordinator all commands submit through.
    pub coordinator: Coordinator,

    /// Policy in effect.
    pub policy: EnginePolicy,
}

impl Workspace {
    /// Open the workspace at `root` with the layered policy
    /// (defaults, optional file, CUSTODIAN__ environment).
    pub async fn open(root: PathBuf, config_path: Option<&str>) -> anyhow::Result<Self> {
        let policy = load_policy(config_path)?;

        let registry: Arc<dyn Registry> = Arc::new(FileRegistry::open(&root).await?);
        let effects = Arc::new(FsSideEffector::open(&root).await?);
        let audit = Arc::new(FileAuditSink::open(root.join("audit.jsonl")).await?);
        let coordinator = Coordinator::new(
            &root,
            registry.clone(),
            effects,
            audit,
            policy.clone(),
        )
        .await?;

        Ok(Self {
            root,
            registry,
            coordinator,
            policy,
        })
    }
}

fn load_policy(path: Option<&str>) -> Result<EnginePolicy, config::ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(config::Config::try_from(&EnginePolicy::default())?);

    if let Some(path) = path {
        builder = builder.add_source(config::File::with_name(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CUSTODIAN")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults_without_file() {
        let policy = load_policy(None).unwrap();
        assert_eq!(policy.thresholds.delete, 0.90);
    }
}

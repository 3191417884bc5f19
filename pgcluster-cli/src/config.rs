use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pgcluster_converge::{HostRegistry, SshOptions, Templates};
use pgcluster_models::{Cluster, ClusterDeclaration};

use crate::cli::Args;

/// Everything a command needs, loaded from flags, environment and `.env`
#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: PathBuf,
    pub templates_dir: PathBuf,
    pub ssh: SshOptions,
}

impl Config {
    pub fn from_args(args: &Args) -> Self {
        Self {
            config_path: args.config.clone(),
            templates_dir: args.templates.clone(),
            ssh: SshOptions {
                user: args.ssh_user.clone(),
                program: args.ssh_program.clone(),
                ..Default::default()
            },
        }
    }

    /// Parse and resolve the cluster declaration
    pub fn load_cluster(&self) -> Result<Cluster> {
        load_cluster(&self.config_path)
    }

    /// Templates from the templates directory. A missing directory falls back
    /// to the built-in defaults; a missing file inside it is an error.
    pub fn load_templates(&self, cluster: &Cluster) -> Result<Templates> {
        if !self.templates_dir.is_dir() {
            tracing::warn!(
                "Templates directory {} not found, using built-in templates",
                self.templates_dir.display()
            );
            return Templates::builtin().context("Failed to load built-in templates");
        }
        Templates::load(&self.templates_dir, cluster)
            .with_context(|| format!("Failed to load templates from {}", self.templates_dir.display()))
    }

    pub fn hosts(&self, cluster: &Cluster) -> HostRegistry {
        HostRegistry::ssh(cluster, &self.ssh)
    }
}

pub fn load_cluster(path: &Path) -> Result<Cluster> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read cluster declaration {}", path.display()))?;
    let declaration = ClusterDeclaration::from_yaml(&source)
        .with_context(|| format!("Invalid cluster declaration {}", path.display()))?;
    declaration
        .resolve()
        .with_context(|| format!("Invalid cluster declaration {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgcluster_converge::templates::defaults;

    #[test]
    fn test_example_declaration_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pgcluster.yaml");
        std::fs::write(&path, defaults::CLUSTER_FILE).unwrap();

        let cluster = load_cluster(&path).unwrap();
        assert_eq!(cluster.master().domain, "client.example.com");
        assert_eq!(cluster.replicas().count(), 1);
    }

    #[test]
    fn test_two_masters_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pgcluster.yaml");
        let source = defaults::CLUSTER_FILE.replace("    port: 5433\n", "    port: 5433\n    master: true\n");
        std::fs::write(&path, source).unwrap();

        let err = load_cluster(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("more than one master"), "{:#}", err);
    }

    #[test]
    fn test_missing_templates_dir_uses_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = pgcluster_converge::testing::sample_cluster();
        let config = Config {
            config_path: dir.path().join("pgcluster.yaml"),
            templates_dir: dir.path().join("absent"),
            ssh: SshOptions::default(),
        };
        assert!(config.load_templates(&cluster).is_ok());

        std::fs::create_dir(dir.path().join("empty")).unwrap();
        let config = Config {
            templates_dir: dir.path().join("empty"),
            ..config
        };
        let err = config.load_templates(&cluster).unwrap_err();
        assert!(format!("{:#}", err).contains("postgresql.conf.tera"));
    }
}

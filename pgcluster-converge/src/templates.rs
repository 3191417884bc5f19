//! Config file templates
//!
//! Each installed file `<name>` is rendered from `<name>.tera` in the
//! operator's templates directory. Rendering is pure: the same cluster and
//! server always produce the same bytes, which is what makes drift detection
//! a plain byte comparison.

use std::path::{Path, PathBuf};

use pgcluster_models::{Cluster, ConfigurationError, ImageSpec, Server, REPLICATOR_ROLE};
use serde::Serialize;
use tera::{Context as TeraContext, Tera};

use crate::command::CONTAINER_PORT;

/// Default templates written by `pgcluster init`
pub mod defaults {
    pub const POSTGRESQL_CONF: &str = include_str!("../templates/postgresql.conf.tera");
    pub const PG_HBA_CONF: &str = include_str!("../templates/pg_hba.conf.tera");
    pub const RECOVERY_CONF: &str = include_str!("../templates/recovery.conf.tera");
    pub const CLUSTER_FILE: &str = include_str!("../templates/pgcluster.yaml");

    /// (template file name, contents)
    pub fn templates() -> [(&'static str, &'static str); 3] {
        [
            ("postgresql.conf.tera", POSTGRESQL_CONF),
            ("pg_hba.conf.tera", PG_HBA_CONF),
            ("recovery.conf.tera", RECOVERY_CONF),
        ]
    }
}

pub const TEMPLATE_EXTENSION: &str = "tera";

/// Values available to every template
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext<'a> {
    /// The server being rendered for
    pub server: &'a Server,
    /// The cluster's master, for replication settings
    pub master: &'a Server,
    /// Every declared server, for `pg_hba.conf` allow lists
    pub servers: &'a [Server],
    pub image: &'a ImageSpec,
    pub replicator_role: &'a str,
    pub replicator_password: &'a str,
    /// Port postgres listens on inside the container
    pub container_port: u16,
}

impl<'a> TemplateContext<'a> {
    pub fn new(cluster: &'a Cluster, server: &'a Server) -> Self {
        Self {
            server,
            master: cluster.master(),
            servers: cluster.servers(),
            image: &cluster.image,
            replicator_role: REPLICATOR_ROLE,
            replicator_password: &cluster.replicator_password,
            container_port: CONTAINER_PORT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Templates {
    tera: Tera,
}

impl Templates {
    /// Load one template per config file the cluster installs. The
    /// replication template is only required when replicas are declared.
    pub fn load(dir: &Path, cluster: &Cluster) -> Result<Self, ConfigurationError> {
        let mut files: Vec<&str> = cluster.config_files().collect();
        if cluster.replicas().next().is_some() {
            files.push(&cluster.image.replication_config_file);
        }

        let mut tera = Tera::default();
        for file in files {
            let path = template_path(dir, file);
            let source = std::fs::read_to_string(&path).map_err(|_| ConfigurationError::MissingTemplate {
                path: path.display().to_string(),
            })?;
            tera.add_raw_template(file, &source)
                .map_err(|e| template_error(file, &e))?;
        }
        Ok(Self { tera })
    }

    /// Templates from in-memory sources, keyed by installed file name
    pub fn from_raw<'s, I>(templates: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (&'s str, &'s str)>,
    {
        let mut tera = Tera::default();
        for (file, source) in templates {
            tera.add_raw_template(file, source)
                .map_err(|e| template_error(file, &e))?;
        }
        Ok(Self { tera })
    }

    /// The embedded default templates
    pub fn builtin() -> Result<Self, ConfigurationError> {
        Self::from_raw([
            ("postgresql.conf", defaults::POSTGRESQL_CONF),
            ("pg_hba.conf", defaults::PG_HBA_CONF),
            ("recovery.conf", defaults::RECOVERY_CONF),
        ])
    }

    pub fn render(&self, file: &str, context: &TemplateContext<'_>) -> Result<String, ConfigurationError> {
        if !self.tera.get_template_names().any(|name| name == file) {
            return Err(ConfigurationError::MissingTemplate {
                path: format!("{}.{}", file, TEMPLATE_EXTENSION),
            });
        }
        let context = TeraContext::from_serialize(context).map_err(|e| template_error(file, &e))?;
        self.tera
            .render(file, &context)
            .map_err(|e| template_error(file, &e))
    }

    /// Render every config file installed into the conf dir, in declaration order
    pub fn render_config_files(
        &self,
        cluster: &Cluster,
        server: &Server,
    ) -> Result<Vec<(String, String)>, ConfigurationError> {
        let context = TemplateContext::new(cluster, server);
        cluster
            .config_files()
            .map(|file| Ok((file.to_string(), self.render(file, &context)?)))
            .collect()
    }
}

pub fn template_path(dir: &Path, file: &str) -> PathBuf {
    dir.join(format!("{}.{}", file, TEMPLATE_EXTENSION))
}

/// tera hides the useful part of its errors in the source chain
fn template_error(file: &str, error: &dyn std::error::Error) -> ConfigurationError {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    ConfigurationError::Template {
        name: file.to_string(),
        message,
    }
}

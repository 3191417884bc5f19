//! Per-server status report
//!
//! A failed probe never aborts the report; the field shows as `unknown`.

use std::fmt;

use pgcluster_models::{Cluster, ConfigurationError, Server};
use serde::Serialize;

use crate::probe::Probe;
use crate::registry::HostRegistry;
use crate::types::ContainerState;

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub domain: String,
    pub port: u16,
    pub container_name: String,
    pub master: bool,
    /// `None` when the probe failed
    pub container: Option<ContainerState>,
    pub roles: Option<Vec<String>>,
    pub databases: Option<Vec<String>>,
    pub replication: Option<String>,
}

impl ServerStatus {
    fn new(server: &Server) -> Self {
        Self {
            domain: server.domain.clone(),
            port: server.port,
            container_name: server.container_name.clone(),
            master: server.is_master(),
            container: None,
            roles: None,
            databases: None,
            replication: None,
        }
    }

    fn running(&self) -> bool {
        self.container.map(ContainerState::is_running).unwrap_or(false)
    }
}

fn list_or_unknown(items: &Option<Vec<String>>) -> String {
    match items {
        Some(items) if items.is_empty() => "(none)".to_string(),
        Some(items) => items.join(", "),
        None => UNKNOWN.to_string(),
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = if self.master { "master" } else { "replica" };
        writeln!(f, "{}:{} ({}) {}", self.domain, self.port, role, self.container_name)?;
        match self.container {
            Some(state) => writeln!(f, "  container:   {}", state)?,
            None => writeln!(f, "  container:   {}", UNKNOWN)?,
        }
        if self.container.is_some() && !self.running() {
            return Ok(());
        }
        writeln!(f, "  roles:       {}", list_or_unknown(&self.roles))?;
        writeln!(f, "  databases:   {}", list_or_unknown(&self.databases))?;
        match &self.replication {
            Some(replication) => {
                writeln!(f, "  replication:")?;
                for line in replication.lines() {
                    writeln!(f, "    {}", line)?;
                }
                Ok(())
            }
            None => writeln!(f, "  replication: {}", UNKNOWN),
        }
    }
}

/// Status of every server, or of the servers on `domain`
pub async fn collect_status(
    cluster: &Cluster,
    hosts: &HostRegistry,
    domain: Option<&str>,
) -> Result<Vec<ServerStatus>, ConfigurationError> {
    let servers = match domain {
        Some(domain) => cluster.servers_on(domain)?,
        None => cluster.servers().iter().collect(),
    };

    let mut report = Vec::with_capacity(servers.len());
    for server in servers {
        let remote = hosts.get(&server.domain)?;
        report.push(server_status(server, &Probe::new(cluster, server, remote.as_ref())).await);
    }
    Ok(report)
}

async fn server_status(server: &Server, probe: &Probe<'_>) -> ServerStatus {
    let mut status = ServerStatus::new(server);

    status.container = probe
        .container_state()
        .await
        .map_err(|err| tracing::warn!(host = %server.domain, "{}", err))
        .ok();
    if status.container.is_some() && !status.running() {
        return status;
    }

    status.roles = probe
        .role_names()
        .await
        .map_err(|err| tracing::warn!(host = %server.domain, "{}", err))
        .ok();
    status.databases = probe
        .database_names()
        .await
        .map_err(|err| tracing::warn!(host = %server.domain, "{}", err))
        .ok();
    status.replication = probe
        .replication_status()
        .await
        .map_err(|err| tracing::warn!(host = %server.domain, "{}", err))
        .ok();
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_cluster, FakeHost};

    fn hosts(db1: &FakeHost, db2: &FakeHost) -> HostRegistry {
        HostRegistry::builder().register(db1.clone()).register(db2.clone()).build()
    }

    #[tokio::test]
    async fn test_running_master_reports_catalog() {
        let cluster = sample_cluster();
        let db1 = FakeHost::new("db1.example.com");
        let db2 = FakeHost::new("db2.example.com");
        db1.put_container(&cluster.master().container_name, "running");
        db1.put_role("client");
        db1.put_database("client", 3);

        let report = collect_status(&cluster, &hosts(&db1, &db2), Some("db1.example.com"))
            .await
            .unwrap();
        assert_eq!(report.len(), 1);
        let master = &report[0];
        assert_eq!(master.container, Some(ContainerState::Running));
        assert_eq!(master.roles.as_deref(), Some(&["client".to_string(), "postgres".to_string()][..]));
        assert!(master.databases.as_ref().unwrap().contains(&"client".to_string()));
        assert!(master.replication.is_some());
        assert!(db1.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_missing_container_skips_sql() {
        let cluster = sample_cluster();
        let db1 = FakeHost::new("db1.example.com");
        let db2 = FakeHost::new("db2.example.com");

        let report = collect_status(&cluster, &hosts(&db1, &db2), None).await.unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report[1].container, Some(ContainerState::Missing));
        assert!(report[1].roles.is_none());
        assert!(!db2.commands().iter().any(|command| command.contains("psql")));
        assert!(report[1].to_string().contains("container:   missing"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_unknown() {
        let cluster = sample_cluster();
        let db1 = FakeHost::new("db1.example.com");
        let db2 = FakeHost::new("db2.example.com");
        db2.set_unreachable(true);

        let report = collect_status(&cluster, &hosts(&db1, &db2), None).await.unwrap();
        let replica = &report[1];
        assert_eq!(replica.container, None);
        let text = replica.to_string();
        assert!(text.contains("container:   unknown"));
        assert!(text.contains("roles:       unknown"));
    }

    #[tokio::test]
    async fn test_unknown_domain_is_a_configuration_error() {
        let cluster = sample_cluster();
        let db1 = FakeHost::new("db1.example.com");
        let db2 = FakeHost::new("db2.example.com");
        let err = collect_status(&cluster, &hosts(&db1, &db2), Some("db9.example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownDomain(_)));
    }
}

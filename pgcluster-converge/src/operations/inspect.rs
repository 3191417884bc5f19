//! Raw catalog and replication listings

use pgcluster_models::Cluster;

use crate::error::{ProbeError, Result};
use crate::probe::Probe;
use crate::registry::HostRegistry;

/// psql `\du` on the master
pub async fn list_roles(cluster: &Cluster, hosts: &HostRegistry) -> Result<String> {
    let master = cluster.master();
    let remote = hosts.get(&master.domain)?;
    Ok(Probe::new(cluster, master, remote.as_ref()).list_roles().await?)
}

/// psql `\l` on the master
pub async fn list_databases(cluster: &Cluster, hosts: &HostRegistry) -> Result<String> {
    let master = cluster.master();
    let remote = hosts.get(&master.domain)?;
    Ok(Probe::new(cluster, master, remote.as_ref()).list_databases().await?)
}

#[derive(Debug)]
pub struct ReplicationReport {
    pub domain: String,
    pub port: u16,
    pub master: bool,
    pub status: Result<String, ProbeError>,
}

/// Replication status of every server, master first. One unreachable
/// server does not hide the others.
pub async fn streaming_status(cluster: &Cluster, hosts: &HostRegistry) -> Result<Vec<ReplicationReport>> {
    let mut reports = Vec::with_capacity(cluster.servers().len());
    for server in std::iter::once(cluster.master()).chain(cluster.replicas()) {
        let remote = hosts.get(&server.domain)?;
        let status = Probe::new(cluster, server, remote.as_ref()).replication_status().await;
        reports.push(ReplicationReport {
            domain: server.domain.clone(),
            port: server.port,
            master: server.is_master(),
            status,
        });
    }
    Ok(reports)
}

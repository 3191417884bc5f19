//! Resolved cluster model and the resolver that produces it
//!
//! Resolution is pure: the same declaration always yields the same container
//! names and host paths, which is what lets later runs find the containers
//! and data directories created by earlier runs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::declaration::{ClusterDeclaration, DatabaseSpec, ImageSpec, ServerDeclaration};
use crate::error::ConfigurationError;

/// Name of the built-in role replicas stream from
pub const REPLICATOR_ROLE: &str = "replicator";

/// Superuser the client tools connect as
pub const SUPERUSER: &str = "postgres";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServerRole {
    Master,
    Replica,
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerRole::Master => write!(f, "master"),
            ServerRole::Replica => write!(f, "replica"),
        }
    }
}

/// One PostgreSQL container on one host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub domain: String,
    pub port: u16,
    pub role: ServerRole,
    pub container_name: String,
    /// Host-side directory mounted at the image's data path
    pub data_path: String,
    /// Host-side directory mounted at the image's conf path
    pub conf_path: String,
    /// Host-side directory mounted at the image's socket path
    pub socket_path: String,
}

impl Server {
    pub fn is_master(&self) -> bool {
        self.role == ServerRole::Master
    }

    /// Host-side path of an installed config file
    pub fn config_file_path(&self, file: &str) -> String {
        format!("{}/{}", self.conf_path, file)
    }

    /// Host-side path of a file inside the data directory
    pub fn data_file_path(&self, file: &str) -> String {
        format!("{}/{}", self.data_path, file)
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.domain, self.port)
    }
}

/// Fully resolved cluster topology. Only [`ClusterDeclaration::resolve`]
/// builds one, so exactly one master is always present.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Cluster {
    pub image: ImageSpec,
    pub storage_root: String,
    pub replicator_password: String,
    pub ssl_subject: Option<String>,
    /// Declaration order; exactly one entry is master
    servers: Vec<Server>,
    #[serde(skip)]
    master_index: usize,
    pub databases: Vec<DatabaseSpec>,
}

impl Cluster {
    pub fn master(&self) -> &Server {
        &self.servers[self.master_index]
    }

    /// Every server, in declaration order
    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn replicas(&self) -> impl Iterator<Item = &Server> {
        self.servers.iter().filter(|server| !server.is_master())
    }

    /// All servers running on `domain`
    pub fn servers_on(&self, domain: &str) -> Result<Vec<&Server>, ConfigurationError> {
        let servers: Vec<&Server> = self
            .servers
            .iter()
            .filter(|server| server.domain == domain)
            .collect();
        if servers.is_empty() {
            return Err(ConfigurationError::UnknownDomain(domain.to_string()));
        }
        Ok(servers)
    }

    /// The single server on `domain`, or the one on `port` when several share a host
    pub fn find_server(&self, domain: &str, port: Option<u16>) -> Result<&Server, ConfigurationError> {
        let servers = self.servers_on(domain)?;
        match port {
            Some(port) => servers
                .into_iter()
                .find(|server| server.port == port)
                .ok_or_else(|| ConfigurationError::UnknownServer {
                    domain: domain.to_string(),
                    port,
                }),
            None if servers.len() == 1 => Ok(servers[0]),
            None => Err(ConfigurationError::AmbiguousDomain {
                domain: domain.to_string(),
                ports: servers.iter().map(|server| server.port).collect(),
            }),
        }
    }

    pub fn database(&self, name: &str) -> Result<&DatabaseSpec, ConfigurationError> {
        self.databases
            .iter()
            .find(|database| database.name == name)
            .ok_or_else(|| ConfigurationError::UnknownDatabase(name.to_string()))
    }

    /// Config files installed into the conf dir, excluding the replica-only file
    pub fn config_files(&self) -> impl Iterator<Item = &str> {
        self.image
            .config_files
            .iter()
            .map(String::as_str)
            .filter(move |file| *file != self.image.replication_config_file)
    }

    pub fn ssl_subject_for(&self, server: &Server) -> String {
        self.ssl_subject
            .clone()
            .unwrap_or_else(|| format!("/CN={}", server.domain))
    }

    /// Roles the master must have, in creation order, each listed once
    pub fn required_roles(&self) -> Vec<(&str, &str)> {
        let mut seen = BTreeSet::new();
        let mut roles = vec![(REPLICATOR_ROLE, self.replicator_password.as_str())];
        seen.insert(REPLICATOR_ROLE);
        for database in &self.databases {
            if seen.insert(database.role.as_str()) {
                roles.push((database.role.as_str(), database.password.as_str()));
            }
        }
        roles
    }
}

impl ClusterDeclaration {
    /// Resolve into a [`Cluster`], validating every invariant eagerly.
    pub fn resolve(&self) -> Result<Cluster, ConfigurationError> {
        validate_image(&self.image)?;
        require_absolute("storage_root", &self.storage_root)?;
        if self.replicator_password.is_empty() {
            return Err(ConfigurationError::Invalid(
                "replicator_password must not be empty".to_string(),
            ));
        }

        let masters: Vec<(usize, &ServerDeclaration)> = self
            .servers
            .iter()
            .enumerate()
            .filter(|(_, server)| server.master)
            .collect();
        let (master_index, master) = match masters.as_slice() {
            [] => return Err(ConfigurationError::NoMaster),
            [master] => *master,
            many => {
                return Err(ConfigurationError::MultipleMasters(
                    many.iter()
                        .map(|(_, server)| format!("{}:{}", server.domain, server.port))
                        .collect(),
                ))
            }
        };

        let storage_root = self.storage_root.trim_end_matches('/');
        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        let mut servers = Vec::with_capacity(self.servers.len());

        for declared in &self.servers {
            if declared.domain.trim().is_empty() {
                return Err(ConfigurationError::Invalid("server domain must not be empty".to_string()));
            }
            if declared.port == 0 {
                return Err(ConfigurationError::Invalid(format!(
                    "server {} must declare a non-zero port",
                    declared.domain
                )));
            }

            let role = if declared.master { ServerRole::Master } else { ServerRole::Replica };
            let container_name = container_name(&master.domain, declared.port, role);
            let identity = format!("{}:{}", declared.domain, declared.port);

            if let Some(first) = owners.insert(container_name.clone(), identity.clone()) {
                return Err(ConfigurationError::DuplicateContainerName {
                    container_name,
                    first,
                    second: identity,
                });
            }

            let root = format!("{}/{}", storage_root, container_name);
            servers.push(Server {
                domain: declared.domain.clone(),
                port: declared.port,
                role,
                data_path: format!("{}/data", root),
                conf_path: format!("{}/conf", root),
                socket_path: format!("{}/run", root),
                container_name,
            });
        }

        let mut names = BTreeSet::new();
        for database in &self.databases {
            if database.name.is_empty() || database.role.is_empty() {
                return Err(ConfigurationError::Invalid(
                    "databases need both a name and a role".to_string(),
                ));
            }
            if database.role == REPLICATOR_ROLE || database.role == SUPERUSER {
                return Err(ConfigurationError::Invalid(format!(
                    "database {} cannot be owned by the reserved role {}",
                    database.name, database.role
                )));
            }
            if !names.insert(database.name.as_str()) {
                return Err(ConfigurationError::DuplicateDatabase(database.name.clone()));
            }
        }

        Ok(Cluster {
            image: self.image.clone(),
            storage_root: storage_root.to_string(),
            replicator_password: self.replicator_password.clone(),
            ssl_subject: self.ssl_subject.clone(),
            servers,
            master_index,
            databases: self.databases.clone(),
        })
    }
}

/// Container name: `<master-domain>-postgres-<role>_<port>`
pub fn container_name(master_domain: &str, port: u16, role: ServerRole) -> String {
    format!("{}-postgres-{}_{}", master_domain, role, port)
}

fn validate_image(image: &ImageSpec) -> Result<(), ConfigurationError> {
    if image.name.trim().is_empty() {
        return Err(ConfigurationError::Invalid("image name must not be empty".to_string()));
    }
    require_absolute("image.data_path", &image.data_path)?;
    require_absolute("image.conf_path", &image.conf_path)?;
    require_absolute("image.socket_path", &image.socket_path)?;

    if image.config_files.is_empty() {
        return Err(ConfigurationError::Invalid("image declares no config files".to_string()));
    }
    let mut seen = BTreeSet::new();
    for file in &image.config_files {
        if file.is_empty() || file.contains('/') {
            return Err(ConfigurationError::Invalid(format!("bad config file name {:?}", file)));
        }
        if !seen.insert(file.as_str()) {
            return Err(ConfigurationError::Invalid(format!("config file {} listed twice", file)));
        }
    }
    if !seen.contains(image.main_config_file.as_str()) {
        return Err(ConfigurationError::UnknownConfigFile(image.main_config_file.clone()));
    }
    if image.replication_config_file.is_empty() || image.replication_config_file.contains('/') {
        return Err(ConfigurationError::Invalid(format!(
            "bad replication config file name {:?}",
            image.replication_config_file
        )));
    }
    Ok(())
}

fn require_absolute(field: &str, path: &str) -> Result<(), ConfigurationError> {
    if !path.starts_with('/') {
        return Err(ConfigurationError::Invalid(format!(
            "{} must be an absolute path (got {:?})",
            field, path
        )));
    }
    Ok(())
}

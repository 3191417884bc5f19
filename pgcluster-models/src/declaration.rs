//! Declared cluster input, as written by the operator in the cluster file

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Top-level cluster declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ClusterDeclaration {
    /// Docker image and its internal layout
    pub image: ImageSpec,
    /// Host-side directory under which every container gets its own data/conf/run dirs
    pub storage_root: String,
    /// Password for the built-in replication role
    pub replicator_password: String,
    /// Subject for self-signed certificates (default: "/CN=<domain>")
    #[serde(default)]
    pub ssl_subject: Option<String>,
    /// PostgreSQL instances, exactly one of them master
    pub servers: Vec<ServerDeclaration>,
    /// Logical databases to ensure on the master
    #[serde(default)]
    pub databases: Vec<DatabaseSpec>,
}

impl ClusterDeclaration {
    /// Parse a YAML declaration. Missing or unknown fields are rejected here
    /// rather than surfacing later during planning.
    pub fn from_yaml(source: &str) -> Result<Self, ConfigurationError> {
        Ok(serde_yaml::from_str(source)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ImageSpec {
    /// Image reference (e.g., "localhost:5000/ubuntu/postgresql-9.1:0.0.1")
    pub name: String,
    /// Config files rendered from templates and installed into the conf dir
    #[serde(default = "default_config_files")]
    pub config_files: Vec<String>,
    /// Config file passed to postgres with `-c config_file=...`
    #[serde(default = "default_main_config_file")]
    pub main_config_file: String,
    /// Replica-only file installed into the data dir when the replica is created
    #[serde(default = "default_replication_config_file")]
    pub replication_config_file: String,
    /// Data directory inside the image
    pub data_path: String,
    /// Config directory inside the image
    pub conf_path: String,
    /// Unix socket directory inside the image
    pub socket_path: String,
    /// Server binary used as the container entrypoint
    #[serde(default = "default_postgres_binary")]
    pub postgres_binary: String,
    #[serde(default)]
    pub tools: ImageTools,
    /// uid of the postgres user inside the image. Looked up with `id` in the
    /// image when unset; checked against it when set.
    #[serde(default)]
    pub uid: Option<u32>,
    /// gid of the postgres group inside the image, same rules as `uid`
    #[serde(default)]
    pub gid: Option<u32>,
}

/// Client tool paths inside the image
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ImageTools {
    pub psql: String,
    pub pg_dump: String,
    pub pg_restore: String,
    pub pg_basebackup: String,
    pub openssl: String,
    pub rsync: String,
    /// Used to look up the postgres uid and gid
    pub id: String,
}

impl Default for ImageTools {
    fn default() -> Self {
        Self {
            psql: "/usr/bin/psql".to_string(),
            pg_dump: "/usr/bin/pg_dump".to_string(),
            pg_restore: "/usr/bin/pg_restore".to_string(),
            pg_basebackup: "/usr/bin/pg_basebackup".to_string(),
            openssl: "/usr/bin/openssl".to_string(),
            rsync: "/usr/bin/rsync".to_string(),
            id: "/usr/bin/id".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServerDeclaration {
    /// Host address, also used as the SSH destination
    pub domain: String,
    /// Published host port
    pub port: u16,
    #[serde(default)]
    pub master: bool,
}

/// A logical database to ensure exists on the master
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSpec {
    pub name: String,
    /// Owning role, created with LOGIN if absent
    pub role: String,
    pub password: String,
}

fn default_config_files() -> Vec<String> {
    vec!["postgresql.conf".to_string(), "pg_hba.conf".to_string()]
}

fn default_main_config_file() -> String {
    "postgresql.conf".to_string()
}

fn default_replication_config_file() -> String {
    "recovery.conf".to_string()
}

fn default_postgres_binary() -> String {
    "/usr/lib/postgresql/9.1/bin/postgres".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
image:
  name: localhost:5000/ubuntu/postgresql-9.1:0.0.1
  data_path: /var/lib/postgresql/9.1/main
  conf_path: /etc/postgresql/9.1/main
  socket_path: /var/run/postgresql
  uid: 101
  gid: 104
storage_root: /srv/pgcluster
replicator_password: secret
servers:
  - domain: db1.example.com
    port: 5432
    master: true
databases:
  - name: client
    role: client
    password: client
"#;

    #[test]
    fn test_minimal_declaration_applies_defaults() {
        let declaration = ClusterDeclaration::from_yaml(MINIMAL).unwrap();
        assert_eq!(declaration.image.config_files, vec!["postgresql.conf", "pg_hba.conf"]);
        assert_eq!(declaration.image.main_config_file, "postgresql.conf");
        assert_eq!(declaration.image.replication_config_file, "recovery.conf");
        assert_eq!(declaration.image.tools.psql, "/usr/bin/psql");
        assert!(declaration.servers[0].master);
        assert_eq!(declaration.ssl_subject, None);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let source = MINIMAL.replace("storage_root:", "storage_rot:");
        let err = ClusterDeclaration::from_yaml(&source).unwrap_err();
        assert!(matches!(err, ConfigurationError::Parse(_)));
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let source = MINIMAL.replace("  data_path: /var/lib/postgresql/9.1/main\n", "");
        let err = ClusterDeclaration::from_yaml(&source).unwrap_err();
        assert!(err.to_string().contains("data_path"));
    }

    #[test]
    fn test_owner_is_optional() {
        let declaration = ClusterDeclaration::from_yaml(&MINIMAL.replace("  uid: 101\n  gid: 104\n", "")).unwrap();
        assert_eq!(declaration.image.uid, None);
        assert_eq!(declaration.image.gid, None);

        let declaration = ClusterDeclaration::from_yaml(MINIMAL).unwrap();
        assert_eq!(declaration.image.uid, Some(101));
    }

    #[test]
    fn test_master_defaults_to_false() {
        let source = MINIMAL.replace("    master: true\n", "");
        let declaration = ClusterDeclaration::from_yaml(&source).unwrap();
        assert!(!declaration.servers[0].master);
    }
}

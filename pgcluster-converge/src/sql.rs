//! SQL statements and the disposable `psql` container that runs them

use pgcluster_models::{Cluster, DatabaseSpec, Server, SUPERUSER};

use crate::command::{DockerRun, RemoteCommand};

/// Double-quote an identifier
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Single-quote a string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn create_role(name: &str, password: &str, replication: bool) -> String {
    let attributes = if replication { "REPLICATION" } else { "CREATEDB" };
    format!(
        "CREATE ROLE {} WITH LOGIN {} ENCRYPTED PASSWORD {};",
        quote_ident(name),
        attributes,
        quote_literal(password)
    )
}

pub fn create_database(database: &DatabaseSpec) -> String {
    format!(
        "CREATE DATABASE {} WITH OWNER {} TEMPLATE template0 ENCODING 'UTF8';",
        quote_ident(&database.name),
        quote_ident(&database.role)
    )
}

pub fn grant_database(database: &DatabaseSpec) -> String {
    format!(
        "GRANT ALL PRIVILEGES ON DATABASE {} TO {};",
        quote_ident(&database.name),
        quote_ident(&database.role)
    )
}

pub fn role_exists(name: &str) -> String {
    format!("SELECT 1 FROM pg_roles WHERE rolname = {};", quote_literal(name))
}

pub fn database_exists(name: &str) -> String {
    format!("SELECT 1 FROM pg_database WHERE datname = {};", quote_literal(name))
}

/// Counts user tables; run against the database being checked
pub const COUNT_USER_TABLES: &str = "SELECT count(*) FROM information_schema.tables \
     WHERE table_schema NOT IN ('pg_catalog', 'information_schema');";

pub const LIST_ROLE_NAMES: &str = "SELECT rolname FROM pg_roles ORDER BY rolname;";

pub const LIST_DATABASE_NAMES: &str =
    "SELECT datname FROM pg_database WHERE NOT datistemplate ORDER BY datname;";

pub const MASTER_REPLICATION_STATUS: &str = "SELECT * FROM pg_stat_replication;";

pub const REPLICA_REPLAY_DELAY: &str =
    "SELECT now() - pg_last_xact_replay_timestamp() AS replication_delay;";

/// `psql` output shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// Unaligned rows only (`-tA`), for probes
    Tuples,
    /// Expanded display (`-x`)
    Expanded,
    /// psql defaults, for operator-facing listings
    Table,
}

/// Builds a disposable container that pipes SQL into `psql` over the
/// server's socket directory
#[derive(Debug, Clone)]
pub struct Psql<'a> {
    cluster: &'a Cluster,
    server: &'a Server,
    database: Option<String>,
    output: Output,
}

impl<'a> Psql<'a> {
    pub fn new(cluster: &'a Cluster, server: &'a Server) -> Self {
        Self {
            cluster,
            server,
            database: None,
            output: Output::Tuples,
        }
    }

    pub fn database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    pub fn output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    pub fn sql(self, statement: &str) -> RemoteCommand {
        let image = &self.cluster.image;
        let mut args = vec![
            "-U".to_string(),
            SUPERUSER.to_string(),
            "--host".to_string(),
            image.socket_path.clone(),
            "--no-psqlrc".to_string(),
            "-v".to_string(),
            "ON_ERROR_STOP=1".to_string(),
        ];
        match self.output {
            Output::Tuples => args.push("-tA".to_string()),
            Output::Expanded => args.push("-x".to_string()),
            Output::Table => {}
        }
        if let Some(database) = self.database {
            args.push("-d".to_string());
            args.push(database);
        }

        DockerRun::disposable(&image.name)
            .interactive()
            .volume(&self.server.socket_path, &image.socket_path)
            .entrypoint(&image.tools.psql)
            .args(args)
            .into_command()
            .stdin(format!("{}\n", statement))
    }
}

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use pgcluster_converge::ConfigChangePolicy;

/// pgcluster - PostgreSQL master/replica clusters in Docker, over SSH
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Cluster declaration (YAML)
    #[arg(short, long, global = true, env = "PGCLUSTER_CONFIG", default_value = "pgcluster.yaml")]
    pub config: PathBuf,

    /// Directory holding one `<file>.tera` per installed config file
    #[arg(long, global = true, env = "PGCLUSTER_TEMPLATES", default_value = "templates/postgres")]
    pub templates: PathBuf,

    /// SSH login user (ssh's own default when unset)
    #[arg(long, global = true, env = "PGCLUSTER_SSH_USER")]
    pub ssh_user: Option<String>,

    /// SSH binary
    #[arg(long, global = true, env = "PGCLUSTER_SSH_PROGRAM", default_value = "ssh")]
    pub ssh_program: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Converge every server: master first, then replicas
    Setup {
        /// Seconds to wait before checking a started container is still up
        #[arg(long, env = "PGCLUSTER_SETTLE_SECONDS", default_value = "3")]
        settle_seconds: u64,

        /// How a running container picks up changed config files
        #[arg(long, value_enum, default_value = "prompt")]
        on_config_change: ConfigChange,
    },

    /// Show what setup would do without changing anything
    Plan {
        /// Output format
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Container, roles, databases and replication per server
    Status {
        /// Only servers on this domain
        domain: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Dump a database from the master into /tmp/<file>
    Dump {
        /// File name inside /tmp on the master host
        file: String,
        /// Declared database name
        database: String,
    },

    /// Restore /tmp/<file> on the master into a database
    Restore {
        /// File name inside /tmp on the master host
        file: String,
        /// Declared database name
        database: String,
    },

    /// Open psql inside a disposable container attached to a server
    Interactive {
        /// Server domain (default: the master)
        domain: Option<String>,

        /// Pick a server when several share the domain
        #[arg(long)]
        port: Option<u16>,

        /// Print the command instead of running it
        #[arg(long)]
        print: bool,
    },

    /// psql \du on the master
    ListRoles,

    /// psql \l on the master
    ListDatabases,

    /// Replication status of every server
    StreamingStatus,

    /// Validate the declaration and print the resolved cluster
    Check,

    /// Write an example declaration and the default templates
    Init {
        /// Write the real file names instead of `*_example` copies
        #[arg(long)]
        in_place: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChange {
    /// Ask per server: restart, or reload instead
    Prompt,
    Restart,
    Reload,
}

impl From<ConfigChange> for ConfigChangePolicy {
    fn from(value: ConfigChange) -> Self {
        match value {
            ConfigChange::Prompt => ConfigChangePolicy::Prompt,
            ConfigChange::Restart => ConfigChangePolicy::Restart,
            ConfigChange::Reload => ConfigChangePolicy::Reload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_global_options_after_subcommand() {
        let args = Args::try_parse_from([
            "pgcluster",
            "status",
            "db1.example.com",
            "--config",
            "cluster.yaml",
            "--ssh-user",
            "deploy",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("cluster.yaml"));
        assert_eq!(args.ssh_user.as_deref(), Some("deploy"));
        assert!(matches!(args.command, Command::Status { domain: Some(ref d), .. } if d == "db1.example.com"));
    }

    #[test]
    fn test_setup_defaults() {
        let args = Args::try_parse_from(["pgcluster", "setup", "--on-config-change", "reload"]).unwrap();
        match args.command {
            Command::Setup { on_config_change, .. } => {
                assert_eq!(ConfigChangePolicy::from(on_config_change), ConfigChangePolicy::Reload)
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_dump_requires_file_and_database() {
        assert!(Args::try_parse_from(["pgcluster", "dump", "client.tar"]).is_err());
        assert!(Args::try_parse_from(["pgcluster", "list-roles"]).is_ok());
    }
}

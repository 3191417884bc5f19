//! Action executor
//!
//! Applies one planned [`Action`] to one host. Actions trust the planner:
//! they don't re-check state, and every remote failure is reported as a
//! [`RemoteExecutionError`] naming the host and the action.

use pgcluster_models::{Cluster, Server};

use crate::command::{Privilege, RemoteCommand};
use crate::error::{RemoteExecutionError, Result};
use crate::remote::RemoteExecutor;
use crate::templates::Templates;
use crate::types::{Action, PostgresOwner};

pub mod config;
pub mod container;
pub mod database;
pub mod firewall;
pub mod replication;
pub mod ssl;

/// Everything an action needs to run against one server
pub struct ActionContext<'a> {
    pub cluster: &'a Cluster,
    pub server: &'a Server,
    pub remote: &'a dyn RemoteExecutor,
    pub templates: &'a Templates,
    /// Owner of files and directories mounted into the container
    pub owner: PostgresOwner,
}

impl ActionContext<'_> {
    pub(crate) async fn run(&self, action: &Action, command: &RemoteCommand) -> Result<()> {
        self.remote
            .execute(command)
            .await
            .map_err(|source| self.failed(action, source))
    }

    pub(crate) async fn upload(&self, action: &Action, content: &str, path: &str) -> Result<()> {
        self.remote
            .upload(content, path, Privilege::Root)
            .await
            .map_err(|source| self.failed(action, source))
    }

    fn failed(&self, action: &Action, source: crate::remote::RemoteError) -> crate::error::Error {
        RemoteExecutionError {
            host: self.server.domain.clone(),
            action: action.to_string(),
            source,
        }
        .into()
    }
}

/// Apply a single action
pub async fn execute(ctx: &ActionContext<'_>, action: &Action) -> Result<()> {
    match action {
        Action::AllowFirewallPort => firewall::allow_firewall_port(ctx, action).await,
        Action::InstallConfig { file } => config::install_config(ctx, action, file).await,
        Action::GenerateSslKeys => ssl::generate_ssl_keys(ctx, action).await,
        Action::BootstrapReplica => replication::bootstrap_replica(ctx, action).await,
        Action::InstallReplicationConfig => config::install_replication_config(ctx, action).await,
        Action::CreateContainer => container::create_container(ctx, action).await,
        Action::StartContainer | Action::RestartContainer | Action::ReloadConfig => {
            container::lifecycle(ctx, action).await
        }
        Action::CreateRole { name, password } => database::create_role(ctx, action, name, password).await,
        Action::CreateDatabase { database } => database::create_database(ctx, action, database).await,
        Action::GrantDatabase { database } => database::grant_database(ctx, action, database).await,
    }
}

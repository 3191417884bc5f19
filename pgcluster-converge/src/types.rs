//! Probe results and planned actions

use std::collections::BTreeMap;
use std::fmt;

use pgcluster_models::DatabaseSpec;
use serde::Serialize;

// ============================================================================
// Observed state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Missing,
    Stopped,
    Running,
    /// Running but being restarted by docker's restart policy
    Restarting,
}

impl ContainerState {
    /// `docker inspect --format '{{.State.Status}}'` output
    pub fn from_docker_status(status: &str) -> Self {
        match status.trim() {
            "running" => ContainerState::Running,
            "restarting" => ContainerState::Restarting,
            // created, exited, paused, dead
            _ => ContainerState::Stopped,
        }
    }

    /// Restarting containers are up but unhealthy, so they don't count
    pub fn is_running(self) -> bool {
        self == ContainerState::Running
    }

    pub fn exists(self) -> bool {
        self != ContainerState::Missing
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            ContainerState::Missing => "missing",
            ContainerState::Stopped => "stopped",
            ContainerState::Running => "running",
            ContainerState::Restarting => "restarting",
        };
        f.write_str(state)
    }
}

/// Numeric owner of everything mounted into a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PostgresOwner {
    pub uid: u32,
    pub gid: u32,
}

impl fmt::Display for PostgresOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallState {
    /// ufw missing or not enabled
    Inactive,
    Allowed,
    Blocked,
}

/// Everything the planner needs to know about one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHostState {
    pub container: ContainerState,
    /// Config file name -> installed copy differs from the rendered one
    pub config_drift: BTreeMap<String, bool>,
    /// Only probed when the container is missing
    pub data_path_empty: bool,
    pub firewall: FirewallState,
    /// Role name -> exists; only probed on a running master
    pub roles: BTreeMap<String, bool>,
    /// Database name -> exists; only probed on a running master
    pub databases: BTreeMap<String, bool>,
}

impl Default for RemoteHostState {
    fn default() -> Self {
        Self {
            container: ContainerState::Missing,
            config_drift: BTreeMap::new(),
            data_path_empty: true,
            firewall: FirewallState::Inactive,
            roles: BTreeMap::new(),
            databases: BTreeMap::new(),
        }
    }
}

impl RemoteHostState {
    pub fn config_changed(&self) -> bool {
        self.config_drift.values().any(|drifted| *drifted)
    }

    pub fn drifted_files(&self) -> impl Iterator<Item = &str> {
        self.config_drift
            .iter()
            .filter(|(_, drifted)| **drifted)
            .map(|(file, _)| file.as_str())
    }

    pub fn role_exists(&self, role: &str) -> bool {
        self.roles.get(role).copied().unwrap_or(false)
    }

    pub fn database_exists(&self, database: &str) -> bool {
        self.databases.get(database).copied().unwrap_or(false)
    }
}

// ============================================================================
// Planned actions
// ============================================================================

/// One remote step. Produced by the planner, consumed once by the executor.
#[derive(Clone, PartialEq, Eq)]
pub enum Action {
    AllowFirewallPort,
    InstallConfig { file: String },
    GenerateSslKeys,
    BootstrapReplica,
    InstallReplicationConfig,
    CreateContainer,
    StartContainer,
    RestartContainer,
    ReloadConfig,
    CreateRole { name: String, password: String },
    CreateDatabase { database: DatabaseSpec },
    GrantDatabase { database: DatabaseSpec },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::AllowFirewallPort => "AllowFirewallPort",
            Action::InstallConfig { .. } => "InstallConfig",
            Action::GenerateSslKeys => "GenerateSslKeys",
            Action::BootstrapReplica => "BootstrapReplica",
            Action::InstallReplicationConfig => "InstallReplicationConfig",
            Action::CreateContainer => "CreateContainer",
            Action::StartContainer => "StartContainer",
            Action::RestartContainer => "RestartContainer",
            Action::ReloadConfig => "ReloadConfig",
            Action::CreateRole { .. } => "CreateRole",
            Action::CreateDatabase { .. } => "CreateDatabase",
            Action::GrantDatabase { .. } => "GrantDatabase",
        }
    }

    /// Actions after which the container must be observed running
    pub fn is_container_lifecycle(&self) -> bool {
        matches!(
            self,
            Action::CreateContainer
                | Action::StartContainer
                | Action::RestartContainer
                | Action::ReloadConfig
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::InstallConfig { file } => write!(f, "InstallConfig({})", file),
            Action::CreateRole { name, .. } => write!(f, "CreateRole({})", name),
            Action::CreateDatabase { database } => write!(f, "CreateDatabase({})", database.name),
            Action::GrantDatabase { database } => {
                write!(f, "GrantDatabase({} to {})", database.name, database.role)
            }
            other => f.write_str(other.name()),
        }
    }
}

// Passwords never reach logs, even through `{:?}`.
impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::InstallConfig { file } => f.debug_struct("InstallConfig").field("file", file).finish(),
            Action::CreateRole { name, .. } => f
                .debug_struct("CreateRole")
                .field("name", name)
                .field("password", &"***")
                .finish(),
            Action::CreateDatabase { database } => f
                .debug_struct("CreateDatabase")
                .field("name", &database.name)
                .field("role", &database.role)
                .finish(),
            Action::GrantDatabase { database } => f
                .debug_struct("GrantDatabase")
                .field("name", &database.name)
                .field("role", &database.role)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database() -> DatabaseSpec {
        DatabaseSpec {
            name: "client".to_string(),
            role: "client_owner".to_string(),
            password: "s3cret".to_string(),
        }
    }

    #[test]
    fn test_docker_status_mapping() {
        assert_eq!(ContainerState::from_docker_status("running\n"), ContainerState::Running);
        assert_eq!(ContainerState::from_docker_status("restarting"), ContainerState::Restarting);
        assert_eq!(ContainerState::from_docker_status("exited"), ContainerState::Stopped);
        assert_eq!(ContainerState::from_docker_status("created"), ContainerState::Stopped);
        assert!(!ContainerState::Restarting.is_running());
        assert!(ContainerState::Restarting.exists());
        assert!(!ContainerState::Missing.exists());
    }

    #[test]
    fn test_actions_never_print_passwords() {
        let actions = vec![
            Action::CreateRole {
                name: "client_owner".to_string(),
                password: "s3cret".to_string(),
            },
            Action::CreateDatabase { database: database() },
            Action::GrantDatabase { database: database() },
        ];
        for action in &actions {
            assert!(!action.to_string().contains("s3cret"));
            assert!(!format!("{:?}", action).contains("s3cret"));
        }
        assert_eq!(actions[0].to_string(), "CreateRole(client_owner)");
        assert_eq!(actions[2].to_string(), "GrantDatabase(client to client_owner)");
    }

    #[test]
    fn test_state_helpers() {
        let mut state = RemoteHostState::default();
        assert!(!state.config_changed());
        state.config_drift.insert("pg_hba.conf".to_string(), false);
        state.config_drift.insert("postgresql.conf".to_string(), true);
        assert!(state.config_changed());
        assert_eq!(state.drifted_files().collect::<Vec<_>>(), vec!["postgresql.conf"]);

        state.roles.insert("replicator".to_string(), true);
        assert!(state.role_exists("replicator"));
        assert!(!state.role_exists("client"));
        assert!(!state.database_exists("client"));
    }

    #[test]
    fn test_lifecycle_actions() {
        assert!(Action::CreateContainer.is_container_lifecycle());
        assert!(Action::ReloadConfig.is_container_lifecycle());
        assert!(!Action::GenerateSslKeys.is_container_lifecycle());
        assert!(!Action::InstallConfig { file: "pg_hba.conf".to_string() }.is_container_lifecycle());
    }
}

//! Convergence planner
//!
//! Pure functions from observed state to an ordered action list. Nothing
//! here touches a host, so every decision can be tested directly.

use pgcluster_models::{Cluster, Server, REPLICATOR_ROLE};

use crate::error::{DataSafetyViolation, Error, Result};
use crate::types::{Action, ContainerState, FirewallState, RemoteHostState};

/// What to do with a running container whose config files changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigChangeResponse {
    #[default]
    Restart,
    /// SIGHUP; only settings that don't need a restart take effect
    Reload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanContext {
    /// Whether the master container was observed running after it converged
    pub master_running: bool,
    pub on_config_change: ConfigChangeResponse,
}

/// Firewall, config files and container lifecycle for one server.
pub fn plan_container_phase(
    cluster: &Cluster,
    server: &Server,
    state: &RemoteHostState,
    context: PlanContext,
) -> Result<Vec<Action>> {
    let mut actions = Vec::new();

    // 0. Open the published port
    if state.firewall == FirewallState::Blocked {
        actions.push(Action::AllowFirewallPort);
    }

    // 1. Config files, in declaration order
    let mut config_changed = false;
    for file in cluster.config_files() {
        if state.config_drift.get(file).copied().unwrap_or(true) {
            actions.push(Action::InstallConfig { file: file.to_string() });
            config_changed = true;
        }
    }

    // 2-4. Container lifecycle
    match state.container {
        ContainerState::Missing => {
            if !server.is_master() && !context.master_running {
                return Err(Error::MasterNotRunning {
                    host: server.domain.clone(),
                });
            }
            if !state.data_path_empty {
                return Err(DataSafetyViolation::DataPathNotEmpty {
                    host: server.domain.clone(),
                    path: server.data_path.clone(),
                }
                .into());
            }
            actions.push(Action::GenerateSslKeys);
            if !server.is_master() {
                actions.push(Action::BootstrapReplica);
                actions.push(Action::InstallReplicationConfig);
            }
            actions.push(Action::CreateContainer);
        }
        ContainerState::Stopped => actions.push(Action::StartContainer),
        ContainerState::Restarting => actions.push(Action::RestartContainer),
        ContainerState::Running if config_changed => match context.on_config_change {
            ConfigChangeResponse::Restart => actions.push(Action::RestartContainer),
            ConfigChangeResponse::Reload => actions.push(Action::ReloadConfig),
        },
        ContainerState::Running => {}
    }

    Ok(actions)
}

/// Roles and databases on a running master. Existence is all that is
/// checked; an existing role or database is never altered.
pub fn plan_database_phase(cluster: &Cluster, state: &RemoteHostState) -> Vec<Action> {
    let mut actions = Vec::new();

    if !state.role_exists(REPLICATOR_ROLE) {
        actions.push(Action::CreateRole {
            name: REPLICATOR_ROLE.to_string(),
            password: cluster.replicator_password.clone(),
        });
    }

    let mut queued: Vec<&str> = Vec::new();
    for database in &cluster.databases {
        let role = database.role.as_str();
        if !state.role_exists(role) && !queued.contains(&role) {
            actions.push(Action::CreateRole {
                name: role.to_string(),
                password: database.password.clone(),
            });
            queued.push(role);
        }
        if !state.database_exists(&database.name) {
            actions.push(Action::CreateDatabase {
                database: database.clone(),
            });
            actions.push(Action::GrantDatabase {
                database: database.clone(),
            });
        }
    }

    actions
}

/// Both phases for a server whose container is already running. Used for
/// dry runs; `setup` plans the database phase only after the container
/// phase has been applied.
pub fn plan_server(
    cluster: &Cluster,
    server: &Server,
    state: &RemoteHostState,
    context: PlanContext,
) -> Result<Vec<Action>> {
    let mut actions = plan_container_phase(cluster, server, state, context)?;
    if server.is_master() {
        actions.extend(plan_database_phase(cluster, state));
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_cluster;
    use std::collections::BTreeMap;

    fn context() -> PlanContext {
        PlanContext {
            master_running: true,
            on_config_change: ConfigChangeResponse::Restart,
        }
    }

    fn drift(cluster: &Cluster, drifted: bool) -> BTreeMap<String, bool> {
        cluster.config_files().map(|file| (file.to_string(), drifted)).collect()
    }

    fn fresh(cluster: &Cluster) -> RemoteHostState {
        RemoteHostState {
            config_drift: drift(cluster, true),
            ..Default::default()
        }
    }

    fn converged(cluster: &Cluster) -> RemoteHostState {
        RemoteHostState {
            container: ContainerState::Running,
            config_drift: drift(cluster, false),
            roles: cluster
                .required_roles()
                .into_iter()
                .map(|(role, _)| (role.to_string(), true))
                .collect(),
            databases: cluster
                .databases
                .iter()
                .map(|database| (database.name.clone(), true))
                .collect(),
            ..Default::default()
        }
    }

    fn names(actions: &[Action]) -> Vec<String> {
        actions.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_fresh_master() {
        let cluster = sample_cluster();
        let actions = plan_container_phase(&cluster, cluster.master(), &fresh(&cluster), context()).unwrap();
        assert_eq!(
            names(&actions),
            vec![
                "InstallConfig(postgresql.conf)",
                "InstallConfig(pg_hba.conf)",
                "GenerateSslKeys",
                "CreateContainer",
            ]
        );

        let databases = plan_database_phase(&cluster, &RemoteHostState::default());
        assert_eq!(
            names(&databases),
            vec![
                "CreateRole(replicator)",
                "CreateRole(client)",
                "CreateDatabase(client)",
                "GrantDatabase(client to client)",
            ]
        );
    }

    #[test]
    fn test_fresh_replica_after_master() {
        let cluster = sample_cluster();
        let replica = cluster.replicas().next().unwrap();
        let actions = plan_container_phase(&cluster, replica, &fresh(&cluster), context()).unwrap();
        assert_eq!(
            names(&actions),
            vec![
                "InstallConfig(postgresql.conf)",
                "InstallConfig(pg_hba.conf)",
                "GenerateSslKeys",
                "BootstrapReplica",
                "InstallReplicationConfig",
                "CreateContainer",
            ]
        );
    }

    #[test]
    fn test_replica_requires_running_master() {
        let cluster = sample_cluster();
        let replica = cluster.replicas().next().unwrap();
        let err = plan_container_phase(
            &cluster,
            replica,
            &fresh(&cluster),
            PlanContext {
                master_running: false,
                ..context()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::MasterNotRunning { host } if host == "db2.example.com"));
    }

    #[test]
    fn test_existing_replica_does_not_need_master() {
        let cluster = sample_cluster();
        let replica = cluster.replicas().next().unwrap();
        let actions = plan_container_phase(
            &cluster,
            replica,
            &converged(&cluster),
            PlanContext {
                master_running: false,
                ..context()
            },
        )
        .unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn test_converged_master_plans_nothing() {
        let cluster = sample_cluster();
        let actions = plan_server(&cluster, cluster.master(), &converged(&cluster), context()).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn test_single_drifted_file_restarts() {
        let cluster = sample_cluster();
        let mut state = converged(&cluster);
        state.config_drift.insert("pg_hba.conf".to_string(), true);
        let actions = plan_container_phase(&cluster, cluster.master(), &state, context()).unwrap();
        assert_eq!(names(&actions), vec!["InstallConfig(pg_hba.conf)", "RestartContainer"]);
    }

    #[test]
    fn test_drift_with_reload_response() {
        let cluster = sample_cluster();
        let mut state = converged(&cluster);
        state.config_drift.insert("postgresql.conf".to_string(), true);
        let actions = plan_container_phase(
            &cluster,
            cluster.master(),
            &state,
            PlanContext {
                on_config_change: ConfigChangeResponse::Reload,
                ..context()
            },
        )
        .unwrap();
        assert_eq!(names(&actions), vec!["InstallConfig(postgresql.conf)", "ReloadConfig"]);
    }

    #[test]
    fn test_stopped_container_is_started_once() {
        let cluster = sample_cluster();
        let mut state = converged(&cluster);
        state.container = ContainerState::Stopped;
        state.config_drift.insert("postgresql.conf".to_string(), true);
        let actions = plan_container_phase(&cluster, cluster.master(), &state, context()).unwrap();
        assert_eq!(names(&actions), vec!["InstallConfig(postgresql.conf)", "StartContainer"]);
    }

    #[test]
    fn test_restarting_container_is_restarted_even_on_reload() {
        let cluster = sample_cluster();
        let mut state = converged(&cluster);
        state.container = ContainerState::Restarting;
        let actions = plan_container_phase(
            &cluster,
            cluster.master(),
            &state,
            PlanContext {
                on_config_change: ConfigChangeResponse::Reload,
                ..context()
            },
        )
        .unwrap();
        assert_eq!(names(&actions), vec!["RestartContainer"]);
    }

    #[test]
    fn test_missing_container_with_data_is_refused() {
        let cluster = sample_cluster();
        let mut state = fresh(&cluster);
        state.data_path_empty = false;
        let err = plan_container_phase(&cluster, cluster.master(), &state, context()).unwrap_err();
        match err {
            Error::DataSafety(DataSafetyViolation::DataPathNotEmpty { host, path }) => {
                assert_eq!(host, "db1.example.com");
                assert_eq!(path, cluster.master().data_path);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blocked_firewall_is_opened_first() {
        let cluster = sample_cluster();
        let mut state = converged(&cluster);
        state.firewall = FirewallState::Blocked;
        let actions = plan_container_phase(&cluster, cluster.master(), &state, context()).unwrap();
        assert_eq!(actions, vec![Action::AllowFirewallPort]);

        state.firewall = FirewallState::Allowed;
        assert!(plan_container_phase(&cluster, cluster.master(), &state, context())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_shared_owner_role_is_created_once() {
        let mut cluster = sample_cluster();
        let mut reports = cluster.databases[0].clone();
        reports.name = "reports".to_string();
        cluster.databases.push(reports);

        let mut state = RemoteHostState::default();
        state.roles.insert(REPLICATOR_ROLE.to_string(), true);
        state.databases.insert("client".to_string(), true);

        let actions = plan_database_phase(&cluster, &state);
        assert_eq!(
            names(&actions),
            vec![
                "CreateRole(client)",
                "CreateDatabase(reports)",
                "GrantDatabase(reports to client)",
            ]
        );
    }

    #[test]
    fn test_replica_skips_database_phase() {
        let cluster = sample_cluster();
        let replica = cluster.replicas().next().unwrap();
        let mut state = converged(&cluster);
        state.roles.clear();
        state.databases.clear();
        assert!(plan_server(&cluster, replica, &state, context()).unwrap().is_empty());
    }
}

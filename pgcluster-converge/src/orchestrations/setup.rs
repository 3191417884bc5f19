//! Setup orchestration
//!
//! Converges the master completely, then every replica concurrently. Within
//! one server the flow is:
//!
//! 1. Render config files and snapshot the container phase
//! 2. Decide how a running container picks up changed config
//! 3. Plan and apply the container phase, confirming the container runs
//!    after every lifecycle action
//! 4. Master only: snapshot, plan and apply roles and databases
//!
//! A fatal error on one replica stops every replica that has not applied an
//! action yet; replicas already underway finish their plan. Any other
//! replica error is reported once all replicas finish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use pgcluster_models::{Cluster, Server};

use crate::actions::{self, ActionContext};
use crate::confirm::{confirm, Prompt};
use crate::error::{DataSafetyViolation, Error, HostFailure, Result};
use crate::planner::{plan_container_phase, plan_database_phase, plan_server, ConfigChangeResponse, PlanContext};
use crate::probe::Probe;
use crate::registry::HostRegistry;
use crate::templates::Templates;
use crate::types::{Action, ContainerState, PostgresOwner, RemoteHostState};

/// Default wait before checking a started container is still up
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(3);

/// How changed config files reach a running container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigChangePolicy {
    /// Ask the operator per server
    #[default]
    Prompt,
    Restart,
    Reload,
}

#[derive(Debug, Clone)]
pub struct SetupOptions {
    pub settle_delay: Duration,
    pub on_config_change: ConfigChangePolicy,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            on_config_change: ConfigChangePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReport {
    pub domain: String,
    pub port: u16,
    pub container_name: String,
    /// Actions applied, in order
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupReport {
    /// Master first, then replicas in declaration order
    pub servers: Vec<ServerReport>,
}

impl SetupReport {
    /// Nothing had to change anywhere
    pub fn already_converged(&self) -> bool {
        self.servers.iter().all(|server| server.actions.is_empty())
    }
}

struct Setup<'a> {
    cluster: &'a Cluster,
    hosts: &'a HostRegistry,
    templates: &'a Templates,
    prompt: &'a dyn Prompt,
    options: &'a SetupOptions,
    abort: AtomicBool,
}

/// A server's snapshot and the operator's answer, gathered before any of
/// its actions run
struct Prepared {
    state: RemoteHostState,
    on_config_change: ConfigChangeResponse,
}

/// Bring every declared server to its declared state.
///
/// Every prompt is asked before replicas start converging, so the operator
/// answers one question at a time and no replica has changed yet.
pub async fn run_setup(
    cluster: &Cluster,
    hosts: &HostRegistry,
    templates: &Templates,
    prompt: &dyn Prompt,
    options: &SetupOptions,
) -> Result<SetupReport> {
    let setup = Setup {
        cluster,
        hosts,
        templates,
        prompt,
        options,
        abort: AtomicBool::new(false),
    };
    let setup = &setup;
    let master = cluster.master();
    let mut report = SetupReport::default();

    // Step 1: Master, completely
    tracing::info!(host = %master.domain, container = %master.container_name, "Setting up master");
    let prepared = setup.prepare(master).await?;
    report.servers.push(setup.converge(master, prepared, true).await?);

    // Step 2: Replicas only start from a running master
    let remote = hosts.get(&master.domain)?;
    let master_running = Probe::new(cluster, master, remote.as_ref())
        .container_is_running()
        .await?;

    let replicas: Vec<&Server> = cluster.replicas().collect();
    if replicas.is_empty() {
        return Ok(report);
    }

    // Step 3: Snapshot every replica and ask its questions, one at a time
    let mut pending = Vec::with_capacity(replicas.len());
    for replica in &replicas {
        match setup.prepare(replica).await {
            Err(err) if stops_run(&err) => return Err(stopped(err, &report, Vec::new())),
            prepared => pending.push(prepared),
        }
    }

    // Step 4: Replicas, concurrently
    tracing::info!("Setting up {} replica(s)", replicas.len());
    let results = join_all(
        replicas
            .iter()
            .zip(pending)
            .map(|(replica, prepared)| setup.converge_replica(replica, prepared, master_running)),
    )
    .await;

    // Step 5: Fatal errors first, then per-host failures
    let mut fatal = None;
    let mut failures = Vec::new();
    for (replica, result) in replicas.iter().zip(results) {
        match result {
            Ok(server) => report.servers.push(server),
            Err(err) if stops_run(&err) && fatal.is_none() => fatal = Some(err),
            Err(err) => failures.push(HostFailure {
                host: replica.domain.clone(),
                error: Box::new(err),
            }),
        }
    }
    if let Some(err) = fatal {
        return Err(stopped(err, &report, failures));
    }
    if !failures.is_empty() {
        return Err(Error::ReplicaFailures(failures));
    }
    Ok(report)
}

/// A declined prompt ends the run the same way a fatal error does
fn stops_run(err: &Error) -> bool {
    err.is_fatal() || matches!(err, Error::Declined(_))
}

/// Attach what already happened to the error that ended the run
fn stopped(cause: Error, report: &SetupReport, others: Vec<HostFailure>) -> Error {
    let changed: Vec<String> = report
        .servers
        .iter()
        .filter(|server| !server.actions.is_empty())
        .map(|server| format!("{}:{}", server.domain, server.port))
        .collect();
    if changed.is_empty() && others.is_empty() {
        return cause;
    }
    Error::Stopped {
        cause: Box::new(cause),
        changed,
        others,
    }
}

impl Setup<'_> {
    async fn converge_replica(
        &self,
        replica: &Server,
        prepared: Result<Prepared>,
        master_running: bool,
    ) -> Result<ServerReport> {
        let result = match prepared {
            Ok(prepared) => self.converge(replica, prepared, master_running).await,
            Err(err) => Err(err),
        };
        match &result {
            Err(err) if stops_run(err) => {
                tracing::error!(host = %replica.domain, "{}", err);
                self.abort.store(true, Ordering::SeqCst);
            }
            Err(Error::Aborted { .. }) => {
                tracing::warn!(host = %replica.domain, "Not started after a fatal error on another server");
            }
            Err(err) => tracing::error!(host = %replica.domain, "{}", err),
            Ok(_) => {}
        }
        result
    }

    /// Render, snapshot and decide how changed config is picked up
    async fn prepare(&self, server: &Server) -> Result<Prepared> {
        let remote = self.hosts.get(&server.domain)?;
        let probe = Probe::new(self.cluster, server, remote.as_ref());

        let rendered = self.templates.render_config_files(self.cluster, server)?;
        let state = probe.snapshot_container_phase(&rendered).await?;
        if state.container.exists() {
            for file in state.drifted_files() {
                tracing::warn!(host = %server.domain, container = %server.container_name, "{} differs from its template", file);
            }
        }
        let on_config_change = self.config_change_response(server, &state)?;
        Ok(Prepared { state, on_config_change })
    }

    async fn converge(&self, server: &Server, prepared: Prepared, master_running: bool) -> Result<ServerReport> {
        let remote = self.hosts.get(&server.domain)?;
        let remote = remote.as_ref();
        let probe = Probe::new(self.cluster, server, remote);
        let Prepared { mut state, on_config_change } = prepared;
        let mut owner = None;

        // 1. Container phase
        let context = PlanContext {
            master_running,
            on_config_change,
        };
        let mut applied = plan_container_phase(self.cluster, server, &state, context)?;
        self.apply(server, &probe, &mut owner, &applied).await?;

        // 2. Database phase
        if server.is_master() {
            probe.snapshot_database_phase(&mut state).await?;
            let database_actions = plan_database_phase(self.cluster, &state);
            self.apply(server, &probe, &mut owner, &database_actions).await?;
            applied.extend(database_actions);
        }

        if applied.is_empty() {
            tracing::info!(host = %server.domain, container = %server.container_name, "Already converged");
        }
        Ok(ServerReport {
            domain: server.domain.clone(),
            port: server.port,
            container_name: server.container_name.clone(),
            actions: applied,
        })
    }

    fn config_change_response(&self, server: &Server, state: &RemoteHostState) -> Result<ConfigChangeResponse> {
        match self.options.on_config_change {
            ConfigChangePolicy::Restart => Ok(ConfigChangeResponse::Restart),
            ConfigChangePolicy::Reload => Ok(ConfigChangeResponse::Reload),
            ConfigChangePolicy::Prompt if state.config_changed() && state.container == ContainerState::Running => {
                let files: Vec<&str> = state.drifted_files().collect();
                let question = format!(
                    "Config files changed on {} ({}). Restart the container? Answer 'no' to reload instead. (yes/no)",
                    server,
                    files.join(", ")
                );
                if confirm(self.prompt, &question)? {
                    Ok(ConfigChangeResponse::Restart)
                } else {
                    Ok(ConfigChangeResponse::Reload)
                }
            }
            ConfigChangePolicy::Prompt => Ok(ConfigChangeResponse::Restart),
        }
    }

    /// Apply `actions` in order. The abort flag is only honored before a
    /// server's first action: once a config file is installed, the restart
    /// or reload that activates it must follow.
    async fn apply(
        &self,
        server: &Server,
        probe: &Probe<'_>,
        resolved: &mut Option<PostgresOwner>,
        actions: &[Action],
    ) -> Result<()> {
        if actions.is_empty() {
            return Ok(());
        }
        let owner = match *resolved {
            Some(owner) => owner,
            None => {
                let found = probe.postgres_owner().await?;
                if self.abort.load(Ordering::SeqCst) {
                    return Err(Error::Aborted {
                        host: server.domain.clone(),
                    });
                }
                *resolved = Some(found);
                found
            }
        };

        let remote = self.hosts.get(&server.domain)?;
        let ctx = ActionContext {
            cluster: self.cluster,
            server,
            remote: remote.as_ref(),
            templates: self.templates,
            owner,
        };
        for action in actions {
            tracing::info!(host = %server.domain, container = %server.container_name, "Applying {}", action);
            actions::execute(&ctx, action).await?;

            if action.is_container_lifecycle() {
                tokio::time::sleep(self.options.settle_delay).await;
                if !probe.container_is_running().await? {
                    return Err(DataSafetyViolation::ContainerNotRunning {
                        host: server.domain.clone(),
                        container: server.container_name.clone(),
                        action: action.to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Dry run
// ============================================================================

#[derive(Debug)]
pub struct ServerPlan {
    pub domain: String,
    pub port: u16,
    pub container_name: String,
    pub actions: Result<Vec<Action>>,
}

/// What `setup` would do, assuming the master converges. Config drift is
/// shown as a restart.
pub async fn preview(cluster: &Cluster, hosts: &HostRegistry, templates: &Templates) -> Result<Vec<ServerPlan>> {
    let mut plans = Vec::with_capacity(cluster.servers().len());
    let servers = std::iter::once(cluster.master()).chain(cluster.replicas());
    for server in servers {
        let remote = hosts.get(&server.domain)?;
        let probe = Probe::new(cluster, server, remote.as_ref());
        let rendered = templates.render_config_files(cluster, server)?;
        let actions = plan_preview(cluster, server, &probe, &rendered).await;

        plans.push(ServerPlan {
            domain: server.domain.clone(),
            port: server.port,
            container_name: server.container_name.clone(),
            actions,
        });
    }
    Ok(plans)
}

async fn plan_preview(
    cluster: &Cluster,
    server: &Server,
    probe: &Probe<'_>,
    rendered: &[(String, String)],
) -> Result<Vec<Action>> {
    let mut state = probe.snapshot_container_phase(rendered).await?;
    if server.is_master() && state.container == ContainerState::Running {
        probe.snapshot_database_phase(&mut state).await?;
    }
    let context = PlanContext {
        master_running: true,
        on_config_change: ConfigChangeResponse::Restart,
    };
    plan_server(cluster, server, &state, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_cluster, sample_declaration, FakeHost, ScriptedPrompt};
    use pgcluster_models::{ConfigurationError, ServerDeclaration};

    fn options() -> SetupOptions {
        SetupOptions {
            settle_delay: Duration::ZERO,
            on_config_change: ConfigChangePolicy::Prompt,
        }
    }

    fn registry(hosts: &[&FakeHost]) -> HostRegistry {
        hosts
            .iter()
            .fold(HostRegistry::builder(), |builder, host| builder.register((*host).clone()))
            .build()
    }

    fn names(report: &ServerReport) -> Vec<String> {
        report.actions.iter().map(ToString::to_string).collect()
    }

    fn three_server_cluster() -> Cluster {
        let mut declaration = sample_declaration();
        declaration.servers.push(ServerDeclaration {
            domain: "db3.example.com".to_string(),
            port: 5434,
            master: false,
        });
        declaration.resolve().unwrap()
    }

    #[tokio::test]
    async fn test_first_run_converges_then_second_run_is_a_no_op() {
        let cluster = sample_cluster();
        let db1 = FakeHost::new("db1.example.com");
        let db2 = FakeHost::new("db2.example.com");
        let hosts = registry(&[&db1, &db2]);
        let templates = Templates::builtin().unwrap();
        let prompt = ScriptedPrompt::default();

        let report = run_setup(&cluster, &hosts, &templates, &prompt, &options()).await.unwrap();
        assert_eq!(
            names(&report.servers[0]),
            vec![
                "InstallConfig(postgresql.conf)",
                "InstallConfig(pg_hba.conf)",
                "GenerateSslKeys",
                "CreateContainer",
                "CreateRole(replicator)",
                "CreateRole(client)",
                "CreateDatabase(client)",
                "GrantDatabase(client to client)",
            ]
        );
        assert_eq!(
            names(&report.servers[1]),
            vec![
                "InstallConfig(postgresql.conf)",
                "InstallConfig(pg_hba.conf)",
                "GenerateSslKeys",
                "BootstrapReplica",
                "InstallReplicationConfig",
                "CreateContainer",
            ]
        );

        let master = cluster.master();
        let replica = cluster.replicas().next().unwrap();
        assert_eq!(db1.container(&master.container_name).as_deref(), Some("running"));
        assert_eq!(db2.container(&replica.container_name).as_deref(), Some("running"));
        assert!(db1.has_role("replicator") && db1.has_role("client") && db1.has_database("client"));
        assert!(db2.file(&replica.data_file_path("recovery.conf")).is_some());
        assert!(db2.file(&replica.data_file_path("backup_label")).is_some());

        db1.clear_log();
        db2.clear_log();
        let report = run_setup(&cluster, &hosts, &templates, &prompt, &options()).await.unwrap();
        assert!(report.already_converged());
        assert!(db1.mutations().is_empty(), "{:?}", db1.mutations());
        assert!(db2.mutations().is_empty(), "{:?}", db2.mutations());
        assert!(prompt.questions().is_empty());
    }

    #[tokio::test]
    async fn test_master_failure_leaves_replicas_untouched() {
        let cluster = sample_cluster();
        let db1 = FakeHost::new("db1.example.com");
        let db2 = FakeHost::new("db2.example.com");
        db1.fail_when("--detach");
        let hosts = registry(&[&db1, &db2]);
        let templates = Templates::builtin().unwrap();

        let err = run_setup(&cluster, &hosts, &templates, &ScriptedPrompt::default(), &options())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteExecution(ref e) if e.host == "db1.example.com"));
        assert!(db2.commands().is_empty());
    }

    #[tokio::test]
    async fn test_crash_looping_master_is_a_data_safety_violation() {
        let cluster = sample_cluster();
        let db1 = FakeHost::new("db1.example.com");
        let db2 = FakeHost::new("db2.example.com");
        db1.set_crash_containers(true);
        let hosts = registry(&[&db1, &db2]);
        let templates = Templates::builtin().unwrap();

        let err = run_setup(&cluster, &hosts, &templates, &ScriptedPrompt::default(), &options())
            .await
            .unwrap_err();
        match err {
            Error::DataSafety(DataSafetyViolation::ContainerNotRunning { host, action, .. }) => {
                assert_eq!(host, "db1.example.com");
                assert_eq!(action, "CreateContainer");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(db2.commands().is_empty());
    }

    #[tokio::test]
    async fn test_replica_with_stale_data_aborts_siblings() {
        let cluster = three_server_cluster();
        let db1 = FakeHost::new("db1.example.com");
        let db2 = FakeHost::new("db2.example.com");
        let db3 = FakeHost::new("db3.example.com");
        let stale = cluster.find_server("db2.example.com", None).unwrap();
        db2.put_file(&stale.data_file_path("PG_VERSION"), "9.1\n");
        let hosts = registry(&[&db1, &db2, &db3]);
        let templates = Templates::builtin().unwrap();

        let err = run_setup(&cluster, &hosts, &templates, &ScriptedPrompt::default(), &options())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        match err {
            Error::Stopped { cause, changed, others } => {
                assert!(matches!(
                    *cause,
                    Error::DataSafety(DataSafetyViolation::DataPathNotEmpty { ref host, .. }) if host == "db2.example.com"
                ));
                assert_eq!(changed, vec!["db1.example.com:5432"]);
                assert_eq!(others.len(), 1);
                assert_eq!(others[0].host, "db3.example.com");
                assert!(matches!(*others[0].error, Error::Aborted { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(db2.mutations().is_empty());
        assert!(db3.mutations().is_empty());
        assert_eq!(db2.file(&stale.data_file_path("PG_VERSION")).as_deref(), Some("9.1\n"));
    }

    #[tokio::test]
    async fn test_replica_underway_finishes_its_plan_after_a_sibling_fails() {
        let cluster = three_server_cluster();
        let db1 = FakeHost::new("db1.example.com");
        let db2 = FakeHost::new("db2.example.com");
        let db3 = FakeHost::new("db3.example.com");
        let hosts = registry(&[&db1, &db2, &db3]);
        let templates = Templates::builtin().unwrap();
        run_setup(&cluster, &hosts, &templates, &ScriptedPrompt::default(), &options())
            .await
            .unwrap();

        let crashing = cluster.find_server("db2.example.com", None).unwrap();
        let slow = cluster.find_server("db3.example.com", None).unwrap();
        db2.put_file(&crashing.config_file_path("postgresql.conf"), "port = 1\n");
        db3.put_file(&slow.config_file_path("postgresql.conf"), "port = 1\n");
        db2.set_crash_containers(true);
        db3.delay_when("mv -f", Duration::from_millis(80));
        db3.clear_log();

        let restart = SetupOptions {
            settle_delay: Duration::from_millis(20),
            on_config_change: ConfigChangePolicy::Restart,
        };
        let err = run_setup(&cluster, &hosts, &templates, &ScriptedPrompt::default(), &restart)
            .await
            .unwrap_err();
        match err {
            Error::Stopped { cause, changed, others } => {
                assert!(matches!(
                    *cause,
                    Error::DataSafety(DataSafetyViolation::ContainerNotRunning { ref host, .. }) if host == "db2.example.com"
                ));
                assert_eq!(changed, vec!["db3.example.com:5434"]);
                assert!(others.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }

        // The installed file took effect, so a later run has nothing left to do
        assert!(db3.commands().iter().any(|command| command.contains("docker restart")));
        assert_eq!(db3.container(&slow.container_name).as_deref(), Some("running"));
        db2.set_crash_containers(false);
        db2.put_container(&crashing.container_name, "running");
        let report = run_setup(&cluster, &hosts, &templates, &ScriptedPrompt::default(), &options())
            .await
            .unwrap();
        assert!(report.already_converged());
    }

    #[tokio::test]
    async fn test_replica_prompts_are_answered_before_any_replica_changes() {
        let cluster = three_server_cluster();
        let db1 = FakeHost::new("db1.example.com");
        let db2 = FakeHost::new("db2.example.com");
        let db3 = FakeHost::new("db3.example.com");
        let hosts = registry(&[&db1, &db2, &db3]);
        let templates = Templates::builtin().unwrap();
        run_setup(&cluster, &hosts, &templates, &ScriptedPrompt::default(), &options())
            .await
            .unwrap();

        for (host, domain) in [(&db2, "db2.example.com"), (&db3, "db3.example.com")] {
            let server = cluster.find_server(domain, None).unwrap();
            host.put_file(&server.config_file_path("pg_hba.conf"), "# edited by hand\n");
            host.clear_log();
        }

        // db2 gets an answer, db3 hits end of input
        let prompt = ScriptedPrompt::new(["yes"]);
        let err = run_setup(&cluster, &hosts, &templates, &prompt, &options())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Declined(_)));
        assert_eq!(prompt.questions().len(), 2);
        assert!(db2.mutations().is_empty(), "{:?}", db2.mutations());
        assert!(db3.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_declared_owner_that_disagrees_with_the_image_stops_setup() {
        let mut declaration = sample_declaration();
        declaration.image.uid = Some(999);
        let cluster = declaration.resolve().unwrap();
        let db1 = FakeHost::new("db1.example.com");
        let db2 = FakeHost::new("db2.example.com");
        let hosts = registry(&[&db1, &db2]);
        let templates = Templates::builtin().unwrap();

        let err = run_setup(&cluster, &hosts, &templates, &ScriptedPrompt::default(), &options())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::OwnerMismatch { ref host, .. }) if host == "db1.example.com"
        ));
        assert!(db1.mutations().is_empty());
        assert!(db2.commands().is_empty());
    }

    #[tokio::test]
    async fn test_files_are_owned_by_the_image_postgres_user() {
        let cluster = sample_cluster();
        let db1 = FakeHost::new("db1.example.com");
        let db2 = FakeHost::new("db2.example.com");
        db1.set_image_owner(70, 70);
        let hosts = registry(&[&db1, &db2]);
        let templates = Templates::builtin().unwrap();

        run_setup(&cluster, &hosts, &templates, &ScriptedPrompt::default(), &options())
            .await
            .unwrap();
        let chowns: Vec<String> = db1
            .mutations()
            .into_iter()
            .filter(|command| command.contains("chown"))
            .collect();
        assert!(!chowns.is_empty());
        assert!(chowns.iter().all(|command| command.contains("70:70")), "{chowns:?}");
    }

    #[tokio::test]
    async fn test_replica_execution_error_is_isolated() {
        let cluster = three_server_cluster();
        let db1 = FakeHost::new("db1.example.com");
        let db2 = FakeHost::new("db2.example.com");
        let db3 = FakeHost::new("db3.example.com");
        db2.fail_when("pg_basebackup");
        let hosts = registry(&[&db1, &db2, &db3]);
        let templates = Templates::builtin().unwrap();

        let err = run_setup(&cluster, &hosts, &templates, &ScriptedPrompt::default(), &options())
            .await
            .unwrap_err();
        match err {
            Error::ReplicaFailures(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].host, "db2.example.com");
            }
            other => panic!("unexpected error: {other}"),
        }
        let healthy = cluster.find_server("db3.example.com", None).unwrap();
        assert_eq!(db3.container(&healthy.container_name).as_deref(), Some("running"));
    }

    #[tokio::test]
    async fn test_drift_on_running_container_asks_and_reloads() {
        let cluster = sample_cluster();
        let db1 = FakeHost::new("db1.example.com");
        let db2 = FakeHost::new("db2.example.com");
        let hosts = registry(&[&db1, &db2]);
        let templates = Templates::builtin().unwrap();
        run_setup(&cluster, &hosts, &templates, &ScriptedPrompt::default(), &options())
            .await
            .unwrap();

        let master = cluster.master();
        db1.put_file(&master.config_file_path("pg_hba.conf"), "# edited by hand\n");
        let prompt = ScriptedPrompt::new(["no"]);
        let report = run_setup(&cluster, &hosts, &templates, &prompt, &options()).await.unwrap();

        assert_eq!(names(&report.servers[0]), vec!["InstallConfig(pg_hba.conf)", "ReloadConfig"]);
        assert!(report.servers[1].actions.is_empty());
        assert_eq!(prompt.questions().len(), 1);
        assert!(prompt.questions()[0].contains("pg_hba.conf"));
    }

    #[tokio::test]
    async fn test_unanswered_drift_prompt_declines() {
        let cluster = sample_cluster();
        let db1 = FakeHost::new("db1.example.com");
        let db2 = FakeHost::new("db2.example.com");
        let hosts = registry(&[&db1, &db2]);
        let templates = Templates::builtin().unwrap();
        run_setup(&cluster, &hosts, &templates, &ScriptedPrompt::default(), &options())
            .await
            .unwrap();

        db1.put_file(&cluster.master().config_file_path("postgresql.conf"), "port = 1\n");
        db1.clear_log();
        let err = run_setup(&cluster, &hosts, &templates, &ScriptedPrompt::default(), &options())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Declined(_)));
        assert!(db1.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_stopped_container_is_restarted_by_policy() {
        let cluster = sample_cluster();
        let db1 = FakeHost::new("db1.example.com");
        let db2 = FakeHost::new("db2.example.com");
        let hosts = registry(&[&db1, &db2]);
        let templates = Templates::builtin().unwrap();
        run_setup(&cluster, &hosts, &templates, &ScriptedPrompt::default(), &options())
            .await
            .unwrap();

        let replica = cluster.replicas().next().unwrap();
        db2.put_container(&replica.container_name, "exited");
        let report = run_setup(&cluster, &hosts, &templates, &ScriptedPrompt::default(), &options())
            .await
            .unwrap();
        assert_eq!(names(&report.servers[1]), vec!["StartContainer"]);
    }

    #[tokio::test]
    async fn test_preview_does_not_touch_hosts() {
        let cluster = sample_cluster();
        let db1 = FakeHost::new("db1.example.com");
        let db2 = FakeHost::new("db2.example.com");
        db1.set_ufw(Some(vec![22]));
        let hosts = registry(&[&db1, &db2]);
        let templates = Templates::builtin().unwrap();

        let plans = preview(&cluster, &hosts, &templates).await.unwrap();
        assert_eq!(plans.len(), 2);
        let master_plan = plans[0].actions.as_ref().unwrap();
        assert_eq!(master_plan[0], Action::AllowFirewallPort);
        assert!(master_plan.contains(&Action::CreateContainer));
        assert!(plans[1].actions.as_ref().unwrap().contains(&Action::BootstrapReplica));
        assert!(db1.mutations().is_empty());
        assert!(db2.mutations().is_empty());
    }
}

//! Read-only inspection of one server's remote state
//!
//! Nothing in this module changes the host. Every failure is reported as a
//! [`ProbeError`] naming the host and the check that failed.

use pgcluster_models::{Cluster, ConfigurationError, Server, SUPERUSER};

use crate::command::{container_inspect, first_entry, read_file, test_path, ufw_status, DockerRun};
use crate::error::{Error, ProbeError};
use crate::remote::{RemoteError, RemoteExecutor};
use crate::sql::{self, Output, Psql};
use crate::types::{ContainerState, FirewallState, PostgresOwner, RemoteHostState};

const STATUS_FORMAT: &str = "{{.State.Status}}";

pub struct Probe<'a> {
    cluster: &'a Cluster,
    server: &'a Server,
    remote: &'a dyn RemoteExecutor,
}

impl<'a> Probe<'a> {
    pub fn new(cluster: &'a Cluster, server: &'a Server, remote: &'a dyn RemoteExecutor) -> Self {
        Self { cluster, server, remote }
    }

    fn failed(&self, check: &str) -> impl FnOnce(RemoteError) -> ProbeError {
        let host = self.server.domain.clone();
        let check = check.to_string();
        move |source| ProbeError { host, check, source }
    }

    // ========================================================================
    // Container
    // ========================================================================

    pub async fn container_exists(&self) -> Result<bool, ProbeError> {
        self.remote
            .test(&container_inspect(&self.server.container_name, None))
            .await
            .map_err(self.failed("container_exists"))
    }

    pub async fn container_state(&self) -> Result<ContainerState, ProbeError> {
        if !self.container_exists().await? {
            return Ok(ContainerState::Missing);
        }
        let status = self
            .remote
            .capture(&container_inspect(&self.server.container_name, Some(STATUS_FORMAT)))
            .await
            .map_err(self.failed("container_state"))?;
        Ok(ContainerState::from_docker_status(&status))
    }

    pub async fn container_is_running(&self) -> Result<bool, ProbeError> {
        Ok(self.container_state().await?.is_running())
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Byte-exact comparison of the installed file with `rendered`. A file
    /// that is not installed yet always differs.
    pub async fn config_file_differs(&self, file: &str, rendered: &str) -> Result<bool, ProbeError> {
        let path = self.server.config_file_path(file);
        let present = self
            .remote
            .test(&test_path("-f", &path))
            .await
            .map_err(self.failed("config_file_differs"))?;
        if !present {
            return Ok(true);
        }
        let installed = self
            .remote
            .capture(&read_file(&path))
            .await
            .map_err(self.failed("config_file_differs"))?;
        Ok(installed != rendered)
    }

    /// A directory that does not exist yet counts as empty
    pub async fn data_path_is_empty(&self) -> Result<bool, ProbeError> {
        let path = &self.server.data_path;
        let exists = self
            .remote
            .test(&test_path("-d", path))
            .await
            .map_err(self.failed("data_path_is_empty"))?;
        if !exists {
            return Ok(true);
        }
        let entry = self
            .remote
            .capture(&first_entry(path))
            .await
            .map_err(self.failed("data_path_is_empty"))?;
        Ok(entry.trim().is_empty())
    }

    // ========================================================================
    // Image
    // ========================================================================

    /// uid and gid of the postgres user inside the image, checked against
    /// any values the declaration pins
    pub async fn postgres_owner(&self) -> Result<PostgresOwner, Error> {
        let image = &self.cluster.image;
        let uid = self.image_id("-u").await?;
        let gid = self.image_id("-g").await?;
        let found = PostgresOwner { uid, gid };

        let declared = PostgresOwner {
            uid: image.uid.unwrap_or(uid),
            gid: image.gid.unwrap_or(gid),
        };
        if declared != found {
            return Err(ConfigurationError::OwnerMismatch {
                host: self.server.domain.clone(),
                image: image.name.clone(),
                declared: declared.to_string(),
                found: found.to_string(),
            }
            .into());
        }
        Ok(found)
    }

    async fn image_id(&self, flag: &str) -> Result<u32, Error> {
        let image = &self.cluster.image;
        let command = DockerRun::disposable(&image.name)
            .entrypoint(&image.tools.id)
            .args([flag, SUPERUSER])
            .into_command();
        let output = self
            .remote
            .capture(&command)
            .await
            .map_err(self.failed("postgres_owner"))?;
        output.trim().parse::<u32>().map_err(|_| {
            ConfigurationError::Invalid(format!(
                "{}: `id {} {}` in image {} printed {:?}",
                self.server.domain,
                flag,
                SUPERUSER,
                image.name,
                output.trim()
            ))
            .into()
        })
    }

    // ========================================================================
    // Firewall
    // ========================================================================

    pub async fn firewall_state(&self) -> Result<FirewallState, ProbeError> {
        match self.remote.capture(&ufw_status()).await {
            Ok(status) => Ok(parse_ufw_status(&status, self.server.port)),
            Err(err) if ufw_missing(&err) => Ok(FirewallState::Inactive),
            Err(err) => Err(self.failed("firewall_state")(err)),
        }
    }

    // ========================================================================
    // SQL
    // ========================================================================

    async fn query(&self, check: &str, command: crate::command::RemoteCommand) -> Result<String, ProbeError> {
        self.remote.capture(&command).await.map_err(self.failed(check))
    }

    pub async fn role_exists(&self, role: &str) -> Result<bool, ProbeError> {
        let command = Psql::new(self.cluster, self.server).sql(&sql::role_exists(role));
        Ok(self.query("role_exists", command).await?.trim() == "1")
    }

    pub async fn database_exists(&self, database: &str) -> Result<bool, ProbeError> {
        let command = Psql::new(self.cluster, self.server).sql(&sql::database_exists(database));
        Ok(self.query("database_exists", command).await?.trim() == "1")
    }

    /// True when the database has no user tables. Unreadable counts are
    /// treated as "not empty" so callers ask before overwriting.
    pub async fn database_is_empty(&self, database: &str) -> Result<bool, ProbeError> {
        let command = Psql::new(self.cluster, self.server)
            .database(database)
            .sql(sql::COUNT_USER_TABLES);
        let count = self.query("database_is_empty", command).await?;
        Ok(count.trim().parse::<u64>().map(|tables| tables == 0).unwrap_or(false))
    }

    /// psql `\du`
    pub async fn list_roles(&self) -> Result<String, ProbeError> {
        let command = Psql::new(self.cluster, self.server).output(Output::Table).sql("\\du");
        self.query("list_roles", command).await
    }

    /// psql `\l`
    pub async fn list_databases(&self) -> Result<String, ProbeError> {
        let command = Psql::new(self.cluster, self.server).output(Output::Table).sql("\\l");
        self.query("list_databases", command).await
    }

    pub async fn role_names(&self) -> Result<Vec<String>, ProbeError> {
        let command = Psql::new(self.cluster, self.server).sql(sql::LIST_ROLE_NAMES);
        Ok(lines(&self.query("role_names", command).await?))
    }

    pub async fn database_names(&self) -> Result<Vec<String>, ProbeError> {
        let command = Psql::new(self.cluster, self.server).sql(sql::LIST_DATABASE_NAMES);
        Ok(lines(&self.query("database_names", command).await?))
    }

    /// Master: connected replicas. Replica: delay since the last replayed transaction.
    pub async fn replication_status(&self) -> Result<String, ProbeError> {
        let command = if self.server.is_master() {
            Psql::new(self.cluster, self.server)
                .output(Output::Expanded)
                .sql(sql::MASTER_REPLICATION_STATUS)
        } else {
            Psql::new(self.cluster, self.server)
                .output(Output::Table)
                .sql(sql::REPLICA_REPLAY_DELAY)
        };
        self.query("replication_status", command).await
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Container, config drift, data path and firewall state. `rendered`
    /// holds the freshly rendered config files as (file name, contents).
    pub async fn snapshot_container_phase(
        &self,
        rendered: &[(String, String)],
    ) -> Result<RemoteHostState, ProbeError> {
        let mut state = RemoteHostState {
            container: self.container_state().await?,
            firewall: self.firewall_state().await?,
            ..Default::default()
        };
        for (file, contents) in rendered {
            let differs = self.config_file_differs(file, contents).await?;
            state.config_drift.insert(file.clone(), differs);
        }
        if state.container == ContainerState::Missing {
            state.data_path_empty = self.data_path_is_empty().await?;
        }
        Ok(state)
    }

    /// Role and database existence; the master must be running
    pub async fn snapshot_database_phase(&self, state: &mut RemoteHostState) -> Result<(), ProbeError> {
        for (role, _) in self.cluster.required_roles() {
            let exists = self.role_exists(role).await?;
            state.roles.insert(role.to_string(), exists);
        }
        for database in &self.cluster.databases {
            let exists = self.database_exists(&database.name).await?;
            state.databases.insert(database.name.clone(), exists);
        }
        Ok(())
    }
}

fn lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `ufw status` output:
///
/// ```text
/// Status: active
///
/// To                         Action      From
/// --                         ------      ----
/// 5432/tcp                   ALLOW       Anywhere
/// ```
/// `ufw` is not installed. sudo reports a missing command with status 1, a
/// plain shell with 127; anything else (a refused sudo, a broken ufw) is a
/// real failure.
fn ufw_missing(err: &RemoteError) -> bool {
    match err {
        RemoteError::CommandFailed { code, stderr, .. } => {
            *code == Some(127) || stderr.contains("command not found")
        }
        _ => false,
    }
}

pub fn parse_ufw_status(status: &str, port: u16) -> FirewallState {
    let active = status
        .lines()
        .any(|line| line.trim().eq_ignore_ascii_case("status: active"));
    if !active {
        return FirewallState::Inactive;
    }

    let tcp = format!("{}/tcp", port);
    let bare = port.to_string();
    let allowed = status.lines().any(|line| {
        let mut fields = line.split_whitespace();
        let target = fields.next().unwrap_or_default();
        let action = fields.next().unwrap_or_default();
        (target == tcp || target == bare) && action.eq_ignore_ascii_case("ALLOW")
    });
    if allowed {
        FirewallState::Allowed
    } else {
        FirewallState::Blocked
    }
}

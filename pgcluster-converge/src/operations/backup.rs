//! Dump and restore on the master
//!
//! Dumps are tar-format `pg_dump` archives kept in [`DUMP_DIR`] on the master
//! host. Both directions run the image's client tools in a disposable
//! container attached to the master's socket directory.

use pgcluster_models::{Cluster, ConfigurationError, Server, SUPERUSER};

use crate::command::{test_path, DockerRun, RemoteCommand};
use crate::confirm::{require_confirmation, Prompt};
use crate::error::{Error, ProbeError, RemoteExecutionError, Result};
use crate::probe::Probe;
use crate::registry::HostRegistry;
use crate::remote::RemoteExecutor;

/// Host directory holding dump files; mounted at the same path in the container
pub const DUMP_DIR: &str = "/tmp";

fn dump_path(file: &str) -> Result<String, ConfigurationError> {
    if file.is_empty() || file.contains('/') || file == "." || file == ".." {
        return Err(ConfigurationError::Invalid(format!(
            "dump file name {:?} must be a plain file name inside {}",
            file, DUMP_DIR
        )));
    }
    Ok(format!("{}/{}", DUMP_DIR, file))
}

fn client_tool(cluster: &Cluster, server: &Server, tool: &str) -> DockerRun {
    let image = &cluster.image;
    DockerRun::disposable(&image.name)
        .volume(&server.socket_path, &image.socket_path)
        .volume(DUMP_DIR, DUMP_DIR)
        .entrypoint(tool)
        .args(["-U", SUPERUSER, "--host", image.socket_path.as_str()])
}

fn pg_dump(cluster: &Cluster, server: &Server, path: &str, database: &str) -> RemoteCommand {
    client_tool(cluster, server, &cluster.image.tools.pg_dump)
        .args(["-F", "tar", "-f", path, database])
        .into_command()
}

fn pg_restore(cluster: &Cluster, server: &Server, path: &str, database: &str, clean: bool) -> RemoteCommand {
    let mut run = client_tool(cluster, server, &cluster.image.tools.pg_restore).args(["-d", database]);
    if clean {
        run = run.args(["--clean"]);
    }
    run.args([path]).into_command()
}

async fn dump_exists(remote: &dyn RemoteExecutor, path: &str) -> Result<bool, ProbeError> {
    remote
        .test(&test_path("-f", path))
        .await
        .map_err(|source| ProbeError {
            host: remote.host().to_string(),
            check: "dump_file_exists".to_string(),
            source,
        })
}

async fn run(remote: &dyn RemoteExecutor, action: &str, command: &RemoteCommand) -> Result<()> {
    remote.execute(command).await.map_err(|source| {
        RemoteExecutionError {
            host: remote.host().to_string(),
            action: action.to_string(),
            source,
        }
        .into()
    })
}

/// Dump `database` from the master into [`DUMP_DIR`]`/<file>`. Overwriting an
/// existing dump needs confirmation. Returns the path on the master host.
pub async fn dump(
    cluster: &Cluster,
    hosts: &HostRegistry,
    prompt: &dyn Prompt,
    file: &str,
    database: &str,
) -> Result<String> {
    let database = cluster.database(database)?;
    let path = dump_path(file)?;
    let master = cluster.master();
    let remote = hosts.get(&master.domain)?;

    if dump_exists(remote.as_ref(), &path).await? {
        require_confirmation(
            prompt,
            &format!("{} already exists on {}. Overwrite it? (yes/no)", path, master.domain),
        )?;
    }

    tracing::info!(host = %master.domain, "Dumping {} to {}", database.name, path);
    run(remote.as_ref(), "dump", &pg_dump(cluster, master, &path, &database.name)).await?;
    tracing::info!(host = %master.domain, "Dump written to {}", path);
    Ok(path)
}

/// Restore [`DUMP_DIR`]`/<file>` into `database` on the master. A database that
/// already has tables is only overwritten (with `--clean`) after confirmation.
pub async fn restore(
    cluster: &Cluster,
    hosts: &HostRegistry,
    prompt: &dyn Prompt,
    file: &str,
    database: &str,
) -> Result<()> {
    let database = cluster.database(database)?;
    let path = dump_path(file)?;
    let master = cluster.master();
    let remote = hosts.get(&master.domain)?;

    if !dump_exists(remote.as_ref(), &path).await? {
        return Err(Error::MissingDumpFile {
            host: master.domain.clone(),
            path,
        });
    }

    let empty = Probe::new(cluster, master, remote.as_ref())
        .database_is_empty(&database.name)
        .await?;
    if !empty {
        require_confirmation(
            prompt,
            &format!(
                "Database {} on {} is not empty. Drop its objects and restore {}? (yes/no)",
                database.name, master.domain, path
            ),
        )?;
    }

    tracing::info!(host = %master.domain, "Restoring {} into {}", path, database.name);
    run(remote.as_ref(), "restore", &pg_restore(cluster, master, &path, &database.name, !empty)).await?;
    tracing::info!(host = %master.domain, "Restored {}", database.name);
    Ok(())
}

//! Replica bootstrap from the master's base backup
//!
//! `pg_basebackup` needs an empty target, but the replica's SSL keys are
//! generated first. The backup goes to a staging directory and is merged
//! into the data directory without overwriting what is already there.

use pgcluster_models::REPLICATOR_ROLE;

use crate::actions::ActionContext;
use crate::command::{chmod, chown, mkdir_p, remove_tree, DockerRun};
use crate::error::Result;
use crate::types::Action;

const BACKUP_MOUNT: &str = "/pgcluster-backup";
const DATA_MOUNT: &str = "/pgcluster-data";

pub async fn bootstrap_replica(ctx: &ActionContext<'_>, action: &Action) -> Result<()> {
    let image = &ctx.cluster.image;
    let server = ctx.server;
    let master = ctx.cluster.master();
    let staging = format!("{}.basebackup-{}", server.data_path, uuid::Uuid::new_v4().simple());

    tracing::info!(
        host = %server.domain,
        container = %server.container_name,
        "Streaming base backup from {}",
        master
    );

    // 1. Empty staging directory owned by postgres
    ctx.run(action, &mkdir_p([staging.as_str()])).await?;

    let merged = async {
        ctx.run(action, &chown(ctx.owner.uid, ctx.owner.gid, [staging.as_str()])).await?;
        ctx.run(action, &chmod("0700", [staging.as_str()])).await?;

        // 2. Base backup, streaming the WAL it needs
        let basebackup = DockerRun::disposable(&image.name)
            .user("postgres")
            .volume(&staging, &image.data_path)
            .secret_env("PGPASSWORD", &ctx.cluster.replicator_password)
            .entrypoint(&image.tools.pg_basebackup)
            .args([
                "-w".to_string(),
                "-h".to_string(),
                master.domain.clone(),
                "-p".to_string(),
                master.port.to_string(),
                "-U".to_string(),
                REPLICATOR_ROLE.to_string(),
                "-D".to_string(),
                image.data_path.clone(),
                "-v".to_string(),
                "-x".to_string(),
            ])
            .into_command();
        ctx.run(action, &basebackup).await?;

        // 3. Merge, keeping the replica's own files
        let merge = DockerRun::disposable(&image.name)
            .user("root")
            .volume(&staging, BACKUP_MOUNT)
            .volume(&server.data_path, DATA_MOUNT)
            .entrypoint(&image.tools.rsync)
            .args([
                "-a".to_string(),
                "--ignore-existing".to_string(),
                format!("{}/", BACKUP_MOUNT),
                format!("{}/", DATA_MOUNT),
            ])
            .into_command();
        ctx.run(action, &merge).await
    };
    let result = merged.await;

    // 4. Staging is removed whether or not the backup succeeded
    let cleanup = ctx.run(action, &remove_tree(&staging)).await;
    result?;
    cleanup
}

//! Config file installation
//!
//! Files are uploaded next to their destination and renamed into place, so a
//! postgres process reading the directory never sees a half-written file.

use crate::actions::ActionContext;
use crate::command::{chmod, chown, mkdir_p, move_into_place, remove_files};
use crate::error::Result;
use crate::templates::TemplateContext;
use crate::types::Action;

/// Mode of installed config files
pub const CONFIG_FILE_MODE: &str = "0640";

pub async fn install_config(ctx: &ActionContext<'_>, action: &Action, file: &str) -> Result<()> {
    let rendered = ctx
        .templates
        .render(file, &TemplateContext::new(ctx.cluster, ctx.server))?;
    install_file(ctx, action, &ctx.server.conf_path, file, &rendered).await?;

    tracing::info!(host = %ctx.server.domain, container = %ctx.server.container_name, "Installed {}", file);
    Ok(())
}

/// Recovery settings live in the replica's data directory
pub async fn install_replication_config(ctx: &ActionContext<'_>, action: &Action) -> Result<()> {
    let file = &ctx.cluster.image.replication_config_file;
    let rendered = ctx
        .templates
        .render(file, &TemplateContext::new(ctx.cluster, ctx.server))?;
    install_file(ctx, action, &ctx.server.data_path, file, &rendered).await?;

    tracing::info!(host = %ctx.server.domain, container = %ctx.server.container_name, "Installed {}", file);
    Ok(())
}

async fn install_file(
    ctx: &ActionContext<'_>,
    action: &Action,
    dir: &str,
    file: &str,
    content: &str,
) -> Result<()> {
    let target = format!("{}/{}", dir, file);
    let staged = format!("{}/.{}.{}.tmp", dir, file, uuid::Uuid::new_v4().simple());

    // 1. Directory owned by postgres
    ctx.run(action, &mkdir_p([dir])).await?;
    ctx.run(action, &chown(ctx.owner.uid, ctx.owner.gid, [dir])).await?;

    // 2. Staged copy in the same directory
    ctx.upload(action, content, &staged).await?;

    // 3. Ownership and mode before it becomes visible
    let prepared = async {
        ctx.run(action, &chown(ctx.owner.uid, ctx.owner.gid, [staged.as_str()])).await?;
        ctx.run(action, &chmod(CONFIG_FILE_MODE, [staged.as_str()])).await?;
        // 4. Atomic rename
        ctx.run(action, &move_into_place(&staged, &target)).await
    };
    if let Err(err) = prepared.await {
        if let Err(cleanup) = ctx.remote.execute(&remove_files([staged.as_str()])).await {
            tracing::warn!(host = %ctx.server.domain, "Failed to remove {}: {}", staged, cleanup);
        }
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::execute;
    use crate::templates::Templates;
    use crate::testing::{sample_cluster, FakeHost, SAMPLE_OWNER};

    #[tokio::test]
    async fn test_install_config_renames_into_place() {
        let cluster = sample_cluster();
        let master = cluster.master();
        let host = FakeHost::new(&master.domain);
        let templates = Templates::builtin().unwrap();
        let ctx = ActionContext {
            cluster: &cluster,
            server: master,
            remote: &host,
            templates: &templates,
            owner: SAMPLE_OWNER,
        };

        execute(&ctx, &Action::InstallConfig { file: "pg_hba.conf".to_string() })
            .await
            .unwrap();

        let path = master.config_file_path("pg_hba.conf");
        let expected = templates
            .render("pg_hba.conf", &TemplateContext::new(&cluster, master))
            .unwrap();
        assert_eq!(host.file(&path).as_deref(), Some(expected.as_str()));
        assert_eq!(host.mode(&path).as_deref(), Some(CONFIG_FILE_MODE));
        assert!(host.files_under(&master.conf_path).iter().all(|file| !file.ends_with(".tmp")));

        let log = host.commands();
        let upload = log.iter().position(|c| c.contains("cat >")).unwrap();
        let rename = log.iter().position(|c| c.starts_with("sudo -n mv -f")).unwrap();
        assert!(upload < rename);
    }

    #[tokio::test]
    async fn test_failed_rename_removes_staged_file() {
        let cluster = sample_cluster();
        let master = cluster.master();
        let host = FakeHost::new(&master.domain);
        host.fail_when("mv -f");
        let templates = Templates::builtin().unwrap();
        let ctx = ActionContext {
            cluster: &cluster,
            server: master,
            remote: &host,
            templates: &templates,
            owner: SAMPLE_OWNER,
        };

        let err = execute(&ctx, &Action::InstallConfig { file: "postgresql.conf".to_string() })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("InstallConfig(postgresql.conf)"));
        assert!(host.files_under(&master.conf_path).is_empty());
    }

    #[tokio::test]
    async fn test_replication_config_goes_to_data_dir() {
        let cluster = sample_cluster();
        let replica = cluster.replicas().next().unwrap();
        let host = FakeHost::new(&replica.domain);
        let templates = Templates::builtin().unwrap();
        let ctx = ActionContext {
            cluster: &cluster,
            server: replica,
            remote: &host,
            templates: &templates,
            owner: SAMPLE_OWNER,
        };

        execute(&ctx, &Action::InstallReplicationConfig).await.unwrap();
        let installed = host.file(&replica.data_file_path("recovery.conf")).unwrap();
        assert!(installed.contains("standby_mode = 'on'"));
    }
}

//! Container creation and lifecycle

use crate::actions::ActionContext;
use crate::command::{chown, container_lifecycle, mkdir_p, DockerRun, Lifecycle, CONTAINER_PORT};
use crate::error::Result;
use crate::types::Action;

const SEED_MOUNT: &str = "/pgcluster-seed";

pub async fn create_container(ctx: &ActionContext<'_>, action: &Action) -> Result<()> {
    let image = &ctx.cluster.image;
    let server = ctx.server;
    let dirs = [
        server.data_path.as_str(),
        server.conf_path.as_str(),
        server.socket_path.as_str(),
    ];

    // 1. Host directories
    ctx.run(action, &mkdir_p(dirs)).await?;
    ctx.run(action, &chown(ctx.owner.uid, ctx.owner.gid, dirs)).await?;

    // 2. A master starts from the image's initialized cluster. Existing
    //    files (the SSL pair) win.
    if server.is_master() {
        tracing::info!(host = %server.domain, container = %server.container_name, "Seeding data directory from {}", image.name);
        let seed = DockerRun::disposable(&image.name)
            .user("root")
            .volume(&server.data_path, SEED_MOUNT)
            .entrypoint(&image.tools.rsync)
            .args([
                "-a".to_string(),
                "--ignore-existing".to_string(),
                format!("{}/", image.data_path),
                format!("{}/", SEED_MOUNT),
            ])
            .into_command();
        ctx.run(action, &seed).await?;
    }

    // 3. The server itself
    let run = DockerRun::service(&image.name, &server.container_name)
        .user("postgres")
        .volume(&server.data_path, &image.data_path)
        .volume(&server.conf_path, &image.conf_path)
        .volume(&server.socket_path, &image.socket_path)
        .expose(CONTAINER_PORT)
        .publish(server.port, CONTAINER_PORT)
        .restart("always")
        .entrypoint(&image.postgres_binary)
        .args([
            "-D".to_string(),
            image.data_path.clone(),
            "-c".to_string(),
            format!("config_file={}/{}", image.conf_path, image.main_config_file),
        ])
        .into_command();
    ctx.run(action, &run).await?;

    tracing::info!(host = %server.domain, container = %server.container_name, "Created container");
    Ok(())
}

pub async fn lifecycle(ctx: &ActionContext<'_>, action: &Action) -> Result<()> {
    let server = ctx.server;
    let lifecycle = match action {
        Action::StartContainer => Lifecycle::Start,
        Action::ReloadConfig => Lifecycle::Reload,
        _ => Lifecycle::Restart,
    };
    match lifecycle {
        Lifecycle::Start => tracing::info!(host = %server.domain, container = %server.container_name, "Starting container"),
        Lifecycle::Restart => tracing::warn!(host = %server.domain, container = %server.container_name, "Restarting container"),
        Lifecycle::Reload => tracing::info!(host = %server.domain, container = %server.container_name, "Reloading configuration"),
    }
    ctx.run(action, &container_lifecycle(lifecycle, &server.container_name)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::execute;
    use crate::actions::ssl::SSL_KEY;
    use crate::templates::Templates;
    use crate::testing::{sample_cluster, FakeHost, SAMPLE_OWNER};

    #[tokio::test]
    async fn test_create_master_container() {
        let cluster = sample_cluster();
        let master = cluster.master();
        let host = FakeHost::new(&master.domain);
        host.put_file(&master.data_file_path(SSL_KEY), "generated");
        let templates = Templates::builtin().unwrap();
        let ctx = ActionContext {
            cluster: &cluster,
            server: master,
            remote: &host,
            templates: &templates,
            owner: SAMPLE_OWNER,
        };

        execute(&ctx, &Action::CreateContainer).await.unwrap();

        assert_eq!(host.container(&master.container_name).as_deref(), Some("running"));
        assert_eq!(host.file(&master.data_file_path(SSL_KEY)).as_deref(), Some("generated"));
        assert!(host.file(&master.data_file_path("PG_VERSION")).is_some());

        let log = host.commands();
        let run = log.iter().find(|c| c.contains("--detach")).unwrap();
        assert!(run.contains("--name db1.example.com-postgres-master_5432"));
        assert!(run.contains("--publish 0.0.0.0:5432:5432"));
        assert!(run.contains("--restart always"));
        assert!(run.ends_with("-c config_file=/etc/postgresql/9.1/main/postgresql.conf"));
    }

    #[tokio::test]
    async fn test_replica_container_is_not_seeded() {
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

        execute(&ctx, &Action::CreateContainer).await.unwrap();
        assert!(!host.commands().iter().any(|c| c.contains(SEED_MOUNT)));
    }

    #[tokio::test]
    async fn test_lifecycle_commands() {
        let cluster = sample_cluster();
        let master = cluster.master();
        let host = FakeHost::new(&master.domain);
        host.put_container(&master.container_name, "exited");
        let templates = Templates::builtin().unwrap();
        let ctx = ActionContext {
            cluster: &cluster,
            server: master,
            remote: &host,
            templates: &templates,
            owner: SAMPLE_OWNER,
        };

        execute(&ctx, &Action::StartContainer).await.unwrap();
        assert_eq!(host.container(&master.container_name).as_deref(), Some("running"));
        execute(&ctx, &Action::ReloadConfig).await.unwrap();
        execute(&ctx, &Action::RestartContainer).await.unwrap();

        let log = host.commands();
        assert!(log.contains(&"docker start db1.example.com-postgres-master_5432".to_string()));
        assert!(log.contains(&"docker kill --signal HUP db1.example.com-postgres-master_5432".to_string()));
        assert!(log.contains(&"docker restart db1.example.com-postgres-master_5432".to_string()));
    }
}

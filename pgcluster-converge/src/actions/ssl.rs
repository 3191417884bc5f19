//! Self-signed SSL key and certificate in the data directory

use crate::actions::ActionContext;
use crate::command::{chmod, chown, mkdir_p, remove_files, DockerRun};
use crate::error::Result;
use crate::types::Action;

pub const SSL_KEY: &str = "server.key";
pub const SSL_CERT: &str = "server.crt";
const SSL_CSR: &str = "server.csr";
const CERT_DAYS: &str = "3650";

pub async fn generate_ssl_keys(ctx: &ActionContext<'_>, action: &Action) -> Result<()> {
    let image = &ctx.cluster.image;
    let server = ctx.server;
    let key = server.data_file_path(SSL_KEY);
    let cert = server.data_file_path(SSL_CERT);
    let in_image = |file: &str| format!("{}/{}", image.data_path, file);

    tracing::info!(host = %server.domain, container = %server.container_name, "Generating SSL keys");

    // 1. Data directory private to postgres
    ctx.run(action, &mkdir_p([server.data_path.as_str()])).await?;
    ctx.run(action, &chown(ctx.owner.uid, ctx.owner.gid, [server.data_path.as_str()])).await?;
    ctx.run(action, &chmod("0700", [server.data_path.as_str()])).await?;

    // 2. Images often ship the snakeoil pair as symlinks; replace them
    ctx.run(action, &remove_files([key.as_str(), cert.as_str()])).await?;

    // 3. Key and signing request
    let openssl = || {
        DockerRun::disposable(&image.name)
            .user("root")
            .volume(&server.data_path, &image.data_path)
            .entrypoint(&image.tools.openssl)
    };
    let request = openssl()
        .args([
            "req".to_string(),
            "-nodes".to_string(),
            "-newkey".to_string(),
            "rsa:2048".to_string(),
            "-keyout".to_string(),
            in_image(SSL_KEY),
            "-out".to_string(),
            in_image(SSL_CSR),
            "-subj".to_string(),
            ctx.cluster.ssl_subject_for(server),
        ])
        .into_command();
    ctx.run(action, &request).await?;

    // 4. Self-signed certificate
    let sign = openssl()
        .args([
            "x509".to_string(),
            "-req".to_string(),
            "-days".to_string(),
            CERT_DAYS.to_string(),
            "-in".to_string(),
            in_image(SSL_CSR),
            "-signkey".to_string(),
            in_image(SSL_KEY),
            "-out".to_string(),
            in_image(SSL_CERT),
        ])
        .into_command();
    ctx.run(action, &sign).await?;

    // 5. Drop the request, lock down the pair
    ctx.run(action, &remove_files([server.data_file_path(SSL_CSR)])).await?;
    ctx.run(action, &chown(ctx.owner.uid, ctx.owner.gid, [key.as_str(), cert.as_str()])).await?;
    ctx.run(action, &chmod("0600", [key.as_str(), cert.as_str()])).await?;

    Ok(())
}

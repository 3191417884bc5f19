use std::process::Command;

use anyhow::{Context, Result};
use pgcluster_converge::operations::{interactive_argv, printable};

use crate::config::Config;

/// Replace this process with `ssh -t ... docker run ... psql`, or print it
pub fn run_interactive(config: &Config, domain: Option<&str>, port: Option<u16>, print: bool) -> Result<()> {
    let cluster = config.load_cluster()?;
    let server = match domain {
        Some(domain) => cluster.find_server(domain, port)?,
        None => cluster.master(),
    };

    let argv = interactive_argv(&cluster, server, &config.ssh);
    if print {
        println!("{}", printable(&argv));
        return Ok(());
    }

    tracing::info!(host = %server.domain, container = %server.container_name, "Opening psql");
    let (program, args) = argv.split_first().context("empty ssh command")?;
    let mut command = Command::new(program);
    command.args(args);
    exec(command)
}

#[cfg(unix)]
fn exec(mut command: Command) -> Result<()> {
    use std::os::unix::process::CommandExt;

    // exec only returns on failure
    let err = command.exec();
    Err(err).context("Failed to run ssh")
}

#[cfg(not(unix))]
fn exec(mut command: Command) -> Result<()> {
    let status = command.status().context("Failed to run ssh")?;
    if !status.success() {
        anyhow::bail!("ssh exited with {}", status);
    }
    Ok(())
}

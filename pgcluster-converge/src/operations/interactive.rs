//! Interactive psql session
//!
//! The session runs in a disposable container attached to the server's
//! socket directory, reached with `ssh -t`. The binary either replaces itself
//! with that command or prints it.

use pgcluster_models::{Cluster, Server, SUPERUSER};

use crate::command::{shell_quote, DockerRun, RemoteCommand};
use crate::remote::SshOptions;

/// `docker run` for an interactive psql on `server`
pub fn interactive_command(cluster: &Cluster, server: &Server) -> RemoteCommand {
    let image = &cluster.image;
    DockerRun::disposable(&image.name)
        .interactive()
        .tty()
        .volume(&server.socket_path, &image.socket_path)
        .entrypoint(&image.tools.psql)
        .args(["-U", SUPERUSER, "--host", image.socket_path.as_str()])
        .into_command()
}

/// Local argv: `ssh -t [options] <destination> <docker run ...>`
pub fn interactive_argv(cluster: &Cluster, server: &Server, ssh: &SshOptions) -> Vec<String> {
    let mut argv = vec![ssh.program.clone(), "-t".to_string()];
    argv.extend(ssh.extra_args.iter().cloned());
    argv.push(ssh.destination(&server.domain));
    argv.push(interactive_command(cluster, server).to_shell());
    argv
}

/// [`interactive_argv`] as one line to paste into a shell
pub fn printable(argv: &[String]) -> String {
    argv.iter()
        .map(|word| shell_quote(word).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

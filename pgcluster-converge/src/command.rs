//! Typed remote command builders
//!
//! Every command the orchestrator sends to a host is built here so that
//! quoting happens in exactly one place. A [`RemoteCommand`] is an argv plus
//! optional stdin and privilege level; [`RemoteCommand::to_shell`] renders it
//! for the remote login shell.

use std::borrow::Cow;
use std::fmt;

/// Container port PostgreSQL listens on inside every container
pub const CONTAINER_PORT: u16 = 5432;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Privilege {
    /// Run as the SSH user
    #[default]
    User,
    /// Run through `sudo -n`
    Root,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Arg {
    value: String,
    secret: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    program: String,
    args: Vec<Arg>,
    stdin: Option<String>,
    privilege: Privilege,
}

impl RemoteCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            privilege: Privilege::User,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: arg.into(),
            secret: false,
        });
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    /// Argument masked in logs and error messages
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: arg.into(),
            secret: true,
        });
        self
    }

    /// Data piped to the command's stdin; never logged
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn as_root(mut self) -> Self {
        self.privilege = Privilege::Root;
        self
    }

    pub fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = privilege;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Program followed by its arguments, without privilege elevation
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(|arg| arg.value.as_str()))
            .collect()
    }

    pub fn input(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    pub fn privilege(&self) -> Privilege {
        self.privilege
    }

    /// Shell text sent to the remote host
    pub fn to_shell(&self) -> String {
        self.render(false)
    }

    /// Shell text with secret arguments masked
    pub fn redacted(&self) -> String {
        self.render(true)
    }

    fn render(&self, redact: bool) -> String {
        let mut parts: Vec<Cow<'_, str>> = Vec::with_capacity(self.args.len() + 3);
        if self.privilege == Privilege::Root {
            parts.push(Cow::Borrowed("sudo"));
            parts.push(Cow::Borrowed("-n"));
        }
        parts.push(shell_quote(&self.program));
        for arg in &self.args {
            if redact && arg.secret {
                parts.push(Cow::Borrowed("'***'"));
            } else {
                parts.push(shell_quote(&arg.value));
            }
        }
        parts.join(" ")
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Quote one word for a POSIX shell. Words made only of safe characters are
/// left alone; everything else is single-quoted.
pub fn shell_quote(word: &str) -> Cow<'_, str> {
    let safe = !word.is_empty()
        && word.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '=' | ':' | '@' | '%' | '+' | ',')
        });
    if safe {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

/// `sh -c <script>`; the script is quoted as a single word
pub fn shell(script: impl Into<String>) -> RemoteCommand {
    RemoteCommand::new("sh").arg("-c").arg(script)
}

// ============================================================================
// Filesystem
// ============================================================================

pub fn mkdir_p<I, S>(paths: I) -> RemoteCommand
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    RemoteCommand::new("mkdir").arg("-p").args(paths).as_root()
}

pub fn chown<I, S>(uid: u32, gid: u32, paths: I) -> RemoteCommand
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    RemoteCommand::new("chown")
        .arg(format!("{}:{}", uid, gid))
        .args(paths)
        .as_root()
}

pub fn chmod<I, S>(mode: &str, paths: I) -> RemoteCommand
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    RemoteCommand::new("chmod").arg(mode).args(paths).as_root()
}

pub fn move_into_place(from: &str, to: &str) -> RemoteCommand {
    RemoteCommand::new("mv").args(["-f", from, to]).as_root()
}

pub fn remove_files<I, S>(paths: I) -> RemoteCommand
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    RemoteCommand::new("rm").arg("-f").args(paths).as_root()
}

pub fn remove_tree(path: &str) -> RemoteCommand {
    RemoteCommand::new("rm").args(["-rf", path]).as_root()
}

/// `test <flag> <path>`, e.g. `-f` for regular files, `-d` for directories
pub fn test_path(flag: &str, path: &str) -> RemoteCommand {
    RemoteCommand::new("test").args([flag, path]).as_root()
}

pub fn read_file(path: &str) -> RemoteCommand {
    RemoteCommand::new("cat").arg(path).as_root()
}

/// Prints the first entry of `path`, or nothing when it is empty
pub fn first_entry(path: &str) -> RemoteCommand {
    RemoteCommand::new("find")
        .args([path, "-mindepth", "1", "-maxdepth", "1", "-print", "-quit"])
        .as_root()
}

/// Writes stdin to `path`; used by uploads
pub fn write_stdin_to(path: &str, content: &str, privilege: Privilege) -> RemoteCommand {
    shell(format!("cat > {}", shell_quote(path)))
        .stdin(content)
        .with_privilege(privilege)
}

// ============================================================================
// Firewall
// ============================================================================

pub fn ufw_status() -> RemoteCommand {
    RemoteCommand::new("ufw").arg("status").as_root()
}

pub fn ufw_allow(port: u16) -> RemoteCommand {
    RemoteCommand::new("ufw")
        .args(["allow".to_string(), format!("{}/tcp", port)])
        .as_root()
}

// ============================================================================
// Containers
// ============================================================================

/// Builder for `docker run`
#[derive(Debug, Clone, Default)]
pub struct DockerRun {
    image: String,
    name: Option<String>,
    remove: bool,
    detach: bool,
    tty: bool,
    interactive: bool,
    user: Option<String>,
    volumes: Vec<String>,
    env: Vec<(String, String)>,
    expose: Option<u16>,
    publish: Option<String>,
    restart: Option<String>,
    entrypoint: Option<String>,
    args: Vec<String>,
}

impl DockerRun {
    /// Throwaway container removed on exit
    pub fn disposable(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            remove: true,
            ..Default::default()
        }
    }

    /// Long-running named container
    pub fn service(image: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: Some(name.into()),
            detach: true,
            tty: true,
            ..Default::default()
        }
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn tty(mut self) -> Self {
        self.tty = true;
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Bind mount `host` at `container`, read-write
    pub fn volume(mut self, host: &str, container: &str) -> Self {
        self.volumes.push(format!("{}:{}:rw", host, container));
        self
    }

    /// Environment variable whose value is masked in logs
    pub fn secret_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn expose(mut self, port: u16) -> Self {
        self.expose = Some(port);
        self
    }

    pub fn publish(mut self, host_port: u16, container_port: u16) -> Self {
        self.publish = Some(format!("0.0.0.0:{}:{}", host_port, container_port));
        self
    }

    pub fn restart(mut self, policy: impl Into<String>) -> Self {
        self.restart = Some(policy.into());
        self
    }

    pub fn entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn into_command(self) -> RemoteCommand {
        let mut command = RemoteCommand::new("docker").arg("run");
        if self.remove {
            command = command.arg("--rm");
        }
        if self.detach {
            command = command.arg("--detach");
        }
        if self.tty {
            command = command.arg("--tty");
        }
        if self.interactive {
            command = command.arg("--interactive");
        }
        if let Some(user) = self.user {
            command = command.args(["--user".to_string(), user]);
        }
        if let Some(name) = self.name {
            command = command.args(["--name".to_string(), name]);
        }
        for volume in self.volumes {
            command = command.args(["--volume".to_string(), volume]);
        }
        for (key, value) in self.env {
            command = command.arg("--env").secret_arg(format!("{}={}", key, value));
        }
        if let Some(port) = self.expose {
            command = command.args(["--expose".to_string(), port.to_string()]);
        }
        if let Some(publish) = self.publish {
            command = command.args(["--publish".to_string(), publish]);
        }
        if let Some(policy) = self.restart {
            command = command.args(["--restart".to_string(), policy]);
        }
        if let Some(entrypoint) = self.entrypoint {
            command = command.args(["--entrypoint".to_string(), entrypoint]);
        }
        command.arg(self.image).args(self.args)
    }
}

/// Lifecycle operations on an existing container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Start,
    Restart,
    /// SIGHUP makes postgres re-read its config files
    Reload,
}

pub fn container_lifecycle(lifecycle: Lifecycle, container: &str) -> RemoteCommand {
    let docker = RemoteCommand::new("docker");
    match lifecycle {
        Lifecycle::Start => docker.args(["start", container]),
        Lifecycle::Restart => docker.args(["restart", container]),
        Lifecycle::Reload => docker.args(["kill", "--signal", "HUP", container]),
    }
}

/// `docker inspect`; exits non-zero when the container does not exist
pub fn container_inspect(container: &str, format: Option<&str>) -> RemoteCommand {
    let mut command = RemoteCommand::new("docker").args(["inspect", "--type", "container"]);
    if let Some(format) = format {
        command = command.args(["--format", format]);
    }
    command.arg(container)
}

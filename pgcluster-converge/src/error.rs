//! Error taxonomy for convergence and operational commands
//!
//! [`Error::is_fatal`] decides whether a failure on one replica stops its
//! siblings or is only reported for that host.

use pgcluster_models::ConfigurationError;
use thiserror::Error;

use crate::remote::RemoteError;

/// A read-only check failed
#[derive(Debug, Error)]
#[error("{host}: probe `{check}` failed: {source}")]
pub struct ProbeError {
    pub host: String,
    pub check: String,
    #[source]
    pub source: RemoteError,
}

/// A planned action failed on the remote host
#[derive(Debug, Error)]
#[error("{host}: action `{action}` failed: {source}")]
pub struct RemoteExecutionError {
    pub host: String,
    pub action: String,
    #[source]
    pub source: RemoteError,
}

/// Proceeding would risk destroying or corrupting data
#[derive(Debug, Error)]
pub enum DataSafetyViolation {
    #[error("{host}: container is missing but data path {path} is not empty; refusing to initialize over existing data")]
    DataPathNotEmpty { host: String, path: String },

    #[error("{host}: container {container} is not running after {action}")]
    ContainerNotRunning {
        host: String,
        container: String,
        action: String,
    },
}

/// The operator declined, or never answered, a confirmation prompt
#[derive(Debug, Error)]
#[error("confirmation declined")]
pub struct UserDeclinedConfirmation;

/// Inner errors already name their host
#[derive(Debug, Error)]
#[error("{error}")]
pub struct HostFailure {
    pub host: String,
    pub error: Box<Error>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    RemoteExecution(#[from] RemoteExecutionError),

    #[error(transparent)]
    DataSafety(#[from] DataSafetyViolation),

    #[error("{host}: master is not running; it must be set up before any replica")]
    MasterNotRunning { host: String },

    #[error(transparent)]
    Declined(#[from] UserDeclinedConfirmation),

    #[error("{host}: not started because another server hit a fatal error")]
    Aborted { host: String },

    /// Setup ended early after other servers had already changed
    #[error("{cause}{}", stopped_details(.changed, .others))]
    Stopped {
        cause: Box<Error>,
        /// `domain:port` of every server that applied actions
        changed: Vec<String>,
        /// Replicas that failed or never started
        others: Vec<HostFailure>,
    },

    #[error("{} replica(s) failed: {}", .0.len(), .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    ReplicaFailures(Vec<HostFailure>),

    #[error("{host}: dump file {path} does not exist")]
    MissingDumpFile { host: String, path: String },
}

impl Error {
    /// Fatal errors stop every server still converging
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Configuration(_) | Error::DataSafety(_) | Error::MasterNotRunning { .. } => true,
            Error::Stopped { cause, .. } => cause.is_fatal(),
            _ => false,
        }
    }

    /// The run ended at a declined confirmation, possibly after other changes
    pub fn is_declined(&self) -> bool {
        match self {
            Error::Declined(_) => true,
            Error::Stopped { cause, .. } => cause.is_declined(),
            _ => false,
        }
    }
}

fn stopped_details(changed: &[String], others: &[HostFailure]) -> String {
    let mut details = String::new();
    if !changed.is_empty() {
        details.push_str(&format!("; already changed: {}", changed.join(", ")));
    }
    for other in others {
        details.push_str(&format!("; {}", other));
    }
    details
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

use thiserror::Error;

/// Declared cluster data violates an invariant, or references something that
/// is not declared. Always reported before any remote action is attempted.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to parse cluster declaration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("no server is marked as master")]
    NoMaster,

    #[error("you can't set more than one master (found: {})", .0.join(", "))]
    MultipleMasters(Vec<String>),

    #[error("servers {first} and {second} both resolve to container name {container_name}")]
    DuplicateContainerName {
        container_name: String,
        first: String,
        second: String,
    },

    #[error("database {0} is declared more than once")]
    DuplicateDatabase(String),

    #[error("invalid cluster declaration: {0}")]
    Invalid(String),

    #[error("server domain {0} not found in the configuration")]
    UnknownDomain(String),

    #[error("server {domain}:{port} not found in the configuration")]
    UnknownServer { domain: String, port: u16 },

    #[error("several servers run on {domain}, pick one with --port ({})", .ports.iter().map(u16::to_string).collect::<Vec<_>>().join(", "))]
    AmbiguousDomain { domain: String, ports: Vec<u16> },

    #[error("database {0} not found in the configuration")]
    UnknownDatabase(String),

    #[error("config file {0} is not declared by the image")]
    UnknownConfigFile(String),

    #[error("{host}: image {image} runs postgres as {found}, but the declaration says {declared}")]
    OwnerMismatch {
        host: String,
        image: String,
        declared: String,
        found: String,
    },

    #[error("template {path} not found")]
    MissingTemplate { path: String },

    #[error("failed to render template {name}: {message}")]
    Template { name: String, message: String },
}

//! pgcluster convergence engine
//!
//! Brings a PostgreSQL master/replica cluster running in Docker on remote
//! hosts to its declared state, and provides the operator commands layered on
//! the same primitives.
//!
//! The pipeline is explicit: [`Probe`](probe::Probe) reads one server's
//! remote state, the [`planner`] turns that state into an ordered list of
//! [`Action`]s, and [`actions::execute`] applies them one by one.
//! [`run_setup`] drives the pipeline over the whole cluster, master first.
//!
//! # Usage
//!
//! ```rust,no_run
//! use pgcluster_converge::{run_setup, HostRegistry, SetupOptions, SshOptions, Templates};
//! use pgcluster_converge::confirm::Prompt;
//!
//! # async fn example(cluster: &pgcluster_models::Cluster, prompt: &dyn Prompt) -> pgcluster_converge::Result<()> {
//! let hosts = HostRegistry::ssh(cluster, &SshOptions::default());
//! let templates = Templates::builtin()?;
//! let report = run_setup(cluster, &hosts, &templates, prompt, &SetupOptions::default()).await?;
//! if report.already_converged() {
//!     println!("nothing to do");
//! }
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod command;
pub mod confirm;
pub mod error;
pub mod operations;
pub mod orchestrations;
pub mod planner;
pub mod probe;
pub mod registry;
pub mod remote;
pub mod sql;
pub mod templates;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, Result};
pub use orchestrations::setup::{
    preview, run_setup, ConfigChangePolicy, ServerPlan, ServerReport, SetupOptions, SetupReport,
};
pub use registry::HostRegistry;
pub use remote::{RemoteExecutor, SshExecutor, SshOptions};
pub use templates::Templates;
pub use types::{Action, ContainerState, FirewallState, PostgresOwner, RemoteHostState};

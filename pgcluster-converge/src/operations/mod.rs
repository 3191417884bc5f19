//! Operator commands outside convergence
//!
//! Each operation works on the resolved [`Cluster`](pgcluster_models::Cluster)
//! through the same probe and command builders `setup` uses.

pub mod backup;
pub mod inspect;
pub mod interactive;
pub mod status;

pub use backup::{dump, restore, DUMP_DIR};
pub use inspect::{list_databases, list_roles, streaming_status, ReplicationReport};
pub use interactive::{interactive_argv, interactive_command, printable};
pub use status::{collect_status, ServerStatus};

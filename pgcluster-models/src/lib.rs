//! pgcluster models - declared and resolved cluster topology
//!
//! The declaration is what the operator writes (YAML); [`Cluster`] is what
//! every other component works with. [`ClusterDeclaration::resolve`] is the
//! only way to get from one to the other.

pub mod cluster;
pub mod declaration;
pub mod error;

pub use cluster::*;
pub use declaration::*;
pub use error::ConfigurationError;

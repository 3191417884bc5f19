//! Registry of remote executors, one per host
//!
//! Several servers may share a host; they share its executor.

use std::collections::BTreeMap;
use std::sync::Arc;

use pgcluster_models::{Cluster, ConfigurationError};

use crate::remote::{RemoteExecutor, SshExecutor, SshOptions};

#[derive(Clone, Default)]
pub struct HostRegistry {
    hosts: BTreeMap<String, Arc<dyn RemoteExecutor>>,
}

impl HostRegistry {
    pub fn builder() -> HostRegistryBuilder {
        HostRegistryBuilder::default()
    }

    /// One [`SshExecutor`] per distinct domain in the cluster
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use pgcluster_converge::registry::HostRegistry;
    /// use pgcluster_converge::remote::SshOptions;
    /// # fn example(cluster: &pgcluster_models::Cluster) {
    /// let hosts = HostRegistry::ssh(cluster, &SshOptions::default());
    /// # }
    /// ```
    pub fn ssh(cluster: &Cluster, options: &SshOptions) -> Self {
        cluster
            .servers()
            .iter()
            .fold(Self::builder(), |builder, server| {
                builder.register(SshExecutor::new(server.domain.clone(), options.clone()))
            })
            .build()
    }

    pub fn get(&self, domain: &str) -> Result<Arc<dyn RemoteExecutor>, ConfigurationError> {
        self.hosts
            .get(domain)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownDomain(domain.to_string()))
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }
}

#[derive(Default)]
pub struct HostRegistryBuilder {
    hosts: BTreeMap<String, Arc<dyn RemoteExecutor>>,
}

impl HostRegistryBuilder {
    /// Register an executor under its own host name; the first one wins
    pub fn register<E: RemoteExecutor + 'static>(self, executor: E) -> Self {
        self.register_shared(Arc::new(executor))
    }

    pub fn register_shared(mut self, executor: Arc<dyn RemoteExecutor>) -> Self {
        self.hosts
            .entry(executor.host().to_string())
            .or_insert(executor);
        self
    }

    pub fn build(self) -> HostRegistry {
        HostRegistry { hosts: self.hosts }
    }
}

//! Provisioning engine abstraction
//!
//! The lifecycle only needs three things from the engine: realize a spec,
//! hand out credentials, tear it down again. [`K3dProvisioner`] does this
//! with the k3d CLI.

mod k3d;
mod spec;

use std::net::TcpListener;

use async_trait::async_trait;
use kube::config::Kubeconfig;

#[cfg(test)]
use mockall::automock;

pub use k3d::K3dProvisioner;
pub use spec::{ClusterSpec, ExtraArg, RegistryPassthrough, DOCKER_HUB_URL, SERVER_NODE_FILTER};

use crate::error::Result;

/// A cluster the engine has brought up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealizedCluster {
    pub name: String,
    pub api_host_port: u16,
}

impl RealizedCluster {
    /// Handle for whatever the engine may have created for `spec`, used to
    /// clean up after a failed `run`
    pub fn from_spec(spec: &ClusterSpec) -> Self {
        Self {
            name: spec.name.clone(),
            api_host_port: spec.api_host_port,
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create the cluster and wait for the engine's own readiness signal
    async fn run(&self, spec: &ClusterSpec) -> Result<RealizedCluster>;

    /// Fetch the admin kubeconfig of a running cluster
    async fn kubeconfig(&self, cluster: &RealizedCluster) -> Result<Kubeconfig>;

    /// Remove the cluster and its containers
    async fn delete(&self, cluster: &RealizedCluster) -> Result<()>;
}

/// Ask the OS for a currently free TCP port.
///
/// The port is released before the engine binds it, so another process may
/// grab it in between. That window is accepted; the lifecycle reports the
/// resulting bind failure as [`crate::Error::PortAlreadyAllocated`].
pub fn free_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

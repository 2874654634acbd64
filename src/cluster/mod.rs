//! Test cluster lifecycle
//!
//! [`ClusterFactory::create`] provisions a cluster and returns a
//! [`ClusterHandle`] only after admin access, readiness and node health are
//! established. [`ClusterHandle::terminate`] consumes the handle, so a cluster
//! cannot be torn down twice. [`with_cluster`] scopes a cluster to a test body
//! and tears it down however the body ends.

mod lifecycle;

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use kube::config::Kubeconfig;
use tracing::{error, info, instrument};

pub use lifecycle::{reclassify_provisioning_error, ClusterFactory, Phase};

use crate::config::ClusterOpts;
use crate::error::Result;
use crate::health::{fetch_node_snapshot, NodeSnapshot};
use crate::k8s::{client_from_kubeconfig, ClusterApi, ManifestApplier, DEFAULT_NAMESPACE};
use crate::lookout::Lookout;
use crate::provisioner::{ClusterSpec, Provisioner, RealizedCluster};

/// File name used by [`ClusterHandle::write_kubeconfig`]
pub const KUBECONFIG_FILE: &str = "kubeconfig";

/// A running, healthy test cluster
pub struct ClusterHandle {
    name: String,
    spec: ClusterSpec,
    realized: RealizedCluster,
    kubeconfig: Kubeconfig,
    api: Arc<dyn ClusterApi>,
    admin_service_account: String,
    provisioner: Arc<dyn Provisioner>,
}

impl fmt::Debug for ClusterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterHandle")
            .field("name", &self.name)
            .field("api_host_port", &self.realized.api_host_port)
            .field("admin_service_account", &self.admin_service_account)
            .finish_non_exhaustive()
    }
}

impl ClusterHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The spec the cluster was provisioned from
    pub fn spec(&self) -> &ClusterSpec {
        &self.spec
    }

    /// Name of the cluster-admin service account created during bootstrap
    pub fn admin_service_account(&self) -> &str {
        &self.admin_service_account
    }

    /// Admin credentials as handed out by the engine
    pub fn kubeconfig(&self) -> &Kubeconfig {
        &self.kubeconfig
    }

    /// Authenticated API access. A handle only exists for initialized
    /// clusters, so this cannot fail.
    pub fn client_access(&self) -> Arc<dyn ClusterApi> {
        Arc::clone(&self.api)
    }

    /// Query entry point bound to this cluster
    pub fn lookout(&self) -> Lookout<'_> {
        Lookout::new(self.api.as_ref())
    }

    /// Current state of all nodes
    pub async fn node_snapshot(&self) -> Result<NodeSnapshot> {
        fetch_node_snapshot(self.api.as_ref()).await
    }

    /// Manifest applier for the default namespace, acting as `field_manager`
    pub async fn ctl_kube(&self, field_manager: &str) -> Result<ManifestApplier> {
        let client = client_from_kubeconfig(&self.kubeconfig).await?;
        Ok(ManifestApplier::new(client, field_manager, DEFAULT_NAMESPACE))
    }

    /// Write the kubeconfig to `dir` for manual inspection with kubectl
    pub async fn write_kubeconfig(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(KUBECONFIG_FILE);
        let yaml = serde_yaml::to_string(&self.kubeconfig)?;
        tokio::fs::write(&path, yaml).await?;
        info!(
            "To use the cluster with kubectl run: export KUBECONFIG={}",
            path.display()
        );
        Ok(path)
    }

    /// Delete the cluster and release its resources
    #[instrument(skip(self), fields(cluster = %self.name))]
    pub async fn terminate(self) -> Result<()> {
        info!("Terminating cluster");
        self.provisioner.delete(&self.realized).await
    }
}

/// Create a cluster, run `body` against it and terminate it afterwards, also
/// when `body` panics. The panic is resumed after teardown.
///
/// ```ignore
/// let pods = with_cluster(&mut factory, &ClusterOpts::default(), |cluster| {
///     Box::pin(async move { cluster.lookout().pods("default").list().count().await })
/// })
/// .await?;
/// ```
pub async fn with_cluster<T, F>(
    factory: &mut ClusterFactory,
    opts: &ClusterOpts,
    body: F,
) -> Result<T>
where
    F: for<'c> FnOnce(&'c ClusterHandle) -> BoxFuture<'c, T>,
{
    let cluster = factory.create(opts).await?;
    let outcome = AssertUnwindSafe(body(&cluster)).catch_unwind().await;
    let name = cluster.name.clone();
    let teardown = cluster.terminate().await;

    match outcome {
        Ok(value) => teardown.map(|_| value),
        Err(panic) => {
            if let Err(e) = teardown {
                error!(cluster = %name, "Failed to terminate cluster after panic: {}", e);
            }
            std::panic::resume_unwind(panic)
        }
    }
}

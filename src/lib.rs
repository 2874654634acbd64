//! testclusters
//!
//! Short-lived k3d clusters for integration tests. A cluster is created with
//! admin access, waited on until the control plane answers and checked for
//! node health before the test gets to see it; any failure on the way removes
//! what was provisioned.
//!
//! ```ignore
//! use testclusters::{with_cluster, ClusterFactory, ClusterOpts, DEFAULT_NAMESPACE};
//!
//! let mut factory = ClusterFactory::from_env()?;
//! with_cluster(&mut factory, &ClusterOpts::with_prefix("nginx"), |cluster| {
//!     Box::pin(async move {
//!         cluster
//!             .lookout()
//!             .pods(DEFAULT_NAMESPACE)
//!             .by_labels("app=nginx")
//!             .list()
//!             .expect_len(3)
//!             .await
//!     })
//! })
//! .await??;
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod health;
pub mod k8s;
pub mod logging;
pub mod lookout;
pub mod naming;
pub mod provisioner;
pub mod readiness;

pub use cluster::{with_cluster, ClusterFactory, ClusterHandle, Phase};
pub use config::{ClusterOpts, Config, LogLevel, K3S_VERSION_1_26, K3S_VERSION_1_28};
pub use error::{Error, Result};
pub use health::{check_condition, kubelet_eviction_fs_by_percentage, NodeSnapshot};
pub use k8s::{ApiConnector, ClusterApi, ManifestApplier, DEFAULT_NAMESPACE};
pub use lookout::{Lookout, PodSelector, Query, ResourceList};
pub use provisioner::{ClusterSpec, K3dProvisioner, Provisioner, RealizedCluster};
pub use readiness::{wait_until, RetryPolicy};

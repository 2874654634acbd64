//! Kubernetes integration for testclusters
//!
//! - typed API access behind the [`ClusterApi`] trait
//! - the admin service account bootstrap
//! - applying YAML manifests

mod apply;
mod client;
mod resources;

pub use apply::{parse_documents, ManifestApplier};
pub use client::{client_from_kubeconfig, ApiConnector, ClusterApi, KubeClusterApi, KubeConnector};
pub use resources::{
    admin_cluster_role, admin_cluster_role_binding, admin_service_account,
    admin_service_account_name, bootstrap_admin_access, creator_labels, APP_NAME, CREATOR_LABEL,
    DEFAULT_NAMESPACE,
};

#[cfg(test)]
pub(crate) use client::{MockApiConnector, MockClusterApi};

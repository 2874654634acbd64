//! Resource builders for the access-control bootstrap
//!
//! Every fresh cluster gets one service account bound to a cluster role that
//! may do everything. This is meant for test convenience, not as an example
//! of a sane production setup.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{info, instrument};

use super::client::ClusterApi;
use crate::error::{Error, Result};

/// Namespace used when a caller does not choose one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Application name written into the creator label
pub const APP_NAME: &str = "k8s-containers";

/// Label key marking objects created by testclusters
pub const CREATOR_LABEL: &str = "k3s.creator";

const ADMIN_SUFFIX: &str = "ford-prefect";

pub fn admin_service_account_name() -> String {
    format!("sa-{}", ADMIN_SUFFIX)
}

pub fn admin_cluster_role_name() -> String {
    format!("cr-{}", ADMIN_SUFFIX)
}

pub fn admin_cluster_role_binding_name() -> String {
    format!("crb-{}", ADMIN_SUFFIX)
}

/// Labels attached to every bootstrap object
pub fn creator_labels() -> BTreeMap<String, String> {
    [(CREATOR_LABEL.to_string(), APP_NAME.to_string())]
        .into_iter()
        .collect()
}

pub fn admin_service_account() -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(admin_service_account_name()),
            namespace: Some(DEFAULT_NAMESPACE.to_string()),
            labels: Some(creator_labels()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Cluster role allowing all verbs on all resources of all API groups
pub fn admin_cluster_role() -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(admin_cluster_role_name()),
            labels: Some(creator_labels()),
            ..Default::default()
        },
        rules: Some(vec![PolicyRule {
            verbs: vec!["*".to_string()],
            api_groups: Some(vec!["*".to_string()]),
            resources: Some(vec!["*".to_string()]),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

pub fn admin_cluster_role_binding(role_name: &str, service_account: &str) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(admin_cluster_role_binding_name()),
            labels: Some(creator_labels()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: role_name.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: service_account.to_string(),
            namespace: Some(DEFAULT_NAMESPACE.to_string()),
            ..Default::default()
        }]),
    }
}

/// Create the admin service account, its cluster role and the binding.
/// Returns the service account name.
#[instrument(skip(api))]
pub async fn bootstrap_admin_access(api: &dyn ClusterApi) -> Result<String> {
    let sa = api
        .create_service_account(DEFAULT_NAMESPACE, &admin_service_account())
        .await
        .map_err(|source| Error::AccessBootstrap {
            step: "create service account",
            source,
        })?;
    let sa_name = sa.metadata.name.unwrap_or_else(admin_service_account_name);

    let role = api
        .create_cluster_role(&admin_cluster_role())
        .await
        .map_err(|source| Error::AccessBootstrap {
            step: "create cluster role",
            source,
        })?;
    let role_name = role.metadata.name.unwrap_or_else(admin_cluster_role_name);

    api.create_cluster_role_binding(&admin_cluster_role_binding(&role_name, &sa_name))
        .await
        .map_err(|source| Error::AccessBootstrap {
            step: "create cluster role binding",
            source,
        })?;

    info!(service_account = %sa_name, "Bootstrapped admin access");
    Ok(sa_name)
}

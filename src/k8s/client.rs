//! Kubernetes API access for a test cluster
//!
//! [`ClusterApi`] is the narrow slice of the API the lifecycle and the
//! lookout need. [`KubeClusterApi`] implements it on top of `kube::Client`;
//! tests substitute fakes.

use std::sync::Arc;

use async_trait::async_trait;
use futures::AsyncReadExt;
use k8s_openapi::api::core::v1::{Event, Node, Pod, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::{
    api::{Api, ListParams, LogParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
use tracing::{debug, info, instrument};

#[cfg(test)]
use mockall::automock;

use crate::error::{Error, Result};

/// Typed access to the resources testclusters works with
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn list_nodes(&self) -> kube::Result<Vec<Node>>;

    async fn create_service_account(
        &self,
        namespace: &str,
        service_account: &ServiceAccount,
    ) -> kube::Result<ServiceAccount>;

    async fn get_service_account(&self, namespace: &str, name: &str)
        -> kube::Result<ServiceAccount>;

    async fn create_cluster_role(&self, role: &ClusterRole) -> kube::Result<ClusterRole>;

    async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> kube::Result<ClusterRoleBinding>;

    async fn list_pods(&self, namespace: &str, params: &ListParams) -> kube::Result<Vec<Pod>>;

    async fn list_events(&self, namespace: &str, params: &ListParams)
        -> kube::Result<Vec<Event>>;

    /// Complete log output of the pod's (only) container
    async fn pod_logs(&self, namespace: &str, name: &str) -> kube::Result<Vec<u8>>;
}

/// Turns a credential bundle into API access
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ApiConnector: Send + Sync {
    async fn connect(&self, kubeconfig: &Kubeconfig) -> Result<Arc<dyn ClusterApi>>;
}

/// Build a `kube::Client` for the given kubeconfig, using its current context
pub async fn client_from_kubeconfig(kubeconfig: &Kubeconfig) -> Result<Client> {
    let config = Config::from_custom_kubeconfig(kubeconfig.clone(), &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::ClientInit(format!("failed to get client config: {}", e)))?;

    Client::try_from(config)
        .map_err(|e| Error::ClientInit(format!("failed to create client: {}", e)))
}

/// Connector producing [`KubeClusterApi`] instances
#[derive(Debug, Clone, Default)]
pub struct KubeConnector;

#[async_trait]
impl ApiConnector for KubeConnector {
    #[instrument(skip_all)]
    async fn connect(&self, kubeconfig: &Kubeconfig) -> Result<Arc<dyn ClusterApi>> {
        let client = client_from_kubeconfig(kubeconfig).await?;
        info!("Created Kubernetes client for test cluster");
        Ok(Arc::new(KubeClusterApi::new(client)))
    }
}

/// Wrapper around kube::Client implementing [`ClusterApi`]
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get the inner kube Client
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_nodes(&self) -> kube::Result<Vec<Node>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        Ok(nodes.list(&ListParams::default()).await?.items)
    }

    #[instrument(
        skip(self, service_account),
        fields(name = %service_account.metadata.name.as_deref().unwrap_or("unknown"))
    )]
    async fn create_service_account(
        &self,
        namespace: &str,
        service_account: &ServiceAccount,
    ) -> kube::Result<ServiceAccount> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let created = api.create(&PostParams::default(), service_account).await?;
        info!("Created service account");
        Ok(created)
    }

    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> kube::Result<ServiceAccount> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        api.get(name).await
    }

    #[instrument(
        skip(self, role),
        fields(name = %role.metadata.name.as_deref().unwrap_or("unknown"))
    )]
    async fn create_cluster_role(&self, role: &ClusterRole) -> kube::Result<ClusterRole> {
        let api: Api<ClusterRole> = Api::all(self.client.clone());
        let created = api.create(&PostParams::default(), role).await?;
        info!("Created cluster role");
        Ok(created)
    }

    #[instrument(
        skip(self, binding),
        fields(name = %binding.metadata.name.as_deref().unwrap_or("unknown"))
    )]
    async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> kube::Result<ClusterRoleBinding> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        let created = api.create(&PostParams::default(), binding).await?;
        info!("Created cluster role binding");
        Ok(created)
    }

    async fn list_pods(&self, namespace: &str, params: &ListParams) -> kube::Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods.list(params).await?;
        debug!(namespace, count = list.items.len(), "Listed pods");
        Ok(list.items)
    }

    async fn list_events(
        &self,
        namespace: &str,
        params: &ListParams,
    ) -> kube::Result<Vec<Event>> {
        let events: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        Ok(events.list(params).await?.items)
    }

    async fn pod_logs(&self, namespace: &str, name: &str) -> kube::Result<Vec<u8>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let stream = pods.log_stream(name, &LogParams::default()).await?;
        futures::pin_mut!(stream);

        // Container output is not necessarily UTF-8
        let mut logs = Vec::new();
        stream
            .read_to_end(&mut logs)
            .await
            .map_err(kube::Error::ReadEvents)?;
        debug!(namespace, pod = name, bytes = logs.len(), "Read pod logs");
        Ok(logs)
    }
}

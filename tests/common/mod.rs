//! In-memory fakes of the testclusters collaborators

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Node, Pod, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::api::ListParams;
use kube::config::Kubeconfig;
use kube::core::ErrorResponse;
use serde_json::json;

use testclusters::{
    ApiConnector, ClusterApi, ClusterFactory, ClusterSpec, Config, Error, Provisioner,
    RealizedCluster, Result,
};

pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} from fake", reason),
        reason: reason.to_string(),
        code,
    })
}

pub fn node(name: &str, conditions: &[(&str, &str)]) -> Node {
    let conditions: Vec<_> = conditions
        .iter()
        .map(|(kind, status)| json!({ "type": kind, "status": status }))
        .collect();
    serde_json::from_value(json!({
        "metadata": { "name": name },
        "status": { "conditions": conditions },
    }))
    .unwrap()
}

pub fn healthy_node(name: &str) -> Node {
    node(
        name,
        &[
            ("Ready", "True"),
            ("MemoryPressure", "False"),
            ("DiskPressure", "False"),
            ("PIDPressure", "False"),
            ("NetworkUnavailable", "False"),
        ],
    )
}

pub fn pod(name: &str, labels: &[(&str, &str)], phase: &str) -> Pod {
    let labels: BTreeMap<_, _> = labels.iter().copied().collect();
    serde_json::from_value(json!({
        "metadata": { "name": name, "namespace": "default", "labels": labels },
        "status": { "phase": phase },
    }))
    .unwrap()
}

pub fn pod_event(pod: &str, reason: &str) -> Event {
    serde_json::from_value(json!({
        "metadata": {
            "name": format!("{}.{}", pod, reason.to_lowercase()),
            "namespace": "default",
        },
        "involvedObject": { "kind": "Pod", "name": pod, "namespace": "default" },
        "reason": reason,
    }))
    .unwrap()
}

/// Equality-only selector matching, enough for `a=b,c=d`
fn matches_selector(selector: Option<&str>, lookup: impl Fn(&str) -> Option<String>) -> bool {
    selector
        .map(|s| {
            s.split(',').all(|term| match term.split_once('=') {
                Some((key, value)) => lookup(key).as_deref() == Some(value),
                None => false,
            })
        })
        .unwrap_or(true)
}

/// Cluster state kept in memory
#[derive(Default)]
pub struct FakeApi {
    pub nodes: Mutex<Vec<Node>>,
    pub pods: Mutex<Vec<Pod>>,
    pub events: Mutex<Vec<Event>>,
    pub logs: Mutex<BTreeMap<String, Vec<u8>>>,
    pub service_accounts: Mutex<Vec<String>>,
    /// Service account reads answered with 404 before the accounts show up
    pub unready_reads: AtomicU32,
    /// Fail the cluster role creation with this status code
    pub reject_cluster_role: Mutex<Option<u16>>,
    pub list_calls: AtomicU32,
}

impl FakeApi {
    pub fn healthy() -> Self {
        let api = Self::default();
        *api.nodes.lock().unwrap() = vec![healthy_node("k3d-server-0")];
        api
    }
}

#[async_trait]
impl ClusterApi for FakeApi {
    async fn list_nodes(&self) -> kube::Result<Vec<Node>> {
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn create_service_account(
        &self,
        _namespace: &str,
        service_account: &ServiceAccount,
    ) -> kube::Result<ServiceAccount> {
        let name = service_account.metadata.name.clone().unwrap_or_default();
        self.service_accounts.lock().unwrap().push(name);
        Ok(service_account.clone())
    }

    async fn get_service_account(
        &self,
        _namespace: &str,
        name: &str,
    ) -> kube::Result<ServiceAccount> {
        let pending = self.unready_reads.load(Ordering::SeqCst);
        if pending > 0 {
            self.unready_reads.store(pending - 1, Ordering::SeqCst);
            return Err(api_error(404, "NotFound"));
        }
        let known = name == "default"
            || self.service_accounts.lock().unwrap().iter().any(|sa| sa == name);
        if known {
            Ok(ServiceAccount::default())
        } else {
            Err(api_error(404, "NotFound"))
        }
    }

    async fn create_cluster_role(&self, role: &ClusterRole) -> kube::Result<ClusterRole> {
        match *self.reject_cluster_role.lock().unwrap() {
            Some(code) => Err(api_error(code, "Forbidden")),
            None => Ok(role.clone()),
        }
    }

    async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> kube::Result<ClusterRoleBinding> {
        Ok(binding.clone())
    }

    async fn list_pods(&self, _namespace: &str, params: &ListParams) -> kube::Result<Vec<Pod>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let pods = self.pods.lock().unwrap();
        Ok(pods
            .iter()
            .filter(|pod| {
                matches_selector(params.label_selector.as_deref(), |key| {
                    pod.metadata.labels.as_ref().and_then(|l| l.get(key).cloned())
                })
            })
            .filter(|pod| {
                matches_selector(params.field_selector.as_deref(), |key| match key {
                    "metadata.name" => pod.metadata.name.clone(),
                    "status.phase" => pod.status.as_ref().and_then(|s| s.phase.clone()),
                    _ => None,
                })
            })
            .cloned()
            .collect())
    }

    async fn list_events(&self, _namespace: &str, params: &ListParams) -> kube::Result<Vec<Event>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let events = self.events.lock().unwrap();
        Ok(events
            .iter()
            .filter(|event| {
                matches_selector(params.field_selector.as_deref(), |key| match key {
                    "involvedObject.kind" => event.involved_object.kind.clone(),
                    "involvedObject.name" => event.involved_object.name.clone(),
                    _ => None,
                })
            })
            .cloned()
            .collect())
    }

    async fn pod_logs(&self, _namespace: &str, name: &str) -> kube::Result<Vec<u8>> {
        self.logs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| api_error(404, "NotFound"))
    }
}

pub struct FakeConnector {
    pub api: Arc<FakeApi>,
}

#[async_trait]
impl ApiConnector for FakeConnector {
    async fn connect(&self, _kubeconfig: &Kubeconfig) -> Result<Arc<dyn ClusterApi>> {
        Ok(self.api.clone())
    }
}

/// Records engine calls and fails where told to
#[derive(Default)]
pub struct FakeProvisioner {
    pub calls: Mutex<Vec<String>>,
    pub run_error: Mutex<Option<String>>,
    pub fail_delete: bool,
    pub specs: Mutex<Vec<ClusterSpec>>,
}

impl FakeProvisioner {
    pub fn failing_run(stderr: &str) -> Self {
        let provisioner = Self::default();
        *provisioner.run_error.lock().unwrap() = Some(stderr.to_string());
        provisioner
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str, cluster: &str) {
        self.calls.lock().unwrap().push(format!("{} {}", call, cluster));
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn run(&self, spec: &ClusterSpec) -> Result<RealizedCluster> {
        self.record("run", &spec.name);
        self.specs.lock().unwrap().push(spec.clone());
        if let Some(stderr) = self.run_error.lock().unwrap().clone() {
            return Err(Error::provisioning("cluster create", stderr));
        }
        Ok(RealizedCluster::from_spec(spec))
    }

    async fn kubeconfig(&self, cluster: &RealizedCluster) -> Result<Kubeconfig> {
        self.record("kubeconfig", &cluster.name);
        Ok(Kubeconfig::default())
    }

    async fn delete(&self, cluster: &RealizedCluster) -> Result<()> {
        self.record("delete", &cluster.name);
        if self.fail_delete {
            Err(Error::termination(&cluster.name, "container runtime went away"))
        } else {
            Ok(())
        }
    }
}

pub fn fast_config() -> Config {
    Config {
        readiness_steps: 5,
        readiness_interval_ms: 1,
        readiness_jitter: 0.0,
        seed: Some(1234),
        ..Default::default()
    }
}

pub fn factory(provisioner: Arc<FakeProvisioner>, api: Arc<FakeApi>) -> ClusterFactory {
    ClusterFactory::new(fast_config(), provisioner, Arc::new(FakeConnector { api }))
}

//! Cluster creation with rollback
//!
//! Creation walks through
//! `Uncreated → Provisioning → CredentialsFetched → AccessBootstrapped →
//! AwaitingReadiness → HealthVerified`. Any failure after the engine was
//! asked to provision ends in `FailedRollback`: the cluster is deleted (best
//! effort) and the original error is returned. A handle only exists once
//! every step succeeded.

use std::sync::Arc;

use kube::config::Kubeconfig;
use rand::rngs::StdRng;
use rand::SeedableRng;
use strum::Display;
use tracing::{debug, error, info, instrument, warn};

use super::ClusterHandle;
use crate::config::{ClusterOpts, Config};
use crate::error::{Error, Result};
use crate::health::{check_condition, fetch_node_snapshot};
use crate::k8s::{
    bootstrap_admin_access, ApiConnector, ClusterApi, KubeConnector, DEFAULT_NAMESPACE,
};
use crate::logging;
use crate::naming;
use crate::provisioner::{free_port, ClusterSpec, K3dProvisioner, Provisioner, RealizedCluster};
use crate::readiness::{self, RetryPolicy};

/// Marker the container runtime puts into bind failures
const PORT_ALLOCATED_MARKER: &str = "port is already allocated";

/// Service account the control plane creates in every namespace
const DEFAULT_SERVICE_ACCOUNT: &str = "default";

/// Precondition name reported when the service accounts never show up
const SERVICE_ACCOUNTS_READY: &str = "default and bootstrap service accounts";

/// Creation phases, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Phase {
    Uncreated,
    Provisioning,
    CredentialsFetched,
    AccessBootstrapped,
    AwaitingReadiness,
    HealthVerified,
    FailedRollback,
}

/// Creates test clusters.
///
/// Holds the collaborators and the random source for name generation, so
/// nothing process-global is involved. Seed it through [`Config::seed`] for
/// reproducible names.
pub struct ClusterFactory {
    config: Config,
    provisioner: Arc<dyn Provisioner>,
    connector: Arc<dyn ApiConnector>,
    rng: StdRng,
    port_allocator: fn() -> Result<u16>,
}

impl ClusterFactory {
    pub fn new(
        config: Config,
        provisioner: Arc<dyn Provisioner>,
        connector: Arc<dyn ApiConnector>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            provisioner,
            connector,
            rng,
            port_allocator: free_port,
        }
    }

    /// Factory backed by the k3d CLI and a real Kubernetes client
    pub fn k3d(config: Config) -> Self {
        let provisioner = Arc::new(K3dProvisioner::from_config(&config));
        Self::new(config, provisioner, Arc::new(KubeConnector))
    }

    /// [`ClusterFactory::k3d`] with configuration from the environment
    pub fn from_env() -> Result<Self> {
        Ok(Self::k3d(Config::load()?))
    }

    /// Replace the OS port lookup
    pub fn with_port_allocator(mut self, allocator: fn() -> Result<u16>) -> Self {
        self.port_allocator = allocator;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create a cluster and wait until it is usable.
    ///
    /// Errors are final for this attempt: whatever was provisioned has been
    /// removed already. Callers usually fail the test on error.
    #[instrument(skip(self, opts), fields(prefix = %opts.cluster_name_prefix))]
    pub async fn create(&mut self, opts: &ClusterOpts) -> Result<ClusterHandle> {
        logging::init(opts.log_level);
        info!("Creating cluster");

        let prefix = naming::validate_prefix(&opts.cluster_name_prefix, &mut self.rng)
            .inspect_err(|e| error!("Invalid cluster name prefix found: {}", e))?;
        let name = naming::cluster_name(&prefix, &mut self.rng);

        let spec = ClusterSpec::build(&name, &self.config, opts, self.port_allocator)
            .map_err(|e| match e {
                Error::Io(io) => Error::provisioning("allocate port", io.to_string()),
                other => other,
            })?;

        let mut phase = Phase::Uncreated;
        advance(&mut phase, Phase::Provisioning, &name);

        let realized = match self.provisioner.run(&spec).await {
            Ok(realized) => realized,
            Err(err) => {
                let err = reclassify_provisioning_error(err, spec.api_host_port);
                return Err(self
                    .rollback(&RealizedCluster::from_spec(&spec), phase, err)
                    .await);
            }
        };

        match self.initialize(&spec, &realized, opts, &mut phase).await {
            Ok(handle) => {
                info!(cluster = %name, "Cluster was successfully created");
                Ok(handle)
            }
            Err(err) => Err(self.rollback(&realized, phase, err).await),
        }
    }

    async fn initialize(
        &self,
        spec: &ClusterSpec,
        realized: &RealizedCluster,
        opts: &ClusterOpts,
        phase: &mut Phase,
    ) -> Result<ClusterHandle> {
        let kubeconfig = self.provisioner.kubeconfig(realized).await?;
        advance(phase, Phase::CredentialsFetched, &realized.name);

        let api = self.connect(&kubeconfig).await?;
        let admin_service_account = bootstrap_admin_access(api.as_ref()).await?;
        advance(phase, Phase::AccessBootstrapped, &realized.name);

        advance(phase, Phase::AwaitingReadiness, &realized.name);
        wait_for_service_accounts(
            api.as_ref(),
            &admin_service_account,
            &self.config.readiness_policy(),
        )
        .await?;

        if opts.skip_node_health_check {
            debug!("Skipping health check of all nodes");
        } else {
            let snapshot = fetch_node_snapshot(api.as_ref()).await?;
            check_condition(&snapshot)?;
            debug!("Node looks healthy for nodes {}", snapshot);
        }
        advance(phase, Phase::HealthVerified, &realized.name);

        Ok(ClusterHandle {
            name: realized.name.clone(),
            spec: spec.clone(),
            realized: realized.clone(),
            kubeconfig,
            api,
            admin_service_account,
            provisioner: Arc::clone(&self.provisioner),
        })
    }

    async fn connect(&self, kubeconfig: &Kubeconfig) -> Result<Arc<dyn ClusterApi>> {
        self.connector.connect(kubeconfig).await.map_err(|e| match e {
            Error::ClientInit(_) => e,
            other => Error::ClientInit(other.to_string()),
        })
    }

    /// Delete what may have been provisioned and hand back the causal error.
    /// A failing delete is only logged.
    async fn rollback(&self, cluster: &RealizedCluster, failed_in: Phase, err: Error) -> Error {
        warn!(
            cluster = %cluster.name,
            failed_in = %failed_in,
            phase = %Phase::FailedRollback,
            error = %err,
            "Cluster creation failed, removing the cluster"
        );

        if let Err(rollback_err) = self.provisioner.delete(cluster).await {
            error!(
                cluster = %cluster.name,
                "Another error '{}' occurred while terminating the cluster due to the \
                 original error (you may want to clean up the container landscape): {}",
                rollback_err,
                err
            );
        }
        err
    }
}

fn advance(phase: &mut Phase, next: Phase, cluster: &str) {
    debug!(cluster, from = %phase, to = %next, "Cluster phase changed");
    *phase = next;
}

/// Give bind failures on the exposed API port an actionable error
pub fn reclassify_provisioning_error(err: Error, api_host_port: u16) -> Error {
    match err {
        Error::Provisioning { message, .. } if message.contains(PORT_ALLOCATED_MARKER) => {
            error!(
                port = api_host_port,
                "Port is already allocated. Was another test cluster not properly cleaned up?"
            );
            Error::PortAlreadyAllocated {
                port: api_host_port,
                message,
            }
        }
        other => other,
    }
}

/// Poll until both the namespace's default service account (created by the
/// control plane) and the bootstrap service account can be read
async fn wait_for_service_accounts(
    api: &dyn ClusterApi,
    admin_service_account: &str,
    policy: &RetryPolicy,
) -> Result<()> {
    readiness::wait_until(
        SERVICE_ACCOUNTS_READY,
        policy,
        readiness::classify,
        move || async move {
            api.get_service_account(DEFAULT_NAMESPACE, DEFAULT_SERVICE_ACCOUNT)
                .await?;
            api.get_service_account(DEFAULT_NAMESPACE, admin_service_account)
                .await?;
            debug!("Found default and bootstrap service accounts");
            Ok(())
        },
    )
    .await
}

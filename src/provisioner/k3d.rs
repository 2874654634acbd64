//! k3d-backed provisioner driving the `k3d` CLI

use std::io::Write;
use std::process::Stdio;

use async_trait::async_trait;
use kube::config::Kubeconfig;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};

use super::{ClusterSpec, Provisioner, RealizedCluster};
use crate::config::Config;
use crate::error::{Error, Result};

/// Output of a finished k3d invocation
#[derive(Debug)]
struct K3dOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Client for the k3d CLI
#[derive(Debug, Clone)]
pub struct K3dProvisioner {
    binary: String,
    docker_host: Option<String>,
}

impl K3dProvisioner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            docker_host: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            binary: config.k3d_binary.clone(),
            docker_host: config.docker_host.clone(),
        }
    }

    /// Talk to a specific container runtime socket
    pub fn with_docker_host(mut self, docker_host: impl Into<String>) -> Self {
        self.docker_host = Some(docker_host.into());
        self
    }

    async fn k3d(&self, args: &[&str]) -> std::io::Result<K3dOutput> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).kill_on_drop(true);
        if let Some(host) = &self.docker_host {
            cmd.env("DOCKER_HOST", host);
        }

        debug!(binary = %self.binary, ?args, "Running k3d");
        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Ok(K3dOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Write the rendered config to a temp file that is removed on drop
    fn config_file(spec: &ClusterSpec, yaml: &str) -> std::io::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("testclusters-{}-", spec.name))
            .suffix(".yaml")
            .tempfile()?;
        file.write_all(yaml.as_bytes())?;
        file.flush()?;
        Ok(file)
    }
}

#[async_trait]
impl Provisioner for K3dProvisioner {
    #[instrument(skip(self, spec), fields(cluster = %spec.name))]
    async fn run(&self, spec: &ClusterSpec) -> Result<RealizedCluster> {
        let yaml = spec.to_k3d_yaml()?;
        debug!("===== used cluster config =====\n{}===== =====", yaml);

        let config_file = Self::config_file(spec, &yaml)
            .map_err(|e| Error::provisioning("write cluster config", e.to_string()))?;

        let config_arg = config_file.path().to_string_lossy().to_string();
        let output = self
            .k3d(&["cluster", "create", "--config", &config_arg])
            .await
            .map_err(|e| Error::provisioning("cluster create", e.to_string()))?;

        if let Err(e) = config_file.close() {
            warn!("Failed to remove cluster config: {}", e);
        }

        if !output.success {
            error!("k3d cluster create failed: {}", output.stderr);
            return Err(Error::provisioning("cluster create", output.stderr));
        }

        info!("k3d cluster created");
        Ok(RealizedCluster {
            name: spec.name.clone(),
            api_host_port: spec.api_host_port,
        })
    }

    #[instrument(skip(self), fields(cluster = %cluster.name))]
    async fn kubeconfig(&self, cluster: &RealizedCluster) -> Result<Kubeconfig> {
        let credential_error = |message: String| Error::CredentialRetrieval {
            cluster: cluster.name.clone(),
            message,
        };

        let output = self
            .k3d(&["kubeconfig", "get", &cluster.name])
            .await
            .map_err(|e| credential_error(e.to_string()))?;
        if !output.success {
            return Err(credential_error(output.stderr));
        }

        Kubeconfig::from_yaml(&output.stdout).map_err(|e| credential_error(e.to_string()))
    }

    #[instrument(skip(self), fields(cluster = %cluster.name))]
    async fn delete(&self, cluster: &RealizedCluster) -> Result<()> {
        let output = self
            .k3d(&["cluster", "delete", &cluster.name])
            .await
            .map_err(|e| Error::termination(&cluster.name, e.to_string()))?;

        if output.success {
            info!("k3d cluster deleted");
            Ok(())
        } else {
            error!("k3d cluster delete failed: {}", output.stderr);
            Err(Error::termination(&cluster.name, output.stderr))
        }
    }
}

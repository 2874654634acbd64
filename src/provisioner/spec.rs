//! Declarative cluster specification and its k3d rendering

use std::time::Duration;

use serde::Serialize;

use crate::config::{ClusterOpts, Config};
use crate::error::Result;

/// Node filter addressing every server node
pub const SERVER_NODE_FILTER: &str = "server:*";

/// Upstream registry proxied by the per-cluster registry
pub const DOCKER_HUB_URL: &str = "https://registry-1.docker.io";

/// Port the registry listens on inside the cluster network
pub const REGISTRY_CONTAINER_PORT: u16 = 5000;

/// Extra k3s argument and the nodes it applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraArg {
    pub arg: String,
    pub node_filters: Vec<String>,
}

/// Pull-through registry created alongside the cluster, so images under test
/// that were never published can be pushed and used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryPassthrough {
    pub name: String,
    pub host_port: u16,
    pub remote_url: String,
}

impl RegistryPassthrough {
    /// Registries config handed to k3s: pull docker.io through the registry
    pub fn mirrors_config(&self) -> String {
        format!(
            "mirrors:\n  \"docker.io\":\n    endpoint:\n      - http://k3d-{}:{}\n",
            self.name, REGISTRY_CONTAINER_PORT
        )
    }
}

/// Everything the provisioning engine needs to realize a cluster. Immutable
/// once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSpec {
    pub name: String,
    pub image: String,
    pub servers: u32,
    pub agents: u32,
    pub wait: bool,
    pub timeout: Duration,
    pub extra_args: Vec<ExtraArg>,
    pub registry: Option<RegistryPassthrough>,
    pub api_host_port: u16,
}

impl ClusterSpec {
    /// Spec for a single-server cluster. Ports come from `alloc_port`, which is
    /// [`super::free_port`] outside of tests.
    pub fn build<P>(
        name: &str,
        config: &Config,
        opts: &ClusterOpts,
        mut alloc_port: P,
    ) -> Result<Self>
    where
        P: FnMut() -> Result<u16>,
    {
        let api_host_port = alloc_port()?;

        let mut extra_args = Vec::new();
        if !opts.node_condition_eviction_hard_arg.is_empty() {
            extra_args.push(ExtraArg {
                arg: format!(
                    "--kubelet-arg=eviction-hard={}",
                    opts.node_condition_eviction_hard_arg
                ),
                node_filters: vec![SERVER_NODE_FILTER.to_string()],
            });
        }

        let registry = if config.registry_passthrough {
            Some(RegistryPassthrough {
                name: format!("{}-registry", name),
                host_port: alloc_port()?,
                remote_url: DOCKER_HUB_URL.to_string(),
            })
        } else {
            None
        };

        Ok(Self {
            name: name.to_string(),
            image: config.image.clone(),
            servers: 1,
            agents: 0,
            wait: true,
            timeout: config.provision_timeout(),
            extra_args,
            registry,
            api_host_port,
        })
    }

    /// Render as a k3d `Simple` config document
    pub fn to_k3d_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&SimpleConfig::from(self))?)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimpleConfig {
    api_version: &'static str,
    kind: &'static str,
    metadata: SimpleMetadata,
    servers: u32,
    agents: u32,
    #[serde(rename = "kubeAPI")]
    kube_api: SimpleKubeApi,
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    registries: Option<SimpleRegistries>,
    options: SimpleOptions,
}

#[derive(Debug, Serialize)]
struct SimpleMetadata {
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimpleKubeApi {
    host_ip: &'static str,
    host_port: String,
}

#[derive(Debug, Serialize)]
struct SimpleRegistries {
    create: SimpleRegistryCreate,
    config: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimpleRegistryCreate {
    name: String,
    host_port: String,
    proxy: SimpleRegistryProxy,
}

#[derive(Debug, Serialize)]
struct SimpleRegistryProxy {
    #[serde(rename = "remoteURL")]
    remote_url: String,
}

#[derive(Debug, Serialize)]
struct SimpleOptions {
    k3d: SimpleK3dOptions,
    k3s: SimpleK3sOptions,
}

#[derive(Debug, Serialize)]
struct SimpleK3dOptions {
    wait: bool,
    timeout: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimpleK3sOptions {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    extra_args: Vec<SimpleExtraArg>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimpleExtraArg {
    arg: String,
    node_filters: Vec<String>,
}

impl From<&ClusterSpec> for SimpleConfig {
    fn from(spec: &ClusterSpec) -> Self {
        Self {
            api_version: "k3d.io/v1alpha5",
            kind: "Simple",
            metadata: SimpleMetadata {
                name: spec.name.clone(),
            },
            servers: spec.servers,
            agents: spec.agents,
            kube_api: SimpleKubeApi {
                host_ip: "127.0.0.1",
                host_port: spec.api_host_port.to_string(),
            },
            image: spec.image.clone(),
            registries: spec.registry.as_ref().map(|r| SimpleRegistries {
                create: SimpleRegistryCreate {
                    name: r.name.clone(),
                    host_port: r.host_port.to_string(),
                    proxy: SimpleRegistryProxy {
                        remote_url: r.remote_url.clone(),
                    },
                },
                config: r.mirrors_config(),
            }),
            options: SimpleOptions {
                k3d: SimpleK3dOptions {
                    wait: spec.wait,
                    timeout: format!("{}s", spec.timeout.as_secs()),
                },
                k3s: SimpleK3sOptions {
                    extra_args: spec
                        .extra_args
                        .iter()
                        .map(|a| SimpleExtraArg {
                            arg: a.arg.clone(),
                            node_filters: a.node_filters.clone(),
                        })
                        .collect(),
                },
            },
        }
    }
}

//! Configuration for testclusters
//!
//! Two layers: [`Config`] holds environment-wide settings (which k3d binary,
//! which image, how patient the readiness probe is) and is loaded from
//! `TESTCLUSTERS_*` environment variables. [`ClusterOpts`] is what a single
//! test passes when it asks for a cluster.

use std::time::Duration;

use serde::Deserialize;
use strum::{Display, EnumString};

use crate::error::Result;
use crate::readiness::RetryPolicy;

/// k3s image tags. k3s versions are tagged with a `+` before `k3s1`, the
/// images use `-`.
pub const K3S_VERSION_1_26: &str = "v1.26.2-k3s1";
pub const K3S_VERSION_1_28: &str = "v1.28.2-k3s1";

/// Image repository k3d pulls k3s from
pub const K3S_IMAGE_REPO: &str = "rancher/k3s";

/// Verbosity of testclusters' own log output. The provisioning engine's
/// verbosity is not affected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Display, EnumString)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
        }
    }
}

/// Options for one cluster
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterOpts {
    /// Used to name the cluster so developers can find it among others.
    /// Empty means a random suffix is generated.
    pub cluster_name_prefix: String,
    pub log_level: LogLevel,
    /// Value of the kubelet `eviction-hard` argument. Empty leaves it unset.
    /// See [`crate::health::kubelet_eviction_fs_by_percentage`].
    pub node_condition_eviction_hard_arg: String,
    /// Skip the node condition check after startup
    pub skip_node_health_check: bool,
}

impl ClusterOpts {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            cluster_name_prefix: prefix.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_k3d_binary")]
    pub k3d_binary: String,

    /// Container runtime socket handed to k3d as `DOCKER_HOST`
    #[serde(default)]
    pub docker_host: Option<String>,

    #[serde(default = "default_image")]
    pub image: String,

    /// Seconds k3d waits for the server node
    #[serde(default = "default_provision_timeout_secs")]
    pub provision_timeout_secs: u64,

    #[serde(default = "default_registry_passthrough")]
    pub registry_passthrough: bool,

    #[serde(default = "default_readiness_steps")]
    pub readiness_steps: u32,

    #[serde(default = "default_readiness_interval_ms")]
    pub readiness_interval_ms: u64,

    #[serde(default = "default_readiness_jitter")]
    pub readiness_jitter: f64,

    /// Seed for name generation; random when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_k3d_binary() -> String {
    "k3d".to_string()
}

fn default_image() -> String {
    format!("{}:{}", K3S_IMAGE_REPO, K3S_VERSION_1_28)
}

fn default_provision_timeout_secs() -> u64 {
    60
}

fn default_registry_passthrough() -> bool {
    true
}

fn default_readiness_steps() -> u32 {
    20
}

fn default_readiness_interval_ms() -> u64 {
    500
}

fn default_readiness_jitter() -> f64 {
    0.1
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("TESTCLUSTERS").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn readiness_policy(&self) -> RetryPolicy {
        RetryPolicy {
            steps: self.readiness_steps,
            interval: Duration::from_millis(self.readiness_interval_ms),
            jitter: crate::readiness::clamp_jitter(self.readiness_jitter),
        }
    }

    pub fn provision_timeout(&self) -> Duration {
        Duration::from_secs(self.provision_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            k3d_binary: default_k3d_binary(),
            docker_host: None,
            image: default_image(),
            provision_timeout_secs: default_provision_timeout_secs(),
            registry_passthrough: default_registry_passthrough(),
            readiness_steps: default_readiness_steps(),
            readiness_interval_ms: default_readiness_interval_ms(),
            readiness_jitter: default_readiness_jitter(),
            seed: None,
        }
    }
}

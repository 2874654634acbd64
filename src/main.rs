use std::path::PathBuf;

use anyhow::{Context, Result};

use testclusters::{ClusterFactory, ClusterOpts, Config, LogLevel};

/// Bring up a cluster for manual debugging and keep it until Ctrl-C
#[tokio::main]
async fn main() -> Result<()> {
    let prefix = std::env::args().nth(1).unwrap_or_default();

    let config = Config::load().context("Failed to load configuration")?;
    let mut factory = ClusterFactory::k3d(config);

    let opts = ClusterOpts {
        log_level: LogLevel::Info,
        ..ClusterOpts::with_prefix(prefix)
    };
    let cluster = factory.create(&opts).await.context("Failed to create cluster")?;

    let dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let path = cluster.write_kubeconfig(&dir).await?;
    tracing::info!(
        cluster = %cluster.name(),
        kubeconfig = %path.display(),
        "Cluster is up, press Ctrl-C to terminate"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    cluster.terminate().await?;
    Ok(())
}

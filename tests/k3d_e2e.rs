//! End-to-end test against a real k3d cluster
//!
//! Needs docker and the k3d binary. Run with `cargo test -- --ignored`.

use std::time::Duration;

use anyhow::Result;

use testclusters::{
    readiness, with_cluster, ClusterFactory, ClusterOpts, LogLevel, RetryPolicy,
    DEFAULT_NAMESPACE,
};

const NGINX_DEPLOYMENT: &[u8] = include_bytes!("testdata/simple_nginx_deployment.yaml");
const ECHO_POD: &[u8] = include_bytes!("testdata/simple_echo_pod.yaml");

#[tokio::test]
#[ignore = "requires docker and k3d"]
async fn test_deploy_and_look_out() -> Result<()> {
    let mut factory = ClusterFactory::from_env()?;
    let opts = ClusterOpts {
        log_level: LogLevel::Debug,
        ..ClusterOpts::with_prefix("e2e")
    };

    with_cluster(&mut factory, &opts, |cluster| {
        Box::pin(async move {
            let dir = std::env::temp_dir();
            cluster.write_kubeconfig(&dir).await?;

            let kubectl = cluster.ctl_kube("test_deploy_and_look_out").await?;
            kubectl.apply(NGINX_DEPLOYMENT).await?;
            kubectl.apply(ECHO_POD).await?;

            let lookout = cluster.lookout();
            let pods = lookout
                .pods(DEFAULT_NAMESPACE)
                .by_labels("app=nginx")
                .by_field_selector("status.phase=Running")
                .list();

            let policy = RetryPolicy::new(60, Duration::from_secs(1));
            readiness::wait_until("three running nginx pods", &policy, readiness::classify, || {
                pods.expect_len(3)
            })
            .await?;

            let running = pods.raw().await?;
            let first = running[0].metadata.name.clone().unwrap_or_default();
            let events = lookout.pod(DEFAULT_NAMESPACE, &first).events().await?;
            assert!(!events.is_empty(), "expected scheduling events for {}", first);

            let echo_done = lookout
                .pods(DEFAULT_NAMESPACE)
                .by_field_selector("metadata.name=echo-pod")
                .by_field_selector("status.phase=Succeeded")
                .list();
            readiness::wait_until("echo pod completion", &policy, readiness::classify, || {
                echo_done.expect_len(1)
            })
            .await?;

            let logs = lookout.pod(DEFAULT_NAMESPACE, "echo-pod").logs().await?;
            assert_eq!(logs, b"hello world\n");

            Ok::<_, testclusters::Error>(())
        })
    })
    .await??;

    Ok(())
}

//! Tests for the Lookout query layer
//!
//! Queries run against an in-memory cluster so that laziness and filter
//! accumulation can be observed directly.

mod common;

use std::sync::atomic::Ordering;

use tokio_test::assert_ok;

use common::{pod, pod_event, FakeApi};
use testclusters::{Error, Lookout, DEFAULT_NAMESPACE};

fn cluster_with_pods() -> FakeApi {
    let api = FakeApi::default();
    *api.pods.lock().unwrap() = vec![
        pod("nginx-1", &[("app", "nginx")], "Running"),
        pod("nginx-2", &[("app", "nginx")], "Running"),
        pod("nginx-3", &[("app", "nginx")], "Pending"),
        pod("echo-pod", &[("app", "echo")], "Succeeded"),
    ];
    api
}

#[tokio::test]
async fn test_building_queries_sends_nothing() {
    let api = cluster_with_pods();
    let lookout = Lookout::new(&api);

    let list = lookout
        .pods(DEFAULT_NAMESPACE)
        .by_labels("app=nginx")
        .by_field_selector("status.phase=Running")
        .list();
    let _selector = lookout.pod(DEFAULT_NAMESPACE, "nginx-1");

    assert_eq!(list.query().label_selector().as_deref(), Some("app=nginx"));
    assert_eq!(api.list_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_labels_and_fields_combine() {
    let api = cluster_with_pods();
    let lookout = Lookout::new(&api);

    let running_nginx = lookout
        .pods(DEFAULT_NAMESPACE)
        .by_labels("app=nginx")
        .by_field_selector("status.phase=Running")
        .list();

    assert_ok!(running_nginx.expect_len(2).await);
    assert_eq!(lookout.pods(DEFAULT_NAMESPACE).list().count().await.unwrap(), 4);
}

#[tokio::test]
async fn test_every_terminal_call_sees_fresh_state() {
    let api = cluster_with_pods();
    let lookout = Lookout::new(&api);
    let nginx = lookout.pods(DEFAULT_NAMESPACE).by_labels("app=nginx").list();

    assert_eq!(nginx.count().await.unwrap(), 3);
    api.pods
        .lock()
        .unwrap()
        .push(pod("nginx-4", &[("app", "nginx")], "Running"));
    assert_eq!(nginx.count().await.unwrap(), 4);
    assert_eq!(api.list_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_length_mismatch_reports_both_counts() {
    let api = cluster_with_pods();
    let list = Lookout::new(&api)
        .pods(DEFAULT_NAMESPACE)
        .by_labels("app=nginx")
        .list();

    match list.expect_len(5).await {
        Err(Error::CountMismatch {
            expected, actual, ..
        }) => {
            assert_eq!(expected, 5);
            assert_eq!(actual, 3);
        }
        other => panic!("expected count mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_raw_returns_matching_objects() {
    let api = cluster_with_pods();
    let pods = Lookout::new(&api)
        .pods(DEFAULT_NAMESPACE)
        .by_labels("app=echo")
        .list()
        .raw()
        .await
        .unwrap();

    assert_eq!(pods.len(), 1);
    assert_eq!(pods[0].metadata.name.as_deref(), Some("echo-pod"));
}

#[tokio::test]
async fn test_pod_logs_are_raw_bytes() {
    let api = cluster_with_pods();
    api.logs
        .lock()
        .unwrap()
        .insert("echo-pod".to_string(), b"hello world\n".to_vec());

    let logs = Lookout::new(&api)
        .pod(DEFAULT_NAMESPACE, "echo-pod")
        .logs()
        .await
        .unwrap();
    assert_eq!(logs, b"hello world\n");
}

#[tokio::test]
async fn test_logs_of_missing_pod_fail() {
    let api = cluster_with_pods();
    let result = Lookout::new(&api)
        .pod(DEFAULT_NAMESPACE, "does-not-exist")
        .logs()
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_pod_events_only_concern_that_pod() {
    let api = cluster_with_pods();
    *api.events.lock().unwrap() = vec![
        pod_event("nginx-1", "Scheduled"),
        pod_event("nginx-1", "Pulled"),
        pod_event("nginx-2", "Scheduled"),
    ];

    let events = Lookout::new(&api)
        .pod(DEFAULT_NAMESPACE, "nginx-1")
        .events()
        .await
        .unwrap();

    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|e| e.involved_object.name.as_deref() == Some("nginx-1")));
}

#[tokio::test]
async fn test_namespace_events_query() {
    let api = cluster_with_pods();
    *api.events.lock().unwrap() = vec![
        pod_event("nginx-1", "Scheduled"),
        pod_event("nginx-2", "Scheduled"),
    ];

    let all = Lookout::new(&api).events(DEFAULT_NAMESPACE).list();
    assert_ok!(all.expect_len(2).await);
}

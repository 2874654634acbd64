//! Lookout: fluent, lazily evaluated queries against a live test cluster
//!
//! Filters only accumulate. A request is sent by the terminal calls
//! ([`ResourceList::raw`], [`ResourceList::count`],
//! [`ResourceList::expect_len`], [`PodSelector::logs`],
//! [`PodSelector::events`]), once per call and never cached, so polling a
//! query observes the cluster as it is right now.
//!
//! ```ignore
//! let pods = cluster
//!     .lookout()
//!     .pods(DEFAULT_NAMESPACE)
//!     .by_labels("app=nginx")
//!     .by_field_selector("status.phase=Running")
//!     .list();
//! pods.expect_len(3).await?;
//! ```

use std::fmt;
use std::marker::PhantomData;

use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::{Event, Pod};
use kube::api::ListParams;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::k8s::ClusterApi;

/// Resource kinds a [`Query`] can list
pub trait Listable: Sized + Send + 'static {
    /// Plural name used in messages
    const KIND: &'static str;

    fn fetch<'f>(
        api: &'f dyn ClusterApi,
        namespace: &'f str,
        params: &'f ListParams,
    ) -> BoxFuture<'f, kube::Result<Vec<Self>>>;
}

impl Listable for Pod {
    const KIND: &'static str = "pods";

    fn fetch<'f>(
        api: &'f dyn ClusterApi,
        namespace: &'f str,
        params: &'f ListParams,
    ) -> BoxFuture<'f, kube::Result<Vec<Self>>> {
        api.list_pods(namespace, params)
    }
}

impl Listable for Event {
    const KIND: &'static str = "events";

    fn fetch<'f>(
        api: &'f dyn ClusterApi,
        namespace: &'f str,
        params: &'f ListParams,
    ) -> BoxFuture<'f, kube::Result<Vec<Self>>> {
        api.list_events(namespace, params)
    }
}

/// Entry point for queries, borrowing the cluster's API access
#[derive(Clone, Copy)]
pub struct Lookout<'a> {
    api: &'a dyn ClusterApi,
}

impl<'a> Lookout<'a> {
    pub fn new(api: &'a dyn ClusterApi) -> Self {
        Self { api }
    }

    /// Address all pods of a namespace
    pub fn pods(&self, namespace: &str) -> Query<'a, Pod> {
        Query::new(self.api, namespace)
    }

    /// Address all events of a namespace
    pub fn events(&self, namespace: &str) -> Query<'a, Event> {
        Query::new(self.api, namespace)
    }

    /// Address a single pod
    pub fn pod(&self, namespace: &str, name: &str) -> PodSelector<'a> {
        PodSelector {
            api: self.api,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

/// Accumulated filters for one resource kind. Nothing is executed until
/// [`Query::list`] is turned into a result by one of its terminal calls.
pub struct Query<'a, K> {
    api: &'a dyn ClusterApi,
    namespace: String,
    labels: Vec<String>,
    fields: Vec<String>,
    kind: PhantomData<fn() -> K>,
}

impl<K> Clone for Query<'_, K> {
    fn clone(&self) -> Self {
        Self {
            api: self.api,
            namespace: self.namespace.clone(),
            labels: self.labels.clone(),
            fields: self.fields.clone(),
            kind: PhantomData,
        }
    }
}

impl<K: Listable> fmt::Debug for Query<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("kind", &K::KIND)
            .field("namespace", &self.namespace)
            .field("labels", &self.labels)
            .field("fields", &self.fields)
            .finish()
    }
}

impl<'a, K: Listable> Query<'a, K> {
    fn new(api: &'a dyn ClusterApi, namespace: &str) -> Self {
        Self {
            api,
            namespace: namespace.to_string(),
            labels: Vec::new(),
            fields: Vec::new(),
            kind: PhantomData,
        }
    }

    /// Add a label selector such as `app=nginx`. Selectors are ANDed.
    pub fn by_labels(mut self, selector: &str) -> Self {
        if !selector.is_empty() {
            self.labels.push(selector.to_string());
        }
        self
    }

    /// Add a field selector such as `status.phase=Running`. Selectors are ANDed.
    pub fn by_field_selector(mut self, selector: &str) -> Self {
        if !selector.is_empty() {
            self.fields.push(selector.to_string());
        }
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn label_selector(&self) -> Option<String> {
        join(&self.labels)
    }

    pub fn field_selector(&self) -> Option<String> {
        join(&self.fields)
    }

    /// Turn the query into a list handle. Still no request is sent.
    pub fn list(self) -> ResourceList<'a, K> {
        ResourceList { query: self }
    }

    fn list_params(&self) -> ListParams {
        let mut params = ListParams::default();
        if let Some(labels) = self.label_selector() {
            params = params.labels(&labels);
        }
        if let Some(fields) = self.field_selector() {
            params = params.fields(&fields);
        }
        params
    }
}

fn join(selectors: &[String]) -> Option<String> {
    if selectors.is_empty() {
        None
    } else {
        Some(selectors.join(","))
    }
}

/// Terminal handle of a query
#[derive(Clone)]
pub struct ResourceList<'a, K> {
    query: Query<'a, K>,
}

impl<'a, K: Listable> ResourceList<'a, K> {
    pub fn query(&self) -> &Query<'a, K> {
        &self.query
    }

    /// Fetch all matching resources
    #[instrument(skip(self), fields(kind = K::KIND, namespace = %self.query.namespace))]
    pub async fn raw(&self) -> Result<Vec<K>> {
        let params = self.query.list_params();
        let items = K::fetch(self.query.api, &self.query.namespace, &params).await?;
        debug!(count = items.len(), "Listed resources");
        Ok(items)
    }

    /// Number of matching resources
    pub async fn count(&self) -> Result<usize> {
        Ok(self.raw().await?.len())
    }

    /// Fail with [`Error::CountMismatch`] unless exactly `expected` resources
    /// match. Meant to be polled until the cluster settles.
    pub async fn expect_len(&self, expected: usize) -> Result<()> {
        let actual = self.count().await?;
        if actual == expected {
            Ok(())
        } else {
            Err(Error::CountMismatch {
                kind: K::KIND,
                expected,
                actual,
            })
        }
    }
}

/// A single pod
#[derive(Clone)]
pub struct PodSelector<'a> {
    api: &'a dyn ClusterApi,
    namespace: String,
    name: String,
}

impl<'a> PodSelector<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw log output of the pod
    #[instrument(skip(self), fields(pod = %self.name, namespace = %self.namespace))]
    pub async fn logs(&self) -> Result<Vec<u8>> {
        Ok(self.api.pod_logs(&self.namespace, &self.name).await?)
    }

    /// Events whose involved object is this pod
    pub async fn events(&self) -> Result<Vec<Event>> {
        Lookout::new(self.api)
            .events(&self.namespace)
            .by_field_selector("involvedObject.kind=Pod")
            .by_field_selector(&format!("involvedObject.name={}", self.name))
            .list()
            .raw()
            .await
    }
}

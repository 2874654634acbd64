use std::fmt;

use k8s_openapi::api::core::v1::Node;
use tracing::instrument;

use crate::error::{Error, Result};
use crate::k8s::ClusterApi;

/// Nodes as listed at one point in time. Fetch again to observe changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSnapshot {
    pub nodes: Vec<Node>,
}

impl NodeSnapshot {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// `node: a, node: b`
impl fmt::Display for NodeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "node: {}", node.metadata.name.as_deref().unwrap_or_default())?;
        }
        Ok(())
    }
}

/// List the cluster's nodes. A cluster without nodes is an error here, so a
/// vacuously healthy snapshot never comes from a dead cluster.
#[instrument(skip(api))]
pub async fn fetch_node_snapshot(api: &dyn ClusterApi) -> Result<NodeSnapshot> {
    let nodes = api
        .list_nodes()
        .await
        .map_err(|e| Error::NodeInfo(format!("could not list nodes: {}", e)))?;

    if nodes.is_empty() {
        return Err(Error::NodeInfo(
            "no node was found (was it killed in the meantime?)".to_string(),
        ));
    }

    Ok(NodeSnapshot::new(nodes))
}

//! Node health evaluation
//!
//! A freshly provisioned cluster is only handed out when every node reports
//! itself ready and free of resource pressure.

mod checker;
mod snapshot;

pub use checker::{check_condition, kubelet_eviction_fs_by_percentage, ConditionKind};
pub use snapshot::{fetch_node_snapshot, NodeSnapshot};

use std::str::FromStr;

use k8s_openapi::api::core::v1::{Node, NodeCondition};
use strum::{Display, EnumString};

use super::NodeSnapshot;
use crate::error::{Error, Result};

/// Node condition kinds the health check understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum ConditionKind {
    Ready,
    DiskPressure,
    MemoryPressure,
    NetworkUnavailable,
    #[strum(serialize = "PIDPressure")]
    PidPressure,
}

impl ConditionKind {
    /// Status a healthy node reports for this condition
    pub fn healthy_status(self) -> &'static str {
        match self {
            ConditionKind::Ready => "True",
            ConditionKind::DiskPressure
            | ConditionKind::MemoryPressure
            | ConditionKind::NetworkUnavailable
            | ConditionKind::PidPressure => "False",
        }
    }
}

/// Decide whether every node in the snapshot is usable.
///
/// Ready must be `True`, all pressure conditions must be `False` (an
/// `Unknown` status counts as unhealthy). Unknown condition kinds are refused
/// before any status is looked at. An empty snapshot passes.
pub fn check_condition(snapshot: &NodeSnapshot) -> Result<()> {
    let mut parsed = Vec::with_capacity(snapshot.nodes.len());
    for node in &snapshot.nodes {
        let conditions = conditions_of(node);
        let mut kinds = Vec::with_capacity(conditions.len());
        for condition in conditions {
            let kind = ConditionKind::from_str(&condition.type_).map_err(|_| {
                Error::UnsupportedCondition {
                    node: node_name(node).to_string(),
                    kind: condition.type_.clone(),
                }
            })?;
            kinds.push((kind, condition));
        }
        parsed.push((node, kinds));
    }

    for (node, kinds) in parsed {
        for (kind, condition) in kinds {
            if condition.status != kind.healthy_status() {
                return Err(Error::NodeUnhealthy {
                    node: node_name(node).to_string(),
                    conditions: format!("{:?}", conditions_of(node)),
                });
            }
        }
    }

    Ok(())
}

fn conditions_of(node: &Node) -> &[NodeCondition] {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default()
}

fn node_name(node: &Node) -> &str {
    node.metadata.name.as_deref().unwrap_or("unknown")
}

/// Kubelet hard-eviction argument for a free-space percentage between 0 and
/// 100. With 10, nodes get tainted once less than 10 % disk is free, which
/// blocks scheduling.
pub fn kubelet_eviction_fs_by_percentage(percentage: i32) -> Result<String> {
    if !(0..=100).contains(&percentage) {
        return Err(Error::InvalidArgument(format!(
            "percentage must be in range of 0 and 100, got {}",
            percentage
        )));
    }
    Ok(format!(
        "imagefs.available<{p}%,nodefs.available<{p}%",
        p = percentage
    ))
}

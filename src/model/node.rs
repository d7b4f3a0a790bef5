use serde::{Deserialize, Serialize};

/// node id
pub type NodeId = String;

/// Kind of a workflow node.
///
/// `Loop`, `ForEach` and `Parallel` are iterative constructs: they own a
/// sub-workflow of nodes (declared through [`NodeModel::parent`]) whose
/// internal cycles are intentional and exempt from cycle validation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeKind {
    /// Plain operator node (transform, tool call, DB query, ...).
    #[default]
    Operator,
    /// Node whose executor invokes an LLM.
    Llm,
    /// Human-approval gate.
    Approval,
    /// Iterative loop construct.
    Loop,
    /// Iterative for-each construct.
    ForEach,
    /// Parallel-branch sub-workflow construct.
    Parallel,
}

impl NodeKind {
    /// Whether nodes contained in this node form a declared iterative construct.
    pub fn is_iterative(&self) -> bool {
        matches!(self, NodeKind::Loop | NodeKind::ForEach | NodeKind::Parallel)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeModel {
    /// node id
    pub id: NodeId,
    /// node title
    pub title: String,
    /// node description
    #[serde(default)]
    pub desc: String,
    /// node kind
    #[serde(default)]
    pub kind: NodeKind,
    /// id of the enclosing iterative construct, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    /// executor timeout in milliseconds, passed through to the segment runner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// retry config, passed through to the segment runner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    /// opaque executor configuration
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// retry times
    pub times: u64,
    /// retry interval in milliseconds
    pub interval: u64,
}

//! Workflow edge definitions for connecting nodes.
//!
//! Edges define the execution flow between nodes. A `conditional` edge
//! carries a [`Condition`] evaluated against execution state; a `hitl` edge
//! marks its target as a human-in-the-loop entry point.

use serde::{Deserialize, Serialize};

use crate::model::node::NodeId;

/// Kind of a workflow edge.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EdgeKind {
    /// Unconditional control flow.
    #[default]
    Default,
    /// Exclusive routing guarded by a condition.
    Conditional,
    /// Human-in-the-loop transition; the target pauses for external input.
    Hitl,
}

/// Comparison operator for edge conditions.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComparisonOperator {
    // for string or array
    Contains,
    NotContains,
    Is,
    IsNot,
    Empty,
    NotEmpty,
    In,
    NotIn,
    // for number
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Null,
    NotNull,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConditionValue {
    Str(String),
    List(Vec<String>),
}

/// Condition attached to a conditional edge, evaluated against a single
/// state variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    /// key of the state variable under test
    pub variable: String,
    pub operator: ComparisonOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ConditionValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeModel {
    /// edge id
    pub id: String,
    /// id of the source node
    pub source: NodeId,
    /// id of the target node
    pub target: NodeId,
    /// edge kind
    #[serde(default)]
    pub kind: EdgeKind,
    /// condition for `conditional` edges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

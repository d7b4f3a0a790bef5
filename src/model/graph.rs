use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    Result, SegflowError,
    model::{EdgeModel, NodeModel},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphModel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub nodes: Vec<NodeModel>,
    pub edges: Vec<EdgeModel>,
}

impl GraphModel {
    /// Parse a graph from JSON, checking it against the model schema first.
    pub fn from_json(s: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(s).map_err(|e| SegflowError::Graph(format!("invalid graph json: {}", e)))?;
        jsonschema::validate(&value, &Self::schema())?;
        let graph = serde_json::from_value::<GraphModel>(value).map_err(|e| SegflowError::Graph(format!("invalid graph input: {}", e)))?;
        graph.validate()?;
        Ok(graph)
    }

    pub fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["id", "name", "nodes", "edges"],
            "properties": {
                "id": { "type": "string", "minLength": 1 },
                "name": { "type": "string" },
                "desc": { "type": "string" },
                "nodes": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "required": ["id", "title"],
                        "properties": {
                            "id": { "type": "string", "minLength": 1 },
                            "title": { "type": "string" },
                            "kind": { "type": "string", "enum": ["operator", "llm", "approval", "loop", "for_each", "parallel"] },
                            "parent": { "type": "string" },
                            "timeout": { "type": "integer", "minimum": 0 },
                            "retry": {
                                "type": "object",
                                "required": ["times", "interval"],
                                "properties": {
                                    "times": { "type": "integer", "minimum": 0 },
                                    "interval": { "type": "integer", "minimum": 0 }
                                }
                            },
                            "config": {}
                        }
                    }
                },
                "edges": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["id", "source", "target"],
                        "properties": {
                            "id": { "type": "string", "minLength": 1 },
                            "source": { "type": "string" },
                            "target": { "type": "string" },
                            "kind": { "type": "string", "enum": ["default", "conditional", "hitl"] },
                            "condition": {
                                "type": "object",
                                "required": ["variable", "operator"],
                                "properties": {
                                    "variable": { "type": "string" },
                                    "operator": { "type": "string" },
                                    "value": {}
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    /// Referential checks the schema cannot express: unique node ids, edge
    /// endpoints that exist, parents that name iterative constructs, and
    /// conditions present exactly on conditional edges.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for node in self.nodes.iter() {
            if !ids.insert(node.id.as_str()) {
                return Err(SegflowError::Graph(format!("duplicate node id: {}", node.id)));
            }
        }

        let by_id: HashMap<&str, &NodeModel> = self.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        for node in self.nodes.iter() {
            if let Some(parent) = &node.parent {
                match by_id.get(parent.as_str()) {
                    Some(container) if container.kind.is_iterative() => {}
                    Some(_) => {
                        return Err(SegflowError::Graph(format!("node {} declares parent {} which is not an iterative construct", node.id, parent)));
                    }
                    None => {
                        return Err(SegflowError::Graph(format!("node {} declares unknown parent {}", node.id, parent)));
                    }
                }
            }
        }

        for edge in self.edges.iter() {
            if !by_id.contains_key(edge.source.as_str()) {
                return Err(SegflowError::Graph(format!("edge {}: source node {} not found", edge.id, edge.source)));
            }
            if !by_id.contains_key(edge.target.as_str()) {
                return Err(SegflowError::Graph(format!("edge {}: target node {} not found", edge.id, edge.target)));
            }
            match edge.kind {
                crate::model::EdgeKind::Conditional if edge.condition.is_none() => {
                    return Err(SegflowError::Graph(format!("conditional edge {} is missing its condition", edge.id)));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// find a node by id
    pub fn node(
        &self,
        id: &str,
    ) -> Option<&NodeModel> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

//! Seed data: the batch of nodes and edges an agent produces to
//! populate a workflow graph.
//!
//! Nodes carry caller-scoped `temp_id`s that edges reference; the
//! insert path later remaps them to store-assigned identifiers.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::schema::{json_type_name, OutputModel};

/// One node to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedNode {
    /// Batch-unique identifier referenced by edges (e.g. `account_1`).
    pub temp_id: String,

    /// Node type name from the workflow schema.
    pub node_type: String,

    /// Display title.
    pub title: String,

    /// Optional status value, when the node type declares states.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Field values keyed by the node type's field keys.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// One edge to create between two seed nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedEdge {
    /// Edge type name from the workflow schema.
    pub edge_type: String,

    /// `temp_id` of the source node.
    pub from_temp_id: String,

    /// `temp_id` of the target node.
    pub to_temp_id: String,

    /// Optional edge properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
}

/// A complete seed batch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeedData {
    /// Nodes to create.
    #[serde(default)]
    pub nodes: Vec<SeedNode>,

    /// Edges to create.
    #[serde(default)]
    pub edges: Vec<SeedEdge>,
}

impl SeedData {
    /// Whether the batch contains no nodes and no edges.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// [`OutputModel`] implementation for the seed-data shape.
///
/// Structural validation here only checks the container shape and the
/// per-entry required string fields; semantic checks against a
/// workflow definition are a separate, pluggable concern.
#[derive(Debug, Clone, Default)]
pub struct SeedDataModel;

impl OutputModel for SeedDataModel {
    fn name(&self) -> &str {
        "SeedData"
    }

    fn schema_json(&self) -> Value {
        json!({
            "title": "SeedData",
            "type": "object",
            "properties": {
                "nodes": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "temp_id": {"type": "string"},
                            "node_type": {"type": "string"},
                            "title": {"type": "string"},
                            "status": {"type": ["string", "null"]},
                            "properties": {"type": "object"},
                        },
                        "required": ["temp_id", "node_type", "title"],
                    },
                },
                "edges": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "edge_type": {"type": "string"},
                            "from_temp_id": {"type": "string"},
                            "to_temp_id": {"type": "string"},
                            "properties": {"type": ["object", "null"]},
                        },
                        "required": ["edge_type", "from_temp_id", "to_temp_id"],
                    },
                },
            },
            "required": ["nodes", "edges"],
        })
    }

    fn validate_item(&self, item: &Value) -> Vec<String> {
        let mut errors = Vec::new();

        let obj = match item.as_object() {
            Some(obj) => obj,
            None => {
                errors.push(format!("expected an object, got {}", json_type_name(item)));
                return errors;
            }
        };

        for (key, entry_fields) in [
            ("nodes", &["temp_id", "node_type", "title"][..]),
            ("edges", &["edge_type", "from_temp_id", "to_temp_id"][..]),
        ] {
            let entries = match obj.get(key) {
                Some(Value::Array(entries)) => entries,
                Some(other) => {
                    errors.push(format!(
                        "{key}: expected array, got {}",
                        json_type_name(other)
                    ));
                    continue;
                }
                None => {
                    errors.push(format!("{key}: field required"));
                    continue;
                }
            };

            for (i, entry) in entries.iter().enumerate() {
                let entry_obj = match entry.as_object() {
                    Some(entry_obj) => entry_obj,
                    None => {
                        errors.push(format!(
                            "{key}[{i}]: expected object, got {}",
                            json_type_name(entry)
                        ));
                        continue;
                    }
                };
                for field in entry_fields {
                    match entry_obj.get(*field) {
                        Some(Value::String(s)) if !s.is_empty() => {}
                        Some(Value::String(_)) => {
                            errors.push(format!("{key}[{i}].{field}: must not be empty"));
                        }
                        Some(other) => errors.push(format!(
                            "{key}[{i}].{field}: expected string, got {}",
                            json_type_name(other)
                        )),
                        None => errors.push(format!("{key}[{i}].{field}: field required")),
                    }
                }
            }
        }

        errors
    }
}

//! Domain validation of seed data against a workflow definition.
//!
//! These checks run after structural validation and enforce semantic
//! correctness: type names exist, edges connect legal endpoints,
//! temp-id references resolve (with typo suggestions), field values
//! match their declared kinds, and graph-level integrity holds (unique
//! ids, no self-loops, no duplicate edges). Non-blocking warnings
//! describe suspicious but legal shapes.

use std::collections::HashMap;

use serde_json::{json, Value};

use graft_types::{FieldKind, NodeTypeDef, SeedData, WorkflowDefinition};

use super::distance::find_similar;
use super::{CustomIssue, DomainValidator};

/// Maximum entries in an error-context array before the ellipsis marker.
pub const MAX_CONTEXT_ITEMS: usize = 5;

/// Accumulated blocking errors stop further validators at this count.
pub const MAX_ERRORS: usize = 10;

/// Suggestion cut-off for temp-id typo detection.
const MAX_SUGGESTION_DISTANCE: usize = 2;

/// Minimum edges-per-node ratio below which the graph is flagged sparse.
const LOW_EDGE_DENSITY: f64 = 0.3;

/// Truncate a context list to [`MAX_CONTEXT_ITEMS`] entries, appending
/// an ellipsis marker when cut.
fn truncate_context<S: AsRef<str>>(items: &[S]) -> Value {
    let mut out: Vec<Value> = items
        .iter()
        .take(MAX_CONTEXT_ITEMS)
        .map(|s| Value::String(s.as_ref().to_string()))
        .collect();
    if items.len() > MAX_CONTEXT_ITEMS {
        out.push(Value::String("...".into()));
    }
    Value::Array(out)
}

fn clip(value: &Value) -> String {
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    rendered.chars().take(100).collect()
}

/// Node temp-ids must be unique across the batch.
pub fn check_unique_temp_ids(seed: &SeedData) -> Vec<CustomIssue> {
    let mut errors = Vec::new();
    let mut seen: HashMap<&str, usize> = HashMap::new();

    for (i, node) in seed.nodes.iter().enumerate() {
        match seen.get(node.temp_id.as_str()) {
            Some(&first) => errors.push(CustomIssue::error(
                format!("nodes[{i}].temp_id"),
                format!(
                    "Duplicate temp_id '{}'. First defined at nodes[{first}].",
                    node.temp_id
                ),
                "duplicate_temp_id",
                json!({
                    "temp_id": node.temp_id,
                    "first_occurrence": first,
                    "duplicate_occurrence": i,
                }),
            )),
            None => {
                seen.insert(&node.temp_id, i);
            }
        }
    }

    errors
}

/// Edges must not connect a node to itself.
pub fn check_self_loops(seed: &SeedData) -> Vec<CustomIssue> {
    seed.edges
        .iter()
        .enumerate()
        .filter(|(_, edge)| edge.from_temp_id == edge.to_temp_id)
        .map(|(i, edge)| {
            CustomIssue::error(
                format!("edges[{i}]"),
                format!(
                    "Self-referential edge: '{}' connects '{}' to itself.",
                    edge.edge_type, edge.from_temp_id
                ),
                "self_loop_edge",
                json!({ "edge_type": edge.edge_type, "temp_id": edge.from_temp_id }),
            )
        })
        .collect()
}

/// `(type, from, to)` triples must be unique.
pub fn check_duplicate_edges(seed: &SeedData) -> Vec<CustomIssue> {
    let mut errors = Vec::new();
    let mut seen: HashMap<(&str, &str, &str), usize> = HashMap::new();

    for (i, edge) in seed.edges.iter().enumerate() {
        let key = (
            edge.edge_type.as_str(),
            edge.from_temp_id.as_str(),
            edge.to_temp_id.as_str(),
        );
        match seen.get(&key) {
            Some(&first) => errors.push(CustomIssue::error(
                format!("edges[{i}]"),
                format!(
                    "Duplicate edge: '{}' from '{}' to '{}' already exists at edges[{first}].",
                    edge.edge_type, edge.from_temp_id, edge.to_temp_id
                ),
                "duplicate_edge",
                json!({
                    "edge_type": edge.edge_type,
                    "from_temp_id": edge.from_temp_id,
                    "to_temp_id": edge.to_temp_id,
                    "first_occurrence": first,
                    "duplicate_occurrence": i,
                }),
            )),
            None => {
                seen.insert(key, i);
            }
        }
    }

    errors
}

/// Every node's type must be declared in the definition.
pub fn check_node_types(seed: &SeedData, definition: &WorkflowDefinition) -> Vec<CustomIssue> {
    let mut valid_types: Vec<&str> =
        definition.node_types.iter().map(|nt| nt.type_name.as_str()).collect();
    valid_types.sort_unstable();

    seed.nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| valid_types.binary_search(&node.node_type.as_str()).is_err())
        .map(|(i, node)| {
            CustomIssue::error(
                format!("nodes[{i}].node_type"),
                format!(
                    "Invalid node_type '{}'. Valid types: {}",
                    node.node_type,
                    truncate_context(&valid_types)
                ),
                "invalid_node_type",
                json!({
                    "temp_id": node.temp_id,
                    "node_type": node.node_type,
                    "valid_types": truncate_context(&valid_types),
                }),
            )
        })
        .collect()
}

/// Every edge's type must be declared in the definition.
pub fn check_edge_types(seed: &SeedData, definition: &WorkflowDefinition) -> Vec<CustomIssue> {
    let mut valid_types: Vec<&str> =
        definition.edge_types.iter().map(|et| et.type_name.as_str()).collect();
    valid_types.sort_unstable();

    seed.edges
        .iter()
        .enumerate()
        .filter(|(_, edge)| valid_types.binary_search(&edge.edge_type.as_str()).is_err())
        .map(|(i, edge)| {
            CustomIssue::error(
                format!("edges[{i}].edge_type"),
                format!(
                    "Invalid edge_type '{}'. Valid types: {}",
                    edge.edge_type,
                    truncate_context(&valid_types)
                ),
                "invalid_edge_type",
                json!({
                    "edge_type": edge.edge_type,
                    "from_temp_id": edge.from_temp_id,
                    "to_temp_id": edge.to_temp_id,
                    "valid_types": truncate_context(&valid_types),
                }),
            )
        })
        .collect()
}

/// Edge endpoints must reference existing temp-ids; close misses get a
/// suggested correction.
pub fn check_temp_id_references(seed: &SeedData) -> Vec<CustomIssue> {
    let mut valid_ids: Vec<&str> = seed.nodes.iter().map(|n| n.temp_id.as_str()).collect();
    valid_ids.sort_unstable();
    valid_ids.dedup();

    let mut errors = Vec::new();

    for (i, edge) in seed.edges.iter().enumerate() {
        for (side, id) in [("from_temp_id", &edge.from_temp_id), ("to_temp_id", &edge.to_temp_id)]
        {
            if valid_ids.binary_search(&id.as_str()).is_ok() {
                continue;
            }

            let similar =
                find_similar(id, valid_ids.iter().copied(), MAX_SUGGESTION_DISTANCE);
            let message = match similar {
                Some(similar) => {
                    format!("Invalid {side} '{id}'. Did you mean '{similar}'?")
                }
                None => format!("Invalid {side} '{id}'. No node with this temp_id exists."),
            };

            errors.push(CustomIssue::error(
                format!("edges[{i}].{side}"),
                message,
                "invalid_temp_id_reference",
                json!({
                    "edge_type": edge.edge_type,
                    "from_temp_id": edge.from_temp_id,
                    "to_temp_id": edge.to_temp_id,
                    "suggested_correction": similar,
                }),
            ));
        }
    }

    errors
}

/// Edge endpoints must match the edge type's declared from/to node
/// types. Unknown edge types and unresolved temp-ids are other checks'
/// concerns and are skipped here.
pub fn check_edge_connectivity(
    seed: &SeedData,
    definition: &WorkflowDefinition,
) -> Vec<CustomIssue> {
    let node_types: HashMap<&str, &str> = seed
        .nodes
        .iter()
        .map(|n| (n.temp_id.as_str(), n.node_type.as_str()))
        .collect();

    let mut errors = Vec::new();

    for (i, edge) in seed.edges.iter().enumerate() {
        let Some(edge_def) = definition.edge_type(&edge.edge_type) else {
            continue;
        };
        let (Some(&from_type), Some(&to_type)) = (
            node_types.get(edge.from_temp_id.as_str()),
            node_types.get(edge.to_temp_id.as_str()),
        ) else {
            continue;
        };

        if from_type != edge_def.from_type {
            errors.push(CustomIssue::error(
                format!("edges[{i}]"),
                format!(
                    "Edge type '{}' requires from_node type '{}', but got '{from_type}' (from temp_id '{}')",
                    edge.edge_type, edge_def.from_type, edge.from_temp_id
                ),
                "invalid_edge_connectivity",
                json!({
                    "edge_type": edge.edge_type,
                    "expected_from_type": edge_def.from_type,
                    "actual_from_type": from_type,
                    "from_temp_id": edge.from_temp_id,
                }),
            ));
        }

        if to_type != edge_def.to_type {
            errors.push(CustomIssue::error(
                format!("edges[{i}]"),
                format!(
                    "Edge type '{}' requires to_node type '{}', but got '{to_type}' (to temp_id '{}')",
                    edge.edge_type, edge_def.to_type, edge.to_temp_id
                ),
                "invalid_edge_connectivity",
                json!({
                    "edge_type": edge.edge_type,
                    "expected_to_type": edge_def.to_type,
                    "actual_to_type": to_type,
                    "to_temp_id": edge.to_temp_id,
                }),
            ));
        }
    }

    errors
}

fn node_def<'a>(definition: &'a WorkflowDefinition, node_type: &str) -> Option<&'a NodeTypeDef> {
    definition.node_type(node_type)
}

/// Required non-status fields must carry a non-null value.
pub fn check_required_fields(
    seed: &SeedData,
    definition: &WorkflowDefinition,
) -> Vec<CustomIssue> {
    let mut errors = Vec::new();

    for (i, node) in seed.nodes.iter().enumerate() {
        let Some(nt) = node_def(definition, &node.node_type) else { continue };

        for field in nt.fields.iter().filter(|f| f.required && f.key != "status") {
            let missing = match node.properties.get(&field.key) {
                None | Some(Value::Null) => true,
                Some(_) => false,
            };
            if missing {
                errors.push(CustomIssue::error(
                    format!("nodes[{i}].properties.{}", field.key),
                    format!(
                        "Missing required field '{}' for node type '{}' (temp_id: '{}')",
                        field.key, node.node_type, node.temp_id
                    ),
                    "missing_required_field",
                    json!({
                        "temp_id": node.temp_id,
                        "node_type": node.node_type,
                        "field_key": field.key,
                    }),
                ));
            }
        }
    }

    errors
}

/// All property keys must be declared on the node type.
pub fn check_property_keys(seed: &SeedData, definition: &WorkflowDefinition) -> Vec<CustomIssue> {
    let mut errors = Vec::new();

    for (i, node) in seed.nodes.iter().enumerate() {
        let Some(nt) = node_def(definition, &node.node_type) else { continue };

        let mut valid_keys: Vec<&str> = nt.fields.iter().map(|f| f.key.as_str()).collect();
        valid_keys.sort_unstable();

        for prop_key in node.properties.keys() {
            if valid_keys.binary_search(&prop_key.as_str()).is_err() {
                errors.push(CustomIssue::error(
                    format!("nodes[{i}].properties.{prop_key}"),
                    format!(
                        "Unknown property key '{prop_key}' for node type '{}'. Valid keys: {}",
                        node.node_type,
                        truncate_context(&valid_keys)
                    ),
                    "unknown_property_key",
                    json!({
                        "temp_id": node.temp_id,
                        "node_type": node.node_type,
                        "property_key": prop_key,
                        "valid_keys": truncate_context(&valid_keys),
                    }),
                ));
            }
        }
    }

    errors
}

/// Enum field values must come from the declared value set. The status
/// field is validated separately.
pub fn check_enum_values(seed: &SeedData, definition: &WorkflowDefinition) -> Vec<CustomIssue> {
    let mut errors = Vec::new();

    for (i, node) in seed.nodes.iter().enumerate() {
        let Some(nt) = node_def(definition, &node.node_type) else { continue };

        for field in nt.fields.iter() {
            if field.kind != FieldKind::Enum || field.key == "status" {
                continue;
            }
            let Some(values) = &field.values else { continue };
            let Some(value) = node.properties.get(&field.key) else { continue };
            if value.is_null() {
                continue;
            }

            let allowed = value
                .as_str()
                .map(|s| values.iter().any(|v| v == s))
                .unwrap_or(false);
            if !allowed {
                errors.push(CustomIssue::error(
                    format!("nodes[{i}].properties.{}", field.key),
                    format!(
                        "Invalid enum value '{}' for field '{}'. Valid values: {}",
                        clip(value),
                        field.key,
                        truncate_context(values)
                    ),
                    "invalid_enum_value",
                    json!({
                        "temp_id": node.temp_id,
                        "node_type": node.node_type,
                        "field_key": field.key,
                        "value": clip(value),
                        "valid_values": truncate_context(values),
                    }),
                ));
            }
        }
    }

    errors
}

/// Status must be legal for the node type: in the declared state set,
/// or absent when states are not declared.
pub fn check_status_values(seed: &SeedData, definition: &WorkflowDefinition) -> Vec<CustomIssue> {
    let mut errors = Vec::new();

    for (i, node) in seed.nodes.iter().enumerate() {
        let Some(nt) = node_def(definition, &node.node_type) else { continue };

        let states = nt.states.as_ref().filter(|s| s.enabled);
        match (states, &node.status) {
            (None, Some(status)) => errors.push(CustomIssue::error(
                format!("nodes[{i}].status"),
                format!(
                    "Node type '{}' does not have states enabled, but status '{status}' was provided",
                    node.node_type
                ),
                "invalid_status",
                json!({
                    "temp_id": node.temp_id,
                    "node_type": node.node_type,
                    "status": status,
                }),
            )),
            (Some(states), Some(status)) if !states.values.iter().any(|v| v == status) => {
                errors.push(CustomIssue::error(
                    format!("nodes[{i}].status"),
                    format!(
                        "Invalid status '{status}' for node type '{}'. Valid statuses: {}",
                        node.node_type,
                        truncate_context(&states.values)
                    ),
                    "invalid_status",
                    json!({
                        "temp_id": node.temp_id,
                        "node_type": node.node_type,
                        "status": status,
                        "valid_statuses": truncate_context(&states.values),
                    }),
                ));
            }
            _ => {}
        }
    }

    errors
}

fn is_valid_datetime(value: &Value) -> bool {
    let Some(s) = value.as_str() else { return false };
    chrono::DateTime::parse_from_rfc3339(s).is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn is_valid_number(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_f64().map(f64::is_finite).unwrap_or(false),
        _ => false,
    }
}

/// Datetime fields must parse as ISO-8601 (a trailing `Z` is accepted).
pub fn check_datetime_fields(
    seed: &SeedData,
    definition: &WorkflowDefinition,
) -> Vec<CustomIssue> {
    check_field_kind(seed, definition, FieldKind::Datetime, |value| {
        !is_valid_datetime(value)
    }, |node, field, value| {
        CustomIssue::error(
            String::new(),
            format!(
                "Invalid datetime value '{}' for field '{field}'. Expected ISO 8601 format (e.g., '2024-01-15T10:30:00Z').",
                clip(value)
            ),
            "invalid_datetime",
            json!({
                "temp_id": node.0,
                "node_type": node.1,
                "field_key": field,
                "value": clip(value),
            }),
        )
    })
}

/// Number fields must hold finite numerics; booleans are rejected.
pub fn check_number_fields(seed: &SeedData, definition: &WorkflowDefinition) -> Vec<CustomIssue> {
    check_field_kind(seed, definition, FieldKind::Number, |value| !is_valid_number(value), |node, field, value| {
        CustomIssue::error(
            String::new(),
            format!(
                "Invalid number value '{}' for field '{field}'. Expected a numeric value.",
                clip(value)
            ),
            "invalid_number",
            json!({
                "temp_id": node.0,
                "node_type": node.1,
                "field_key": field,
                "value": clip(value),
                "value_type": graft_types::schema::json_type_name(value),
            }),
        )
    })
}

/// Array-kind fields (`tag[]`, `file[]`) must hold arrays.
pub fn check_array_fields(seed: &SeedData, definition: &WorkflowDefinition) -> Vec<CustomIssue> {
    let mut errors = Vec::new();

    for (i, node) in seed.nodes.iter().enumerate() {
        let Some(nt) = node_def(definition, &node.node_type) else { continue };

        for field in nt.fields.iter().filter(|f| f.kind.is_array()) {
            let Some(value) = node.properties.get(&field.key) else { continue };
            if value.is_null() || value.is_array() {
                continue;
            }
            errors.push(CustomIssue::error(
                format!("nodes[{i}].properties.{}", field.key),
                format!(
                    "Invalid {} value for field '{}'. Expected an array, got {}.",
                    field.kind.display(),
                    field.key,
                    graft_types::schema::json_type_name(value)
                ),
                "invalid_array",
                json!({
                    "temp_id": node.temp_id,
                    "node_type": node.node_type,
                    "field_key": field.key,
                    "expected_kind": field.kind.display(),
                    "actual_type": graft_types::schema::json_type_name(value),
                }),
            ));
        }
    }

    errors
}

/// Shared walk for per-kind field checks; `path` is filled in here so
/// the issue builders stay small.
fn check_field_kind(
    seed: &SeedData,
    definition: &WorkflowDefinition,
    kind: FieldKind,
    is_bad: impl Fn(&Value) -> bool,
    build: impl Fn((&str, &str), &str, &Value) -> CustomIssue,
) -> Vec<CustomIssue> {
    let mut errors = Vec::new();

    for (i, node) in seed.nodes.iter().enumerate() {
        let Some(nt) = node_def(definition, &node.node_type) else { continue };

        for field in nt.fields.iter().filter(|f| f.kind == kind) {
            let Some(value) = node.properties.get(&field.key) else { continue };
            if value.is_null() {
                continue;
            }
            if is_bad(value) {
                let mut issue = build((&node.temp_id, &node.node_type), &field.key, value);
                issue.path = format!("nodes[{i}].properties.{}", field.key);
                errors.push(issue);
            }
        }
    }

    errors
}

/// Unique-marked fields must carry distinct values across same-typed
/// nodes.
pub fn check_unique_fields(seed: &SeedData, definition: &WorkflowDefinition) -> Vec<CustomIssue> {
    let mut errors = Vec::new();
    // (node_type, field_key, rendered value) -> (index, temp_id)
    let mut seen: HashMap<(String, String, String), (usize, String)> = HashMap::new();

    for (i, node) in seed.nodes.iter().enumerate() {
        let Some(nt) = node_def(definition, &node.node_type) else { continue };

        for field in nt.fields.iter().filter(|f| f.unique) {
            let Some(value) = node.properties.get(&field.key) else { continue };
            if value.is_null() {
                continue;
            }

            let key = (node.node_type.clone(), field.key.clone(), value.to_string());
            match seen.get(&key) {
                Some((first_index, first_temp_id)) => errors.push(CustomIssue::error(
                    format!("nodes[{i}].properties.{}", field.key),
                    format!(
                        "Duplicate value '{}' for unique field '{}'. First used by '{first_temp_id}' at nodes[{first_index}].",
                        clip(value),
                        field.key
                    ),
                    "duplicate_unique_value",
                    json!({
                        "temp_id": node.temp_id,
                        "node_type": node.node_type,
                        "field_key": field.key,
                        "value": clip(value),
                        "first_occurrence_index": first_index,
                        "first_occurrence_temp_id": first_temp_id,
                    }),
                )),
                None => {
                    seen.insert(key, (i, node.temp_id.clone()));
                }
            }
        }
    }

    errors
}

/// Global graph-shape warnings: empty batch, orphan nodes, low edge
/// density. All are aggregates computed in a single pass.
pub fn graph_shape_warnings(seed: &SeedData) -> Vec<CustomIssue> {
    let mut warnings = Vec::new();

    if seed.is_empty() {
        warnings.push(CustomIssue::warning(
            "nodes",
            "Seed data contains no nodes or edges",
            "empty_seed_data",
            json!({}),
        ));
        return warnings;
    }

    let mut touched: HashMap<&str, bool> = HashMap::new();
    for edge in &seed.edges {
        touched.insert(edge.from_temp_id.as_str(), true);
        touched.insert(edge.to_temp_id.as_str(), true);
    }

    for (i, node) in seed.nodes.iter().enumerate() {
        if !touched.contains_key(node.temp_id.as_str()) {
            warnings.push(CustomIssue::warning(
                format!("nodes[{i}]"),
                format!("Node '{}' has no edges touching it", node.temp_id),
                "orphan_node",
                json!({ "temp_id": node.temp_id, "node_type": node.node_type }),
            ));
        }
    }

    let node_count = seed.nodes.len();
    let edge_count = seed.edges.len();
    if node_count >= 2 && (edge_count as f64) < LOW_EDGE_DENSITY * node_count as f64 {
        warnings.push(CustomIssue::warning(
            "edges",
            format!("Low edge density: {edge_count} edges for {node_count} nodes"),
            "low_edge_density",
            json!({ "node_count": node_count, "edge_count": edge_count }),
        ));
    }

    warnings
}

/// Composed domain validator for seed data.
///
/// Validators run left-to-right; once accumulated blocking errors reach
/// [`MAX_ERRORS`] the remaining validators are skipped. Warnings are
/// always appended.
pub struct SeedDataValidator {
    definition: WorkflowDefinition,
}

impl SeedDataValidator {
    /// Create a validator bound to a workflow definition.
    pub fn new(definition: WorkflowDefinition) -> Self {
        Self { definition }
    }

    /// Run all checks over a parsed seed batch.
    pub fn validate_seed(&self, seed: &SeedData) -> Vec<CustomIssue> {
        type Check = fn(&SeedData, &WorkflowDefinition) -> Vec<CustomIssue>;

        let checks: &[Check] = &[
            |s, _| check_unique_temp_ids(s),
            |s, _| check_self_loops(s),
            |s, _| check_duplicate_edges(s),
            check_node_types,
            check_edge_types,
            |s, _| check_temp_id_references(s),
            check_edge_connectivity,
            check_required_fields,
            check_property_keys,
            check_enum_values,
            check_status_values,
            check_datetime_fields,
            check_number_fields,
            check_array_fields,
            check_unique_fields,
        ];

        let mut issues = Vec::new();
        for check in checks {
            if issues.len() >= MAX_ERRORS {
                break;
            }
            issues.extend(check(seed, &self.definition));
        }

        issues.extend(graph_shape_warnings(seed));
        issues
    }
}

impl DomainValidator for SeedDataValidator {
    fn validate(&self, item: &Value) -> Vec<CustomIssue> {
        match serde_json::from_value::<SeedData>(item.clone()) {
            Ok(seed) => self.validate_seed(&seed),
            Err(e) => vec![CustomIssue::error(
                String::new(),
                format!("Item is not a seed batch: {e}"),
                "invalid_seed_shape",
                json!({}),
            )],
        }
    }
}

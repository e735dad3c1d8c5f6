//! Workflow definitions: the schema graph that seed data targets.
//!
//! A [`WorkflowDefinition`] declares node types (with typed fields and
//! optional state machines) and edge types (with endpoint constraints).
//! The wire format uses camelCase keys, matching how definitions are
//! stored and exchanged with the graph store.

use serde::{Deserialize, Serialize};

/// Supported field kinds in workflow definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Short string.
    #[serde(rename = "string")]
    String,
    /// Finite number.
    #[serde(rename = "number")]
    Number,
    /// ISO-8601 datetime string.
    #[serde(rename = "datetime")]
    Datetime,
    /// String restricted to the field's `values`.
    #[serde(rename = "enum")]
    Enum,
    /// Reference to a person entity.
    #[serde(rename = "person")]
    Person,
    /// Free-form JSON.
    #[serde(rename = "json")]
    Json,
    /// Array of tag strings.
    #[serde(rename = "tag[]")]
    TagArray,
    /// Array of file references.
    #[serde(rename = "file[]")]
    FileArray,
}

impl FieldKind {
    /// Whether values of this kind must be JSON arrays.
    pub fn is_array(&self) -> bool {
        matches!(self, FieldKind::TagArray | FieldKind::FileArray)
    }

    /// Display name used in validation messages.
    pub fn display(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Datetime => "datetime",
            FieldKind::Enum => "enum",
            FieldKind::Person => "person",
            FieldKind::Json => "json",
            FieldKind::TagArray => "tag[]",
            FieldKind::FileArray => "file[]",
        }
    }
}

/// A field definition within a node type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    /// Property key.
    pub key: String,

    /// Human-readable label.
    #[serde(default)]
    pub label: String,

    /// Field kind.
    pub kind: FieldKind,

    /// Whether the field must be present with a non-null value.
    #[serde(default)]
    pub required: bool,

    /// Whether values must be unique across nodes of the same type.
    #[serde(default)]
    pub unique: bool,

    /// Allowed values for enum fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

/// A valid state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// Source state.
    #[serde(rename = "from")]
    pub from_state: String,

    /// Target state.
    #[serde(rename = "to")]
    pub to_state: String,
}

/// State machine configuration for a node type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStates {
    /// Whether the state machine is active.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Initial state for new nodes.
    pub initial: String,

    /// All legal state values.
    pub values: Vec<String>,

    /// Declared transitions.
    #[serde(default)]
    pub transitions: Vec<StateTransition>,
}

fn default_enabled() -> bool {
    true
}

/// A node type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTypeDef {
    /// Type identifier referenced by seed nodes and edge constraints.
    #[serde(rename = "type")]
    pub type_name: String,

    /// Human-readable name.
    #[serde(rename = "displayName", default)]
    pub display_name: String,

    /// Which field supplies a node's title.
    #[serde(rename = "titleField", default)]
    pub title_field: String,

    /// Typed fields.
    #[serde(default)]
    pub fields: Vec<FieldDef>,

    /// Optional state machine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<NodeStates>,
}

impl NodeTypeDef {
    /// Whether this node type has an enabled state machine.
    pub fn states_enabled(&self) -> bool {
        self.states.as_ref().is_some_and(|s| s.enabled)
    }
}

/// An edge type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeTypeDef {
    /// Type identifier referenced by seed edges.
    #[serde(rename = "type")]
    pub type_name: String,

    /// Human-readable name.
    #[serde(rename = "displayName", default)]
    pub display_name: String,

    /// Required node type of the source endpoint.
    #[serde(rename = "from")]
    pub from_type: String,

    /// Required node type of the target endpoint.
    #[serde(rename = "to")]
    pub to_type: String,
}

/// The full workflow schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Schema name.
    #[serde(default)]
    pub name: String,

    /// Optional description.
    #[serde(default)]
    pub description: String,

    /// Declared node types.
    #[serde(rename = "nodeTypes", default)]
    pub node_types: Vec<NodeTypeDef>,

    /// Declared edge types.
    #[serde(rename = "edgeTypes", default)]
    pub edge_types: Vec<EdgeTypeDef>,
}

impl WorkflowDefinition {
    /// Look up a node type by name.
    pub fn node_type(&self, name: &str) -> Option<&NodeTypeDef> {
        self.node_types.iter().find(|nt| nt.type_name == name)
    }

    /// Look up an edge type by name.
    pub fn edge_type(&self, name: &str) -> Option<&EdgeTypeDef> {
        self.edge_types.iter().find(|et| et.type_name == name)
    }
}

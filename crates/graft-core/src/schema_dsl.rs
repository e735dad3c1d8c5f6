//! Compact DSL rendering of a workflow definition.
//!
//! Produces a far more token-efficient representation than JSON schema
//! for interpolation into prompts, while preserving the structural
//! information the agent needs: node types with typed fields, state
//! machines in arrow notation, and edge endpoint constraints.
//!
//! Legend: `!` = required, `type[]` = array, `enum(x|y)` = optional
//! enum, `enum!(x|y)` = required enum. States: `[a → b → c]` with `↔`
//! for bidirectional transitions and `|` for alternatives.

use std::collections::{BTreeMap, BTreeSet};

use graft_types::{FieldDef, FieldKind, NodeStates, NodeTypeDef, WorkflowDefinition};

/// Render a workflow definition in the compact DSL.
pub fn workflow_to_dsl(definition: &WorkflowDefinition) -> String {
    let mut lines: Vec<String> = Vec::new();

    let name = if definition.name.is_empty() { "Unnamed Schema" } else { &definition.name };
    lines.push(format!("# {name}"));
    if !definition.description.is_empty() {
        lines.push(format!("# {}", definition.description));
    }
    lines.push(String::new());

    lines.push(
        "# Legend: ! = required, type[] = array, enum(x|y) = optional enum, enum!(x|y) = required enum"
            .into(),
    );
    lines.push(
        "# States: [initial → ... → final] where → = transition, ↔ = bidirectional, | = or".into(),
    );
    lines.push(String::new());

    lines.push("## Nodes".into());
    lines.push(String::new());
    for node_type in &definition.node_types {
        lines.extend(convert_node_type(node_type));
        lines.push(String::new());
    }

    lines.push("## Edges".into());
    lines.push(String::new());
    lines.extend(convert_edge_types(definition));

    lines.join("\n")
}

fn convert_node_type(node_type: &NodeTypeDef) -> Vec<String> {
    let mut lines = Vec::new();

    let mut header = node_type.type_name.clone();
    let states_notation = node_type
        .states
        .as_ref()
        .filter(|s| s.enabled)
        .map(state_notation)
        .unwrap_or_default();

    if !states_notation.is_empty() {
        header = format!("{} {states_notation}", node_type.type_name);
    } else if !node_type.display_name.is_empty() && node_type.display_name != node_type.type_name {
        header = format!("{} ({})", node_type.type_name, node_type.display_name);
    }
    lines.push(header);

    for field in &node_type.fields {
        if let Some(line) = convert_field(field) {
            lines.push(format!("  {line}"));
        }
    }

    lines
}

fn convert_field(field: &FieldDef) -> Option<String> {
    if field.key.is_empty() {
        return None;
    }

    let type_str = match (&field.kind, &field.values) {
        (FieldKind::Enum, Some(values)) => {
            let bang = if field.required { "!" } else { "" };
            format!("enum{bang}({})", values.join("|"))
        }
        (kind, _) if kind.is_array() => kind.display().to_string(),
        (kind, _) => {
            let bang = if field.required { "!" } else { "" };
            format!("{}{bang}", kind.display())
        }
    };

    // Surface clarifying labels (units, parentheticals) as a comment.
    let mut comment = String::new();
    if !label_matches_key(&field.label, &field.key)
        && (field.label.contains('%') || field.label.contains('°') || field.label.contains('('))
    {
        comment = format!("  # {}", field.label);
    }

    Some(format!("{}: {type_str}{comment}", field.key))
}

fn label_matches_key(label: &str, key: &str) -> bool {
    let normalized_label = label.to_lowercase().replace([' ', '-'], "_");
    let normalized_key = key.to_lowercase().replace('-', "_");
    normalized_label == normalized_key
        || label.to_lowercase().replace(' ', "") == key.to_lowercase()
}

fn state_notation(states: &NodeStates) -> String {
    if states.transitions.is_empty() {
        return String::new();
    }

    let mut outgoing: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut all_states: BTreeSet<&str> = BTreeSet::new();
    for t in &states.transitions {
        if t.from_state.is_empty() || t.to_state.is_empty() {
            continue;
        }
        outgoing.entry(&t.from_state).or_default().insert(&t.to_state);
        all_states.insert(&t.from_state);
        all_states.insert(&t.to_state);
    }

    let mut bidirectional: BTreeSet<(&str, &str)> = BTreeSet::new();
    for (from, targets) in &outgoing {
        for to in targets {
            if outgoing.get(to).is_some_and(|back| back.contains(from)) {
                let pair = if from < to { (*from, *to) } else { (*to, *from) };
                bidirectional.insert(pair);
            }
        }
    }

    // Two states flipping back and forth collapse to one marker.
    if all_states.len() == 2 && bidirectional.len() == 1 {
        let (a, b) = bidirectional.iter().next().unwrap();
        return format!("[{a}↔{b}]");
    }

    let main_path = longest_path(&states.initial, &outgoing, &bidirectional);

    let mut main_transitions: BTreeSet<(&str, &str)> = BTreeSet::new();
    for window in main_path.windows(2) {
        main_transitions.insert((window[0], window[1]));
    }

    let mut parts: Vec<String> = Vec::new();
    if !main_path.is_empty() {
        parts.push(main_path.join("→"));
    }

    // Alternatives: transitions not on the main path, grouped by
    // target; bidirectional pairs render once with ↔.
    let mut emitted_pairs: BTreeSet<(&str, &str)> = BTreeSet::new();
    let mut alternatives: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for t in &states.transitions {
        let (from, to) = (t.from_state.as_str(), t.to_state.as_str());
        if main_transitions.contains(&(from, to)) {
            continue;
        }
        let pair = if from < to { (from, to) } else { (to, from) };
        if bidirectional.contains(&pair) {
            if emitted_pairs.insert(pair) {
                parts.push(format!("{}↔{}", pair.0, pair.1));
            }
        } else {
            alternatives.entry(to).or_default().push(from);
        }
    }

    for (target, mut sources) in alternatives {
        sources.sort_unstable();
        sources.dedup();
        parts.push(format!("{}→{target}", sources.join("|")));
    }

    if parts.is_empty() {
        String::new()
    } else {
        format!("[{}]", parts.join(", "))
    }
}

fn longest_path<'a>(
    start: &'a str,
    outgoing: &BTreeMap<&'a str, BTreeSet<&'a str>>,
    bidirectional: &BTreeSet<(&'a str, &'a str)>,
) -> Vec<&'a str> {
    fn walk<'a>(
        node: &'a str,
        outgoing: &BTreeMap<&'a str, BTreeSet<&'a str>>,
        bidirectional: &BTreeSet<(&'a str, &'a str)>,
        visited: &mut BTreeSet<&'a str>,
    ) -> Vec<&'a str> {
        if visited.contains(node) {
            return Vec::new();
        }
        visited.insert(node);

        let mut best = vec![node];
        if let Some(targets) = outgoing.get(node) {
            for next in targets {
                // Skip the return leg of a bidirectional pair.
                let pair = if node < *next { (node, *next) } else { (*next, node) };
                if bidirectional.contains(&pair) && *next < node {
                    continue;
                }
                let mut candidate = vec![node];
                candidate.extend(walk(next, outgoing, bidirectional, &mut visited.clone()));
                if candidate.len() > best.len() {
                    best = candidate;
                }
            }
        }
        best
    }

    if start.is_empty() {
        return Vec::new();
    }
    walk(start, outgoing, bidirectional, &mut BTreeSet::new())
}

fn convert_edge_types(definition: &WorkflowDefinition) -> Vec<String> {
    // Group multi-source edges of the same type and target.
    let mut groups: BTreeMap<(&str, &str), Vec<&str>> = BTreeMap::new();
    for edge in &definition.edge_types {
        groups
            .entry((&edge.type_name, &edge.to_type))
            .or_default()
            .push(&edge.from_type);
    }

    let mut lines = Vec::new();
    let mut seen: BTreeSet<(&str, &str)> = BTreeSet::new();
    for edge in &definition.edge_types {
        let key = (edge.type_name.as_str(), edge.to_type.as_str());
        if !seen.insert(key) {
            continue;
        }

        let sources = &groups[&key];
        let from = if sources.len() > 1 { sources.join("|") } else { edge.from_type.clone() };

        let mut comment = String::new();
        if !edge.display_name.is_empty()
            && edge.display_name.replace(' ', "_").to_uppercase() != edge.type_name
        {
            comment = format!("  # {}", edge.display_name);
        }

        lines.push(format!("{from} -{}-> {}{comment}", edge.type_name, edge.to_type));
    }

    lines
}

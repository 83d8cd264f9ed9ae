//! Bit-exact DOT export: a pure, side-effect-free rendering of a [`Graph`]
//! snapshot, grounded in the lineage's own `visualize` dot writer (see
//! `graph.rs` upstream) but driven by `std::fmt::Write` into a `String`
//! rather than a `BufWriter` over a file, since this crate has no file I/O
//! of its own to hand the caller.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::graph::{direct_children, Graph, GraphStore, NodeState};
use crate::item::{Item, NodeId};

/// Renders `graph` (and every descendant subgraph) as a complete `digraph G`
/// document. Two calls against the same graph state always produce the same
/// bytes: node/edge emission order is lexicographic by path then `NodeId`,
/// and hue assignment is derived from the sorted set of item types present.
pub fn export(graph: &Graph) -> String {
    let store = graph.store.borrow();
    let types = sorted_item_types(&store);

    let mut out = String::new();
    out.push_str("digraph G {\n");
    write_subgraph(&store, &[], &types, 1, &mut out);
    out.push_str("}\n");
    out
}

fn sorted_item_types(store: &GraphStore) -> Vec<String> {
    let mut types: BTreeSet<String> = BTreeSet::new();
    for node in store.nodes.values() {
        types.insert(node.item().item_type().to_owned());
    }
    types.into_iter().collect()
}

fn write_subgraph(
    store: &GraphStore,
    path: &[String],
    types: &[String],
    indent: usize,
    out: &mut String,
) {
    let pad = "  ".repeat(indent);
    let node_ids = direct_children(store, path);
    for id in &node_ids {
        write_node(store, id, types, &pad, out);
    }
    for id in &node_ids {
        write_edges(store, id, &pad, out);
    }

    let mut child_paths: Vec<Vec<String>> = store
        .nodes_by_path
        .keys()
        .filter(|candidate| candidate.len() == path.len() + 1 && candidate.starts_with(path))
        .cloned()
        .collect();
    child_paths.sort();

    for child_path in child_paths {
        let name = child_path.last().expect("child path is non-empty");
        let _ = writeln!(out, "{pad}subgraph cluster_{} {{", sanitize(name));
        let _ = writeln!(out, "{pad}  label=\"{}\";", escape(name));
        write_subgraph(store, &child_path, types, indent + 1, out);
        let _ = writeln!(out, "{pad}}}");
    }
}

fn write_node(store: &GraphStore, id: &NodeId, types: &[String], pad: &str, out: &mut String) {
    let node = store.nodes.get(id).expect("id came from nodes_by_path");
    let item = node.item();
    let label = item.label().unwrap_or(item.name());
    let color = hue_color(item.item_type(), types);
    let shape = if item.external() {
        "doubleoctagon"
    } else {
        match node.state() {
            NodeState::Creating | NodeState::Modifying | NodeState::Deleting | NodeState::Recreating => "cds",
            _ => "ellipse",
        }
    };
    let fillcolor = match node.state() {
        NodeState::Creating | NodeState::Modifying | NodeState::Deleting | NodeState::Recreating => {
            "blue".to_owned()
        }
        NodeState::Pending => "grey".to_owned(),
        NodeState::Failure => "red".to_owned(),
        _ => color,
    };
    let tooltip = escape(&format!("{}/{}\nstate: {}", item.item_type(), item.name(), node.state()));

    let _ = writeln!(
        out,
        "{pad}\"{}\" [label=\"{}\", shape={}, style=filled, fillcolor=\"{}\", tooltip=\"{}\"];",
        sanitize(&id.to_string()),
        escape(label),
        shape,
        fillcolor,
        tooltip,
    );
}

fn write_edges(store: &GraphStore, id: &NodeId, pad: &str, out: &mut String) {
    let source = sanitize(&id.to_string());
    for edge in store.outgoing_edges(id) {
        let target_exists = store.nodes.contains_key(edge.target());
        let satisfied = target_exists && store.is_satisfied(&edge);
        let edge_color = if satisfied { "black" } else { "red" };

        if target_exists {
            let _ = writeln!(
                out,
                "{pad}\"{}\" -> \"{}\" [color={}];",
                source,
                sanitize(&edge.target().to_string()),
                edge_color,
            );
        } else {
            let missing = format!("missing_{}", sanitize(&edge.target().to_string()));
            let _ = writeln!(
                out,
                "{pad}\"{}\" [label=\"<missing>\", shape=ellipse, color=grey, style=dashed];",
                missing,
            );
            let _ = writeln!(out, "{pad}\"{}\" -> \"{}\" [color=red];", source, missing);
        }
    }
}

/// HSV hue partitioned equally across the green→blue band (`[120, 240]`
/// degrees), assigned by each item type's rank in `types` (already sorted by
/// name), at fixed saturation/value so nodes stay readable against black
/// text.
fn hue_color(item_type: &str, types: &[String]) -> String {
    let rank = types.iter().position(|t| t == item_type).unwrap_or(0);
    let slots = types.len().max(1);
    let hue = 120.0 + (120.0 * rank as f64 / slots as f64);
    let (r, g, b) = hsv_to_rgb(hue, 0.45, 0.95);
    format!("#{r:02x}{g:02x}{b:02x}")
}

fn hsv_to_rgb(hue: f64, saturation: f64, value: f64) -> (u8, u8, u8) {
    let c = value * saturation;
    let h_prime = hue / 60.0;
    let x = c * (1.0 - (h_prime.rem_euclid(2.0) - 1.0).abs());
    let (r1, g1, b1) = match h_prime as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = value - c;
    (
        ((r1 + m) * 255.0).round() as u8,
        ((g1 + m) * 255.0).round() as u8,
        ((b1 + m) * 255.0).round() as u8,
    )
}

/// Replaces `-` and `/` with `_` so the result is a safe unquoted DOT
/// identifier fragment even though emission always quotes it anyway.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c == '-' || c == '/' { '_' } else { c })
        .collect()
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

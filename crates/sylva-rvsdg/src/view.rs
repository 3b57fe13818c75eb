//! Debug emitters: indented text listing, XML, and Graphviz dot.
//!
//! None of these are part of the compilation contract; they exist to look at
//! graphs. Identities in the XML and dot output are the arena indices in
//! hex, which are stable for the lifetime of the graph.

use std::collections::HashMap;
use std::fmt::Write;

use crate::graph::{Graph, NodeId, NodeKind, Origin, RegionId, User};
use crate::node::structural_argument_input;

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// An indented textual listing of a region.
///
/// Arguments print as `a<n>` (with `<= <origin>` when an owner input feeds
/// them), outputs as `o<n>`; each node prints its outputs, operation, and
/// operand names; structural nodes nest their subregions.
pub fn view_text(graph: &Graph, region: RegionId) -> String {
    let mut map = HashMap::new();
    region_to_text(graph, region, 0, &mut map)
}

fn indent(depth: usize) -> String {
    " ".repeat(depth * 2)
}

fn port_name(map: &mut HashMap<Origin, String>, origin: Origin) -> String {
    let prefix = match origin {
        Origin::Argument { .. } => "a",
        Origin::Output { .. } => "o",
    };
    let name = format!("{}{}", prefix, map.len());
    map.insert(origin, name.clone());
    name
}

fn looked_up(map: &HashMap<Origin, String>, origin: Origin) -> String {
    map.get(&origin).cloned().unwrap_or_else(|| "?".to_string())
}

fn region_to_text(
    graph: &Graph,
    region: RegionId,
    depth: usize,
    map: &mut HashMap<Origin, String>,
) -> String {
    let mut s = String::new();

    // Header: the argument list.
    let mut header = String::from("[");
    for index in 0..graph.narguments(region) {
        let origin = Origin::Argument { region, index };
        let name = port_name(map, origin);
        header.push_str(&name);
        if let Some((owner, input)) = structural_argument_input(graph, region, index) {
            let fed_by = graph.input_origin(owner, input);
            let _ = write!(header, " <= {}", looked_up(map, fed_by));
        }
        if index < graph.narguments(region) - 1 {
            header.push_str(", ");
        }
    }
    header.push_str("]{");
    let _ = writeln!(s, "{}{}", indent(depth), header);

    // Body: nodes bucketed by depth.
    let mut buckets: Vec<Vec<NodeId>> = vec![];
    for node in graph.region_nodes(region) {
        let d = graph.node_depth(node);
        if d >= buckets.len() {
            buckets.resize(d + 1, vec![]);
        }
        buckets[d].push(node);
    }
    for bucket in buckets {
        for node in bucket {
            s.push_str(&node_to_text(graph, node, depth + 1, map));
        }
    }

    // Footer: the result list.
    let mut footer = String::from("}[");
    for index in 0..graph.nresults(region) {
        let origin = graph.result_origin(region, index);
        if let Some(output) = region_result_output(graph, region, index) {
            let _ = write!(footer, "{} <= ", looked_up(map, output));
        }
        footer.push_str(&looked_up(map, origin));
        if index < graph.nresults(region) - 1 {
            footer.push_str(", ");
        }
    }
    footer.push(']');
    let _ = writeln!(s, "{}{}", indent(depth), footer);
    s
}

fn node_to_text(
    graph: &Graph,
    node: NodeId,
    depth: usize,
    map: &mut HashMap<Origin, String>,
) -> String {
    let mut s = indent(depth);
    for index in 0..graph.noutputs(node) {
        let name = port_name(map, Origin::Output { node, index });
        s.push_str(&name);
        s.push(' ');
    }
    s.push_str(":= ");
    s.push_str(&graph.node_kind(node).debug_string());
    for index in 0..graph.ninputs(node) {
        s.push(' ');
        s.push_str(&looked_up(map, graph.input_origin(node, index)));
    }
    s.push('\n');

    for sub in graph.subregions(node) {
        s.push_str(&region_to_text(graph, sub, depth + 1, map));
    }
    s
}

/// Which owner output a structural subregion result feeds, if any.
fn region_result_output(graph: &Graph, region: RegionId, index: usize) -> Option<Origin> {
    let owner = graph.region_owner(region)?;
    match graph.node_kind(owner) {
        NodeKind::Gamma => Some(Origin::Output { node: owner, index }),
        NodeKind::Theta => {
            // Result 0 is the predicate; loop variable i is result i + 1.
            if index == 0 {
                None
            } else {
                Some(Origin::Output { node: owner, index: index - 1 })
            }
        }
        NodeKind::Phi => Some(Origin::Output { node: owner, index }),
        NodeKind::Lambda { .. } | NodeKind::Delta { .. } => None,
        NodeKind::Simple(_) => unreachable!(),
    }
}

/// The nesting structure of a region as an ASCII tree of structural nodes.
pub fn region_tree(graph: &Graph, region: RegionId) -> String {
    fn walk(graph: &Graph, region: RegionId, depth: usize, out: &mut String) {
        for node in graph.region_nodes(region) {
            if graph.node_kind(node).is_structural() {
                let _ = writeln!(
                    out,
                    "{}{}",
                    "-".repeat(depth),
                    graph.node_kind(node).debug_string()
                );
                for sub in graph.subregions(node) {
                    walk(graph, sub, depth + 1, out);
                }
            }
        }
    }
    let mut out = String::from("ROOT\n");
    walk(graph, region, 1, &mut out);
    out
}

// ---------------------------------------------------------------------------
// XML
// ---------------------------------------------------------------------------

fn xml_node_id(node: NodeId) -> String {
    format!("n{:x}", node.0)
}

fn xml_region_id(region: RegionId) -> String {
    format!("r{:x}", region.0)
}

fn xml_origin_id(origin: Origin) -> String {
    match origin {
        Origin::Output { node, index } => format!("o{:x}.{:x}", node.0, index),
        Origin::Argument { region, index } => format!("a{:x}.{:x}", region.0, index),
    }
}

fn xml_user_id(user: User) -> String {
    match user {
        User::Input { node, index } => format!("i{:x}.{:x}", node.0, index),
        User::Result { region, index } => format!("q{:x}.{:x}", region.0, index),
    }
}

/// XML rendering with stable hex identities for nodes, ports, regions, and
/// edges.
pub fn view_xml(graph: &Graph, region: RegionId) -> String {
    let mut s = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rvsdg>\n");
    xml_region(graph, region, &mut s);
    s.push_str("</rvsdg>\n");
    s
}

fn xml_structural_type(kind: &NodeKind) -> &'static str {
    match kind {
        NodeKind::Gamma => "gamma",
        NodeKind::Theta => "theta",
        NodeKind::Lambda { .. } => "lambda",
        NodeKind::Phi => "phi",
        NodeKind::Delta { .. } => "delta",
        NodeKind::Simple(_) => "",
    }
}

fn xml_region(graph: &Graph, region: RegionId, s: &mut String) {
    let _ = writeln!(s, "<region id=\"{}\">", xml_region_id(region));
    for index in 0..graph.narguments(region) {
        let _ = writeln!(
            s,
            "<argument id=\"{}\"/>",
            xml_origin_id(Origin::Argument { region, index })
        );
    }
    for node in graph.region_nodes(region) {
        xml_node(graph, node, s);
    }
    for index in 0..graph.nresults(region) {
        let _ =
            writeln!(s, "<result id=\"{}\"/>", xml_user_id(User::Result { region, index }));
    }
    for index in 0..graph.narguments(region) {
        let origin = Origin::Argument { region, index };
        for user in graph.users(origin) {
            let _ = writeln!(
                s,
                "<edge source=\"{}\" target=\"{}\"/>",
                xml_origin_id(origin),
                xml_user_id(user)
            );
        }
    }
    let _ = writeln!(s, "</region>");
}

fn xml_node(graph: &Graph, node: NodeId, s: &mut String) {
    let kind = graph.node_kind(node);
    let (name, ty) = if kind.is_simple() {
        (kind.debug_string(), String::new())
    } else {
        (String::new(), xml_structural_type(kind).to_string())
    };
    let _ = writeln!(
        s,
        "<node id=\"{}\" name=\"{}\" type=\"{}\">",
        xml_node_id(node),
        name,
        ty
    );
    for index in 0..graph.ninputs(node) {
        let _ =
            writeln!(s, "<input id=\"{}\"/>", xml_user_id(User::Input { node, index }));
    }
    for index in 0..graph.noutputs(node) {
        let _ =
            writeln!(s, "<output id=\"{}\"/>", xml_origin_id(Origin::Output { node, index }));
    }
    for sub in graph.subregions(node) {
        xml_region(graph, sub, s);
    }
    let _ = writeln!(s, "</node>");
    for index in 0..graph.noutputs(node) {
        let origin = Origin::Output { node, index };
        for user in graph.users(origin) {
            let _ = writeln!(
                s,
                "<edge source=\"{}\" target=\"{}\"/>",
                xml_origin_id(origin),
                xml_user_id(user)
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Dot
// ---------------------------------------------------------------------------

/// Graphviz dot rendering: one cluster per region and per structural node,
/// HTML-table nodes for simple nodes, and explicit port nodes for
/// arguments, results, and structural inputs/outputs.
pub fn view_dot(graph: &Graph, region: RegionId) -> String {
    let mut s = String::from("digraph G {\n");
    dot_region(graph, region, &mut s);
    s.push_str("}\n");
    s
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn dot_origin_name(graph: &Graph, origin: Origin) -> String {
    match origin {
        Origin::Argument { region, index } => format!("a{:x}_{}:default", region.0, index),
        Origin::Output { node, index } => {
            if graph.node_kind(node).is_simple() {
                format!("n{:x}:o{}", node.0, index)
            } else {
                format!("so{:x}_{}:default", node.0, index)
            }
        }
    }
}

fn dot_user_name(graph: &Graph, user: User) -> String {
    match user {
        User::Result { region, index } => format!("r{:x}_{}:default", region.0, index),
        User::Input { node, index } => {
            if graph.node_kind(node).is_simple() {
                format!("n{:x}:i{}", node.0, index)
            } else {
                format!("si{:x}_{}:default", node.0, index)
            }
        }
    }
}

fn dot_port(display: &str, name: &str) -> String {
    format!(
        "{} [shape=plaintext label=<\n\
         <TABLE BORDER=\"0\" CELLBORDER=\"0\" CELLSPACING=\"0\" CELLPADDING=\"0\">\n\
         <TR><TD PORT=\"default\" BORDER=\"1\" CELLPADDING=\"1\">\
         <FONT POINT-SIZE=\"10\">{}</FONT></TD></TR>\n\
         </TABLE>> tooltip=\"{}\"];\n",
        name, display, name
    )
}

fn dot_edge(graph: &Graph, origin: Origin, user: User) -> String {
    format!(
        "{} -> {} [arrowhead=\"normal\", color=black, fontsize=10];\n",
        dot_origin_name(graph, origin),
        dot_user_name(graph, user)
    )
}

fn dot_simple_node(graph: &Graph, node: NodeId) -> String {
    let name = format!("n{:x}", node.0);
    let opname = sanitize(&graph.node_kind(node).debug_string());

    let mut inputs = String::new();
    for index in 0..graph.ninputs(node) {
        let _ = write!(
            inputs,
            "<TD PORT=\"i{}\" BORDER=\"1\" CELLPADDING=\"1\">\
             <FONT POINT-SIZE=\"10\"> i{}</FONT></TD>",
            index, index
        );
    }
    let mut outputs = String::new();
    for index in 0..graph.noutputs(node) {
        let _ = write!(
            outputs,
            "<TD PORT=\"o{}\" BORDER=\"1\" CELLPADDING=\"1\">\
             <FONT POINT-SIZE=\"10\"> o{}</FONT></TD>",
            index, index
        );
    }

    format!(
        "{} [shape=plaintext label=<\n\
         <TABLE BORDER=\"0\" CELLBORDER=\"0\" CELLSPACING=\"0\" CELLPADDING=\"0\">\n\
         <TR><TD BORDER=\"0\"><TABLE BORDER=\"0\" CELLBORDER=\"0\" CELLSPACING=\"0\" \
         CELLPADDING=\"0\"><TR><TD WIDTH=\"20\"></TD>{}<TD WIDTH=\"20\"></TD></TR>\
         </TABLE></TD></TR>\n\
         <TR><TD BORDER=\"3\" STYLE=\"ROUNDED\" CELLPADDING=\"4\">{}<BR/>\
         <FONT POINT-SIZE=\"10\">{}</FONT></TD></TR>\n\
         <TR><TD BORDER=\"0\"><TABLE BORDER=\"0\" CELLBORDER=\"0\" CELLSPACING=\"0\" \
         CELLPADDING=\"0\"><TR><TD WIDTH=\"20\"></TD>{}<TD WIDTH=\"20\"></TD></TR>\
         </TABLE></TD></TR>\n\
         </TABLE>> fontcolor=black color=black];\n",
        name, inputs, opname, name, outputs
    )
}

fn dot_structural_node(graph: &Graph, node: NodeId, s: &mut String) {
    let _ = writeln!(s, "subgraph cluster_sn{:x} {{", node.0);
    s.push_str("color=\"#ff8080\"\npenwidth=6\n");

    for index in 0..graph.ninputs(node) {
        s.push_str(&dot_port(&format!("si{}", index), &format!("si{:x}_{}", node.0, index)));
    }
    for sub in graph.subregions(node) {
        dot_region(graph, sub, s);
    }
    // Structural inputs feed the corresponding subregion arguments.
    for sub in graph.subregions(node) {
        for index in 0..graph.narguments(sub) {
            if let Some((owner, input)) = structural_argument_input(graph, sub, index) {
                let _ = writeln!(
                    s,
                    "si{:x}_{} -> {} [arrowhead=\"normal\", color=black];",
                    owner.0,
                    input,
                    dot_origin_name(graph, Origin::Argument { region: sub, index })
                );
            }
        }
    }
    for index in 0..graph.noutputs(node) {
        s.push_str(&dot_port(&format!("so{}", index), &format!("so{:x}_{}", node.0, index)));
    }
    s.push_str("}\n");
}

fn dot_region(graph: &Graph, region: RegionId, s: &mut String) {
    let _ = writeln!(s, "subgraph cluster_reg{:x} {{", region.0);
    s.push_str("color=\"#80b3ff\"\npenwidth=6\n");

    for index in 0..graph.narguments(region) {
        s.push_str(&dot_port(&format!("a{}", index), &format!("a{:x}_{}", region.0, index)));
    }

    for node in graph.region_nodes(region) {
        if graph.node_kind(node).is_simple() {
            s.push_str(&dot_simple_node(graph, node));
        } else {
            dot_structural_node(graph, node, s);
        }
        for index in 0..graph.ninputs(node) {
            s.push_str(&dot_edge(
                graph,
                graph.input_origin(node, index),
                User::Input { node, index },
            ));
        }
    }

    for index in 0..graph.nresults(region) {
        s.push_str(&dot_port(&format!("r{}", index), &format!("r{:x}_{}", region.0, index)));
        s.push_str(&dot_edge(
            graph,
            graph.result_origin(region, index),
            User::Result { region, index },
        ));
    }
    s.push_str("}\n");
}

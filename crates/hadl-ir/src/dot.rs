//! Graphviz export through a derived petgraph.

use std::collections::HashMap;

use petgraph::dot::Dot;
use petgraph::graph::DiGraph;

use crate::graph::Graph;

/// Render the graph in dot format. Data flows along `input` edges toward
/// the consumer; control flows along `succ` edges.
pub fn dot(graph: &Graph) -> String {
    let mut derived = DiGraph::<String, &'static str>::new();
    let mut index = HashMap::new();
    for (id, _) in graph.nodes() {
        index.insert(id, derived.add_node(graph.describe(id)));
    }
    for (id, node) in graph.nodes() {
        for &input in node.kind().collect_inputs().iter() {
            derived.add_edge(index[&input], index[&id], "input");
        }
        for &succ in node.kind().collect_successors().iter() {
            derived.add_edge(index[&id], index[&succ], "succ");
        }
    }
    format!("{}", Dot::new(&derived))
}

//! Structural verification.
//!
//! Walks the graph exclusively through the edge classification and
//! collects every violation instead of stopping at the first, so a broken
//! transformation pass gets reported in one shot. The dependency-DAG
//! acyclicity check runs on a derived petgraph.

use std::collections::HashMap;
use std::fmt;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;

use crate::graph::Graph;
use crate::id::NodeId;
use crate::node::NodeKind;
use crate::ty::Type;

/// One structural defect found by [`verify`].
#[derive(Debug, Clone)]
pub struct Violation {
    pub node: Option<NodeId>,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node {
            Some(id) => write!(f, "node {}: {}", id, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

fn expect_bool(graph: &Graph, owner: NodeId, cond: NodeId, out: &mut Vec<Violation>) {
    if !graph.is_active(cond) {
        return; // reported by the edge checks
    }
    match graph.kind(cond).ty() {
        Some(Type::Bool) => {}
        Some(other) => out.push(Violation {
            node: Some(owner),
            message: format!(
                "condition {} has type {}, expected Bool",
                graph.describe(cond),
                other
            ),
        }),
        None => out.push(Violation {
            node: Some(owner),
            message: format!("condition {} is not an expression", graph.describe(cond)),
        }),
    }
}

/// Check every structural invariant, returning all violations found.
pub fn verify(graph: &Graph) -> Result<(), Vec<Violation>> {
    let mut out = Vec::new();

    for (id, node) in graph.nodes() {
        let kind = node.kind();

        for &input in kind.collect_inputs().iter() {
            if !graph.is_active(input) {
                out.push(Violation {
                    node: Some(id),
                    message: format!("input {} is not active", input),
                });
            }
        }
        for &succ in kind.collect_successors().iter() {
            if !graph.is_active(succ) {
                out.push(Violation {
                    node: Some(id),
                    message: format!("successor {} is not active", succ),
                });
            } else if graph.predecessor(succ) != Some(id) {
                out.push(Violation {
                    node: Some(id),
                    message: format!(
                        "successor {} does not record {} as its predecessor",
                        succ, id
                    ),
                });
            }
        }
        if let Some(pred) = node.predecessor() {
            if !graph.is_active(pred) {
                out.push(Violation {
                    node: Some(id),
                    message: format!("predecessor {} is not active", pred),
                });
            } else if !graph.kind(pred).collect_successors().contains(&id) {
                out.push(Violation {
                    node: Some(id),
                    message: format!("predecessor {} does not list {} as a successor", pred, id),
                });
            }
        }
        for &user in node.usages() {
            if !graph.is_active(user) {
                out.push(Violation {
                    node: Some(id),
                    message: format!("usage {} is not active", user),
                });
            }
        }

        match kind {
            NodeKind::If { condition, .. } | NodeKind::Select { condition, .. } => {
                expect_bool(graph, id, *condition, &mut out);
            }
            NodeKind::WriteReg {
                condition: Some(c), ..
            }
            | NodeKind::WriteMem {
                condition: Some(c), ..
            } => {
                expect_bool(graph, id, *c, &mut out);
            }
            NodeKind::BranchEnd { side_effects } | NodeKind::InstrEnd { side_effects } => {
                for &effect in side_effects.iter() {
                    if graph.is_active(effect)
                        && !graph.kind(effect).class().is_side_effect()
                    {
                        out.push(Violation {
                            node: Some(id),
                            message: format!(
                                "side-effect list holds non-side-effect {}",
                                graph.describe(effect)
                            ),
                        });
                    }
                }
            }
            NodeKind::BuiltInCall { op, args, ty } => {
                if args.len() != op.arity() {
                    out.push(Violation {
                        node: Some(id),
                        message: format!(
                            "builtin {} takes {} operand(s), got {}",
                            op,
                            op.arity(),
                            args.len()
                        ),
                    });
                }
                if op.is_comparison() && *ty != Type::Bool {
                    out.push(Violation {
                        node: Some(id),
                        message: format!("comparison {} must have type Bool, has {}", op, ty),
                    });
                }
            }
            NodeKind::ZeroExtend { value, ty } | NodeKind::SignExtend { value, ty } => {
                if let Some(src) = graph
                    .is_active(*value)
                    .then(|| graph.kind(*value).ty())
                    .flatten()
                {
                    if ty.bit_width() < src.bit_width() {
                        out.push(Violation {
                            node: Some(id),
                            message: format!("extension narrows {} to {}", src, ty),
                        });
                    }
                }
            }
            NodeKind::Truncate { value, ty } => {
                if let Some(src) = graph
                    .is_active(*value)
                    .then(|| graph.kind(*value).ty())
                    .flatten()
                {
                    if ty.bit_width() > src.bit_width() {
                        out.push(Violation {
                            node: Some(id),
                            message: format!("truncation widens {} to {}", src, ty),
                        });
                    }
                }
            }
            _ => {}
        }
    }

    // Usage index, both directions with multiplicity.
    let mut expected: HashMap<NodeId, HashMap<NodeId, usize>> = HashMap::new();
    for (id, node) in graph.nodes() {
        for &input in node.kind().collect_inputs().iter() {
            *expected
                .entry(input)
                .or_default()
                .entry(id)
                .or_default() += 1;
        }
    }
    for (id, node) in graph.nodes() {
        let mut actual: HashMap<NodeId, usize> = HashMap::new();
        for &user in node.usages() {
            *actual.entry(user).or_default() += 1;
        }
        let exp = expected.remove(&id).unwrap_or_default();
        if actual != exp {
            out.push(Violation {
                node: Some(id),
                message: "usage index out of sync with input edges".to_string(),
            });
        }
    }
    for (target, users) in expected {
        if !users.is_empty() && !graph.is_active(target) {
            out.push(Violation {
                node: Some(target),
                message: "inactive node is still referenced as an input".to_string(),
            });
        }
    }

    // Dependency edges must form a DAG.
    let mut derived = DiGraph::<NodeId, ()>::new();
    let mut index = HashMap::new();
    for (id, node) in graph.nodes() {
        if node.kind().class().is_dependency() {
            index.insert(id, derived.add_node(id));
        }
    }
    for (id, node) in graph.nodes() {
        if let Some(&from) = index.get(&id) {
            for &input in node.kind().collect_inputs().iter() {
                if let Some(&to) = index.get(&input) {
                    derived.add_edge(from, to, ());
                }
            }
        }
    }
    if is_cyclic_directed(&derived) {
        out.push(Violation {
            node: None,
            message: "dependency DAG contains a cycle".to_string(),
        });
    }

    if out.is_empty() {
        Ok(())
    } else {
        Err(out)
    }
}

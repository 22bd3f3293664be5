//! Structural matchers over expression trees.
//!
//! A [`Matcher`] checks a node (and through nested operand matchers, its
//! input tree) against a shape. Simplification rules are built from these
//! instead of hand-rolled kind chains, so commutative operand swapping
//! lives in one place.

use crate::graph::Graph;
use crate::id::NodeId;
use crate::node::NodeKind;
use crate::ty::{BuiltInOp, Constant};

pub trait Matcher {
    fn matches(&self, graph: &Graph, id: NodeId) -> bool;
}

/// Matches every node.
pub struct AnyNode;

impl Matcher for AnyNode {
    fn matches(&self, _graph: &Graph, _id: NodeId) -> bool {
        true
    }
}

/// Matches any `Constant` node.
pub struct AnyConstant;

impl Matcher for AnyConstant {
    fn matches(&self, graph: &Graph, id: NodeId) -> bool {
        matches!(graph.kind(id), NodeKind::Constant { .. })
    }
}

/// Matches a `Constant` node satisfying a predicate on its value.
pub struct ConstantWhere<F: Fn(Constant) -> bool>(pub F);

impl<F: Fn(Constant) -> bool> Matcher for ConstantWhere<F> {
    fn matches(&self, graph: &Graph, id: NodeId) -> bool {
        match graph.kind(id) {
            NodeKind::Constant { value } => (self.0)(*value),
            _ => false,
        }
    }
}

/// Matches a `BuiltInCall` of one of the given operations whose operands
/// match positionally. For a commutative binary operation the swapped
/// operand order is tried as well.
pub struct BuiltIn {
    ops: Vec<BuiltInOp>,
    operands: Vec<Box<dyn Matcher>>,
}

impl BuiltIn {
    pub fn new(op: BuiltInOp, operands: Vec<Box<dyn Matcher>>) -> Self {
        BuiltIn {
            ops: vec![op],
            operands,
        }
    }

    pub fn any_of(ops: Vec<BuiltInOp>, operands: Vec<Box<dyn Matcher>>) -> Self {
        BuiltIn { ops, operands }
    }
}

impl Matcher for BuiltIn {
    fn matches(&self, graph: &Graph, id: NodeId) -> bool {
        let (op, args) = match graph.kind(id) {
            NodeKind::BuiltInCall { op, args, .. } => (*op, args),
            _ => return false,
        };
        if !self.ops.contains(&op) || args.len() != self.operands.len() {
            return false;
        }
        let direct = args
            .iter()
            .zip(&self.operands)
            .all(|(&a, m)| m.matches(graph, a));
        if direct {
            return true;
        }
        op.is_commutative()
            && args.len() == 2
            && self.operands[0].matches(graph, args[1])
            && self.operands[1].matches(graph, args[0])
    }
}

/// Collect every node in the input trees of `roots` matched by `matcher`,
/// in pre-order, visiting shared subtrees once.
pub fn collect_matches(
    graph: &Graph,
    roots: impl IntoIterator<Item = NodeId>,
    matcher: &dyn Matcher,
) -> Vec<NodeId> {
    let mut seen = Vec::new();
    let mut found = Vec::new();
    let mut stack: Vec<NodeId> = roots.into_iter().collect();
    stack.reverse();
    while let Some(id) = stack.pop() {
        if seen.contains(&id) {
            continue;
        }
        seen.push(id);
        if matcher.matches(graph, id) {
            found.push(id);
        }
        let inputs = graph.kind(id).collect_inputs();
        for &input in inputs.iter().rev() {
            stack.push(input);
        }
    }
    found
}

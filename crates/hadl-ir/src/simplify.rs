//! Algebraic simplification: rules, the fixpoint engine, and constant
//! folding.
//!
//! A rule inspects one node and proposes a [`Rewrite`] without mutating
//! anything; the engine applies it through
//! [`Graph::replace_and_delete`] and rescans until a full pass proposes
//! nothing. There is no step limit: every stock rule strictly shrinks the
//! expression, and a custom rule set that cycles is a bug in that rule
//! set, not something the engine papers over.

use crate::graph::Graph;
use crate::id::NodeId;
use crate::matching::{AnyNode, BuiltIn, ConstantWhere, Matcher};
use crate::node::{ClassPattern, NodeKind, Slots};
use crate::ty::{BuiltInOp, Constant, Type};

/// Outcome proposed by a rule: reuse an existing node, or build a fresh
/// one (activated, with dedup, when applied).
#[derive(Debug, Clone)]
pub enum Rewrite {
    Existing(NodeId),
    Build(NodeKind),
}

pub trait SimplificationRule {
    fn name(&self) -> &'static str;
    fn simplify(&self, graph: &Graph, id: NodeId) -> Option<Rewrite>;
}

/// Apply a proposed rewrite, returning the surviving node.
pub fn apply(graph: &mut Graph, id: NodeId, rewrite: Rewrite) -> NodeId {
    match rewrite {
        Rewrite::Existing(target) => graph.replace_and_delete(id, target),
        Rewrite::Build(kind) => {
            let fresh = graph.create(kind);
            graph.replace_and_delete(id, fresh)
        }
    }
}

/// Run the rule set to fixpoint over every expression node. Within one
/// scan the first rule proposing a rewrite for a node wins. Returns the
/// number of rewrites applied.
pub fn simplify_to_fixpoint(graph: &mut Graph, rules: &[Box<dyn SimplificationRule>]) -> usize {
    let mut total = 0;
    loop {
        let mut changed = false;
        for id in graph.node_ids_of(ClassPattern::Expression) {
            if !graph.is_active(id) {
                continue;
            }
            for rule in rules {
                if let Some(rewrite) = rule.simplify(graph, id) {
                    apply(graph, id, rewrite);
                    total += 1;
                    changed = true;
                    break;
                }
            }
        }
        if !changed {
            break;
        }
    }
    total
}

/// The stock algebraic rule set.
pub fn default_rules() -> Vec<Box<dyn SimplificationRule>> {
    vec![
        Box::new(AdditionWithZero),
        Box::new(MultiplicationWithZero),
        Box::new(MultiplicationWithOne),
        Box::new(DivisionByOne),
        Box::new(RemainderByOne),
        Box::new(AndWithZero),
        Box::new(AndWithOnes),
        Box::new(OrWithOnes),
        Box::new(OrWithZero),
        Box::new(XorWithZero),
        Box::new(SelectWithEqualCases),
        Box::new(SelectWithConstantCondition),
    ]
}

// ---- rule helpers ----

fn binary_args<'g>(graph: &'g Graph, id: NodeId, op: BuiltInOp) -> Option<&'g Slots> {
    match graph.kind(id) {
        NodeKind::BuiltInCall {
            op: actual, args, ..
        } if *actual == op && args.len() == 2 => Some(args),
        _ => None,
    }
}

/// For a binary call, return `(other, constant)` when one operand is a
/// constant satisfying the predicate.
fn split_const(
    graph: &Graph,
    args: &Slots,
    pred: impl Fn(Constant) -> bool,
) -> Option<(NodeId, NodeId)> {
    for (i, &arg) in args.iter().enumerate() {
        if let NodeKind::Constant { value } = graph.kind(arg) {
            if pred(*value) {
                return Some((args[1 - i], arg));
            }
        }
    }
    None
}

fn gate(op: BuiltInOp, pred: impl Fn(Constant) -> bool + 'static) -> BuiltIn {
    BuiltIn::new(
        op,
        vec![Box::new(AnyNode), Box::new(ConstantWhere(pred))],
    )
}

// ---- stock rules ----

/// `x + 0 → x`
pub struct AdditionWithZero;

impl SimplificationRule for AdditionWithZero {
    fn name(&self) -> &'static str {
        "addition_with_zero"
    }

    fn simplify(&self, graph: &Graph, id: NodeId) -> Option<Rewrite> {
        if !gate(BuiltInOp::Add, |c| c.is_zero()).matches(graph, id) {
            return None;
        }
        let args = binary_args(graph, id, BuiltInOp::Add)?;
        let (other, _) = split_const(graph, args, |c| c.is_zero())?;
        Some(Rewrite::Existing(other))
    }
}

/// `x * 0 → 0`
pub struct MultiplicationWithZero;

impl SimplificationRule for MultiplicationWithZero {
    fn name(&self) -> &'static str {
        "multiplication_with_zero"
    }

    fn simplify(&self, graph: &Graph, id: NodeId) -> Option<Rewrite> {
        if !gate(BuiltInOp::Mul, |c| c.is_zero()).matches(graph, id) {
            return None;
        }
        let ty = graph.kind(id).ty()?;
        Some(Rewrite::Build(NodeKind::Constant {
            value: Constant::zero(ty),
        }))
    }
}

/// `x * 1 → x`
pub struct MultiplicationWithOne;

impl SimplificationRule for MultiplicationWithOne {
    fn name(&self) -> &'static str {
        "multiplication_with_one"
    }

    fn simplify(&self, graph: &Graph, id: NodeId) -> Option<Rewrite> {
        if !gate(BuiltInOp::Mul, |c| c.bits() == 1).matches(graph, id) {
            return None;
        }
        let args = binary_args(graph, id, BuiltInOp::Mul)?;
        let (other, _) = split_const(graph, args, |c| c.bits() == 1)?;
        Some(Rewrite::Existing(other))
    }
}

/// `x / 1 → x` (divisor position only)
pub struct DivisionByOne;

impl SimplificationRule for DivisionByOne {
    fn name(&self) -> &'static str {
        "division_by_one"
    }

    fn simplify(&self, graph: &Graph, id: NodeId) -> Option<Rewrite> {
        let args = binary_args(graph, id, BuiltInOp::Div)?;
        match graph.kind(args[1]) {
            NodeKind::Constant { value } if value.bits() == 1 => {
                Some(Rewrite::Existing(args[0]))
            }
            _ => None,
        }
    }
}

/// `x % 1 → 0`
pub struct RemainderByOne;

impl SimplificationRule for RemainderByOne {
    fn name(&self) -> &'static str {
        "remainder_by_one"
    }

    fn simplify(&self, graph: &Graph, id: NodeId) -> Option<Rewrite> {
        let args = binary_args(graph, id, BuiltInOp::Rem)?;
        match graph.kind(args[1]) {
            NodeKind::Constant { value } if value.bits() == 1 => {
                let ty = graph.kind(id).ty()?;
                Some(Rewrite::Build(NodeKind::Constant {
                    value: Constant::zero(ty),
                }))
            }
            _ => None,
        }
    }
}

/// `x & 0 → 0` (also covers `x && false` on `Bool`)
pub struct AndWithZero;

impl SimplificationRule for AndWithZero {
    fn name(&self) -> &'static str {
        "and_with_zero"
    }

    fn simplify(&self, graph: &Graph, id: NodeId) -> Option<Rewrite> {
        if !gate(BuiltInOp::And, |c| c.is_zero()).matches(graph, id) {
            return None;
        }
        let ty = graph.kind(id).ty()?;
        Some(Rewrite::Build(NodeKind::Constant {
            value: Constant::zero(ty),
        }))
    }
}

/// `x & 1…1 → x` (also covers `x && true` on `Bool`)
pub struct AndWithOnes;

impl SimplificationRule for AndWithOnes {
    fn name(&self) -> &'static str {
        "and_with_ones"
    }

    fn simplify(&self, graph: &Graph, id: NodeId) -> Option<Rewrite> {
        if !gate(BuiltInOp::And, |c| c.is_ones()).matches(graph, id) {
            return None;
        }
        let args = binary_args(graph, id, BuiltInOp::And)?;
        let (other, _) = split_const(graph, args, |c| c.is_ones())?;
        Some(Rewrite::Existing(other))
    }
}

/// `x | 1…1 → 1…1` (also covers `x || true` on `Bool`)
pub struct OrWithOnes;

impl SimplificationRule for OrWithOnes {
    fn name(&self) -> &'static str {
        "or_with_ones"
    }

    fn simplify(&self, graph: &Graph, id: NodeId) -> Option<Rewrite> {
        if !gate(BuiltInOp::Or, |c| c.is_ones()).matches(graph, id) {
            return None;
        }
        let ty = graph.kind(id).ty()?;
        Some(Rewrite::Build(NodeKind::Constant {
            value: Constant::ones(ty),
        }))
    }
}

/// `x | 0 → x` (also covers `x || false` on `Bool`)
pub struct OrWithZero;

impl SimplificationRule for OrWithZero {
    fn name(&self) -> &'static str {
        "or_with_zero"
    }

    fn simplify(&self, graph: &Graph, id: NodeId) -> Option<Rewrite> {
        if !gate(BuiltInOp::Or, |c| c.is_zero()).matches(graph, id) {
            return None;
        }
        let args = binary_args(graph, id, BuiltInOp::Or)?;
        let (other, _) = split_const(graph, args, |c| c.is_zero())?;
        Some(Rewrite::Existing(other))
    }
}

/// `x ^ 0 → x`
pub struct XorWithZero;

impl SimplificationRule for XorWithZero {
    fn name(&self) -> &'static str {
        "xor_with_zero"
    }

    fn simplify(&self, graph: &Graph, id: NodeId) -> Option<Rewrite> {
        if !gate(BuiltInOp::Xor, |c| c.is_zero()).matches(graph, id) {
            return None;
        }
        let args = binary_args(graph, id, BuiltInOp::Xor)?;
        let (other, _) = split_const(graph, args, |c| c.is_zero())?;
        Some(Rewrite::Existing(other))
    }
}

/// `select(c, x, x) → x`
pub struct SelectWithEqualCases;

impl SimplificationRule for SelectWithEqualCases {
    fn name(&self) -> &'static str {
        "select_with_equal_cases"
    }

    fn simplify(&self, graph: &Graph, id: NodeId) -> Option<Rewrite> {
        match graph.kind(id) {
            NodeKind::Select {
                on_true, on_false, ..
            } if on_true == on_false => Some(Rewrite::Existing(*on_true)),
            _ => None,
        }
    }
}

/// `select(true, x, y) → x`, `select(false, x, y) → y`
pub struct SelectWithConstantCondition;

impl SimplificationRule for SelectWithConstantCondition {
    fn name(&self) -> &'static str {
        "select_with_constant_condition"
    }

    fn simplify(&self, graph: &Graph, id: NodeId) -> Option<Rewrite> {
        let (condition, on_true, on_false) = match graph.kind(id) {
            NodeKind::Select {
                condition,
                on_true,
                on_false,
                ..
            } => (*condition, *on_true, *on_false),
            _ => return None,
        };
        match graph.kind(condition) {
            NodeKind::Constant { value } => Some(Rewrite::Existing(if value.is_zero() {
                on_false
            } else {
                on_true
            })),
            _ => None,
        }
    }
}

// ---- constant folding ----

/// Fold a node over constant operands, if possible.
pub fn canonicalize_node(graph: &Graph, id: NodeId) -> Option<Rewrite> {
    match graph.kind(id) {
        NodeKind::BuiltInCall { op, args, ty } => {
            let mut values = Vec::with_capacity(args.len());
            for &arg in args {
                match graph.kind(arg) {
                    NodeKind::Constant { value } => values.push(*value),
                    _ => return None,
                }
            }
            let folded = op.eval(&values, *ty)?;
            Some(Rewrite::Build(NodeKind::Constant { value: folded }))
        }
        NodeKind::ZeroExtend { value, ty } | NodeKind::Truncate { value, ty } => {
            match graph.kind(*value) {
                NodeKind::Constant { value: c } => Some(Rewrite::Build(NodeKind::Constant {
                    value: Constant::new(c.bits(), *ty),
                })),
                _ => None,
            }
        }
        NodeKind::SignExtend { value, ty } => match graph.kind(*value) {
            NodeKind::Constant { value: c } => {
                let source_width = c.ty().bit_width();
                let signed = Constant::new(c.bits(), Type::SInt(source_width));
                Some(Rewrite::Build(NodeKind::Constant {
                    value: signed.convert(*ty),
                }))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Constant-fold every expression node to fixpoint. Returns the number of
/// rewrites applied.
pub fn canonicalize_to_fixpoint(graph: &mut Graph) -> usize {
    let mut total = 0;
    loop {
        let mut changed = false;
        for id in graph.node_ids_of(ClassPattern::Expression) {
            if !graph.is_active(id) {
                continue;
            }
            if let Some(rewrite) = canonicalize_node(graph, id) {
                apply(graph, id, rewrite);
                total += 1;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use smallvec::smallvec;

    use super::*;
    use crate::ty::Type;

    fn constant(g: &mut Graph, v: u128, ty: Type) -> NodeId {
        let id = g.create(NodeKind::Constant {
            value: Constant::new(v, ty),
        });
        g.add(id)
    }

    fn field(g: &mut Graph, name: &str) -> NodeId {
        let id = g.create(NodeKind::FieldRef {
            field: name.into(),
            ty: Type::Bits(8),
        });
        g.add(id)
    }

    fn call(g: &mut Graph, op: BuiltInOp, a: NodeId, b: NodeId) -> NodeId {
        let id = g.create(NodeKind::BuiltInCall {
            op,
            args: smallvec![a, b],
            ty: Type::Bits(8),
        });
        g.add(id)
    }

    fn anchor(g: &mut Graph, value: NodeId) -> NodeId {
        let ret = g.create(NodeKind::Return { value });
        g.add(ret)
    }

    #[test]
    fn and_with_zero_collapses_and_reaches_fixpoint() {
        let mut g = Graph::new("t");
        let x = field(&mut g, "imm");
        let zero = constant(&mut g, 0, Type::Bits(8));
        let masked = call(&mut g, BuiltInOp::And, x, zero);
        let ret = anchor(&mut g, masked);

        let rules = default_rules();
        let n = simplify_to_fixpoint(&mut g, &rules);
        assert_eq!(n, 1);
        let result = g.kind(ret).collect_inputs()[0];
        match g.kind(result) {
            NodeKind::Constant { value } => assert!(value.is_zero()),
            other => panic!("expected folded zero, got {}", other),
        }
        // x lost its consumer and was swept.
        assert!(g.is_deleted(x));
        // Second run must fire nothing.
        assert_eq!(simplify_to_fixpoint(&mut g, &rules), 0);
    }

    #[test]
    fn addition_with_zero_keeps_the_other_operand() {
        let mut g = Graph::new("t");
        let x = field(&mut g, "imm");
        let zero = constant(&mut g, 0, Type::Bits(8));
        let sum = call(&mut g, BuiltInOp::Add, zero, x);
        let ret = anchor(&mut g, sum);
        simplify_to_fixpoint(&mut g, &default_rules());
        assert_eq!(g.kind(ret).collect_inputs().as_slice(), &[x]);
        assert!(g.is_deleted(sum));
        assert!(g.is_deleted(zero));
    }

    #[test]
    fn boolean_and_with_true_simplifies() {
        let mut g = Graph::new("t");
        let cond = g.create(NodeKind::FieldRef {
            field: "flag".into(),
            ty: Type::Bool,
        });
        let cond = g.add(cond);
        let t = constant(&mut g, 1, Type::Bool);
        let conj = g.create(NodeKind::BuiltInCall {
            op: BuiltInOp::And,
            args: smallvec![cond, t],
            ty: Type::Bool,
        });
        let conj = g.add(conj);
        let ret = anchor(&mut g, conj);
        simplify_to_fixpoint(&mut g, &default_rules());
        assert_eq!(g.kind(ret).collect_inputs().as_slice(), &[cond]);
    }

    #[test]
    fn chained_rules_cascade_across_scans() {
        // (x * 1) + 0 needs two rewrites to settle on x.
        let mut g = Graph::new("t");
        let x = field(&mut g, "imm");
        let one = constant(&mut g, 1, Type::Bits(8));
        let zero = constant(&mut g, 0, Type::Bits(8));
        let prod = call(&mut g, BuiltInOp::Mul, x, one);
        let sum = call(&mut g, BuiltInOp::Add, prod, zero);
        let ret = anchor(&mut g, sum);
        let n = simplify_to_fixpoint(&mut g, &default_rules());
        assert_eq!(n, 2);
        assert_eq!(g.kind(ret).collect_inputs().as_slice(), &[x]);
    }

    #[test]
    fn select_with_constant_condition_picks_a_case() {
        let mut g = Graph::new("t");
        let x = field(&mut g, "a");
        let y = field(&mut g, "b");
        let f = constant(&mut g, 0, Type::Bool);
        let sel = g.create(NodeKind::Select {
            condition: f,
            on_true: x,
            on_false: y,
            ty: Type::Bits(8),
        });
        let sel = g.add(sel);
        let ret = anchor(&mut g, sel);
        simplify_to_fixpoint(&mut g, &default_rules());
        assert_eq!(g.kind(ret).collect_inputs().as_slice(), &[y]);
        assert!(g.is_deleted(x));
    }

    #[test]
    fn select_with_equal_cases_drops_the_select() {
        let mut g = Graph::new("t");
        let x = field(&mut g, "a");
        let c = g.create(NodeKind::FieldRef {
            field: "flag".into(),
            ty: Type::Bool,
        });
        let c = g.add(c);
        let sel = g.create(NodeKind::Select {
            condition: c,
            on_true: x,
            on_false: x,
            ty: Type::Bits(8),
        });
        let sel = g.add(sel);
        let ret = anchor(&mut g, sel);
        simplify_to_fixpoint(&mut g, &default_rules());
        assert_eq!(g.kind(ret).collect_inputs().as_slice(), &[x]);
        assert!(g.is_deleted(c));
    }

    #[test]
    fn canonicalize_folds_constant_builtins() {
        let mut g = Graph::new("t");
        let two = constant(&mut g, 2, Type::Bits(8));
        let three = constant(&mut g, 3, Type::Bits(8));
        let sum = call(&mut g, BuiltInOp::Add, two, three);
        let ret = anchor(&mut g, sum);
        let n = canonicalize_to_fixpoint(&mut g);
        assert_eq!(n, 1);
        let result = g.kind(ret).collect_inputs()[0];
        match g.kind(result) {
            NodeKind::Constant { value } => assert_eq!(value.bits(), 5),
            other => panic!("expected 5, got {}", other),
        }
    }

    #[test]
    fn canonicalize_folds_sign_extension() {
        let mut g = Graph::new("t");
        let c = constant(&mut g, 0x80, Type::Bits(8));
        let ext = g.create(NodeKind::SignExtend {
            value: c,
            ty: Type::Bits(16),
        });
        let ext = g.add(ext);
        let ret = anchor(&mut g, ext);
        canonicalize_to_fixpoint(&mut g);
        let result = g.kind(ret).collect_inputs()[0];
        match g.kind(result) {
            NodeKind::Constant { value } => assert_eq!(value.bits(), 0xff80),
            other => panic!("expected 0xff80, got {}", other),
        }
    }

    #[test]
    fn canonicalize_cascades_through_folded_trees() {
        // (2 + 3) * (2 + 3) folds in two scans down to 25.
        let mut g = Graph::new("t");
        let two = constant(&mut g, 2, Type::Bits(8));
        let three = constant(&mut g, 3, Type::Bits(8));
        let sum = call(&mut g, BuiltInOp::Add, two, three);
        let prod = call(&mut g, BuiltInOp::Mul, sum, sum);
        let ret = anchor(&mut g, prod);
        canonicalize_to_fixpoint(&mut g);
        let result = g.kind(ret).collect_inputs()[0];
        match g.kind(result) {
            NodeKind::Constant { value } => assert_eq!(value.bits(), 25),
            other => panic!("expected 25, got {}", other),
        }
    }
}

//! Node merging: collapse structurally equal nodes whose inputs diverge,
//! synthesizing selection nodes at the divergent slots.
//!
//! The driver enumerates candidate pairs, ranks them (most equal inputs
//! first), and merges greedily, revalidating each pair because earlier
//! merges may have deleted or rewritten participants. What a divergent
//! input pair merges *into* is the strategy's call: a boolean
//! [`Select`](crate::node::NodeKind::Select) or a
//! [`SelectByInstr`](crate::node::NodeKind::SelectByInstr) keyed on the
//! owning instructions.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::graph::Graph;
use crate::id::NodeId;
use crate::node::NodeKind;
use crate::simplify::Rewrite;
use crate::ty::{merge_types, Type};

/// Inputs can merge slot-by-slot: identical, or both expressions with a
/// common merged type.
pub fn can_merge_inputs(graph: &Graph, a: NodeId, b: NodeId) -> bool {
    let ia = graph.kind(a).collect_inputs();
    let ib = graph.kind(b).collect_inputs();
    if ia.len() != ib.len() {
        return false;
    }
    ia.iter().zip(ib.iter()).all(|(&x, &y)| {
        if x == y {
            return true;
        }
        match (graph.kind(x).ty(), graph.kind(y).ty()) {
            (Some(tx), Some(ty)) => merge_types(tx, ty).is_some(),
            _ => false,
        }
    })
}

/// Two distinct active nodes of the same class and data whose inputs can
/// merge.
pub fn can_merge_nodes(graph: &Graph, a: NodeId, b: NodeId) -> bool {
    a != b
        && graph.is_active(a)
        && graph.is_active(b)
        && graph.kind(a).same_shape(graph.kind(b))
        && can_merge_inputs(graph, a, b)
}

/// Number of input slots holding the identical node on both sides.
pub fn count_equal_inputs(graph: &Graph, a: NodeId, b: NodeId) -> usize {
    graph
        .kind(a)
        .collect_inputs()
        .iter()
        .zip(graph.kind(b).collect_inputs().iter())
        .filter(|(x, y)| x == y)
        .count()
}

/// Pluggable policy for [`merge_nodes`].
pub trait MergeStrategy {
    /// Is this pair a merge candidate?
    fn filter(&self, graph: &Graph, a: NodeId, b: NodeId) -> bool;

    /// Rank candidate pairs; `Less` merges earlier.
    fn compare(&self, graph: &Graph, p1: (NodeId, NodeId), p2: (NodeId, NodeId)) -> Ordering;

    /// Combine one divergent input slot. `i1` is the slot of the
    /// surviving node `n1`, `i2` the corresponding slot of `n2`.
    fn merge_input(
        &mut self,
        graph: &mut Graph,
        n1: NodeId,
        i1: NodeId,
        n2: NodeId,
        i2: NodeId,
    ) -> Rewrite;

    /// Called after the inputs of a pair merged, before `n2` is replaced
    /// by `n1` and deleted.
    fn before_merge(&mut self, _graph: &mut Graph, _n1: NodeId, _n2: NodeId) {}

    /// Called when a `Rewrite::Build` from [`Self::merge_input`] was
    /// activated as `new`.
    fn added(
        &mut self,
        _graph: &Graph,
        _n1: NodeId,
        _i1: NodeId,
        _n2: NodeId,
        _i2: NodeId,
        _new: NodeId,
    ) {
    }
}

/// Merge candidates pairwise under the strategy. Returns the deleted
/// nodes. Ties in the ranking keep candidate enumeration order.
pub fn merge_nodes(
    graph: &mut Graph,
    candidates: &[NodeId],
    strategy: &mut dyn MergeStrategy,
) -> Vec<NodeId> {
    let mut pairs = Vec::new();
    for (i, &a) in candidates.iter().enumerate() {
        for &b in &candidates[i + 1..] {
            if strategy.filter(graph, a, b) {
                pairs.push((a, b));
            }
        }
    }
    pairs.sort_by(|&p1, &p2| strategy.compare(graph, p1, p2));

    let mut merged = Vec::new();
    for (n1, n2) in pairs {
        // Earlier merges may have consumed either side.
        if !graph.is_active(n1) || !graph.is_active(n2) {
            continue;
        }
        if !strategy.filter(graph, n1, n2) {
            continue;
        }
        let in1 = graph.kind(n1).collect_inputs();
        let in2 = graph.kind(n2).collect_inputs();
        for (&i1, &i2) in in1.iter().zip(in2.iter()) {
            if i1 == i2 {
                continue;
            }
            let new = match strategy.merge_input(graph, n1, i1, n2, i2) {
                Rewrite::Existing(id) => id,
                Rewrite::Build(kind) => {
                    let fresh = graph.create(kind);
                    let fresh = graph.add_with_inputs(fresh);
                    strategy.added(graph, n1, i1, n2, i2, fresh);
                    fresh
                }
            };
            if new != i1 {
                graph.replace_input(n1, i1, new);
            }
        }
        strategy.before_merge(graph, n1, n2);
        graph.replace_and_delete(n2, n1);
        merged.push(n2);
    }
    merged
}

fn merged_type(graph: &Graph, a: NodeId, b: NodeId) -> Type {
    let ta = graph.kind(a).ty();
    let tb = graph.kind(b).ty();
    match (ta, tb) {
        (Some(ta), Some(tb)) => merge_types(ta, tb).unwrap_or_else(|| {
            panic!(
                "graph '{}': unmergeable input types {} and {} passed the merge filter",
                graph.name, ta, tb
            )
        }),
        _ => panic!(
            "graph '{}': non-expression inputs {} and {} in input merge",
            graph.name, a, b
        ),
    }
}

/// Merge divergent inputs behind a boolean [`NodeKind::Select`].
///
/// The condition callback receives the node being merged away (`n2`) and
/// yields the condition under which `n2`'s input is the live one; the
/// synthesized select takes `i2` on true and `i1` on false.
pub struct SelectInputMerge<F>
where
    F: Fn(&mut Graph, NodeId) -> NodeId,
{
    pub condition: F,
}

impl<F> MergeStrategy for SelectInputMerge<F>
where
    F: Fn(&mut Graph, NodeId) -> NodeId,
{
    fn filter(&self, graph: &Graph, a: NodeId, b: NodeId) -> bool {
        can_merge_nodes(graph, a, b)
    }

    fn compare(&self, graph: &Graph, p1: (NodeId, NodeId), p2: (NodeId, NodeId)) -> Ordering {
        let c1 = count_equal_inputs(graph, p1.0, p1.1);
        let c2 = count_equal_inputs(graph, p2.0, p2.1);
        c2.cmp(&c1)
    }

    fn merge_input(
        &mut self,
        graph: &mut Graph,
        _n1: NodeId,
        i1: NodeId,
        n2: NodeId,
        i2: NodeId,
    ) -> Rewrite {
        let ty = merged_type(graph, i2, i1);
        let condition = (self.condition)(graph, n2);
        Rewrite::Build(NodeKind::Select {
            condition,
            on_true: i2,
            on_false: i1,
            ty,
        })
    }
}

/// Merge divergent inputs behind a [`NodeKind::SelectByInstr`], keyed on
/// the instructions owning each merged node.
///
/// `ownership` maps nodes to the set of instruction names whose behavior
/// they belong to; the filter requires disjoint owners, so each case of a
/// synthesized selection stays unambiguous. Existing selections on either
/// side are extended in place instead of nested.
pub struct SelectByInstrInputMerge {
    ownership: IndexMap<NodeId, BTreeSet<String>>,
}

impl SelectByInstrInputMerge {
    pub fn new(ownership: IndexMap<NodeId, BTreeSet<String>>) -> Self {
        SelectByInstrInputMerge { ownership }
    }

    pub fn ownership(&self) -> &IndexMap<NodeId, BTreeSet<String>> {
        &self.ownership
    }

    fn owners(&self, id: NodeId) -> BTreeSet<String> {
        self.ownership.get(&id).cloned().unwrap_or_else(|| {
            panic!("no owning instructions recorded for node {}", id)
        })
    }

    fn extend_owner(&mut self, id: NodeId, extra: BTreeSet<String>) {
        self.ownership.entry(id).or_default().extend(extra);
    }
}

impl MergeStrategy for SelectByInstrInputMerge {
    fn filter(&self, graph: &Graph, a: NodeId, b: NodeId) -> bool {
        can_merge_nodes(graph, a, b) && self.owners(a).is_disjoint(&self.owners(b))
    }

    fn compare(&self, graph: &Graph, p1: (NodeId, NodeId), p2: (NodeId, NodeId)) -> Ordering {
        let c1 = count_equal_inputs(graph, p1.0, p1.1);
        let c2 = count_equal_inputs(graph, p2.0, p2.1);
        c2.cmp(&c1)
    }

    fn merge_input(
        &mut self,
        graph: &mut Graph,
        n1: NodeId,
        i1: NodeId,
        n2: NodeId,
        i2: NodeId,
    ) -> Rewrite {
        let ty = merged_type(graph, i1, i2);
        let sel1 = matches!(graph.kind(i1), NodeKind::SelectByInstr { .. });
        let sel2 = matches!(graph.kind(i2), NodeKind::SelectByInstr { .. });
        match (sel1, sel2) {
            (true, true) => {
                graph.select_by_instr_absorb(i1, i2);
                graph.set_selection_type(i1, ty);
                let extra = self.owners(i2);
                self.extend_owner(i1, extra);
                Rewrite::Existing(i1)
            }
            (true, false) => {
                let owners = self.owners(n2);
                graph.select_by_instr_push_case(i1, owners.clone(), i2);
                graph.set_selection_type(i1, ty);
                self.extend_owner(i1, owners);
                Rewrite::Existing(i1)
            }
            (false, true) => {
                let owners = self.owners(n1);
                graph.select_by_instr_push_case(i2, owners.clone(), i1);
                graph.set_selection_type(i2, ty);
                self.extend_owner(i2, owners);
                Rewrite::Existing(i2)
            }
            (false, false) => Rewrite::Build(NodeKind::SelectByInstr {
                cases: smallvec::smallvec![i1, i2],
                instrs: vec![self.owners(n1), self.owners(n2)],
                ty,
            }),
        }
    }

    fn before_merge(&mut self, _graph: &mut Graph, n1: NodeId, n2: NodeId) {
        let extra = self.owners(n2);
        self.extend_owner(n1, extra);
    }

    fn added(
        &mut self,
        _graph: &Graph,
        n1: NodeId,
        _i1: NodeId,
        n2: NodeId,
        _i2: NodeId,
        new: NodeId,
    ) {
        let mut owners = self.owners(n1);
        owners.extend(self.owners(n2));
        self.ownership.insert(new, owners);
    }
}

#[cfg(test)]
mod tests {
    use smallvec::smallvec;

    use super::*;
    use crate::node::ClassPattern;
    use crate::ty::Constant;

    fn field(g: &mut Graph, name: &str) -> NodeId {
        let id = g.create(NodeKind::FieldRef {
            field: name.into(),
            ty: Type::Bits(8),
        });
        g.add(id)
    }

    fn bool_field(g: &mut Graph, name: &str) -> NodeId {
        let id = g.create(NodeKind::FieldRef {
            field: name.into(),
            ty: Type::Bool,
        });
        g.add(id)
    }

    fn write(g: &mut Graph, addr: NodeId, value: NodeId) -> NodeId {
        let id = g.create(NodeKind::WriteReg {
            resource: "X".into(),
            address: addr,
            value,
            condition: None,
        });
        g.add(id)
    }

    fn end_with(g: &mut Graph, effects: &[NodeId]) -> NodeId {
        let id = g.create(NodeKind::InstrEnd {
            side_effects: effects.iter().copied().collect(),
        });
        g.add(id)
    }

    #[test]
    fn helper_predicates_see_shape_and_inputs() {
        let mut g = Graph::new("t");
        let addr = field(&mut g, "rd");
        let v1 = field(&mut g, "a");
        let v2 = field(&mut g, "b");
        let w1 = write(&mut g, addr, v1);
        let w2 = write(&mut g, addr, v2);
        assert!(can_merge_nodes(&g, w1, w2));
        assert_eq!(count_equal_inputs(&g, w1, w2), 1);

        let other = g.create(NodeKind::WriteReg {
            resource: "Y".into(),
            address: addr,
            value: v1,
            condition: None,
        });
        let other = g.add(other);
        // Different resource data: not mergeable.
        assert!(!can_merge_nodes(&g, w1, other));
    }

    #[test]
    fn select_merge_builds_select_of_divergent_values() {
        let mut g = Graph::new("t");
        let addr = field(&mut g, "rd");
        let v1 = field(&mut g, "a");
        let v2 = field(&mut g, "b");
        let w1 = write(&mut g, addr, v1);
        let w2 = write(&mut g, addr, v2);
        let _e1 = end_with(&mut g, &[w1]);
        let _e2 = end_with(&mut g, &[w2]);
        let cond = bool_field(&mut g, "second_active");

        let mut strategy = SelectInputMerge {
            condition: move |_g: &mut Graph, _n2| cond,
        };
        let removed = merge_nodes(&mut g, &[w1, w2], &mut strategy);
        assert_eq!(removed, vec![w2]);
        assert!(g.is_deleted(w2));

        // The surviving write selects w2's value on the condition.
        let inputs = g.kind(w1).collect_inputs();
        assert_eq!(inputs[0], addr);
        match g.kind(inputs[1]) {
            NodeKind::Select {
                condition,
                on_true,
                on_false,
                ..
            } => {
                assert_eq!(*condition, cond);
                assert_eq!(*on_true, v2);
                assert_eq!(*on_false, v1);
            }
            other => panic!("expected a select, got {}", other),
        }
    }

    #[test]
    fn pairs_with_more_equal_inputs_merge_first() {
        let mut g = Graph::new("t");
        let addr = field(&mut g, "rd");
        let addr2 = field(&mut g, "rs");
        let v = field(&mut g, "a");
        let v2 = field(&mut g, "b");
        // w1/w2 share the address; w3 shares nothing with w1.
        let w1 = write(&mut g, addr, v);
        let w2 = write(&mut g, addr, v2);
        let w3 = write(&mut g, addr2, v2);
        let _e = end_with(&mut g, &[w1, w2, w3]);
        let cond = bool_field(&mut g, "c");
        let mut strategy = SelectInputMerge {
            condition: move |_g: &mut Graph, _n2| cond,
        };
        let removed = merge_nodes(&mut g, &[w1, w2, w3], &mut strategy);
        // (w1, w2) ranks first; afterwards w3 still merges into w1.
        assert_eq!(removed, vec![w2, w3]);
        assert!(g.is_active(w1));
    }

    #[test]
    fn instr_call_merge_synthesizes_select_by_instr() {
        let mut g = Graph::new("t");
        let a1 = field(&mut g, "imm_a");
        let a2 = field(&mut g, "imm_b");
        let n1 = end_with(&mut g, &[]);
        let n2 = end_with(&mut g, &[]);
        let c1 = g.create(NodeKind::InstrCall {
            target: "helper".into(),
            args: smallvec![a1],
            next: n1,
        });
        let c1 = g.add(c1);
        let c2 = g.create(NodeKind::InstrCall {
            target: "helper".into(),
            args: smallvec![a2],
            next: n2,
        });
        let c2 = g.add(c2);

        let mut ownership = IndexMap::new();
        ownership.insert(c1, BTreeSet::from(["ADD".to_string()]));
        ownership.insert(c2, BTreeSet::from(["SUB".to_string()]));
        let mut strategy = SelectByInstrInputMerge::new(ownership);

        let removed = merge_nodes(&mut g, &[c1, c2], &mut strategy);
        assert_eq!(removed, vec![c2]);
        assert!(g.is_active(c1) && g.is_deleted(c2));

        let arg = g.kind(c1).collect_inputs()[0];
        match g.kind(arg) {
            NodeKind::SelectByInstr { cases, instrs, .. } => {
                assert_eq!(cases.as_slice(), &[a1, a2]);
                assert_eq!(instrs[0], BTreeSet::from(["ADD".to_string()]));
                assert_eq!(instrs[1], BTreeSet::from(["SUB".to_string()]));
            }
            other => panic!("expected select-by-instr, got {}", other),
        }
        // The survivor now belongs to both instructions.
        assert_eq!(
            strategy.ownership()[&c1],
            BTreeSet::from(["ADD".to_string(), "SUB".to_string()])
        );
    }

    #[test]
    fn third_call_extends_the_existing_selection() {
        let mut g = Graph::new("t");
        let mut ownership = IndexMap::new();
        let mut calls = Vec::new();
        for (i, instr) in ["ADD", "SUB", "XOR"].iter().enumerate() {
            let arg = field(&mut g, &format!("imm{}", i));
            let next = end_with(&mut g, &[]);
            let call = g.create(NodeKind::InstrCall {
                target: "helper".into(),
                args: smallvec![arg],
                next,
            });
            let call = g.add(call);
            ownership.insert(call, BTreeSet::from([instr.to_string()]));
            calls.push(call);
        }
        let mut strategy = SelectByInstrInputMerge::new(ownership);
        let removed = merge_nodes(&mut g, &calls, &mut strategy);
        assert_eq!(removed.len(), 2);

        let survivor = calls[0];
        let arg = g.kind(survivor).collect_inputs()[0];
        match g.kind(arg) {
            NodeKind::SelectByInstr { cases, instrs, .. } => {
                assert_eq!(cases.len(), 3);
                assert_eq!(instrs.len(), 3);
            }
            other => panic!("expected select-by-instr, got {}", other),
        }
        assert_eq!(g.node_ids_of(ClassPattern::Kind(crate::node::NodeClass::InstrCall)).len(), 1);
    }

    #[test]
    fn overlapping_ownership_blocks_the_merge() {
        let mut g = Graph::new("t");
        let a1 = field(&mut g, "x");
        let a2 = field(&mut g, "y");
        let n1 = end_with(&mut g, &[]);
        let n2 = end_with(&mut g, &[]);
        let c1 = g.create(NodeKind::InstrCall {
            target: "helper".into(),
            args: smallvec![a1],
            next: n1,
        });
        let c1 = g.add(c1);
        let c2 = g.create(NodeKind::InstrCall {
            target: "helper".into(),
            args: smallvec![a2],
            next: n2,
        });
        let c2 = g.add(c2);
        let mut ownership = IndexMap::new();
        ownership.insert(c1, BTreeSet::from(["ADD".to_string()]));
        ownership.insert(c2, BTreeSet::from(["ADD".to_string(), "SUB".to_string()]));
        let mut strategy = SelectByInstrInputMerge::new(ownership);
        let removed = merge_nodes(&mut g, &[c1, c2], &mut strategy);
        assert!(removed.is_empty());
        assert!(g.is_active(c1) && g.is_active(c2));
    }

    #[test]
    fn merged_constants_keep_a_single_value_path() {
        // Divergent constant inputs merge like any other expression.
        let mut g = Graph::new("t");
        let addr = field(&mut g, "rd");
        let k1 = g.create(NodeKind::Constant {
            value: Constant::new(1, Type::Bits(8)),
        });
        let k1 = g.add(k1);
        let k2 = g.create(NodeKind::Constant {
            value: Constant::new(2, Type::Bits(8)),
        });
        let k2 = g.add(k2);
        let w1 = write(&mut g, addr, k1);
        let w2 = write(&mut g, addr, k2);
        let _e = end_with(&mut g, &[w1, w2]);
        let cond = bool_field(&mut g, "c");
        let mut strategy = SelectInputMerge {
            condition: move |_g: &mut Graph, _n2| cond,
        };
        merge_nodes(&mut g, &[w1, w2], &mut strategy);
        let sel = g.kind(w1).collect_inputs()[1];
        match g.kind(sel) {
            NodeKind::Select {
                on_true, on_false, ..
            } => {
                assert_eq!(*on_true, k2);
                assert_eq!(*on_false, k1);
            }
            other => panic!("expected select, got {}", other),
        }
    }
}

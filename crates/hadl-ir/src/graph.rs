//! The mutable IR graph: a push-only arena of nodes with identity.
//!
//! Nodes are addressed by [`NodeId`] and move through a monotonic
//! lifecycle: [`Graph::create`] reserves an `Uninitialized` slot,
//! [`Graph::add`] activates it (wiring the usage and predecessor
//! back-references), and deletion empties the slot for good. Ids are never
//! reused, so a deleted id stays recognizably deleted.
//!
//! Structural invariants (single predecessor, no edges to deleted nodes,
//! usage-index consistency) are enforced with panics carrying node
//! context. A violation is a bug in the calling pass, not a recoverable
//! condition.

use serde::{Deserialize, Serialize};

use crate::id::NodeId;
use crate::node::{ClassPattern, Node, NodeClass, NodeKind, NodeState};

/// Whether [`Graph::copy_node`] clones the input tree or shares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Share all input and successor references with the original.
    Shallow,
    /// Recursively copy the input tree; successors stay shared.
    Deep,
}

/// A behavior graph: control skeleton plus dependency DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub name: String,
    slots: Vec<Option<Node>>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Graph {
            name: name.into(),
            slots: Vec::new(),
        }
    }

    // ---- slot access ----

    fn slot(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.index()).and_then(|s| s.as_ref())
    }

    /// Borrow a node that still occupies its slot (active or detached).
    ///
    /// # Panics
    /// Panics when the id is deleted or was never created in this graph.
    pub fn node(&self, id: NodeId) -> &Node {
        match self.slot(id) {
            Some(node) => node,
            None => panic!(
                "graph '{}': node {} is deleted or unknown",
                self.name, id
            ),
        }
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.slots.get_mut(id.index()).and_then(|s| s.as_mut()) {
            Some(node) => node,
            None => panic!("graph '{}': node {} is deleted or unknown", self.name, id),
        }
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn is_active(&self, id: NodeId) -> bool {
        matches!(self.slot(id), Some(n) if n.state == NodeState::Active)
    }

    pub fn is_uninitialized(&self, id: NodeId) -> bool {
        matches!(self.slot(id), Some(n) if n.state == NodeState::Uninitialized)
    }

    /// True for ids whose slot has been emptied. Ids never handed out by
    /// this graph are unknown, not deleted.
    pub fn is_deleted(&self, id: NodeId) -> bool {
        id.index() < self.slots.len() && self.slots[id.index()].is_none()
    }

    // ---- lifecycle ----

    /// Reserve a detached node. It is invisible to queries until
    /// [`Graph::add`] activates it.
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Some(Node::detached(kind)));
        id
    }

    /// Activate a detached node, wiring back-references.
    ///
    /// Idempotent for nodes already active in this graph. All inputs must
    /// already be active (use [`Graph::add_with_inputs`] for detached
    /// operand trees); successors may still be detached during
    /// construction. For unique kinds an existing structural duplicate is
    /// returned instead and the reservation stays detached.
    ///
    /// # Panics
    /// Panics when the node or one of its inputs is deleted, an input is
    /// not active, or a successor already has a predecessor.
    pub fn add(&mut self, id: NodeId) -> NodeId {
        if self.is_active(id) {
            return id;
        }
        if self.is_deleted(id) {
            panic!("graph '{}': cannot add deleted node {}", self.name, id);
        }
        if self.node(id).kind.is_unique() {
            if let Some(dup) = self.find_duplicate(id) {
                return dup;
            }
        }
        let inputs = self.node(id).kind.collect_inputs();
        for &input in &inputs {
            if !self.is_active(input) {
                panic!(
                    "graph '{}': input {} of node {} is not active (use add_with_inputs)",
                    self.name, input, id
                );
            }
        }
        let succs = self.node(id).kind.collect_successors();
        for &succ in &succs {
            if self.is_deleted(succ) {
                panic!(
                    "graph '{}': successor {} of node {} is deleted",
                    self.name, succ, id
                );
            }
        }
        self.node_mut(id).state = NodeState::Active;
        for &input in &inputs {
            self.node_mut(input).usages.push(id);
        }
        for &succ in &succs {
            if let Some(p) = self.node(succ).predecessor {
                panic!(
                    "graph '{}': successor {} of node {} already has predecessor {}",
                    self.name, succ, id, p
                );
            }
            self.node_mut(succ).predecessor = Some(id);
        }
        id
    }

    /// Activate a node after transitively activating its detached inputs.
    ///
    /// When dedup replaces a detached input, the edge slot is rewritten to
    /// the surviving duplicate before activation.
    ///
    /// # Panics
    /// Panics when the node or any transitive input is deleted.
    pub fn add_with_inputs(&mut self, id: NodeId) -> NodeId {
        if self.is_active(id) {
            return id;
        }
        if self.is_deleted(id) {
            panic!("graph '{}': cannot add deleted node {}", self.name, id);
        }
        let inputs = self.node(id).kind.collect_inputs();
        for (pos, &input) in inputs.iter().enumerate() {
            if self.is_deleted(input) {
                panic!(
                    "graph '{}': node {} depends on deleted node {}",
                    self.name, id, input
                );
            }
            if !self.is_active(input) {
                let added = self.add_with_inputs(input);
                if added != input {
                    let mut slots = self.node_mut(id).kind.inputs_mut();
                    *slots[pos] = added;
                }
            }
        }
        self.add(id)
    }

    /// Find an active structural duplicate of a node: same class, same
    /// data, same input slots.
    pub fn find_duplicate(&self, id: NodeId) -> Option<NodeId> {
        let kind = &self.node(id).kind;
        let inputs = kind.collect_inputs();
        self.nodes()
            .filter(|&(other, _)| other != id)
            .find(|(_, node)| {
                node.kind.same_shape(kind) && node.kind.collect_inputs() == inputs
            })
            .map(|(other, _)| other)
    }

    // ---- queries ----

    /// Active nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref()
                .filter(|n| n.state == NodeState::Active)
                .map(|n| (NodeId(i as u32), n))
        })
    }

    /// Snapshot of active node ids matching a class pattern.
    pub fn node_ids_of(&self, pattern: ClassPattern) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, n)| pattern.matches(n.kind.class()))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.nodes().count()
    }

    pub fn usages(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).usages
    }

    pub fn usage_count(&self, id: NodeId) -> usize {
        self.node(id).usages.len()
    }

    pub fn predecessor(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).predecessor
    }

    /// All active nodes referencing `id`, as input or as successor.
    pub fn users(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.node(id);
        let mut users = node.usages.clone();
        users.extend(node.predecessor);
        users
    }

    /// Dependency nodes no other node consumes.
    pub fn dataflow_roots(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, n)| n.kind.class().is_dependency() && n.usages.is_empty())
            .map(|(id, _)| id)
            .collect()
    }

    /// An instruction behavior: one `InstrEnd`, no parameters, no returns.
    pub fn is_instruction(&self) -> bool {
        let ends = self.node_ids_of(ClassPattern::Kind(NodeClass::InstrEnd)).len();
        ends == 1
            && self.node_ids_of(ClassPattern::Kind(NodeClass::Return)).is_empty()
            && self.node_ids_of(ClassPattern::Kind(NodeClass::FuncParam)).is_empty()
    }

    /// A pure function behavior: one `Return`, no side effects, no
    /// instruction end.
    pub fn is_pure_function(&self) -> bool {
        self.node_ids_of(ClassPattern::Kind(NodeClass::Return)).len() == 1
            && self.node_ids_of(ClassPattern::SideEffect).is_empty()
            && self.node_ids_of(ClassPattern::Kind(NodeClass::InstrEnd)).is_empty()
    }

    /// Human-readable node description for diagnostics and dot labels.
    pub fn describe(&self, id: NodeId) -> String {
        match self.slot(id) {
            Some(node) => format!("({}) {}", id, node.kind),
            None => format!("({}) <deleted>", id),
        }
    }

    // ---- edge rewriting ----

    /// Rewrite exactly the first input slot of `id` holding `old` to
    /// `new`, maintaining the usage index. A node consuming the same input
    /// through several slots needs one call per slot.
    ///
    /// # Panics
    /// Panics when `old` is not an input of `id`, or either node is not
    /// active.
    pub fn replace_input(&mut self, id: NodeId, old: NodeId, new: NodeId) {
        assert!(
            self.is_active(id),
            "graph '{}': replace_input on inactive node {}",
            self.name,
            id
        );
        assert!(
            self.is_active(new),
            "graph '{}': replacement input {} is not active",
            self.name,
            new
        );
        let mut hit = false;
        for slot in self.node_mut(id).kind.inputs_mut() {
            if *slot == old {
                *slot = new;
                hit = true;
                break;
            }
        }
        if !hit {
            panic!(
                "graph '{}': {} is not an input of node {}",
                self.name, old, id
            );
        }
        self.remove_usage(old, id);
        self.node_mut(new).usages.push(id);
    }

    /// Rewrite the first successor slot of `id` holding `old` to `new`,
    /// moving the predecessor reference.
    ///
    /// # Panics
    /// Panics when `old` is not a successor of `id`, `new` is deleted, or
    /// `new` already has a different predecessor.
    pub fn replace_successor(&mut self, id: NodeId, old: NodeId, new: NodeId) {
        assert!(
            self.is_active(id),
            "graph '{}': replace_successor on inactive node {}",
            self.name,
            id
        );
        assert!(
            !self.is_deleted(new),
            "graph '{}': replacement successor {} is deleted",
            self.name,
            new
        );
        let mut hit = false;
        for slot in self.node_mut(id).kind.successors_mut() {
            if *slot == old {
                *slot = new;
                hit = true;
                break;
            }
        }
        if !hit {
            panic!(
                "graph '{}': {} is not a successor of node {}",
                self.name, old, id
            );
        }
        if self.node(old).predecessor == Some(id) {
            self.node_mut(old).predecessor = None;
        }
        if let Some(p) = self.node(new).predecessor {
            if p != id {
                panic!(
                    "graph '{}': node {} already has predecessor {}",
                    self.name, new, p
                );
            }
        }
        self.node_mut(new).predecessor = Some(id);
    }

    /// Move every usage of `id` over to `replacement`.
    pub fn replace_at_all_usages(&mut self, id: NodeId, replacement: NodeId) {
        assert_ne!(id, replacement, "graph '{}': self-replacement of {}", self.name, id);
        while let Some(&user) = self.node(id).usages.first() {
            self.replace_input(user, id, replacement);
        }
    }

    /// Replace `id` everywhere (usages and predecessor) with
    /// `replacement`, then delete it. A detached replacement is activated
    /// first; when dedup collapses it onto `id` itself, nothing changes.
    ///
    /// Returns the surviving node.
    pub fn replace_and_delete(&mut self, id: NodeId, replacement: NodeId) -> NodeId {
        let replacement = self.add_with_inputs(replacement);
        if replacement == id {
            return id;
        }
        assert!(
            self.is_active(id),
            "graph '{}': replace_and_delete on inactive node {}",
            self.name,
            id
        );
        self.replace_at_all_usages(id, replacement);
        if let Some(p) = self.node(id).predecessor {
            self.replace_successor(p, id, replacement);
        }
        let inputs = self.node(id).kind.collect_inputs();
        let deleted = self.safe_delete(id);
        assert!(
            deleted,
            "graph '{}': node {} still referenced after replacement",
            self.name, id
        );
        // Operands only the deleted node consumed are now obsolete.
        for &input in &inputs {
            if input != replacement {
                self.delete_if_unused_recursively(input);
            }
        }
        replacement
    }

    /// Delete `id` when nothing references it; otherwise do nothing and
    /// return `false`. Inputs keep their remaining consumers; sweeping
    /// newly unconsumed operands is [`Graph::delete_unused_dependencies`]'
    /// job.
    pub fn safe_delete(&mut self, id: NodeId) -> bool {
        assert!(
            self.is_active(id),
            "graph '{}': safe_delete on inactive node {}",
            self.name,
            id
        );
        {
            let node = self.node(id);
            if !node.usages.is_empty() || node.predecessor.is_some() {
                return false;
            }
        }
        let inputs = self.node(id).kind.collect_inputs();
        let succs = self.node(id).kind.collect_successors();
        for &input in &inputs {
            self.remove_usage(input, id);
        }
        for &succ in &succs {
            if self.node(succ).predecessor == Some(id) {
                self.node_mut(succ).predecessor = None;
            }
        }
        self.slots[id.index()] = None;
        true
    }

    fn delete_if_unused_recursively(&mut self, id: NodeId) {
        if !self.is_active(id) {
            return;
        }
        let node = self.node(id);
        if !node.kind.class().is_dependency()
            || !node.usages.is_empty()
            || node.predecessor.is_some()
        {
            return;
        }
        let inputs = self.node(id).kind.collect_inputs();
        self.safe_delete(id);
        for &input in &inputs {
            self.delete_if_unused_recursively(input);
        }
    }

    /// Delete every dependency node without a consumer, transitively.
    /// Returns the number of nodes removed.
    pub fn delete_unused_dependencies(&mut self) -> usize {
        let before = self.active_count();
        for id in self.node_ids_of(ClassPattern::Dependency) {
            self.delete_if_unused_recursively(id);
        }
        before - self.active_count()
    }

    /// Delete control nodes detached from the skeleton (no predecessor),
    /// except `Start` nodes, repeating until stable. Returns the number of
    /// nodes removed.
    pub fn delete_dangling_control_nodes(&mut self) -> usize {
        let before = self.active_count();
        loop {
            let mut changed = false;
            for id in self.node_ids_of(ClassPattern::Control) {
                if !self.is_active(id) {
                    continue;
                }
                let node = self.node(id);
                if node.kind.class() != NodeClass::Start
                    && node.predecessor.is_none()
                    && node.usages.is_empty()
                {
                    self.safe_delete(id);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        before - self.active_count()
    }

    fn remove_usage(&mut self, target: NodeId, user: NodeId) {
        let pos = self
            .node(target)
            .usages
            .iter()
            .position(|&u| u == user)
            .unwrap_or_else(|| {
                panic!(
                    "graph '{}': usage index broken, {} not registered on {}",
                    self.name, user, target
                )
            });
        self.node_mut(target).usages.remove(pos);
    }

    // ---- copying ----

    /// Copy a single node as a new detached node of this graph.
    ///
    /// `Deep` recursively copies the input tree (one fresh copy per slot,
    /// shared inputs fork); `Shallow` shares all edges. Successors are
    /// shared in both modes. The copies are detached until added.
    pub fn copy_node(&mut self, id: NodeId, mode: CopyMode) -> NodeId {
        let mut kind = self.node(id).kind.clone();
        if mode == CopyMode::Deep {
            let originals = kind.collect_inputs();
            let mut copies = Vec::with_capacity(originals.len());
            for &input in &originals {
                copies.push(self.copy_node(input, CopyMode::Deep));
            }
            for (slot, copy) in kind.inputs_mut().into_iter().zip(copies) {
                *slot = copy;
            }
        }
        self.create(kind)
    }

    /// Copy every active node into `target`, remapping all edges, and
    /// activate the copies. Returns the old→new id mapping (accounting
    /// for unique-node dedup against `target`'s existing contents).
    pub fn copy_into(&self, target: &mut Graph) -> indexmap::IndexMap<NodeId, NodeId> {
        let mut map = indexmap::IndexMap::new();
        for (id, node) in self.nodes() {
            let copy = target.create(node.kind.clone());
            map.insert(id, copy);
        }
        // Remap edge slots onto the fresh reservations.
        for &copy in map.values() {
            let node = target.node_mut(copy);
            for slot in node.kind.inputs_mut() {
                *slot = map[&*slot];
            }
            for slot in node.kind.successors_mut() {
                *slot = map[&*slot];
            }
        }
        let order: Vec<NodeId> = map.keys().copied().collect();
        for old in order {
            let copy = map[&old];
            let added = target.add_with_inputs(copy);
            if added != copy {
                map.insert(old, added);
            }
        }
        map
    }

    /// Clone this graph through the copy machinery (fresh ids, same
    /// structure).
    pub fn copy(&self, name: impl Into<String>) -> (Graph, indexmap::IndexMap<NodeId, NodeId>) {
        let mut target = Graph::new(name);
        let map = self.copy_into(&mut target);
        (target, map)
    }

    // ---- controlled kind edits (merging support) ----

    /// Retype a value-selection node.
    ///
    /// # Panics
    /// Panics for kinds other than `Select` / `SelectByInstr`.
    pub fn set_selection_type(&mut self, id: NodeId, new_ty: crate::ty::Type) {
        let name = self.name.clone();
        match &mut self.node_mut(id).kind {
            NodeKind::Select { ty, .. } | NodeKind::SelectByInstr { ty, .. } => *ty = new_ty,
            other => panic!(
                "graph '{}': cannot retype non-selection node {} ({})",
                name, id, other
            ),
        }
    }

    /// Append a case to an active `SelectByInstr` node, maintaining the
    /// usage index.
    pub fn select_by_instr_push_case(
        &mut self,
        id: NodeId,
        owners: std::collections::BTreeSet<String>,
        value: NodeId,
    ) {
        assert!(
            self.is_active(id) && self.is_active(value),
            "graph '{}': select_by_instr_push_case on inactive nodes",
            self.name
        );
        let name = self.name.clone();
        match &mut self.node_mut(id).kind {
            NodeKind::SelectByInstr { cases, instrs, .. } => {
                cases.push(value);
                instrs.push(owners);
            }
            other => panic!(
                "graph '{}': node {} ({}) is not a SelectByInstr",
                name, id, other
            ),
        }
        self.node_mut(value).usages.push(id);
    }

    /// Append every case of `src` (a `SelectByInstr`) onto `dst`.
    pub fn select_by_instr_absorb(&mut self, dst: NodeId, src: NodeId) {
        let (cases, instrs) = match &self.node(src).kind {
            NodeKind::SelectByInstr { cases, instrs, .. } => (cases.clone(), instrs.clone()),
            other => panic!(
                "graph '{}': node {} ({}) is not a SelectByInstr",
                self.name, src, other
            ),
        };
        for (case, owners) in cases.into_iter().zip(instrs) {
            self.select_by_instr_push_case(dst, owners, case);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use smallvec::smallvec;

    use super::*;
    use crate::ty::{BuiltInOp, Constant, Type};

    fn constant(g: &mut Graph, v: u128) -> NodeId {
        let id = g.create(NodeKind::Constant {
            value: Constant::new(v, Type::Bits(8)),
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

    fn add_op(g: &mut Graph, a: NodeId, b: NodeId) -> NodeId {
        let id = g.create(NodeKind::BuiltInCall {
            op: BuiltInOp::Add,
            args: smallvec![a, b],
            ty: Type::Bits(8),
        });
        g.add(id)
    }

    #[test]
    fn create_leaves_node_detached_until_add() {
        let mut g = Graph::new("t");
        let id = g.create(NodeKind::FieldRef {
            field: "rs1".into(),
            ty: Type::Bits(5),
        });
        assert!(g.is_uninitialized(id));
        assert_eq!(g.active_count(), 0);
        g.add(id);
        assert!(g.is_active(id));
        assert_eq!(g.active_count(), 1);
    }

    #[test]
    fn add_is_idempotent_for_active_nodes() {
        let mut g = Graph::new("t");
        let id = field(&mut g, "rs1");
        assert_eq!(g.add(id), id);
        assert_eq!(g.active_count(), 1);
    }

    #[test]
    #[should_panic(expected = "not active")]
    fn add_rejects_detached_inputs() {
        let mut g = Graph::new("t");
        let a = g.create(NodeKind::FieldRef {
            field: "rs1".into(),
            ty: Type::Bits(8),
        });
        let sum = g.create(NodeKind::BuiltInCall {
            op: BuiltInOp::Add,
            args: smallvec![a, a],
            ty: Type::Bits(8),
        });
        g.add(sum);
    }

    #[test]
    fn add_with_inputs_activates_transitively() {
        let mut g = Graph::new("t");
        let a = g.create(NodeKind::FieldRef {
            field: "rs1".into(),
            ty: Type::Bits(8),
        });
        let b = g.create(NodeKind::Constant {
            value: Constant::new(1, Type::Bits(8)),
        });
        let sum = g.create(NodeKind::BuiltInCall {
            op: BuiltInOp::Add,
            args: smallvec![a, b],
            ty: Type::Bits(8),
        });
        let sum = g.add_with_inputs(sum);
        assert!(g.is_active(a) && g.is_active(b) && g.is_active(sum));
        assert_eq!(g.usages(a), &[sum]);
        assert_eq!(g.usages(b), &[sum]);
    }

    #[test]
    fn unique_nodes_deduplicate_on_add() {
        let mut g = Graph::new("t");
        let a = constant(&mut g, 7);
        let second = g.create(NodeKind::Constant {
            value: Constant::new(7, Type::Bits(8)),
        });
        let b = g.add(second);
        assert_eq!(a, b);
        // The reservation never joined the graph.
        assert!(g.is_uninitialized(second));
        assert_eq!(g.active_count(), 1);
    }

    #[test]
    fn dedup_rewrites_slots_during_transitive_add() {
        let mut g = Graph::new("t");
        let existing = constant(&mut g, 7);
        let fresh = g.create(NodeKind::Constant {
            value: Constant::new(7, Type::Bits(8)),
        });
        let sum = g.create(NodeKind::BuiltInCall {
            op: BuiltInOp::Add,
            args: smallvec![fresh, fresh],
            ty: Type::Bits(8),
        });
        let sum = g.add_with_inputs(sum);
        assert_eq!(
            g.kind(sum).collect_inputs().as_slice(),
            &[existing, existing]
        );
        assert_eq!(g.usages(existing), &[sum, sum]);
    }

    #[test]
    fn constants_of_different_value_stay_distinct() {
        let mut g = Graph::new("t");
        let a = constant(&mut g, 1);
        let b = constant(&mut g, 2);
        assert_ne!(a, b);
        assert_eq!(g.active_count(), 2);
    }

    #[test]
    fn usages_track_multiplicity() {
        let mut g = Graph::new("t");
        let a = field(&mut g, "rs1");
        let sum = add_op(&mut g, a, a);
        assert_eq!(g.usages(a), &[sum, sum]);
        assert_eq!(g.usage_count(a), 2);
    }

    #[test]
    fn replace_input_rewrites_one_slot_per_call() {
        let mut g = Graph::new("t");
        let a = field(&mut g, "rs1");
        let b = field(&mut g, "rs2");
        let sum = add_op(&mut g, a, a);
        g.replace_input(sum, a, b);
        assert_eq!(g.kind(sum).collect_inputs().as_slice(), &[b, a]);
        assert_eq!(g.usages(a), &[sum]);
        assert_eq!(g.usages(b), &[sum]);
    }

    #[test]
    #[should_panic(expected = "is not an input")]
    fn replace_input_panics_when_old_is_absent() {
        let mut g = Graph::new("t");
        let a = field(&mut g, "rs1");
        let b = field(&mut g, "rs2");
        let c = field(&mut g, "rs3");
        let sum = add_op(&mut g, a, a);
        g.replace_input(sum, b, c);
    }

    #[test]
    fn replace_and_delete_moves_usages_and_predecessor() {
        let mut g = Graph::new("t");
        let a = field(&mut g, "rs1");
        let b = field(&mut g, "rs2");
        let sum = add_op(&mut g, a, b);
        let user = add_op(&mut g, sum, sum);
        let survivor = g.replace_and_delete(sum, a);
        assert_eq!(survivor, a);
        assert!(g.is_deleted(sum));
        assert_eq!(g.kind(user).collect_inputs().as_slice(), &[a, a]);
        // b lost its only consumer and was cleaned up transitively.
        assert!(g.is_deleted(b));
        assert_eq!(g.usages(a), &[user, user]);
    }

    #[test]
    fn replace_and_delete_rewires_control_flow() {
        let mut g = Graph::new("t");
        let end = g.create(NodeKind::InstrEnd {
            side_effects: smallvec![],
        });
        g.add(end);
        let mid = g.create(NodeKind::BranchBegin { next: end });
        g.add(mid);
        let start = g.create(NodeKind::Start { next: mid });
        g.add(start);
        assert_eq!(g.predecessor(mid), Some(start));

        let end2 = g.create(NodeKind::InstrEnd {
            side_effects: smallvec![],
        });
        g.add(end2);
        // Splice mid out in favor of its own successor's sibling.
        g.replace_and_delete(mid, end2);
        assert!(g.is_deleted(mid));
        assert_eq!(g.kind(start).collect_successors().as_slice(), &[end2]);
        assert_eq!(g.predecessor(end2), Some(start));
        assert_eq!(g.predecessor(end), None);
    }

    #[test]
    fn safe_delete_is_a_noop_while_used() {
        let mut g = Graph::new("t");
        let a = field(&mut g, "rs1");
        let _sum = add_op(&mut g, a, a);
        assert!(!g.safe_delete(a));
        assert!(g.is_active(a));
    }

    #[test]
    fn safe_delete_leaves_inputs_for_the_sweep() {
        let mut g = Graph::new("t");
        let a = field(&mut g, "rs1");
        let b = field(&mut g, "rs2");
        let inner = add_op(&mut g, a, b);
        let outer = add_op(&mut g, inner, inner);
        assert!(g.safe_delete(outer));
        assert!(g.is_deleted(outer));
        // Operands survive the delete itself...
        assert!(g.is_active(inner));
        // ...and fall to the unused-dependency sweep.
        assert_eq!(g.delete_unused_dependencies(), 3);
        assert_eq!(g.active_count(), 0);
    }

    #[test]
    #[should_panic(expected = "already has predecessor")]
    fn second_predecessor_is_rejected() {
        let mut g = Graph::new("t");
        let end = g.create(NodeKind::InstrEnd {
            side_effects: smallvec![],
        });
        g.add(end);
        let s1 = g.create(NodeKind::Start { next: end });
        g.add(s1);
        let s2 = g.create(NodeKind::Start { next: end });
        g.add(s2);
    }

    #[test]
    fn deep_copy_forks_the_input_tree() {
        let mut g = Graph::new("t");
        let a = field(&mut g, "rs1");
        let b = field(&mut g, "rs2");
        let sum = add_op(&mut g, a, b);
        let copy = g.copy_node(sum, CopyMode::Deep);
        assert!(g.is_uninitialized(copy));
        let copied_inputs = g.kind(copy).collect_inputs();
        assert_ne!(copied_inputs.as_slice(), &[a, b]);
        assert!(g.kind(copy).same_shape(g.kind(sum)));
        for (&orig, &fresh) in [a, b].iter().zip(copied_inputs.iter()) {
            assert!(g.kind(fresh).same_shape(g.kind(orig)));
        }
    }

    #[test]
    fn shallow_copy_shares_inputs() {
        let mut g = Graph::new("t");
        let a = field(&mut g, "rs1");
        let b = field(&mut g, "rs2");
        let sum = add_op(&mut g, a, b);
        let copy = g.copy_node(sum, CopyMode::Shallow);
        assert_eq!(g.kind(copy).collect_inputs().as_slice(), &[a, b]);
        // Detached copies do not appear in the usage index yet.
        assert_eq!(g.usages(a), &[sum]);
        let copy = g.add(copy);
        assert_eq!(g.usages(a), &[sum, copy]);
    }

    #[test]
    fn copy_into_remaps_every_edge() {
        let mut g = Graph::new("src");
        let a = field(&mut g, "rs1");
        let c = constant(&mut g, 3);
        let sum = add_op(&mut g, a, c);
        let ret = g.create(NodeKind::Return { value: sum });
        g.add(ret);
        let start = g.create(NodeKind::Start { next: ret });
        g.add(start);

        let mut target = Graph::new("dst");
        let map = g.copy_into(&mut target);
        assert_eq!(map.len(), 5);
        assert_eq!(target.active_count(), 5);
        let new_sum = map[&sum];
        assert_eq!(
            target.kind(new_sum).collect_inputs().as_slice(),
            &[map[&a], map[&c]]
        );
        assert_eq!(target.kind(map[&start]).collect_successors().as_slice(), &[map[&ret]]);
        assert_eq!(target.predecessor(map[&ret]), Some(map[&start]));
    }

    #[test]
    fn copy_into_dedups_against_existing_constants() {
        let mut g = Graph::new("src");
        let c = constant(&mut g, 3);
        let sum = add_op(&mut g, c, c);

        let mut target = Graph::new("dst");
        let existing = constant(&mut target, 3);
        let map = g.copy_into(&mut target);
        assert_eq!(map[&c], existing);
        assert_eq!(
            target.kind(map[&sum]).collect_inputs().as_slice(),
            &[existing, existing]
        );
    }

    #[test]
    fn dataflow_roots_are_unconsumed_dependencies() {
        let mut g = Graph::new("t");
        let a = field(&mut g, "rs1");
        let b = field(&mut g, "rs2");
        let sum = add_op(&mut g, a, b);
        assert_eq!(g.dataflow_roots(), vec![sum]);
    }

    #[test]
    fn delete_unused_dependencies_sweeps_transitively() {
        let mut g = Graph::new("t");
        let a = field(&mut g, "rs1");
        let b = field(&mut g, "rs2");
        let _sum = add_op(&mut g, a, b);
        let kept = field(&mut g, "kept");
        let ret = g.create(NodeKind::Return { value: kept });
        g.add(ret);
        let removed = g.delete_unused_dependencies();
        assert_eq!(removed, 3);
        assert!(g.is_active(kept));
        assert!(g.is_active(ret));
    }

    #[test]
    fn delete_dangling_control_nodes_spares_start() {
        let mut g = Graph::new("t");
        let end = g.create(NodeKind::InstrEnd {
            side_effects: smallvec![],
        });
        g.add(end);
        let start = g.create(NodeKind::Start { next: end });
        g.add(start);
        // A detached chain not reachable from any start.
        let stray_end = g.create(NodeKind::BranchEnd {
            side_effects: smallvec![],
        });
        g.add(stray_end);
        let stray = g.create(NodeKind::BranchBegin { next: stray_end });
        g.add(stray);
        let removed = g.delete_dangling_control_nodes();
        assert_eq!(removed, 2);
        assert!(g.is_active(start) && g.is_active(end));
    }

    #[test]
    fn select_by_instr_case_editing_updates_usages() {
        let mut g = Graph::new("t");
        let a = field(&mut g, "rs1");
        let b = field(&mut g, "rs2");
        let sel = g.create(NodeKind::SelectByInstr {
            cases: smallvec![a],
            instrs: vec![BTreeSet::from(["ADD".to_string()])],
            ty: Type::Bits(8),
        });
        let sel = g.add(sel);
        g.select_by_instr_push_case(sel, BTreeSet::from(["SUB".to_string()]), b);
        assert_eq!(g.kind(sel).collect_inputs().as_slice(), &[a, b]);
        assert_eq!(g.usages(b), &[sel]);
    }

    #[test]
    fn graph_serde_roundtrip() {
        let mut g = Graph::new("t");
        let a = field(&mut g, "rs1");
        let c = constant(&mut g, 3);
        let sum = add_op(&mut g, a, c);
        let json = serde_json::to_string(&g).unwrap();
        let back: Graph = serde_json::from_str(&json).unwrap();
        assert_eq!(back.active_count(), 3);
        assert_eq!(back.usages(a), &[sum]);
        assert!(back.kind(sum).same_shape(g.kind(sum)));
    }
}

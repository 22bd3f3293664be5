//! Completeness-checked node dispatch.
//!
//! A [`Dispatcher`] maps every concrete node kind in its scope to the most
//! specific registered handler. Completeness is checked when the
//! dispatcher is *built*: a missing kind fails construction with the list
//! of unhandled kinds and ready-to-paste stub registrations, before any
//! dispatch happens. Adding a kind to [`NodeClass::ALL`] therefore breaks
//! every incomplete dispatcher loudly instead of silently skipping nodes.

use thiserror::Error;

use crate::graph::Graph;
use crate::id::NodeId;
use crate::node::{ClassPattern, NodeClass};

/// The set of concrete kinds a dispatcher must cover.
#[derive(Debug, Clone)]
pub struct DispatchScope {
    classes: Vec<NodeClass>,
}

impl DispatchScope {
    /// Every kind matched by the pattern.
    pub fn of(pattern: ClassPattern) -> Self {
        DispatchScope {
            classes: NodeClass::ALL
                .into_iter()
                .filter(|c| pattern.matches(*c))
                .collect(),
        }
    }

    pub fn all() -> Self {
        Self::of(ClassPattern::Any)
    }

    pub fn expressions() -> Self {
        Self::of(ClassPattern::Expression)
    }

    pub fn dependencies() -> Self {
        Self::of(ClassPattern::Dependency)
    }

    pub fn control() -> Self {
        Self::of(ClassPattern::Control)
    }

    pub fn classes(&self) -> &[NodeClass] {
        &self.classes
    }

    pub fn contains(&self, class: NodeClass) -> bool {
        self.classes.contains(&class)
    }
}

/// Handler signature. The dispatcher itself is passed back in so handlers
/// can recurse into operands.
pub type Handler<C, R> = Box<dyn Fn(&Dispatcher<C, R>, &mut C, &Graph, NodeId) -> R>;

struct Entry<C, R> {
    pattern: ClassPattern,
    handler: Handler<C, R>,
}

/// Failure to assemble a dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(
        "dispatcher is missing handlers for: {}\nproposed stubs:\n{stubs}",
        .missing.join(", ")
    )]
    MissingHandlers {
        missing: Vec<&'static str>,
        stubs: String,
    },
}

/// Ordered handler registrations, compiled by [`DispatcherBuilder::build`].
pub struct DispatcherBuilder<C, R> {
    entries: Vec<Entry<C, R>>,
}

impl<C, R> Default for DispatcherBuilder<C, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, R> DispatcherBuilder<C, R> {
    pub fn new() -> Self {
        DispatcherBuilder {
            entries: Vec::new(),
        }
    }

    /// Register a handler for a pattern. Later registrations of equal
    /// specificity do not shadow earlier ones.
    pub fn on<F>(mut self, pattern: ClassPattern, handler: F) -> Self
    where
        F: Fn(&Dispatcher<C, R>, &mut C, &Graph, NodeId) -> R + 'static,
    {
        self.entries.push(Entry {
            pattern,
            handler: Box::new(handler),
        });
        self
    }

    /// Compile the per-kind table, choosing for each kind in scope the
    /// most specific matching handler (exact kind > narrow family > broad
    /// family > `Any`; ties by registration order).
    pub fn build(self, scope: DispatchScope) -> Result<Dispatcher<C, R>, DispatchError> {
        let mut table: Vec<Option<usize>> = vec![None; NodeClass::ALL.len()];
        let mut missing = Vec::new();
        for &class in scope.classes() {
            let mut best: Option<(usize, u8)> = None;
            for (i, entry) in self.entries.iter().enumerate() {
                if !entry.pattern.matches(class) {
                    continue;
                }
                let rank = entry.pattern.specificity();
                if best.map_or(true, |(_, r)| rank > r) {
                    best = Some((i, rank));
                }
            }
            match best {
                Some((i, _)) => table[class.index()] = Some(i),
                None => missing.push(class),
            }
        }
        if !missing.is_empty() {
            let stubs = missing
                .iter()
                .map(|c| {
                    format!(
                        "    .on(ClassPattern::Kind(NodeClass::{n}), |_d, _cx, _g, _id| todo!(\"handle {n}\"))",
                        n = c.name()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            return Err(DispatchError::MissingHandlers {
                missing: missing.iter().map(|c| c.name()).collect(),
                stubs,
            });
        }
        Ok(Dispatcher {
            entries: self.entries,
            table,
            scope,
        })
    }
}

/// A compiled, total dispatch table over its scope.
pub struct Dispatcher<C, R> {
    entries: Vec<Entry<C, R>>,
    table: Vec<Option<usize>>,
    scope: DispatchScope,
}

impl<C, R> Dispatcher<C, R> {
    /// Invoke the handler for the node's kind.
    ///
    /// # Panics
    /// Panics when the node's kind lies outside the dispatcher's scope;
    /// reaching such a node is a bug in the calling traversal.
    pub fn dispatch(&self, cx: &mut C, graph: &Graph, id: NodeId) -> R {
        let class = graph.node(id).kind().class();
        let idx = self.table[class.index()].unwrap_or_else(|| {
            panic!(
                "dispatch of {} {}: kind {} is outside the dispatcher scope",
                graph.name,
                graph.describe(id),
                class
            )
        });
        (self.entries[idx].handler)(self, cx, graph, id)
    }

    pub fn scope(&self) -> &DispatchScope {
        &self.scope
    }

    /// Whether a handler is compiled in for the class.
    pub fn covers(&self, class: NodeClass) -> bool {
        self.table[class.index()].is_some()
    }
}

#[cfg(test)]
mod tests {
    use smallvec::smallvec;

    use super::*;
    use crate::node::NodeKind;
    use crate::ty::{BuiltInOp, Constant, Type};

    fn tiny_graph() -> (Graph, NodeId, NodeId, NodeId) {
        let mut g = Graph::new("t");
        let c = g.create(NodeKind::Constant {
            value: Constant::new(1, Type::Bits(8)),
        });
        let c = g.add(c);
        let f = g.create(NodeKind::FieldRef {
            field: "rs1".into(),
            ty: Type::Bits(8),
        });
        let f = g.add(f);
        let sum = g.create(NodeKind::BuiltInCall {
            op: BuiltInOp::Add,
            args: smallvec![c, f],
            ty: Type::Bits(8),
        });
        let sum = g.add(sum);
        (g, c, f, sum)
    }

    #[test]
    fn build_fails_naming_each_unhandled_kind() {
        let result = DispatcherBuilder::<(), ()>::new()
            .on(ClassPattern::Kind(NodeClass::Constant), |_, _, _, _| ())
            .build(DispatchScope::expressions());
        let err = result.err().expect("must be incomplete");
        let DispatchError::MissingHandlers { missing, stubs } = err;
        assert!(missing.contains(&"Select"));
        assert!(missing.contains(&"ReadMem"));
        assert!(!missing.contains(&"Constant"));
        assert!(!missing.contains(&"WriteReg"), "side effects out of scope");
        assert!(stubs.contains("todo!(\"handle Select\")"));
    }

    #[test]
    fn catch_all_makes_any_scope_complete() {
        let d = DispatcherBuilder::<(), u32>::new()
            .on(ClassPattern::Any, |_, _, _, _| 0)
            .build(DispatchScope::all())
            .unwrap();
        for class in NodeClass::ALL {
            assert!(d.covers(class));
        }
    }

    #[test]
    fn most_specific_handler_wins() {
        let d = DispatcherBuilder::<(), &'static str>::new()
            .on(ClassPattern::Any, |_, _, _, _| "any")
            .on(ClassPattern::Expression, |_, _, _, _| "expr")
            .on(ClassPattern::Kind(NodeClass::Constant), |_, _, _, _| {
                "const"
            })
            .build(DispatchScope::all())
            .unwrap();
        let (g, c, f, sum) = tiny_graph();
        assert_eq!(d.dispatch(&mut (), &g, c), "const");
        assert_eq!(d.dispatch(&mut (), &g, f), "expr");
        assert_eq!(d.dispatch(&mut (), &g, sum), "expr");
    }

    #[test]
    fn registration_order_breaks_specificity_ties() {
        let d = DispatcherBuilder::<(), &'static str>::new()
            .on(ClassPattern::Expression, |_, _, _, _| "first")
            .on(ClassPattern::Expression, |_, _, _, _| "second")
            .build(DispatchScope::expressions())
            .unwrap();
        let (g, c, _, _) = tiny_graph();
        assert_eq!(d.dispatch(&mut (), &g, c), "first");
    }

    #[test]
    fn handlers_recurse_through_the_dispatcher() {
        // Count the nodes of an expression tree through recursive dispatch.
        let d = DispatcherBuilder::<(), usize>::new()
            .on(ClassPattern::Any, |d, cx, g, id| {
                1 + g
                    .kind(id)
                    .collect_inputs()
                    .iter()
                    .map(|&i| d.dispatch(cx, g, i))
                    .sum::<usize>()
            })
            .build(DispatchScope::all())
            .unwrap();
        let (g, _, _, sum) = tiny_graph();
        assert_eq!(d.dispatch(&mut (), &g, sum), 3);
    }

    #[test]
    #[should_panic(expected = "outside the dispatcher scope")]
    fn out_of_scope_dispatch_panics() {
        let d = DispatcherBuilder::<(), ()>::new()
            .on(ClassPattern::Any, |_, _, _, _| ())
            .build(DispatchScope::control())
            .unwrap();
        let (g, c, _, _) = tiny_graph();
        d.dispatch(&mut (), &g, c);
    }
}

//! Pure-function inlining: subgraph extraction with boundary patching.
//!
//! The callee's body is copied into the target graph, each copied
//! parameter reference is patched over to the corresponding argument
//! expression, and the copied control skeleton is unwound. What remains
//! is the callee's return-value expression, woven into the target's
//! dependency DAG and ready to be consumed at the call site.

use crate::error::IrError;
use crate::graph::Graph;
use crate::id::NodeId;
use crate::node::{ClassPattern, NodeClass, NodeKind};

/// Inline `callee` into `target`, substituting `args` (active nodes of
/// `target`, by parameter position) for the callee's parameters.
///
/// Returns the copied return-value expression. The caller is expected to
/// wire it into a consumer; operand trees that became unreachable during
/// patching are left to [`Graph::delete_unused_dependencies`].
///
/// # Panics
/// Panics when an argument is not an active node of `target`.
pub fn inline_pure_function(
    target: &mut Graph,
    callee: &Graph,
    args: &[NodeId],
) -> Result<NodeId, IrError> {
    if !callee.is_pure_function() {
        return Err(IrError::NotPureFunction {
            graph: callee.name.clone(),
        });
    }
    let params = callee.node_ids_of(ClassPattern::Kind(NodeClass::FuncParam));
    let expected = params
        .iter()
        .map(|&p| match callee.kind(p) {
            NodeKind::FuncParam { index, .. } => *index as usize + 1,
            _ => unreachable!("node_ids_of returned a non-parameter"),
        })
        .max()
        .unwrap_or(0);
    if args.len() != expected {
        return Err(IrError::ArityMismatch {
            graph: callee.name.clone(),
            expected,
            actual: args.len(),
        });
    }
    for &arg in args {
        assert!(
            target.is_active(arg),
            "graph '{}': inline argument {} is not active",
            target.name,
            arg
        );
    }

    let map = callee.copy_into(target);

    // Boundary patch: parameters become the caller's argument expressions.
    for &param in &params {
        let index = match callee.kind(param) {
            NodeKind::FuncParam { index, .. } => *index as usize,
            _ => unreachable!(),
        };
        let copied = map[&param];
        target.replace_at_all_usages(copied, args[index]);
        target.safe_delete(copied);
    }

    // The value flows out of the single copied return node.
    let ret = callee.node_ids_of(ClassPattern::Kind(NodeClass::Return))[0];
    let ret = map[&ret];
    let value = target.kind(ret).collect_inputs()[0];

    // Unwind the copied skeleton: entry nodes first, then whatever their
    // removal detaches, until everything control-shaped is gone.
    let skeleton: Vec<NodeId> = callee
        .node_ids_of(ClassPattern::Control)
        .into_iter()
        .map(|c| map[&c])
        .collect();
    loop {
        let mut changed = false;
        for &ctrl in &skeleton {
            if target.is_active(ctrl)
                && target.predecessor(ctrl).is_none()
                && target.usages(ctrl).is_empty()
                && target.safe_delete(ctrl)
            {
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    Ok(value)
}

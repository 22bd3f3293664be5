//! Recoverable IR-level errors.
//!
//! Only caller mistakes live here. Structural invariant violations
//! (broken usage index, double predecessor, edges to deleted nodes) are
//! panics with node context, because they mean a transformation pass is
//! buggy and no caller can meaningfully recover.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IrError {
    #[error("graph '{graph}' is not a pure function and cannot be inlined")]
    NotPureFunction { graph: String },

    #[error("inlining '{graph}': got {actual} argument(s), expected {expected}")]
    ArityMismatch {
        graph: String,
        expected: usize,
        actual: usize,
    },
}

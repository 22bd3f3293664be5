pub mod dispatch;
pub mod dot;
pub mod error;
pub mod graph;
pub mod id;
pub mod inline;
pub mod matching;
pub mod merge;
pub mod node;
pub mod simplify;
pub mod ty;
pub mod verify;

// Re-export commonly used types
pub use dispatch::{DispatchError, DispatchScope, Dispatcher, DispatcherBuilder};
pub use error::IrError;
pub use graph::{CopyMode, Graph};
pub use id::NodeId;
pub use inline::inline_pure_function;
pub use merge::{merge_nodes, MergeStrategy, SelectByInstrInputMerge, SelectInputMerge};
pub use node::{ClassPattern, DataValue, Node, NodeClass, NodeKind, NodeState, Slots};
pub use simplify::{
    canonicalize_to_fixpoint, default_rules, simplify_to_fixpoint, Rewrite, SimplificationRule,
};
pub use ty::{merge_types, BuiltInOp, Constant, Type};
pub use verify::{verify, Violation};

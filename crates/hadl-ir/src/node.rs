//! Node protocol: the closed kind union and its edge classification.
//!
//! Every generic graph algorithm (verification, copying, dispatch,
//! merging, dot export) walks nodes exclusively through
//! [`NodeKind::collect_inputs`], [`NodeKind::collect_successors`], and
//! [`NodeKind::collect_data`]. A kind that classifies its edges correctly
//! participates in all of them for free.
//!
//! Edge classification:
//! - *inputs* are value dependencies (operands, conditions, addresses,
//!   side-effect lists held by end nodes);
//! - *successors* are forward control-flow edges owned by exactly one
//!   predecessor;
//! - *data* is everything else a node carries, compared structurally for
//!   duplicate detection and merging.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::id::NodeId;
use crate::ty::{BuiltInOp, Constant, Type};

/// Inline-capacity vector for a node's edge slots.
pub type Slots = SmallVec<[NodeId; 4]>;

/// Lifecycle state of a node. Transitions are monotonic:
/// `Uninitialized → Active → Deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Created but not yet part of its graph.
    Uninitialized,
    /// Live member of the graph; edges are mirrored in the usage index.
    Active,
}

/// A node slot: kind payload plus bookkeeping the graph maintains.
///
/// `usages` lists the active nodes holding this node as an input, once per
/// input slot (multiplicity matters). `predecessor` is the single control
/// node holding this node as a successor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) state: NodeState,
    pub(crate) usages: Vec<NodeId>,
    pub(crate) predecessor: Option<NodeId>,
}

impl Node {
    pub(crate) fn detached(kind: NodeKind) -> Self {
        Node {
            kind,
            state: NodeState::Uninitialized,
            usages: Vec::new(),
            predecessor: None,
        }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn usages(&self) -> &[NodeId] {
        &self.usages
    }

    pub fn usage_count(&self) -> usize {
        self.usages.len()
    }

    pub fn predecessor(&self) -> Option<NodeId> {
        self.predecessor
    }
}

/// Data payload entries produced by [`NodeKind::collect_data`].
///
/// Two nodes are structurally equal when their classes, data vectors, and
/// input slots all match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataValue {
    Const(Constant),
    Str(String),
    Int(u64),
    Ty(Type),
    Op(BuiltInOp),
    InstrSets(Vec<BTreeSet<String>>),
}

/// The closed union of node kinds.
///
/// Control kinds thread the instruction skeleton; dependency kinds form a
/// shareable acyclic expression DAG; side-effect kinds are dependency
/// nodes anchored into control flow through the ordered lists of end
/// nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    // ---- control ----
    /// Entry of a behavior; its single successor starts the skeleton.
    Start { next: NodeId },
    /// Invocation of another instruction by name, then control continues.
    InstrCall {
        target: String,
        args: Slots,
        next: NodeId,
    },
    /// Two-way control split on a boolean condition.
    If {
        condition: NodeId,
        on_true: NodeId,
        on_false: NodeId,
    },
    /// Entry of one branch of a control split.
    BranchBegin { next: NodeId },
    /// End of a branch, holding its ordered side effects.
    BranchEnd { side_effects: Slots },
    /// End of a whole instruction behavior, holding its ordered side effects.
    InstrEnd { side_effects: Slots },
    /// End of a pure function behavior, yielding one value.
    Return { value: NodeId },

    // ---- expressions ----
    Constant { value: Constant },
    /// Reference to an encoding field of the instruction word.
    FieldRef { field: String, ty: Type },
    /// Formal parameter of a pure function, by position.
    FuncParam { name: String, index: u16, ty: Type },
    /// Read from a register resource at an address.
    ReadReg {
        resource: String,
        address: NodeId,
        ty: Type,
    },
    /// Read of `width` bits from memory.
    ReadMem {
        address: NodeId,
        width: u32,
        ty: Type,
    },
    BuiltInCall {
        op: BuiltInOp,
        args: Slots,
        ty: Type,
    },
    /// Value selection on a boolean condition.
    Select {
        condition: NodeId,
        on_true: NodeId,
        on_false: NodeId,
        ty: Type,
    },
    /// Value selection on the identity of the executing instruction.
    /// `cases[i]` is taken when the instruction is in `instrs[i]`.
    SelectByInstr {
        cases: Slots,
        instrs: Vec<BTreeSet<String>>,
        ty: Type,
    },
    ZeroExtend { value: NodeId, ty: Type },
    SignExtend { value: NodeId, ty: Type },
    Truncate { value: NodeId, ty: Type },

    // ---- side effects ----
    /// Write to a register resource, optionally guarded by a condition.
    WriteReg {
        resource: String,
        address: NodeId,
        value: NodeId,
        condition: Option<NodeId>,
    },
    /// Write of `width` bits to memory, optionally guarded.
    WriteMem {
        address: NodeId,
        width: u32,
        value: NodeId,
        condition: Option<NodeId>,
    },
}

/// Fieldless mirror of [`NodeKind`]: the source-of-truth roster of
/// concrete kinds, used by dispatch completeness checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeClass {
    Start,
    InstrCall,
    If,
    BranchBegin,
    BranchEnd,
    InstrEnd,
    Return,
    Constant,
    FieldRef,
    FuncParam,
    ReadReg,
    ReadMem,
    BuiltInCall,
    Select,
    SelectByInstr,
    ZeroExtend,
    SignExtend,
    Truncate,
    WriteReg,
    WriteMem,
}

impl NodeClass {
    /// Every concrete kind, in declaration order.
    pub const ALL: [NodeClass; 20] = [
        NodeClass::Start,
        NodeClass::InstrCall,
        NodeClass::If,
        NodeClass::BranchBegin,
        NodeClass::BranchEnd,
        NodeClass::InstrEnd,
        NodeClass::Return,
        NodeClass::Constant,
        NodeClass::FieldRef,
        NodeClass::FuncParam,
        NodeClass::ReadReg,
        NodeClass::ReadMem,
        NodeClass::BuiltInCall,
        NodeClass::Select,
        NodeClass::SelectByInstr,
        NodeClass::ZeroExtend,
        NodeClass::SignExtend,
        NodeClass::Truncate,
        NodeClass::WriteReg,
        NodeClass::WriteMem,
    ];

    /// Stable table index of this class.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeClass::Start => "Start",
            NodeClass::InstrCall => "InstrCall",
            NodeClass::If => "If",
            NodeClass::BranchBegin => "BranchBegin",
            NodeClass::BranchEnd => "BranchEnd",
            NodeClass::InstrEnd => "InstrEnd",
            NodeClass::Return => "Return",
            NodeClass::Constant => "Constant",
            NodeClass::FieldRef => "FieldRef",
            NodeClass::FuncParam => "FuncParam",
            NodeClass::ReadReg => "ReadReg",
            NodeClass::ReadMem => "ReadMem",
            NodeClass::BuiltInCall => "BuiltInCall",
            NodeClass::Select => "Select",
            NodeClass::SelectByInstr => "SelectByInstr",
            NodeClass::ZeroExtend => "ZeroExtend",
            NodeClass::SignExtend => "SignExtend",
            NodeClass::Truncate => "Truncate",
            NodeClass::WriteReg => "WriteReg",
            NodeClass::WriteMem => "WriteMem",
        }
    }

    /// Control-flow skeleton kinds.
    pub fn is_control(self) -> bool {
        matches!(
            self,
            NodeClass::Start
                | NodeClass::InstrCall
                | NodeClass::If
                | NodeClass::BranchBegin
                | NodeClass::BranchEnd
                | NodeClass::InstrEnd
                | NodeClass::Return
        )
    }

    /// Control kinds with exactly one successor.
    pub fn is_directional(self) -> bool {
        matches!(
            self,
            NodeClass::Start | NodeClass::InstrCall | NodeClass::BranchBegin
        )
    }

    /// Control kinds with multiple named successors.
    pub fn is_control_split(self) -> bool {
        matches!(self, NodeClass::If)
    }

    /// Control kinds terminating a skeleton segment.
    pub fn is_end(self) -> bool {
        matches!(
            self,
            NodeClass::BranchEnd | NodeClass::InstrEnd | NodeClass::Return
        )
    }

    /// Everything that is not control: expressions and side effects.
    pub fn is_dependency(self) -> bool {
        !self.is_control()
    }

    pub fn is_side_effect(self) -> bool {
        matches!(self, NodeClass::WriteReg | NodeClass::WriteMem)
    }

    /// Pure value-producing dependency kinds.
    pub fn is_expression(self) -> bool {
        self.is_dependency() && !self.is_side_effect()
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A family of node classes, used for dispatch registration and queries.
///
/// Patterns form a subtype hierarchy; [`ClassPattern::specificity`] ranks
/// them so a per-kind handler always beats a family handler which beats a
/// catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassPattern {
    Any,
    Control,
    Directional,
    ControlSplit,
    End,
    Dependency,
    Expression,
    SideEffect,
    Kind(NodeClass),
}

impl ClassPattern {
    pub fn matches(self, class: NodeClass) -> bool {
        match self {
            ClassPattern::Any => true,
            ClassPattern::Control => class.is_control(),
            ClassPattern::Directional => class.is_directional(),
            ClassPattern::ControlSplit => class.is_control_split(),
            ClassPattern::End => class.is_end(),
            ClassPattern::Dependency => class.is_dependency(),
            ClassPattern::Expression => class.is_expression(),
            ClassPattern::SideEffect => class.is_side_effect(),
            ClassPattern::Kind(k) => class == k,
        }
    }

    /// Dispatch rank: higher wins. Exact kind > narrow family > broad
    /// family > `Any`.
    pub fn specificity(self) -> u8 {
        match self {
            ClassPattern::Any => 0,
            ClassPattern::Control | ClassPattern::Dependency => 1,
            ClassPattern::Directional
            | ClassPattern::ControlSplit
            | ClassPattern::End
            | ClassPattern::Expression
            | ClassPattern::SideEffect => 2,
            ClassPattern::Kind(_) => 3,
        }
    }
}

impl fmt::Display for ClassPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassPattern::Any => write!(f, "Any"),
            ClassPattern::Control => write!(f, "Control"),
            ClassPattern::Directional => write!(f, "Directional"),
            ClassPattern::ControlSplit => write!(f, "ControlSplit"),
            ClassPattern::End => write!(f, "End"),
            ClassPattern::Dependency => write!(f, "Dependency"),
            ClassPattern::Expression => write!(f, "Expression"),
            ClassPattern::SideEffect => write!(f, "SideEffect"),
            ClassPattern::Kind(k) => write!(f, "{}", k),
        }
    }
}

impl NodeKind {
    pub fn class(&self) -> NodeClass {
        match self {
            NodeKind::Start { .. } => NodeClass::Start,
            NodeKind::InstrCall { .. } => NodeClass::InstrCall,
            NodeKind::If { .. } => NodeClass::If,
            NodeKind::BranchBegin { .. } => NodeClass::BranchBegin,
            NodeKind::BranchEnd { .. } => NodeClass::BranchEnd,
            NodeKind::InstrEnd { .. } => NodeClass::InstrEnd,
            NodeKind::Return { .. } => NodeClass::Return,
            NodeKind::Constant { .. } => NodeClass::Constant,
            NodeKind::FieldRef { .. } => NodeClass::FieldRef,
            NodeKind::FuncParam { .. } => NodeClass::FuncParam,
            NodeKind::ReadReg { .. } => NodeClass::ReadReg,
            NodeKind::ReadMem { .. } => NodeClass::ReadMem,
            NodeKind::BuiltInCall { .. } => NodeClass::BuiltInCall,
            NodeKind::Select { .. } => NodeClass::Select,
            NodeKind::SelectByInstr { .. } => NodeClass::SelectByInstr,
            NodeKind::ZeroExtend { .. } => NodeClass::ZeroExtend,
            NodeKind::SignExtend { .. } => NodeClass::SignExtend,
            NodeKind::Truncate { .. } => NodeClass::Truncate,
            NodeKind::WriteReg { .. } => NodeClass::WriteReg,
            NodeKind::WriteMem { .. } => NodeClass::WriteMem,
        }
    }

    /// Value type of an expression kind, `None` for control and side
    /// effects.
    pub fn ty(&self) -> Option<Type> {
        match self {
            NodeKind::Constant { value } => Some(value.ty()),
            NodeKind::FieldRef { ty, .. }
            | NodeKind::FuncParam { ty, .. }
            | NodeKind::ReadReg { ty, .. }
            | NodeKind::ReadMem { ty, .. }
            | NodeKind::BuiltInCall { ty, .. }
            | NodeKind::Select { ty, .. }
            | NodeKind::SelectByInstr { ty, .. }
            | NodeKind::ZeroExtend { ty, .. }
            | NodeKind::SignExtend { ty, .. }
            | NodeKind::Truncate { ty, .. } => Some(*ty),
            _ => None,
        }
    }

    /// Kinds deduplicated on `add`: structurally equal instances share one
    /// active node per graph.
    pub fn is_unique(&self) -> bool {
        matches!(
            self,
            NodeKind::Constant { .. } | NodeKind::FieldRef { .. }
        )
    }

    /// Input edges, in slot order. Optional inputs contribute only when
    /// present.
    pub fn collect_inputs(&self) -> Slots {
        match self {
            NodeKind::Start { .. } | NodeKind::BranchBegin { .. } => smallvec![],
            NodeKind::InstrCall { args, .. } => args.clone(),
            NodeKind::If { condition, .. } => smallvec![*condition],
            NodeKind::BranchEnd { side_effects } | NodeKind::InstrEnd { side_effects } => {
                side_effects.clone()
            }
            NodeKind::Return { value } => smallvec![*value],
            NodeKind::Constant { .. }
            | NodeKind::FieldRef { .. }
            | NodeKind::FuncParam { .. } => smallvec![],
            NodeKind::ReadReg { address, .. } => smallvec![*address],
            NodeKind::ReadMem { address, .. } => smallvec![*address],
            NodeKind::BuiltInCall { args, .. } => args.clone(),
            NodeKind::Select {
                condition,
                on_true,
                on_false,
                ..
            } => smallvec![*condition, *on_true, *on_false],
            NodeKind::SelectByInstr { cases, .. } => cases.clone(),
            NodeKind::ZeroExtend { value, .. }
            | NodeKind::SignExtend { value, .. }
            | NodeKind::Truncate { value, .. } => smallvec![*value],
            NodeKind::WriteReg {
                address,
                value,
                condition,
                ..
            } => {
                let mut v: Slots = smallvec![*address, *value];
                if let Some(c) = condition {
                    v.push(*c);
                }
                v
            }
            NodeKind::WriteMem {
                address,
                value,
                condition,
                ..
            } => {
                let mut v: Slots = smallvec![*address, *value];
                if let Some(c) = condition {
                    v.push(*c);
                }
                v
            }
        }
    }

    /// Mutable references to the input slots, in the same order as
    /// [`Self::collect_inputs`].
    pub fn inputs_mut(&mut self) -> SmallVec<[&mut NodeId; 4]> {
        match self {
            NodeKind::Start { .. } | NodeKind::BranchBegin { .. } => smallvec![],
            NodeKind::InstrCall { args, .. } => args.iter_mut().collect(),
            NodeKind::If { condition, .. } => smallvec![condition],
            NodeKind::BranchEnd { side_effects } | NodeKind::InstrEnd { side_effects } => {
                side_effects.iter_mut().collect()
            }
            NodeKind::Return { value } => smallvec![value],
            NodeKind::Constant { .. }
            | NodeKind::FieldRef { .. }
            | NodeKind::FuncParam { .. } => smallvec![],
            NodeKind::ReadReg { address, .. } => smallvec![address],
            NodeKind::ReadMem { address, .. } => smallvec![address],
            NodeKind::BuiltInCall { args, .. } => args.iter_mut().collect(),
            NodeKind::Select {
                condition,
                on_true,
                on_false,
                ..
            } => smallvec![condition, on_true, on_false],
            NodeKind::SelectByInstr { cases, .. } => cases.iter_mut().collect(),
            NodeKind::ZeroExtend { value, .. }
            | NodeKind::SignExtend { value, .. }
            | NodeKind::Truncate { value, .. } => smallvec![value],
            NodeKind::WriteReg {
                address,
                value,
                condition,
                ..
            } => {
                let mut v: SmallVec<[&mut NodeId; 4]> = smallvec![address, value];
                if let Some(c) = condition {
                    v.push(c);
                }
                v
            }
            NodeKind::WriteMem {
                address,
                value,
                condition,
                ..
            } => {
                let mut v: SmallVec<[&mut NodeId; 4]> = smallvec![address, value];
                if let Some(c) = condition {
                    v.push(c);
                }
                v
            }
        }
    }

    /// Successor edges, in slot order. Empty for dependency and end kinds.
    pub fn collect_successors(&self) -> Slots {
        match self {
            NodeKind::Start { next }
            | NodeKind::InstrCall { next, .. }
            | NodeKind::BranchBegin { next } => smallvec![*next],
            NodeKind::If {
                on_true, on_false, ..
            } => smallvec![*on_true, *on_false],
            _ => smallvec![],
        }
    }

    /// Mutable references to the successor slots.
    pub fn successors_mut(&mut self) -> SmallVec<[&mut NodeId; 2]> {
        match self {
            NodeKind::Start { next }
            | NodeKind::InstrCall { next, .. }
            | NodeKind::BranchBegin { next } => smallvec![next],
            NodeKind::If {
                on_true, on_false, ..
            } => smallvec![on_true, on_false],
            _ => smallvec![],
        }
    }

    /// Non-edge payload, compared structurally by duplicate detection and
    /// merging.
    pub fn collect_data(&self) -> Vec<DataValue> {
        match self {
            NodeKind::Start { .. }
            | NodeKind::If { .. }
            | NodeKind::BranchBegin { .. }
            | NodeKind::BranchEnd { .. }
            | NodeKind::InstrEnd { .. }
            | NodeKind::Return { .. } => vec![],
            NodeKind::InstrCall { target, .. } => vec![DataValue::Str(target.clone())],
            NodeKind::Constant { value } => vec![DataValue::Const(*value)],
            NodeKind::FieldRef { field, ty } => {
                vec![DataValue::Str(field.clone()), DataValue::Ty(*ty)]
            }
            NodeKind::FuncParam { name, index, ty } => vec![
                DataValue::Str(name.clone()),
                DataValue::Int(*index as u64),
                DataValue::Ty(*ty),
            ],
            NodeKind::ReadReg { resource, ty, .. } => {
                vec![DataValue::Str(resource.clone()), DataValue::Ty(*ty)]
            }
            NodeKind::ReadMem { width, ty, .. } => {
                vec![DataValue::Int(*width as u64), DataValue::Ty(*ty)]
            }
            NodeKind::BuiltInCall { op, ty, .. } => {
                vec![DataValue::Op(*op), DataValue::Ty(*ty)]
            }
            NodeKind::Select { ty, .. } => vec![DataValue::Ty(*ty)],
            NodeKind::SelectByInstr { instrs, ty, .. } => {
                vec![DataValue::InstrSets(instrs.clone()), DataValue::Ty(*ty)]
            }
            NodeKind::ZeroExtend { ty, .. }
            | NodeKind::SignExtend { ty, .. }
            | NodeKind::Truncate { ty, .. } => vec![DataValue::Ty(*ty)],
            NodeKind::WriteReg { resource, .. } => vec![DataValue::Str(resource.clone())],
            NodeKind::WriteMem { width, .. } => vec![DataValue::Int(*width as u64)],
        }
    }

    /// True when the two kinds agree on class and data (edges excluded).
    pub fn same_shape(&self, other: &NodeKind) -> bool {
        self.class() == other.class() && self.collect_data() == other.collect_data()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.class())?;
        match self {
            NodeKind::InstrCall { target, .. } => write!(f, "<{}>", target),
            NodeKind::Constant { value } => write!(f, "<{}: {}>", value, value.ty()),
            NodeKind::FieldRef { field, ty } => write!(f, "<{}: {}>", field, ty),
            NodeKind::FuncParam { name, ty, .. } => write!(f, "<{}: {}>", name, ty),
            NodeKind::ReadReg { resource, ty, .. } => write!(f, "<{}: {}>", resource, ty),
            NodeKind::ReadMem { width, ty, .. } => write!(f, "<{}b: {}>", width, ty),
            NodeKind::BuiltInCall { op, ty, .. } => write!(f, "<{}: {}>", op, ty),
            NodeKind::Select { ty, .. }
            | NodeKind::SelectByInstr { ty, .. }
            | NodeKind::ZeroExtend { ty, .. }
            | NodeKind::SignExtend { ty, .. }
            | NodeKind::Truncate { ty, .. } => write!(f, "<{}>", ty),
            NodeKind::WriteReg { resource, .. } => write!(f, "<{}>", resource),
            NodeKind::WriteMem { width, .. } => write!(f, "<{}b>", width),
            _ => Ok(()),
        }
    }
}

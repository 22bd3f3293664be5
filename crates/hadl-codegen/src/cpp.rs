//! C++ emission for pure function behaviors.
//!
//! [`CppFunctionGenerator`] compiles an expression-scope dispatcher once,
//! at construction. Completeness is therefore proven before a single line
//! of output exists: a node kind added without a handler fails `new`, not
//! some later generation run on an unlucky graph.

use std::fmt::Write as _;

use thiserror::Error;

use hadl_ir::{
    ClassPattern, DispatchError, DispatchScope, Dispatcher, DispatcherBuilder, Graph, NodeClass,
    NodeId, NodeKind, Type,
};

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("graph '{name}' is not a pure function behavior")]
    NotPure { name: String },

    #[error("cannot generate C++ for {construct} in graph '{name}'")]
    Unsupported { name: String, construct: String },
}

/// Accumulates generated source.
#[derive(Default)]
pub struct CodeWriter {
    out: String,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// The C++ spelling of a value type. Widths round up to the next
/// standard integer width; above 64 bits the GCC/Clang extension types
/// are used.
pub fn cpp_type(ty: Type) -> &'static str {
    if ty.is_bool() {
        return "bool";
    }
    let signed = ty.is_signed();
    match (ty.bit_width(), signed) {
        (1..=8, false) => "uint8_t",
        (9..=16, false) => "uint16_t",
        (17..=32, false) => "uint32_t",
        (33..=64, false) => "uint64_t",
        (_, false) => "unsigned __int128",
        (1..=8, true) => "int8_t",
        (9..=16, true) => "int16_t",
        (17..=32, true) => "int32_t",
        (33..=64, true) => "int64_t",
        (_, true) => "__int128",
    }
}

fn cpp_signed(ty: Type) -> &'static str {
    match ty.bit_width() {
        1..=8 => "int8_t",
        9..=16 => "int16_t",
        17..=32 => "int32_t",
        33..=64 => "int64_t",
        _ => "__int128",
    }
}

fn infix(op: hadl_ir::BuiltInOp) -> Option<&'static str> {
    use hadl_ir::BuiltInOp::*;
    Some(match op {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        Rem => "%",
        And => "&",
        Or => "|",
        Xor => "^",
        Shl => "<<",
        Shr => ">>",
        Eq => "==",
        Neq => "!=",
        Lt => "<",
        Leq => "<=",
        Gt => ">",
        Geq => ">=",
        Not | Neg => return None,
    })
}

type ExprResult = Result<(), CodegenError>;

/// Renders pure function behaviors as C++ functions.
pub struct CppFunctionGenerator {
    dispatcher: Dispatcher<CodeWriter, ExprResult>,
}

impl CppFunctionGenerator {
    pub fn new() -> Result<Self, CodegenError> {
        let dispatcher = DispatcherBuilder::<CodeWriter, ExprResult>::new()
            .on(ClassPattern::Kind(NodeClass::Constant), |_d, cx, g, id| {
                let NodeKind::Constant { value } = g.kind(id) else {
                    unreachable!()
                };
                if value.ty().is_bool() {
                    cx.push(if value.is_true() { "true" } else { "false" });
                } else if value.ty().is_signed() {
                    let _ = write!(cx.out, "{}", value.as_i128());
                } else {
                    let _ = write!(cx.out, "{}u", value.bits());
                }
                Ok(())
            })
            .on(ClassPattern::Kind(NodeClass::FieldRef), |_d, cx, g, id| {
                let NodeKind::FieldRef { field, .. } = g.kind(id) else {
                    unreachable!()
                };
                cx.push(field);
                Ok(())
            })
            .on(ClassPattern::Kind(NodeClass::FuncParam), |_d, cx, g, id| {
                let NodeKind::FuncParam { name, .. } = g.kind(id) else {
                    unreachable!()
                };
                cx.push(name);
                Ok(())
            })
            .on(ClassPattern::Kind(NodeClass::ReadReg), |d, cx, g, id| {
                let NodeKind::ReadReg {
                    resource, address, ..
                } = g.kind(id)
                else {
                    unreachable!()
                };
                cx.push(resource);
                cx.push("[");
                d.dispatch(cx, g, *address)?;
                cx.push("]");
                Ok(())
            })
            .on(ClassPattern::Kind(NodeClass::ReadMem), |d, cx, g, id| {
                let NodeKind::ReadMem { address, width, .. } = g.kind(id) else {
                    unreachable!()
                };
                let _ = write!(cx.out, "mem.read<{}>(", width);
                d.dispatch(cx, g, *address)?;
                cx.push(")");
                Ok(())
            })
            .on(ClassPattern::Kind(NodeClass::BuiltInCall), |d, cx, g, id| {
                let NodeKind::BuiltInCall { op, args, ty } = g.kind(id) else {
                    unreachable!()
                };
                match infix(*op) {
                    Some(sym) => {
                        cx.push("(");
                        d.dispatch(cx, g, args[0])?;
                        cx.push(" ");
                        cx.push(sym);
                        cx.push(" ");
                        d.dispatch(cx, g, args[1])?;
                        cx.push(")");
                    }
                    None => {
                        // Not on Bool is logical negation; otherwise the
                        // unary operators are bitwise.
                        let sym = match op {
                            hadl_ir::BuiltInOp::Not if ty.is_bool() => "!",
                            hadl_ir::BuiltInOp::Not => "~",
                            _ => "-",
                        };
                        cx.push("(");
                        cx.push(sym);
                        d.dispatch(cx, g, args[0])?;
                        cx.push(")");
                    }
                }
                Ok(())
            })
            .on(ClassPattern::Kind(NodeClass::Select), |d, cx, g, id| {
                let NodeKind::Select {
                    condition,
                    on_true,
                    on_false,
                    ..
                } = g.kind(id)
                else {
                    unreachable!()
                };
                cx.push("(");
                d.dispatch(cx, g, *condition)?;
                cx.push(" ? ");
                d.dispatch(cx, g, *on_true)?;
                cx.push(" : ");
                d.dispatch(cx, g, *on_false)?;
                cx.push(")");
                Ok(())
            })
            .on(
                ClassPattern::Kind(NodeClass::SelectByInstr),
                |_d, _cx, g, _id| {
                    Err(CodegenError::Unsupported {
                        name: g.name.clone(),
                        construct: "instruction-indexed selection".into(),
                    })
                },
            )
            .on(ClassPattern::Kind(NodeClass::ZeroExtend), |d, cx, g, id| {
                let NodeKind::ZeroExtend { value, ty } = g.kind(id) else {
                    unreachable!()
                };
                let _ = write!(cx.out, "static_cast<{}>(", cpp_type(*ty));
                d.dispatch(cx, g, *value)?;
                cx.push(")");
                Ok(())
            })
            .on(ClassPattern::Kind(NodeClass::SignExtend), |d, cx, g, id| {
                let NodeKind::SignExtend { value, ty } = g.kind(id) else {
                    unreachable!()
                };
                // Route through the signed source type so the widening
                // conversion replicates the sign bit.
                let src = g
                    .kind(*value)
                    .ty()
                    .unwrap_or_else(|| panic!("graph '{}': sign extension of a value-less node", g.name));
                let _ = write!(
                    cx.out,
                    "static_cast<{}>(static_cast<{}>(",
                    cpp_type(*ty),
                    cpp_signed(src)
                );
                d.dispatch(cx, g, *value)?;
                cx.push("))");
                Ok(())
            })
            .on(ClassPattern::Kind(NodeClass::Truncate), |d, cx, g, id| {
                let NodeKind::Truncate { value, ty } = g.kind(id) else {
                    unreachable!()
                };
                let _ = write!(cx.out, "static_cast<{}>(", cpp_type(*ty));
                d.dispatch(cx, g, *value)?;
                cx.push(")");
                Ok(())
            })
            .build(DispatchScope::expressions())?;
        Ok(CppFunctionGenerator { dispatcher })
    }

    /// Render one expression rooted at `id`.
    pub fn generate_expression(&self, graph: &Graph, id: NodeId) -> Result<String, CodegenError> {
        let mut writer = CodeWriter::new();
        self.dispatcher.dispatch(&mut writer, graph, id)?;
        Ok(writer.finish())
    }

    /// Render a whole pure function: signature from the given name,
    /// parameters, and return type; body from the behavior's returned
    /// expression.
    pub fn generate_function(
        &self,
        name: &str,
        params: &[(String, Type)],
        return_type: Type,
        behavior: &Graph,
    ) -> Result<String, CodegenError> {
        if !behavior.is_pure_function() {
            return Err(CodegenError::NotPure {
                name: behavior.name.clone(),
            });
        }
        let ret = behavior.node_ids_of(ClassPattern::Kind(NodeClass::Return))[0];
        let NodeKind::Return { value } = behavior.kind(ret) else {
            unreachable!()
        };

        let mut writer = CodeWriter::new();
        let _ = write!(writer.out, "{} {}(", cpp_type(return_type), name);
        for (i, (pname, pty)) in params.iter().enumerate() {
            if i > 0 {
                writer.push(", ");
            }
            let _ = write!(writer.out, "{} {}", cpp_type(*pty), pname);
        }
        writer.push(") {\n    return ");
        self.dispatcher.dispatch(&mut writer, behavior, *value)?;
        writer.push(";\n}\n");
        Ok(writer.finish())
    }
}

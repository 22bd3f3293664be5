//! The processor specification model: named behaviors grouped into
//! instructions and pure functions. Everything is serde round-trippable,
//! so a specification persists as plain JSON.

use serde::{Deserialize, Serialize};

use hadl_ir::{Graph, Type};

/// An instruction and its behavior graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    pub name: String,
    pub behavior: Graph,
}

/// A formal parameter of a pure function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
}

/// A pure function definition with its behavior graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: Type,
    pub behavior: Graph,
}

/// A whole processor specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Specification {
    pub name: String,
    pub instructions: Vec<Instruction>,
    pub functions: Vec<FunctionDef>,
}

impl Specification {
    pub fn new(name: impl Into<String>) -> Self {
        Specification {
            name: name.into(),
            instructions: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn instruction(&self, name: &str) -> Option<&Instruction> {
        self.instructions.iter().find(|i| i.name == name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Every behavior graph: instructions first, then functions.
    pub fn behaviors(&self) -> impl Iterator<Item = &Graph> {
        self.instructions
            .iter()
            .map(|i| &i.behavior)
            .chain(self.functions.iter().map(|f| &f.behavior))
    }

    pub fn behaviors_mut(&mut self) -> impl Iterator<Item = &mut Graph> {
        self.instructions
            .iter_mut()
            .map(|i| &mut i.behavior)
            .chain(self.functions.iter_mut().map(|f| &mut f.behavior))
    }
}

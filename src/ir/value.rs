use std::fmt;

use super::function::InstId;

/// A handle to one of a function's formal parameters, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArgId(pub u32);

impl fmt::Display for ArgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%arg{}", self.0)
    }
}

/// A handle to a basic block within the owning function's block arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%bb{}", self.0)
    }
}

/// An operand or result: exactly one of the primitive value kinds described
/// in the data model (instruction result, constant integer, function
/// argument, function reference, or basic-block reference).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    /// The result produced by a single instruction, identified by arena index.
    Inst(InstId),
    /// A constant, sign-extended to 32 bits for arithmetic purposes.
    Const(i32),
    /// A reference to one of the current function's formal parameters.
    Arg(ArgId),
    /// A jump target. Only legal as a `Br` operand.
    Block(BlockId),
}

impl Value {
    pub fn as_const(self) -> Option<i32> {
        match self {
            Value::Const(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_inst(self) -> Option<InstId> {
        match self {
            Value::Inst(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_const(self) -> bool {
        matches!(self, Value::Const(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Inst(id) => write!(f, "{id}"),
            Value::Const(n) => write!(f, "{n}"),
            Value::Arg(a) => write!(f, "{a}"),
            Value::Block(b) => write!(f, "{b}"),
        }
    }
}

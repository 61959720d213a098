use std::fmt;

/// The closed set of scalar types understood by the back end.
///
/// Pointers are only ever produced by `alloca`; there is no user-visible
/// pointer arithmetic beyond that single source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    Void,
    I8,
    I32,
    /// Pointer to a byte (`i8*`); the slot type produced by `Alloca`.
    I8Ptr,
}

impl IrType {
    pub fn is_void(self) -> bool {
        matches!(self, IrType::Void)
    }

    pub fn is_pointer(self) -> bool {
        matches!(self, IrType::I8Ptr)
    }

    /// Size in bytes as stored on the 32-bit stack frame. Every scalar this
    /// back end knows about occupies one machine word.
    pub fn size_bytes(self) -> u32 {
        match self {
            IrType::Void => 0,
            IrType::I8 | IrType::I32 | IrType::I8Ptr => 4,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::I8 => write!(f, "i8"),
            IrType::I32 => write!(f, "i32"),
            IrType::I8Ptr => write!(f, "i8*"),
        }
    }
}

/// Signed integer comparison predicates available to `ICmp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ICmpPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl ICmpPredicate {
    /// The conditional-jump mnemonic taken when the predicate is satisfied.
    pub fn jump_mnemonic(self) -> &'static str {
        match self {
            ICmpPredicate::Eq => "je",
            ICmpPredicate::Ne => "jne",
            ICmpPredicate::Sgt => "jg",
            ICmpPredicate::Sge => "jge",
            ICmpPredicate::Slt => "jl",
            ICmpPredicate::Sle => "jle",
        }
    }

    /// Evaluate the predicate over two constant operands, used by constant folding.
    pub fn eval(self, lhs: i32, rhs: i32) -> bool {
        match self {
            ICmpPredicate::Eq => lhs == rhs,
            ICmpPredicate::Ne => lhs != rhs,
            ICmpPredicate::Slt => lhs < rhs,
            ICmpPredicate::Sle => lhs <= rhs,
            ICmpPredicate::Sgt => lhs > rhs,
            ICmpPredicate::Sge => lhs >= rhs,
        }
    }
}

impl fmt::Display for ICmpPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ICmpPredicate::Eq => "eq",
            ICmpPredicate::Ne => "ne",
            ICmpPredicate::Slt => "slt",
            ICmpPredicate::Sle => "sle",
            ICmpPredicate::Sgt => "sgt",
            ICmpPredicate::Sge => "sge",
        };
        write!(f, "{s}")
    }
}

use std::fmt;

use super::function::InstId;
use super::types::{ICmpPredicate, IrType};
use super::value::{BlockId, Value};

/// The arithmetic opcodes covered by binary `Inst::Binary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
}

impl BinOp {
    /// Evaluate over two constants, used by constant folding. `SDiv` by zero
    /// is refused (returns `None`) rather than folded.
    pub fn eval(self, lhs: i32, rhs: i32) -> Option<i32> {
        match self {
            BinOp::Add => Some(lhs.wrapping_add(rhs)),
            BinOp::Sub => Some(lhs.wrapping_sub(rhs)),
            BinOp::Mul => Some(lhs.wrapping_mul(rhs)),
            BinOp::SDiv => {
                if rhs == 0 {
                    None
                } else {
                    Some(lhs.wrapping_div(rhs))
                }
            }
        }
    }

    /// The two-operand mnemonic used by the emitter's generic binary
    /// lowering. `SDiv` has no such form (`idivl` is single-operand and
    /// needs a `cltd` first) and is special-cased before this is consulted.
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "addl",
            BinOp::Sub => "subl",
            BinOp::Mul => "imull",
            BinOp::SDiv => unreachable!("SDiv is rejected by emit.rs before mnemonic() is consulted"),
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
        };
        write!(f, "{s}")
    }
}

/// The closed instruction set the back end understands. Every variant here
/// corresponds to exactly one opcode in the data model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    /// Reserves one stack slot; always lives in the entry block.
    Alloca { ty: IrType },
    Load { slot: Value, ty: IrType },
    Store { value: Value, slot: Value },
    Binary { op: BinOp, lhs: Value, rhs: Value, ty: IrType },
    Neg { operand: Value, ty: IrType },
    ICmp { pred: ICmpPredicate, lhs: Value, rhs: Value },
    /// Unconditional when `cond` is `None`; otherwise conditional, jumping to
    /// `then_block` when `cond` holds and `else_block` otherwise.
    Br {
        cond: Option<Value>,
        then_block: BlockId,
        else_block: Option<BlockId>,
    },
    Ret { value: Option<Value> },
    Call { callee: String, args: Vec<Value>, ty: Option<IrType> },
}

impl Inst {
    pub fn is_terminator(&self) -> bool {
        matches!(self, Inst::Br { .. } | Inst::Ret { .. })
    }

    /// The type of the value this instruction produces, if any. For
    /// `Alloca`, `ty` names the *pointee* scalar type; the instruction
    /// itself always produces an `i8*` slot address.
    pub fn result_type(&self) -> Option<IrType> {
        match self {
            Inst::Alloca { .. } => Some(IrType::I8Ptr),
            Inst::Load { ty, .. } => Some(*ty),
            Inst::Binary { ty, .. } => Some(*ty),
            Inst::Neg { ty, .. } => Some(*ty),
            Inst::ICmp { .. } => Some(IrType::I32),
            Inst::Call { ty, .. } => *ty,
            Inst::Store { .. } | Inst::Br { .. } | Inst::Ret { .. } => None,
        }
    }

    /// Whether this instruction may be erased by DCE when it has no uses.
    /// `Store`, `Alloca`, `Br`, `Call` and `Ret` are excluded unconditionally.
    pub fn is_dce_eligible(&self) -> bool {
        !matches!(
            self,
            Inst::Store { .. } | Inst::Alloca { .. } | Inst::Br { .. } | Inst::Call { .. } | Inst::Ret { .. }
        )
    }

    /// Whether CSE may consider this a candidate key (non-side-effecting
    /// arithmetic and compares only).
    pub fn is_cse_eligible(&self) -> bool {
        matches!(self, Inst::Binary { .. } | Inst::Neg { .. } | Inst::ICmp { .. })
    }

    /// Operands read by this instruction, in a stable order.
    pub fn operands(&self) -> Vec<Value> {
        match self {
            Inst::Alloca { .. } => vec![],
            Inst::Load { slot, .. } => vec![*slot],
            Inst::Store { value, slot } => vec![*value, *slot],
            Inst::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            Inst::Neg { operand, .. } => vec![*operand],
            Inst::ICmp { lhs, rhs, .. } => vec![*lhs, *rhs],
            Inst::Br { cond, .. } => cond.into_iter().collect(),
            Inst::Ret { value } => value.into_iter().collect(),
            Inst::Call { args, .. } => args.clone(),
        }
    }

    /// Replace every operand equal to `old` with `new`, in place.
    pub fn replace_uses(&mut self, old: InstId, new: Value) {
        let old = Value::Inst(old);
        let subst = |v: &mut Value| {
            if *v == old {
                *v = new;
            }
        };
        match self {
            Inst::Alloca { .. } => {}
            Inst::Load { slot, .. } => subst(slot),
            Inst::Store { value, slot } => {
                subst(value);
                subst(slot);
            }
            Inst::Binary { lhs, rhs, .. } => {
                subst(lhs);
                subst(rhs);
            }
            Inst::Neg { operand, .. } => subst(operand),
            Inst::ICmp { lhs, rhs, .. } => {
                subst(lhs);
                subst(rhs);
            }
            Inst::Br { cond: Some(c), .. } => subst(c),
            Inst::Br { .. } => {}
            Inst::Ret { value: Some(v) } => subst(v),
            Inst::Ret { value: None } => {}
            Inst::Call { args, .. } => {
                for a in args.iter_mut() {
                    subst(a);
                }
            }
        }
    }

    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Inst::Br { then_block, else_block, .. } => {
                let mut v = vec![*then_block];
                v.extend(*else_block);
                v
            }
            _ => vec![],
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Alloca { ty } => write!(f, "alloca {ty}"),
            Inst::Load { slot, ty } => write!(f, "load {ty}, {slot}"),
            Inst::Store { value, slot } => write!(f, "store {value}, {slot}"),
            Inst::Binary { op, lhs, rhs, ty } => write!(f, "{op} {ty} {lhs}, {rhs}"),
            Inst::Neg { operand, ty } => write!(f, "neg {ty} {operand}"),
            Inst::ICmp { pred, lhs, rhs } => write!(f, "icmp {pred} {lhs}, {rhs}"),
            Inst::Br { cond: None, then_block, .. } => write!(f, "br {then_block}"),
            Inst::Br { cond: Some(c), then_block, else_block } => {
                write!(f, "br {c}, {then_block}, {}", else_block.expect("conditional br has two targets"))
            }
            Inst::Ret { value: None } => write!(f, "ret void"),
            Inst::Ret { value: Some(v) } => write!(f, "ret {v}"),
            Inst::Call { callee, args, ty } => {
                write!(f, "call ")?;
                if let Some(ty) = ty {
                    write!(f, "{ty} ")?;
                }
                write!(f, "{callee}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
        }
    }
}

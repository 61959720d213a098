//! Constant folding: collapse binary arithmetic and comparisons over two
//! constant operands into a single constant, in place.

use crate::ir::{Function, Inst, Value};

pub fn run(func: &mut Function) -> bool {
    let mut changed = false;
    for block in 0..func.blocks.len() {
        let ids: Vec<_> = func.blocks[block].all_insts().collect();
        for id in ids {
            let folded = match func.inst(id) {
                Inst::Binary { op, lhs, rhs, .. } => match (lhs.as_const(), rhs.as_const()) {
                    (Some(l), Some(r)) => op.eval(l, r).map(Value::Const),
                    _ => None,
                },
                Inst::ICmp { pred, lhs, rhs } => match (lhs.as_const(), rhs.as_const()) {
                    (Some(l), Some(r)) => Some(Value::Const(pred.eval(l, r) as i32)),
                    _ => None,
                },
                Inst::Neg { operand, .. } => operand.as_const().map(|n| Value::Const(n.wrapping_neg())),
                _ => None,
            };
            if let Some(value) = folded {
                func.replace_all_uses_with(id, value);
                changed = true;
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, IrType};

    #[test]
    fn folds_closed_arithmetic_expression() {
        let mut f = Function::new_defined("f", vec![], IrType::I32);
        let entry = f.entry.unwrap();
        let mul = f.push_inst(entry, Inst::Binary { op: BinOp::Mul, lhs: Value::Const(3), rhs: Value::Const(4), ty: IrType::I32 });
        let add = f.push_inst(entry, Inst::Binary { op: BinOp::Add, lhs: Value::Const(2), rhs: Value::Inst(mul), ty: IrType::I32 });
        f.set_terminator(entry, Inst::Ret { value: Some(Value::Inst(add)) });

        assert!(run(&mut f));
        assert!(run(&mut f)); // propagate the folded mul into add
        assert!(!run(&mut f)); // fixpoint

        let term = f.block(entry).terminator.unwrap();
        assert_eq!(f.inst(term), &Inst::Ret { value: Some(Value::Const(14)) });
    }

    #[test]
    fn refuses_to_fold_division_by_zero() {
        let mut f = Function::new_defined("f", vec![], IrType::I32);
        let entry = f.entry.unwrap();
        let div = f.push_inst(entry, Inst::Binary { op: BinOp::SDiv, lhs: Value::Const(1), rhs: Value::Const(0), ty: IrType::I32 });
        f.set_terminator(entry, Inst::Ret { value: Some(Value::Inst(div)) });
        assert!(!run(&mut f));
    }
}

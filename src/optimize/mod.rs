//! The optimizer: common-subexpression elimination, dead-code elimination,
//! constant folding, and reaching-definitions constant propagation, run to
//! a whole-module fixpoint.
//!
//! ```text
//! repeat for each function
//!   repeat per block: CSE; DCE; CF
//!   once per function: CP
//! until no pass reported a change
//! ```
//!
//! The order is deliberate: CF surfaces new constants that enable further
//! CSE; CP surfaces new constants (from reaching stores) to CF on the next
//! round. Optimization never fails — every pass either finds a safe
//! rewrite or reports no change.

pub mod cf;
pub mod cp;
pub mod cse;
pub mod dce;

use log::debug;

use crate::ir::{Function, Module};

/// Maximum outer-loop rounds per function, guarding against a pass-ordering
/// bug turning into an infinite loop rather than silently never converging.
const MAX_ROUNDS: usize = 64;

fn optimize_function(func: &mut Function) {
    for round in 0..MAX_ROUNDS {
        let mut changed = false;

        loop {
            let mut block_round_changed = false;
            block_round_changed |= cse::run(func);
            block_round_changed |= dce::run(func);
            block_round_changed |= cf::run(func);
            if !block_round_changed {
                break;
            }
            changed = true;
        }

        changed |= cp::run(func);

        debug!("optimize `{}` round {round}: changed={changed}", func.name);
        if !changed {
            return;
        }
    }
}

pub fn optimize_module(module: &mut Module) {
    for func in module.defined_functions_mut() {
        optimize_function(func);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Inst, IrType, Value};

    #[test]
    fn constant_fold_then_cse_converges_to_a_single_ret() {
        let mut f = Function::new_defined("f", vec![], IrType::I32);
        let entry = f.entry.unwrap();
        let a = f.push_inst(entry, Inst::Binary { op: BinOp::Mul, lhs: Value::Const(3), rhs: Value::Const(4), ty: IrType::I32 });
        let b = f.push_inst(entry, Inst::Binary { op: BinOp::Add, lhs: Value::Const(2), rhs: Value::Inst(a), ty: IrType::I32 });
        f.set_terminator(entry, Inst::Ret { value: Some(Value::Inst(b)) });

        optimize_function(&mut f);

        let term = f.block(entry).terminator.unwrap();
        assert_eq!(f.inst(term), &Inst::Ret { value: Some(Value::Const(14)) });
        assert!(f.block(entry).insts.is_empty());
    }

    #[test]
    fn running_the_optimizer_twice_is_idempotent() {
        let mut f = Function::new_defined("f", vec![crate::ir::Param { name: "x".into(), ty: IrType::I32 }], IrType::I32);
        let entry = f.entry.unwrap();
        let slot = f.push_inst(entry, Inst::Alloca { ty: IrType::I32 });
        f.push_inst(entry, Inst::Store { value: Value::Arg(crate::ir::ArgId(0)), slot: Value::Inst(slot) });
        let l1 = f.push_inst(entry, Inst::Load { slot: Value::Inst(slot), ty: IrType::I32 });
        let l2 = f.push_inst(entry, Inst::Load { slot: Value::Inst(slot), ty: IrType::I32 });
        let mul = f.push_inst(entry, Inst::Binary { op: BinOp::Mul, lhs: Value::Inst(l1), rhs: Value::Inst(l2), ty: IrType::I32 });
        f.set_terminator(entry, Inst::Ret { value: Some(Value::Inst(mul)) });

        optimize_function(&mut f);
        let once = format!("{f:?}");
        optimize_function(&mut f);
        let twice = format!("{f:?}");
        assert_eq!(once, twice);
    }
}

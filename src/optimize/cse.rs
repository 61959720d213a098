//! Local common-subexpression elimination, plus the local redundant-load
//! coalescing ("op-trace") that feeds it: within a block, re-reading a slot
//! that hasn't been stored to since the last read reuses the earlier
//! `Load`'s result, which is what lets two syntactically distinct `x*x`
//! sub-expressions key to the same entry below.

use std::collections::HashMap;

use crate::ir::{Function, Inst, InstId, Value};

/// The "opcode" half of a CSE key: distinguishes `Add` from `Sub` from
/// `icmp slt` from `icmp sgt`, etc. The operand half is the unordered pair.
#[derive(PartialEq, Eq, Hash)]
enum OpKey {
    Bin(crate::ir::BinOp),
    Neg,
    ICmp(crate::ir::ICmpPredicate),
}

pub fn run(func: &mut Function) -> bool {
    let mut changed = false;
    for block_idx in 0..func.blocks.len() {
        let block_id = crate::ir::BlockId(block_idx as u32);
        let mut expr_map: HashMap<(OpKey, Value, Value), InstId> = HashMap::new();
        let mut loads: HashMap<Value, InstId> = HashMap::new();

        let ids: Vec<InstId> = func.block(block_id).insts.clone();
        for id in ids {
            match func.inst(id).clone() {
                Inst::Alloca { .. } => {}
                Inst::Store { slot, .. } => {
                    loads.remove(&slot);
                    expr_map.retain(|(_, a, b), _| *a != slot && *b != slot);
                }
                Inst::Call { .. } => {
                    // A call may write through an aliased stack slot (every
                    // slot is potentially aliased across calls); the local
                    // load cache and expression cache are no longer safe.
                    loads.clear();
                    expr_map.clear();
                }
                Inst::Load { slot, .. } => {
                    if let Some(&existing) = loads.get(&slot) {
                        func.replace_all_uses_with(id, Value::Inst(existing));
                        changed = true;
                    } else {
                        loads.insert(slot, id);
                    }
                }
                Inst::Neg { operand, .. } => {
                    let key = (OpKey::Neg, operand, operand);
                    if let Some(&existing) = expr_map.get(&key) {
                        func.replace_all_uses_with(id, Value::Inst(existing));
                        changed = true;
                    } else {
                        expr_map.insert(key, id);
                    }
                }
                Inst::Binary { op, lhs, rhs, .. } => {
                    let key = (OpKey::Bin(op), lhs.max(rhs), lhs.min(rhs));
                    if let Some(&existing) = expr_map.get(&key) {
                        func.replace_all_uses_with(id, Value::Inst(existing));
                        changed = true;
                    } else {
                        expr_map.insert(key, id);
                    }
                }
                Inst::ICmp { pred, lhs, rhs } => {
                    let key = (OpKey::ICmp(pred), lhs.max(rhs), lhs.min(rhs));
                    if let Some(&existing) = expr_map.get(&key) {
                        func.replace_all_uses_with(id, Value::Inst(existing));
                        changed = true;
                    } else {
                        expr_map.insert(key, id);
                    }
                }
                Inst::Br { .. } | Inst::Ret { .. } => unreachable!("terminators are not in block.insts"),
            }
        }
    }
    changed
}

//! Reaching-definitions-based constant propagation over `Store`/`Load`
//! pairs on stack slots: classic forward dataflow whose elements are
//! `Store` instructions that may reach a program point unclobbered.

use crate::ir::{BlockId, Function, Inst, InstId, Value};

/// Dense-numbered store instructions plus a bitset-ish `Vec<bool>` dataflow
/// frame. `n` stores rarely exceeds a few dozen per function, so a plain
/// `Vec<bool>` beats the complexity of a real bitset.
struct Stores {
    ids: Vec<InstId>,
    slot_of: Vec<Value>,
    /// slot value -> indices into `ids`/`slot_of` of every store to that slot.
    by_slot: Vec<(Value, Vec<usize>)>,
}

impl Stores {
    fn group_for(&self, slot: Value) -> &[usize] {
        self.by_slot
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }
}

fn collect_stores(func: &Function) -> Stores {
    let mut ids = Vec::new();
    let mut slot_of = Vec::new();
    for block in &func.blocks {
        for &id in &block.insts {
            if let Inst::Store { slot, .. } = func.inst(id) {
                ids.push(id);
                slot_of.push(*slot);
            }
        }
    }
    let mut by_slot: Vec<(Value, Vec<usize>)> = Vec::new();
    for (idx, slot) in slot_of.iter().enumerate() {
        match by_slot.iter_mut().find(|(s, _)| s == slot) {
            Some((_, v)) => v.push(idx),
            None => by_slot.push((*slot, vec![idx])),
        }
    }
    Stores { ids, slot_of, by_slot }
}

fn gen_set(stores: &Stores, func: &Function, block: BlockId) -> Vec<bool> {
    let mut gen = vec![false; stores.ids.len()];
    for (i, &id) in stores.ids.iter().enumerate() {
        if func.block(block).insts.contains(&id) {
            gen[i] = true;
        }
    }
    gen
}

fn kill_set(stores: &Stores, gen: &[bool]) -> Vec<bool> {
    let mut kill = vec![false; stores.ids.len()];
    for (i, in_gen) in gen.iter().enumerate() {
        if !in_gen {
            continue;
        }
        for &j in stores.group_for(stores.slot_of[i]) {
            if j != i {
                kill[j] = true;
            }
        }
    }
    kill
}

pub fn run(func: &mut Function) -> bool {
    let stores = collect_stores(func);
    if stores.ids.is_empty() {
        return false;
    }
    let n = func.blocks.len();
    let gens: Vec<Vec<bool>> = (0..n).map(|b| gen_set(&stores, func, BlockId(b as u32))).collect();
    let kills: Vec<Vec<bool>> = gens.iter().map(|g| kill_set(&stores, g)).collect();

    let mut out: Vec<Vec<bool>> = gens.clone();
    loop {
        let mut stable = true;
        for b in 0..n {
            let mut inset = vec![false; stores.ids.len()];
            for &pred in &func.block(BlockId(b as u32)).preds {
                for i in 0..inset.len() {
                    inset[i] |= out[pred.0 as usize][i];
                }
            }
            let mut new_out = gens[b].clone();
            for i in 0..new_out.len() {
                if inset[i] && !kills[b][i] {
                    new_out[i] = true;
                }
            }
            if new_out != out[b] {
                stable = false;
                out[b] = new_out;
            }
        }
        if stable {
            break;
        }
    }

    let mut changed = false;
    let mut to_fold: Vec<(InstId, i32)> = Vec::new();
    for b in 0..n {
        let block_id = BlockId(b as u32);
        let mut reaching = vec![false; stores.ids.len()];
        for &pred in &func.block(block_id).preds {
            for i in 0..reaching.len() {
                reaching[i] |= out[pred.0 as usize][i];
            }
        }
        let ids: Vec<InstId> = func.block(block_id).insts.clone();
        for id in ids {
            match func.inst(id).clone() {
                Inst::Store { slot, .. } => {
                    for &j in stores.group_for(slot) {
                        reaching[j] = false;
                    }
                    if let Some(idx) = stores.ids.iter().position(|&s| s == id) {
                        reaching[idx] = true;
                    }
                }
                Inst::Load { slot, .. } => {
                    let group = stores.group_for(slot);
                    let live: Vec<usize> = group.iter().copied().filter(|&j| reaching[j]).collect();
                    if live.is_empty() {
                        continue;
                    }
                    let mut uniform: Option<i32> = None;
                    let mut all_const = true;
                    for &j in &live {
                        let store_id = stores.ids[j];
                        let value = match func.inst(store_id) {
                            Inst::Store { value, .. } => *value,
                            _ => unreachable!(),
                        };
                        match value.as_const() {
                            Some(n) if uniform.is_none() || uniform == Some(n) => uniform = Some(n),
                            _ => {
                                all_const = false;
                                break;
                            }
                        }
                    }
                    if all_const {
                        if let Some(n) = uniform {
                            to_fold.push((id, n));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    for (id, n) in to_fold {
        func.replace_all_uses_with(id, Value::Const(n));
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrType;

    #[test]
    fn propagates_a_constant_stored_on_every_reaching_path() {
        let mut f = Function::new_defined("f", vec![], IrType::I32);
        let entry = f.entry.unwrap();
        let slot = f.push_inst(entry, Inst::Alloca { ty: IrType::I32 });
        f.push_inst(entry, Inst::Store { value: Value::Const(7), slot: Value::Inst(slot) });
        let load = f.push_inst(entry, Inst::Load { slot: Value::Inst(slot), ty: IrType::I32 });
        f.set_terminator(entry, Inst::Ret { value: Some(Value::Inst(load)) });

        assert!(run(&mut f));
        let term = f.block(entry).terminator.unwrap();
        assert_eq!(f.inst(term), &Inst::Ret { value: Some(Value::Const(7)) });
    }

    #[test]
    fn does_not_propagate_when_stored_value_is_not_constant() {
        let mut f = Function::new_defined("f", vec![crate::ir::Param { name: "x".into(), ty: IrType::I32 }], IrType::I32);
        let entry = f.entry.unwrap();
        let slot = f.push_inst(entry, Inst::Alloca { ty: IrType::I32 });
        f.push_inst(entry, Inst::Store { value: Value::Arg(crate::ir::ArgId(0)), slot: Value::Inst(slot) });
        let load = f.push_inst(entry, Inst::Load { slot: Value::Inst(slot), ty: IrType::I32 });
        f.set_terminator(entry, Inst::Ret { value: Some(Value::Inst(load)) });

        assert!(!run(&mut f));
    }
}

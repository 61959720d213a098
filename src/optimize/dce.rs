//! Dead-code elimination: drop any DCE-eligible instruction with no
//! remaining uses, iterating within a block until nothing more can go.

use crate::ir::Function;

pub fn run(func: &mut Function) -> bool {
    let mut changed = false;
    for block_id_idx in 0..func.blocks.len() {
        let block_id = crate::ir::BlockId(block_id_idx as u32);
        loop {
            let candidate = func.block(block_id).insts.iter().copied().find(|&id| {
                func.inst(id).is_dce_eligible() && !func.has_uses(id)
            });
            match candidate {
                Some(id) => {
                    func.erase_from_block(block_id, id);
                    changed = true;
                }
                None => break,
            }
        }
    }
    changed
}

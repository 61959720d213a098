//! Linear-scan register allocation at basic-block granularity.
//!
//! Every value-producing instruction in this IR is defined and consumed
//! within a single block (expressions are fully evaluated before any
//! branch, and the only cross-block value is a stack slot, which is never
//! itself register-allocated — see `Inst::Alloca`). That locality is what
//! lets each block be scanned independently while still producing one
//! function-wide allocation map, since SSA guarantees no two blocks ever
//! contend for the same value's assignment.

use std::collections::HashMap;

use log::debug;

use crate::ir::{BlockId, Function, Inst, InstId, Value};

/// One of the three allocatable general-purpose registers. `ACC` (the
/// emitter's scratch register, typically `%eax`) is reserved and never
/// appears here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolReg {
    R1,
    R2,
    R3,
}

pub const POOL: [PoolReg; 3] = [PoolReg::R1, PoolReg::R2, PoolReg::R3];

/// An instruction's final allocation: a physical pool register, or the
/// `SPILL` sentinel meaning every use goes through memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    Reg(PoolReg),
    Spill,
}

/// The function-wide allocation map. Every non-`Alloca` value-producing
/// instruction has exactly one entry.
#[derive(Debug, Default)]
pub struct RegisterAllocation {
    map: HashMap<InstId, Allocation>,
}

impl RegisterAllocation {
    pub fn get(&self, id: InstId) -> Option<Allocation> {
        self.map.get(&id).copied()
    }
}

struct BlockLiveness {
    /// Dense order of non-`Alloca` instructions, terminator last.
    seq: Vec<InstId>,
    index_of: HashMap<InstId, usize>,
    /// Last index (within `seq`) at which a value-producing instruction is
    /// used; defaults to its own def index (dies at def) if never read.
    live_end: HashMap<InstId, usize>,
}

fn compute_liveness(func: &Function, block: BlockId) -> BlockLiveness {
    let seq: Vec<InstId> = func
        .block(block)
        .all_insts()
        .filter(|&id| !matches!(func.inst(id), Inst::Alloca { .. }))
        .collect();
    let index_of: HashMap<InstId, usize> = seq.iter().enumerate().map(|(i, &id)| (id, i)).collect();

    let mut live_end = HashMap::new();
    for (i, &id) in seq.iter().enumerate() {
        if func.inst(id).result_type().is_some() {
            live_end.insert(id, i);
        }
    }
    for (i, &id) in seq.iter().enumerate() {
        for operand in func.inst(id).operands() {
            if let Value::Inst(op_id) = operand {
                if let Some(end) = live_end.get_mut(&op_id) {
                    *end = i;
                }
            }
        }
    }
    BlockLiveness { seq, index_of, live_end }
}

/// Descending-by-live-range-end order, used for spill victim selection.
/// Ties break by definition order for determinism.
fn sorted_by_end(live: &BlockLiveness) -> Vec<InstId> {
    let mut ids: Vec<InstId> = live.live_end.keys().copied().collect();
    ids.sort_by_key(|&id| (std::cmp::Reverse(live.live_end[&id]), live.index_of[&id]));
    ids
}

/// Find the spill victim: the first instruction in `order` that currently
/// occupies a physical register (i.e. the one alive the longest from now).
fn find_spill(order: &[InstId], active: &HashMap<PoolReg, InstId>) -> Option<(InstId, PoolReg)> {
    order.iter().find_map(|&candidate| {
        active.iter().find(|&(_, &owner)| owner == candidate).map(|(&reg, _)| (candidate, reg))
    })
}

fn allocate_block(func: &Function, block: BlockId, alloc: &mut RegisterAllocation) {
    let live = compute_liveness(func, block);
    let order = sorted_by_end(&live);
    let mut active: HashMap<PoolReg, InstId> = HashMap::new();

    let free_if_dying = |id: InstId, i: usize, live: &BlockLiveness, active: &mut HashMap<PoolReg, InstId>| {
        if live.live_end.get(&id) == Some(&i) {
            if let Some(&reg) = active.iter().find(|&(_, &owner)| owner == id).map(|(r, _)| r) {
                active.remove(&reg);
            }
        }
    };

    for (i, &id) in live.seq.iter().enumerate() {
        let inst = func.inst(id);

        if inst.result_type().is_none() {
            for operand in inst.operands() {
                if let Value::Inst(op_id) = operand {
                    free_if_dying(op_id, i, &live, &mut active);
                }
            }
            continue;
        }

        // Two-address reuse: Add/Sub/Mul whose first operand dies here
        // hands that operand's register straight to the result.
        if let Inst::Binary { op, lhs: Value::Inst(lhs_id), rhs, .. } = inst {
            if matches!(op, crate::ir::BinOp::Add | crate::ir::BinOp::Sub | crate::ir::BinOp::Mul)
                && live.live_end.get(lhs_id) == Some(&i)
            {
                if let Some(&reg) = active.iter().find(|&(_, &owner)| owner == *lhs_id).map(|(r, _)| r) {
                    active.remove(&reg);
                    active.insert(reg, id);
                    alloc.map.insert(id, Allocation::Reg(reg));
                    if let Value::Inst(rhs_id) = rhs {
                        free_if_dying(*rhs_id, i, &live, &mut active);
                    }
                    continue;
                }
            }
        }

        let free_reg = POOL.iter().copied().find(|r| !active.contains_key(r));
        match free_reg {
            Some(reg) => {
                active.insert(reg, id);
                alloc.map.insert(id, Allocation::Reg(reg));
            }
            None => match find_spill(&order, &active) {
                // Spill whichever of the two lives longer from here; on a
                // tie, keep the newly-defined value in a register.
                Some((victim, _reg)) if live.live_end[&id] > live.live_end[&victim] => {
                    alloc.map.insert(id, Allocation::Spill);
                    debug!("spilling newly-defined value {id}: it outlives {victim}, which keeps its register");
                }
                Some((victim, reg)) => {
                    alloc.map.insert(victim, Allocation::Spill);
                    active.remove(&reg);
                    active.insert(reg, id);
                    alloc.map.insert(id, Allocation::Reg(reg));
                    debug!("spilling {victim} (longer-lived) to hand its register to {id}");
                }
                None => unreachable!("pool exhausted but find_spill found no active register"),
            },
        }

        for operand in inst.operands() {
            if let Value::Inst(op_id) = operand {
                free_if_dying(op_id, i, &live, &mut active);
            }
        }
    }
}

pub fn allocate_function(func: &Function) -> RegisterAllocation {
    let mut alloc = RegisterAllocation::default();
    for i in 0..func.blocks.len() {
        allocate_block(func, BlockId(i as u32), &mut alloc);
    }
    alloc
}

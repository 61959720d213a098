use std::fmt;

use indexmap::IndexSet;

use super::instruction::Inst;
use super::types::IrType;
use super::value::{BlockId, Value};

/// A handle into a function's instruction arena. Stable across optimizer
/// passes; erasure never reuses an id, it only removes it from its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A function parameter: a name (for IR pretty-printing only) and a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: IrType,
}

/// A basic block: an ordered run of non-terminator instructions followed by
/// exactly one terminator (`Br` or `Ret`), addressed by the owning
/// function's instruction arena.
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub insts: Vec<InstId>,
    pub terminator: Option<InstId>,
    /// Derived, recomputed by `Function::recompute_preds`.
    pub preds: Vec<BlockId>,
}

impl BasicBlock {
    pub fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }

    /// All instruction ids in the block, terminator last.
    pub fn all_insts(&self) -> impl Iterator<Item = InstId> + '_ {
        self.insts.iter().copied().chain(self.terminator)
    }
}

/// A defined or externally-declared function. Instructions are owned by an
/// arena (`insts`); blocks reference them by `InstId` rather than holding
/// them directly, so erasing or replacing an instruction never invalidates a
/// handle held elsewhere (see the lowering/optimizer design notes).
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret_ty: IrType,
    /// `None` for an external declaration.
    pub entry: Option<BlockId>,
    pub blocks: Vec<BasicBlock>,
    insts: Vec<Inst>,
}

impl Function {
    pub fn new_extern(name: impl Into<String>, params: Vec<Param>, ret_ty: IrType) -> Self {
        Function {
            name: name.into(),
            params,
            ret_ty,
            entry: None,
            blocks: Vec::new(),
            insts: Vec::new(),
        }
    }

    pub fn new_defined(name: impl Into<String>, params: Vec<Param>, ret_ty: IrType) -> Self {
        let mut f = Function {
            name: name.into(),
            params,
            ret_ty,
            entry: None,
            blocks: Vec::new(),
            insts: Vec::new(),
        };
        let entry = f.new_block();
        f.entry = Some(entry);
        f
    }

    pub fn is_extern(&self) -> bool {
        self.entry.is_none()
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::default());
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0 as usize]
    }

    /// Allocate a new instruction in the arena without placing it in any block.
    pub fn alloc_inst(&mut self, inst: Inst) -> InstId {
        let id = InstId(self.insts.len() as u32);
        self.insts.push(inst);
        id
    }

    /// Append a non-terminator instruction to the end of `block`.
    pub fn push_inst(&mut self, block: BlockId, inst: Inst) -> InstId {
        debug_assert!(!inst.is_terminator(), "use set_terminator for Br/Ret");
        let id = self.alloc_inst(inst);
        self.block_mut(block).insts.push(id);
        id
    }

    /// Set the terminator of `block`. A block may have its terminator
    /// overwritten only while still under construction (e.g. lowering
    /// rewriting a provisional `Br` into a real one never happens; this is
    /// used exactly once per block by lowering).
    pub fn set_terminator(&mut self, block: BlockId, inst: Inst) -> InstId {
        debug_assert!(inst.is_terminator());
        let id = self.alloc_inst(inst);
        self.block_mut(block).terminator = Some(id);
        id
    }

    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.0 as usize]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id.0 as usize]
    }

    /// Number of instructions ever allocated (including erased ones); used
    /// to size dense per-instruction bitsets in the optimizer.
    pub fn inst_capacity(&self) -> usize {
        self.insts.len()
    }

    /// All block ids that currently have at least one instruction or a
    /// terminator referencing them (i.e. are reachable from a `Br`), used to
    /// recompute predecessors. `entry` is always reachable by definition.
    pub fn recompute_preds(&mut self) {
        for b in self.blocks.iter_mut() {
            b.preds.clear();
        }
        let edges: Vec<(BlockId, BlockId)> = self
            .blocks
            .iter()
            .enumerate()
            .flat_map(|(i, b)| {
                let from = BlockId(i as u32);
                b.terminator
                    .map(|t| self.insts[t.0 as usize].successors())
                    .unwrap_or_default()
                    .into_iter()
                    .map(move |to| (from, to))
            })
            .collect();
        for (from, to) in edges {
            let preds = &mut self.block_mut(to).preds;
            if !preds.contains(&from) {
                preds.push(from);
            }
        }
    }

    /// Reorder the entry block's instructions so every `Alloca` comes first,
    /// in its original relative order, followed by everything else. Lowering
    /// allocates a param's slot and immediately stores its argument into it,
    /// which otherwise interleaves allocas with stores; this restores the
    /// "all allocas grouped at the top of entry" invariant after the fact.
    pub fn group_entry_allocas(&mut self) {
        let Some(entry) = self.entry else { return };
        let insts = std::mem::take(&mut self.block_mut(entry).insts);
        let (mut allocas, rest): (Vec<InstId>, Vec<InstId>) =
            insts.into_iter().partition(|&id| matches!(self.inst(id), Inst::Alloca { .. }));
        allocas.extend(rest);
        self.block_mut(entry).insts = allocas;
    }

    /// Remove every non-entry block with zero predecessors. Repeats until
    /// stable, since removing one dead block can orphan another.
    pub fn prune_unreachable_blocks(&mut self) {
        if self.entry.is_none() {
            return;
        }
        loop {
            self.recompute_preds();
            let entry = self.entry.unwrap();
            let mut reachable: IndexSet<BlockId> = IndexSet::new();
            let mut stack = vec![entry];
            reachable.insert(entry);
            while let Some(b) = stack.pop() {
                if let Some(term) = self.block(b).terminator {
                    for s in self.inst(term).successors() {
                        if reachable.insert(s) {
                            stack.push(s);
                        }
                    }
                }
            }
            if reachable.len() == self.blocks.len() {
                return;
            }
            // Rebuild the block list with only reachable blocks, remapping ids.
            let mut remap = vec![None; self.blocks.len()];
            let mut new_blocks = Vec::new();
            for (old_idx, block) in self.blocks.iter().enumerate() {
                if reachable.contains(&BlockId(old_idx as u32)) {
                    remap[old_idx] = Some(BlockId(new_blocks.len() as u32));
                    new_blocks.push(block.clone());
                }
            }
            for block in new_blocks.iter_mut() {
                if let Some(term) = block.terminator {
                    let inst = &mut self.insts[term.0 as usize];
                    Self::remap_block_refs(inst, &remap);
                }
            }
            self.entry = remap[entry.0 as usize];
            self.blocks = new_blocks;
        }
    }

    fn remap_block_refs(inst: &mut Inst, remap: &[Option<BlockId>]) {
        if let Inst::Br { then_block, else_block, .. } = inst {
            *then_block = remap[then_block.0 as usize].expect("live successor must remain reachable");
            if let Some(e) = else_block {
                *e = remap[e.0 as usize].expect("live successor must remain reachable");
            }
        }
    }

    /// Replace every use of `old` across every instruction in the function
    /// with `new`. Does not erase `old` itself; DCE is responsible for that.
    pub fn replace_all_uses_with(&mut self, old: InstId, new: Value) {
        for inst in self.insts.iter_mut() {
            inst.replace_uses(old, new);
        }
    }

    /// Whether `id` is read by any instruction in the function.
    pub fn has_uses(&self, id: InstId) -> bool {
        self.insts.iter().any(|i| i.operands().contains(&Value::Inst(id)))
    }

    /// Remove an instruction from its block's body (not valid for a
    /// terminator). The arena slot is left allocated but unreferenced.
    pub fn erase_from_block(&mut self, block: BlockId, id: InstId) {
        self.block_mut(block).insts.retain(|&i| i != id);
    }

    pub fn signature(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|p| format!("{} {}", p.ty, p.name))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} {}({})", self.ret_ty, self.name, params)
    }
}

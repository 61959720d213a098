//! 32-bit x86 AT&T assembly emission: offset assignment, prologue/epilogue,
//! per-instruction lowering, and the calling convention around `Call`.
//!
//! Registers used: `%eax` as the reserved scratch (`ACC`), and the three
//! pool registers mapped to `%ebx`, `%ecx`, `%edx`.

use std::collections::HashMap;
use std::fmt::Write as _;

use log::debug;

use crate::diagnostics::EmitError;
use crate::ir::{BinOp, BlockId, Function, Inst, InstId, Module, Value};
use crate::regalloc::{self, Allocation, PoolReg, RegisterAllocation};

const ACC: &str = "%eax";
const POOL_NAMES: [&str; 3] = ["%ebx", "%ecx", "%edx"];

fn reg_name(r: PoolReg) -> &'static str {
    match r {
        PoolReg::R1 => POOL_NAMES[0],
        PoolReg::R2 => POOL_NAMES[1],
        PoolReg::R3 => POOL_NAMES[2],
    }
}

/// Per-function mapping from a slot (`Alloca`) or spilled value to a signed
/// byte displacement from `%ebp`, plus the total frame size below it.
struct OffsetMap {
    offsets: HashMap<InstId, i32>,
    local_mem: u32,
}

impl OffsetMap {
    fn get(&self, id: InstId) -> i32 {
        self.offsets[&id]
    }
}

fn compute_offsets(func: &Function, alloc: &RegisterAllocation) -> OffsetMap {
    let mut offsets = HashMap::new();
    let mut offset: i32 = 0;

    // Argument slots sit above the saved base pointer at a fixed, calling
    // convention-determined displacement rather than in the local frame.
    let mut arg_slot_offset: HashMap<InstId, i32> = HashMap::new();
    for block in &func.blocks {
        for id in block.all_insts() {
            if let Inst::Store { value: Value::Arg(a), slot: Value::Inst(slot_id) } = func.inst(id) {
                arg_slot_offset.insert(*slot_id, 8 + 4 * a.0 as i32);
            }
        }
    }

    for block in &func.blocks {
        for id in block.all_insts() {
            if matches!(func.inst(id), Inst::Alloca { .. }) {
                let off = match arg_slot_offset.get(&id) {
                    Some(&o) => o,
                    None => {
                        offset -= 4;
                        offset
                    }
                };
                offsets.insert(id, off);
            }
        }
    }

    // Spilled value-producing instructions each need a memory location too.
    for block in &func.blocks {
        for id in block.all_insts() {
            if offsets.contains_key(&id) {
                continue;
            }
            let inst = func.inst(id);
            if inst.result_type().is_none() || alloc.get(id) != Some(Allocation::Spill) {
                continue;
            }
            if let Inst::Load { slot: Value::Inst(slot_id), .. } = inst {
                if let Some(&o) = offsets.get(slot_id) {
                    offsets.insert(id, o);
                    continue;
                }
            }
            // Otherwise inherit the offset of the slot it is eventually
            // stored into; failing that (never stored to a named slot),
            // give it a fresh frame slot of its own.
            let stored_into = func.blocks.iter().flat_map(|b| b.insts.iter()).find_map(|&id2| {
                match func.inst(id2) {
                    Inst::Store { value: Value::Inst(v), slot: Value::Inst(slot_id) } if *v == id => {
                        offsets.get(slot_id).copied()
                    }
                    _ => None,
                }
            });
            let off = stored_into.unwrap_or_else(|| {
                offset -= 4;
                offset
            });
            offsets.insert(id, off);
        }
    }

    OffsetMap { offsets, local_mem: (-offset) as u32 }
}

enum Operand {
    Imm(i32),
    Reg(&'static str),
    Mem(i32),
}

impl Operand {
    fn text(&self) -> String {
        match self {
            Operand::Imm(n) => format!("${n}"),
            Operand::Reg(r) => r.to_string(),
            Operand::Mem(off) => format!("{off}(%ebp)"),
        }
    }
}

fn operand_of(value: Value, alloc: &RegisterAllocation, offsets: &OffsetMap) -> Operand {
    match value {
        Value::Const(n) => Operand::Imm(n),
        Value::Arg(a) => Operand::Mem(8 + 4 * a.0 as i32),
        Value::Inst(id) => match alloc.get(id) {
            Some(Allocation::Reg(r)) => Operand::Reg(reg_name(r)),
            Some(Allocation::Spill) => Operand::Mem(offsets.get(id)),
            None => Operand::Mem(offsets.get(id)), // slot address (Alloca)
        },
        Value::Block(_) => unreachable!("a block reference is never a data operand"),
    }
}

/// Where a value-producing instruction's result ends up: a pool register, or
/// `ACC` used as scratch for a spilled result (the true home is memory,
/// written via a trailing store after the op).
fn dest_reg(id: InstId, alloc: &RegisterAllocation) -> &'static str {
    match alloc.get(id) {
        Some(Allocation::Reg(r)) => reg_name(r),
        Some(Allocation::Spill) | None => ACC,
    }
}

fn already_resident(value: Value, dst: &'static str, alloc: &RegisterAllocation) -> bool {
    if let Value::Inst(id) = value {
        if let Some(Allocation::Reg(r)) = alloc.get(id) {
            return reg_name(r) == dst;
        }
    }
    false
}

struct Emitter<'a> {
    func: &'a Function,
    alloc: &'a RegisterAllocation,
    offsets: &'a OffsetMap,
    out: String,
}

impl<'a> Emitter<'a> {
    fn line(&mut self, text: &str) {
        let _ = writeln!(self.out, "\t{text}");
    }

    fn operand(&self, value: Value) -> String {
        operand_of(value, self.alloc, self.offsets).text()
    }

    fn emit_binary_like(&mut self, dst: &'static str, lhs: Value, rhs: Value, mnemonic: &str) {
        if !already_resident(lhs, dst, self.alloc) {
            let src = self.operand(lhs);
            self.line(&format!("movl  {src}, {dst}"));
        }
        let rhs_text = self.operand(rhs);
        self.line(&format!("{mnemonic} {rhs_text}, {dst}"));
    }

    fn spill_result(&mut self, id: InstId) {
        if self.alloc.get(id) == Some(Allocation::Spill) {
            let off = self.offsets.get(id);
            self.line(&format!("movl  {ACC}, {off}(%ebp)"));
        }
    }

    fn emit_store(&mut self, value: Value, slot_off: i32) {
        match operand_of(value, self.alloc, self.offsets) {
            Operand::Mem(src_off) => {
                self.line(&format!("movl  {src_off}(%ebp), {ACC}"));
                self.line(&format!("movl  {ACC}, {slot_off}(%ebp)"));
            }
            operand => {
                let text = operand.text();
                self.line(&format!("movl  {text}, {slot_off}(%ebp)"));
            }
        }
    }

    fn emit_conditional_branch(&mut self, cond: InstId, then_block: BlockId, else_block: BlockId) -> Result<(), EmitError> {
        let Inst::ICmp { pred, lhs, rhs } = self.func.inst(cond) else {
            return Err(EmitError::UnsupportedInstruction(format!(
                "conditional branch condition {cond} is not an ICmp"
            )));
        };
        let (pred, lhs, rhs) = (*pred, *lhs, *rhs);
        let base = match operand_of(lhs, self.alloc, self.offsets) {
            Operand::Reg(r) => r,
            _ => {
                let src = self.operand(lhs);
                self.line(&format!("movl  {src}, {ACC}"));
                ACC
            }
        };
        let rhs_text = self.operand(rhs);
        self.line(&format!("cmpl  {rhs_text}, {base}"));
        self.line(&format!("{} .BB{}", pred.jump_mnemonic(), then_block.0 + 1));
        self.line(&format!("jmp   .BB{}", else_block.0 + 1));
        Ok(())
    }

    fn emit_call(&mut self, id: InstId, callee: &str, args: &[Value], has_result: bool) {
        for r in POOL_NAMES {
            self.line(&format!("pushl {r}"));
        }
        for arg in args.iter().rev() {
            let text = self.operand(*arg);
            self.line(&format!("pushl {text}"));
        }
        self.line(&format!("call  {callee}"));
        if !args.is_empty() {
            self.line(&format!("addl  ${}, %esp", 4 * args.len()));
        }
        for r in POOL_NAMES.iter().rev() {
            self.line(&format!("popl  {r}"));
        }
        if has_result {
            match self.alloc.get(id) {
                Some(Allocation::Reg(r)) => self.line(&format!("movl  {ACC}, {}", reg_name(r))),
                Some(Allocation::Spill) => {
                    let off = self.offsets.get(id);
                    self.line(&format!("movl  {ACC}, {off}(%ebp)"));
                }
                None => {}
            }
        }
    }

    fn epilogue(&mut self) {
        self.line("movl  %ebp, %esp");
        self.line("popl  %ebp");
        self.line("ret");
    }
}

fn emit_function(func: &Function, alloc: &RegisterAllocation) -> Result<String, EmitError> {
    let offsets = compute_offsets(func, alloc);
    let mut e = Emitter { func, alloc, offsets: &offsets, out: String::new() };

    let _ = writeln!(e.out, "\t.file \"{}\"", func.name);
    let _ = writeln!(e.out, "\t.text");
    let _ = writeln!(e.out, "\t.globl {}", func.name);
    let _ = writeln!(e.out, "\t.type {}, @function", func.name);
    let _ = writeln!(e.out, "{}:", func.name);

    e.line("pushl %ebp");
    e.line("movl  %esp, %ebp");
    if offsets.local_mem > 0 {
        e.line(&format!("subl  ${}, %esp", offsets.local_mem));
    }

    for (idx, block) in func.blocks.iter().enumerate() {
        let _ = writeln!(e.out, ".BB{}:", idx + 1);
        for id in block.insts.iter().copied() {
            emit_instruction(&mut e, id)?;
        }
        let term = block.terminator.expect("every block has a terminator after lowering");
        emit_terminator(&mut e, term)?;
        let _ = writeln!(e.out);
    }

    Ok(e.out)
}

fn emit_instruction(e: &mut Emitter, id: InstId) -> Result<(), EmitError> {
    match e.func.inst(id).clone() {
        Inst::Alloca { .. } => {}
        Inst::Load { slot, .. } => {
            // A spilled Load never moves: it already lives at its slot's
            // address, so later reads resolve straight to that memory
            // operand (see `operand_of`). Only a register destination needs
            // an actual `movl` here.
            if let Some(Allocation::Reg(r)) = e.alloc.get(id) {
                let src = e.operand(slot);
                e.line(&format!("movl  {src}, {}", reg_name(r)));
            }
        }
        Inst::Store { value, slot } => {
            if matches!(value, Value::Arg(_)) {
                return Ok(()); // already resident at its +8(%ebp) displacement
            }
            let slot_id = slot.as_inst().ok_or_else(|| {
                EmitError::UnsupportedInstruction(format!("store {id} targets a non-slot value"))
            })?;
            let slot_off = e.offsets.get(slot_id);
            e.emit_store(value, slot_off);
        }
        Inst::Binary { op: BinOp::SDiv, .. } => {
            // `idivl` takes a single divisor operand, divides %edx:%eax, and
            // needs a `cltd` sign-extension first; it has no two-operand
            // form and would also clobber the %edx pool register. A
            // constant divisor folds away in the optimizer (`BinOp::eval`);
            // anything left by the time it reaches emission has no lowering
            // here.
            return Err(EmitError::UnsupportedInstruction(format!("{id} is an unfolded SDiv, which this emitter does not lower")));
        }
        Inst::Binary { op, lhs, rhs, .. } => {
            let dst = dest_reg(id, e.alloc);
            e.emit_binary_like(dst, lhs, rhs, op.mnemonic());
            e.spill_result(id);
        }
        Inst::Neg { operand, .. } => {
            let dst = dest_reg(id, e.alloc);
            let src = e.operand(operand);
            e.line(&format!("movl  {src}, {dst}"));
            e.line(&format!("negl  {dst}"));
            e.spill_result(id);
        }
        Inst::ICmp { .. } => {
            // Folded directly into whichever `Br` consumes it.
        }
        Inst::Call { callee, args, ty } => {
            e.emit_call(id, &callee, &args, ty.is_some());
        }
        Inst::Br { .. } | Inst::Ret { .. } => unreachable!("terminators are not in block.insts"),
    }
    Ok(())
}

fn emit_terminator(e: &mut Emitter, id: InstId) -> Result<(), EmitError> {
    match e.func.inst(id).clone() {
        Inst::Br { cond: None, then_block, .. } => {
            e.line(&format!("jmp   .BB{}", then_block.0 + 1));
        }
        Inst::Br { cond: Some(cond), then_block, else_block } => {
            let cond_id = cond.as_inst().ok_or_else(|| {
                EmitError::UnsupportedInstruction(format!("branch {id} has a non-instruction condition"))
            })?;
            let else_block = else_block.ok_or_else(|| {
                EmitError::UnsupportedInstruction(format!("conditional branch {id} is missing its false target"))
            })?;
            e.emit_conditional_branch(cond_id, then_block, else_block)?;
        }
        Inst::Ret { value } => {
            if let Some(v) = value {
                let src = e.operand(v);
                e.line(&format!("movl  {src}, {ACC}"));
            }
            e.epilogue();
        }
        _ => unreachable!("only Br and Ret are terminators"),
    }
    Ok(())
}

/// Emit every defined function in `module`, computing register allocation
/// internally per function. Externs produce no code.
pub fn emit_module(module: &Module) -> Result<String, EmitError> {
    let mut out = String::new();
    for func in module.defined_functions() {
        debug!("emitting assembly for `{}`", func.name);
        let alloc = regalloc::allocate_function(func);
        out.push_str(&emit_function(func, &alloc)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArgId, IrType, Param};

    #[test]
    fn empty_void_function_has_no_local_frame() {
        let mut f = Function::new_defined("f", vec![], IrType::Void);
        let entry = f.entry.unwrap();
        f.set_terminator(entry, Inst::Ret { value: None });

        let alloc = regalloc::allocate_function(&f);
        let asm = emit_function(&f, &alloc).unwrap();
        assert!(!asm.contains("subl"));
        assert!(asm.contains("popl  %ebp"));
        assert!(asm.contains("ret"));
    }

    #[test]
    fn identity_return_loads_argument_from_its_frame_offset() {
        let mut f = Function::new_defined("f", vec![Param { name: "x".into(), ty: IrType::I32 }], IrType::I32);
        let entry = f.entry.unwrap();
        let slot = f.push_inst(entry, Inst::Alloca { ty: IrType::I32 });
        f.push_inst(entry, Inst::Store { value: Value::Arg(ArgId(0)), slot: Value::Inst(slot) });
        let load = f.push_inst(entry, Inst::Load { slot: Value::Inst(slot), ty: IrType::I32 });
        f.set_terminator(entry, Inst::Ret { value: Some(Value::Inst(load)) });

        let alloc = regalloc::allocate_function(&f);
        let asm = emit_function(&f, &alloc).unwrap();
        assert!(asm.contains("8(%ebp)"));
        assert!(asm.contains(ACC));
    }

    #[test]
    fn conditional_branch_emits_cmpl_then_predicate_jump_then_fallback_jump() {
        let mut f = Function::new_defined("f", vec![Param { name: "x".into(), ty: IrType::I32 }], IrType::I32);
        let entry = f.entry.unwrap();
        let slot = f.push_inst(entry, Inst::Alloca { ty: IrType::I32 });
        f.push_inst(entry, Inst::Store { value: Value::Arg(ArgId(0)), slot: Value::Inst(slot) });
        let load = f.push_inst(entry, Inst::Load { slot: Value::Inst(slot), ty: IrType::I32 });
        let cmp = f.push_inst(entry, Inst::ICmp { pred: crate::ir::ICmpPredicate::Slt, lhs: Value::Inst(load), rhs: Value::Const(0) });
        let then_b = f.new_block();
        let else_b = f.new_block();
        f.set_terminator(entry, Inst::Br { cond: Some(Value::Inst(cmp)), then_block: then_b, else_block: Some(else_b) });
        let neg = f.push_inst(then_b, Inst::Neg { operand: Value::Inst(load), ty: IrType::I32 });
        f.set_terminator(then_b, Inst::Ret { value: Some(Value::Inst(neg)) });
        f.set_terminator(else_b, Inst::Ret { value: Some(Value::Inst(load)) });
        f.recompute_preds();

        let alloc = regalloc::allocate_function(&f);
        let asm = emit_function(&f, &alloc).unwrap();
        assert!(asm.contains("cmpl"));
        assert!(asm.contains("jl"));
        assert!(asm.contains("jmp"));
    }

    #[test]
    fn unfolded_sdiv_is_rejected_rather_than_emitted_as_a_two_operand_idivl() {
        let mut f = Function::new_defined("f", vec![Param { name: "x".into(), ty: IrType::I32 }], IrType::I32);
        let entry = f.entry.unwrap();
        let slot = f.push_inst(entry, Inst::Alloca { ty: IrType::I32 });
        f.push_inst(entry, Inst::Store { value: Value::Arg(ArgId(0)), slot: Value::Inst(slot) });
        let load = f.push_inst(entry, Inst::Load { slot: Value::Inst(slot), ty: IrType::I32 });
        let div = f.push_inst(entry, Inst::Binary { op: BinOp::SDiv, lhs: Value::Inst(load), rhs: Value::Const(3), ty: IrType::I32 });
        f.set_terminator(entry, Inst::Ret { value: Some(Value::Inst(div)) });

        let alloc = regalloc::allocate_function(&f);
        let err = emit_function(&f, &alloc).unwrap_err();
        assert!(matches!(err, EmitError::UnsupportedInstruction(_)));
    }
}

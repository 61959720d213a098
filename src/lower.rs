//! AST → IR lowering (see the component design's lowering procedure).
//!
//! Lowering walks the AST once, building a single defined function's CFG:
//! parameters and locals become `alloca`d slots, every read is a `Load`,
//! every write a `Store`, and `if`/`while`/`return` are expanded into the
//! block shapes described there, funneling every `return` through one
//! shared return block. Dead blocks left behind by unreachable branches are
//! pruned at the end.

use std::collections::HashMap;

use log::{debug, error, info};

use crate::ast;
use crate::diagnostics::LowerError;
use crate::ir::{self, BinOp, BlockId, ICmpPredicate, Inst, InstId, IrType, Module, Value};

fn lower_type(ty: ast::Type) -> IrType {
    match ty {
        ast::Type::Void => IrType::Void,
        ast::Type::Int => IrType::I32,
        ast::Type::Char => IrType::I8,
        ast::Type::CharPtr => IrType::I8Ptr,
    }
}

/// A callee signature, gathered up front from extern declarations and the
/// defined function itself so call sites can be checked against it.
struct Signature {
    param_types: Vec<ast::Type>,
    return_type: ast::Type,
}

struct FunctionLowerer<'a> {
    func: ir::Function,
    signatures: &'a HashMap<String, Signature>,
    /// name -> (slot instruction id, variable's scalar type)
    vars: HashMap<String, (InstId, IrType)>,
    ret_slot: Option<(InstId, ast::Type)>,
    ret_block: Option<BlockId>,
    cur_block: BlockId,
    /// Set once `cur_block` is a dead block created after an unconditional
    /// jump away (e.g. the statements textually following a `return`).
    /// Such a block is guaranteed to end up with zero predecessors and is
    /// pruned at the end of lowering; while this flag is set, the trailing
    /// fallthrough check at the end of the function must not fire.
    unreachable: bool,
    fn_name: String,
}

impl<'a> FunctionLowerer<'a> {
    fn declare_slot(&mut self, name: &str, ast_ty: ast::Type) -> InstId {
        let entry = self.func.entry.expect("defined function has an entry block");
        let slot = self.func.push_inst(entry, Inst::Alloca { ty: lower_type(ast_ty) });
        self.vars.insert(name.to_string(), (slot, lower_type(ast_ty)));
        slot
    }

    fn ensure_ret_block(&mut self) -> BlockId {
        if let Some(b) = self.ret_block {
            return b;
        }
        let b = self.func.new_block();
        self.ret_block = Some(b);
        b
    }

    fn jump_to_return(&mut self) {
        let ret_block = self.ensure_ret_block();
        self.func.set_terminator(self.cur_block, Inst::Br { cond: None, then_block: ret_block, else_block: None });
        // Anything lowered after a `return` in source order is unreachable;
        // give it a fresh, predecessor-less block so lowering can proceed
        // without ever pushing instructions past a terminator.
        self.cur_block = self.func.new_block();
        self.unreachable = true;
    }

    fn lower_block(&mut self, block: &ast::Block) -> Result<(), LowerError> {
        for stmt in &block.statements {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &ast::Stmt) -> Result<(), LowerError> {
        match stmt {
            ast::Stmt::Block(b) => self.lower_block(b),
            ast::Stmt::Declaration { name, ty, init } => {
                let slot = self.declare_slot(name, *ty);
                if let Some(init) = init {
                    let v = self.lower_expr(init)?;
                    self.func.push_inst(self.cur_block, Inst::Store { value: v, slot: Value::Inst(slot) });
                }
                Ok(())
            }
            ast::Stmt::Assignment { name, value } => {
                let (slot, _) = *self
                    .vars
                    .get(name)
                    .ok_or_else(|| LowerError::UndeclaredVariable(name.clone()))?;
                let v = self.lower_expr(value)?;
                self.func.push_inst(self.cur_block, Inst::Store { value: v, slot: Value::Inst(slot) });
                Ok(())
            }
            ast::Stmt::Call { name, args } => {
                self.lower_call(name, args)?;
                Ok(())
            }
            ast::Stmt::If { cond, then_branch, else_branch } => {
                let cond_val = self.lower_expr(cond)?;
                let join = self.func.new_block();
                let then_blk = self.func.new_block();
                let else_blk = else_branch.as_ref().map(|_| self.func.new_block());
                let false_target = else_blk.unwrap_or(join);
                self.func.set_terminator(
                    self.cur_block,
                    Inst::Br { cond: Some(cond_val), then_block: then_blk, else_block: Some(false_target) },
                );

                self.cur_block = then_blk;
                self.unreachable = false;
                self.lower_block(then_branch)?;
                if !self.unreachable {
                    self.func.set_terminator(self.cur_block, Inst::Br { cond: None, then_block: join, else_block: None });
                }

                if let (Some(else_blk), Some(else_branch)) = (else_blk, else_branch) {
                    self.cur_block = else_blk;
                    self.unreachable = false;
                    self.lower_block(else_branch)?;
                    if !self.unreachable {
                        self.func.set_terminator(self.cur_block, Inst::Br { cond: None, then_block: join, else_block: None });
                    }
                }

                self.cur_block = join;
                self.unreachable = false;
                Ok(())
            }
            ast::Stmt::While { cond, body } => {
                let header = self.func.new_block();
                let body_blk = self.func.new_block();
                let exit = self.func.new_block();

                if !self.unreachable {
                    self.func.set_terminator(self.cur_block, Inst::Br { cond: None, then_block: header, else_block: None });
                }

                self.cur_block = header;
                self.unreachable = false;
                let cond_val = self.lower_expr(cond)?;
                self.func.set_terminator(
                    self.cur_block,
                    Inst::Br { cond: Some(cond_val), then_block: body_blk, else_block: Some(exit) },
                );

                self.cur_block = body_blk;
                self.unreachable = false;
                self.lower_block(body)?;
                if !self.unreachable {
                    self.func.set_terminator(self.cur_block, Inst::Br { cond: None, then_block: header, else_block: None });
                }

                self.cur_block = exit;
                self.unreachable = false;
                Ok(())
            }
            ast::Stmt::Return(expr) => {
                match (self.ret_slot, expr) {
                    (Some((slot, _ty)), Some(e)) => {
                        let v = self.lower_expr(e)?;
                        self.func.push_inst(self.cur_block, Inst::Store { value: v, slot: Value::Inst(slot) });
                    }
                    (None, Some(_)) => return Err(LowerError::VoidFunctionReturnsValue(self.fn_name.clone())),
                    (Some(_), None) => return Err(LowerError::MissingReturnValue(self.fn_name.clone())),
                    (None, None) => {}
                }
                self.jump_to_return();
                Ok(())
            }
        }
    }

    fn lower_call(&mut self, name: &str, args: &[ast::Expr]) -> Result<Option<Value>, LowerError> {
        let sig = self
            .signatures
            .get(name)
            .ok_or_else(|| LowerError::UndeclaredFunction(name.to_string()))?;
        if sig.param_types.len() != args.len() {
            return Err(LowerError::ArityMismatch {
                name: name.to_string(),
                expected: sig.param_types.len(),
                got: args.len(),
            });
        }
        let mut arg_values = Vec::with_capacity(args.len());
        for (index, (arg, expected)) in args.iter().zip(sig.param_types.iter()).enumerate() {
            let got = expr_static_type(arg);
            if got != *expected {
                return Err(LowerError::ArgTypeMismatch {
                    name: name.to_string(),
                    index,
                    expected: *expected,
                    got,
                });
            }
            arg_values.push(self.lower_expr(arg)?);
        }
        let ret_ty = sig.return_type;
        let ty = if ret_ty == ast::Type::Void { None } else { Some(lower_type(ret_ty)) };
        let id = self.func.push_inst(self.cur_block, Inst::Call { callee: name.to_string(), args: arg_values, ty });
        Ok(ty.map(|_| Value::Inst(id)))
    }

    fn lower_expr(&mut self, expr: &ast::Expr) -> Result<Value, LowerError> {
        match expr {
            ast::Expr::IntLiteral(n) => Ok(Value::Const(*n)),
            ast::Expr::Var { name, .. } => {
                let (slot, ty) = *self
                    .vars
                    .get(name)
                    .ok_or_else(|| LowerError::UndeclaredVariable(name.clone()))?;
                let id = self.func.push_inst(self.cur_block, Inst::Load { slot: Value::Inst(slot), ty });
                Ok(Value::Inst(id))
            }
            ast::Expr::Neg(inner) => {
                let v = self.lower_expr(inner)?;
                let id = self.func.push_inst(self.cur_block, Inst::Neg { operand: v, ty: IrType::I32 });
                Ok(Value::Inst(id))
            }
            ast::Expr::Binary { op, lhs, rhs } => {
                let l = self.lower_expr(lhs)?;
                let r = self.lower_expr(rhs)?;
                let id = match op {
                    ast::BinOp::Add => self.func.push_inst(self.cur_block, Inst::Binary { op: BinOp::Add, lhs: l, rhs: r, ty: IrType::I32 }),
                    ast::BinOp::Sub => self.func.push_inst(self.cur_block, Inst::Binary { op: BinOp::Sub, lhs: l, rhs: r, ty: IrType::I32 }),
                    ast::BinOp::Mul => self.func.push_inst(self.cur_block, Inst::Binary { op: BinOp::Mul, lhs: l, rhs: r, ty: IrType::I32 }),
                    ast::BinOp::Div => self.func.push_inst(self.cur_block, Inst::Binary { op: BinOp::SDiv, lhs: l, rhs: r, ty: IrType::I32 }),
                    ast::BinOp::Eq => self.func.push_inst(self.cur_block, Inst::ICmp { pred: ICmpPredicate::Eq, lhs: l, rhs: r }),
                    ast::BinOp::Ne => self.func.push_inst(self.cur_block, Inst::ICmp { pred: ICmpPredicate::Ne, lhs: l, rhs: r }),
                    ast::BinOp::Lt => self.func.push_inst(self.cur_block, Inst::ICmp { pred: ICmpPredicate::Slt, lhs: l, rhs: r }),
                    ast::BinOp::Le => self.func.push_inst(self.cur_block, Inst::ICmp { pred: ICmpPredicate::Sle, lhs: l, rhs: r }),
                    ast::BinOp::Gt => self.func.push_inst(self.cur_block, Inst::ICmp { pred: ICmpPredicate::Sgt, lhs: l, rhs: r }),
                    ast::BinOp::Ge => self.func.push_inst(self.cur_block, Inst::ICmp { pred: ICmpPredicate::Sge, lhs: l, rhs: r }),
                };
                Ok(Value::Inst(id))
            }
            ast::Expr::Call { name, args, .. } => {
                let result = self.lower_call(name, args)?;
                Ok(result.unwrap_or(Value::Const(0)))
            }
        }
    }
}

fn expr_static_type(expr: &ast::Expr) -> ast::Type {
    match expr {
        ast::Expr::IntLiteral(_) => ast::Type::Int,
        ast::Expr::Var { ty, .. } => *ty,
        ast::Expr::Neg(inner) => expr_static_type(inner),
        ast::Expr::Binary { .. } => ast::Type::Int,
        ast::Expr::Call { ty, .. } => *ty,
    }
}

/// Lower a validated miniC program into an IR module.
pub fn lower_program(program: &ast::Program) -> Result<Module, LowerError> {
    info!("lowering program with {} extern(s)", program.externs.len());
    let mut module = Module::new();

    let mut signatures = HashMap::new();
    for ext in &program.externs {
        signatures.insert(
            ext.name.clone(),
            Signature { param_types: ext.param_types.clone(), return_type: ext.return_type },
        );
        let params = ext
            .param_types
            .iter()
            .enumerate()
            .map(|(i, ty)| ir::Param { name: format!("arg{i}"), ty: lower_type(*ty) })
            .collect();
        module.add_function(ir::Function::new_extern(ext.name.clone(), params, lower_type(ext.return_type)));
    }

    let func_ast = &program.function;
    signatures.insert(
        func_ast.name.clone(),
        Signature {
            param_types: func_ast.params.iter().map(|p| p.ty).collect(),
            return_type: func_ast.return_type,
        },
    );

    let ir_params = func_ast
        .params
        .iter()
        .map(|p| ir::Param { name: p.name.clone(), ty: lower_type(p.ty) })
        .collect();
    let func = ir::Function::new_defined(func_ast.name.clone(), ir_params, lower_type(func_ast.return_type));
    let entry = func.entry.expect("defined function has an entry block");

    let mut lowerer = FunctionLowerer {
        func,
        signatures: &signatures,
        vars: HashMap::new(),
        ret_slot: None,
        ret_block: None,
        cur_block: entry,
        unreachable: false,
        fn_name: func_ast.name.clone(),
    };

    if func_ast.return_type != ast::Type::Void {
        let slot = lowerer.func.push_inst(entry, Inst::Alloca { ty: lower_type(func_ast.return_type) });
        lowerer.ret_slot = Some((slot, func_ast.return_type));
    }

    for param in &func_ast.params {
        let slot = lowerer.declare_slot(&param.name, param.ty);
        // Find the argument's index to build the Arg value (positions
        // mirror `func_ast.params` order).
        let idx = func_ast.params.iter().position(|p| p.name == param.name).unwrap();
        lowerer.func.push_inst(
            entry,
            Inst::Store { value: Value::Arg(ir::ArgId(idx as u32)), slot: Value::Inst(slot) },
        );
    }

    if let Err(e) = lowerer.lower_block(&func_ast.body) {
        error!("lowering `{}` failed: {e}", func_ast.name);
        return Err(e);
    }

    // Trailing fall-off-the-end handling: implicit void return, or a fatal
    // missing-return for a non-void function. A dead block created after the
    // function's last real `return` never needs this (see `unreachable`).
    if !lowerer.unreachable && !lowerer.func.block(lowerer.cur_block).is_terminated() {
        if func_ast.return_type == ast::Type::Void {
            lowerer.jump_to_return();
        } else {
            return Err(LowerError::MissingReturnValue(func_ast.name.clone()));
        }
    }

    if let Some(ret_block) = lowerer.ret_block {
        match lowerer.ret_slot {
            Some((slot, ty)) => {
                let loaded = lowerer.func.push_inst(ret_block, Inst::Load { slot: Value::Inst(slot), ty: lower_type(ty) });
                lowerer.func.set_terminator(ret_block, Inst::Ret { value: Some(Value::Inst(loaded)) });
            }
            None => {
                lowerer.func.set_terminator(ret_block, Inst::Ret { value: None });
            }
        }
    }

    let mut func = lowerer.func;
    func.group_entry_allocas();
    func.prune_unreachable_blocks();
    debug!("lowered `{}` to {} block(s)", func.name, func.blocks.len());
    module.add_function(func);
    Ok(module)
}

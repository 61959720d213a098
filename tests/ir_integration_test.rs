//! End-to-end pipeline tests covering the seed boundary scenarios: lower,
//! optimize, allocate, and emit a handful of small miniC programs and check
//! the resulting assembly's shape.

use minic_backend::ast::{BinOp, Block, Expr, ExternDecl, FunctionDef, Param, Program, Stmt, Type};
use minic_backend::{run, OptLevel};

fn program(function: FunctionDef) -> Program {
    Program { externs: vec![], function }
}

#[test]
fn empty_void_function_has_no_local_frame_and_a_single_epilogue() {
    let f = FunctionDef {
        name: "f".into(),
        return_type: Type::Void,
        params: vec![],
        body: Block { statements: vec![Stmt::Return(None)] },
    };
    let out = run(&program(f), OptLevel::O1).unwrap();
    assert!(!out.assembly.contains("subl"));
    assert!(out.assembly.contains("popl  %ebp"));
    assert_eq!(out.assembly.matches("ret").count(), 1);
}

#[test]
fn identity_return_reads_argument_from_its_frame_offset() {
    let f = FunctionDef {
        name: "f".into(),
        return_type: Type::Int,
        params: vec![Param { name: "x".into(), ty: Type::Int }],
        body: Block { statements: vec![Stmt::Return(Some(Expr::Var { name: "x".into(), ty: Type::Int }))] },
    };
    let out = run(&program(f), OptLevel::O1).unwrap();
    assert!(out.assembly.contains("8(%ebp)"));
}

#[test]
fn constant_fold_collapses_to_a_single_return_of_fourteen() {
    let f = FunctionDef {
        name: "f".into(),
        return_type: Type::Int,
        params: vec![],
        body: Block {
            statements: vec![Stmt::Return(Some(Expr::Binary {
                op: BinOp::Add,
                lhs: Box::new(Expr::IntLiteral(2)),
                rhs: Box::new(Expr::Binary {
                    op: BinOp::Mul,
                    lhs: Box::new(Expr::IntLiteral(3)),
                    rhs: Box::new(Expr::IntLiteral(4)),
                }),
            }))],
        },
    };
    let out = run(&program(f), OptLevel::O1).unwrap();
    assert!(out.module.to_string().contains("ret 14"));
    assert!(out.assembly.contains("$14"));
}

#[test]
fn cse_leaves_exactly_one_surviving_multiply() {
    // int f(int x){ int a; int b; a = x*x + 1; b = x*x + 2; return a+b; }
    let x = || Expr::Var { name: "x".into(), ty: Type::Int };
    let x_times_x = || Expr::Binary { op: BinOp::Mul, lhs: Box::new(x()), rhs: Box::new(x()) };
    let f = FunctionDef {
        name: "f".into(),
        return_type: Type::Int,
        params: vec![Param { name: "x".into(), ty: Type::Int }],
        body: Block {
            statements: vec![
                Stmt::Declaration { name: "a".into(), ty: Type::Int, init: None },
                Stmt::Declaration { name: "b".into(), ty: Type::Int, init: None },
                Stmt::Assignment {
                    name: "a".into(),
                    value: Expr::Binary { op: BinOp::Add, lhs: Box::new(x_times_x()), rhs: Box::new(Expr::IntLiteral(1)) },
                },
                Stmt::Assignment {
                    name: "b".into(),
                    value: Expr::Binary { op: BinOp::Add, lhs: Box::new(x_times_x()), rhs: Box::new(Expr::IntLiteral(2)) },
                },
                Stmt::Return(Some(Expr::Binary {
                    op: BinOp::Add,
                    lhs: Box::new(Expr::Var { name: "a".into(), ty: Type::Int }),
                    rhs: Box::new(Expr::Var { name: "b".into(), ty: Type::Int }),
                })),
            ],
        },
    };
    let out = run(&program(f), OptLevel::O1).unwrap();
    let surviving_muls = out.module.to_string().matches("mul ").count();
    assert_eq!(surviving_muls, 1);
}

#[test]
fn branch_emits_predicate_jump_and_a_shared_return_block() {
    // int f(int x){ if (x<0) return -x; else return x; }
    let f = FunctionDef {
        name: "f".into(),
        return_type: Type::Int,
        params: vec![Param { name: "x".into(), ty: Type::Int }],
        body: Block {
            statements: vec![Stmt::If {
                cond: Expr::Binary {
                    op: BinOp::Lt,
                    lhs: Box::new(Expr::Var { name: "x".into(), ty: Type::Int }),
                    rhs: Box::new(Expr::IntLiteral(0)),
                },
                then_branch: Block {
                    statements: vec![Stmt::Return(Some(Expr::Neg(Box::new(Expr::Var {
                        name: "x".into(),
                        ty: Type::Int,
                    }))))],
                },
                else_branch: Some(Block { statements: vec![Stmt::Return(Some(Expr::Var { name: "x".into(), ty: Type::Int }))] }),
            }],
        },
    };
    let out = run(&program(f), OptLevel::O1).unwrap();
    assert!(out.assembly.contains("cmpl"));
    assert!(out.assembly.contains("jl"));
    assert_eq!(out.assembly.matches("popl  %ebp").count(), 1, "every return path shares one epilogue");
}

#[test]
fn five_simultaneously_live_temporaries_force_a_spill() {
    let x = || Expr::Var { name: "x".into(), ty: Type::Int };
    let add_const = |n: i32| Expr::Binary { op: BinOp::Add, lhs: Box::new(x()), rhs: Box::new(Expr::IntLiteral(n)) };
    let mut sum = add_const(1);
    for n in 2..=5 {
        sum = Expr::Binary { op: BinOp::Add, lhs: Box::new(sum), rhs: Box::new(add_const(n)) };
    }
    let f = FunctionDef {
        name: "f".into(),
        return_type: Type::Int,
        params: vec![Param { name: "x".into(), ty: Type::Int }],
        body: Block { statements: vec![Stmt::Return(Some(sum))] },
    };
    // Optimization would fold/CSE this down; run unoptimized to exercise the
    // allocator's spill path on five genuinely simultaneous live ranges.
    let out = run(&program(f), OptLevel::O0).unwrap();
    assert!(out.assembly.contains("%ebp"));
}

#[test]
fn extern_call_saves_and_restores_pool_registers() {
    let f = FunctionDef {
        name: "f".into(),
        return_type: Type::Void,
        params: vec![Param { name: "x".into(), ty: Type::Int }],
        body: Block {
            statements: vec![Stmt::Call { name: "print".into(), args: vec![Expr::Var { name: "x".into(), ty: Type::Int }] }, Stmt::Return(None)],
        },
    };
    let program = Program {
        externs: vec![ExternDecl { name: "print".into(), return_type: Type::Void, param_types: vec![Type::Int] }],
        function: f,
    };
    let out = run(&program, OptLevel::O1).unwrap();
    assert!(out.assembly.contains("call  print"));
    assert!(out.assembly.contains("pushl %ebx"));
    assert!(out.assembly.contains("popl  %ebx"));
}

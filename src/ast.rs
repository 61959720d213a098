//! The input contract delivered by the (external) front-end and semantic
//! analyzer: a validated miniC AST, already type-tagged and scope-checked.
//! This module owns only the data shape; it performs no validation of its
//! own beyond what `serde` gives for free at deserialization time.

use serde::{Deserialize, Serialize};

/// The scalar source-language types a front-end may attach to a declaration,
/// parameter, or return type. Mirrors `crate::ir::IrType` one-to-one; kept
/// as a separate type because the AST and IR are owned by different
/// components and must not share representation by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Void,
    Int,
    Char,
    /// A pointer to `Char` or `Int`; miniC only ever produces `char*`.
    CharPtr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternDecl {
    pub name: String,
    pub return_type: Type,
    pub param_types: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub return_type: Type,
    pub params: Vec<Param>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stmt {
    Block(Block),
    Declaration { name: String, ty: Type, init: Option<Expr> },
    Assignment { name: String, value: Expr },
    Call { name: String, args: Vec<Expr> },
    If { cond: Expr, then_branch: Block, else_branch: Option<Block> },
    While { cond: Expr, body: Block },
    Return(Option<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    IntLiteral(i32),
    Var { name: String, ty: Type },
    Neg(Box<Expr>),
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Call { name: String, args: Vec<Expr>, ty: Type },
}

/// The root AST node: a program's external declarations plus exactly one
/// defined function, as delivered by the front-end after semantic analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub externs: Vec<ExternDecl>,
    pub function: FunctionDef,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_round_trips_through_json() {
        let program = Program {
            externs: vec![ExternDecl { name: "print".into(), return_type: Type::Void, param_types: vec![Type::Int] }],
            function: FunctionDef {
                name: "f".into(),
                return_type: Type::Int,
                params: vec![Param { name: "x".into(), ty: Type::Int }],
                body: Block {
                    statements: vec![Stmt::Return(Some(Expr::Var { name: "x".into(), ty: Type::Int }))],
                },
            },
        };
        let json = serde_json::to_string(&program).unwrap();
        let back: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(program, back);
    }
}

//! The error taxonomy described in the error-handling design: one enum per
//! phase, unified under `BackendError` at the library boundary. Every
//! variant here is fatal — optimizer and register-allocator failures are
//! not representable because those phases always succeed (see their
//! module docs).

use thiserror::Error;

use crate::ast::Type;

#[derive(Debug, Error)]
pub enum LowerError {
    #[error("unknown AST node: {0}")]
    UnknownNode(String),

    #[error("call to undeclared function `{0}`")]
    UndeclaredFunction(String),

    #[error("call to `{name}` passes {got} argument(s), expected {expected}")]
    ArityMismatch { name: String, expected: usize, got: usize },

    #[error("call to `{name}` argument {index} has type {got:?}, expected {expected:?}")]
    ArgTypeMismatch { name: String, index: usize, expected: Type, got: Type },

    #[error("reference to undeclared variable `{0}`")]
    UndeclaredVariable(String),

    #[error("`return` with a value in a void function `{0}`")]
    VoidFunctionReturnsValue(String),

    #[error("non-void function `{0}` is missing a trailing return")]
    MissingReturnValue(String),
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("unsupported opcode shape for emission: {0}")]
    UnsupportedInstruction(String),

    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("could not read input file `{path}`: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("malformed AST in `{path}`: {source}")]
    Parse { path: String, source: serde_json::Error },
}

/// Top-level error returned from any public pipeline entry point.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("lowering failed: {0}")]
    Lower(#[from] LowerError),
    #[error("emission failed: {0}")]
    Emit(#[from] EmitError),
}

//! The intermediate representation: a typed, SSA-form control-flow graph of
//! basic blocks, grouped into functions and modules. See `crate::lower` for
//! how an AST becomes one of these, `crate::optimize` for the passes that
//! rewrite it, and `crate::regalloc`/`crate::emit` for what consumes it.

pub mod function;
pub mod instruction;
pub mod module;
pub mod types;
pub mod value;

pub use function::{BasicBlock, Function, InstId, Param};
pub use instruction::{BinOp, Inst};
pub use module::Module;
pub use types::{ICmpPredicate, IrType};
pub use value::{ArgId, BlockId, Value};

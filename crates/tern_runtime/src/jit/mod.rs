//! Bytecode to IR compilation.

mod backend;
mod builder;
mod compiler;
pub mod ir;
mod method_builder;
mod stack_state;

pub use backend::{CodeGenerator, NativeCode, ThreadedBackend, ThreadedCode, verify};
pub use builder::IrBuilder;
pub use compiler::Compiler;
pub use ir::{BinaryOp, BlockId, Condition, Inst, IrRegion, Reg, Terminator, Var};
pub use method_builder::{INLINE_SLOT_BUDGET, MAX_INTERPRETER_ARGS, MAX_NATIVE_ARGS};

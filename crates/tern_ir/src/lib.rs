//! Bytecode representation for the Tern VM.
//!
//! Instruction words, function definitions, and the immutable module that
//! the interpreter and JIT share.
mod function;
mod instruction;
mod module;

pub use function::*;
pub use instruction::*;
pub use module::*;

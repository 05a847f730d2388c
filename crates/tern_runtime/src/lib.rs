//! Tern virtual machine: a stack bytecode interpreter with a per-function
//! compiler that lowers bytecode to IR and runs it through a pluggable
//! code generator.

#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::len_without_is_empty)]

pub mod config;
pub mod errors;
pub mod jit;
pub mod output;
pub mod primitives;
pub mod vm;

pub use config::{Config, ParamPassing};
pub use errors::{CodegenError, CompileError, Result, RuntimeError};
pub use output::{BufferOutput, Output, StdoutOutput};
pub use primitives::{PrimitiveFn, PrimitiveProvider, PrimitiveRegistry, StdPrimitiveProvider};
pub use vm::{CompiledFunction, ExecutionContext, VirtualMachine};

pub use tern_core::Value;
pub use tern_ir::{FunctionDef, Instruction, Module, ModuleBuilder, OpCode};

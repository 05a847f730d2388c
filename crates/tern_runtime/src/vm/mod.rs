mod compiled;
mod context;
mod machine;
pub mod stack;

pub use compiled::{CompiledFunction, CompiledFunctionTable};
pub use context::{ExecutionContext, MAX_THUNK_ARITY};
pub use machine::VirtualMachine;

//! Error types for execution and compilation.
//!
//! Only [`RuntimeError`] reaches callers of the VM. [`CompileError`] is
//! always absorbed by `VirtualMachine::generate_code`, which logs it and
//! leaves the function interpreted.

/// Result alias for interpreter and compiled-code execution.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors reported to the invoker of a function.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// Caller-supplied argument count differs from the declared parameter count.
    #[error("bad function call: {function} - got {actual} arguments, expected {expected}")]
    ArityMismatch {
        function: String,
        expected: usize,
        actual: usize,
    },

    /// A dispatch thunk was asked to call a compiled entry with an arity it
    /// has no handler for.
    #[error("unsupported arity {arity} when calling compiled `{function}` (supported: 0..={max})")]
    UnsupportedArity {
        function: String,
        arity: usize,
        max: usize,
    },

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("function index {0} out of range")]
    FunctionIndexOutOfRange(usize),

    #[error("unknown primitive `{0}`")]
    UnknownPrimitive(String),

    #[error("primitive index {0} out of range")]
    PrimitiveIndexOutOfRange(usize),

    #[error("string index {0} out of range")]
    StringIndexOutOfRange(usize),

    #[error("division by zero")]
    DivisionByZero,

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Unrecognized opcode or a jump leaving the function body.
    #[error("illegal instruction in `{function}` at {index}")]
    IllegalInstruction { function: String, index: usize },
}

/// Reasons a single function could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("JIT is disabled")]
    JitDisabled,

    #[error("function index {0} out of range")]
    FunctionIndexOutOfRange(usize),

    #[error("empty function body for `{function}`")]
    EmptyBody { function: String },

    #[error("cannot handle unknown bytecode {opcode:#04x} in `{function}` at {index}")]
    UnknownOpcode {
        function: String,
        index: usize,
        opcode: u8,
    },

    #[error("jump in `{function}` at {index} leaves the function body (target {target})")]
    InvalidJumpTarget {
        function: String,
        index: usize,
        target: isize,
    },

    #[error("slot {slot} in `{function}` at {index} is outside the frame")]
    SlotOutOfRange {
        function: String,
        index: usize,
        slot: isize,
    },

    /// A call site needs more marshaled arguments than its dispatch path supports.
    #[error("call from `{function}` to `{callee}` passes {arity} arguments, limit is {limit}")]
    UnsupportedArity {
        function: String,
        callee: String,
        arity: usize,
        limit: usize,
    },

    #[error("`{function}` needs {needed} variable slots, budget is {budget}")]
    SlotBudgetExceeded {
        function: String,
        needed: usize,
        budget: usize,
    },

    #[error("code generation failed: {0}")]
    Codegen(#[from] CodegenError),
}

/// Rejection of an IR region by a code generator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodegenError {
    #[error("block {block} has no terminator")]
    UnterminatedBlock { block: usize },

    #[error("block {block} branches to missing block {target}")]
    MissingBlock { block: usize, target: usize },

    #[error("register r{reg} out of range in block {block}")]
    RegisterOutOfRange { block: usize, reg: u32 },

    #[error("variable v{var} out of range in block {block}")]
    VariableOutOfRange { block: usize, var: u32 },

    #[error("parameter {index} out of range in block {block}")]
    ParameterOutOfRange { block: usize, index: u32 },
}

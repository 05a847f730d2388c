//! Per-invocation execution state and the bytecode interpreter.

use tern_core::Value;
use tern_ir::{FunctionDef, OpCode};

use crate::config::ParamPassing;
use crate::errors::{Result, RuntimeError};
use crate::jit::Condition;
use crate::vm::compiled::CompiledFunction;
use crate::vm::stack::OperandStack;
use crate::vm::VirtualMachine;

/// Largest arity the compiled-entry thunks handle under register passing.
pub const MAX_THUNK_ARITY: usize = 3;

pub(crate) fn check_arity(function: &FunctionDef, actual: usize) -> Result<()> {
    let expected = function.nparams as usize;
    if actual != expected {
        return Err(RuntimeError::ArityMismatch {
            function: function.name.clone(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// State for one top-level invocation: the operand stack plus the index of
/// the bytecode the innermost interpreted frame is executing.
pub struct ExecutionContext<'vm> {
    vm: &'vm VirtualMachine,
    stack: OperandStack,
    program_counter: usize,
}

impl<'vm> ExecutionContext<'vm> {
    pub fn new(vm: &'vm VirtualMachine) -> Self {
        Self {
            vm,
            stack: OperandStack::with_capacity(vm.config().stack_capacity),
            program_counter: 0,
        }
    }

    #[inline]
    pub fn vm(&self) -> &'vm VirtualMachine {
        self.vm
    }

    #[inline]
    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    pub fn pop(&mut self) -> Value {
        self.stack.pop()
    }

    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut OperandStack {
        &mut self.stack
    }

    pub fn program_counter(&self) -> usize {
        self.program_counter
    }

    /// Run a function from the outside: check arity, push the arguments and
    /// dispatch.
    pub fn run(&mut self, index: usize, args: &[Value]) -> Result<Value> {
        let function = self.vm.function(index)?;
        check_arity(function, args.len())?;
        for &arg in args {
            self.push(arg);
        }
        self.call_function(index)
    }

    /// Call a function whose arguments are already on the stack. Uses the
    /// compiled entry when one is installed.
    pub fn call_function(&mut self, index: usize) -> Result<Value> {
        match self.vm.compiled(index) {
            Some(entry) => self.call_compiled(index, entry),
            None => self.interpret(index),
        }
    }

    fn call_compiled(&mut self, index: usize, entry: &'vm CompiledFunction) -> Result<Value> {
        match entry.convention() {
            ParamPassing::Stack => entry.invoke(self, &[]),
            ParamPassing::Register => match entry.nparams() {
                0 => entry.invoke(self, &[]),
                1 => {
                    let p1 = self.pop();
                    entry.invoke(self, &[p1])
                }
                2 => {
                    let p2 = self.pop();
                    let p1 = self.pop();
                    entry.invoke(self, &[p1, p2])
                }
                3 => {
                    let p3 = self.pop();
                    let p2 = self.pop();
                    let p1 = self.pop();
                    entry.invoke(self, &[p1, p2, p3])
                }
                arity => Err(RuntimeError::UnsupportedArity {
                    function: self.vm.function(index)?.name.clone(),
                    arity,
                    max: MAX_THUNK_ARITY,
                }),
            },
        }
    }

    /// Entry point for compiled code calling back into the VM: push the
    /// marshaled arguments (if any) and dispatch.
    pub fn interpret_with_args(&mut self, index: usize, args: &[Value]) -> Result<Value> {
        for &arg in args {
            self.push(arg);
        }
        self.call_function(index)
    }

    /// Direct call from compiled code. A callee whose entry is not published
    /// yet is dispatched as if called from the interpreter.
    pub fn call_native(&mut self, index: usize, args: &[Value]) -> Result<Value> {
        match self.vm.compiled(index) {
            Some(entry) => entry.invoke(self, args),
            None => self.interpret_with_args(index, args),
        }
    }

    /// Interpret a function. Its arguments occupy the top `nparams` slots.
    pub fn interpret(&mut self, index: usize) -> Result<Value> {
        let vm = self.vm;
        let function = vm.function(index)?;
        let nparams = function.nparams as usize;
        debug_assert!(self.stack.top() >= nparams, "missing arguments");
        let arg_base = self.stack.top() - nparams;
        let locals_base = arg_base + nparams;
        let nlocals = function.nlocals as usize;
        self.stack.reserve(nlocals, vm.config().zero_locals);

        let code = &function.instructions;
        let mut ip: usize = 0;
        loop {
            self.program_counter = ip;
            let Some(insn) = code.get(ip).copied() else {
                return Err(illegal(function, ip));
            };
            let Some(op) = insn.opcode() else {
                return Err(illegal(function, ip));
            };
            let imm = insn.immediate();
            match op {
                OpCode::EndSection | OpCode::FunctionReturn => {
                    let result = self.pop();
                    self.stack.set_top(arg_base);
                    return Ok(result);
                }
                OpCode::IntPushConstant => self.push(Value::from_i64(imm as i64)),
                OpCode::StrPushConstant => self.push(Value::str(imm as u32)),
                OpCode::Drop => {
                    self.pop();
                }
                OpCode::Duplicate => {
                    let top = self.stack.peek();
                    self.push(top);
                }
                OpCode::IntAdd => self.binary(|a, b| Ok(a.wrapping_add(b)))?,
                OpCode::IntSub => self.binary(|a, b| Ok(a.wrapping_sub(b)))?,
                OpCode::IntMul => self.binary(|a, b| Ok(a.wrapping_mul(b)))?,
                OpCode::IntDiv => self.binary(|a, b| {
                    if b == 0 {
                        Err(RuntimeError::DivisionByZero)
                    } else {
                        Ok(a.wrapping_div(b))
                    }
                })?,
                OpCode::IntNot => {
                    let v = self.pop();
                    self.push(Value::from_bool(v.as_i64() == 0));
                }
                OpCode::Jmp => ip = ip.wrapping_add_signed(imm as isize),
                OpCode::IntJmpEq
                | OpCode::IntJmpNeq
                | OpCode::IntJmpGt
                | OpCode::IntJmpGe
                | OpCode::IntJmpLt
                | OpCode::IntJmpLe => {
                    let rhs = self.pop().as_i64();
                    let lhs = self.pop().as_i64();
                    if Condition::from_opcode(op).is_some_and(|c| c.holds(lhs, rhs)) {
                        ip = ip.wrapping_add_signed(imm as isize);
                    }
                }
                OpCode::PushFromParam => {
                    let at = slot(arg_base, imm, nparams).ok_or_else(|| illegal(function, ip))?;
                    let v = self.stack.get(at);
                    self.push(v);
                }
                OpCode::PopIntoParam => {
                    let at = slot(arg_base, imm, nparams).ok_or_else(|| illegal(function, ip))?;
                    let v = self.pop();
                    self.stack.set(at, v);
                }
                OpCode::PushFromLocal => {
                    let at = slot(locals_base, imm, nlocals).ok_or_else(|| illegal(function, ip))?;
                    let v = self.stack.get(at);
                    self.push(v);
                }
                OpCode::PopIntoLocal => {
                    let at = slot(locals_base, imm, nlocals).ok_or_else(|| illegal(function, ip))?;
                    let v = self.pop();
                    self.stack.set(at, v);
                }
                OpCode::FunctionCall => {
                    let result = self.call_function(callee_index(imm)?)?;
                    self.push(result);
                }
                OpCode::PrimitiveCall => {
                    let primitive = vm.primitive(imm as u32 as usize)?;
                    primitive(self)?;
                }
            }
            ip = ip.wrapping_add(1);
        }
    }

    #[inline(always)]
    fn binary(&mut self, f: impl FnOnce(i64, i64) -> Result<i64>) -> Result<()> {
        let rhs = self.pop().as_i64();
        let lhs = self.pop().as_i64();
        self.push(Value::from_i64(f(lhs, rhs)?));
        Ok(())
    }
}

/// Absolute stack index of frame slot `offset`, if it lies in `0..len`.
#[inline(always)]
fn slot(base: usize, offset: i32, len: usize) -> Option<usize> {
    usize::try_from(offset)
        .ok()
        .filter(|&o| o < len)
        .map(|o| base + o)
}

fn callee_index(imm: i32) -> Result<usize> {
    usize::try_from(imm).map_err(|_| RuntimeError::FunctionIndexOutOfRange(imm as u32 as usize))
}

fn illegal(function: &FunctionDef, index: usize) -> RuntimeError {
    RuntimeError::IllegalInstruction {
        function: function.name.clone(),
        index,
    }
}

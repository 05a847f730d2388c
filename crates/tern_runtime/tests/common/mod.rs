#![allow(dead_code)]

use std::sync::Arc;

use tern_runtime::{
    BufferOutput, Config, FunctionDef, Instruction, Module, ModuleBuilder, OpCode, ParamPassing,
    Value, VirtualMachine,
};

pub fn int(k: i32) -> Instruction {
    Instruction::new(OpCode::IntPushConstant, k)
}

pub fn string(index: u32) -> Instruction {
    Instruction::new(OpCode::StrPushConstant, index as i32)
}

pub fn param(i: i32) -> Instruction {
    Instruction::new(OpCode::PushFromParam, i)
}

pub fn store_param(i: i32) -> Instruction {
    Instruction::new(OpCode::PopIntoParam, i)
}

pub fn local(i: i32) -> Instruction {
    Instruction::new(OpCode::PushFromLocal, i)
}

pub fn store_local(i: i32) -> Instruction {
    Instruction::new(OpCode::PopIntoLocal, i)
}

pub fn call(function: usize) -> Instruction {
    Instruction::new(OpCode::FunctionCall, function as i32)
}

pub fn prim(primitive: u32) -> Instruction {
    Instruction::new(OpCode::PrimitiveCall, primitive as i32)
}

pub fn jump(op: OpCode, delta: i32) -> Instruction {
    Instruction::new(op, delta)
}

pub fn op(op: OpCode) -> Instruction {
    Instruction::op(op)
}

pub fn ret() -> Instruction {
    Instruction::op(OpCode::FunctionReturn)
}

/// `inc(x) = x + 1`, plus `forty_two() = inc(41)`.
pub fn inc_module() -> Module {
    let mut mb = ModuleBuilder::new();
    mb.function(FunctionDef::new(
        "inc",
        1,
        0,
        [param(0), int(1), op(OpCode::IntAdd), ret()],
    ))
    .unwrap();
    mb.function(FunctionDef::new("forty_two", 0, 0, [int(41), call(0), ret()]))
        .unwrap();
    mb.build()
}

/// `g() = if 10 < 20 { 1 } else { 0 }` written with a forward jump.
pub fn g_module() -> Module {
    let mut mb = ModuleBuilder::new();
    mb.function(FunctionDef::new(
        "g",
        0,
        0,
        [
            int(10),
            int(20),
            jump(OpCode::IntJmpLt, 2),
            int(0),
            ret(),
            int(1),
            ret(),
        ],
    ))
    .unwrap();
    mb.build()
}

/// Naive doubly recursive Fibonacci as function 0.
pub fn fib_def() -> FunctionDef {
    FunctionDef::new(
        "fib",
        1,
        0,
        [
            param(0),
            int(2),
            jump(OpCode::IntJmpGe, 2),
            param(0),
            ret(),
            param(0),
            int(1),
            op(OpCode::IntSub),
            call(0),
            param(0),
            int(2),
            op(OpCode::IntSub),
            call(0),
            op(OpCode::IntAdd),
            ret(),
        ],
    )
}

/// `sum_to(n)` accumulates n + (n-1) + ... + 1 in a local with a backward jump.
pub fn sum_to_def() -> FunctionDef {
    FunctionDef::new(
        "sum_to",
        1,
        1,
        [
            int(0),
            store_local(0),
            param(0),
            int(0),
            jump(OpCode::IntJmpLe, 9),
            local(0),
            param(0),
            op(OpCode::IntAdd),
            store_local(0),
            param(0),
            int(1),
            op(OpCode::IntSub),
            store_param(0),
            jump(OpCode::Jmp, -12),
            local(0),
            ret(),
        ],
    )
}

/// A three-parameter function and a caller, for marshaling tests.
pub fn weighted_def() -> FunctionDef {
    // weighted(a, b, c) = a * 100 + b * 10 + c
    FunctionDef::new(
        "weighted",
        3,
        0,
        [
            param(0),
            int(100),
            op(OpCode::IntMul),
            param(1),
            int(10),
            op(OpCode::IntMul),
            op(OpCode::IntAdd),
            param(2),
            op(OpCode::IntAdd),
            ret(),
        ],
    )
}

/// Library used by most end-to-end tests. Function indices:
/// 0 fib, 1 sum_to, 2 weighted, 3 call_weighted, 4 inc, 5 twice_inc,
/// 6 abs_diff, 7 max3, 8 square_not.
pub fn library() -> Module {
    let mut mb = ModuleBuilder::new();
    mb.function(fib_def()).unwrap();
    mb.function(sum_to_def()).unwrap();
    mb.function(weighted_def()).unwrap();
    mb.function(FunctionDef::new(
        "call_weighted",
        1,
        0,
        [param(0), int(2), int(3), call(2), int(1), op(OpCode::IntAdd), ret()],
    ))
    .unwrap();
    mb.function(FunctionDef::new(
        "inc",
        1,
        0,
        [param(0), int(1), op(OpCode::IntAdd), ret()],
    ))
    .unwrap();
    mb.function(FunctionDef::new(
        "twice_inc",
        1,
        0,
        [param(0), call(4), call(4), ret()],
    ))
    .unwrap();
    // abs_diff(a, b): leaves a value on the stack across a branch merge.
    mb.function(FunctionDef::new(
        "abs_diff",
        2,
        0,
        [
            int(1000),
            param(0),
            param(1),
            jump(OpCode::IntJmpLt, 4),
            param(0),
            param(1),
            op(OpCode::IntSub),
            jump(OpCode::Jmp, 3),
            param(1),
            param(0),
            op(OpCode::IntSub),
            op(OpCode::IntAdd),
            ret(),
        ],
    ))
    .unwrap();
    // max3(a, b, c) with a local holding the running maximum.
    mb.function(FunctionDef::new(
        "max3",
        3,
        1,
        [
            param(0),
            store_local(0),
            param(1),
            local(0),
            jump(OpCode::IntJmpLe, 2),
            param(1),
            store_local(0),
            param(2),
            local(0),
            jump(OpCode::IntJmpLe, 2),
            param(2),
            store_local(0),
            local(0),
            ret(),
        ],
    ))
    .unwrap();
    // square_not(x) = x * x + !x, through duplicate and int_not.
    mb.function(FunctionDef::new(
        "square_not",
        1,
        0,
        [
            param(0),
            op(OpCode::Duplicate),
            op(OpCode::IntMul),
            param(0),
            op(OpCode::IntNot),
            op(OpCode::IntAdd),
            ret(),
        ],
    ))
    .unwrap();
    mb.build()
}

/// Control-flow edge cases. Function indices: 0 count_down, 1 rsum.
///
/// `count_down(n)` keeps its running total on the operand stack across a
/// backward jump and prints each `n` inside the loop body. `rsum(n)` keeps
/// `n` pending across its recursive call.
pub fn edge_module() -> Module {
    let mut mb = ModuleBuilder::new();
    let print_number = mb.primitive("print_number");
    mb.function(FunctionDef::new(
        "count_down",
        1,
        0,
        [
            int(0),
            param(0),
            int(0),
            jump(OpCode::IntJmpLe, 10),
            param(0),
            op(OpCode::IntAdd),
            param(0),
            prim(print_number),
            op(OpCode::Drop),
            param(0),
            int(1),
            op(OpCode::IntSub),
            store_param(0),
            jump(OpCode::Jmp, -13),
            ret(),
        ],
    ))
    .unwrap();
    mb.function(FunctionDef::new(
        "rsum",
        1,
        0,
        [
            param(0),
            int(0),
            jump(OpCode::IntJmpGt, 2),
            int(0),
            ret(),
            param(0),
            param(0),
            int(1),
            op(OpCode::IntSub),
            call(1),
            op(OpCode::IntAdd),
            ret(),
        ],
    ))
    .unwrap();
    mb.build()
}

pub fn config(pass_param: ParamPassing, lazy: bool, inline_depth: u32) -> Config {
    Config {
        pass_param,
        lazy_vm_state: lazy,
        max_inline_depth: inline_depth,
        ..Config::default()
    }
}

/// Every combination of passing convention and stack tracking.
pub fn jit_configs() -> Vec<Config> {
    let mut out = Vec::new();
    for pass_param in [ParamPassing::Stack, ParamPassing::Register] {
        for lazy in [false, true] {
            out.push(config(pass_param, lazy, 0));
        }
    }
    out.push(config(ParamPassing::Register, false, 3));
    out.push(config(ParamPassing::Register, true, 3));
    out
}

pub fn vm(config: Config, module: Module) -> VirtualMachine {
    VirtualMachine::new(config, Arc::new(module)).unwrap()
}

pub fn vm_with_output(config: Config, module: Module) -> (VirtualMachine, Arc<BufferOutput>) {
    let mut machine = vm(config, module);
    let out = Arc::new(BufferOutput::new());
    machine.set_output(Box::new(out.clone()));
    (machine, out)
}

pub fn run_int(vm: &VirtualMachine, name: &str, args: &[i64]) -> i64 {
    let args: Vec<Value> = args.iter().map(|&a| Value::from_i64(a)).collect();
    vm.run(name, &args).unwrap().as_i64()
}

pub fn fib(n: i64) -> i64 {
    if n < 2 { n } else { fib(n - 1) + fib(n - 2) }
}

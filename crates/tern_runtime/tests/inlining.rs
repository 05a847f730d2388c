mod common;

use common::*;
use tern_runtime::jit::{Compiler, INLINE_SLOT_BUDGET, Inst, IrRegion};
use tern_runtime::{Config, FunctionDef, ModuleBuilder, OpCode, ParamPassing};

const FIB: usize = 0;
const INC: usize = 4;
const TWICE_INC: usize = 5;

fn count_calls(region: &IrRegion) -> (usize, usize) {
    let mut native = 0;
    let mut interp = 0;
    for block in &region.blocks {
        for inst in &block.insts {
            match inst {
                Inst::CallNative { .. } => native += 1,
                Inst::CallInterpreter { .. } => interp += 1,
                _ => {}
            }
        }
    }
    (native, interp)
}

#[test]
fn recursive_function_agrees_across_inline_depths() {
    let want = fib(15);
    let mut results = Vec::new();
    for lazy in [false, true] {
        for depth in [0, 3] {
            let vm = vm(config(ParamPassing::Register, lazy, depth), library());
            assert!(vm.generate_code(FIB).is_some());
            results.push(run_int(&vm, "fib", &[15]));
        }
        let no_direct = Config {
            direct_call: false,
            ..config(ParamPassing::Register, lazy, 3)
        };
        let vm = vm(no_direct, library());
        assert!(vm.generate_code(FIB).is_some());
        results.push(run_int(&vm, "fib", &[15]));
    }
    assert!(results.iter().all(|&r| r == want), "{results:?}");
}

#[test]
fn inlining_removes_calls_to_compiled_callees() {
    let vm = vm(config(ParamPassing::Register, true, 1), library());
    assert!(vm.generate_code(INC).is_some());
    let region = Compiler::new(&vm).build_ir(TWICE_INC).unwrap();
    assert_eq!(count_calls(&region), (0, 0));
    assert!(vm.generate_code(TWICE_INC).is_some());
    assert_eq!(run_int(&vm, "twice_inc", &[40]), 42);
}

#[test]
fn depth_zero_emits_direct_calls() {
    let vm = vm(config(ParamPassing::Register, true, 0), library());
    assert!(vm.generate_code(INC).is_some());
    let region = Compiler::new(&vm).build_ir(TWICE_INC).unwrap();
    assert_eq!(count_calls(&region), (2, 0));
}

#[test]
fn uncompiled_callee_is_dispatched_through_the_interpreter() {
    let vm = vm(config(ParamPassing::Register, false, 3), library());
    let region = Compiler::new(&vm).build_ir(TWICE_INC).unwrap();
    assert_eq!(count_calls(&region), (0, 2));
}

#[test]
fn direct_call_off_routes_everything_through_the_interpreter() {
    let cfg = Config {
        direct_call: false,
        ..config(ParamPassing::Register, true, 3)
    };
    let vm = vm(cfg, library());
    assert!(vm.generate_code(INC).is_some());
    let region = Compiler::new(&vm).build_ir(TWICE_INC).unwrap();
    assert_eq!(count_calls(&region), (0, 2));
    assert!(vm.generate_code(TWICE_INC).is_some());
    assert_eq!(run_int(&vm, "twice_inc", &[0]), 2);
}

#[test]
fn stack_passing_never_inlines() {
    let vm = vm(config(ParamPassing::Stack, true, 3), library());
    assert!(vm.generate_code(INC).is_some());
    let region = Compiler::new(&vm).build_ir(TWICE_INC).unwrap();
    assert_eq!(count_calls(&region), (2, 0));
}

#[test]
fn recursion_inlines_exactly_max_depth_levels() {
    // Each inlined copy of fib contains two call sites; depth 2 leaves
    // 2^3 = 8 calls at the innermost level.
    let vm = vm(config(ParamPassing::Register, false, 2), library());
    let region = Compiler::new(&vm).build_ir(FIB).unwrap();
    assert_eq!(count_calls(&region), (8, 0));
}

#[test]
fn slot_budget_overflow_falls_back_to_a_direct_call() {
    let half = (INLINE_SLOT_BUDGET / 2) as u32 + 1;
    let mut mb = ModuleBuilder::new();
    mb.function(FunctionDef::new(
        "callee",
        1,
        half,
        [param(0), store_local(0), local(0), int(1), op(OpCode::IntAdd), ret()],
    ))
    .unwrap();
    mb.function(FunctionDef::new(
        "caller",
        1,
        half,
        [param(0), call(0), int(2), op(OpCode::IntMul), ret()],
    ))
    .unwrap();
    let vm = vm(config(ParamPassing::Register, true, 3), mb.build());
    assert!(vm.generate_code(0).is_some());
    let region = Compiler::new(&vm).build_ir(1).unwrap();
    assert_eq!(count_calls(&region), (1, 0));
    assert!(vm.generate_code(1).is_some());
    assert_eq!(run_int(&vm, "caller", &[4]), 10);
}

#[test]
fn inlined_callee_with_locals_and_branches() {
    // Inline max3 (which has a local and two merges) into a caller that
    // keeps a value pending across the call.
    let mut mb = ModuleBuilder::new();
    let lib = library();
    for def in lib.functions() {
        mb.function(def.clone()).unwrap();
    }
    let caller = mb
        .function(FunctionDef::new(
            "offset_max",
            1,
            0,
            [
                int(1000),
                param(0),
                int(3),
                int(-2),
                call(7),
                op(OpCode::IntAdd),
                ret(),
            ],
        ))
        .unwrap();
    let module = mb.build();
    for lazy in [false, true] {
        let vm = vm(config(ParamPassing::Register, lazy, 2), module.clone());
        assert!(vm.generate_code(7).is_some());
        let region = Compiler::new(&vm).build_ir(caller).unwrap();
        assert_eq!(count_calls(&region), (0, 0));
        assert!(vm.generate_code(caller).is_some());
        assert_eq!(run_int(&vm, "offset_max", &[9]), 1009);
        assert_eq!(run_int(&vm, "offset_max", &[-9]), 1003);
    }
}

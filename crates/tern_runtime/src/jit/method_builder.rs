//! Lowering of one function's bytecode (plus any inlined callees) into an
//! [`IrRegion`].
//!
//! Every bytecode index owns a block, and so does the position of the end
//! sentinel. Blocks are lowered from a worklist: a block becomes ready once
//! some predecessor has handed it an entry stack state. Conditional branches
//! go through one edge block per successor so each edge can reconcile its
//! own stack state.

use smallvec::SmallVec;
use tern_core::Value;
use tern_ir::{FunctionDef, OpCode};
use tracing::{debug, trace};

use crate::config::{Config, ParamPassing};
use crate::errors::CompileError;
use crate::jit::builder::IrBuilder;
use crate::jit::ir::{BinaryOp, BlockId, Condition, IrRegion, Reg, Var};
use crate::jit::stack_state::StackStrategy;
use crate::vm::VirtualMachine;

/// Variable slots available to a root frame and all frames inlined into it.
pub const INLINE_SLOT_BUDGET: usize = 32;
/// Marshaled arguments on an interpreter dispatch under register passing.
pub const MAX_INTERPRETER_ARGS: usize = 3;
/// Marshaled arguments on a direct call to a compiled entry.
pub const MAX_NATIVE_ARGS: usize = 8;

type CompileResult<T> = std::result::Result<T, CompileError>;

/// A function body being lowered: the root, or a callee inlined at `skew`.
struct Frame<'vm> {
    index: usize,
    function: &'vm FunctionDef,
    skew: usize,
    remaining_depth: u32,
    blocks: Vec<BlockId>,
    inline: Option<InlineReturn>,
}

#[derive(Clone, Copy)]
struct InlineReturn {
    continuation: BlockId,
    stack_base: Var,
}

pub(crate) struct MethodBuilder<'vm, S: StackStrategy> {
    vm: &'vm VirtualMachine,
    config: &'vm Config,
    root: usize,
    b: IrBuilder,
    entry_states: Vec<Option<S>>,
    lowered: Vec<bool>,
    /// First of the `INLINE_SLOT_BUDGET` slot variables (register passing).
    slots: Var,
    /// Stack index of the root frame's first argument.
    frame_base: Var,
}

impl<'vm, S: StackStrategy> MethodBuilder<'vm, S> {
    pub fn new(vm: &'vm VirtualMachine, root: usize) -> CompileResult<Self> {
        let function = vm
            .function(root)
            .map_err(|_| CompileError::FunctionIndexOutOfRange(root))?;
        let config = vm.config();
        let register = config.pass_param == ParamPassing::Register;
        let nparams = if register { function.nparams } else { 0 };
        let mut b = IrBuilder::new(&function.name, root, config.pass_param, nparams);
        let slots = b.reserve_vars(if register { INLINE_SLOT_BUDGET as u32 } else { 0 });
        let frame_base = b.var();
        Ok(Self {
            vm,
            config,
            root,
            b,
            // The entry block holds the prologue and is never on a worklist.
            entry_states: vec![None],
            lowered: vec![true],
            slots,
            frame_base,
        })
    }

    pub fn build(mut self) -> CompileResult<IrRegion> {
        let vm = self.vm;
        let function = vm
            .function(self.root)
            .map_err(|_| CompileError::FunctionIndexOutOfRange(self.root))?;
        if function.body().is_empty() {
            return Err(CompileError::EmptyBody {
                function: function.name.clone(),
            });
        }
        if self.register() && function.frame_slots() > INLINE_SLOT_BUDGET {
            return Err(CompileError::SlotBudgetExceeded {
                function: function.name.clone(),
                needed: function.frame_slots(),
                budget: INLINE_SLOT_BUDGET,
            });
        }

        let state = self.prologue(function);
        let root = Frame {
            index: self.root,
            function,
            skew: 0,
            remaining_depth: self.config.max_inline_depth,
            blocks: self.create_blocks(function),
            inline: None,
        };
        self.transfer(&state, root.blocks[0]);
        self.lower_frame(&root)?;
        self.seal_unreached();

        let region = self.b.finish();
        debug!(
            function = %region.name,
            blocks = region.blocks.len(),
            insts = region.inst_count(),
            "built IR region"
        );
        Ok(region)
    }

    #[inline]
    fn register(&self) -> bool {
        self.config.pass_param == ParamPassing::Register
    }

    fn slot_var(&self, skew: usize, slot: usize) -> Var {
        Var(self.slots.0 + (skew + slot) as u32)
    }

    fn new_block(&mut self) -> BlockId {
        let id = self.b.new_block();
        self.entry_states.push(None);
        self.lowered.push(false);
        id
    }

    /// One block per bytecode plus one for the end sentinel.
    fn create_blocks(&mut self, function: &FunctionDef) -> Vec<BlockId> {
        (0..=function.body().len()).map(|_| self.new_block()).collect()
    }

    fn prologue(&mut self, function: &FunctionDef) -> S {
        let nparams = function.nparams as usize;
        let nlocals = function.nlocals as usize;
        let top = self.b.stack_top();
        if self.register() {
            self.b.store_var(self.frame_base, top);
            for i in 0..nparams {
                let p = self.b.param(i as u32);
                let var = self.slot_var(0, i);
                self.b.store_var(var, p);
            }
            if nlocals > 0 {
                let zero = self.b.constant(Value::ZERO);
                for l in 0..nlocals {
                    let var = self.slot_var(0, nparams + l);
                    self.b.store_var(var, zero);
                }
            }
        } else {
            let base = self.b.offset(top, -(nparams as i32));
            self.b.store_var(self.frame_base, base);
            if nlocals > 0 {
                let zero = self.b.constant(Value::ZERO);
                for l in 0..nlocals {
                    let addr = self.b.offset(top, l as i32);
                    self.b.store_stack(addr, zero);
                }
                let new_top = self.b.offset(top, nlocals as i32);
                self.b.set_stack_top(new_top);
            }
        }
        S::empty()
    }

    /// End the current block with a jump to `target`, merging `state` into
    /// the target's entry state.
    fn transfer(&mut self, state: &S, target: BlockId) {
        match self.entry_states[target.index()].clone() {
            None => {
                let merged = state.merge_copy(&mut self.b);
                self.entry_states[target.index()] = Some(merged);
            }
            Some(existing) => state.reconcile(&mut self.b, &existing),
        }
        self.b.goto(target);
    }

    fn lower_frame(&mut self, frame: &Frame<'vm>) -> CompileResult<()> {
        while let Some(i) = self.next_ready(frame) {
            let block = frame.blocks[i];
            self.lowered[block.index()] = true;
            let Some(state) = self.entry_states[block.index()].clone() else {
                continue;
            };
            self.b.switch_to(block);
            self.lower_bytecode(frame, i, state)?;
        }
        Ok(())
    }

    fn next_ready(&self, frame: &Frame<'vm>) -> Option<usize> {
        frame.blocks.iter().position(|block| {
            !self.lowered[block.index()] && self.entry_states[block.index()].is_some()
        })
    }

    fn seal_unreached(&mut self) {
        for index in 0..self.lowered.len() {
            if !self.lowered[index] {
                self.b.switch_to(BlockId(index as u32));
                self.b.unreachable();
            }
        }
    }

    fn lower_bytecode(&mut self, frame: &Frame<'vm>, i: usize, mut state: S) -> CompileResult<()> {
        let function = frame.function;
        let body = function.body();
        if i == body.len() {
            return self.lower_return(frame, state);
        }
        let insn = body[i];
        let Some(op) = insn.opcode() else {
            return Err(CompileError::UnknownOpcode {
                function: function.name.clone(),
                index: i,
                opcode: insn.opcode_byte(),
            });
        };
        let imm = insn.immediate();
        if self.config.debug {
            trace!(function = %function.name, index = i, skew = frame.skew, instruction = %insn, "lowering");
            self.b.trace(frame.index as u32, i as u32);
        }
        let nparams = function.nparams as usize;
        let nlocals = function.nlocals as usize;
        let next = frame.blocks[i + 1];

        match op {
            OpCode::EndSection | OpCode::FunctionReturn => {
                return self.lower_return(frame, state);
            }
            OpCode::IntPushConstant => {
                let c = self.b.constant(Value::from_i64(imm as i64));
                state.push(&mut self.b, c);
            }
            OpCode::StrPushConstant => {
                let c = self.b.constant(Value::str(imm as u32));
                state.push(&mut self.b, c);
            }
            OpCode::Drop => {
                state.pop(&mut self.b);
            }
            OpCode::Duplicate => {
                let v = state.pop(&mut self.b);
                state.push(&mut self.b, v);
                state.push(&mut self.b, v);
            }
            OpCode::IntAdd => self.lower_binary(&mut state, BinaryOp::Add),
            OpCode::IntSub => self.lower_binary(&mut state, BinaryOp::Sub),
            OpCode::IntMul => self.lower_binary(&mut state, BinaryOp::Mul),
            OpCode::IntDiv => self.lower_binary(&mut state, BinaryOp::Div),
            OpCode::IntNot => {
                let v = self.pop_int(&mut state);
                let z = self.b.is_zero(v);
                let boxed = self.b.box_int(z);
                state.push(&mut self.b, boxed);
            }
            OpCode::PushFromParam => {
                let slot = self.check_slot(frame, i, imm, 0, nparams)?;
                let v = self.load_slot(frame, slot);
                state.push(&mut self.b, v);
            }
            OpCode::PopIntoParam => {
                let slot = self.check_slot(frame, i, imm, 0, nparams)?;
                let v = state.pop(&mut self.b);
                self.store_slot(frame, slot, v);
            }
            OpCode::PushFromLocal => {
                let slot = self.check_slot(frame, i, imm, nparams, nlocals)?;
                let v = self.load_slot(frame, slot);
                state.push(&mut self.b, v);
            }
            OpCode::PopIntoLocal => {
                let slot = self.check_slot(frame, i, imm, nparams, nlocals)?;
                let v = state.pop(&mut self.b);
                self.store_slot(frame, slot, v);
            }
            OpCode::Jmp => {
                let target = self.jump_target(frame, i, imm)?;
                self.transfer(&state, frame.blocks[target]);
                return Ok(());
            }
            OpCode::IntJmpEq => return self.lower_branch(frame, i, state, Condition::Eq, imm),
            OpCode::IntJmpNeq => return self.lower_branch(frame, i, state, Condition::Ne, imm),
            OpCode::IntJmpGt => return self.lower_branch(frame, i, state, Condition::Gt, imm),
            OpCode::IntJmpGe => return self.lower_branch(frame, i, state, Condition::Ge, imm),
            OpCode::IntJmpLt => return self.lower_branch(frame, i, state, Condition::Lt, imm),
            OpCode::IntJmpLe => return self.lower_branch(frame, i, state, Condition::Le, imm),
            OpCode::PrimitiveCall => {
                // The primitive works on the real stack and leaves its result there.
                state.commit(&mut self.b);
                self.b.call_primitive(imm as u32);
            }
            OpCode::FunctionCall => return self.lower_call(frame, i, state, imm),
        }
        self.transfer(&state, next);
        Ok(())
    }

    fn pop_int(&mut self, state: &mut S) -> Reg {
        let v = state.pop(&mut self.b);
        self.b.unbox(v)
    }

    fn lower_binary(&mut self, state: &mut S, op: BinaryOp) {
        let rhs = self.pop_int(state);
        let lhs = self.pop_int(state);
        let r = self.b.binary(op, lhs, rhs);
        let boxed = self.b.box_int(r);
        state.push(&mut self.b, boxed);
    }

    fn lower_branch(
        &mut self,
        frame: &Frame<'vm>,
        i: usize,
        mut state: S,
        cond: Condition,
        imm: i32,
    ) -> CompileResult<()> {
        let target = self.jump_target(frame, i, imm)?;
        let rhs = self.pop_int(&mut state);
        let lhs = self.pop_int(&mut state);
        let taken = self.new_block();
        let not_taken = self.new_block();
        self.lowered[taken.index()] = true;
        self.lowered[not_taken.index()] = true;
        self.b.branch(cond, lhs, rhs, taken, not_taken);

        self.b.switch_to(taken);
        self.transfer(&state, frame.blocks[target]);
        self.b.switch_to(not_taken);
        self.transfer(&state, frame.blocks[i + 1]);
        Ok(())
    }

    fn jump_target(&self, frame: &Frame<'vm>, i: usize, imm: i32) -> CompileResult<usize> {
        let target = i as isize + imm as isize + 1;
        let len = frame.function.body().len();
        if target < 0 || target as usize > len {
            return Err(CompileError::InvalidJumpTarget {
                function: frame.function.name.clone(),
                index: i,
                target,
            });
        }
        Ok(target as usize)
    }

    /// Validate `imm` against a run of `count` slots starting at `first` and
    /// return the frame slot.
    fn check_slot(
        &self,
        frame: &Frame<'vm>,
        i: usize,
        imm: i32,
        first: usize,
        count: usize,
    ) -> CompileResult<usize> {
        if imm < 0 || imm as usize >= count {
            return Err(CompileError::SlotOutOfRange {
                function: frame.function.name.clone(),
                index: i,
                slot: first as isize + imm as isize,
            });
        }
        Ok(first + imm as usize)
    }

    fn load_slot(&mut self, frame: &Frame<'vm>, slot: usize) -> Reg {
        if self.register() {
            let var = self.slot_var(frame.skew, slot);
            self.b.load_var(var)
        } else {
            let base = self.b.load_var(self.frame_base);
            let addr = self.b.offset(base, slot as i32);
            self.b.load_stack(addr)
        }
    }

    fn store_slot(&mut self, frame: &Frame<'vm>, slot: usize, value: Reg) {
        if self.register() {
            let var = self.slot_var(frame.skew, slot);
            self.b.store_var(var, value);
        } else {
            let base = self.b.load_var(self.frame_base);
            let addr = self.b.offset(base, slot as i32);
            self.b.store_stack(addr, value);
        }
    }

    fn lower_return(&mut self, frame: &Frame<'vm>, mut state: S) -> CompileResult<()> {
        let result = state.pop(&mut self.b);
        state.discard();
        match frame.inline {
            None => {
                let base = self.b.load_var(self.frame_base);
                self.b.set_stack_top(base);
                self.b.ret(result);
            }
            Some(ret) => {
                let base = self.b.load_var(ret.stack_base);
                self.b.set_stack_top(base);
                state.push(&mut self.b, result);
                self.transfer(&state, ret.continuation);
            }
        }
        Ok(())
    }

    fn lower_call(&mut self, frame: &Frame<'vm>, i: usize, mut state: S, imm: i32) -> CompileResult<()> {
        let vm = self.vm;
        let caller = frame.function;
        let callee_index = usize::try_from(imm)
            .map_err(|_| CompileError::FunctionIndexOutOfRange(imm as u32 as usize))?;
        let callee = vm
            .function(callee_index)
            .map_err(|_| CompileError::FunctionIndexOutOfRange(callee_index))?;
        let arity = callee.nparams as usize;
        let compiled = callee_index == self.root || vm.is_compiled(callee_index);
        let function = callee_index as u32;

        let result = if !self.config.direct_call {
            state.commit(&mut self.b);
            self.b.call_interpreter(function, SmallVec::new())
        } else if self.register() {
            if compiled && frame.remaining_depth > 0 && !callee.body().is_empty() {
                let skew = frame.skew + caller.frame_slots();
                if skew + callee.frame_slots() <= INLINE_SLOT_BUDGET {
                    return self.inline_call(frame, i, state, callee_index, callee, skew);
                }
                debug!(
                    caller = %caller.name,
                    callee = %callee.name,
                    skew,
                    "slot budget exhausted, emitting direct call"
                );
            }
            let limit = if compiled {
                MAX_NATIVE_ARGS
            } else {
                MAX_INTERPRETER_ARGS
            };
            if arity > limit {
                return Err(CompileError::UnsupportedArity {
                    function: caller.name.clone(),
                    callee: callee.name.clone(),
                    arity,
                    limit,
                });
            }
            let mut args: SmallVec<[Reg; 8]> = (0..arity).map(|_| state.pop(&mut self.b)).collect();
            args.reverse();
            if compiled {
                self.b.call_native(function, args)
            } else {
                self.b.call_interpreter(function, args.into_iter().collect())
            }
        } else {
            state.commit(&mut self.b);
            if compiled {
                self.b.call_native(function, SmallVec::new())
            } else {
                self.b.call_interpreter(function, SmallVec::new())
            }
        };
        state.push(&mut self.b, result);
        self.transfer(&state, frame.blocks[i + 1]);
        Ok(())
    }

    fn inline_call(
        &mut self,
        frame: &Frame<'vm>,
        i: usize,
        mut state: S,
        callee_index: usize,
        callee: &'vm FunctionDef,
        skew: usize,
    ) -> CompileResult<()> {
        let arity = callee.nparams as usize;
        for slot in (0..arity).rev() {
            let v = state.pop(&mut self.b);
            let var = self.slot_var(skew, slot);
            self.b.store_var(var, v);
        }
        if callee.nlocals > 0 {
            let zero = self.b.constant(Value::ZERO);
            for l in 0..callee.nlocals as usize {
                let var = self.slot_var(skew, arity + l);
                self.b.store_var(var, zero);
            }
        }
        // The callee starts from an empty simulated stack; anything the
        // caller still has pending must be in memory below its frame.
        state.commit(&mut self.b);
        let stack_base = self.b.var();
        let top = self.b.stack_top();
        self.b.store_var(stack_base, top);

        let inner = Frame {
            index: callee_index,
            function: callee,
            skew,
            remaining_depth: frame.remaining_depth - 1,
            blocks: self.create_blocks(callee),
            inline: Some(InlineReturn {
                continuation: frame.blocks[i + 1],
                stack_base,
            }),
        };
        debug!(
            caller = %frame.function.name,
            callee = %callee.name,
            skew,
            remaining_depth = inner.remaining_depth,
            "inlining call"
        );
        self.transfer(&state, inner.blocks[0]);
        self.lower_frame(&inner)
    }
}

//! Code generation seam and the default threaded-code backend.
//!
//! A [`CodeGenerator`] turns a finished [`IrRegion`] into something callable.
//! The threaded backend checks the region once and then executes it block by
//! block against the shared operand stack.

use std::sync::Arc;

use smallvec::SmallVec;
use tern_core::Value;
use tracing::trace;

use crate::errors::{CodegenError, Result, RuntimeError};
use crate::jit::ir::{Inst, IrRegion, Reg, Terminator};
use crate::vm::ExecutionContext;

pub trait NativeCode: Send + Sync {
    fn invoke(&self, cx: &mut ExecutionContext<'_>, args: &[Value]) -> Result<Value>;
}

pub trait CodeGenerator: Send + Sync {
    fn generate(&self, region: IrRegion) -> std::result::Result<Arc<dyn NativeCode>, CodegenError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadedBackend;

impl CodeGenerator for ThreadedBackend {
    fn generate(&self, region: IrRegion) -> std::result::Result<Arc<dyn NativeCode>, CodegenError> {
        verify(&region)?;
        Ok(Arc::new(ThreadedCode { region }))
    }
}

/// Structural checks every backend can rely on.
pub fn verify(region: &IrRegion) -> std::result::Result<(), CodegenError> {
    let nblocks = region.blocks.len();
    if region.entry.index() >= nblocks {
        return Err(CodegenError::MissingBlock {
            block: region.entry.index(),
            target: region.entry.index(),
        });
    }
    let check_reg = |block: usize, reg: Reg| {
        if reg.0 >= region.num_regs {
            Err(CodegenError::RegisterOutOfRange { block, reg: reg.0 })
        } else {
            Ok(())
        }
    };
    for (block, b) in region.blocks.iter().enumerate() {
        for inst in &b.insts {
            if let Some(dst) = inst.dst() {
                check_reg(block, dst)?;
            }
            for reg in inst.operands() {
                check_reg(block, reg)?;
            }
            match inst {
                Inst::LoadVar { var, .. } | Inst::StoreVar { var, .. } if var.0 >= region.num_vars => {
                    return Err(CodegenError::VariableOutOfRange { block, var: var.0 });
                }
                Inst::Param { index, .. } if *index >= region.nparams => {
                    return Err(CodegenError::ParameterOutOfRange {
                        block,
                        index: *index,
                    });
                }
                _ => {}
            }
        }
        let Some(term) = &b.terminator else {
            return Err(CodegenError::UnterminatedBlock { block });
        };
        for reg in term.operands() {
            check_reg(block, reg)?;
        }
        for target in term.successors() {
            if target.index() >= nblocks {
                return Err(CodegenError::MissingBlock {
                    block,
                    target: target.index(),
                });
            }
        }
    }
    Ok(())
}

pub struct ThreadedCode {
    region: IrRegion,
}

impl ThreadedCode {
    pub fn region(&self) -> &IrRegion {
        &self.region
    }
}

impl NativeCode for ThreadedCode {
    fn invoke(&self, cx: &mut ExecutionContext<'_>, args: &[Value]) -> Result<Value> {
        let region = &self.region;
        if args.len() != region.nparams as usize {
            return Err(RuntimeError::ArityMismatch {
                function: region.name.clone(),
                expected: region.nparams as usize,
                actual: args.len(),
            });
        }
        let mut regs = vec![0u64; region.num_regs as usize];
        let mut vars = vec![Value::UNIT.to_bits(); region.num_vars as usize];
        let mut block = region.entry;

        loop {
            let b = &region.blocks[block.index()];
            for inst in &b.insts {
                match inst {
                    Inst::Const { dst, bits } => regs[dst.0 as usize] = *bits,
                    Inst::Unbox { dst, src } => {
                        regs[dst.0 as usize] = Value::from_bits(regs[src.0 as usize]).as_i64() as u64;
                    }
                    Inst::BoxInt { dst, src } => {
                        regs[dst.0 as usize] = Value::from_i64(regs[src.0 as usize] as i64).to_bits();
                    }
                    Inst::Binary { dst, op, lhs, rhs } => {
                        let lhs = regs[lhs.0 as usize] as i64;
                        let rhs = regs[rhs.0 as usize] as i64;
                        let r = op.apply(lhs, rhs).ok_or(RuntimeError::DivisionByZero)?;
                        regs[dst.0 as usize] = r as u64;
                    }
                    Inst::IsZero { dst, src } => {
                        regs[dst.0 as usize] = (regs[src.0 as usize] as i64 == 0) as u64;
                    }
                    Inst::Param { dst, index } => {
                        regs[dst.0 as usize] = args[*index as usize].to_bits();
                    }
                    Inst::LoadVar { dst, var } => regs[dst.0 as usize] = vars[var.0 as usize],
                    Inst::StoreVar { var, src } => vars[var.0 as usize] = regs[src.0 as usize],
                    Inst::StackTop { dst } => regs[dst.0 as usize] = cx.stack().top() as u64,
                    Inst::SetStackTop { src } => {
                        cx.stack_mut().set_top(regs[src.0 as usize] as usize);
                    }
                    Inst::Offset { dst, base, delta } => {
                        regs[dst.0 as usize] = (regs[base.0 as usize] as i64).wrapping_add(*delta as i64) as u64;
                    }
                    Inst::LoadStack { dst, addr } => {
                        regs[dst.0 as usize] = cx.stack().get(regs[addr.0 as usize] as usize).to_bits();
                    }
                    Inst::StoreStack { addr, src } => {
                        let value = Value::from_bits(regs[src.0 as usize]);
                        cx.stack_mut().set(regs[addr.0 as usize] as usize, value);
                    }
                    Inst::CallInterpreter {
                        dst,
                        function,
                        args,
                    } => {
                        let values: SmallVec<[Value; 3]> =
                            args.iter().map(|r| Value::from_bits(regs[r.0 as usize])).collect();
                        let result = cx.interpret_with_args(*function as usize, &values)?;
                        regs[dst.0 as usize] = result.to_bits();
                    }
                    Inst::CallNative {
                        dst,
                        function,
                        args,
                    } => {
                        let values: SmallVec<[Value; 8]> =
                            args.iter().map(|r| Value::from_bits(regs[r.0 as usize])).collect();
                        let result = cx.call_native(*function as usize, &values)?;
                        regs[dst.0 as usize] = result.to_bits();
                    }
                    Inst::CallPrimitive { primitive } => {
                        let fun = cx.vm().primitive(*primitive as usize)?;
                        fun(cx)?;
                    }
                    Inst::Trace { function, index } => {
                        trace!(function, index, stack_top = cx.stack().top(), "executing bytecode");
                    }
                }
            }
            match &b.terminator {
                Some(Terminator::Goto(target)) => block = *target,
                Some(Terminator::Branch {
                    cond,
                    lhs,
                    rhs,
                    taken,
                    not_taken,
                }) => {
                    let lhs = regs[lhs.0 as usize] as i64;
                    let rhs = regs[rhs.0 as usize] as i64;
                    block = if cond.holds(lhs, rhs) { *taken } else { *not_taken };
                }
                Some(Terminator::Return(r)) => return Ok(Value::from_bits(regs[r.0 as usize])),
                Some(Terminator::Unreachable) | None => {
                    unreachable!("control reached {} in `{}`", block, region.name)
                }
            }
        }
    }
}

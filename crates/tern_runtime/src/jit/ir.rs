//! The intermediate representation handed to code generators.
//!
//! A region is one compiled function: a set of basic blocks, each a straight
//! list of [`Inst`] ending in one [`Terminator`]. Registers are single
//! assignment 64-bit words. Variables are mutable 64-bit cells that survive
//! across blocks. Stack slots and variables hold boxed [`Value`] bits;
//! arithmetic works on unboxed integers produced by [`Inst::Unbox`].

use std::fmt;

use smallvec::SmallVec;
use tern_core::Value;
use tern_ir::OpCode;

use crate::config::ParamPassing;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// `None` on division by zero.
    #[inline]
    pub fn apply(self, lhs: i64, rhs: i64) -> Option<i64> {
        match self {
            BinaryOp::Add => Some(lhs.wrapping_add(rhs)),
            BinaryOp::Sub => Some(lhs.wrapping_sub(rhs)),
            BinaryOp::Mul => Some(lhs.wrapping_mul(rhs)),
            BinaryOp::Div => (rhs != 0).then(|| lhs.wrapping_div(rhs)),
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
        }
    }
}

/// Signed integer comparison used by conditional branches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Condition {
    #[inline]
    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Condition::Eq => lhs == rhs,
            Condition::Ne => lhs != rhs,
            Condition::Gt => lhs > rhs,
            Condition::Ge => lhs >= rhs,
            Condition::Lt => lhs < rhs,
            Condition::Le => lhs <= rhs,
        }
    }

    pub fn from_opcode(op: OpCode) -> Option<Self> {
        match op {
            OpCode::IntJmpEq => Some(Condition::Eq),
            OpCode::IntJmpNeq => Some(Condition::Ne),
            OpCode::IntJmpGt => Some(Condition::Gt),
            OpCode::IntJmpGe => Some(Condition::Ge),
            OpCode::IntJmpLt => Some(Condition::Lt),
            OpCode::IntJmpLe => Some(Condition::Le),
            _ => None,
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            Condition::Eq => "eq",
            Condition::Ne => "ne",
            Condition::Gt => "gt",
            Condition::Ge => "ge",
            Condition::Lt => "lt",
            Condition::Le => "le",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Inst {
    Const { dst: Reg, bits: u64 },
    Unbox { dst: Reg, src: Reg },
    BoxInt { dst: Reg, src: Reg },
    Binary { dst: Reg, op: BinaryOp, lhs: Reg, rhs: Reg },
    /// 1 if the integer is zero, else 0.
    IsZero { dst: Reg, src: Reg },
    /// Incoming argument under register passing.
    Param { dst: Reg, index: u32 },
    LoadVar { dst: Reg, var: Var },
    StoreVar { var: Var, src: Reg },
    /// Current stack top index.
    StackTop { dst: Reg },
    SetStackTop { src: Reg },
    /// Stack index arithmetic.
    Offset { dst: Reg, base: Reg, delta: i32 },
    LoadStack { dst: Reg, addr: Reg },
    StoreStack { addr: Reg, src: Reg },
    /// Dispatch through the VM, pushing `args` first.
    CallInterpreter {
        dst: Reg,
        function: u32,
        args: SmallVec<[Reg; 3]>,
    },
    /// Direct call to a compiled entry, resolved when executed.
    CallNative {
        dst: Reg,
        function: u32,
        args: SmallVec<[Reg; 8]>,
    },
    /// The primitive leaves its result on the stack.
    CallPrimitive { primitive: u32 },
    /// Execution trace point for a bytecode.
    Trace { function: u32, index: u32 },
}

impl Inst {
    pub fn dst(&self) -> Option<Reg> {
        match self {
            Inst::Const { dst, .. }
            | Inst::Unbox { dst, .. }
            | Inst::BoxInt { dst, .. }
            | Inst::Binary { dst, .. }
            | Inst::IsZero { dst, .. }
            | Inst::Param { dst, .. }
            | Inst::LoadVar { dst, .. }
            | Inst::StackTop { dst }
            | Inst::Offset { dst, .. }
            | Inst::LoadStack { dst, .. }
            | Inst::CallInterpreter { dst, .. }
            | Inst::CallNative { dst, .. } => Some(*dst),
            Inst::StoreVar { .. }
            | Inst::SetStackTop { .. }
            | Inst::StoreStack { .. }
            | Inst::CallPrimitive { .. }
            | Inst::Trace { .. } => None,
        }
    }

    /// Registers read by the instruction.
    pub fn operands(&self) -> SmallVec<[Reg; 8]> {
        match self {
            Inst::Const { .. }
            | Inst::Param { .. }
            | Inst::LoadVar { .. }
            | Inst::StackTop { .. }
            | Inst::CallPrimitive { .. }
            | Inst::Trace { .. } => SmallVec::new(),
            Inst::Unbox { src, .. }
            | Inst::BoxInt { src, .. }
            | Inst::IsZero { src, .. }
            | Inst::StoreVar { src, .. }
            | Inst::SetStackTop { src } => smallvec::smallvec![*src],
            Inst::Offset { base, .. } => smallvec::smallvec![*base],
            Inst::LoadStack { addr, .. } => smallvec::smallvec![*addr],
            Inst::Binary { lhs, rhs, .. } => smallvec::smallvec![*lhs, *rhs],
            Inst::StoreStack { addr, src } => smallvec::smallvec![*addr, *src],
            Inst::CallInterpreter { args, .. } => args.iter().copied().collect(),
            Inst::CallNative { args, .. } => args.clone(),
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Const { dst, bits } => write!(f, "{dst} = const {}", Value::from_bits(*bits)),
            Inst::Unbox { dst, src } => write!(f, "{dst} = unbox {src}"),
            Inst::BoxInt { dst, src } => write!(f, "{dst} = box {src}"),
            Inst::Binary { dst, op, lhs, rhs } => {
                write!(f, "{dst} = {} {lhs}, {rhs}", op.mnemonic())
            }
            Inst::IsZero { dst, src } => write!(f, "{dst} = is_zero {src}"),
            Inst::Param { dst, index } => write!(f, "{dst} = param {index}"),
            Inst::LoadVar { dst, var } => write!(f, "{dst} = load {var}"),
            Inst::StoreVar { var, src } => write!(f, "store {var}, {src}"),
            Inst::StackTop { dst } => write!(f, "{dst} = stack_top"),
            Inst::SetStackTop { src } => write!(f, "set_stack_top {src}"),
            Inst::Offset { dst, base, delta } => write!(f, "{dst} = offset {base}, {delta}"),
            Inst::LoadStack { dst, addr } => write!(f, "{dst} = load_stack [{addr}]"),
            Inst::StoreStack { addr, src } => write!(f, "store_stack [{addr}], {src}"),
            Inst::CallInterpreter {
                dst,
                function,
                args,
            } => write!(f, "{dst} = call_interp #{function} {}", RegList(args)),
            Inst::CallNative {
                dst,
                function,
                args,
            } => write!(f, "{dst} = call_native #{function} {}", RegList(args)),
            Inst::CallPrimitive { primitive } => write!(f, "call_primitive #{primitive}"),
            Inst::Trace { function, index } => write!(f, "trace #{function}:{index}"),
        }
    }
}

struct RegList<'a>(&'a [Reg]);

impl fmt::Display for RegList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, r) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{r}")?;
        }
        f.write_str(")")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Terminator {
    Goto(BlockId),
    Branch {
        cond: Condition,
        lhs: Reg,
        rhs: Reg,
        taken: BlockId,
        not_taken: BlockId,
    },
    Return(Reg),
    /// Never reached: no path in the bytecode leads here.
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Terminator::Goto(target) => smallvec::smallvec![*target],
            Terminator::Branch {
                taken, not_taken, ..
            } => smallvec::smallvec![*taken, *not_taken],
            Terminator::Return(_) | Terminator::Unreachable => SmallVec::new(),
        }
    }

    pub fn operands(&self) -> SmallVec<[Reg; 2]> {
        match self {
            Terminator::Branch { lhs, rhs, .. } => smallvec::smallvec![*lhs, *rhs],
            Terminator::Return(r) => smallvec::smallvec![*r],
            Terminator::Goto(_) | Terminator::Unreachable => SmallVec::new(),
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Goto(target) => write!(f, "goto {target}"),
            Terminator::Branch {
                cond,
                lhs,
                rhs,
                taken,
                not_taken,
            } => write!(
                f,
                "br.{} {lhs}, {rhs} ? {taken} : {not_taken}",
                cond.mnemonic()
            ),
            Terminator::Return(r) => write!(f, "ret {r}"),
            Terminator::Unreachable => f.write_str("unreachable"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
    pub insts: Vec<Inst>,
    pub terminator: Option<Terminator>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IrRegion {
    pub name: String,
    pub function: usize,
    pub convention: ParamPassing,
    /// Incoming register parameters. Zero under stack passing.
    pub nparams: u32,
    pub num_regs: u32,
    pub num_vars: u32,
    pub blocks: Vec<Block>,
    pub entry: BlockId,
}

impl IrRegion {
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    pub fn inst_count(&self) -> usize {
        self.blocks.iter().map(|b| b.insts.len()).sum()
    }
}

impl fmt::Display for IrRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "region {} ({:?}, {} regs, {} vars) entry {}",
            self.name, self.convention, self.num_regs, self.num_vars, self.entry
        )?;
        for (i, block) in self.blocks.iter().enumerate() {
            writeln!(f, "bb{i}:")?;
            for inst in &block.insts {
                writeln!(f, "    {inst}")?;
            }
            match &block.terminator {
                Some(term) => writeln!(f, "    {term}")?,
                None => writeln!(f, "    <unterminated>")?,
            }
        }
        Ok(())
    }
}

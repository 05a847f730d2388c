//! Incremental construction of an [`IrRegion`].

use smallvec::SmallVec;
use tern_core::Value;

use crate::config::ParamPassing;
use crate::jit::ir::{BinaryOp, Block, BlockId, Condition, Inst, IrRegion, Reg, Terminator, Var};

/// Appends instructions to a current block and hands out fresh registers,
/// variables and blocks.
pub struct IrBuilder {
    region: IrRegion,
    current: BlockId,
}

impl IrBuilder {
    /// A builder with one empty entry block selected.
    pub fn new(name: &str, function: usize, convention: ParamPassing, nparams: u32) -> Self {
        let region = IrRegion {
            name: name.to_string(),
            function,
            convention,
            nparams,
            num_regs: 0,
            num_vars: 0,
            blocks: vec![Block::default()],
            entry: BlockId(0),
        };
        Self {
            region,
            current: BlockId(0),
        }
    }

    pub fn finish(self) -> IrRegion {
        self.region
    }

    pub fn region(&self) -> &IrRegion {
        &self.region
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.region.blocks.len() as u32);
        self.region.blocks.push(Block::default());
        id
    }

    pub fn block_count(&self) -> usize {
        self.region.blocks.len()
    }

    pub fn current(&self) -> BlockId {
        self.current
    }

    pub fn switch_to(&mut self, block: BlockId) {
        debug_assert!(block.index() < self.region.blocks.len());
        self.current = block;
    }

    pub fn is_terminated(&self, block: BlockId) -> bool {
        self.region
            .block(block)
            .is_some_and(|b| b.terminator.is_some())
    }

    fn terminate(&mut self, term: Terminator) {
        let block = &mut self.region.blocks[self.current.index()];
        debug_assert!(block.terminator.is_none(), "block terminated twice");
        block.terminator = Some(term);
    }

    pub fn goto(&mut self, target: BlockId) {
        self.terminate(Terminator::Goto(target));
    }

    pub fn branch(
        &mut self,
        cond: Condition,
        lhs: Reg,
        rhs: Reg,
        taken: BlockId,
        not_taken: BlockId,
    ) {
        self.terminate(Terminator::Branch {
            cond,
            lhs,
            rhs,
            taken,
            not_taken,
        });
    }

    pub fn ret(&mut self, value: Reg) {
        self.terminate(Terminator::Return(value));
    }

    pub fn unreachable(&mut self) {
        self.terminate(Terminator::Unreachable);
    }

    // =========================================================================
    // Registers and variables
    // =========================================================================

    fn reg(&mut self) -> Reg {
        let r = Reg(self.region.num_regs);
        self.region.num_regs += 1;
        r
    }

    /// A fresh variable.
    pub fn var(&mut self) -> Var {
        let v = Var(self.region.num_vars);
        self.region.num_vars += 1;
        v
    }

    /// Claim `count` variables numbered from the current watermark and
    /// return the first.
    pub fn reserve_vars(&mut self, count: u32) -> Var {
        let first = Var(self.region.num_vars);
        self.region.num_vars += count;
        first
    }

    fn emit(&mut self, inst: Inst) {
        self.region.blocks[self.current.index()].insts.push(inst);
    }

    fn emit_value(&mut self, make: impl FnOnce(Reg) -> Inst) -> Reg {
        let dst = self.reg();
        self.emit(make(dst));
        dst
    }

    // =========================================================================
    // Values
    // =========================================================================

    pub fn constant(&mut self, value: Value) -> Reg {
        let bits = value.to_bits();
        self.emit_value(|dst| Inst::Const { dst, bits })
    }

    pub fn unbox(&mut self, src: Reg) -> Reg {
        self.emit_value(|dst| Inst::Unbox { dst, src })
    }

    pub fn box_int(&mut self, src: Reg) -> Reg {
        self.emit_value(|dst| Inst::BoxInt { dst, src })
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: Reg, rhs: Reg) -> Reg {
        self.emit_value(|dst| Inst::Binary { dst, op, lhs, rhs })
    }

    pub fn is_zero(&mut self, src: Reg) -> Reg {
        self.emit_value(|dst| Inst::IsZero { dst, src })
    }

    pub fn param(&mut self, index: u32) -> Reg {
        self.emit_value(|dst| Inst::Param { dst, index })
    }

    pub fn load_var(&mut self, var: Var) -> Reg {
        self.emit_value(|dst| Inst::LoadVar { dst, var })
    }

    pub fn store_var(&mut self, var: Var, src: Reg) {
        self.emit(Inst::StoreVar { var, src });
    }

    // =========================================================================
    // Operand stack
    // =========================================================================

    pub fn stack_top(&mut self) -> Reg {
        self.emit_value(|dst| Inst::StackTop { dst })
    }

    pub fn set_stack_top(&mut self, src: Reg) {
        self.emit(Inst::SetStackTop { src });
    }

    pub fn offset(&mut self, base: Reg, delta: i32) -> Reg {
        self.emit_value(|dst| Inst::Offset { dst, base, delta })
    }

    pub fn load_stack(&mut self, addr: Reg) -> Reg {
        self.emit_value(|dst| Inst::LoadStack { dst, addr })
    }

    pub fn store_stack(&mut self, addr: Reg, src: Reg) {
        self.emit(Inst::StoreStack { addr, src });
    }

    // =========================================================================
    // Calls
    // =========================================================================

    pub fn call_interpreter(&mut self, function: u32, args: SmallVec<[Reg; 3]>) -> Reg {
        self.emit_value(|dst| Inst::CallInterpreter {
            dst,
            function,
            args,
        })
    }

    pub fn call_native(&mut self, function: u32, args: SmallVec<[Reg; 8]>) -> Reg {
        self.emit_value(|dst| Inst::CallNative {
            dst,
            function,
            args,
        })
    }

    pub fn call_primitive(&mut self, primitive: u32) {
        self.emit(Inst::CallPrimitive { primitive });
    }

    pub fn trace(&mut self, function: u32, index: u32) {
        self.emit(Inst::Trace { function, index });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_blocks_are_numbered_densely() {
        let mut b = IrBuilder::new("f", 0, ParamPassing::Stack, 0);
        let one = b.constant(Value::from_i64(1));
        let two = b.constant(Value::from_i64(2));
        assert_eq!((one, two), (Reg(0), Reg(1)));
        let next = b.new_block();
        assert_eq!(next, BlockId(1));
        b.goto(next);
        b.switch_to(next);
        b.ret(two);
        let region = b.finish();
        assert_eq!(region.num_regs, 2);
        assert_eq!(region.blocks.len(), 2);
        assert_eq!(region.blocks[0].terminator, Some(Terminator::Goto(BlockId(1))));
    }

    #[test]
    fn reserved_vars_precede_fresh_ones() {
        let mut b = IrBuilder::new("f", 0, ParamPassing::Register, 2);
        assert_eq!(b.reserve_vars(4), Var(0));
        assert_eq!(b.var(), Var(4));
        assert_eq!(b.finish().num_vars, 5);
    }

    #[test]
    fn display_lists_every_block() {
        let mut b = IrBuilder::new("inc", 3, ParamPassing::Register, 1);
        let p = b.param(0);
        let x = b.unbox(p);
        let one = b.constant(Value::from_i64(1));
        let y = b.unbox(one);
        let sum = b.binary(BinaryOp::Add, x, y);
        let boxed = b.box_int(sum);
        b.ret(boxed);
        let text = b.finish().to_string();
        assert!(text.starts_with("region inc"));
        assert!(text.contains("r4 = add r1, r3"));
        assert!(text.contains("ret r5"));
    }
}

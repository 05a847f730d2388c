//! Operand stack tracking during lowering.
//!
//! [`EagerStack`] turns every push and pop into a memory access on the shared
//! stack. [`LazyStack`] keeps pushed values as pending entries and touches
//! memory only at commit points, when it runs dry, or when control flow
//! merges states of different depth.

use crate::jit::builder::IrBuilder;
use crate::jit::ir::{Reg, Var};

pub(crate) trait StackStrategy: Clone {
    fn empty() -> Self;

    fn push(&mut self, b: &mut IrBuilder, value: Reg);

    fn pop(&mut self, b: &mut IrBuilder) -> Reg;

    /// Write pending entries to memory so the stack is observable.
    fn commit(&mut self, b: &mut IrBuilder);

    /// Forget pending entries without writing them.
    fn discard(&mut self);

    /// Copy of `self` usable as the entry state of a merge block. Emits the
    /// copies at the current position.
    fn merge_copy(&self, b: &mut IrBuilder) -> Self;

    /// Bring `self` into the shape of `target` (a state produced by
    /// `merge_copy`) at the current position.
    fn reconcile(&self, b: &mut IrBuilder, target: &Self);
}

pub(crate) fn memory_push(b: &mut IrBuilder, value: Reg) {
    let top = b.stack_top();
    b.store_stack(top, value);
    let next = b.offset(top, 1);
    b.set_stack_top(next);
}

pub(crate) fn memory_pop(b: &mut IrBuilder) -> Reg {
    let top = b.stack_top();
    let last = b.offset(top, -1);
    b.set_stack_top(last);
    b.load_stack(last)
}

/// Store `values` bottom to top above the current top and bump it.
fn memory_push_all(b: &mut IrBuilder, values: &[Reg]) {
    if values.is_empty() {
        return;
    }
    let top = b.stack_top();
    for (i, &value) in values.iter().enumerate() {
        let addr = b.offset(top, i as i32);
        b.store_stack(addr, value);
    }
    let next = b.offset(top, values.len() as i32);
    b.set_stack_top(next);
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct EagerStack;

impl StackStrategy for EagerStack {
    fn empty() -> Self {
        EagerStack
    }

    fn push(&mut self, b: &mut IrBuilder, value: Reg) {
        memory_push(b, value);
    }

    fn pop(&mut self, b: &mut IrBuilder) -> Reg {
        memory_pop(b)
    }

    fn commit(&mut self, _b: &mut IrBuilder) {}

    fn discard(&mut self) {}

    fn merge_copy(&self, _b: &mut IrBuilder) -> Self {
        EagerStack
    }

    fn reconcile(&self, _b: &mut IrBuilder, _target: &Self) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pending {
    Value(Reg),
    /// Lives in a variable shared by every predecessor of a merge block.
    Merged(Var),
}

#[derive(Clone, Debug, Default)]
pub(crate) struct LazyStack {
    entries: Vec<Pending>,
}

impl LazyStack {
    #[cfg(test)]
    fn depth(&self) -> usize {
        self.entries.len()
    }

    fn materialize(b: &mut IrBuilder, entry: Pending) -> Reg {
        match entry {
            Pending::Value(r) => r,
            Pending::Merged(v) => b.load_var(v),
        }
    }

    fn materialize_all(&self, b: &mut IrBuilder) -> Vec<Reg> {
        self.entries
            .iter()
            .map(|&entry| Self::materialize(b, entry))
            .collect()
    }
}

impl StackStrategy for LazyStack {
    fn empty() -> Self {
        Self::default()
    }

    fn push(&mut self, _b: &mut IrBuilder, value: Reg) {
        self.entries.push(Pending::Value(value));
    }

    fn pop(&mut self, b: &mut IrBuilder) -> Reg {
        match self.entries.pop() {
            Some(entry) => Self::materialize(b, entry),
            None => memory_pop(b),
        }
    }

    fn commit(&mut self, b: &mut IrBuilder) {
        let values = self.materialize_all(b);
        memory_push_all(b, &values);
        self.entries.clear();
    }

    fn discard(&mut self) {
        self.entries.clear();
    }

    fn merge_copy(&self, b: &mut IrBuilder) -> Self {
        let values = self.materialize_all(b);
        let entries = values
            .into_iter()
            .map(|value| {
                let var = b.var();
                b.store_var(var, value);
                Pending::Merged(var)
            })
            .collect();
        Self { entries }
    }

    fn reconcile(&self, b: &mut IrBuilder, target: &Self) {
        // Read everything before writing: a block looping back to itself
        // reconciles into the very variables it reads.
        let mut values = self.materialize_all(b);
        let want = target.entries.len();
        if values.len() > want {
            let extra = values.len() - want;
            memory_push_all(b, &values[..extra]);
            values.drain(..extra);
        } else if values.len() < want {
            let missing = want - values.len();
            let mut reloaded: Vec<Reg> = (0..missing).map(|_| memory_pop(b)).collect();
            reloaded.reverse();
            reloaded.extend(values);
            values = reloaded;
        }
        for (entry, value) in target.entries.iter().zip(values) {
            match *entry {
                Pending::Merged(var) => b.store_var(var, value),
                Pending::Value(_) => debug_assert!(false, "merge target holds a plain register"),
            }
        }
    }
}

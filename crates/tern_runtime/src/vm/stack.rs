//! The shared operand stack.
//!
//! Interpreted and compiled frames live in one growable array addressed by
//! index. A frame is the window `[base, base + nparams + nlocals)`; popping a
//! frame is a single `set_top(base)`.
//!
//! Underflow and overflow are bytecode or compiler defects. They panic
//! rather than surface as errors.
//!
//! Interpreted calls recurse on the native stack, so unbounded bytecode
//! recursion usually exhausts the thread's native stack before this one
//! reaches `stack_capacity`.

use tern_core::Value;

pub struct OperandStack {
    slots: Vec<Value>,
    top: usize,
    capacity: usize,
}

impl OperandStack {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity.min(1024)),
            top: 0,
            capacity,
        }
    }

    #[inline(always)]
    pub fn push(&mut self, value: Value) {
        assert!(self.top < self.capacity, "operand stack overflow");
        if self.top == self.slots.len() {
            self.slots.push(value);
        } else {
            self.slots[self.top] = value;
        }
        self.top += 1;
    }

    #[inline(always)]
    pub fn pop(&mut self) -> Value {
        debug_assert!(self.top > 0, "operand stack underflow");
        self.top -= 1;
        self.slots[self.top]
    }

    #[inline(always)]
    pub fn peek(&self) -> Value {
        debug_assert!(self.top > 0, "peek on empty operand stack");
        self.slots[self.top - 1]
    }

    /// Index one past the topmost live slot.
    #[inline(always)]
    pub fn top(&self) -> usize {
        self.top
    }

    /// Move the top cursor. Slots uncovered by growth keep whatever they
    /// held before (or `Unit` if never written).
    pub fn set_top(&mut self, top: usize) {
        assert!(top <= self.capacity, "operand stack overflow");
        if top > self.slots.len() {
            self.slots.resize(top, Value::UNIT);
        }
        self.top = top;
    }

    /// Claim `count` slots above the top, optionally zeroing them.
    pub fn reserve(&mut self, count: usize, zero: bool) {
        let base = self.top;
        self.set_top(base + count);
        if zero {
            self.slots[base..base + count].fill(Value::ZERO);
        }
    }

    #[inline(always)]
    pub fn get(&self, index: usize) -> Value {
        self.slots[index]
    }

    /// Write a slot. Writes above the top are allowed so a pending run of
    /// values can be stored before the top is bumped past them.
    #[inline(always)]
    pub fn set(&mut self, index: usize, value: Value) {
        assert!(index < self.capacity, "operand stack overflow");
        if index >= self.slots.len() {
            self.slots.resize(index + 1, Value::UNIT);
        }
        self.slots[index] = value;
    }

    /// The live part of the stack.
    pub fn as_slice(&self) -> &[Value] {
        &self.slots[..self.top]
    }

    /// A frame window `(base, len)`.
    pub fn window(&self, base: usize, len: usize) -> &[Value] {
        &self.slots[base..base + len]
    }

    pub fn len(&self) -> usize {
        self.top
    }

    pub fn is_empty(&self) -> bool {
        self.top == 0
    }

    pub fn clear(&mut self) {
        self.top = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let mut s = OperandStack::with_capacity(8);
        s.push(Value::from_i64(1));
        s.push(Value::from_i64(2));
        assert_eq!(s.pop().as_i64(), 2);
        assert_eq!(s.pop().as_i64(), 1);
        assert!(s.is_empty());
    }

    #[test]
    fn reserve_zeroes_only_when_asked() {
        let mut s = OperandStack::with_capacity(8);
        s.push(Value::from_i64(9));
        s.push(Value::from_i64(9));
        s.set_top(0);
        s.reserve(2, false);
        assert_eq!(s.window(0, 2), &[Value::from_i64(9), Value::from_i64(9)]);
        s.set_top(0);
        s.reserve(2, true);
        assert_eq!(s.window(0, 2), &[Value::ZERO, Value::ZERO]);
    }

    #[test]
    fn set_above_top_then_bump() {
        let mut s = OperandStack::with_capacity(8);
        s.set(0, Value::from_i64(5));
        s.set(1, Value::from_i64(6));
        s.set_top(2);
        assert_eq!(s.as_slice(), &[Value::from_i64(5), Value::from_i64(6)]);
    }

    #[test]
    #[should_panic(expected = "operand stack overflow")]
    fn overflow_panics() {
        let mut s = OperandStack::with_capacity(1);
        s.push(Value::ZERO);
        s.push(Value::ZERO);
    }
}

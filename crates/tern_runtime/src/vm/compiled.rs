//! Per-function compiled entries.
//!
//! Each slot moves at most once from absent to a complete entry. Readers on
//! any thread see either nothing or the whole entry.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tern_core::Value;

use crate::config::ParamPassing;
use crate::errors::Result;
use crate::jit::NativeCode;
use crate::vm::ExecutionContext;

/// A callable entry produced by the code generator for one function.
#[derive(Clone)]
pub struct CompiledFunction {
    convention: ParamPassing,
    nparams: usize,
    code: Arc<dyn NativeCode>,
}

impl CompiledFunction {
    pub fn new(convention: ParamPassing, nparams: usize, code: Arc<dyn NativeCode>) -> Self {
        Self {
            convention,
            nparams,
            code,
        }
    }

    pub fn convention(&self) -> ParamPassing {
        self.convention
    }

    pub fn nparams(&self) -> usize {
        self.nparams
    }

    /// Call the entry. Under `ParamPassing::Stack` the arguments must already
    /// be on the context's stack and `args` is empty.
    #[inline]
    pub fn invoke(&self, cx: &mut ExecutionContext<'_>, args: &[Value]) -> Result<Value> {
        self.code.invoke(cx, args)
    }
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFunction")
            .field("convention", &self.convention)
            .field("nparams", &self.nparams)
            .finish_non_exhaustive()
    }
}

pub struct CompiledFunctionTable {
    slots: Vec<OnceLock<CompiledFunction>>,
}

impl CompiledFunctionTable {
    pub fn new(function_count: usize) -> Self {
        Self {
            slots: (0..function_count).map(|_| OnceLock::new()).collect(),
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&CompiledFunction> {
        self.slots.get(index).and_then(OnceLock::get)
    }

    /// Publish an entry. Returns the entry now in the slot: the new one, or
    /// the one a previous compilation already installed.
    pub fn install(&self, index: usize, entry: CompiledFunction) -> Option<&CompiledFunction> {
        let slot = self.slots.get(index)?;
        Some(slot.get_or_init(|| entry))
    }

    pub fn is_compiled(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    pub fn compiled_count(&self) -> usize {
        self.slots.iter().filter(|s| s.get().is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

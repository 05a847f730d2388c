use std::sync::Arc;

use tern_core::Value;
use tern_ir::{FunctionDef, Module};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::{CompileError, Result, RuntimeError};
use crate::jit::{CodeGenerator, Compiler, ThreadedBackend};
use crate::output::{Output, StdoutOutput};
use crate::primitives::{PrimitiveFn, PrimitiveRegistry};
use crate::vm::compiled::{CompiledFunction, CompiledFunctionTable};
use crate::vm::context::{ExecutionContext, check_arity};

/// A loaded module plus everything needed to run it.
///
/// After setup the machine is only read through `&self`, so it can be shared
/// across threads. Each invocation gets its own [`ExecutionContext`].
pub struct VirtualMachine {
    config: Config,
    module: Arc<Module>,
    primitives: Vec<PrimitiveFn>,
    compiled: CompiledFunctionTable,
    code_generator: Box<dyn CodeGenerator>,
    output: Box<dyn Output>,
}

impl VirtualMachine {
    /// Load a module, resolving its primitive imports against the standard
    /// primitives.
    pub fn new(config: Config, module: Arc<Module>) -> Result<Self> {
        Self::with_registry(config, module, &PrimitiveRegistry::with_std())
    }

    pub fn with_registry(
        config: Config,
        module: Arc<Module>,
        registry: &PrimitiveRegistry,
    ) -> Result<Self> {
        let primitives = registry.resolve(module.primitives())?;
        let compiled = CompiledFunctionTable::new(module.function_count());
        if config.verbose {
            info!(
                functions = module.function_count(),
                strings = module.strings().len(),
                primitives = primitives.len(),
                "module loaded"
            );
        }
        Ok(Self {
            config,
            module,
            primitives,
            compiled,
            code_generator: Box::new(ThreadedBackend),
            output: Box::new(StdoutOutput),
        })
    }

    pub fn set_output(&mut self, output: Box<dyn Output>) {
        self.output = output;
    }

    pub fn set_code_generator(&mut self, code_generator: Box<dyn CodeGenerator>) {
        self.code_generator = code_generator;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn output(&self) -> &dyn Output {
        self.output.as_ref()
    }

    pub fn code_generator(&self) -> &dyn CodeGenerator {
        self.code_generator.as_ref()
    }

    pub fn function_count(&self) -> usize {
        self.module.function_count()
    }

    #[inline]
    pub fn function(&self, index: usize) -> Result<&FunctionDef> {
        self.module
            .function(index)
            .ok_or(RuntimeError::FunctionIndexOutOfRange(index))
    }

    pub fn function_index(&self, name: &str) -> Result<usize> {
        self.module
            .function_index(name)
            .ok_or_else(|| RuntimeError::UnknownFunction(name.to_string()))
    }

    pub fn string(&self, index: usize) -> Result<&str> {
        self.module
            .string(index)
            .ok_or(RuntimeError::StringIndexOutOfRange(index))
    }

    #[inline]
    pub fn primitive(&self, index: usize) -> Result<PrimitiveFn> {
        self.primitives
            .get(index)
            .copied()
            .ok_or(RuntimeError::PrimitiveIndexOutOfRange(index))
    }

    #[inline]
    pub fn compiled(&self, index: usize) -> Option<&CompiledFunction> {
        self.compiled.get(index)
    }

    pub fn is_compiled(&self, index: usize) -> bool {
        self.compiled.is_compiled(index)
    }

    pub fn compiled_count(&self) -> usize {
        self.compiled.compiled_count()
    }

    /// Run a function by name.
    pub fn run(&self, name: &str, args: &[Value]) -> Result<Value> {
        let index = self.function_index(name)?;
        self.run_index(index, args)
    }

    /// Run a function by index on a fresh execution context.
    pub fn run_index(&self, index: usize, args: &[Value]) -> Result<Value> {
        let function = self.function(index)?;
        check_arity(function, args.len())?;
        if self.config.verbose {
            info!(
                function = %function.name,
                args = args.len(),
                compiled = self.is_compiled(index),
                "running function"
            );
        }
        let mut cx = ExecutionContext::new(self);
        let result = cx.run(index, args)?;
        if self.config.verbose {
            info!(function = %function.name, result = %result, "function returned");
        }
        Ok(result)
    }

    /// Build a compiled entry without publishing it.
    pub fn compile(&self, index: usize) -> std::result::Result<CompiledFunction, CompileError> {
        if !self.config.jit {
            return Err(CompileError::JitDisabled);
        }
        Compiler::new(self).compile(index)
    }

    /// Compile a function and publish its entry. Failure leaves the function
    /// interpreted and is only logged. Compiling an already compiled function
    /// keeps the first entry.
    pub fn generate_code(&self, index: usize) -> Option<&CompiledFunction> {
        if !self.config.jit {
            return None;
        }
        match self.compile(index) {
            Ok(entry) => {
                let already = self.compiled.is_compiled(index);
                let installed = self.compiled.install(index, entry)?;
                if already {
                    debug!(index, "function already compiled, keeping first entry");
                } else if self.config.verbose {
                    info!(index, convention = ?installed.convention(), "compiled function");
                }
                Some(installed)
            }
            Err(err) => {
                let name = self.module.function(index).map(|f| f.name.as_str());
                warn!(index, function = ?name, error = %err, "compilation failed, staying interpreted");
                None
            }
        }
    }

    /// Compile every function in declaration order. Returns how many ended
    /// up with an entry.
    pub fn generate_all_code(&self) -> usize {
        (0..self.function_count())
            .filter(|&index| self.generate_code(index).is_some())
            .count()
    }
}

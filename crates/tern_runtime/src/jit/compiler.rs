use tracing::debug;

use crate::errors::CompileError;
use crate::jit::ir::IrRegion;
use crate::jit::method_builder::MethodBuilder;
use crate::jit::stack_state::{EagerStack, LazyStack};
use crate::vm::{CompiledFunction, VirtualMachine};

/// Turns a function of a loaded module into a compiled entry using the
/// machine's configuration and code generator.
pub struct Compiler<'vm> {
    vm: &'vm VirtualMachine,
}

impl<'vm> Compiler<'vm> {
    pub fn new(vm: &'vm VirtualMachine) -> Self {
        Self { vm }
    }

    pub fn build_ir(&self, index: usize) -> Result<IrRegion, CompileError> {
        if self.vm.config().lazy_vm_state {
            MethodBuilder::<LazyStack>::new(self.vm, index)?.build()
        } else {
            MethodBuilder::<EagerStack>::new(self.vm, index)?.build()
        }
    }

    pub fn compile(&self, index: usize) -> Result<CompiledFunction, CompileError> {
        let function = self
            .vm
            .function(index)
            .map_err(|_| CompileError::FunctionIndexOutOfRange(index))?;
        let region = self.build_ir(index)?;
        if self.vm.config().debug {
            debug!(function = %function.name, "IR\n{region}");
        }
        let convention = region.convention;
        let code = self.vm.code_generator().generate(region)?;
        Ok(CompiledFunction::new(
            convention,
            function.nparams as usize,
            code,
        ))
    }
}

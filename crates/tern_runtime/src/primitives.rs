//! Native primitives callable through `primitive_call`.
//!
//! A primitive receives only the execution context. It pops its own
//! arguments off the shared stack and pushes exactly one result.

use tern_core::Value;

use crate::errors::{Result, RuntimeError};
use crate::vm::ExecutionContext;

pub type PrimitiveFn = fn(&mut ExecutionContext<'_>) -> Result<()>;

pub struct PrimitiveRegistry {
    entries: Vec<(String, PrimitiveFn)>,
}

impl PrimitiveRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// A registry with the standard primitives installed.
    pub fn with_std() -> Self {
        let mut registry = Self::new();
        StdPrimitiveProvider.install(&mut registry);
        registry
    }

    /// Register a primitive. A later registration under the same name wins.
    pub fn register(&mut self, name: &str, fun: PrimitiveFn) {
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| n == name) {
            entry.1 = fun;
            return;
        }
        self.entries.push((name.to_string(), fun));
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn lookup(&self, name: &str) -> Option<PrimitiveFn> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, f)| *f)
    }

    /// Resolve a module's primitive imports into a callable table.
    pub fn resolve(&self, imports: &[String]) -> Result<Vec<PrimitiveFn>> {
        imports
            .iter()
            .map(|name| {
                self.lookup(name)
                    .ok_or_else(|| RuntimeError::UnknownPrimitive(name.clone()))
            })
            .collect()
    }
}

impl Default for PrimitiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub trait PrimitiveProvider {
    fn install(&self, registry: &mut PrimitiveRegistry);
}

pub struct StdPrimitiveProvider;

impl PrimitiveProvider for StdPrimitiveProvider {
    fn install(&self, registry: &mut PrimitiveRegistry) {
        registry.register("print_string", prim_print_string);
        registry.register("print_number", prim_print_number);
    }
}

fn prim_print_number(cx: &mut ExecutionContext<'_>) -> Result<()> {
    let number = cx.pop();
    if !number.is_int() {
        return Err(RuntimeError::TypeMismatch {
            expected: "int",
            found: number.type_name(),
        });
    }
    let mut buf = itoa::Buffer::new();
    cx.vm().output().write_line(buf.format(number.as_i64()));
    cx.push(Value::ZERO);
    Ok(())
}

fn prim_print_string(cx: &mut ExecutionContext<'_>) -> Result<()> {
    let value = cx.pop();
    let Some(index) = value.as_str_index() else {
        return Err(RuntimeError::TypeMismatch {
            expected: "string",
            found: value.type_name(),
        });
    };
    let vm = cx.vm();
    vm.output().write_line(vm.string(index as usize)?);
    cx.push(Value::ZERO);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(cx: &mut ExecutionContext<'_>) -> Result<()> {
        cx.push(Value::ZERO);
        Ok(())
    }

    #[test]
    fn std_registry_has_printing_primitives() {
        let registry = PrimitiveRegistry::with_std();
        assert_eq!(registry.names(), vec!["print_string", "print_number"]);
        assert!(registry.lookup("print_number").is_some());
        assert!(registry.lookup("hash_table_get").is_none());
    }

    #[test]
    fn resolve_reports_missing_imports() {
        let registry = PrimitiveRegistry::with_std();
        let imports = vec!["print_number".to_string(), "nope".to_string()];
        let err = registry.resolve(&imports).err();
        assert_eq!(err, Some(RuntimeError::UnknownPrimitive("nope".into())));
    }

    #[test]
    fn re_registering_replaces() {
        let mut registry = PrimitiveRegistry::with_std();
        registry.register("print_number", noop);
        assert_eq!(registry.names().len(), 2);
    }
}

use ahash::RandomState;
use hashbrown::HashMap;
use indexmap::IndexSet;

use crate::FunctionDef;

pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleError {
    #[error("function `{0}` is defined more than once")]
    DuplicateFunction(String),
}

/// Immutable collection of functions, strings and primitive imports.
///
/// Built once and shared read-only by every execution.
#[derive(Clone, Debug, Default)]
pub struct Module {
    functions: Vec<FunctionDef>,
    strings: Vec<String>,
    primitives: Vec<String>,
    index: FastHashMap<String, usize>,
}

impl Module {
    pub fn functions(&self) -> &[FunctionDef] {
        &self.functions
    }

    pub fn function(&self, index: usize) -> Option<&FunctionDef> {
        self.functions.get(index)
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn string(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    /// Primitive names in import order; the index is the `primitive_call`
    /// immediate.
    pub fn primitives(&self) -> &[String] {
        &self.primitives
    }
}

#[derive(Default)]
pub struct ModuleBuilder {
    functions: Vec<FunctionDef>,
    index: FastHashMap<String, usize>,
    strings: IndexSet<String>,
    primitives: IndexSet<String>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string constant and return its table index.
    pub fn string(&mut self, s: &str) -> u32 {
        if let Some(idx) = self.strings.get_index_of(s) {
            return idx as u32;
        }
        self.strings.insert_full(s.to_string()).0 as u32
    }

    /// Import a primitive by name and return its table index.
    pub fn primitive(&mut self, name: &str) -> u32 {
        if let Some(idx) = self.primitives.get_index_of(name) {
            return idx as u32;
        }
        self.primitives.insert_full(name.to_string()).0 as u32
    }

    /// Index the next added function will receive.
    pub fn next_function_index(&self) -> usize {
        self.functions.len()
    }

    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn function(&mut self, def: FunctionDef) -> Result<usize, ModuleError> {
        if self.index.contains_key(def.name.as_str()) {
            return Err(ModuleError::DuplicateFunction(def.name));
        }
        let idx = self.functions.len();
        self.index.insert(def.name.clone(), idx);
        self.functions.push(def);
        Ok(idx)
    }

    pub fn build(self) -> Module {
        Module {
            functions: self.functions,
            strings: self.strings.into_iter().collect(),
            primitives: self.primitives.into_iter().collect(),
            index: self.index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Instruction, OpCode};

    fn ret_const(name: &str, k: i32) -> FunctionDef {
        FunctionDef::new(
            name,
            0,
            0,
            [
                Instruction::new(OpCode::IntPushConstant, k),
                Instruction::op(OpCode::FunctionReturn),
            ],
        )
    }

    #[test]
    fn functions_are_indexed_in_declaration_order() {
        let mut b = ModuleBuilder::new();
        assert_eq!(b.function(ret_const("a", 1)).unwrap(), 0);
        assert_eq!(b.next_function_index(), 1);
        assert_eq!(b.function(ret_const("b", 2)).unwrap(), 1);
        let m = b.build();
        assert_eq!(m.function_count(), 2);
        assert_eq!(m.function_index("b"), Some(1));
        assert_eq!(m.function_index("c"), None);
        assert_eq!(m.function(0).map(|f| f.name.as_str()), Some("a"));
    }

    #[test]
    fn duplicate_function_names_are_rejected() {
        let mut b = ModuleBuilder::new();
        b.function(ret_const("a", 1)).unwrap();
        let err = b.function(ret_const("a", 2)).unwrap_err();
        assert_eq!(err, ModuleError::DuplicateFunction("a".into()));
    }

    #[test]
    fn strings_and_primitives_are_interned() {
        let mut b = ModuleBuilder::new();
        let hello = b.string("hello");
        let world = b.string("world");
        assert_eq!(b.string("hello"), hello);
        assert_ne!(hello, world);
        let p = b.primitive("print_number");
        assert_eq!(b.primitive("print_number"), p);
        let m = b.build();
        assert_eq!(m.string(world as usize), Some("world"));
        assert_eq!(m.primitives(), ["print_number".to_string()]);
    }
}

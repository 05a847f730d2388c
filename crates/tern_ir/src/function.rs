use std::fmt;

use crate::Instruction;

/// A bytecode function: header plus sentinel-terminated instruction stream.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub nparams: u32,
    pub nlocals: u32,
    pub instructions: Vec<Instruction>,
}

impl FunctionDef {
    /// Build a function, appending the `EndSection` sentinel when the body
    /// does not already end with one.
    pub fn new(
        name: impl Into<String>,
        nparams: u32,
        nlocals: u32,
        body: impl IntoIterator<Item = Instruction>,
    ) -> Self {
        let mut instructions: Vec<Instruction> = body.into_iter().collect();
        if !instructions.last().is_some_and(|i| i.is_end_section()) {
            instructions.push(Instruction::END_SECTION);
        }
        Self {
            name: name.into(),
            nparams,
            nlocals,
            instructions,
        }
    }

    /// Instructions before the first sentinel.
    pub fn body(&self) -> &[Instruction] {
        let end = self
            .instructions
            .iter()
            .position(|i| i.is_end_section())
            .unwrap_or(self.instructions.len());
        &self.instructions[..end]
    }

    /// Parameters plus locals.
    pub fn frame_slots(&self) -> usize {
        self.nparams as usize + self.nlocals as usize
    }
}

impl fmt::Display for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "function {} (params: {}, locals: {})",
            self.name, self.nparams, self.nlocals
        )?;
        for (idx, insn) in self.body().iter().enumerate() {
            writeln!(f, "  {idx:4}: {insn}")?;
        }
        Ok(())
    }
}

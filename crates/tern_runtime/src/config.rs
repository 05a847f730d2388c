//! VM and JIT configuration.

use serde::{Deserialize, Serialize};

/// How compiled functions receive their parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamPassing {
    /// Arguments stay on the shared operand stack, exactly where the
    /// interpreter expects them.
    #[default]
    Stack,
    /// Parameters and locals are IR variables; every call site marshals
    /// its arguments.
    Register,
}

/// Runtime configuration options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Enable compilation entirely.
    pub jit: bool,
    pub pass_param: ParamPassing,
    /// Track the operand stack with a simulated stack during IR
    /// construction instead of emitting a memory operation per push/pop.
    pub lazy_vm_state: bool,
    pub max_inline_depth: u32,
    /// Permit direct and inlined calls between compiled functions. When off
    /// every call from compiled code goes through the interpreter.
    pub direct_call: bool,
    /// Per-bytecode lowering traces.
    pub debug: bool,
    pub verbose: bool,
    /// Zero-initialize locals in the interpreter as compiled code does.
    /// Bytecode must not rely on either behavior.
    pub zero_locals: bool,
    /// Operand stack capacity in slots.
    pub stack_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jit: true,
            pass_param: ParamPassing::Stack,
            lazy_vm_state: false,
            max_inline_depth: 0,
            direct_call: true,
            debug: false,
            verbose: false,
            zero_locals: false,
            stack_capacity: 1 << 20,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON. Missing keys take their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn interpreter_only() -> Self {
        Self {
            jit: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_uses_camel_case_keys_and_defaults() {
        let cfg = Config::from_json(
            r#"{"passParam": "register", "lazyVmState": true, "maxInlineDepth": 3}"#,
        )
        .unwrap();
        assert_eq!(cfg.pass_param, ParamPassing::Register);
        assert!(cfg.lazy_vm_state);
        assert_eq!(cfg.max_inline_depth, 3);
        assert!(cfg.jit);
        assert!(cfg.direct_call);
        assert_eq!(cfg.stack_capacity, 1 << 20);
    }

    #[test]
    fn empty_json_is_default() {
        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn unknown_passing_mode_is_rejected() {
        assert!(Config::from_json(r#"{"passParam": "heap"}"#).is_err());
    }
}

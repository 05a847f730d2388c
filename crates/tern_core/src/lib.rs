//! Core types shared by the Tern interpreter and JIT.
//!
//! - `Value` - NaN-boxed tagged scalar that lives in operand stack slots

pub mod value;

pub use value::Value;

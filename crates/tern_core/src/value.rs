//! Runtime value representation.
//!
//! Every operand stack slot holds one NaN-boxed 64-bit word. Integers carry a
//! 48-bit signed payload; string values carry an index into the module's
//! string table.

use std::fmt;

// ============================================================================
// NaN-Boxing constants
// ============================================================================

pub const TAG_BASE: u64 = 0xfff0000000000000;
pub const TAG_MASK: u64 = 0x000f000000000000;
pub const PAYLOAD_MASK: u64 = 0x0000ffffffffffff;

pub const TAG_INT: u64 = 0x0001;
pub const TAG_UNIT: u64 = 0x0003;
pub const TAG_STR: u64 = 0x0006;

const INT_PREFIX: u64 = TAG_BASE | (TAG_INT << 48);
const STR_PREFIX: u64 = TAG_BASE | (TAG_STR << 48);

/// Largest integer representable without truncation.
pub const INT_MAX: i64 = (1 << 47) - 1;
/// Smallest integer representable without truncation.
pub const INT_MIN: i64 = -(1 << 47);

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Value(u64);

impl Default for Value {
    fn default() -> Self {
        Self::UNIT
    }
}

impl Value {
    pub const UNIT: Value = Value(TAG_BASE | (TAG_UNIT << 48));
    pub const ZERO: Value = Value(INT_PREFIX);

    /// Box an integer. Values outside the 48-bit range wrap.
    #[inline(always)]
    pub fn from_i64(i: i64) -> Self {
        Self(INT_PREFIX | (i as u64 & PAYLOAD_MASK))
    }

    #[inline(always)]
    pub fn from_bool(b: bool) -> Self {
        Self::from_i64(b as i64)
    }

    /// A reference to entry `index` of the string table.
    #[inline(always)]
    pub fn str(index: u32) -> Self {
        Self(STR_PREFIX | index as u64)
    }

    #[inline(always)]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[inline(always)]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub fn is_int(&self) -> bool {
        (self.0 & 0xffff000000000000) == INT_PREFIX
    }

    #[inline(always)]
    pub fn is_str(&self) -> bool {
        (self.0 & 0xffff000000000000) == STR_PREFIX
    }

    #[inline(always)]
    pub fn is_unit(&self) -> bool {
        self.0 == Self::UNIT.0
    }

    /// The payload sign-extended from 48 bits.
    ///
    /// Defined for every tag; comparisons in both execution tiers go
    /// through this so string references compare by index.
    #[inline(always)]
    pub fn as_i64(&self) -> i64 {
        let val = (self.0 & PAYLOAD_MASK) as i64;
        if (val & 0x0000800000000000) != 0 {
            val | -0x0001000000000000
        } else {
            val
        }
    }

    #[inline(always)]
    pub fn as_str_index(&self) -> Option<u32> {
        if self.is_str() {
            Some((self.0 & PAYLOAD_MASK) as u32)
        } else {
            None
        }
    }

    pub fn get_tag(&self) -> u64 {
        (self.0 & TAG_MASK) >> 48
    }

    pub fn type_name(&self) -> &'static str {
        if self.is_int() {
            "int"
        } else if self.is_str() {
            "string"
        } else if self.is_unit() {
            "unit"
        } else {
            "unknown"
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::from_i64(i)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_int() {
            write!(f, "Int({})", self.as_i64())
        } else if self.is_str() {
            write!(f, "Str(#{})", self.0 & PAYLOAD_MASK)
        } else if self.is_unit() {
            write!(f, "Unit")
        } else {
            write!(f, "Raw({:#018x})", self.0)
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_int() {
            write!(f, "{}", self.as_i64())
        } else if self.is_str() {
            write!(f, "str#{}", self.0 & PAYLOAD_MASK)
        } else if self.is_unit() {
            write!(f, "unit")
        } else {
            write!(f, "{:#x}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_roundtrip_keeps_sign() {
        for i in [0, 1, -1, 42, -42, INT_MAX, INT_MIN] {
            let v = Value::from_i64(i);
            assert!(v.is_int());
            assert_eq!(v.as_i64(), i);
        }
    }

    #[test]
    fn int_wraps_at_48_bits() {
        assert_eq!(Value::from_i64(INT_MAX + 1).as_i64(), INT_MIN);
        assert_eq!(Value::from_i64(INT_MIN - 1).as_i64(), INT_MAX);
    }

    #[test]
    fn string_refs_are_distinct_from_ints() {
        let s = Value::str(7);
        assert!(s.is_str());
        assert!(!s.is_int());
        assert_eq!(s.as_str_index(), Some(7));
        assert_eq!(Value::from_i64(7).as_str_index(), None);
        assert_ne!(s, Value::from_i64(7));
    }

    #[test]
    fn default_is_unit() {
        assert!(Value::default().is_unit());
        assert_eq!(Value::ZERO, Value::from_i64(0));
        assert_eq!(Value::from_bool(true), Value::from_i64(1));
    }
}

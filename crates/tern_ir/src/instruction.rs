use std::fmt;

/// Operation selector of an instruction word.
///
/// Discriminants are the encoded opcode byte and are stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// End of a function body. Never executed as an operation.
    EndSection = 0,
    FunctionCall = 1,
    FunctionReturn = 2,
    PrimitiveCall = 3,
    Jmp = 4,
    Duplicate = 5,
    Drop = 6,
    PushFromLocal = 7,
    PopIntoLocal = 8,
    IntAdd = 9,
    IntSub = 10,
    IntMul = 11,
    IntDiv = 12,
    IntPushConstant = 13,
    IntNot = 14,
    IntJmpEq = 15,
    IntJmpNeq = 16,
    IntJmpGt = 17,
    IntJmpGe = 18,
    IntJmpLt = 19,
    IntJmpLe = 20,
    StrPushConstant = 21,
    PushFromParam = 24,
    PopIntoParam = 25,
}

impl OpCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        use OpCode::*;
        Some(match byte {
            0 => EndSection,
            1 => FunctionCall,
            2 => FunctionReturn,
            3 => PrimitiveCall,
            4 => Jmp,
            5 => Duplicate,
            6 => Drop,
            7 => PushFromLocal,
            8 => PopIntoLocal,
            9 => IntAdd,
            10 => IntSub,
            11 => IntMul,
            12 => IntDiv,
            13 => IntPushConstant,
            14 => IntNot,
            15 => IntJmpEq,
            16 => IntJmpNeq,
            17 => IntJmpGt,
            18 => IntJmpGe,
            19 => IntJmpLt,
            20 => IntJmpLe,
            21 => StrPushConstant,
            24 => PushFromParam,
            25 => PopIntoParam,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        use OpCode::*;
        match self {
            EndSection => "end_section",
            FunctionCall => "function_call",
            FunctionReturn => "function_return",
            PrimitiveCall => "primitive_call",
            Jmp => "jmp",
            Duplicate => "duplicate",
            Drop => "drop",
            PushFromLocal => "push_from_local",
            PopIntoLocal => "pop_into_local",
            IntAdd => "int_add",
            IntSub => "int_sub",
            IntMul => "int_mul",
            IntDiv => "int_div",
            IntPushConstant => "int_push_constant",
            IntNot => "int_not",
            IntJmpEq => "int_jmp_eq",
            IntJmpNeq => "int_jmp_neq",
            IntJmpGt => "int_jmp_gt",
            IntJmpGe => "int_jmp_ge",
            IntJmpLt => "int_jmp_lt",
            IntJmpLe => "int_jmp_le",
            StrPushConstant => "str_push_constant",
            PushFromParam => "push_from_param",
            PopIntoParam => "pop_into_param",
        }
    }

    /// Comparison-and-jump opcodes.
    pub fn is_conditional_jump(self) -> bool {
        matches!(
            self,
            OpCode::IntJmpEq
                | OpCode::IntJmpNeq
                | OpCode::IntJmpGt
                | OpCode::IntJmpGe
                | OpCode::IntJmpLt
                | OpCode::IntJmpLe
        )
    }

    /// Whether the immediate is a relative displacement.
    pub fn is_jump(self) -> bool {
        self == OpCode::Jmp || self.is_conditional_jump()
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One encoded instruction: opcode in bits 31..24, signed immediate in 23..0.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(u32);

const OPCODE_SHIFT: u32 = 24;
const IMMEDIATE_MASK: u32 = 0x00ff_ffff;

impl Instruction {
    pub const END_SECTION: Instruction = Instruction(0);
    pub const IMMEDIATE_MIN: i32 = -(1 << 23);
    pub const IMMEDIATE_MAX: i32 = (1 << 23) - 1;

    /// Encode an instruction. Immediates outside 24 bits are truncated.
    pub fn new(opcode: OpCode, immediate: i32) -> Self {
        debug_assert!(
            (Self::IMMEDIATE_MIN..=Self::IMMEDIATE_MAX).contains(&immediate),
            "immediate {immediate} does not fit in 24 bits"
        );
        Self(((opcode as u32) << OPCODE_SHIFT) | (immediate as u32 & IMMEDIATE_MASK))
    }

    /// An instruction whose immediate is unused.
    pub fn op(opcode: OpCode) -> Self {
        Self::new(opcode, 0)
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn opcode_byte(self) -> u8 {
        (self.0 >> OPCODE_SHIFT) as u8
    }

    /// Decoded opcode, `None` for an unrecognized byte.
    pub fn opcode(self) -> Option<OpCode> {
        OpCode::from_byte(self.opcode_byte())
    }

    /// The immediate, sign-extended from 24 bits.
    pub const fn immediate(self) -> i32 {
        ((self.0 << 8) as i32) >> 8
    }

    pub fn is_end_section(self) -> bool {
        self.opcode_byte() == OpCode::EndSection as u8
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode() {
            Some(op) => write!(f, "{} {}", op, self.immediate()),
            None => write!(f, "<unknown {:#04x}> {}", self.opcode_byte(), self.immediate()),
        }
    }
}

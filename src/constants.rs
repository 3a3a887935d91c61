//! Bit-field layout of a 32-bit RV32IM instruction word and the memory map
//! shared by the assembler, linker and simulator.

/// Number of general-purpose registers, `x0..x31`.
pub const REGISTER_COUNT: usize = 32;

/// Width in bytes of a single instruction word. The implemented subset never
/// produces variable-length encodings.
pub const INSTRUCTION_BYTES: u32 = 4;

pub const BYTE_BYTES: u32 = 1;
pub const HALF_BYTES: u32 = 2;
pub const WORD_BYTES: u32 = 4;

/// Start of the text (code) segment.
pub const TEXT_BEGIN: u32 = 0x0000_0000;
/// Start of the rodata segment.
pub const CONST_BEGIN: u32 = 0x0001_0000;
/// Start of the data segment.
pub const STATIC_BEGIN: u32 = 0x1000_0000;
/// Start of the heap, grown upward by `sbrk`.
pub const HEAP_BEGIN: u32 = 0x1004_0000;
/// Approximate top of the stack; the stack grows downward from here.
pub const STACK_END: u32 = 0x7FFF_FFF0;

/// Range bounds accepted by the `.byte` directive. The lower bound is
/// intentionally `-127`, not `-128`; this mirrors an asymmetry present in the
/// reference toolchain's directive handling and is preserved rather than
/// "fixed".
pub const BYTE_DIRECTIVE_MIN: i64 = -127;
pub const BYTE_DIRECTIVE_MAX: i64 = 255;

/// Inclusive range of a 12-bit signed immediate (I-type / S-type / B-type low bits).
pub const IMM12_MIN: i64 = -2048;
pub const IMM12_MAX: i64 = 2047;

/// Inclusive range of a branch's PC-relative byte offset (13-bit signed, LSB implicitly zero).
pub const BRANCH_OFFSET_MIN: i64 = -4096;
pub const BRANCH_OFFSET_MAX: i64 = 4095;

/// Inclusive range of a JAL's PC-relative byte offset (21-bit signed, LSB implicitly zero).
pub const JAL_OFFSET_MIN: i64 = -(1 << 20);
pub const JAL_OFFSET_MAX: i64 = (1 << 20) - 1;

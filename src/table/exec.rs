use crate::error::AccessError;
use crate::format::fields;
use crate::machine_code::MachineCode;
use crate::registers::RegisterId;
use crate::simulator::{SimulatorState, TickResult};

fn rd(mc: &MachineCode) -> RegisterId {
    RegisterId::from_number(mc.get(fields::RD)).expect("RD field is always in range")
}

fn rs1(mc: &MachineCode) -> RegisterId {
    RegisterId::from_number(mc.get(fields::RS1)).expect("RS1 field is always in range")
}

fn rs2(mc: &MachineCode) -> RegisterId {
    RegisterId::from_number(mc.get(fields::RS2)).expect("RS2 field is always in range")
}

/// Xors both operands with the sign bit before a signed compare, turning an
/// unsigned compare into a signed one without a separate code path.
fn compare_unsigned(a: u32, b: u32) -> std::cmp::Ordering {
    ((a ^ 0x8000_0000) as i32).cmp(&((b ^ 0x8000_0000) as i32))
}

macro_rules! alu_r {
    ($name:ident, |$a:ident, $b:ident| $body:expr) => {
        pub fn $name(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
            let $a = state.get_reg_signed(rs1(&mc));
            let $b = state.get_reg_signed(rs2(&mc));
            state.set_reg_signed(rd(&mc), $body);
            Ok(TickResult::Next)
        }
    };
}

alu_r!(add, |a, b| a.wrapping_add(b));
alu_r!(sub, |a, b| a.wrapping_sub(b));
alu_r!(xor, |a, b| a ^ b);
alu_r!(or, |a, b| a | b);
alu_r!(and, |a, b| a & b);

pub fn sll(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = state.get_reg(rs1(&mc));
    let shamt = state.get_reg(rs2(&mc)) & 0x1F;
    state.set_reg(rd(&mc), a << shamt);
    Ok(TickResult::Next)
}

pub fn srl(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = state.get_reg(rs1(&mc));
    let shamt = state.get_reg(rs2(&mc)) & 0x1F;
    state.set_reg(rd(&mc), a >> shamt);
    Ok(TickResult::Next)
}

pub fn sra(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = state.get_reg_signed(rs1(&mc));
    let shamt = state.get_reg(rs2(&mc)) & 0x1F;
    state.set_reg_signed(rd(&mc), a >> shamt);
    Ok(TickResult::Next)
}

pub fn slt(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = state.get_reg_signed(rs1(&mc));
    let b = state.get_reg_signed(rs2(&mc));
    state.set_reg(rd(&mc), (a < b) as u32);
    Ok(TickResult::Next)
}

pub fn sltu(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = state.get_reg(rs1(&mc));
    let b = state.get_reg(rs2(&mc));
    state.set_reg(rd(&mc), (compare_unsigned(a, b) == std::cmp::Ordering::Less) as u32);
    Ok(TickResult::Next)
}

pub fn mul(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = i64::from(state.get_reg_signed(rs1(&mc)));
    let b = i64::from(state.get_reg_signed(rs2(&mc)));
    state.set_reg(rd(&mc), (a.wrapping_mul(b) as u64 as u32).into());
    Ok(TickResult::Next)
}

pub fn mulh(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = i64::from(state.get_reg_signed(rs1(&mc)));
    let b = i64::from(state.get_reg_signed(rs2(&mc)));
    state.set_reg(rd(&mc), ((a.wrapping_mul(b) as u64) >> 32) as u32);
    Ok(TickResult::Next)
}

pub fn mulhsu(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = i64::from(state.get_reg_signed(rs1(&mc)));
    let b = i64::from(state.get_reg(rs2(&mc)));
    state.set_reg(rd(&mc), ((a.wrapping_mul(b) as u64) >> 32) as u32);
    Ok(TickResult::Next)
}

pub fn mulhu(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = u64::from(state.get_reg(rs1(&mc)));
    let b = u64::from(state.get_reg(rs2(&mc)));
    state.set_reg(rd(&mc), (a.wrapping_mul(b) >> 32) as u32);
    Ok(TickResult::Next)
}

/// Division by zero: quotient `-1`, remainder = dividend. Signed overflow
/// (`INT_MIN / -1`): quotient `INT_MIN`, remainder `0`. Per `§4.6`.
pub fn div(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = state.get_reg_signed(rs1(&mc));
    let b = state.get_reg_signed(rs2(&mc));
    let q = if b == 0 {
        -1
    } else if a == i32::min_value() && b == -1 {
        i32::min_value()
    } else {
        a.wrapping_div(b)
    };
    state.set_reg_signed(rd(&mc), q);
    Ok(TickResult::Next)
}

pub fn divu(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = state.get_reg(rs1(&mc));
    let b = state.get_reg(rs2(&mc));
    let q = if b == 0 { u32::max_value() } else { a / b };
    state.set_reg(rd(&mc), q);
    Ok(TickResult::Next)
}

pub fn rem(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = state.get_reg_signed(rs1(&mc));
    let b = state.get_reg_signed(rs2(&mc));
    let r = if b == 0 {
        a
    } else if a == i32::min_value() && b == -1 {
        0
    } else {
        a.wrapping_rem(b)
    };
    state.set_reg_signed(rd(&mc), r);
    Ok(TickResult::Next)
}

pub fn remu(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = state.get_reg(rs1(&mc));
    let b = state.get_reg(rs2(&mc));
    let r = if b == 0 { a } else { a % b };
    state.set_reg(rd(&mc), r);
    Ok(TickResult::Next)
}

macro_rules! alu_i {
    ($name:ident, |$a:ident, $imm:ident| $body:expr) => {
        pub fn $name(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
            let $a = state.get_reg_signed(rs1(&mc));
            let $imm = mc.get_signed(fields::IMM_11_0);
            state.set_reg_signed(rd(&mc), $body);
            Ok(TickResult::Next)
        }
    };
}

alu_i!(addi, |a, imm| a.wrapping_add(imm));
alu_i!(xori, |a, imm| a ^ imm);
alu_i!(ori, |a, imm| a | imm);
alu_i!(andi, |a, imm| a & imm);

pub fn slti(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = state.get_reg_signed(rs1(&mc));
    let imm = mc.get_signed(fields::IMM_11_0);
    state.set_reg(rd(&mc), (a < imm) as u32);
    Ok(TickResult::Next)
}

pub fn sltiu(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = state.get_reg(rs1(&mc));
    let imm = mc.get_signed(fields::IMM_11_0) as u32;
    state.set_reg(rd(&mc), (compare_unsigned(a, imm) == std::cmp::Ordering::Less) as u32);
    Ok(TickResult::Next)
}

pub fn slli(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = state.get_reg(rs1(&mc));
    let shamt = mc.get(fields::SHAMT);
    state.set_reg(rd(&mc), a << shamt);
    Ok(TickResult::Next)
}

pub fn srli(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = state.get_reg(rs1(&mc));
    let shamt = mc.get(fields::SHAMT);
    state.set_reg(rd(&mc), a >> shamt);
    Ok(TickResult::Next)
}

pub fn srai(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let a = state.get_reg_signed(rs1(&mc));
    let shamt = mc.get(fields::SHAMT);
    state.set_reg_signed(rd(&mc), a >> shamt);
    Ok(TickResult::Next)
}

fn load_addr(mc: &MachineCode, state: &SimulatorState) -> u32 {
    let base = state.get_reg(rs1(mc));
    let imm = mc.get_signed(fields::IMM_11_0);
    base.wrapping_add(imm as u32)
}

pub fn lb(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let addr = load_addr(&mc, state);
    let value = state
        .memory()
        .read_byte(addr)
        .map_err(|_| AccessError { pc: state.pc(), addr, size: 1 })? as i8;
    state.set_reg_signed(rd(&mc), value as i32);
    Ok(TickResult::Next)
}

pub fn lbu(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let addr = load_addr(&mc, state);
    let value = state
        .memory()
        .read_byte(addr)
        .map_err(|_| AccessError { pc: state.pc(), addr, size: 1 })?;
    state.set_reg(rd(&mc), u32::from(value));
    Ok(TickResult::Next)
}

pub fn lh(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let addr = load_addr(&mc, state);
    let value = state
        .memory()
        .read_half(addr)
        .map_err(|_| AccessError { pc: state.pc(), addr, size: 2 })? as i16;
    state.set_reg_signed(rd(&mc), value as i32);
    Ok(TickResult::Next)
}

pub fn lhu(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let addr = load_addr(&mc, state);
    let value = state
        .memory()
        .read_half(addr)
        .map_err(|_| AccessError { pc: state.pc(), addr, size: 2 })?;
    state.set_reg(rd(&mc), u32::from(value));
    Ok(TickResult::Next)
}

pub fn lw(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let addr = load_addr(&mc, state);
    let value = state
        .memory()
        .read_word(addr)
        .map_err(|_| AccessError { pc: state.pc(), addr, size: 4 })?;
    state.set_reg(rd(&mc), value);
    Ok(TickResult::Next)
}

fn store_addr(mc: &MachineCode, state: &SimulatorState) -> u32 {
    let base = state.get_reg(rs1(mc));
    let bits = (mc.get(fields::IMM_11_5) << 5) | mc.get(fields::IMM_4_0);
    let imm = ((bits << 20) as i32) >> 20;
    base.wrapping_add(imm as u32)
}

pub fn sb(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let addr = store_addr(&mc, state);
    let value = state.get_reg(rs2(&mc)) as u8;
    state.mem_write_byte(addr, value)?;
    Ok(TickResult::Next)
}

pub fn sh(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let addr = store_addr(&mc, state);
    let value = state.get_reg(rs2(&mc)) as u16;
    state.mem_write_half(addr, value)?;
    Ok(TickResult::Next)
}

pub fn sw(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let addr = store_addr(&mc, state);
    let value = state.get_reg(rs2(&mc));
    state.mem_write_word(addr, value)?;
    Ok(TickResult::Next)
}

fn branch_target(mc: &MachineCode, pc: u32) -> u32 {
    let bits = (mc.get(fields::IMM_12) << 12)
        | (mc.get(fields::IMM_11_B) << 11)
        | (mc.get(fields::IMM_10_5) << 5)
        | (mc.get(fields::IMM_4_1) << 1);
    let offset = ((bits << 19) as i32) >> 19;
    pc.wrapping_add(offset as u32)
}

macro_rules! branch {
    ($name:ident, |$a:ident, $b:ident| $cond:expr) => {
        pub fn $name(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
            let $a = state.get_reg(rs1(&mc));
            let $b = state.get_reg(rs2(&mc));
            if $cond {
                Ok(TickResult::Jump(branch_target(&mc, state.pc())))
            } else {
                Ok(TickResult::Next)
            }
        }
    };
}

branch!(beq, |a, b| a == b);
branch!(bne, |a, b| a != b);
branch!(blt, |a, b| (a as i32) < (b as i32));
branch!(bge, |a, b| (a as i32) >= (b as i32));
branch!(bltu, |a, b| compare_unsigned(a, b) == std::cmp::Ordering::Less);
branch!(bgeu, |a, b| compare_unsigned(a, b) != std::cmp::Ordering::Less);

pub fn lui(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let imm = mc.get(fields::IMM_31_12);
    state.set_reg(rd(&mc), imm << 12);
    Ok(TickResult::Next)
}

pub fn auipc(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let imm = mc.get(fields::IMM_31_12);
    state.set_reg(rd(&mc), state.pc().wrapping_add(imm << 12));
    Ok(TickResult::Next)
}

fn jal_target(mc: &MachineCode, pc: u32) -> u32 {
    let bits = (mc.get(fields::IMM_20) << 20)
        | (mc.get(fields::IMM_19_12) << 12)
        | (mc.get(fields::IMM_11_J) << 11)
        | (mc.get(fields::IMM_10_1) << 1);
    let offset = ((bits << 11) as i32) >> 11;
    pc.wrapping_add(offset as u32)
}

pub fn jal(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let link = state.pc().wrapping_add(4);
    let target = jal_target(&mc, state.pc());
    state.set_reg(rd(&mc), link);
    Ok(TickResult::Jump(target))
}

pub fn jalr(mc: MachineCode, state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    let base = state.get_reg(rs1(&mc));
    let imm = mc.get_signed(fields::IMM_11_0);
    let link = state.pc().wrapping_add(4);
    let target = base.wrapping_add(imm as u32) & !1u32;
    state.set_reg(rd(&mc), link);
    Ok(TickResult::Jump(target))
}

/// Placeholder: real dispatch happens in `SimulatorState::step`, which
/// special-cases the `ecall` mnemonic so the ECALL layer can mutate I/O and
/// heap state through `&mut SimulatorState` rather than this narrower
/// `(MachineCode, &mut SimulatorState)` signature.
pub fn ecall(_mc: MachineCode, _state: &mut SimulatorState) -> Result<TickResult, AccessError> {
    Ok(TickResult::Next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_by_zero_matches_rv32m_semantics() {
        let mut mc = MachineCode::new(0);
        mc.set(fields::RS1, RegisterId::T0.number());
        mc.set(fields::RS2, RegisterId::T1.number());
        mc.set(fields::RD, RegisterId::T2.number());

        let mut state = crate::simulator::SimulatorState::new(
            Box::new(crate::memory::Memory::new(64)),
            64,
            0,
            64,
        );
        state.set_reg(RegisterId::T0, 42);
        state.set_reg(RegisterId::T1, 0);
        div(mc, &mut state).unwrap();
        assert_eq!(state.get_reg_signed(RegisterId::T2), -1);
    }

    #[test]
    fn div_overflow_matches_rv32m_semantics() {
        let mut mc = MachineCode::new(0);
        mc.set(fields::RS1, RegisterId::T0.number());
        mc.set(fields::RS2, RegisterId::T1.number());
        mc.set(fields::RD, RegisterId::T2.number());

        let mut state = crate::simulator::SimulatorState::new(
            Box::new(crate::memory::Memory::new(64)),
            64,
            0,
            64,
        );
        state.set_reg_signed(RegisterId::T0, i32::min_value());
        state.set_reg_signed(RegisterId::T1, -1);
        div(mc, &mut state).unwrap();
        assert_eq!(state.get_reg_signed(RegisterId::T2), i32::min_value());
    }

    #[test]
    fn unsigned_compare_treats_high_bit_as_magnitude() {
        assert_eq!(compare_unsigned(0xFFFF_FFFF, 1), std::cmp::Ordering::Greater);
    }
}

use std::collections::{HashSet, VecDeque};

use crate::constants::REGISTER_COUNT;
use crate::ecall::{self, EcallIo, EcallOutcome, StdIo};
use crate::error::AccessError;
use crate::machine_code::MachineCode;
use crate::memory::StorageMut;
use crate::register::Register;
use crate::registers::RegisterId;
use crate::table;

const DEFAULT_UNDO_CAPACITY: usize = 1024;

/// Why a run of steps stopped.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ExitCode {
    /// `ecall exit`/`ecall exit2`, carrying the exit status.
    Exited(i32),
    /// The program counter left the text segment without an explicit exit.
    OutOfText,
    /// No instruction format matched the fetched word.
    InvalidOpcode,
}

/// The control-flow effect of one executed instruction, reported by the
/// instruction table's `exec` function and applied by [`SimulatorState::step`].
pub enum TickResult {
    /// Advance the program counter by 4.
    Next,
    /// Set the program counter to an absolute address.
    Jump(u32),
    /// Terminate the program.
    Stop(ExitCode),
}

/// Outcome of a single [`SimulatorState::step`] call.
pub enum StepResult {
    Continue,
    Stopped(ExitCode),
}

/// Outcome of a [`SimulatorState::run`] call.
pub enum RunResult {
    Stopped(ExitCode),
    Breakpoint,
}

struct Diff {
    pc_before: u32,
    reg_writes: Vec<(u8, Register)>,
    mem_writes: Vec<(u32, Vec<u8>)>,
}

/// 32 general registers, a program counter, byte-addressable memory and a
/// bounded undo journal. The text segment occupies `[0, text_size)`; PC
/// leaving that range without an explicit `exit` ecall halts the program.
pub struct SimulatorState {
    registers: [Register; REGISTER_COUNT],
    pc: u32,
    memory: Box<dyn StorageMut>,
    text_size: u32,
    heap_break: u32,
    io: Box<dyn EcallIo>,
    line_buffer: Vec<u8>,
    undo: VecDeque<Diff>,
    undo_capacity: usize,
    breakpoints: HashSet<u32>,
    pending: Option<Diff>,
}

impl SimulatorState {
    pub fn new(memory: Box<dyn StorageMut>, text_size: u32, start_pc: u32, heap_break: u32) -> SimulatorState {
        SimulatorState {
            registers: [Register::default(); REGISTER_COUNT],
            pc: start_pc,
            memory,
            text_size,
            heap_break,
            io: Box::new(StdIo::default()),
            line_buffer: Vec::new(),
            undo: VecDeque::new(),
            undo_capacity: DEFAULT_UNDO_CAPACITY,
            breakpoints: HashSet::new(),
            pending: None,
        }
    }

    pub fn with_io(mut self, io: Box<dyn EcallIo>) -> SimulatorState {
        self.io = io;
        self
    }

    pub fn with_undo_capacity(mut self, capacity: usize) -> SimulatorState {
        self.undo_capacity = capacity;
        self
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn memory(&self) -> &dyn StorageMut {
        self.memory.as_ref()
    }

    pub fn memory_mut(&mut self) -> &mut dyn StorageMut {
        self.memory.as_mut()
    }

    pub fn io_mut(&mut self) -> &mut dyn EcallIo {
        self.io.as_mut()
    }

    pub fn heap_break(&self) -> u32 {
        self.heap_break
    }

    pub fn set_heap_break(&mut self, value: u32) {
        self.heap_break = value;
    }

    pub fn line_buffer(&self) -> &[u8] {
        &self.line_buffer
    }

    pub fn set_line_buffer(&mut self, buffer: Vec<u8>) {
        self.line_buffer = buffer;
    }

    pub fn breakpoints_mut(&mut self) -> &mut HashSet<u32> {
        &mut self.breakpoints
    }

    /// Reads a register; `x0` always reads as zero.
    pub fn get_reg(&self, id: RegisterId) -> u32 {
        if id == RegisterId::Zero {
            0
        } else {
            self.registers[id.number() as usize].u()
        }
    }

    pub fn get_reg_signed(&self, id: RegisterId) -> i32 {
        self.get_reg(id) as i32
    }

    /// Writes a register, recording its prior value in the in-flight undo
    /// diff. Writes to `x0` are silently dropped.
    pub fn set_reg(&mut self, id: RegisterId, value: u32) {
        if id == RegisterId::Zero {
            return;
        }
        let index = id.number() as u8;
        let old = self.registers[index as usize];
        if let Some(diff) = self.pending.as_mut() {
            diff.reg_writes.push((index, old));
        }
        self.registers[index as usize] = Register::from(value);
    }

    pub fn set_reg_signed(&mut self, id: RegisterId, value: i32) {
        self.set_reg(id, value as u32);
    }

    fn record_mem_write(&mut self, addr: u32, size: u32) -> Result<(), AccessError> {
        let old = self
            .memory
            .read_bytes(addr, size)
            .map_err(|_| AccessError { pc: self.pc, addr, size })?;
        if let Some(diff) = self.pending.as_mut() {
            diff.mem_writes.push((addr, old));
        }
        Ok(())
    }

    pub fn mem_write_byte(&mut self, addr: u32, value: u8) -> Result<(), AccessError> {
        self.record_mem_write(addr, 1)?;
        self.memory
            .write_byte(addr, value)
            .map_err(|_| AccessError { pc: self.pc, addr, size: 1 })
    }

    pub fn mem_write_half(&mut self, addr: u32, value: u16) -> Result<(), AccessError> {
        self.record_mem_write(addr, 2)?;
        self.memory
            .write_half(addr, value)
            .map_err(|_| AccessError { pc: self.pc, addr, size: 2 })
    }

    pub fn mem_write_word(&mut self, addr: u32, value: u32) -> Result<(), AccessError> {
        self.record_mem_write(addr, 4)?;
        self.memory
            .write_word(addr, value)
            .map_err(|_| AccessError { pc: self.pc, addr, size: 4 })
    }

    fn fetch(&self) -> Result<MachineCode, AccessError> {
        let word = self
            .memory
            .read_word(self.pc)
            .map_err(|_| AccessError { pc: self.pc, addr: self.pc, size: 4 })?;
        Ok(MachineCode::new(word))
    }

    /// Fetches, decodes, executes one instruction, and records an undo diff.
    pub fn step(&mut self) -> Result<StepResult, AccessError> {
        let pc_before = self.pc;
        let mc = self.fetch()?;

        self.pending = Some(Diff {
            pc_before,
            reg_writes: Vec::new(),
            mem_writes: Vec::new(),
        });

        let tick = match table::decode(&mc) {
            Some(entry) => {
                if entry.mnemonic == "ecall" {
                    match ecall::dispatch(self)? {
                        EcallOutcome::Continue => TickResult::Next,
                        EcallOutcome::Exit(status) => TickResult::Stop(ExitCode::Exited(status)),
                    }
                } else {
                    (entry.exec)(mc, self)?
                }
            }
            None => {
                log::debug!("pc {:#010x}: no instruction format matched word {:#010x}", pc_before, mc.bits());
                TickResult::Stop(ExitCode::InvalidOpcode)
            }
        };

        let outcome = match tick {
            TickResult::Next => {
                self.pc = pc_before.wrapping_add(4);
                if self.pc >= self.text_size {
                    StepResult::Stopped(ExitCode::OutOfText)
                } else {
                    StepResult::Continue
                }
            }
            TickResult::Jump(addr) => {
                self.pc = addr;
                if self.pc >= self.text_size {
                    StepResult::Stopped(ExitCode::OutOfText)
                } else {
                    StepResult::Continue
                }
            }
            TickResult::Stop(code) => StepResult::Stopped(code),
        };

        self.push_diff();
        Ok(outcome)
    }

    fn push_diff(&mut self) {
        if let Some(diff) = self.pending.take() {
            if self.undo.len() == self.undo_capacity {
                self.undo.pop_front();
            }
            self.undo.push_back(diff);
        }
    }

    /// Steps until a stop condition or breakpoint; returns without executing
    /// the instruction at a breakpoint address.
    pub fn run(&mut self) -> Result<RunResult, AccessError> {
        loop {
            if self.breakpoints.contains(&self.pc) {
                return Ok(RunResult::Breakpoint);
            }
            if let StepResult::Stopped(code) = self.step()? {
                return Ok(RunResult::Stopped(code));
            }
        }
    }

    /// Undoes the most recent step, if any. Returns `false` if the undo
    /// journal is empty.
    pub fn undo(&mut self) -> bool {
        let diff = match self.undo.pop_back() {
            Some(diff) => diff,
            None => return false,
        };

        self.pc = diff.pc_before;
        for (index, old) in diff.reg_writes.into_iter().rev() {
            self.registers[index as usize] = old;
        }
        for (addr, bytes) in diff.mem_writes.into_iter().rev() {
            let _ = self.memory.write_bytes(addr, &bytes);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;

    fn state_with(words: &[u32]) -> SimulatorState {
        let mut bytes = Vec::with_capacity(words.len() * 4);
        for w in words {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        let text_size = bytes.len() as u32;
        bytes.resize(bytes.len() + 256, 0);
        SimulatorState::new(Box::new(Memory::from(bytes)), text_size, 0, text_size + 64)
    }

    #[test]
    fn undo_restores_register_and_pc() {
        // addi x1, x0, 5
        let addi = crate::table::lookup("addi").unwrap();
        let mut mc = addi.format.fill();
        mc.set(crate::format::fields::RD, RegisterId::Ra.number());
        mc.set(crate::format::fields::RS1, RegisterId::Zero.number());
        mc.set(crate::format::fields::IMM_11_0, 5);

        let mut state = state_with(&[mc.bits()]);
        state.step().unwrap();
        assert_eq!(state.get_reg(RegisterId::Ra), 5);
        assert_eq!(state.pc(), 4);

        assert!(state.undo());
        assert_eq!(state.get_reg(RegisterId::Ra), 0);
        assert_eq!(state.pc(), 0);
    }

    #[test]
    fn out_of_text_halts() {
        let mut state = state_with(&[]);
        state.breakpoints_mut().clear();
        let result = state.step();
        assert!(result.is_err() || matches!(result, Ok(StepResult::Stopped(_))));
    }
}

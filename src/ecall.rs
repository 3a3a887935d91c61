use std::io::{self, Write};

use crate::error::AccessError;
use crate::registers::RegisterId;
use crate::simulator::SimulatorState;

/// Environment-call numbers recognized in `a7`, per `§6.4`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Ecall {
    PrintInt,
    PrintString,
    ReadString,
    Sbrk,
    Exit,
    PrintChar,
    Exit2,
    FillLineBuffer,
}

impl Ecall {
    pub fn from_code(code: u32) -> Option<Ecall> {
        match code {
            1 => Some(Ecall::PrintInt),
            4 => Some(Ecall::PrintString),
            8 => Some(Ecall::ReadString),
            9 => Some(Ecall::Sbrk),
            10 => Some(Ecall::Exit),
            11 => Some(Ecall::PrintChar),
            17 => Some(Ecall::Exit2),
            18 => Some(Ecall::FillLineBuffer),
            _ => None,
        }
    }
}

/// What an ECALL does to control flow: either execution continues normally,
/// or the program terminates with the given status.
pub enum EcallOutcome {
    Continue,
    Exit(i32),
}

/// Host-provided console, abstracted so the simulator can be driven
/// headlessly in tests.
pub trait EcallIo {
    fn print_int(&mut self, value: i32);
    fn print_string(&mut self, bytes: &[u8]);
    fn print_char(&mut self, byte: u8);
    /// Reads one line (without its terminator) from the input source.
    /// Returns `None` at end of input.
    fn read_line(&mut self) -> Option<Vec<u8>>;
}

/// The default [`EcallIo`], backed by the process's real stdin/stdout.
#[derive(Default)]
pub struct StdIo;

impl EcallIo for StdIo {
    fn print_int(&mut self, value: i32) {
        print!("{}", value);
        let _ = io::stdout().flush();
    }

    fn print_string(&mut self, bytes: &[u8]) {
        let _ = io::stdout().write_all(bytes);
        let _ = io::stdout().flush();
    }

    fn print_char(&mut self, byte: u8) {
        let _ = io::stdout().write_all(&[byte]);
        let _ = io::stdout().flush();
    }

    fn read_line(&mut self) -> Option<Vec<u8>> {
        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                Some(line.into_bytes())
            }
            Err(_) => None,
        }
    }
}

const PRINT_STRING_MAX: u32 = 1 << 20;

/// Dispatches on the environment-call number in `a7`, per `§6.4`.
pub fn dispatch(state: &mut SimulatorState) -> Result<EcallOutcome, AccessError> {
    let code = state.get_reg(RegisterId::A7);
    let pc = state.pc();

    match Ecall::from_code(code) {
        Some(Ecall::PrintInt) => {
            let value = state.get_reg(RegisterId::A0) as i32;
            state.io_mut().print_int(value);
            Ok(EcallOutcome::Continue)
        }
        Some(Ecall::PrintString) => {
            let mut addr = state.get_reg(RegisterId::A0);
            let mut bytes = Vec::new();
            loop {
                if bytes.len() as u32 >= PRINT_STRING_MAX {
                    break;
                }
                let byte = state
                    .memory()
                    .read_byte(addr)
                    .map_err(|_| AccessError { pc, addr, size: 1 })?;
                if byte == 0 {
                    break;
                }
                bytes.push(byte);
                addr = addr.wrapping_add(1);
            }
            state.io_mut().print_string(&bytes);
            Ok(EcallOutcome::Continue)
        }
        Some(Ecall::PrintChar) => {
            let byte = state.get_reg(RegisterId::A0) as u8;
            state.io_mut().print_char(byte);
            Ok(EcallOutcome::Continue)
        }
        Some(Ecall::Sbrk) => {
            let delta = state.get_reg(RegisterId::A0) as i32;
            let previous = state.heap_break();
            let next = (previous as i64 + i64::from(delta)) as u32;
            state.set_heap_break(next);
            state.set_reg(RegisterId::A0, previous);
            Ok(EcallOutcome::Continue)
        }
        Some(Ecall::Exit) => Ok(EcallOutcome::Exit(0)),
        Some(Ecall::Exit2) => {
            let status = state.get_reg(RegisterId::A0) as i32;
            Ok(EcallOutcome::Exit(status))
        }
        Some(Ecall::FillLineBuffer) => {
            match state.io_mut().read_line() {
                Some(line) => {
                    let len = line.len() as u32;
                    state.set_line_buffer(line);
                    state.set_reg(RegisterId::A0, len);
                }
                None => state.set_reg(RegisterId::A0, u32::max_value()),
            }
            Ok(EcallOutcome::Continue)
        }
        Some(Ecall::ReadString) => {
            let dest = state.get_reg(RegisterId::A1);
            let max_len = state.get_reg(RegisterId::A2) as usize;
            let line = state.line_buffer().to_vec();
            let count = line.len().min(max_len);
            for (i, byte) in line[..count].iter().enumerate() {
                let addr = dest.wrapping_add(i as u32);
                state
                    .memory_mut()
                    .write_byte(addr, *byte)
                    .map_err(|_| AccessError { pc, addr, size: 1 })?;
            }
            state.set_reg(RegisterId::A0, count as u32);
            Ok(EcallOutcome::Continue)
        }
        None => Ok(EcallOutcome::Continue),
    }
}

//! Linker and on-disk container format for linked RV32IM programs.
//!
//! [`linker::link`] turns an ordered list of unlinked `rv32im_asm::Program`s
//! into one [`LinkedProgram`]: every label translated to an absolute
//! address, every relocation applied. [`LinkedProgram::build_image`] then
//! lays the result out as a single byte-addressable memory image following
//! the memory map in `rv32im::constants`, ready to hand to a
//! [`rv32im::SimulatorState`].

pub mod linker;

use byteorder::{ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use rv32im::memory::SparseMemory;
use rv32im::simulator::SimulatorState;
use rv32im::{MachineCode, Storage, StorageMut};

pub use linker::LinkError;

type Endian = util::Endian;

/// The linker's output: one relocated program, ready for the simulator.
///
/// `debug_info` is parallel to `insts`: entry `i` names the compilation unit
/// and original source line that produced `insts[i]`.
#[derive(Debug, PartialEq)]
pub struct LinkedProgram {
    pub insts: Vec<MachineCode>,
    pub rodata: Vec<u8>,
    pub data: Vec<u8>,
    pub start_pc: u32,
    pub debug_info: Vec<(String, u32, String)>,
}

impl LinkedProgram {
    pub fn text_size(&self) -> u32 {
        self.insts.len() as u32 * rv32im::INSTRUCTION_BYTES
    }

    /// Looks up the originating compilation unit, line number and source
    /// text for the instruction at `pc`, if `pc` names one.
    pub fn debug_at(&self, pc: u32) -> Option<&(String, u32, String)> {
        let index = (pc / rv32im::INSTRUCTION_BYTES) as usize;
        self.debug_info.get(index)
    }

    fn text_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.insts.len() * 4);
        for mc in &self.insts {
            bytes.extend_from_slice(&mc.bits().to_le_bytes());
        }
        bytes
    }

    /// Lays `.text`, `.rodata` and `.data` out in one sparse image per the
    /// memory map in `§6.1`: text at `TEXT_BEGIN`, rodata at `CONST_BEGIN`,
    /// data at `STATIC_BEGIN`. The image is addressable through `STACK_END`
    /// so the stack pointer can be initialized to the top of a valid range,
    /// but only the pages the three segments actually touch are allocated.
    pub fn build_image(&self) -> SparseMemory {
        let mut memory = SparseMemory::new(rv32im::STACK_END);

        let text = self.text_bytes();
        memory.write_bytes(0, &text).expect("text segment fits the address space");

        memory
            .write_bytes(rv32im::CONST_BEGIN, &self.rodata)
            .expect("rodata segment fits the address space");

        memory
            .write_bytes(rv32im::STATIC_BEGIN, &self.data)
            .expect("data segment fits the address space");

        memory
    }

    /// Builds a ready-to-run [`SimulatorState`] over this program's memory
    /// image, with the heap break set just past `.data` (or `HEAP_BEGIN`,
    /// whichever is larger) and the program counter at `start_pc`.
    pub fn into_simulator(self) -> SimulatorState {
        let image = self.build_image();
        let data_end = rv32im::STATIC_BEGIN + self.data.len() as u32;
        let heap_break = data_end.max(rv32im::HEAP_BEGIN);
        let mut state = SimulatorState::new(Box::new(image), self.text_size(), self.start_pc, heap_break);
        state.breakpoints_mut().clear();
        state
    }
}

/// Reads a linked program from the on-disk container format: three
/// length-prefixed sections (text, rodata, data) followed by the start PC,
/// little-endian throughout. Debug info is not part of the container; a
/// caller that needs it keeps the `LinkedProgram` this was built from, or
/// loads a separate source map as `rv32im-cli` does.
pub fn read<R: Read>(reader: &mut R) -> std::io::Result<LinkedProgram> {
    let text_len = reader.read_u32::<Endian>()?;
    let rodata_len = reader.read_u32::<Endian>()?;
    let data_len = reader.read_u32::<Endian>()?;
    let start_pc = reader.read_u32::<Endian>()?;

    let mut text = vec![0u8; text_len as usize];
    reader.read_exact(&mut text)?;
    let insts = text
        .chunks_exact(4)
        .map(|word| MachineCode::new(Endian::read_u32_from(word)))
        .collect();

    let mut rodata = vec![0u8; rodata_len as usize];
    reader.read_exact(&mut rodata)?;
    let mut data = vec![0u8; data_len as usize];
    reader.read_exact(&mut data)?;

    Ok(LinkedProgram { insts, rodata, data, start_pc, debug_info: Vec::new() })
}

pub fn write<W: Write>(writer: &mut W, program: &LinkedProgram) -> std::io::Result<()> {
    let text = program.text_bytes();
    writer.write_u32::<Endian>(text.len() as u32)?;
    writer.write_u32::<Endian>(program.rodata.len() as u32)?;
    writer.write_u32::<Endian>(program.data.len() as u32)?;
    writer.write_u32::<Endian>(program.start_pc)?;
    writer.write_all(&text)?;
    writer.write_all(&program.rodata)?;
    writer.write_all(&program.data)?;
    Ok(())
}

trait ReadU32LeExt {
    fn read_u32_from(bytes: &[u8]) -> u32;
}

impl ReadU32LeExt for Endian {
    fn read_u32_from(bytes: &[u8]) -> u32 {
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

pub trait ReadLinkedExt: Read + Sized {
    fn read_linked(&mut self) -> std::io::Result<LinkedProgram> {
        read(self)
    }
}

impl<R: Read + Sized> ReadLinkedExt for R {}

pub trait WriteLinkedExt: Write + Sized {
    fn write_linked(&mut self, program: &LinkedProgram) -> std::io::Result<()> {
        write(self, program)
    }
}

impl<W: Write + Sized> WriteLinkedExt for W {}

pub fn read_file<P: AsRef<Path>>(path: P) -> std::io::Result<LinkedProgram> {
    BufReader::new(File::open(path)?).read_linked()
}

pub fn write_file<P: AsRef<Path>>(path: P, program: &LinkedProgram) -> std::io::Result<()> {
    BufWriter::new(File::create(path)?).write_linked(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LinkedProgram {
        let mut mc = MachineCode::new(0);
        mc.set(rv32im::format::fields::OPCODE, 0x13);
        LinkedProgram {
            insts: vec![mc],
            rodata: vec![1, 2, 3],
            data: vec![4, 5, 6, 7],
            start_pc: 0,
            debug_info: vec![("unit".to_string(), 1, "addi x1, x0, 0".to_string())],
        }
    }

    #[test]
    fn container_round_trips() {
        let program = sample();
        let mut buf = Vec::new();
        write(&mut buf, &program).unwrap();
        let read_back = read(&mut &buf[..]).unwrap();
        assert_eq!(read_back.insts, program.insts);
        assert_eq!(read_back.rodata, program.rodata);
        assert_eq!(read_back.data, program.data);
        assert_eq!(read_back.start_pc, program.start_pc);
    }

    #[test]
    fn build_image_places_segments_at_their_base_addresses() {
        let program = sample();
        let image = program.build_image();
        assert_eq!(image.read_word(0).unwrap(), program.insts[0].bits());
        assert_eq!(image.read_byte(rv32im::CONST_BEGIN).unwrap(), 1);
        assert_eq!(image.read_byte(rv32im::STATIC_BEGIN).unwrap(), 4);
    }
}

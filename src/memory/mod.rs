use byteorder::ByteOrder;
use thiserror::Error;

use crate::constants;

pub mod composite;
pub mod io;
pub mod sparse;

pub use composite::{CompositeMemory, MountError};
pub use io::{DelegateIOHandler, IOHandler, IOMemory};
pub use sparse::SparseMemory;

type Endian = util::Endian;

/// Raised by a [`Storage`]/[`StorageMut`] implementation when the requested
/// range is not addressable. Carries no `pc`; the simulator adds that when it
/// turns this into an [`crate::AccessError`].
#[derive(Error, Clone, Copy, PartialEq, Eq, Debug)]
#[error("address {addr:#010x} (size {size}) is out of range")]
pub struct StorageError {
    pub addr: u32,
    pub size: u32,
}

/// A memory storage unit with basic read operations.
///
/// `read_bytes` returns an owned copy rather than a borrowed slice so that
/// implementations backed by non-contiguous storage (see [`SparseMemory`])
/// can serve a read that straddles two backing pages.
///
/// # Examples
/// ```
/// use rv32im::{Storage, Memory};
///
/// let memory = Memory::new(16);
/// assert_eq!(memory.length(), 16);
/// ```
pub trait Storage {
    /// Total addressable length in bytes.
    fn length(&self) -> u32;

    /// Whether `[address..address+length]` lies within this storage.
    fn check_range(&self, address: u32, length: u32) -> bool;

    /// Reads `length` bytes starting at `address` into a freshly-owned buffer.
    fn read_bytes(&self, address: u32, length: u32) -> Result<Vec<u8>, StorageError>;

    fn read(&self, address: u32, size: u32) -> Result<u32, StorageError> {
        assert!((1..=4).contains(&size));
        Ok(Endian::read_uint(&self.read_bytes(address, size)?, size as usize) as u32)
    }

    fn read_byte(&self, address: u32) -> Result<u8, StorageError> {
        Ok(self.read(address, constants::BYTE_BYTES)? as u8)
    }

    fn read_half(&self, address: u32) -> Result<u16, StorageError> {
        Ok(self.read(address, constants::HALF_BYTES)? as u16)
    }

    fn read_word(&self, address: u32) -> Result<u32, StorageError> {
        self.read(address, constants::WORD_BYTES)
    }
}

/// A mutable memory storage unit.
pub trait StorageMut: Storage {
    /// Writes `bytes` starting at `address`.
    fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> Result<(), StorageError>;

    fn write(&mut self, address: u32, size: u32, value: u32) -> Result<(), StorageError> {
        assert!((1..=4).contains(&size));
        let mut buf = [0u8; 4];
        Endian::write_uint(&mut buf, u64::from(value), size as usize);
        self.write_bytes(address, &buf[..size as usize])
    }

    fn write_byte(&mut self, address: u32, value: u8) -> Result<(), StorageError> {
        self.write(address, constants::BYTE_BYTES, u32::from(value))
    }

    fn write_half(&mut self, address: u32, value: u16) -> Result<(), StorageError> {
        self.write(address, constants::HALF_BYTES, u32::from(value))
    }

    fn write_word(&mut self, address: u32, value: u32) -> Result<(), StorageError> {
        self.write(address, constants::WORD_BYTES, value)
    }
}

/// A contiguous block of memory; the default implementation of [`Storage`]/[`StorageMut`].
///
/// Used where an address range is known to be small and fully populated
/// (test fixtures, individually mounted [`CompositeMemory`] fragments). The
/// simulator's full address space uses [`SparseMemory`] instead.
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    pub fn new(length: u32) -> Memory {
        Memory {
            data: vec![0; length as usize],
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data[..]
    }
}

impl Storage for Memory {
    fn length(&self) -> u32 {
        self.data.len() as u32
    }

    fn check_range(&self, address: u32, length: u32) -> bool {
        let len = self.data.len() as u32;
        address <= len && address.saturating_add(length) <= len
    }

    fn read_bytes(&self, address: u32, length: u32) -> Result<Vec<u8>, StorageError> {
        if self.check_range(address, length) {
            Ok(self.data[address as usize..(address + length) as usize].to_vec())
        } else {
            Err(StorageError { addr: address, size: length })
        }
    }
}

impl StorageMut for Memory {
    fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> Result<(), StorageError> {
        let length = bytes.len() as u32;
        if self.check_range(address, length) {
            self.data[address as usize..(address + length) as usize].copy_from_slice(bytes);
            Ok(())
        } else {
            Err(StorageError { addr: address, size: length })
        }
    }
}

impl<'a> From<&'a [u8]> for Memory {
    fn from(s: &'a [u8]) -> Memory {
        Memory { data: Vec::from(s) }
    }
}

impl From<Vec<u8>> for Memory {
    fn from(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_round_trip() {
        let mut memory = Memory::new(4);
        memory.write_word(0, 0xDEAD_BEEF).unwrap();
        assert_eq!(memory.read_word(0).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn out_of_range_read_errors() {
        let memory = Memory::new(4);
        assert!(memory.read(4, 1).is_err());
    }

    #[test]
    fn partial_width_reads() {
        let memory = Memory::from(&[1u8, 2, 3, 4][..]);
        assert_eq!(memory.read(1, 2).unwrap(), 0x0302);
        assert_eq!(memory.read_byte(3).unwrap(), 4);
    }
}

use byteorder::ByteOrder;

use super::{Storage, StorageError, StorageMut};

/// Receives a callback whenever a write is accepted into an [`IOMemory`]
/// fragment, and may veto writes before they happen.
pub trait IOHandler {
    fn can_write(&self, memory: &[u8], address: u32, size: u32) -> bool;
    fn on_write(&self, memory: &[u8], address: u32, size: u32);
}

/// A memory fragment that forwards writes to an [`IOHandler`] before (to
/// veto) and after (to react) they land, used to back memory-mapped I/O
/// devices such as a console output port.
pub struct IOMemory<H: IOHandler> {
    memory: Vec<u8>,
    handler: H,
}

impl<H: IOHandler> IOMemory<H> {
    pub fn new(size: u32, handler: H) -> IOMemory<H> {
        IOMemory {
            memory: vec![0; size as usize],
            handler,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.memory
    }
}

impl<H: IOHandler> Storage for IOMemory<H> {
    fn length(&self) -> u32 {
        self.memory.len() as u32
    }

    fn check_range(&self, address: u32, length: u32) -> bool {
        let len = self.memory.len() as u32;
        address <= len && address.saturating_add(length) <= len
    }

    fn read_bytes(&self, address: u32, length: u32) -> Result<Vec<u8>, StorageError> {
        if self.check_range(address, length) {
            Ok(self.memory[address as usize..(address + length) as usize].to_vec())
        } else {
            Err(StorageError { addr: address, size: length })
        }
    }
}

impl<H: IOHandler> StorageMut for IOMemory<H> {
    /// Goes through [`write`](StorageMut::write) so the handler's veto/react
    /// callbacks still fire for byte- and half-sized writes.
    fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> Result<(), StorageError> {
        let size = bytes.len() as u32;
        let value = util::Endian::read_uint(bytes, bytes.len()) as u32;
        self.write(address, size, value)
    }

    fn write(&mut self, address: u32, size: u32, value: u32) -> Result<(), StorageError> {
        if self.handler.can_write(&self.memory, address, size) {
            let byte_size = size as usize;
            let addr = address as usize;
            if !self.check_range(address, size) {
                return Err(StorageError { addr: address, size });
            }
            util::Endian::write_uint(
                &mut self.memory[addr..addr + byte_size],
                u64::from(value),
                byte_size,
            );
            self.handler.on_write(&self.memory, address, size);
        }
        Ok(())
    }
}

/// Adapts a pair of closures to [`IOHandler`], avoiding a bespoke struct for
/// one-off devices.
pub struct DelegateIOHandler<FC, FO>
where
    FC: Fn(&[u8], u32, u32) -> bool,
    FO: Fn(&[u8], u32, u32),
{
    can_write: FC,
    on_write: FO,
}

impl<FC, FO> DelegateIOHandler<FC, FO>
where
    FC: Fn(&[u8], u32, u32) -> bool,
    FO: Fn(&[u8], u32, u32),
{
    pub fn new(can_write: FC, on_write: FO) -> DelegateIOHandler<FC, FO> {
        DelegateIOHandler { can_write, on_write }
    }
}

impl<FC, FO> IOHandler for DelegateIOHandler<FC, FO>
where
    FC: Fn(&[u8], u32, u32) -> bool,
    FO: Fn(&[u8], u32, u32),
{
    fn can_write(&self, memory: &[u8], address: u32, size: u32) -> bool {
        (self.can_write)(memory, address, size)
    }

    fn on_write(&self, memory: &[u8], address: u32, size: u32) {
        (self.on_write)(memory, address, size)
    }
}

#[cfg(test)]
mod tests {
    use super::{DelegateIOHandler, IOMemory};
    use crate::memory::{Storage, StorageMut};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn write_callback_observes_address_and_value() {
        let result = Rc::new(Cell::new((0u32, 0u32)));
        let rref = Rc::clone(&result);

        let handler = DelegateIOHandler::new(
            |_, _, _| true,
            move |memory, address, size| {
                let value = util::Endian::read_uint(
                    &memory[address as usize..(address + size) as usize],
                    size as usize,
                ) as u32;
                rref.set((address, value));
            },
        );

        let mut memory = IOMemory::new(16, handler);
        memory.write(4, 4, 923).unwrap();

        assert_eq!(result.get(), (4, 923));
    }

    #[test]
    fn veto_skips_write() {
        let handler = DelegateIOHandler::new(|_, _, _| false, |_, _, _| {});
        let mut memory = IOMemory::new(16, handler);
        memory.write(0, 4, 42).unwrap();
        assert_eq!(memory.read(0, 4).unwrap(), 0);
    }
}

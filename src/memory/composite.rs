use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use super::{Storage, StorageError, StorageMut};

/// Error type for [`CompositeMemory::mount`].
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum MountError {
    /// Mounting would have resulted in intersecting fragments.
    FragmentIntersection,
    /// Another fragment has already been mounted under the same key.
    KeyAlreadyExists,
}

type AddressedFragment = (u32, Box<dyn StorageMut>);

/// A [`StorageMut`] assembled out of independently owned "fragments" mounted
/// at fixed addresses, rather than one contiguous block.
///
/// Used to back the linked program's text/rodata/data image with a single
/// address space while keeping each segment a separately owned buffer.
#[derive(Default)]
pub struct CompositeMemory {
    fragments: Vec<AddressedFragment>,
    registry: HashMap<String, usize>,
}

impl CompositeMemory {
    pub fn new() -> CompositeMemory {
        Default::default()
    }

    /// Mounts `fragment` at `address`, registered under `key`.
    ///
    /// # Panics
    /// Panics if `address + fragment.length()` overflows `u32`.
    pub fn mount<S: StorageMut + 'static>(
        &mut self,
        address: u32,
        key: &str,
        fragment: S,
    ) -> Result<(), MountError> {
        if self.registry.contains_key(key) {
            return Err(MountError::KeyAlreadyExists);
        }

        let upper_bound = address
            .checked_add(fragment.length())
            .expect("fragment upper bound exceeds valid address range");
        let index = self.find_mount_index(address, upper_bound)?;

        self.fragments.insert(index, (address, Box::new(fragment)));
        self.registry.insert(key.to_string(), index);

        Ok(())
    }

    pub fn unmount(&mut self, key: &str) -> Option<Box<dyn StorageMut>> {
        self.registry
            .remove(key)
            .map(|i| self.fragments.remove(i).1)
    }

    fn find_mount_index(&self, address: u32, upper_bound: u32) -> Result<usize, MountError> {
        for (i, (frag_addr, frag)) in self.fragments.iter().enumerate() {
            let frag_upper = frag_addr + frag.length();
            if *frag_addr >= address {
                return if upper_bound > *frag_addr {
                    Err(MountError::FragmentIntersection)
                } else {
                    Ok(i)
                };
            } else if frag_upper > address {
                return Err(MountError::FragmentIntersection);
            }
        }
        Ok(self.fragments.len())
    }

    fn get_index(&self, address: u32) -> Option<usize> {
        match self.fragments.binary_search_by_key(&address, |e| e.0) {
            Ok(i) => Some(i),
            Err(i) if i > 0 => Some(i - 1),
            Err(_) => None,
        }
    }

    fn get_fragment(&self, address: u32) -> Option<(&dyn StorageMut, u32)> {
        let index = self.get_index(address)?;
        let (frag_addr, fragment) = self.fragments.get(index)?;
        Some((fragment.deref(), address - frag_addr))
    }

    fn get_fragment_mut(&mut self, address: u32) -> Option<(&mut dyn StorageMut, u32)> {
        let index = self.get_index(address)?;
        let (frag_addr, fragment) = self.fragments.get_mut(index)?;
        let local = address - *frag_addr;
        Some((fragment.deref_mut(), local))
    }
}

impl Storage for CompositeMemory {
    fn length(&self) -> u32 {
        match self.fragments.last() {
            Some((address, frag)) => address + frag.length(),
            None => 0,
        }
    }

    fn check_range(&self, address: u32, length: u32) -> bool {
        match self.get_fragment(address) {
            Some((fragment, local_address)) => fragment.check_range(local_address, length),
            None => false,
        }
    }

    fn read_bytes(&self, address: u32, length: u32) -> Result<Vec<u8>, StorageError> {
        let (fragment, local_address) = self
            .get_fragment(address)
            .ok_or(StorageError { addr: address, size: length })?;
        fragment.read_bytes(local_address, length)
    }
}

impl StorageMut for CompositeMemory {
    fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> Result<(), StorageError> {
        let length = bytes.len() as u32;
        let (fragment, local_address) = self
            .get_fragment_mut(address)
            .ok_or(StorageError { addr: address, size: length })?;
        fragment.write_bytes(local_address, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;

    #[test]
    fn find_mount_index() {
        let mut memory = CompositeMemory::new();
        assert_eq!(memory.find_mount_index(0, 16), Ok(0));
        assert_eq!(memory.mount(0, "f0", Memory::new(16)), Ok(()));
        assert_eq!(
            memory.find_mount_index(8, 24),
            Err(MountError::FragmentIntersection)
        );
        assert_eq!(memory.mount(20, "f1", Memory::new(16)), Ok(()));
        assert_eq!(memory.find_mount_index(16, 20), Ok(1));
        assert_eq!(
            memory.find_mount_index(15, 20),
            Err(MountError::FragmentIntersection)
        );
    }

    #[test]
    fn access_mounted_fragment() {
        let mut comp = CompositeMemory::new();
        assert_eq!(comp.mount(0, "f0", Memory::new(64)), Ok(()));
        assert_eq!(comp.mount(0xF1ED_0000, "f1", Memory::new(1)), Ok(()));
        assert!(comp.write_byte(0xF1ED_0001, 1).is_err());
        assert!(comp.write_byte(0xF1ED_0000, 1).is_ok());
        let fragment = comp.unmount("f1").expect("fragment was mounted");
        assert_eq!(fragment.read_byte(0).unwrap(), 1);
    }
}

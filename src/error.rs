use thiserror::Error;

/// A runtime memory access outside the addressable range, raised by the
/// simulator's fetch/load/store paths.
#[derive(Error, Clone, Copy, PartialEq, Eq, Debug)]
#[error("access error at pc {pc:#010x}: address {addr:#010x} (size {size}) is not mapped")]
pub struct AccessError {
    pub pc: u32,
    pub addr: u32,
    pub size: u32,
}

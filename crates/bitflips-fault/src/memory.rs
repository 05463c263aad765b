//! Guest memory access for flip events.
//!
//! The engine never dereferences host pointers.  Every read and write of a
//! target word goes through [`FlipMemory`], which the host supplies.  The
//! crate implements it for `vm-memory`'s [`GuestMemoryMmap`], so an
//! mmap-backed guest can be handed to the engine directly.
//!
//! Words are accessed in the guest's native (little-endian) byte order
//! with widths of 1, 2, 4 or 8 bytes.

use thiserror::Error;
use vm_memory::{Bytes, GuestAddress, GuestMemoryMmap};

/// Errors from guest memory access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("failed to read {width} bytes at {address:#x}")]
    Read { address: u64, width: u32 },

    #[error("failed to write {width} bytes at {address:#x}")]
    Write { address: u64, width: u32 },

    #[error("failed to map {size} bytes of guest memory")]
    Create { size: usize },

    #[error("unsupported access width {0}")]
    Width(u32),

    #[error("address {address:#x} + {len} overflows the address space")]
    Overflow { address: u64, len: u64 },
}

/// Byte-addressable memory that flip events are applied to.
pub trait FlipMemory {
    /// Read a `width`-byte word at `address`, zero-extended to `u64`.
    fn read_word(&self, address: u64, width: u32) -> Result<u64, MemoryError>;

    /// Write the low `width` bytes of `value` at `address`.
    fn write_word(&mut self, address: u64, width: u32, value: u64) -> Result<(), MemoryError>;

    /// Read up to `buf.len()` bytes at `address`.  Returns the number of
    /// bytes actually read; a short read stops at the end of mapped memory.
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> Result<usize, MemoryError>;
}

impl FlipMemory for GuestMemoryMmap {
    fn read_word(&self, address: u64, width: u32) -> Result<u64, MemoryError> {
        let addr = GuestAddress(address);
        let err = |_| MemoryError::Read { address, width };
        match width {
            1 => self.read_obj::<u8>(addr).map(u64::from).map_err(err),
            2 => self.read_obj::<u16>(addr).map(u64::from).map_err(err),
            4 => self.read_obj::<u32>(addr).map(u64::from).map_err(err),
            8 => self.read_obj::<u64>(addr).map_err(err),
            other => Err(MemoryError::Width(other)),
        }
    }

    fn write_word(&mut self, address: u64, width: u32, value: u64) -> Result<(), MemoryError> {
        let addr = GuestAddress(address);
        let err = |_| MemoryError::Write { address, width };
        match width {
            1 => self.write_obj(value as u8, addr).map_err(err),
            2 => self.write_obj(value as u16, addr).map_err(err),
            4 => self.write_obj(value as u32, addr).map_err(err),
            8 => self.write_obj(value, addr).map_err(err),
            other => Err(MemoryError::Width(other)),
        }
    }

    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> Result<usize, MemoryError> {
        let len = buf.len() as u64;
        address
            .checked_add(len)
            .ok_or(MemoryError::Overflow { address, len })?;
        // `read` stops at the end of the containing region.
        self.read(buf, GuestAddress(address))
            .map_err(|_| MemoryError::Read {
                address,
                width: len as u32,
            })
    }
}

/// Create an mmap-backed guest memory covering `[base, base + size)`.
pub fn anonymous_guest_memory(base: u64, size: usize) -> Result<GuestMemoryMmap, MemoryError> {
    base.checked_add(size as u64).ok_or(MemoryError::Overflow {
        address: base,
        len: size as u64,
    })?;
    GuestMemoryMmap::from_ranges(&[(GuestAddress(base), size)])
        .map_err(|_| MemoryError::Create { size })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem() -> GuestMemoryMmap {
        anonymous_guest_memory(0x1000, 0x1000).unwrap()
    }

    #[test]
    fn words_round_trip_at_each_width() {
        let mut m = mem();
        m.write_word(0x1000, 1, 0xAB).unwrap();
        m.write_word(0x1002, 2, 0xBEEF).unwrap();
        m.write_word(0x1004, 4, 0xDEAD_BEEF).unwrap();
        m.write_word(0x1008, 8, 0x0123_4567_89AB_CDEF).unwrap();

        assert_eq!(m.read_word(0x1000, 1).unwrap(), 0xAB);
        assert_eq!(m.read_word(0x1002, 2).unwrap(), 0xBEEF);
        assert_eq!(m.read_word(0x1004, 4).unwrap(), 0xDEAD_BEEF);
        assert_eq!(m.read_word(0x1008, 8).unwrap(), 0x0123_4567_89AB_CDEF);
    }

    #[test]
    fn write_truncates_to_width() {
        let mut m = mem();
        m.write_word(0x1010, 8, 0).unwrap();
        m.write_word(0x1010, 2, 0xFFFF_1234).unwrap();
        assert_eq!(m.read_word(0x1010, 8).unwrap(), 0x1234);
    }

    #[test]
    fn little_endian_layout() {
        let mut m = mem();
        m.write_word(0x1020, 4, 0x0403_0201).unwrap();
        assert_eq!(m.read_word(0x1020, 1).unwrap(), 0x01);
        assert_eq!(m.read_word(0x1023, 1).unwrap(), 0x04);
    }

    #[test]
    fn unmapped_address_is_an_error() {
        let mut m = mem();
        assert_eq!(
            m.read_word(0x10, 4),
            Err(MemoryError::Read { address: 0x10, width: 4 })
        );
        assert!(m.write_word(0x3000, 8, 1).is_err());
    }

    #[test]
    fn unsupported_width_is_an_error() {
        let m = mem();
        assert_eq!(m.read_word(0x1000, 3), Err(MemoryError::Width(3)));
    }

    #[test]
    fn read_bytes_is_short_at_region_end() {
        let m = mem();
        let mut buf = [0u8; 16];
        let n = m.read_bytes(0x1FF8, &mut buf).unwrap();
        assert_eq!(n, 8);
    }
}

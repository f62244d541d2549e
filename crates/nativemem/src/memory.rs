// RebelDB™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// memory.rs:

//! Native Memory Abstraction
//!
//! A managed runtime that wants to hand out "native" pointers without owning
//! real off-heap memory talks to an implementation of [`NativeMemory`]. The
//! trait is object safe, so a host picks one backend at configuration time
//! (see [`crate::registry`]) and keeps it as a `Box<dyn NativeMemory>`.
//!
//! # Backends
//!
//! ## Chunked memory
//!
//! [`crate::chunked::ChunkedMemory`] backs every allocation with its own
//! zero-initialised byte region and encodes `(chunk index, offset)` into the
//! 64-bit address (see [`crate::address`]).
//!
//! ## Instrumented memory
//!
//! [`crate::instrumented::InstrumentedMemory`] wraps any other backend and
//! traces allocator traffic.
//!
//! # Access modes
//!
//! Every scalar access takes an [`AccessMode`]. `Plain` accesses are not
//! ordered and may be unaligned. The three other modes are all mapped to the
//! strongest ordering available for the width and require natural alignment:
//! callers asking for acquire/release get at least that much, never less.
//!
//! Scalars are stored in native byte order.
//!
//! # Example
//!
//! ```rust
//! use nativemem::chunked::ChunkedMemory;
//! use nativemem::memory::{AccessMode, NativeMemory};
//!
//! fn store_header(memory: &dyn NativeMemory) -> Result<u64, Box<dyn std::error::Error>> {
//!     let address = memory.allocate(16)?;
//!     memory.put_int(address, 0xCAFE, AccessMode::Plain)?;
//!     memory.put_long(address + 8, -1, AccessMode::Volatile)?;
//!     Ok(address)
//! }
//!
//! let memory = ChunkedMemory::new();
//! let address = store_header(&memory).unwrap();
//! assert_eq!(memory.get_int(address, AccessMode::Plain).unwrap(), 0xCAFE);
//! memory.free(address).unwrap();
//! ```

use crate::address::Address;
use std::sync::atomic::Ordering;

/// Memory ordering strength of a single access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Plain,
    Opaque,
    ReleaseAcquire,
    Volatile,
}

impl AccessMode {
    pub const ALL: [AccessMode; 4] = [
        AccessMode::Plain,
        AccessMode::Opaque,
        AccessMode::ReleaseAcquire,
        AccessMode::Volatile,
    ];

    pub fn is_atomic(self) -> bool {
        !matches!(self, AccessMode::Plain)
    }

    pub(crate) fn ordering(self) -> Ordering {
        match self {
            AccessMode::Plain => Ordering::Relaxed,
            AccessMode::Opaque | AccessMode::ReleaseAcquire | AccessMode::Volatile => {
                Ordering::SeqCst
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("invalid address {address:#018x}")]
    InvalidAddress { address: Address },
    #[error("out of bounds: {width} byte access at {address:#018x} in a chunk of {len} bytes")]
    OutOfBounds {
        address: Address,
        width: u64,
        len: u64,
    },
    #[error("misaligned {width} byte atomic access at {address:#018x}")]
    Misaligned { address: Address, width: u64 },
    #[error("allocation of {bytes} bytes failed")]
    AllocationFailed { bytes: u64 },
    #[error("allocation of {bytes} bytes exceeds the chunk limit of {limit} bytes")]
    AllocationTooLarge { bytes: u64, limit: u64 },
    #[error("out of chunks: all {limit} chunk indices are in use")]
    OutOfChunks { limit: u32 },
}

pub type Result<T> = std::result::Result<T, MemoryError>;

/// Emulated native memory.
///
/// Allocation methods take `&self`: implementations are shared between
/// threads and synchronize internally.
pub trait NativeMemory: Send + Sync {
    /// Reserves `bytes` zeroed bytes and returns their base address.
    fn allocate(&self, bytes: u64) -> Result<Address>;

    /// Moves the region at `address` into a region of `bytes` bytes, keeping
    /// the common prefix. The old address is dead once this returns, unless
    /// the size did not change, in which case `address` itself is returned.
    fn reallocate(&self, address: Address, bytes: u64) -> Result<Address>;

    /// Releases the region at base address `address`.
    fn free(&self, address: Address) -> Result<()>;

    /// Size of the region `address` points into.
    fn region_size(&self, address: Address) -> Result<u64>;

    fn set_memory(&self, address: Address, bytes: u64, value: u8) -> Result<()>;

    /// Copies `bytes` bytes; overlapping ranges behave like `memmove`.
    fn copy_memory(&self, from: Address, to: Address, bytes: u64) -> Result<()>;

    fn read_bytes(&self, address: Address, buf: &mut [u8]) -> Result<()>;

    fn write_bytes(&self, address: Address, data: &[u8]) -> Result<()>;

    fn get_byte(&self, address: Address, mode: AccessMode) -> Result<i8>;
    fn put_byte(&self, address: Address, value: i8, mode: AccessMode) -> Result<()>;

    fn get_short(&self, address: Address, mode: AccessMode) -> Result<i16>;
    fn put_short(&self, address: Address, value: i16, mode: AccessMode) -> Result<()>;

    fn get_int(&self, address: Address, mode: AccessMode) -> Result<i32>;
    fn put_int(&self, address: Address, value: i32, mode: AccessMode) -> Result<()>;

    fn get_long(&self, address: Address, mode: AccessMode) -> Result<i64>;
    fn put_long(&self, address: Address, value: i64, mode: AccessMode) -> Result<()>;

    /// Atomically replaces `expected` with `new`; returns whether it did.
    fn compare_and_set_int(&self, address: Address, expected: i32, new: i32) -> Result<bool>;
    fn compare_and_set_long(&self, address: Address, expected: i64, new: i64) -> Result<bool>;

    /// Like [`NativeMemory::compare_and_set_int`] but returns the value seen
    /// before the operation. Equals `expected` iff the swap happened.
    fn compare_and_exchange_int(&self, address: Address, expected: i32, new: i32) -> Result<i32> {
        loop {
            let current = self.get_int(address, AccessMode::Volatile)?;
            if current != expected {
                return Ok(current);
            }
            if self.compare_and_set_int(address, expected, new)? {
                return Ok(expected);
            }
        }
    }

    fn compare_and_exchange_long(&self, address: Address, expected: i64, new: i64) -> Result<i64> {
        loop {
            let current = self.get_long(address, AccessMode::Volatile)?;
            if current != expected {
                return Ok(current);
            }
            if self.compare_and_set_long(address, expected, new)? {
                return Ok(expected);
            }
        }
    }

    fn get_boolean(&self, address: Address, mode: AccessMode) -> Result<bool> {
        Ok(self.get_byte(address, mode)? != 0)
    }

    fn put_boolean(&self, address: Address, value: bool, mode: AccessMode) -> Result<()> {
        self.put_byte(address, i8::from(value), mode)
    }

    fn get_char(&self, address: Address, mode: AccessMode) -> Result<u16> {
        Ok(self.get_short(address, mode)? as u16)
    }

    fn put_char(&self, address: Address, value: u16, mode: AccessMode) -> Result<()> {
        self.put_short(address, value as i16, mode)
    }

    fn get_float(&self, address: Address, mode: AccessMode) -> Result<f32> {
        Ok(f32::from_bits(self.get_int(address, mode)? as u32))
    }

    fn put_float(&self, address: Address, value: f32, mode: AccessMode) -> Result<()> {
        self.put_int(address, value.to_bits() as i32, mode)
    }

    fn get_double(&self, address: Address, mode: AccessMode) -> Result<f64> {
        Ok(f64::from_bits(self.get_long(address, mode)? as u64))
    }

    fn put_double(&self, address: Address, value: f64, mode: AccessMode) -> Result<()> {
        self.put_long(address, value.to_bits() as i64, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orderings() {
        assert_eq!(AccessMode::Plain.ordering(), Ordering::Relaxed);
        for mode in [
            AccessMode::Opaque,
            AccessMode::ReleaseAcquire,
            AccessMode::Volatile,
        ] {
            assert!(mode.is_atomic());
            assert_eq!(mode.ordering(), Ordering::SeqCst, "{:?}", mode);
        }
    }

    #[test]
    fn test_error_messages() {
        let err = MemoryError::OutOfBounds {
            address: 0x40_0000_0009,
            width: 4,
            len: 10,
        };
        assert_eq!(
            err.to_string(),
            "out of bounds: 4 byte access at 0x0000004000000009 in a chunk of 10 bytes"
        );
        assert_eq!(
            MemoryError::OutOfChunks { limit: 4 }.to_string(),
            "out of chunks: all 4 chunk indices are in use"
        );
    }
}

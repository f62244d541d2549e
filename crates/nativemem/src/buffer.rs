// RebelDB™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// buffer.rs:

use crate::address::Address;
use crate::memory::{AccessMode, MemoryError, NativeMemory, Result};

/// An allocation that is freed when it goes out of scope.
///
/// ```rust
/// use nativemem::buffer::ScopedBuffer;
/// use nativemem::chunked::ChunkedMemory;
///
/// let memory = ChunkedMemory::new();
/// {
///     let buffer = ScopedBuffer::open(&memory, 4).unwrap();
///     buffer.view().write(0, b"rbl!").unwrap();
///     assert_eq!(buffer.view().to_vec().unwrap(), b"rbl!");
/// }
/// assert_eq!(memory.live_chunks(), 0);
/// ```
pub struct ScopedBuffer<'m, M: NativeMemory + ?Sized> {
    memory: &'m M,
    address: Address,
    len: u64,
}

impl<'m, M: NativeMemory + ?Sized> ScopedBuffer<'m, M> {
    pub fn open(memory: &'m M, len: u64) -> Result<Self> {
        let address = memory.allocate(len)?;
        let buffer = Self {
            memory,
            address,
            len,
        };
        // the drop guard above frees the region before the panic unwinds
        match memory.region_size(address) {
            Ok(size) if size == len => Ok(buffer),
            Ok(size) => panic!("fresh region {address:#018x} has {size} bytes, expected {len}"),
            Err(err) => panic!("fresh region {address:#018x} can not be wrapped: {err}"),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn memory(&self) -> &'m M {
        self.memory
    }

    /// A byte view over the whole region. It borrows the buffer and can not
    /// outlive it.
    pub fn view(&self) -> ByteView<'_, M> {
        ByteView {
            memory: self.memory,
            base: self.address,
            len: self.len,
        }
    }
}

impl<M: NativeMemory + ?Sized> Drop for ScopedBuffer<'_, M> {
    fn drop(&mut self) {
        if let Err(err) = self.memory.free(self.address) {
            tracing::error!(address = format_args!("{:#018x}", self.address), %err, "scoped buffer release failed");
        }
    }
}

/// Byte-addressed window of exactly `len` bytes starting at a base address.
pub struct ByteView<'a, M: NativeMemory + ?Sized> {
    memory: &'a M,
    base: Address,
    len: u64,
}

impl<M: NativeMemory + ?Sized> ByteView<'_, M> {
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn at(&self, index: u64, width: u64) -> Result<Address> {
        match index.checked_add(width) {
            Some(end) if end <= self.len => Ok(self.base + index),
            _ => Err(MemoryError::OutOfBounds {
                address: self.base.wrapping_add(index),
                width,
                len: self.len,
            }),
        }
    }

    pub fn get(&self, index: u64) -> Result<u8> {
        let address = self.at(index, 1)?;
        Ok(self.memory.get_byte(address, AccessMode::Plain)? as u8)
    }

    pub fn set(&self, index: u64, value: u8) -> Result<()> {
        let address = self.at(index, 1)?;
        self.memory.put_byte(address, value as i8, AccessMode::Plain)
    }

    pub fn read(&self, index: u64, buf: &mut [u8]) -> Result<()> {
        let address = self.at(index, buf.len() as u64)?;
        self.memory.read_bytes(address, buf)
    }

    pub fn write(&self, index: u64, data: &[u8]) -> Result<()> {
        let address = self.at(index, data.len() as u64)?;
        self.memory.write_bytes(address, data)
    }

    pub fn fill(&self, value: u8) -> Result<()> {
        self.memory.set_memory(self.base, self.len, value)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let len = usize::try_from(self.len).map_err(|_| MemoryError::AllocationTooLarge {
            bytes: self.len,
            limit: usize::MAX as u64,
        })?;
        let mut data = vec![0; len];
        self.memory.read_bytes(self.base, &mut data)?;
        Ok(data)
    }
}

// RebelDB™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// chunked.rs:

use crate::address::{decode_index, is_base, Address, MAX_CHUNKS, MAX_CHUNK_BYTES};
use crate::chunk::Chunk;
use crate::config::MemoryConfig;
use crate::memory::{AccessMode, MemoryError, NativeMemory, Result};
use crate::scalar::Scalar;
use crate::table::ChunkTable;

/// Native memory emulated with one zeroed byte region per allocation.
///
/// Allocation, free and reallocation serialize on the chunk table lock;
/// scalar and bulk accesses do not lock anything.
pub struct ChunkedMemory {
    table: ChunkTable,
    max_chunk_bytes: u64,
}

impl Default for ChunkedMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedMemory {
    pub fn new() -> Self {
        Self::with_limits(MAX_CHUNKS, MAX_CHUNK_BYTES)
    }

    /// `max_chunks` counts the sentinel chunk; both limits are capped by the
    /// address layout.
    pub fn with_limits(max_chunks: u32, max_chunk_bytes: u64) -> Self {
        Self {
            table: ChunkTable::new(max_chunks),
            max_chunk_bytes: max_chunk_bytes
                .min(MAX_CHUNK_BYTES)
                .min(isize::MAX as u64),
        }
    }

    pub fn with_config(config: &MemoryConfig) -> Self {
        Self::with_limits(config.max_chunks, config.max_chunk_bytes)
    }

    pub fn max_chunks(&self) -> u32 {
        self.table.limit()
    }

    pub fn max_chunk_bytes(&self) -> u64 {
        self.max_chunk_bytes
    }

    /// Chunks currently owned by callers.
    pub fn live_chunks(&self) -> u32 {
        self.table.live()
    }

    /// Slots ever created, sentinel included.
    pub fn table_len(&self) -> u32 {
        self.table.len()
    }

    fn check_size(&self, bytes: u64) -> Result<()> {
        if bytes > self.max_chunk_bytes {
            return Err(MemoryError::AllocationTooLarge {
                bytes,
                limit: self.max_chunk_bytes,
            });
        }
        Ok(())
    }

    fn get<T: Scalar>(&self, address: Address, mode: AccessMode) -> Result<T> {
        self.table.with(address, |chunk| chunk.get(address, mode))
    }

    fn put<T: Scalar>(&self, address: Address, value: T, mode: AccessMode) -> Result<()> {
        self.table
            .with(address, |chunk| chunk.put(address, value, mode))
    }

    fn compare_exchange<T: Scalar>(
        &self,
        address: Address,
        expected: T,
        new: T,
    ) -> Result<std::result::Result<T, T>> {
        self.table
            .with(address, |chunk| chunk.compare_exchange(address, expected, new))
    }
}

impl NativeMemory for ChunkedMemory {
    fn allocate(&self, bytes: u64) -> Result<Address> {
        self.check_size(bytes)?;
        let chunk = Chunk::zeroed(bytes)?;
        self.table.insert(chunk)
    }

    fn reallocate(&self, address: Address, bytes: u64) -> Result<Address> {
        if !is_base(address) || decode_index(address) == 0 {
            return Err(MemoryError::InvalidAddress { address });
        }
        self.check_size(bytes)?;
        self.table.reallocate(address, bytes)
    }

    fn free(&self, address: Address) -> Result<()> {
        self.table.remove(address).map(|_| ())
    }

    fn region_size(&self, address: Address) -> Result<u64> {
        self.table.with(address, |chunk| Ok(chunk.len()))
    }

    fn set_memory(&self, address: Address, bytes: u64, value: u8) -> Result<()> {
        self.table
            .with(address, |chunk| chunk.fill(address, bytes, value))
    }

    fn copy_memory(&self, from: Address, to: Address, bytes: u64) -> Result<()> {
        self.table
            .with_pair(from, to, |src, dst| dst.copy_from(to, src, from, bytes))
    }

    fn read_bytes(&self, address: Address, buf: &mut [u8]) -> Result<()> {
        self.table.with(address, |chunk| chunk.read(address, buf))
    }

    fn write_bytes(&self, address: Address, data: &[u8]) -> Result<()> {
        self.table.with(address, |chunk| chunk.write(address, data))
    }

    fn get_byte(&self, address: Address, mode: AccessMode) -> Result<i8> {
        self.get(address, mode)
    }

    fn put_byte(&self, address: Address, value: i8, mode: AccessMode) -> Result<()> {
        self.put(address, value, mode)
    }

    fn get_short(&self, address: Address, mode: AccessMode) -> Result<i16> {
        self.get(address, mode)
    }

    fn put_short(&self, address: Address, value: i16, mode: AccessMode) -> Result<()> {
        self.put(address, value, mode)
    }

    fn get_int(&self, address: Address, mode: AccessMode) -> Result<i32> {
        self.get(address, mode)
    }

    fn put_int(&self, address: Address, value: i32, mode: AccessMode) -> Result<()> {
        self.put(address, value, mode)
    }

    fn get_long(&self, address: Address, mode: AccessMode) -> Result<i64> {
        self.get(address, mode)
    }

    fn put_long(&self, address: Address, value: i64, mode: AccessMode) -> Result<()> {
        self.put(address, value, mode)
    }

    fn compare_and_set_int(&self, address: Address, expected: i32, new: i32) -> Result<bool> {
        Ok(self.compare_exchange(address, expected, new)?.is_ok())
    }

    fn compare_and_set_long(&self, address: Address, expected: i64, new: i64) -> Result<bool> {
        Ok(self.compare_exchange(address, expected, new)?.is_ok())
    }

    fn compare_and_exchange_int(&self, address: Address, expected: i32, new: i32) -> Result<i32> {
        Ok(self
            .compare_exchange(address, expected, new)?
            .unwrap_or_else(|actual| actual))
    }

    fn compare_and_exchange_long(&self, address: Address, expected: i64, new: i64) -> Result<i64> {
        Ok(self
            .compare_exchange(address, expected, new)?
            .unwrap_or_else(|actual| actual))
    }
}

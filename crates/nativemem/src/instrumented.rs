// RebelDB™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// instrumented.rs:

use crate::address::Address;
use crate::memory::{AccessMode, NativeMemory, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub allocations: u64,
    pub frees: u64,
    pub reallocations: u64,
    pub failures: u64,
}

impl MemoryStats {
    /// Allocations not yet matched by a free.
    pub fn outstanding(&self) -> u64 {
        self.allocations.saturating_sub(self.frees)
    }
}

/// Forwards to another backend, tracing allocator traffic and counting it.
///
/// Compare-and-exchange uses the looped default of [`NativeMemory`] on top of
/// the wrapped backend's compare-and-set.
pub struct InstrumentedMemory {
    inner: Box<dyn NativeMemory>,
    allocations: AtomicU64,
    frees: AtomicU64,
    reallocations: AtomicU64,
    failures: AtomicU64,
}

impl InstrumentedMemory {
    pub fn new(inner: Box<dyn NativeMemory>) -> Self {
        Self {
            inner,
            allocations: AtomicU64::new(0),
            frees: AtomicU64::new(0),
            reallocations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            reallocations: self.reallocations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    pub fn into_inner(self) -> Box<dyn NativeMemory> {
        self.inner
    }

    fn observe<T>(&self, op: &'static str, address: Address, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.failures.fetch_add(1, Ordering::Relaxed);
            warn!(op, address = format_args!("{address:#018x}"), %err, "native memory operation failed");
        }
        result
    }
}

impl NativeMemory for InstrumentedMemory {
    fn allocate(&self, bytes: u64) -> Result<Address> {
        let address = self.inner.allocate(bytes).inspect_err(|err| {
            self.failures.fetch_add(1, Ordering::Relaxed);
            warn!(op = "allocate", bytes, %err, "native memory operation failed");
        })?;
        self.allocations.fetch_add(1, Ordering::Relaxed);
        debug!(bytes, address = format_args!("{address:#018x}"), "allocate");
        Ok(address)
    }

    fn reallocate(&self, address: Address, bytes: u64) -> Result<Address> {
        let moved = self.observe("reallocate", address, self.inner.reallocate(address, bytes))?;
        self.reallocations.fetch_add(1, Ordering::Relaxed);
        debug!(
            from = format_args!("{address:#018x}"),
            to = format_args!("{moved:#018x}"),
            bytes,
            "reallocate"
        );
        Ok(moved)
    }

    fn free(&self, address: Address) -> Result<()> {
        self.observe("free", address, self.inner.free(address))?;
        self.frees.fetch_add(1, Ordering::Relaxed);
        debug!(address = format_args!("{address:#018x}"), "free");
        Ok(())
    }

    fn region_size(&self, address: Address) -> Result<u64> {
        self.observe("region_size", address, self.inner.region_size(address))
    }

    fn set_memory(&self, address: Address, bytes: u64, value: u8) -> Result<()> {
        self.observe("set_memory", address, self.inner.set_memory(address, bytes, value))
    }

    fn copy_memory(&self, from: Address, to: Address, bytes: u64) -> Result<()> {
        self.observe("copy_memory", from, self.inner.copy_memory(from, to, bytes))
    }

    fn read_bytes(&self, address: Address, buf: &mut [u8]) -> Result<()> {
        self.observe("read_bytes", address, self.inner.read_bytes(address, buf))
    }

    fn write_bytes(&self, address: Address, data: &[u8]) -> Result<()> {
        self.observe("write_bytes", address, self.inner.write_bytes(address, data))
    }

    fn get_byte(&self, address: Address, mode: AccessMode) -> Result<i8> {
        self.observe("get_byte", address, self.inner.get_byte(address, mode))
    }

    fn put_byte(&self, address: Address, value: i8, mode: AccessMode) -> Result<()> {
        self.observe("put_byte", address, self.inner.put_byte(address, value, mode))
    }

    fn get_short(&self, address: Address, mode: AccessMode) -> Result<i16> {
        self.observe("get_short", address, self.inner.get_short(address, mode))
    }

    fn put_short(&self, address: Address, value: i16, mode: AccessMode) -> Result<()> {
        self.observe("put_short", address, self.inner.put_short(address, value, mode))
    }

    fn get_int(&self, address: Address, mode: AccessMode) -> Result<i32> {
        self.observe("get_int", address, self.inner.get_int(address, mode))
    }

    fn put_int(&self, address: Address, value: i32, mode: AccessMode) -> Result<()> {
        self.observe("put_int", address, self.inner.put_int(address, value, mode))
    }

    fn get_long(&self, address: Address, mode: AccessMode) -> Result<i64> {
        self.observe("get_long", address, self.inner.get_long(address, mode))
    }

    fn put_long(&self, address: Address, value: i64, mode: AccessMode) -> Result<()> {
        self.observe("put_long", address, self.inner.put_long(address, value, mode))
    }

    fn compare_and_set_int(&self, address: Address, expected: i32, new: i32) -> Result<bool> {
        self.observe(
            "compare_and_set_int",
            address,
            self.inner.compare_and_set_int(address, expected, new),
        )
    }

    fn compare_and_set_long(&self, address: Address, expected: i64, new: i64) -> Result<bool> {
        self.observe(
            "compare_and_set_long",
            address,
            self.inner.compare_and_set_long(address, expected, new),
        )
    }
}

// RebelDB™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// table.rs:

//! Chunk table.
//!
//! Slots live in segments that double in size: segment `k` holds
//! `64 << k` slots and is created the first time the table grows into it.
//! Segments are never moved or dropped before the table itself, so readers
//! can reach a slot without taking the allocator lock. A slot is an
//! epoch-protected pointer: `free` unlinks the chunk and defers its
//! destruction until every reader pinned at that time has finished.
//!
//! All mutation (claiming an index, installing, unlinking, pushing onto the
//! free list) happens under a single mutex.

use crate::address::{self, decode_index, decode_offset, Address, CHUNK_BITS, MAX_CHUNKS};
use crate::chunk::Chunk;
use crate::memory::{MemoryError, Result};
use crossbeam::epoch::{self, Atomic, Guard, Owned, Shared};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::OnceLock;

const FIRST_SEGMENT_BITS: u32 = 6;
const SEGMENTS: usize = (CHUNK_BITS - FIRST_SEGMENT_BITS + 1) as usize;

type Segment = Box<[Atomic<Chunk>]>;

/// Maps a chunk index to `(segment, slot inside segment)`.
fn locate(index: u32) -> (usize, usize) {
    let bucket = (index >> FIRST_SEGMENT_BITS) + 1;
    let segment = (u32::BITS - 1 - bucket.leading_zeros()) as usize;
    let start = ((1u32 << segment) - 1) << FIRST_SEGMENT_BITS;
    (segment, (index - start) as usize)
}

fn segment_len(segment: usize) -> usize {
    1 << (FIRST_SEGMENT_BITS as usize + segment)
}

struct TableState {
    len: u32,
    free: VecDeque<u32>,
}

pub struct ChunkTable {
    segments: [OnceLock<Segment>; SEGMENTS],
    state: Mutex<TableState>,
    limit: u32,
}

impl ChunkTable {
    /// Creates a table holding only the sentinel chunk at index 0. `limit`
    /// caps the number of slots, sentinel included.
    pub fn new(limit: u32) -> Self {
        let table = Self {
            segments: std::array::from_fn(|_| OnceLock::new()),
            state: Mutex::new(TableState {
                len: 0,
                free: VecDeque::new(),
            }),
            limit: limit.clamp(1, MAX_CHUNKS),
        };
        {
            let mut state = table.state.lock();
            let sentinel = table.grow(&mut state);
            debug_assert_eq!(sentinel, Some(0));
            if let Some(slot) = table.slot(0) {
                slot.store(Owned::new(Chunk::empty()), Ordering::Release);
            }
        }
        table
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of slots, free or not, sentinel included.
    pub fn len(&self) -> u32 {
        self.state.lock().len
    }

    /// Number of caller-owned chunks.
    pub fn live(&self) -> u32 {
        let state = self.state.lock();
        state.len - state.free.len() as u32 - 1
    }

    fn slot(&self, index: u32) -> Option<&Atomic<Chunk>> {
        let (segment, pos) = locate(index);
        self.segments.get(segment)?.get()?.get(pos)
    }

    fn grow(&self, state: &mut TableState) -> Option<u32> {
        if state.len >= self.limit {
            return None;
        }
        let index = state.len;
        let (segment, _) = locate(index);
        self.segments[segment].get_or_init(|| {
            (0..segment_len(segment))
                .map(|_| Atomic::null())
                .collect()
        });
        state.len += 1;
        Some(index)
    }

    fn claim(&self, state: &mut TableState) -> Result<u32> {
        if let Some(index) = state.free.pop_front() {
            return Ok(index);
        }
        self.grow(state)
            .ok_or(MemoryError::OutOfChunks { limit: self.limit })
    }

    /// Chunk index of a base address that may be freed or reallocated.
    fn owned_index(address: Address) -> Result<u32> {
        let index = decode_index(address);
        if decode_offset(address) != 0 || index == 0 {
            return Err(MemoryError::InvalidAddress { address });
        }
        Ok(index)
    }

    /// Runs `f` on the chunk `address` points into. The chunk stays alive for
    /// the duration of the call even if another thread frees it meanwhile.
    pub fn with<R>(&self, address: Address, f: impl FnOnce(&Chunk) -> Result<R>) -> Result<R> {
        let guard = epoch::pin();
        let chunk = self.load(decode_index(address), &guard);
        f(chunk.ok_or(MemoryError::InvalidAddress { address })?)
    }

    /// Like [`ChunkTable::with`] for two addresses, loaded under one guard.
    pub fn with_pair<R>(
        &self,
        first: Address,
        second: Address,
        f: impl FnOnce(&Chunk, &Chunk) -> Result<R>,
    ) -> Result<R> {
        let guard = epoch::pin();
        let a = self
            .load(decode_index(first), &guard)
            .ok_or(MemoryError::InvalidAddress { address: first })?;
        let b = self
            .load(decode_index(second), &guard)
            .ok_or(MemoryError::InvalidAddress { address: second })?;
        f(a, b)
    }

    fn load<'g>(&self, index: u32, guard: &'g Guard) -> Option<&'g Chunk> {
        let shared = self.slot(index)?.load(Ordering::Acquire, guard);
        // SAFETY: chunks are destroyed only through `defer_destroy` after
        // being unlinked, and `guard` keeps this one from being reclaimed.
        unsafe { shared.as_ref() }
    }

    /// Installs `chunk` at a free or fresh index and returns its base address.
    pub fn insert(&self, chunk: Chunk) -> Result<Address> {
        let mut state = self.state.lock();
        let index = self.claim(&mut state)?;
        self.install(index, chunk);
        address::encode(index, 0, state.len)
    }

    fn install(&self, index: u32, chunk: Chunk) {
        match self.slot(index) {
            Some(slot) => slot.store(Owned::new(chunk), Ordering::Release),
            None => unreachable!("claimed chunk index {index} has no slot"),
        }
    }

    /// Unlinks the chunk at base address `address` and recycles its index.
    /// Returns the length of the released chunk.
    pub fn remove(&self, address: Address) -> Result<u64> {
        let index = Self::owned_index(address)?;
        let guard = epoch::pin();
        let mut state = self.state.lock();
        let slot = self
            .slot(index)
            .ok_or(MemoryError::InvalidAddress { address })?;
        let old = slot.swap(Shared::null(), Ordering::AcqRel, &guard);
        // SAFETY: see `load`.
        let len = match unsafe { old.as_ref() } {
            Some(chunk) => chunk.len(),
            None => return Err(MemoryError::InvalidAddress { address }),
        };
        state.free.push_back(index);
        drop(state);
        // SAFETY: `old` is unlinked; only readers pinned before the swap can
        // still hold it.
        unsafe { guard.defer_destroy(old) };
        // the thread-local bag is only sealed once it is full
        guard.flush();
        Ok(len)
    }

    /// Moves the chunk at base address `address` into a new chunk of `bytes`
    /// bytes at a different index, keeping the common prefix. The whole
    /// sequence runs under the table lock.
    pub fn reallocate(&self, address: Address, bytes: u64) -> Result<Address> {
        let index = Self::owned_index(address)?;
        let guard = epoch::pin();
        let mut state = self.state.lock();
        let slot = self
            .slot(index)
            .ok_or(MemoryError::InvalidAddress { address })?;
        let old = slot.load(Ordering::Acquire, &guard);
        // SAFETY: see `load`.
        let old_chunk = unsafe { old.as_ref() }.ok_or(MemoryError::InvalidAddress { address })?;
        if old_chunk.len() == bytes {
            return Ok(address);
        }

        let chunk = Chunk::zeroed(bytes)?;
        chunk.copy_from(0, old_chunk, 0, old_chunk.len().min(bytes))?;
        let new_index = self.claim(&mut state)?;
        self.install(new_index, chunk);

        slot.store(Shared::null(), Ordering::Release);
        state.free.push_back(index);
        let moved = address::encode(new_index, 0, state.len);
        drop(state);
        // SAFETY: see `remove`.
        unsafe { guard.defer_destroy(old) };
        guard.flush();
        moved
    }
}

impl Drop for ChunkTable {
    fn drop(&mut self) {
        // SAFETY: `&mut self` excludes every reader.
        let guard = unsafe { epoch::unprotected() };
        for segment in self.segments.iter().filter_map(OnceLock::get) {
            for slot in segment.iter() {
                let chunk = slot.swap(Shared::null(), Ordering::Relaxed, guard);
                if !chunk.is_null() {
                    // SAFETY: unlinked and unreachable.
                    drop(unsafe { chunk.into_owned() });
                }
            }
        }
    }
}

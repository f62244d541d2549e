// RebelDB™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// chunk.rs:

//! Backing storage of a single allocation.
//!
//! The bytes live in a boxed slice of `AtomicU64`, which keeps the region
//! 8-byte aligned: any naturally aligned offset can be viewed as an atomic of
//! its width. The visible length is the requested size; the padding of the
//! last word is never reachable.
//!
//! Concurrent accesses of different widths to overlapping bytes are not
//! synchronized with each other, callers must not rely on them.

use crate::address::{decode_offset, Address};
use crate::memory::{AccessMode, MemoryError, Result};
use crate::scalar::Scalar;
use std::alloc::{self, Layout};
use std::ptr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

const WORD: usize = std::mem::size_of::<u64>();

pub struct Chunk {
    words: Box<[AtomicU64]>,
    len: u64,
}

impl Chunk {
    /// The zero-length chunk, used as the table sentinel.
    pub fn empty() -> Self {
        Self {
            words: Vec::new().into_boxed_slice(),
            len: 0,
        }
    }

    /// Reserves `len` zeroed bytes, reporting a refused reservation instead
    /// of aborting. Pages are left to the allocator to zero, so nothing is
    /// touched up front.
    pub fn zeroed(len: u64) -> Result<Self> {
        let words = usize::try_from(len.div_ceil(WORD as u64))
            .ok()
            .and_then(zeroed_words)
            .ok_or(MemoryError::AllocationFailed { bytes: len })?;
        Ok(Self { words, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Position of a `width` byte range starting at the offset of `address`.
    fn locate(&self, address: Address, width: u64) -> Result<usize> {
        let offset = decode_offset(address);
        match self.len.checked_sub(width) {
            // len fits a usize, see `zeroed`
            Some(last) if offset <= last => Ok(offset as usize),
            _ => Err(MemoryError::OutOfBounds {
                address,
                width,
                len: self.len,
            }),
        }
    }

    /// # Safety
    ///
    /// `pos` must be a multiple of `align_of::<A>()` and
    /// `pos + size_of::<A>()` must not exceed the backing words.
    #[inline]
    unsafe fn atomic_at<A>(&self, pos: usize) -> &A {
        &*self.words.as_ptr().cast::<u8>().add(pos).cast::<A>()
    }

    #[inline]
    fn byte(&self, pos: usize) -> &AtomicU8 {
        debug_assert!((pos as u64) < self.len);
        // SAFETY: callers stay below `len`, and `AtomicU8` has no alignment.
        unsafe { self.atomic_at::<AtomicU8>(pos) }
    }

    pub fn get<T: Scalar>(&self, address: Address, mode: AccessMode) -> Result<T> {
        let pos = self.locate(address, T::WIDTH as u64)?;
        if pos % T::WIDTH == 0 {
            // SAFETY: in bounds and naturally aligned.
            let atomic = unsafe { self.atomic_at::<T::Atomic>(pos) };
            return Ok(T::load(atomic, mode.ordering()));
        }
        if mode.is_atomic() {
            return Err(MemoryError::Misaligned {
                address,
                width: T::WIDTH as u64,
            });
        }
        let mut raw = [0u8; WORD];
        raw.iter_mut()
            .take(T::WIDTH)
            .enumerate()
            .for_each(|(i, byte)| *byte = self.byte(pos + i).load(Ordering::Relaxed));
        Ok(T::from_ne_slice(&raw[..T::WIDTH]))
    }

    pub fn put<T: Scalar>(&self, address: Address, value: T, mode: AccessMode) -> Result<()> {
        let pos = self.locate(address, T::WIDTH as u64)?;
        if pos % T::WIDTH == 0 {
            // SAFETY: in bounds and naturally aligned.
            let atomic = unsafe { self.atomic_at::<T::Atomic>(pos) };
            T::store(atomic, value, mode.ordering());
            return Ok(());
        }
        if mode.is_atomic() {
            return Err(MemoryError::Misaligned {
                address,
                width: T::WIDTH as u64,
            });
        }
        let mut raw = [0u8; WORD];
        value.write_ne_slice(&mut raw[..T::WIDTH]);
        raw.iter()
            .take(T::WIDTH)
            .enumerate()
            .for_each(|(i, byte)| self.byte(pos + i).store(*byte, Ordering::Relaxed));
        Ok(())
    }

    /// Returns `Ok(previous)` when the swap happened, `Err(actual)` otherwise.
    pub fn compare_exchange<T: Scalar>(
        &self,
        address: Address,
        expected: T,
        new: T,
    ) -> Result<std::result::Result<T, T>> {
        let pos = self.locate(address, T::WIDTH as u64)?;
        if pos % T::WIDTH != 0 {
            return Err(MemoryError::Misaligned {
                address,
                width: T::WIDTH as u64,
            });
        }
        // SAFETY: in bounds and naturally aligned.
        let atomic = unsafe { self.atomic_at::<T::Atomic>(pos) };
        Ok(T::compare_exchange(atomic, expected, new))
    }

    pub fn fill(&self, address: Address, bytes: u64, value: u8) -> Result<()> {
        let pos = self.locate(address, bytes)?;
        (pos..pos + bytes as usize).for_each(|i| self.byte(i).store(value, Ordering::Relaxed));
        Ok(())
    }

    pub fn read(&self, address: Address, buf: &mut [u8]) -> Result<()> {
        let pos = self.locate(address, buf.len() as u64)?;
        buf.iter_mut()
            .enumerate()
            .for_each(|(i, byte)| *byte = self.byte(pos + i).load(Ordering::Relaxed));
        Ok(())
    }

    pub fn write(&self, address: Address, data: &[u8]) -> Result<()> {
        let pos = self.locate(address, data.len() as u64)?;
        data.iter()
            .enumerate()
            .for_each(|(i, byte)| self.byte(pos + i).store(*byte, Ordering::Relaxed));
        Ok(())
    }

    /// Copies `bytes` bytes from `src` at `from` into `self` at `to`. Each
    /// side is bounds checked against its own offset. `src` may be `self`.
    pub fn copy_from(&self, to: Address, src: &Chunk, from: Address, bytes: u64) -> Result<()> {
        let src_pos = src.locate(from, bytes)?;
        let dst_pos = self.locate(to, bytes)?;
        let n = bytes as usize;

        let same = std::ptr::eq(self, src);
        if same && dst_pos > src_pos {
            (0..n).rev().for_each(|i| {
                let byte = src.byte(src_pos + i).load(Ordering::Relaxed);
                self.byte(dst_pos + i).store(byte, Ordering::Relaxed);
            });
            return Ok(());
        }

        let mut done = 0;
        if !same && src_pos % WORD == 0 && dst_pos % WORD == 0 {
            let (src_word, dst_word) = (src_pos / WORD, dst_pos / WORD);
            for i in 0..n / WORD {
                let word = src.words[src_word + i].load(Ordering::Relaxed);
                self.words[dst_word + i].store(word, Ordering::Relaxed);
            }
            done = n / WORD * WORD;
        }
        (done..n).for_each(|i| {
            let byte = src.byte(src_pos + i).load(Ordering::Relaxed);
            self.byte(dst_pos + i).store(byte, Ordering::Relaxed);
        });
        Ok(())
    }
}

fn zeroed_words(count: usize) -> Option<Box<[AtomicU64]>> {
    if count == 0 {
        return Some(Vec::new().into_boxed_slice());
    }
    let layout = Layout::array::<AtomicU64>(count).ok()?;
    // SAFETY: `layout` has a non-zero size.
    let ptr = unsafe { alloc::alloc_zeroed(layout) }.cast::<AtomicU64>();
    if ptr.is_null() {
        return None;
    }
    // SAFETY: allocated by the global allocator with the layout of
    // `[AtomicU64; count]`, and all-zero bytes are a valid `AtomicU64`.
    Some(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(ptr, count)) })
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed() {
        let chunk = Chunk::zeroed(13).unwrap();
        assert_eq!(chunk.len(), 13);
        let mut buf = [0xFFu8; 13];
        chunk.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 13]);
        assert!(Chunk::empty().is_empty());
    }

    #[test]
    fn test_refused_reservation() {
        assert_eq!(
            Chunk::zeroed(u64::MAX).unwrap_err(),
            MemoryError::AllocationFailed { bytes: u64::MAX }
        );
        // may or may not be granted, but never touches its pages
        match Chunk::zeroed(crate::address::MAX_CHUNK_BYTES) {
            Ok(chunk) => assert_eq!(chunk.get::<i64>(chunk.len() - 8, AccessMode::Plain), Ok(0)),
            Err(err) => assert!(matches!(err, MemoryError::AllocationFailed { .. })),
        }
    }

    #[test]
    fn test_bounds() {
        let chunk = Chunk::zeroed(10).unwrap();
        assert!(chunk.get::<i8>(9, AccessMode::Plain).is_ok());
        assert_eq!(
            chunk.get::<i8>(10, AccessMode::Plain),
            Err(MemoryError::OutOfBounds {
                address: 10,
                width: 1,
                len: 10
            })
        );
        assert!(chunk.put::<i32>(6, 1, AccessMode::Plain).is_ok());
        assert!(matches!(
            chunk.put::<i32>(7, 1, AccessMode::Plain),
            Err(MemoryError::OutOfBounds { .. })
        ));
        assert!(matches!(
            Chunk::empty().get::<i8>(0, AccessMode::Plain),
            Err(MemoryError::OutOfBounds { len: 0, .. })
        ));
    }

    #[test]
    fn test_unaligned_plain_access() {
        let chunk = Chunk::zeroed(16).unwrap();
        chunk.put::<i64>(3, 0x0102_0304_0506_0708, AccessMode::Plain).unwrap();
        assert_eq!(
            chunk.get::<i64>(3, AccessMode::Plain).unwrap(),
            0x0102_0304_0506_0708
        );
        let mut raw = [0u8; 8];
        chunk.read(3, &mut raw).unwrap();
        assert_eq!(raw, 0x0102_0304_0506_0708i64.to_ne_bytes());
    }

    #[test]
    fn test_unaligned_atomic_access_is_rejected() {
        let chunk = Chunk::zeroed(16).unwrap();
        assert_eq!(
            chunk.put::<i32>(2, 7, AccessMode::Volatile),
            Err(MemoryError::Misaligned {
                address: 2,
                width: 4
            })
        );
        assert!(matches!(
            chunk.compare_exchange::<i64>(4, 0, 1),
            Err(MemoryError::Misaligned { .. })
        ));
        // bytes are always aligned
        assert!(chunk.put::<i8>(3, 7, AccessMode::Volatile).is_ok());
    }

    #[test]
    fn test_bounds_are_checked_before_alignment() {
        let chunk = Chunk::zeroed(10).unwrap();
        assert!(matches!(
            chunk.get::<i64>(9, AccessMode::Volatile),
            Err(MemoryError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_compare_exchange() {
        let chunk = Chunk::zeroed(8).unwrap();
        chunk.put::<i32>(4, 5, AccessMode::Plain).unwrap();
        assert_eq!(chunk.compare_exchange::<i32>(4, 5, 7).unwrap(), Ok(5));
        assert_eq!(chunk.compare_exchange::<i32>(4, 5, 9).unwrap(), Err(7));
        assert_eq!(chunk.get::<i32>(4, AccessMode::Volatile).unwrap(), 7);
    }

    #[test]
    fn test_fill() {
        let chunk = Chunk::zeroed(8).unwrap();
        chunk.fill(2, 4, 0xAB).unwrap();
        let mut buf = [0u8; 8];
        chunk.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0xAB, 0xAB, 0xAB, 0xAB, 0, 0]);
        assert!(chunk.fill(8, 0, 1).is_ok());
        assert!(chunk.fill(6, 3, 1).is_err());
    }

    #[test]
    fn test_copy_between_chunks() {
        let src = Chunk::zeroed(20).unwrap();
        let data: Vec<u8> = (0..20).collect();
        src.write(0, &data).unwrap();

        let dst = Chunk::zeroed(20).unwrap();
        dst.copy_from(0, &src, 0, 19).unwrap();
        let mut buf = [0u8; 20];
        dst.read(0, &mut buf).unwrap();
        assert_eq!(&buf[..19], &data[..19]);
        assert_eq!(buf[19], 0);

        // each side checks its own offset
        let small = Chunk::zeroed(4).unwrap();
        assert!(small.copy_from(0, &src, 16, 4).is_ok());
        assert!(small.copy_from(1, &src, 0, 4).is_err());
    }

    #[test]
    fn test_copy_overlapping() {
        let chunk = Chunk::zeroed(8).unwrap();
        chunk.write(0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        chunk.copy_from(2, &chunk, 0, 5).unwrap();
        let mut buf = [0u8; 8];
        chunk.read(0, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 1, 2, 3, 4, 5, 8]);

        chunk.copy_from(0, &chunk, 3, 5).unwrap();
        chunk.read(0, &mut buf).unwrap();
        assert_eq!(buf, [2, 3, 4, 5, 8, 4, 5, 8]);
    }
}

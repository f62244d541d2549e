// RebelDB™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// address.rs:

//! Address codec.
//!
//! An address packs a chunk index into the high bits and a byte offset inside
//! that chunk into the low bits:
//!
//! ```text
//!  63               38 37                               0
//! +-------------------+----------------------------------+
//! |   chunk index     |           chunk offset           |
//! +-------------------+----------------------------------+
//! ```
//!
//! Decoding never validates anything. A decoded index may point at a slot that
//! was freed since the address was handed out, so the table revalidates on
//! every access.

use crate::memory::{MemoryError, Result};

pub type Address = u64;

// bits 37..0 address a byte inside one chunk (256 GiB)
pub const OFFSET_BITS: u32 = 38;
pub const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;

// bits 63..38 select the chunk (64M chunks)
pub const CHUNK_BITS: u32 = u64::BITS - OFFSET_BITS;
pub const MAX_CHUNKS: u32 = 1 << CHUNK_BITS;

/// Largest chunk whose every byte is reachable through an offset.
pub const MAX_CHUNK_BYTES: u64 = OFFSET_MASK + 1;

/// Index 0 is the permanent zero-length sentinel, so this never names a live
/// allocation.
pub const NULL: Address = 0;

/// Packs `index` and `offset` into an address.
///
/// `table_len` is the current length of the chunk table; an index outside of
/// it can not be encoded.
pub fn encode(index: u32, offset: u64, table_len: u32) -> Result<Address> {
    if index >= table_len || offset > OFFSET_MASK {
        return Err(MemoryError::InvalidAddress {
            address: (u64::from(index) << OFFSET_BITS) | (offset & OFFSET_MASK),
        });
    }
    Ok((u64::from(index) << OFFSET_BITS) | offset)
}

#[inline]
pub fn decode_index(address: Address) -> u32 {
    // 64 - 38 = 26 bits always fit
    (address >> OFFSET_BITS) as u32
}

#[inline]
pub fn decode_offset(address: Address) -> u64 {
    address & OFFSET_MASK
}

/// True for addresses returned by `allocate`, the only ones that may be freed
/// or reallocated.
#[inline]
pub fn is_base(address: Address) -> bool {
    decode_offset(address) == 0
}

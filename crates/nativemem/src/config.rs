// RebelDB™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// config.rs

use crate::address::{MAX_CHUNKS, MAX_CHUNK_BYTES};
use serde::Deserialize;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("backend name is empty")]
    EmptyBackend,
    #[error("max_chunks must be in 2..={max}, got {value}")]
    MaxChunks { value: u32, max: u32 },
    #[error("max_chunk_bytes must not exceed {max}, got {value}")]
    MaxChunkBytes { value: u64, max: u64 },
}

/// Selects and sizes a native memory backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Registry key of the backend.
    pub backend: String,
    /// Chunk table capacity, sentinel included.
    pub max_chunks: u32,
    /// Largest single allocation.
    pub max_chunk_bytes: u64,
    /// Wrap the backend in [`crate::instrumented::InstrumentedMemory`].
    pub instrument: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: crate::registry::CHUNKED.to_string(),
            max_chunks: MAX_CHUNKS,
            max_chunk_bytes: MAX_CHUNK_BYTES,
            instrument: false,
        }
    }
}

impl MemoryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.trim().is_empty() {
            return Err(ConfigError::EmptyBackend);
        }
        // one slot is taken by the sentinel
        if !(2..=MAX_CHUNKS).contains(&self.max_chunks) {
            return Err(ConfigError::MaxChunks {
                value: self.max_chunks,
                max: MAX_CHUNKS,
            });
        }
        if self.max_chunk_bytes > MAX_CHUNK_BYTES {
            return Err(ConfigError::MaxChunkBytes {
                value: self.max_chunk_bytes,
                max: MAX_CHUNK_BYTES,
            });
        }
        Ok(())
    }
}

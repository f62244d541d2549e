// RebelDB™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// lib.rs:

pub mod address;
pub mod buffer;
pub mod chunk;
pub mod chunked;
pub mod config;
pub mod instrumented;
pub mod memory;
pub mod registry;
pub mod scalar;
pub mod table;

pub use address::Address;
pub use buffer::{ByteView, ScopedBuffer};
pub use chunked::ChunkedMemory;
pub use config::{ConfigError, MemoryConfig};
pub use instrumented::{InstrumentedMemory, MemoryStats};
pub use memory::{AccessMode, MemoryError, NativeMemory};
pub use registry::{MemoryRegistry, RegistryError};

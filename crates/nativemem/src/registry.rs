// RebelDB™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// registry.rs:

use crate::chunked::ChunkedMemory;
use crate::config::{ConfigError, MemoryConfig};
use crate::instrumented::InstrumentedMemory;
use crate::memory::NativeMemory;
use std::collections::HashMap;

pub const CHUNKED: &str = "chunked";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown memory backend `{0}`")]
    UnknownBackend(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Factory = fn(&MemoryConfig) -> Result<Box<dyn NativeMemory>, RegistryError>;

fn chunked(config: &MemoryConfig) -> Result<Box<dyn NativeMemory>, RegistryError> {
    Ok(Box::new(ChunkedMemory::with_config(config)))
}

/// Named native memory backends.
pub struct MemoryRegistry {
    factories: HashMap<String, Factory>,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(CHUNKED, chunked);
        registry
    }

    /// Returns the factory previously registered under `name`, if any.
    pub fn register(&mut self, name: &str, factory: Factory) -> Option<Factory> {
        self.factories.insert(name.to_string(), factory)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn create(&self, config: &MemoryConfig) -> Result<Box<dyn NativeMemory>, RegistryError> {
        config.validate()?;
        let factory = self
            .factories
            .get(&config.backend)
            .ok_or_else(|| RegistryError::UnknownBackend(config.backend.clone()))?;
        let memory = factory(config)?;
        tracing::info!(
            backend = %config.backend,
            max_chunks = config.max_chunks,
            max_chunk_bytes = config.max_chunk_bytes,
            instrument = config.instrument,
            "native memory created"
        );
        if config.instrument {
            Ok(Box::new(InstrumentedMemory::new(memory)))
        } else {
            Ok(memory)
        }
    }
}

// RebelDB™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// settings.rs:

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use nativemem::MemoryConfig;
use std::path::Path;

pub const ENV_PREFIX: &str = "NATIVEMEM";

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX).try_parsing(true)
}

/// Loads the memory configuration from an optional file, then lets
/// `NATIVEMEM_*` variables override it.
pub fn load(path: Option<&Path>) -> Result<MemoryConfig> {
    load_from(path, environment())
}

fn load_from(path: Option<&Path>, env: Environment) -> Result<MemoryConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }
    let config: MemoryConfig = builder
        .add_source(env)
        .build()
        .context("reading settings")?
        .try_deserialize()
        .context("parsing settings")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let mut map = config::Map::new();
        for (key, value) in vars {
            map.insert(key.to_string(), value.to_string());
        }
        environment().source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let config = load_from(None, env(&[])).unwrap();
        assert_eq!(config, MemoryConfig::default());
    }

    #[test]
    fn test_file_then_environment() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "max_chunks = 1024\nmax_chunk_bytes = 4096\ninstrument = true").unwrap();

        let config = load_from(Some(file.path()), env(&[])).unwrap();
        assert_eq!(config.max_chunks, 1024);
        assert_eq!(config.max_chunk_bytes, 4096);
        assert!(config.instrument);
        assert_eq!(config.backend, "chunked");

        let config = load_from(
            Some(file.path()),
            env(&[("NATIVEMEM_MAX_CHUNKS", "16"), ("NATIVEMEM_INSTRUMENT", "false")]),
        )
        .unwrap();
        assert_eq!(config.max_chunks, 16);
        assert_eq!(config.max_chunk_bytes, 4096);
        assert!(!config.instrument);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(load_from(None, env(&[("NATIVEMEM_MAX_CHUNKS", "1")])).is_err());
        assert!(load_from(Some(Path::new("/nonexistent/nativemem.toml")), env(&[])).is_err());
    }
}

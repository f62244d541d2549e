// RebelDB™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// main.rs:

mod settings;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use colored::*;
use nativemem::address::{
    decode_index, decode_offset, CHUNK_BITS, MAX_CHUNKS, MAX_CHUNK_BYTES, OFFSET_BITS, OFFSET_MASK,
};
use nativemem::{AccessMode, MemoryConfig, MemoryRegistry, NativeMemory, ScopedBuffer};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(about = "Chunked native memory toolbox")]
struct Args {
    /// Settings file; `NATIVEMEM_*` variables override its values.
    #[clap(short, long)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the address layout.
    Layout,
    /// Hammer the allocator from several threads.
    Stress {
        #[clap(short, long, default_value = "4")]
        threads: usize,
        #[clap(short, long, default_value = "10000")]
        rounds: usize,
        /// Upper bound of a single allocation.
        #[clap(short, long, default_value = "256")]
        size: u64,
    },
    /// Walk through typed access and reallocation.
    Demo,
}

fn hex(address: u64) -> String {
    format!("{address:#018x}")
}

fn layout(config: &MemoryConfig) {
    println!("{}", "address layout".bold());
    println!("  offset bits      {OFFSET_BITS}");
    println!("  chunk bits       {CHUNK_BITS}");
    println!("  offset mask      {}", hex(OFFSET_MASK));
    println!("  max chunks       {MAX_CHUNKS}");
    println!("  max chunk bytes  {MAX_CHUNK_BYTES}");
    println!("{}", "configured".bold());
    println!("  backend          {}", config.backend);
    println!("  max chunks       {}", config.max_chunks);
    println!("  max chunk bytes  {}", config.max_chunk_bytes);
    println!("  instrument       {}", config.instrument);
}

fn worker(
    memory: &dyn NativeMemory,
    live: &Mutex<HashSet<u64>>,
    rounds: usize,
    size: u64,
) -> Result<u64> {
    let mut rng = rand::thread_rng();
    let mut bytes = 0;
    for round in 0..rounds {
        let len = rng.gen_range(1..=size);
        let address = memory.allocate(len)?;
        if !live.lock().insert(address) {
            bail!("address {} handed out while still live", hex(address));
        }

        let pattern = (round % 251) as u8;
        memory.set_memory(address, len, pattern)?;
        let mut readback = vec![0; len as usize];
        memory.read_bytes(address, &mut readback)?;
        if readback.iter().any(|byte| *byte != pattern) {
            bail!("chunk {} lost its contents", decode_index(address));
        }

        live.lock().remove(&address);
        memory.free(address)?;
        bytes += len;
    }
    Ok(bytes)
}

fn stress(memory: &dyn NativeMemory, threads: usize, rounds: usize, size: u64) -> Result<()> {
    if threads == 0 || size == 0 {
        bail!("threads and size must be positive");
    }
    let live = Mutex::new(HashSet::new());
    let started = Instant::now();
    let bytes = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..threads)
            .map(|_| scope.spawn(|| worker(memory, &live, rounds, size)))
            .collect();
        workers.into_iter().try_fold(0u64, |total, handle| {
            let bytes = handle
                .join()
                .map_err(|_| anyhow!("stress worker panicked"))??;
            Ok::<_, anyhow::Error>(total + bytes)
        })
    })?;
    let elapsed = started.elapsed();
    println!(
        "{}: {} allocations, {} bytes in {:.2?} ({:.0} allocations/s)",
        "OK".green(),
        threads * rounds,
        bytes,
        elapsed,
        (threads * rounds) as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    Ok(())
}

fn demo(memory: &dyn NativeMemory) -> Result<()> {
    let address = memory.allocate(16)?;
    println!(
        "allocate(16)      -> {} (chunk {}, offset {})",
        hex(address),
        decode_index(address),
        decode_offset(address)
    );

    memory.put_int(address, 0x5EB_E1DB, AccessMode::Plain)?;
    memory.put_char(address + 4, 'R' as u16, AccessMode::Opaque)?;
    memory.put_double(address + 8, std::f64::consts::PI, AccessMode::ReleaseAcquire)?;
    println!("get_int(+0)       -> {:#x}", memory.get_int(address, AccessMode::Plain)?);
    let letter = memory.get_char(address + 4, AccessMode::Opaque)?;
    println!("get_char(+4)      -> {:?}", char::from_u32(letter.into()));
    println!("get_double(+8)    -> {}", memory.get_double(address + 8, AccessMode::Volatile)?);

    let moved = memory.reallocate(address, 32)?;
    println!(
        "reallocate(32)    -> {} keeps {:#x}",
        hex(moved),
        memory.get_int(moved, AccessMode::Plain)?
    );
    match memory.get_long(moved + 4, AccessMode::Volatile) {
        Ok(_) => bail!("misaligned atomic access was accepted"),
        Err(err) => println!("get_long(+4)      -> {}: {}", "ERR".red(), err),
    }
    println!(
        "compare_and_set   -> {}",
        memory.compare_and_set_long(moved + 16, 0, 42)?
    );
    memory.free(moved)?;

    let buffer = ScopedBuffer::open(memory, 12)?;
    buffer.view().write(0, b"scoped bytes")?;
    println!(
        "scoped {}    -> {:?}",
        hex(buffer.address()),
        String::from_utf8_lossy(&buffer.view().to_vec()?)
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let config = settings::load(args.config.as_deref())?;
    let memory = MemoryRegistry::with_defaults().create(&config)?;

    match args.command {
        Command::Layout => layout(&config),
        Command::Stress {
            threads,
            rounds,
            size,
        } => stress(memory.as_ref(), threads, rounds, size)?,
        Command::Demo => demo(memory.as_ref())?,
    }
    Ok(())
}

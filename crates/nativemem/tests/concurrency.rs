// RebelDB™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// concurrency.rs:

use nativemem::address::{decode_index, decode_offset};
use nativemem::{AccessMode, ChunkedMemory, MemoryError, NativeMemory};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

const THREADS: usize = 8;
const ROUNDS: usize = 500;

#[test]
fn live_addresses_are_distinct() {
    let memory = ChunkedMemory::new();
    let live = Mutex::new(HashSet::new());

    std::thread::scope(|scope| {
        for thread in 0..THREADS {
            let memory = &memory;
            let live = &live;
            scope.spawn(move || {
                let tag = thread as i64;
                for round in 0..ROUNDS {
                    let address = memory.allocate(64).unwrap();
                    assert_eq!(decode_offset(address), 0);
                    assert_ne!(decode_index(address), 0);
                    assert!(live.lock().unwrap().insert(address), "address handed out twice");

                    memory.put_long(address, tag, AccessMode::Volatile).unwrap();
                    memory.put_long(address + 56, round as i64, AccessMode::Plain).unwrap();
                    std::thread::yield_now();
                    assert_eq!(memory.get_long(address, AccessMode::Volatile).unwrap(), tag);
                    assert_eq!(memory.get_long(address + 56, AccessMode::Plain).unwrap(), round as i64);

                    assert!(live.lock().unwrap().remove(&address));
                    memory.free(address).unwrap();
                }
            });
        }
    });

    assert_eq!(memory.live_chunks(), 0);
    assert!(memory.table_len() as usize <= THREADS + 1);
}

#[test]
fn readers_survive_concurrent_free() {
    let memory = ChunkedMemory::new();
    let done = AtomicBool::new(false);
    let address = memory.allocate(8).unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            while !done.load(Ordering::Acquire) {
                match memory.get_long(address, AccessMode::ReleaseAcquire) {
                    Ok(_) | Err(MemoryError::InvalidAddress { .. }) => {}
                    Err(err) => panic!("unexpected error: {err}"),
                }
            }
        });
        scope.spawn(|| {
            let mut current = address;
            for _ in 0..1000 {
                memory.free(current).unwrap();
                current = memory.allocate(8).unwrap();
            }
            memory.free(current).unwrap();
            done.store(true, Ordering::Release);
        });
    });

    assert_eq!(memory.live_chunks(), 0);
}

#[test]
fn concurrent_reallocation_keeps_contents() {
    let memory = ChunkedMemory::new();
    std::thread::scope(|scope| {
        for thread in 0..THREADS {
            let memory = &memory;
            scope.spawn(move || {
                let mut address = memory.allocate(8).unwrap();
                memory.put_long(address, thread as i64, AccessMode::Plain).unwrap();
                for size in 9..200 {
                    address = memory.reallocate(address, size).unwrap();
                    assert_eq!(memory.region_size(address).unwrap(), size);
                    assert_eq!(memory.get_long(address, AccessMode::Plain).unwrap(), thread as i64);
                }
                memory.free(address).unwrap();
            });
        }
    });
    assert_eq!(memory.live_chunks(), 0);
}

#[test]
fn compare_and_set_counts_every_increment() {
    let memory = ChunkedMemory::new();
    let address = memory.allocate(16).unwrap();
    std::thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                for _ in 0..ROUNDS {
                    loop {
                        let current = memory.get_long(address + 8, AccessMode::Volatile).unwrap();
                        if memory
                            .compare_and_set_long(address + 8, current, current + 1)
                            .unwrap()
                        {
                            break;
                        }
                    }
                }
            });
        }
    });
    assert_eq!(
        memory.get_long(address + 8, AccessMode::Plain).unwrap(),
        (THREADS * ROUNDS) as i64
    );
}

#[cfg(target_os = "linux")]
fn resident_bytes() -> u64 {
    let statm = std::fs::read_to_string("/proc/self/statm").unwrap();
    let pages: u64 = statm.split_whitespace().nth(1).unwrap().parse().unwrap();
    pages * 4096
}

#[cfg(target_os = "linux")]
#[test]
fn freed_regions_are_released() {
    const REGION: u64 = 32 << 20;
    const PAGE: u64 = 4096;

    let memory = ChunkedMemory::new();
    let before = resident_bytes();
    for round in 0..24 {
        let address = memory.allocate(REGION).unwrap();
        for page in (0..REGION).step_by(PAGE as usize) {
            memory.put_byte(address + page, round, AccessMode::Plain).unwrap();
        }
        if round % 2 == 0 {
            memory.free(address).unwrap();
        } else {
            let moved = memory.reallocate(address, PAGE).unwrap();
            memory.free(moved).unwrap();
        }
    }
    let retained = resident_bytes().saturating_sub(before);

    assert_eq!(memory.live_chunks(), 0);
    assert!(
        retained < 8 * REGION,
        "{} MiB still resident after every region was freed",
        retained >> 20
    );
}

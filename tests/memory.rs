//! Memory-window tests that attach to the test process itself.
#![cfg(target_os = "linux")]

use rngscope::{memory::ProcessMemory, signature::Signature, Pid};

fn own_pid() -> Pid {
    std::process::id() as Pid
}

#[test]
fn region_snapshot_is_sane() {
    let mem = ProcessMemory::open(own_pid()).expect("can attach to ourselves");

    let regions = mem.regions();
    assert!(!regions.is_empty());
    assert!(regions.iter().all(|r| r.start < r.end));
    assert!(regions.iter().any(|r| r.is_readable()));
    assert_eq!(mem.pid(), own_pid());
}

#[test]
fn reads_are_exact_and_little_endian() {
    let mut mem = ProcessMemory::open(own_pid()).expect("can attach to ourselves");

    let buf: [u8; 8] = [1, 2, 3, 4, 0x78, 0x56, 0x34, 0x12];
    let addr = buf.as_ptr() as u64;

    assert_eq!(mem.read_vec(addr, 8).expect("read own stack"), buf);
    assert_eq!(mem.read_u32(addr + 4).expect("read own stack"), 0x1234_5678);
}

#[test]
fn reading_an_unmapped_address_fails() {
    let mut mem = ProcessMemory::open(own_pid()).expect("can attach to ourselves");

    // The zero page is never mapped for us.
    assert!(mem.read_vec(0, 16).is_err());
}

/// Bytes that exist nowhere in the binary: derived at runtime, so the only
/// raw occurrence in our address space is the buffer itself.
fn runtime_payload(len: usize) -> Vec<u8> {
    (0..len as u32)
        .map(|i| (i.wrapping_mul(167).wrapping_add(89) % 251) as u8 ^ 0x5a)
        .collect()
}

#[test]
fn finds_a_signature_in_our_own_memory() {
    let payload = runtime_payload(24);
    let pattern = payload
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ");
    let sig: Signature = pattern.parse().expect("generated pattern is valid");

    let mut mem = ProcessMemory::open(own_pid()).expect("can attach to ourselves");
    let found = mem.find_signature(&sig).expect("signature must be found");
    assert_eq!(found, payload.as_ptr() as u64);
}

#[test]
fn finds_a_signature_with_wildcards() {
    let payload = runtime_payload(24);
    let pattern = payload
        .iter()
        .enumerate()
        .map(|(i, b)| {
            // Punch holes into the middle of the pattern.
            if i % 5 == 3 {
                "??".to_string()
            } else {
                format!("{b:02X}")
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    let sig: Signature = pattern.parse().expect("generated pattern is valid");

    let mut mem = ProcessMemory::open(own_pid()).expect("can attach to ourselves");
    let found = mem.find_signature(&sig).expect("signature must be found");
    assert_eq!(found, payload.as_ptr() as u64);
}

//! Process-discovery tests against the live process table.
#![cfg(target_os = "linux")]

use rngscope::{
    process::{find_process, list_processes},
    Pid,
};

fn own_name() -> String {
    std::fs::read_to_string("/proc/self/status")
        .expect("read own status")
        .lines()
        .find_map(|line| line.strip_prefix("Name:"))
        .expect("status has a Name record")
        .trim()
        .to_string()
}

#[test]
fn listing_includes_ourselves() {
    let pid = std::process::id() as Pid;
    assert!(list_processes("")
        .expect("walk the process table")
        .any(|p| p.pid == pid));
}

#[test]
fn find_matches_on_a_name_substring() {
    let name = own_name();
    let needle = &name[..name.len().min(6)];

    let found = find_process(needle)
        .expect("walk the process table")
        .expect("we are running");
    assert!(found.name.contains(needle));
}

#[test]
fn find_misses_on_nonsense() {
    assert!(find_process("no-process-is-called-this")
        .expect("walk the process table")
        .is_none());
}

//! Discovery of the target process through the /proc process table.

use {
    crate::linux::{errors::ProcessListError, Pid},
    log::debug,
    procfs_core::{process::Status, FromRead},
};

/// An identified candidate process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub name: String,
}

/// Returns the first live process whose short name contains `name`.
///
/// Matching is case-sensitive. Returns `None` when nothing matches.
pub fn find_process(name: &str) -> Result<Option<ProcessInfo>, ProcessListError> {
    let found = list_processes(name)?.next();
    debug!(
        "process lookup for `{}`: {}",
        name,
        found
            .as_ref()
            .map_or_else(|| "(not found)".into(), |p| format!("pid {}", p.pid)),
    );
    Ok(found)
}

/// Walks the process table, yielding every process whose short name
/// contains `filter`. An empty filter yields everything.
///
/// A process that vanishes between enumeration and the status read is
/// skipped, not reported.
pub fn list_processes(
    filter: &str,
) -> Result<impl Iterator<Item = ProcessInfo> + '_, ProcessListError> {
    let entries = std::fs::read_dir("/proc").map_err(ProcessListError::ReadProcDir)?;

    Ok(entries.filter_map(move |entry| {
        let entry = entry.ok()?;
        let pid: Pid = entry.file_name().to_str()?.parse().ok()?;

        // The status record is gone if the process just exited.
        let status = Status::from_file(entry.path().join("status")).ok()?;
        if status.name.contains(filter) {
            Some(ProcessInfo {
                pid,
                name: status.name,
            })
        } else {
            None
        }
    }))
}

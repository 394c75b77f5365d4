use {crate::linux::Pid, procfs_core::ProcError, thiserror::Error};

#[derive(Debug, Error)]
pub enum ProcessListError {
    #[error("failed to read the process table at /proc")]
    ReadProcDir(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("failed to open the memory of pid {pid}")]
    OpenMem {
        pid: Pid,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read the mapped regions of pid {pid}")]
    ReadMaps {
        pid: Pid,
        #[source]
        source: ProcError,
    },
    #[error("failed to read {count} bytes at {addr:#x}")]
    ReadMem {
        addr: u64,
        count: usize,
        #[source]
        source: std::io::Error,
    },
}

impl MemoryError {
    /// Whether the target refused access outright, as opposed to a
    /// transient read fault. Attach attempts back off longer on these.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            MemoryError::OpenMem { source, .. } | MemoryError::ReadMem { source, .. } => {
                source.kind() == std::io::ErrorKind::PermissionDenied
            }
            MemoryError::ReadMaps { source, .. } => match source {
                ProcError::PermissionDenied(_) => true,
                ProcError::Io(e, _) => e.kind() == std::io::ErrorKind::PermissionDenied,
                _ => false,
            },
        }
    }
}

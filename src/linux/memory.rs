//! Read-only window into another process's address space.
//!
//! The window owns the `/proc/<pid>/mem` handle and a snapshot of the
//! mapped regions taken at attach time. The handle is released when the
//! window is dropped, on every exit path.

use {
    crate::linux::{errors::MemoryError, signature, signature::Signature, Pid},
    byteorder::{ByteOrder, LittleEndian},
    log::debug,
    procfs_core::{
        process::{MMPermissions, MemoryMaps},
        FromRead,
    },
    std::{
        fs::File,
        io::{Read, Seek, SeekFrom},
    },
};

/// One mapped range of the target address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRegion {
    pub start: u64,
    pub end: u64,
    pub perms: MMPermissions,
}

impl MapRegion {
    pub fn is_readable(&self) -> bool {
        self.perms.contains(MMPermissions::READ)
    }
}

/// Read access to one process.
#[derive(Debug)]
pub struct ProcessMemory {
    pid: Pid,
    mem: File,
    maps: Vec<MapRegion>,
}

impl ProcessMemory {
    /// Attaches to `pid`: opens its memory and snapshots its mapped
    /// regions. Fails with a permission error when the target is not ours
    /// to read.
    pub fn open(pid: Pid) -> Result<Self, MemoryError> {
        let mem_path = format!("/proc/{pid}/mem");
        debug!("opening memory file at {mem_path}");
        let mem = File::open(mem_path).map_err(|source| MemoryError::OpenMem { pid, source })?;

        let maps_path = format!("/proc/{pid}/maps");
        let maps_file = File::open(&maps_path).map_err(|e| MemoryError::ReadMaps {
            pid,
            source: procfs_core::ProcError::Io(e, Some(maps_path.into())),
        })?;
        let maps = MemoryMaps::from_read(maps_file)
            .map_err(|source| MemoryError::ReadMaps { pid, source })?
            .into_iter()
            .map(|m| MapRegion {
                start: m.address.0,
                end: m.address.1,
                perms: m.perms,
            })
            .collect();

        Ok(Self { pid, mem, maps })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The region snapshot taken at attach time.
    pub fn regions(&self) -> &[MapRegion] {
        &self.maps
    }

    /// Reads exactly `buf.len()` bytes starting at `addr`. A short read is
    /// an error.
    pub fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.mem
            .seek(SeekFrom::Start(addr))
            .and_then(|_| self.mem.read_exact(buf))
            .map_err(|source| MemoryError::ReadMem {
                addr,
                count: buf.len(),
                source,
            })
    }

    /// Reads `count` bytes starting at `addr` into a fresh buffer.
    pub fn read_vec(&mut self, addr: u64, count: usize) -> Result<Vec<u8>, MemoryError> {
        let mut buf = vec![0u8; count];
        self.read(addr, &mut buf)?;
        Ok(buf)
    }

    /// Reads a little-endian unsigned 32-bit word at `addr`.
    pub fn read_u32(&mut self, addr: u64) -> Result<u32, MemoryError> {
        let mut buf = [0u8; 4];
        self.read(addr, &mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    /// Scans the readable regions for `sig`, lowest address first.
    pub fn find_signature(&mut self, sig: &Signature) -> Option<u64> {
        signature::scan(&mut self.mem, &self.maps, sig)
    }
}

impl Drop for ProcessMemory {
    fn drop(&mut self) {
        debug!("closing memory file of pid {}", self.pid);
    }
}

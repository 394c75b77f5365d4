//! Locating and reading the generator state inside the target process.
//!
//! The game stores its MT19937 index cursor right behind the 624-word state
//! array. The store instruction writing that cursor is bracketed by a fixed
//! byte signature; decoding the RIP-relative operand of its leading
//! `mov r/m32` gives the cursor address, and the state array sits
//! `4 * 624` bytes below it.

use {
    crate::{
        linux::{errors::MemoryError, memory::ProcessMemory, signature::Signature},
        mt19937::{MtState, N},
    },
    byteorder::{ByteOrder, LittleEndian},
    log::{debug, warn},
    std::sync::LazyLock,
};

/// Signature bracketing the `mov mti, <imm32>` of the target build. Tied to
/// that build; when the binary changes there is no fallback.
pub const MTI_SIGNATURE: &str = "8B 15 ?? ?? ?? ?? 48 63 ?? 48 8D ?? ?? ?? ?? ?? \
                                 FF C2 89 15 ?? ?? ?? ?? 8B 0C 81 8B C1 C1 E8 0B \
                                 33 C8 8B C1 25 ?? ?? ?? ?? C1 E0 07 33 C8 8B C1 \
                                 25 ?? ?? ?? ?? C1 E0 0F 33 C8 8B C1 C1 E8 12 33 \
                                 C1 48 83 C4 28";

static MTI_SIG: LazyLock<Signature> =
    LazyLock::new(|| MTI_SIGNATURE.parse().expect("the signature literal is well-formed"));

/// Bytes in one state snapshot: the 624-word array plus the index cursor.
pub const MT_SNAPSHOT_BYTES: usize = (N + 1) * 4;

/// Where the generator state lives in the target address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtAddresses {
    pub mti_addr: u64,
    pub mt_addr: u64,
}

impl MtAddresses {
    /// Derives the state-array address from the cursor address; the array
    /// ends where the cursor begins.
    pub fn from_mti_addr(mti_addr: u64) -> Self {
        Self {
            mti_addr,
            mt_addr: mti_addr - (4 * N) as u64,
        }
    }
}

/// One observed snapshot of the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtData {
    pub mt_els: Box<MtState>,
    mti_raw: u32,
}

impl MtData {
    pub fn from_bytes(bytes: &[u8; MT_SNAPSHOT_BYTES]) -> Self {
        let mut mt_els = Box::new([0u32; N]);
        LittleEndian::read_u32_into(&bytes[..N * 4], &mut mt_els[..]);
        let mti_raw = LittleEndian::read_u32(&bytes[N * 4..]);
        Self { mt_els, mti_raw }
    }

    /// A cursor beyond the twist boundary means the addresses went stale.
    /// The boundary value 624 itself is legitimate and normalizes to 0.
    pub fn is_valid(&self) -> bool {
        self.mti_raw <= N as u32
    }

    /// The observed cursor, normalized into [0, 624).
    pub fn mti(&self) -> u32 {
        self.mti_raw % N as u32
    }

    /// The state word the cursor points at.
    pub fn element_at_cursor(&self) -> u32 {
        self.mt_els[self.mti() as usize]
    }
}

/// Resolves a RIP-relative displacement: the offset is signed and relative
/// to the address of the byte following the 4-byte displacement field.
fn rip_relative(field_addr: u64, disp: u32) -> u64 {
    field_addr.wrapping_add(4).wrapping_add(disp as i32 as i64 as u64)
}

/// Scans the target for the cursor-store signature and decodes the state
/// addresses from it. `None` when the signature does not occur.
pub fn find_mt_addresses(mem: &mut ProcessMemory) -> Result<Option<MtAddresses>, MemoryError> {
    let Some(sig_addr) = mem.find_signature(&MTI_SIG) else {
        warn!("cannot find the mti signature in pid {}", mem.pid());
        return Ok(None);
    };

    // The operand follows the two instruction bytes the signature starts
    // with.
    let disp_addr = sig_addr + 2;
    let disp = mem.read_u32(disp_addr)?;
    let addrs = MtAddresses::from_mti_addr(rip_relative(disp_addr, disp));

    debug!(
        "mti signature at {sig_addr:#x}, displacement {disp:#x}, mti_addr {:#x}, mt_addr {:#x}",
        addrs.mti_addr, addrs.mt_addr
    );
    Ok(Some(addrs))
}

/// Reads one full state snapshot (array plus cursor) at `mt_addr`.
pub fn read_mt_and_mti(mem: &mut ProcessMemory, mt_addr: u64) -> Result<MtData, MemoryError> {
    let mut raw = [0u8; MT_SNAPSHOT_BYTES];
    mem.read(mt_addr, &mut raw)?;

    let data = MtData::from_bytes(&raw);
    if data.mti_raw == N as u32 {
        debug!("observed cursor at the twist boundary, treating as 0");
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_literal_parses() {
        let sig: Signature = MTI_SIGNATURE.parse().unwrap();
        assert_eq!(sig.len(), 69);
    }

    #[test]
    fn addresses_keep_the_array_below_the_cursor() {
        let addrs = MtAddresses::from_mti_addr(0x7f00_0000_2000);
        assert_eq!(addrs.mt_addr + (4 * N) as u64, addrs.mti_addr);
    }

    #[test]
    fn rip_relative_forward_and_backward() {
        assert_eq!(rip_relative(0x1000, 0x20), 0x1024);
        // A negative displacement reaches below the instruction.
        assert_eq!(rip_relative(0x1000, (-0x30i32) as u32), 0x0fd4);
    }

    #[test]
    fn snapshot_decoding_is_little_endian() {
        let mut raw = [0u8; MT_SNAPSHOT_BYTES];
        raw[0..4].copy_from_slice(&[0x78, 0x56, 0x34, 0x12]);
        raw[N * 4..].copy_from_slice(&100u32.to_le_bytes());

        let data = MtData::from_bytes(&raw);
        assert_eq!(data.mt_els[0], 0x1234_5678);
        assert!(data.is_valid());
        assert_eq!(data.mti(), 100);
        assert_eq!(data.element_at_cursor(), 0);
    }

    #[test]
    fn boundary_cursor_normalizes_and_beyond_is_invalid() {
        let mut raw = [0u8; MT_SNAPSHOT_BYTES];

        raw[N * 4..].copy_from_slice(&(N as u32).to_le_bytes());
        let boundary = MtData::from_bytes(&raw);
        assert!(boundary.is_valid());
        assert_eq!(boundary.mti(), 0);

        raw[N * 4..].copy_from_slice(&(N as u32 + 1).to_le_bytes());
        assert!(!MtData::from_bytes(&raw).is_valid());
    }
}

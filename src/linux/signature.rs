//! PEID-style byte signatures and the region-walking scanner.
//!
//! A signature is a whitespace-separated list of tokens, each either two
//! hex digits (a concrete byte) or `??` (exactly one arbitrary byte):
//!
//! ```text
//! 5A ?? 90 9E
//! ```

use {
    crate::linux::memory::MapRegion,
    log::{debug, info, warn},
    std::{
        fmt,
        io::{Read, Seek, SeekFrom},
        str::FromStr,
    },
    thiserror::Error,
};

/// Scan chunk size. Reads are amortized over chunks of this many bytes
/// instead of one syscall per compared byte.
const SCAN_CHUNK: usize = 0x10000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureParseError {
    #[error("empty signature pattern")]
    Empty,
    #[error("bad signature token `{0}`, expected two hex digits or ??")]
    BadToken(String),
}

/// A parsed signature; `None` elements match any byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(Vec<Option<u8>>);

impl Signature {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn elements(&self) -> &[Option<u8>] {
        &self.0
    }
}

impl FromStr for Signature {
    type Err = SignatureParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let elements = s
            .split_whitespace()
            .map(|token| match token {
                "??" => Ok(None),
                t if t.len() == 2 => u8::from_str_radix(t, 16)
                    .map(Some)
                    .map_err(|_| SignatureParseError::BadToken(t.to_string())),
                t => Err(SignatureParseError::BadToken(t.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if elements.is_empty() {
            return Err(SignatureParseError::Empty);
        }
        Ok(Signature(elements))
    }
}

impl fmt::Display for Signature {
    /// Abbreviated form for log lines.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, el) in self.0.iter().take(6).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match el {
                Some(b) => write!(f, "{b:02X}")?,
                None => f.write_str("??")?,
            }
        }
        if self.0.len() > 6 {
            f.write_str("...")?;
        }
        Ok(())
    }
}

/// Finds the first occurrence of `sig` in the readable `regions` of a
/// seekable byte source, returning its starting address.
///
/// The match position is carried across two regions when the second begins
/// exactly where the first ended, so a signature may straddle contiguous
/// mappings. A read failure inside a region (possible even with the read
/// permission bit set) resets the match and moves on to the next region.
pub(crate) fn scan<R>(src: &mut R, regions: &[MapRegion], sig: &Signature) -> Option<u64>
where
    R: Read + Seek,
{
    let pattern = sig.elements();
    let mut buf = vec![0u8; SCAN_CHUNK];

    // Current position in the signature, and where the last scanned region
    // ended.
    let mut sigpos = 0usize;
    let mut prev_end = 0u64;

    for region in regions.iter().filter(|r| r.is_readable()) {
        if sigpos > 0 && region.start == prev_end {
            debug!("search bridging across region boundary at {:#x}", region.start);
        } else {
            sigpos = 0;
        }
        prev_end = region.end;

        let mut addr = region.start;
        'chunks: while addr < region.end {
            let len = SCAN_CHUNK.min((region.end - addr) as usize);
            let chunk = &mut buf[..len];
            let read = src
                .seek(SeekFrom::Start(addr))
                .and_then(|_| src.read_exact(chunk));
            if let Err(e) = read {
                // Happens on some regions despite the read permission bit.
                warn!(
                    "cannot read memory at {addr:#x} in region {:#x}-{:#x}: {e}",
                    region.start, region.end
                );
                sigpos = 0;
                break 'chunks;
            }

            for &byte in chunk.iter() {
                match pattern[sigpos] {
                    Some(expected) if expected != byte => sigpos = 0,
                    _ => sigpos += 1,
                }
                addr += 1;

                if sigpos == pattern.len() {
                    return Some(addr - pattern.len() as u64);
                }
            }
        }
    }

    info!("signature {sig} not found");
    None
}

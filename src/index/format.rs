//! Binary flat-index format
//!
//! ```text
//! Offset   Size    Type        Description
//! ─────────────────────────────────────────────
//! 0x00     8       [u8; 8]     Magic: "DMFLAT01"
//! 0x08     8       u64 LE      N: Number of vectors
//! 0x10     4       u32 LE      D: Dimensions
//! 0x14     4       u32 LE      Metric (0 = squared L2)
//! 0x18     N*D*4   [f32]       Row-major vector data (Little Endian)
//! ```

use super::FlatIndex;
use thiserror::Error;

/// Magic bytes identifying a flat index file
pub const MAGIC: [u8; 8] = *b"DMFLAT01";

/// Header size in bytes: 8 (magic) + 8 (count) + 4 (dims) + 4 (metric)
pub const HEADER_SIZE: usize = 24;

const METRIC_SQUARED_L2: u32 = 0;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormatError {
    #[error("Invalid magic bytes: expected DMFLAT01")]
    InvalidMagic,

    #[error("Truncated or oversized data: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("Unsupported metric: {0}")]
    UnsupportedMetric(u32),

    #[error("Invalid shape: {count} vectors of dimension {dimension}")]
    InvalidShape { count: u64, dimension: u32 },
}

/// Serialize an index to bytes
pub fn encode_index(index: &FlatIndex) -> Vec<u8> {
    let count = index.ntotal();
    let dimension = index.dimension();

    let mut buf = Vec::with_capacity(HEADER_SIZE + count * dimension * 4);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&(count as u64).to_le_bytes());
    buf.extend_from_slice(&(dimension as u32).to_le_bytes());
    buf.extend_from_slice(&METRIC_SQUARED_L2.to_le_bytes());

    for value in index.values() {
        buf.extend_from_slice(&value.to_le_bytes());
    }

    buf
}

/// Deserialize an index from bytes
pub fn decode_index(bytes: &[u8]) -> Result<FlatIndex, FormatError> {
    if bytes.len() < HEADER_SIZE {
        return Err(FormatError::Length {
            expected: HEADER_SIZE,
            actual: bytes.len(),
        });
    }

    if bytes[0..8] != MAGIC {
        return Err(FormatError::InvalidMagic);
    }

    let count = u64::from_le_bytes(read_array(&bytes[8..16]));
    let dimension = u32::from_le_bytes(read_array(&bytes[16..20]));
    let metric = u32::from_le_bytes(read_array(&bytes[20..24]));

    if metric != METRIC_SQUARED_L2 {
        return Err(FormatError::UnsupportedMetric(metric));
    }

    if dimension == 0 && count > 0 {
        return Err(FormatError::InvalidShape { count, dimension });
    }

    let expected = usize::try_from(count)
        .ok()
        .and_then(|n| n.checked_mul(dimension as usize))
        .and_then(|values| values.checked_mul(4))
        .and_then(|payload| payload.checked_add(HEADER_SIZE))
        .ok_or(FormatError::InvalidShape { count, dimension })?;

    if bytes.len() != expected {
        return Err(FormatError::Length {
            expected,
            actual: bytes.len(),
        });
    }

    let data: Vec<f32> = bytes[HEADER_SIZE..]
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes(read_array(b)))
        .collect();

    FlatIndex::from_flat(dimension as usize, data)
        .map_err(|_| FormatError::InvalidShape { count, dimension })
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

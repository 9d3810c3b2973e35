use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::coords::CHUNK_VOLUME;

/// Longest run a single `(value, count)` pair can hold.
pub const MAX_RUN: usize = u8::MAX as usize;

/// Run-length encode voxel bytes into `(value, count)` pairs.
pub fn encode(voxels: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut iter = voxels.iter().copied();
    let Some(mut current) = iter.next() else {
        return out;
    };
    let mut run: usize = 1;

    for value in iter {
        if value == current && run < MAX_RUN {
            run += 1;
        } else {
            out.push(current);
            out.push(run as u8);
            current = value;
            run = 1;
        }
    }
    out.push(current);
    out.push(run as u8);
    out
}

/// Expand `(value, count)` pairs into exactly one chunk of voxels.
///
/// Truncated input leaves the tail as air, input describing more than one
/// chunk is cut off at capacity, and a dangling odd byte is ignored.
pub fn decode(encoded: &[u8]) -> Box<[u8; CHUNK_VOLUME]> {
    let mut out = Box::new([0u8; CHUNK_VOLUME]);
    let mut cursor = 0;

    for pair in encoded.chunks_exact(2) {
        if cursor >= CHUNK_VOLUME {
            break;
        }
        let (value, count) = (pair[0], pair[1] as usize);
        let end = (cursor + count).min(CHUNK_VOLUME);
        out[cursor..end].fill(value);
        cursor = end;
    }
    out
}

/// Whether every voxel is air.
pub fn is_chunk_empty(voxels: &[u8]) -> bool {
    voxels.iter().all(|&v| v == 0)
}

/// Number of non-air voxels.
pub fn count_non_empty(voxels: &[u8]) -> usize {
    voxels.iter().filter(|&&v| v != 0).count()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("raw voxel payload must be {expected} bytes, got {actual}")]
    RawLength { expected: usize, actual: usize },
}

/// Voxel data as sent over the wire. The encoding is always stated
/// explicitly, never inferred from the length of `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "lowercase")]
pub enum VoxelPayload {
    /// All air.
    Empty,
    /// Exactly 4096 bytes, one per voxel.
    Raw {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    /// `(value, count)` pairs as produced by [`encode`].
    Rle {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
}

impl VoxelPayload {
    /// Choose the smallest representation for a chunk's voxels.
    pub fn compress(voxels: &[u8; CHUNK_VOLUME]) -> Self {
        if is_chunk_empty(voxels) {
            return Self::Empty;
        }
        let rle = encode(voxels);
        if rle.len() < CHUNK_VOLUME {
            Self::Rle { data: rle }
        } else {
            Self::Raw {
                data: voxels.to_vec(),
            }
        }
    }

    pub fn decompress(&self) -> Result<Box<[u8; CHUNK_VOLUME]>, PayloadError> {
        match self {
            Self::Empty => Ok(Box::new([0u8; CHUNK_VOLUME])),
            Self::Rle { data } => Ok(decode(data)),
            Self::Raw { data } => {
                let array: [u8; CHUNK_VOLUME] = data.as_slice().try_into().map_err(|_| {
                    PayloadError::RawLength {
                        expected: CHUNK_VOLUME,
                        actual: data.len(),
                    }
                })?;
                Ok(Box::new(array))
            }
        }
    }
}

mod base64_bytes {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

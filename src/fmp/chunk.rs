//! The chunk tokenizer: one block payload in, a list of typed chunks out.
//!
//! The tokenizer is pure and version-independent; the file version only
//! changes how path segments are *interpreted*, never how chunks are
//! delimited. Parsing is tolerant: an unknown opcode or a chunk whose
//! declared length overruns the payload ends the list without error.

use std::ops::Range;

use byteorder::{BigEndian, ByteOrder};

/// The closed set of chunk kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkType {
    /// A value keyed by a small `ref_simple` integer under the current path.
    FieldRefSimple,
    /// A value keyed by a multi-byte reference; carried through unchanged.
    FieldRefLong,
    /// A value whose column is given by `segment_index`.
    DataSegment,
    /// Pushes one segment onto the path stack.
    PathPush,
    /// Pops the top path segment.
    PathPop,
    /// Carries no meaning for this crate.
    Noop,
}

/// One record inside a block payload. `data` is a range into the payload,
/// resolved through [`Chunk::data`].
#[derive(Debug, Clone)]
pub(crate) struct Chunk {
    pub ty: ChunkType,
    pub ref_simple: u8,
    pub segment_index: u8,
    pub data: Range<usize>,
}

impl Chunk {
    fn new(ty: ChunkType, data: Range<usize>) -> Self {
        Chunk {
            ty,
            ref_simple: 0,
            segment_index: 0,
            data,
        }
    }

    /// The chunk's data bytes within its block payload.
    pub fn data<'a>(&self, payload: &'a [u8]) -> &'a [u8] {
        payload.get(self.data.clone()).unwrap_or(&[])
    }
}

/// Tokenize a block payload into its chunk list.
pub(crate) fn parse_chunks(payload: &[u8]) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let len = payload.len();
    let mut pos = 0usize;

    while pos < len {
        let op = payload[pos];
        pos += 1;
        match op {
            // Zero padding fills the tail of v7-family payloads.
            0x00 => break,
            0x80 => chunks.push(Chunk::new(ChunkType::Noop, pos..pos)),
            // Field ref with a fixed data length equal to the opcode.
            0x01..=0x05 => {
                let n = op as usize;
                if pos + 1 + n > len {
                    break;
                }
                let mut chunk = Chunk::new(ChunkType::FieldRefSimple, pos + 1..pos + 1 + n);
                chunk.ref_simple = payload[pos];
                chunks.push(chunk);
                pos += 1 + n;
            }
            // Field ref with a one-byte length prefix.
            0x06 => {
                if pos + 2 > len {
                    break;
                }
                let n = payload[pos + 1] as usize;
                if pos + 2 + n > len {
                    break;
                }
                let mut chunk = Chunk::new(ChunkType::FieldRefSimple, pos + 2..pos + 2 + n);
                chunk.ref_simple = payload[pos];
                chunks.push(chunk);
                pos += 2 + n;
            }
            // Segmented data: segment index plus a two-byte length.
            0x07 => {
                if pos + 3 > len {
                    break;
                }
                let n = BigEndian::read_u16(&payload[pos + 1..pos + 3]) as usize;
                if pos + 3 + n > len {
                    break;
                }
                let mut chunk = Chunk::new(ChunkType::DataSegment, pos + 3..pos + 3 + n);
                chunk.segment_index = payload[pos];
                chunks.push(chunk);
                pos += 3 + n;
            }
            // Long field ref: skip the reference, keep the data.
            0x0E => {
                if pos >= len {
                    break;
                }
                let ref_len = payload[pos] as usize;
                let len_at = pos + 1 + ref_len;
                if len_at + 2 > len {
                    break;
                }
                let n = BigEndian::read_u16(&payload[len_at..len_at + 2]) as usize;
                if len_at + 2 + n > len {
                    break;
                }
                chunks.push(Chunk::new(ChunkType::FieldRefLong, len_at + 2..len_at + 2 + n));
                pos = len_at + 2 + n;
            }
            // Path pushes with a fixed segment width.
            0x20 | 0x28 | 0x30 => {
                let n = match op {
                    0x20 => 1,
                    0x28 => 2,
                    _ => 3,
                };
                if pos + n > len {
                    break;
                }
                chunks.push(Chunk::new(ChunkType::PathPush, pos..pos + n));
                pos += n;
            }
            // Path push with a length prefix.
            0x38 => {
                if pos >= len {
                    break;
                }
                let n = payload[pos] as usize;
                if n == 0 || n > 3 || pos + 1 + n > len {
                    break;
                }
                chunks.push(Chunk::new(ChunkType::PathPush, pos + 1..pos + 1 + n));
                pos += 1 + n;
            }
            0x3D | 0x40 => chunks.push(Chunk::new(ChunkType::PathPop, pos..pos)),
            // Unknown opcode: the remainder of the payload is not chunk data.
            _ => break,
        }
    }

    chunks
}

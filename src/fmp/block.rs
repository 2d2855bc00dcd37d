//! Block decoding: one raw sector in, a decoded block with its chunk list out.

use byteorder::{BigEndian, ByteOrder};
use log::trace;

use super::chunk::{self, Chunk};
use super::error::Result;
use super::header::FormatParams;
use super::sector::SectorSource;

/// Decoded blocks kept alive across traversal steps. Only a bounded prefix
/// of the chain is cached; everything past it is decoded per step and
/// dropped after its chunk list is consumed.
const MAX_CACHED_BLOCKS: usize = 1024;

/// A decoded sector: chain links, demasked payload, and the chunk list.
#[derive(Debug)]
pub(crate) struct Block {
    /// 1-based ordinal of this block in the file.
    pub this_id: usize,
    pub prev_id: u32,
    /// Next block ordinal in the chain; 0 terminates.
    pub next_id: u32,
    pub deleted: bool,
    pub payload: Vec<u8>,
    pub chunks: Vec<Chunk>,
}

impl Block {
    /// Decode the sector for 0-based block `index`.
    pub fn decode_at(source: &SectorSource, params: &FormatParams, index: usize) -> Result<Block> {
        let sector = source.sector(index, params)?;
        Ok(Block::from_sector(params, sector, index + 1))
    }

    /// Decode one raw sector.
    ///
    /// The sector head holds a flag byte, the prev/next chain links, and
    /// (for pre-v7 layouts) an explicit payload length. The payload is
    /// XOR-demasked here so the tokenizer and every consumer see plain
    /// bytes.
    pub fn from_sector(params: &FormatParams, sector: &[u8], this_id: usize) -> Block {
        let deleted = sector[0] & 0x01 != 0;
        let prev_id = BigEndian::read_u32(&sector[params.prev_offset..params.prev_offset + 4]);
        let next_id = BigEndian::read_u32(&sector[params.next_offset..params.next_offset + 4]);

        let max_payload = params.sector_size - params.head_len;
        let payload_len = match params.payload_len_offset {
            Some(off) => (BigEndian::read_u16(&sector[off..off + 2]) as usize).min(max_payload),
            None => max_payload,
        };

        let mut payload = sector[params.head_len..params.head_len + payload_len].to_vec();
        if params.xor_mask != 0 {
            for byte in &mut payload {
                *byte ^= params.xor_mask;
            }
        }

        let chunks = chunk::parse_chunks(&payload);
        trace!(
            "block {}: prev {}, next {}, {} payload bytes, {} chunks{}",
            this_id,
            prev_id,
            next_id,
            payload_len,
            chunks.len(),
            if deleted { " (deleted)" } else { "" },
        );

        Block {
            this_id,
            prev_id,
            next_id,
            deleted,
            payload,
            chunks,
        }
    }
}

/// Bounded prefix cache of decoded blocks, indexed by 0-based block index.
pub(crate) struct BlockCache {
    slots: Vec<Option<Block>>,
}

impl BlockCache {
    pub fn new(num_blocks: usize) -> Self {
        let capacity = num_blocks.min(MAX_CACHED_BLOCKS);
        BlockCache {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
        }
    }

    pub fn insert(&mut self, index: usize, block: Block) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(block);
        }
    }

    /// The cached block at `index`, decoding and caching it on first use.
    /// Returns `None` when `index` is beyond the cache prefix; the caller
    /// decodes such blocks into scratch storage scoped to one step.
    pub fn get_or_decode(
        &mut self,
        index: usize,
        decode: impl FnOnce() -> Result<Block>,
    ) -> Result<Option<&Block>> {
        match self.slots.get_mut(index) {
            None => Ok(None),
            Some(slot) => {
                if slot.is_none() {
                    *slot = Some(decode()?);
                }
                Ok(slot.as_ref())
            }
        }
    }
}

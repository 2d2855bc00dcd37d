//! Core FileMaker file reader module.

pub mod error;
pub mod models;
pub mod path;
pub mod text;

mod block;
mod chunk;
mod header;
mod metadata;
mod sector;
mod values;

use std::path::Path;

use chrono::NaiveDate;
use log::{debug, info};

use block::{Block, BlockCache};
use chunk::{Chunk, ChunkType};
use header::FormatParams;
use metadata::MetadataScanner;
use models::ChunkStatus;
use path::{PathSegment, PathStack, PathView};
use sector::SectorSource;
use values::{RowAssembler, ValueHandler};

pub use error::{FmpError, Result};
pub use models::{Column, ColumnType, FmpVersion, HandlerStatus, Metadata, Table};

/// Traversal starts at ordinal 2; block 1 only anchors the chain and
/// carries the block count in its `next_id`.
const CHAIN_START_ORDINAL: usize = 2;

/// An open FileMaker database file.
///
/// Holds the format parameters fixed by the header, a sector source
/// (in-memory for small files, a read-only mapping for large ones), the
/// decoded-block cache, and the path stack shared by all traversals.
///
/// All operations are synchronous; a file handle is owned exclusively by
/// its traversal. Resources are released on drop.
pub struct FmpFile {
    source: SectorSource,
    params: FormatParams,
    num_blocks: usize,
    filename: String,
    cache: BlockCache,
    path: PathStack,
}

impl std::fmt::Debug for FmpFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FmpFile")
            .field("filename", &self.filename)
            .field("num_blocks", &self.num_blocks)
            .finish_non_exhaustive()
    }
}

impl FmpFile {
    /// Open a FileMaker file from a path.
    ///
    /// Files over 100 MiB are memory-mapped; smaller files are read into
    /// memory up front.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be opened or read
    /// - The magic signature is missing (`BadMagic`)
    /// - The first block's sector count disagrees with the file size
    ///   (`BadSectorCount`)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("opening FileMaker file: {}", path.display());
        let source = SectorSource::open(path)?;
        Self::from_source(source, filename_of(path))
    }

    /// Open a FileMaker file with the memory-mapped backend regardless of
    /// its size. Both backends yield identical metadata and values.
    pub fn open_mapped(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("opening FileMaker file (mapped): {}", path.display());
        let source = SectorSource::open_mapped(path)?;
        Self::from_source(source, filename_of(path))
    }

    /// Open a FileMaker file from an in-memory buffer.
    ///
    /// Pre-v7 files synthesize their single table's name from the source
    /// filename; for a buffer there is none, so that name is empty.
    pub fn open_buffer(data: Vec<u8>) -> Result<Self> {
        Self::from_source(SectorSource::from_vec(data), String::new())
    }

    fn from_source(source: SectorSource, filename: String) -> Result<Self> {
        let params = header::parse(source.header()?)?;
        info!(
            "version {}, sector size {}, {} bytes",
            params.version.number(),
            params.sector_size,
            source.len()
        );

        let first = Block::decode_at(&source, &params, 0)?;
        let expected_size = (first.next_id as u64 + 1 + params.index_shift as u64)
            * params.sector_size as u64;
        if first.next_id == 0 || expected_size != source.len() as u64 {
            return Err(FmpError::BadSectorCount);
        }
        let num_blocks = first.next_id as usize;
        debug!("{} blocks in chain", num_blocks);

        let mut cache = BlockCache::new(num_blocks);
        cache.insert(0, first);

        Ok(FmpFile {
            source,
            params,
            num_blocks,
            filename,
            cache,
            path: PathStack::new(),
        })
    }

    /// The detected file format version.
    pub fn version(&self) -> FmpVersion {
        self.params.version
    }

    /// Sector size in bytes (1024 for pre-v7 files, 4096 otherwise).
    pub fn sector_size(&self) -> usize {
        self.params.sector_size
    }

    /// Payload XOR mask (0x5A for the v7 family, 0 otherwise).
    pub fn xor_mask(&self) -> u8 {
        self.params.xor_mask
    }

    /// Number of blocks in the file's chain.
    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// The application version string recorded in the header.
    pub fn version_string(&self) -> &str {
        &self.params.version_string
    }

    /// The creation date recorded in the header, when parseable.
    pub fn version_date(&self) -> Option<NaiveDate> {
        self.params.version_date
    }

    /// Extract the full table and column map in one pass over the file.
    pub fn discover_all_metadata(&mut self) -> Result<Metadata> {
        let mut scanner = MetadataScanner::new(
            self.params.version,
            self.params.encoding,
            &self.filename,
        );
        run_pass(
            &self.source,
            &self.params,
            self.num_blocks,
            &mut self.cache,
            &mut self.path,
            &mut scanner,
        )?;
        Ok(scanner.finish())
    }

    /// List the file's tables. Convenience facade over a metadata pass.
    pub fn list_tables(&mut self) -> Result<Vec<Table>> {
        Ok(self.discover_all_metadata()?.tables)
    }

    /// List one table's columns. Convenience facade over a metadata pass.
    pub fn list_columns(&mut self, table: &Table) -> Result<Vec<Column>> {
        let metadata = self.discover_all_metadata()?;
        Ok(metadata
            .tables
            .into_iter()
            .find(|t| t.index == table.index)
            .map(|t| t.columns)
            .unwrap_or_default())
    }

    /// Stream every row value of every non-skipped table to `handler`.
    ///
    /// The callback receives `(table_index, row, column, utf8_value)` where
    /// `table_index` matches [`Table::index`]. Rows of one table arrive in
    /// ascending order, with all values of one `(table, row)` contiguous;
    /// rows of different tables may interleave. Returning
    /// [`HandlerStatus::Abort`] cancels the traversal with `UserAborted`.
    pub fn read_all_values<F>(&mut self, metadata: &Metadata, mut handler: F) -> Result<()>
    where
        F: FnMut(usize, u64, &Column, &str) -> HandlerStatus,
    {
        let handler: &mut ValueHandler = &mut handler;
        let mut assembler = RowAssembler::new(
            self.params.version,
            self.params.encoding,
            metadata,
            handler,
        );
        run_pass(
            &self.source,
            &self.params,
            self.num_blocks,
            &mut self.cache,
            &mut self.path,
            &mut assembler,
        )?;
        assembler.finish()
    }

    /// Stream one table's row values to `handler`; the callback omits the
    /// table index. Runs its own metadata pass.
    pub fn read_values<F>(&mut self, table: &Table, mut handler: F) -> Result<()>
    where
        F: FnMut(u64, &Column, &str) -> HandlerStatus,
    {
        let metadata = self.discover_all_metadata()?;
        let filtered = Metadata {
            tables: metadata
                .tables
                .into_iter()
                .filter(|t| t.index == table.index)
                .collect(),
        };
        self.read_all_values(&filtered, |_, row, column, value| {
            handler(row, column, value)
        })
    }
}

fn filename_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// A traversal consumer: receives every chunk with its path snapshot.
pub(crate) trait ChunkSink {
    fn handle(&mut self, chunk: &Chunk, payload: &[u8], path: PathView<'_>) -> ChunkStatus;
}

/// Walk one block's chunk list, maintaining the path stack.
///
/// The path is per block: depth resets to 0 here. Each chunk is dispatched
/// with a view truncated to the depth recorded before its own push or pop
/// takes effect. Returns `Ok(true)` when the sink finished the pass early.
fn process_chunk_chain(
    version: FmpVersion,
    stack: &mut PathStack,
    block: &Block,
    sink: &mut dyn ChunkSink,
) -> Result<bool> {
    stack.reset();
    for chunk in &block.chunks {
        let level = stack.depth();
        match chunk.ty {
            ChunkType::PathPop => stack.pop(),
            ChunkType::PathPush => stack.push(PathSegment::new(chunk.data(&block.payload))),
            _ => {}
        }
        match sink.handle(chunk, &block.payload, stack.view_at(version, level)) {
            ChunkStatus::Next => {}
            ChunkStatus::Done => return Ok(true),
            ChunkStatus::Abort => return Err(FmpError::UserAborted),
        }
    }
    Ok(false)
}

/// Walk the block chain from ordinal 2, dispatching every chunk to `sink`.
///
/// Deleted blocks keep their place in the chain but contribute no chunks.
/// A visited bitset stops the walk if the chain loops back on itself, so
/// every block is processed at most once. Blocks beyond the cache prefix
/// are decoded into scratch storage and dropped after their chunk list is
/// consumed.
fn run_pass(
    source: &SectorSource,
    params: &FormatParams,
    num_blocks: usize,
    cache: &mut BlockCache,
    stack: &mut PathStack,
    sink: &mut dyn ChunkSink,
) -> Result<()> {
    let mut visited = VisitedSet::new(num_blocks);
    let mut next_ordinal = CHAIN_START_ORDINAL;

    while next_ordinal != 0 && next_ordinal - 1 < num_blocks {
        let index = next_ordinal - 1;
        if !visited.insert(index) {
            debug!("block chain loops back to {}, stopping", next_ordinal);
            break;
        }

        let mut scratch = None;
        let block: &Block = match cache.get_or_decode(index, || {
            Block::decode_at(source, params, index)
        })? {
            Some(block) => block,
            None => scratch.insert(Block::decode_at(source, params, index)?),
        };

        if !block.deleted && process_chunk_chain(params.version, stack, block, sink)? {
            break;
        }
        next_ordinal = block.next_id as usize;
    }

    Ok(())
}

/// Bitset of visited block indices.
struct VisitedSet {
    bits: Vec<u64>,
}

impl VisitedSet {
    fn new(len: usize) -> Self {
        VisitedSet {
            bits: vec![0; len.div_ceil(64)],
        }
    }

    /// Mark `index` visited; false if it already was.
    fn insert(&mut self, index: usize) -> bool {
        let (word, bit) = (index / 64, index % 64);
        let mask = 1u64 << bit;
        if self.bits[word] & mask != 0 {
            return false;
        }
        self.bits[word] |= mask;
        true
    }
}

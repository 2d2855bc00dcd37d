//! Sector acquisition: whole-file stream reads or a read-only memory map.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::{debug, info};
use memmap2::Mmap;

use super::error::{FmpError, Result};
use super::header::{FormatParams, FILE_HEADER_LEN};

/// Files larger than this are memory-mapped instead of read into memory.
pub(crate) const MMAP_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Two interchangeable sector backends behind one contract: a byte slice of
/// `sector_size` bytes for each 0-based block index.
pub(crate) enum SectorSource {
    /// The whole file, read eagerly at open. Used for small files and for
    /// in-memory buffers.
    Stream(Vec<u8>),
    /// A read-only mapping; sectors are projected as sub-slices of it.
    Mapped(Mmap),
}

impl SectorSource {
    /// Open a file, selecting the backend by size.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| FmpError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;
        let size = file.metadata().map_err(|_| FmpError::Seek)?.len();
        if size > MMAP_THRESHOLD {
            info!("{}: {} bytes, using a memory mapping", path.display(), size);
            return Self::map(&file);
        }
        debug!("{}: {} bytes, reading into memory", path.display(), size);
        let mut data = Vec::with_capacity(size as usize);
        file.read_to_end(&mut data)?;
        Ok(SectorSource::Stream(data))
    }

    /// Open a file with the mapped backend regardless of size.
    pub fn open_mapped(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| FmpError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::map(&file)
    }

    fn map(file: &File) -> Result<Self> {
        let map = unsafe { Mmap::map(file) }.map_err(|e| FmpError::Malloc(e.to_string()))?;
        Ok(SectorSource::Mapped(map))
    }

    /// Wrap a caller-provided buffer.
    pub fn from_vec(data: Vec<u8>) -> Self {
        SectorSource::Stream(data)
    }

    fn bytes(&self) -> &[u8] {
        match self {
            SectorSource::Stream(data) => data,
            SectorSource::Mapped(map) => map,
        }
    }

    /// Total file size in bytes.
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    /// The 1024-byte file header.
    pub fn header(&self) -> Result<&[u8]> {
        self.bytes().get(..FILE_HEADER_LEN).ok_or_else(|| {
            FmpError::Read(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "file is shorter than the 1024-byte header",
            ))
        })
    }

    /// The raw sector for 0-based block `index`.
    ///
    /// Block 0 lives one sector past the header (two for pre-v7 layouts,
    /// which insert a throwaway sector).
    pub fn sector(&self, index: usize, params: &FormatParams) -> Result<&[u8]> {
        let offset = (index + 1 + params.index_shift) * params.sector_size;
        self.bytes()
            .get(offset..offset + params.sector_size)
            .ok_or(FmpError::BadSector(index))
    }
}

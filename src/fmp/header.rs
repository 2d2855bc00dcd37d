//! File header parsing and format parameter selection.

use chrono::NaiveDate;
use log::debug;

use super::error::{FmpError, Result};
use super::models::FmpVersion;
use super::text::TextEncoding;

/// The fixed 15-byte signature at the start of every FileMaker file.
const MAGIC: [u8; 15] = [
    0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x05, 0x00, 0x02, 0x00, 0x02, 0xC0,
];

/// Bytes examined by the header parser.
pub(crate) const FILE_HEADER_LEN: usize = 1024;

// Family tag offsets inside the header.
const TAG_OFFSET: usize = 15;
const TAG_LEN: usize = 5;
const V12_MARKER_OFFSET: usize = 521;
const V12_MARKER: u8 = 0x1E;
const VERSION_DATE_OFFSET: usize = 531;
const VERSION_DATE_LEN: usize = 7;
const VERSION_STRING_OFFSET: usize = 541;

/// Format parameters fixed for the lifetime of an open file.
#[derive(Debug, Clone)]
pub(crate) struct FormatParams {
    pub version: FmpVersion,
    pub sector_size: usize,
    pub xor_mask: u8,
    pub prev_offset: usize,
    pub next_offset: usize,
    /// Offset of the u16 payload length in the sector head, or `None` when
    /// the payload length is implicit (`sector_size - head_len`).
    pub payload_len_offset: Option<usize>,
    pub head_len: usize,
    /// Extra throwaway sectors between the header and the first block.
    pub index_shift: usize,
    pub encoding: TextEncoding,
    pub version_date_raw: String,
    pub version_date: Option<NaiveDate>,
    pub version_string: String,
}

/// Parse the first kilobyte of the file into format parameters.
///
/// The family tag at bytes 15..20 selects the sector geometry:
/// `HBAM7` is the fp7/fmp12 family (4096-byte sectors, 0x5A XOR mask,
/// SCSU text); `HBAM3` and `HBAM5` are fp3 and fp5 (1024-byte sectors,
/// Mac Roman / Windows-1252 text). Anything else with a valid magic is
/// treated as the fp3 layout.
pub(crate) fn parse(header: &[u8]) -> Result<FormatParams> {
    if header.len() < FILE_HEADER_LEN {
        return Err(FmpError::Read(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "file is shorter than the 1024-byte header",
        )));
    }
    if header[..MAGIC.len()] != MAGIC {
        return Err(FmpError::BadMagic);
    }

    let tag = &header[TAG_OFFSET..TAG_OFFSET + TAG_LEN];
    let mut params = if tag == b"HBAM7" {
        let version = if header[V12_MARKER_OFFSET] == V12_MARKER {
            FmpVersion::V12
        } else {
            FmpVersion::V7
        };
        FormatParams {
            version,
            sector_size: 4096,
            xor_mask: 0x5A,
            prev_offset: 4,
            next_offset: 8,
            payload_len_offset: None,
            head_len: 20,
            index_shift: 0,
            encoding: TextEncoding::Scsu,
            version_date_raw: String::new(),
            version_date: None,
            version_string: String::new(),
        }
    } else {
        let (version, encoding) = match tag {
            b"HBAM5" => (FmpVersion::V5, TextEncoding::Windows1252),
            // HBAM3 and unbranded pre-v7 files share the fp3 layout.
            _ => (FmpVersion::V3, TextEncoding::Macintosh),
        };
        FormatParams {
            version,
            sector_size: 1024,
            xor_mask: 0,
            prev_offset: 2,
            next_offset: 6,
            payload_len_offset: Some(12),
            head_len: 14,
            index_shift: 1,
            encoding,
            version_date_raw: String::new(),
            version_date: None,
            version_string: String::new(),
        }
    };

    params.version_date_raw = fixed_string(&header[VERSION_DATE_OFFSET..], VERSION_DATE_LEN);
    params.version_date =
        NaiveDate::parse_from_str(params.version_date_raw.trim(), "%d%b%y").ok();
    params.version_string = pascal_string(&header[VERSION_STRING_OFFSET..]);

    debug!(
        "header: version {}, sector size {}, created with {:?} on {:?}",
        params.version.number(),
        params.sector_size,
        params.version_string,
        params.version_date_raw,
    );

    Ok(params)
}

fn fixed_string(bytes: &[u8], len: usize) -> String {
    let len = len.min(bytes.len());
    String::from_utf8_lossy(&bytes[..len])
        .trim_end_matches('\0')
        .to_string()
}

fn pascal_string(bytes: &[u8]) -> String {
    let Some((&len, rest)) = bytes.split_first() else {
        return String::new();
    };
    let len = (len as usize).min(rest.len());
    String::from_utf8_lossy(&rest[..len]).to_string()
}

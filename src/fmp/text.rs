//! Character-set conversion for stored text.
//!
//! Pre-v7 files declare a classic single-byte character set (Mac Roman for
//! fp3, Windows-1252 for fp5) handled by `encoding_rs`. The v7 family stores
//! text in a simplified SCSU stream decoded by [`scsu_to_utf8`].

use encoding_rs::{MACINTOSH, WINDOWS_1252};

/// Character set of a file's stored text, fixed at header parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Macintosh,
    Windows1252,
    Scsu,
}

/// Convert raw value bytes to UTF-8.
///
/// Leading ASCII spaces are trimmed before conversion; FileMaker pads some
/// stored values with them.
pub fn convert(encoding: TextEncoding, bytes: &[u8]) -> String {
    let mut bytes = bytes;
    while let [b' ', rest @ ..] = bytes {
        bytes = rest;
    }
    match encoding {
        TextEncoding::Macintosh => MACINTOSH.decode(bytes).0.into_owned(),
        TextEncoding::Windows1252 => WINDOWS_1252.decode(bytes).0.into_owned(),
        TextEncoding::Scsu => scsu_to_utf8(bytes),
    }
}

// SCSU static windows, indexed by quote tag SQ0..SQ7.
const STATIC_WINDOWS: [u32; 8] = [
    0x0000, 0x0080, 0x0100, 0x0300, 0x2000, 0x2080, 0x2100, 0x3000,
];

// Initial dynamic windows per the SCSU specification.
const INITIAL_DYNAMIC_WINDOWS: [u32; 8] = [
    0x0080, 0x00C0, 0x0400, 0x0600, 0x0900, 0x3040, 0x30A0, 0xFF00,
];

// Past the last Unicode plane; every code point computed against this base
// fails `char::from_u32` and decodes as U+FFFD.
const INVALID_WINDOW: u32 = 0x0011_0000;

fn dynamic_window_base(offset: u8) -> u32 {
    match offset {
        0x01..=0x67 => offset as u32 * 0x80,
        0x68..=0xA7 => offset as u32 * 0x80 + 0xAC00,
        0xF9 => 0x00C0,
        0xFA => 0x0250,
        0xFB => 0x0370,
        0xFC => 0x0530,
        0xFD => 0x3040,
        0xFE => 0x30A0,
        0xFF => 0xFF60,
        _ => INVALID_WINDOW,
    }
}

fn push_code_point(out: &mut String, cp: u32) {
    out.push(char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER));
}

/// Decode a simplified SCSU (Standard Compression Scheme for Unicode) byte
/// stream to UTF-8.
///
/// Supports single-byte mode only: ASCII passthrough, the eight dynamic
/// windows with `SCn`/`SDn` selection and definition, static-window quotes
/// `SQ0`..`SQ7`, and the `SQU` Unicode quote. Unsupported tag bytes are
/// skipped; a tag truncated by the end of input ends the decode.
pub fn scsu_to_utf8(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut windows = INITIAL_DYNAMIC_WINDOWS;
    let mut active = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            0x09 | 0x0A | 0x0D => {
                out.push(b as char);
                i += 1;
            }
            0x20..=0x7F => {
                out.push(b as char);
                i += 1;
            }
            // SQ0..SQ7: quote a single byte against a static or dynamic window.
            0x01..=0x08 => {
                let n = (b - 0x01) as usize;
                match bytes.get(i + 1) {
                    Some(&q) if q < 0x80 => push_code_point(&mut out, STATIC_WINDOWS[n] + q as u32),
                    Some(&q) => push_code_point(&mut out, windows[n] + (q - 0x80) as u32),
                    None => break,
                }
                i += 2;
            }
            // SQU: quote one UTF-16BE unit.
            0x0E => {
                if i + 2 >= bytes.len() {
                    break;
                }
                let cp = ((bytes[i + 1] as u32) << 8) | bytes[i + 2] as u32;
                push_code_point(&mut out, cp);
                i += 3;
            }
            // SC0..SC7: select a dynamic window.
            0x10..=0x17 => {
                active = (b - 0x10) as usize;
                i += 1;
            }
            // SD0..SD7: define a dynamic window from the next byte, then select it.
            0x18..=0x1F => {
                let n = (b - 0x18) as usize;
                match bytes.get(i + 1) {
                    Some(&offset) => {
                        windows[n] = dynamic_window_base(offset);
                        active = n;
                    }
                    None => break,
                }
                i += 2;
            }
            // Remaining control tags (SCU, Unicode mode) are not produced by
            // FileMaker text; skip them.
            0x00 | 0x0B | 0x0C | 0x0F => {
                i += 1;
            }
            0x80..=0xFF => {
                push_code_point(&mut out, windows[active] + (b - 0x80) as u32);
                i += 1;
            }
        }
    }

    out
}

//! The hierarchical path stack and path-segment decoding.
//!
//! PATH_PUSH and PATH_POP chunks build a stack of 1-3 byte segments that
//! addresses a node in the file's implicit tree. The stack is owned by the
//! traversal and reset at the start of every block; each dispatched chunk
//! receives a [`PathView`] truncated to the depth recorded when the chunk
//! was reached.

use super::models::FmpVersion;

const MAX_SEGMENT_LEN: usize = 3;

/// One path segment: 1-3 raw bytes as they appeared in a PATH_PUSH chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathSegment {
    bytes: [u8; MAX_SEGMENT_LEN],
    len: u8,
}

impl PathSegment {
    /// Build a segment from raw chunk data, truncating to three bytes.
    pub fn new(data: &[u8]) -> Self {
        let len = data.len().min(MAX_SEGMENT_LEN);
        let mut bytes = [0u8; MAX_SEGMENT_LEN];
        bytes[..len].copy_from_slice(&data[..len]);
        PathSegment {
            bytes,
            len: len as u8,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// Decode a path segment into its integer label.
///
/// This is a pure function of the version and the segment bytes; the same
/// inputs always produce the same value. Unexpected lengths decode as 0.
pub fn path_value(version: FmpVersion, bytes: &[u8]) -> u64 {
    match bytes.len() {
        1 => bytes[0] as u64,
        2 => 0x80 + (((bytes[0] & 0x7F) as u64) << 8) + bytes[1] as u64,
        3 if version.is_v7_family() => 0x80 + ((bytes[1] as u64) << 8) + bytes[2] as u64,
        3 => {
            0xC000
                + (((bytes[0] & 0x3F) as u64) << 16)
                + ((bytes[1] as u64) << 8)
                + bytes[2] as u64
        }
        _ => 0,
    }
}

/// The traversal-owned path stack.
///
/// `depth` tracks the live portion of `segments`; popping only decrements
/// the depth, so a view recorded before a pop can still see the popped
/// segment.
#[derive(Debug, Default)]
pub struct PathStack {
    segments: Vec<PathSegment>,
    depth: usize,
}

impl PathStack {
    pub fn new() -> Self {
        PathStack::default()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Reset to depth 0 at a block boundary; the path is per block.
    pub fn reset(&mut self) {
        self.depth = 0;
    }

    pub fn pop(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn push(&mut self, segment: PathSegment) {
        if self.depth == self.segments.len() {
            self.segments.push(segment);
        } else {
            self.segments[self.depth] = segment;
        }
        self.depth += 1;
    }

    /// A read-only view of the stack truncated to `level` segments.
    pub fn view_at(&self, version: FmpVersion, level: usize) -> PathView<'_> {
        let level = level.min(self.segments.len());
        PathView {
            segments: &self.segments[..level],
            version,
        }
    }
}

/// A chunk's snapshot of the path stack: the segments visible at the depth
/// the chunk was dispatched, plus the file version for segment decoding.
#[derive(Debug, Clone, Copy)]
pub struct PathView<'a> {
    segments: &'a [PathSegment],
    pub version: FmpVersion,
}

impl<'a> PathView<'a> {
    /// Depth recorded when the chunk was dispatched.
    pub fn level(&self) -> usize {
        self.segments.len()
    }

    /// Integer value of segment `i`, or 0 when the path is shallower.
    pub fn value(&self, i: usize) -> u64 {
        self.segments
            .get(i)
            .map(|s| path_value(self.version, s.as_bytes()))
            .unwrap_or(0)
    }

    /// Integer value of the innermost segment.
    pub fn innermost_value(&self) -> u64 {
        match self.level() {
            0 => 0,
            n => self.value(n - 1),
        }
    }

    /// For v7+ the outermost segment names the table, so the effective
    /// table-relative depth is one less than the raw level.
    fn matches_table_depth(&self, depth: usize) -> bool {
        if self.version.is_v7_family() {
            self.level() == depth + 1
        } else {
            self.level() == depth
        }
    }

    /// Table-relative path `{val, ...}` at exactly `depth` segments.
    pub fn match_start1(&self, depth: usize, val: u64) -> bool {
        if !self.matches_table_depth(depth) {
            return false;
        }
        if self.version.is_v7_family() {
            self.value(0) >= 128 && self.value(1) == val
        } else {
            self.value(0) == val
        }
    }

    /// Table-relative path `{v1, v2, ...}` at exactly `depth` segments.
    pub fn match_start2(&self, depth: usize, v1: u64, v2: u64) -> bool {
        if !self.matches_table_depth(depth) {
            return false;
        }
        if self.version.is_v7_family() {
            self.value(0) >= 128 && self.value(1) == v1 && self.value(2) == v2
        } else {
            self.value(0) == v1 && self.value(1) == v2
        }
    }

    /// Row ordinal carried in the data path (`{table, 5, row, ...}` for v7+,
    /// `{5, row, ...}` earlier).
    pub fn row_ordinal(&self) -> u64 {
        if self.version.is_v7_family() {
            self.value(2)
        } else {
            self.value(1)
        }
    }
}

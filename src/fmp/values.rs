//! Row reconstruction: turns the chunk stream into `(table, row, column,
//! value)` emissions, reassembling long strings split across chunks.

use std::collections::BTreeMap;

use super::chunk::{Chunk, ChunkType};
use super::error::{FmpError, Result};
use super::models::{ChunkStatus, FmpVersion, HandlerStatus, Metadata, Table};
use super::path::PathView;
use super::text::{self, TextEncoding};
use super::ChunkSink;

/// `ref_simple` value reserved for metadata rows interleaved with table
/// data; never a column reference.
const METADATA_SENTINEL_REF: u8 = 252;

/// Value callback: `(table_index, row, column, utf8_value)`.
pub(crate) type ValueHandler<'a> =
    dyn FnMut(usize, u64, &super::models::Column, &str) -> HandlerStatus + 'a;

/// Per-table read state. Rows are implied by ordered traversal: the row
/// counter advances when the row ordinal in the path changes or the column
/// index wraps backwards.
#[derive(Debug, Default)]
struct RowState {
    current_row: u64,
    last_row: u64,
    last_column: usize,
    long_string: Vec<u8>,
}

impl RowState {
    /// Whether this chunk continues (or starts) a long string.
    ///
    /// Long strings live on the `{table, 5, row, column}` path. A fragment
    /// belongs to a fresh value when the column index wrapped below the
    /// last one on a later row, and to the current value when the row is
    /// unchanged.
    fn is_long_string_path(&self, path: PathView<'_>) -> bool {
        if !path.match_start1(3, 5) {
            return false;
        }
        let column_index = path.value(if path.version.is_v7_family() { 3 } else { 2 });
        let row = path.row_ordinal();
        if self.last_column == 0 || column_index < self.last_column as u64 {
            row > self.last_row
        } else {
            row == self.last_row
        }
    }
}

/// Chunk consumer that streams row values to a callback.
pub(crate) struct RowAssembler<'a> {
    version: FmpVersion,
    encoding: TextEncoding,
    metadata: &'a Metadata,
    handler: &'a mut ValueHandler<'a>,
    states: BTreeMap<usize, RowState>,
}

impl<'a> RowAssembler<'a> {
    pub fn new(
        version: FmpVersion,
        encoding: TextEncoding,
        metadata: &'a Metadata,
        handler: &'a mut ValueHandler<'a>,
    ) -> Self {
        RowAssembler {
            version,
            encoding,
            metadata,
            handler,
            states: BTreeMap::new(),
        }
    }

    /// Flush any long string still buffered when the chunk stream ends.
    pub fn finish(mut self) -> Result<()> {
        let states = std::mem::take(&mut self.states);
        for (table_index, state) in states {
            if state.long_string.is_empty() || state.last_column == 0 {
                continue;
            }
            let Some(table) = self.metadata.table_by_index(table_index) else {
                continue;
            };
            let Some(column) = table.column_by_index(state.last_column) else {
                continue;
            };
            let value = text::convert(self.encoding, &state.long_string);
            if (self.handler)(table_index, state.current_row, column, &value)
                == HandlerStatus::Abort
            {
                return Err(FmpError::UserAborted);
            }
        }
        Ok(())
    }

    fn process_value(
        &mut self,
        table_index: usize,
        table: &'a Table,
        chunk: &Chunk,
        payload: &[u8],
        path: PathView<'_>,
    ) -> ChunkStatus {
        let columns = &table.columns;
        let state = self.states.entry(table_index).or_default();

        let mut long_string = false;
        let mut column_index = 0usize;

        if state.is_long_string_path(path) {
            if chunk.ty == ChunkType::FieldRefSimple && chunk.ref_simple == 0 {
                // Rich-text formatting run inside a long string.
                return ChunkStatus::Next;
            }
            long_string = true;
            column_index = path.innermost_value() as usize;
        } else if path.match_start1(2, 5) {
            match chunk.ty {
                ChunkType::FieldRefSimple => {
                    let candidate = chunk.ref_simple as usize;
                    if candidate <= columns.len() && chunk.ref_simple != METADATA_SENTINEL_REF {
                        column_index = candidate;
                    }
                }
                ChunkType::DataSegment => {
                    let candidate = chunk.segment_index as usize;
                    if candidate <= columns.len() {
                        column_index = candidate;
                    }
                }
                _ => {}
            }
        }

        if column_index == 0 || column_index > columns.len() {
            return ChunkStatus::Next;
        }
        let Some(column) = columns.iter().find(|c| c.index == column_index) else {
            return ChunkStatus::Next;
        };

        // Column changed with a buffered long string: flush it under the
        // previous column before touching this chunk.
        if column.index != state.last_column && !state.long_string.is_empty() {
            if state.last_column > 0 {
                if let Some(previous) = columns.iter().find(|c| c.index == state.last_column) {
                    let value = text::convert(self.encoding, &state.long_string);
                    if (self.handler)(table_index, state.current_row, previous, &value)
                        == HandlerStatus::Abort
                    {
                        return ChunkStatus::Abort;
                    }
                }
            }
            state.long_string.clear();
        }

        let row = path.row_ordinal();
        if row != state.last_row || column.index < state.last_column {
            state.current_row += 1;
        }

        if long_string {
            state.long_string.extend_from_slice(chunk.data(payload));
        } else {
            let value = text::convert(self.encoding, chunk.data(payload));
            if (self.handler)(table_index, state.current_row, column, &value)
                == HandlerStatus::Abort
            {
                return ChunkStatus::Abort;
            }
        }

        state.last_row = row;
        state.last_column = column.index;
        ChunkStatus::Next
    }
}

impl<'a> ChunkSink for RowAssembler<'a> {
    fn handle(&mut self, chunk: &Chunk, payload: &[u8], path: PathView<'_>) -> ChunkStatus {
        let table_index = if self.version.is_v7_family() {
            let p0 = path.value(0);
            if p0 < 128 {
                return ChunkStatus::Next;
            }
            (p0 - 128) as usize
        } else {
            1
        };

        let metadata: &'a Metadata = self.metadata;
        let Some(table) = metadata.table_by_index(table_index) else {
            return ChunkStatus::Next;
        };
        if table.skip {
            return ChunkStatus::Next;
        }
        if chunk.ty != ChunkType::FieldRefSimple && chunk.ty != ChunkType::DataSegment {
            return ChunkStatus::Next;
        }

        self.process_value(table_index, table, chunk, payload, path)
    }
}

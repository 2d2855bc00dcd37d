//! Metadata extraction: one traversal of the block chain yields the table
//! list and each table's column list.

use log::{debug, info};

use super::chunk::{Chunk, ChunkType};
use super::models::{ChunkStatus, Column, ColumnType, FmpVersion, Metadata, Table};
use super::path::PathView;
use super::text::{self, TextEncoding};
use super::ChunkSink;

/// `ref_simple` value carrying a table or column name in v7+ files.
const NAME_REF_V7: u8 = 16;
/// `ref_simple` value carrying a column name in pre-v7 files.
const NAME_REF_PRE_V7: u8 = 1;
/// `ref_simple` value carrying the pre-v7 column type and collation bytes.
const TYPE_REF_PRE_V7: u8 = 2;

/// The per-table column map grows in steps of at least this many slots.
const COLUMN_MAP_GROWTH: usize = 128;

/// Upper bound on table/column indices accepted from path segments. Indices
/// above this are treated as corrupt and skipped.
const MAX_ENTITY_INDEX: usize = 1 << 16;

/// Chunk consumer that recognizes table and column definitions.
///
/// Working state is sparse (index-addressed with default-filled holes);
/// [`MetadataScanner::finish`] compacts it into the public [`Metadata`]
/// shape.
pub(crate) struct MetadataScanner {
    version: FmpVersion,
    encoding: TextEncoding,
    filename: String,
    tables: Vec<Table>,
    /// Column slots keyed by the original table index; slot 0 is unused.
    columns: Vec<Vec<Column>>,
}

impl MetadataScanner {
    pub fn new(version: FmpVersion, encoding: TextEncoding, filename: &str) -> Self {
        MetadataScanner {
            version,
            encoding,
            filename: filename.to_string(),
            tables: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Compact the working state: drop placeholder entries, preserve
    /// original indices, and attach each surviving table's column list.
    pub fn finish(mut self) -> Metadata {
        let mut tables = Vec::new();
        for mut table in std::mem::take(&mut self.tables) {
            if table.index == 0 {
                continue;
            }
            let columns = self
                .columns
                .get_mut(table.index)
                .map(std::mem::take)
                .unwrap_or_default();
            table.columns = columns.into_iter().filter(|c| c.index != 0).collect();
            debug!(
                "table {} ({:?}): {} columns",
                table.index,
                table.name,
                table.columns.len()
            );
            tables.push(table);
        }
        info!("discovered {} tables", tables.len());
        Metadata { tables }
    }

    fn ensure_columns_slot(&mut self, table_index: usize) {
        if table_index >= self.columns.len() {
            let new_len = table_index + COLUMN_MAP_GROWTH;
            self.columns.resize_with(new_len, Vec::new);
        }
    }

    fn handle_table(&mut self, table_index: usize, chunk: &Chunk, payload: &[u8]) {
        if table_index == 0 || table_index > MAX_ENTITY_INDEX {
            return;
        }
        if table_index > self.tables.len() {
            self.tables.resize_with(table_index, Table::default);
        }
        let table = &mut self.tables[table_index - 1];
        table.name = text::convert(self.encoding, chunk.data(payload));
        table.index = table_index;
        self.ensure_columns_slot(table_index);
    }

    fn handle_column(&mut self, table_index: usize, column_index: usize, chunk: &Chunk, payload: &[u8]) {
        if table_index == 0 || table_index > MAX_ENTITY_INDEX {
            return;
        }
        if column_index == 0 || column_index > MAX_ENTITY_INDEX {
            return;
        }
        self.ensure_columns_slot(table_index);
        let columns = &mut self.columns[table_index];
        if column_index > columns.len() {
            columns.resize_with(column_index, Column::default);
        }
        let column = &mut columns[column_index - 1];

        match chunk.ref_simple {
            NAME_REF_V7 | NAME_REF_PRE_V7 => {
                column.name = text::convert(self.encoding, chunk.data(payload));
                column.index = column_index;
            }
            TYPE_REF_PRE_V7 => {
                let data = chunk.data(payload);
                if data.len() >= 4 {
                    column.ty = ColumnType::from_code(data[1]);
                    column.collation = data[3];
                }
            }
            _ => {}
        }
    }

    fn handle_v7(&mut self, chunk: &Chunk, payload: &[u8], path: PathView<'_>) -> ChunkStatus {
        // Table definition region: {3, 16, 5, 128+table}.
        if path.value(0) == 3 && path.value(1) == 16 && path.value(2) == 5 && path.value(3) >= 128 {
            if chunk.ty == ChunkType::FieldRefSimple && chunk.ref_simple == NAME_REF_V7 {
                let table_index = (path.value(3) - 128) as usize;
                self.handle_table(table_index, chunk, payload);
            }
            return ChunkStatus::Next;
        }

        // Column definition region: {128+table, 3, 5, column}.
        if path.value(0) >= 128 {
            let table_index = (path.value(0) - 128) as usize;
            if chunk.ty == ChunkType::FieldRefSimple
                && chunk.ref_simple == NAME_REF_V7
                && path.match_start2(3, 3, 5)
            {
                let column_index = path.innermost_value() as usize;
                self.handle_column(table_index, column_index, chunk, payload);
            }
            return ChunkStatus::Next;
        }

        // Past the metadata region.
        let p0 = path.value(0);
        if p0 > 3 && p0 < 128 {
            return ChunkStatus::Done;
        }
        ChunkStatus::Next
    }

    fn handle_pre_v7(&mut self, chunk: &Chunk, payload: &[u8], path: PathView<'_>) -> ChunkStatus {
        if path.value(0) > 3 {
            return ChunkStatus::Done;
        }
        if chunk.ty != ChunkType::FieldRefSimple {
            return ChunkStatus::Next;
        }

        // Pre-v7 files hold a single implicit table named after the file.
        if self.tables.is_empty() {
            let table = Table {
                index: 1,
                name: strip_extension(&self.filename).to_string(),
                ..Table::default()
            };
            self.tables.push(table);
            self.ensure_columns_slot(1);
        }

        if path.match_start2(3, 3, 5) {
            let column_index = path.innermost_value() as usize;
            self.handle_column(1, column_index, chunk, payload);
        }
        ChunkStatus::Next
    }
}

impl ChunkSink for MetadataScanner {
    fn handle(&mut self, chunk: &Chunk, payload: &[u8], path: PathView<'_>) -> ChunkStatus {
        if self.version.is_v7_family() {
            self.handle_v7(chunk, payload, path)
        } else {
            self.handle_pre_v7(chunk, payload, path)
        }
    }
}

/// Strip the final extension from a filename. A leading dot is not an
/// extension separator.
fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(i) if i > 0 => &name[..i],
        _ => name,
    }
}

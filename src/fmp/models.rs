//! Data structures representing FileMaker format components.

/// FileMaker file format generations understood by this crate.
///
/// The v7 family (`V7`, `V12`) uses 4096-byte sectors, an XOR-masked payload,
/// and SCSU-encoded text. Earlier versions use 1024-byte sectors and a
/// classic single-byte character set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FmpVersion {
    V3,
    V5,
    V7,
    V12,
}

impl FmpVersion {
    /// The numeric version as it appears in user-facing output.
    pub fn number(&self) -> u8 {
        match self {
            FmpVersion::V3 => 3,
            FmpVersion::V5 => 5,
            FmpVersion::V7 => 7,
            FmpVersion::V12 => 12,
        }
    }

    /// Whether this version belongs to the v7+ family (fp7 / fmp12).
    pub fn is_v7_family(&self) -> bool {
        matches!(self, FmpVersion::V7 | FmpVersion::V12)
    }
}

/// Column data types as declared in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnType {
    String,
    Number,
    Date,
    Time,
    Container,
    Calc,
    Summary,
    Global,
    #[default]
    Unknown,
}

impl ColumnType {
    /// Map the on-wire type byte to a column type; out-of-range codes
    /// decode as `Unknown`.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => ColumnType::String,
            2 => ColumnType::Number,
            3 => ColumnType::Date,
            4 => ColumnType::Time,
            5 => ColumnType::Container,
            6 => ColumnType::Calc,
            7 => ColumnType::Summary,
            8 => ColumnType::Global,
            _ => ColumnType::Unknown,
        }
    }
}

/// One column of a table.
///
/// `index` is the column's 1-based position as recorded in the file; column
/// indices are not necessarily dense, and compaction preserves them.
#[derive(Debug, Clone, Default)]
pub struct Column {
    pub index: usize,
    pub name: String,
    pub ty: ColumnType,
    pub collation: u8,
}

/// One table of the database.
///
/// `index` is the table's 1-based index as recorded in the file (synthesized
/// as 1 for pre-v7 files, which hold a single implicit table). Setting
/// `skip` excludes the table from value traversal.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub index: usize,
    pub name: String,
    pub skip: bool,
    pub columns: Vec<Column>,
}

impl Table {
    /// Look up a column by its recorded (file) index.
    pub fn column_by_index(&self, index: usize) -> Option<&Column> {
        self.columns.iter().find(|c| c.index == index)
    }
}

/// The full table/column map discovered from a file.
///
/// Tables are compacted (no placeholder entries) but keep their original
/// `index` values; each table carries its own compacted column list.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub tables: Vec<Table>,
}

impl Metadata {
    /// Look up a table by its recorded (file) index.
    pub fn table_by_index(&self, index: usize) -> Option<&Table> {
        self.tables.iter().find(|t| t.index == index)
    }
}

/// Returned by value handlers to continue or cancel a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStatus {
    Continue,
    Abort,
}

/// Internal per-chunk verdict from a traversal consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkStatus {
    /// Advance to the next chunk.
    Next,
    /// Stop the whole pass, successfully.
    Done,
    /// Surface `UserAborted` from the top-level traversal.
    Abort,
}

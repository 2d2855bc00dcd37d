//! Reader for FileMaker Pro database files.
//!
//! FileMaker databases (`.fp3`, `.fp5`, `.fp7`, `.fmp12`) are sector-based
//! binary files built from a linked chain of blocks, each holding a list of
//! chunks that push and pop path segments to address a location in the file's
//! implicit tree. This crate decodes that structure and streams tables,
//! columns, and row values to a caller-provided handler.
//!
//! # Example
//! ```no_run
//! use fmp_reader::{FmpFile, HandlerStatus};
//!
//! let mut file = FmpFile::open("Contacts.fmp12")?;
//! let metadata = file.discover_all_metadata()?;
//! file.read_all_values(&metadata, |table_index, row, column, value| {
//!     println!("{} {} {} = {}", table_index, row, column.name, value);
//!     HandlerStatus::Continue
//! })?;
//! # Ok::<(), fmp_reader::FmpError>(())
//! ```

pub mod fmp;

pub use fmp::error::{FmpError, Result};
pub use fmp::models::{Column, ColumnType, FmpVersion, HandlerStatus, Metadata, Table};
pub use fmp::FmpFile;

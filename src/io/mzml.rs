//! The mzML import path: a pull-style reader that yields one fully
//! assembled record per cursor step, and the import method that drives it.

pub mod import;
pub mod reader;

pub use import::MzMLImportMethod;
pub use reader::{MzMLParserError, MzMLParserState, MzMLReader};

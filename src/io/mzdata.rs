//! The mzData import path: a push-style handler fed one XML event at a
//! time, and the import method that drives it.
//!
//! mzData is the older PSI interchange format. Scan metadata lives in
//! `<spectrumInstrument>` attributes and legacy-vocabulary parameters,
//! binary arrays declare precision and byte order as attributes, and the
//! format has no chromatogram list.

pub mod handler;
pub mod import;

pub use handler::{MzDataParserError, MzDataParserState, MzDataReader};
pub use import::MzDataImportMethod;

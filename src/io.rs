//! Streaming importers for the supported raw data formats and the shared
//! machinery they are built from.

use std::io;

use thiserror::Error;

pub mod bindata;
pub(crate) mod import;
pub mod mzdata;
pub mod mzml;
pub mod record;
pub(crate) mod traits;
pub(crate) mod xml;

pub use crate::io::bindata::{ArrayDecodingError, ArrayKind, DataArray};
pub use crate::io::mzdata::{MzDataImportMethod, MzDataParserError, MzDataReader};
pub use crate::io::mzml::{MzMLImportMethod, MzMLParserError, MzMLReader};
pub use crate::io::traits::{ImportHandle, ImportMethod, RecordSource};

/**
All the ways an import can fail. Cancellation is not one of them: a
cancelled run reports success with no result.
*/
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("An IO error occurred while importing: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
    #[error("Failed to parse mzML document: {0}")]
    MzMLError(
        #[from]
        #[source]
        MzMLParserError,
    ),
    #[error("Failed to parse mzData document: {0}")]
    MzDataError(
        #[from]
        #[source]
        MzDataParserError,
    ),
    #[error("Record {id} is structurally invalid: {reason}")]
    MalformedRecord { id: String, reason: String },
}

//! `mzimport` reads XML mass spectrometry interchange formats (mzML and
//! mzData) into an in-memory raw data model, streaming record by record so
//! that multi-gigabyte documents never have to fit in memory at once. Each
//! import is a blocking task with a non-blocking control surface for
//! progress polling and cooperative cancellation.

pub mod io;
pub mod params;
pub mod prelude;
pub mod raw;

pub use crate::params::{Param, ParamList, Unit};

pub use crate::io::mzdata::MzDataImportMethod;
pub use crate::io::mzml::MzMLImportMethod;
pub use crate::io::{ImportError, ImportHandle, ImportMethod};

pub use crate::raw::{
    Chromatogram, DataPointList, MsFunction, MsScan, MsSpectrumType, PolarityType, RawDataFile,
    RawDataFileType,
};

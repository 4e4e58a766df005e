//! The in-memory raw data model: imported files, their scans and
//! chromatograms, and the transient structures the import pipeline uses to
//! build them.

pub mod chromatogram;
pub mod datapoints;
pub mod file;
pub mod function;
pub mod scan;
pub mod spectrumtype;

pub use chromatogram::{Chromatogram, ChromatogramLengthMismatch};
pub use datapoints::DataPointList;
pub use file::{RawDataFile, RawDataFileType, RunInfo};
pub use function::{MsFunction, MsFunctionTable};
pub use scan::{
    ChromatographyInfo, FragmentationInfo, FragmentationType, IsolationInfo, MsScan, MsScanType,
    PolarityType,
};
pub use spectrumtype::{detect_spectrum_type, MsSpectrumType};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use parking_lot::RwLock;

use super::chromatogram::Chromatogram;
use super::scan::MsScan;

/// The source format an imported file was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawDataFileType {
    #[default]
    Unknown,
    MzML,
    MzData,
}

/// Document-level description of the acquisition run, read from the header
/// before any record streams.
#[derive(Debug, Clone, Default)]
pub struct RunInfo {
    pub id: Option<String>,
    pub start_time: Option<DateTime<FixedOffset>>,
}

/**
One imported source file and the scans and chromatograms read out of it.

The record sequences are append-only while an import is running and frozen
afterwards. A supervising thread may read them concurrently with the import
through [`RawDataFile::scan`]/[`RawDataFile::scan_count`]: any index below
the count observed at call time refers to a fully finalized record, never to
one mid-construction. The short-held locks guard only the vector push and
the handle clone.
*/
#[derive(Debug, Default)]
pub struct RawDataFile {
    name: String,
    original_path: Option<PathBuf>,
    file_type: RawDataFileType,
    run: RunInfo,
    scans: RwLock<Vec<Arc<MsScan>>>,
    chromatograms: RwLock<Vec<Arc<Chromatogram>>>,
}

impl RawDataFile {
    pub fn new<P: AsRef<Path>>(path: P, file_type: RawDataFileType, run: RunInfo) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            original_path: Some(path.to_path_buf()),
            file_type,
            run,
            scans: RwLock::new(Vec::new()),
            chromatograms: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn original_path(&self) -> Option<&Path> {
        self.original_path.as_deref()
    }

    pub fn file_type(&self) -> RawDataFileType {
        self.file_type
    }

    pub fn run(&self) -> &RunInfo {
        &self.run
    }

    pub fn scan_count(&self) -> usize {
        self.scans.read().len()
    }

    pub fn scan(&self, index: usize) -> Option<Arc<MsScan>> {
        self.scans.read().get(index).cloned()
    }

    /// A snapshot of the scans appended so far, in document order.
    pub fn scans(&self) -> Vec<Arc<MsScan>> {
        self.scans.read().clone()
    }

    pub fn chromatogram_count(&self) -> usize {
        self.chromatograms.read().len()
    }

    pub fn chromatogram(&self, index: usize) -> Option<Arc<Chromatogram>> {
        self.chromatograms.read().get(index).cloned()
    }

    /// A snapshot of the chromatograms appended so far, in document order.
    pub fn chromatograms(&self) -> Vec<Arc<Chromatogram>> {
        self.chromatograms.read().clone()
    }

    pub(crate) fn add_scan(&self, scan: MsScan) {
        self.scans.write().push(Arc::new(scan));
    }

    pub(crate) fn add_chromatogram(&self, chromatogram: Chromatogram) {
        self.chromatograms.write().push(Arc::new(chromatogram));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_name_from_path() {
        let file = RawDataFile::new(
            "/data/runs/sample_01.mzML",
            RawDataFileType::MzML,
            RunInfo::default(),
        );
        assert_eq!(file.name(), "sample_01.mzML");
        assert_eq!(file.file_type(), RawDataFileType::MzML);
        assert!(file.original_path().is_some());
        assert_eq!(file.scan_count(), 0);
        assert!(file.scan(0).is_none());
    }

    #[test]
    fn test_append_and_read() {
        let file = RawDataFile::new("x.mzML", RawDataFileType::MzML, RunInfo::default());
        file.add_chromatogram(
            Chromatogram::new(1, "TIC".into(), vec![0.0], vec![0.0], vec![1.0], Vec::new())
                .unwrap(),
        );
        assert_eq!(file.chromatogram_count(), 1);
        assert_eq!(file.chromatogram(0).unwrap().num_data_points(), 1);
    }
}

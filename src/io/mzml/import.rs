use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use log::info;

use super::reader::MzMLReader;
use crate::io::import::run_import;
use crate::io::record::RawRecord;
use crate::io::traits::{ImportHandle, ImportMethod, ImportState, RecordSource};
use crate::io::ImportError;
use crate::raw::{DataPointList, RawDataFile, RawDataFileType};

/// Adapts the pull-style [`MzMLReader`] cursor to the shared record-source
/// capability: every cursor step already is one finalized record.
struct MzMLRecordSource<R: Read> {
    reader: MzMLReader<R>,
}

impl<R: Read> RecordSource for MzMLRecordSource<R> {
    fn total_spectra(&self) -> Option<u64> {
        self.reader.num_spectra()
    }

    fn total_chromatograms(&self) -> Option<u64> {
        self.reader.num_chromatograms()
    }

    fn next_record(
        &mut self,
        scratch: &mut DataPointList,
    ) -> Result<Option<RawRecord>, ImportError> {
        self.reader
            .read_next_record(scratch)
            .map_err(ImportError::from)
    }
}

/**
Imports one mzML file into a [`RawDataFile`].

`execute` is a synchronous, blocking call intended for a dedicated worker;
[`MzMLImportMethod::handle`] hands out a cloneable view for cancelling or
polling it from elsewhere. A cancelled run yields `Ok(None)` and publishes
no result.
*/
pub struct MzMLImportMethod {
    source_path: PathBuf,
    state: Arc<ImportState>,
}

impl MzMLImportMethod {
    pub fn new<P: Into<PathBuf>>(source_path: P) -> Self {
        Self {
            source_path: source_path.into(),
            state: Arc::new(ImportState::default()),
        }
    }

    /// A cloneable control handle usable from other threads while
    /// [`ImportMethod::execute`] runs.
    pub fn handle(&self) -> ImportHandle {
        ImportHandle::new(self.state.clone())
    }
}

impl ImportMethod for MzMLImportMethod {
    type Output = RawDataFile;

    fn execute(&mut self) -> Result<Option<Arc<RawDataFile>>, ImportError> {
        info!("Started parsing file {}", self.source_path.display());

        let handle = fs::File::open(&self.source_path)?;
        let reader = MzMLReader::new(handle);

        let file = Arc::new(RawDataFile::new(
            &self.source_path,
            RawDataFileType::MzML,
            reader.run().clone(),
        ));
        self.state.publish(file.clone());

        let mut source = MzMLRecordSource { reader };
        match run_import(&mut source, &file, &self.state) {
            Ok(true) => {
                info!(
                    "Finished importing {}, parsed {} scans and {} chromatograms",
                    self.source_path.display(),
                    file.scan_count(),
                    file.chromatogram_count()
                );
                Ok(Some(file))
            }
            Ok(false) => {
                info!("Import of {} was cancelled", self.source_path.display());
                self.state.clear_result();
                Ok(None)
            }
            Err(e) => {
                if self.state.is_canceled() {
                    // The failure raced a cancellation request; the caller
                    // asked for no result, not an error.
                    self.state.clear_result();
                    Ok(None)
                } else {
                    Err(e)
                }
            }
        }
    }

    fn finished_percentage(&self) -> Option<f32> {
        self.state.finished_percentage()
    }

    fn result(&self) -> Option<Arc<RawDataFile>> {
        self.state.result()
    }

    fn cancel(&self) {
        self.state.cancel();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::raw::MsSpectrumType;
    use std::path;

    const SMALL_MZML: &str = "./test/data/small.mzML";

    #[test_log::test]
    fn test_import_small_file() {
        let path = path::Path::new(SMALL_MZML);
        let mut method = MzMLImportMethod::new(path);
        let file = method.execute().expect("Import failed").expect("No result");

        // The declared counts are the imported counts.
        assert_eq!(file.scan_count(), 3);
        assert_eq!(file.chromatogram_count(), 1);
        assert_eq!(method.finished_percentage(), Some(1.0));
        assert!(method.result().is_some());
        assert_eq!(file.file_type(), RawDataFileType::MzML);
        assert_eq!(file.name(), "small.mzML");

        let types: Vec<_> = file.scans().iter().map(|s| s.spectrum_type()).collect();
        assert_eq!(
            types,
            vec![
                MsSpectrumType::Centroided,
                MsSpectrumType::Profile,
                MsSpectrumType::Unknown
            ]
        );

        for scan in file.scans() {
            if let Some(rt) = scan.retention_time() {
                assert!(rt >= 0.0);
            }
        }

        // scan=1, scan=2, then an id with no scan number.
        let numbers: Vec<_> = file.scans().iter().map(|s| s.scan_number()).collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        let first = file.scan(0).unwrap();
        assert_eq!(first.ms_level(), Some(1));
        assert_eq!(first.num_data_points(), 5);
        assert!(first.tic() > 0.0);

        let second = file.scan(1).unwrap();
        assert_eq!(second.ms_level(), Some(2));
        assert_eq!(second.isolations().len(), 1);
        assert!(second.isolations()[0].precursor_mz.is_some());

        let third = file.scan(2).unwrap();
        assert_eq!(third.num_data_points(), 0);
        assert_eq!(third.mz_range(), None);

        let chromatogram = file.chromatogram(0).unwrap();
        assert_eq!(chromatogram.num_data_points(), 10);
        assert_eq!(chromatogram.retention_times().len(), 10);
        assert_eq!(chromatogram.mzs().len(), 10);
        assert_eq!(chromatogram.intensities().len(), 10);
        // The time array is declared in minutes and normalized to seconds.
        assert!((chromatogram.retention_times()[1] - 6.0).abs() < 1e-4);
    }

    #[test_log::test]
    fn test_reimport_is_deterministic() {
        let run = || {
            let mut method = MzMLImportMethod::new(SMALL_MZML);
            let file = method.execute().unwrap().unwrap();
            file.scans().iter().map(|s| s.scan_number()).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test_log::test]
    fn test_function_interning_across_scans() {
        let mut method = MzMLImportMethod::new(SMALL_MZML);
        let file = method.execute().unwrap().unwrap();
        // Scans one and three are both MS1; they share one function value.
        let first = file.scan(0).unwrap();
        let third = file.scan(2).unwrap();
        assert!(Arc::ptr_eq(first.function(), third.function()));
        let second = file.scan(1).unwrap();
        assert!(!Arc::ptr_eq(first.function(), second.function()));
    }

    #[test_log::test]
    fn test_cancel_before_execute() {
        let mut method = MzMLImportMethod::new(SMALL_MZML);
        method.cancel();
        let outcome = method.execute().expect("Cancellation must not error");
        assert!(outcome.is_none());
        assert!(method.result().is_none());
    }

    #[test_log::test]
    fn test_missing_file_is_an_error() {
        let mut method = MzMLImportMethod::new("./test/data/no_such_file.mzML");
        let err = method.execute().unwrap_err();
        assert!(matches!(err, ImportError::IOError(_)));
    }

    #[test_log::test]
    fn test_truncated_file_is_an_error() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut_short.mzML");
        let mut fh = std::fs::File::create(&path).unwrap();
        fh.write_all(
            br#"<?xml version="1.0"?>
<mzML>
  <run id="r">
    <spectrumList count="5">
      <spectrum index="0" id="scan=1" defaultArrayLength="3">
        <binaryDataArrayList count="2">
          <binaryDataArray>
            <cvParam cvRef="MS" accession="MS:1000523" name="64-bit float"/>"#,
        )
        .unwrap();
        drop(fh);

        let mut method = MzMLImportMethod::new(&path);
        let err = method.execute().unwrap_err();
        assert!(matches!(err, ImportError::MzMLError(_)));
    }

    #[test_log::test]
    fn test_run_metadata() {
        let mut method = MzMLImportMethod::new(SMALL_MZML);
        let file = method.execute().unwrap().unwrap();
        assert_eq!(file.run().id.as_deref(), Some("small_run"));
        assert!(file.run().start_time.is_some());
    }
}

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use log::info;

use super::handler::MzDataReader;
use crate::io::import::run_import;
use crate::io::record::RawRecord;
use crate::io::traits::{ImportHandle, ImportMethod, ImportState, RecordSource};
use crate::io::ImportError;
use crate::raw::{DataPointList, RawDataFile, RawDataFileType, RunInfo};

/// Adapts the push-style [`MzDataReader`] event pump to the shared
/// record-source capability.
struct MzDataRecordSource<R: Read> {
    reader: MzDataReader<R>,
}

impl<R: Read> RecordSource for MzDataRecordSource<R> {
    fn total_spectra(&self) -> Option<u64> {
        self.reader.num_spectra()
    }

    fn total_chromatograms(&self) -> Option<u64> {
        // The format has no chromatogram list.
        Some(0)
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
Imports one mzData file into a [`RawDataFile`].

Same contract as [`MzMLImportMethod`](crate::io::mzml::MzMLImportMethod):
blocking `execute`, non-blocking progress/result/cancel, `Ok(None)` for a
cancelled run.
*/
pub struct MzDataImportMethod {
    source_path: PathBuf,
    state: Arc<ImportState>,
}

impl MzDataImportMethod {
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

impl ImportMethod for MzDataImportMethod {
    type Output = RawDataFile;

    fn execute(&mut self) -> Result<Option<Arc<RawDataFile>>, ImportError> {
        info!("Started parsing file {}", self.source_path.display());

        let handle = fs::File::open(&self.source_path)?;
        let reader = MzDataReader::new(handle);

        // mzData has no run-level description block worth carrying.
        let file = Arc::new(RawDataFile::new(
            &self.source_path,
            RawDataFileType::MzData,
            RunInfo::default(),
        ));
        self.state.publish(file.clone());

        let mut source = MzDataRecordSource { reader };
        match run_import(&mut source, &file, &self.state) {
            Ok(true) => {
                info!(
                    "Finished importing {}, parsed {} scans",
                    self.source_path.display(),
                    file.scan_count()
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

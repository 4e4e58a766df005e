use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use regex::Regex;

use super::record::{isolation_of, ChromatogramRecord, RawRecord, SpectrumRecord};
use super::traits::{ImportState, RecordSource};
use super::{record, ImportError};
use crate::raw::{
    detect_spectrum_type, Chromatogram, DataPointList, MsFunctionTable, MsScan, RawDataFile,
};

/**
Assigns scan numbers from native id strings, one table per import run.

Ids carrying an explicit `scan=<n>` fragment keep that number, and the
running counter jumps to it. Ids without one receive `last + 1`. Every
assignment is cached by native id so that re-looking up an id already seen
returns the same number. Mixing explicit and synthetic ids can produce
numbering that is not globally monotonic or unique; that interleaving
behavior is deliberate and covered by tests.
*/
#[derive(Debug)]
pub(crate) struct ScanNumberTable {
    pattern: Regex,
    table: HashMap<String, u32>,
    last_scan_number: u32,
}

impl Default for ScanNumberTable {
    fn default() -> Self {
        Self {
            pattern: Regex::new(r"scan=(\d+)").unwrap(),
            table: HashMap::new(),
            last_scan_number: 0,
        }
    }
}

impl ScanNumberTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan_number_of(&mut self, native_id: &str) -> u32 {
        if let Some(number) = self.table.get(native_id) {
            return *number;
        }

        // Some vendors include scan=XX in the id, some don't, such as mzML
        // converted from WIFF files.
        if let Some(found) = self
            .pattern
            .captures(native_id)
            .and_then(|captures| captures.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
        {
            self.last_scan_number = found;
            self.table.insert(native_id.to_string(), found);
            return found;
        }

        let number = self.last_scan_number + 1;
        self.last_scan_number = number;
        self.table.insert(native_id.to_string(), number);
        number
    }
}

/// Turn one accumulated spectrum record and its decoded points into a
/// finalized [`MsScan`] and append it to the output file.
pub(crate) fn finalize_spectrum(
    file: &RawDataFile,
    spectrum: SpectrumRecord,
    scratch: &DataPointList,
    scan_numbers: &mut ScanNumberTable,
    functions: &mut MsFunctionTable,
) -> Result<(), ImportError> {
    if !scratch.is_coherent() {
        return Err(ImportError::MalformedRecord {
            id: spectrum.native_id,
            reason: format!(
                "m/z and intensity arrays disagree on length ({} vs {})",
                scratch.mzs().len(),
                scratch.intensities().len()
            ),
        });
    }

    let scan_number = scan_numbers.scan_number_of(&spectrum.native_id);
    let function = functions.intern(record::ms_function(&spectrum));
    let chromatography = record::chromatography_info(&spectrum);
    let polarity = record::polarity(&spectrum);
    let scan_type = record::scan_type(&spectrum);
    let source_fragmentations = record::source_fragmentation(&spectrum);
    let isolations = record::isolations(&spectrum);

    let scan = MsScan::new(
        spectrum.native_id,
        scan_number,
        detect_spectrum_type(scratch),
        function,
        chromatography,
        scratch.mz_range(),
        spectrum.scan_window,
        scratch.tic(),
        scratch.len(),
        polarity,
        scan_type,
        source_fragmentations,
        isolations,
    );
    file.add_scan(scan);
    Ok(())
}

/// Turn one accumulated chromatogram record into a finalized
/// [`Chromatogram`] and append it to the output file.
pub(crate) fn finalize_chromatogram(
    file: &RawDataFile,
    chromatogram: ChromatogramRecord,
) -> Result<(), ImportError> {
    let isolations: Vec<_> = chromatogram.precursor.iter().map(isolation_of).collect();

    // Documents do not carry a per-point m/z array for chromatograms; the
    // monitored m/z comes from the isolation window and holds for every
    // point.
    let mzs = if chromatogram.mzs.is_empty() && !chromatogram.retention_times.is_empty() {
        let fill = isolations
            .first()
            .and_then(|i| i.precursor_mz)
            .unwrap_or_default();
        vec![fill; chromatogram.retention_times.len()]
    } else {
        chromatogram.mzs
    };

    let chromatogram_number = chromatogram.index as u32 + 1;
    let finished = Chromatogram::new(
        chromatogram_number,
        chromatogram.native_id.clone(),
        chromatogram.retention_times,
        mzs,
        chromatogram.intensities,
        isolations,
    )
    .map_err(|e| ImportError::MalformedRecord {
        id: chromatogram.native_id,
        reason: e.to_string(),
    })?;

    if let Some(declared) = chromatogram.declared_points {
        if declared != finished.num_data_points() {
            debug!(
                "Chromatogram {} declared {} points but carried {}",
                finished.native_id(),
                declared,
                finished.num_data_points()
            );
        }
    }

    file.add_chromatogram(finished);
    Ok(())
}

/// Drive a record source to completion, finalizing and appending each
/// record. Returns `Ok(false)` when the run was cancelled; the cancellation
/// flag is checked at every record boundary, so the record being parsed
/// when the flag flips is the last one finalized.
pub(crate) fn run_import<S: RecordSource>(
    source: &mut S,
    file: &Arc<RawDataFile>,
    state: &ImportState,
) -> Result<bool, ImportError> {
    let mut scan_numbers = ScanNumberTable::new();
    let mut functions = MsFunctionTable::new();
    let mut scratch = DataPointList::new();

    state.add_total(source.total_spectra());
    state.add_total(source.total_chromatograms());
    let mut chromatogram_total_seen = source.total_chromatograms().is_some();

    loop {
        if state.is_canceled() {
            return Ok(false);
        }
        let record = match source.next_record(&mut scratch)? {
            Some(record) => record,
            None => break,
        };
        match record {
            RawRecord::Spectrum(spectrum) => {
                finalize_spectrum(file, spectrum, &scratch, &mut scan_numbers, &mut functions)?;
            }
            RawRecord::Chromatogram(chromatogram) => {
                // The chromatogram list count is declared mid-document;
                // fold it into the denominator the first time it shows up.
                if !chromatogram_total_seen {
                    state.add_total(source.total_chromatograms());
                    chromatogram_total_seen = source.total_chromatograms().is_some();
                }
                finalize_chromatogram(file, chromatogram)?;
            }
        }
        state.record_parsed();
    }
    Ok(true)
}

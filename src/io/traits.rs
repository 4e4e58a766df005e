use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::record::RawRecord;
use super::ImportError;
use crate::raw::{DataPointList, RawDataFile};

/**
A sequential source of finalized records: one fully assembled spectrum or
chromatogram per step, in document order. The two drivers differ in how they
move through the document (push-style event handling vs. pull-style record
cursor), but downstream of this capability they are indistinguishable.
*/
pub trait RecordSource {
    /// The number of spectra the document declares, if known yet.
    fn total_spectra(&self) -> Option<u64>;

    /// The number of chromatograms the document declares, if known yet.
    fn total_chromatograms(&self) -> Option<u64>;

    /// Produce the next record, decoding spectrum points into `scratch`
    /// (replacing its previous contents). `Ok(None)` means the document's
    /// record lists are exhausted.
    fn next_record(
        &mut self,
        scratch: &mut DataPointList,
    ) -> Result<Option<RawRecord>, ImportError>;
}

/// The state one import run shares between the executing thread and any
/// polling threads: the cooperative cancellation flag, the progress
/// counters, and the (possibly partial) result. All fields are updated with
/// non-blocking primitives so pollers never wait on the parser.
#[derive(Debug, Default)]
pub(crate) struct ImportState {
    canceled: AtomicBool,
    totals_known: AtomicBool,
    total_records: AtomicU64,
    parsed_records: AtomicU64,
    /// The largest fraction ever reported, as f32 bits. Progress must never
    /// run backwards even when the denominator grows mid-run (the
    /// chromatogram count of an mzML document is only declared after all
    /// spectra).
    reported: AtomicU32,
    result: RwLock<Option<Arc<RawDataFile>>>,
}

impl ImportState {
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Install or extend the denominator of the progress fraction.
    pub fn add_total(&self, count: Option<u64>) {
        if let Some(count) = count {
            self.total_records.fetch_add(count, Ordering::Relaxed);
            self.totals_known.store(true, Ordering::Release);
        }
    }

    pub fn record_parsed(&self) {
        self.parsed_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finished_percentage(&self) -> Option<f32> {
        if !self.totals_known.load(Ordering::Acquire) {
            return None;
        }
        let total = self.total_records.load(Ordering::Relaxed);
        if total == 0 {
            return None;
        }
        let parsed = self.parsed_records.load(Ordering::Relaxed);
        let fraction = (parsed as f32 / total as f32).min(1.0);
        // Ratchet so concurrent readers observe a non-decreasing sequence.
        let mut previous = self.reported.load(Ordering::Relaxed);
        loop {
            if f32::from_bits(previous) >= fraction {
                return Some(f32::from_bits(previous));
            }
            match self.reported.compare_exchange_weak(
                previous,
                fraction.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(fraction),
                Err(seen) => previous = seen,
            }
        }
    }

    pub fn publish(&self, file: Arc<RawDataFile>) {
        *self.result.write() = Some(file);
    }

    pub fn clear_result(&self) {
        *self.result.write() = None;
    }

    pub fn result(&self) -> Option<Arc<RawDataFile>> {
        self.result.read().clone()
    }
}

/**
A cheap cloneable view of a running import, safe to hold on a different
thread than the one calling `execute`. This is how a supervising scheduler
cancels an import or polls its progress while the blocking call is in
flight.
*/
#[derive(Debug, Clone)]
pub struct ImportHandle {
    state: Arc<ImportState>,
}

impl ImportHandle {
    pub(crate) fn new(state: Arc<ImportState>) -> Self {
        Self { state }
    }

    /// Request cooperative cancellation. The import finishes the record it
    /// is on, then unwinds without producing a result.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// The fraction of declared records imported so far, or `None` before
    /// the document's totals are known.
    pub fn finished_percentage(&self) -> Option<f32> {
        self.state.finished_percentage()
    }

    /// The raw data file assembled so far. Scans already appended are fully
    /// finalized and safe to read while the import continues.
    pub fn result(&self) -> Option<Arc<RawDataFile>> {
        self.state.result()
    }
}

/**
The blocking import operation and its non-blocking control surface.

`execute` distinguishes three outcomes: `Ok(Some(file))` on success,
`Ok(None)` when the run was cancelled, and `Err` when the document was
structurally unreadable.
*/
pub trait ImportMethod {
    type Output;

    /// Open the source, stream it to completion, and return the assembled
    /// output. Blocking; run it on a worker.
    fn execute(&mut self) -> Result<Option<Arc<Self::Output>>, ImportError>;

    /// Non-blocking progress query; see [`ImportHandle::finished_percentage`].
    fn finished_percentage(&self) -> Option<f32>;

    /// Non-blocking result query; see [`ImportHandle::result`].
    fn result(&self) -> Option<Arc<Self::Output>>;

    /// Non-blocking cooperative cancellation request.
    fn cancel(&self);
}

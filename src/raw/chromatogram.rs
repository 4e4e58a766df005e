use thiserror::Error;

use super::scan::IsolationInfo;

/// The co-indexed coordinate arrays of a chromatogram disagree on length.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "Chromatogram arrays disagree on length: {retention_times} retention times, {mzs} m/z values, {intensities} intensities"
)]
pub struct ChromatogramLengthMismatch {
    pub retention_times: usize,
    pub mzs: usize,
    pub intensities: usize,
}

/**
One imported chromatogram: a measure over time described by three co-indexed
arrays of equal length. Construction fails rather than producing a value
that violates that invariant.
*/
#[derive(Debug, Clone)]
pub struct Chromatogram {
    chromatogram_number: u32,
    native_id: String,
    retention_times: Vec<f32>,
    mzs: Vec<f64>,
    intensities: Vec<f32>,
    isolations: Vec<IsolationInfo>,
}

impl Chromatogram {
    pub(crate) fn new(
        chromatogram_number: u32,
        native_id: String,
        retention_times: Vec<f32>,
        mzs: Vec<f64>,
        intensities: Vec<f32>,
        isolations: Vec<IsolationInfo>,
    ) -> Result<Self, ChromatogramLengthMismatch> {
        if retention_times.len() != mzs.len() || mzs.len() != intensities.len() {
            return Err(ChromatogramLengthMismatch {
                retention_times: retention_times.len(),
                mzs: mzs.len(),
                intensities: intensities.len(),
            });
        }
        Ok(Self {
            chromatogram_number,
            native_id,
            retention_times,
            mzs,
            intensities,
            isolations,
        })
    }

    pub fn chromatogram_number(&self) -> u32 {
        self.chromatogram_number
    }

    pub fn native_id(&self) -> &str {
        &self.native_id
    }

    pub fn num_data_points(&self) -> usize {
        self.retention_times.len()
    }

    /// Retention times in seconds.
    pub fn retention_times(&self) -> &[f32] {
        &self.retention_times
    }

    pub fn mzs(&self) -> &[f64] {
        &self.mzs
    }

    pub fn intensities(&self) -> &[f32] {
        &self.intensities
    }

    pub fn isolations(&self) -> &[IsolationInfo] {
        &self.isolations
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_coindexed_arrays() {
        let c = Chromatogram::new(
            1,
            "TIC".into(),
            vec![0.0, 30.0, 60.0],
            vec![0.0, 0.0, 0.0],
            vec![100.0, 250.0, 75.0],
            Vec::new(),
        )
        .unwrap();
        assert_eq!(c.num_data_points(), 3);
        assert_eq!(c.retention_times().len(), c.mzs().len());
        assert_eq!(c.mzs().len(), c.intensities().len());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = Chromatogram::new(
            1,
            "TIC".into(),
            vec![0.0, 30.0],
            vec![0.0, 0.0, 0.0],
            vec![100.0, 250.0],
            Vec::new(),
        )
        .unwrap_err();
        assert_eq!(err.retention_times, 2);
        assert_eq!(err.mzs, 3);
    }
}

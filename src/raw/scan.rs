use std::sync::Arc;

use super::function::MsFunction;
use super::spectrumtype::MsSpectrumType;

/**
Describes the polarity of a mass spectrum. A spectrum is either `Positive` (+1),
`Negative` (-1) or `Unknown` (0). The `Unknown` state is the default.
*/
#[repr(i8)]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Default)]
pub enum PolarityType {
    #[default]
    Unknown = 0,
    Positive = 1,
    Negative = -1,
}

/// The acquisition mode of a single scan, as declared by the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MsScanType {
    #[default]
    Unknown,
    Full,
    Zoom,
    SIM,
    MRM,
}

/// The dissociation method applied to an ion population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FragmentationType {
    #[default]
    Unknown,
    CID,
    HCD,
    ETD,
    ECD,
    Photodissociation,
}

/// How an ion population was dissociated and at what energy. Used both for
/// in-source fragmentation on the scan itself and for the activation step of
/// an isolation record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FragmentationInfo {
    pub fragmentation_type: FragmentationType,
    /// Activation energy, in the unit the document declared (typically eV).
    pub activation_energy: Option<f64>,
}

/// One precursor isolation event that contributed ions to this scan.
///
/// Every field is independently optional. A document may describe an
/// isolation window with no resolvable precursor m/z, or a selected ion with
/// no charge state, and the record is kept either way.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IsolationInfo {
    pub precursor_mz: Option<f64>,
    /// Explicit lower and upper bounds of the isolation window, in m/z.
    pub isolation_mz_range: Option<(f64, f64)>,
    pub precursor_charge: Option<i32>,
    pub activation: Option<FragmentationInfo>,
}

/// Retention time coordinates of one record, in seconds. The secondary
/// retention time carries the second dimension of a two-dimensional
/// separation when the source provides one.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChromatographyInfo {
    pub retention_time: f32,
    pub secondary_retention_time: Option<f32>,
}

impl ChromatographyInfo {
    pub fn new(retention_time: f32) -> Self {
        Self {
            retention_time,
            secondary_retention_time: None,
        }
    }
}

/**
One imported mass spectrum. Scans are immutable once built: the import
pipeline derives every summary attribute (m/z range, TIC, spectrum type,
point count) from the transient decode buffer before the buffer is reused
for the next record.
*/
#[derive(Debug, Clone)]
pub struct MsScan {
    native_id: String,
    scan_number: u32,
    spectrum_type: MsSpectrumType,
    function: Arc<MsFunction>,
    chromatography: Option<ChromatographyInfo>,
    mz_range: Option<(f64, f64)>,
    scanning_range: Option<(f64, f64)>,
    tic: f32,
    num_data_points: usize,
    polarity: PolarityType,
    scan_type: MsScanType,
    source_fragmentations: Vec<FragmentationInfo>,
    isolations: Vec<IsolationInfo>,
}

#[allow(clippy::too_many_arguments)]
impl MsScan {
    pub(crate) fn new(
        native_id: String,
        scan_number: u32,
        spectrum_type: MsSpectrumType,
        function: Arc<MsFunction>,
        chromatography: Option<ChromatographyInfo>,
        mz_range: Option<(f64, f64)>,
        scanning_range: Option<(f64, f64)>,
        tic: f32,
        num_data_points: usize,
        polarity: PolarityType,
        scan_type: MsScanType,
        source_fragmentations: Vec<FragmentationInfo>,
        isolations: Vec<IsolationInfo>,
    ) -> Self {
        Self {
            native_id,
            scan_number,
            spectrum_type,
            function,
            chromatography,
            mz_range,
            scanning_range,
            tic,
            num_data_points,
            polarity,
            scan_type,
            source_fragmentations,
            isolations,
        }
    }

    /// The format-specific identifier string of this scan in the source
    /// document.
    pub fn native_id(&self) -> &str {
        &self.native_id
    }

    /// The assigned scan number. Positive, stable across re-imports of the
    /// same document.
    pub fn scan_number(&self) -> u32 {
        self.scan_number
    }

    pub fn spectrum_type(&self) -> MsSpectrumType {
        self.spectrum_type
    }

    pub fn function(&self) -> &Arc<MsFunction> {
        &self.function
    }

    pub fn ms_level(&self) -> Option<u32> {
        self.function.ms_level()
    }

    pub fn chromatography(&self) -> Option<ChromatographyInfo> {
        self.chromatography
    }

    /// Retention time in seconds, if the document declared one.
    pub fn retention_time(&self) -> Option<f32> {
        self.chromatography.map(|c| c.retention_time)
    }

    /// The m/z extent of the points actually observed in this scan.
    pub fn mz_range(&self) -> Option<(f64, f64)> {
        self.mz_range
    }

    /// The m/z window the instrument was commanded to scan, when declared.
    pub fn scanning_range(&self) -> Option<(f64, f64)> {
        self.scanning_range
    }

    pub fn tic(&self) -> f32 {
        self.tic
    }

    pub fn num_data_points(&self) -> usize {
        self.num_data_points
    }

    pub fn polarity(&self) -> PolarityType {
        self.polarity
    }

    pub fn scan_type(&self) -> MsScanType {
        self.scan_type
    }

    pub fn source_fragmentations(&self) -> &[FragmentationInfo] {
        &self.source_fragmentations
    }

    pub fn isolations(&self) -> &[IsolationInfo] {
        &self.isolations
    }
}

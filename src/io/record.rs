//! The intermediate representation one driver step produces, and the pure
//! functions that pull typed metadata fields out of it.
//!
//! Both drivers accumulate the same record shape, so everything downstream
//! of the XML layer (extraction, spectrum typing, scan numbering, append)
//! is shared between the formats.

use std::fmt::Display;
use std::str::FromStr;

use log::warn;

use crate::params::{
    time_to_seconds, ControlledVocabulary, Param, ParamDescribed, ParamList, Unit,
};
use crate::raw::{
    ChromatographyInfo, FragmentationInfo, FragmentationType, IsolationInfo, MsFunction,
    MsScanType, PolarityType,
};

/// One precursor isolation event as accumulated from the document, before
/// extraction. The three parameter lists mirror the `<isolationWindow>`,
/// `<selectedIon>`, and `<activation>` sub-elements.
#[derive(Debug, Default, Clone)]
pub struct PrecursorRecord {
    pub isolation_params: ParamList,
    pub ion_params: ParamList,
    pub activation_params: ParamList,
}

/// One spectrum as accumulated from the document. The decoded point data
/// lives in the caller's scratch [`DataPointList`](crate::raw::DataPointList),
/// not here.
#[derive(Debug, Default, Clone)]
pub struct SpectrumRecord {
    pub native_id: String,
    pub index: usize,
    pub declared_points: Option<usize>,
    /// Spectrum-level vocabulary terms (MS level, polarity, scan mode, ...).
    pub params: ParamList,
    /// Scan-level vocabulary terms (scan start time, ...).
    pub scan_params: ParamList,
    /// The instrument scanning window, when declared.
    pub scan_window: Option<(f64, f64)>,
    pub precursors: Vec<PrecursorRecord>,
}

/// One chromatogram as accumulated from the document, its coordinate arrays
/// already decoded. Chromatogram arrays are persisted on the output object,
/// so they are owned here rather than borrowed from scratch space.
#[derive(Debug, Default, Clone)]
pub struct ChromatogramRecord {
    pub native_id: String,
    pub index: usize,
    pub declared_points: Option<usize>,
    pub params: ParamList,
    pub precursor: Option<PrecursorRecord>,
    /// Retention times in seconds.
    pub retention_times: Vec<f32>,
    pub mzs: Vec<f64>,
    pub intensities: Vec<f32>,
}

/// One finalized step of a sequential record source.
#[derive(Debug, Clone)]
pub enum RawRecord {
    Spectrum(SpectrumRecord),
    Chromatogram(ChromatogramRecord),
}

crate::impl_param_described!(SpectrumRecord, ChromatogramRecord);

// Accession constants for the PSI-MS vocabulary terms the extractor reads.
const MS_SCAN_START_TIME: u32 = 1000016;
const MS_ELUTION_TIME: u32 = 1000826;
const MS_NEGATIVE_SCAN: u32 = 1000129;
const MS_POSITIVE_SCAN: u32 = 1000130;
const MS_MS_LEVEL: u32 = 1000511;
const MS_ZOOM_SCAN: u32 = 1000497;
const MS_FULL_SCAN: u32 = 1000498;
const MS_SIM_SPECTRUM: u32 = 1000582;
const MS_SRM_SPECTRUM: u32 = 1000583;
const MS_ISOLATION_TARGET: u32 = 1000827;
const MS_ISOLATION_LOWER_OFFSET: u32 = 1000828;
const MS_ISOLATION_UPPER_OFFSET: u32 = 1000829;
const MS_SELECTED_ION_MZ: u32 = 1000744;
const MS_CHARGE_STATE: u32 = 1000041;
const MS_COLLISION_ENERGY: u32 = 1000045;

const MS_CID: u32 = 1000133;
const MS_PHOTODISSOCIATION: u32 = 1000435;
const MS_ECD: u32 = 1000250;
const MS_HCD: u32 = 1000422;
const MS_ETD: u32 = 1000598;

fn find_ms(params: &ParamList, accession: u32) -> Option<&Param> {
    params.get_param_by_accession(ControlledVocabulary::MS, accession)
}

fn find_by_name<'a>(params: &'a ParamList, name: &str) -> Option<&'a Param> {
    params.get_param_by_name(name)
}

/// Parse a parameter value, demoting malformed text to a missing field.
fn coerce_or_warn<T>(param: &Param, what: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    match param.coerce::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(
                "Failed to parse {what} from {:?} ({e}), leaving it unset",
                param.value
            );
            None
        }
    }
}

/// Read the retention time coordinates of a spectrum, normalized to seconds.
///
/// The primary retention time comes from the scan start time term; mzData
/// documents instead carry the legacy `TimeInMinutes`/`TimeInSeconds`
/// parameters. The secondary retention time comes from the elution time
/// term when one is present.
pub fn chromatography_info(record: &SpectrumRecord) -> Option<ChromatographyInfo> {
    let rt = retention_time_seconds(&record.scan_params)?;
    if rt < 0.0 {
        warn!(
            "Negative retention time {rt} on spectrum {:?}, discarding it",
            record.native_id
        );
        return None;
    }
    let mut info = ChromatographyInfo::new(rt);
    if let Some(p) = find_ms(&record.scan_params, MS_ELUTION_TIME) {
        info.secondary_retention_time = coerce_or_warn::<f64>(p, "elution time")
            .map(|v| time_to_seconds(v, p.unit) as f32);
    }
    Some(info)
}

fn retention_time_seconds(params: &ParamList) -> Option<f32> {
    if let Some(p) = find_ms(params, MS_SCAN_START_TIME) {
        return coerce_or_warn::<f64>(p, "scan start time")
            .map(|v| time_to_seconds(v, p.unit) as f32);
    }
    if let Some(p) = find_by_name(params, "TimeInMinutes") {
        return coerce_or_warn::<f64>(p, "retention time")
            .map(|v| time_to_seconds(v, Unit::Minute) as f32);
    }
    if let Some(p) = find_by_name(params, "TimeInSeconds") {
        return coerce_or_warn::<f64>(p, "retention time").map(|v| v as f32);
    }
    None
}

/// Infer the scan polarity from its mutually exclusive vocabulary flags.
/// Contradictory declarations resolve to `Unknown`, not an error.
pub fn polarity(record: &SpectrumRecord) -> PolarityType {
    let positive = find_ms(&record.params, MS_POSITIVE_SCAN).is_some();
    let negative = find_ms(&record.params, MS_NEGATIVE_SCAN).is_some();
    match (positive, negative) {
        (true, false) => PolarityType::Positive,
        (false, true) => PolarityType::Negative,
        (true, true) => {
            warn!(
                "Spectrum {:?} declares both polarities, treating it as unknown",
                record.native_id
            );
            PolarityType::Unknown
        }
        (false, false) => match find_by_name(&record.params, "Polarity").map(|p| p.value.as_str())
        {
            Some("Positive") => PolarityType::Positive,
            Some("Negative") => PolarityType::Negative,
            _ => PolarityType::Unknown,
        },
    }
}

/// Read the acquisition mode of the scan; absent terms map to `Unknown`.
pub fn scan_type(record: &SpectrumRecord) -> MsScanType {
    if find_ms(&record.params, MS_FULL_SCAN).is_some() {
        return MsScanType::Full;
    }
    if find_ms(&record.params, MS_ZOOM_SCAN).is_some() {
        return MsScanType::Zoom;
    }
    if find_ms(&record.params, MS_SIM_SPECTRUM).is_some() {
        return MsScanType::SIM;
    }
    if find_ms(&record.params, MS_SRM_SPECTRUM).is_some() {
        return MsScanType::MRM;
    }
    match find_by_name(&record.params, "ScanMode").map(|p| p.value.as_str()) {
        Some("MassScan") => MsScanType::Full,
        Some("Zoom") => MsScanType::Zoom,
        Some("SelectedIonDetection") => MsScanType::SIM,
        Some("MultipleReactionMonitoring") => MsScanType::MRM,
        _ => MsScanType::Unknown,
    }
}

/// Derive the MS function of the scan from its MS level term. An absent or
/// unparsable level yields the unknown function.
pub fn ms_function(record: &SpectrumRecord) -> MsFunction {
    let level = find_ms(&record.params, MS_MS_LEVEL)
        .or_else(|| find_by_name(&record.params, "ms level"))
        .and_then(|p| coerce_or_warn::<u32>(p, "ms level"));
    MsFunction::new(None, level)
}

/// In-source fragmentation declared at the spectrum level, outside any
/// precursor element. Most documents declare none.
pub fn source_fragmentation(record: &SpectrumRecord) -> Vec<FragmentationInfo> {
    match fragmentation_of(&record.params) {
        Some(info) => vec![info],
        None => Vec::new(),
    }
}

/// Build one [`IsolationInfo`] per precursor element. Every sub-field is
/// independently optional: an isolation window with no resolvable precursor
/// m/z still yields a record.
pub fn isolations(record: &SpectrumRecord) -> Vec<IsolationInfo> {
    record.precursors.iter().map(isolation_of).collect()
}

pub(crate) fn isolation_of(precursor: &PrecursorRecord) -> IsolationInfo {
    let mut info = IsolationInfo::default();

    info.precursor_mz = find_ms(&precursor.ion_params, MS_SELECTED_ION_MZ)
        .or_else(|| find_by_name(&precursor.ion_params, "MassToChargeRatio"))
        .and_then(|p| coerce_or_warn::<f64>(p, "selected ion m/z"));

    info.precursor_charge = find_ms(&precursor.ion_params, MS_CHARGE_STATE)
        .or_else(|| find_by_name(&precursor.ion_params, "ChargeState"))
        .and_then(|p| coerce_or_warn::<i32>(p, "charge state"));

    let target = find_ms(&precursor.isolation_params, MS_ISOLATION_TARGET)
        .and_then(|p| coerce_or_warn::<f64>(p, "isolation window target"));
    if let Some(target) = target {
        let lower = find_ms(&precursor.isolation_params, MS_ISOLATION_LOWER_OFFSET)
            .and_then(|p| coerce_or_warn::<f64>(p, "isolation window offset"))
            .unwrap_or(0.0);
        let upper = find_ms(&precursor.isolation_params, MS_ISOLATION_UPPER_OFFSET)
            .and_then(|p| coerce_or_warn::<f64>(p, "isolation window offset"))
            .unwrap_or(0.0);
        info.isolation_mz_range = Some((target - lower, target + upper));
        if info.precursor_mz.is_none() {
            info.precursor_mz = Some(target);
        }
    }

    info.activation = fragmentation_of(&precursor.activation_params);
    info
}

fn fragmentation_of(params: &ParamList) -> Option<FragmentationInfo> {
    let mut fragmentation_type = None;
    for p in params.iter() {
        if p.controlled_vocabulary != Some(ControlledVocabulary::MS) {
            continue;
        }
        fragmentation_type = match p.accession {
            Some(MS_CID) => Some(FragmentationType::CID),
            Some(MS_HCD) => Some(FragmentationType::HCD),
            Some(MS_ETD) => Some(FragmentationType::ETD),
            Some(MS_ECD) => Some(FragmentationType::ECD),
            Some(MS_PHOTODISSOCIATION) => Some(FragmentationType::Photodissociation),
            _ => continue,
        };
        break;
    }
    if fragmentation_type.is_none() {
        fragmentation_type = find_by_name(params, "Method").map(|p| match p.value.as_str() {
            "CID" => FragmentationType::CID,
            "HCD" => FragmentationType::HCD,
            "ETD" => FragmentationType::ETD,
            "ECD" => FragmentationType::ECD,
            "PD" | "PSD" => FragmentationType::Photodissociation,
            _ => FragmentationType::Unknown,
        });
    }

    let energy = find_ms(params, MS_COLLISION_ENERGY)
        .or_else(|| find_by_name(params, "CollisionEnergy"))
        .and_then(|p| coerce_or_warn::<f64>(p, "collision energy"));

    if fragmentation_type.is_none() && energy.is_none() {
        return None;
    }
    Some(FragmentationInfo {
        fragmentation_type: fragmentation_type.unwrap_or_default(),
        activation_energy: energy,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn ms_param(accession: u32, name: &str, value: &str, unit: Unit) -> Param {
        Param {
            name: name.to_string(),
            value: value.to_string(),
            accession: Some(accession),
            controlled_vocabulary: Some(ControlledVocabulary::MS),
            unit,
        }
    }

    fn legacy_param(name: &str, value: &str) -> Param {
        Param::new_key_value(name.to_string(), value.to_string())
    }

    #[test]
    fn test_retention_time_minutes_to_seconds() {
        let mut record = SpectrumRecord::default();
        record.scan_params.push(ms_param(
            MS_SCAN_START_TIME,
            "scan start time",
            "0.5",
            Unit::Minute,
        ));
        let info = chromatography_info(&record).unwrap();
        assert_eq!(info.retention_time, 30.0);
        assert_eq!(info.secondary_retention_time, None);
    }

    #[test]
    fn test_retention_time_legacy_names() {
        let mut record = SpectrumRecord::default();
        record
            .scan_params
            .push(legacy_param("TimeInMinutes", "2.0"));
        assert_eq!(
            chromatography_info(&record).unwrap().retention_time,
            120.0
        );

        let mut record = SpectrumRecord::default();
        record
            .scan_params
            .push(legacy_param("TimeInSeconds", "45.5"));
        assert_eq!(chromatography_info(&record).unwrap().retention_time, 45.5);
    }

    #[test]
    fn test_malformed_retention_time_is_not_fatal() {
        let mut record = SpectrumRecord::default();
        record.scan_params.push(ms_param(
            MS_SCAN_START_TIME,
            "scan start time",
            "soon",
            Unit::Minute,
        ));
        assert!(chromatography_info(&record).is_none());
    }

    #[test]
    fn test_secondary_retention_time() {
        let mut record = SpectrumRecord::default();
        record.scan_params.push(ms_param(
            MS_SCAN_START_TIME,
            "scan start time",
            "60",
            Unit::Second,
        ));
        record.scan_params.push(ms_param(
            MS_ELUTION_TIME,
            "elution time",
            "1.5",
            Unit::Minute,
        ));
        let info = chromatography_info(&record).unwrap();
        assert_eq!(info.retention_time, 60.0);
        assert_eq!(info.secondary_retention_time, Some(90.0));
    }

    #[test]
    fn test_polarity_flags() {
        let mut record = SpectrumRecord::default();
        assert_eq!(polarity(&record), PolarityType::Unknown);

        record
            .params
            .push(ms_param(MS_POSITIVE_SCAN, "positive scan", "", Unit::Unknown));
        assert_eq!(polarity(&record), PolarityType::Positive);

        record
            .params
            .push(ms_param(MS_NEGATIVE_SCAN, "negative scan", "", Unit::Unknown));
        assert_eq!(polarity(&record), PolarityType::Unknown);
    }

    #[test]
    fn test_polarity_legacy() {
        let mut record = SpectrumRecord::default();
        record.params.push(legacy_param("Polarity", "Negative"));
        assert_eq!(polarity(&record), PolarityType::Negative);
    }

    #[test]
    fn test_ms_function_levels() {
        let mut record = SpectrumRecord::default();
        assert_eq!(ms_function(&record).ms_level(), None);

        record
            .params
            .push(ms_param(MS_MS_LEVEL, "ms level", "2", Unit::Unknown));
        assert_eq!(ms_function(&record).ms_level(), Some(2));
    }

    #[test]
    fn test_ms_function_malformed_level() {
        let mut record = SpectrumRecord::default();
        record
            .params
            .push(ms_param(MS_MS_LEVEL, "ms level", "two", Unit::Unknown));
        assert_eq!(ms_function(&record).ms_level(), None);
    }

    #[test]
    fn test_scan_types() {
        let mut record = SpectrumRecord::default();
        assert_eq!(scan_type(&record), MsScanType::Unknown);
        record
            .params
            .push(ms_param(MS_SRM_SPECTRUM, "SRM spectrum", "", Unit::Unknown));
        assert_eq!(scan_type(&record), MsScanType::MRM);

        let mut record = SpectrumRecord::default();
        record.params.push(legacy_param("ScanMode", "Zoom"));
        assert_eq!(scan_type(&record), MsScanType::Zoom);
    }

    #[test]
    fn test_isolation_full() {
        let mut precursor = PrecursorRecord::default();
        precursor.isolation_params.push(ms_param(
            MS_ISOLATION_TARGET,
            "isolation window target m/z",
            "445.12",
            Unit::MZ,
        ));
        precursor.isolation_params.push(ms_param(
            MS_ISOLATION_LOWER_OFFSET,
            "isolation window lower offset",
            "1.0",
            Unit::MZ,
        ));
        precursor.isolation_params.push(ms_param(
            MS_ISOLATION_UPPER_OFFSET,
            "isolation window upper offset",
            "1.0",
            Unit::MZ,
        ));
        precursor.ion_params.push(ms_param(
            MS_SELECTED_ION_MZ,
            "selected ion m/z",
            "445.10",
            Unit::MZ,
        ));
        precursor
            .ion_params
            .push(ms_param(MS_CHARGE_STATE, "charge state", "2", Unit::Unknown));
        precursor.activation_params.push(ms_param(
            MS_HCD,
            "beam-type collision-induced dissociation",
            "",
            Unit::Unknown,
        ));
        precursor.activation_params.push(ms_param(
            MS_COLLISION_ENERGY,
            "collision energy",
            "27.0",
            Unit::Electronvolt,
        ));

        let info = isolation_of(&precursor);
        assert_eq!(info.precursor_mz, Some(445.10));
        assert_eq!(info.precursor_charge, Some(2));
        assert_eq!(info.isolation_mz_range, Some((444.12, 446.12)));
        let activation = info.activation.unwrap();
        assert_eq!(activation.fragmentation_type, FragmentationType::HCD);
        assert_eq!(activation.activation_energy, Some(27.0));
    }

    #[test]
    fn test_isolation_window_without_selected_ion() {
        let mut precursor = PrecursorRecord::default();
        precursor.isolation_params.push(ms_param(
            MS_ISOLATION_TARGET,
            "isolation window target m/z",
            "500.0",
            Unit::MZ,
        ));
        let info = isolation_of(&precursor);
        // The target stands in for the missing selected ion.
        assert_eq!(info.precursor_mz, Some(500.0));
        assert_eq!(info.isolation_mz_range, Some((500.0, 500.0)));
        assert_eq!(info.precursor_charge, None);
    }

    #[test]
    fn test_isolation_empty_precursor_still_yields_record() {
        let record = SpectrumRecord {
            precursors: vec![PrecursorRecord::default()],
            ..Default::default()
        };
        let infos = isolations(&record);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].precursor_mz, None);
        assert_eq!(infos[0].isolation_mz_range, None);
        assert!(infos[0].activation.is_none());
    }

    #[test]
    fn test_malformed_energy_keeps_method() {
        let mut precursor = PrecursorRecord::default();
        precursor
            .activation_params
            .push(ms_param(MS_CID, "collision-induced dissociation", "", Unit::Unknown));
        precursor.activation_params.push(ms_param(
            MS_COLLISION_ENERGY,
            "collision energy",
            "not-a-number",
            Unit::Electronvolt,
        ));
        let info = isolation_of(&precursor);
        let activation = info.activation.unwrap();
        assert_eq!(activation.fragmentation_type, FragmentationType::CID);
        assert_eq!(activation.activation_energy, None);
    }

    #[test]
    fn test_mzdata_style_precursor() {
        let mut precursor = PrecursorRecord::default();
        precursor
            .ion_params
            .push(legacy_param("MassToChargeRatio", "721.3"));
        precursor.ion_params.push(legacy_param("ChargeState", "3"));
        precursor.activation_params.push(legacy_param("Method", "CID"));
        precursor
            .activation_params
            .push(legacy_param("CollisionEnergy", "35"));

        let info = isolation_of(&precursor);
        assert_eq!(info.precursor_mz, Some(721.3));
        assert_eq!(info.precursor_charge, Some(3));
        let activation = info.activation.unwrap();
        assert_eq!(activation.fragmentation_type, FragmentationType::CID);
        assert_eq!(activation.activation_energy, Some(35.0));
    }
}

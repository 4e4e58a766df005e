use std::borrow::Cow;
use std::fmt::Display;
use std::str::{self, FromStr};

/// Split a `CV:accession` string into its vocabulary and numeric parts.
pub fn curie_to_num(curie: &str) -> (Option<ControlledVocabulary>, Option<u32>) {
    let mut parts = curie.split(':');
    let prefix = match parts.next() {
        Some(v) => v
            .parse::<ControlledVocabulary>()
            .unwrap_or(ControlledVocabulary::Unknown)
            .as_option(),
        None => None,
    };
    if let Some(k) = parts.next() {
        match k.parse() {
            Ok(v) => (prefix, Some(v)),
            Err(_) => (prefix, None),
        }
    } else {
        (prefix, None)
    }
}

pub trait ParamLike {
    fn name(&self) -> &str;
    fn value(&self) -> &str;
    fn accession(&self) -> Option<u32>;
    fn controlled_vocabulary(&self) -> Option<ControlledVocabulary>;
    fn unit(&self) -> Unit;

    fn coerce<T: str::FromStr>(&self) -> Result<T, T::Err> {
        self.value().parse::<T>()
    }

    fn is_controlled(&self) -> bool {
        self.accession().is_some()
    }

    /// Does this parameter come from the PSI-MS vocabulary?
    fn is_ms(&self) -> bool {
        matches!(self.controlled_vocabulary(), Some(ControlledVocabulary::MS))
    }

    fn curie(&self) -> Option<String> {
        if !self.is_controlled() {
            None
        } else {
            let cv = &self.controlled_vocabulary().unwrap();
            let acc = self.accession().unwrap();
            let accession_str = format!("{}:{:07}", cv.prefix(), acc);
            Some(accession_str)
        }
    }
}

/// A borrowed controlled-vocabulary parameter, used while parsing to avoid
/// copying attribute text that is immediately matched and discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamCow<'a> {
    pub name: Cow<'a, str>,
    pub value: Cow<'a, str>,
    pub accession: Option<u32>,
    pub controlled_vocabulary: Option<ControlledVocabulary>,
    pub unit: Unit,
}

impl<'a> ParamCow<'a> {
    pub fn new(
        name: Cow<'a, str>,
        value: Cow<'a, str>,
        accession: Option<u32>,
        controlled_vocabulary: Option<ControlledVocabulary>,
        unit: Unit,
    ) -> Self {
        Self {
            name,
            value,
            accession,
            controlled_vocabulary,
            unit,
        }
    }

    pub fn coerce<T: str::FromStr>(&self) -> Result<T, T::Err> {
        self.value.parse::<T>()
    }

    pub fn is_controlled(&self) -> bool {
        self.accession.is_some()
    }
}

impl<'a> ParamLike for ParamCow<'a> {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn accession(&self) -> Option<u32> {
        self.accession
    }

    fn controlled_vocabulary(&self) -> Option<ControlledVocabulary> {
        self.controlled_vocabulary
    }

    fn unit(&self) -> Unit {
        self.unit
    }
}

impl<'a> From<ParamCow<'a>> for Param {
    fn from(value: ParamCow<'a>) -> Self {
        Param {
            name: value.name.into_owned(),
            value: value.value.into_owned(),
            accession: value.accession,
            controlled_vocabulary: value.controlled_vocabulary,
            unit: value.unit,
        }
    }
}

/// An owned controlled-vocabulary or user parameter attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub value: String,
    pub accession: Option<u32>,
    pub controlled_vocabulary: Option<ControlledVocabulary>,
    pub unit: Unit,
}

impl Param {
    pub fn new() -> Param {
        Param {
            ..Default::default()
        }
    }

    pub fn new_key_value(name: String, value: String) -> Param {
        let mut inst = Self::new();
        inst.name = name;
        inst.value = value;
        inst
    }

    pub fn coerce<T: str::FromStr>(&self) -> Result<T, T::Err> {
        self.value.parse::<T>()
    }

    pub fn is_controlled(&self) -> bool {
        self.accession.is_some()
    }

    pub fn curie(&self) -> Option<String> {
        if !self.is_controlled() {
            None
        } else {
            let cv = &self.controlled_vocabulary.unwrap();
            let acc = self.accession.unwrap();
            let accession_str = format!("{}:{:07}", cv.prefix(), acc);
            Some(accession_str)
        }
    }

    pub fn with_unit<S: AsRef<str>, A: AsRef<str>>(mut self, accession: S, name: A) -> Param {
        self.unit = Unit::from_accession(accession.as_ref());
        if matches!(self.unit, Unit::Unknown) {
            self.unit = Unit::from_name(name.as_ref());
        }
        self
    }

    pub fn with_unit_t(mut self, unit: &Unit) -> Param {
        self.unit = *unit;
        self
    }
}

impl ParamLike for Param {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn accession(&self) -> Option<u32> {
        self.accession
    }

    fn controlled_vocabulary(&self) -> Option<ControlledVocabulary> {
        self.controlled_vocabulary
    }

    fn unit(&self) -> Unit {
        self.unit
    }
}

/// The controlled vocabularies that tag parameters in the supported formats.
///
/// mzML uses the PSI-MS (`MS`) and unit ontology (`UO`) vocabularies. mzData
/// predates PSI-MS and tags its parameters with the legacy `PSI` prefix, with
/// an accession numbering that does not line up with the modern ontology.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ControlledVocabulary {
    MS,
    UO,
    PSI,
    Unknown,
}

const MS_CV: &str = "MS";
const UO_CV: &str = "UO";
const PSI_CV: &str = "PSI";

impl ControlledVocabulary {
    pub fn prefix(&self) -> Cow<'static, str> {
        match &self {
            Self::MS => Cow::Borrowed(MS_CV),
            Self::UO => Cow::Borrowed(UO_CV),
            Self::PSI => Cow::Borrowed(PSI_CV),
            Self::Unknown => panic!("Cannot encode unknown CV"),
        }
    }

    pub fn as_option(&self) -> Option<Self> {
        match self {
            Self::Unknown => None,
            _ => Some(*self),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ControlledVocabularyResolutionError {}

impl Display for ControlledVocabularyResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(format!("{:?}", self).as_str())
    }
}

impl FromStr for ControlledVocabulary {
    type Err = ControlledVocabularyResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MS" | "PSI-MS" => Ok(Self::MS),
            "UO" => Ok(Self::UO),
            "PSI" | "psi" => Ok(Self::PSI),
            _ => Ok(Self::Unknown),
        }
    }
}

pub type ParamList = Vec<Param>;

pub trait ParamDescribed {
    fn params(&self) -> &ParamList;
    fn params_mut(&mut self) -> &mut ParamList;

    fn add_param(&mut self, param: Param) {
        self.params_mut().push(param);
    }

    fn get_param_by_name(&self, name: &str) -> Option<&Param> {
        self.params().iter().find(|p| p.name == name)
    }

    fn get_param_by_accession(&self, cv: ControlledVocabulary, accession: u32) -> Option<&Param> {
        self.params()
            .iter()
            .find(|p| p.accession == Some(accession) && p.controlled_vocabulary == Some(cv))
    }
}

impl ParamDescribed for ParamList {
    fn params(&self) -> &ParamList {
        self
    }

    fn params_mut(&mut self) -> &mut ParamList {
        self
    }
}

#[macro_export]
macro_rules! impl_param_described {
    ($($t:ty), +) => {$(

        impl $crate::params::ParamDescribed for $t {
            fn params(&self) -> &$crate::params::ParamList {
                return &self.params
            }

            fn params_mut(&mut self) -> &mut $crate::params::ParamList {
                return &mut self.params
            }
        }
    )+};
}

/// Units that a term's value might have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Unit {
    // Mass
    MZ,

    // Time
    Minute,
    Second,
    Millisecond,

    // Intensity
    DetectorCounts,
    CountsPerSecond,

    // Collision Energy
    Electronvolt,
    Volt,

    #[default]
    Unknown,
}

impl Unit {
    pub fn from_name(name: &str) -> Unit {
        match name {
            "millisecond" => Self::Millisecond,
            "second" => Self::Second,
            "minute" => Self::Minute,

            "m/z" => Self::MZ,

            "number of detector counts" => Self::DetectorCounts,
            "counts per second" => Self::CountsPerSecond,

            "electronvolt" => Self::Electronvolt,
            "volt" => Self::Volt,
            _ => Unit::Unknown,
        }
    }

    pub fn from_accession(acc: &str) -> Unit {
        match acc {
            "UO:0000028" => Self::Millisecond,
            "UO:0000010" => Self::Second,
            "UO:0000031" => Self::Minute,

            "MS:1000040" => Self::MZ,

            "MS:1000131" => Self::DetectorCounts,
            "MS:1000814" => Self::CountsPerSecond,

            "UO:0000266" => Self::Electronvolt,
            "UO:0000218" => Self::Volt,
            _ => Unit::Unknown,
        }
    }

    pub fn from_param(param: &Param) -> Unit {
        param.unit
    }
}

/// Convert a time measurement into seconds, the canonical retention time
/// unit of the raw data model. Values with an unrecognized unit are assumed
/// to already be seconds.
pub fn time_to_seconds(value: f64, unit: Unit) -> f64 {
    match unit {
        Unit::Minute => value * 60.0,
        Unit::Millisecond => value / 1000.0,
        _ => value,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_curie_to_num() {
        assert_eq!(
            curie_to_num("MS:1000016"),
            (Some(ControlledVocabulary::MS), Some(1000016))
        );
        assert_eq!(
            curie_to_num("PSI:1000038"),
            (Some(ControlledVocabulary::PSI), Some(1000038))
        );
        assert_eq!(curie_to_num("XX:abc"), (None, None));
    }

    #[test]
    fn test_unit_resolution() {
        assert_eq!(Unit::from_accession("UO:0000031"), Unit::Minute);
        assert_eq!(Unit::from_name("second"), Unit::Second);
        assert_eq!(Unit::from_name("furlong"), Unit::Unknown);
    }

    #[test]
    fn test_time_normalization() {
        assert_eq!(time_to_seconds(0.5, Unit::Minute), 30.0);
        assert_eq!(time_to_seconds(1500.0, Unit::Millisecond), 1.5);
        assert_eq!(time_to_seconds(12.0, Unit::Second), 12.0);
        assert_eq!(time_to_seconds(12.0, Unit::Unknown), 12.0);
    }

    #[test]
    fn test_param_coerce() {
        let p = Param::new_key_value("collision energy".into(), "35.0".into());
        assert_eq!(p.coerce::<f64>().unwrap(), 35.0);
        assert!(p.coerce::<i32>().is_err());
    }
}

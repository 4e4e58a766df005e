use std::fs;
use std::io::{BufReader, Read};
use std::mem;
use std::path::Path;

use chrono::DateTime;
use log::{trace, warn};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Error as XMLError, Reader};
use thiserror::Error;

use crate::io::bindata::{
    ArrayDecodingError, ArrayKind, BinaryCompressionType, BinaryDataArrayType, Bytes, DataArray,
};
use crate::io::record::{ChromatogramRecord, PrecursorRecord, RawRecord, SpectrumRecord};
use crate::io::xml::{attribute_value, CVParamParse};
use crate::params::{time_to_seconds, Param, ParamLike, ParamList, Unit};
use crate::raw::{DataPointList, RunInfo};

const BUFFER_SIZE: usize = 10000;

/**
The different states the [`MzMLReader`] can enter while parsing different
phases of the document. This information is really only needed by the module
consumer to determine where in the document an error occurred.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MzMLParserState {
    Start,
    /// Restarting the event stream mid-document, where closing tags for
    /// elements opened before the previous record boundary may appear.
    Resume,

    Run,

    Spectrum,
    SpectrumDone,

    SpectrumList,
    SpectrumListDone,

    BinaryDataArrayList,
    BinaryDataArray,
    Binary,

    ScanList,
    Scan,
    ScanWindowList,
    ScanWindow,

    PrecursorList,
    Precursor,
    IsolationWindow,
    SelectedIonList,
    SelectedIon,
    Activation,

    ChromatogramList,
    Chromatogram,
    ChromatogramDone,
    ChromatogramListDone,

    EOF,

    ParserError,
}

/**
All the ways that mzML parsing can go wrong
*/
#[derive(Debug, Error)]
pub enum MzMLParserError {
    #[error("An error occurred outside of normal conditions {0:?}")]
    UnknownError(MzMLParserState),
    #[error("An incomplete record was parsed")]
    IncompleteRecord,
    #[error("An incomplete element {0} was encountered in {1:?}")]
    IncompleteElementError(String, MzMLParserState),
    #[error("An XML error {1:?} was encountered in {0:?}")]
    XMLError(MzMLParserState, #[source] XMLError),
    #[error("Failed to decode the {1:?} array of record {2}: {3}")]
    ArrayDecodingError(
        MzMLParserState,
        ArrayKind,
        String,
        #[source] ArrayDecodingError,
    ),
}

pub type ParserResult = Result<MzMLParserState, MzMLParserError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum EntryType {
    #[default]
    Spectrum,
    Chromatogram,
}

/**
An accumulator for the attributes of one spectrum or chromatogram as it is
read from an mzML document. A fresh builder is consumed per record; the
decode scratch buffer it fills belongs to the caller.
*/
#[derive(Debug, Default)]
pub(crate) struct MzMLEntryBuilder {
    entry_type: EntryType,
    native_id: String,
    index: usize,
    declared_points: Option<usize>,
    params: ParamList,
    scan_params: ParamList,
    scan_window: (Option<f64>, Option<f64>),
    precursors: Vec<PrecursorRecord>,

    current_array: DataArray,
    mz_array: Option<DataArray>,
    intensity_array: Option<DataArray>,
    time_array: Option<DataArray>,
}

impl CVParamParse for MzMLEntryBuilder {}

impl MzMLEntryBuilder {
    fn handle_xml_error(&self, error: XMLError, state: MzMLParserState) -> MzMLParserError {
        MzMLParserError::XMLError(state, error)
    }

    fn precursor_mut(&mut self) -> &mut PrecursorRecord {
        if self.precursors.is_empty() {
            self.precursors.push(PrecursorRecord::default());
        }
        self.precursors.last_mut().unwrap()
    }

    fn fill_param_into<P: ParamLike + Into<Param>>(&mut self, param: P, state: MzMLParserState) {
        match state {
            MzMLParserState::Spectrum | MzMLParserState::Chromatogram => {
                self.params.push(param.into());
            }
            MzMLParserState::Scan => {
                self.scan_params.push(param.into());
            }
            MzMLParserState::ScanWindow => match param.accession() {
                // scan window lower limit / upper limit
                Some(1000501) => {
                    self.scan_window.0 = param.coerce().ok();
                }
                Some(1000500) => {
                    self.scan_window.1 = param.coerce().ok();
                }
                _ => {}
            },
            MzMLParserState::IsolationWindow => {
                self.precursor_mut().isolation_params.push(param.into());
            }
            MzMLParserState::SelectedIon | MzMLParserState::SelectedIonList => {
                self.precursor_mut().ion_params.push(param.into());
            }
            MzMLParserState::Activation => {
                self.precursor_mut().activation_params.push(param.into());
            }
            MzMLParserState::BinaryDataArray => {
                self.fill_binary_data_array(param);
            }
            _ => {}
        }
    }

    fn fill_binary_data_array<P: ParamLike + Into<Param>>(&mut self, param: P) {
        let Some(accession) = param.accession() else {
            return;
        };
        if !param.is_ms() {
            return;
        }
        match accession {
            // Compression types
            1000574 => {
                self.current_array.compression = BinaryCompressionType::Zlib;
            }
            1000576 => {
                self.current_array.compression = BinaryCompressionType::NoCompression;
            }
            // Array data types
            1000523 => {
                self.current_array.dtype = BinaryDataArrayType::Float64;
            }
            1000521 => {
                self.current_array.dtype = BinaryDataArrayType::Float32;
            }
            1000522 => {
                self.current_array.dtype = BinaryDataArrayType::Int64;
            }
            1000519 => {
                self.current_array.dtype = BinaryDataArrayType::Int32;
            }
            // Array types
            1000514 => {
                self.current_array.name = ArrayKind::MzArray;
                self.current_array.unit = param.unit();
            }
            1000515 => {
                self.current_array.name = ArrayKind::IntensityArray;
                self.current_array.unit = param.unit();
            }
            1000595 => {
                self.current_array.name = ArrayKind::TimeArray;
                let unit = param.unit();
                match unit {
                    Unit::Minute | Unit::Second | Unit::Millisecond => {
                        self.current_array.unit = unit;
                    }
                    _ => {
                        warn!("Invalid unit {unit:?} found for time array");
                    }
                }
            }
            _ => {}
        }
    }

    pub fn start_element(&mut self, event: &BytesStart, state: MzMLParserState) -> ParserResult {
        let elt_name = event.name();
        match elt_name.as_ref() {
            b"spectrum" => {
                self.entry_type = EntryType::Spectrum;
                self.read_entry_attributes(event, state)?;
                return Ok(MzMLParserState::Spectrum);
            }
            b"spectrumList" => {
                return Ok(MzMLParserState::SpectrumList);
            }
            b"scanList" => {
                return Ok(MzMLParserState::ScanList);
            }
            b"scan" => {
                return Ok(MzMLParserState::Scan);
            }
            b"scanWindowList" => {
                return Ok(MzMLParserState::ScanWindowList);
            }
            b"scanWindow" => {
                return Ok(MzMLParserState::ScanWindow);
            }
            b"precursorList" => {
                return Ok(MzMLParserState::PrecursorList);
            }
            // A chromatogram's product window is accumulated like a
            // precursor so its isolation target can fill the m/z array.
            b"precursor" | b"product" => {
                self.precursors.push(PrecursorRecord::default());
                return Ok(MzMLParserState::Precursor);
            }
            b"isolationWindow" => {
                return Ok(MzMLParserState::IsolationWindow);
            }
            b"selectedIonList" => {
                return Ok(MzMLParserState::SelectedIonList);
            }
            b"selectedIon" => {
                return Ok(MzMLParserState::SelectedIon);
            }
            b"activation" => {
                return Ok(MzMLParserState::Activation);
            }
            b"binaryDataArrayList" => {
                return Ok(MzMLParserState::BinaryDataArrayList);
            }
            b"binaryDataArray" => {
                self.current_array.clear();
                if let Some(v) = attribute_value(event, b"arrayLength")
                    .map_err(|e| self.handle_xml_error(e, state))?
                {
                    self.current_array.declared_length = v.parse().ok();
                }
                return Ok(MzMLParserState::BinaryDataArray);
            }
            b"binary" => {
                return Ok(MzMLParserState::Binary);
            }
            b"chromatogramList" => return Ok(MzMLParserState::ChromatogramList),
            b"chromatogram" => {
                self.entry_type = EntryType::Chromatogram;
                self.read_entry_attributes(event, state)?;
                return Ok(MzMLParserState::Chromatogram);
            }
            _ => {}
        };
        Ok(state)
    }

    fn read_entry_attributes(
        &mut self,
        event: &BytesStart,
        state: MzMLParserState,
    ) -> Result<(), MzMLParserError> {
        for attr_parsed in event.attributes() {
            match attr_parsed {
                Ok(attr) => match attr.key.as_ref() {
                    b"id" => {
                        self.native_id = attr
                            .unescape_value()
                            .map_err(|e| self.handle_xml_error(e, state))?
                            .to_string();
                        trace!("Stored entry id = {}", self.native_id);
                    }
                    b"index" => {
                        self.index = String::from_utf8_lossy(&attr.value)
                            .parse::<usize>()
                            .unwrap_or_default();
                    }
                    b"defaultArrayLength" => {
                        self.declared_points =
                            String::from_utf8_lossy(&attr.value).parse::<usize>().ok();
                    }
                    _ => {}
                },
                Err(msg) => {
                    return Err(self.handle_xml_error(msg.into(), state));
                }
            }
        }
        Ok(())
    }

    pub fn empty_element(&mut self, event: &BytesStart, state: MzMLParserState) -> ParserResult {
        let elt_name = event.name();
        match elt_name.as_ref() {
            b"cvParam" | b"userParam" => match Self::handle_param_borrowed(event) {
                Ok(param) => self.fill_param_into(param, state),
                Err(err) => return Err(self.handle_xml_error(err, state)),
            },
            &_ => {}
        }
        Ok(state)
    }

    pub fn end_element(&mut self, event: &BytesEnd, state: MzMLParserState) -> ParserResult {
        let elt_name = event.name();
        match elt_name.as_ref() {
            b"spectrum" => return Ok(MzMLParserState::SpectrumDone),
            b"chromatogram" => return Ok(MzMLParserState::ChromatogramDone),
            b"scanList" => return Ok(MzMLParserState::Spectrum),
            b"scan" => return Ok(MzMLParserState::ScanList),
            b"scanWindow" => return Ok(MzMLParserState::ScanWindowList),
            b"scanWindowList" => return Ok(MzMLParserState::Scan),
            b"precursorList" => return Ok(MzMLParserState::Spectrum),
            b"precursor" | b"product" => match self.entry_type {
                EntryType::Spectrum => return Ok(MzMLParserState::PrecursorList),
                EntryType::Chromatogram => return Ok(MzMLParserState::Chromatogram),
            },
            b"isolationWindow" => return Ok(MzMLParserState::Precursor),
            b"selectedIonList" => return Ok(MzMLParserState::Precursor),
            b"selectedIon" => return Ok(MzMLParserState::SelectedIonList),
            b"activation" => return Ok(MzMLParserState::Precursor),
            b"binaryDataArrayList" => match self.entry_type {
                EntryType::Spectrum => return Ok(MzMLParserState::Spectrum),
                EntryType::Chromatogram => return Ok(MzMLParserState::Chromatogram),
            },
            b"binaryDataArray" => {
                let array = mem::take(&mut self.current_array);
                match array.name {
                    ArrayKind::MzArray => self.mz_array = Some(array),
                    ArrayKind::IntensityArray => self.intensity_array = Some(array),
                    ArrayKind::TimeArray => self.time_array = Some(array),
                    ArrayKind::Unknown => {
                        trace!("Discarding unrecognized binary array");
                    }
                }
                return Ok(MzMLParserState::BinaryDataArrayList);
            }
            b"binary" => return Ok(MzMLParserState::BinaryDataArray),
            b"spectrumList" => return Ok(MzMLParserState::SpectrumListDone),
            b"chromatogramList" => return Ok(MzMLParserState::ChromatogramListDone),
            _ => {}
        };
        Ok(state)
    }

    pub fn text(&mut self, event: &BytesText, state: MzMLParserState) -> ParserResult {
        if state == MzMLParserState::Binary {
            let bin = event
                .unescape()
                .map_err(|e| MzMLParserError::XMLError(state, e))?;
            self.current_array.data = Bytes::from(bin.trim().as_bytes().to_vec());
        }
        Ok(state)
    }

    /// Decode the accumulated arrays and turn the builder into one finished
    /// record. Spectrum points land in `scratch`, replacing its previous
    /// contents; chromatogram arrays are owned by the record.
    pub fn finish(
        self,
        state: MzMLParserState,
        scratch: &mut DataPointList,
    ) -> Result<RawRecord, MzMLParserError> {
        let native_id = self.native_id;
        let decode_err = |kind: ArrayKind, e: ArrayDecodingError, id: &str| {
            MzMLParserError::ArrayDecodingError(state, kind, id.to_string(), e)
        };

        match self.entry_type {
            EntryType::Spectrum => {
                scratch.clear();
                if let Some(array) = &self.mz_array {
                    array
                        .copy_to_f64(scratch.mzs_mut())
                        .map_err(|e| decode_err(ArrayKind::MzArray, e, &native_id))?;
                }
                if let Some(array) = &self.intensity_array {
                    array
                        .copy_to_f32(scratch.intensities_mut())
                        .map_err(|e| decode_err(ArrayKind::IntensityArray, e, &native_id))?;
                }
                let scan_window = match self.scan_window {
                    (Some(lo), Some(hi)) => Some((lo, hi)),
                    _ => None,
                };
                Ok(RawRecord::Spectrum(SpectrumRecord {
                    native_id,
                    index: self.index,
                    declared_points: self.declared_points,
                    params: self.params,
                    scan_params: self.scan_params,
                    scan_window,
                    precursors: self.precursors,
                }))
            }
            EntryType::Chromatogram => {
                let mut retention_times = Vec::new();
                if let Some(array) = &self.time_array {
                    let mut raw = Vec::new();
                    array
                        .copy_to_f64(&mut raw)
                        .map_err(|e| decode_err(ArrayKind::TimeArray, e, &native_id))?;
                    retention_times.extend(
                        raw.into_iter()
                            .map(|v| time_to_seconds(v, array.unit) as f32),
                    );
                }
                let mut intensities = Vec::new();
                if let Some(array) = &self.intensity_array {
                    array
                        .copy_to_f32(&mut intensities)
                        .map_err(|e| decode_err(ArrayKind::IntensityArray, e, &native_id))?;
                }
                let mut mzs = Vec::new();
                if let Some(array) = &self.mz_array {
                    array
                        .copy_to_f64(&mut mzs)
                        .map_err(|e| decode_err(ArrayKind::MzArray, e, &native_id))?;
                }
                Ok(RawRecord::Chromatogram(ChromatogramRecord {
                    native_id,
                    index: self.index,
                    declared_points: self.declared_points,
                    params: self.params,
                    precursor: self.precursors.into_iter().next_back(),
                    retention_times,
                    mzs,
                    intensities,
                }))
            }
        }
    }
}

/**
A streaming mzML reader that yields one fully assembled record per
[`MzMLReader::read_next_record`] call. The header section before the run's
record lists is parsed once at construction, capturing the declared record
counts and run metadata.
*/
pub struct MzMLReader<R: Read> {
    /// The state the parser was in last.
    pub state: MzMLParserState,
    handle: BufReader<R>,
    /// A place to store the last error the parser encountered
    error: Option<Box<MzMLParserError>>,
    buffer: Bytes,
    run: RunInfo,
    num_spectra: Option<u64>,
    num_chromatograms: Option<u64>,
}

impl MzMLReader<fs::File> {
    pub fn open_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        Ok(Self::new(fs::File::open(path)?))
    }
}

impl<R: Read> MzMLReader<R> {
    /// Create a new [`MzMLReader`] instance, wrapping the [`Read`] handle
    /// provided with a [`BufReader`] and parsing the header section.
    pub fn new(file: R) -> MzMLReader<R> {
        let handle = BufReader::with_capacity(BUFFER_SIZE, file);
        let mut inst = MzMLReader {
            handle,
            state: MzMLParserState::Start,
            error: None,
            buffer: Bytes::new(),
            run: RunInfo::default(),
            num_spectra: None,
            num_chromatograms: None,
        };
        match inst.parse_header() {
            Ok(()) => {}
            Err(err) => {
                inst.error = Some(Box::new(err));
                inst.state = MzMLParserState::ParserError;
            }
        }
        inst
    }

    /// The spectrum count the document declared, if the header has one.
    pub fn num_spectra(&self) -> Option<u64> {
        self.num_spectra
    }

    /// The chromatogram count the document declared. Only known once the
    /// chromatogram list has been reached.
    pub fn num_chromatograms(&self) -> Option<u64> {
        self.num_chromatograms
    }

    pub fn run(&self) -> &RunInfo {
        &self.run
    }

    /// Advance through the header until the first record list opens,
    /// capturing the run description and the declared record counts.
    fn parse_header(&mut self) -> Result<(), MzMLParserError> {
        let mut reader = Reader::from_reader(&mut self.handle);
        reader.trim_text(true);
        loop {
            match reader.read_event_into(&mut self.buffer) {
                Ok(Event::Start(ref e)) => match e.name().as_ref() {
                    b"run" => {
                        self.state = MzMLParserState::Run;
                        self.run.id = attribute_value(e, b"id")
                            .map_err(|err| MzMLParserError::XMLError(self.state, err))?;
                        self.run.start_time = attribute_value(e, b"startTimeStamp")
                            .map_err(|err| MzMLParserError::XMLError(self.state, err))?
                            .and_then(|v| match DateTime::parse_from_rfc3339(&v) {
                                Ok(t) => Some(t),
                                Err(e) => {
                                    warn!("Could not parse run start timestamp {v:?}: {e}");
                                    None
                                }
                            });
                    }
                    b"spectrumList" => {
                        self.num_spectra = attribute_value(e, b"count")
                            .map_err(|err| MzMLParserError::XMLError(self.state, err))?
                            .and_then(|v| v.parse().ok());
                        self.state = MzMLParserState::SpectrumList;
                        break;
                    }
                    b"chromatogramList" => {
                        // A document with no spectrum list at all.
                        self.num_chromatograms = attribute_value(e, b"count")
                            .map_err(|err| MzMLParserError::XMLError(self.state, err))?
                            .and_then(|v| v.parse().ok());
                        self.state = MzMLParserState::ChromatogramList;
                        break;
                    }
                    _ => {}
                },
                Ok(Event::Eof) => {
                    self.state = MzMLParserState::EOF;
                    break;
                }
                Err(err) => {
                    let message =
                        MzMLParserError::IncompleteElementError(err.to_string(), self.state);
                    self.state = MzMLParserState::ParserError;
                    self.buffer.clear();
                    return Err(message);
                }
                _ => {}
            }
            self.buffer.clear();
        }
        self.buffer.clear();
        Ok(())
    }

    /// Read events until one whole record has been accumulated, or the
    /// record lists are exhausted.
    pub fn read_next_record(
        &mut self,
        scratch: &mut DataPointList,
    ) -> Result<Option<RawRecord>, MzMLParserError> {
        match self.state {
            MzMLParserState::EOF => return Ok(None),
            MzMLParserState::ParserError => {
                return Err(self
                    .error
                    .take()
                    .map(|e| *e)
                    .unwrap_or(MzMLParserError::UnknownError(MzMLParserState::ParserError)));
            }
            MzMLParserState::SpectrumDone | MzMLParserState::ChromatogramDone => {
                self.state = MzMLParserState::Resume;
            }
            _ => {}
        }

        let mut accumulator = MzMLEntryBuilder::default();
        let mut reader = Reader::from_reader(&mut self.handle);
        reader.trim_text(true);

        macro_rules! err_state {
            ($message:ident) => {{
                self.state = MzMLParserState::ParserError;
                self.error = Some(Box::new($message));
            }};
        }

        loop {
            match reader.read_event_into(&mut self.buffer) {
                Ok(Event::Start(ref e)) => {
                    match accumulator.start_element(e, self.state) {
                        Ok(state) => {
                            // The chromatogram list's declared count appears
                            // mid-stream, on the list element itself.
                            if state == MzMLParserState::ChromatogramList
                                && self.num_chromatograms.is_none()
                            {
                                self.num_chromatograms = attribute_value(e, b"count")
                                    .ok()
                                    .flatten()
                                    .and_then(|v| v.parse().ok());
                            }
                            self.state = state;
                        }
                        Err(message) => err_state!(message),
                    };
                }
                Ok(Event::End(ref e)) => {
                    match accumulator.end_element(e, self.state) {
                        Ok(state) => {
                            self.state = state;
                        }
                        Err(message) => err_state!(message),
                    };
                }
                Ok(Event::Text(ref e)) => {
                    match accumulator.text(e, self.state) {
                        Ok(state) => {
                            self.state = state;
                        }
                        Err(message) => err_state!(message),
                    };
                }
                Ok(Event::Empty(ref e)) => {
                    match accumulator.empty_element(e, self.state) {
                        Ok(state) => {
                            self.state = state;
                        }
                        Err(message) => err_state!(message),
                    }
                }
                Ok(Event::Eof) => {
                    trace!("Reached EOF");
                    // Running dry between records is the normal end of the
                    // document; running dry inside one means it was cut off.
                    if outside_record(self.state) || self.state == MzMLParserState::Start {
                        self.state = MzMLParserState::EOF;
                    } else {
                        let message = MzMLParserError::IncompleteRecord;
                        err_state!(message);
                    }
                    break;
                }
                Err(err) => match &err {
                    XMLError::EndEventMismatch {
                        expected,
                        found: _found,
                    } => {
                        // Restarting the event stream mid-document orphans
                        // the closing tags of elements opened before the
                        // previous record boundary. Outside a record they
                        // are expected; inside one they are a real error.
                        if expected.is_empty() && outside_record(self.state) {
                            self.buffer.clear();
                            continue;
                        } else {
                            let message = MzMLParserError::IncompleteElementError(
                                String::from_utf8_lossy(&self.buffer).to_string(),
                                self.state,
                            );
                            err_state!(message);
                        }
                    }
                    e => {
                        let message =
                            MzMLParserError::IncompleteElementError(e.to_string(), self.state);
                        err_state!(message);
                    }
                },
                _ => {}
            };
            self.buffer.clear();
            match self.state {
                MzMLParserState::SpectrumDone
                | MzMLParserState::ChromatogramDone
                | MzMLParserState::ParserError => {
                    break;
                }
                _ => {}
            };
        }

        match self.state {
            MzMLParserState::SpectrumDone | MzMLParserState::ChromatogramDone => {
                accumulator.finish(self.state, scratch).map(Some)
            }
            MzMLParserState::EOF => Ok(None),
            MzMLParserState::ParserError => Err(self
                .error
                .take()
                .map(|e| *e)
                .unwrap_or(MzMLParserError::UnknownError(MzMLParserState::ParserError))),
            _ => Err(MzMLParserError::IncompleteRecord),
        }
    }
}

/// Is this a state between records, where orphaned closing tags and the end
/// of input are expected rather than structural damage?
fn outside_record(state: MzMLParserState) -> bool {
    matches!(
        state,
        MzMLParserState::Resume
            | MzMLParserState::SpectrumList
            | MzMLParserState::SpectrumListDone
            | MzMLParserState::ChromatogramList
            | MzMLParserState::ChromatogramListDone
    )
}

use std::fs;
use std::io::{BufReader, Read};
use std::mem;
use std::path::Path;

use log::trace;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Error as XMLError, Reader};
use thiserror::Error;

use crate::io::bindata::{
    ArrayDecodingError, ArrayKind, BinaryDataArrayType, ByteOrder, Bytes, DataArray,
};
use crate::io::record::{PrecursorRecord, RawRecord, SpectrumRecord};
use crate::io::xml::{attribute_value, CVParamParse};
use crate::params::Param;
use crate::raw::DataPointList;

const BUFFER_SIZE: usize = 10000;

/**
The different states the [`MzDataReader`] can enter while parsing different
phases of the document.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MzDataParserState {
    Start,
    /// Restarting the event stream mid-document, where closing tags for
    /// elements opened before the previous record boundary may appear.
    Resume,

    SpectrumList,
    Spectrum,
    SpectrumInstrument,

    PrecursorList,
    Precursor,
    IonSelection,
    Activation,

    MzArrayBinary,
    MzArrayData,
    IntenArrayBinary,
    IntenArrayData,

    SpectrumDone,
    SpectrumListDone,

    EOF,

    ParserError,
}

/**
All the ways that mzData parsing can go wrong
*/
#[derive(Debug, Error)]
pub enum MzDataParserError {
    #[error("An error occurred outside of normal conditions {0:?}")]
    UnknownError(MzDataParserState),
    #[error("An incomplete record was parsed")]
    IncompleteRecord,
    #[error("An incomplete element {0} was encountered in {1:?}")]
    IncompleteElementError(String, MzDataParserState),
    #[error("An XML error {1:?} was encountered in {0:?}")]
    XMLError(MzDataParserState, #[source] XMLError),
    #[error("Failed to decode the {1:?} array of record {2}: {3}")]
    ArrayDecodingError(
        MzDataParserState,
        ArrayKind,
        String,
        #[source] ArrayDecodingError,
    ),
}

pub type ParserResult = Result<MzDataParserState, MzDataParserError>;

/// One spectrum fully accumulated by the handler, with its binary arrays
/// still encoded.
#[derive(Debug, Default)]
struct PendingSpectrum {
    record: SpectrumRecord,
    mz_array: DataArray,
    intensity_array: DataArray,
}

/**
A push-style handler receiving the event stream of an mzData document. One
handler instance survives the whole run, accumulating the current spectrum
and parking it when its closing tag arrives; the pump then collects it via
[`MzDataHandler::take_finished`].
*/
#[derive(Debug, Default)]
pub(crate) struct MzDataHandler {
    native_id: String,
    instrument_params: crate::params::ParamList,
    scan_window: (Option<f64>, Option<f64>),
    precursors: Vec<PrecursorRecord>,
    mz_array: DataArray,
    intensity_array: DataArray,

    finished: Option<PendingSpectrum>,
}

impl CVParamParse for MzDataHandler {}

impl MzDataHandler {
    fn handle_xml_error(&self, error: XMLError, state: MzDataParserState) -> MzDataParserError {
        MzDataParserError::XMLError(state, error)
    }

    fn precursor_mut(&mut self) -> &mut PrecursorRecord {
        if self.precursors.is_empty() {
            self.precursors.push(PrecursorRecord::default());
        }
        self.precursors.last_mut().unwrap()
    }

    fn current_array_mut(&mut self, state: MzDataParserState) -> Option<&mut DataArray> {
        match state {
            MzDataParserState::MzArrayBinary | MzDataParserState::MzArrayData => {
                Some(&mut self.mz_array)
            }
            MzDataParserState::IntenArrayBinary | MzDataParserState::IntenArrayData => {
                Some(&mut self.intensity_array)
            }
            _ => None,
        }
    }

    pub fn start_element(&mut self, event: &BytesStart, state: MzDataParserState) -> ParserResult {
        let elt_name = event.name();
        match elt_name.as_ref() {
            b"spectrumList" => {
                return Ok(MzDataParserState::SpectrumList);
            }
            b"spectrum" => {
                self.native_id = attribute_value(event, b"id")
                    .map_err(|e| self.handle_xml_error(e, state))?
                    .unwrap_or_default();
                trace!("Stored spectrum id = {}", self.native_id);
                return Ok(MzDataParserState::Spectrum);
            }
            b"spectrumInstrument" => {
                // The MS level is an attribute here, not a vocabulary term.
                // Re-expressed as a parameter so the extractor sees one
                // shape for both formats.
                if let Some(level) = attribute_value(event, b"msLevel")
                    .map_err(|e| self.handle_xml_error(e, state))?
                {
                    self.instrument_params
                        .push(Param::new_key_value("ms level".into(), level));
                }
                self.scan_window.0 = attribute_value(event, b"mzRangeStart")
                    .map_err(|e| self.handle_xml_error(e, state))?
                    .and_then(|v| v.parse().ok());
                self.scan_window.1 = attribute_value(event, b"mzRangeStop")
                    .map_err(|e| self.handle_xml_error(e, state))?
                    .and_then(|v| v.parse().ok());
                return Ok(MzDataParserState::SpectrumInstrument);
            }
            b"precursorList" => {
                return Ok(MzDataParserState::PrecursorList);
            }
            b"precursor" => {
                self.precursors.push(PrecursorRecord::default());
                return Ok(MzDataParserState::Precursor);
            }
            b"ionSelection" => {
                return Ok(MzDataParserState::IonSelection);
            }
            b"activation" => {
                return Ok(MzDataParserState::Activation);
            }
            b"mzArrayBinary" => {
                self.mz_array.clear();
                self.mz_array.name = ArrayKind::MzArray;
                return Ok(MzDataParserState::MzArrayBinary);
            }
            b"intenArrayBinary" => {
                self.intensity_array.clear();
                self.intensity_array.name = ArrayKind::IntensityArray;
                return Ok(MzDataParserState::IntenArrayBinary);
            }
            b"data" => {
                let precision = attribute_value(event, b"precision")
                    .map_err(|e| self.handle_xml_error(e, state))?;
                let endian = attribute_value(event, b"endian")
                    .map_err(|e| self.handle_xml_error(e, state))?;
                let length = attribute_value(event, b"length")
                    .map_err(|e| self.handle_xml_error(e, state))?;
                if let Some(array) = self.current_array_mut(state) {
                    array.dtype = match precision.as_deref() {
                        Some("32") => BinaryDataArrayType::Float32,
                        Some("64") => BinaryDataArrayType::Float64,
                        _ => BinaryDataArrayType::Unknown,
                    };
                    array.byte_order = match endian.as_deref() {
                        Some("big") => ByteOrder::BigEndian,
                        _ => ByteOrder::LittleEndian,
                    };
                    array.declared_length = length.and_then(|v| v.parse().ok());
                }
                return Ok(match state {
                    MzDataParserState::MzArrayBinary => MzDataParserState::MzArrayData,
                    MzDataParserState::IntenArrayBinary => MzDataParserState::IntenArrayData,
                    other => other,
                });
            }
            _ => {}
        };
        Ok(state)
    }

    pub fn empty_element(&mut self, event: &BytesStart, state: MzDataParserState) -> ParserResult {
        let elt_name = event.name();
        match elt_name.as_ref() {
            b"cvParam" | b"userParam" => match Self::handle_param_borrowed(event) {
                Ok(param) => {
                    let param: Param = param.into();
                    match state {
                        MzDataParserState::SpectrumInstrument => {
                            self.instrument_params.push(param);
                        }
                        MzDataParserState::IonSelection => {
                            self.precursor_mut().ion_params.push(param);
                        }
                        MzDataParserState::Activation => {
                            self.precursor_mut().activation_params.push(param);
                        }
                        _ => {}
                    }
                }
                Err(err) => return Err(self.handle_xml_error(err, state)),
            },
            &_ => {}
        }
        Ok(state)
    }

    pub fn end_element(&mut self, event: &BytesEnd, state: MzDataParserState) -> ParserResult {
        let elt_name = event.name();
        match elt_name.as_ref() {
            b"spectrum" => {
                self.park_finished();
                return Ok(MzDataParserState::SpectrumDone);
            }
            b"spectrumInstrument" => return Ok(MzDataParserState::Spectrum),
            b"precursorList" => return Ok(MzDataParserState::Spectrum),
            b"precursor" => return Ok(MzDataParserState::PrecursorList),
            b"ionSelection" => return Ok(MzDataParserState::Precursor),
            b"activation" => return Ok(MzDataParserState::Precursor),
            b"mzArrayBinary" => return Ok(MzDataParserState::Spectrum),
            b"intenArrayBinary" => return Ok(MzDataParserState::Spectrum),
            b"data" => {
                return Ok(match state {
                    MzDataParserState::MzArrayData => MzDataParserState::MzArrayBinary,
                    MzDataParserState::IntenArrayData => MzDataParserState::IntenArrayBinary,
                    other => other,
                });
            }
            b"spectrumList" => return Ok(MzDataParserState::SpectrumListDone),
            _ => {}
        };
        Ok(state)
    }

    pub fn text(&mut self, event: &BytesText, state: MzDataParserState) -> ParserResult {
        if matches!(
            state,
            MzDataParserState::MzArrayData | MzDataParserState::IntenArrayData
        ) {
            let bin = event
                .unescape()
                .map_err(|e| MzDataParserError::XMLError(state, e))?;
            let trimmed = bin.trim().as_bytes().to_vec();
            if let Some(array) = self.current_array_mut(state) {
                // Character data may arrive in more than one chunk.
                array.data.extend_from_slice(&trimmed);
            }
        }
        Ok(state)
    }

    /// Move the accumulated spectrum into the finished slot and reset the
    /// accumulation state for the next record.
    fn park_finished(&mut self) {
        let instrument_params = mem::take(&mut self.instrument_params);
        let scan_window = match self.scan_window {
            (Some(lo), Some(hi)) => Some((lo, hi)),
            _ => None,
        };
        let record = SpectrumRecord {
            native_id: mem::take(&mut self.native_id),
            index: 0,
            declared_points: self.mz_array.declared_length,
            // The instrument block carries both the spectrum-level terms
            // (polarity, scan mode, MS level) and the scan-level time
            // terms, so it feeds both views.
            params: instrument_params.clone(),
            scan_params: instrument_params,
            scan_window,
            precursors: mem::take(&mut self.precursors),
        };
        self.scan_window = (None, None);
        self.finished = Some(PendingSpectrum {
            record,
            mz_array: mem::take(&mut self.mz_array),
            intensity_array: mem::take(&mut self.intensity_array),
        });
    }

    fn take_finished(&mut self) -> Option<PendingSpectrum> {
        self.finished.take()
    }
}

/**
A streaming mzData reader: an event pump that pushes the document's XML
events through the persistent [`MzDataHandler`] until it parks one finished
spectrum, then hands that spectrum out.
*/
pub struct MzDataReader<R: Read> {
    /// The state the parser was in last.
    pub state: MzDataParserState,
    handle: BufReader<R>,
    error: Option<Box<MzDataParserError>>,
    buffer: Bytes,
    handler: MzDataHandler,
    num_spectra: Option<u64>,
}

impl MzDataReader<fs::File> {
    pub fn open_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        Ok(Self::new(fs::File::open(path)?))
    }
}

impl<R: Read> MzDataReader<R> {
    /// Create a new [`MzDataReader`], wrapping the [`Read`] handle provided
    /// with a [`BufReader`] and parsing up to the spectrum list to capture
    /// the declared record count.
    pub fn new(file: R) -> MzDataReader<R> {
        let handle = BufReader::with_capacity(BUFFER_SIZE, file);
        let mut inst = MzDataReader {
            handle,
            state: MzDataParserState::Start,
            error: None,
            buffer: Bytes::new(),
            handler: MzDataHandler::default(),
            num_spectra: None,
        };
        match inst.parse_header() {
            Ok(()) => {}
            Err(err) => {
                inst.error = Some(Box::new(err));
                inst.state = MzDataParserState::ParserError;
            }
        }
        inst
    }

    /// The spectrum count the document declared, if the header has one.
    pub fn num_spectra(&self) -> Option<u64> {
        self.num_spectra
    }

    fn parse_header(&mut self) -> Result<(), MzDataParserError> {
        let mut reader = Reader::from_reader(&mut self.handle);
        reader.trim_text(true);
        loop {
            match reader.read_event_into(&mut self.buffer) {
                Ok(Event::Start(ref e)) => {
                    if e.name().as_ref() == b"spectrumList" {
                        self.num_spectra = attribute_value(e, b"count")
                            .map_err(|err| MzDataParserError::XMLError(self.state, err))?
                            .and_then(|v| v.parse().ok());
                        self.state = MzDataParserState::SpectrumList;
                        break;
                    }
                }
                Ok(Event::Eof) => {
                    self.state = MzDataParserState::EOF;
                    break;
                }
                Err(err) => {
                    let message =
                        MzDataParserError::IncompleteElementError(err.to_string(), self.state);
                    self.state = MzDataParserState::ParserError;
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

    /// Pump events into the handler until it parks one finished spectrum,
    /// then decode that spectrum's arrays into `scratch` and return it.
    pub fn read_next_record(
        &mut self,
        scratch: &mut DataPointList,
    ) -> Result<Option<RawRecord>, MzDataParserError> {
        match self.state {
            MzDataParserState::EOF => return Ok(None),
            MzDataParserState::ParserError => {
                return Err(self.error.take().map(|e| *e).unwrap_or(
                    MzDataParserError::UnknownError(MzDataParserState::ParserError),
                ));
            }
            MzDataParserState::SpectrumDone => {
                self.state = MzDataParserState::Resume;
            }
            _ => {}
        }

        let mut reader = Reader::from_reader(&mut self.handle);
        reader.trim_text(true);

        macro_rules! err_state {
            ($message:ident) => {{
                self.state = MzDataParserState::ParserError;
                self.error = Some(Box::new($message));
            }};
        }

        loop {
            match reader.read_event_into(&mut self.buffer) {
                Ok(Event::Start(ref e)) => {
                    match self.handler.start_element(e, self.state) {
                        Ok(state) => {
                            self.state = state;
                        }
                        Err(message) => err_state!(message),
                    };
                }
                Ok(Event::End(ref e)) => {
                    match self.handler.end_element(e, self.state) {
                        Ok(state) => {
                            self.state = state;
                        }
                        Err(message) => err_state!(message),
                    };
                }
                Ok(Event::Text(ref e)) => {
                    match self.handler.text(e, self.state) {
                        Ok(state) => {
                            self.state = state;
                        }
                        Err(message) => err_state!(message),
                    };
                }
                Ok(Event::Empty(ref e)) => {
                    match self.handler.empty_element(e, self.state) {
                        Ok(state) => {
                            self.state = state;
                        }
                        Err(message) => err_state!(message),
                    }
                }
                Ok(Event::Eof) => {
                    trace!("Reached EOF");
                    if outside_record(self.state) || self.state == MzDataParserState::Start {
                        self.state = MzDataParserState::EOF;
                    } else {
                        let message = MzDataParserError::IncompleteRecord;
                        err_state!(message);
                    }
                    break;
                }
                Err(err) => match &err {
                    XMLError::EndEventMismatch {
                        expected,
                        found: _found,
                    } => {
                        if expected.is_empty() && outside_record(self.state) {
                            self.buffer.clear();
                            continue;
                        } else {
                            let message = MzDataParserError::IncompleteElementError(
                                String::from_utf8_lossy(&self.buffer).to_string(),
                                self.state,
                            );
                            err_state!(message);
                        }
                    }
                    e => {
                        let message =
                            MzDataParserError::IncompleteElementError(e.to_string(), self.state);
                        err_state!(message);
                    }
                },
                _ => {}
            };
            self.buffer.clear();
            match self.state {
                MzDataParserState::SpectrumDone | MzDataParserState::ParserError => {
                    break;
                }
                _ => {}
            };
        }

        match self.state {
            MzDataParserState::SpectrumDone => {
                let pending = self
                    .handler
                    .take_finished()
                    .ok_or(MzDataParserError::IncompleteRecord)?;
                self.decode_pending(pending, scratch).map(Some)
            }
            MzDataParserState::EOF => Ok(None),
            MzDataParserState::ParserError => Err(self.error.take().map(|e| *e).unwrap_or(
                MzDataParserError::UnknownError(MzDataParserState::ParserError),
            )),
            _ => Err(MzDataParserError::IncompleteRecord),
        }
    }

    fn decode_pending(
        &self,
        pending: PendingSpectrum,
        scratch: &mut DataPointList,
    ) -> Result<RawRecord, MzDataParserError> {
        scratch.clear();
        pending
            .mz_array
            .copy_to_f64(scratch.mzs_mut())
            .map_err(|e| {
                MzDataParserError::ArrayDecodingError(
                    self.state,
                    ArrayKind::MzArray,
                    pending.record.native_id.clone(),
                    e,
                )
            })?;
        pending
            .intensity_array
            .copy_to_f32(scratch.intensities_mut())
            .map_err(|e| {
                MzDataParserError::ArrayDecodingError(
                    self.state,
                    ArrayKind::IntensityArray,
                    pending.record.native_id.clone(),
                    e,
                )
            })?;
        Ok(RawRecord::Spectrum(pending.record))
    }
}

/// Is this a state between records, where orphaned closing tags and the end
/// of input are expected rather than structural damage?
fn outside_record(state: MzDataParserState) -> bool {
    matches!(
        state,
        MzDataParserState::Resume
            | MzDataParserState::SpectrumList
            | MzDataParserState::SpectrumListDone
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn b64(bytes: &[u8]) -> String {
        String::from_utf8(base64_simd::STANDARD.encode_type::<Vec<u8>>(bytes)).unwrap()
    }

    fn small_doc() -> String {
        let mzs: Vec<u8> = [150.0f64, 250.0, 350.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let ints: Vec<u8> = [5.0f32, 15.0, 25.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<mzData version="1.05">
  <description>
    <admin><sampleName>test</sampleName></admin>
  </description>
  <spectrumList count="1">
    <spectrum id="2">
      <spectrumDesc>
        <spectrumSettings>
          <spectrumInstrument msLevel="2" mzRangeStart="100.0" mzRangeStop="1000.0">
            <cvParam cvLabel="psi" accession="PSI:1000037" name="Polarity" value="Negative"/>
            <cvParam cvLabel="psi" accession="PSI:1000038" name="TimeInMinutes" value="1.5"/>
          </spectrumInstrument>
        </spectrumSettings>
        <precursorList count="1">
          <precursor msLevel="1" spectrumRef="1">
            <ionSelection>
              <cvParam cvLabel="psi" accession="PSI:1000040" name="MassToChargeRatio" value="721.4"/>
              <cvParam cvLabel="psi" accession="PSI:1000041" name="ChargeState" value="3"/>
            </ionSelection>
            <activation>
              <cvParam cvLabel="psi" accession="PSI:1000044" name="Method" value="CID"/>
              <cvParam cvLabel="psi" accession="PSI:1000045" name="CollisionEnergy" value="35"/>
            </activation>
          </precursor>
        </precursorList>
      </spectrumDesc>
      <mzArrayBinary>
        <data precision="64" endian="little" length="3">{mz}</data>
      </mzArrayBinary>
      <intenArrayBinary>
        <data precision="32" endian="little" length="3">{inten}</data>
      </intenArrayBinary>
    </spectrum>
  </spectrumList>
</mzData>"#,
            mz = b64(&mzs),
            inten = b64(&ints),
        )
    }

    #[test_log::test]
    fn test_header_count() {
        let reader = MzDataReader::new(Cursor::new(small_doc()));
        assert_eq!(reader.num_spectra(), Some(1));
        assert_eq!(reader.state, MzDataParserState::SpectrumList);
    }

    #[test_log::test]
    fn test_read_one_spectrum() {
        let mut reader = MzDataReader::new(Cursor::new(small_doc()));
        let mut scratch = DataPointList::new();
        let record = reader.read_next_record(&mut scratch).unwrap().unwrap();
        let RawRecord::Spectrum(spectrum) = record else {
            panic!("Expected a spectrum record");
        };
        assert_eq!(spectrum.native_id, "2");
        assert_eq!(spectrum.declared_points, Some(3));
        assert_eq!(spectrum.scan_window, Some((100.0, 1000.0)));
        assert_eq!(spectrum.precursors.len(), 1);
        assert_eq!(scratch.mzs(), &[150.0, 250.0, 350.0]);
        assert_eq!(scratch.intensities(), &[5.0, 15.0, 25.0]);

        // Metadata round-trips through the shared extractor.
        use crate::io::record;
        assert_eq!(
            record::polarity(&spectrum),
            crate::raw::PolarityType::Negative
        );
        assert_eq!(record::ms_function(&spectrum).ms_level(), Some(2));
        let rt = record::chromatography_info(&spectrum).unwrap();
        assert_eq!(rt.retention_time, 90.0);
        let isolations = record::isolations(&spectrum);
        assert_eq!(isolations.len(), 1);
        assert_eq!(isolations[0].precursor_mz, Some(721.4));
        assert_eq!(isolations[0].precursor_charge, Some(3));

        assert!(reader.read_next_record(&mut scratch).unwrap().is_none());
        assert_eq!(reader.state, MzDataParserState::EOF);
    }

    #[test_log::test]
    fn test_big_endian_arrays() {
        let mzs: Vec<u8> = [500.0f64, 600.0]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        let doc = format!(
            r#"<?xml version="1.0"?>
<mzData version="1.05">
  <spectrumList count="1">
    <spectrum id="1">
      <mzArrayBinary>
        <data precision="64" endian="big" length="2">{mz}</data>
      </mzArrayBinary>
      <intenArrayBinary>
        <data precision="32" endian="little" length="0"></data>
      </intenArrayBinary>
    </spectrum>
  </spectrumList>
</mzData>"#,
            mz = b64(&mzs),
        );
        let mut reader = MzDataReader::new(Cursor::new(doc));
        let mut scratch = DataPointList::new();
        reader.read_next_record(&mut scratch).unwrap().unwrap();
        assert_eq!(scratch.mzs(), &[500.0, 600.0]);
    }

    #[test_log::test]
    fn test_truncated_document_errors() {
        let doc = r#"<?xml version="1.0"?>
<mzData version="1.05">
  <spectrumList count="2">
    <spectrum id="1">
      <mzArrayBinary>"#;
        let mut reader = MzDataReader::new(Cursor::new(doc.to_string()));
        let mut scratch = DataPointList::new();
        assert!(reader.read_next_record(&mut scratch).is_err());
    }
}

use quick_xml::events::BytesStart;
use quick_xml::Error as XMLError;

use crate::params::{curie_to_num, ControlledVocabulary, Param, ParamCow, Unit};

/// Read one named attribute off an element, unescaped, if present.
pub(crate) fn attribute_value(
    event: &BytesStart<'_>,
    name: &[u8],
) -> Result<Option<String>, XMLError> {
    for attr_parsed in event.attributes() {
        let attr = attr_parsed.map_err(XMLError::from)?;
        if attr.key.as_ref() == name {
            return Ok(Some(attr.unescape_value()?.to_string()));
        }
    }
    Ok(None)
}

/**
Common `cvParam`/`userParam` parsing behavior shared by every driver.

Both supported formats spell their vocabulary parameters the same way at the
XML level, differing only in which reference attribute names the vocabulary
(`cvRef` in mzML, `cvLabel` in mzData) and in which accession space the terms
come from.
*/
pub(crate) trait CVParamParse {
    fn handle_param_borrowed<'inner, 'event: 'inner>(
        event: &'event BytesStart<'event>,
    ) -> Result<ParamCow<'inner>, XMLError> {
        let mut name = None;
        let mut value = None;
        let mut accession = None;
        let mut controlled_vocabulary = None;
        let mut unit = Unit::Unknown;

        for attr_parsed in event.attributes() {
            let attr = attr_parsed.map_err(XMLError::from)?;
            match attr.key.as_ref() {
                b"name" => {
                    name = Some(attr.unescape_value()?);
                }
                b"value" => {
                    value = Some(attr.unescape_value()?);
                }
                b"cvRef" | b"cvLabel" => {
                    let cv_id = attr.unescape_value()?;
                    controlled_vocabulary = cv_id
                        .parse::<ControlledVocabulary>()
                        .unwrap_or(ControlledVocabulary::Unknown)
                        .as_option();
                }
                b"accession" => {
                    let v = attr.unescape_value()?;
                    let (cv, acc) = curie_to_num(&v);
                    accession = acc;
                    if controlled_vocabulary.is_none() {
                        controlled_vocabulary = cv;
                    }
                }
                b"unitName" => {
                    let v = attr.unescape_value()?;
                    if matches!(unit, Unit::Unknown) {
                        unit = Unit::from_name(&v);
                    }
                }
                b"unitAccession" => {
                    let v = attr.unescape_value()?;
                    unit = Unit::from_accession(&v);
                }
                _ => {}
            }
        }
        let param = ParamCow::new(
            name.unwrap_or_default(),
            value.unwrap_or_default(),
            accession,
            controlled_vocabulary,
            unit,
        );
        Ok(param)
    }

    fn handle_param(event: &BytesStart<'_>) -> Result<Param, XMLError> {
        Self::handle_param_borrowed(event).map(Param::from)
    }
}

//! Request document parsing.
//!
//! Only two request bodies carry XML: the part list of a multipart
//! completion and the key list of a bulk delete.

use quick_xml::Reader;
use quick_xml::events::Event;
use shoebox_model::types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier};

use crate::error::XmlError;

/// Parses a value from the children of the current element.
pub trait S3Deserialize: Sized {
    /// Read child content up to and including the matching end tag.
    ///
    /// The reader is positioned just after the element's start tag.
    ///
    /// # Errors
    ///
    /// Returns `XmlError` if the XML is malformed or required fields are missing.
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError>;
}

/// Parse a complete document, delegating the root element to `T`.
///
/// # Errors
///
/// Returns `XmlError` if the document is empty or malformed.
pub fn from_xml<T: S3Deserialize>(xml: &[u8]) -> Result<T, XmlError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Start(_) => return T::deserialize_xml(&mut reader),
            Event::Eof => return Err(XmlError::MissingElement("root element".to_owned())),
            _ => {}
        }
    }
}

/// Read the text of the current element and consume its end tag.
fn read_text_content(reader: &mut Reader<&[u8]>) -> Result<String, XmlError> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                let decoded = e
                    .decode()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                let unescaped = quick_xml::escape::unescape(&decoded)
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                text.push_str(&unescaped);
            }
            Event::CData(e) => {
                let decoded = e
                    .decode()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                text.push_str(&decoded);
            }
            Event::GeneralRef(e) => {
                if let Some(ch) = e
                    .resolve_char_ref()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?
                {
                    text.push(ch);
                } else {
                    let name = e
                        .decode()
                        .map_err(|err| XmlError::ParseError(err.to_string()))?;
                    let resolved = quick_xml::escape::resolve_xml_entity(&name)
                        .ok_or_else(|| XmlError::ParseError(format!("unknown entity: {name}")))?;
                    text.push_str(resolved);
                }
            }
            Event::End(_) => return Ok(text),
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while reading text content".to_owned(),
                ));
            }
            _ => {}
        }
    }
}

/// Skip an element and everything nested inside it.
fn skip_element(reader: &mut Reader<&[u8]>) -> Result<(), XmlError> {
    let mut depth: u32 = 1;
    loop {
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while skipping element".to_owned(),
                ));
            }
            _ => {}
        }
    }
}

fn parse_bool(s: &str) -> Result<bool, XmlError> {
    match s.trim() {
        "true" | "True" | "TRUE" => Ok(true),
        "false" | "False" | "FALSE" => Ok(false),
        other => Err(XmlError::ParseError(format!("invalid boolean: {other}"))),
    }
}

fn parse_u32(s: &str) -> Result<u32, XmlError> {
    s.trim()
        .parse::<u32>()
        .map_err(|e| XmlError::ParseError(format!("invalid integer '{s}': {e}")))
}

fn tag_name(name: &quick_xml::name::QName<'_>) -> Result<String, XmlError> {
    std::str::from_utf8(name.local_name().as_ref())
        .map(str::to_owned)
        .map_err(|e| XmlError::ParseError(e.to_string()))
}

impl S3Deserialize for CompletedPart {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut part_number = None;
        let mut e_tag = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => match tag_name(&e.name())?.as_str() {
                    "PartNumber" => part_number = Some(parse_u32(&read_text_content(reader)?)?),
                    "ETag" => e_tag = Some(read_text_content(reader)?),
                    _ => skip_element(reader)?,
                },
                Event::End(_) => break,
                Event::Eof => {
                    return Err(XmlError::UnexpectedElement(
                        "unexpected EOF in Part".to_owned(),
                    ));
                }
                _ => {}
            }
        }

        Ok(CompletedPart {
            part_number: part_number
                .ok_or_else(|| XmlError::MissingElement("PartNumber".to_owned()))?,
            e_tag,
        })
    }
}

impl S3Deserialize for CompletedMultipartUpload {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut parts = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    if tag_name(&e.name())? == "Part" {
                        parts.push(CompletedPart::deserialize_xml(reader)?);
                    } else {
                        skip_element(reader)?;
                    }
                }
                Event::End(_) => break,
                Event::Eof => {
                    return Err(XmlError::UnexpectedElement(
                        "unexpected EOF in CompleteMultipartUpload".to_owned(),
                    ));
                }
                _ => {}
            }
        }

        Ok(CompletedMultipartUpload { parts })
    }
}

impl S3Deserialize for ObjectIdentifier {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut key = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    if tag_name(&e.name())? == "Key" {
                        key = Some(read_text_content(reader)?);
                    } else {
                        skip_element(reader)?;
                    }
                }
                Event::End(_) => break,
                Event::Eof => {
                    return Err(XmlError::UnexpectedElement(
                        "unexpected EOF in Object".to_owned(),
                    ));
                }
                _ => {}
            }
        }

        Ok(ObjectIdentifier {
            key: key.ok_or_else(|| XmlError::MissingElement("Key".to_owned()))?,
        })
    }
}

impl S3Deserialize for Delete {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut objects = Vec::new();
        let mut quiet = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => match tag_name(&e.name())?.as_str() {
                    "Object" => objects.push(ObjectIdentifier::deserialize_xml(reader)?),
                    "Quiet" => quiet = parse_bool(&read_text_content(reader)?)?,
                    _ => skip_element(reader)?,
                },
                Event::End(_) => break,
                Event::Eof => {
                    return Err(XmlError::UnexpectedElement(
                        "unexpected EOF in Delete".to_owned(),
                    ));
                }
                _ => {}
            }
        }

        Ok(Delete { objects, quiet })
    }
}

//! XML error type and the `<Error>` document writer.

use std::io;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};

/// Errors raised while reading or writing S3 XML documents.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    /// Writing to the output failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The document is not well-formed.
    #[error("XML processing error: {0}")]
    QuickXml(#[from] quick_xml::Error),

    /// A required element was absent.
    #[error("missing required XML element: {0}")]
    MissingElement(String),

    /// The document ended or nested in an unexpected place.
    #[error("unexpected XML element: {0}")]
    UnexpectedElement(String),

    /// Element text could not be converted to the target type.
    #[error("failed to parse value: {0}")]
    ParseError(String),
}

/// Render an S3 error as a flat `<Error>` document.
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Error>
///   <Code>NoSuchKey</Code>
///   <Message>The specified key does not exist.</Message>
///   <Resource>/photos/cat.jpg</Resource>
///   <RequestId>4442587FB7D0A2F9</RequestId>
/// </Error>
/// ```
///
/// `Resource` is omitted when `None`.
pub fn error_to_xml(
    code: &str,
    message: &str,
    resource: Option<&str>,
    request_id: &str,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    if let Err(e) = write_error(&mut buf, code, message, resource, request_id) {
        tracing::error!(error = %e, code, "failed to render error document");
        buf.clear();
    }
    buf
}

fn write_error(
    buf: &mut Vec<u8>,
    code: &str,
    message: &str,
    resource: Option<&str>,
    request_id: &str,
) -> io::Result<()> {
    let mut writer = Writer::new(buf);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.create_element("Error").write_inner_content(|w| {
        w.create_element("Code")
            .write_text_content(BytesText::new(code))?;
        w.create_element("Message")
            .write_text_content(BytesText::new(message))?;
        if let Some(resource) = resource {
            w.create_element("Resource")
                .write_text_content(BytesText::new(resource))?;
        }
        w.create_element("RequestId")
            .write_text_content(BytesText::new(request_id))?;
        Ok(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_render_error_with_resource() {
        let xml = error_to_xml(
            "NoSuchKey",
            "The specified key does not exist.",
            Some("/photos/cat.jpg"),
            "req-1",
        );
        let xml = std::str::from_utf8(&xml).expect("valid UTF-8");

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<Error><Code>NoSuchKey</Code>"));
        assert!(xml.contains("<Message>The specified key does not exist.</Message>"));
        assert!(xml.contains("<Resource>/photos/cat.jpg</Resource>"));
        assert!(xml.contains("<RequestId>req-1</RequestId>"));
    }

    #[test]
    fn test_should_omit_missing_resource() {
        let xml = error_to_xml("InternalError", "boom", None, "req-2");
        let xml = std::str::from_utf8(&xml).expect("valid UTF-8");

        assert!(!xml.contains("<Resource>"));
    }

    #[test]
    fn test_should_escape_markup_in_message() {
        let xml = error_to_xml("InvalidArgument", "a < b & c", Some("/b&k"), "req-3");
        let xml = std::str::from_utf8(&xml).expect("valid UTF-8");

        assert!(xml.contains("a &lt; b &amp; c"));
        assert!(xml.contains("/b&amp;k"));
    }
}

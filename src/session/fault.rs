//! Parsing of the error bodies returned by the API gateway and the WCS services.
//!
//! Elements and attributes are matched on their local name, so `am:fault` and
//! `fault` are read the same way.

use crate::session::manager::EXPIRED_TOKEN_CODE;
use crate::session::transport::RawResponse;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Marker in the JSON `description` of a 401 caused by an expired bearer token.
pub const INVALID_JWT_MARKER: &str = "Invalid JWT token";

/// Texts and attributes found inside the first `root` element of a document.
/// First occurrence wins.
#[derive(Debug, Default)]
struct XmlFields {
    texts: HashMap<String, String>,
    attributes: HashMap<String, String>,
    // Elements already closed; their later repeats are ignored.
    closed: HashSet<String>,
}

impl XmlFields {
    fn text(&self, name: &str) -> String {
        self.texts
            .get(name)
            .map(|t| t.trim().to_string())
            .unwrap_or_default()
    }

    fn attribute(&self, name: &str) -> String {
        self.attributes.get(name).cloned().unwrap_or_default()
    }

    fn append_text(&mut self, element: &str, text: &str) {
        if !self.closed.contains(element) {
            self.texts
                .entry(element.to_string())
                .or_default()
                .push_str(text);
        }
    }

    fn record_attributes(&mut self, element: &BytesStart<'_>) {
        for attribute in element.attributes().flatten() {
            let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
            if let Ok(value) = attribute.unescape_value() {
                self.attributes.entry(key).or_insert_with(|| value.into_owned());
            }
        }
    }
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

/// Returns `None` when the body is not well-formed XML or has no `root` element.
fn scan(body: &str, root: &str) -> Option<XmlFields> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut fields = XmlFields::default();
    let mut stack: Vec<String> = Vec::new();
    let mut inside_root = false;
    let mut root_seen = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                let name = local_name(&element);
                if name == root && !root_seen {
                    inside_root = true;
                    root_seen = true;
                }
                if inside_root {
                    fields.record_attributes(&element);
                }
                stack.push(name);
            }
            Ok(Event::Empty(element)) => {
                let is_root = !root_seen && local_name(&element) == root;
                if is_root {
                    root_seen = true;
                }
                if inside_root || is_root {
                    fields.record_attributes(&element);
                }
            }
            Ok(Event::Text(text)) => {
                if let (true, Some(current)) = (inside_root, stack.last()) {
                    let Ok(text) = text.unescape() else {
                        return None;
                    };
                    fields.append_text(current, &text);
                }
            }
            Ok(Event::CData(data)) => {
                if let (true, Some(current)) = (inside_root, stack.last()) {
                    let data = data.into_inner();
                    fields.append_text(current, &String::from_utf8_lossy(&data));
                }
            }
            Ok(Event::End(_)) => {
                if let Some(name) = stack.pop() {
                    if inside_root {
                        if name == root {
                            inside_root = false;
                        }
                        fields.closed.insert(name);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => return None,
        }
    }

    root_seen.then_some(fields)
}

/// An `am:fault` document returned by the API gateway, typically with status 400.
///
/// ```
/// use meteofrance::ServiceFault;
///
/// let fault = ServiceFault::parse(
///     r#"<am:fault xmlns:am="http://wso2.org/apimanager">
///          <am:code>900908</am:code>
///          <am:message>Missing parameter</am:message>
///          <am:description>coverageid is required</am:description>
///        </am:fault>"#,
/// );
/// assert_eq!(fault.message, "Missing parameter");
/// assert_eq!(fault.description, "coverageid is required");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFault {
    pub message: String,
    pub description: String,
}

impl ServiceFault {
    /// Falls back to the raw body as `message` when no fault element is found.
    pub fn parse(body: &str) -> Self {
        match scan(body, "fault") {
            Some(fields) => Self {
                message: fields.text("message"),
                description: fields.text("description"),
            },
            None => Self {
                message: body.trim().to_string(),
                description: String::new(),
            },
        }
    }
}

impl fmt::Display for ServiceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}\n {}", self.message, self.description)
        }
    }
}

/// An OWS exception report, the WCS way of saying a coverage or time step is
/// not available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionReport {
    pub exception_code: String,
    pub locator: String,
    pub text: String,
}

impl ExceptionReport {
    /// Falls back to the raw body as `text` when no exception element is found.
    pub fn parse(body: &str) -> Self {
        match scan(body, "Exception") {
            Some(fields) => Self {
                exception_code: fields.attribute("exceptionCode"),
                locator: fields.attribute("locator"),
                text: fields.text("ExceptionText"),
            },
            None => Self {
                exception_code: String::new(),
                locator: String::new(),
                text: body.trim().to_string(),
            },
        }
    }
}

impl fmt::Display for ExceptionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error code: {}\nLocator: {}\nText: {}",
            self.exception_code, self.locator, self.text
        )
    }
}

#[derive(Deserialize)]
struct GatewayMessage {
    description: Option<String>,
}

/// 401 + JSON content type + the [`INVALID_JWT_MARKER`] in `description`.
pub(crate) fn is_expired_token(response: &RawResponse) -> bool {
    if response.status != EXPIRED_TOKEN_CODE {
        return false;
    }
    if !response
        .content_type()
        .is_some_and(|ct| ct.contains("application/json"))
    {
        return false;
    }
    serde_json::from_slice::<GatewayMessage>(&response.body)
        .ok()
        .and_then(|message| message.description)
        .is_some_and(|description| description.contains(INVALID_JWT_MARKER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
    use reqwest::StatusCode;

    const EXCEPTION_REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows/2.0" version="2.0.1">
  <ows:Exception exceptionCode="NoSuchCoverage" locator="coverageid">
    <ows:ExceptionText>Coverage TEMPERATURE___2020 does not exist</ows:ExceptionText>
  </ows:Exception>
</ows:ExceptionReport>"#;

    fn response(status: u16, content_type: &str, body: &str) -> RawResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        RawResponse::new(
            StatusCode::from_u16(status).unwrap(),
            headers,
            body.as_bytes().to_vec(),
        )
    }

    #[test]
    fn fault_message_and_description() {
        let fault = ServiceFault::parse(
            "<am:fault xmlns:am=\"http://wso2.org/apimanager\"><am:code>900908</am:code>\
             <am:message>Resource forbidden </am:message>\
             <am:description>Access failure for API: /public/arome/1.0</am:description></am:fault>",
        );
        assert_eq!(fault.message, "Resource forbidden");
        assert_eq!(fault.description, "Access failure for API: /public/arome/1.0");
        let shown = fault.to_string();
        assert!(shown.contains("Resource forbidden"));
        assert!(shown.contains("Access failure"));
    }

    #[test]
    fn fault_with_escaped_text() {
        let fault = ServiceFault::parse(
            "<fault><message>a &amp; b</message><description>&lt;none&gt;</description></fault>",
        );
        assert_eq!(fault.message, "a & b");
        assert_eq!(fault.description, "<none>");
    }

    #[test]
    fn repeated_elements_keep_the_first_value() {
        let fault = ServiceFault::parse(
            "<fault><message><![CDATA[first]]></message><message>second</message>\
             <description>d1</description><description>d2</description></fault>",
        );
        assert_eq!(fault.message, "first");
        assert_eq!(fault.description, "d1");
    }

    #[test]
    fn non_xml_fault_keeps_raw_body() {
        let fault = ServiceFault::parse("  upstream timeout ");
        assert_eq!(fault.message, "upstream timeout");
        assert!(fault.description.is_empty());
        assert_eq!(fault.to_string(), "upstream timeout");
    }

    #[test]
    fn exception_report_fields() {
        let report = ExceptionReport::parse(EXCEPTION_REPORT);
        assert_eq!(report.exception_code, "NoSuchCoverage");
        assert_eq!(report.locator, "coverageid");
        assert_eq!(report.text, "Coverage TEMPERATURE___2020 does not exist");
        assert_eq!(
            report.to_string(),
            "Error code: NoSuchCoverage\nLocator: coverageid\nText: Coverage TEMPERATURE___2020 does not exist"
        );
    }

    #[test]
    fn exception_report_without_exception_element() {
        let report = ExceptionReport::parse("<html><body>Not Found</body></html>");
        assert!(report.exception_code.is_empty());
        assert_eq!(report.text, "<html><body>Not Found</body></html>");
    }

    #[test]
    fn expired_token_detection() {
        let body = r#"{"code":"900901","message":"Invalid Credentials","description":"Invalid JWT token. Make sure you have provided the correct security credentials"}"#;
        assert!(is_expired_token(&response(401, "application/json; charset=UTF-8", body)));

        // Same body, other status or content type.
        assert!(!is_expired_token(&response(403, "application/json", body)));
        assert!(!is_expired_token(&response(401, "text/plain", body)));

        let other = r#"{"code":"900902","description":"Missing Credentials"}"#;
        assert!(!is_expired_token(&response(401, "application/json", other)));
        assert!(!is_expired_token(&response(401, "application/json", "not json")));
    }
}

//! SOAP plumbing for the NAV web services.
//!
//! NAV publishes each page as its own SOAP endpoint. Requests are built from a
//! JSON object (the same shape the gateways use for payloads) and responses are
//! folded back into JSON: element text becomes a string, nested elements become
//! objects and repeated siblings become arrays. The gateways only ever see that
//! JSON, never XML.

use async_trait::async_trait;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Map, Value};

use crate::circuit_breaker::{create_nav_circuit_breaker, NavCircuitBreaker};
use crate::config::NavConfig;
use crate::errors::NavError;
use crate::models::RemoteRecord;

const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// NAV pages the back office talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavPage {
    CustomerList,
    ContractList,
    ContractGoods,
}

impl NavPage {
    pub fn name(&self) -> &'static str {
        match self {
            NavPage::CustomerList => "CustomerList",
            NavPage::ContractList => "ContractList",
            NavPage::ContractGoods => "ContractGoods",
        }
    }

    /// Path relative to the configured base URL.
    pub fn path(&self) -> String {
        format!("Page/{}", self.name())
    }

    pub fn namespace(&self) -> String {
        format!(
            "urn:microsoft-dynamics-schemas/page/{}",
            self.name().to_lowercase()
        )
    }

    pub fn soap_action(&self, operation: &str) -> String {
        format!("{}:{}", self.namespace(), operation)
    }
}

/// One request/response exchange with NAV.
///
/// Returns the children of the `<Operation>_Result` element.
#[async_trait]
pub trait NavTransport: Send + Sync {
    async fn invoke(
        &self,
        page: NavPage,
        operation: &str,
        params: Value,
    ) -> Result<Map<String, Value>, NavError>;
}

/// HTTP transport with basic auth, a per-call timeout and a circuit breaker.
#[derive(Clone)]
pub struct SoapTransport {
    client: reqwest::Client,
    base_url: String,
    user: String,
    pass: String,
    breaker: NavCircuitBreaker,
}

impl SoapTransport {
    pub fn new(config: &NavConfig) -> Result<Self, NavError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NavError::Transport(format!("Failed to create NAV client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            user: config.user.clone(),
            pass: config.pass.clone(),
            breaker: create_nav_circuit_breaker(),
        })
    }

    async fn post_envelope(
        &self,
        page: NavPage,
        operation: &str,
        envelope: String,
    ) -> Result<Map<String, Value>, NavError> {
        let url = format!("{}{}", self.base_url, page.path());

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.user, Some(&self.pass))
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", page.soap_action(operation))
            .body(envelope)
            .send()
            .await
            .map_err(|e| {
                NavError::Transport(format!(
                    "{} {} request failed: {}",
                    page.name(),
                    operation,
                    e
                ))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            NavError::Transport(format!(
                "{} {} response could not be read: {}",
                page.name(),
                operation,
                e
            ))
        })?;

        parse_response(operation, status.as_u16(), &body)
    }
}

fn is_transport_failure(err: &NavError) -> bool {
    matches!(err, NavError::Transport(_))
}

#[async_trait]
impl NavTransport for SoapTransport {
    async fn invoke(
        &self,
        page: NavPage,
        operation: &str,
        params: Value,
    ) -> Result<Map<String, Value>, NavError> {
        use failsafe::futures::CircuitBreaker;

        let envelope = encode_envelope(page, operation, &params)?;
        tracing::info!(page = page.name(), operation, "Calling NAV");
        tracing::debug!("NAV {} envelope: {} bytes", operation, envelope.len());

        let outcome = self
            .breaker
            .call_with(
                is_transport_failure,
                self.post_envelope(page, operation, envelope),
            )
            .await;

        match outcome {
            Ok(result) => {
                tracing::info!(page = page.name(), operation, "NAV call succeeded");
                Ok(result)
            }
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => Err(NavError::Transport(format!(
                "circuit open, {} {} not sent",
                page.name(),
                operation
            ))),
        }
    }
}

// ============ Request Encoding ============

/// Wraps `params` in a SOAP 1.1 envelope addressed to `page`.
///
/// Object keys become element names, arrays repeat the element, nulls are
/// omitted and scalar text is escaped.
pub fn encode_envelope(page: NavPage, operation: &str, params: &Value) -> Result<String, NavError> {
    check_element_name(operation)?;

    let mut xml = String::with_capacity(512);
    xml.push_str(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str(&format!(
        r#"<soap:Envelope xmlns:soap="{}"><soap:Body>"#,
        SOAP_ENVELOPE_NS
    ));
    xml.push_str(&format!(r#"<{} xmlns="{}">"#, operation, page.namespace()));

    match params {
        Value::Object(fields) => {
            for (name, value) in fields {
                write_element(&mut xml, name, value)?;
            }
        }
        Value::Null => {}
        other => {
            return Err(NavError::Encoding(format!(
                "{} parameters must be an object, got {}",
                operation, other
            )))
        }
    }

    xml.push_str(&format!("</{}>", operation));
    xml.push_str("</soap:Body></soap:Envelope>");
    Ok(xml)
}

fn write_element(xml: &mut String, name: &str, value: &Value) -> Result<(), NavError> {
    check_element_name(name)?;

    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                write_element(xml, name, item)?;
            }
        }
        Value::Object(fields) => {
            xml.push_str(&format!("<{}>", name));
            for (child, child_value) in fields {
                write_element(xml, child, child_value)?;
            }
            xml.push_str(&format!("</{}>", name));
        }
        Value::String(text) => {
            xml.push_str(&format!("<{}>{}</{}>", name, escape(text.as_str()), name));
        }
        Value::Bool(flag) => {
            xml.push_str(&format!("<{}>{}</{}>", name, flag, name));
        }
        Value::Number(number) => {
            xml.push_str(&format!("<{}>{}</{}>", name, number, name));
        }
    }

    Ok(())
}

fn check_element_name(name: &str) -> Result<(), NavError> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        Ok(())
    } else {
        Err(NavError::Encoding(format!("'{}' is not a valid element name", name)))
    }
}

// ============ Response Decoding ============

struct Frame {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            fields: Map::new(),
            text: String::new(),
        }
    }

    /// Leaf text is kept verbatim. Whitespace-only text is indentation
    /// between elements and is dropped.
    fn into_value(self) -> Value {
        if !self.fields.is_empty() {
            Value::Object(self.fields)
        } else if self.text.trim().is_empty() {
            Value::String(String::new())
        } else {
            Value::String(self.text)
        }
    }
}

fn append_child(fields: &mut Map<String, Value>, name: String, value: Value) {
    match fields.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            fields.insert(name, value);
        }
    }
}

fn local_name(raw: &[u8]) -> Result<String, String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| format!("element name is not UTF-8: {}", e))
}

/// Folds an XML document into JSON keyed by local element names.
pub fn xml_to_json(xml: &str) -> Result<Map<String, Value>, String> {
    let mut reader = Reader::from_str(xml);

    let mut stack = vec![Frame::new(String::new())];

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                stack.push(Frame::new(local_name(e.local_name().as_ref())?));
            }
            Ok(Event::Empty(e)) => {
                let name = local_name(e.local_name().as_ref())?;
                if let Some(parent) = stack.last_mut() {
                    append_child(&mut parent.fields, name, Value::String(String::new()));
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| err.to_string())?;
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text);
                }
            }
            Ok(Event::End(_)) => {
                if stack.len() < 2 {
                    return Err("unbalanced closing tag".to_string());
                }
                let frame = stack.pop().ok_or("unbalanced closing tag")?;
                let name = frame.name.clone();
                let value = frame.into_value();
                if let Some(parent) = stack.last_mut() {
                    append_child(&mut parent.fields, name, value);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "malformed XML at byte {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
        }
    }

    if stack.len() != 1 {
        return Err("document ended inside an element".to_string());
    }
    let root = stack.pop().map(|frame| frame.fields).unwrap_or_default();
    if root.is_empty() {
        return Err("empty document".to_string());
    }
    Ok(root)
}

/// Depth-first search for the first element named `name`, shallowest match
/// on each level first.
fn find_element<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    if let Some(found) = fields.get(name) {
        return Some(found);
    }
    fields.values().find_map(|value| match value {
        Value::Object(children) => find_element(children, name),
        Value::Array(items) => items.iter().find_map(|item| match item {
            Value::Object(children) => find_element(children, name),
            _ => None,
        }),
        _ => None,
    })
}

fn fault_message(fault: &Value) -> String {
    let from = |fields: &Map<String, Value>| -> Option<String> {
        fields
            .get("faultstring")
            .or_else(|| fields.get("Reason").and_then(|reason| reason.get("Text")))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    match fault {
        Value::Object(fields) => from(fields).unwrap_or_else(|| fault.to_string()),
        Value::String(text) if !text.is_empty() => text.clone(),
        _ => "unspecified SOAP fault".to_string(),
    }
}

/// Turns a raw HTTP answer into the `<operation>_Result` content.
///
/// A SOAP fault or a non-2xx status is a transport failure. A 2xx answer that
/// is not XML or lacks the result element is an unexpected-shape failure.
pub fn parse_response(
    operation: &str,
    status: u16,
    body: &str,
) -> Result<Map<String, Value>, NavError> {
    let success = (200..300).contains(&status);

    let document = match xml_to_json(body) {
        Ok(document) => document,
        Err(e) if !success => {
            return Err(NavError::Transport(format!(
                "{} answered HTTP {} ({})",
                operation, status, e
            )))
        }
        Err(e) => {
            return Err(NavError::UnexpectedResponse(format!(
                "{} response is not SOAP: {}",
                operation, e
            )))
        }
    };

    if let Some(fault) = find_element(&document, "Fault") {
        return Err(NavError::Transport(format!(
            "{} fault: {}",
            operation,
            fault_message(fault)
        )));
    }
    if !success {
        return Err(NavError::Transport(format!(
            "{} answered HTTP {}",
            operation, status
        )));
    }

    let result_name = format!("{}_Result", operation);
    match find_element(&document, &result_name) {
        Some(Value::Object(fields)) => Ok(fields.clone()),
        Some(Value::String(text)) if text.is_empty() => Ok(Map::new()),
        Some(other) => {
            let mut fields = Map::new();
            fields.insert("return_value".to_string(), other.clone());
            Ok(fields)
        }
        None => Err(NavError::UnexpectedResponse(format!(
            "{} response has no {} element",
            operation, result_name
        ))),
    }
}

/// Normalizes a field that NAV sends either as one record or as a list.
///
/// Scalars and missing fields yield an empty sequence.
pub fn normalize_records(value: Option<&Value>) -> Vec<RemoteRecord> {
    match value {
        Some(Value::Object(fields)) => vec![RemoteRecord::new(fields.clone())],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_object().cloned().map(RemoteRecord::new))
            .collect(),
        _ => Vec::new(),
    }
}

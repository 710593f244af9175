//! SOAP 1.1 codec and HTTP transport.
//!
//! Requests are built from a JSON object of parameters and responses are
//! decoded back into JSON. No WSDL is consulted: every leaf value travels as
//! text and comes back as a string.

use std::fmt::Write as _;

use async_trait::async_trait;
use quick_xml::escape::escape;
use reqwest::{Client, header};
use serde_json::{Map, Value};

use crate::{
    config::SoapTransportConfig,
    error::{AuthError, Result},
    xml,
};

/// SOAP 1.1 envelope namespace.
pub const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// How a service binds its operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoapBinding {
    /// Endpoint URL.
    pub url: String,
    /// Target namespace of the operations.
    pub namespace: String,
    /// Whether parameter elements are namespace-qualified.
    pub qualified: bool,
    /// Whether the `SOAPAction` header carries `namespace + operation`
    /// (otherwise it is empty).
    pub prefixed_action: bool,
}

impl SoapBinding {
    /// `SOAPAction` header value for `operation`.
    #[must_use]
    pub fn action(&self, operation: &str) -> String {
        if self.prefixed_action { format!("{}{operation}", self.namespace) } else { String::new() }
    }
}

/// Builds the SOAP envelope invoking `operation` with `params`.
///
/// Objects become nested elements, arrays repeat their element once per item,
/// `null` values are omitted and every other value is written as text.
#[must_use]
pub fn build_envelope(binding: &SoapBinding, operation: &str, params: &Map<String, Value>) -> String {
    let prefix = if binding.qualified { "ns:" } else { "" };
    let mut body = String::new();
    write_fields(&mut body, prefix, params);

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<soap:Envelope xmlns:soap="{envelope}" xmlns:ns="{namespace}">"#,
            "<soap:Body><ns:{operation}>{body}</ns:{operation}></soap:Body>",
            "</soap:Envelope>",
        ),
        envelope = ENVELOPE_NS,
        namespace = escape(binding.namespace.as_str()),
        operation = operation,
        body = body,
    )
}

fn write_fields(out: &mut String, prefix: &str, fields: &Map<String, Value>) {
    for (name, value) in fields {
        write_value(out, prefix, name, value);
    }
}

fn write_value(out: &mut String, prefix: &str, name: &str, value: &Value) {
    match value {
        Value::Null => {},
        Value::Array(items) => {
            for item in items {
                write_value(out, prefix, name, item);
            }
        },
        Value::Object(fields) => {
            let _ = write!(out, "<{prefix}{name}>");
            write_fields(out, prefix, fields);
            let _ = write!(out, "</{prefix}{name}>");
        },
        Value::String(text) => {
            let _ = write!(out, "<{prefix}{name}>{}</{prefix}{name}>", escape(text.as_str()));
        },
        Value::Bool(_) | Value::Number(_) => {
            let _ = write!(out, "<{prefix}{name}>{value}</{prefix}{name}>");
        },
    }
}

/// Decodes a SOAP response envelope.
///
/// Returns the content of the first element inside `Body` as JSON (usually
/// the `<operation>Response` wrapper's children).
///
/// # Errors
///
/// - [`AuthError::RemoteFault`] if the body carries a SOAP fault
/// - [`AuthError::Transport`] if the document is not a SOAP envelope
pub fn parse_envelope(input: &str) -> Result<Value> {
    let root = xml::parse(input)
        .map_err(|e| AuthError::transport(format!("unreadable SOAP response: {e}")))?;
    let body = root
        .child("Body")
        .ok_or_else(|| AuthError::transport(format!("expected SOAP Body in {}", root.name)))?;

    if let Some(fault) = body.child("Fault") {
        let text = |name: &str| fault.child(name).map(|e| e.text.clone()).unwrap_or_default();
        return Err(AuthError::RemoteFault { code: text("faultcode"), message: text("faultstring") });
    }

    let payload = body
        .children
        .first()
        .ok_or_else(|| AuthError::transport("empty SOAP Body"))?;
    Ok(payload.to_json())
}

/// Sends SOAP envelopes over some transport.
#[async_trait]
pub trait SoapTransport: Send + Sync {
    /// Posts `envelope` to `url` with the given `SOAPAction` and returns the
    /// raw response body.
    ///
    /// Fault responses are returned as bodies, not errors, so the caller can
    /// decode the fault.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Transport`] on network failures or when a non-2xx
    /// response carries no SOAP fault.
    async fn post(&self, url: &str, action: &str, envelope: String) -> Result<String>;
}

#[async_trait]
impl<T: SoapTransport + ?Sized> SoapTransport for std::sync::Arc<T> {
    async fn post(&self, url: &str, action: &str, envelope: String) -> Result<String> {
        (**self).post(url, action, envelope).await
    }
}

/// [`SoapTransport`] over HTTPS using `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpSoapTransport {
    client: Client,
}

impl HttpSoapTransport {
    /// Creates a transport from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the configuration is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: &SoapTransportConfig) -> Result<Self> {
        config.validate()?;
        let mut builder =
            Client::builder().timeout(config.timeout()).connect_timeout(config.connect_timeout());
        if let Some(agent) = config.user_agent() {
            builder = builder.user_agent(agent.to_owned());
        }
        let client =
            builder.build().map_err(|e| AuthError::Config(format!("cannot build client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SoapTransport for HttpSoapTransport {
    #[tracing::instrument(skip(self, envelope), fields(bytes = envelope.len()))]
    async fn post(&self, url: &str, action: &str, envelope: String) -> Result<String> {
        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", format!("\"{action}\""))
            .body(envelope)
            .send()
            .await
            .map_err(|e| AuthError::transport_with_source(format!("POST {url} failed"), e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::transport_with_source("cannot read response body", e))?;

        if !status.is_success() && !text.contains("Fault") {
            tracing::warn!(%status, url, "SOAP endpoint returned an error status");
            return Err(AuthError::transport(format!("HTTP {status} from {url}")));
        }
        Ok(text)
    }
}

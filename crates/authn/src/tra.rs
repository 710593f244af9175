//! Login ticket requests (TRA) and login ticket responses.
//!
//! A TRA is the small XML document the client signs and submits to the login
//! service. The service answers with a `loginTicketResponse` document that
//! [`parse_login_response`] turns into a [`TicketRecord`].
//!
//! # Example
//!
//! ```
//! use arca_sdk_authn::tra::LoginTicketRequest;
//! use chrono::{Duration, Utc};
//!
//! let tra = LoginTicketRequest::new("wsfe", Utc::now(), Duration::minutes(10)).unwrap();
//! let xml = tra.to_xml();
//! assert!(xml.contains("<service>wsfe</service>"));
//! ```

use std::collections::BTreeMap;

use arca_sdk_storage::{Credentials, HEADER_VERSION, TicketRecord};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use quick_xml::escape::escape;

use crate::{
    error::{AuthError, Result},
    xml,
};

/// Version attribute sent on every request.
pub const TRA_VERSION: &str = "1.0";

/// Root element of a login response.
const RESPONSE_ROOT: &str = "loginTicketResponse";

/// A login ticket request for one service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginTicketRequest {
    unique_id: u32,
    generation_time: DateTime<Utc>,
    expiration_time: DateTime<Utc>,
    service: String,
}

impl LoginTicketRequest {
    /// Builds a request for `service` valid from `now - skew` to `now + skew`.
    ///
    /// The unique id is the request's Unix timestamp, which is what the
    /// login service expects to see increase between requests.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Tra`] if `service` is empty, the skew is not
    /// positive, or the window falls outside the representable date range.
    pub fn new(service: &str, now: DateTime<Utc>, skew: Duration) -> Result<Self> {
        if service.trim().is_empty() {
            return Err(AuthError::Tra("service name must not be empty".into()));
        }
        if skew <= Duration::zero() {
            return Err(AuthError::Tra(format!("clock skew must be positive, got {skew}")));
        }
        let unique_id = u32::try_from(now.timestamp())
            .map_err(|_| AuthError::Tra(format!("timestamp {now} does not fit a unique id")))?;
        let (Some(generation_time), Some(expiration_time)) =
            (now.checked_sub_signed(skew), now.checked_add_signed(skew))
        else {
            return Err(AuthError::Tra(format!("clock skew {skew} is out of range")));
        };

        Ok(Self { unique_id, generation_time, expiration_time, service: service.to_owned() })
    }

    /// Request identifier.
    #[must_use]
    pub fn unique_id(&self) -> u32 {
        self.unique_id
    }

    /// Start of the request's validity window.
    #[must_use]
    pub fn generation_time(&self) -> DateTime<Utc> {
        self.generation_time
    }

    /// End of the request's validity window.
    #[must_use]
    pub fn expiration_time(&self) -> DateTime<Utc> {
        self.expiration_time
    }

    /// Target service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Renders the request as the XML document that gets signed.
    #[must_use]
    pub fn to_xml(&self) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<loginTicketRequest version="{version}">"#,
                "<header>",
                "<uniqueId>{unique_id}</uniqueId>",
                "<generationTime>{generation}</generationTime>",
                "<expirationTime>{expiration}</expirationTime>",
                "</header>",
                "<service>{service}</service>",
                "</loginTicketRequest>",
            ),
            version = TRA_VERSION,
            unique_id = self.unique_id,
            generation = self.generation_time.to_rfc3339_opts(SecondsFormat::Secs, false),
            expiration = self.expiration_time.to_rfc3339_opts(SecondsFormat::Secs, false),
            service = escape(self.service.as_str()),
        )
    }
}

/// Parses a `loginTicketResponse` document into a ticket record.
///
/// The root's `version` attribute becomes the first header entry; every
/// child of `<header>` becomes a lowercased field of the second entry; the
/// `<credentials>` block provides token and signature. Missing fields are
/// left out rather than rejected: validation is the job of
/// [`AccessTicket::create`](crate::AccessTicket::create).
///
/// # Errors
///
/// Returns [`AuthError::RemoteLogin`] if the document is not well-formed XML
/// or its root is not `loginTicketResponse`.
pub fn parse_login_response(input: &str) -> Result<TicketRecord> {
    let root = xml::parse(input)
        .map_err(|e| AuthError::remote_login(format!("unreadable login response: {e}")))?;
    if root.name != RESPONSE_ROOT {
        return Err(AuthError::remote_login(format!(
            "expected {RESPONSE_ROOT}, found {}",
            root.name
        )));
    }

    let mut version = BTreeMap::new();
    if let Some(v) = root.attribute(HEADER_VERSION) {
        version.insert(HEADER_VERSION.to_owned(), v.to_owned());
    }

    let fields: BTreeMap<String, String> = root
        .child("header")
        .map(|header| {
            header.children.iter().map(|f| (f.name.to_lowercase(), f.text.clone())).collect()
        })
        .unwrap_or_default();

    let credentials = root.child("credentials");
    let credential = |name: &str| {
        credentials.and_then(|c| c.child(name)).map(|e| e.text.clone())
    };

    Ok(TicketRecord {
        header: vec![version, fields],
        credentials: Credentials { token: credential("token"), sign: credential("sign") },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use arca_sdk_storage::{
        HEADER_DESTINATION, HEADER_EXPIRATION_TIME, HEADER_GENERATION_TIME, HEADER_SOURCE,
        HEADER_UNIQUE_ID,
    };
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;
    use crate::AccessTicket;

    const RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<loginTicketResponse version="1.0">
    <header>
        <source>CN=wsaahomo, O=AFIP, C=AR, SERIALNUMBER=CUIT 33693450239</source>
        <destination>SERIALNUMBER=CUIT 20111111112, CN=sdk</destination>
        <uniqueId>1714070127</uniqueId>
        <generationTime>2024-04-25T15:35:27.431-03:00</generationTime>
        <expirationTime>2024-04-26T03:35:27.431-03:00</expirationTime>
    </header>
    <credentials>
        <token>PD94bWwgdmVyc2lvbj0iMS4wIj8+</token>
        <sign>ZmVkY2JhOTg3NjU0MzIx</sign>
    </credentials>
</loginTicketResponse>"#;

    #[test]
    fn test_request_window() {
        let now = Utc.with_ymd_and_hms(2024, 4, 25, 18, 0, 0).unwrap();
        let tra = LoginTicketRequest::new("wsfe", now, Duration::minutes(10)).unwrap();

        assert_eq!(tra.unique_id(), 1_714_068_000);
        assert_eq!(tra.generation_time(), now - Duration::minutes(10));
        assert_eq!(tra.expiration_time(), now + Duration::minutes(10));
        assert_eq!(
            tra.to_xml(),
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<loginTicketRequest version="1.0"><header>"#,
                "<uniqueId>1714068000</uniqueId>",
                "<generationTime>2024-04-25T17:50:00+00:00</generationTime>",
                "<expirationTime>2024-04-25T18:10:00+00:00</expirationTime>",
                "</header><service>wsfe</service></loginTicketRequest>",
            )
        );
    }

    #[test]
    fn test_request_escapes_service() {
        let tra = LoginTicketRequest::new("a<b", Utc::now(), Duration::minutes(1)).unwrap();
        assert!(tra.to_xml().contains("<service>a&lt;b</service>"));
    }

    #[rstest]
    #[case::empty_service("", Duration::minutes(10))]
    #[case::blank_service("  ", Duration::minutes(10))]
    #[case::zero_skew("wsfe", Duration::zero())]
    #[case::negative_skew("wsfe", Duration::minutes(-1))]
    #[case::skew_beyond_date_range("wsfe", Duration::days(365 * 300_000))]
    fn test_request_rejects(#[case] service: &str, #[case] skew: Duration) {
        let err = LoginTicketRequest::new(service, Utc::now(), skew).unwrap_err();
        assert!(matches!(err, AuthError::Tra(_)));
    }

    #[test]
    fn test_parse_response() {
        let record = parse_login_response(RESPONSE).unwrap();

        assert_eq!(record.header_field(0, HEADER_VERSION), Some("1.0"));
        assert_eq!(
            record.header_field(1, HEADER_SOURCE),
            Some("CN=wsaahomo, O=AFIP, C=AR, SERIALNUMBER=CUIT 33693450239")
        );
        assert_eq!(
            record.header_field(1, HEADER_DESTINATION),
            Some("SERIALNUMBER=CUIT 20111111112, CN=sdk")
        );
        assert_eq!(record.header_field(1, HEADER_UNIQUE_ID), Some("1714070127"));
        assert_eq!(
            record.header_field(1, HEADER_GENERATION_TIME),
            Some("2024-04-25T15:35:27.431-03:00")
        );
        assert_eq!(
            record.header_field(1, HEADER_EXPIRATION_TIME),
            Some("2024-04-26T03:35:27.431-03:00")
        );
        assert_eq!(record.credentials.token.as_deref(), Some("PD94bWwgdmVyc2lvbj0iMS4wIj8+"));
        assert_eq!(record.credentials.sign.as_deref(), Some("ZmVkY2JhOTg3NjU0MzIx"));

        let ticket = AccessTicket::create(record).unwrap();
        assert_eq!(ticket.token(), "PD94bWwgdmVyc2lvbj0iMS4wIj8+");
    }

    #[test]
    fn test_parse_response_without_credentials_fails_validation() {
        let record = parse_login_response(
            r#"<loginTicketResponse version="1.0"><header>
               <expirationTime>2024-04-26T03:35:27.431-03:00</expirationTime>
               </header></loginTicketResponse>"#,
        )
        .unwrap();

        assert!(record.credentials.token.is_none());
        assert!(matches!(AccessTicket::create(record), Err(AuthError::MalformedTicket(_))));
    }

    #[rstest]
    #[case::not_xml("this is not xml")]
    #[case::wrong_root("<loginTicketRequest version=\"1.0\"/>")]
    #[case::truncated("<loginTicketResponse><header>")]
    fn test_parse_response_rejects(#[case] input: &str) {
        let err = parse_login_response(input).unwrap_err();
        assert!(matches!(err, AuthError::RemoteLogin { .. }), "got {err:?}");
    }
}

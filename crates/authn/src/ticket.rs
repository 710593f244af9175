//! Validated access tickets and their projection into call parameters.

use std::{collections::BTreeMap, fmt};

use arca_sdk_storage::{
    Credentials, HEADER_EXPIRATION_TIME, HEADER_GENERATION_TIME, HEADER_VERSION, TaxId,
    TicketRecord,
};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AuthError, Result};

/// Number of header entries in a well-formed ticket record.
const HEADER_ENTRIES: usize = 2;

/// An immutable, validated WSAA access ticket.
///
/// A ticket can only be obtained through [`AccessTicket::create`], which
/// rejects records lacking a token, a signature or a parseable expiration
/// time. As a consequence [`is_expired`](Self::is_expired) never has to guess:
/// there is no ticket whose expiration is unknown.
///
/// The original record is kept verbatim so that [`to_record`](Self::to_record)
/// reproduces exactly what was parsed or loaded.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessTicket {
    token: String,
    sign: String,
    generation_time: Option<DateTime<FixedOffset>>,
    expiration_time: DateTime<FixedOffset>,
    record: TicketRecord,
}

impl AccessTicket {
    /// Validates `record` and builds a ticket from it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MalformedTicket`] if:
    /// - the header does not have exactly two entries, the first carrying `version`
    /// - the token or signature is missing or empty
    /// - the expiration time is missing or not an RFC 3339 timestamp
    /// - a generation time is present but not an RFC 3339 timestamp
    pub fn create(record: TicketRecord) -> Result<Self> {
        if record.header.len() != HEADER_ENTRIES {
            return Err(AuthError::MalformedTicket(format!(
                "expected {HEADER_ENTRIES} header entries, found {}",
                record.header.len()
            )));
        }
        if record.header_field(0, HEADER_VERSION).is_none() {
            return Err(AuthError::MalformedTicket("header is missing its version entry".into()));
        }

        let token = non_empty(record.credentials.token.as_deref(), "token")?;
        let sign = non_empty(record.credentials.sign.as_deref(), "sign")?;

        let expiration = record
            .header_field(1, HEADER_EXPIRATION_TIME)
            .ok_or_else(|| AuthError::MalformedTicket("missing expiration time".into()))?;
        let expiration_time = parse_time(expiration, HEADER_EXPIRATION_TIME)?;

        let generation_time = record
            .header_field(1, HEADER_GENERATION_TIME)
            .map(|value| parse_time(value, HEADER_GENERATION_TIME))
            .transpose()?;

        Ok(Self {
            token: token.to_owned(),
            sign: sign.to_owned(),
            generation_time,
            expiration_time,
            record,
        })
    }

    /// Opaque access token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Opaque signature of the token.
    #[must_use]
    pub fn sign(&self) -> &str {
        &self.sign
    }

    /// Time the ticket was issued, when the record carried one.
    #[must_use]
    pub fn generation_time(&self) -> Option<DateTime<FixedOffset>> {
        self.generation_time
    }

    /// Time after which the ticket is no longer accepted.
    #[must_use]
    pub fn expiration_time(&self) -> DateTime<FixedOffset> {
        self.expiration_time
    }

    /// Returns `true` once `now` has reached the expiration time.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration_time
    }

    /// Header entries exactly as they were received.
    #[must_use]
    pub fn headers(&self) -> &[BTreeMap<String, String>] {
        &self.record.header
    }

    /// Credential pair exactly as it was received.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.record.credentials
    }

    /// Returns the record this ticket was created from.
    #[must_use]
    pub fn to_record(&self) -> TicketRecord {
        self.record.clone()
    }

    /// Projects the ticket into the authorization block for `tax_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidPrincipal`] if `tax_id` is not a positive
    /// integer.
    pub fn format_for_principal(&self, tax_id: TaxId) -> Result<AuthBlock> {
        if !tax_id.is_positive() {
            return Err(AuthError::InvalidPrincipal(format!(
                "tax id must be a positive integer, got {tax_id}"
            )));
        }

        Ok(AuthBlock {
            auth: AuthFields { token: self.token.clone(), sign: self.sign.clone(), cuit: tax_id.0 },
        })
    }
}

impl fmt::Debug for AccessTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTicket")
            .field("token", &"[REDACTED]")
            .field("sign", &"[REDACTED]")
            .field("generation_time", &self.generation_time)
            .field("expiration_time", &self.expiration_time)
            .finish()
    }
}

fn non_empty<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AuthError::MalformedTicket(format!("missing {field}"))),
    }
}

fn parse_time(value: &str, field: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value)
        .map_err(|e| AuthError::MalformedTicket(format!("unparseable {field} {value:?}: {e}")))
}

/// Authorization block attached to authenticated calls.
///
/// Serializes to `{"Auth": {"Token": ..., "Sign": ..., "Cuit": ...}}` with the
/// field names the invoicing service expects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthBlock {
    /// The credential fields.
    #[serde(rename = "Auth")]
    pub auth: AuthFields,
}

/// Fields of an [`AuthBlock`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthFields {
    /// Access token.
    #[serde(rename = "Token")]
    pub token: String,
    /// Token signature.
    #[serde(rename = "Sign")]
    pub sign: String,
    /// Tax identifier of the principal the call is made on behalf of.
    #[serde(rename = "Cuit")]
    pub cuit: i64,
}

impl fmt::Debug for AuthFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthFields")
            .field("token", &"[REDACTED]")
            .field("sign", &"[REDACTED]")
            .field("cuit", &self.cuit)
            .finish()
    }
}

/// How a service expects the authorization fields in its parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthFormat {
    /// Nested block: `{"Auth": {"Token", "Sign", "Cuit"}}` (invoicing).
    #[default]
    Block,
    /// Top-level fields: `{"token", "sign", "cuitRepresentada"}` (registry).
    Flat,
}

impl AuthBlock {
    /// Renders the block as call parameters in the given format.
    #[must_use]
    pub fn to_params(&self, format: AuthFormat) -> Map<String, Value> {
        let AuthFields { token, sign, cuit } = &self.auth;
        let mut params = Map::new();
        match format {
            AuthFormat::Block => {
                let mut auth = Map::new();
                auth.insert("Token".into(), Value::from(token.as_str()));
                auth.insert("Sign".into(), Value::from(sign.as_str()));
                auth.insert("Cuit".into(), Value::from(*cuit));
                params.insert("Auth".into(), Value::Object(auth));
            },
            AuthFormat::Flat => {
                params.insert("token".into(), Value::from(token.as_str()));
                params.insert("sign".into(), Value::from(sign.as_str()));
                params.insert("cuitRepresentada".into(), Value::from(*cuit));
            },
        }
        params
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use arca_sdk_storage::testutil::{TEST_TAX_ID, expired_record, record_with_window, valid_record};
    use chrono::Duration;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_create_valid_record() {
        let ticket = AccessTicket::create(valid_record("T", "S")).unwrap();
        assert_eq!(ticket.token(), "T");
        assert_eq!(ticket.sign(), "S");
        assert!(ticket.generation_time().is_some());
        assert!(!ticket.is_expired(Utc::now()));
    }

    #[test]
    fn test_expired_record_creates_expired_ticket() {
        let ticket = AccessTicket::create(expired_record("T", "S")).unwrap();
        assert!(ticket.is_expired(Utc::now()));
    }

    #[test]
    fn test_is_expired_boundary() {
        let now = Utc::now();
        let expiration = now + Duration::hours(1);
        let ticket =
            AccessTicket::create(record_with_window("T", "S", now, expiration)).unwrap();
        let exact = ticket.expiration_time().with_timezone(&Utc);

        assert!(!ticket.is_expired(exact - Duration::milliseconds(1)));
        assert!(ticket.is_expired(exact));
        assert!(ticket.is_expired(exact + Duration::milliseconds(1)));
    }

    #[rstest]
    #[case::missing_token(|r: &mut TicketRecord| r.credentials.token = None)]
    #[case::empty_token(|r: &mut TicketRecord| r.credentials.token = Some(String::new()))]
    #[case::missing_sign(|r: &mut TicketRecord| r.credentials.sign = None)]
    #[case::missing_expiration(|r: &mut TicketRecord| {
        r.header[1].remove(HEADER_EXPIRATION_TIME);
    })]
    #[case::unparseable_expiration(|r: &mut TicketRecord| {
        r.header[1].insert(HEADER_EXPIRATION_TIME.into(), "tomorrow-ish".into());
    })]
    #[case::unparseable_generation(|r: &mut TicketRecord| {
        r.header[1].insert(HEADER_GENERATION_TIME.into(), "2024-13-45".into());
    })]
    #[case::single_header_entry(|r: &mut TicketRecord| {
        r.header.pop();
    })]
    #[case::three_header_entries(|r: &mut TicketRecord| r.header.push(BTreeMap::new()))]
    #[case::missing_version(|r: &mut TicketRecord| {
        r.header[0].remove(HEADER_VERSION);
    })]
    fn test_create_rejects_malformed(#[case] corrupt: fn(&mut TicketRecord)) {
        let mut record = valid_record("T", "S");
        corrupt(&mut record);

        let err = AccessTicket::create(record).unwrap_err();
        assert!(matches!(err, AuthError::MalformedTicket(_)), "got {err:?}");
    }

    #[test]
    fn test_create_rejects_empty_record() {
        let err = AccessTicket::create(TicketRecord::default()).unwrap_err();
        assert!(matches!(err, AuthError::MalformedTicket(_)));
    }

    #[test]
    fn test_format_for_principal_exact_shape() {
        let ticket = AccessTicket::create(valid_record("T", "S")).unwrap();
        let block = ticket.format_for_principal(TaxId::from(TEST_TAX_ID)).unwrap();

        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({"Auth": {"Token": "T", "Sign": "S", "Cuit": 20111111112_i64}})
        );
    }

    #[rstest]
    #[case::zero(0)]
    #[case::negative(-20111111112)]
    fn test_format_for_principal_rejects_non_positive(#[case] tax_id: i64) {
        let ticket = AccessTicket::create(valid_record("T", "S")).unwrap();
        let err = ticket.format_for_principal(TaxId::from(tax_id)).unwrap_err();
        assert!(matches!(err, AuthError::InvalidPrincipal(_)));
    }

    #[test]
    fn test_format_is_pure() {
        let ticket = AccessTicket::create(valid_record("T", "S")).unwrap();
        let first = ticket.format_for_principal(TaxId::from(TEST_TAX_ID)).unwrap();
        let second = ticket.format_for_principal(TaxId::from(TEST_TAX_ID)).unwrap();
        assert_eq!(first, second);
    }

    #[rstest]
    #[case::block(AuthFormat::Block, json!({"Auth": {"Token": "T", "Sign": "S", "Cuit": 7}}))]
    #[case::flat(AuthFormat::Flat, json!({"token": "T", "sign": "S", "cuitRepresentada": 7}))]
    fn test_to_params(#[case] format: AuthFormat, #[case] expected: Value) {
        let ticket = AccessTicket::create(valid_record("T", "S")).unwrap();
        let block = ticket.format_for_principal(TaxId::from(7)).unwrap();
        assert_eq!(Value::Object(block.to_params(format)), expected);
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let ticket = AccessTicket::create(valid_record("secret-token", "secret-sign")).unwrap();
        let rendered = format!("{ticket:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(!rendered.contains("secret-sign"));

        let block = ticket.format_for_principal(TaxId::from(1)).unwrap();
        assert!(!format!("{block:?}").contains("secret-token"));
    }

    mod proptests {
        use arca_sdk_storage::{
            HEADER_DESTINATION, HEADER_SOURCE, HEADER_UNIQUE_ID, testutil::format_service_time,
        };
        use chrono::TimeZone;
        use proptest::prelude::*;

        use super::*;

        prop_compose! {
            fn arb_record()(
                token in "[A-Za-z0-9+/=]{1,64}",
                sign in "[A-Za-z0-9+/=]{1,64}",
                version in "[0-9]\\.[0-9]",
                source in "[ -~]{0,40}",
                unique_id in any::<u32>(),
                generation in 0i64..4_000_000_000,
                lifetime in 1i64..86_400,
            ) -> TicketRecord {
                let generation = Utc.timestamp_opt(generation, 0).unwrap();
                let expiration = generation + Duration::seconds(lifetime);
                TicketRecord {
                    header: vec![
                        BTreeMap::from([(HEADER_VERSION.to_owned(), version)]),
                        BTreeMap::from([
                            (HEADER_SOURCE.to_owned(), source),
                            (HEADER_DESTINATION.to_owned(), "SERIALNUMBER=CUIT 20111111112".to_owned()),
                            (HEADER_UNIQUE_ID.to_owned(), unique_id.to_string()),
                            (HEADER_GENERATION_TIME.to_owned(), format_service_time(generation)),
                            (HEADER_EXPIRATION_TIME.to_owned(), format_service_time(expiration)),
                        ]),
                    ],
                    credentials: Credentials { token: Some(token), sign: Some(sign) },
                }
            }
        }

        proptest! {
            #[test]
            fn create_then_to_record_is_identity(record in arb_record()) {
                let ticket = AccessTicket::create(record.clone()).unwrap();
                prop_assert_eq!(ticket.to_record(), record.clone());
                prop_assert_eq!(ticket.headers(), record.header.as_slice());
                prop_assert_eq!(ticket.credentials(), &record.credentials);
            }

            #[test]
            fn expired_strictly_after_valid_strictly_before(
                record in arb_record(),
                offset_ms in 1i64..10_000_000,
            ) {
                let ticket = AccessTicket::create(record).unwrap();
                let expiration = ticket.expiration_time().with_timezone(&Utc);
                prop_assert!(ticket.is_expired(expiration + Duration::milliseconds(offset_ms)));
                prop_assert!(!ticket.is_expired(expiration - Duration::milliseconds(offset_ms)));
            }
        }
    }
}

//! Persisted ticket record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Header entry key carrying the response format version (entry 0).
pub const HEADER_VERSION: &str = "version";
/// Header entry key naming the issuing authority (entry 1).
pub const HEADER_SOURCE: &str = "source";
/// Header entry key naming the principal the ticket was issued to (entry 1).
pub const HEADER_DESTINATION: &str = "destination";
/// Header entry key echoing the request's unique id (entry 1).
pub const HEADER_UNIQUE_ID: &str = "uniqueid";
/// Header entry key holding the ticket generation time (entry 1).
pub const HEADER_GENERATION_TIME: &str = "generationtime";
/// Header entry key holding the ticket expiration time (entry 1).
pub const HEADER_EXPIRATION_TIME: &str = "expirationtime";

/// Wire-shaped ticket record as returned by the login endpoint and as
/// persisted by [`TicketStore`](crate::TicketStore) implementations.
///
/// The shape mirrors the login response after XML-to-object conversion:
///
/// ```json
/// {
///   "header": [
///     { "version": "1.0" },
///     {
///       "source": "CN=wsaahomo, O=AFIP, C=AR, SERIALNUMBER=CUIT 33693450239",
///       "destination": "SERIALNUMBER=CUIT 20111111112, CN=sdk",
///       "uniqueid": "1714070127",
///       "generationtime": "2024-04-25T15:35:27.431-03:00",
///       "expirationtime": "2024-04-26T03:35:27.431-03:00"
///     }
///   ],
///   "credentials": { "token": "PD94...", "sign": "ZmVk..." }
/// }
/// ```
///
/// Header entries are string maps and credentials are optional. The
/// authentication layer turns a record into a validated ticket and rejects
/// malformed data instead of coercing it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    /// Header entries. A well-formed record has exactly two.
    #[serde(default)]
    pub header: Vec<BTreeMap<String, String>>,

    /// Token and signature pair.
    #[serde(default)]
    pub credentials: Credentials,
}

/// Credential pair of a [`TicketRecord`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Opaque access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Opaque signature of the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign: Option<String>,
}

impl TicketRecord {
    /// Returns the value of `field` in header entry `entry`, if present.
    #[must_use]
    pub fn header_field(&self, entry: usize, field: &str) -> Option<&str> {
        self.header.get(entry).and_then(|map| map.get(field)).map(String::as_str)
    }
}

//! Common types used across ticket storage operations.
//!
//! This module defines the identifiers that scope a stored ticket: the tax
//! identifier of the principal, the target environment, and the composite
//! [`TicketKey`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Macro to define a newtype wrapper around `i64` with standard trait
/// implementations.
///
/// Each generated type:
/// - Is a transparent wrapper around `i64` (zero runtime cost)
/// - Derives `Copy`, `Clone`, `Debug`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Derives `Serialize` and `Deserialize` (transparent)
/// - Implements `From<i64>` and `Into<i64>`
/// - Implements `Display` that outputs the inner value
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Tax identifier (CUIT) of a principal.
    ///
    /// Tickets are issued for the CUIT that owns the signing certificate and
    /// are formatted for a CUIT on every authenticated call. A CUIT is an
    /// 11-digit number, so it fits comfortably in an `i64`.
    ///
    /// Validity (positive value) is checked where the identifier is used,
    /// not on construction, so a persisted key can always be named.
    ///
    /// # Examples
    ///
    /// ```
    /// use arca_sdk_storage::TaxId;
    ///
    /// let cuit = TaxId::from(20111111112);
    /// assert_eq!(i64::from(cuit), 20111111112);
    /// assert_eq!(cuit.to_string(), "20111111112");
    /// ```
    TaxId
);

impl TaxId {
    /// Returns `true` if the identifier is a positive integer.
    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

/// Target environment of the remote web services.
///
/// Production and homologation (testing) issue independent tickets, so the
/// environment is part of every store key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Live services.
    Production,
    /// Homologation (testing) services.
    #[default]
    Homologation,
}

impl Environment {
    /// Returns `true` for [`Environment::Production`].
    #[must_use]
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Homologation => write!(f, "homologation"),
        }
    }
}

/// Composite key identifying one stored ticket.
///
/// At most one ticket is stored per key; saving under an existing key
/// overwrites it.
///
/// # Examples
///
/// ```
/// use arca_sdk_storage::{Environment, TaxId, TicketKey};
///
/// let key = TicketKey::new("wsfe", TaxId::from(20111111112), Environment::Production);
/// assert_eq!(key.to_string(), "wsfe/20111111112/production");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TicketKey {
    /// WSAA service identifier (for example `wsfe` or `ws_sr_padron_a13`).
    pub service: String,
    /// Principal the ticket was issued to.
    pub tax_id: TaxId,
    /// Environment the ticket is valid for.
    pub environment: Environment,
}

impl TicketKey {
    /// Creates a new ticket key.
    #[must_use]
    pub fn new(service: impl Into<String>, tax_id: TaxId, environment: Environment) -> Self {
        Self { service: service.into(), tax_id, environment }
    }
}

impl fmt::Display for TicketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.service, self.tax_id, self.environment)
    }
}

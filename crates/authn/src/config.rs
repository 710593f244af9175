//! Configuration for the authentication gateway and the SOAP transport.
//!
//! Both structures are constructed once per SDK instance, either through
//! their builders (which validate eagerly) or by deserializing a config file
//! and calling `validate()`.

use std::time::Duration;

use arca_sdk_storage::{Environment, TaxId};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Default half-width of a login request's validity window (10 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// Default HTTP request timeout (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default HTTP connection timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for [`AuthenticationGateway`](crate::AuthenticationGateway).
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use arca_sdk_authn::GatewayConfig;
/// use arca_sdk_storage::{Environment, TaxId};
///
/// let config = GatewayConfig::builder()
///     .tax_id(TaxId::from(20111111112))
///     .environment(Environment::Production)
///     .clock_skew(Duration::from_secs(300))
///     .build()?;
/// assert!(config.single_flight());
/// # Ok::<(), arca_sdk_authn::AuthError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Principal tickets are requested and formatted for.
    pub(crate) tax_id: TaxId,

    /// Target environment.
    #[serde(default)]
    pub(crate) environment: Environment,

    /// Use caller-supplied tickets and never persist obtained ones.
    #[serde(default)]
    pub(crate) manual_ticket_mode: bool,

    /// Half-width of the login request validity window.
    #[serde(with = "humantime_serde", default = "default_clock_skew")]
    pub(crate) clock_skew: Duration,

    /// Serialize concurrent logins for the same service.
    #[serde(default = "default_single_flight")]
    pub(crate) single_flight: bool,
}

fn default_clock_skew() -> Duration {
    DEFAULT_CLOCK_SKEW
}

fn default_single_flight() -> bool {
    true
}

#[bon::bon]
impl GatewayConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Optional Fields
    ///
    /// * `environment` - Target environment (default: homologation).
    /// * `manual_ticket_mode` - Caller supplies tickets (default: false).
    /// * `clock_skew` - Login request window half-width (default: 10 minutes).
    /// * `single_flight` - Serialize concurrent logins per service (default: true).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the tax id is not positive or the
    /// clock skew is zero.
    #[builder]
    pub fn new(
        tax_id: TaxId,
        #[builder(default)] environment: Environment,
        #[builder(default)] manual_ticket_mode: bool,
        #[builder(default = DEFAULT_CLOCK_SKEW)] clock_skew: Duration,
        #[builder(default = true)] single_flight: bool,
    ) -> Result<Self> {
        let config = Self { tax_id, environment, manual_ticket_mode, clock_skew, single_flight };
        config.validate()?;
        Ok(config)
    }

    /// Validates a configuration obtained by deserialization.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the tax id is not positive or the
    /// clock skew is zero.
    pub fn validate(&self) -> Result<()> {
        if !self.tax_id.is_positive() {
            return Err(AuthError::Config(format!(
                "tax_id must be a positive integer, got {}",
                self.tax_id
            )));
        }
        if self.clock_skew.is_zero() {
            return Err(AuthError::Config("clock_skew must be greater than zero".into()));
        }
        Ok(())
    }

    /// Returns the configured principal.
    #[must_use]
    pub fn tax_id(&self) -> TaxId {
        self.tax_id
    }

    /// Returns the target environment.
    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Returns whether manual ticket mode is enabled.
    #[must_use]
    pub fn manual_ticket_mode(&self) -> bool {
        self.manual_ticket_mode
    }

    /// Returns the login request window half-width.
    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    /// Returns whether concurrent logins are serialized per service.
    #[must_use]
    pub fn single_flight(&self) -> bool {
        self.single_flight
    }
}

/// Configuration for [`HttpSoapTransport`](crate::soap::HttpSoapTransport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoapTransportConfig {
    /// Whole-request timeout.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub(crate) timeout: Duration,

    /// Connection establishment timeout.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub(crate) connect_timeout: Duration,

    /// Optional `User-Agent` header value.
    #[serde(default)]
    pub(crate) user_agent: Option<String>,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

impl Default for SoapTransportConfig {
    fn default() -> Self {
        Self { timeout: DEFAULT_TIMEOUT, connect_timeout: DEFAULT_CONNECT_TIMEOUT, user_agent: None }
    }
}

#[bon::bon]
impl SoapTransportConfig {
    /// Creates a new transport configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if either timeout is zero.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_TIMEOUT)] timeout: Duration,
        #[builder(default = DEFAULT_CONNECT_TIMEOUT)] connect_timeout: Duration,
        #[builder(into)] user_agent: Option<String>,
    ) -> Result<Self> {
        let config = Self { timeout, connect_timeout, user_agent };
        config.validate()?;
        Ok(config)
    }

    /// Validates a configuration obtained by deserialization.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if either timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(AuthError::Config("timeout must be greater than zero".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(AuthError::Config("connect_timeout must be greater than zero".into()));
        }
        Ok(())
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the configured `User-Agent`, if any.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = GatewayConfig::builder().tax_id(TaxId::from(20111111112)).build().unwrap();

        assert_eq!(config.environment(), Environment::Homologation);
        assert!(!config.manual_ticket_mode());
        assert_eq!(config.clock_skew(), DEFAULT_CLOCK_SKEW);
        assert!(config.single_flight());
    }

    #[rstest]
    #[case::zero_tax_id(0, DEFAULT_CLOCK_SKEW)]
    #[case::negative_tax_id(-5, DEFAULT_CLOCK_SKEW)]
    #[case::zero_skew(20111111112, Duration::ZERO)]
    fn test_builder_rejects(#[case] tax_id: i64, #[case] skew: Duration) {
        let err = GatewayConfig::builder()
            .tax_id(TaxId::from(tax_id))
            .clock_skew(skew)
            .build()
            .unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[test]
    fn test_deserialize_with_humantime() {
        let config: GatewayConfig = serde_json::from_str(
            r#"{"tax_id": 20111111112, "environment": "production", "clock_skew": "5m"}"#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.environment(), Environment::Production);
        assert_eq!(config.clock_skew(), Duration::from_secs(300));
        assert!(config.single_flight());
    }

    #[test]
    fn test_deserialize_rejects_unknown_fields() {
        let result: std::result::Result<GatewayConfig, _> =
            serde_json::from_str(r#"{"tax_id": 1, "cache_ttl": "1h"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialized_config_is_validated_explicitly() {
        let config: GatewayConfig = serde_json::from_str(r#"{"tax_id": 0}"#).unwrap();
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));
    }

    #[test]
    fn test_transport_defaults() {
        let config = SoapTransportConfig::builder().build().unwrap();
        assert_eq!(config, SoapTransportConfig::default());
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        assert!(config.user_agent().is_none());
    }

    #[test]
    fn test_transport_rejects_zero_timeout() {
        let err = SoapTransportConfig::builder().timeout(Duration::ZERO).build().unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }
}

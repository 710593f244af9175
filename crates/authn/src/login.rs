//! Remote login against the WSAA authentication service.

use std::sync::Arc;

use arca_sdk_storage::Environment;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{
    error::{AuthError, Result},
    soap::{SoapBinding, SoapTransport, build_envelope, parse_envelope},
};

/// Production login endpoint.
pub const WSAA_PRODUCTION_URL: &str = "https://wsaa.afip.gov.ar/ws/services/LoginCms";

/// Homologation login endpoint.
pub const WSAA_HOMOLOGATION_URL: &str = "https://wsaahomo.afip.gov.ar/ws/services/LoginCms";

/// Target namespace of the login service.
pub const WSAA_NAMESPACE: &str = "http://wsaa.view.sua.dvadac.desein.afip.gov/";

const LOGIN_OPERATION: &str = "loginCms";
const LOGIN_PARAM: &str = "in0";
const LOGIN_RETURN: &str = "loginCmsReturn";

/// Exchanges a signed TRA for a login ticket response.
#[async_trait]
pub trait LoginClient: Send + Sync {
    /// Submits `signed_tra` (base64 CMS) and returns the raw
    /// `loginTicketResponse` XML document.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RemoteLogin`] if the service cannot be reached,
    /// answers with a fault, or returns no ticket document.
    async fn login_cms(&self, signed_tra: &str) -> Result<String>;
}

#[async_trait]
impl<T: LoginClient + ?Sized> LoginClient for Arc<T> {
    async fn login_cms(&self, signed_tra: &str) -> Result<String> {
        (**self).login_cms(signed_tra).await
    }
}

/// [`LoginClient`] calling the WSAA `loginCms` SOAP operation.
#[derive(Clone)]
pub struct WsaaLoginClient {
    transport: Arc<dyn SoapTransport>,
    binding: SoapBinding,
}

impl WsaaLoginClient {
    /// Creates a client for the login endpoint of `environment`.
    #[must_use]
    pub fn new(transport: Arc<dyn SoapTransport>, environment: Environment) -> Self {
        let url = if environment.is_production() {
            WSAA_PRODUCTION_URL
        } else {
            WSAA_HOMOLOGATION_URL
        };
        Self::with_url(transport, url)
    }

    /// Creates a client for a custom login endpoint.
    #[must_use]
    pub fn with_url(transport: Arc<dyn SoapTransport>, url: impl Into<String>) -> Self {
        Self {
            transport,
            binding: SoapBinding {
                url: url.into(),
                namespace: WSAA_NAMESPACE.to_owned(),
                qualified: true,
                prefixed_action: false,
            },
        }
    }

    /// Endpoint URL this client posts to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.binding.url
    }
}

#[async_trait]
impl LoginClient for WsaaLoginClient {
    #[tracing::instrument(skip(self, signed_tra), fields(url = %self.binding.url))]
    async fn login_cms(&self, signed_tra: &str) -> Result<String> {
        let mut params = Map::new();
        params.insert(LOGIN_PARAM.to_owned(), Value::from(signed_tra));
        let envelope = build_envelope(&self.binding, LOGIN_OPERATION, &params);

        let response = self
            .transport
            .post(&self.binding.url, &self.binding.action(LOGIN_OPERATION), envelope)
            .await
            .map_err(AuthError::into_remote_login)?;
        let payload = parse_envelope(&response).map_err(AuthError::into_remote_login)?;

        match payload.get(LOGIN_RETURN) {
            Some(Value::String(document)) if !document.is_empty() => Ok(document.clone()),
            _ => Err(AuthError::remote_login(format!("response carries no {LOGIN_RETURN}"))),
        }
    }
}

//! SOAP-backed [`RemoteService`] implementations.
//!
//! [`SoapService`] turns an operation name and a JSON parameter object into
//! a SOAP call. Ready-made constructors describe the electronic invoicing
//! service (WSFE) and the taxpayer registry (Padrón A13).

use std::sync::Arc;

use arca_sdk_storage::Environment;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{
    dispatcher::{OperationDescriptor, RemoteService},
    error::Result,
    soap::{SoapBinding, SoapTransport, build_envelope, parse_envelope},
    ticket::AuthFormat,
};

/// WSAA service identifier of the electronic invoicing service.
pub const WSFE_SERVICE: &str = "wsfe";
/// Production WSFE endpoint.
pub const WSFE_PRODUCTION_URL: &str = "https://servicios1.afip.gov.ar/wsfev1/service.asmx";
/// Homologation WSFE endpoint.
pub const WSFE_HOMOLOGATION_URL: &str = "https://wswhomo.afip.gov.ar/wsfev1/service.asmx";
/// Target namespace of WSFE.
pub const WSFE_NAMESPACE: &str = "http://ar.gov.afip.dif.FEV1/";

/// WSAA service identifier of the registry (scope A13).
pub const PADRON_A13_SERVICE: &str = "ws_sr_padron_a13";
/// Production Padrón A13 endpoint.
pub const PADRON_A13_PRODUCTION_URL: &str =
    "https://aws.afip.gov.ar/sr-padron/webservices/personaServiceA13";
/// Homologation Padrón A13 endpoint.
pub const PADRON_A13_HOMOLOGATION_URL: &str =
    "https://awshomo.afip.gov.ar/sr-padron/webservices/personaServiceA13";
/// Target namespace of Padrón A13.
pub const PADRON_A13_NAMESPACE: &str = "http://a13.soap.ws.server.puc.sr/";

const WSFE_OPERATIONS: &[(&str, &[&str])] = &[
    ("FEDummy", &[]),
    ("FECompUltimoAutorizado", &["Auth", "PtoVta", "CbteTipo"]),
    ("FECompConsultar", &["Auth", "FeCompConsReq"]),
    ("FECAESolicitar", &["Auth", "FeCAEReq"]),
    ("FECompTotXRequest", &["Auth"]),
    ("FEParamGetPtosVenta", &["Auth"]),
    ("FEParamGetTiposCbte", &["Auth"]),
    ("FEParamGetTiposConcepto", &["Auth"]),
    ("FEParamGetTiposDoc", &["Auth"]),
    ("FEParamGetTiposIva", &["Auth"]),
    ("FEParamGetTiposMonedas", &["Auth"]),
    ("FEParamGetTiposOpcional", &["Auth"]),
    ("FEParamGetTiposTributos", &["Auth"]),
    ("FEParamGetCotizacion", &["Auth", "MonId"]),
    ("FEParamGetCondicionIvaReceptor", &["Auth", "ClaseCmp"]),
];

const PADRON_A13_OPERATIONS: &[(&str, &[&str])] = &[
    ("dummy", &[]),
    ("getPersona", &["token", "sign", "cuitRepresentada", "idPersona"]),
    ("getIdPersonaListByDocumento", &["token", "sign", "cuitRepresentada", "documento"]),
];

fn descriptors(table: &[(&str, &[&str])]) -> Vec<OperationDescriptor> {
    table
        .iter()
        .map(|(name, fields)| OperationDescriptor::new(*name, fields.iter().copied()))
        .collect()
}

/// A remote service reached through SOAP.
pub struct SoapService {
    name: String,
    binding: SoapBinding,
    auth_format: AuthFormat,
    operations: Vec<OperationDescriptor>,
    excluded: Vec<String>,
    transport: Arc<dyn SoapTransport>,
}

#[bon::bon]
impl SoapService {
    /// Describes a SOAP service.
    ///
    /// # Arguments
    ///
    /// * `name` - WSAA service identifier tickets are requested for.
    /// * `binding` - Endpoint, namespace and encoding rules.
    /// * `operations` - Declared operations.
    /// * `transport` - Sends the envelopes.
    ///
    /// # Optional Fields
    ///
    /// * `auth_format` - Credential layout (default: [`AuthFormat::Block`]).
    /// * `excluded` - Operations that never take credentials.
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        binding: SoapBinding,
        operations: Vec<OperationDescriptor>,
        transport: Arc<dyn SoapTransport>,
        #[builder(default)] auth_format: AuthFormat,
        #[builder(default)] excluded: Vec<String>,
    ) -> Self {
        Self { name, binding, auth_format, operations, excluded, transport }
    }
}

impl SoapService {
    /// Electronic invoicing service (WSFE v1).
    #[must_use]
    pub fn wsfe(transport: Arc<dyn SoapTransport>, environment: Environment) -> Self {
        let url = if environment.is_production() { WSFE_PRODUCTION_URL } else { WSFE_HOMOLOGATION_URL };
        Self::builder()
            .name(WSFE_SERVICE)
            .binding(SoapBinding {
                url: url.to_owned(),
                namespace: WSFE_NAMESPACE.to_owned(),
                qualified: true,
                prefixed_action: true,
            })
            .operations(descriptors(WSFE_OPERATIONS))
            .transport(transport)
            .auth_format(AuthFormat::Block)
            .excluded(vec!["FEDummy".to_owned()])
            .build()
    }

    /// Taxpayer registry, scope A13.
    #[must_use]
    pub fn padron_a13(transport: Arc<dyn SoapTransport>, environment: Environment) -> Self {
        let url = if environment.is_production() {
            PADRON_A13_PRODUCTION_URL
        } else {
            PADRON_A13_HOMOLOGATION_URL
        };
        Self::builder()
            .name(PADRON_A13_SERVICE)
            .binding(SoapBinding {
                url: url.to_owned(),
                namespace: PADRON_A13_NAMESPACE.to_owned(),
                qualified: false,
                prefixed_action: false,
            })
            .operations(descriptors(PADRON_A13_OPERATIONS))
            .transport(transport)
            .auth_format(AuthFormat::Flat)
            .excluded(vec!["dummy".to_owned()])
            .build()
    }

    /// Returns the service binding.
    #[must_use]
    pub fn binding(&self) -> &SoapBinding {
        &self.binding
    }
}

#[async_trait]
impl RemoteService for SoapService {
    fn service_name(&self) -> &str {
        &self.name
    }

    fn auth_format(&self) -> AuthFormat {
        self.auth_format
    }

    fn operations(&self) -> Vec<OperationDescriptor> {
        self.operations.clone()
    }

    fn excluded_operations(&self) -> Vec<String> {
        self.excluded.clone()
    }

    #[tracing::instrument(skip(self, params), fields(service = %self.name))]
    async fn invoke(&self, operation: &str, params: Map<String, Value>) -> Result<Value> {
        let envelope = build_envelope(&self.binding, operation, &params);
        let response = self
            .transport
            .post(&self.binding.url, &self.binding.action(operation), envelope)
            .await?;
        parse_envelope(&response)
    }
}

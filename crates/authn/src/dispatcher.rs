//! Authenticating dispatch of remote operations.
//!
//! [`AuthenticatingCallDispatcher`] wraps a [`RemoteService`] and decides,
//! per operation, whether the call carries the principal's credentials. The
//! decision is made once, when the dispatcher is built, and recorded in an
//! [`OperationTable`].
//!
//! # Classification
//!
//! An operation is classified, in order of precedence, as:
//!
//! 1. [`AuthRequirement::Excluded`] when it is on the exclude list
//!    (health checks such as `FEDummy` or `dummy`)
//! 2. [`AuthRequirement::Required`] when it is on the require list
//! 3. [`AuthRequirement::Required`] when its declared input has an `Auth`
//!    field, or both a `token` and a `sign` field
//! 4. [`AuthRequirement::Unspecified`] otherwise
//!
//! Unspecified operations are called without credentials. They are listed
//! by [`OperationTable::unspecified`] and logged at WARN level when the
//! table is built, so a misclassified operation is visible before the
//! remote service rejects it.

use std::{collections::BTreeMap, fmt, sync::Arc};

use arca_sdk_storage::TaxId;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{
    error::{AuthError, Result},
    gateway::AuthenticationGateway,
    ticket::AuthFormat,
};

/// Input field that marks a nested authorization block.
const AUTH_FIELD: &str = "Auth";
/// Input fields that together mark flat authorization fields.
const FLAT_AUTH_FIELDS: [&str; 2] = ["token", "sign"];

/// Declared shape of one remote operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationDescriptor {
    /// Operation name as the remote service knows it.
    pub name: String,
    /// Top-level input field names.
    pub input_fields: Vec<String>,
}

impl OperationDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, input_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { name: name.into(), input_fields: input_fields.into_iter().map(Into::into).collect() }
    }

    /// Returns `true` if the declared input has room for credentials.
    #[must_use]
    pub fn has_auth_slot(&self) -> bool {
        let has = |field: &str| self.input_fields.iter().any(|f| f == field);
        has(AUTH_FIELD) || FLAT_AUTH_FIELDS.iter().all(|f| has(f))
    }
}

/// A remote service whose operations the dispatcher can invoke.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Service identifier used to obtain tickets (for example `wsfe`).
    fn service_name(&self) -> &str;

    /// How the service expects credentials in its parameters.
    fn auth_format(&self) -> AuthFormat;

    /// Operations the service declares.
    fn operations(&self) -> Vec<OperationDescriptor>;

    /// Operations that never take credentials, in addition to any the
    /// dispatcher is configured with.
    fn excluded_operations(&self) -> Vec<String> {
        Vec::new()
    }

    /// Invokes `operation` with fully merged `params`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RemoteFault`] or [`AuthError::Transport`] when
    /// the call fails.
    async fn invoke(&self, operation: &str, params: Map<String, Value>) -> Result<Value>;
}

/// Whether an operation receives credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthRequirement {
    /// Credentials are merged into the call.
    Required,
    /// The operation never receives credentials.
    Excluded,
    /// Nothing marks the operation either way; called without credentials.
    Unspecified,
}

impl AuthRequirement {
    /// Returns `true` for [`AuthRequirement::Required`].
    #[must_use]
    pub fn requires_auth(self) -> bool {
        matches!(self, Self::Required)
    }
}

impl fmt::Display for AuthRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "required"),
            Self::Excluded => write!(f, "excluded"),
            Self::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Per-operation authentication requirements of one service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationTable {
    service: String,
    entries: BTreeMap<String, AuthRequirement>,
}

impl OperationTable {
    /// Classifies `operations` of `service`.
    #[must_use]
    pub fn build(
        service: &str,
        operations: &[OperationDescriptor],
        require: &[String],
        exclude: &[String],
    ) -> Self {
        let listed = |list: &[String], name: &str| list.iter().any(|n| n == name);

        let entries: BTreeMap<String, AuthRequirement> = operations
            .iter()
            .map(|op| {
                let requirement = if listed(exclude, &op.name) {
                    AuthRequirement::Excluded
                } else if listed(require, &op.name) || op.has_auth_slot() {
                    AuthRequirement::Required
                } else {
                    AuthRequirement::Unspecified
                };
                (op.name.clone(), requirement)
            })
            .collect();

        for (operation, requirement) in &entries {
            if *requirement == AuthRequirement::Unspecified {
                tracing::warn!(
                    service,
                    operation = operation.as_str(),
                    "operation has no auth marker; it will be called without credentials"
                );
            }
        }

        Self { service: service.to_owned(), entries }
    }

    /// Service the table was built for.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Requirement of `operation`, or `None` if the service does not declare it.
    #[must_use]
    pub fn requirement(&self, operation: &str) -> Option<AuthRequirement> {
        self.entries.get(operation).copied()
    }

    /// Operations that will be called without credentials because nothing
    /// marks them either way.
    #[must_use]
    pub fn unspecified(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, r)| **r == AuthRequirement::Unspecified)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Number of declared operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the service declares no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Merges caller parameters over authorization defaults.
///
/// Caller values win. When both sides hold an object under the same name,
/// the objects are merged field by field, so a caller can override a single
/// credential field (for example `Auth.Cuit`) and keep the rest.
#[must_use]
pub fn merge_params(defaults: Map<String, Value>, overrides: Map<String, Value>) -> Map<String, Value> {
    let mut merged = defaults;
    for (name, value) in overrides {
        if let Value::Object(fields) = value {
            if let Some(Value::Object(base)) = merged.get_mut(&name) {
                base.extend(fields);
                continue;
            }
            merged.insert(name, Value::Object(fields));
        } else {
            merged.insert(name, value);
        }
    }
    merged
}

/// Wraps a [`RemoteService`] and injects credentials into the operations
/// that need them.
pub struct AuthenticatingCallDispatcher {
    service: Arc<dyn RemoteService>,
    gateway: Arc<AuthenticationGateway>,
    table: OperationTable,
    tax_id: TaxId,
}

#[bon::bon]
impl AuthenticatingCallDispatcher {
    /// Creates a dispatcher and classifies the service's operations.
    ///
    /// # Optional Fields
    ///
    /// * `require` - Operations that always receive credentials.
    /// * `exclude` - Operations that never receive credentials, added to the
    ///   service's own [`excluded_operations`](RemoteService::excluded_operations).
    /// * `tax_id` - Principal credentials are formatted for (default: the
    ///   gateway's configured tax id).
    #[builder]
    pub fn new(
        service: Arc<dyn RemoteService>,
        gateway: Arc<AuthenticationGateway>,
        #[builder(default, with = |names: impl IntoIterator<Item = impl Into<String>>| {
            names.into_iter().map(Into::into).collect()
        })]
        require: Vec<String>,
        #[builder(default, with = |names: impl IntoIterator<Item = impl Into<String>>| {
            names.into_iter().map(Into::into).collect()
        })]
        exclude: Vec<String>,
        tax_id: Option<TaxId>,
    ) -> Self {
        let mut exclude = exclude;
        exclude.extend(service.excluded_operations());
        let table =
            OperationTable::build(service.service_name(), &service.operations(), &require, &exclude);
        let tax_id = tax_id.unwrap_or_else(|| gateway.config().tax_id());

        Self { service, gateway, table, tax_id }
    }
}

impl AuthenticatingCallDispatcher {
    /// Invokes `operation`, merging credentials into `params` when the
    /// operation requires them.
    ///
    /// Operations that do not require credentials receive `params`
    /// unchanged and never trigger a login.
    ///
    /// # Errors
    ///
    /// - [`AuthError::UnknownOperation`] if the service does not declare `operation`
    /// - any error of [`AuthenticationGateway::login`]
    /// - [`AuthError::InvalidPrincipal`] if the configured tax id is not positive
    /// - any error of [`RemoteService::invoke`]
    #[tracing::instrument(skip(self, params), fields(service = self.service.service_name()))]
    pub async fn call(&self, operation: &str, params: Map<String, Value>) -> Result<Value> {
        let requirement = self.table.requirement(operation).ok_or_else(|| {
            AuthError::unknown_operation(self.service.service_name(), operation)
        })?;

        let params = if requirement.requires_auth() {
            let ticket = self.gateway.login(self.service.service_name()).await?;
            let block = self.gateway.get_auth_params(&ticket, self.tax_id)?;
            merge_params(block.to_params(self.service.auth_format()), params)
        } else {
            tracing::debug!(%requirement, "calling without credentials");
            params
        };

        self.service.invoke(operation, params).await
    }

    /// Returns the operation table built at construction.
    #[must_use]
    pub fn table(&self) -> &OperationTable {
        &self.table
    }

    /// Returns the wrapped service.
    #[must_use]
    pub fn service(&self) -> &Arc<dyn RemoteService> {
        &self.service
    }

    /// Returns the principal credentials are formatted for.
    #[must_use]
    pub fn tax_id(&self) -> TaxId {
        self.tax_id
    }
}

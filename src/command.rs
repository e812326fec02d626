//! Transport-agnostic commands, results and request metadata.

use serde::Serialize;
use std::fmt;
use uuid::Uuid;
use validator::Validate;

/// Anything that can flow through the policy pipeline as a command.
pub trait Command: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Command for T {}

/// Anything a pipeline handler can return.
pub trait CommandResult: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> CommandResult for T {}

/// Optional capability: a command that carries a client-supplied
/// idempotency key. An empty key means "not idempotent".
pub trait Idempotent {
    fn idempotency_key(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Grpc,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Grpc => "grpc",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request context supplied by the transport. Read-only for every
/// policy stage and never part of a cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub client_id: String,
    pub request_id: String,
    pub trace_id: String,
    pub remote_addr: String,
    pub protocol: Protocol,
    /// Path or method name, for logging.
    pub target: String,
}

impl RequestMeta {
    pub fn for_client(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Validate)]
#[validate(schema(function = "crate::validation::distinct_accounts", skip_on_field_errors = false))]
pub struct TransferCommand {
    #[validate(regex(path = *crate::validation::ACCOUNT_ID, message = "must be 1-64 characters of [A-Za-z0-9_-]"))]
    pub from_account: String,
    #[validate(regex(path = *crate::validation::ACCOUNT_ID, message = "must be 1-64 characters of [A-Za-z0-9_-]"))]
    pub to_account: String,
    #[validate(range(min = 1, message = "amount must be positive"))]
    pub amount_cents: i64,
    #[validate(length(min = 1, max = 128, message = "idempotency key must be 1-128 characters"))]
    pub idempotency_key: String,
}

impl TransferCommand {
    pub fn new(
        from_account: impl Into<String>,
        to_account: impl Into<String>,
        amount_cents: i64,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            from_account: from_account.into(),
            to_account: to_account.into(),
            amount_cents,
            idempotency_key: idempotency_key.into(),
        }
    }
}

impl Idempotent for TransferCommand {
    fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Success,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Success => "success",
        }
    }
}

/// Outcome of a transfer job. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    transaction_id: Uuid,
    status: TransferStatus,
    message: String,
}

impl TransferResult {
    pub fn new(transaction_id: Uuid, status: TransferStatus, message: impl Into<String>) -> Self {
        Self {
            transaction_id,
            status,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4(), TransferStatus::Success, message)
    }

    pub fn transaction_id(&self) -> Uuid {
        self.transaction_id
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

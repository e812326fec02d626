use crate::command::{TransferResult, TransferStatus};
use serde::Serialize;
use uuid::Uuid;

/// Wire shape of a completed transfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferResponse {
    pub transaction_id: Uuid,
    pub status: TransferStatus,
    pub message: String,
}

impl From<TransferResult> for TransferResponse {
    fn from(result: TransferResult) -> Self {
        Self {
            transaction_id: result.transaction_id(),
            status: result.status(),
            message: result.message().to_string(),
        }
    }
}

use crate::command::TransferCommand;
use crate::error::GatewayError;
use regex::Regex;
use std::sync::LazyLock;
use validator::{Validate, ValidationError, ValidationErrors};

/// Account identifiers: 1-64 characters of ASCII alphanumerics, `-` and `_`.
pub static ACCOUNT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("account id pattern is valid"));

/// Rejects transfers whose source and destination are the same account.
pub fn distinct_accounts(cmd: &TransferCommand) -> Result<(), ValidationError> {
    if !cmd.from_account.is_empty() && cmd.from_account == cmd.to_account {
        let mut err = ValidationError::new("same_account");
        err.message = Some("source and destination accounts must differ".into());
        return Err(err);
    }
    Ok(())
}

/// Validates a transfer command, reporting every violation in one `Invalid` error.
pub fn validate_transfer(cmd: &TransferCommand) -> Result<(), GatewayError> {
    cmd.validate()
        .map_err(|errors| GatewayError::invalid(describe(&errors)))
}

fn describe(errors: &ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |err| {
                let detail = match &err.message {
                    Some(msg) => msg.to_string(),
                    None => err.code.to_string(),
                };
                if field == "__all__" {
                    detail
                } else {
                    format!("{field}: {detail}")
                }
            })
        })
        .collect();
    // deterministic order for clients and tests
    parts.sort();
    if parts.is_empty() {
        "invalid transfer".to_string()
    } else {
        parts.join("; ")
    }
}

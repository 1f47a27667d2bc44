// Error taxonomy for the payout pipeline. Pipeline functions never
// terminate the process; the CLI boundary maps errors to exit codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_CONFIGURATION_LOAD_FAILURE: i32 = 1;
pub const EXIT_INVALID_ARGS: i32 = 2;
pub const EXIT_OPERATION_CANCELED: i32 = 3;
pub const EXIT_OPERATION_FAILED: i32 = 4;
pub const EXIT_PAYOUTS_READ_FAILURE: i32 = 5;
pub const EXIT_PAYOUTS_WRITE_FAILURE: i32 = 6;

/// Nested error body extracted from a ledger RPC response
/// (`id`/`description`/`data` payloads).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct RpcErrorDetail {
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for RpcErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.description)
    }
}

/// Chain of RPC error bodies attached to a rejected simulation or dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcErrorChain {
    pub message: String,
    pub details: Vec<RpcErrorDetail>,
}

impl RpcErrorChain {
    pub fn plain(message: impl Into<String>) -> Self {
        RpcErrorChain {
            message: message.into(),
            details: Vec::new(),
        }
    }
}

impl fmt::Display for RpcErrorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for detail in &self.details {
            write!(f, "; {}", detail)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid input: {0}")]
    Input(String),
    #[error("collector error: {0}")]
    Collector(String),
    #[error("simulation failed: {0}")]
    Simulation(RpcErrorChain),
    #[error("signer error: {0}")]
    Signer(String),
    #[error("broadcast failed: {0}")]
    Dispatch(String),
    #[error("confirmation failed: {0}")]
    Confirmation(String),
    #[error("failed to read payouts: {0}")]
    PayoutsRead(String),
    #[error("reporting error: {0}")]
    Reporting(String),
    #[error("hook '{hook}' failed: {message}")]
    Hook { hook: String, message: String },
    #[error("operation canceled by user")]
    Canceled,
}

impl PayoutError {
    pub fn exit_code(&self) -> i32 {
        match self {
            PayoutError::Configuration(_) => EXIT_CONFIGURATION_LOAD_FAILURE,
            PayoutError::Input(_) => EXIT_INVALID_ARGS,
            PayoutError::Canceled => EXIT_OPERATION_CANCELED,
            PayoutError::PayoutsRead(_) => EXIT_PAYOUTS_READ_FAILURE,
            PayoutError::Reporting(_) => EXIT_PAYOUTS_WRITE_FAILURE,
            _ => EXIT_OPERATION_FAILED,
        }
    }
}

impl From<std::io::Error> for PayoutError {
    fn from(e: std::io::Error) -> Self {
        PayoutError::Reporting(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PayoutError>;

/// Outcome record mapped to a process exit at the CLI boundary.
#[derive(Debug)]
pub struct ExitStatus {
    pub code: i32,
    pub message: String,
}

impl ExitStatus {
    pub fn from_error(err: &PayoutError) -> ExitStatus {
        ExitStatus {
            code: err.exit_code(),
            message: err.to_string(),
        }
    }
}

/// Classification of a batch failure recorded in batch results.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchErrorKind {
    #[serde(rename = "op_context_creation_failed")]
    OperationContextCreationFailed,
    #[serde(rename = "op_broadcast_failed")]
    OperationBroadcastFailed,
    #[serde(rename = "op_confirmation_failed")]
    OperationConfirmationFailed,
    #[serde(rename = "user_terminated")]
    UserTerminated,
}

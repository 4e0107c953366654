//! Error taxonomy shared by every network-facing component.
//!
//! Raw failures enter as [`SdkError::Request`] and are classified by the
//! transport layer once it decides to stop retrying. The classified variants
//! keep the original [`RequestFailure`] so the caller always sees the
//! underlying message.

use std::fmt;

use alloy::transports::{RpcError, TransportError, TransportErrorKind};

/// A failed network request as reported by the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailure {
    /// HTTP status, when the failure came with one
    pub status: Option<u16>,
    /// JSON-RPC error code, when the node returned an error object
    pub code: Option<i64>,
    /// Original error text
    pub message: String,
}

impl RequestFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.code) {
            (Some(status), _) => write!(f, "[HTTP {}] {}", status, self.message),
            (None, Some(code)) => write!(f, "[code {}] {}", code, self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

/// Errors surfaced by the transport, oracle and quote layers.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    /// Unclassified failure straight from the wire.
    #[error("request failed: {0}")]
    Request(RequestFailure),

    /// Deterministic rejection (revert, bad nonce, insufficient funds, ...).
    #[error("contract rejected call: {0}")]
    ContractRejection(RequestFailure),

    /// Transient failure that outlived the retry budget.
    #[error("transient failure after {attempts} attempts: {failure}")]
    TransientInfra { attempts: u32, failure: RequestFailure },

    /// Failure matching no known pattern; never retried.
    #[error("unclassified failure: {0}")]
    Unknown(RequestFailure),

    #[error("signer quorum not reached for {asset}: {received} of {required} authorized signers")]
    QuorumFailure {
        asset: String,
        required: usize,
        received: usize,
    },

    #[error("signed price payload for {asset} is {age_secs}s old (max {max_age_secs}s)")]
    StalePayload {
        asset: String,
        age_secs: u64,
        max_age_secs: u64,
    },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("signing failed: {0}")]
    Signer(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SdkError {
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(RequestFailure::new(message))
    }

    /// The wire-level failure carried by this error, if any.
    pub fn failure(&self) -> Option<&RequestFailure> {
        match self {
            Self::Request(f) | Self::ContractRejection(f) | Self::Unknown(f) => Some(f),
            Self::TransientInfra { failure, .. } => Some(failure),
            _ => None,
        }
    }

    /// Whether this error stems from a deterministic on-chain rejection.
    pub fn is_contract_rejection(&self) -> bool {
        matches!(self, Self::ContractRejection(_))
    }
}

impl From<TransportError> for SdkError {
    fn from(err: TransportError) -> Self {
        let mut failure = RequestFailure::new(err.to_string());

        if let Some(payload) = err.as_error_resp() {
            failure.code = Some(payload.code);
            failure.message = payload.message.to_string();
        }
        if let RpcError::Transport(TransportErrorKind::HttpError(http)) = &err {
            failure.status = Some(http.status);
        }

        Self::Request(failure)
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        let mut failure = RequestFailure::new(err.to_string());
        if let Some(status) = err.status() {
            failure.status = Some(status.as_u16());
        }
        // reqwest hides the cause behind a generic message; keep the kind visible
        if err.is_timeout() {
            failure.message = format!("timeout: {}", failure.message);
        } else if err.is_connect() {
            failure.message = format!("connection failure: {}", failure.message);
        }
        Self::Request(failure)
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

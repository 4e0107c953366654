use lending_sdk_chain::SdkError;
use thiserror::Error;

use crate::fixed_point::ConversionError;

/// Errors surfaced by the SDK facade.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport, quorum, decode or signer failure
    #[error(transparent)]
    Sdk(#[from] SdkError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("{action} requires a borrowable market, {token} is not")]
    NotBorrowable { action: &'static str, token: String },

    #[error("unknown market {0:?}")]
    UnknownMarket(String),

    #[error("{0} address not configured")]
    MissingContract(&'static str),

    #[error("no signer configured; only planning is available")]
    ReadOnly,
}

impl Error {
    /// Whether the chain deterministically rejected the action.
    pub fn is_contract_rejection(&self) -> bool {
        matches!(self, Self::Sdk(e) if e.is_contract_rejection())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

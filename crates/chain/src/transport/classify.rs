//! Error classification for retry decisions.
//!
//! Checked in order: deterministic contract failures, then transient
//! infrastructure failures, then everything else as unknown. Unknown is
//! never retried.

use crate::error::{RequestFailure, SdkError};

/// Messages that indicate a deterministic on-chain or input failure.
pub const NON_RETRYABLE_PATTERNS: &[&str] = &[
    "execution reverted",
    "reverted",
    "insufficient funds",
    "nonce too low",
    "nonce too high",
    "nonce has already been used",
    "invalid nonce",
    "already known",
    "replacement transaction underpriced",
    "out of gas",
    "gas required exceeds allowance",
    "intrinsic gas too low",
    "invalid argument",
    "invalid params",
    "stack underflow",
    "stack overflow",
    "stack limit reached",
];

/// Default catalogue of transient failure phrases.
pub const DEFAULT_RETRYABLE_PATTERNS: &[&str] = &[
    "rate limit",
    "too many requests",
    "request limit",
    "timeout",
    "timed out",
    "connection reset",
    "connection refused",
    "connection closed",
    "connection failure",
    "econnreset",
    "econnrefused",
    "etimedout",
    "enotfound",
    "dns error",
    "socket hang up",
    "socket closed",
    "network error",
    "bad gateway",
    "gateway timeout",
    "service unavailable",
    "internal server error",
    "proxy error",
    "rpc error",
    "temporarily unavailable",
    "try again",
    "header not found",
];

/// JSON-RPC code used by nodes for `execution reverted`.
const RPC_CODE_REVERT: i64 = 3;
/// JSON-RPC code used by providers for "limit exceeded".
const RPC_CODE_LIMIT_EXCEEDED: i64 = -32005;

/// Retry class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Deterministic rejection; surfaced immediately.
    Contract,
    /// Rate limiting (HTTP 429, "rate limit", limit-exceeded code).
    RateLimit,
    /// Connectivity or infrastructure failure.
    Transient,
    /// Matches nothing known; treated as non-retryable.
    Unknown,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimit | Self::Transient)
    }
}

/// Classify an SDK error against the given transient pattern set.
pub fn classify(err: &SdkError, retryable_patterns: &[String]) -> ErrorClass {
    match err {
        SdkError::Request(failure) => classify_failure(failure, retryable_patterns),
        SdkError::ContractRejection(_) => ErrorClass::Contract,
        SdkError::TransientInfra { .. } => ErrorClass::Transient,
        // Quorum, staleness, decode, signer and config errors are terminal
        _ => ErrorClass::Unknown,
    }
}

/// Classify a raw wire failure.
pub fn classify_failure(failure: &RequestFailure, retryable_patterns: &[String]) -> ErrorClass {
    let message = failure.message.to_ascii_lowercase();

    if failure.code == Some(RPC_CODE_REVERT)
        || NON_RETRYABLE_PATTERNS.iter().any(|p| message.contains(p))
    {
        return ErrorClass::Contract;
    }

    if failure.status == Some(429)
        || failure.code == Some(RPC_CODE_LIMIT_EXCEEDED)
        || message.contains("rate limit")
        || message.contains("too many requests")
    {
        return ErrorClass::RateLimit;
    }

    if matches!(failure.status, Some(500..=599)) {
        return ErrorClass::Transient;
    }

    if retryable_patterns
        .iter()
        .any(|p| message.contains(&p.to_ascii_lowercase()))
    {
        return ErrorClass::Transient;
    }

    ErrorClass::Unknown
}

/// Turn a terminal error into its classified, caller-facing form.
pub(crate) fn into_classified(err: SdkError, class: ErrorClass, attempts: u32) -> SdkError {
    match err {
        SdkError::Request(failure) => match class {
            ErrorClass::Contract => SdkError::ContractRejection(failure),
            ErrorClass::RateLimit | ErrorClass::Transient => {
                SdkError::TransientInfra { attempts, failure }
            }
            ErrorClass::Unknown => SdkError::Unknown(failure),
        },
        other => other,
    }
}

/// Default pattern set as owned strings (for policies and config).
pub fn default_retryable_patterns() -> Vec<String> {
    DEFAULT_RETRYABLE_PATTERNS
        .iter()
        .map(|p| p.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_msg(message: &str) -> ErrorClass {
        classify(
            &SdkError::request(message),
            &default_retryable_patterns(),
        )
    }

    #[test]
    fn test_contract_class() {
        assert_eq!(classify_msg("execution reverted: HEALTH_FACTOR"), ErrorClass::Contract);
        assert_eq!(classify_msg("Insufficient funds for gas * price + value"), ErrorClass::Contract);
        assert_eq!(classify_msg("nonce too low: next nonce 5, tx nonce 4"), ErrorClass::Contract);
        assert_eq!(classify_msg("out of gas"), ErrorClass::Contract);
        assert_eq!(classify_msg("invalid argument 0: hex string has odd length"), ErrorClass::Contract);
    }

    #[test]
    fn test_revert_code_wins_over_status() {
        let failure = RequestFailure::new("server error").with_status(500).with_code(3);
        assert_eq!(classify_failure(&failure, &[]), ErrorClass::Contract);

        // a 5xx carrying a revert message is still a contract failure
        let failure = RequestFailure::new("execution reverted").with_status(502);
        assert_eq!(classify_failure(&failure, &[]), ErrorClass::Contract);
    }

    #[test]
    fn test_rate_limit_class() {
        let failure = RequestFailure::new("slow down").with_status(429);
        let class = classify_failure(&failure, &[]);
        assert_eq!(class, ErrorClass::RateLimit);
        assert!(class.is_retryable());

        assert_eq!(classify_msg("Rate limit exceeded"), ErrorClass::RateLimit);

        let failure = RequestFailure::new("limit exceeded").with_code(-32005);
        assert_eq!(classify_failure(&failure, &[]), ErrorClass::RateLimit);
    }

    #[test]
    fn test_transient_class() {
        let failure = RequestFailure::new("upstream").with_status(503);
        assert_eq!(classify_failure(&failure, &[]), ErrorClass::Transient);

        assert_eq!(classify_msg("timeout: operation timed out"), ErrorClass::Transient);
        assert_eq!(classify_msg("connection reset by peer"), ErrorClass::Transient);
        assert_eq!(classify_msg("RPC error: node temporarily unavailable"), ErrorClass::Transient);
        assert_eq!(classify_msg("please try again later"), ErrorClass::Transient);
    }

    #[test]
    fn test_unknown_is_not_retryable() {
        let class = classify_msg("the frobnicator is sad");
        assert_eq!(class, ErrorClass::Unknown);
        assert!(!class.is_retryable());

        // 4xx other than 429 gives no signal by itself
        let failure = RequestFailure::new("forbidden").with_status(403);
        assert_eq!(classify_failure(&failure, &[]), ErrorClass::Unknown);
    }

    #[test]
    fn test_custom_patterns() {
        let patterns = vec!["Warming Up".to_string()];
        let failure = RequestFailure::new("node warming up");
        assert_eq!(classify_failure(&failure, &patterns), ErrorClass::Transient);
        assert_eq!(classify_failure(&failure, &[]), ErrorClass::Unknown);
    }

    #[test]
    fn test_terminal_sdk_errors() {
        let err = SdkError::QuorumFailure {
            asset: "ETH".into(),
            required: 3,
            received: 1,
        };
        assert_eq!(classify(&err, &default_retryable_patterns()), ErrorClass::Unknown);
        assert_eq!(
            classify(&SdkError::Decode("bad json".into()), &default_retryable_patterns()),
            ErrorClass::Unknown
        );
    }

    #[test]
    fn test_into_classified() {
        let err = into_classified(SdkError::request("execution reverted"), ErrorClass::Contract, 1);
        assert!(matches!(err, SdkError::ContractRejection(_)));

        let err = into_classified(SdkError::request("timeout"), ErrorClass::Transient, 4);
        assert!(matches!(err, SdkError::TransientInfra { attempts: 4, .. }));

        let err = into_classified(SdkError::request("weird"), ErrorClass::Unknown, 1);
        assert!(matches!(err, SdkError::Unknown(_)));
    }
}

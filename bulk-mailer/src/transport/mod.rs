//! Email-sending transport boundary.
//!
//! The dispatch engine only sees [`TransportClient`]. The SES client, the
//! dry-run client and the recording test client all implement it.

pub mod dry_run;
pub mod mock;
pub mod ses;

use async_trait::async_trait;
use thiserror::Error;

pub use dry_run::DryRunTransport;
pub use mock::{MockTransport, SendAttempt};
pub use ses::{SesClient, SesConfig};

/// Classified transport error.
///
/// Every variant is recorded as a failed recipient during a run; only a
/// failure from [`TransportClient::verify`] aborts the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// The provider refused the message (bad address, suppressed recipient...)
    #[error("rejected by provider ({code}): {message}")]
    Rejected { code: String, message: String },

    /// The provider throttled the request
    #[error("throttled by provider ({code}): {message}")]
    Throttled { code: String, message: String },

    /// Credentials are missing, invalid or not permitted to send
    #[error("credentials refused ({code}): {message}")]
    Credentials { code: String, message: String },

    /// The request never produced a provider answer
    #[error("network failure: {0}")]
    Network(String),
}

impl TransportError {
    /// Machine-readable error code.
    pub fn code(&self) -> &str {
        match self {
            TransportError::Rejected { code, .. }
            | TransportError::Throttled { code, .. }
            | TransportError::Credentials { code, .. } => code,
            TransportError::Network(_) => "NetworkFailure",
        }
    }

    /// Classify a provider error from its HTTP status and error code.
    ///
    /// A missing code is replaced by `Http{status}`.
    pub fn classify(status: Option<u16>, code: Option<&str>, message: &str) -> Self {
        const CREDENTIAL_CODES: &[&str] = &[
            "AccessDeniedException",
            "ExpiredTokenException",
            "IncompleteSignature",
            "InvalidClientTokenId",
            "InvalidSignatureException",
            "MissingAuthenticationToken",
            "SignatureDoesNotMatch",
            "UnrecognizedClientException",
        ];

        let code = match (code.filter(|c| !c.is_empty()), status) {
            (Some(code), _) => code.to_string(),
            (None, Some(status)) => format!("Http{}", status),
            (None, None) => "Unknown".to_string(),
        };
        let status = status.unwrap_or_default();
        let message = message.to_string();
        let lower = code.to_lowercase();

        if status == 429
            || lower.contains("throttl")
            || lower.contains("toomanyrequests")
            || message.to_lowercase().contains("rate exceeded")
        {
            TransportError::Throttled { code, message }
        } else if status == 401 || CREDENTIAL_CODES.contains(&code.as_str()) {
            TransportError::Credentials { code, message }
        } else if status >= 500 {
            TransportError::Network(format!("{}: {}", code, message))
        } else {
            TransportError::Rejected { code, message }
        }
    }
}

/// Sends fully serialized messages to a provider.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Check that the session and credentials are usable.
    async fn verify(&self) -> Result<(), TransportError>;

    /// Send one raw RFC 5322 message and return the provider's delivery id.
    async fn send(
        &self,
        source: &str,
        destinations: &[String],
        raw_message: &[u8],
    ) -> Result<String, TransportError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rejection() {
        let err = TransportError::classify(
            Some(400),
            Some("MessageRejected"),
            "Email address is not verified.",
        );
        assert!(matches!(err, TransportError::Rejected { .. }));
        assert_eq!(err.code(), "MessageRejected");
        assert_eq!(
            err.to_string(),
            "rejected by provider (MessageRejected): Email address is not verified."
        );
    }

    #[test]
    fn test_classify_throttling() {
        let err =
            TransportError::classify(Some(429), Some("TooManyRequestsException"), "slow down");
        assert!(matches!(err, TransportError::Throttled { .. }));
        let err = TransportError::classify(
            Some(400),
            Some("Throttling"),
            "Maximum sending rate exceeded.",
        );
        assert!(matches!(err, TransportError::Throttled { .. }));
        let err = TransportError::classify(Some(400), None, "Maximum sending rate exceeded.");
        assert!(matches!(err, TransportError::Throttled { .. }));
    }

    #[test]
    fn test_classify_credentials() {
        let err =
            TransportError::classify(Some(403), Some("UnrecognizedClientException"), "bad token");
        assert!(matches!(err, TransportError::Credentials { .. }));
        let err = TransportError::classify(Some(401), None, "unauthorized");
        assert_eq!(err.code(), "Http401");
    }

    #[test]
    fn test_classify_server_error_as_network() {
        let err = TransportError::classify(Some(503), Some("ServiceUnavailable"), "try later");
        assert!(matches!(err, TransportError::Network(_)));
        assert_eq!(err.code(), "NetworkFailure");
    }

    #[test]
    fn test_classify_without_status_or_code() {
        let err = TransportError::classify(None, None, "something odd");
        assert_eq!(err.code(), "Unknown");
        assert!(matches!(err, TransportError::Rejected { .. }));
    }
}

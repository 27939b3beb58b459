//! Error types for the harvesting engine.
//!
//! This module provides a unified error type with explicit variants for
//! transport, authentication, response format, storage, state and input
//! validation errors.

use thiserror::Error;

/// The unified error type for engine operations.
///
/// Callers decide how to recover by matching on the variant: transport
/// failures are retried by the search layer, everything else surfaces as a
/// dataset-level or run-level failure.
#[derive(Debug, Error)]
pub enum Error {
    /// Network transport errors (connection, TLS, HTTP status, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Authentication errors (bad identity/secret, rejected delegation).
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Malformed responses from an index node or delegation service.
    #[error("response format error: {0}")]
    ResponseFormat(#[from] ResponseFormatError),

    /// Database or serialization failures in the dataset store.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// An operation invoked in an invalid run or dataset state.
    #[error("illegal state: {0}")]
    IllegalState(#[from] IllegalStateError),

    /// Input validation errors (node URL, identity, node list).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),

    /// Local file I/O failures (trust bundle, credential and keystore files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if retrying the operation (with a smaller page or
    /// against another node) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Returns true if this is an authentication failure.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }
}

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network connection failed.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// TLS handshake or configuration error.
    #[error("TLS error: {message}")]
    Tls { message: String },

    /// Generic HTTP error.
    #[error("HTTP error: {message}")]
    Http { message: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Every configured federation node failed.
    #[error("all {attempted} federation nodes failed, last error: {last}")]
    AllNodesFailed { attempted: usize, last: String },
}

/// Authentication-related errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The delegation service rejected the identity or secret.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The delegation exchange failed for another reason.
    #[error("delegation rejected: {reason}")]
    DelegationRejected { reason: String },

    /// The stored certificate is past its `notAfter`.
    #[error("certificate expired")]
    CertificateExpired,

    /// No certificate has been provisioned yet.
    #[error("no credential available")]
    NoCredential,

    /// The stored certificate belongs to another identity.
    #[error("certificate subject '{actual}' does not match identity '{expected}'")]
    SubjectMismatch { expected: String, actual: String },

    /// The identity could not be resolved to a delegation endpoint.
    #[error("cannot resolve identity '{identity}': {reason}")]
    IdentityResolution { identity: String, reason: String },
}

/// Malformed response content.
#[derive(Debug, Error)]
pub enum ResponseFormatError {
    /// The body is not valid JSON or does not have the expected shape.
    #[error("malformed JSON: {message}")]
    Json { message: String },

    /// A present field could not be converted to its documented type.
    #[error("field '{field}' has value '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: &'static str,
    },

    /// A field the caller depends on is absent.
    #[error("missing field '{field}'")]
    MissingField { field: String },

    /// A certificate or key could not be parsed.
    #[error("invalid certificate: {message}")]
    Certificate { message: String },

    /// A line-oriented protocol exchange produced unexpected content.
    #[error("protocol violation: {message}")]
    Protocol { message: String },
}

impl From<serde_json::Error> for ResponseFormatError {
    fn from(err: serde_json::Error) -> Self {
        ResponseFormatError::Json {
            message: err.to_string(),
        }
    }
}

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The database rejected the operation; the transaction was rolled back.
    #[error("database error: {message}")]
    Database { message: String },

    /// A stored payload could not be encoded or decoded.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

/// Invalid run or dataset state transitions.
#[derive(Debug, Error)]
pub enum IllegalStateError {
    /// `start()` on a run that is already harvesting.
    #[error("run {run_id} is already harvesting")]
    AlreadyHarvesting { run_id: String },

    /// `start()` on a run that already completed this harvest kind.
    #[error("run {run_id} already completed a {kind} harvest")]
    AlreadyCompleted { run_id: String, kind: String },

    /// The dataset is not part of the run.
    #[error("dataset '{instance_id}' is not tracked by this run")]
    UnknownDataset { instance_id: String },

    /// No persisted run exists with this id.
    #[error("no run '{run_id}'")]
    UnknownRun { run_id: String },
}

/// Input validation errors.
#[derive(Debug, Error)]
pub enum InvalidInputError {
    /// Invalid index node URL.
    #[error("invalid node URL '{value}': {reason}")]
    NodeUrl { value: String, reason: String },

    /// Invalid OpenID identity.
    #[error("invalid identity '{value}': {reason}")]
    Identity { value: String, reason: String },

    /// The federation node list is empty or unreadable.
    #[error("invalid node list: {reason}")]
    NodeList { reason: String },

    /// Generic invalid input.
    #[error("invalid input: {message}")]
    Other { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_retryable() {
        let transport: Error = TransportError::Status {
            status: 503,
            url: "https://node/search".into(),
        }
        .into();
        assert!(transport.is_retryable());

        let format: Error = ResponseFormatError::Json {
            message: "eof".into(),
        }
        .into();
        assert!(!format.is_retryable());

        let auth: Error = AuthError::InvalidCredentials.into();
        assert!(!auth.is_retryable());
        assert!(auth.is_auth());
    }

    #[test]
    fn status_error_mentions_code_and_url() {
        let err = Error::from(TransportError::Status {
            status: 503,
            url: "https://esgf.example/esg-search/search".into(),
        });
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("esgf.example"));
    }
}

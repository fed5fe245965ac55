use thiserror::Error;

/// Errors from authentication attempts
#[derive(Debug, Error)]
pub enum AuthError {
    /// The identity claim is missing required fields; detected locally,
    /// never sent to the server
    #[error("Invalid identity claim: {0}")]
    InvalidClaim(String),

    /// The backend declined the claim
    #[error("Authentication rejected: {0}")]
    Rejected(String),

    /// Transport-level failure
    #[error("Network failure during authentication: {0}")]
    Network(String),
}

/// Errors from chat directory operations
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The directory service found no account for the contact identifier
    #[error("No user found for that contact")]
    ContactNotFound,

    /// A chat with that counterpart already exists; carries the existing
    /// chat id so the caller can resolve to the existing entry
    #[error("A chat with that contact already exists: {0}")]
    AlreadyExists(String),

    /// The credential was rejected
    #[error("Unauthorized: credential rejected by the directory service")]
    Unauthorized,

    /// Transport-level failure
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// The call did not complete within the bounded request duration
    #[error("Directory request timed out")]
    Timeout,
}

/// Errors from message store operations
#[derive(Debug, Error)]
pub enum MessageError {
    /// The message store rejected the append
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Transport-level failure
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// The call did not complete within the bounded request duration
    #[error("Message request timed out")]
    Timeout,
}

use thiserror::Error;

/// Errors raised by the coordinator, its Stratum client, and its solver supervisor.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// Pool fixed more than 17 bytes of nonce; the solver needs the remaining
    /// 3 search bytes plus 12 zero bytes. Fatal per the wire contract.
    #[error("pool fixed {0} bytes of nonce, at most 17 are usable")]
    FatalNonceTooLong(usize),

    #[error("sa-solver binary not found on PATH")]
    SolverMissing,

    /// The pool replied to `mining.authorize` with a falsy result. Not
    /// fatal to the process, but the connection must close and reconnect
    /// from scratch per §4.3/§7.
    #[error("pool rejected authorization")]
    AuthorizationRejected,
}

impl CoordinatorError {
    /// Whether this error should terminate the process with exit code 1,
    /// per the error-policy table in the spec's error handling section.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Config(_)
                | CoordinatorError::FatalNonceTooLong(_)
                | CoordinatorError::SolverMissing
        )
    }

    /// Whether this error should end the current connection (and trigger a
    /// reconnect) rather than being logged and dropped while the connection
    /// stays up. Fatal errors always close the connection too, but they are
    /// handled separately by `is_fatal` terminating the whole process.
    pub fn closes_connection(&self) -> bool {
        matches!(
            self,
            CoordinatorError::FatalNonceTooLong(_) | CoordinatorError::AuthorizationRejected
        )
    }
}

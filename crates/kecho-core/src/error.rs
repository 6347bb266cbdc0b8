use thiserror::Error;

/// Failures of a single session buffer operation.
///
/// Neither variant is fatal to the session: the caller may retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Storage for a new payload could not be obtained.
    #[error("no space for a {requested}-byte payload")]
    Alloc { requested: usize },

    /// Bytes could not be moved to the reader's destination.
    #[error("transfer failed: {0}")]
    Transfer(String),
}

/// Errors produced by the kecho protocol and transport layers.
#[derive(Debug, Error)]
pub enum KechoError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("session limit reached ({0})")]
    SessionLimit(usize),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<ciborium::de::Error<std::io::Error>> for KechoError {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        KechoError::Codec(e.to_string())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for KechoError {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        KechoError::Codec(e.to_string())
    }
}

pub type KechoResult<T> = Result<T, KechoError>;

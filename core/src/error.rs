use thiserror::Error;

/// Flat taxonomy of the failure categories the agent loop distinguishes.
///
/// Categories that the loop is defined to swallow rather than propagate (an
/// unparseable state file after a script runs, a focused file that fails to
/// read) are handled at their call sites and never constructed here.
#[derive(Debug, Error)]
pub enum MinicoderError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("operation cancelled by user")]
    Cancelled,

    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MinicoderError>;

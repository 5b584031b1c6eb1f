use thiserror::Error;

/// Error taxonomy for the backup pipeline.
#[derive(Error, Debug)]
pub enum VaultarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("format error: {0}")]
    Format(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("crypto state error: {0}")]
    CryptoState(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("backup aborted by user")]
    UserAbort,

    #[error("out of memory")]
    OutOfMemory,
}

pub type Result<T> = std::result::Result<T, VaultarError>;

impl From<std::time::SystemTimeError> for VaultarError {
    fn from(e: std::time::SystemTimeError) -> Self {
        VaultarError::Format(e.to_string())
    }
}

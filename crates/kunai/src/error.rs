use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Failed to attach to process: {0}")]
    AttachmentFailed(String),

    #[error("Signature not found: {0}")]
    SignatureNotFound(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    MemoryReadFailed { address: u64, message: String },

    #[error("Invalid offset: {0}")]
    InvalidOffset(String),

    #[error("Process exited (pid {0})")]
    ProcessExited(u32),

    #[error("Unknown value: {0}")]
    UnknownValue(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a "file not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// Errors that leave the lifecycle detached and are retried after the cooldown
    pub fn is_attach_failure(&self) -> bool {
        matches!(
            self,
            Error::ProcessNotFound(_) | Error::AttachmentFailed(_) | Error::Unsupported(_)
        )
    }

    /// Errors that only cost the current tick's reading
    pub fn is_read_failure(&self) -> bool {
        matches!(
            self,
            Error::MemoryReadFailed { .. } | Error::InvalidOffset(_) | Error::SignatureNotFound(_)
        )
    }

    pub(crate) fn read_failed(address: u64, message: impl Into<String>) -> Self {
        Error::MemoryReadFailed {
            address,
            message: message.into(),
        }
    }
}

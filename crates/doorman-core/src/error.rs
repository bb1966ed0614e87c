use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid delimiter {0:?}: must be '#' or '*'")]
    InvalidDelimiter(char),

    #[error("Invalid frame layout for {bits}-bit frames: {reason}")]
    InvalidFrameLayout { bits: u32, reason: String },

    // Edge source errors
    #[error("Edge source closed: {source_name}")]
    SourceClosed { source_name: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new frame layout error.
    pub fn frame_layout(bits: u32, reason: impl Into<String>) -> Self {
        Self::InvalidFrameLayout {
            bits,
            reason: reason.into(),
        }
    }

    /// Create a new source closed error.
    pub fn source_closed(source_name: impl Into<String>) -> Self {
        Self::SourceClosed {
            source_name: source_name.into(),
        }
    }

    /// Returns `true` if this error should stop the process at startup.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::InvalidDelimiter(_) | Self::InvalidFrameLayout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

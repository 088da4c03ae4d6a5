use std::path::PathBuf;

/// Result alias that carries the custom [`VisualiserError`] type.
pub type Result<T> = std::result::Result<T, VisualiserError>;

/// Reasons a visualiser element can fail to come up. Every one of them is
/// terminal for the window instance that hit it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("pixel format 32bppRGBA not supported")]
    UnsupportedPixelFormat,
    #[error("GPU context creation failed: {0}")]
    ContextCreationFailed(String),
    /// The context reported a version string that is unparsable or below 2.0.
    #[error("unsupported GPU version `{0}`")]
    UnsupportedVersion(String),
    #[error("visualization engine initialization failed: {0}")]
    EngineInitFailed(String),
}

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum VisualiserError {
    /// Free-form message for failures that carry no structured data.
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Init(#[from] InitError),
    /// Only 32-bit and 64-bit float samples can be ingested.
    #[error("unsupported sample width: {0} bits")]
    UnsupportedSampleWidth(u16),
    #[error("unsupported channel count: {0} (stereo required)")]
    UnsupportedChannelCount(u16),
    #[error("preset directory `{}` is unavailable: {source}", path.display())]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("config serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("spectrum transform failed: {0}")]
    Fft(#[from] realfft::FftError),
}

impl VisualiserError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for VisualiserError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VisualiserError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

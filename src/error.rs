//! Error handling for SonicStage
//!
//! Every failure propagates to the caller; the engine performs no internal
//! retries. Errors carry recovery suggestions the host can surface.

use thiserror::Error;

/// Result type alias for SonicStage operations
pub type Result<T> = std::result::Result<T, SonicError>;

/// Main error type for SonicStage operations
#[derive(Error, Debug)]
pub enum SonicError {
    // Session Errors
    #[error("Source {source_id} is already bound to session {bound_to}")]
    BindingConflict { source_id: String, bound_to: String },

    #[error("No active session")]
    NotInitialized,

    #[error("Unsupported configuration: {reason}")]
    UnsupportedConfiguration { reason: String },

    // Render Errors
    #[error("Could not decode source audio: {reason}")]
    DecodeFailure {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid audio: {reason}")]
    InvalidAudio { reason: String },

    // Control Errors
    #[error("Unknown preset: {name}")]
    UnknownPreset { name: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<hound::Error> for SonicError {
    fn from(err: hound::Error) -> Self {
        SonicError::DecodeFailure {
            reason: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl SonicError {
    /// Build an `UnsupportedConfiguration` error from any displayable reason
    pub fn unsupported(reason: impl Into<String>) -> Self {
        SonicError::UnsupportedConfiguration {
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            SonicError::BindingConflict { .. } => "BINDING_CONFLICT",
            SonicError::NotInitialized => "NOT_INITIALIZED",
            SonicError::UnsupportedConfiguration { .. } => "UNSUPPORTED_CONFIGURATION",
            SonicError::DecodeFailure { .. } => "DECODE_FAILURE",
            SonicError::InvalidAudio { .. } => "INVALID_AUDIO",
            SonicError::UnknownPreset { .. } => "UNKNOWN_PRESET",
            SonicError::Io(_) => "IO_ERROR",
            SonicError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SonicError::BindingConflict { .. }
                | SonicError::NotInitialized
                | SonicError::UnknownPreset { .. }
                | SonicError::DecodeFailure { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            SonicError::BindingConflict { .. } => vec![
                "Close the session that currently owns the source",
                "Rebuild the engine instead of initializing a second session",
            ],
            SonicError::NotInitialized => vec!["Call init with a playback source first"],
            SonicError::UnsupportedConfiguration { .. } => vec![
                "Use a sample rate between 8000 and 192000 Hz",
                "Use a bit depth of 16, 24 or 32",
            ],
            SonicError::DecodeFailure { .. } => vec![
                "Convert the source to PCM WAV first",
                "Check that the file plays in another application",
            ],
            SonicError::UnknownPreset { .. } => {
                vec!["List available presets with PresetLibrary::names"]
            }
            _ => vec![],
        }
    }
}

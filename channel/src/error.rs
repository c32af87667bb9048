use thiserror::Error;

/// Errors surfaced by channels, factories, and their decorators.
///
/// Decorators are exception-transparent: whatever the inner channel returns is
/// what the caller sees. The decorator only *classifies* the error onto the
/// span via [`ChannelError::result_code`].
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Invalid argument: {what}")]
    InvalidArgument { what: String },

    #[error("Unsupported channel shape: expected {expected}, got {actual}")]
    UnsupportedShape { expected: String, actual: String },

    #[error("Channel is not open")]
    NotOpen,

    #[error("Call timed out")]
    Timeout,

    #[error("Remote fault {code}: {message}")]
    Fault { code: String, message: String },

    #[error("Channel closed")]
    Closed,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChannelError {
    pub fn invalid_argument(what: impl Into<String>) -> Self {
        Self::InvalidArgument { what: what.into() }
    }

    /// Best-effort classification recorded on a failed span.
    pub fn result_code(&self) -> String {
        match self {
            Self::InvalidArgument { .. } => "invalid-argument".to_string(),
            Self::UnsupportedShape { .. } => "unsupported-shape".to_string(),
            Self::NotOpen => "not-open".to_string(),
            Self::Timeout => "timeout".to_string(),
            Self::Fault { code, .. } => format!("fault:{code}"),
            Self::Closed => "closed".to_string(),
            Self::Transport(_) => "transport".to_string(),
            Self::Other(_) => "error".to_string(),
        }
    }
}

/// Errors from the reply correlator.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CorrelatorError {
    #[error("Invalid argument: {what}")]
    InvalidArgument { what: String },

    #[error("Correlator has been disposed")]
    AlreadyDisposed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_classification() {
        assert_eq!(ChannelError::Timeout.result_code(), "timeout");
        assert_eq!(
            ChannelError::Fault {
                code: "Receiver".to_string(),
                message: "boom".to_string(),
            }
            .result_code(),
            "fault:Receiver"
        );
        assert_eq!(ChannelError::Closed.result_code(), "closed");
    }
}

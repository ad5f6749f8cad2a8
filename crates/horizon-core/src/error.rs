/// Core error types for the Horizon engine.

/// A specialized Result type for Horizon operations.
pub type HorizonResult<T> = Result<T, HorizonError>;

/// Top-level error type encompassing integration, dispatch and rendering.
#[derive(Debug, thiserror::Error)]
pub enum HorizonError {
    #[error("initialization error: {0}")]
    Initialization(String),

    #[error("resize to {width}x{height} failed: {reason}")]
    Resize {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("uniform blob is {actual} bytes, pipeline expects {expected}")]
    UniformSize { expected: usize, actual: usize },

    #[error("render target has no size; call resize first")]
    NotSized,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("gpu error: {0}")]
    Gpu(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
}

impl HorizonError {
    /// Create a resize error.
    pub fn resize(width: u32, height: u32, reason: impl Into<String>) -> Self {
        HorizonError::Resize {
            width,
            height,
            reason: reason.into(),
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid(message: impl Into<String>) -> Self {
        HorizonError::InvalidArgument(message.into())
    }

    /// Whether the caller may retry after correcting its inputs.
    ///
    /// Resize and argument failures leave all state untouched; initialization
    /// failures mean no usable instance exists.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HorizonError::Resize { .. }
                | HorizonError::InvalidArgument(_)
                | HorizonError::UniformSize { .. }
                | HorizonError::NotSized
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_error_display() {
        let err = HorizonError::resize(0, 480, "zero width");
        assert_eq!(err.to_string(), "resize to 0x480 failed: zero width");
    }

    #[test]
    fn test_uniform_size_display() {
        let err = HorizonError::UniformSize {
            expected: 96,
            actual: 64,
        };
        assert!(err.to_string().contains("64 bytes"));
        assert!(err.to_string().contains("expects 96"));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(HorizonError::resize(0, 0, "x").is_recoverable());
        assert!(HorizonError::NotSized.is_recoverable());
        assert!(!HorizonError::Initialization("no adapter".into()).is_recoverable());
        assert!(!HorizonError::Gpu("map failed".into()).is_recoverable());
    }
}

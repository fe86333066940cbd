//! Error types for the icon pipeline.
//!
//! Only configuration-level and resource-level failures surface here.
//! Problems with a single node or submesh are reported as
//! [`SkipReason`](crate::flatten::SkipReason) diagnostics instead.

use thiserror::Error;

/// Errors that abort a render call.
#[derive(Debug, Error)]
pub enum IconError {
    /// No render config was supplied and the store has no default.
    #[error("no render configuration for `{object}` and no default configured")]
    ConfigurationMissing { object: String },

    /// The backend could not allocate or use an offscreen target.
    #[error("render backend failure: {0}")]
    RenderBackendFailure(String),

    /// A requested buffer or canvas size is unusable.
    #[error("invalid resolution {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },

    /// A config or store document could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IconError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_object() {
        let err = IconError::ConfigurationMissing {
            object: "Barracks".into(),
        };
        assert!(err.to_string().contains("Barracks"));

        let err = IconError::InvalidResolution {
            width: 0,
            height: 16,
        };
        assert_eq!(err.to_string(), "invalid resolution 0x16");
    }

    #[test]
    fn json_errors_convert() {
        let parse: std::result::Result<u32, _> = serde_json::from_str("nope");
        let err: IconError = parse.unwrap_err().into();
        assert!(matches!(err, IconError::Serialization(_)));
    }
}

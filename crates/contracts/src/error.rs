//! Error layering for the contracts crate.
//!
//! Split by source: wire / codec / config.

use thiserror::Error;

/// Unified contract-level error type.
#[derive(Debug, Error)]
pub enum CoordError {
    // ===== wire errors =====
    /// Serialization / deserialization failure
    #[error("codec error: {message}")]
    Codec { message: String },

    /// Unknown opcode byte on the wire
    #[error("unknown opcode: {value}")]
    UnknownOpcode { value: u8 },

    /// Unknown status byte on the wire
    #[error("unknown status: {value}")]
    UnknownStatus { value: u8 },

    /// Frame exceeds the transport ceiling
    #[error("frame of {len} bytes exceeds maximum of {max}")]
    FrameTooLarge { len: usize, max: usize },

    // ===== config errors =====
    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== generic =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoordError {
    /// Create a codec error
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Create a config validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}

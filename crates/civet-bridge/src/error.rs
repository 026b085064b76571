//! Bridge error types

use thiserror::Error;

/// Errors surfaced across the extension ABI.
///
/// Domain errors and resource exhaustion are ordinary values an extension
/// can observe and handle. Protocol violations (closed-handle reuse, stale
/// contexts) never appear here — they are fatal by default and routed
/// through the debug layer's violation policy instead.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Division by zero, detected on the fast path or reported by the host.
    #[error("ZeroDivisionError: division by zero")]
    DivideByZero,

    /// Type error reported by the host runtime.
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Overflow converting a host value to a fixed-width native value.
    #[error("OverflowError: {0}")]
    OverflowError(String),

    /// Resource exhaustion: allocation or OS mapping failure.
    #[error("MemoryError")]
    NoMemory,

    /// The extension was built against an incompatible ABI revision.
    #[error("extension ABI version {required} is not supported (bridge provides {provided})")]
    AbiMismatch {
        /// Version the host runtime implementation reports.
        required: u32,
        /// Version this bridge was built for.
        provided: u32,
    },

    /// Internal error in the host runtime.
    #[error("SystemError: {0}")]
    SystemError(String),
}

impl BridgeError {
    /// Create a type error.
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create an overflow error.
    pub fn overflow(msg: impl Into<String>) -> Self {
        Self::OverflowError(msg.into())
    }

    /// Create a system error.
    pub fn system(msg: impl Into<String>) -> Self {
        Self::SystemError(msg.into())
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

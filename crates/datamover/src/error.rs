//! Error types for data movement operations.

use thiserror::Error;

/// Main error type for data movement operations.
#[derive(Error, Debug)]
pub enum MoverError {
    /// Configuration error (missing secret, invalid CLI args, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown operation type requested from the factory.
    #[error("Unsupported operation type: {0}")]
    UnsupportedOperation(String),

    /// Database or storage endpoint unreachable. Retryable up to the
    /// configured attempt budget, then treated as fatal.
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Database driver error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Object storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] object_store::Error),

    /// Row-count or digest mismatch for a single transfer unit.
    #[error("Integrity check failed for {unit}: {message}")]
    Integrity { unit: String, message: String },

    /// Target already exists or DDL execution failed.
    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    /// Bad key or corrupt ciphertext.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Data transfer failed for a specific unit.
    #[error("Transfer failed for {unit}: {message}")]
    Transfer { unit: String, message: String },

    /// IO error (local temp files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation was cancelled (SIGINT, etc.)
    #[error("Operation cancelled")]
    Cancelled,
}

impl MoverError {
    /// Create a Connection error with context about where it occurred.
    pub fn connection(message: impl Into<String>, context: impl Into<String>) -> Self {
        MoverError::Connection {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Transfer error for a named unit.
    pub fn transfer(unit: impl Into<String>, message: impl Into<String>) -> Self {
        MoverError::Transfer {
            unit: unit.into(),
            message: message.into(),
        }
    }

    /// Create an Integrity error for a named unit.
    pub fn integrity(unit: impl Into<String>, message: impl Into<String>) -> Self {
        MoverError::Integrity {
            unit: unit.into(),
            message: message.into(),
        }
    }

    /// Whether this error is worth retrying. Only connection-level failures
    /// qualify; integrity, provisioning, and crypto failures are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            MoverError::Connection { .. } => true,
            MoverError::Database(e) => e.is_closed(),
            _ => false,
        }
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            MoverError::Config(_) => 2,
            MoverError::UnsupportedOperation(_) => 2,
            MoverError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for data movement operations.
pub type Result<T> = std::result::Result<T, MoverError>;

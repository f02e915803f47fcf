//! Structured errors for the barrio-sw server.
//!
//! Engine failures already map through `barrio_core::Error`; these cover
//! tool-level problems.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid tool parameters (e.g., unknown client id).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Nothing stored under the requested URL.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Tool output could not be serialized.
    #[error("SERIALIZE_FAILED: {0}")]
    Serialize(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match &err {
            ToolError::InvalidInput(_) => (-32602, err.to_string()),
            ToolError::CacheMiss(_) => (-32001, err.to_string()),
            ToolError::Serialize(_) => (-32603, err.to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

//! Wire-visible error taxonomy shared by every pipeline stage.
//!
//! Each variant corresponds to one of the wire codes the HTTP layer (out of
//! scope here) reports to clients. Adapters and cache readers swallow
//! transport-level failures into `None` rather than raising one of these;
//! these variants are for failures the orchestrator and its callers must
//! observe.

use std::fmt;

/// Crate-wide result alias for fallible operations that carry a wire code.
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Config1001MissingField,
    Config1002InvalidValue,
    Config1003Unreadable,
    Fetch2001Timeout,
    Fetch2002Connect,
    Fetch2003HttpStatus,
    Fetch2004NonJson,
    Fetch2005ShapeMismatch,
    Fetch2006Disabled,
    Render3001Template,
    Render3002Screenshot,
    Render3003Save,
    Storage4001ReadFailed,
    Storage4002BadVersion,
    Storage4003WriteFailed,
    Storage4004CacheWriteFailed,
    Generation5001Failed,
    Generation5002Busy,
    Auth6001Unauthorized,
    Ops8001CleanupFailed,
}

impl ErrorCode {
    /// The exact wire string (e.g. `"GENERATION_5002"`).
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            ErrorCode::Config1001MissingField => "CONFIG_1001",
            ErrorCode::Config1002InvalidValue => "CONFIG_1002",
            ErrorCode::Config1003Unreadable => "CONFIG_1003",
            ErrorCode::Fetch2001Timeout => "FETCH_2001",
            ErrorCode::Fetch2002Connect => "FETCH_2002",
            ErrorCode::Fetch2003HttpStatus => "FETCH_2003",
            ErrorCode::Fetch2004NonJson => "FETCH_2004",
            ErrorCode::Fetch2005ShapeMismatch => "FETCH_2005",
            ErrorCode::Fetch2006Disabled => "FETCH_2006",
            ErrorCode::Render3001Template => "RENDER_3001",
            ErrorCode::Render3002Screenshot => "RENDER_3002",
            ErrorCode::Render3003Save => "RENDER_3003",
            ErrorCode::Storage4001ReadFailed => "STORAGE_4001",
            ErrorCode::Storage4002BadVersion => "STORAGE_4002",
            ErrorCode::Storage4003WriteFailed => "STORAGE_4003",
            ErrorCode::Storage4004CacheWriteFailed => "STORAGE_4004",
            ErrorCode::Generation5001Failed => "GENERATION_5001",
            ErrorCode::Generation5002Busy => "GENERATION_5002",
            ErrorCode::Auth6001Unauthorized => "AUTH_6001",
            ErrorCode::Ops8001CleanupFailed => "OPS_8001",
        }
    }

    /// HTTP status the wire layer maps this code to.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::Generation5002Busy => 429,
            ErrorCode::Auth6001Unauthorized => 401,
            _ => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire_str())
    }
}

#[derive(thiserror::Error, Debug)]
#[error("[{code}] {message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        AppError {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(code: ErrorCode, message: impl Into<String>, source: anyhow::Error) -> Self {
        AppError {
            code,
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    pub fn busy() -> Self {
        AppError::new(ErrorCode::Generation5002Busy, "generation already in progress")
    }
}

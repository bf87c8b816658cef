//! Failure taxonomy shared by the transport, the sources and the facade.
//!
//! Every failure maps onto exactly one [`FailureKind`]. Only
//! [`FailureKind::Transient`] failures are retried by the transport or trigger
//! the synthetic fallback; everything else reaches the caller untouched.

use thiserror::Error;

/// Coarse classification that drives retry and fallback decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, dropped connection, 5xx. Eligible for retry and fallback.
    Transient,
    /// 4xx (other than auth), malformed response, invalid input.
    Permanent,
    /// 401 / 403.
    AuthFailure,
    /// Business-rule violation (`AlreadyActive`, `NoActiveSession`).
    DomainConflict,
}

/// What the UI collaborator should tell the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    NoConnectivity,
    ServerError,
    Rejected,
    Unauthorized,
    BusinessRule,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoConnectivity => write!(f, "no connectivity"),
            Self::ServerError => write!(f, "server error"),
            Self::Rejected => write!(f, "request rejected"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::BusinessRule => write!(f, "business rule violation"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("authentication failed ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("invalid goal: {0}")]
    InvalidGoal(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("a session is already active")]
    AlreadyActive,

    #[error("no active session")]
    NoActiveSession,
}

impl ApiError {
    /// Classify an HTTP status that was not a success.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status, message },
            s if s >= 500 => Self::Server { status, message },
            _ => Self::Rejected { status, message },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } | Self::Network(_) | Self::Server { .. } => FailureKind::Transient,
            Self::Unauthorized { .. } => FailureKind::AuthFailure,
            Self::AlreadyActive | Self::NoActiveSession => FailureKind::DomainConflict,
            Self::Rejected { .. } | Self::Decode(_) | Self::InvalidGoal(_) | Self::Config(_) => {
                FailureKind::Permanent
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::Transient
    }

    /// HTTP status carried by the failure, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. }
            | Self::Unauthorized { status, .. }
            | Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Timeout { .. } | Self::Network(_) => FailureCategory::NoConnectivity,
            Self::Server { .. } | Self::Decode(_) => FailureCategory::ServerError,
            Self::Unauthorized { .. } => FailureCategory::Unauthorized,
            Self::AlreadyActive | Self::NoActiveSession => FailureCategory::BusinessRule,
            Self::Rejected { .. } | Self::InvalidGoal(_) | Self::Config(_) => {
                FailureCategory::Rejected
            }
        }
    }
}

use serde::Serialize;

/// How a single upstream call failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorKind {
    /// The request never reached the server (DNS, refused, connect timeout).
    Connect,
    /// The request was sent but no complete response arrived in time.
    Timeout,
    /// The server answered with a non-success HTTP status.
    Status(u16),
    /// The response body could not be decoded.
    Decode,
    /// The response exceeded the caller's size limit.
    TooLarge,
}

/// Failure of one call against the Jenkins API.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    /// Human-readable description of the call, e.g. `trigger_job(deploy)`.
    pub operation: String,
    pub message: String,
}

impl UpstreamError {
    pub fn new(
        kind: UpstreamErrorKind,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self.kind {
            UpstreamErrorKind::Status(code) => Some(code),
            _ => None,
        }
    }

    /// Connection failures, timeouts and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            UpstreamErrorKind::Connect | UpstreamErrorKind::Timeout => true,
            UpstreamErrorKind::Status(code) => code >= 500,
            UpstreamErrorKind::Decode | UpstreamErrorKind::TooLarge => false,
        }
    }

    /// Failures after which a non-idempotent call is known not to have been
    /// applied: the request never left this process, or the server refused
    /// it up front with 503.
    pub fn is_known_unapplied(&self) -> bool {
        matches!(
            self.kind,
            UpstreamErrorKind::Connect | UpstreamErrorKind::Status(503)
        )
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Upstream call {operation} failed after {attempts} attempt(s): {message}")]
    TransientUpstream {
        operation: String,
        attempts: u32,
        message: String,
    },

    #[error("Upstream rejected {operation}: {message}")]
    PermanentUpstream {
        operation: String,
        status: Option<u16>,
        attempts: u32,
        message: String,
    },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Batch operation '{0}' not found")]
    OperationNotFound(String),

    #[error("Cache misconfiguration: {0}")]
    CacheMisconfiguration(String),
}

impl AppError {
    /// Classify a final upstream failure, keeping the number of attempts made.
    pub fn from_upstream(err: UpstreamError, attempts: u32) -> Self {
        if err.is_transient() {
            Self::TransientUpstream {
                operation: err.operation,
                attempts,
                message: err.message,
            }
        } else {
            Self::PermanentUpstream {
                status: err.status(),
                operation: err.operation,
                attempts,
                message: err.message,
            }
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable machine-readable name used in tool error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientUpstream { .. } => "transient_upstream_error",
            Self::PermanentUpstream { .. } => "permanent_upstream_error",
            Self::Validation(_) => "validation_error",
            Self::OperationNotFound(_) => "operation_not_found",
            Self::CacheMisconfiguration(_) => "cache_misconfiguration",
        }
    }

    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::TransientUpstream { attempts, .. } | Self::PermanentUpstream { attempts, .. } => {
                Some(*attempts)
            }
            _ => None,
        }
    }
}

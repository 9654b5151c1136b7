use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// Connect/timeout failures, 5xx and 429 answers. Retried with backoff,
    /// then left for the next sweep.
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// The panel refused our session twice in a row.
    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("Panel rejected request ({status}): {message}")]
    PanelRejected { status: u16, message: String },

    #[error("Payment gateway rejected request ({status}): {message}")]
    GatewayRejected { status: u16, message: String },

    #[error("Unrecognized gateway status: {0}")]
    UnknownGatewayStatus(String),

    /// The idempotency key already has a ledger entry. Expected under retries.
    #[error("Credit already applied for {0}")]
    DuplicateCredit(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether a retry with backoff can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientNetwork(_))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::TransientNetwork(_) => ErrorCode::TransientNetwork,
            AppError::Auth(_) => ErrorCode::AuthFailed,
            AppError::PanelRejected { .. } => ErrorCode::PanelRejected,
            AppError::GatewayRejected { .. } => ErrorCode::GatewayRejected,
            AppError::UnknownGatewayStatus(_) => ErrorCode::UnknownGatewayStatus,
            AppError::DuplicateCredit(_) => ErrorCode::DuplicateCredit,
            AppError::InvariantViolation(_) => ErrorCode::InvariantViolation,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::InvalidInput(_) => ErrorCode::InvalidInput,
            AppError::NotFound => ErrorCode::NotFound,
            AppError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    TransientNetwork,
    AuthFailed,
    PanelRejected,
    GatewayRejected,
    UnknownGatewayStatus,
    DuplicateCredit,
    InvariantViolation,
    DatabaseError,
    InvalidInput,
    NotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TransientNetwork => "TRANSIENT_NETWORK",
            ErrorCode::AuthFailed => "AUTH_FAILED",
            ErrorCode::PanelRejected => "PANEL_REJECTED",
            ErrorCode::GatewayRejected => "GATEWAY_REJECTED",
            ErrorCode::UnknownGatewayStatus => "UNKNOWN_GATEWAY_STATUS",
            ErrorCode::DuplicateCredit => "DUPLICATE_CREDIT",
            ErrorCode::InvariantViolation => "INVARIANT_VIOLATION",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type AppResult<T> = Result<T, AppError>;

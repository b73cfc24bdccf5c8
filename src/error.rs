use axum::http::StatusCode;
use thiserror::Error;
use tracing::error;

/// Failures returned by the lot registry and the allocation engine.
///
/// Everything except `Storage` is an expected outcome the caller should show
/// to the user (or retry, for `Conflict`).
#[derive(Debug, Error)]
pub enum ParkingError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("no available spot in lot {0}")]
    NoAvailableSpot(i64),
    #[error("not allowed to {0}")]
    Unauthorized(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type ParkingResult<T> = Result<T, ParkingError>;

impl ParkingError {
    pub fn status(&self) -> StatusCode {
        match self {
            ParkingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ParkingError::NotFound(_) => StatusCode::NOT_FOUND,
            ParkingError::NoAvailableSpot(_) => StatusCode::CONFLICT,
            ParkingError::Unauthorized(_) => StatusCode::FORBIDDEN,
            ParkingError::Conflict(_) => StatusCode::CONFLICT,
            ParkingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ParkingError {
    fn from(e: sqlx::Error) -> Self {
        ParkingError::Storage(e.into())
    }
}

impl From<ParkingError> for (StatusCode, String) {
    fn from(e: ParkingError) -> Self {
        let status = e.status();
        if status.is_server_error() {
            error!(error = ?e, "storage failure");
            return (status, "internal error".into());
        }
        (status, e.to_string())
    }
}

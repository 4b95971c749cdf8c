use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::repository::StoreError;

/// Outcome taxonomy shared by every booking operation. Messages name the
/// seat or product line at fault and never carry storage internals.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("insufficient stock: {0}")]
    InsufficientStock(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type BookingResult<T> = Result<T, BookingError>;

impl BookingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::Conflict(_) => StatusCode::CONFLICT,
            BookingError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            BookingError::InsufficientStock(_) => StatusCode::CONFLICT,
            BookingError::Unavailable(_) => StatusCode::CONFLICT,
            BookingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, BookingError::Conflict(_))
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SeatConflict(seat_id) => {
                BookingError::Conflict(format!("seat {} changed state concurrently", seat_id))
            }
            StoreError::InsufficientStock(product_id) => {
                BookingError::InsufficientStock(format!("product {}", product_id))
            }
            other => {
                tracing::error!("storage failure: {:?}", other);
                BookingError::Internal("storage failure".to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ApiError {
    success: bool,
    message: String,
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiError {
            success: false,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

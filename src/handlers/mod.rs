use axum::{http::StatusCode, Json};

use crate::models::ErrorResponse;

pub mod ai_tutor;
pub mod diagnostics;
pub mod health;
pub mod learning;

pub use ai_tutor::*;
pub use diagnostics::*;
pub use health::*;
pub use learning::*;

pub fn error_response(status: StatusCode, error: String) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            code: status.as_u16(),
            status: status.to_string(),
            error,
        }),
    )
}

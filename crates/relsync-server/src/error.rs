use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relsync_core::error::{ErrorKind, RelsyncError};

// ---------------------------------------------------------------------------
// Unauthorized sentinel
// ---------------------------------------------------------------------------

/// Carries an explicit 401 through the `anyhow::Error` chain.
#[derive(Debug)]
struct UnauthorizedError(String);

impl std::fmt::Display for UnauthorizedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UnauthorizedError {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self(UnauthorizedError(msg.into()).into())
    }
}

fn status_for(e: &RelsyncError) -> StatusCode {
    match e {
        // Creating a name that already exists is reported as 404.
        RelsyncError::ReleaseExists(_) => StatusCode::NOT_FOUND,
        _ => match e.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::HostIntegration | ErrorKind::DataIntegrity | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(u) = self.0.downcast_ref::<UnauthorizedError>() {
            let body = serde_json::json!({ "error": u.0.clone() });
            return (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
        }

        let Some(e) = self.0.downcast_ref::<RelsyncError>() else {
            let body = serde_json::json!({ "error": self.0.to_string() });
            return (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response();
        };

        let status = status_for(e);
        let body = match e {
            RelsyncError::Validation(issues) => serde_json::json!({ "errors": issues }),
            _ => serde_json::json!({ "error": e.to_string() }),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

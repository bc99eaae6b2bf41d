use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use log::{debug, error, warn};
use serde_json::json;
use thiserror::Error;

// Custom error handling
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Authentication error: {0}")]
    AuthError(String),
    #[error("Authorization error: {0}")]
    ForbiddenError(String),
    #[error("Not found: {0}")]
    NotFoundError(String),
    #[error("Conflict: {0}")]
    ConflictError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// In production the 500 envelope hides backend detail; everywhere else the
/// message passes through to ease debugging.
fn is_production() -> bool {
    std::env::var("APP_ENV").map(|v| v == "production").unwrap_or(false)
}

fn server_error_body(msg: &str) -> serde_json::Value {
    if is_production() {
        json!({ "message": "Internal server error" })
    } else {
        json!({ "message": msg })
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::ValidationError(msg) => {
                warn!("\x1B[1;33mVALIDATION ERROR:\x1B[0m {}", msg);
                HttpResponse::BadRequest().json(json!({ "message": msg }))
            },
            ApiError::AuthError(msg) => {
                warn!("\x1B[1;33mAUTHENTICATION ERROR:\x1B[0m {}", msg);
                HttpResponse::Unauthorized().json(json!({
                    "message": msg,
                    "requiresLogin": true
                }))
            },
            ApiError::ForbiddenError(msg) => {
                warn!("\x1B[1;33mAUTHORIZATION ERROR:\x1B[0m {}", msg);
                HttpResponse::Forbidden().json(json!({ "message": msg }))
            },
            ApiError::NotFoundError(msg) => {
                debug!("\x1B[1;36mNOT FOUND ERROR:\x1B[0m {}", msg);
                HttpResponse::NotFound().json(json!({ "message": msg }))
            },
            ApiError::ConflictError(msg) => {
                warn!("\x1B[1;33mCONFLICT ERROR:\x1B[0m {}", msg);
                HttpResponse::Conflict().json(json!({ "message": msg }))
            },
            ApiError::DatabaseError(msg) => {
                error!("\x1B[1;31mDATABASE ERROR:\x1B[0m {}", msg);
                HttpResponse::InternalServerError().json(server_error_body(msg))
            },
            ApiError::InternalError(msg) => {
                error!("\x1B[1;31mINTERNAL SERVER ERROR:\x1B[0m {}", msg);
                HttpResponse::InternalServerError().json(server_error_body(msg))
            },
        }
    }

    fn status_code(&self) -> StatusCode {
        match *self {
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::AuthError(_) => StatusCode::UNAUTHORIZED,
            ApiError::ForbiddenError(_) => StatusCode::FORBIDDEN,
            ApiError::NotFoundError(_) => StatusCode::NOT_FOUND,
            ApiError::ConflictError(_) => StatusCode::CONFLICT,
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(
            ApiError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::AuthError("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::ForbiddenError("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFoundError("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::ConflictError("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::DatabaseError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::InternalError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_web::test]
    async fn auth_errors_carry_the_relogin_hint() {
        let response = ApiError::AuthError("Token has expired. Please login again.".into())
            .error_response();
        let body = to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["message"], "Token has expired. Please login again.");
        assert_eq!(value["requiresLogin"], true);
    }

    #[actix_web::test]
    async fn server_errors_hide_detail_only_in_production() {
        std::env::remove_var("APP_ENV");
        let response = ApiError::DatabaseError("connection reset".into()).error_response();
        let body = to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["message"], "connection reset");

        std::env::set_var("APP_ENV", "production");
        let response = ApiError::DatabaseError("connection reset".into()).error_response();
        let body = to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["message"], "Internal server error");
        std::env::remove_var("APP_ENV");
    }

    #[test]
    fn display_includes_the_detail() {
        let err = ApiError::ConflictError("User with this email already exists".into());
        assert_eq!(
            err.to_string(),
            "Conflict: User with this email already exists"
        );
    }
}

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::error::AdminError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing caller identity")]
    Unauthenticated,

    #[error(transparent)]
    Admin(#[from] AdminError),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "Unauthenticated",
            ApiError::Admin(AdminError::RecordNotFound(_)) => "RecordNotFound",
            ApiError::Admin(AdminError::InvalidArgument(_)) => "InvalidArgument",
            ApiError::Admin(AdminError::RecordAccessNotAllowed(_)) => "RecordAccessNotAllowed",
            ApiError::Admin(AdminError::ConcurrencyConflict { .. }) => "ConcurrencyConflict",
            ApiError::Admin(AdminError::StoreFailure(_)) => "StoreFailure",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Admin(AdminError::RecordNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Admin(AdminError::InvalidArgument(_)) => StatusCode::BAD_REQUEST,
            ApiError::Admin(AdminError::RecordAccessNotAllowed(_)) => StatusCode::FORBIDDEN,
            ApiError::Admin(AdminError::ConcurrencyConflict { .. }) => StatusCode::CONFLICT,
            ApiError::Admin(AdminError::StoreFailure(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };

        HttpResponse::build(status).json(ErrorBody {
            error: self.kind(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (AdminError::not_found("ENTERPRISE#x").into(), StatusCode::NOT_FOUND),
            (AdminError::invalid("limit").into(), StatusCode::BAD_REQUEST),
            (
                AdminError::RecordAccessNotAllowed("admin only".into()).into(),
                StatusCode::FORBIDDEN,
            ),
            (
                AdminError::ConcurrencyConflict {
                    id: "x".into(),
                    expected: 1,
                    actual: Some(2),
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (
                AdminError::store(anyhow::anyhow!("node down")).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.status_code(), status);
        }
    }

    #[actix_web::test]
    async fn test_store_failure_does_not_leak_detail() {
        let error: ApiError = AdminError::store(anyhow::anyhow!("10.0.0.3:9042 unreachable")).into();
        let response = error.error_response();
        let body = actix_web::body::to_bytes(response.into_body()).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("10.0.0.3"));
        assert!(text.contains("StoreFailure"));
    }
}

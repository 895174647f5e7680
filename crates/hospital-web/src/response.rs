//! 统一响应格式
//!
//! 成功：`{"status": 200, "results": ...}`
//! 失败：`{"status": 400|500, "errors": "...", "kind": "..."}`，HTTP 状态码与 `status` 一致。

use async_trait::async_trait;
use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hospital_core::{ErrorKind, HospitalError};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, warn};

#[derive(Debug, Serialize)]
struct SuccessBody<T> {
    status: u16,
    results: T,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: u16,
    errors: String,
    kind: ErrorKind,
}

/// 成功响应
#[derive(Debug)]
pub struct ApiResponse<T>(pub T);

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = SuccessBody {
            status: StatusCode::OK.as_u16(),
            results: self.0,
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

/// 错误响应
#[derive(Debug)]
pub struct ApiError(pub HospitalError);

impl From<HospitalError> for ApiError {
    fn from(error: HospitalError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = if kind.is_client_error() {
            warn!("Request rejected ({:?}): {}", kind, self.0);
            StatusCode::BAD_REQUEST
        } else {
            error!("Request failed: {}", self.0);
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let body = ErrorBody {
            status: status.as_u16(),
            errors: self.0.message(),
            kind,
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<ApiResponse<T>, ApiError>;

/// JSON 请求体，解析失败统一映射为 `InvalidInput`
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError(HospitalError::invalid_input(rejection.body_text()))),
        }
    }
}

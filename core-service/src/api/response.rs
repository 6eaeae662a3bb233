//! JSON error responses.
//!
//! Every failed request gets `{"error": <code>, "message": <text>}` with a
//! status derived from the domain error.

use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bridge_traits::BridgeError;
use core_behavior::BehaviorError;
use core_delivery::range::unsatisfiable_content_range;
use core_delivery::DeliveryError;
use serde_json::json;
use tracing::{error, warn};

/// An error ready to be sent to the client.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    headers: Vec<(HeaderName, String)>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            headers: Vec::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    pub fn with_header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

impl From<DeliveryError> for ApiError {
    fn from(err: DeliveryError) -> Self {
        if err.is_not_found() {
            return ApiError::not_found(err.to_string());
        }
        match err {
            DeliveryError::RangeNotSatisfiable { file_size } => ApiError::new(
                StatusCode::RANGE_NOT_SATISFIABLE,
                "range_not_satisfiable",
                format!("Requested range not satisfiable for {} bytes", file_size),
            )
            .with_header(header::CONTENT_RANGE, unsatisfiable_content_range(file_size))
            .with_header(header::ACCEPT_RANGES, "bytes"),
            DeliveryError::InvalidContext(message) => ApiError::bad_request(message),
            DeliveryError::Timeout(message) => ApiError::new(StatusCode::GATEWAY_TIMEOUT, "timeout", message),
            DeliveryError::Storage(BridgeError::NotAvailable(message)) => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
            }
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<BehaviorError> for ApiError {
    fn from(err: BehaviorError) -> Self {
        match err {
            BehaviorError::InvalidEvent(message) => ApiError::bad_request(message),
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, code = self.code, message = %self.message, "Request failed");
        } else {
            warn!(status = %self.status, code = self.code, message = %self.message, "Request rejected");
        }

        let body = Json(json!({
            "error": self.code,
            "message": self.message,
        }));
        let mut response = (self.status, body).into_response();
        for (name, value) in self.headers {
            if let Ok(value) = HeaderValue::from_str(&value) {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

//! Error handling middleware and error-to-response conversion.
//!
//! [`AppError`] values become JSON [`ErrorResponse`] bodies here. Rejections
//! raised by axum extractors and plain-text errors from the router (unknown
//! routes, wrong methods) are normalized into the same shape.

use axum::{
    Json,
    body::{Bytes, to_bytes},
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::RequestId;
use crate::api::dto::ErrorResponse;
use crate::error::AppError;

/// Upper bound on an error body the global handler will buffer.
const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error_to_response_with_request_id(self, None)
    }
}

/// Converts an extractor JSON rejection into a 400 response.
pub fn handle_json_rejection(rejection: JsonRejection) -> Response {
    let error_response = match rejection {
        JsonRejection::JsonDataError(err) => ErrorResponse::new("INVALID_JSON", "Invalid JSON format")
            .with_details(json!({ "error": err.body_text() })),
        JsonRejection::JsonSyntaxError(err) => ErrorResponse::new("JSON_SYNTAX_ERROR", "JSON syntax error")
            .with_details(json!({ "error": err.body_text() })),
        JsonRejection::MissingJsonContentType(_) => {
            ErrorResponse::new("MISSING_CONTENT_TYPE", "Missing or invalid Content-Type header")
                .with_details(json!({ "expected": "application/json" }))
        }
        JsonRejection::BytesRejection(_) => ErrorResponse::new("REQUEST_TOO_LARGE", "Request body too large"),
        _ => ErrorResponse::new("JSON_ERROR", "Failed to parse JSON request"),
    };

    (StatusCode::BAD_REQUEST, Json(error_response)).into_response()
}

/// Converts a path parameter rejection into a 400 response.
pub fn handle_path_rejection(rejection: PathRejection) -> Response {
    let error_response = match rejection {
        PathRejection::FailedToDeserializePathParams(err) => {
            ErrorResponse::new("INVALID_PATH_PARAMETER", "Invalid path parameter")
                .with_details(json!({ "error": err.body_text() }))
        }
        PathRejection::MissingPathParams(_) => {
            ErrorResponse::new("MISSING_PATH_PARAMETER", "Missing required path parameter")
        }
        _ => ErrorResponse::new("PATH_ERROR", "Failed to parse path parameters"),
    };

    (StatusCode::BAD_REQUEST, Json(error_response)).into_response()
}

/// Converts a query string rejection into a 400 response.
pub fn handle_query_rejection(rejection: QueryRejection) -> Response {
    let error_response = match rejection {
        QueryRejection::FailedToDeserializeQueryString(err) => {
            ErrorResponse::new("INVALID_QUERY_PARAMETER", "Invalid query parameter")
                .with_details(json!({ "error": err.body_text() }))
        }
        _ => ErrorResponse::new("QUERY_ERROR", "Failed to parse query parameters"),
    };

    (StatusCode::BAD_REQUEST, Json(error_response)).into_response()
}

/// Middleware that gives every error response the standard JSON shape.
///
/// JSON error bodies produced by handlers pass through with the request ID
/// filled in. Anything else (router 404/405, plain-text rejections) is
/// rebuilt from its status code and original text.
pub async fn global_error_handler(request: axum::extract::Request, next: axum::middleware::Next) -> Response {
    let request_id = request.extensions().get::<RequestId>().map(|id| id.0.clone());
    let response = next.run(request).await;

    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"));

    let (mut parts, body) = response.into_parts();
    let body_bytes = to_bytes(body, MAX_ERROR_BODY_BYTES)
        .await
        .unwrap_or_else(|_| Bytes::new());

    let parsed = if is_json {
        serde_json::from_slice::<ErrorResponse>(&body_bytes).ok()
    } else {
        None
    };
    let mut error_response = parsed.unwrap_or_else(|| {
        let original = String::from_utf8_lossy(&body_bytes).trim().to_string();
        status_to_error_response(status, original)
    });

    if error_response.request_id.is_none() {
        if let Some(id) = request_id.as_deref() {
            error_response = error_response.with_request_id(id);
        }
    }

    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.remove(header::CONTENT_TYPE);
    let mut rebuilt = (status, Json(error_response)).into_response();
    for (name, value) in parts.headers.iter() {
        rebuilt.headers_mut().entry(name).or_insert_with(|| value.clone());
    }
    rebuilt
}

fn status_to_error_response(status: StatusCode, original: String) -> ErrorResponse {
    let (code, fallback) = match status {
        StatusCode::BAD_REQUEST => ("BAD_REQUEST", "Bad request - invalid or malformed request"),
        StatusCode::NOT_FOUND => ("NOT_FOUND", "The requested resource was not found"),
        StatusCode::METHOD_NOT_ALLOWED => ("METHOD_NOT_ALLOWED", "HTTP method not allowed for this endpoint"),
        StatusCode::UNSUPPORTED_MEDIA_TYPE => ("UNSUPPORTED_MEDIA_TYPE", "Unsupported media type"),
        StatusCode::REQUEST_TIMEOUT => ("REQUEST_TIMEOUT", "Request timeout"),
        StatusCode::PAYLOAD_TOO_LARGE => ("PAYLOAD_TOO_LARGE", "Request payload too large"),
        StatusCode::SERVICE_UNAVAILABLE => ("SERVICE_UNAVAILABLE", "Service temporarily unavailable"),
        StatusCode::INTERNAL_SERVER_ERROR => {
            // Never echo server-side text to the client.
            return ErrorResponse::new("INTERNAL_SERVER_ERROR", "An internal server error occurred");
        }
        _ => ("UNKNOWN_ERROR", "An unknown error occurred"),
    };
    if original.is_empty() {
        ErrorResponse::new(code, fallback)
    } else {
        ErrorResponse::new(code, original)
    }
}

/// HTTP status for an application error.
pub fn error_to_status_code(error: &AppError) -> StatusCode {
    match error {
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        AppError::Duplicate { .. } | AppError::OneToOneDeleteConflict { .. } | AppError::StaleRecord { .. } => {
            StatusCode::CONFLICT
        }
        AppError::Validation { .. } | AppError::ValidationErrors { .. } | AppError::BadRequest { .. } => {
            StatusCode::BAD_REQUEST
        }
        AppError::Cancelled { .. } | AppError::ConnectionPool { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AppError::AmbiguousResult { .. }
        | AppError::UnknownNavigation { .. }
        | AppError::Database { .. }
        | AppError::Configuration { .. }
        | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Stable machine-readable code for an application error.
pub fn error_to_code(error: &AppError) -> &'static str {
    match error {
        AppError::NotFound { .. } => "NOT_FOUND",
        AppError::Duplicate { .. } => "DUPLICATE_ENTRY",
        AppError::OneToOneDeleteConflict { .. } => "ONE_TO_ONE_DELETE_CONFLICT",
        AppError::StaleRecord { .. } => "STALE_RECORD",
        AppError::AmbiguousResult { .. } => "AMBIGUOUS_RESULT",
        AppError::UnknownNavigation { .. } => "UNKNOWN_NAVIGATION",
        AppError::Validation { .. } | AppError::ValidationErrors { .. } => "VALIDATION_ERROR",
        AppError::BadRequest { .. } => "BAD_REQUEST",
        AppError::Cancelled { .. } => "CANCELLED",
        AppError::Database { .. } => "DATABASE_ERROR",
        AppError::Configuration { .. } => "CONFIGURATION_ERROR",
        AppError::ConnectionPool { .. } => "SERVICE_UNAVAILABLE",
        AppError::Internal { .. } => "INTERNAL_ERROR",
    }
}

/// Builds the error response, logging server-side failures with their source
/// chain and keeping that detail out of the body.
pub fn error_to_response_with_request_id(error: AppError, request_id: Option<String>) -> Response {
    let status = error_to_status_code(&error);
    let code = error_to_code(&error);

    let mut error_response = match &error {
        AppError::NotFound { entity, field, value } | AppError::Duplicate { entity, field, value } => {
            ErrorResponse::new(code, error.to_string())
                .with_details(json!({ "entity": entity, "field": field, "value": value }))
        }
        AppError::OneToOneDeleteConflict { entity, relationship } => {
            ErrorResponse::new(code, error.to_string())
                .with_details(json!({ "entity": entity, "relationship": relationship }))
        }
        AppError::StaleRecord { entity, key } => {
            ErrorResponse::new(code, error.to_string()).with_details(json!({ "entity": entity, "key": key }))
        }
        AppError::Validation { field, reason } => {
            ErrorResponse::new(code, error.to_string()).with_details(json!({ "field": field, "reason": reason }))
        }
        AppError::ValidationErrors { errors } => {
            ErrorResponse::new(code, error.to_string()).with_details(json!({ "errors": errors }))
        }
        AppError::BadRequest { .. } | AppError::Cancelled { .. } => ErrorResponse::new(code, error.to_string()),
        AppError::AmbiguousResult { .. } | AppError::UnknownNavigation { .. } => {
            tracing::error!(error = %error, "Repository misuse");
            ErrorResponse::new(code, "An internal error occurred")
        }
        AppError::Database { operation, source } => {
            tracing::error!(operation = %operation, error = ?source, "Database error");
            ErrorResponse::new(code, "A database error occurred")
        }
        AppError::Configuration { key, source } => {
            tracing::error!(key = %key, error = ?source, "Configuration error");
            ErrorResponse::new(code, "A configuration error occurred")
        }
        AppError::ConnectionPool { source } => {
            tracing::error!(error = ?source, "Connection pool error");
            ErrorResponse::new(code, "Service temporarily unavailable")
        }
        AppError::Internal { source } => {
            tracing::error!(error = ?source, "Internal error");
            ErrorResponse::new(code, "An internal error occurred")
        }
    };

    if let Some(id) = request_id {
        error_response = error_response.with_request_id(&id);
    }

    (status, Json(error_response)).into_response()
}

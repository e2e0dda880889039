use crate::api::middleware::{handle_json_rejection, handle_path_rejection, handle_query_rejection};
use crate::error::AppError;
use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use validator::Validate;

/// JSON body extractor that runs `validator` rules after deserializing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(handle_json_rejection)?;
        value
            .validate()
            .map_err(|errors| AppError::from(errors).into_response())?;
        Ok(ValidatedJson(value))
    }
}

/// Query string extractor that runs `validator` rules after deserializing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(handle_query_rejection)?;
        value
            .validate()
            .map_err(|errors| AppError::from(errors).into_response())?;
        Ok(ValidatedQuery(value))
    }
}

/// Path extractor whose parse failures use the JSON error format.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidatedPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(handle_path_rejection)?;
        Ok(ValidatedPath(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, StatusCode, header};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct TestBody {
        #[validate(length(min = 3, max = 20, message = "Username must be between 3 and 20 characters"))]
        username: String,
        #[validate(email(message = "Invalid email format"))]
        email: String,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct TestQuery {
        #[validate(range(min = 1, max = 50, message = "Limit must be between 1 and 50"))]
        limit: u32,
    }

    fn json_request(body: &str) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri("/test")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn error_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_valid_json() {
        let request = json_request(r#"{"username":"testuser","email":"test@example.com"}"#);
        let ValidatedJson(body) = ValidatedJson::<TestBody>::from_request(request, &())
            .await
            .unwrap();
        assert_eq!(body.username, "testuser");
        assert_eq!(body.email, "test@example.com");
    }

    #[tokio::test]
    async fn test_json_validation_failure_lists_fields() {
        let request = json_request(r#"{"username":"ab","email":"invalid"}"#);
        let response = ValidatedJson::<TestBody>::from_request(request, &())
            .await
            .unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = error_body(response).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");
        let errors = body["details"]["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0]["field"], "email");
        assert_eq!(errors[1]["field"], "username");
    }

    #[tokio::test]
    async fn test_json_syntax_error() {
        let request = json_request(r#"{"username":"#);
        let response = ValidatedJson::<TestBody>::from_request(request, &())
            .await
            .unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(response).await["code"], "JSON_SYNTAX_ERROR");
    }

    #[tokio::test]
    async fn test_missing_content_type() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/test")
            .body(Body::from(r#"{"username":"testuser","email":"test@example.com"}"#))
            .unwrap();
        let response = ValidatedJson::<TestBody>::from_request(request, &())
            .await
            .unwrap_err();
        assert_eq!(error_body(response).await["code"], "MISSING_CONTENT_TYPE");
    }

    #[tokio::test]
    async fn test_query_validation() {
        let (mut parts, _) = Request::get("/test?limit=10").body(()).unwrap().into_parts();
        let ValidatedQuery(query) = ValidatedQuery::<TestQuery>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(query.limit, 10);

        let (mut parts, _) = Request::get("/test?limit=99").body(()).unwrap().into_parts();
        let response = ValidatedQuery::<TestQuery>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(error_body(response).await["details"]["errors"][0]["field"], "limit");

        let (mut parts, _) = Request::get("/test?limit=abc").body(()).unwrap().into_parts();
        let response = ValidatedQuery::<TestQuery>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(error_body(response).await["code"], "INVALID_QUERY_PARAMETER");
    }
}

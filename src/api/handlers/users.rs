//! User CRUD request handlers.

use crate::api::doc::USER_TAG;
use crate::api::dto::{
    CreateUserRequest, DeleteUserParams, ErrorResponse, PagedResponse, PaginationParams,
    UpdateUserRequest, UserResponse,
};
use crate::error::AppResult;
use crate::state::AppState;
use crate::utils::validate::{ValidatedJson, ValidatedPath, ValidatedQuery};
use axum::{Json, extract::State, http::StatusCode};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use uuid::Uuid;

/// Creates user-related routes.
pub fn user_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_users))
        .routes(routes!(create_user))
        .routes(routes!(get_user))
        .routes(routes!(update_user))
        .routes(routes!(delete_user))
}

/// GET /api/users - List users by page, soft-deleted ones included
#[utoipa::path(
    get,
    path = "/",
    tag = USER_TAG,
    params(PaginationParams),
    responses(
        (status = 200, description = "One page of users", body = PagedResponse<UserResponse>),
        (status = 400, description = "Invalid pagination parameters", body = ErrorResponse)
    )
)]
async fn list_users(
    State(state): State<AppState>,
    ValidatedQuery(params): ValidatedQuery<PaginationParams>,
) -> AppResult<Json<PagedResponse<UserResponse>>> {
    let page = state
        .services
        .users
        .list_users(params.page_index, params.page_size)
        .await?;
    Ok(Json(PagedResponse::from_page(page, UserResponse::from)))
}

/// POST /api/users - Create a new user
#[utoipa::path(
    post,
    path = "/",
    tag = USER_TAG,
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    )
)]
async fn create_user(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    let user = state.services.users.create_user(req.into_new_user()).await?;
    Ok(Json(UserResponse::from(user)))
}

/// GET /api/users/:id - Get a live user by ID
#[utoipa::path(
    get,
    path = "/{id}",
    tag = USER_TAG,
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
async fn get_user(
    State(state): State<AppState>,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> AppResult<Json<UserResponse>> {
    let user = state.services.users.get_user(id).await?;
    Ok(Json(UserResponse::from(user)))
}

/// PUT /api/users/:id - Update a live user
#[utoipa::path(
    put,
    path = "/{id}",
    tag = USER_TAG,
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
async fn update_user(
    State(state): State<AppState>,
    ValidatedPath(id): ValidatedPath<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    let user = state
        .services
        .users
        .update_user(id, req.into_update_user())
        .await?;
    Ok(Json(UserResponse::from(user)))
}

/// DELETE /api/users/:id - Soft delete a user, or remove it with `permanent=true`
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = USER_TAG,
    params(
        ("id" = Uuid, Path, description = "User ID"),
        DeleteUserParams
    ),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
async fn delete_user(
    State(state): State<AppState>,
    ValidatedPath(id): ValidatedPath<Uuid>,
    ValidatedQuery(params): ValidatedQuery<DeleteUserParams>,
) -> AppResult<StatusCode> {
    state.services.users.delete_user(id, params.permanent).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::routes::create_router;
    use crate::config::ServerConfig;
    use crate::state::AppState;
    use crate::store::{MemoryStore, Schema};
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode, header};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn app() -> Router {
        let state = AppState::new(
            Arc::new(MemoryStore::new(Schema::new())),
            CancellationToken::new(),
        );
        create_router(state, &ServerConfig::default())
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create(app: &Router, name: &str) -> Value {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/users",
            Some(json!({ "name": name, "email": format!("{}@x.com", name.to_lowercase()) })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let app = app();
        let ada = create(&app, "Ada").await;
        assert_eq!(ada["name"], "Ada");

        let (status, page) = send(&app, Method::GET, "/api/users", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["index"], 0);
        assert_eq!(page["size"], 5);
        assert_eq!(page["count"], 1);
        assert_eq!(page["items"][0]["id"], ada["id"]);
    }

    #[tokio::test]
    async fn test_list_pagination_params() {
        let app = app();
        for name in ["Ada", "Grace", "Linus"] {
            create(&app, name).await;
        }

        let (status, page) = send(&app, Method::GET, "/api/users?page_index=1&page_size=2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["pages"], 2);
        assert_eq!(page["has_previous"], true);
        assert_eq!(page["has_next"], false);
        assert_eq!(page["items"].as_array().unwrap().len(), 1);

        let (status, body) = send(&app, Method::GET, "/api/users?page_size=500", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_body() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/users",
            Some(json!({ "name": "", "email": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["request_id"].is_string());
    }

    #[tokio::test]
    async fn test_get_and_update() {
        let app = app();
        let ada = create(&app, "Ada").await;
        let uri = format!("/api/users/{}", ada["id"].as_str().unwrap());

        let (status, body) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "ada@x.com");

        let (status, body) = send(&app, Method::PUT, &uri, Some(json!({ "name": "Ada Lovelace" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Ada Lovelace");
        assert_eq!(body["email"], "ada@x.com");
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ids() {
        let app = app();
        let uri = format!("/api/users/{}", uuid::Uuid::new_v4());
        let (status, body) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (status, body) = send(&app, Method::GET, "/api/users/42", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_PATH_PARAMETER");
    }

    #[tokio::test]
    async fn test_soft_then_permanent_delete() {
        let app = app();
        let ada = create(&app, "Ada").await;
        let uri = format!("/api/users/{}", ada["id"].as_str().unwrap());

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Soft-deleted users stay listed.
        let (_, page) = send(&app, Method::GET, "/api/users", None).await;
        assert_eq!(page["count"], 1);

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::DELETE, &format!("{}?permanent=true", uri), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, page) = send(&app, Method::GET, "/api/users", None).await;
        assert_eq!(page["count"], 0);
    }
}

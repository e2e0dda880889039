//! User-related DTOs for API requests and responses.

use crate::models::{NewUser, UpdateUser, User};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// ============================================================================
// Request DTOs
// ============================================================================

/// Request body for creating a new user.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    #[schema(min_length = 1, max_length = 255, example = "Ada")]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    #[schema(format = "email", example = "ada@example.com")]
    pub email: String,
    /// Client platform the user signed up from
    #[validate(length(max = 64, message = "Platform must be at most 64 characters"))]
    #[schema(max_length = 64, example = "web")]
    pub platform: Option<String>,
}

impl CreateUserRequest {
    pub fn into_new_user(self) -> NewUser {
        NewUser {
            name: self.name,
            email: self.email,
            platform: self.platform,
        }
    }
}

/// Request body for updating a user; absent fields are left unchanged.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    #[schema(format = "email")]
    pub email: Option<String>,
    #[validate(length(max = 64, message = "Platform must be at most 64 characters"))]
    pub platform: Option<String>,
}

impl UpdateUserRequest {
    pub fn into_update_user(self) -> UpdateUser {
        UpdateUser {
            name: self.name,
            email: self.email,
            platform: self.platform,
        }
    }
}

/// Query string of `DELETE /api/users/{id}`.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams, Validate)]
pub struct DeleteUserParams {
    /// Remove the row instead of stamping it as deleted
    #[serde(default)]
    pub permanent: bool,
}

// ============================================================================
// Response DTOs
// ============================================================================

/// Public view of a user.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

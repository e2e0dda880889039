//! Data Transfer Objects for API requests and responses.
//!
//! DTOs are organized by domain:
//! - `user` - User-related request/response DTOs
//! - `error` - Common error response DTOs
//! - `health` - Health check responses
//! - `pagination` - Pagination-related DTOs

mod error;
mod health;
mod pagination;
mod user;

pub use error::ErrorResponse;
pub use health::{ComponentHealth, HealthResponse, HealthStatus};
pub use pagination::{PagedResponse, PaginationParams};
pub use user::{CreateUserRequest, DeleteUserParams, UpdateUserRequest, UserResponse};

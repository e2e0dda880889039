mod entity;
mod user;

pub use entity::{Audit, CREATED_AT, DELETED_AT, DELETED_BY, Entity, UPDATED_AT};
pub use user::{NewUser, UpdateUser, User};

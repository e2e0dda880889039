use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Audit;

/// User record as stored in the `users` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(flatten)]
    pub audit: Audit,
}

crate::impl_entity!(User, Uuid, "users");

/// Data needed to create a user; the id and audit stamps are assigned on insert.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub platform: Option<String>,
}

impl NewUser {
    /// Builds the entity with a fresh v4 id.
    pub fn into_user(self) -> User {
        User {
            id: Uuid::new_v4(),
            name: self.name,
            email: self.email,
            platform: self.platform,
            audit: Audit::new(),
        }
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub platform: Option<String>,
}

impl UpdateUser {
    pub fn apply_to(self, user: &mut User) {
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(platform) = self.platform {
            user.platform = Some(platform);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Entity;

    #[test]
    fn test_new_user_gets_unique_ids() {
        let new_user = NewUser {
            name: "Ada".to_string(),
            email: "ada@x.com".to_string(),
            platform: None,
        };
        let a = new_user.clone().into_user();
        let b = new_user.into_user();
        assert_ne!(a.id, b.id);
        assert!(!a.is_deleted());
    }

    #[test]
    fn test_update_user_only_touches_set_fields() {
        let mut user = NewUser {
            name: "Ada".to_string(),
            email: "ada@x.com".to_string(),
            platform: Some("web".to_string()),
        }
        .into_user();

        UpdateUser {
            email: Some("ada@lovelace.dev".to_string()),
            ..Default::default()
        }
        .apply_to(&mut user);

        assert_eq!(user.name, "Ada");
        assert_eq!(user.email, "ada@lovelace.dev");
        assert_eq!(user.platform.as_deref(), Some("web"));
    }

    #[test]
    fn test_user_collection_name() {
        assert_eq!(User::COLLECTION, "users");
    }
}

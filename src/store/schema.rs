//! Relationship metadata exposed by a store.
//!
//! Rust has no runtime reflection over entity graphs, so relationships are
//! registered once when the store is built. The cascading soft delete walks
//! this table to discover which dependents to visit.

use std::fmt;

/// What happens to dependents when their principal is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteBehavior {
    /// Store deletes dependents (FK `ON DELETE CASCADE`)
    Cascade,
    /// Dependents are deleted by the client only; the store does nothing
    ClientCascade,
    /// Store nulls the foreign key
    SetNull,
    /// Client nulls the foreign key; the store does nothing
    ClientSetNull,
    /// Store rejects the delete while dependents exist
    Restrict,
    NoAction,
}

impl DeleteBehavior {
    /// Whether a soft delete of the principal should propagate.
    pub fn cascades(self) -> bool {
        matches!(self, DeleteBehavior::Cascade | DeleteBehavior::ClientCascade)
    }
}

/// Shape of the principal-to-dependent side of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToMany,
    OneToOne,
}

/// A foreign key from `dependent.foreign_key` to `principal.principal_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub principal: &'static str,
    pub dependent: &'static str,
    pub foreign_key: &'static str,
    pub principal_key: &'static str,
    /// Key column of the dependent collection
    pub dependent_key: &'static str,
    /// Navigation on the principal pointing at its dependents
    pub navigation: Option<&'static str>,
    /// Navigation on the dependent pointing back at its principal
    pub inverse: Option<&'static str>,
    pub cardinality: Cardinality,
    pub on_delete: DeleteBehavior,
    /// Dependent lifecycle is bound to the principal and managed by the store
    pub owned: bool,
}

impl Relationship {
    pub fn one_to_many(
        principal: &'static str,
        dependent: &'static str,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            principal,
            dependent,
            foreign_key,
            principal_key: "id",
            dependent_key: "id",
            navigation: None,
            inverse: None,
            cardinality: Cardinality::OneToMany,
            on_delete: DeleteBehavior::Cascade,
            owned: false,
        }
    }

    pub fn one_to_one(
        principal: &'static str,
        dependent: &'static str,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            cardinality: Cardinality::OneToOne,
            ..Self::one_to_many(principal, dependent, foreign_key)
        }
    }

    pub fn navigation(mut self, name: &'static str) -> Self {
        self.navigation = Some(name);
        self
    }

    pub fn inverse(mut self, name: &'static str) -> Self {
        self.inverse = Some(name);
        self
    }

    pub fn principal_key(mut self, column: &'static str) -> Self {
        self.principal_key = column;
        self
    }

    pub fn dependent_key(mut self, column: &'static str) -> Self {
        self.dependent_key = column;
        self
    }

    pub fn on_delete(mut self, behavior: DeleteBehavior) -> Self {
        self.on_delete = behavior;
        self
    }

    pub fn owned(mut self) -> Self {
        self.owned = true;
        self
    }

    /// Strict one-to-one: neither side navigates to a collection.
    pub fn is_one_to_one(&self) -> bool {
        self.cardinality == Cardinality::OneToOne
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.dependent, self.foreign_key, self.principal, self.principal_key
        )
    }
}

/// Which way a navigation points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationSide {
    /// Principal to dependents
    Dependents,
    /// Dependent to its principal
    Principal,
}

/// A named navigation resolved against the schema.
#[derive(Debug, Clone, Copy)]
pub struct Navigation<'a> {
    pub name: &'static str,
    pub relationship: &'a Relationship,
    pub side: NavigationSide,
}

impl<'a> Navigation<'a> {
    /// Collection the navigation starts from.
    pub fn source(&self) -> &'static str {
        match self.side {
            NavigationSide::Dependents => self.relationship.principal,
            NavigationSide::Principal => self.relationship.dependent,
        }
    }

    /// Collection the navigation lands on.
    pub fn target(&self) -> &'static str {
        match self.side {
            NavigationSide::Dependents => self.relationship.dependent,
            NavigationSide::Principal => self.relationship.principal,
        }
    }

    /// Column read on the source row to find related rows.
    pub fn source_column(&self) -> &'static str {
        match self.side {
            NavigationSide::Dependents => self.relationship.principal_key,
            NavigationSide::Principal => self.relationship.foreign_key,
        }
    }

    /// Column matched on the target rows.
    pub fn target_column(&self) -> &'static str {
        match self.side {
            NavigationSide::Dependents => self.relationship.foreign_key,
            NavigationSide::Principal => self.relationship.principal_key,
        }
    }

    /// Key column of the target collection.
    pub fn target_key(&self) -> &'static str {
        match self.side {
            NavigationSide::Dependents => self.relationship.dependent_key,
            NavigationSide::Principal => self.relationship.principal_key,
        }
    }

    pub fn is_collection(&self) -> bool {
        self.side == NavigationSide::Dependents
            && self.relationship.cardinality == Cardinality::OneToMany
    }
}

/// Relationship registry for every collection a store serves.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    relationships: Vec<Relationship>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Relationships in which `collection` is the principal.
    pub fn dependents_of<'a>(&'a self, collection: &'a str) -> impl Iterator<Item = &'a Relationship> {
        self.relationships
            .iter()
            .filter(move |relationship| relationship.principal == collection)
    }

    /// Navigations a soft delete of `collection` must follow: cascading,
    /// not owned, and reachable through a named navigation.
    pub fn cascading_navigations<'a>(&'a self, collection: &'a str) -> impl Iterator<Item = Navigation<'a>> {
        self.dependents_of(collection)
            .filter(|relationship| relationship.on_delete.cascades() && !relationship.owned)
            .filter_map(|relationship| {
                relationship.navigation.map(|name| Navigation {
                    name,
                    relationship,
                    side: NavigationSide::Dependents,
                })
            })
    }

    /// One-to-one relationships in which `collection` is the dependent.
    pub fn one_to_one_dependencies<'a>(&'a self, collection: &'a str) -> impl Iterator<Item = &'a Relationship> {
        self.relationships
            .iter()
            .filter(move |relationship| relationship.dependent == collection && relationship.is_one_to_one())
    }

    /// Resolve a navigation name declared on `collection`.
    pub fn navigation(&self, collection: &str, name: &str) -> Option<Navigation<'_>> {
        self.relationships.iter().find_map(|relationship| {
            if relationship.principal == collection && relationship.navigation == Some(name) {
                Some(Navigation {
                    name: relationship.navigation?,
                    relationship,
                    side: NavigationSide::Dependents,
                })
            } else if relationship.dependent == collection && relationship.inverse == Some(name) {
                Some(Navigation {
                    name: relationship.inverse?,
                    relationship,
                    side: NavigationSide::Principal,
                })
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> Schema {
        Schema::new()
            .with(
                Relationship::one_to_many("authors", "books", "author_id")
                    .navigation("books")
                    .inverse("author"),
            )
            .with(
                Relationship::one_to_one("authors", "passports", "author_id")
                    .navigation("passport")
                    .on_delete(DeleteBehavior::ClientCascade),
            )
            .with(
                Relationship::one_to_many("authors", "addresses", "author_id")
                    .navigation("addresses")
                    .owned(),
            )
            .with(
                Relationship::one_to_many("authors", "notes", "author_id")
                    .navigation("notes")
                    .on_delete(DeleteBehavior::Restrict),
            )
            .with(Relationship::one_to_many("authors", "audits", "author_id"))
    }

    #[test]
    fn test_cascading_navigations_skip_owned_restricted_and_unnamed() {
        let schema = library();
        let names: Vec<_> = schema
            .cascading_navigations("authors")
            .map(|navigation| navigation.name)
            .collect();
        assert_eq!(names, vec!["books", "passport"]);
    }

    #[test]
    fn test_one_to_one_dependencies() {
        let schema = library();
        let found: Vec<_> = schema.one_to_one_dependencies("passports").collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].principal, "authors");
        assert_eq!(schema.one_to_one_dependencies("books").count(), 0);
        assert_eq!(schema.one_to_one_dependencies("authors").count(), 0);
    }

    #[test]
    fn test_navigation_resolves_both_sides() {
        let schema = library();

        let books = schema.navigation("authors", "books").unwrap();
        assert_eq!(books.target(), "books");
        assert_eq!(books.source_column(), "id");
        assert_eq!(books.target_column(), "author_id");
        assert_eq!(books.target_key(), "id");
        assert!(books.is_collection());

        let author = schema.navigation("books", "author").unwrap();
        assert_eq!(author.side, NavigationSide::Principal);
        assert_eq!(author.target(), "authors");
        assert_eq!(author.source_column(), "author_id");
        assert_eq!(author.target_column(), "id");
        assert!(!author.is_collection());

        let passport = schema.navigation("authors", "passport").unwrap();
        assert!(!passport.is_collection());

        assert!(schema.navigation("authors", "missing").is_none());
    }

    #[test]
    fn test_relationship_display() {
        let relationship = Relationship::one_to_one("authors", "passports", "author_id");
        assert_eq!(relationship.to_string(), "passports.author_id -> authors.id");
    }
}

use crate::error::AppError;
use crate::store::StoreError;
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};

/// Utility for converting store and database errors to structured AppError variants.
///
/// PostgreSQL reports the table, column and constraint of a violation
/// separately, and the offending key in the detail line
/// (`Key (email)=(a@b.c) already exists.`); both are used to fill in
/// the structured fields.
pub struct DatabaseErrorConverter;

impl DatabaseErrorConverter {
    /// Converts a store error to an appropriate AppError variant.
    ///
    /// # Arguments
    /// * `error` - The store error to convert
    /// * `operation` - Description of the operation that failed
    pub fn convert_store_error(error: StoreError, operation: &str) -> AppError {
        match error {
            StoreError::Conflict { collection, key } => AppError::Duplicate {
                entity: collection,
                field: "id".to_string(),
                value: key,
            },
            StoreError::StaleRecord { collection, key } => AppError::StaleRecord {
                entity: collection,
                key,
            },
            StoreError::Referenced {
                collection,
                key,
                dependent,
            } => AppError::Validation {
                field: "id".to_string(),
                reason: format!(
                    "{} {} is still referenced by {}",
                    collection, key, dependent
                ),
            },
            StoreError::Database(error) => Self::convert_diesel_error(error, operation),
            StoreError::Unavailable { source } => AppError::ConnectionPool { source },
            other => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::new(other),
            },
        }
    }

    /// Converts a Diesel error to an appropriate AppError variant.
    pub fn convert_diesel_error(error: DieselError, operation: &str) -> AppError {
        match error {
            DieselError::DatabaseError(kind, info) => {
                Self::convert_database_error(kind, info.as_ref(), operation)
            }
            DieselError::NotFound => AppError::NotFound {
                entity: "resource".to_string(),
                field: "id".to_string(),
                value: "unknown".to_string(),
            },
            other => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::from(other),
            },
        }
    }

    fn convert_database_error(
        kind: DatabaseErrorKind,
        info: &(dyn DatabaseErrorInformation + Send + Sync),
        operation: &str,
    ) -> AppError {
        let entity = info.table_name().unwrap_or("resource").to_string();
        let detail_key = info.details().and_then(Self::extract_key_value);

        match kind {
            DatabaseErrorKind::UniqueViolation => {
                let (field, value) = detail_key
                    .or_else(|| {
                        info.column_name()
                            .map(|column| (column.to_string(), "unknown".to_string()))
                    })
                    .unwrap_or_else(|| {
                        (
                            info.constraint_name().unwrap_or("unknown").to_string(),
                            "unknown".to_string(),
                        )
                    });
                AppError::Duplicate {
                    entity,
                    field,
                    value,
                }
            }
            DatabaseErrorKind::NotNullViolation => AppError::Validation {
                field: info.column_name().unwrap_or("unknown").to_string(),
                reason: format!("Field is required for {}", entity),
            },
            DatabaseErrorKind::ForeignKeyViolation => match detail_key {
                Some((field, value)) => AppError::Validation {
                    field,
                    reason: format!("Reference to '{}' violates {}", value, Self::constraint(info)),
                },
                None => AppError::Validation {
                    field: info.column_name().unwrap_or("unknown").to_string(),
                    reason: format!("Foreign key violation on {}", Self::constraint(info)),
                },
            },
            DatabaseErrorKind::CheckViolation => AppError::Validation {
                field: info.column_name().unwrap_or("unknown").to_string(),
                reason: format!("Check constraint {} failed", Self::constraint(info)),
            },
            _ => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::msg(format!("Database error: {}", info.message())),
            },
        }
    }

    fn constraint(info: &(dyn DatabaseErrorInformation + Send + Sync)) -> &str {
        info.constraint_name().unwrap_or("constraint")
    }

    /// Extracts `(column, value)` from a detail line such as
    /// `Key (email)=(a@b.c) already exists.`
    pub(crate) fn extract_key_value(detail: &str) -> Option<(String, String)> {
        let rest = &detail[detail.find("Key (")? + 5..];
        let column_end = rest.find(")=(")?;
        let column = &rest[..column_end];
        let rest = &rest[column_end + 3..];
        let value_end = rest.rfind(')')?;
        Some((column.to_string(), rest[..value_end].to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockDatabaseErrorInfo {
        message: String,
        details: Option<String>,
        table: Option<String>,
        column: Option<String>,
        constraint: Option<String>,
    }

    impl MockDatabaseErrorInfo {
        fn new(message: &str) -> Self {
            Self {
                message: message.to_string(),
                details: None,
                table: None,
                column: None,
                constraint: None,
            }
        }
    }

    impl DatabaseErrorInformation for MockDatabaseErrorInfo {
        fn message(&self) -> &str {
            &self.message
        }

        fn details(&self) -> Option<&str> {
            self.details.as_deref()
        }

        fn hint(&self) -> Option<&str> {
            None
        }

        fn table_name(&self) -> Option<&str> {
            self.table.as_deref()
        }

        fn column_name(&self) -> Option<&str> {
            self.column.as_deref()
        }

        fn constraint_name(&self) -> Option<&str> {
            self.constraint.as_deref()
        }

        fn statement_position(&self) -> Option<i32> {
            None
        }
    }

    fn database_error(kind: DatabaseErrorKind, info: MockDatabaseErrorInfo) -> StoreError {
        StoreError::Database(DieselError::DatabaseError(kind, Box::new(info)))
    }

    #[test]
    fn test_convert_unique_violation_reads_detail_line() {
        let mut info = MockDatabaseErrorInfo::new("duplicate key value violates unique constraint");
        info.details = Some("Key (email)=(test@example.com) already exists.".to_string());
        info.table = Some("users".to_string());
        info.constraint = Some("users_email_key".to_string());

        let result = DatabaseErrorConverter::convert_store_error(
            database_error(DatabaseErrorKind::UniqueViolation, info),
            "insert user",
        );

        match result {
            AppError::Duplicate {
                entity,
                field,
                value,
            } => {
                assert_eq!(entity, "users");
                assert_eq!(field, "email");
                assert_eq!(value, "test@example.com");
            }
            other => panic!("Expected Duplicate error, got: {:?}", other),
        }
    }

    #[test]
    fn test_convert_not_null_violation() {
        let mut info = MockDatabaseErrorInfo::new("null value in column violates not-null constraint");
        info.table = Some("users".to_string());
        info.column = Some("email".to_string());

        let result = DatabaseErrorConverter::convert_store_error(
            database_error(DatabaseErrorKind::NotNullViolation, info),
            "insert user",
        );

        match result {
            AppError::Validation { field, reason } => {
                assert_eq!(field, "email");
                assert!(reason.contains("required"));
            }
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[test]
    fn test_convert_foreign_key_violation() {
        let mut info = MockDatabaseErrorInfo::new("violates foreign key constraint");
        info.details = Some("Key (id)=(42) is still referenced from table \"books\".".to_string());
        info.constraint = Some("books_author_id_fkey".to_string());

        let result = DatabaseErrorConverter::convert_store_error(
            database_error(DatabaseErrorKind::ForeignKeyViolation, info),
            "delete author",
        );

        match result {
            AppError::Validation { field, reason } => {
                assert_eq!(field, "id");
                assert!(reason.contains("42"));
                assert!(reason.contains("books_author_id_fkey"));
            }
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[test]
    fn test_convert_store_level_errors() {
        let result = DatabaseErrorConverter::convert_store_error(
            StoreError::StaleRecord {
                collection: "users".to_string(),
                key: "7".to_string(),
            },
            "update",
        );
        assert!(matches!(result, AppError::StaleRecord { .. }));

        let result = DatabaseErrorConverter::convert_store_error(
            StoreError::Conflict {
                collection: "users".to_string(),
                key: "7".to_string(),
            },
            "insert",
        );
        assert!(matches!(result, AppError::Duplicate { .. }));

        let result = DatabaseErrorConverter::convert_store_error(
            StoreError::invalid_query("bad column"),
            "fetch",
        );
        assert!(matches!(result, AppError::Database { .. }));
    }

    #[test]
    fn test_convert_not_found_error() {
        let result = DatabaseErrorConverter::convert_diesel_error(DieselError::NotFound, "find user");
        assert!(matches!(result, AppError::NotFound { .. }));
    }

    #[test]
    fn test_extract_key_value() {
        assert_eq!(
            DatabaseErrorConverter::extract_key_value("Key (email)=(a(b)c@x.io) already exists."),
            Some(("email".to_string(), "a(b)c@x.io".to_string()))
        );
        assert_eq!(DatabaseErrorConverter::extract_key_value("no key here"), None);
    }
}

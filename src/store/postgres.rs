//! PostgreSQL store built on diesel_async.
//!
//! Rows travel as `jsonb`: reads select `to_jsonb(t)` and writes go through
//! `jsonb_populate_record`, which lets PostgreSQL coerce each JSON field to
//! its column type. Filter values are bound the same way, so comparisons
//! happen between properly typed values instead of text.

use std::sync::Arc;

use async_trait::async_trait;
use diesel::QueryableByName;
use diesel::pg::Pg;
use diesel::query_builder::BoxedSqlQuery;
use diesel::query_builder::SqlQuery;
use diesel::sql_types::{BigInt, Jsonb, Text};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde_json::{Map, Value};

use super::{
    Change, DeleteBehavior, Direction, FetchRequest, Filter, Record, Schema, Store, StoreError,
    StoreResult, key_string, record_key,
};
use crate::db::AsyncDbPool;
use crate::models::{CREATED_AT, DELETED_AT};

#[derive(QueryableByName)]
struct JsonRow {
    #[diesel(sql_type = Jsonb)]
    record: Value,
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    total: i64,
}

/// A parameter bound to a rendered statement.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Bind {
    Json(Value),
    Text(String),
    BigInt(i64),
}

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Statement {
    pub sql: String,
    pub binds: Vec<Bind>,
}

impl Statement {
    fn into_query(self) -> BoxedSqlQuery<'static, Pg, SqlQuery> {
        let mut query = diesel::sql_query(self.sql).into_boxed::<Pg>();
        for bind in self.binds {
            query = match bind {
                Bind::Json(value) => query.bind::<Jsonb, _>(value),
                Bind::Text(text) => query.bind::<Text, _>(text),
                Bind::BigInt(number) => query.bind::<BigInt, _>(number),
            };
        }
        query
    }
}

/// Quote an identifier after checking it is a plain SQL name.
fn ident(name: &str) -> StoreResult<String> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::invalid_query(format!(
            "invalid identifier '{}'",
            name
        )));
    }
    Ok(format!("\"{}\"", name))
}

struct SqlBuilder {
    table: String,
    binds: Vec<Bind>,
}

impl SqlBuilder {
    fn new(collection: &str) -> StoreResult<Self> {
        Ok(Self {
            table: ident(collection)?,
            binds: Vec::new(),
        })
    }

    fn bind(&mut self, bind: Bind) -> String {
        self.binds.push(bind);
        format!("${}", self.binds.len())
    }

    fn single(field: &str, value: &Value) -> Value {
        let mut object = Map::new();
        object.insert(field.to_string(), value.clone());
        Value::Object(object)
    }

    /// `value` coerced to the column type of `field`.
    fn typed(&mut self, field: &str, column: &str, value: &Value) -> String {
        let placeholder = self.bind(Bind::Json(Self::single(field, value)));
        format!(
            "(jsonb_populate_record(NULL::{}, {}::jsonb)).{}",
            self.table, placeholder, column
        )
    }

    fn compare(&mut self, field: &str, operator: &str, value: &Value) -> StoreResult<String> {
        let column = ident(field)?;
        let typed = self.typed(field, &column, value);
        Ok(format!("t.{} {} {}", column, operator, typed))
    }

    fn filter(&mut self, filter: &Filter) -> StoreResult<String> {
        Ok(match filter {
            Filter::Eq(field, value) => self.compare(field, "=", value)?,
            Filter::Ne(field, value) => self.compare(field, "<>", value)?,
            Filter::Gt(field, value) => self.compare(field, ">", value)?,
            Filter::Ge(field, value) => self.compare(field, ">=", value)?,
            Filter::Lt(field, value) => self.compare(field, "<", value)?,
            Filter::Le(field, value) => self.compare(field, "<=", value)?,
            Filter::In(field, values) => {
                let column = ident(field)?;
                if values.is_empty() {
                    return Ok("FALSE".to_string());
                }
                let rows = values
                    .iter()
                    .map(|value| Self::single(field, value))
                    .collect();
                let placeholder = self.bind(Bind::Json(Value::Array(rows)));
                format!(
                    "t.{col} IN (SELECT r.{col} FROM jsonb_populate_recordset(NULL::{table}, {p}::jsonb) r)",
                    col = column,
                    table = self.table,
                    p = placeholder
                )
            }
            Filter::Contains(field, needle) => {
                let column = ident(field)?;
                let placeholder = self.bind(Bind::Text(needle.clone()));
                format!("strpos(t.{}::text, {}) > 0", column, placeholder)
            }
            Filter::IsNull(field) => format!("t.{} IS NULL", ident(field)?),
            Filter::IsNotNull(field) => format!("t.{} IS NOT NULL", ident(field)?),
            Filter::And(filters) => self.join(filters, " AND ", "TRUE")?,
            Filter::Or(filters) => self.join(filters, " OR ", "FALSE")?,
            Filter::Not(inner) => format!("NOT ({})", self.filter(inner)?),
        })
    }

    fn join(&mut self, filters: &[Filter], separator: &str, empty: &str) -> StoreResult<String> {
        if filters.is_empty() {
            return Ok(empty.to_string());
        }
        let parts = filters
            .iter()
            .map(|filter| self.filter(filter))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(format!("({})", parts.join(separator)))
    }

    fn where_clause(&mut self, request: &FetchRequest) -> StoreResult<String> {
        let mut conditions = Vec::new();
        if !request.ignore_default_filter {
            conditions.push(format!("t.{} IS NULL", ident(DELETED_AT)?));
        }
        if let Some(filter) = &request.filter {
            conditions.push(self.filter(filter)?);
        }
        Ok(if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        })
    }

    fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            binds: self.binds,
        }
    }
}

pub(crate) fn select_statement(request: &FetchRequest) -> StoreResult<Statement> {
    let mut builder = SqlBuilder::new(request.collection)?;
    let mut sql = format!("SELECT to_jsonb(t) AS record FROM {} t", builder.table);
    sql.push_str(&builder.where_clause(request)?);

    let mut terms = request
        .order
        .iter()
        .map(|order| {
            let direction = match order.direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            Ok(format!("t.{} {}", ident(&order.field)?, direction))
        })
        .collect::<StoreResult<Vec<_>>>()?;
    // windows need a deterministic order
    if terms.is_empty() && request.window.is_some() {
        terms.push(format!("t.{}", ident(CREATED_AT)?));
        terms.push(format!("t.{}", ident(request.key)?));
    }
    if !terms.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&terms.join(", "));
    }

    if let Some(window) = request.window {
        let limit = builder.bind(Bind::BigInt(clamp(window.limit)));
        let offset = builder.bind(Bind::BigInt(clamp(window.offset)));
        sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
    }

    Ok(builder.finish(sql))
}

pub(crate) fn count_statement(request: &FetchRequest) -> StoreResult<Statement> {
    let mut builder = SqlBuilder::new(request.collection)?;
    let mut sql = format!("SELECT COUNT(*) AS total FROM {} t", builder.table);
    sql.push_str(&builder.where_clause(request)?);
    Ok(builder.finish(sql))
}

pub(crate) fn change_statement(change: &Change) -> StoreResult<Statement> {
    let mut builder = SqlBuilder::new(change.collection())?;
    let sql = match change {
        Change::Insert { record, .. } => {
            let p = builder.bind(Bind::Json(Value::Object(record.clone())));
            format!(
                "INSERT INTO {table} SELECT * FROM jsonb_populate_record(NULL::{table}, {p}::jsonb)",
                table = builder.table
            )
        }
        Change::Replace { key, record, .. } => {
            let key_column = ident(key)?;
            let mut assignments = record
                .keys()
                .filter(|column| column.as_str() != *key)
                .map(|column| ident(column).map(|c| format!("{c} = r.{c}")))
                .collect::<StoreResult<Vec<_>>>()?;
            if assignments.is_empty() {
                assignments.push(format!("{c} = r.{c}", c = key_column));
            }
            let p = builder.bind(Bind::Json(Value::Object(record.clone())));
            format!(
                "UPDATE {table} AS t SET {sets} FROM jsonb_populate_record(NULL::{table}, {p}::jsonb) AS r WHERE t.{k} = r.{k}",
                table = builder.table,
                sets = assignments.join(", "),
                k = key_column
            )
        }
        Change::Remove { key, value, .. } => {
            let key_column = ident(key)?;
            let p = builder.bind(Bind::Json(SqlBuilder::single(key, value)));
            format!(
                "DELETE FROM {table} AS t USING jsonb_populate_record(NULL::{table}, {p}::jsonb) AS r WHERE t.{k} = r.{k}",
                table = builder.table,
                k = key_column
            )
        }
    };
    Ok(builder.finish(sql))
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn into_record(collection: &str, value: Value) -> StoreResult<Record> {
    match value {
        Value::Object(record) => Ok(record),
        other => Err(StoreError::malformed(
            collection,
            format!("expected a JSON object, got {}", other),
        )),
    }
}

/// Store backed by a PostgreSQL connection pool.
///
/// Foreign key behavior on permanent delete is enforced by the database
/// itself; the schema only declares it so the repository can cascade
/// soft deletes.
#[derive(Clone)]
pub struct PgStore {
    pool: AsyncDbPool,
    schema: Arc<Schema>,
}

impl PgStore {
    pub fn new(pool: AsyncDbPool, schema: Schema) -> Self {
        for relationship in schema.relationships() {
            if matches!(
                relationship.on_delete,
                DeleteBehavior::ClientCascade | DeleteBehavior::ClientSetNull
            ) {
                tracing::debug!(%relationship, "Relationship is maintained client side only");
            }
        }
        Self {
            pool,
            schema: Arc::new(schema),
        }
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn fetch(&self, request: &FetchRequest) -> StoreResult<Vec<Record>> {
        let statement = select_statement(request)?;
        tracing::trace!(sql = %statement.sql, "Fetching rows");
        let mut conn = self.pool.get().await?;
        let rows: Vec<JsonRow> = statement.into_query().load(&mut conn).await?;
        rows.into_iter()
            .map(|row| into_record(request.collection, row.record))
            .collect()
    }

    async fn count(&self, request: &FetchRequest) -> StoreResult<u64> {
        let statement = count_statement(request)?;
        tracing::trace!(sql = %statement.sql, "Counting rows");
        let mut conn = self.pool.get().await?;
        let row: CountRow = statement.into_query().get_result(&mut conn).await?;
        Ok(u64::try_from(row.total).unwrap_or_default())
    }

    async fn commit(&self, changes: Vec<Change>) -> StoreResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let planned = changes
            .iter()
            .map(|change| {
                let target = change.key_value().map(key_string).unwrap_or_default();
                if let Change::Insert { collection, key, record }
                | Change::Replace { collection, key, record } = change
                {
                    record_key(collection, key, record)?;
                }
                Ok((change.collection(), target, change_statement(change)?))
            })
            .collect::<StoreResult<Vec<_>>>()?;
        let total = planned.len();

        let mut conn = self.pool.get().await?;
        conn.transaction::<_, StoreError, _>(move |conn| {
            async move {
                for (collection, key, statement) in planned {
                    tracing::trace!(sql = %statement.sql, "Applying change");
                    let affected = statement.into_query().execute(conn).await?;
                    if affected != 1 {
                        return Err(StoreError::StaleRecord {
                            collection: collection.to_string(),
                            key,
                        });
                    }
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        tracing::debug!(changes = total, "Transaction committed");
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        diesel::sql_query("SELECT 1").execute(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Order;
    use serde_json::json;

    #[test]
    fn test_select_applies_default_filter_order_and_window() {
        let request = FetchRequest::new("users", "id")
            .with_filter(Filter::eq("name", "Ada"))
            .with_order(vec![Order::desc("created_at")])
            .with_window(10, 5);
        let statement = select_statement(&request).unwrap();

        assert_eq!(
            statement.sql,
            "SELECT to_jsonb(t) AS record FROM \"users\" t \
             WHERE t.\"deleted_at\" IS NULL \
             AND t.\"name\" = (jsonb_populate_record(NULL::\"users\", $1::jsonb)).\"name\" \
             ORDER BY t.\"created_at\" DESC LIMIT $2 OFFSET $3"
        );
        assert_eq!(
            statement.binds,
            vec![
                Bind::Json(json!({"name": "Ada"})),
                Bind::BigInt(5),
                Bind::BigInt(10),
            ]
        );
    }

    #[test]
    fn test_window_without_order_is_made_deterministic() {
        let request = FetchRequest::new("users", "id")
            .ignoring_default_filter(true)
            .with_window(0, 3);
        let statement = select_statement(&request).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT to_jsonb(t) AS record FROM \"users\" t \
             ORDER BY t.\"created_at\", t.\"id\" LIMIT $1 OFFSET $2"
        );
    }

    #[test]
    fn test_filter_rendering() {
        let request = FetchRequest::new("books", "id")
            .ignoring_default_filter(true)
            .with_filter(
                Filter::is_in("author_id", [1, 2])
                    .and(Filter::contains("title", "Rust"))
                    .and(Filter::is_null("deleted_at").or(Filter::gt("pages", 10)).not()),
            );
        let statement = count_statement(&request).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) AS total FROM \"books\" t WHERE (\
             t.\"author_id\" IN (SELECT r.\"author_id\" FROM jsonb_populate_recordset(NULL::\"books\", $1::jsonb) r) \
             AND strpos(t.\"title\"::text, $2) > 0 \
             AND NOT ((t.\"deleted_at\" IS NULL OR t.\"pages\" > (jsonb_populate_record(NULL::\"books\", $3::jsonb)).\"pages\")))"
        );
        assert_eq!(
            statement.binds[0],
            Bind::Json(json!([{"author_id": 1}, {"author_id": 2}]))
        );
        assert_eq!(statement.binds[1], Bind::Text("Rust".to_string()));
    }

    #[test]
    fn test_empty_in_never_matches() {
        let request = FetchRequest::new("books", "id")
            .with_filter(Filter::In("author_id".to_string(), Vec::new()));
        let statement = count_statement(&request).unwrap();
        assert!(statement.sql.ends_with("AND FALSE"));
        assert!(statement.binds.is_empty());
    }

    #[test]
    fn test_rejects_unsafe_identifiers() {
        let request = FetchRequest::new("users", "id")
            .with_filter(Filter::eq("name\"; DROP TABLE users; --", 1));
        assert!(matches!(
            select_statement(&request),
            Err(StoreError::InvalidQuery(_))
        ));
        assert!(ident("1abc").is_err());
        assert!(ident("").is_err());
        assert_eq!(ident("deleted_at").unwrap(), "\"deleted_at\"");
    }

    #[test]
    fn test_change_statements() {
        let record = json!({"id": "a1", "name": "Ada", "deleted_at": null})
            .as_object()
            .cloned()
            .unwrap();

        let insert = change_statement(&Change::Insert {
            collection: "users",
            key: "id",
            record: record.clone(),
        })
        .unwrap();
        assert_eq!(
            insert.sql,
            "INSERT INTO \"users\" SELECT * FROM jsonb_populate_record(NULL::\"users\", $1::jsonb)"
        );

        let replace = change_statement(&Change::Replace {
            collection: "users",
            key: "id",
            record,
        })
        .unwrap();
        assert_eq!(
            replace.sql,
            "UPDATE \"users\" AS t SET \"deleted_at\" = r.\"deleted_at\", \"name\" = r.\"name\" \
             FROM jsonb_populate_record(NULL::\"users\", $1::jsonb) AS r WHERE t.\"id\" = r.\"id\""
        );

        let remove = change_statement(&Change::Remove {
            collection: "users",
            key: "id",
            value: json!("a1"),
        })
        .unwrap();
        assert_eq!(
            remove.sql,
            "DELETE FROM \"users\" AS t USING jsonb_populate_record(NULL::\"users\", $1::jsonb) AS r \
             WHERE t.\"id\" = r.\"id\""
        );
        assert_eq!(remove.binds, vec![Bind::Json(json!({"id": "a1"}))]);
    }
}

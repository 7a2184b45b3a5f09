//! SQLite backend on an sqlx connection pool.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Arguments, Column, Row, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use super::{Attributes, Database, Executed, Value};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

/// [`Database`] over an [`SqlitePool`].
///
/// ```rust,no_run
/// # async fn run() -> hearth::Result<()> {
/// use std::sync::Arc;
/// use hearth::db::{Db, SqliteDatabase};
///
/// let sqlite = SqliteDatabase::connect("sqlite://blog.db", 5).await?;
/// let db: Db = Arc::new(sqlite);
/// # Ok(()) }
/// ```
#[derive(Clone, Debug)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Opens a pool, creating the database file when missing.
    ///
    /// In-memory databases exist per connection, so `sqlite::memory:` is
    /// always served by a single connection that is never recycled.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let max_connections = if in_memory {
            if max_connections > 1 {
                warn!(max_connections, "in-memory sqlite is limited to one connection");
            }
            1
        } else {
            max_connections.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        info!(url, max_connections, "connected to sqlite");
        Ok(Self { pool })
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::connect(&config.url, config.max_connections).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs a script of `;`-separated statements without bindings, e.g. a
    /// schema.
    pub async fn run_script(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }
}

fn arguments(bindings: &[Value]) -> Result<SqliteArguments<'_>> {
    let mut args = SqliteArguments::default();
    for value in bindings {
        match value {
            Value::Null => args.add(None::<i64>),
            Value::Bool(b) => args.add(*b),
            Value::Int(n) => args.add(*n),
            Value::Float(n) => args.add(*n),
            Value::Text(s) => args.add(s.as_str()),
        }
        .map_err(|e| Error::Database(sqlx::Error::Encode(e)))?;
    }
    Ok(args)
}

/// Decodes by the storage class of each value rather than the declared
/// column type, so computed columns like `COUNT(*)` decode too. Integers in
/// a column declared `BOOLEAN` come back as [`Value::Bool`].
fn decode_row(row: &SqliteRow) -> Result<Attributes> {
    let mut attributes = Attributes::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let declared_bool = column.type_info().name().eq_ignore_ascii_case("BOOLEAN");
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let storage = raw.type_info().name().to_ascii_uppercase();
            match storage.as_str() {
                "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" if declared_bool => {
                    Value::Bool(row.try_get_unchecked::<i64, _>(idx)? != 0)
                }
                "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" => Value::Int(row.try_get_unchecked(idx)?),
                "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => Value::Float(row.try_get_unchecked(idx)?),
                "BLOB" => {
                    let bytes: Vec<u8> = row.try_get_unchecked(idx)?;
                    Value::Text(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::Text(row.try_get_unchecked(idx)?),
            }
        };
        attributes.insert(column.name().to_owned(), value);
    }
    Ok(attributes)
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn execute(&self, sql: &str, bindings: &[Value]) -> Result<Executed> {
        debug!(sql, bindings = bindings.len(), "execute");
        let result = sqlx::query_with(sql, arguments(bindings)?)
            .execute(&self.pool)
            .await?;
        let rows_affected = result.rows_affected();
        Ok(Executed {
            rows_affected,
            last_insert_id: (rows_affected > 0).then(|| result.last_insert_rowid()),
        })
    }

    async fn fetch_all(&self, sql: &str, bindings: &[Value]) -> Result<Vec<Attributes>> {
        debug!(sql, bindings = bindings.len(), "fetch");
        let rows = sqlx::query_with(sql, arguments(bindings)?)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory() -> SqliteDatabase {
        let db = SqliteDatabase::connect("sqlite::memory:", 4).await.unwrap();
        db.run_script(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY AUTOINCREMENT, body TEXT, score REAL, flag BOOLEAN);",
        )
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn binds_and_decodes_every_scalar() {
        let db = memory().await;
        let done = db
            .execute(
                "INSERT INTO notes (body, score, flag) VALUES (?, ?, ?)",
                &[Value::from("hi"), Value::Float(2.5), Value::Bool(true)],
            )
            .await
            .unwrap();
        assert_eq!(done, Executed { rows_affected: 1, last_insert_id: Some(1) });

        db.execute("INSERT INTO notes (body) VALUES (?)", &[Value::Null]).await.unwrap();

        let rows = db.fetch_all("SELECT * FROM notes ORDER BY id", &[]).await.unwrap();
        assert_eq!(rows[0]["id"], Value::Int(1));
        assert_eq!(rows[0]["body"], Value::from("hi"));
        assert_eq!(rows[0]["score"], Value::Float(2.5));
        assert_eq!(rows[0]["flag"], Value::Bool(true));
        assert_eq!(rows[1]["body"], Value::Null);
    }

    #[tokio::test]
    async fn boolean_columns_decode_as_bools() {
        let db = memory().await;
        db.execute("INSERT INTO notes (flag) VALUES (?), (?)", &[Value::Bool(false), Value::Int(7)]).await.unwrap();

        let rows = db.fetch_all("SELECT id, flag FROM notes ORDER BY id", &[]).await.unwrap();
        assert_eq!(rows[0]["flag"], Value::Bool(false));
        assert_eq!(rows[1]["flag"], Value::Bool(true));
        assert_eq!(rows[0]["id"], Value::Int(1));
    }

    #[tokio::test]
    async fn computed_columns_decode() {
        let db = memory().await;
        let row = db.fetch_one("SELECT COUNT(*) AS count FROM notes", &[]).await.unwrap().unwrap();
        assert_eq!(row["count"], Value::Int(0));
    }

    #[tokio::test]
    async fn updates_report_no_insert_id_when_nothing_changed() {
        let db = memory().await;
        let done = db.execute("UPDATE notes SET body = ? WHERE id = ?", &["x".into(), 99.into()]).await.unwrap();
        assert_eq!(done.rows_affected, 0);
        assert_eq!(done.last_insert_id, None);
    }
}

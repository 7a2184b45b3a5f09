//! Database access: scalar values, the [`Database`] executor trait, the query
//! builder and the active-record [`Model`].
//!
//! Nothing in here holds a global connection. A [`Db`] handle is built once at
//! startup (see [`SqliteDatabase`]) and passed down, usually through
//! [`Request::db`](crate::Request::db).

mod model;
mod pagination;
mod query;
mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use model::{Entity, Model};
pub use pagination::{PageLink, PageRequest, Paginated, SimplePaginated};
pub use query::{Direction, FromRow, Operator, QueryBuilder};
pub use sqlite::SqliteDatabase;

/// A scalar column value or query binding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view. Numeric text (as produced by form input) converts.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Self::Text(s) }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self { Self::Text(s.clone()) }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self { Self::Int(n) }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self { Self::Int(n.into()) }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self { Self::Int(n.into()) }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self { Self::Float(n) }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Self::Bool(b) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Request input arrives as JSON. Scalars map across, while arrays and
/// objects are stored as their JSON text.
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Null, Self::Float),
            },
            serde_json::Value::String(s) => Self::Text(s),
            other => Self::Text(other.to_string()),
        }
    }
}

/// One row, or the attribute bag of a model: column name → value.
pub type Attributes = BTreeMap<String, Value>;

/// Builds an [`Attributes`] map from pairs.
///
/// ```rust
/// use hearth::db::{attrs, Value};
///
/// let row = attrs([("name", Value::from("Rust")), ("views", Value::from(3))]);
/// assert_eq!(row["views"], Value::Int(3));
/// ```
pub fn attrs<I, K, V>(pairs: I) -> Attributes
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Outcome of a statement that returns no rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Executed {
    pub rows_affected: u64,
    /// Row id generated by an INSERT, when the statement inserted anything.
    pub last_insert_id: Option<i64>,
}

/// Executes parameterized SQL. `?` placeholders bind positionally, in order.
///
/// Implemented by [`SqliteDatabase`]. Other backends plug in by implementing
/// these three methods.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn execute(&self, sql: &str, bindings: &[Value]) -> Result<Executed>;

    async fn fetch_all(&self, sql: &str, bindings: &[Value]) -> Result<Vec<Attributes>>;

    async fn fetch_one(&self, sql: &str, bindings: &[Value]) -> Result<Option<Attributes>> {
        Ok(self.fetch_all(sql, bindings).await?.into_iter().next())
    }
}

/// Shared database handle.
pub type Db = Arc<dyn Database>;

/// Quotes a table or column name, rejecting anything that is not a plain
/// (optionally `table.`-qualified) identifier.
pub(crate) fn quote_ident(name: &str) -> Result<String> {
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 || !parts.iter().all(|p| valid_part(p)) {
        return Err(Error::InvalidIdentifier(name.to_owned()));
    }
    Ok(parts.iter().map(|p| format!("`{p}`")).collect::<Vec<_>>().join("."))
}

/// Current time in the `YYYY-MM-DD HH:MM:SS` form used by timestamp columns.
pub(crate) fn timestamp_now() -> Value {
    Value::Text(chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_plain_and_qualified_identifiers() {
        assert_eq!(quote_ident("slug").unwrap(), "`slug`");
        assert_eq!(quote_ident("blog_tags.tag_id").unwrap(), "`blog_tags`.`tag_id`");
    }

    #[test]
    fn rejects_injection_attempts() {
        for bad in ["", "1abc", "name; DROP TABLE tags", "a.b.c", "`x`", "na me"] {
            assert!(matches!(quote_ident(bad), Err(Error::InvalidIdentifier(_))), "{bad}");
        }
    }

    #[test]
    fn json_input_converts_to_scalars() {
        assert_eq!(Value::from(serde_json::json!(7)), Value::Int(7));
        assert_eq!(Value::from(serde_json::json!(1.5)), Value::Float(1.5));
        assert_eq!(Value::from(serde_json::json!(null)), Value::Null);
        assert_eq!(Value::from(serde_json::json!([1, 2])), Value::Text("[1,2]".into()));
    }

    #[test]
    fn numeric_text_reads_as_integer() {
        assert_eq!(Value::from("42").as_i64(), Some(42));
        assert_eq!(Value::from("x").as_i64(), None);
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }
}

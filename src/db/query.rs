//! Fluent SQL builder with positional bindings.

use std::fmt;
use std::marker::PhantomData;

use super::{quote_ident, timestamp_now, Attributes, Db, Value};
use crate::error::{Error, Result};

/// Comparison operator for a WHERE predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
}

impl Operator {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// `"desc"` in any case is descending, anything else ascending.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("desc") { Self::Desc } else { Self::Asc }
    }

    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Builds a result value from one fetched row.
pub trait FromRow: Sized {
    fn from_row(row: Attributes) -> Self;
}

impl FromRow for Attributes {
    fn from_row(row: Attributes) -> Self {
        row
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Boolean {
    And,
    Or,
}

#[derive(Debug)]
enum Predicate {
    Compare { column: String, op: Operator },
    In { column: String, count: usize },
    Null { column: String, negated: bool },
}

impl Predicate {
    fn to_sql(&self) -> String {
        match self {
            Self::Compare { column, op } => format!("{column} {op} ?"),
            Self::In { count: 0, .. } => "1 = 0".to_owned(),
            Self::In { column, count } => format!("{column} IN ({})", vec!["?"; *count].join(", ")),
            Self::Null { column, negated: false } => format!("{column} IS NULL"),
            Self::Null { column, negated: true } => format!("{column} IS NOT NULL"),
        }
    }
}

/// One SQL query against one table.
///
/// The Nth binding always fills the Nth `?`. Identifiers are validated as
/// they are added; an invalid one is reported when the query runs.
///
/// ```rust
/// # fn demo(db: hearth::db::Db) {
/// use hearth::db::{Direction, Operator, QueryBuilder};
///
/// let query = QueryBuilder::table(db, "blogs")
///     .where_eq("status", "published")
///     .where_op("views", Operator::Gt, 100)
///     .order_by("created_at", Direction::Desc)
///     .limit(10);
/// assert_eq!(
///     query.to_sql(),
///     "SELECT * FROM `blogs` WHERE `status` = ? AND `views` > ? ORDER BY `created_at` DESC LIMIT 10",
/// );
/// # }
/// ```
pub struct QueryBuilder<T = Attributes> {
    db: Db,
    table: String,
    selects: Vec<String>,
    wheres: Vec<(Boolean, Predicate)>,
    bindings: Vec<Value>,
    orders: Vec<(String, Direction)>,
    limit: Option<u64>,
    offset: Option<u64>,
    timestamps: bool,
    invalid: Option<String>,
    _row: PhantomData<fn() -> T>,
}

impl QueryBuilder<Attributes> {
    /// Query returning raw rows.
    pub fn table(db: Db, table: &str) -> Self {
        Self::new(db, table)
    }
}

impl<T: FromRow> QueryBuilder<T> {
    pub fn new(db: Db, table: &str) -> Self {
        let mut query = Self {
            db,
            table: String::new(),
            selects: Vec::new(),
            wheres: Vec::new(),
            bindings: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
            timestamps: false,
            invalid: None,
            _row: PhantomData,
        };
        query.table = query.ident(table);
        query
    }

    /// Maintain `created_at`/`updated_at` on insert and update.
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    fn ident(&mut self, name: &str) -> String {
        match quote_ident(name) {
            Ok(quoted) => quoted,
            Err(_) => {
                self.invalid.get_or_insert_with(|| name.to_owned());
                String::new()
            }
        }
    }

    fn ensure_valid(&self) -> Result<()> {
        match &self.invalid {
            Some(name) => Err(Error::InvalidIdentifier(name.clone())),
            None => Ok(()),
        }
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut selects = Vec::new();
        for column in columns {
            let column = column.as_ref();
            selects.push(if column == "*" { "*".to_owned() } else { self.ident(column) });
        }
        self.selects = selects;
        self
    }

    fn push(mut self, boolean: Boolean, predicate: Predicate, values: Vec<Value>) -> Self {
        self.wheres.push((boolean, predicate));
        self.bindings.extend(values);
        self
    }

    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_op(column, Operator::Eq, value)
    }

    pub fn where_op(mut self, column: &str, op: Operator, value: impl Into<Value>) -> Self {
        let column = self.ident(column);
        self.push(Boolean::And, Predicate::Compare { column, op }, vec![value.into()])
    }

    pub fn or_where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.or_where_op(column, Operator::Eq, value)
    }

    pub fn or_where_op(mut self, column: &str, op: Operator, value: impl Into<Value>) -> Self {
        let column = self.ident(column);
        self.push(Boolean::Or, Predicate::Compare { column, op }, vec![value.into()])
    }

    /// `column IN (?, ?, …)`. An empty list matches nothing.
    pub fn where_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let column = self.ident(column);
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let count = values.len();
        self.push(Boolean::And, Predicate::In { column, count }, values)
    }

    pub fn where_null(mut self, column: &str) -> Self {
        let column = self.ident(column);
        self.push(Boolean::And, Predicate::Null { column, negated: false }, Vec::new())
    }

    pub fn where_not_null(mut self, column: &str) -> Self {
        let column = self.ident(column);
        self.push(Boolean::And, Predicate::Null { column, negated: true }, Vec::new())
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        let column = self.ident(column);
        self.orders.push((column, direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn bindings(&self) -> &[Value] {
        &self.bindings
    }

    pub fn to_sql(&self) -> String {
        let columns = if self.selects.is_empty() { "*".to_owned() } else { self.selects.join(", ") };
        let mut sql = format!("SELECT {columns} FROM {}", self.table);
        sql.push_str(&self.compile_wheres());
        if !self.orders.is_empty() {
            let orders: Vec<String> =
                self.orders.iter().map(|(c, d)| format!("{c} {}", d.as_sql())).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }
        match (self.limit, self.offset) {
            (Some(limit), _) => sql.push_str(&format!(" LIMIT {limit}")),
            // OFFSET is only valid after a LIMIT.
            (None, Some(_)) => sql.push_str(&format!(" LIMIT {}", i64::MAX)),
            (None, None) => {}
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        sql
    }

    fn compile_wheres(&self) -> String {
        let mut sql = String::new();
        for (i, (boolean, predicate)) in self.wheres.iter().enumerate() {
            let keyword = match (i, boolean) {
                (0, _) => "WHERE",
                (_, Boolean::Or) => "OR",
                (_, Boolean::And) => "AND",
            };
            sql.push_str(&format!(" {keyword} {}", predicate.to_sql()));
        }
        sql
    }

    pub async fn get(&self) -> Result<Vec<T>> {
        self.ensure_valid()?;
        let rows = self.db.fetch_all(&self.to_sql(), &self.bindings).await?;
        Ok(rows.into_iter().map(T::from_row).collect())
    }

    pub async fn first(self) -> Result<Option<T>> {
        let query = self.limit(1);
        Ok(query.get().await?.into_iter().next())
    }

    /// `COUNT(*)` under the same WHERE, ignoring order, limit and offset.
    pub async fn count(&self) -> Result<u64> {
        self.ensure_valid()?;
        let sql = format!("SELECT COUNT(*) AS count FROM {}{}", self.table, self.compile_wheres());
        let row = self.db.fetch_one(&sql, &self.bindings).await?;
        let count = row
            .and_then(|r| r.get("count").and_then(Value::as_i64))
            .unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.count().await? > 0)
    }

    /// Inserts one row and returns the generated id, if the database
    /// produced one.
    pub async fn insert(&self, mut data: Attributes) -> Result<Option<i64>> {
        self.ensure_valid()?;
        if self.timestamps {
            let now = timestamp_now();
            data.entry("created_at".to_owned()).or_insert_with(|| now.clone());
            data.entry("updated_at".to_owned()).or_insert(now);
        }
        if data.is_empty() {
            return Err(Error::Persistence("insert needs at least one column".to_owned()));
        }

        let columns = data.keys().map(|c| quote_ident(c)).collect::<Result<Vec<_>>>()?;
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!("INSERT INTO {} ({}) VALUES ({placeholders})", self.table, columns.join(", "));
        let values: Vec<Value> = data.into_values().collect();

        let done = self.db.execute(&sql, &values).await?;
        Ok(done.last_insert_id.filter(|_| done.rows_affected > 0))
    }

    /// Updates matching rows and returns how many changed. Refuses to run
    /// without a WHERE predicate.
    pub async fn update(&self, mut data: Attributes) -> Result<u64> {
        self.ensure_valid()?;
        if self.wheres.is_empty() {
            return Err(Error::UnsafeMutation { operation: "update" });
        }
        if self.timestamps {
            data.entry("updated_at".to_owned()).or_insert_with(timestamp_now);
        }
        if data.is_empty() {
            return Ok(0);
        }

        let mut sets = Vec::with_capacity(data.len());
        let mut values = Vec::with_capacity(data.len() + self.bindings.len());
        for (column, value) in data {
            sets.push(format!("{} = ?", quote_ident(&column)?));
            values.push(value);
        }
        values.extend(self.bindings.iter().cloned());

        let sql = format!("UPDATE {} SET {}{}", self.table, sets.join(", "), self.compile_wheres());
        Ok(self.db.execute(&sql, &values).await?.rows_affected)
    }

    /// Deletes matching rows and returns how many went. Refuses to run
    /// without a WHERE predicate.
    pub async fn delete(&self) -> Result<u64> {
        self.ensure_valid()?;
        if self.wheres.is_empty() {
            return Err(Error::UnsafeMutation { operation: "delete" });
        }
        let sql = format!("DELETE FROM {}{}", self.table, self.compile_wheres());
        Ok(self.db.execute(&sql, &self.bindings).await?.rows_affected)
    }
}

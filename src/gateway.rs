//! Table-oriented access to the hosted backend.
//!
//! Views describe what they want as a [`Query`] and hand it to a [`Gateway`].
//! The REST gateway turns it into PostgREST parameters; the local store turns
//! it into SQL.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub type Row = serde_json::Map<String, Value>;

/// Matches nothing. Sent instead of an empty `in` list.
pub const NO_MATCH_ID: Uuid = Uuid::nil();

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Request to {table} failed: {message}")]
    Request { table: &'static str, message: String },

    #[error("Backend returned status {status} for {table}: {body}")]
    Status {
        table: &'static str,
        status: u16,
        body: String,
    },

    #[error("Malformed row from {table}: {source}")]
    Decode {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Local store error: {0}")]
    Local(#[from] rusqlite::Error),

    #[error("Invalid query: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Applications,
    Clients,
    ClientAssignments,
    Users,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Applications => "applications",
            Table::Clients => "clients",
            Table::ClientAssignments => "client_assignments",
            Table::Users => "users",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Bool(bool),
}

impl Scalar {
    /// Textual form used in REST filters.
    pub fn render(&self) -> String {
        match self {
            Scalar::Text(s) => s.clone(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<Uuid> for Scalar {
    fn from(id: Uuid) -> Self {
        Scalar::Text(id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, Scalar),
    Gte(&'static str, Scalar),
    Lte(&'static str, Scalar),
    In(&'static str, Vec<String>),
    /// Column is null or not one of the values. An empty list matches all rows.
    NotIn(&'static str, Vec<String>),
}

impl Filter {
    pub fn column(&self) -> &'static str {
        match self {
            Filter::Eq(c, _)
            | Filter::Gte(c, _)
            | Filter::Lte(c, _)
            | Filter::In(c, _)
            | Filter::NotIn(c, _) => c,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: Table,
    pub columns: Vec<&'static str>,
    pub filters: Vec<Filter>,
    pub order: Vec<(&'static str, Direction)>,
}

impl Query {
    pub fn from(table: Table) -> Self {
        Self {
            table,
            columns: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn select(mut self, columns: &[&'static str]) -> Self {
        self.columns = columns.to_vec();
        self
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<Scalar>) -> Self {
        self.filters.push(Filter::Eq(column, value.into()));
        self
    }

    pub fn gte(mut self, column: &'static str, value: impl Into<Scalar>) -> Self {
        self.filters.push(Filter::Gte(column, value.into()));
        self
    }

    pub fn lte(mut self, column: &'static str, value: impl Into<Scalar>) -> Self {
        self.filters.push(Filter::Lte(column, value.into()));
        self
    }

    /// Membership filter. An empty id list is replaced by [`NO_MATCH_ID`] so
    /// that no backend reads it as "match all".
    pub fn in_ids<I>(mut self, column: &'static str, ids: I) -> Self
    where
        I: IntoIterator<Item = Uuid>,
    {
        let mut values: Vec<String> = ids.into_iter().map(|id| id.to_string()).collect();
        if values.is_empty() {
            values.push(NO_MATCH_ID.to_string());
        }
        self.filters.push(Filter::In(column, values));
        self
    }

    pub fn not_in_ids<I>(mut self, column: &'static str, ids: I) -> Self
    where
        I: IntoIterator<Item = Uuid>,
    {
        let values: Vec<String> = ids.into_iter().map(|id| id.to_string()).collect();
        if !values.is_empty() {
            self.filters.push(Filter::NotIn(column, values));
        }
        self
    }

    pub fn order(mut self, column: &'static str, direction: Direction) -> Self {
        self.order.push((column, direction));
        self
    }
}

pub trait Gateway: Send + Sync {
    fn select(&self, query: &Query) -> Result<Vec<Row>, GatewayError>;

    /// Inserts one row and returns it as stored.
    fn insert(&self, table: Table, row: &Row) -> Result<Row, GatewayError>;

    /// Patches every row matching `query.filters`; returns how many changed.
    fn update(&self, query: &Query, patch: &Row) -> Result<usize, GatewayError>;

    fn describe(&self) -> String;
}

/// Runs `query` and decodes every row into `T`.
pub fn fetch<T: DeserializeOwned>(gateway: &dyn Gateway, query: &Query) -> Result<Vec<T>, GatewayError> {
    gateway
        .select(query)?
        .into_iter()
        .map(|row| {
            serde_json::from_value(Value::Object(row)).map_err(|source| GatewayError::Decode {
                table: query.table.as_str(),
                source,
            })
        })
        .collect()
}

pub(crate) fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

//! Filter, search, sort and pagination assembly for list queries.
//!
//! Each entity declares a [`QuerySpec`]: its base statement, the columns
//! searched by the free-text `search` parameter, a whitelist mapping filter
//! field names to physical columns, and the sort keys it accepts. Filters
//! hand over their populated fields as `(name, value)` pairs; only fields
//! found in the whitelist become predicates, and every value is bound as a
//! positional argument.
//!
//! Field names containing a double underscore are the one escape hatch: their
//! value is a pre-built SQL fragment appended verbatim. Only code may produce
//! such fields, never request input.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{postgres::PgArguments, Arguments};
use thiserror::Error;
use uuid::Uuid;

/// Parameters consumed by pagination, search and sort, never by filtering
pub const RESERVED_FIELDS: [&str; 4] = ["page", "limit", "search", "sort"];

const RAW_MARKER: &str = "__";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid sort key. Available sort keys: {available}")]
    InvalidSort { available: String },
}

/// A value bound to a positional placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    Text(String),
    Int(i64),
    Bool(bool),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    UuidList(Vec<Uuid>),
    TextList(Vec<String>),
}

/// A filter field value as handed over by an entity filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Int(i64),
    Bool(bool),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    UuidList(Vec<Uuid>),
    TextList(Vec<String>),
    /// Pre-built clause, only honoured under a `__` field name
    Raw(String),
}

impl FilterValue {
    fn is_empty(&self) -> bool {
        match self {
            FilterValue::Text(s) | FilterValue::Raw(s) => s.trim().is_empty(),
            FilterValue::UuidList(v) => v.is_empty(),
            FilterValue::TextList(v) => v.is_empty(),
            _ => false,
        }
    }

    fn into_arg(self) -> Option<SqlArg> {
        match self {
            FilterValue::Text(v) => Some(SqlArg::Text(v)),
            FilterValue::Int(v) => Some(SqlArg::Int(v)),
            FilterValue::Bool(v) => Some(SqlArg::Bool(v)),
            FilterValue::Uuid(v) => Some(SqlArg::Uuid(v)),
            FilterValue::Timestamp(v) => Some(SqlArg::Timestamp(v)),
            FilterValue::UuidList(v) => Some(SqlArg::UuidList(v)),
            FilterValue::TextList(v) => Some(SqlArg::TextList(v)),
            FilterValue::Raw(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Gte,
    Lte,
}

impl Operator {
    fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
        }
    }
}

/// Maps a filter field name to the column and operator it filters on
#[derive(Debug, Clone, Copy)]
pub struct FilterColumn {
    pub field: &'static str,
    pub column: &'static str,
    pub operator: Operator,
}

impl FilterColumn {
    pub const fn eq(field: &'static str, column: &'static str) -> Self {
        Self { field, column, operator: Operator::Eq }
    }

    pub const fn gte(field: &'static str, column: &'static str) -> Self {
        Self { field, column, operator: Operator::Gte }
    }

    pub const fn lte(field: &'static str, column: &'static str) -> Self {
        Self { field, column, operator: Operator::Lte }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Common list parameters shared by every filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    /// Current page, starting from 1
    pub page: Option<i64>,
    /// Page size, 0 or absent means unlimited
    pub limit: Option<i64>,
    pub search: Option<String>,
    /// `[-|+]key[,key...]`, a leading dash sorts descending
    pub sort: Option<String>,
}

impl QueryParams {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(0).max(0)
    }
}

/// A caller-supplied filter object
pub trait Filter {
    fn params(&self) -> QueryParams;

    /// Entity-specific fields, in the order their predicates should appear
    fn fields(&self) -> Vec<(&'static str, FilterValue)> {
        Vec::new()
    }
}

impl Filter for QueryParams {
    fn params(&self) -> QueryParams {
        self.clone()
    }
}

/// A SQL statement with its positional arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<SqlArg>,
}

impl Statement {
    fn push_arg(&mut self, arg: SqlArg) -> usize {
        self.args.push(arg);
        self.args.len()
    }

    pub fn arguments(&self) -> PgArguments {
        let mut arguments = PgArguments::default();
        for arg in &self.args {
            match arg.clone() {
                SqlArg::Text(v) => arguments.add(v),
                SqlArg::Int(v) => arguments.add(v),
                SqlArg::Bool(v) => arguments.add(v),
                SqlArg::Uuid(v) => arguments.add(v),
                SqlArg::Timestamp(v) => arguments.add(v),
                SqlArg::UuidList(v) => arguments.add(v),
                SqlArg::TextList(v) => arguments.add(v),
            }
        }
        arguments
    }
}

/// Per-entity description of how list queries are assembled
#[derive(Debug, Clone, Copy)]
pub struct QuerySpec {
    pub base: &'static str,
    /// Column counted by [`QuerySpec::count`]
    pub count_column: &'static str,
    pub searchable: &'static [&'static str],
    pub filters: &'static [FilterColumn],
    /// Sort key to physical column, in the order they are listed in errors
    pub sorts: &'static [(&'static str, &'static str)],
    /// Applied when the filter carries no sort token
    pub default_sort: &'static str,
    /// Wrap the base statement as `SELECT * FROM (<base>) AS s` so filters
    /// and sorts address its output columns
    pub wrap_subquery: bool,
}

impl QuerySpec {
    /// The filtered statement, before sorting and pagination
    pub fn filtered(&self, filter: &impl Filter) -> Statement {
        let params = filter.params();
        let mut statement = Statement {
            sql: if self.wrap_subquery {
                format!("SELECT * FROM ({}) AS s", self.base)
            } else {
                self.base.to_string()
            },
            args: Vec::new(),
        };

        let mut wheres = Vec::new();
        for (field, value) in filter.fields() {
            if value.is_empty() {
                continue;
            }

            if field.contains(RAW_MARKER) {
                if let FilterValue::Raw(fragment) | FilterValue::Text(fragment) = value {
                    wheres.push(fragment);
                }
                continue;
            }

            if RESERVED_FIELDS.contains(&field) {
                continue;
            }

            let Some(column) = self.filters.iter().find(|c| c.field == field) else {
                tracing::debug!(field, "Ignoring filter field without a column mapping");
                continue;
            };

            let is_list = matches!(value, FilterValue::UuidList(_) | FilterValue::TextList(_));
            let Some(arg) = value.into_arg() else {
                continue;
            };
            let n = statement.push_arg(arg);

            if is_list {
                wheres.push(format!("{} = ANY(${})", column.column, n));
            } else {
                wheres.push(format!("{} {} ${}", column.column, column.operator.as_sql(), n));
            }
        }

        let search = params.search.as_deref().map(str::trim).unwrap_or_default();
        if !search.is_empty() && !self.searchable.is_empty() {
            let mut searching = Vec::with_capacity(self.searchable.len());
            for column in self.searchable {
                let n = statement.push_arg(SqlArg::Text(format!("%{}%", search)));
                searching.push(format!("{} ILIKE ${}", column, n));
            }
            wheres.push(format!("({})", searching.join(" OR ")));
        }

        if !wheres.is_empty() {
            let keyword = if !self.wrap_subquery && has_where(self.base) {
                " AND "
            } else {
                " WHERE "
            };
            statement.sql.push_str(keyword);
            statement.sql.push_str(&wheres.join(" AND "));
        }

        statement
    }

    /// The full page statement: filtered, sorted and paginated
    pub fn select(&self, filter: &impl Filter) -> Result<Statement, QueryError> {
        let params = filter.params();
        let mut statement = self.filtered(filter);
        statement.sql.push_str(&self.order_by(params.sort.as_deref())?);
        statement.sql.push_str(&paginate(params.page(), params.limit()));
        Ok(statement)
    }

    /// Total number of rows matching the filter, regardless of pagination
    pub fn count(&self, filter: &impl Filter) -> Statement {
        let filtered = self.filtered(filter);
        Statement {
            sql: format!("SELECT COUNT({}) FROM ({}) AS c", self.count_column, filtered.sql),
            args: filtered.args,
        }
    }

    pub fn validate_sort(&self, sort: Option<&str>) -> Result<(), QueryError> {
        self.order_by(sort).map(|_| ())
    }

    fn order_by(&self, sort: Option<&str>) -> Result<String, QueryError> {
        let token = match sort.map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => self.default_sort,
        };
        if token.is_empty() {
            return Ok(String::new());
        }

        let (columns, direction) = parse_sort(token, self.sorts)?;
        let parts: Vec<String> = columns
            .iter()
            .map(|column| format!("{} {}", column, direction.as_sql()))
            .collect();

        Ok(format!(" ORDER BY {}", parts.join(", ")))
    }
}

/// Resolve a sort token against a sort map.
///
/// All comma-separated keys share the direction given by the leading sign.
pub fn parse_sort(
    token: &str,
    sorts: &[(&'static str, &'static str)],
) -> Result<(Vec<&'static str>, Direction), QueryError> {
    let (keys, direction) = if let Some(rest) = token.strip_prefix('-') {
        (rest, Direction::Desc)
    } else if let Some(rest) = token.strip_prefix('+') {
        (rest, Direction::Asc)
    } else {
        (token, Direction::Asc)
    };

    let mut columns = Vec::new();
    for key in keys.split(',').map(str::trim) {
        match sorts.iter().find(|(name, _)| *name == key) {
            Some((_, column)) => columns.push(*column),
            None => return Err(invalid_sort(sorts)),
        }
    }

    Ok((columns, direction))
}

fn invalid_sort(sorts: &[(&'static str, &'static str)]) -> QueryError {
    let available = sorts
        .iter()
        .map(|(key, _)| format!("'{}'", key))
        .collect::<Vec<_>>()
        .join(", ");
    QueryError::InvalidSort { available }
}

/// `LIMIT/OFFSET` suffix; empty when `limit` is 0 (unlimited).
///
/// The offset saturates, so a page far past the end yields an empty page.
pub fn paginate(page: i64, limit: i64) -> String {
    if limit <= 0 {
        return String::new();
    }
    let offset = (page.max(1) - 1).saturating_mul(limit);
    format!(" LIMIT {} OFFSET {}", limit, offset)
}

fn has_where(sql: &str) -> bool {
    sql.to_ascii_uppercase()
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .any(|word| word == "WHERE")
}

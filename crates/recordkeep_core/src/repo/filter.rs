//! Constrained query predicates rendered to parameterised SQL.
//!
//! Filters are data, not closures, so every predicate is pushed down to
//! SQLite instead of materialising the table.
//!
//! # Invariants
//! - Column names must belong to the target record's table.
//! - Values are always bound, never interpolated.

use crate::model::record::{Record, RecordId};
use crate::repo::{RepoError, RepoResult};
use rusqlite::types::Value;

/// Scalar operand of a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl FilterValue {
    fn into_sql(self) -> Value {
        match self {
            Self::Integer(value) => Value::Integer(value),
            Self::Real(value) => Value::Real(value),
            Self::Text(value) => Value::Text(value),
            Self::Bool(value) => Value::Integer(i64::from(value)),
        }
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<RecordId> for FilterValue {
    fn from(value: RecordId) -> Self {
        Self::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Predicate over one record table.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Filter {
    /// Matches every row.
    #[default]
    All,
    Compare {
        column: String,
        op: CompareOp,
        value: FilterValue,
    },
    Like {
        column: String,
        pattern: String,
    },
    IsNull(String),
    IsNotNull(String),
    In {
        column: String,
        values: Vec<FilterValue>,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<FilterValue>) -> Self {
        Self::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// Matches the record with the given identity.
    pub fn id(id: RecordId) -> Self {
        Self::equals("id", id)
    }

    pub fn equals(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn not_equals(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(column, CompareOp::Ne, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    pub fn le(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(column, CompareOp::Le, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(column, CompareOp::Gt, value)
    }

    pub fn ge(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(column, CompareOp::Ge, value)
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Like {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::IsNull(column.into())
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::IsNotNull(column.into())
    }

    pub fn in_list<V: Into<FilterValue>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Self::Or(mut filters) => {
                filters.push(other);
                Self::Or(filters)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Renders this filter for table `T`, appending bound values to `binds`.
    ///
    /// Placeholders are positional (`?N`) and numbered after any values
    /// already in `binds`.
    pub(crate) fn to_sql<T: Record>(&self, binds: &mut Vec<Value>) -> RepoResult<String> {
        let sql = match self {
            Self::All => "1 = 1".to_string(),
            Self::Compare { column, op, value } => {
                let column = checked_column::<T>(column)?;
                binds.push(value.clone().into_sql());
                format!("{column} {} ?{}", op.as_sql(), binds.len())
            }
            Self::Like { column, pattern } => {
                let column = checked_column::<T>(column)?;
                binds.push(Value::Text(pattern.clone()));
                format!("{column} LIKE ?{}", binds.len())
            }
            Self::IsNull(column) => format!("{} IS NULL", checked_column::<T>(column)?),
            Self::IsNotNull(column) => format!("{} IS NOT NULL", checked_column::<T>(column)?),
            Self::In { column, values } => {
                let column = checked_column::<T>(column)?;
                if values.is_empty() {
                    return Ok("0 = 1".to_string());
                }
                let mut placeholders = Vec::with_capacity(values.len());
                for value in values {
                    binds.push(value.clone().into_sql());
                    placeholders.push(format!("?{}", binds.len()));
                }
                format!("{column} IN ({})", placeholders.join(", "))
            }
            Self::And(filters) => join_group::<T>(filters, " AND ", "1 = 1", binds)?,
            Self::Or(filters) => join_group::<T>(filters, " OR ", "0 = 1", binds)?,
            Self::Not(inner) => format!("NOT ({})", inner.to_sql::<T>(binds)?),
        };
        Ok(sql)
    }
}

fn join_group<T: Record>(
    filters: &[Filter],
    separator: &str,
    empty: &str,
    binds: &mut Vec<Value>,
) -> RepoResult<String> {
    if filters.is_empty() {
        return Ok(empty.to_string());
    }
    let parts = filters
        .iter()
        .map(|filter| filter.to_sql::<T>(binds).map(|sql| format!("({sql})")))
        .collect::<RepoResult<Vec<_>>>()?;
    Ok(parts.join(separator))
}

fn checked_column<T: Record>(column: &str) -> RepoResult<&str> {
    if T::has_column(column) {
        Ok(column)
    } else {
        Err(RepoError::InvalidFilter(format!(
            "unknown column `{column}` for table `{}`",
            T::TABLE
        )))
    }
}

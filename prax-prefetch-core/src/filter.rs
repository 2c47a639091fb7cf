//! Filter types for building WHERE clauses of prefetch querysets.

use std::cmp::Ordering;

use crate::record::Record;
use crate::value::Value;

/// A complete filter that can be converted to SQL or evaluated against a record.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// No filter (always true).
    #[default]
    None,

    /// Equals comparison.
    Equals(String, Value),
    /// Not equals comparison.
    NotEquals(String, Value),

    /// Less than comparison.
    Lt(String, Value),
    /// Less than or equal comparison.
    Lte(String, Value),
    /// Greater than comparison.
    Gt(String, Value),
    /// Greater than or equal comparison.
    Gte(String, Value),

    /// In a list of values.
    In(String, Vec<Value>),
    /// Not in a list of values.
    NotIn(String, Vec<Value>),

    /// Contains (LIKE %value%).
    Contains(String, Value),
    /// Starts with (LIKE value%).
    StartsWith(String, Value),
    /// Ends with (LIKE %value).
    EndsWith(String, Value),

    /// Is null check.
    IsNull(String),
    /// Is not null check.
    IsNotNull(String),

    /// Logical AND of multiple filters.
    And(Vec<Filter>),
    /// Logical OR of multiple filters.
    Or(Vec<Filter>),
    /// Logical NOT of a filter.
    Not(Box<Filter>),
}

impl Filter {
    /// Create an empty filter (matches everything).
    pub fn none() -> Self {
        Self::None
    }

    /// Check if this filter is empty.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Equality shorthand.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals(column.into(), value.into())
    }

    /// Membership shorthand.
    pub fn is_in(column: impl Into<String>, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    /// Create an AND filter.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.remove(0),
            _ => Self::And(filters),
        }
    }

    /// Create an OR filter.
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.remove(0),
            _ => Self::Or(filters),
        }
    }

    /// Create a NOT filter.
    pub fn not(filter: Filter) -> Self {
        if filter.is_none() {
            return Self::None;
        }
        Self::Not(Box::new(filter))
    }

    /// Combine with another filter using AND.
    pub fn and_then(self, other: Filter) -> Self {
        if self.is_none() {
            return other;
        }
        if other.is_none() {
            return self;
        }
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            _ => Self::And(vec![self, other]),
        }
    }

    /// Generate SQL for this filter with parameter placeholders.
    /// Returns (sql, params) where params are the values to bind.
    pub fn to_sql(&self, param_offset: usize) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = self.write_sql(param_offset, &mut params);
        (sql, params)
    }

    fn write_sql(&self, offset: usize, params: &mut Vec<Value>) -> String {
        let bind = |value: Value, params: &mut Vec<Value>| {
            params.push(value);
            format!("${}", offset + params.len())
        };

        match self {
            Self::None => "TRUE".to_string(),

            Self::Equals(col, val) if val.is_null() => format!("{} IS NULL", col),
            Self::Equals(col, val) => format!("{} = {}", col, bind(val.clone(), params)),
            Self::NotEquals(col, val) if val.is_null() => format!("{} IS NOT NULL", col),
            Self::NotEquals(col, val) => format!("{} != {}", col, bind(val.clone(), params)),

            Self::Lt(col, val) => format!("{} < {}", col, bind(val.clone(), params)),
            Self::Lte(col, val) => format!("{} <= {}", col, bind(val.clone(), params)),
            Self::Gt(col, val) => format!("{} > {}", col, bind(val.clone(), params)),
            Self::Gte(col, val) => format!("{} >= {}", col, bind(val.clone(), params)),

            Self::In(_, values) if values.is_empty() => "FALSE".to_string(),
            Self::In(col, values) => {
                let placeholders: Vec<_> =
                    values.iter().map(|v| bind(v.clone(), params)).collect();
                format!("{} IN ({})", col, placeholders.join(", "))
            }
            Self::NotIn(_, values) if values.is_empty() => "TRUE".to_string(),
            Self::NotIn(col, values) => {
                let placeholders: Vec<_> =
                    values.iter().map(|v| bind(v.clone(), params)).collect();
                format!("{} NOT IN ({})", col, placeholders.join(", "))
            }

            Self::Contains(col, val) => {
                format!("{} LIKE {}", col, bind(like_pattern(val, "%", "%"), params))
            }
            Self::StartsWith(col, val) => {
                format!("{} LIKE {}", col, bind(like_pattern(val, "", "%"), params))
            }
            Self::EndsWith(col, val) => {
                format!("{} LIKE {}", col, bind(like_pattern(val, "%", ""), params))
            }

            Self::IsNull(col) => format!("{} IS NULL", col),
            Self::IsNotNull(col) => format!("{} IS NOT NULL", col),

            Self::And(filters) if filters.is_empty() => "TRUE".to_string(),
            Self::And(filters) => {
                let parts: Vec<_> = filters.iter().map(|f| f.write_sql(offset, params)).collect();
                format!("({})", parts.join(" AND "))
            }
            Self::Or(filters) if filters.is_empty() => "FALSE".to_string(),
            Self::Or(filters) => {
                let parts: Vec<_> = filters.iter().map(|f| f.write_sql(offset, params)).collect();
                format!("({})", parts.join(" OR "))
            }
            Self::Not(filter) => format!("NOT ({})", filter.write_sql(offset, params)),
        }
    }

    /// Evaluate the filter against a record's columns with SQL null semantics:
    /// any comparison against null is false.
    pub fn matches(&self, record: &Record) -> bool {
        let column = |col: &str| record.get(col).unwrap_or(Value::Null);
        let compare = |col: &str, val: &Value, accept: fn(Ordering) -> bool| {
            let current = column(col);
            !current.is_null() && !val.is_null() && accept(current.sort_cmp(val))
        };

        match self {
            Self::None => true,
            Self::Equals(col, val) if val.is_null() => column(col).is_null(),
            Self::Equals(col, val) => compare(col, val, Ordering::is_eq),
            Self::NotEquals(col, val) if val.is_null() => !column(col).is_null(),
            Self::NotEquals(col, val) => compare(col, val, Ordering::is_ne),
            Self::Lt(col, val) => compare(col, val, Ordering::is_lt),
            Self::Lte(col, val) => compare(col, val, Ordering::is_le),
            Self::Gt(col, val) => compare(col, val, Ordering::is_gt),
            Self::Gte(col, val) => compare(col, val, Ordering::is_ge),
            Self::In(col, values) => values.iter().any(|v| compare(col, v, Ordering::is_eq)),
            Self::NotIn(col, values) => {
                !column(col).is_null() && !values.iter().any(|v| compare(col, v, Ordering::is_eq))
            }
            Self::Contains(col, val) => text_match(&column(col), val, |s, n| s.contains(n)),
            Self::StartsWith(col, val) => text_match(&column(col), val, |s, n| s.starts_with(n)),
            Self::EndsWith(col, val) => text_match(&column(col), val, |s, n| s.ends_with(n)),
            Self::IsNull(col) => column(col).is_null(),
            Self::IsNotNull(col) => !column(col).is_null(),
            Self::And(filters) => filters.iter().all(|f| f.matches(record)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(record)),
            Self::Not(filter) => !filter.matches(record),
        }
    }
}

fn like_pattern(val: &Value, prefix: &str, suffix: &str) -> Value {
    match val {
        Value::String(s) => Value::from(format!("{}{}{}", prefix, s, suffix)),
        other => other.clone(),
    }
}

fn text_match(current: &Value, needle: &Value, test: fn(&str, &str) -> bool) -> bool {
    match (current, needle) {
        (Value::String(s), Value::String(n)) => test(s, n),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn record(name: &str, age: Option<i64>) -> Record {
        let mut fields = IndexMap::new();
        fields.insert("id".into(), Value::Int(1));
        fields.insert("name".into(), Value::from(name));
        fields.insert("age".into(), Value::from(age));
        Record::new("Person", "id", fields)
    }

    #[test]
    fn test_filter_equals_sql() {
        let (sql, params) = Filter::eq("email", "test@example.com").to_sql(0);
        assert_eq!(sql, "email = $1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_filter_and() {
        let combined = Filter::and([Filter::eq("name", "Alice"), Filter::Gt("age".into(), Value::Int(18))]);

        let (sql, params) = combined.to_sql(0);
        assert_eq!(sql, "(name = $1 AND age > $2)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_filter_in_with_offset() {
        let (sql, params) = Filter::is_in("status", ["active", "pending"]).to_sql(3);
        assert_eq!(sql, "status IN ($4, $5)");
        assert_eq!(params, vec![Value::from("active"), Value::from("pending")]);
    }

    #[test]
    fn test_filter_contains_sql() {
        let (sql, params) = Filter::Contains("email".into(), "example".into()).to_sql(0);
        assert_eq!(sql, "email LIKE $1");
        assert_eq!(params, vec![Value::from("%example%")]);
    }

    #[test]
    fn test_filter_empty_in() {
        let (sql, params) = Filter::In("id".into(), vec![]).to_sql(0);
        assert_eq!(sql, "FALSE");
        assert!(params.is_empty());
    }

    #[test]
    fn test_matches() {
        let alice = record("Alice", Some(30));
        let anon = record("Anon", None);

        assert!(Filter::eq("name", "Alice").matches(&alice));
        assert!(Filter::StartsWith("name".into(), "Al".into()).matches(&alice));
        assert!(Filter::Gte("age".into(), Value::Int(30)).matches(&alice));
        assert!(!Filter::Gte("age".into(), Value::Int(30)).matches(&anon));
        assert!(!Filter::NotEquals("age".into(), Value::Int(1)).matches(&anon));
        assert!(Filter::IsNull("age".into()).matches(&anon));
        assert!(Filter::not(Filter::eq("name", "Bob")).matches(&alice));
        assert!(Filter::none().matches(&anon));
    }
}

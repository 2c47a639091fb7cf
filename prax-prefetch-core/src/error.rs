//! Error types for prefetch resolution with actionable messages.
//!
//! Every failure carries:
//! - An error code for programmatic handling
//! - The lookup, model and field involved
//! - Suggestions for fixing the lookup
//!
//! # Error Codes
//!
//! Error codes follow a pattern: P{category}{number}
//! - 1xxx: Lookup errors (unknown attribute, ambiguous lookup, etc.)
//! - 5xxx: Execution errors surfaced by the query engine
//! - 7xxx: Configuration and schema errors
//! - 9xxx: Internal errors
//!
//! Callers that care about the broad failure family rather than the exact
//! code match on [`QueryError::kind`]:
//!
//! ```rust
//! use prax_prefetch_core::{ErrorKind, QueryError};
//!
//! let err = QueryError::attribute_not_found("Reader", "xyz", "books_read__xyz");
//! assert_eq!(err.kind(), ErrorKind::Attribute);
//! assert!(err.message.contains("prefetch_related()"));
//! ```

use std::fmt;
use thiserror::Error;

/// Result type for prefetch operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Lookup errors (1xxx)
    /// Related record not found (P1001).
    RecordNotFound = 1001,
    /// Malformed lookup path (P1004).
    InvalidLookup = 1004,
    /// Attribute does not exist on the model (P1006).
    AttributeNotFound = 1006,
    /// Lookup resolves to something that cannot be prefetched (P1007).
    NotPrefetchable = 1007,
    /// Lookup registered twice with different querysets (P1008).
    AmbiguousLookup = 1008,
    /// `to_attr` collides with a model field (P1009).
    ToAttrConflict = 1009,
    /// Custom queryset targets the wrong model (P1010).
    QuerySetMismatch = 1010,

    // Query execution errors (5xxx)
    /// General database error (P5005).
    DatabaseError = 5005,

    // Configuration errors (7xxx)
    /// Invalid configuration (P7001).
    InvalidConfiguration = 7001,
    /// Invalid schema declaration (P7003).
    InvalidSchema = 7003,

    // Internal errors (9xxx)
    /// Internal error (P9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "P1001").
    pub fn code(&self) -> String {
        format!("P{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::RecordNotFound => "Related record not found",
            Self::InvalidLookup => "Invalid lookup",
            Self::AttributeNotFound => "Attribute not found",
            Self::NotPrefetchable => "Lookup does not support prefetching",
            Self::AmbiguousLookup => "Ambiguous lookup",
            Self::ToAttrConflict => "to_attr conflicts with a field",
            Self::QuerySetMismatch => "Queryset targets a different model",
            Self::DatabaseError => "Database error",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::InvalidSchema => "Invalid schema",
            Self::Internal => "Internal error",
        }
    }

    /// The broad family this code belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AttributeNotFound => ErrorKind::Attribute,
            Self::InvalidLookup
            | Self::NotPrefetchable
            | Self::AmbiguousLookup
            | Self::ToAttrConflict
            | Self::QuerySetMismatch => ErrorKind::Value,
            Self::RecordNotFound => ErrorKind::DoesNotExist,
            Self::DatabaseError => ErrorKind::Database,
            Self::InvalidConfiguration | Self::InvalidSchema => ErrorKind::Configuration,
            Self::Internal => ErrorKind::Internal,
        }
    }

    /// Get the documentation URL for this error.
    pub fn docs_url(&self) -> String {
        format!("https://prax.rs/docs/errors/{}", self.code())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Broad error family.
///
/// Lookup resolution distinguishes "the attribute is not there" from "the
/// attribute is there but used wrongly", and both from a related row that
/// does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown attribute on a model or record.
    Attribute,
    /// Attribute exists but the lookup uses it incorrectly.
    Value,
    /// A single-valued relation has no related row.
    DoesNotExist,
    /// The query engine failed.
    Database,
    /// Schema or configuration is invalid.
    Configuration,
    /// Bug in the engine.
    Internal,
}

/// Suggestion for fixing an error.
#[derive(Debug, Clone)]
pub struct Suggestion {
    /// The suggestion text.
    pub text: String,
    /// Optional code example.
    pub code: Option<String>,
}

impl Suggestion {
    /// Create a new suggestion.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            code: None,
        }
    }

    /// Add a code example.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The model involved.
    pub model: Option<String>,
    /// The field involved.
    pub field: Option<String>,
    /// The lookup path being resolved.
    pub lookup: Option<String>,
    /// The SQL query (if available).
    pub sql: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<Suggestion>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors that can occur while resolving prefetch lookups.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(Suggestion::new(suggestion));
        self
    }

    /// Add a code suggestion.
    pub fn with_code_suggestion(mut self, text: impl Into<String>, code: impl Into<String>) -> Self {
        self.context.suggestions.push(Suggestion::new(text).with_code(code));
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.context.model = Some(model.into());
        self
    }

    /// Set the field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.context.field = Some(field.into());
        self
    }

    /// Set the lookup path.
    pub fn with_lookup(mut self, lookup: impl Into<String>) -> Self {
        self.context.lookup = Some(lookup.into());
        self
    }

    /// Set the SQL query.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.context.sql = Some(sql.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// A lookup segment names an attribute the model does not have.
    pub fn attribute_not_found(
        model: impl Into<String>,
        attr: impl Into<String>,
        lookup: impl Into<String>,
    ) -> Self {
        let model = model.into();
        let attr = attr.into();
        let lookup = lookup.into();
        Self::new(
            ErrorCode::AttributeNotFound,
            format!(
                "Cannot find '{}' on {} object, '{}' is an invalid parameter to prefetch_related()",
                attr, model, lookup
            ),
        )
        .with_model(&model)
        .with_field(&attr)
        .with_lookup(&lookup)
        .with_suggestion(format!("Check the spelling of '{}' against the {} schema", attr, model))
    }

    /// A lookup resolves to a plain field or otherwise non-prefetchable value.
    pub fn not_prefetchable(lookup: impl Into<String>, field: impl Into<String>) -> Self {
        let lookup = lookup.into();
        let field = field.into();
        Self::new(
            ErrorCode::NotPrefetchable,
            format!(
                "'{}' does not resolve to an item that supports prefetching - this is an invalid parameter to prefetch_related().",
                lookup
            ),
        )
        .with_field(&field)
        .with_lookup(&lookup)
        .with_suggestion(format!("'{}' is not a relation; drop it from the lookup", field))
    }

    /// The same path was registered with two different querysets.
    pub fn ambiguous_lookup(lookup: impl Into<String>) -> Self {
        let lookup = lookup.into();
        Self::new(
            ErrorCode::AmbiguousLookup,
            format!(
                "'{}' lookup was already seen with a different queryset. You may need to adjust the ordering of your lookups.",
                lookup
            ),
        )
        .with_lookup(&lookup)
        .with_help("Register the custom Prefetch before any plain lookup that traverses it")
    }

    /// A `to_attr` collides with an existing field or relation.
    pub fn to_attr_conflict(model: impl Into<String>, to_attr: impl Into<String>) -> Self {
        let model = model.into();
        let to_attr = to_attr.into();
        Self::new(
            ErrorCode::ToAttrConflict,
            format!("to_attr={} conflicts with a field on the {} model.", to_attr, model),
        )
        .with_model(&model)
        .with_field(&to_attr)
        .with_suggestion("Pick a to_attr name that is not a field or relation of the model")
    }

    /// A custom queryset was supplied for a different model than the relation's target.
    pub fn queryset_mismatch(
        lookup: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        let lookup = lookup.into();
        let expected = expected.into();
        let found = found.into();
        Self::new(
            ErrorCode::QuerySetMismatch,
            format!(
                "Prefetch querysets for '{}' must target {}, got a {} queryset.",
                lookup, expected, found
            ),
        )
        .with_model(&expected)
        .with_lookup(&lookup)
    }

    /// A lookup string could not be parsed.
    pub fn invalid_lookup(lookup: impl Into<String>, message: impl Into<String>) -> Self {
        let lookup = lookup.into();
        let message = message.into();
        Self::new(
            ErrorCode::InvalidLookup,
            format!("Invalid lookup '{}': {}", lookup, message),
        )
        .with_lookup(&lookup)
    }

    /// A single-valued relation has no related row.
    pub fn does_not_exist(model: impl Into<String>, relation: impl Into<String>) -> Self {
        let model = model.into();
        let relation = relation.into();
        Self::new(
            ErrorCode::RecordNotFound,
            format!("{} has no {}.", model, relation),
        )
        .with_model(&model)
        .with_field(&relation)
        .with_code_suggestion(
            "Prefetch into a to_attr to get None instead of an error",
            format!("LookupSpec::new(\"{}\").to_attr(\"{}_or_none\")", relation, relation),
        )
    }

    /// Create a general database error.
    pub fn database(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::DatabaseError, message)
            .with_suggestion("Check the database logs for more details")
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message.into())
    }

    /// Create a schema declaration error.
    pub fn schema(model: impl Into<String>, message: impl Into<String>) -> Self {
        let model = model.into();
        let message = message.into();
        Self::new(ErrorCode::InvalidSchema, format!("Invalid schema for {}: {}", model, message))
            .with_model(&model)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message))
            .with_help("This is likely a bug in Prax - please report it at https://github.com/pegasusheavy/prax/issues")
    }

    // ============== Error Checks ==============

    /// The broad family of this error.
    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// Check if this is a missing related record.
    pub fn is_does_not_exist(&self) -> bool {
        self.code == ErrorCode::RecordNotFound
    }

    /// Check if this is an unknown-attribute error.
    pub fn is_attribute_error(&self) -> bool {
        self.kind() == ErrorKind::Attribute
    }

    /// Check if this is a misused-attribute error.
    pub fn is_value_error(&self) -> bool {
        self.kind() == ErrorKind::Value
    }

    // ============== Display Functions ==============

    /// Get the documentation URL for this error.
    pub fn docs_url(&self) -> String {
        self.code.docs_url()
    }

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error [{}]: {}\n", self.code.code(), self.message));

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  → While: {}\n", op));
        }
        if let Some(ref lookup) = self.context.lookup {
            output.push_str(&format!("  → Lookup: {}\n", lookup));
        }
        if let Some(ref model) = self.context.model {
            output.push_str(&format!("  → Model: {}\n", model));
        }
        if let Some(ref field) = self.context.field {
            output.push_str(&format!("  → Field: {}\n", field));
        }

        // SQL (truncated if too long)
        if let Some(ref sql) = self.context.sql {
            let sql_display = match sql.char_indices().nth(200) {
                Some((idx, _)) => format!("{}...", &sql[..idx]),
                None => sql.clone(),
            };
            output.push_str(&format!("  → SQL: {}\n", sql_display));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion.text));
                if let Some(ref code) = suggestion.code {
                    output.push_str(&format!("     ```\n     {}\n     ```\n", code.replace('\n', "\n     ")));
                }
            }
        }

        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output.push_str(&format!("\nMore info: {}\n", self.docs_url()));

        output
    }
}

/// Helper for creating errors with context.
#[macro_export]
macro_rules! query_error {
    ($code:expr, $msg:expr) => {
        $crate::error::QueryError::new($code, $msg)
    };
    ($code:expr, $msg:expr, $($key:ident = $value:expr),+ $(,)?) => {{
        let mut err = $crate::error::QueryError::new($code, $msg);
        $(
            err = err.$key($value);
        )+
        err
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::RecordNotFound.code(), "P1001");
        assert_eq!(ErrorCode::AmbiguousLookup.code(), "P1008");
        assert_eq!(ErrorCode::InvalidSchema.code(), "P7003");
    }

    #[test]
    fn test_kinds() {
        assert_eq!(ErrorCode::AttributeNotFound.kind(), ErrorKind::Attribute);
        assert_eq!(ErrorCode::NotPrefetchable.kind(), ErrorKind::Value);
        assert_eq!(ErrorCode::ToAttrConflict.kind(), ErrorKind::Value);
        assert_eq!(ErrorCode::RecordNotFound.kind(), ErrorKind::DoesNotExist);
        assert_eq!(ErrorCode::InvalidSchema.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_attribute_not_found_message() {
        let err = QueryError::attribute_not_found("Reader", "xyz", "books_read__xyz");
        assert!(err.is_attribute_error());
        assert_eq!(
            err.message,
            "Cannot find 'xyz' on Reader object, 'books_read__xyz' is an invalid parameter to prefetch_related()"
        );
        assert_eq!(err.context.lookup.as_deref(), Some("books_read__xyz"));
    }

    #[test]
    fn test_not_prefetchable_message() {
        let err = QueryError::not_prefetchable("authors__name", "name");
        assert!(err.is_value_error());
        assert!(err.message.contains("prefetch_related"));
        assert!(err.message.contains("authors__name"));
        assert_eq!(err.context.field.as_deref(), Some("name"));
    }

    #[test]
    fn test_to_attr_conflict_message() {
        let err = QueryError::to_attr_conflict("Book", "authors");
        assert_eq!(err.message, "to_attr=authors conflicts with a field on the Book model.");
    }

    #[test]
    fn test_does_not_exist() {
        let err = QueryError::does_not_exist("Room", "main_room_of");
        assert!(err.is_does_not_exist());
        assert!(!err.context.suggestions.is_empty());
    }

    #[test]
    fn test_display_full() {
        let err = QueryError::ambiguous_lookup("houses").with_context("Registering lookups");

        let output = err.display_full();
        assert!(output.contains("P1008"));
        assert!(output.contains("Lookup: houses"));
        assert!(output.contains("Help"));
    }

    #[test]
    fn test_error_macro() {
        let err = query_error!(
            ErrorCode::InvalidLookup,
            "Empty segment",
            with_lookup = "books____name",
            with_suggestion = "Remove the doubled separator"
        );

        assert_eq!(err.code, ErrorCode::InvalidLookup);
        assert_eq!(err.context.lookup, Some("books____name".to_string()));
    }
}

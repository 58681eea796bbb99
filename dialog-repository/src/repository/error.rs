//! Repository error types
//!
//! Every repository call fails with a [`RepositoryError`] that records which
//! operation failed, the failure category and, where known, the collection
//! and document involved. Store failures keep their category: a duplicate
//! key stays a duplicate key all the way to the caller.
//!
//! # Example
//!
//! ```rust
//! use dialog_repository::repository::{RepositoryError, RepositoryErrorKind};
//!
//! let error = RepositoryError::not_found("Users", "65f0c0ffee00000000000001");
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert!(error.entity_id.is_some());
//! ```

use std::fmt;

use crate::store::StoreError;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Inserting a new document
    Create,
    /// Persisting an entity (insert or replace)
    Save,
    /// Counting documents matching a filter
    Count,
    /// Finding documents matching a filter
    Find,
    /// Finding the first document matching a filter
    FindOne,
    /// Fetching a single document by id
    FindById,
    /// Fetching documents by a list of ids
    FindByIds,
    /// Count and fetch of one page
    FindPage,
    /// Running an aggregation pipeline
    Aggregate,
    /// Count and fetch of one page of an aggregation
    AggregatePage,
    /// Removing one entity
    Remove,
    /// Removing every entity
    RemoveAll,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Save => write!(f, "save"),
            Self::Count => write!(f, "count"),
            Self::Find => write!(f, "find"),
            Self::FindOne => write!(f, "find_one"),
            Self::FindById => write!(f, "find_by_id"),
            Self::FindByIds => write!(f, "find_by_ids"),
            Self::FindPage => write!(f, "find_page"),
            Self::Aggregate => write!(f, "aggregate"),
            Self::AggregatePage => write!(f, "aggregate_page"),
            Self::Remove => write!(f, "remove"),
            Self::RemoveAll => write!(f, "remove_all"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// A unique index already holds the key
    DuplicateKey,
    /// A required path was missing; see [`RepositoryError::path`]
    ValidationFailed,
    /// The target of a save does not exist
    NotFound,
    /// The store rejected a filter, update or pipeline stage
    InvalidQuery,
    /// Entity to document conversion failed
    Serialization,
    /// Any other store failure
    Store,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey => write!(f, "duplicate_key"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::NotFound => write!(f, "not_found"),
            Self::InvalidQuery => write!(f, "invalid_query"),
            Self::Serialization => write!(f, "serialization"),
            Self::Store => write!(f, "store"),
        }
    }
}

/// Structured repository error with operation context
///
/// # Example
///
/// ```rust
/// use dialog_repository::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
///
/// let error = RepositoryError::new(
///     RepositoryOperation::Create,
///     RepositoryErrorKind::DuplicateKey,
///     "E11000 duplicate key error",
/// )
/// .with_collection("Users");
///
/// assert_eq!(
///     error.to_string(),
///     "Repository duplicate_key error during create: E11000 duplicate key error [Users]"
/// );
/// assert!(!error.is_retriable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The collection involved
    pub collection: Option<String>,
    /// The id of the document involved
    pub entity_id: Option<String>,
    /// First violating path for validation failures
    pub path: Option<String>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            collection: None,
            entity_id: None,
            path: None,
        }
    }

    /// Create a "not found" error for a save that targeted a missing document
    pub fn not_found(collection: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            operation: RepositoryOperation::Save,
            kind: RepositoryErrorKind::NotFound,
            message: "Entity not found".to_string(),
            collection: Some(collection.into()),
            entity_id: Some(entity_id.into()),
            path: None,
        }
    }

    /// Create a serialization error
    pub fn serialization(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Serialization, message)
    }

    /// Translate a store failure, preserving its category
    pub fn from_store(operation: RepositoryOperation, error: StoreError) -> Self {
        let message = error.to_string();
        match error {
            StoreError::DuplicateKey { .. } => {
                Self::new(operation, RepositoryErrorKind::DuplicateKey, message)
            }
            StoreError::Validation { path, .. } => {
                let mut err = Self::new(operation, RepositoryErrorKind::ValidationFailed, message);
                err.path = Some(path);
                err
            }
            StoreError::DocumentNotFound(id) => {
                Self::new(operation, RepositoryErrorKind::NotFound, message)
                    .with_entity_id(id.as_str())
            }
            StoreError::InvalidQuery(_) => {
                Self::new(operation, RepositoryErrorKind::InvalidQuery, message)
            }
            StoreError::Backend(_) => Self::new(operation, RepositoryErrorKind::Store, message),
        }
    }

    /// Add the collection name to an existing error
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Add the document id to an existing error
    #[must_use]
    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Check if this error is retriable
    ///
    /// Repositories never retry and every category they produce is
    /// permanent from their point of view, so this is always `false`.
    pub fn is_retriable(&self) -> bool {
        false
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        match (&self.collection, &self.entity_id) {
            (Some(collection), Some(entity_id)) => write!(f, " [{collection}: {entity_id}]")?,
            (Some(collection), None) => write!(f, " [{collection}]")?,
            _ => {}
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DocumentId;

    #[test]
    fn test_repository_operation_display() {
        assert_eq!(format!("{}", RepositoryOperation::FindById), "find_by_id");
        assert_eq!(format!("{}", RepositoryOperation::FindPage), "find_page");
        assert_eq!(
            format!("{}", RepositoryOperation::AggregatePage),
            "aggregate_page"
        );
        assert_eq!(format!("{}", RepositoryOperation::RemoveAll), "remove_all");
    }

    #[test]
    fn test_repository_error_kind_display() {
        assert_eq!(
            format!("{}", RepositoryErrorKind::DuplicateKey),
            "duplicate_key"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::ValidationFailed),
            "validation_failed"
        );
        assert_eq!(format!("{}", RepositoryErrorKind::Store), "store");
    }

    #[test]
    fn test_from_store_keeps_duplicate_key() {
        let error = RepositoryError::from_store(
            RepositoryOperation::Create,
            StoreError::DuplicateKey {
                index: "uni_1_username_1".to_string(),
                key: "{ uni: \"u\", username: \"a\" }".to_string(),
            },
        );
        assert_eq!(error.kind, RepositoryErrorKind::DuplicateKey);
        assert_eq!(error.operation, RepositoryOperation::Create);
        assert!(error.message.contains("uni_1_username_1"));
    }

    #[test]
    fn test_from_store_carries_validation_path() {
        let error = RepositoryError::from_store(
            RepositoryOperation::Save,
            StoreError::Validation {
                path: "password".to_string(),
                message: "Path `password` is required.".to_string(),
            },
        );
        assert_eq!(error.kind, RepositoryErrorKind::ValidationFailed);
        assert_eq!(error.path.as_deref(), Some("password"));
    }

    #[test]
    fn test_from_store_not_found_and_invalid_query() {
        let error = RepositoryError::from_store(
            RepositoryOperation::Save,
            StoreError::DocumentNotFound(DocumentId::new("abc")),
        );
        assert_eq!(error.kind, RepositoryErrorKind::NotFound);
        assert_eq!(error.entity_id.as_deref(), Some("abc"));

        let error = RepositoryError::from_store(
            RepositoryOperation::Aggregate,
            StoreError::InvalidQuery("unrecognized pipeline stage name: '$foo'".to_string()),
        );
        assert_eq!(error.kind, RepositoryErrorKind::InvalidQuery);
    }

    #[test]
    fn test_display_with_collection_and_entity() {
        let error = RepositoryError::not_found("Users", "usr_123");
        let display = format!("{}", error);
        assert!(display.contains("not_found"));
        assert!(display.contains("save"));
        assert!(display.contains("[Users: usr_123]"));
    }

    #[test]
    fn test_display_without_context() {
        let error = RepositoryError::serialization(RepositoryOperation::Find, "bad field");
        let display = format!("{}", error);
        assert_eq!(
            display,
            "Repository serialization error during find: bad field"
        );
    }

    #[test]
    fn test_no_kind_is_retriable() {
        assert!(!RepositoryError::not_found("Users", "1").is_retriable());
        assert!(
            !RepositoryError::from_store(
                RepositoryOperation::Count,
                StoreError::Backend("connection reset".to_string())
            )
            .is_retriable()
        );
    }

    #[test]
    fn test_with_operation() {
        let error = RepositoryError::serialization(RepositoryOperation::Find, "x")
            .with_operation(RepositoryOperation::FindOne);
        assert_eq!(error.operation, RepositoryOperation::FindOne);
    }
}

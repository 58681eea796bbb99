//! Query scopes
//!
//! A scope reshapes every read a repository issues. The plain scope passes
//! filters through untouched; the soft-delete scope hides documents whose
//! `deleted` flag is set.

use std::fmt;

use serde_json::Value;

use crate::store::Document;

/// Field marking a soft-deleted document
pub const DELETED_FIELD: &str = "deleted";

/// Filter and pipeline shaping applied to repository reads
pub trait QueryScope: Send + Sync + fmt::Debug {
    /// Restrict a caller filter to the documents this scope exposes
    fn scope_filter(&self, filter: Document) -> Document;

    /// Stages placed before caller aggregation stages
    fn pipeline_prefix(&self) -> Vec<Document>;

    /// Whether a document fetched without a filter is exposed
    fn is_visible(&self, document: &Document) -> bool;
}

/// Exposes every document
#[derive(Debug, Clone, Copy, Default)]
pub struct Unscoped;

impl QueryScope for Unscoped {
    fn scope_filter(&self, filter: Document) -> Document {
        filter
    }

    fn pipeline_prefix(&self) -> Vec<Document> {
        Vec::new()
    }

    fn is_visible(&self, _document: &Document) -> bool {
        true
    }
}

/// Hides soft-deleted documents
#[derive(Debug, Clone, Copy, Default)]
pub struct ExcludeDeleted;

impl ExcludeDeleted {
    fn not_deleted() -> Document {
        let mut clause = Document::new();
        clause.insert(DELETED_FIELD.to_string(), Value::Bool(false));
        clause
    }
}

impl QueryScope for ExcludeDeleted {
    fn scope_filter(&self, mut filter: Document) -> Document {
        if !filter.contains_key(DELETED_FIELD) {
            filter.insert(DELETED_FIELD.to_string(), Value::Bool(false));
            return filter;
        }
        // The caller constrained `deleted` too; both must hold.
        let mut combined = Document::new();
        combined.insert(
            "$and".to_string(),
            Value::Array(vec![
                Value::Object(filter),
                Value::Object(Self::not_deleted()),
            ]),
        );
        combined
    }

    fn pipeline_prefix(&self) -> Vec<Document> {
        let mut stage = Document::new();
        stage.insert("$match".to_string(), Value::Object(Self::not_deleted()));
        vec![stage]
    }

    fn is_visible(&self, document: &Document) -> bool {
        document.get(DELETED_FIELD) != Some(&Value::Bool(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_unscoped_is_identity() {
        let filter = doc!({"uni": "acme"});
        assert_eq!(Unscoped.scope_filter(filter.clone()), filter);
        assert!(Unscoped.pipeline_prefix().is_empty());
        assert!(Unscoped.is_visible(&doc!({"deleted": true})));
    }

    #[test]
    fn test_exclude_deleted_adds_flag() {
        assert_eq!(ExcludeDeleted.scope_filter(Document::new()), doc!({"deleted": false}));
        assert_eq!(
            ExcludeDeleted.scope_filter(doc!({"uni": "acme"})),
            doc!({"uni": "acme", "deleted": false})
        );
    }

    #[test]
    fn test_exclude_deleted_cannot_be_overridden() {
        assert_eq!(
            ExcludeDeleted.scope_filter(doc!({"deleted": true})),
            doc!({"$and": [{"deleted": true}, {"deleted": false}]})
        );
    }

    #[test]
    fn test_exclude_deleted_prefix_and_visibility() {
        assert_eq!(
            ExcludeDeleted.pipeline_prefix(),
            vec![doc!({"$match": {"deleted": false}})]
        );
        assert!(ExcludeDeleted.is_visible(&doc!({"deleted": false})));
        assert!(ExcludeDeleted.is_visible(&doc!({})));
        assert!(!ExcludeDeleted.is_visible(&doc!({"deleted": true})));
    }
}

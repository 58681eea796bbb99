//! Soft delete overlay
//!
//! [`SoftDeleteRepository`] keeps the whole [`Repository`] contract but
//! makes deletion logical. Removing an entity sets `deleted`, `deletedAt`
//! and `deletedBy` on the stored document, and every read hides documents
//! whose `deleted` flag is set:
//!
//! - `find`, `find_one`, `count`, `find_page` and `find_by_ids` add
//!   `deleted: false` to the caller's filter
//! - `aggregate` and `aggregate_page` run `{$match: {deleted: false}}` before
//!   the caller's stages
//! - `find_by_id` fetches by id and discards a deleted document
//!
//! [`SoftDeleteRepository::find_with_deleted`] reads past the overlay for
//! audit views.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::base::{DocumentRepository, RepositoryOptions};
use super::error::RepositoryOperation;
use super::gate::IndexGate;
use super::pagination::{Page, Pageable, Sort};
use super::scope::{ExcludeDeleted, DELETED_FIELD};
use super::traits::{Entity, Repository, RepositoryResult, Save};
use crate::store::{Collection, CollectionSchema, Document, DocumentId, DocumentStore};

const DELETED_AT_FIELD: &str = "deletedAt";
const DELETED_BY_FIELD: &str = "deletedBy";

/// Deletion state carried by soft-deletable entities
///
/// Embed it with `#[serde(flatten)]`. Timestamps are stored as epoch
/// milliseconds so they order correctly inside the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftDeleteFields {
    /// Whether the entity has been removed
    #[serde(default)]
    pub deleted: bool,
    /// When the entity was removed
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Who removed the entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,
}

fn deletion_fields(deleted_by: &str, deleted_at: DateTime<Utc>) -> Document {
    let mut fields = Document::new();
    fields.insert(DELETED_FIELD.to_string(), Value::Bool(true));
    fields.insert(
        DELETED_AT_FIELD.to_string(),
        Value::from(deleted_at.timestamp_millis()),
    );
    fields.insert(DELETED_BY_FIELD.to_string(), Value::from(deleted_by));
    fields
}

/// An entity whose removal is logical
pub trait SoftDeletable: Entity {
    /// Current deletion state
    fn soft_delete(&self) -> &SoftDeleteFields;

    /// Whether the entity has been removed
    fn is_deleted(&self) -> bool {
        self.soft_delete().deleted
    }
}

/// Repository with logical deletion
///
/// # Example
///
/// ```rust,ignore
/// let mappings = SoftDeleteRepository::<NewMapping, Mapping>::open(&*store, schema);
/// let mapping = mappings.create(new_mapping).await?;
/// mappings.remove_as(mapping, "operator-7", Utc::now()).await?;
///
/// assert_eq!(mappings.count_all().await?, 0);
/// assert_eq!(mappings.find_with_deleted(doc!({}), &[]).await?.len(), 1);
/// ```
pub struct SoftDeleteRepository<I, E> {
    inner: DocumentRepository<I, E>,
}

impl<I, E> Clone for SoftDeleteRepository<I, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<I, E> std::fmt::Debug for SoftDeleteRepository<I, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SoftDeleteRepository").field(&self.inner).finish()
    }
}

impl<I, E> SoftDeleteRepository<I, E> {
    /// Wrap `collection` with the soft delete overlay
    pub fn new(collection: Arc<dyn Collection>) -> Self {
        Self::with_options(collection, RepositoryOptions::default())
    }

    /// Wrap `collection` with explicit options
    pub fn with_options(collection: Arc<dyn Collection>, options: RepositoryOptions) -> Self {
        Self {
            inner: DocumentRepository::with_scope(collection, Arc::new(ExcludeDeleted), options),
        }
    }

    /// Open the collection declared by `schema`, defaulting `deleted` to `false`
    pub fn open(store: &dyn DocumentStore, schema: CollectionSchema) -> Self {
        Self::new(store.collection(schema.default_value(DELETED_FIELD, false)))
    }

    /// Underlying collection
    pub fn collection(&self) -> &Arc<dyn Collection> {
        self.inner.collection()
    }

    /// Index readiness gate
    pub fn gate(&self) -> &IndexGate {
        self.inner.gate()
    }

    pub fn options(&self) -> &RepositoryOptions {
        self.inner.options()
    }
}

impl<I, E> SoftDeleteRepository<I, E>
where
    I: Serialize + Send + Sync,
    E: SoftDeletable,
{
    /// Mark `entity` deleted by `deleted_by` at `deleted_at`
    ///
    /// Only the deletion fields of the stored document are written; other
    /// fields of `entity` are ignored and the stored document is returned.
    /// Removing an already deleted entity stamps it again.
    pub async fn remove_as(
        &self,
        entity: E,
        deleted_by: impl Into<String>,
        deleted_at: DateTime<Utc>,
    ) -> RepositoryResult<E> {
        let deleted_by = deleted_by.into();
        let removed = self
            .inner
            .set_one(
                entity.id(),
                deletion_fields(&deleted_by, deleted_at),
                RepositoryOperation::Remove,
            )
            .await?;
        tracing::debug!(
            collection = %self.inner.collection().name(),
            id = %removed.id(),
            %deleted_by,
            "Soft deleted document"
        );
        Ok(removed)
    }

    /// Mark every document deleted by `deleted_by` at `deleted_at`
    ///
    /// Returns the number of documents stamped, already deleted ones included.
    pub async fn remove_all_as(
        &self,
        deleted_by: impl Into<String>,
        deleted_at: DateTime<Utc>,
    ) -> RepositoryResult<u64> {
        let deleted_by = deleted_by.into();
        let stamped = self
            .inner
            .set_all(
                &Document::new(),
                deletion_fields(&deleted_by, deleted_at),
                RepositoryOperation::RemoveAll,
            )
            .await?;
        tracing::debug!(
            collection = %self.inner.collection().name(),
            stamped,
            %deleted_by,
            "Soft deleted all documents"
        );
        Ok(stamped)
    }

    /// Find documents matching `query` including deleted ones
    pub async fn find_with_deleted(
        &self,
        query: Document,
        sorts: &[Sort],
    ) -> RepositoryResult<Vec<E>> {
        self.inner
            .find_unscoped(&query, sorts, RepositoryOperation::Find)
            .await
    }
}

impl<I, E> Repository<I, E> for SoftDeleteRepository<I, E>
where
    I: Serialize + Send + Sync,
    E: SoftDeletable,
{
    async fn wait_indexed(&self) -> bool {
        self.inner.wait_indexed().await
    }

    async fn create(&self, data: I) -> RepositoryResult<E> {
        self.inner.create(data).await
    }

    async fn save(&self, entity: Save<I, E>) -> RepositoryResult<E> {
        self.inner.save(entity).await
    }

    async fn count(&self, query: Document) -> RepositoryResult<u64> {
        self.inner.count(query).await
    }

    async fn find(&self, query: Document, sorts: &[Sort]) -> RepositoryResult<Vec<E>> {
        self.inner.find(query, sorts).await
    }

    async fn find_one(&self, query: Document) -> RepositoryResult<Option<E>> {
        self.inner.find_one(query).await
    }

    async fn find_by_id(&self, id: &DocumentId) -> RepositoryResult<Option<E>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_field_values(
        &self,
        field: &str,
        values: Vec<Value>,
        sorts: &[Sort],
    ) -> RepositoryResult<Vec<E>> {
        self.inner.find_by_field_values(field, values, sorts).await
    }

    async fn find_page(&self, pageable: &Pageable, query: Document) -> RepositoryResult<Page<E>> {
        self.inner.find_page(pageable, query).await
    }

    async fn aggregate(&self, stages: Vec<Document>) -> RepositoryResult<Vec<Document>> {
        self.inner.aggregate(stages).await
    }

    async fn aggregate_page(
        &self,
        pageable: &Pageable,
        stages: Vec<Document>,
    ) -> RepositoryResult<Page<Document>> {
        self.inner.aggregate_page(pageable, stages).await
    }

    /// Soft delete as the configured system actor, now
    async fn remove(&self, entity: E) -> RepositoryResult<E> {
        let actor = self.inner.options().system_actor.clone();
        self.remove_as(entity, actor, Utc::now()).await
    }

    /// Soft delete every document as the configured system actor, now
    async fn remove_all(&self) -> RepositoryResult<u64> {
        let actor = self.inner.options().system_actor.clone();
        self.remove_all_as(actor, Utc::now()).await
    }
}

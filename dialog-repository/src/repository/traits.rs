//! Repository trait definitions
//!
//! This module provides the generic repository contract using RPITIT
//! (Return Position Impl Trait In Traits), available since Rust 1.75.
//!
//! # Overview
//!
//! - [`Entity`]: a persisted document type with an `_id`
//! - [`Repository`]: CRUD, paging and aggregation over one collection
//! - [`Save`]: insert-or-replace input for [`Repository::save`]
//!
//! Both [`DocumentRepository`](super::DocumentRepository) and
//! [`SoftDeleteRepository`](super::SoftDeleteRepository) implement
//! [`Repository`], so callers can stay agnostic of whether deletion is
//! physical or logical.
//!
//! # Example
//!
//! ```rust,ignore
//! use dialog_repository::repository::{Pageable, Repository, Sort};
//!
//! async fn newest_first<R: Repository<NewUser, User>>(repo: &R) -> RepositoryResult<Page<User>> {
//!     let pageable = Pageable::new(0, 20, vec![Sort::desc("_id")])?;
//!     repo.find_all_page(&pageable).await
//! }
//! ```

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::error::RepositoryError;
use super::pagination::{Page, Pageable, Sort};
use crate::store::{Document, DocumentId};

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// A persisted document type
///
/// The id is stored under `_id`; implementors typically declare
/// `#[serde(rename = "_id")] id: DocumentId`.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Identifier assigned by the store
    fn id(&self) -> &DocumentId;
}

/// Input to [`Repository::save`]
#[derive(Debug, Clone, PartialEq)]
pub enum Save<I, E> {
    /// Data not yet persisted; inserted like [`Repository::create`]
    New(I),
    /// An already persisted entity; replaces the stored document
    Existing(E),
}

/// Generic repository over one collection
///
/// # Type Parameters
///
/// - `I`: data accepted by [`create`](Repository::create)
/// - `E`: the persisted entity returned by reads
///
/// Queries are store filter documents (see [`crate::store::query`]). An
/// empty sort list leaves ordering to the store's natural order.
pub trait Repository<I, E>: Send + Sync
where
    I: Serialize + Send,
    E: Entity,
{
    /// Wait until the collection's indexes are built
    ///
    /// Resolves immediately once they are.
    fn wait_indexed(&self) -> impl Future<Output = bool> + Send;

    /// Insert new data
    ///
    /// # Errors
    ///
    /// `DuplicateKey` when a unique index already holds the key and
    /// `ValidationFailed` when a required path is missing.
    fn create(&self, data: I) -> impl Future<Output = RepositoryResult<E>> + Send;

    /// Insert new data or replace an existing entity
    ///
    /// # Errors
    ///
    /// As [`create`](Repository::create), plus `NotFound` when an existing
    /// entity's document is gone.
    fn save(&self, entity: Save<I, E>) -> impl Future<Output = RepositoryResult<E>> + Send;

    /// Count documents matching `query`
    fn count(&self, query: Document) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Count every document
    fn count_all(&self) -> impl Future<Output = RepositoryResult<u64>> + Send {
        self.count(Document::new())
    }

    /// Find documents matching `query`
    fn find(
        &self,
        query: Document,
        sorts: &[Sort],
    ) -> impl Future<Output = RepositoryResult<Vec<E>>> + Send;

    /// Find the first document matching `query`
    fn find_one(&self, query: Document) -> impl Future<Output = RepositoryResult<Option<E>>> + Send;

    /// Find every document
    fn find_all(&self, sorts: &[Sort]) -> impl Future<Output = RepositoryResult<Vec<E>>> + Send {
        self.find(Document::new(), sorts)
    }

    /// Fetch one entity by id
    fn find_by_id(
        &self,
        id: &DocumentId,
    ) -> impl Future<Output = RepositoryResult<Option<E>>> + Send;

    /// Fetch the entities whose `_id` is in `ids`
    fn find_by_ids(
        &self,
        ids: &[DocumentId],
        sorts: &[Sort],
    ) -> impl Future<Output = RepositoryResult<Vec<E>>> + Send {
        let values = ids.iter().cloned().map(Value::from).collect();
        self.find_by_field_values(crate::store::ID_FIELD, values, sorts)
    }

    /// Fetch the entities whose `field` is one of `values`
    fn find_by_field_values(
        &self,
        field: &str,
        values: Vec<Value>,
        sorts: &[Sort],
    ) -> impl Future<Output = RepositoryResult<Vec<E>>> + Send;

    /// Fetch one page of documents matching `query`
    ///
    /// The total is counted first, then `page_size` elements are fetched
    /// after skipping `page_size * page_number`. The two store calls are
    /// independent, so concurrent writes can make them disagree.
    fn find_page(
        &self,
        pageable: &Pageable,
        query: Document,
    ) -> impl Future<Output = RepositoryResult<Page<E>>> + Send;

    /// Fetch one page of every document
    fn find_all_page(
        &self,
        pageable: &Pageable,
    ) -> impl Future<Output = RepositoryResult<Page<E>>> + Send {
        self.find_page(pageable, Document::new())
    }

    /// Run an aggregation pipeline
    fn aggregate(
        &self,
        stages: Vec<Document>,
    ) -> impl Future<Output = RepositoryResult<Vec<Document>>> + Send;

    /// Fetch one page of an aggregation pipeline's output
    ///
    /// The total comes from the pipeline followed by `$count`. When it is
    /// zero the data pipeline is not run.
    fn aggregate_page(
        &self,
        pageable: &Pageable,
        stages: Vec<Document>,
    ) -> impl Future<Output = RepositoryResult<Page<Document>>> + Send;

    /// Remove one entity, returning it
    fn remove(&self, entity: E) -> impl Future<Output = RepositoryResult<E>> + Send;

    /// Remove every entity, returning how many were affected
    fn remove_all(&self) -> impl Future<Output = RepositoryResult<u64>> + Send;
}

//! Document repository over a single collection
//!
//! [`DocumentRepository`] implements [`Repository`] on top of any
//! [`Collection`]. It converts entities to and from documents, applies its
//! [`QueryScope`] to every read, computes pages and registers the
//! collection's index event with an [`IndexGate`].

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::error::{RepositoryError, RepositoryOperation};
use super::gate::IndexGate;
use super::pagination::{sort_document, Page, Pageable, Sort};
use super::scope::{QueryScope, Unscoped};
use super::traits::{Entity, Repository, RepositoryResult, Save};
use crate::config::RepositoryConfig;
use crate::store::{
    AggregateOptions, Collection, CollectionSchema, Document, DocumentId, DocumentStore,
    FindOptions, StoreError,
};

/// Field the aggregation page count is written to
const COUNT_FIELD: &str = "count";

/// Per-repository settings
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryOptions {
    /// Let aggregation stages spill to disk
    pub allow_disk_use: bool,
    /// Actor recorded on soft deletes when none is given
    pub system_actor: String,
    /// Page size of [`RepositoryOptions::first_page`]
    pub default_page_size: u64,
}

impl RepositoryOptions {
    /// First unsorted page at the default page size
    pub fn first_page(&self) -> Pageable {
        Pageable::new(0, self.default_page_size, Vec::new())
            .unwrap_or_else(|_| Pageable::of(0, std::num::NonZeroU64::MIN))
    }
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self::from(&RepositoryConfig::default())
    }
}

impl From<&RepositoryConfig> for RepositoryOptions {
    fn from(config: &RepositoryConfig) -> Self {
        Self {
            allow_disk_use: config.allow_disk_use,
            system_actor: config.system_actor.clone(),
            default_page_size: config.default_page_size,
        }
    }
}

/// Generic repository backed by a [`Collection`]
///
/// Cloning is cheap and clones share the collection and readiness gate.
///
/// # Example
///
/// ```rust
/// use dialog_repository::prelude::*;
/// use dialog_repository::store::memory::MemoryStore;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize)]
/// struct NewTicket { uni: String, title: String }
///
/// #[derive(Serialize, Deserialize)]
/// struct Ticket {
///     #[serde(rename = "_id")]
///     id: DocumentId,
///     uni: String,
///     title: String,
/// }
///
/// impl Entity for Ticket {
///     fn id(&self) -> &DocumentId { &self.id }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<()> {
/// let store = MemoryStore::new();
/// let tickets: DocumentRepository<NewTicket, Ticket> =
///     DocumentRepository::open(&store, CollectionSchema::new("Tickets"));
/// tickets.wait_indexed().await;
///
/// let created = tickets
///     .create(NewTicket { uni: "acme".into(), title: "printer".into() })
///     .await?;
/// let page = tickets.find_all_page(&Pageable::new(0, 10, vec![])?).await?;
/// assert_eq!(page.total_elements(), 1);
/// assert_eq!(page.elements()[0].id, created.id);
/// # Ok(())
/// # }
/// ```
pub struct DocumentRepository<I, E> {
    collection: Arc<dyn Collection>,
    gate: Arc<IndexGate>,
    scope: Arc<dyn QueryScope>,
    options: RepositoryOptions,
    _types: PhantomData<fn(I) -> E>,
}

impl<I, E> Clone for DocumentRepository<I, E> {
    fn clone(&self) -> Self {
        Self {
            collection: Arc::clone(&self.collection),
            gate: Arc::clone(&self.gate),
            scope: Arc::clone(&self.scope),
            options: self.options.clone(),
            _types: PhantomData,
        }
    }
}

impl<I, E> fmt::Debug for DocumentRepository<I, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentRepository")
            .field("collection", &self.collection.name())
            .field("scope", &self.scope)
            .field("indexed", &self.gate.state())
            .field("options", &self.options)
            .finish()
    }
}

impl<I, E> DocumentRepository<I, E> {
    /// Repository exposing every document of `collection`
    pub fn new(collection: Arc<dyn Collection>) -> Self {
        Self::with_scope(collection, Arc::new(Unscoped), RepositoryOptions::default())
    }

    /// Open the collection declared by `schema` and wrap it
    pub fn open(store: &dyn DocumentStore, schema: CollectionSchema) -> Self {
        Self::new(store.collection(schema))
    }

    /// Repository with an explicit scope and options
    ///
    /// Registers the collection's index listener; nothing else happens.
    pub fn with_scope(
        collection: Arc<dyn Collection>,
        scope: Arc<dyn QueryScope>,
        options: RepositoryOptions,
    ) -> Self {
        let gate = Arc::new(IndexGate::new());
        let listener = Arc::downgrade(&gate);
        collection.on_index_ready(Box::new(move || {
            if let Some(gate) = listener.upgrade() {
                gate.resolve(true);
            }
        }));

        Self {
            collection,
            gate,
            scope,
            options,
            _types: PhantomData,
        }
    }

    /// Replace the repository options
    #[must_use]
    pub fn with_options(mut self, options: RepositoryOptions) -> Self {
        self.options = options;
        self
    }

    /// Underlying collection
    pub fn collection(&self) -> &Arc<dyn Collection> {
        &self.collection
    }

    /// Index readiness gate
    pub fn gate(&self) -> &IndexGate {
        &self.gate
    }

    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    fn store_error(
        &self,
        operation: RepositoryOperation,
    ) -> impl FnOnce(StoreError) -> RepositoryError + '_ {
        move |error| {
            if matches!(error, StoreError::DuplicateKey { .. }) {
                tracing::warn!(
                    collection = %self.collection.name(),
                    %operation,
                    "Duplicate key rejected"
                );
            }
            RepositoryError::from_store(operation, error).with_collection(self.collection.name())
        }
    }

    fn to_document<T: Serialize>(
        &self,
        value: &T,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Document> {
        match serde_json::to_value(value) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(other) => Err(RepositoryError::serialization(
                operation,
                format!("expected an object, got {other}"),
            )
            .with_collection(self.collection.name())),
            Err(e) => Err(RepositoryError::serialization(operation, e.to_string())
                .with_collection(self.collection.name())),
        }
    }

    /// Find bypassing the scope
    pub(crate) async fn find_unscoped(
        &self,
        filter: &Document,
        sorts: &[Sort],
        operation: RepositoryOperation,
    ) -> RepositoryResult<Vec<E>>
    where
        E: Entity,
    {
        let documents = self
            .collection
            .find(filter, FindOptions::sorted(sort_document(sorts)))
            .await
            .map_err(self.store_error(operation))?;
        documents
            .into_iter()
            .map(|document| self.to_entity(document, operation))
            .collect()
    }

    /// Find at most `limit` documents matching `query` in `sorts` order
    pub async fn find_top(
        &self,
        query: Document,
        sorts: &[Sort],
        limit: u64,
    ) -> RepositoryResult<Vec<E>>
    where
        E: Entity,
    {
        let operation = RepositoryOperation::Find;
        let filter = self.scope.scope_filter(query);
        let options = FindOptions {
            sort: sort_document(sorts),
            skip: 0,
            limit: Some(limit),
        };
        self.collection
            .find(&filter, options)
            .await
            .map_err(self.store_error(operation))?
            .into_iter()
            .map(|document| self.to_entity(document, operation))
            .collect()
    }

    /// Apply `$set` of `fields` to every document matching `filter`, bypassing the scope
    pub(crate) async fn set_all(
        &self,
        filter: &Document,
        fields: Document,
        operation: RepositoryOperation,
    ) -> RepositoryResult<u64> {
        let mut update = Document::new();
        update.insert("$set".to_string(), Value::Object(fields));
        self.collection
            .update_many(filter, &update)
            .await
            .map_err(self.store_error(operation))
    }

    /// Apply `$set` of `fields` to the document with `id` and read it back
    ///
    /// Only the named fields change; the rest of the stored document is kept.
    pub(crate) async fn set_one(
        &self,
        id: &DocumentId,
        fields: Document,
        operation: RepositoryOperation,
    ) -> RepositoryResult<E>
    where
        E: Entity,
    {
        let mut filter = Document::new();
        filter.insert("_id".to_string(), Value::from(id.clone()));
        let not_found = || {
            RepositoryError::not_found(self.collection.name(), id.as_str())
                .with_operation(operation)
        };
        if self.set_all(&filter, fields, operation).await? == 0 {
            return Err(not_found());
        }
        let stored = self
            .collection
            .find_by_id(id)
            .await
            .map_err(self.store_error(operation))?
            .ok_or_else(not_found)?;
        self.to_entity(stored, operation)
    }

    fn to_entity(&self, document: Document, operation: RepositoryOperation) -> RepositoryResult<E>
    where
        E: Entity,
    {
        let id = DocumentId::of(&document);
        serde_json::from_value(Value::Object(document)).map_err(|e| {
            let err = RepositoryError::serialization(operation, e.to_string())
                .with_collection(self.collection.name());
            match id {
                Some(id) => err.with_entity_id(id.as_str()),
                None => err,
            }
        })
    }

    async fn insert(&self, data: &I, operation: RepositoryOperation) -> RepositoryResult<E>
    where
        I: Serialize,
        E: Entity,
    {
        let document = self.to_document(data, operation)?;
        let stored = self
            .collection
            .insert_one(document)
            .await
            .map_err(self.store_error(operation))?;
        tracing::debug!(
            collection = %self.collection.name(),
            id = ?DocumentId::of(&stored),
            "Inserted document"
        );
        self.to_entity(stored, operation)
    }

    async fn count_scoped(
        &self,
        filter: &Document,
        operation: RepositoryOperation,
    ) -> RepositoryResult<u64> {
        self.collection
            .count(filter)
            .await
            .map_err(self.store_error(operation))
    }

    fn pipeline(&self, stages: Vec<Document>) -> Vec<Document> {
        let mut pipeline = self.scope.pipeline_prefix();
        pipeline.extend(stages);
        pipeline
    }

    async fn run_pipeline(
        &self,
        pipeline: &[Document],
        operation: RepositoryOperation,
    ) -> RepositoryResult<Vec<Document>> {
        let options = AggregateOptions {
            allow_disk_use: self.options.allow_disk_use,
        };
        self.collection
            .aggregate(pipeline, options)
            .await
            .map_err(self.store_error(operation))
    }
}

fn stage(name: &str, spec: Value) -> Document {
    let mut stage = Document::new();
    stage.insert(name.to_string(), spec);
    stage
}

impl<I, E> Repository<I, E> for DocumentRepository<I, E>
where
    I: Serialize + Send + Sync,
    E: Entity,
{
    async fn wait_indexed(&self) -> bool {
        self.gate.wait_indexed().await
    }

    async fn create(&self, data: I) -> RepositoryResult<E> {
        self.insert(&data, RepositoryOperation::Create).await
    }

    async fn save(&self, entity: Save<I, E>) -> RepositoryResult<E> {
        let operation = RepositoryOperation::Save;
        match entity {
            Save::New(data) => self.insert(&data, operation).await,
            Save::Existing(entity) => {
                let id = entity.id().clone();
                let document = self.to_document(&entity, operation)?;
                let stored = self
                    .collection
                    .replace_one(&id, document)
                    .await
                    .map_err(self.store_error(operation))?;
                tracing::debug!(collection = %self.collection.name(), %id, "Replaced document");
                self.to_entity(stored, operation)
            }
        }
    }

    async fn count(&self, query: Document) -> RepositoryResult<u64> {
        let filter = self.scope.scope_filter(query);
        self.count_scoped(&filter, RepositoryOperation::Count).await
    }

    async fn find(&self, query: Document, sorts: &[Sort]) -> RepositoryResult<Vec<E>> {
        let filter = self.scope.scope_filter(query);
        self.find_unscoped(&filter, sorts, RepositoryOperation::Find)
            .await
    }

    async fn find_one(&self, query: Document) -> RepositoryResult<Option<E>> {
        let operation = RepositoryOperation::FindOne;
        let filter = self.scope.scope_filter(query);
        self.collection
            .find_one(&filter)
            .await
            .map_err(self.store_error(operation))?
            .map(|document| self.to_entity(document, operation))
            .transpose()
    }

    async fn find_by_id(&self, id: &DocumentId) -> RepositoryResult<Option<E>> {
        let operation = RepositoryOperation::FindById;
        self.collection
            .find_by_id(id)
            .await
            .map_err(self.store_error(operation))?
            .filter(|document| self.scope.is_visible(document))
            .map(|document| self.to_entity(document, operation))
            .transpose()
    }

    async fn find_by_field_values(
        &self,
        field: &str,
        values: Vec<Value>,
        sorts: &[Sort],
    ) -> RepositoryResult<Vec<E>> {
        let mut query = Document::new();
        query.insert(field.to_string(), Value::Object(stage("$in", Value::Array(values))));
        let filter = self.scope.scope_filter(query);
        self.find_unscoped(&filter, sorts, RepositoryOperation::FindByIds)
            .await
    }

    async fn find_page(&self, pageable: &Pageable, query: Document) -> RepositoryResult<Page<E>> {
        let operation = RepositoryOperation::FindPage;
        let filter = self.scope.scope_filter(query);

        let total = self.count_scoped(&filter, operation).await?;
        tracing::debug!(
            collection = %self.collection.name(),
            page = pageable.page_number(),
            size = pageable.page_size(),
            total,
            "Fetching page"
        );
        if total == 0 {
            return Ok(Page::empty(pageable));
        }

        let options = FindOptions {
            sort: sort_document(pageable.sorts()),
            skip: pageable.offset(),
            limit: Some(pageable.page_size()),
        };
        let elements = self
            .collection
            .find(&filter, options)
            .await
            .map_err(self.store_error(operation))?
            .into_iter()
            .map(|document| self.to_entity(document, operation))
            .collect::<RepositoryResult<Vec<_>>>()?;

        Ok(Page::new(elements, total, pageable))
    }

    async fn aggregate(&self, stages: Vec<Document>) -> RepositoryResult<Vec<Document>> {
        let pipeline = self.pipeline(stages);
        self.run_pipeline(&pipeline, RepositoryOperation::Aggregate)
            .await
    }

    async fn aggregate_page(
        &self,
        pageable: &Pageable,
        stages: Vec<Document>,
    ) -> RepositoryResult<Page<Document>> {
        let operation = RepositoryOperation::AggregatePage;
        let pipeline = self.pipeline(stages);

        let mut counting = pipeline.clone();
        counting.push(stage("$count", Value::from(COUNT_FIELD)));
        let total = self
            .run_pipeline(&counting, operation)
            .await?
            .first()
            .and_then(|result| result.get(COUNT_FIELD))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        tracing::debug!(
            collection = %self.collection.name(),
            page = pageable.page_number(),
            size = pageable.page_size(),
            total,
            "Fetching aggregation page"
        );
        if total == 0 {
            return Ok(Page::empty(pageable));
        }

        let mut paged = pipeline;
        if let Some(sort) = sort_document(pageable.sorts()) {
            paged.push(stage("$sort", Value::Object(sort)));
        }
        paged.push(stage("$skip", Value::from(pageable.offset())));
        paged.push(stage("$limit", Value::from(pageable.page_size())));
        let elements = self.run_pipeline(&paged, operation).await?;

        Ok(Page::new(elements, total, pageable))
    }

    async fn remove(&self, entity: E) -> RepositoryResult<E> {
        let existed = self
            .collection
            .delete_one(entity.id())
            .await
            .map_err(self.store_error(RepositoryOperation::Remove))?;
        tracing::debug!(
            collection = %self.collection.name(),
            id = %entity.id(),
            existed,
            "Removed document"
        );
        Ok(entity)
    }

    async fn remove_all(&self) -> RepositoryResult<u64> {
        let removed = self
            .collection
            .delete_many(&Document::new())
            .await
            .map_err(self.store_error(RepositoryOperation::RemoveAll))?;
        tracing::debug!(collection = %self.collection.name(), removed, "Removed all documents");
        Ok(removed)
    }
}

#[cfg(all(test, feature = "memory"))]
pub(crate) mod tests {
    use super::*;
    use crate::doc;
    use crate::repository::RepositoryErrorKind;
    use crate::store::memory::MemoryStore;
    use crate::store::{IndexBuild, IndexListener, StoreResult};
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Serialize)]
    pub(crate) struct NewAccount {
        pub uni: String,
        pub username: String,
        pub password: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub(crate) struct Account {
        #[serde(rename = "_id")]
        pub id: DocumentId,
        pub uni: String,
        pub username: String,
        pub password: String,
    }

    impl Entity for Account {
        fn id(&self) -> &DocumentId {
            &self.id
        }
    }

    pub(crate) fn new_account(uni: &str, username: &str) -> NewAccount {
        NewAccount {
            uni: uni.to_string(),
            username: username.to_string(),
            password: "secret".to_string(),
        }
    }

    fn accounts_schema() -> CollectionSchema {
        CollectionSchema::new("Accounts")
            .unique(["uni", "username"])
            .required("password")
    }

    fn accounts() -> DocumentRepository<NewAccount, Account> {
        DocumentRepository::open(&MemoryStore::new(), accounts_schema())
    }

    /// Collection wrapper counting store calls
    pub(crate) struct CountingCollection {
        pub inner: Arc<dyn Collection>,
        pub aggregates: AtomicUsize,
        pub finds: AtomicUsize,
    }

    impl CountingCollection {
        pub fn wrap(inner: Arc<dyn Collection>) -> Arc<Self> {
            Arc::new(Self {
                inner,
                aggregates: AtomicUsize::new(0),
                finds: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Collection for CountingCollection {
        fn name(&self) -> &str {
            self.inner.name()
        }
        async fn insert_one(&self, document: Document) -> StoreResult<Document> {
            self.inner.insert_one(document).await
        }
        async fn replace_one(&self, id: &DocumentId, document: Document) -> StoreResult<Document> {
            self.inner.replace_one(id, document).await
        }
        async fn find(&self, filter: &Document, options: FindOptions) -> StoreResult<Vec<Document>> {
            self.finds.fetch_add(1, Ordering::SeqCst);
            self.inner.find(filter, options).await
        }
        async fn find_by_id(&self, id: &DocumentId) -> StoreResult<Option<Document>> {
            self.inner.find_by_id(id).await
        }
        async fn count(&self, filter: &Document) -> StoreResult<u64> {
            self.inner.count(filter).await
        }
        async fn aggregate(
            &self,
            pipeline: &[Document],
            options: AggregateOptions,
        ) -> StoreResult<Vec<Document>> {
            self.aggregates.fetch_add(1, Ordering::SeqCst);
            self.inner.aggregate(pipeline, options).await
        }
        async fn update_many(&self, filter: &Document, update: &Document) -> StoreResult<u64> {
            self.inner.update_many(filter, update).await
        }
        async fn delete_one(&self, id: &DocumentId) -> StoreResult<bool> {
            self.inner.delete_one(id).await
        }
        async fn delete_many(&self, filter: &Document) -> StoreResult<u64> {
            self.inner.delete_many(filter).await
        }
        fn on_index_ready(&self, listener: IndexListener) {
            self.inner.on_index_ready(listener)
        }
    }

    #[tokio::test]
    async fn test_create_and_find_by_id() {
        let repo = accounts();
        assert!(repo.wait_indexed().await);

        let created = repo.create(new_account("acme", "alice")).await.unwrap();
        let found = repo.find_by_id(&created.id).await.unwrap();
        assert_eq!(found, Some(created));

        let missing = repo
            .find_by_id(&DocumentId::new("000000000000000000000000"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_in_same_uni_is_rejected() {
        let repo = accounts();
        repo.create(new_account("acme", "alice")).await.unwrap();

        let err = repo.create(new_account("acme", "alice")).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::DuplicateKey);
        assert_eq!(err.operation, RepositoryOperation::Create);
        assert_eq!(err.collection.as_deref(), Some("Accounts"));
        assert_eq!(repo.count_all().await.unwrap(), 1);

        repo.create(new_account("globex", "alice")).await.unwrap();
        assert_eq!(repo.count_all().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_required_path_is_validation_failure() {
        let repo = accounts();
        let mut data = new_account("acme", "bob");
        data.password = String::new();
        // empty strings are present; only absent or null paths fail
        repo.create(data).await.unwrap();

        let raw: DocumentRepository<Document, Account> =
            DocumentRepository::new(Arc::clone(repo.collection()));
        let err = raw
            .create(doc!({"uni": "acme", "username": "carol"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
        assert_eq!(err.path.as_deref(), Some("password"));
    }

    #[tokio::test]
    async fn test_save_new_and_existing() {
        let repo = accounts();
        let mut saved = repo
            .save(Save::New(new_account("acme", "dave")))
            .await
            .unwrap();
        saved.password = "rotated".to_string();
        let replaced = repo.save(Save::Existing(saved.clone())).await.unwrap();
        assert_eq!(replaced, saved);
        assert_eq!(repo.count_all().await.unwrap(), 1);

        repo.remove(saved.clone()).await.unwrap();
        let err = repo.save(Save::Existing(saved)).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_find_sorted_and_find_one() {
        let repo = accounts();
        for name in ["bob", "alice", "carol"] {
            repo.create(new_account("acme", name)).await.unwrap();
        }
        repo.create(new_account("globex", "zed")).await.unwrap();

        let sorted = repo
            .find(doc!({"uni": "acme"}), &[Sort::asc("username")])
            .await
            .unwrap();
        let names: Vec<_> = sorted.iter().map(|a| a.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);

        let natural = repo.find_all(&[]).await.unwrap();
        assert_eq!(natural[0].username, "bob");

        let one = repo.find_one(doc!({"uni": "globex"})).await.unwrap();
        assert_eq!(one.map(|a| a.username), Some("zed".to_string()));
        assert!(repo.find_one(doc!({"uni": "initech"})).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_ids() {
        let repo = accounts();
        let a = repo.create(new_account("acme", "a")).await.unwrap();
        let _b = repo.create(new_account("acme", "b")).await.unwrap();
        let c = repo.create(new_account("acme", "c")).await.unwrap();

        let found = repo
            .find_by_ids(&[a.id.clone(), c.id.clone()], &[Sort::desc("_id")])
            .await
            .unwrap();
        assert_eq!(found, vec![c, a]);

        let by_name = repo
            .find_by_field_values("username", vec![Value::from("b")], &[])
            .await
            .unwrap();
        assert_eq!(by_name.len(), 1);
    }

    #[tokio::test]
    async fn test_page_sorting_by_id() {
        let repo = accounts();
        let mut ids = Vec::new();
        for name in ["a", "b", "c"] {
            ids.push(repo.create(new_account("acme", name)).await.unwrap().id);
        }

        let asc = Pageable::new(0, 2, vec![Sort::asc("_id")]).unwrap();
        let page = repo.find_all_page(&asc).await.unwrap();
        let got: Vec<_> = page.elements().iter().map(|a| a.id.clone()).collect();
        assert_eq!(got, vec![ids[0].clone(), ids[1].clone()]);
        assert_eq!(page.total_elements(), 3);
        assert_eq!(page.total_pages(), 2);
        assert!(page.has_next());
        assert!(page.is_first());
        assert!(!page.is_last());

        let desc = Pageable::new(0, 2, vec![Sort::desc("_id")]).unwrap();
        let page = repo.find_all_page(&desc).await.unwrap();
        let got: Vec<_> = page.elements().iter().map(|a| a.id.clone()).collect();
        assert_eq!(got, vec![ids[2].clone(), ids[1].clone()]);

        let second = repo.find_all_page(&desc.next()).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second.elements()[0].id, ids[0]);
        assert!(second.is_last());
        assert!(!second.has_next());
    }

    #[tokio::test]
    async fn test_find_page_with_query_and_empty_result() {
        let repo = accounts();
        repo.create(new_account("acme", "a")).await.unwrap();

        let pageable = repo.options().first_page();
        assert_eq!(pageable.page_size(), 20);
        let page = repo
            .find_page(&pageable, doc!({"uni": "nobody"}))
            .await
            .unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total_pages(), 0);
        assert!(page.is_first() && page.is_last());
    }

    #[tokio::test]
    async fn test_aggregate_uses_disk_use_and_stages() {
        let repo = accounts();
        for (uni, name) in [("acme", "a"), ("acme", "b"), ("globex", "c")] {
            repo.create(new_account(uni, name)).await.unwrap();
        }

        let grouped = repo
            .aggregate(vec![
                doc!({"$group": {"_id": "$uni", "users": {"$sum": 1}}}),
                doc!({"$sort": {"_id": 1}}),
            ])
            .await
            .unwrap();
        assert_eq!(
            grouped,
            vec![doc!({"_id": "acme", "users": 2}), doc!({"_id": "globex", "users": 1})]
        );

        let err = repo
            .aggregate(vec![doc!({"$bogus": {}})])
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidQuery);
        assert_eq!(err.operation, RepositoryOperation::Aggregate);
    }

    #[tokio::test]
    async fn test_aggregate_page() {
        let store = MemoryStore::new();
        let counting = CountingCollection::wrap(store.collection(accounts_schema()));
        let repo: DocumentRepository<NewAccount, Account> = DocumentRepository::new(counting.clone());
        for name in ["a", "b", "c", "d", "e"] {
            repo.create(new_account("acme", name)).await.unwrap();
        }

        let pageable = Pageable::new(1, 2, vec![Sort::desc("username")]).unwrap();
        let page = repo
            .aggregate_page(&pageable, vec![doc!({"$project": {"_id": 0, "username": 1}})])
            .await
            .unwrap();
        assert_eq!(page.total_elements(), 5);
        assert_eq!(page.total_pages(), 3);
        assert_eq!(
            page.elements(),
            &[doc!({"username": "c"}), doc!({"username": "b"})]
        );
        assert!(page.has_previous() && page.has_next());
        assert_eq!(counting.aggregates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_aggregate_page_zero_count_skips_data_pipeline() {
        let store = MemoryStore::new();
        let counting = CountingCollection::wrap(store.collection(accounts_schema()));
        let repo: DocumentRepository<NewAccount, Account> = DocumentRepository::new(counting.clone());
        repo.create(new_account("acme", "a")).await.unwrap();

        let pageable = Pageable::new(0, 10, vec![Sort::asc("_id")]).unwrap();
        let page = repo
            .aggregate_page(&pageable, vec![doc!({"$match": {"uni": "nobody"}})])
            .await
            .unwrap();
        assert_eq!(page.total_elements(), 0);
        assert!(page.is_empty());
        assert_eq!(counting.aggregates.load(Ordering::SeqCst), 1);

        // find_page short-circuits the same way
        let page = repo
            .find_page(&pageable, doc!({"uni": "nobody"}))
            .await
            .unwrap();
        assert!(page.is_empty());
        assert_eq!(counting.finds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_remove_and_remove_all_are_physical() {
        let repo = accounts();
        let a = repo.create(new_account("acme", "a")).await.unwrap();
        repo.create(new_account("acme", "b")).await.unwrap();

        let removed = repo.remove(a.clone()).await.unwrap();
        assert_eq!(removed, a);
        assert!(repo.find_by_id(&a.id).await.unwrap().is_none());
        assert_eq!(repo.collection().count(&Document::new()).await.unwrap(), 1);

        assert_eq!(repo.remove_all().await.unwrap(), 1);
        assert_eq!(repo.count_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wait_indexed_blocks_until_manual_build() {
        let store = MemoryStore::with_index_build(IndexBuild::Manual);
        let repo: DocumentRepository<NewAccount, Account> =
            DocumentRepository::open(&store, accounts_schema());
        assert_eq!(repo.gate().state(), None);

        let waiting = tokio::spawn({
            let repo = repo.clone();
            async move { repo.wait_indexed().await }
        });
        tokio::task::yield_now().await;
        assert!(!waiting.is_finished());

        store.memory_collection("Accounts").unwrap().finish_index_build();
        assert!(waiting.await.unwrap());
        assert_eq!(repo.gate().state(), Some(true));
    }
}

//! In-process document store
//!
//! Backs `mem://` store URLs. Documents live in insertion order inside each
//! collection, writes enforce the collection schema (defaults, required
//! paths, unique indexes) and index build completion is reported once per
//! collection according to the configured [`IndexBuild`] mode.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::RwLock;

use super::query::{self, lookup, matches, remove_path, set_path, sort_documents};
use super::{
    pipeline, AggregateOptions, Collection, CollectionSchema, Document, DocumentId,
    DocumentStore, FindOptions, IndexBuild, IndexListener, StoreError, StoreResult, ID_FIELD,
};

/// Generates 24-hex-character ids ordered by creation
#[derive(Debug, Default)]
struct IdGenerator {
    counter: AtomicU64,
}

impl IdGenerator {
    fn next(&self) -> DocumentId {
        let seconds = u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX);
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        DocumentId::new(format!("{seconds:08x}{sequence:016x}"))
    }
}

/// In-memory [`DocumentStore`]
///
/// Opening the same collection name twice returns the same collection.
#[derive(Debug)]
pub struct MemoryStore {
    collections: DashMap<String, Arc<MemoryCollection>>,
    index_build: IndexBuild,
    ids: Arc<IdGenerator>,
}

impl MemoryStore {
    /// Store whose indexes are ready as soon as a collection opens
    pub fn new() -> Self {
        Self::with_index_build(IndexBuild::Immediate)
    }

    /// Store reporting index completion according to `index_build`
    pub fn with_index_build(index_build: IndexBuild) -> Self {
        Self {
            collections: DashMap::new(),
            index_build,
            ids: Arc::new(IdGenerator::default()),
        }
    }

    /// Concrete handle to an opened collection
    pub fn memory_collection(&self, name: &str) -> Option<Arc<MemoryCollection>> {
        self.collections.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn schedule_index_build(&self, collection: &Arc<MemoryCollection>) {
        match self.index_build {
            IndexBuild::Immediate => collection.finish_index_build(),
            IndexBuild::Manual => {}
            IndexBuild::Background => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let collection = Arc::clone(collection);
                    handle.spawn(async move {
                        tokio::task::yield_now().await;
                        collection.finish_index_build();
                    });
                }
                Err(_) => collection.finish_index_build(),
            },
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn collection(&self, schema: CollectionSchema) -> Arc<dyn Collection> {
        let mut created = false;
        let collection = self
            .collections
            .entry(schema.name.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(MemoryCollection::new(schema, Arc::clone(&self.ids)))
            })
            .clone();

        if created {
            tracing::debug!(collection = %collection.name(), "Opened in-memory collection");
            self.schedule_index_build(&collection);
        }
        collection
    }
}

#[derive(Default)]
struct IndexState {
    ready: bool,
    listeners: Vec<IndexListener>,
}

/// One in-memory collection
pub struct MemoryCollection {
    schema: CollectionSchema,
    documents: RwLock<Vec<Document>>,
    index: Mutex<IndexState>,
    ids: Arc<IdGenerator>,
}

impl std::fmt::Debug for MemoryCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCollection")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl MemoryCollection {
    fn new(schema: CollectionSchema, ids: Arc<IdGenerator>) -> Self {
        Self {
            schema,
            documents: RwLock::new(Vec::new()),
            index: Mutex::new(IndexState::default()),
            ids,
        }
    }

    /// Complete the index build, notifying every registered listener once
    ///
    /// Later calls are no-ops.
    pub fn finish_index_build(&self) {
        let listeners = {
            let mut state = self.index.lock().unwrap_or_else(PoisonError::into_inner);
            if state.ready {
                return;
            }
            state.ready = true;
            std::mem::take(&mut state.listeners)
        };
        tracing::info!(
            collection = %self.schema.name,
            listeners = listeners.len(),
            "Index build complete"
        );
        for listener in listeners {
            listener();
        }
    }

    /// Whether the index build has completed
    pub fn is_index_ready(&self) -> bool {
        self.index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ready
    }

    /// Every stored document in insertion order, bypassing any filter
    pub async fn snapshot(&self) -> Vec<Document> {
        self.documents.read().await.clone()
    }

    fn prepare(&self, mut document: Document, id: DocumentId) -> StoreResult<Document> {
        for (field, value) in &self.schema.defaults {
            if !document.contains_key(field) {
                document.insert(field.clone(), value.clone());
            }
        }

        for path in &self.schema.required {
            if lookup(&document, path).map_or(true, Value::is_null) {
                return Err(StoreError::Validation {
                    path: path.clone(),
                    message: format!("Path `{path}` is required."),
                });
            }
        }

        // `_id` leads the stored document.
        document.remove(ID_FIELD);
        let mut stored = Document::new();
        stored.insert(ID_FIELD.to_string(), id.into());
        stored.extend(document);
        Ok(stored)
    }

    fn check_unique(
        &self,
        documents: &[Document],
        candidate: &Document,
        skip: Option<usize>,
    ) -> StoreResult<()> {
        let id_index = vec![ID_FIELD.to_string()];
        let indexes = std::iter::once(&id_index).chain(self.schema.unique_indexes.iter());

        for fields in indexes {
            let key = index_key(candidate, fields);
            let taken = documents
                .iter()
                .enumerate()
                .filter(|(position, _)| Some(*position) != skip)
                .any(|(_, existing)| index_key(existing, fields) == key);
            if taken {
                let rendered = fields
                    .iter()
                    .zip(&key)
                    .map(|(field, value)| format!("{field}: {value}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(StoreError::DuplicateKey {
                    index: CollectionSchema::index_name(fields),
                    key: format!("{{ {rendered} }}"),
                });
            }
        }
        Ok(())
    }
}

fn index_key(document: &Document, fields: &[String]) -> Vec<Value> {
    fields
        .iter()
        .map(|field| lookup(document, field).cloned().unwrap_or(Value::Null))
        .collect()
}

fn position_of(documents: &[Document], id: &DocumentId) -> Option<usize> {
    documents
        .iter()
        .position(|document| document.get(ID_FIELD).and_then(Value::as_str) == Some(id.as_str()))
}

fn apply_update(document: &mut Document, update: &Document) -> StoreResult<()> {
    if !update.keys().any(|key| key.starts_with('$')) {
        for (path, value) in update {
            set_path(document, path, value.clone());
        }
        return Ok(());
    }

    for (operator, fields) in update {
        let fields = fields.as_object().ok_or_else(|| {
            StoreError::InvalidQuery(format!("modifier {operator} expects an object"))
        })?;
        match operator.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(document, path, value.clone());
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    remove_path(document, path);
                }
            }
            other => {
                return Err(StoreError::InvalidQuery(format!(
                    "unknown modifier: {other}"
                )));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.schema.name
    }

    async fn insert_one(&self, document: Document) -> StoreResult<Document> {
        let id = DocumentId::of(&document).unwrap_or_else(|| self.ids.next());
        let stored = self.prepare(document, id)?;

        let mut documents = self.documents.write().await;
        self.check_unique(&documents, &stored, None)?;
        documents.push(stored.clone());
        Ok(stored)
    }

    async fn replace_one(&self, id: &DocumentId, document: Document) -> StoreResult<Document> {
        let stored = self.prepare(document, id.clone())?;

        let mut documents = self.documents.write().await;
        let position =
            position_of(&documents, id).ok_or_else(|| StoreError::DocumentNotFound(id.clone()))?;
        self.check_unique(&documents, &stored, Some(position))?;
        documents[position] = stored.clone();
        Ok(stored)
    }

    async fn find(&self, filter: &Document, options: FindOptions) -> StoreResult<Vec<Document>> {
        let documents = self.documents.read().await;
        let mut found = Vec::new();
        for document in documents.iter() {
            if matches(document, filter)? {
                found.push(document.clone());
            }
        }
        drop(documents);

        if let Some(sort) = &options.sort {
            sort_documents(&mut found, sort)?;
        }
        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let limit = options
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(found.into_iter().skip(skip).take(limit).collect())
    }

    async fn find_by_id(&self, id: &DocumentId) -> StoreResult<Option<Document>> {
        let documents = self.documents.read().await;
        Ok(position_of(&documents, id).map(|position| documents[position].clone()))
    }

    async fn count(&self, filter: &Document) -> StoreResult<u64> {
        let documents = self.documents.read().await;
        let mut count = 0;
        for document in documents.iter() {
            if matches(document, filter)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn aggregate(
        &self,
        pipeline: &[Document],
        options: AggregateOptions,
    ) -> StoreResult<Vec<Document>> {
        tracing::trace!(
            collection = %self.schema.name,
            stages = pipeline.len(),
            allow_disk_use = options.allow_disk_use,
            "Running aggregation"
        );
        let documents = self.documents.read().await.clone();
        pipeline::run(documents, pipeline)
    }

    async fn update_many(&self, filter: &Document, update: &Document) -> StoreResult<u64> {
        let mut documents = self.documents.write().await;
        let mut updated = documents.clone();
        let mut matched = Vec::new();

        for (position, document) in updated.iter_mut().enumerate() {
            if !matches(document, filter)? {
                continue;
            }
            apply_update(document, update)?;
            matched.push(position);
        }

        for &position in &matched {
            self.check_unique(&updated, &updated[position], Some(position))?;
        }

        *documents = updated;
        Ok(matched.len() as u64)
    }

    async fn delete_one(&self, id: &DocumentId) -> StoreResult<bool> {
        let mut documents = self.documents.write().await;
        Ok(match position_of(&documents, id) {
            Some(position) => {
                documents.remove(position);
                true
            }
            None => false,
        })
    }

    async fn delete_many(&self, filter: &Document) -> StoreResult<u64> {
        let mut documents = self.documents.write().await;
        let before = documents.len();
        let mut kept = Vec::with_capacity(before);
        for document in documents.drain(..) {
            if !query::matches(&document, filter)? {
                kept.push(document);
            }
        }
        let removed = before - kept.len();
        *documents = kept;
        Ok(removed as u64)
    }

    fn on_index_ready(&self, listener: IndexListener) {
        let mut state = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        if state.ready {
            drop(state);
            listener();
        } else {
            state.listeners.push(listener);
        }
    }
}

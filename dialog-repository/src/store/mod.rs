//! Document store abstraction
//!
//! Repositories never talk to a database driver directly. They consume a
//! narrow collaborator interface: a queryable, countable, sortable and
//! aggregable collection of JSON documents, each identified by an opaque
//! `_id`. The [`Collection`] trait is that interface and [`DocumentStore`]
//! opens collections from a [`CollectionSchema`].
//!
//! # Example
//!
//! ```rust
//! use dialog_repository::config::StoreConfig;
//! use dialog_repository::store::{self, CollectionSchema};
//!
//! let store = store::connect(&StoreConfig::default()).unwrap();
//! let users = store.collection(
//!     CollectionSchema::new("Users")
//!         .unique(["uni", "username"])
//!         .required("password"),
//! );
//! assert_eq!(users.name(), "Users");
//! ```

#[cfg(feature = "memory")]
pub mod memory;
pub mod pipeline;
pub mod query;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::StoreConfig;
use crate::error::{Error, Result};

/// A stored document: a JSON object whose key order is preserved
pub type Document = serde_json::Map<String, Value>;

/// Field holding a document's identity
pub const ID_FIELD: &str = "_id";

/// Opaque document identifier
///
/// Identifiers are generated by the store on insert and compared as plain
/// strings. Callers should never derive meaning from their contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read the `_id` of a document, if it carries a string id
    pub fn of(document: &Document) -> Option<Self> {
        document
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(Self::new)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<DocumentId> for Value {
    fn from(id: DocumentId) -> Self {
        Value::String(id.0)
    }
}

/// How a store reports completion of its secondary index builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBuild {
    /// Indexes are ready as soon as the collection is opened
    Immediate,
    /// Indexes finish on a background task after the collection is opened
    #[default]
    Background,
    /// Indexes finish only when the owner triggers it (tests)
    Manual,
}

/// Collection declaration owned by the calling layer
///
/// Declares the unique indexes, required paths and default values the store
/// enforces on every write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionSchema {
    /// Collection name
    pub name: String,
    /// Compound unique indexes, each a list of field paths
    pub unique_indexes: Vec<Vec<String>>,
    /// Paths that must be present and non-null
    pub required: Vec<String>,
    /// Values applied to top-level fields absent on write
    pub defaults: Document,
}

impl CollectionSchema {
    /// Start a schema for the named collection
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Declare a (compound) unique index
    #[must_use]
    pub fn unique<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_indexes
            .push(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Declare a required path
    #[must_use]
    pub fn required(mut self, path: impl Into<String>) -> Self {
        self.required.push(path.into());
        self
    }

    /// Declare a default value for a top-level field
    #[must_use]
    pub fn default_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(field.into(), value.into());
        self
    }

    /// Mongo-style index name, e.g. `uni_1_username_1`
    pub fn index_name(fields: &[String]) -> String {
        fields
            .iter()
            .map(|field| format!("{field}_1"))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Options for [`Collection::find`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Ordered sort specification (`{field: 1 | -1}`)
    pub sort: Option<Document>,
    /// Number of matching documents to skip
    pub skip: u64,
    /// Maximum number of documents to return
    pub limit: Option<u64>,
}

impl FindOptions {
    /// Options with only a sort specification
    pub fn sorted(sort: Option<Document>) -> Self {
        Self {
            sort,
            ..Self::default()
        }
    }
}

/// Options for [`Collection::aggregate`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Allow stages to spill to temporary storage
    pub allow_disk_use: bool,
}

/// Errors raised by a document store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// A unique index already holds the key
    #[error("E11000 duplicate key error index: {index} dup key: {key}")]
    DuplicateKey {
        /// Index name
        index: String,
        /// Rendered key values
        key: String,
    },

    /// A schema constraint failed on write
    #[error("validation failed: {path}: {message}")]
    Validation {
        /// First violating path
        path: String,
        /// Description of the violation
        message: String,
    },

    /// A write targeted a document that does not exist
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),

    /// The store rejected a filter, update or pipeline stage
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Any other backend failure
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Callback invoked once when a collection's indexes are built
pub type IndexListener = Box<dyn FnOnce() + Send>;

/// A single collection of documents
///
/// Writes are atomic per document. Reads observe the caller's own completed
/// writes. Sorting by the same key yields the same order across calls.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Collection name
    fn name(&self) -> &str;

    /// Insert a document, generating its `_id` when absent
    ///
    /// Returns the stored document including defaults and `_id`.
    async fn insert_one(&self, document: Document) -> StoreResult<Document>;

    /// Replace the document with the given id
    ///
    /// Fails with [`StoreError::DocumentNotFound`] when no such document exists.
    async fn replace_one(&self, id: &DocumentId, document: Document) -> StoreResult<Document>;

    /// Find documents matching a filter
    async fn find(&self, filter: &Document, options: FindOptions) -> StoreResult<Vec<Document>>;

    /// Find the first document matching a filter in natural order
    async fn find_one(&self, filter: &Document) -> StoreResult<Option<Document>> {
        let options = FindOptions {
            limit: Some(1),
            ..FindOptions::default()
        };
        Ok(self.find(filter, options).await?.into_iter().next())
    }

    /// Fetch a document by id
    async fn find_by_id(&self, id: &DocumentId) -> StoreResult<Option<Document>>;

    /// Count documents matching a filter
    async fn count(&self, filter: &Document) -> StoreResult<u64>;

    /// Run an aggregation pipeline over the whole collection
    async fn aggregate(
        &self,
        pipeline: &[Document],
        options: AggregateOptions,
    ) -> StoreResult<Vec<Document>>;

    /// Apply an update (`$set`/`$unset`, or plain fields as `$set`) to every match
    ///
    /// Returns the number of documents matched, whether or not their content
    /// changed.
    async fn update_many(&self, filter: &Document, update: &Document) -> StoreResult<u64>;

    /// Delete a document by id, returning whether it existed
    async fn delete_one(&self, id: &DocumentId) -> StoreResult<bool>;

    /// Delete every matching document, returning how many were removed
    async fn delete_many(&self, filter: &Document) -> StoreResult<u64>;

    /// Register a callback for index build completion
    ///
    /// The event fires once per collection. A listener registered after it
    /// fired is invoked immediately.
    fn on_index_ready(&self, listener: IndexListener);
}

/// Opens collections
pub trait DocumentStore: Send + Sync {
    /// Open (or reuse) the collection declared by `schema`
    fn collection(&self, schema: CollectionSchema) -> Arc<dyn Collection>;
}

/// Open the store addressed by `config.url`
///
/// `mem://` opens a fresh in-process store. Any other scheme is a
/// configuration error.
pub fn connect(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    let scheme = config.url.split("://").next().unwrap_or_default();
    match scheme {
        #[cfg(feature = "memory")]
        "mem" => {
            tracing::info!(
                url = %config.url,
                index_build = ?config.index_build,
                "Opening in-memory document store"
            );
            Ok(Arc::new(memory::MemoryStore::with_index_build(
                config.index_build,
            )))
        }
        _ => Err(Error::Store(format!(
            "unsupported document store url: {}",
            config.url
        ))),
    }
}

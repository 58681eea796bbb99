//! # dialog-repository
//!
//! Generic data-access layer over a document store for a conversational-agent
//! backend. Typed repositories persist users, issues, configuration entries,
//! messages, sender profiles and request/response mappings.
//!
//! ## Features
//!
//! - **Generic repositories**: create, save, count, find, paged find, aggregation and removal
//! - **Pagination**: [`Pageable`](repository::Pageable) requests and computed [`Page`](repository::Page) views
//! - **Aggregation paging**: count pipeline first, data pipeline only when there is data
//! - **Index readiness**: callers can wait until a collection's indexes are built
//! - **Soft delete**: logical removal with actor and timestamp, hidden from every read
//! - **Configuration**: figment-based layering of files and `DIALOG_` environment variables
//! - **In-memory store**: `mem://` backend for tests and embedded use
//!
//! ## Example
//!
//! ```rust,no_run
//! use dialog_repository::prelude::*;
//! use dialog_repository::dialog::{DialogRepositories, NewUser};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Load configuration
//!     let config = Config::load()?;
//!
//!     // Initialize tracing
//!     init_tracing(&config)?;
//!
//!     // Open the store and every repository
//!     let (_store, repositories) = DialogRepositories::from_config(&config)?;
//!     repositories.wait_indexed().await;
//!
//!     let user = repositories
//!         .users
//!         .create(NewUser {
//!             uni: "acme".into(),
//!             username: "alice".into(),
//!             password: "hashed".into(),
//!         })
//!         .await?;
//!     info!(id = %user.id, "Created user");
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dialog;
pub mod error;
pub mod observability;
pub mod repository;
pub mod store;

#[doc(hidden)]
pub use serde_json;

/// Build a [`Document`](store::Document) from a JSON object literal
///
/// ```rust
/// use dialog_repository::doc;
///
/// let filter = doc!({"uni": "acme", "status": {"$ne": "CLOSED"}});
/// assert_eq!(filter.len(), 2);
/// ```
#[macro_export]
macro_rules! doc {
    ({ $($body:tt)* }) => {
        match $crate::serde_json::json!({ $($body)* }) {
            $crate::serde_json::Value::Object(document) => document,
            _ => unreachable!("an object literal always builds an object"),
        }
    };
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, RepositoryConfig, ServiceConfig, StoreConfig};

    pub use crate::error::{Error, Result};

    pub use crate::observability::init_tracing;

    pub use crate::repository::{
        DocumentRepository, Entity, IndexGate, Page, Pageable, Repository, RepositoryError,
        RepositoryErrorKind, RepositoryOperation, RepositoryOptions, RepositoryResult, Save,
        SoftDeletable, SoftDeleteFields, SoftDeleteRepository, Sort, SortDirection,
    };

    pub use crate::store::{
        Collection, CollectionSchema, Document, DocumentId, DocumentStore, IndexBuild,
    };

    pub use crate::doc;

    pub use serde::{Deserialize, Serialize};

    // Re-export tracing macros and types
    pub use tracing::{debug, error, info, instrument, trace, warn, Level, Span};

    // Re-export async-trait for custom Collection backends
    pub use async_trait::async_trait;

    // Re-export time utilities
    pub use chrono::{DateTime, Utc};
}

//! Repository abstractions over document collections
//!
//! This module provides the generic data-access layer used by every entity
//! repository in the crate.
//!
//! # Features
//!
//! - **Generic CRUD**: [`Repository`] trait with create, save, find, count and remove
//! - **Pagination**: [`Pageable`] requests and computed [`Page`] views
//! - **Aggregation**: pipelines with paged output via [`Repository::aggregate_page`]
//! - **Index readiness**: [`IndexGate`] resolving once the collection's indexes are built
//! - **Soft Delete**: [`SoftDeleteRepository`] hiding logically removed documents
//!
//! # Example
//!
//! ```rust,ignore
//! use dialog_repository::repository::{DocumentRepository, Pageable, Repository, Sort};
//!
//! let users: DocumentRepository<NewUser, User> = DocumentRepository::open(&*store, schema);
//! users.wait_indexed().await;
//!
//! let alice = users.create(new_user).await?;
//! let page = users
//!     .find_page(&Pageable::new(0, 20, vec![Sort::asc("username")])?, doc!({"uni": "acme"}))
//!     .await?;
//! ```

mod base;
mod error;
mod gate;
mod pagination;
mod scope;
mod soft_delete;
mod traits;

// Re-export all public types
pub use base::{DocumentRepository, RepositoryOptions};
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use gate::IndexGate;
pub use pagination::{sort_document, Page, Pageable, Sort, SortDirection, ZeroPageSize};
pub use scope::{ExcludeDeleted, QueryScope, Unscoped, DELETED_FIELD};
pub use soft_delete::{SoftDeletable, SoftDeleteFields, SoftDeleteRepository};
pub use traits::{Entity, Repository, RepositoryResult, Save};

//! Operator accounts

use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::doc;
use crate::repository::{
    DocumentRepository, Entity, Repository, RepositoryOptions, RepositoryResult,
};
use crate::store::{CollectionSchema, DocumentId, DocumentStore};

/// Operator account of a university tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub uni: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub uni: String,
    pub username: String,
    pub password: String,
}

impl Entity for User {
    fn id(&self) -> &DocumentId {
        &self.id
    }
}

/// Repository of the `Users` collection
#[derive(Debug, Clone)]
pub struct UserRepository {
    inner: DocumentRepository<NewUser, User>,
}

impl UserRepository {
    pub fn schema() -> CollectionSchema {
        CollectionSchema::new("Users")
            .unique(["uni", "username"])
            .required("password")
            .required("uni")
            .required("username")
    }

    pub fn open(store: &dyn DocumentStore, options: RepositoryOptions) -> Self {
        Self {
            inner: DocumentRepository::open(store, Self::schema()).with_options(options),
        }
    }

    pub async fn find_by_username_and_uni(
        &self,
        username: &str,
        uni: &str,
    ) -> RepositoryResult<Option<User>> {
        self.inner
            .find_one(doc!({"username": username, "uni": uni}))
            .await
    }
}

impl Deref for UserRepository {
    type Target = DocumentRepository<NewUser, User>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;
    use crate::store::memory::MemoryStore;

    fn user(uni: &str, username: &str) -> NewUser {
        NewUser {
            uni: uni.to_string(),
            username: username.to_string(),
            password: "hunter2".to_string(),
        }
    }

    #[tokio::test]
    async fn test_find_by_username_and_uni() {
        let store = MemoryStore::new();
        let users = UserRepository::open(&store, RepositoryOptions::default());
        assert!(users.wait_indexed().await);

        let alice = users.create(user("acme", "alice")).await.unwrap();
        users.create(user("globex", "alice")).await.unwrap();

        let found = users.find_by_username_and_uni("alice", "acme").await.unwrap();
        assert_eq!(found, Some(alice));
        assert!(users
            .find_by_username_and_uni("alice", "initech")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_username_is_unique_per_uni() {
        let store = MemoryStore::new();
        let users = UserRepository::open(&store, RepositoryOptions::default());
        users.create(user("acme", "bob")).await.unwrap();

        let err = users.create(user("acme", "bob")).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::DuplicateKey);
        assert_eq!(users.count(doc!({"uni": "acme"})).await.unwrap(), 1);
    }
}

//! Per-tenant configuration entries

use std::ops::Deref;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::doc;
use crate::repository::{
    DocumentRepository, Entity, Repository, RepositoryOptions, RepositoryResult,
};
use crate::store::{CollectionSchema, DocumentId, DocumentStore};

/// Per-tenant setting stored as an arbitrary JSON value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConfigEntry {
    pub uni: String,
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub uni: String,
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

impl Entity for ConfigEntry {
    fn id(&self) -> &DocumentId {
        &self.id
    }
}

/// Repository of the `Configs` collection
#[derive(Debug, Clone)]
pub struct ConfigRepository {
    inner: DocumentRepository<NewConfigEntry, ConfigEntry>,
}

impl ConfigRepository {
    pub fn schema() -> CollectionSchema {
        CollectionSchema::new("Configs")
            .unique(["uni", "key"])
            .required("key")
            .required("uni")
    }

    pub fn open(store: &dyn DocumentStore, options: RepositoryOptions) -> Self {
        Self {
            inner: DocumentRepository::open(store, Self::schema()).with_options(options),
        }
    }

    pub async fn find_by_uni_and_key(
        &self,
        uni: &str,
        key: &str,
    ) -> RepositoryResult<Option<ConfigEntry>> {
        self.inner.find_one(doc!({"uni": uni, "key": key})).await
    }

    /// Entries for `key` across every tenant
    pub async fn find_by_key(&self, key: &str) -> RepositoryResult<Vec<ConfigEntry>> {
        self.inner.find(doc!({"key": key}), &[]).await
    }

    pub async fn find_by_uni(&self, uni: &str) -> RepositoryResult<Vec<ConfigEntry>> {
        self.inner.find(doc!({"uni": uni}), &[]).await
    }
}

impl Deref for ConfigRepository {
    type Target = DocumentRepository<NewConfigEntry, ConfigEntry>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::repository::{RepositoryErrorKind, Save};
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    fn entry(uni: &str, key: &str, value: Value) -> NewConfigEntry {
        NewConfigEntry {
            uni: uni.to_string(),
            key: key.to_string(),
            value,
        }
    }

    #[tokio::test]
    async fn test_config_finders() {
        let configs = ConfigRepository::open(&MemoryStore::new(), RepositoryOptions::default());
        let greeting = configs
            .create(entry("acme", "greeting", json!({"en": "Hi", "th": "สวัสดี"})))
            .await
            .unwrap();
        configs
            .create(entry("acme", "sessionExpire", json!(300)))
            .await
            .unwrap();
        configs
            .create(entry("globex", "greeting", json!("Hello")))
            .await
            .unwrap();

        let found = configs.find_by_uni_and_key("acme", "greeting").await.unwrap();
        assert_eq!(found, Some(greeting));
        assert!(configs
            .find_by_uni_and_key("acme", "missing")
            .await
            .unwrap()
            .is_none());

        assert_eq!(configs.find_by_key("greeting").await.unwrap().len(), 2);
        assert_eq!(configs.find_by_uni("acme").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_key_is_unique_per_uni() {
        let configs = ConfigRepository::open(&MemoryStore::new(), RepositoryOptions::default());
        let mut first = configs
            .create(entry("acme", "threshold", json!(0.5)))
            .await
            .unwrap();

        let err = configs
            .create(entry("acme", "threshold", json!(0.7)))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::DuplicateKey);

        first.value = json!(0.7);
        let updated = configs.save(Save::Existing(first)).await.unwrap();
        assert_eq!(updated.value, json!(0.7));
    }
}

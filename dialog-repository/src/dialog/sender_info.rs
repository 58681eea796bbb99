//! Profiles of message senders per messenger

use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::doc;
use crate::repository::{
    DocumentRepository, Entity, Repository, RepositoryOptions, RepositoryResult,
};
use crate::store::{CollectionSchema, DocumentId, DocumentStore};

/// Profile of a chat sender as reported by their messenger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSenderInfo {
    pub uni: String,
    pub messenger: String,
    pub sender_id: String,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    pub last_name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub creation_date: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderInfo {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub uni: String,
    pub messenger: String,
    pub sender_id: String,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    pub last_name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub creation_date: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated_date: DateTime<Utc>,
}

impl Entity for SenderInfo {
    fn id(&self) -> &DocumentId {
        &self.id
    }
}

/// Repository of the `SenderInfo` collection
#[derive(Debug, Clone)]
pub struct SenderInfoRepository {
    inner: DocumentRepository<NewSenderInfo, SenderInfo>,
}

impl SenderInfoRepository {
    pub fn schema() -> CollectionSchema {
        CollectionSchema::new("SenderInfo")
            .unique(["uni", "messenger", "senderId"])
            .required("creationDate")
            .required("firstName")
            .required("lastName")
            .required("lastUpdatedDate")
            .required("messenger")
            .required("senderId")
            .required("uni")
    }

    pub fn open(store: &dyn DocumentStore, options: RepositoryOptions) -> Self {
        Self {
            inner: DocumentRepository::open(store, Self::schema()).with_options(options),
        }
    }

    pub async fn find_one_by_uni_and_messenger_and_sender_id(
        &self,
        uni: &str,
        messenger: &str,
        sender_id: &str,
    ) -> RepositoryResult<Option<SenderInfo>> {
        self.inner
            .find_one(doc!({"messenger": messenger, "senderId": sender_id, "uni": uni}))
            .await
    }
}

impl Deref for SenderInfoRepository {
    type Target = DocumentRepository<NewSenderInfo, SenderInfo>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

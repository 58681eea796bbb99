//! Conversation messages, requests and responses alike

use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::doc;
use crate::repository::{
    DocumentRepository, Entity, Page, Pageable, Repository, RepositoryOptions, RepositoryResult,
    Sort,
};
use crate::store::{CollectionSchema, DocumentId, DocumentStore};

/// Field every message finder orders by, newest first
const DATE_FIELD: &str = "date";

/// What a sender sent, keyed on `type`
///
/// Media requests carry the stored file's path and content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE", rename_all_fields = "camelCase")]
pub enum RequestContent {
    Text {
        message: String,
    },
    Audio {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    Image {
        content_type: String,
        path: String,
    },
    Video {
        content_type: String,
        path: String,
    },
    File {
        content_type: String,
        path: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemType {
    Audio,
    File,
    Image,
    Video,
}

/// Media attached to an `ITEMS` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseItem {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: ItemType,
    pub url: String,
}

/// Follow-up command offered by an `OPTIONS` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseOption {
    pub command: String,
    pub features: Value,
    pub message: String,
    pub text_only_indicator: String,
}

/// What the agent answered, keyed on `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ResponseContent {
    Text {
        message: String,
    },
    Options {
        message: String,
        options: Vec<ResponseOption>,
    },
    Items {
        message: String,
        items: Vec<ResponseItem>,
    },
}

impl ResponseContent {
    pub fn message(&self) -> &str {
        match self {
            Self::Text { message }
            | Self::Options { message, .. }
            | Self::Items { message, .. } => message,
        }
    }
}

/// Direction of a message with its payload and the raw messenger event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE", rename_all_fields = "camelCase")]
pub enum MessageBody {
    Request {
        request: RequestContent,
        raw_request: Value,
    },
    Response {
        response: ResponseContent,
        raw_response: Value,
    },
}

/// Operator feedback left on a message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_type: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub uni: String,
    pub messenger: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<Comment>,
    #[serde(flatten)]
    pub body: MessageBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub uni: String,
    pub messenger: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<Comment>,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl Message {
    pub fn is_request(&self) -> bool {
        matches!(self.body, MessageBody::Request { .. })
    }
}

impl Entity for Message {
    fn id(&self) -> &DocumentId {
        &self.id
    }
}

/// Repository of the `Messages` collection
///
/// List finders return the newest message first.
#[derive(Debug, Clone)]
pub struct MessageRepository {
    inner: DocumentRepository<NewMessage, Message>,
}

impl MessageRepository {
    pub fn schema() -> CollectionSchema {
        CollectionSchema::new("Messages")
            .required("date")
            .required("messenger")
            .required("senderId")
            .required("type")
            .required("uni")
    }

    pub fn open(store: &dyn DocumentStore, options: RepositoryOptions) -> Self {
        Self {
            inner: DocumentRepository::open(store, Self::schema()).with_options(options),
        }
    }

    fn newest_first() -> [Sort; 1] {
        [Sort::desc(DATE_FIELD)]
    }

    pub async fn find_by_uni(&self, uni: &str) -> RepositoryResult<Vec<Message>> {
        self.inner
            .find(doc!({"uni": uni}), &Self::newest_first())
            .await
    }

    pub async fn find_by_uni_and_sender_id(
        &self,
        uni: &str,
        sender_id: &str,
    ) -> RepositoryResult<Vec<Message>> {
        self.inner
            .find(doc!({"uni": uni, "senderId": sender_id}), &Self::newest_first())
            .await
    }

    /// One page of a sender's conversation, ordered by `pageable`'s sorts
    pub async fn find_page_by_uni_and_sender_id(
        &self,
        pageable: &Pageable,
        uni: &str,
        sender_id: &str,
    ) -> RepositoryResult<Page<Message>> {
        self.inner
            .find_page(pageable, doc!({"uni": uni, "senderId": sender_id}))
            .await
    }

    pub async fn find_by_uni_and_sender_id_and_issue_id(
        &self,
        uni: &str,
        sender_id: &str,
        issue_id: &str,
    ) -> RepositoryResult<Vec<Message>> {
        self.inner
            .find(
                doc!({"uni": uni, "senderId": sender_id, "issueId": issue_id}),
                &Self::newest_first(),
            )
            .await
    }

    pub async fn find_by_uni_and_issue_id(
        &self,
        uni: &str,
        issue_id: &str,
    ) -> RepositoryResult<Vec<Message>> {
        self.inner
            .find(doc!({"uni": uni, "issueId": issue_id}), &Self::newest_first())
            .await
    }

    /// Most recent message of an issue
    pub async fn find_latest_by_uni_and_issue_id(
        &self,
        uni: &str,
        issue_id: &str,
    ) -> RepositoryResult<Option<Message>> {
        let latest = self
            .inner
            .find_top(doc!({"uni": uni, "issueId": issue_id}), &Self::newest_first(), 1)
            .await?;
        Ok(latest.into_iter().next())
    }
}

impl Deref for MessageRepository {
    type Target = DocumentRepository<NewMessage, Message>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

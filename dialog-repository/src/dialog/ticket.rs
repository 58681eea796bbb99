//! Tickets: requests to add, update or delete an intent, pending review

use std::fmt;
use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::intent::IntentResponse;
use crate::doc;
use crate::repository::{
    DocumentRepository, Entity, Repository, RepositoryOptions, RepositoryResult,
};
use crate::store::{CollectionSchema, DocumentId, DocumentStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketStatus {
    Pending,
    Completed,
}

impl TicketStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested change, keyed on `action`
///
/// Adding an intent needs its full listing; an update needs at least the new
/// sample question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "UPPERCASE", rename_all_fields = "camelCase")]
pub enum TicketPayload {
    Add {
        category: String,
        sub_category: String,
        sample_question: String,
        responses: Vec<IntentResponse>,
    },
    Update {
        sample_question: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sub_category: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        responses: Vec<IntentResponse>,
    },
    Delete,
}

/// A change request raised by a user
///
/// Tickets about an existing intent carry its id together with the intent
/// as it was when the ticket was raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicket {
    pub uni: String,
    pub user_id: String,
    pub status: TicketStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Value>,
    pub payload: TicketPayload,
}

impl NewTicket {
    /// Pending ticket for a new intent, dated now
    pub fn pending(
        uni: impl Into<String>,
        user_id: impl Into<String>,
        payload: TicketPayload,
    ) -> Self {
        Self {
            uni: uni.into(),
            user_id: user_id.into(),
            status: TicketStatus::Pending,
            date: Utc::now(),
            intent_id: None,
            origin: None,
            payload,
        }
    }

    /// Target the existing intent `intent_id`, snapshotting it as `origin`
    #[must_use]
    pub fn for_intent(mut self, intent_id: impl Into<String>, origin: Value) -> Self {
        self.intent_id = Some(intent_id.into());
        self.origin = Some(origin);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    #[serde(flatten)]
    pub request: NewTicket,
}

impl Ticket {
    pub fn complete(&mut self) {
        self.request.status = TicketStatus::Completed;
    }
}

impl Entity for Ticket {
    fn id(&self) -> &DocumentId {
        &self.id
    }
}

/// Repository of the `Tickets` collection
#[derive(Debug, Clone)]
pub struct TicketRepository {
    inner: DocumentRepository<NewTicket, Ticket>,
}

impl TicketRepository {
    pub fn schema() -> CollectionSchema {
        CollectionSchema::new("Tickets")
            .required("date")
            .required("payload.action")
            .required("status")
            .required("uni")
            .required("userId")
    }

    pub fn open(store: &dyn DocumentStore, options: RepositoryOptions) -> Self {
        Self {
            inner: DocumentRepository::open(store, Self::schema()).with_options(options),
        }
    }

    pub async fn find_by_uni_and_status(
        &self,
        uni: &str,
        status: TicketStatus,
    ) -> RepositoryResult<Vec<Ticket>> {
        self.inner
            .find(doc!({"uni": uni, "status": status.as_str()}), &[])
            .await
    }

    pub async fn find_by_uni_and_status_and_intent_id(
        &self,
        uni: &str,
        status: TicketStatus,
        intent_id: &str,
    ) -> RepositoryResult<Option<Ticket>> {
        self.inner
            .find_one(doc!({"uni": uni, "status": status.as_str(), "intentId": intent_id}))
            .await
    }
}

impl Deref for TicketRepository {
    type Target = DocumentRepository<NewTicket, Ticket>;

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

    fn add() -> TicketPayload {
        TicketPayload::Add {
            category: "Greetings".to_string(),
            sub_category: "name".to_string(),
            sample_question: "hello".to_string(),
            responses: vec![IntentResponse::Text {
                messages: json!([{"en-GB": "Hi!"}]),
                force_show: None,
            }],
        }
    }

    fn update() -> TicketPayload {
        TicketPayload::Update {
            sample_question: "hi there".to_string(),
            category: None,
            sub_category: None,
            responses: Vec::new(),
        }
    }

    fn tickets() -> TicketRepository {
        TicketRepository::open(&MemoryStore::new(), RepositoryOptions::default())
    }

    #[tokio::test]
    async fn test_find_by_uni_and_status() {
        let tickets = tickets();
        let mut done = tickets
            .create(NewTicket::pending("dev", "u1", add()))
            .await
            .unwrap();
        done.complete();
        let done = tickets.save(Save::Existing(done)).await.unwrap();
        tickets
            .create(NewTicket::pending("dev", "u2", TicketPayload::Delete))
            .await
            .unwrap();
        tickets
            .create(NewTicket::pending("prod", "u1", add()))
            .await
            .unwrap();

        let pending = tickets
            .find_by_uni_and_status("dev", TicketStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request.payload, TicketPayload::Delete);

        let completed = tickets
            .find_by_uni_and_status("dev", TicketStatus::Completed)
            .await
            .unwrap();
        assert_eq!(completed, vec![done]);
    }

    #[tokio::test]
    async fn test_find_by_uni_and_status_and_intent_id() {
        let tickets = tickets();
        let origin = json!({"command": "C_GREETING", "sampleQuestion": "hello"});
        let target = tickets
            .create(NewTicket::pending("dev", "u1", update()).for_intent("i-1", origin.clone()))
            .await
            .unwrap();
        tickets
            .create(NewTicket::pending("dev", "u1", update()).for_intent("i-2", origin))
            .await
            .unwrap();

        let found = tickets
            .find_by_uni_and_status_and_intent_id("dev", TicketStatus::Pending, "i-1")
            .await
            .unwrap();
        assert_eq!(found, Some(target));
        assert!(tickets
            .find_by_uni_and_status_and_intent_id("dev", TicketStatus::Completed, "i-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_payload_is_stored_by_action() {
        let tickets = tickets();
        let stored = tickets
            .create(NewTicket::pending("dev", "u1", update()))
            .await
            .unwrap();
        let raw = tickets.collection().find_by_id(&stored.id).await.unwrap().unwrap();
        assert_eq!(raw["payload"], json!({"action": "UPDATE", "sampleQuestion": "hi there"}));
        assert_eq!(raw["status"], "PENDING");
        assert!(raw["date"].is_i64());
    }

    #[tokio::test]
    async fn test_missing_action_is_rejected() {
        let tickets = tickets();
        let raw: DocumentRepository<crate::store::Document, Ticket> =
            DocumentRepository::new(tickets.collection().clone());
        let err = raw
            .create(doc!({
                "uni": "dev",
                "userId": "u1",
                "status": "PENDING",
                "date": 0,
                "payload": {},
            }))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
        assert_eq!(err.path.as_deref(), Some("payload.action"));
    }

    #[test]
    fn test_add_without_responses_is_rejected() {
        let err = serde_json::from_value::<TicketPayload>(json!({
            "action": "ADD",
            "category": "Greetings",
            "subCategory": "name",
            "sampleQuestion": "hello",
        }))
        .unwrap_err();
        assert!(err.to_string().contains("responses"));
    }
}

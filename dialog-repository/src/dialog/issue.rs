//! Support issues opened by message senders

use std::fmt;
use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::doc;
use crate::repository::{
    DocumentRepository, Entity, Repository, RepositoryOptions, RepositoryResult,
};
use crate::store::{CollectionSchema, DocumentId, DocumentStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IssueStatus {
    Open,
    Closed,
}

impl IssueStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A support conversation opened by a sender on a messenger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIssue {
    pub uni: String,
    pub messenger: String,
    pub sender_id: String,
    pub status: IssueStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub open_date: DateTime<Utc>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub closed_date: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated_date: DateTime<Utc>,
}

impl NewIssue {
    /// Open issue for `sender_id`, dated now
    pub fn open(
        uni: impl Into<String>,
        messenger: impl Into<String>,
        sender_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            uni: uni.into(),
            messenger: messenger.into(),
            sender_id: sender_id.into(),
            status: IssueStatus::Open,
            open_date: now,
            closed_date: None,
            last_updated_date: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub uni: String,
    pub messenger: String,
    pub sender_id: String,
    pub status: IssueStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub open_date: DateTime<Utc>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub closed_date: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated_date: DateTime<Utc>,
}

impl Issue {
    /// Close the issue at `at`
    pub fn close(&mut self, at: DateTime<Utc>) {
        self.status = IssueStatus::Closed;
        self.closed_date = Some(at);
        self.last_updated_date = at;
    }
}

impl Entity for Issue {
    fn id(&self) -> &DocumentId {
        &self.id
    }
}

/// Repository of the `Issues` collection
#[derive(Debug, Clone)]
pub struct IssueRepository {
    inner: DocumentRepository<NewIssue, Issue>,
}

impl IssueRepository {
    pub fn schema() -> CollectionSchema {
        CollectionSchema::new("Issues")
            .required("lastUpdatedDate")
            .required("messenger")
            .required("openDate")
            .required("senderId")
            .required("status")
            .required("uni")
    }

    pub fn open(store: &dyn DocumentStore, options: RepositoryOptions) -> Self {
        Self {
            inner: DocumentRepository::open(store, Self::schema()).with_options(options),
        }
    }

    pub async fn find_by_uni_and_status(
        &self,
        uni: &str,
        status: IssueStatus,
    ) -> RepositoryResult<Vec<Issue>> {
        self.inner
            .find(doc!({"uni": uni, "status": status.as_str()}), &[])
            .await
    }

    pub async fn find_by_uni_and_sender_id(
        &self,
        uni: &str,
        sender_id: &str,
    ) -> RepositoryResult<Vec<Issue>> {
        self.inner
            .find(doc!({"uni": uni, "senderId": sender_id}), &[])
            .await
    }

    pub async fn find_by_uni_and_sender_id_and_status(
        &self,
        uni: &str,
        sender_id: &str,
        status: IssueStatus,
    ) -> RepositoryResult<Vec<Issue>> {
        self.inner
            .find(
                doc!({"uni": uni, "senderId": sender_id, "status": status.as_str()}),
                &[],
            )
            .await
    }

    /// Issues of a sender whose status is anything but `status`
    pub async fn find_by_uni_and_sender_id_and_not_status(
        &self,
        uni: &str,
        sender_id: &str,
        status: IssueStatus,
    ) -> RepositoryResult<Vec<Issue>> {
        self.inner
            .find(
                doc!({"uni": uni, "senderId": sender_id, "status": {"$ne": status.as_str()}}),
                &[],
            )
            .await
    }
}

impl Deref for IssueRepository {
    type Target = DocumentRepository<NewIssue, Issue>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::repository::{RepositoryErrorKind, Save};
    use crate::store::memory::MemoryStore;

    async fn seeded() -> (IssueRepository, Issue) {
        let issues = IssueRepository::open(&MemoryStore::new(), RepositoryOptions::default());
        let mut closed = issues
            .create(NewIssue::open("acme", "line", "u1"))
            .await
            .unwrap();
        closed.close(Utc::now());
        let closed = issues.save(Save::Existing(closed)).await.unwrap();
        issues
            .create(NewIssue::open("acme", "line", "u1"))
            .await
            .unwrap();
        issues
            .create(NewIssue::open("acme", "messenger", "u2"))
            .await
            .unwrap();
        issues
            .create(NewIssue::open("globex", "line", "u1"))
            .await
            .unwrap();
        (issues, closed)
    }

    #[tokio::test]
    async fn test_find_by_uni_and_status() {
        let (issues, closed) = seeded().await;
        let open = issues
            .find_by_uni_and_status("acme", IssueStatus::Open)
            .await
            .unwrap();
        assert_eq!(open.len(), 2);

        let found = issues
            .find_by_uni_and_status("acme", IssueStatus::Closed)
            .await
            .unwrap();
        assert_eq!(found, vec![closed]);
    }

    #[tokio::test]
    async fn test_find_by_sender() {
        let (issues, closed) = seeded().await;
        assert_eq!(
            issues.find_by_uni_and_sender_id("acme", "u1").await.unwrap().len(),
            2
        );

        let open = issues
            .find_by_uni_and_sender_id_and_status("acme", "u1", IssueStatus::Open)
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].status, IssueStatus::Open);

        let not_open = issues
            .find_by_uni_and_sender_id_and_not_status("acme", "u1", IssueStatus::Open)
            .await
            .unwrap();
        assert_eq!(not_open, vec![closed]);
    }

    #[tokio::test]
    async fn test_status_is_stored_uppercase() {
        let (issues, closed) = seeded().await;
        let raw = issues.collection().find_by_id(&closed.id).await.unwrap().unwrap();
        assert_eq!(raw["status"], "CLOSED");
        assert!(raw["closedDate"].is_i64());
    }

    #[tokio::test]
    async fn test_missing_required_path_is_rejected() {
        let issues = IssueRepository::open(&MemoryStore::new(), RepositoryOptions::default());
        let raw: DocumentRepository<crate::store::Document, Issue> =
            DocumentRepository::new(issues.collection().clone());
        let err = raw
            .create(doc!({"uni": "acme", "status": "OPEN"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
        assert_eq!(err.path.as_deref(), Some("lastUpdatedDate"));
    }
}

//! Entity repositories of the dialog backend
//!
//! Each repository pairs an entity with the [`CollectionSchema`] of its
//! collection and adds the finders the dialog services use. Generic
//! operations come from [`DocumentRepository`](crate::repository::DocumentRepository)
//! or [`SoftDeleteRepository`](crate::repository::SoftDeleteRepository),
//! reachable through `Deref`.
//!
//! | Repository | Collection | Unique index |
//! |---|---|---|
//! | [`UserRepository`] | `Users` | `(uni, username)` |
//! | [`IssueRepository`] | `Issues` | |
//! | [`ConfigRepository`] | `Configs` | `(uni, key)` |
//! | [`MessageRepository`] | `Messages` | |
//! | [`SenderInfoRepository`] | `SenderInfo` | `(uni, messenger, senderId)` |
//! | [`RequestResponseMappingRepository`] | `RequestResponseMappings` | |
//! | [`IntentRepository`] | `Intents` | `(uni, command)` |
//! | [`TicketRepository`] | `Tickets` | |
//!
//! Conditional requirements (a request message carries a request body, an
//! `OPTIONS` reply carries options, an `ADD` ticket carries the new intent's
//! listing) are expressed by the entity types; the schemas only declare
//! unconditional required paths.

mod config_entry;
mod intent;
mod issue;
mod mapping;
mod message;
mod sender_info;
mod ticket;
mod user;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Result;
use crate::repository::{Repository, RepositoryOptions};
use crate::store::{self, DocumentStore};

pub use config_entry::{ConfigEntry, ConfigRepository, NewConfigEntry};
pub use intent::{
    Intent, IntentItem, IntentOption, IntentRepository, IntentResponse, NewIntent,
    HIDDEN_CATEGORY,
};
pub use issue::{Issue, IssueRepository, IssueStatus, NewIssue};
pub use mapping::{
    NewRequestResponseMapping, RequestResponseMapping, RequestResponseMappingRepository,
};
pub use message::{
    Comment, ItemType, Message, MessageBody, MessageRepository, NewMessage, RequestContent,
    ResponseContent, ResponseItem, ResponseOption,
};
pub use sender_info::{NewSenderInfo, SenderInfo, SenderInfoRepository};
pub use ticket::{NewTicket, Ticket, TicketPayload, TicketRepository, TicketStatus};
pub use user::{NewUser, User, UserRepository};

/// Creation and last-update stamps
///
/// Timestamps are stored as epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAction {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl UserAction {
    /// Created and last updated by `actor`, now
    pub fn by(actor: impl Into<String>) -> Self {
        let actor = actor.into();
        let now = Utc::now();
        Self {
            created_at: now,
            created_by: actor.clone(),
            updated_at: now,
            updated_by: actor,
        }
    }

    /// Record an update by `actor` at `at`
    pub fn touch(&mut self, actor: impl Into<String>, at: DateTime<Utc>) {
        self.updated_by = actor.into();
        self.updated_at = at;
    }
}

/// Every dialog repository opened on one store
#[derive(Debug, Clone)]
pub struct DialogRepositories {
    pub users: UserRepository,
    pub issues: IssueRepository,
    pub configs: ConfigRepository,
    pub messages: MessageRepository,
    pub sender_infos: SenderInfoRepository,
    pub request_response_mappings: RequestResponseMappingRepository,
    pub intents: IntentRepository,
    pub tickets: TicketRepository,
}

impl DialogRepositories {
    /// Open every collection on `store`
    pub fn open(store: &dyn DocumentStore, options: &RepositoryOptions) -> Self {
        Self {
            users: UserRepository::open(store, options.clone()),
            issues: IssueRepository::open(store, options.clone()),
            configs: ConfigRepository::open(store, options.clone()),
            messages: MessageRepository::open(store, options.clone()),
            sender_infos: SenderInfoRepository::open(store, options.clone()),
            request_response_mappings: RequestResponseMappingRepository::open(
                store,
                options.clone(),
            ),
            intents: IntentRepository::open(store, options.clone()),
            tickets: TicketRepository::open(store, options.clone()),
        }
    }

    /// Connect to the configured store and open every collection
    pub fn from_config(config: &Config) -> Result<(Arc<dyn DocumentStore>, Self)> {
        let store = store::connect(&config.store)?;
        let repositories = Self::open(&*store, &RepositoryOptions::from(&config.repository));
        tracing::info!(
            service = %config.service.name,
            url = %config.store.url,
            "Opened dialog repositories"
        );
        Ok((store, repositories))
    }

    /// Wait until every collection's indexes are built
    pub async fn wait_indexed(&self) -> bool {
        let (users, issues, configs, messages, sender_infos, mappings, intents, tickets) =
            futures::join!(
                self.users.wait_indexed(),
                self.issues.wait_indexed(),
                self.configs.wait_indexed(),
                self.messages.wait_indexed(),
                self.sender_infos.wait_indexed(),
                self.request_response_mappings.wait_indexed(),
                self.intents.wait_indexed(),
                self.tickets.wait_indexed(),
            );
        [users, issues, configs, messages, sender_infos, mappings, intents, tickets]
            .into_iter()
            .all(|indexed| indexed)
    }
}

//! Request/response mappings, removed logically

use std::ops::Deref;

use serde::{Deserialize, Serialize};

use super::UserAction;
use crate::repository::{
    Entity, RepositoryOptions, SoftDeletable, SoftDeleteFields, SoftDeleteRepository,
    DELETED_FIELD,
};
use crate::store::{CollectionSchema, DocumentId, DocumentStore};

/// Links sample requests to the responses the agent should give
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequestResponseMapping {
    pub uni: String,
    pub requests: Vec<String>,
    pub responses: Vec<String>,
    #[serde(flatten)]
    pub user_action: UserAction,
}

impl NewRequestResponseMapping {
    /// Mapping created by `actor`, now
    pub fn new(
        uni: impl Into<String>,
        requests: Vec<String>,
        responses: Vec<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            uni: uni.into(),
            requests,
            responses,
            user_action: UserAction::by(actor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponseMapping {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub uni: String,
    pub requests: Vec<String>,
    pub responses: Vec<String>,
    #[serde(flatten)]
    pub user_action: UserAction,
    #[serde(flatten)]
    pub soft_delete: SoftDeleteFields,
}

impl Entity for RequestResponseMapping {
    fn id(&self) -> &DocumentId {
        &self.id
    }
}

impl SoftDeletable for RequestResponseMapping {
    fn soft_delete(&self) -> &SoftDeleteFields {
        &self.soft_delete
    }
}

/// Repository of the `RequestResponseMappings` collection
///
/// Removal is logical; removed mappings stay in the collection.
#[derive(Debug, Clone)]
pub struct RequestResponseMappingRepository {
    inner: SoftDeleteRepository<NewRequestResponseMapping, RequestResponseMapping>,
}

impl RequestResponseMappingRepository {
    pub fn schema() -> CollectionSchema {
        CollectionSchema::new("RequestResponseMappings")
            .default_value(DELETED_FIELD, false)
            .default_value("createdBy", "SYSTEM")
            .default_value("updatedBy", "SYSTEM")
            .required("createdAt")
            .required("createdBy")
            .required(DELETED_FIELD)
            .required("requests")
            .required("responses")
            .required("uni")
            .required("updatedAt")
            .required("updatedBy")
    }

    pub fn open(store: &dyn DocumentStore, options: RepositoryOptions) -> Self {
        Self {
            inner: SoftDeleteRepository::with_options(store.collection(Self::schema()), options),
        }
    }
}

impl Deref for RequestResponseMappingRepository {
    type Target = SoftDeleteRepository<NewRequestResponseMapping, RequestResponseMapping>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

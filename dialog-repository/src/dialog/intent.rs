//! Intents: the commands a dialog agent recognizes and the replies it gives

use std::ops::Deref;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::ItemType;
use crate::doc;
use crate::repository::{
    DocumentRepository, Entity, Repository, RepositoryOptions, RepositoryResult,
};
use crate::store::{CollectionSchema, DocumentId, DocumentStore};

/// Category of intents that are never listed to end users
pub const HIDDEN_CATEGORY: &str = "HIDDEN";

/// Follow-up command offered by an `OPTIONS` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentOption {
    pub command: String,
    pub features: Value,
    /// Localized labels, keyed by language tag
    pub messages: Value,
    pub text_only_indicator: String,
}

/// Media attached to an `ITEMS` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentItem {
    pub messages: Value,
    #[serde(rename = "type")]
    pub kind: ItemType,
    pub url: String,
}

/// One reply of an intent, keyed on `type`
///
/// `OPTIONS` replies always carry their options and `ITEMS` replies their
/// items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE", rename_all_fields = "camelCase")]
pub enum IntentResponse {
    Text {
        messages: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        force_show: Option<bool>,
    },
    Options {
        messages: Value,
        options: Vec<IntentOption>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        force_show: Option<bool>,
    },
    Items {
        messages: Value,
        items: Vec<IntentItem>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        force_show: Option<bool>,
    },
}

impl IntentResponse {
    /// Localized messages of the reply
    pub fn messages(&self) -> &Value {
        match self {
            Self::Text { messages, .. }
            | Self::Options { messages, .. }
            | Self::Items { messages, .. } => messages,
        }
    }
}

/// Intent definition
///
/// Intents outside the [`HIDDEN_CATEGORY`] are listed to users and need a
/// `sub_category` and a `sample_question`; see [`NewIntent::is_listable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIntent {
    pub uni: String,
    pub command: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_question: Option<String>,
    pub responses: Vec<IntentResponse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_feature_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_features: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_features: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub executors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_processors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_processors: Vec<String>,
    /// Minutes before the dialog session of this intent expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_expire: Option<u64>,
}

impl NewIntent {
    /// Intent with no optional settings
    pub fn new(
        uni: impl Into<String>,
        command: impl Into<String>,
        category: impl Into<String>,
        responses: Vec<IntentResponse>,
    ) -> Self {
        Self {
            uni: uni.into(),
            command: command.into(),
            category: category.into(),
            sub_category: None,
            sample_question: None,
            responses,
            required_feature_keys: Vec::new(),
            default_features: None,
            missing_features: None,
            fallback_command: None,
            executors: Vec::new(),
            pre_processors: Vec::new(),
            post_processors: Vec::new(),
            session_expire: None,
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.category == HIDDEN_CATEGORY
    }

    /// Whether the intent is hidden or has what listing it needs
    pub fn is_listable(&self) -> bool {
        self.is_hidden() || (self.sub_category.is_some() && self.sample_question.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    #[serde(flatten)]
    pub definition: NewIntent,
}

impl Entity for Intent {
    fn id(&self) -> &DocumentId {
        &self.id
    }
}

/// Repository of the `Intents` collection
#[derive(Debug, Clone)]
pub struct IntentRepository {
    inner: DocumentRepository<NewIntent, Intent>,
}

impl IntentRepository {
    pub fn schema() -> CollectionSchema {
        CollectionSchema::new("Intents")
            .unique(["uni", "command"])
            .required("category")
            .required("command")
            .required("responses")
            .required("uni")
    }

    pub fn open(store: &dyn DocumentStore, options: RepositoryOptions) -> Self {
        Self {
            inner: DocumentRepository::open(store, Self::schema()).with_options(options),
        }
    }

    pub async fn find_by_uni_command_name(
        &self,
        uni: &str,
        command: &str,
    ) -> RepositoryResult<Option<Intent>> {
        self.inner
            .find_one(doc!({"uni": uni, "command": command}))
            .await
    }

    pub async fn find_by_uni(&self, uni: &str) -> RepositoryResult<Vec<Intent>> {
        self.inner.find(doc!({"uni": uni}), &[]).await
    }
}

impl Deref for IntentRepository {
    type Target = DocumentRepository<NewIntent, Intent>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    fn greeting() -> NewIntent {
        NewIntent {
            sub_category: Some("name".to_string()),
            sample_question: Some("hello".to_string()),
            required_feature_keys: vec!["F_NAME".to_string()],
            session_expire: Some(5),
            ..NewIntent::new(
                "dev",
                "C_GREETING",
                "Greetings",
                vec![IntentResponse::Text {
                    messages: json!([{"en-GB": "Hello {F_NAME}. I am Lexica."}]),
                    force_show: None,
                }],
            )
        }
    }

    fn questionnaire() -> NewIntent {
        NewIntent::new(
            "dev",
            "C_DO_QUESTIONNAIRE",
            HIDDEN_CATEGORY,
            vec![IntentResponse::Options {
                messages: json!([{"en-GB": "Questionnaire"}]),
                options: vec![IntentOption {
                    command: "C_QUESTIONNAIRE_ANSWER_A".to_string(),
                    features: json!({"F_ANSWER": "Science"}),
                    messages: json!([{"en-GB": "A. Science"}]),
                    text_only_indicator: "A".to_string(),
                }],
                force_show: Some(true),
            }],
        )
    }

    fn intents() -> IntentRepository {
        IntentRepository::open(&MemoryStore::new(), RepositoryOptions::default())
    }

    #[tokio::test]
    async fn test_find_by_uni_command_name() {
        let intents = intents();
        intents.create(greeting()).await.unwrap();
        let stored = intents.create(questionnaire()).await.unwrap();

        let found = intents
            .find_by_uni_command_name("dev", "C_DO_QUESTIONNAIRE")
            .await
            .unwrap();
        assert_eq!(found, Some(stored));
        assert!(intents
            .find_by_uni_command_name("prod", "C_DO_QUESTIONNAIRE")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_find_by_uni() {
        let intents = intents();
        intents.create(greeting()).await.unwrap();
        intents.create(questionnaire()).await.unwrap();
        intents
            .create(NewIntent {
                uni: "prod".to_string(),
                ..greeting()
            })
            .await
            .unwrap();

        let dev = intents.find_by_uni("dev").await.unwrap();
        assert_eq!(dev.len(), 2);
        assert!(dev.iter().all(|intent| intent.definition.uni == "dev"));
    }

    #[tokio::test]
    async fn test_command_is_unique_per_uni() {
        let intents = intents();
        intents.create(greeting()).await.unwrap();

        let err = intents
            .create(NewIntent {
                category: "Greeting".to_string(),
                ..greeting()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::DuplicateKey);
        assert!(err.message.contains("uni_1_command_1"));
    }

    #[tokio::test]
    async fn test_responses_are_stored_by_type() {
        let intents = intents();
        let stored = intents.create(questionnaire()).await.unwrap();
        let raw = intents.collection().find_by_id(&stored.id).await.unwrap().unwrap();
        assert_eq!(raw["responses"][0]["type"], "OPTIONS");
        assert_eq!(raw["responses"][0]["forceShow"], true);
        assert_eq!(raw["responses"][0]["options"][0]["textOnlyIndicator"], "A");

        assert!(stored.definition.is_hidden());
        assert!(stored.definition.is_listable());
        assert!(greeting().is_listable());
        assert!(!NewIntent {
            sample_question: None,
            ..greeting()
        }
        .is_listable());
    }

    #[test]
    fn test_options_reply_without_options_is_rejected() {
        let err = serde_json::from_value::<IntentResponse>(json!({
            "type": "OPTIONS",
            "messages": [{"en-GB": "Pick one"}],
        }))
        .unwrap_err();
        assert!(err.to_string().contains("options"));
    }
}

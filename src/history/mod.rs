mod firestore;
mod memory;
mod redis;

pub use firestore::FirestoreConversationStore;
pub use memory::InMemoryConversationStore;
pub use self::redis::RedisConversationStore;

use async_trait::async_trait;
use log::{ info, warn };
use serde_json::{ Map, Value };
use std::sync::Arc;
use thiserror::Error;
use crate::cli::Args;
use crate::config::credentials::{ CredentialsError, GoogleAuth };
use crate::models::chat::Message;

pub const CONVERSATION_FIELD: &str = "conversation";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error("invalid stored record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("malformed record for '{0}': {1}")]
    Malformed(String, String),
    #[error("invalid store endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("unsupported conversation store type: {0}")]
    UnsupportedType(String),
}

/// Append-only conversation log keyed by user identifier.
///
/// `append` is a read-modify-write of the whole list with no version check:
/// two writers under the same identifier can lose each other's messages.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Returns the stored sequence, or an empty one when no record exists.
    /// Never creates a record.
    async fn get(&self, user_id: &str) -> Result<Vec<Message>, StoreError>;

    /// Concatenates `new_messages` onto the stored sequence and writes the
    /// whole list back, leaving other fields of the record untouched.
    async fn append(&self, user_id: &str, new_messages: &[Message]) -> Result<(), StoreError>;
}

pub async fn create_conversation_store(
    args: &Args
) -> Result<Arc<dyn ConversationStore>, StoreError> {
    match args.store_type.to_lowercase().as_str() {
        "firestore" => {
            let auth = GoogleAuth::from_env_value(
                args.firebase_credentials.as_deref(),
                args.firestore_project_id.as_deref()
            ).await?;
            let store = FirestoreConversationStore::new(
                auth,
                &args.firestore_base_url,
                &args.firestore_database,
                &args.firestore_collection
            )?;
            info!(
                "Conversations will be stored in Firestore collection '{}' (database {})",
                args.firestore_collection,
                args.firestore_database
            );
            Ok(Arc::new(store))
        }
        "redis" => {
            let store = RedisConversationStore::new(&args.redis_url, &args.redis_prefix)?;
            info!("Conversations will be stored in Redis at {}", args.redis_url);
            Ok(Arc::new(store))
        }
        "memory" => {
            warn!("Conversations are kept in memory and will be lost on restart");
            Ok(Arc::new(InMemoryConversationStore::new()))
        }
        other => Err(StoreError::UnsupportedType(other.to_string())),
    }
}

/// Decodes the `conversation` list of a stored record. Entries that are not a
/// valid `{role, content}` pair are skipped.
pub fn messages_from_record(user_id: &str, record: &Map<String, Value>) -> Vec<Message> {
    let entries = match record.get(CONVERSATION_FIELD).and_then(Value::as_array) {
        Some(entries) => entries,
        None => return Vec::new(),
    };

    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<Message>(entry.clone()) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Skipping unreadable history entry for '{}': {}", user_id, e);
                None
            }
        })
        .collect()
}

/// Appends to the record's `conversation` list in place. Existing entries are
/// kept verbatim, including ones `messages_from_record` would skip.
pub fn merge_into_record(
    user_id: &str,
    record: &mut Map<String, Value>,
    new_messages: &[Message]
) -> Result<(), StoreError> {
    let mut entries = match record.remove(CONVERSATION_FIELD) {
        Some(Value::Array(entries)) => entries,
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            return Err(
                StoreError::Malformed(
                    user_id.to_string(),
                    format!("'{}' is not a list: {}", CONVERSATION_FIELD, other)
                )
            );
        }
    };

    for message in new_messages {
        entries.push(serde_json::to_value(message)?);
    }
    record.insert(CONVERSATION_FIELD.to_string(), Value::Array(entries));
    Ok(())
}

pub fn format_history_for_log(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join(" | ")
}

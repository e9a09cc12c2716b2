use async_trait::async_trait;
use crate::history::{ format_history_for_log, merge_into_record, messages_from_record, ConversationStore, StoreError };
use crate::models::chat::Message;
use log::debug;
use redis::{ Client, AsyncCommands };
use serde_json::{ Map, Value };

/// Keeps each conversation record as one JSON string under `{prefix}{user_id}`.
pub struct RedisConversationStore {
    client: Client,
    key_prefix: String,
}

impl RedisConversationStore {
    pub fn new(url: &str, key_prefix: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(url)?,
            key_prefix: key_prefix.to_string(),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn key(&self, user_id: &str) -> String {
        format!("{}{}", self.key_prefix, user_id)
    }

    async fn read_record(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        user_id: &str
    ) -> Result<Option<Map<String, Value>>, StoreError> {
        let raw: Option<String> = conn.get(self.key(user_id)).await?;
        match raw {
            None => Ok(None),
            Some(json) => match serde_json::from_str::<Value>(&json)? {
                Value::Object(record) => Ok(Some(record)),
                other => Err(StoreError::Malformed(user_id.to_string(), format!("expected an object, got {}", other))),
            },
        }
    }
}

#[async_trait]
impl ConversationStore for RedisConversationStore {
    async fn get(&self, user_id: &str) -> Result<Vec<Message>, StoreError> {
        let mut conn = self.get_connection().await?;
        let messages = self.read_record(&mut conn, user_id).await?
            .map(|record| messages_from_record(user_id, &record))
            .unwrap_or_default();
        debug!("Conversation for {}: {}", user_id, format_history_for_log(&messages));
        Ok(messages)
    }

    async fn append(&self, user_id: &str, new_messages: &[Message]) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let mut record = self.read_record(&mut conn, user_id).await?.unwrap_or_default();
        merge_into_record(user_id, &mut record, new_messages)?;

        let json = serde_json::to_string(&Value::Object(record))?;
        let _: () = conn.set(self.key(user_id), json).await?;
        debug!("Appended {} message(s) for {}", new_messages.len(), user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_prefixed_identifiers() {
        let store = RedisConversationStore::new("redis://127.0.0.1:6379", "conversation:").unwrap();
        assert_eq!(store.key("Sam"), "conversation:Sam");
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(RedisConversationStore::new("not-a-url", "conversation:").is_err());
    }
}

use async_trait::async_trait;
use serde_json::{ Map, Value };
use std::collections::HashMap;
use tokio::sync::Mutex;
use crate::history::{ merge_into_record, messages_from_record, ConversationStore, StoreError };
use crate::models::chat::Message;

/// Process-local store with the same record semantics as the remote backends.
#[derive(Default)]
pub struct InMemoryConversationStore {
    records: Mutex<HashMap<String, Map<String, Value>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl InMemoryConversationStore {
    pub(crate) async fn contains(&self, user_id: &str) -> bool {
        self.records.lock().await.contains_key(user_id)
    }

    pub(crate) async fn insert_record(&self, user_id: &str, record: Map<String, Value>) {
        self.records.lock().await.insert(user_id.to_string(), record);
    }

    pub(crate) async fn record(&self, user_id: &str) -> Option<Map<String, Value>> {
        self.records.lock().await.get(user_id).cloned()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, user_id: &str) -> Result<Vec<Message>, StoreError> {
        let records = self.records.lock().await;
        Ok(records.get(user_id).map(|r| messages_from_record(user_id, r)).unwrap_or_default())
    }

    async fn append(&self, user_id: &str, new_messages: &[Message]) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let mut record = records.get(user_id).cloned().unwrap_or_default();
        merge_into_record(user_id, &mut record, new_messages)?;
        records.insert(user_id.to_string(), record);
        Ok(())
    }
}

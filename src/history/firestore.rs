use async_trait::async_trait;
use log::{ debug, warn };
use reqwest::{ Client as HttpClient, StatusCode };
use serde_json::{ json, Value };
use url::Url;

use crate::config::credentials::GoogleAuth;
use crate::history::{ format_history_for_log, ConversationStore, StoreError, CONVERSATION_FIELD };
use crate::models::chat::{ Message, Role };

/// Locates conversation documents in the Firestore REST namespace.
#[derive(Debug, Clone)]
pub struct DocumentLocator {
    base: Url,
    project_id: String,
    database: String,
    collection: String,
}

impl DocumentLocator {
    pub fn new(base_url: &str, project_id: &str, database: &str, collection: &str) -> Result<Self, StoreError> {
        let base = Url::parse(base_url).map_err(|e| StoreError::InvalidEndpoint(format!("{}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::InvalidEndpoint(base_url.to_string()));
        }
        Ok(Self {
            base,
            project_id: project_id.to_string(),
            database: database.to_string(),
            collection: collection.to_string(),
        })
    }

    /// The user identifier is pushed as one percent-encoded path segment, so
    /// `/` or `?` in a name cannot escape the collection. Identifiers that are
    /// not valid document IDs are rejected instead of being normalized away.
    pub fn document_url(&self, user_id: &str) -> Result<Url, StoreError> {
        check_document_id(user_id)?;
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["projects", self.project_id.as_str(), "databases", self.database.as_str(), "documents"])
                .push(&self.collection)
                .push(user_id);
        }
        Ok(url)
    }
}

/// `.` and `..` are dropped by URL path normalization and `__*__` IDs are
/// reserved by Firestore.
fn check_document_id(user_id: &str) -> Result<(), StoreError> {
    let reason = if user_id.is_empty() || user_id == "." || user_id == ".." {
        "not a valid document ID"
    } else if user_id.len() >= 4 && user_id.starts_with("__") && user_id.ends_with("__") {
        "document IDs of the form __*__ are reserved"
    } else {
        return Ok(());
    };
    Err(StoreError::Malformed(user_id.to_string(), reason.to_string()))
}

pub fn encode_message(message: &Message) -> Value {
    json!({
        "mapValue": {
            "fields": {
                "role": { "stringValue": message.role.as_str() },
                "content": { "stringValue": message.content }
            }
        }
    })
}

pub fn decode_message(value: &Value) -> Option<Message> {
    let fields = value.get("mapValue")?.get("fields")?;
    let role = Role::parse(fields.get("role")?.get("stringValue")?.as_str()?)?;
    let content = fields.get("content")?.get("stringValue")?.as_str()?;
    Some(Message::new(role, content))
}

/// Pulls the typed `conversation` array values out of a document body.
fn conversation_values(user_id: &str, document: &Value) -> Result<Vec<Value>, StoreError> {
    let field = match document.get("fields").and_then(|f| f.get(CONVERSATION_FIELD)) {
        Some(field) => field,
        None => return Ok(Vec::new()),
    };
    let array = field.get("arrayValue").ok_or_else(|| {
        StoreError::Malformed(user_id.to_string(), format!("'{}' is not an array value", CONVERSATION_FIELD))
    })?;
    // Firestore omits `values` for an empty array.
    Ok(array.get("values").and_then(Value::as_array).cloned().unwrap_or_default())
}

pub struct FirestoreConversationStore {
    http: HttpClient,
    auth: GoogleAuth,
    locator: DocumentLocator,
}

impl FirestoreConversationStore {
    pub fn new(
        auth: GoogleAuth,
        base_url: &str,
        database: &str,
        collection: &str
    ) -> Result<Self, StoreError> {
        let locator = DocumentLocator::new(base_url, auth.project_id(), database, collection)?;
        Ok(Self {
            http: HttpClient::new(),
            auth,
            locator,
        })
    }

    async fn read_values(&self, user_id: &str) -> Result<Vec<Value>, StoreError> {
        let token = self.auth.access_token().await?;
        let resp = self.http
            .get(self.locator.document_url(user_id)?)
            .bearer_auth(token)
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let document: Value = resp.error_for_status()?.json().await?;
        conversation_values(user_id, &document)
    }
}

#[async_trait]
impl ConversationStore for FirestoreConversationStore {
    async fn get(&self, user_id: &str) -> Result<Vec<Message>, StoreError> {
        let values = self.read_values(user_id).await?;
        let messages: Vec<Message> = values
            .iter()
            .filter_map(|value| {
                let decoded = decode_message(value);
                if decoded.is_none() {
                    warn!("Skipping unreadable history entry for '{}': {}", user_id, value);
                }
                decoded
            })
            .collect();
        debug!("Conversation for {}: {}", user_id, format_history_for_log(&messages));
        Ok(messages)
    }

    async fn append(&self, user_id: &str, new_messages: &[Message]) -> Result<(), StoreError> {
        let mut values = self.read_values(user_id).await?;
        values.extend(new_messages.iter().map(encode_message));

        let mut url = self.locator.document_url(user_id)?;
        url.query_pairs_mut().append_pair("updateMask.fieldPaths", CONVERSATION_FIELD);
        let body = json!({
            "fields": {
                "conversation": { "arrayValue": { "values": values } }
            }
        });

        let token = self.auth.access_token().await?;
        self.http
            .patch(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        debug!("Appended {} message(s) for {}", new_messages.len(), user_id);
        Ok(())
    }
}

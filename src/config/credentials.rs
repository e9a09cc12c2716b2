use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::info;
use thiserror::Error;
use yup_oauth2::authenticator::DefaultAuthenticator;
use yup_oauth2::{ parse_service_account_key, ServiceAccountAuthenticator, ServiceAccountKey };

pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("FIREBASE_CREDENTIALS is required for the firestore store")]
    Missing,
    #[error("FIREBASE_CREDENTIALS is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("FIREBASE_CREDENTIALS is not a valid service-account key: {0}")]
    Key(std::io::Error),
    #[error("service-account key has no project_id and FIRESTORE_PROJECT_ID is unset")]
    MissingProjectId,
    #[error("failed to build service-account authenticator: {0}")]
    Authenticator(std::io::Error),
    #[error("failed to obtain access token: {0}")]
    Token(String),
}

/// Decodes the base64 JSON service-account key carried in the environment.
pub fn decode_service_account(encoded: &str) -> Result<ServiceAccountKey, CredentialsError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    parse_service_account_key(bytes).map_err(CredentialsError::Key)
}

pub struct GoogleAuth {
    authenticator: DefaultAuthenticator,
    project_id: String,
}

impl GoogleAuth {
    pub async fn from_env_value(
        encoded: Option<&str>,
        project_override: Option<&str>
    ) -> Result<Self, CredentialsError> {
        let encoded = encoded.filter(|v| !v.trim().is_empty()).ok_or(CredentialsError::Missing)?;
        let key = decode_service_account(encoded)?;
        let project_id = project_override
            .map(str::to_string)
            .or_else(|| key.project_id.clone())
            .ok_or(CredentialsError::MissingProjectId)?;
        info!("Using service account {} for project {}", key.client_email, project_id);

        let authenticator = ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(CredentialsError::Authenticator)?;

        Ok(Self { authenticator, project_id })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub async fn access_token(&self) -> Result<String, CredentialsError> {
        let token = self.authenticator
            .token(&[DATASTORE_SCOPE])
            .await
            .map_err(|e| CredentialsError::Token(e.to_string()))?;

        token.token()
            .map(|t| t.to_string())
            .ok_or_else(|| CredentialsError::Token("OAuth token was None".to_string()))
    }
}

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Conversation Store Args ---
    /// Conversation store backend (firestore, redis, memory)
    #[arg(long, env = "STORE_TYPE", default_value = "firestore")]
    pub store_type: String,

    /// Base64-encoded JSON service-account key for the Firestore backend.
    #[arg(long, env = "FIREBASE_CREDENTIALS", hide_env_values = true)]
    pub firebase_credentials: Option<String>,

    /// Firestore project id. Defaults to the project_id in the service-account key.
    #[arg(long, env = "FIRESTORE_PROJECT_ID")]
    pub firestore_project_id: Option<String>,

    /// Firestore database id.
    #[arg(long, env = "FIRESTORE_DATABASE", default_value = "(default)")]
    pub firestore_database: String,

    /// Firestore collection holding one document per user identifier.
    #[arg(long, env = "FIRESTORE_COLLECTION", default_value = "conversations")]
    pub firestore_collection: String,

    /// Firestore REST endpoint root.
    #[arg(long, env = "FIRESTORE_BASE_URL", default_value = "https://firestore.googleapis.com/v1")]
    pub firestore_base_url: String,

    /// Redis endpoint for the redis backend (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Prefix for Redis conversation keys.
    #[arg(long, env = "REDIS_PREFIX", default_value = "conversation:")]
    pub redis_prefix: String,

    // --- Chat LLM Provider Args ---
    /// Provider used to generate replies (openai, anthropic)
    #[arg(long, env = "CHAT_PROVIDER", default_value = "anthropic")]
    pub chat_provider: String,

    /// API key for the OpenAI chat completions API.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,

    /// API key for the Anthropic messages API.
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: String,

    /// Root URL of the OpenAI API.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com")]
    pub openai_base_url: String,

    /// Root URL of the Anthropic API.
    #[arg(long, env = "ANTHROPIC_BASE_URL", default_value = "https://api.anthropic.com")]
    pub anthropic_base_url: String,

    /// Which stored roles the OpenAI adapter forwards (all, conversational)
    #[arg(long, env = "OPENAI_ROLE_POLICY", default_value = "all")]
    pub openai_role_policy: String,

    /// Which stored roles the Anthropic adapter forwards (all, conversational)
    #[arg(long, env = "ANTHROPIC_ROLE_POLICY", default_value = "conversational")]
    pub anthropic_role_policy: String,

    // --- General App Args ---
    /// Path to the prompt configuration file.
    #[arg(long, env = "PROMPTS_PATH", default_value = "prompts.json")]
    pub prompts_path: String,

    /// Host address and port for the WebSocket server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional port for the HTTP server (web client, transcript API, health).
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,
}

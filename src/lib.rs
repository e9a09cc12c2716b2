pub mod models;
pub mod server;
pub mod session;
pub mod config;
pub mod llm;
pub mod cli;
pub mod history;

use cli::Args;
use config::prompt::load_system_prompt;
use history::create_conversation_store;
use llm::generator::ResponseGenerator;
use llm::{ LlmConfig, Provider, RolePolicy };
use log::info;
use server::Server;
use session::SessionLoop;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("HTTP Port: {}", args.http_port.map(|p| p.to_string()).unwrap_or_else(|| "disabled".to_string()));
    info!("Store Type: {}", args.store_type);
    info!("Chat Provider: {}", args.chat_provider);
    info!("OpenAI Role Policy: {}", args.openai_role_policy);
    info!("Anthropic Role Policy: {}", args.anthropic_role_policy);
    info!("Prompts Path: {}", args.prompts_path);
    info!("-------------------------");

    let provider: Provider = args.chat_provider.parse()?;
    load_system_prompt(&args.prompts_path)?;

    let openai_config = LlmConfig {
        api_key: args.openai_api_key.clone(),
        base_url: args.openai_base_url.clone(),
        role_policy: args.openai_role_policy.parse::<RolePolicy>()?,
    };
    let anthropic_config = LlmConfig {
        api_key: args.anthropic_api_key.clone(),
        base_url: args.anthropic_base_url.clone(),
        role_policy: args.anthropic_role_policy.parse::<RolePolicy>()?,
    };
    let generator = Arc::new(
        ResponseGenerator::from_configs(&args.prompts_path, &openai_config, &anthropic_config)?
    );

    let store = create_conversation_store(&args).await?;
    let session_loop = Arc::new(SessionLoop::new(store, generator, provider.to_string()));

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, session_loop, args);
    server.run().await?;

    Ok(())
}

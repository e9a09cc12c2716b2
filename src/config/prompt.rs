use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use log::debug;

#[derive(Debug)]
pub enum PromptError {
    IoError(String, std::io::Error),
    JsonError(String, serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::IoError(path, e) => write!(f, "Failed to read prompts file '{}': {}", path, e),
            PromptError::JsonError(path, e) => write!(f, "Failed to parse prompts file '{}': {}", path, e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(_, e) => Some(e),
            PromptError::JsonError(_, e) => Some(e),
        }
    }
}

/// Shape of the prompt resource. Unknown keys are allowed so the same file
/// can carry notes or other prompts.
#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    pub system_prompt: String,
}

pub fn load_prompts_from_str(json: &str) -> Result<PromptConfig, serde_json::Error> {
    serde_json::from_str(json)
}

/// Reads the system prompt from disk. Called on every generation, never cached.
pub fn load_system_prompt<P: AsRef<Path>>(path: P) -> Result<String, PromptError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|e| PromptError::IoError(display.clone(), e))?;
    let config = load_prompts_from_str(&content).map_err(|e| PromptError::JsonError(display.clone(), e))?;
    debug!("Loaded system prompt from {} ({} chars)", display, config.system_prompt.len());
    Ok(config.system_prompt)
}

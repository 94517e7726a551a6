pub mod gemini;

use async_trait::async_trait;
use std::sync::Arc;

use super::{ GenerationOptions, LlmConfig, LlmError };
use self::gemini::GeminiChatClient;

/// A single-shot text generator. Every call is an independent round trip.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions
    ) -> Result<String, LlmError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> String;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client = GeminiChatClient::from_config(config)?;
    Ok(Arc::new(client))
}

//! Chat client doubles shared by the unit tests.

use async_trait::async_trait;
use std::sync::{ Arc, Mutex };
use tokio::sync::Notify;

use crate::llm::chat::ChatClient;
use crate::llm::{ GenerationOptions, LlmError };

type Responder = dyn Fn(&str) -> Result<String, LlmError> + Send + Sync;

pub struct ScriptedClient {
    responder: Box<Responder>,
    pub calls: Mutex<Vec<(String, GenerationOptions)>>,
}

impl ScriptedClient {
    pub fn new<F>(responder: F) -> Arc<Self>
        where F: Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static
    {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(reply: &str) -> Arc<Self> {
        let reply = reply.to_string();
        Self::new(move |_| Ok(reply.clone()))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(prompt, _)| prompt.clone())
            .collect()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions
    ) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push((prompt.to_string(), *options));
        (self.responder)(prompt)
    }

    fn get_model(&self) -> String {
        "scripted".to_string()
    }

    fn get_base_url(&self) -> String {
        "memory://scripted".to_string()
    }
}

/// Holds every call until `gate` is notified.
pub struct GatedClient {
    pub gate: Arc<Notify>,
    reply: String,
}

impl GatedClient {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            gate: Arc::new(Notify::new()),
            reply: reply.to_string(),
        })
    }
}

#[async_trait]
impl ChatClient for GatedClient {
    async fn generate(
        &self,
        _prompt: &str,
        _options: &GenerationOptions
    ) -> Result<String, LlmError> {
        self.gate.notified().await;
        Ok(self.reply.clone())
    }

    fn get_model(&self) -> String {
        "gated".to_string()
    }

    fn get_base_url(&self) -> String {
        "memory://gated".to_string()
    }
}

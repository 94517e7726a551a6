pub mod chat;
pub mod error;

use serde::{ Deserialize, Serialize };
use std::time::Duration;

pub use error::{ HttpErrorCategory, LlmError };

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            completion_model: None,
            base_url: None,
            timeout: None,
        }
    }
}

/// Sampling parameters forwarded as the provider's `generationConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_k: Option<u32>,
    pub top_p: Option<f32>,
}

impl GenerationOptions {
    /// Patient replies: warm sampling, room for a conversational answer.
    pub fn chat() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 1024,
            top_k: Some(40),
            top_p: Some(0.95),
        }
    }

    pub fn summary() -> Self {
        Self {
            temperature: 0.3,
            max_output_tokens: 800,
            top_k: None,
            top_p: None,
        }
    }

    pub fn technique() -> Self {
        Self {
            temperature: 0.3,
            max_output_tokens: 600,
            top_k: None,
            top_p: None,
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::chat()
    }
}

use log::{ error, info };
use std::sync::Arc;

use crate::config::prompt::{ self, PromptConfig };
use crate::llm::chat::ChatClient;
use crate::llm::GenerationOptions;
use crate::models::chat::{ Message, ReviewResult };
use crate::models::scenario::ScenarioDescriptor;

pub const SUMMARY_FALLBACK: &str = "Unable to generate session summary at this time.";
pub const TECHNIQUE_FALLBACK: &str = "Unable to generate technique analysis at this time.";

/// Produces the post-session summary and technique analysis. The two calls
/// run concurrently and fail independently.
#[derive(Clone)]
pub struct SessionReviewer {
    client: Arc<dyn ChatClient>,
    summary_options: GenerationOptions,
    technique_options: GenerationOptions,
}

impl SessionReviewer {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self {
            client,
            summary_options: GenerationOptions::summary(),
            technique_options: GenerationOptions::technique(),
        }
    }

    pub async fn review(
        &self,
        prompts: &PromptConfig,
        transcript: &[Message],
        scenario: &ScenarioDescriptor
    ) -> ReviewResult {
        let summary_prompt = prompt::build_summary_prompt(prompts, transcript, &scenario.title);
        let technique_prompt = prompt::build_technique_prompt(prompts, transcript);
        info!(
            "Reviewing {} session ({} messages)",
            scenario.id,
            transcript.len()
        );

        let (summary, technique) = tokio::join!(
            self.client.generate(&summary_prompt, &self.summary_options),
            self.client.generate(&technique_prompt, &self.technique_options)
        );

        let summary = summary.unwrap_or_else(|e| {
            error!("Summary generation error: {}", e);
            SUMMARY_FALLBACK.to_string()
        });
        let technique_analysis = technique.unwrap_or_else(|e| {
            error!("Technique analysis error: {}", e);
            TECHNIQUE_FALLBACK.to_string()
        });

        ReviewResult {
            summary,
            technique_analysis,
        }
    }
}

use log::{ info, warn };
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::cli::Args;
use crate::config::prompt::{ self, PromptConfig, PromptError };
use crate::empathy::{ EmpathyScorer, KeywordEmpathyScorer };
use crate::llm::chat::{ ChatClient, new_client };
use crate::llm::{ GenerationOptions, LlmConfig, LlmError };
use crate::models::chat::ReviewResult;
use crate::models::scenario::{ get_scenario, Difficulty };
use crate::progress::{
    create_progress_ledger,
    CompletionAward,
    LedgerError,
    ProgressLedger,
    UserProgress,
};
use crate::review::SessionReviewer;
use crate::session::{ ChatSession, SessionError };

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("Unknown scenario '{0}'")]
    UnknownScenario(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// The review was produced but the ledger refused the rewards. The
    /// session is open again and completion can be retried.
    #[error("Session rewards were not recorded: {source}")]
    RewardsNotRecorded {
        review: ReviewResult,
        source: LedgerError,
    },
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    pub review: ReviewResult,
    pub skill_gained: u32,
    pub new_skill_rating: u32,
    pub unlocked: Vec<String>,
    pub high_empathy: bool,
    pub user_messages: usize,
    pub patient_messages: usize,
}

/// Wires the gateway, prompts, reviewer and ledger together and applies
/// completion rewards.
pub struct Trainer {
    chat_client: Arc<dyn ChatClient>,
    prompt_config: RwLock<Arc<PromptConfig>>,
    prompts_path: Option<String>,
    reviewer: SessionReviewer,
    ledger: Arc<dyn ProgressLedger>,
    empathy: Arc<dyn EmpathyScorer>,
}

impl Trainer {
    pub fn with_parts(
        chat_client: Arc<dyn ChatClient>,
        prompt_config: Arc<PromptConfig>,
        ledger: Arc<dyn ProgressLedger>,
        empathy: Arc<dyn EmpathyScorer>
    ) -> Self {
        Self {
            reviewer: SessionReviewer::new(Arc::clone(&chat_client)),
            chat_client,
            prompt_config: RwLock::new(prompt_config),
            prompts_path: None,
            ledger,
            empathy,
        }
    }

    pub async fn new(args: &Args) -> Result<Self, TrainerError> {
        let chat_config = LlmConfig {
            api_key: Some(args.gemini_api_key.clone()).filter(|k| !k.trim().is_empty()),
            completion_model: args.gemini_model.clone(),
            base_url: args.gemini_base_url.clone(),
            timeout: args.chat_timeout(),
        };
        let chat_client = new_client(&chat_config)?;
        info!(
            "Chat client configured: Model={}, BaseURL={}",
            chat_client.get_model(),
            chat_client.get_base_url()
        );

        let prompt_config = match &args.prompts_path {
            Some(path) => prompt::load_prompts(path)?,
            None => {
                info!("Using built-in prompt templates");
                Arc::new(PromptConfig::default())
            }
        };
        let ledger = create_progress_ledger(args).await?;

        let mut trainer = Self::with_parts(
            chat_client,
            prompt_config,
            ledger,
            Arc::new(KeywordEmpathyScorer::default())
        );
        trainer.prompts_path = args.prompts_path.clone();
        Ok(trainer)
    }

    pub async fn current_prompts(&self) -> Arc<PromptConfig> {
        Arc::clone(&*self.prompt_config.read().await)
    }

    pub async fn start_session(&self, scenario_id: &str) -> Result<ChatSession, TrainerError> {
        let scenario = get_scenario(scenario_id).ok_or_else(||
            TrainerError::UnknownScenario(scenario_id.to_string())
        )?;
        let session = ChatSession::new(
            scenario.clone(),
            Arc::clone(&self.chat_client),
            self.current_prompts().await,
            GenerationOptions::chat()
        );
        info!("Started session {} for scenario {}", session.id(), scenario.id);
        Ok(session)
    }

    /// Freezes the session, reviews it and credits the ledger in one step.
    /// A session can only be completed once, so rewards are never applied
    /// twice. When the ledger fails nothing is credited and the session is
    /// reopened.
    pub async fn complete_session(
        &self,
        session: &mut ChatSession
    ) -> Result<SessionOutcome, TrainerError> {
        let transcript = session.freeze()?;
        let scenario = session.scenario().clone();
        let prompts = self.current_prompts().await;

        let review = self.reviewer.review(&prompts, &transcript, &scenario).await;
        let high_empathy = self.empathy.is_high_empathy(&transcript);

        let award = CompletionAward {
            scenario_id: scenario.id.clone(),
            skill_reward: scenario.skill_reward,
            boss: scenario.difficulty == Difficulty::Boss,
            high_empathy,
        };
        let receipt = match self.ledger.record_completion(&award).await {
            Ok(receipt) => receipt,
            Err(source) => {
                warn!("Session {}: rewards not recorded, reopening: {}", session.id(), source);
                session.reopen();
                return Err(TrainerError::RewardsNotRecorded { review, source });
            }
        };

        info!(
            "Session {} completed: +{} skill (now {}), unlocked {:?}",
            session.id(),
            scenario.skill_reward,
            receipt.skill_rating,
            receipt.unlocked
        );

        Ok(SessionOutcome {
            review,
            skill_gained: scenario.skill_reward,
            new_skill_rating: receipt.skill_rating,
            unlocked: receipt.unlocked,
            high_empathy,
            user_messages: session.user_message_count(),
            patient_messages: session.patient_message_count(),
        })
    }

    pub async fn progress(&self) -> Result<UserProgress, TrainerError> {
        Ok(self.ledger.snapshot().await?)
    }

    /// New sessions pick up the reloaded prompts; running ones keep theirs.
    pub async fn reload_prompts_if_changed(&self) -> Result<bool, TrainerError> {
        let path = match &self.prompts_path {
            Some(path) => path,
            None => {
                warn!("Prompt reload requested but no PROMPTS_PATH is configured");
                return Ok(false);
            }
        };

        let current = self.current_prompts().await;
        match prompt::reload_prompts_if_changed(path, &current)? {
            Some(new_config) => {
                *self.prompt_config.write().await = new_config;
                info!("Prompts successfully reloaded from {}", path);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

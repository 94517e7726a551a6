use log::{ error, info };
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::config::prompt::{ self, PromptConfig };
use crate::llm::chat::ChatClient;
use crate::llm::{ GenerationOptions, LlmError };
use crate::models::chat::{ Message, SessionSnapshot, TurnState };
use crate::models::scenario::ScenarioDescriptor;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session has already been completed")]
    Completed,
    #[error("Still waiting for {0} to reply")]
    AwaitingReply(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Blank input; nothing was appended.
    Ignored,
    Replied,
    Errored(String),
}

/// Issued by `begin_turn` once the user's message is in the transcript.
/// Must be handed back to `resolve_turn`.
#[derive(Debug)]
pub struct PendingTurn {
    prompt: String,
}

impl PendingTurn {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

/// Owns the live transcript of one scenario role-play.
pub struct ChatSession {
    id: String,
    scenario: ScenarioDescriptor,
    client: Arc<dyn ChatClient>,
    prompts: Arc<PromptConfig>,
    options: GenerationOptions,
    transcript: Vec<Message>,
    responding: bool,
    state: TurnState,
    completed: bool,
    notifier: watch::Sender<SessionSnapshot>,
}

impl ChatSession {
    pub fn new(
        scenario: ScenarioDescriptor,
        client: Arc<dyn ChatClient>,
        prompts: Arc<PromptConfig>,
        options: GenerationOptions
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let initial = SessionSnapshot {
            session_id: id.clone(),
            scenario_id: scenario.id.clone(),
            messages: Vec::new(),
            responding: false,
            state: TurnState::Idle,
            completed: false,
        };
        let (notifier, _) = watch::channel(initial);

        Self {
            id,
            scenario,
            client,
            prompts,
            options,
            transcript: Vec::new(),
            responding: false,
            state: TurnState::Idle,
            completed: false,
            notifier,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scenario(&self) -> &ScenarioDescriptor {
        &self.scenario
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn is_responding(&self) -> bool {
        self.responding
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn user_message_count(&self) -> usize {
        self.transcript.iter().filter(|m| m.is_user_message).count()
    }

    pub fn patient_message_count(&self) -> usize {
        self.transcript.iter().filter(|m| !m.is_user_message).count()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.notifier.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            scenario_id: self.scenario.id.clone(),
            messages: self.transcript.clone(),
            responding: self.responding,
            state: self.state,
            completed: self.completed,
        }
    }

    fn publish(&self) {
        self.notifier.send_replace(self.snapshot());
    }

    /// Appends the user's message and moves to `AwaitingReply`. Returns
    /// `None` for blank input.
    pub fn begin_turn(&mut self, text: &str) -> Result<Option<PendingTurn>, SessionError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        if self.completed {
            return Err(SessionError::Completed);
        }
        if self.state != TurnState::Idle {
            return Err(SessionError::AwaitingReply(self.scenario.patient_name.clone()));
        }

        self.transcript.push(Message::from_user(text));
        self.responding = true;
        self.state = TurnState::AwaitingReply;
        self.publish();

        let prompt = prompt::build_chat_prompt(&self.prompts, text, &self.scenario.context());
        Ok(Some(PendingTurn { prompt }))
    }

    /// Appends the patient's reply, or an error entry attributed to the
    /// patient, then returns to `Idle`.
    pub fn resolve_turn(
        &mut self,
        _turn: PendingTurn,
        result: Result<String, LlmError>
    ) -> TurnOutcome {
        self.settle(result)
    }

    fn settle(&mut self, result: Result<String, LlmError>) -> TurnOutcome {
        let patient = self.scenario.patient_name.clone();
        let outcome = match result {
            Ok(reply) => {
                self.transcript.push(Message::from_patient(&reply, &patient));
                self.state = TurnState::Replied;
                TurnOutcome::Replied
            }
            Err(e) => {
                error!("Session {}: reply from {} failed: {}", self.id, patient, e);
                let content = format!("Error: {}", e);
                self.transcript.push(Message::from_patient(&content, &patient));
                self.state = TurnState::Errored;
                TurnOutcome::Errored(content)
            }
        };
        self.responding = false;
        self.publish();

        self.state = TurnState::Idle;
        self.publish();
        outcome
    }

    /// Runs one full turn. Dropping the future before the reply arrives
    /// settles the turn with a cancellation entry, so the session is never
    /// left waiting.
    pub async fn send_message(&mut self, text: &str) -> Result<TurnOutcome, SessionError> {
        let turn = match self.begin_turn(text)? {
            Some(turn) => turn,
            None => {
                return Ok(TurnOutcome::Ignored);
            }
        };
        info!(
            "Session {}: sending turn {} to {}",
            self.id,
            self.user_message_count(),
            self.scenario.patient_name
        );
        let client = Arc::clone(&self.client);
        let options = self.options;
        let in_flight = InFlightTurn { session: self, settled: false };
        let result = client.generate(turn.prompt(), &options).await;
        Ok(in_flight.finish(result))
    }

    /// Closes the session to further turns and hands back the final
    /// transcript.
    pub fn freeze(&mut self) -> Result<Vec<Message>, SessionError> {
        if self.completed {
            return Err(SessionError::Completed);
        }
        if self.state == TurnState::AwaitingReply {
            return Err(SessionError::AwaitingReply(self.scenario.patient_name.clone()));
        }
        self.completed = true;
        self.publish();
        Ok(self.transcript.clone())
    }

    /// Undoes `freeze` when the completion could not be recorded.
    pub(crate) fn reopen(&mut self) {
        if self.completed {
            self.completed = false;
            self.publish();
        }
    }
}

/// Settles a turn whose reply future was dropped.
struct InFlightTurn<'a> {
    session: &'a mut ChatSession,
    settled: bool,
}

impl InFlightTurn<'_> {
    fn finish(mut self, result: Result<String, LlmError>) -> TurnOutcome {
        self.settled = true;
        self.session.settle(result)
    }
}

impl Drop for InFlightTurn<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.session.settle(Err(LlmError::Cancelled));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::scenario::get_scenario;
    use crate::testing::{ GatedClient, ScriptedClient };
    use std::time::Duration;

    fn session_with(scenario_id: &str, client: Arc<dyn ChatClient>) -> ChatSession {
        let scenario = get_scenario(scenario_id).unwrap().clone();
        ChatSession::new(
            scenario,
            client,
            Arc::new(PromptConfig::default()),
            GenerationOptions::chat()
        )
    }

    #[tokio::test]
    async fn reply_is_appended_after_user_message() {
        let client = ScriptedClient::replying("I understand");
        let mut session = session_with("anxiety-disorder", client.clone());

        let outcome = session.send_message("I feel anxious").await.unwrap();

        assert_eq!(outcome, TurnOutcome::Replied);
        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert!(transcript[0].is_user_message);
        assert_eq!(transcript[0].content, "I feel anxious");
        assert_eq!(transcript[0].sender, "You");
        assert_eq!(transcript[1].content, "I understand");
        assert_eq!(transcript[1].sender, "Alex");
        assert!(!session.is_responding());
        assert_eq!(session.state(), TurnState::Idle);

        let prompts = client.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("anxious"));
        assert!(prompts[0].contains("Alex"));
    }

    #[tokio::test]
    async fn blank_input_is_a_no_op() {
        let client = ScriptedClient::replying("unused");
        let mut session = session_with("depression", client.clone());
        let rx = session.subscribe();

        assert_eq!(session.send_message("   \n\t").await.unwrap(), TurnOutcome::Ignored);
        assert!(session.transcript().is_empty());
        assert!(client.prompts().is_empty());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn gateway_failure_becomes_patient_error_entry() {
        let client = ScriptedClient::new(|_| Err(LlmError::EmptyResponse));
        let mut session = session_with("depression", client);

        let outcome = session.send_message("Hello Jordan").await.unwrap();

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert!(!transcript[1].is_user_message);
        assert_eq!(transcript[1].sender, "Jordan");
        assert_eq!(transcript[1].content, "Error: No response generated from Gemini");
        assert_eq!(outcome, TurnOutcome::Errored(transcript[1].content.clone()));
        assert!(!session.is_responding());

        // the session keeps working after a failed turn
        assert!(session.send_message("Still there?").await.is_ok());
        assert_eq!(session.transcript().len(), 4);
    }

    #[tokio::test]
    async fn user_message_is_visible_before_reply_arrives() {
        let client = GatedClient::new("took a while");
        let gate = client.gate.clone();
        let mut session = session_with("grief-counseling", client);
        let mut rx = session.subscribe();

        let handle = tokio::spawn(async move {
            let outcome = session.send_message("How have you been?").await;
            (session, outcome)
        });

        rx.changed().await.unwrap();
        {
            let pending = rx.borrow_and_update();
            assert_eq!(pending.messages.len(), 1);
            assert!(pending.responding);
            assert_eq!(pending.state, TurnState::AwaitingReply);
        }

        gate.notify_one();
        let (session, outcome) = handle.await.unwrap();
        assert_eq!(outcome.unwrap(), TurnOutcome::Replied);
        assert_eq!(session.transcript().len(), 2);

        let last = rx.borrow();
        assert_eq!(last.messages.len(), 2);
        assert!(!last.responding);
        assert_eq!(last.state, TurnState::Idle);
    }

    #[tokio::test]
    async fn dropped_turn_is_settled_with_cancellation_entry() {
        let client = GatedClient::new("never sent");
        let mut session = session_with("relationship-conflict", client);

        let timed_out = tokio::time
            ::timeout(Duration::from_millis(20), session.send_message("Are you there?")).await;
        assert!(timed_out.is_err());

        assert!(!session.is_responding());
        assert_eq!(session.state(), TurnState::Idle);
        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].sender, "Taylor");
        assert_eq!(transcript[1].content, "Error: Request was cancelled before Gemini replied");
        assert!(session.subscribe().borrow().state == TurnState::Idle);

        assert_eq!(session.freeze().unwrap().len(), 2);
    }

    #[test]
    fn second_turn_is_rejected_while_awaiting_reply() {
        let client = ScriptedClient::replying("ok");
        let mut session = session_with("substance-use", client);

        let turn = session.begin_turn("first").unwrap().unwrap();
        assert!(turn.prompt().contains("Casey"));
        assert_eq!(
            session.begin_turn("second").unwrap_err(),
            SessionError::AwaitingReply("Casey".to_string())
        );
        assert_eq!(session.transcript().len(), 1);

        session.resolve_turn(turn, Ok("reply".to_string()));
        assert!(session.begin_turn("second").unwrap().is_some());
    }

    #[tokio::test]
    async fn frozen_session_rejects_turns() {
        let client = ScriptedClient::replying("fine");
        let mut session = session_with("bipolar-disorder", client);
        session.send_message("Hi Riley").await.unwrap();

        let frozen = session.freeze().unwrap();
        assert_eq!(frozen.len(), 2);
        assert!(session.is_completed());
        assert!(session.subscribe().borrow().completed);

        assert_eq!(session.send_message("one more").await.unwrap_err(), SessionError::Completed);
        assert_eq!(session.freeze().unwrap_err(), SessionError::Completed);
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(session.user_message_count(), 1);
        assert_eq!(session.patient_message_count(), 1);

        session.reopen();
        assert!(!session.is_completed());
        assert!(session.send_message("one more").await.is_ok());
    }
}

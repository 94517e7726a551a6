use chrono::{ DateTime, Utc };
use serde::{ Serialize, Deserialize };
use uuid::Uuid;

pub const USER_SENDER: &str = "You";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub content: String,
    pub is_user_message: bool,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn from_user(content: &str) -> Self {
        Self::new(content, true, USER_SENDER)
    }

    pub fn from_patient(content: &str, patient_name: &str) -> Self {
        Self::new(content, false, patient_name)
    }

    fn new(content: &str, is_user_message: bool, sender: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            is_user_message,
            sender: sender.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatContext {
    pub scenario_id: String,
    pub patient_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
    pub summary: String,
    pub technique_analysis: String,
}

/// Per-turn lifecycle: `Idle -> AwaitingReply -> {Replied | Errored} -> Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnState {
    Idle,
    AwaitingReply,
    Replied,
    Errored,
}

/// What observers of a session receive after every mutation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub scenario_id: String,
    pub messages: Vec<Message>,
    pub responding: bool,
    pub state: TurnState,
    pub completed: bool,
}

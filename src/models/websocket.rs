use serde::{ Serialize, Deserialize };

use super::chat::{ ReviewResult, SessionSnapshot };

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "start")] Start {
        scenario_id: String,
    },
    #[serde(rename = "chat")] Chat {
        content: String,
    },
    #[serde(rename = "complete")]
    Complete,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "transcript")] Transcript {
        #[serde(flatten)]
        snapshot: SessionSnapshot,
    },
    #[serde(rename = "review")] Review {
        review: ReviewResult,
        skill_gained: u32,
        skill_rating: u32,
        unlocked: Vec<String>,
        timestamp: i64,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
    #[serde(rename = "processing")]
    Processing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_are_tagged() {
        let start: ClientMessage = serde_json
            ::from_str(r#"{"type":"start","scenario_id":"depression"}"#)
            .unwrap();
        assert!(matches!(start, ClientMessage::Start { ref scenario_id } if scenario_id == "depression"));

        let complete: ClientMessage = serde_json::from_str(r#"{"type":"complete"}"#).unwrap();
        assert!(matches!(complete, ClientMessage::Complete));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"dance"}"#).is_err());
    }

    #[test]
    fn error_message_shape() {
        let json = serde_json
            ::to_value(&(ServerMessage::Error { message: "boom".into() }))
            .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");
    }
}

use crate::models::chat::Message;

const VALIDATING_PHRASES: [&str; 16] = [
    "sounds like",
    "that sounds",
    "i hear",
    "i understand",
    "that must",
    "must be",
    "makes sense",
    "understandable",
    "thank you for sharing",
    "how do you feel",
    "how are you feeling",
    "it's okay",
    "you're not alone",
    "i can see",
    "valid",
    "tell me more",
];

/// Decides whether the trainee showed enough empathy in a session to earn
/// progress toward the empathy achievement.
pub trait EmpathyScorer: Send + Sync {
    /// Share of the trainee's messages judged empathetic, in `0.0..=1.0`.
    fn score(&self, transcript: &[Message]) -> f32;

    fn threshold(&self) -> f32;

    fn is_high_empathy(&self, transcript: &[Message]) -> bool {
        transcript.iter().any(|m| m.is_user_message) && self.score(transcript) >= self.threshold()
    }
}

/// Counts therapist messages that contain a reflective or validating phrase.
pub struct KeywordEmpathyScorer {
    phrases: Vec<String>,
    threshold: f32,
}

impl KeywordEmpathyScorer {
    pub fn new(phrases: Vec<String>, threshold: f32) -> Self {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.to_lowercase())
                .collect(),
            threshold,
        }
    }

    fn is_validating(&self, content: &str) -> bool {
        let lowered = content.to_lowercase();
        self.phrases.iter().any(|p| lowered.contains(p.as_str()))
    }
}

impl Default for KeywordEmpathyScorer {
    fn default() -> Self {
        Self::new(
            VALIDATING_PHRASES.iter()
                .map(|p| p.to_string())
                .collect(),
            0.5
        )
    }
}

impl EmpathyScorer for KeywordEmpathyScorer {
    fn score(&self, transcript: &[Message]) -> f32 {
        let therapist: Vec<&Message> = transcript
            .iter()
            .filter(|m| m.is_user_message)
            .collect();
        if therapist.is_empty() {
            return 0.0;
        }
        let validating = therapist
            .iter()
            .filter(|m| self.is_validating(&m.content))
            .count();
        (validating as f32) / (therapist.len() as f32)
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_share_of_validating_messages() {
        let scorer = KeywordEmpathyScorer::default();
        let transcript = vec![
            Message::from_user("That sounds really hard."),
            Message::from_patient("It is. I can't sleep.", "Alex"),
            Message::from_user("When did this start?"),
            Message::from_patient("Last month.", "Alex"),
            Message::from_user("It makes sense you'd feel worn out."),
            Message::from_user("What time do you go to bed?")
        ];
        assert_eq!(scorer.score(&transcript), 0.5);
        assert!(scorer.is_high_empathy(&transcript));
    }

    #[test]
    fn patient_lines_do_not_count() {
        let scorer = KeywordEmpathyScorer::default();
        let transcript = vec![
            Message::from_user("Why?"),
            Message::from_patient("I hear you, it sounds like you're confused.", "Jordan")
        ];
        assert_eq!(scorer.score(&transcript), 0.0);
        assert!(!scorer.is_high_empathy(&transcript));
    }

    #[test]
    fn empty_session_is_never_high_empathy() {
        let scorer = KeywordEmpathyScorer::new(vec![], 0.0);
        assert!(!scorer.is_high_empathy(&[]));
    }
}

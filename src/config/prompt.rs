use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use log::info;

use crate::models::chat::{ ChatContext, Message };

const CHAT_REPLY_TEMPLATE: &str =
    "You are roleplaying as a mental health patient named {patient_name}, suffering from {condition}. 

IMPORTANT: Respond naturally to the user's message in a realistic, conversational tone. You are the patient, not the therapist. Do not give advice or act as a therapist. Keep your response under 200 words and make it feel like a real person talking.

User: {user_message}

Reply as {patient_name}:";

const SESSION_SUMMARY_TEMPLATE: &str =
    "As an expert therapy session analyst, provide a comprehensive analysis of this therapy session between a therapist and a patient with {scenario_title}. 

ANALYSIS REQUIREMENTS:
1. **Session Overview** (2-3 sentences): Summarize the main focus and flow of the session
2. **Key Topics Discussed**: List the main themes and concerns addressed
3. **Patient's Presentation**: Describe the patient's emotional state and primary concerns
4. **Therapeutic Techniques Used**: Identify specific techniques the therapist employed (e.g., active listening, validation, reframing, etc.)
5. **Strengths**: Highlight what the therapist did well
6. **Areas for Improvement**: Suggest specific ways the therapist could enhance their approach
7. **Overall Assessment**: Rate the session quality and provide a brief recommendation

CONVERSATION:
{conversation}

Please provide a structured, professional analysis that would be helpful for a therapist's professional development:";

const TECHNIQUE_ANALYSIS_TEMPLATE: &str =
    "Analyze the therapeutic techniques used in this therapy session. 

Identify and evaluate:
1. **Active Listening**: How well did the therapist demonstrate active listening?
2. **Empathy & Validation**: Was the therapist empathetic and validating?
3. **Questioning Techniques**: What types of questions were used (open-ended, closed, clarifying)?
4. **Reframing**: Did the therapist help reframe the patient's perspective?
5. **Goal Setting**: Was there any goal setting or action planning?
6. **Crisis Management**: How did the therapist handle any crisis moments?
7. **Cultural Sensitivity**: Was the approach culturally appropriate?

THERAPIST RESPONSES:
{conversation}

Provide specific examples and suggestions for improvement:";

const DEFAULT_CONDITIONS: [(&str, &str); 8] = [
    ("anxiety-disorder", "generalized anxiety disorder with panic attacks"),
    ("depression", "major depressive disorder"),
    ("grief-counseling", "grief and loss after losing a loved one"),
    ("relationship-conflict", "relationship problems and communication issues"),
    ("substance-use", "alcohol use disorder"),
    ("bipolar-disorder", "bipolar disorder with mood swings"),
    ("schizophrenia", "schizophrenia with psychotic symptoms"),
    ("borderline-personality", "borderline personality disorder"),
];

#[derive(Debug)]
pub enum PromptError {
    PlaceholderMissing(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::PlaceholderMissing(key) =>
                write!(f, "Prompt template is missing placeholder {}", key),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PromptTemplates {
    pub chat_reply: String,
    pub session_summary: String,
    pub technique_analysis: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            chat_reply: CHAT_REPLY_TEMPLATE.to_string(),
            session_summary: SESSION_SUMMARY_TEMPLATE.to_string(),
            technique_analysis: TECHNIQUE_ANALYSIS_TEMPLATE.to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PromptConfig {
    pub conditions: HashMap<String, String>,
    pub templates: PromptTemplates,
    #[serde(skip)]
    pub last_loaded: Option<SystemTime>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            conditions: default_conditions(),
            templates: PromptTemplates::default(),
            last_loaded: None,
        }
    }
}

fn default_conditions() -> HashMap<String, String> {
    DEFAULT_CONDITIONS.iter()
        .map(|(id, condition)| (id.to_string(), condition.to_string()))
        .collect()
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        let required = [
            ("templates.chat_reply", &self.templates.chat_reply, "{user_message}"),
            ("templates.chat_reply", &self.templates.chat_reply, "{patient_name}"),
            ("templates.session_summary", &self.templates.session_summary, "{conversation}"),
            ("templates.technique_analysis", &self.templates.technique_analysis, "{conversation}"),
        ];
        for (name, template, placeholder) in required {
            if !template.contains(placeholder) {
                return Err(PromptError::PlaceholderMissing(format!("{} in {}", placeholder, name)));
            }
        }
        Ok(())
    }
}

/// Parses a prompt file. Absent templates keep the built-in text and the
/// built-in conditions stay available unless the file overrides an id.
pub fn load_prompts_from_str(json: &str) -> Result<PromptConfig, PromptError> {
    let mut config: PromptConfig = serde_json::from_str(json)?;
    for (id, condition) in default_conditions() {
        config.conditions.entry(id).or_insert(condition);
    }
    config.validate()?;
    Ok(config)
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(path.as_ref())?;
    let mut config = load_prompts_from_str(&file_content)?;
    config.last_loaded = Some(SystemTime::now());
    info!("Loaded prompt configuration from {}", path.as_ref().display());
    Ok(Arc::new(config))
}

pub fn reload_prompts_if_changed<P: AsRef<Path>>(
    path: P,
    current_config: &Arc<PromptConfig>
) -> Result<Option<Arc<PromptConfig>>, PromptError> {
    let metadata = fs::metadata(&path)?;

    if let Ok(modified) = metadata.modified() {
        if let Some(last_loaded) = current_config.last_loaded {
            if modified > last_loaded {
                info!("Prompts file changed, reloading...");
                return load_prompts(path).map(Some);
            }
        } else {
            info!("No last_loaded timestamp, reloading prompts...");
            return load_prompts(path).map(Some);
        }
    }
    Ok(None)
}

/// Replaces `{key}` placeholders in one left-to-right pass. Substituted
/// values are never scanned again, so braces typed by a user stay literal.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let replacement = after
            .find('}')
            .and_then(|end| {
                let key = &after[..end];
                values
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, value)| (*value, end))
            });
        match replacement {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn condition_for(config: &PromptConfig, scenario_id: &str) -> String {
    config.conditions
        .get(scenario_id)
        .cloned()
        .unwrap_or_else(|| scenario_id.replace(['-', '_'], " "))
}

pub fn build_chat_prompt(config: &PromptConfig, user_message: &str, context: &ChatContext) -> String {
    let condition = condition_for(config, &context.scenario_id);
    fill_template(
        &config.templates.chat_reply,
        &[
            ("patient_name", context.patient_name.as_str()),
            ("condition", condition.as_str()),
            ("user_message", user_message),
        ]
    )
}

pub fn build_summary_prompt(
    config: &PromptConfig,
    transcript: &[Message],
    scenario_title: &str
) -> String {
    let conversation = transcript
        .iter()
        .map(|msg| format!("{}: {}", msg.sender, msg.content))
        .collect::<Vec<_>>()
        .join("\n");

    fill_template(
        &config.templates.session_summary,
        &[
            ("scenario_title", scenario_title),
            ("conversation", conversation.as_str()),
        ]
    )
}

/// Only the therapist's side of the conversation is evaluated.
pub fn build_technique_prompt(config: &PromptConfig, transcript: &[Message]) -> String {
    let conversation = transcript
        .iter()
        .filter(|msg| msg.is_user_message)
        .map(|msg| msg.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    fill_template(&config.templates.technique_analysis, &[("conversation", conversation.as_str())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn context(scenario_id: &str, patient_name: &str) -> ChatContext {
        ChatContext {
            scenario_id: scenario_id.to_string(),
            patient_name: patient_name.to_string(),
        }
    }

    fn sample_transcript() -> Vec<Message> {
        vec![
            Message::from_user("How are you feeling today?"),
            Message::from_patient("Honestly, pretty on edge.", "Alex"),
            Message::from_user("That sounds exhausting."),
            Message::from_patient("It really is.", "Alex")
        ]
    }

    #[test]
    fn chat_prompt_is_deterministic_and_carries_inputs() {
        let config = PromptConfig::default();
        let ctx = context("anxiety-disorder", "Alex");
        let first = build_chat_prompt(&config, "I feel anxious", &ctx);
        let second = build_chat_prompt(&config, "I feel anxious", &ctx);

        assert_eq!(first, second);
        assert!(first.contains("I feel anxious"));
        assert!(first.contains("Alex"));
        assert!(first.contains("generalized anxiety disorder with panic attacks"));
        assert!(first.contains("You are the patient, not the therapist"));
        assert!(first.contains("under 200 words"));
        assert!(first.ends_with("Reply as Alex:"));
    }

    #[test]
    fn unknown_scenario_falls_back_to_readable_id() {
        let config = PromptConfig::default();
        let prompt = build_chat_prompt(&config, "hi", &context("social-anxiety_teen", "Sam"));
        assert!(prompt.contains("suffering from social anxiety teen."));
    }

    #[test]
    fn user_braces_are_not_expanded() {
        let config = PromptConfig::default();
        let prompt = build_chat_prompt(
            &config,
            "what does {patient_name} mean? {",
            &context("depression", "Jordan")
        );
        assert!(prompt.contains("User: what does {patient_name} mean? {"));
    }

    #[test]
    fn summary_prompt_keeps_order_and_senders() {
        let config = PromptConfig::default();
        let prompt = build_summary_prompt(&config, &sample_transcript(), "Generalized Anxiety Disorder");

        assert!(prompt.contains("a patient with Generalized Anxiety Disorder"));
        assert!(
            prompt.contains(
                "You: How are you feeling today?\nAlex: Honestly, pretty on edge.\nYou: That sounds exhausting.\nAlex: It really is."
            )
        );
        for heading in ["Session Overview", "Key Topics", "Patient's Presentation", "Strengths", "Overall Assessment"] {
            assert!(prompt.contains(heading), "missing {}", heading);
        }
    }

    #[test]
    fn technique_prompt_only_includes_therapist_lines() {
        let config = PromptConfig::default();
        let prompt = build_technique_prompt(&config, &sample_transcript());

        assert!(prompt.contains("How are you feeling today?\nThat sounds exhausting."));
        assert!(!prompt.contains("pretty on edge"));
        assert!(!prompt.contains("Alex:"));
        assert!(prompt.contains("Cultural Sensitivity"));
    }

    #[test]
    fn file_overrides_merge_with_builtins() {
        let json = r#"{
            "conditions": { "depression": "persistent low mood" },
            "templates": { "chat_reply": "Patient {patient_name} ({condition}) hears: {user_message}" }
        }"#;
        let config = load_prompts_from_str(json).unwrap();

        assert_eq!(condition_for(&config, "depression"), "persistent low mood");
        assert_eq!(condition_for(&config, "substance-use"), "alcohol use disorder");
        assert_eq!(
            build_chat_prompt(&config, "hello", &context("depression", "Jordan")),
            "Patient Jordan (persistent low mood) hears: hello"
        );
        assert!(config.templates.session_summary.contains("{conversation}"));
    }

    #[test]
    fn template_without_user_message_is_rejected() {
        let json = r#"{ "templates": { "chat_reply": "Reply as {patient_name}" } }"#;
        let err = load_prompts_from_str(json).unwrap_err();
        assert!(matches!(err, PromptError::PlaceholderMissing(_)));
    }

    #[test]
    fn reload_only_when_file_is_newer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{}}").unwrap();

        let loaded = load_prompts(file.path()).unwrap();
        assert!(loaded.last_loaded.is_some());
        assert!(reload_prompts_if_changed(file.path(), &loaded).unwrap().is_none());

        let builtin = Arc::new(PromptConfig::default());
        assert!(reload_prompts_if_changed(file.path(), &builtin).unwrap().is_some());
    }
}

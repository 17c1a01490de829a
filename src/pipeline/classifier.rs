//! Message classifier — structured understanding of one inbound message.
//!
//! Primary path is a single low-temperature structured-output call seeded
//! with a few-shot prompt. Any call failure, timeout, or unparsable response
//! falls back unconditionally to a keyword-and-regex classifier over the
//! current message text, which still populates every field.

use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::llm::retry::complete_with_retry;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::prompts::CLASSIFIER_SYSTEM_PROMPT;
use crate::pipeline::tiered::generative_first;
use crate::pipeline::types::{
    ClassificationResult, Entity, EntityKind, PipelineInput, Topic, TurnRole,
};

/// Max tokens for the classification call (kept tight — runs on every message).
const CLASSIFY_MAX_TOKENS: u32 = 300;

/// Temperature for classification (factual extraction).
const CLASSIFY_TEMPERATURE: f32 = 0.1;

/// Max entries kept in entity and key-phrase lists.
const LIST_CAP: usize = 5;

/// How many history turns the classification prompt sees.
const CONTEXT_TURNS: usize = 5;

pub struct MessageClassifier {
    llm: Arc<dyn LlmProvider>,
    config: PipelineConfig,
}

impl MessageClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>, config: PipelineConfig) -> Self {
        Self { llm, config }
    }

    /// Classify one message. Never fails — the keyword fallback covers every
    /// generative-path failure.
    pub async fn classify(&self, input: &PipelineInput) -> ClassificationResult {
        let (result, generative) = generative_first(self.generative_classify(input), || {
            keyword_classify(&input.text)
        })
        .await;

        debug!(
            id = %input.message_id,
            topic = result.topic.label(),
            is_question = result.is_question,
            generative,
            "Message classified"
        );
        result
    }

    async fn generative_classify(
        &self,
        input: &PipelineInput,
    ) -> Result<ClassificationResult, PipelineError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(CLASSIFIER_SYSTEM_PROMPT),
            ChatMessage::user(build_user_prompt(input)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = complete_with_retry(&self.llm, request, self.config.call_timeout)
            .await
            .map_err(|e| PipelineError::Classification(format!("LLM call failed: {e}")))?;

        parse_classification(&response.content)
            .map_err(|e| PipelineError::Classification(format!("parse failed: {e}")))
    }
}

/// Build the user prompt: channel, company, recent context, current message.
fn build_user_prompt(input: &PipelineInput) -> String {
    let mut prompt = String::with_capacity(512);

    prompt.push_str(&format!("Channel: {}\n", input.channel));
    prompt.push_str(&format!("Company: {}\n", input.brand_voice.company_name));

    let skip = input.history.len().saturating_sub(CONTEXT_TURNS);
    if !input.history.is_empty() {
        prompt.push_str("\nConversation context:\n");
        for turn in input.history.iter().skip(skip) {
            let preview: String = turn.content.chars().take(200).collect();
            let role = match turn.role {
                TurnRole::Contact => "contact",
                TurnRole::AutoReply => "auto_reply",
                TurnRole::HumanAgent => "human_agent",
            };
            prompt.push_str(&format!("{}: {}\n", role, preview));
        }
    }

    let text_preview: String = input.text.chars().take(1000).collect();
    prompt.push_str(&format!("\nCurrent message:\n{}", text_preview));
    prompt
}

// ── Response parsing ────────────────────────────────────────────────

/// Raw generative response shape, before validation.
#[derive(Debug, serde::Deserialize)]
struct RawClassification {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    topic: String,
    #[serde(default, alias = "isQuestion")]
    is_question: bool,
    #[serde(default)]
    summary: String,
    #[serde(default, alias = "keyPhrases")]
    key_phrases: Vec<serde_json::Value>,
}

#[derive(Debug, serde::Deserialize)]
struct RawEntity {
    #[serde(default, alias = "kind")]
    r#type: String,
    #[serde(default)]
    value: serde_json::Value,
}

/// Parse and normalize the generative response.
///
/// Topic values outside the closed set coerce to `other`; entity kinds
/// outside the closed set are dropped; lists are capped and stringified.
fn parse_classification(raw: &str) -> Result<ClassificationResult, String> {
    let json_str = extract_json_object(raw);
    let parsed: RawClassification =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;

    let entities = parsed
        .entities
        .into_iter()
        .filter_map(|e| {
            let kind = EntityKind::parse(&e.r#type)?;
            Some(Entity {
                kind,
                value: stringify(&e.value),
            })
        })
        .take(LIST_CAP)
        .collect();

    let mut summary: String = parsed.summary.chars().take(200).collect();
    if summary.is_empty() {
        summary = "No summary".to_string();
    }

    Ok(ClassificationResult {
        language: parsed.language.unwrap_or_else(|| "en".to_string()),
        entities,
        topic: Topic::parse_or_other(&parsed.topic),
        is_question: parsed.is_question,
        summary,
        key_phrases: parsed
            .key_phrases
            .iter()
            .map(stringify)
            .take(LIST_CAP)
            .collect(),
    })
}

fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Extract a JSON object from model output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

// ── Keyword fallback ────────────────────────────────────────────────

/// Deterministic fallback over the current message text only.
///
/// Topic defaults to `other`, entities stay empty, summary is the first
/// 100 chars of the message.
pub(crate) fn keyword_classify(text: &str) -> ClassificationResult {
    let is_question = question_pattern().is_match(text);

    let topic = if regex(r"(?i)price|cost|plan|pricing|subscription|pay|fee").is_match(text) {
        Topic::Pricing
    } else if regex(r"(?i)help|issue|problem|error|broken|fix|support").is_match(text) {
        Topic::Support
    } else if regex(r"(?i)angry|terrible|worst|hate|disappointed|unacceptable").is_match(text) {
        Topic::Complaint
    } else if regex(r"(?i)tell me|info|information|details|learn|about").is_match(text) {
        Topic::Inquiry
    } else if regex(r"(?i)great|love|awesome|thanks|good|excellent").is_match(text) {
        Topic::Feedback
    } else if regex(r"(?i)^(hi|hello|hey|good morning|good evening|howdy)").is_match(text) {
        Topic::Greeting
    } else {
        Topic::Other
    };

    ClassificationResult {
        language: "en".to_string(),
        entities: Vec::new(),
        topic,
        is_question,
        summary: text.chars().take(100).collect(),
        key_phrases: text
            .split_whitespace()
            .filter(|w| w.len() > 4)
            .take(LIST_CAP)
            .map(String::from)
            .collect(),
    }
}

fn question_pattern() -> Regex {
    regex(r"(?i)\?|^(what|how|when|where|why|who|which|can|could|would|do|does|is|are)\b")
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static classifier pattern")
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::error::LlmError;
    use crate::llm::provider::{CompletionResponse, FinishReason};
    use crate::pipeline::types::{
        BrandVoice, ChannelType, ContentType, ConversationTurn, TurnRole,
    };

    fn make_input(text: &str) -> PipelineInput {
        PipelineInput {
            message_id: "test-1".into(),
            tenant_id: "t1".into(),
            conversation_id: "c1".into(),
            channel: ChannelType::Facebook,
            text: text.into(),
            content_type: ContentType::Text,
            sender_id: "s1".into(),
            sender_name: None,
            history: vec![],
            brand_voice: BrandVoice::default(),
            existing_lead: None,
        }
    }

    // ── Parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_well_formed_response() {
        let raw = r#"{"language":"en","entities":[{"type":"product","value":"Pro plan"}],"topic":"pricing","is_question":true,"summary":"Pricing question","key_phrases":["Pro plan","cost"]}"#;
        let result = parse_classification(raw).unwrap();
        assert_eq!(result.topic, Topic::Pricing);
        assert!(result.is_question);
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].kind, EntityKind::Product);
        assert_eq!(result.entities[0].value, "Pro plan");
    }

    #[test]
    fn parse_coerces_unknown_topic_to_other() {
        let raw = r#"{"language":"en","topic":"sales_pitch","summary":"x"}"#;
        let result = parse_classification(raw).unwrap();
        assert_eq!(result.topic, Topic::Other);
    }

    #[test]
    fn parse_drops_unknown_entity_kinds() {
        let raw = r#"{"topic":"inquiry","summary":"x","entities":[{"type":"emotion","value":"joy"},{"type":"price","value":"$50"}]}"#;
        let result = parse_classification(raw).unwrap();
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].kind, EntityKind::Price);
    }

    #[test]
    fn parse_caps_and_stringifies_key_phrases() {
        let raw = r#"{"topic":"other","summary":"x","key_phrases":["a","b","c","d","e","f",42]}"#;
        let result = parse_classification(raw).unwrap();
        assert_eq!(result.key_phrases.len(), 5);
    }

    #[test]
    fn parse_stringifies_numeric_entity_value() {
        let raw = r#"{"topic":"pricing","summary":"x","entities":[{"type":"price","value":49.99}]}"#;
        let result = parse_classification(raw).unwrap();
        assert_eq!(result.entities[0].value, "49.99");
    }

    #[test]
    fn parse_truncates_long_summary() {
        let long = "s".repeat(400);
        let raw = format!(r#"{{"topic":"other","summary":"{long}"}}"#);
        let result = parse_classification(&raw).unwrap();
        assert_eq!(result.summary.chars().count(), 200);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_classification("not json at all").is_err());
    }

    #[test]
    fn extract_json_from_markdown_block() {
        let input = "```json\n{\"topic\": \"support\", \"summary\": \"x\"}\n```";
        let result = parse_classification(input).unwrap();
        assert_eq!(result.topic, Topic::Support);
    }

    #[test]
    fn extract_json_embedded_in_text() {
        let input = "Here is my analysis: {\"topic\": \"greeting\", \"summary\": \"hi\"} done.";
        let result = parse_classification(input).unwrap();
        assert_eq!(result.topic, Topic::Greeting);
    }

    // ── Keyword fallback ────────────────────────────────────────────

    #[test]
    fn fallback_detects_pricing_topic() {
        let result = keyword_classify("What does the subscription cost?");
        assert_eq!(result.topic, Topic::Pricing);
        assert!(result.is_question);
    }

    #[test]
    fn fallback_detects_greeting() {
        let result = keyword_classify("Hey!");
        assert_eq!(result.topic, Topic::Greeting);
        assert!(!result.is_question);
    }

    #[test]
    fn fallback_defaults_to_other() {
        let result = keyword_classify("xyzzy plugh");
        assert_eq!(result.topic, Topic::Other);
        assert!(result.entities.is_empty());
    }

    #[test]
    fn fallback_summary_is_first_100_chars() {
        let long = "a".repeat(300);
        let result = keyword_classify(&long);
        assert_eq!(result.summary.len(), 100);
    }

    #[test]
    fn fallback_populates_key_phrases() {
        let result = keyword_classify("wondering about enterprise deployment options");
        assert!(!result.key_phrases.is_empty());
        assert!(result.key_phrases.len() <= 5);
    }

    // ── Classifier with mock LLM ────────────────────────────────────

    struct MockLlm {
        response: Result<String, ()>,
    }

    #[async_trait]
    impl LlmProvider for MockLlm {
        fn model_name(&self) -> &str {
            "mock-classifier"
        }

        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            match &self.response {
                Ok(content) => Ok(CompletionResponse {
                    content: content.clone(),
                    input_tokens: 150,
                    output_tokens: 60,
                    finish_reason: FinishReason::Stop,
                    response_id: None,
                }),
                Err(()) => Err(LlmError::RequestFailed {
                    provider: "mock-classifier".into(),
                    reason: "forced failure".into(),
                }),
            }
        }
    }

    fn classifier(response: Result<String, ()>) -> MessageClassifier {
        MessageClassifier::new(
            Arc::new(MockLlm { response }),
            PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn classify_uses_generative_result() {
        let c = classifier(Ok(
            r#"{"language":"es","topic":"complaint","is_question":false,"summary":"angry customer"}"#
                .into(),
        ));
        let result = c.classify(&make_input("¡Esto es inaceptable!")).await;
        assert_eq!(result.topic, Topic::Complaint);
        assert_eq!(result.language, "es");
    }

    #[tokio::test]
    async fn classify_falls_back_on_call_failure() {
        let c = classifier(Err(()));
        let result = c.classify(&make_input("How much does the plan cost?")).await;
        // Fallback still populates every field.
        assert_eq!(result.topic, Topic::Pricing);
        assert!(result.is_question);
        assert_eq!(result.language, "en");
        assert!(result.entities.is_empty());
    }

    #[tokio::test]
    async fn classify_falls_back_on_malformed_response() {
        let c = classifier(Ok("I think this message is about pricing.".into()));
        let result = c.classify(&make_input("hello there")).await;
        assert_eq!(result.topic, Topic::Greeting);
    }

    #[tokio::test]
    async fn user_prompt_includes_context() {
        let mut input = make_input("Sounds good");
        input.history = vec![
            ConversationTurn {
                role: TurnRole::Contact,
                content: "Do you ship to Canada?".into(),
                timestamp: Utc::now(),
            },
            ConversationTurn {
                role: TurnRole::AutoReply,
                content: "Yes, we do!".into(),
                timestamp: Utc::now(),
            },
        ];
        let prompt = build_user_prompt(&input);
        assert!(prompt.contains("Do you ship to Canada?"));
        assert!(prompt.contains("auto_reply"));
        assert!(prompt.contains("Current message"));
    }
}

//! Reply generator — template short-circuit plus brand-grounded generation.
//!
//! Trivial messages (pure greetings, bare thanks) are answered from fixed
//! templates at zero cost. Everything else gets one generative call grounded
//! in brand voice, knowledge base, and the cycle's analysis. Any call
//! failure produces a fixed apology with forced human escalation — a raw
//! error never reaches the customer-facing layer.

use std::sync::Arc;
use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::llm::retry::complete_with_retry;
use crate::llm::{ChatMessage, CompletionRequest, FinishReason, LlmProvider};
use crate::pipeline::prompts::build_reply_system_prompt;
use crate::pipeline::tiered::generative_first;
use crate::pipeline::types::{
    ClassificationResult, LeadScore, LeadTag, PipelineInput, ReplyResult, SentimentResult,
    Topic, TurnRole,
};

/// Confidence for template replies.
const TEMPLATE_CONFIDENCE: f32 = 0.95;

/// Confidence below which a generated reply needs a human.
const HUMAN_THRESHOLD: f32 = 0.5;

/// How many history turns the generation prompt sees.
const DIALOGUE_TURNS: usize = 5;

static THANKS_OPENING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(thank|thanks|thx|ty)\b").expect("static thanks pattern"));

static HEDGING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)I'm not sure|I don't know|I cannot").expect("static hedging pattern")
});

pub struct ReplyGenerator {
    llm: Arc<dyn LlmProvider>,
    config: PipelineConfig,
}

impl ReplyGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: PipelineConfig) -> Self {
        Self { llm, config }
    }

    /// Generate a reply for one cycle. Never fails.
    pub async fn generate(
        &self,
        input: &PipelineInput,
        classification: &ClassificationResult,
        sentiment: &SentimentResult,
        lead_score: &LeadScore,
    ) -> ReplyResult {
        if let Some(template) = template_reply(input, classification) {
            debug!(
                id = %input.message_id,
                topic = classification.topic.label(),
                "Template short-circuit, no generative call"
            );
            return template;
        }

        let company = input.brand_voice.company_name.clone();
        let actions = suggested_actions(lead_score, classification);

        let (reply, generative) = generative_first(
            self.generative_reply(input, classification, sentiment, lead_score),
            || apology_reply(&company),
        )
        .await;

        debug!(
            id = %input.message_id,
            confidence = reply.confidence,
            requires_human = reply.requires_human,
            tokens = reply.tokens_used,
            generative,
            "Reply generated"
        );

        // Suggested actions depend on analysis, not on how generation went —
        // the apology path keeps its own escalation action.
        if generative {
            ReplyResult {
                suggested_actions: actions,
                ..reply
            }
        } else {
            reply
        }
    }

    async fn generative_reply(
        &self,
        input: &PipelineInput,
        classification: &ClassificationResult,
        sentiment: &SentimentResult,
        lead_score: &LeadScore,
    ) -> Result<ReplyResult, PipelineError> {
        let mut messages = vec![ChatMessage::system(build_reply_system_prompt(
            input,
            classification,
            sentiment,
            lead_score,
        ))];

        let skip = input.history.len().saturating_sub(DIALOGUE_TURNS);
        for turn in input.history.iter().skip(skip) {
            let message = match turn.role {
                TurnRole::Contact => ChatMessage::user(turn.content.clone()),
                TurnRole::AutoReply | TurnRole::HumanAgent => {
                    ChatMessage::assistant(turn.content.clone())
                }
            };
            messages.push(message);
        }
        messages.push(ChatMessage::user(input.text.clone()));

        let request = CompletionRequest::new(messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        let response = complete_with_retry(&self.llm, request, self.config.call_timeout)
            .await
            .map_err(|e| PipelineError::Reply(format!("LLM call failed: {e}")))?;

        let text = response.content.trim().to_string();
        let truncated = response.finish_reason == FinishReason::Length;
        let confidence = reply_confidence(&text, classification.topic, truncated);

        Ok(ReplyResult {
            text,
            confidence,
            requires_human: confidence < HUMAN_THRESHOLD,
            suggested_actions: Vec::new(),
            tokens_used: response.total_tokens(),
        })
    }
}

// ── Templates ───────────────────────────────────────────────────────

/// Zero-cost template answers for trivially classifiable messages.
fn template_reply(
    input: &PipelineInput,
    classification: &ClassificationResult,
) -> Option<ReplyResult> {
    let company = &input.brand_voice.company_name;

    // Pure greeting, no question.
    if classification.topic == Topic::Greeting && !classification.is_question {
        let greetings = [
            format!("Hi there! Welcome to {company}. How can I help you today?"),
            format!("Hello! Thanks for reaching out to {company}. What can I assist you with?"),
            format!("Hey! Great to hear from you. How can {company} help you today?"),
        ];
        let pick = rand::thread_rng().gen_range(0..greetings.len());
        return Some(ReplyResult {
            text: greetings[pick].clone(),
            confidence: TEMPLATE_CONFIDENCE,
            requires_human: false,
            suggested_actions: Vec::new(),
            tokens_used: 0,
        });
    }

    // Bare acknowledgement/thanks, no question.
    if THANKS_OPENING.is_match(&input.text) && !classification.is_question {
        return Some(ReplyResult {
            text: "You're welcome! If you need anything else, don't hesitate to reach out. \
                   We're here to help!"
                .to_string(),
            confidence: TEMPLATE_CONFIDENCE,
            requires_human: false,
            suggested_actions: Vec::new(),
            tokens_used: 0,
        });
    }

    None
}

/// Fixed brand-substituted apology used when generation fails.
fn apology_reply(company_name: &str) -> ReplyResult {
    ReplyResult {
        text: format!(
            "Thank you for reaching out to {company_name}! A team member will get back to you shortly."
        ),
        confidence: 0.3,
        requires_human: true,
        suggested_actions: vec!["escalate_to_human".to_string()],
        tokens_used: 0,
    }
}

// ── Confidence ──────────────────────────────────────────────────────

/// Adjust base confidence from reply characteristics; clamp to [0.1, 1].
fn reply_confidence(reply: &str, topic: Topic, truncated: bool) -> f32 {
    let mut confidence: f32 = 0.8;

    if reply.len() < 20 {
        confidence -= 0.2;
    }
    if HEDGING.is_match(reply) {
        confidence -= 0.2;
    }

    match topic {
        Topic::Complaint => confidence -= 0.1,
        Topic::Support => confidence -= 0.05,
        Topic::Greeting => confidence += 0.15,
        Topic::Feedback => confidence += 0.1,
        _ => {}
    }

    if truncated {
        confidence -= 0.15;
    }

    confidence.clamp(0.1, 1.0)
}

// ── Suggested actions ───────────────────────────────────────────────

/// Follow-up actions derived from lead temperature and topic.
fn suggested_actions(lead_score: &LeadScore, classification: &ClassificationResult) -> Vec<String> {
    let mut actions = Vec::new();

    if lead_score.tag == LeadTag::Hot {
        actions.push("notify_sales_team".to_string());
        actions.push("schedule_follow_up".to_string());
    }
    if classification.topic == Topic::Pricing {
        actions.push("send_pricing_info".to_string());
    }
    if classification.topic == Topic::Complaint {
        actions.push("create_support_ticket".to_string());
        actions.push("escalate_if_unresolved".to_string());
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use crate::error::LlmError;
    use crate::llm::provider::CompletionResponse;
    use crate::pipeline::types::{
        BrandVoice, ChannelType, ContentType, Sentiment, SentimentResult, Urgency,
    };

    fn make_input(text: &str) -> PipelineInput {
        PipelineInput {
            message_id: "m1".into(),
            tenant_id: "t1".into(),
            conversation_id: "c1".into(),
            channel: ChannelType::Instagram,
            text: text.into(),
            content_type: ContentType::Text,
            sender_id: "s1".into(),
            sender_name: None,
            history: vec![],
            brand_voice: BrandVoice {
                company_name: "Acme".into(),
                ..BrandVoice::default()
            },
            existing_lead: None,
        }
    }

    fn classification(topic: Topic, is_question: bool) -> ClassificationResult {
        ClassificationResult {
            language: "en".into(),
            entities: vec![],
            topic,
            is_question,
            summary: "test".into(),
            key_phrases: vec![],
        }
    }

    fn sentiment() -> SentimentResult {
        SentimentResult {
            sentiment: Sentiment::Neutral,
            score: 0.0,
            urgency: Urgency::Low,
            emotions: vec!["neutral".into()],
        }
    }

    fn lead(tag: LeadTag) -> LeadScore {
        LeadScore {
            intent: "information_seeking".into(),
            confidence: 0.7,
            score: match tag {
                LeadTag::Hot => 80,
                LeadTag::Warm => 50,
                LeadTag::Cold => 10,
            },
            tag,
            signals: vec![],
            recommended_action: "monitor".into(),
        }
    }

    struct MockLlm {
        response: Result<(String, FinishReason), ()>,
    }

    #[async_trait]
    impl LlmProvider for MockLlm {
        fn model_name(&self) -> &str {
            "mock-reply"
        }

        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            match &self.response {
                Ok((content, finish_reason)) => Ok(CompletionResponse {
                    content: content.clone(),
                    input_tokens: 500,
                    output_tokens: 120,
                    finish_reason: *finish_reason,
                    response_id: None,
                }),
                Err(()) => Err(LlmError::RequestFailed {
                    provider: "mock-reply".into(),
                    reason: "forced failure".into(),
                }),
            }
        }
    }

    fn generator(response: Result<(String, FinishReason), ()>) -> ReplyGenerator {
        ReplyGenerator::new(Arc::new(MockLlm { response }), PipelineConfig::default())
    }

    // ── Templates ───────────────────────────────────────────────────

    #[tokio::test]
    async fn greeting_uses_template() {
        let g = generator(Err(())); // LLM must not be needed
        let result = g
            .generate(
                &make_input("Hi there!"),
                &classification(Topic::Greeting, false),
                &sentiment(),
                &lead(LeadTag::Cold),
            )
            .await;
        assert!((result.confidence - 0.95).abs() < f32::EPSILON);
        assert!(!result.requires_human);
        assert_eq!(result.tokens_used, 0);
        assert!(result.text.contains("Acme"));
    }

    #[tokio::test]
    async fn greeting_with_question_is_not_templated() {
        let g = generator(Ok(("Happy to help — what would you like to know?".into(), FinishReason::Stop)));
        let result = g
            .generate(
                &make_input("Hi! Do you ship internationally?"),
                &classification(Topic::Greeting, true),
                &sentiment(),
                &lead(LeadTag::Cold),
            )
            .await;
        assert!(result.tokens_used > 0);
    }

    #[tokio::test]
    async fn bare_thanks_uses_template() {
        let g = generator(Err(()));
        let result = g
            .generate(
                &make_input("thanks!"),
                &classification(Topic::Feedback, false),
                &sentiment(),
                &lead(LeadTag::Cold),
            )
            .await;
        assert!((result.confidence - 0.95).abs() < f32::EPSILON);
        assert_eq!(result.tokens_used, 0);
        assert!(result.text.contains("You're welcome"));
    }

    // ── Generative path ─────────────────────────────────────────────

    #[tokio::test]
    async fn generated_reply_reports_tokens_and_confidence() {
        let g = generator(Ok((
            "Our Pro plan includes unlimited seats — happy to set up a demo.".into(),
            FinishReason::Stop,
        )));
        let result = g
            .generate(
                &make_input("Tell me about the Pro plan"),
                &classification(Topic::Inquiry, true),
                &sentiment(),
                &lead(LeadTag::Warm),
            )
            .await;
        assert_eq!(result.tokens_used, 620);
        assert!((result.confidence - 0.8).abs() < 0.01);
        assert!(!result.requires_human);
    }

    #[tokio::test]
    async fn short_hedging_complaint_reply_needs_human() {
        // 0.8 − 0.2 (short) − 0.2 (hedging) − 0.1 (complaint) = 0.3 < 0.5
        let g = generator(Ok(("I'm not sure.".into(), FinishReason::Stop)));
        let result = g
            .generate(
                &make_input("This is unacceptable, fix it"),
                &classification(Topic::Complaint, false),
                &sentiment(),
                &lead(LeadTag::Cold),
            )
            .await;
        assert!((result.confidence - 0.3).abs() < 0.01);
        assert!(result.requires_human);
    }

    #[tokio::test]
    async fn truncated_reply_loses_confidence() {
        let g = generator(Ok((
            "Here's a detailed breakdown of every plan we offer, starting with".into(),
            FinishReason::Length,
        )));
        let result = g
            .generate(
                &make_input("Compare all plans"),
                &classification(Topic::Inquiry, true),
                &sentiment(),
                &lead(LeadTag::Warm),
            )
            .await;
        assert!((result.confidence - 0.65).abs() < 0.01);
    }

    #[tokio::test]
    async fn call_failure_returns_apology_with_escalation() {
        let g = generator(Err(()));
        let result = g
            .generate(
                &make_input("What integrations do you support?"),
                &classification(Topic::Inquiry, true),
                &sentiment(),
                &lead(LeadTag::Warm),
            )
            .await;
        assert!(result.text.contains("Acme"));
        assert!((result.confidence - 0.3).abs() < f32::EPSILON);
        assert!(result.requires_human);
        assert_eq!(result.tokens_used, 0);
        assert_eq!(result.suggested_actions, vec!["escalate_to_human".to_string()]);
    }

    // ── Suggested actions ───────────────────────────────────────────

    #[tokio::test]
    async fn hot_pricing_lead_gets_sales_actions() {
        let g = generator(Ok((
            "Great question — our pricing starts at the Starter tier.".into(),
            FinishReason::Stop,
        )));
        let result = g
            .generate(
                &make_input("What's your pricing? Ready to buy."),
                &classification(Topic::Pricing, true),
                &sentiment(),
                &lead(LeadTag::Hot),
            )
            .await;
        assert_eq!(
            result.suggested_actions,
            vec![
                "notify_sales_team".to_string(),
                "schedule_follow_up".to_string(),
                "send_pricing_info".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn complaint_gets_ticket_actions() {
        let g = generator(Ok((
            "I'm sorry to hear that — let's get this sorted for you right away.".into(),
            FinishReason::Stop,
        )));
        let result = g
            .generate(
                &make_input("My order arrived damaged"),
                &classification(Topic::Complaint, false),
                &sentiment(),
                &lead(LeadTag::Cold),
            )
            .await;
        assert_eq!(
            result.suggested_actions,
            vec![
                "create_support_ticket".to_string(),
                "escalate_if_unresolved".to_string(),
            ]
        );
    }

    #[test]
    fn confidence_is_always_clamped() {
        // Worst case: short + hedging + complaint + truncated.
        let c = reply_confidence("I cannot.", Topic::Complaint, true);
        assert!((c - 0.15).abs() < 0.01);
        let floor = reply_confidence("", Topic::Complaint, true);
        assert!(floor >= 0.1);
        let best = reply_confidence(
            "Thanks so much for the kind words — we really appreciate it!",
            Topic::Greeting,
            false,
        );
        assert!(best <= 1.0);
    }
}

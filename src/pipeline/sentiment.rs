//! Sentiment estimator — two-tier polarity, urgency, and emotion analysis.
//!
//! The deterministic tier (curated lexicons, single-word negation, and
//! punctuation/caps intensity) handles the large majority of traffic at zero
//! cost. A generative escalation runs only when deterministic confidence is
//! at or below 0.7; if the escalation fails, the deterministic result stands
//! regardless of its confidence.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::llm::retry::complete_with_retry;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::prompts::SENTIMENT_SYSTEM_PROMPT;
use crate::pipeline::tiered::{Scored, deterministic_first};
use crate::pipeline::types::{PipelineInput, Sentiment, SentimentResult, Urgency};

/// Deterministic confidence above which no generative call is made.
const ESCALATION_THRESHOLD: f32 = 0.7;

/// Max tokens for the escalation call.
const SENTIMENT_MAX_TOKENS: u32 = 150;

/// Temperature for the escalation call.
const SENTIMENT_TEMPERATURE: f32 = 0.1;

static POSITIVE_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "great", "amazing", "awesome", "excellent", "fantastic", "love", "wonderful",
        "perfect", "best", "thank", "thanks", "appreciate", "happy", "glad", "excited",
        "pleased", "helpful", "impressed", "beautiful", "brilliant", "outstanding",
        "superb", "terrific", "delighted", "enjoy", "good", "nice", "cool",
        "interesting", "recommend",
    ])
});

static NEGATIVE_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "terrible", "awful", "horrible", "worst", "hate", "angry", "frustrated",
        "disappointed", "unacceptable", "useless", "pathetic", "ridiculous",
        "disgusting", "annoying", "waste", "scam", "fraud", "broken", "bad", "slow",
        "poor", "rude", "incompetent", "never", "complaint", "refund", "cancel",
        "problem", "issue", "bug", "error", "fail", "wrong",
    ])
});

static URGENCY_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "urgent", "asap", "immediately", "emergency", "critical", "now", "today",
        "hurry", "deadline",
    ])
});

// Negation flips only the single following word. Multi-word scope
// ("not very good") is not handled; downstream thresholds assume this.
static NEGATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(not|no|don't|doesn't|won't|can't|never|neither|nor|hardly|barely)\s+(\w+)")
        .expect("static negation pattern")
});

static GRATEFUL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(thank|appreciate)\b").expect("static emotion pattern"));

static CONFUSED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(confused|don't understand|unclear)\b").expect("static emotion pattern")
});

static ANGRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(angry|furious|outraged)\b").expect("static emotion pattern")
});

pub struct SentimentEstimator {
    llm: Arc<dyn LlmProvider>,
    config: PipelineConfig,
}

impl SentimentEstimator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: PipelineConfig) -> Self {
        Self { llm, config }
    }

    /// Estimate sentiment for one message. Never fails.
    pub async fn estimate(&self, input: &PipelineInput) -> SentimentResult {
        let deterministic = lexicon_analysis(&input.text);
        let confidence = deterministic.confidence;

        let (result, escalated) = deterministic_first(
            deterministic,
            ESCALATION_THRESHOLD,
            self.generative_analysis(input),
        )
        .await;

        debug!(
            id = %input.message_id,
            sentiment = result.sentiment.label(),
            urgency = result.urgency.label(),
            deterministic_confidence = confidence,
            escalated,
            "Sentiment estimated"
        );
        result
    }

    async fn generative_analysis(
        &self,
        input: &PipelineInput,
    ) -> Result<SentimentResult, PipelineError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(SENTIMENT_SYSTEM_PROMPT),
            ChatMessage::user(input.text.clone()),
        ])
        .with_temperature(SENTIMENT_TEMPERATURE)
        .with_max_tokens(SENTIMENT_MAX_TOKENS);

        let response = complete_with_retry(&self.llm, request, self.config.call_timeout)
            .await
            .map_err(|e| PipelineError::Sentiment(format!("LLM call failed: {e}")))?;

        parse_sentiment(&response.content)
            .map_err(|e| PipelineError::Sentiment(format!("parse failed: {e}")))
    }
}

// ── Deterministic tier ──────────────────────────────────────────────

/// Lexicon-and-negation scorer.
///
/// Confidence is `min(1, 0.4 + 0.15 × (positive + negative hits))`, so two
/// or more sentiment hits clear the escalation threshold.
pub(crate) fn lexicon_analysis(text: &str) -> Scored<SentimentResult> {
    let lower = text.to_lowercase();
    let mut positive: i32 = 0;
    let mut negative: i32 = 0;
    let mut urgency_hits: i32 = 0;

    for word in lower.split(|c: char| !c.is_alphanumeric() && c != '\'').filter(|w| !w.is_empty()) {
        if POSITIVE_WORDS.contains(word) {
            positive += 1;
        }
        if NEGATIVE_WORDS.contains(word) {
            negative += 1;
        }
        if URGENCY_WORDS.contains(word) {
            urgency_hits += 1;
        }
    }

    // A negation token flips the polarity of the single following word.
    for caps in NEGATION.captures_iter(text) {
        let negated = caps[2].to_lowercase();
        if POSITIVE_WORDS.contains(negated.as_str()) {
            positive -= 1;
            negative += 1;
        } else if NEGATIVE_WORDS.contains(negated.as_str()) {
            negative -= 1;
            positive += 1;
        }
    }

    let exclamations = text.matches('!').count();
    let caps_ratio =
        text.chars().filter(|c| c.is_ascii_uppercase()).count() as f32 / text.len().max(1) as f32;

    let total = positive + negative;
    let denom = if total == 0 { 1 } else { total };
    let score = ((positive - negative) as f32 / denom as f32).clamp(-1.0, 1.0);

    let sentiment = if positive > 0 && negative > 0 {
        Sentiment::Mixed
    } else if score > 0.2 {
        Sentiment::Positive
    } else if score < -0.2 {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    };

    let mut urgency = Urgency::Low;
    if urgency_hits > 0 || exclamations > 2 || caps_ratio > 0.5 {
        urgency = Urgency::High;
    } else if negative > 2 || exclamations > 0 {
        urgency = Urgency::Medium;
    }
    // Critical is conjunctive: both counts must exceed 1.
    if urgency_hits > 1 && negative > 1 {
        urgency = Urgency::Critical;
    }

    let mut emotions: Vec<String> = Vec::new();
    if positive > 1 {
        emotions.push("satisfied".to_string());
    }
    if negative > 1 {
        emotions.push("frustrated".to_string());
    }
    if urgency_hits > 0 {
        emotions.push("anxious".to_string());
    }
    if GRATEFUL.is_match(text) {
        emotions.push("grateful".to_string());
    }
    if CONFUSED.is_match(text) {
        emotions.push("confused".to_string());
    }
    if ANGRY.is_match(text) {
        emotions.push("angry".to_string());
    }
    if emotions.is_empty() {
        emotions.push("neutral".to_string());
    }

    let signal_strength = positive + negative;
    let confidence = (0.4 + 0.15 * signal_strength as f32).min(1.0);

    Scored::new(
        SentimentResult {
            sentiment,
            score,
            urgency,
            emotions,
        },
        confidence,
    )
}

// ── Escalation parsing ──────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct RawSentiment {
    #[serde(default)]
    sentiment: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    urgency: String,
    #[serde(default)]
    emotions: Vec<String>,
}

fn parse_sentiment(raw: &str) -> Result<SentimentResult, String> {
    let trimmed = raw.trim();
    let json = if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        &trimmed[start..=end]
    } else {
        trimmed
    };

    let parsed: RawSentiment =
        serde_json::from_str(json).map_err(|e| format!("JSON parse error: {e}"))?;

    let sentiment = match parsed.sentiment.as_str() {
        "positive" => Sentiment::Positive,
        "negative" => Sentiment::Negative,
        "mixed" => Sentiment::Mixed,
        _ => Sentiment::Neutral,
    };
    let urgency = match parsed.urgency.as_str() {
        "low" => Urgency::Low,
        "high" => Urgency::High,
        "critical" => Urgency::Critical,
        _ => Urgency::Medium,
    };
    let emotions = if parsed.emotions.is_empty() {
        vec!["neutral".to_string()]
    } else {
        parsed.emotions
    };

    Ok(SentimentResult {
        sentiment,
        score: parsed.score.clamp(-1.0, 1.0),
        urgency,
        emotions,
    })
}

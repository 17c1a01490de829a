//! Shared types for the decision pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Channel ─────────────────────────────────────────────────────────

/// Social platform a message arrived on.
///
/// Closed set; platform quirks live in per-variant methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelType {
    Facebook,
    Instagram,
    Whatsapp,
    Twitter,
}

impl ChannelType {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::Whatsapp => "whatsapp",
            Self::Twitter => "twitter",
        }
    }

    /// Hard character limit the platform enforces on outbound text.
    pub fn send_text_limit(&self) -> usize {
        match self {
            Self::Facebook => 2000,
            Self::Instagram => 1000,
            Self::Whatsapp => 4096,
            Self::Twitter => 280,
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Content type of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Text,
    Image,
    Video,
    Audio,
}

// ── Conversation context ────────────────────────────────────────────

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// The customer.
    Contact,
    /// An automated reply we generated.
    AutoReply,
    /// A human agent on the tenant's side.
    HumanAgent,
}

/// A message in the conversation history, most-recent last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Tenant-configured persona parameters for reply generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandVoice {
    pub company_name: String,
    pub tone: String,
    pub style: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidelines: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_base: Option<String>,
    pub max_reply_length: usize,
    pub use_emojis: bool,
    pub language: String,
}

impl Default for BrandVoice {
    fn default() -> Self {
        Self {
            company_name: "our company".to_string(),
            tone: "professional".to_string(),
            style: "helpful".to_string(),
            guidelines: None,
            knowledge_base: None,
            max_reply_length: 500,
            use_emojis: false,
            language: "en".to_string(),
        }
    }
}

/// Latest persisted lead state for the contact, resolved by the caller
/// before the cycle starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSnapshot {
    pub tag: LeadTag,
    pub score: u8,
    pub signals: Vec<String>,
}

// ── Pipeline input ──────────────────────────────────────────────────

/// Immutable snapshot for one decision cycle.
///
/// Constructed fresh per inbound event from externally-resolved state; the
/// pipeline never re-reads mutable shared state mid-cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineInput {
    pub message_id: String,
    pub tenant_id: String,
    pub conversation_id: String,
    pub channel: ChannelType,
    /// The inbound message text.
    pub text: String,
    pub content_type: ContentType,
    pub sender_id: String,
    pub sender_name: Option<String>,
    /// Recent turns, ordered, most-recent last.
    pub history: Vec<ConversationTurn>,
    pub brand_voice: BrandVoice,
    pub existing_lead: Option<LeadSnapshot>,
}

impl PipelineInput {
    /// Number of customer turns in the recent history.
    pub fn contact_turns(&self) -> usize {
        self.history
            .iter()
            .filter(|t| t.role == TurnRole::Contact)
            .count()
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Kind of an extracted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Product,
    Person,
    Company,
    Location,
    Price,
    Date,
}

impl EntityKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "product" => Some(Self::Product),
            "person" => Some(Self::Person),
            "company" => Some(Self::Company),
            "location" => Some(Self::Location),
            "price" => Some(Self::Price),
            "date" => Some(Self::Date),
            _ => None,
        }
    }
}

/// An extracted (kind, value) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub value: String,
}

/// Message topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Pricing,
    Support,
    Complaint,
    Inquiry,
    Feedback,
    Greeting,
    Other,
}

impl Topic {
    /// Short label for logging and prompt substitution.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pricing => "pricing",
            Self::Support => "support",
            Self::Complaint => "complaint",
            Self::Inquiry => "inquiry",
            Self::Feedback => "feedback",
            Self::Greeting => "greeting",
            Self::Other => "other",
        }
    }

    /// Parse a topic, coercing anything outside the closed set to `Other`.
    pub fn parse_or_other(s: &str) -> Self {
        match s {
            "pricing" => Self::Pricing,
            "support" => Self::Support,
            "complaint" => Self::Complaint,
            "inquiry" => Self::Inquiry,
            "feedback" => Self::Feedback,
            "greeting" => Self::Greeting,
            _ => Self::Other,
        }
    }
}

/// Structured understanding of one message. Produced exactly once per cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// ISO 639-1 language code.
    pub language: String,
    pub entities: Vec<Entity>,
    pub topic: Topic,
    pub is_question: bool,
    /// Short summary, capped at 200 chars.
    pub summary: String,
    /// At most 5 key phrases.
    pub key_phrases: Vec<String>,
}

impl ClassificationResult {
    /// Placeholder used when the pipeline never analyzed the message.
    pub fn suppressed(summary: impl Into<String>) -> Self {
        Self {
            language: "en".to_string(),
            entities: Vec::new(),
            topic: Topic::Other,
            is_question: false,
            summary: summary.into(),
            key_phrases: Vec::new(),
        }
    }
}

// ── Sentiment ───────────────────────────────────────────────────────

/// Overall emotional polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Mixed,
}

impl Sentiment {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Mixed => "mixed",
        }
    }
}

/// How urgently the message needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Sentiment analysis output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentResult {
    pub sentiment: Sentiment,
    /// Polarity score in [-1, 1].
    pub score: f32,
    pub urgency: Urgency,
    /// Never empty — falls back to `["neutral"]`.
    pub emotions: Vec<String>,
}

impl SentimentResult {
    /// Neutral placeholder for suppressed cycles.
    pub fn neutral() -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            score: 0.0,
            urgency: Urgency::Low,
            emotions: vec!["neutral".to_string()],
        }
    }
}

// ── Lead score ──────────────────────────────────────────────────────

/// Lead temperature tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadTag {
    Hot,
    Warm,
    Cold,
}

impl LeadTag {
    /// Threshold table: HOT ≥70, WARM ≥40, COLD otherwise.
    pub fn from_score(score: u8) -> Self {
        if score >= 70 {
            Self::Hot
        } else if score >= 40 {
            Self::Warm
        } else {
            Self::Cold
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Hot => "HOT",
            Self::Warm => "WARM",
            Self::Cold => "COLD",
        }
    }
}

/// Lead scoring output. The signal list is the audit trail and preserves
/// rule evaluation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadScore {
    pub intent: String,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Score clamped to [0, 100].
    pub score: u8,
    pub tag: LeadTag,
    pub signals: Vec<String>,
    pub recommended_action: String,
}

impl LeadScore {
    /// Zero-value score for cycles that never reached scoring.
    pub fn suppressed(intent: impl Into<String>, signal: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            confidence: 1.0,
            score: 0,
            tag: LeadTag::Cold,
            signals: vec![signal.into()],
            recommended_action: "ignore".to_string(),
        }
    }
}

// ── Guardrail ───────────────────────────────────────────────────────

/// Verdict from one guardrail evaluation. Two independent instances exist
/// per cycle: inbound text and generated reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailVerdict {
    pub passed: bool,
    pub flags: Vec<String>,
    /// Risk in [0, 1].
    pub risk_score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
}

impl GuardrailVerdict {
    /// Clean pass with no triggered rules.
    pub fn clean() -> Self {
        Self {
            passed: true,
            flags: Vec::new(),
            risk_score: 0.0,
            blocked_reason: None,
        }
    }
}

// ── Reply ───────────────────────────────────────────────────────────

/// Generated (or suppressed) reply for the cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyResult {
    /// Final reply text; empty when blocked or escalated.
    pub text: String,
    /// Confidence in [0, 1].
    pub confidence: f32,
    pub requires_human: bool,
    pub suggested_actions: Vec<String>,
    /// 0 for template/rule paths.
    pub tokens_used: u32,
}

// ── Pipeline output ─────────────────────────────────────────────────

/// Terminal state the cycle ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineDisposition {
    /// Full pipeline ran and produced a guarded reply.
    Completed,
    /// Inbound guardrail suppressed the message.
    Blocked,
    /// Deterministic escalation rules forced a human handoff.
    Escalated,
}

impl PipelineDisposition {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::Escalated => "escalated",
        }
    }
}

/// Everything one cycle produced. This is the unit persisted and broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub disposition: PipelineDisposition,
    pub guardrail_inbound: GuardrailVerdict,
    pub classification: ClassificationResult,
    pub sentiment: SentimentResult,
    pub lead_score: LeadScore,
    pub reply: ReplyResult,
    pub guardrail_outbound: GuardrailVerdict,
    /// Total wall-clock duration of the cycle.
    pub processing_time_ms: u64,
    /// Total generative tokens consumed.
    pub tokens_used: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_tag_threshold_table() {
        assert_eq!(LeadTag::from_score(100), LeadTag::Hot);
        assert_eq!(LeadTag::from_score(70), LeadTag::Hot);
        assert_eq!(LeadTag::from_score(69), LeadTag::Warm);
        assert_eq!(LeadTag::from_score(40), LeadTag::Warm);
        assert_eq!(LeadTag::from_score(39), LeadTag::Cold);
        assert_eq!(LeadTag::from_score(0), LeadTag::Cold);
    }

    #[test]
    fn channel_send_limits() {
        assert!(ChannelType::Whatsapp.send_text_limit() > ChannelType::Twitter.send_text_limit());
        assert_eq!(ChannelType::Twitter.send_text_limit(), 280);
    }

    #[test]
    fn channel_wire_names() {
        let json = serde_json::to_value(ChannelType::Whatsapp).unwrap();
        assert_eq!(json, "WHATSAPP");
        let back: ChannelType = serde_json::from_value(json).unwrap();
        assert_eq!(back, ChannelType::Whatsapp);
    }

    #[test]
    fn topic_coerces_unknown_to_other() {
        assert_eq!(Topic::parse_or_other("pricing"), Topic::Pricing);
        assert_eq!(Topic::parse_or_other("escalate"), Topic::Other);
        assert_eq!(Topic::parse_or_other(""), Topic::Other);
    }

    #[test]
    fn entity_kind_closed_set() {
        assert_eq!(EntityKind::parse("product"), Some(EntityKind::Product));
        assert_eq!(EntityKind::parse("unknown"), None);
    }

    #[test]
    fn contact_turn_count() {
        let now = Utc::now();
        let input = PipelineInput {
            message_id: "m1".into(),
            tenant_id: "t1".into(),
            conversation_id: "c1".into(),
            channel: ChannelType::Facebook,
            text: "hello".into(),
            content_type: ContentType::Text,
            sender_id: "s1".into(),
            sender_name: None,
            history: vec![
                ConversationTurn {
                    role: TurnRole::Contact,
                    content: "hi".into(),
                    timestamp: now,
                },
                ConversationTurn {
                    role: TurnRole::AutoReply,
                    content: "hello!".into(),
                    timestamp: now,
                },
                ConversationTurn {
                    role: TurnRole::Contact,
                    content: "question".into(),
                    timestamp: now,
                },
            ],
            brand_voice: BrandVoice::default(),
            existing_lead: None,
        };
        assert_eq!(input.contact_turns(), 2);
    }

    #[test]
    fn neutral_sentiment_has_fallback_emotion() {
        let s = SentimentResult::neutral();
        assert!(!s.emotions.is_empty());
    }

    #[test]
    fn urgency_ordering() {
        assert!(Urgency::Critical > Urgency::High);
        assert!(Urgency::High > Urgency::Medium);
        assert!(Urgency::Medium > Urgency::Low);
    }
}

//! Shared types and collaborator interfaces for ingestion.
//!
//! The coordinator consumes these capabilities from the surrounding system
//! (storage, delivery, CRM, realtime). They are interfaces only — the core
//! produces payloads but never talks to a platform API or database engine
//! directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::pipeline::types::{
    BrandVoice, ChannelType, ContentType, ConversationTurn, LeadSnapshot, PipelineOutput,
};

// ── Platform event ──────────────────────────────────────────────────

/// One inbound event as delivered by a platform webhook adapter.
///
/// Delivery is at-least-once; `platform_message_id` is the stable identifier
/// the dedup window keys on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    pub channel: ChannelType,
    pub platform_message_id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    /// Page/number/handle the message was sent to — identifies the tenant's
    /// channel binding.
    pub recipient_id: String,
    pub text: String,
    pub content_type: ContentType,
    pub media_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PlatformEvent {
    /// Stable dedup key.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.channel.label(), self.platform_message_id)
    }
}

// ── Token budget ────────────────────────────────────────────────────

/// Tenant token budget resolved alongside conversation state.
///
/// The core pipeline is budget-unaware; the caller persists usage with an
/// atomic increment after each cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenBudget {
    pub daily_limit: u64,
    pub used_today: u64,
    /// When set, an exhausted budget is reported to the caller rather than
    /// merely logged.
    pub hard_cap: bool,
}

impl TokenBudget {
    pub fn exhausted(&self) -> bool {
        self.hard_cap && self.used_today >= self.daily_limit
    }
}

// ── Resolved state ──────────────────────────────────────────────────

/// Conversation and lead state resolved before a cycle runs.
#[derive(Debug, Clone)]
pub struct ResolvedContext {
    pub tenant_id: String,
    pub contact_id: String,
    pub contact_name: Option<String>,
    pub conversation_id: String,
    /// Recent turns, ordered, most-recent last.
    pub history: Vec<ConversationTurn>,
    pub existing_lead: Option<LeadSnapshot>,
    pub token_budget: Option<TokenBudget>,
    pub auto_reply_enabled: bool,
}

// ── Fan-out payloads ────────────────────────────────────────────────

/// Reply handed to the delivery queue for asynchronous send-back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyJob {
    pub tenant_id: String,
    pub conversation_id: String,
    pub channel: ChannelType,
    pub recipient_id: String,
    pub text: String,
}

/// Lightweight event broadcast to dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEvent {
    pub tenant_id: String,
    pub conversation_id: String,
    pub message_id: String,
    pub contact_name: Option<String>,
    /// First 100 chars of the inbound text.
    pub preview: String,
    pub channel: ChannelType,
    pub lead_tag: String,
    pub auto_replied: bool,
}

/// Payload for downstream CRM synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmPayload {
    pub contact: CrmContact,
    pub lead: CrmLead,
    pub conversation: CrmConversation,
    pub metadata: CrmMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmContact {
    pub name: String,
    pub platform_id: String,
    pub channel: ChannelType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmLead {
    pub tag: String,
    pub score: u8,
    pub intent: String,
    pub signals: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConversation {
    pub id: String,
    /// Multi-line note generated for the CRM record.
    pub summary: String,
    pub message_count: usize,
    pub sentiment: String,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmMetadata {
    pub ai_confidence: f32,
    pub processing_time_ms: u64,
    pub auto_replied: bool,
}

impl CrmPayload {
    /// Map one processed cycle to CRM fields, including the generated
    /// conversation note.
    pub fn build(
        event: &PlatformEvent,
        context: &ResolvedContext,
        output: &PipelineOutput,
    ) -> Self {
        Self {
            contact: CrmContact {
                name: context
                    .contact_name
                    .clone()
                    .or_else(|| event.sender_name.clone())
                    .unwrap_or_else(|| "Unknown".to_string()),
                platform_id: event.sender_id.clone(),
                channel: event.channel,
            },
            lead: CrmLead {
                tag: output.lead_score.tag.label().to_string(),
                score: output.lead_score.score,
                intent: output.lead_score.intent.clone(),
                signals: output.lead_score.signals.clone(),
            },
            conversation: CrmConversation {
                id: context.conversation_id.clone(),
                summary: conversation_note(event, output),
                message_count: context.history.len() + 1,
                sentiment: output.sentiment.sentiment.label().to_string(),
                last_activity: Utc::now(),
            },
            metadata: CrmMetadata {
                ai_confidence: output.reply.confidence,
                processing_time_ms: output.processing_time_ms,
                auto_replied: !output.reply.requires_human,
            },
        }
    }
}

/// Generate the multi-line CRM note for one cycle.
fn conversation_note(event: &PlatformEvent, output: &PipelineOutput) -> String {
    let excerpt: String = event.text.chars().take(200).collect();
    let mut parts = vec![
        format!("Channel: {}", event.channel),
        format!("Topic: {}", output.classification.topic.label()),
        format!(
            "Sentiment: {} ({} urgency)",
            output.sentiment.sentiment.label(),
            output.sentiment.urgency.label()
        ),
        format!(
            "Lead Score: {}/100 ({})",
            output.lead_score.score,
            output.lead_score.tag.label()
        ),
        format!("Intent: {}", output.lead_score.intent),
        format!("Last Message: \"{excerpt}\""),
        if output.reply.requires_human {
            "Status: Escalated to human agent".to_string()
        } else {
            "Status: Auto-replied".to_string()
        },
    ];
    if !output.lead_score.signals.is_empty() {
        parts.push(format!("Signals: {}", output.lead_score.signals.join(", ")));
    }
    parts.join("\n")
}

// ── Processed cycle ─────────────────────────────────────────────────

/// The persistence unit handed to the result store after a cycle.
#[derive(Debug, Clone)]
pub struct ProcessedCycle {
    pub event: PlatformEvent,
    pub tenant_id: String,
    pub contact_id: String,
    pub conversation_id: String,
    pub message_id: String,
    pub output: PipelineOutput,
    /// The reply text actually queued for delivery, if any.
    pub delivered_reply: Option<String>,
    pub processed_at: DateTime<Utc>,
}

// ── Collaborator traits ─────────────────────────────────────────────

/// Returns-or-creates the contact, conversation, recent history, and lead
/// snapshot for a platform sender.
#[async_trait]
pub trait ConversationResolver: Send + Sync {
    async fn resolve(&self, event: &PlatformEvent) -> Result<ResolvedContext, IngestError>;
}

/// Supplies tenant brand-voice configuration.
#[async_trait]
pub trait BrandConfigProvider: Send + Sync {
    async fn brand_voice(&self, tenant_id: &str) -> Result<BrandVoice, IngestError>;
}

/// Persists a processed cycle (message analysis, lead upsert, conversation
/// status). The caller owns the schema.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn persist(&self, cycle: &ProcessedCycle) -> Result<(), IngestError>;
}

/// Accepts reply payloads for asynchronous send-back to the platform.
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn enqueue_reply(&self, job: ReplyJob) -> Result<(), IngestError>;
}

/// Accepts lead/audit payloads for downstream CRM synchronization.
#[async_trait]
pub trait CrmSink: Send + Sync {
    async fn sync_lead(&self, payload: CrmPayload) -> Result<(), IngestError>;
}

/// Accepts lightweight events for dashboard broadcast.
#[async_trait]
pub trait RealtimeNotifier: Send + Sync {
    async fn publish(&self, event: ConversationEvent) -> Result<(), IngestError>;
}

//! In-memory collaborator implementations.
//!
//! Backs the demo binary and the coordinator tests. One hub implements every
//! collaborator trait so a single `Arc<InMemoryHub>` can be cloned into all
//! coordinator slots.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::IngestError;
use crate::ingest::types::{
    BrandConfigProvider, ConversationEvent, ConversationResolver, CrmPayload, CrmSink,
    DeliveryQueue, PlatformEvent, ProcessedCycle, RealtimeNotifier, ReplyJob, ResolvedContext,
    ResultStore, TokenBudget,
};
use crate::pipeline::types::{BrandVoice, ConversationTurn, LeadSnapshot, TurnRole};

struct StoredConversation {
    contact_id: String,
    contact_name: Option<String>,
    conversation_id: String,
    turns: Vec<ConversationTurn>,
    lead: Option<LeadSnapshot>,
}

pub struct InMemoryHub {
    tenant_id: String,
    brand_voice: RwLock<BrandVoice>,
    auto_reply: RwLock<bool>,
    budget: RwLock<Option<TokenBudget>>,
    conversations: RwLock<HashMap<String, StoredConversation>>,
    cycles: RwLock<Vec<ProcessedCycle>>,
    replies: RwLock<Vec<ReplyJob>>,
    crm: RwLock<Vec<CrmPayload>>,
    events: RwLock<Vec<ConversationEvent>>,
}

impl InMemoryHub {
    pub fn new(tenant_id: &str, brand_voice: BrandVoice) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            brand_voice: RwLock::new(brand_voice),
            auto_reply: RwLock::new(true),
            budget: RwLock::new(None),
            conversations: RwLock::new(HashMap::new()),
            cycles: RwLock::new(Vec::new()),
            replies: RwLock::new(Vec::new()),
            crm: RwLock::new(Vec::new()),
            events: RwLock::new(Vec::new()),
        }
    }

    pub async fn set_auto_reply(&self, enabled: bool) {
        *self.auto_reply.write().await = enabled;
    }

    pub async fn set_budget(&self, budget: TokenBudget) {
        *self.budget.write().await = Some(budget);
    }

    pub async fn cycles(&self) -> Vec<ProcessedCycle> {
        self.cycles.read().await.clone()
    }

    pub async fn queued_replies(&self) -> Vec<ReplyJob> {
        self.replies.read().await.clone()
    }

    pub async fn crm_payloads(&self) -> Vec<CrmPayload> {
        self.crm.read().await.clone()
    }

    pub async fn published_events(&self) -> Vec<ConversationEvent> {
        self.events.read().await.clone()
    }

    /// Stored turns for one contact's conversation.
    pub async fn conversation_history(
        &self,
        channel_label: &str,
        sender_id: &str,
    ) -> Vec<ConversationTurn> {
        let key = format!("{channel_label}:{sender_id}");
        self.conversations
            .read()
            .await
            .get(&key)
            .map(|c| c.turns.clone())
            .unwrap_or_default()
    }

    fn conversation_key(event: &PlatformEvent) -> String {
        format!("{}:{}", event.channel.label(), event.sender_id)
    }
}

#[async_trait]
impl ConversationResolver for InMemoryHub {
    async fn resolve(&self, event: &PlatformEvent) -> Result<ResolvedContext, IngestError> {
        let key = Self::conversation_key(event);
        let mut conversations = self.conversations.write().await;

        let conversation = conversations.entry(key).or_insert_with(|| StoredConversation {
            contact_id: Uuid::new_v4().to_string(),
            contact_name: event.sender_name.clone(),
            conversation_id: Uuid::new_v4().to_string(),
            turns: Vec::new(),
            lead: None,
        });

        Ok(ResolvedContext {
            tenant_id: self.tenant_id.clone(),
            contact_id: conversation.contact_id.clone(),
            contact_name: conversation.contact_name.clone(),
            conversation_id: conversation.conversation_id.clone(),
            history: conversation.turns.clone(),
            existing_lead: conversation.lead.clone(),
            token_budget: *self.budget.read().await,
            auto_reply_enabled: *self.auto_reply.read().await,
        })
    }
}

#[async_trait]
impl BrandConfigProvider for InMemoryHub {
    async fn brand_voice(&self, _tenant_id: &str) -> Result<BrandVoice, IngestError> {
        Ok(self.brand_voice.read().await.clone())
    }
}

#[async_trait]
impl ResultStore for InMemoryHub {
    async fn persist(&self, cycle: &ProcessedCycle) -> Result<(), IngestError> {
        let key = Self::conversation_key(&cycle.event);
        let mut conversations = self.conversations.write().await;

        if let Some(conversation) = conversations.get_mut(&key) {
            conversation.turns.push(ConversationTurn {
                role: TurnRole::Contact,
                content: cycle.event.text.clone(),
                timestamp: cycle.event.timestamp,
            });
            if let Some(reply) = &cycle.delivered_reply {
                conversation.turns.push(ConversationTurn {
                    role: TurnRole::AutoReply,
                    content: reply.clone(),
                    timestamp: Utc::now(),
                });
            }
            conversation.lead = Some(LeadSnapshot {
                tag: cycle.output.lead_score.tag,
                score: cycle.output.lead_score.score,
                signals: cycle.output.lead_score.signals.clone(),
            });
        }
        drop(conversations);

        // Atomic budget increment happens at the storage layer.
        if cycle.output.tokens_used > 0 {
            let mut budget = self.budget.write().await;
            if let Some(budget) = budget.as_mut() {
                budget.used_today += cycle.output.tokens_used as u64;
            }
        }

        self.cycles.write().await.push(cycle.clone());
        Ok(())
    }
}

#[async_trait]
impl DeliveryQueue for InMemoryHub {
    async fn enqueue_reply(&self, job: ReplyJob) -> Result<(), IngestError> {
        self.replies.write().await.push(job);
        Ok(())
    }
}

#[async_trait]
impl CrmSink for InMemoryHub {
    async fn sync_lead(&self, payload: CrmPayload) -> Result<(), IngestError> {
        self.crm.write().await.push(payload);
        Ok(())
    }
}

#[async_trait]
impl RealtimeNotifier for InMemoryHub {
    async fn publish(&self, event: ConversationEvent) -> Result<(), IngestError> {
        self.events.write().await.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::pipeline::types::{ChannelType, ContentType};

    fn make_event(id: &str) -> PlatformEvent {
        PlatformEvent {
            channel: ChannelType::Whatsapp,
            platform_message_id: id.into(),
            sender_id: "wa-7".into(),
            sender_name: Some("Sam".into()),
            recipient_id: "biz-1".into(),
            text: "hello".into(),
            content_type: ContentType::Text,
            media_url: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn resolve_creates_then_reuses_conversation() {
        let hub = InMemoryHub::new("t1", BrandVoice::default());
        let first = hub.resolve(&make_event("a")).await.unwrap();
        let second = hub.resolve(&make_event("b")).await.unwrap();
        assert_eq!(first.conversation_id, second.conversation_id);
        assert_eq!(first.contact_id, second.contact_id);
        assert!(second.existing_lead.is_none());
    }

    #[tokio::test]
    async fn distinct_senders_get_distinct_conversations() {
        let hub = InMemoryHub::new("t1", BrandVoice::default());
        let first = hub.resolve(&make_event("a")).await.unwrap();
        let mut other = make_event("c");
        other.sender_id = "wa-8".into();
        let second = hub.resolve(&other).await.unwrap();
        assert_ne!(first.conversation_id, second.conversation_id);
    }
}

//! Ingest coordinator — turns one platform event into one persisted cycle.
//!
//! Flow per event:
//! 1. Dedup by platform message id (queue delivery is at-least-once).
//! 2. Resolve conversation, lead snapshot, and budget; fetch brand voice.
//! 3. Run the decision pipeline.
//! 4. Persist the processed cycle.
//! 5. Fan out: delivery queue (gated), CRM sync, realtime notification.
//!
//! The lead snapshot is resolved immediately before the cycle and written
//! immediately after — per-contact serialization is the caller's concern.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::ingest::dedup::DedupWindow;
use crate::ingest::types::{
    BrandConfigProvider, ConversationEvent, ConversationResolver, CrmPayload, CrmSink,
    DeliveryQueue, PlatformEvent, ProcessedCycle, RealtimeNotifier, ReplyJob, ResultStore,
};
use crate::pipeline::Orchestrator;
use crate::pipeline::types::{
    ClassificationResult, GuardrailVerdict, LeadScore, LeadTag, PipelineDisposition,
    PipelineInput, PipelineOutput, ReplyResult, SentimentResult, Urgency,
};

/// Result of handling one platform event.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Replay within the dedup window; no cycle ran.
    Duplicate,
    Processed {
        disposition: PipelineDisposition,
        requires_human: bool,
        /// Whether a reply was queued for delivery.
        auto_replied: bool,
        /// The tenant's hard-capped budget was already exhausted when the
        /// cycle started.
        budget_exhausted: bool,
        /// Tokens this cycle consumed — the caller applies the atomic
        /// budget increment.
        tokens_used: u32,
    },
}

pub struct IngestCoordinator {
    orchestrator: Arc<Orchestrator>,
    resolver: Arc<dyn ConversationResolver>,
    brand_config: Arc<dyn BrandConfigProvider>,
    store: Arc<dyn ResultStore>,
    delivery: Arc<dyn DeliveryQueue>,
    crm: Arc<dyn CrmSink>,
    notifier: Arc<dyn RealtimeNotifier>,
    dedup: DedupWindow,
    config: IngestConfig,
}

impl IngestCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        resolver: Arc<dyn ConversationResolver>,
        brand_config: Arc<dyn BrandConfigProvider>,
        store: Arc<dyn ResultStore>,
        delivery: Arc<dyn DeliveryQueue>,
        crm: Arc<dyn CrmSink>,
        notifier: Arc<dyn RealtimeNotifier>,
        config: IngestConfig,
    ) -> Self {
        let dedup = DedupWindow::new(config.dedup_window);
        Self {
            orchestrator,
            resolver,
            brand_config,
            store,
            delivery,
            crm,
            notifier,
            dedup,
            config,
        }
    }

    /// Handle one inbound platform event end to end.
    pub async fn handle_event(&self, event: PlatformEvent) -> Result<IngestOutcome, IngestError> {
        // Step 1: dedup before anything else — the pipeline is not
        // idempotent against the surrounding persistence.
        if !self.dedup.insert(&event.dedup_key()) {
            info!(
                channel = %event.channel,
                platform_message_id = %event.platform_message_id,
                "Duplicate event dropped"
            );
            return Ok(IngestOutcome::Duplicate);
        }

        info!(
            channel = %event.channel,
            platform_message_id = %event.platform_message_id,
            sender = %event.sender_id,
            "Processing inbound event"
        );

        // Step 2: resolve state.
        let context = self.resolver.resolve(&event).await?;
        let brand_voice = self.brand_config.brand_voice(&context.tenant_id).await?;

        let budget_exhausted = context
            .token_budget
            .map(|b| b.exhausted())
            .unwrap_or(false);
        if budget_exhausted {
            warn!(
                tenant = %context.tenant_id,
                "Token budget exhausted, cycle proceeds on rule tiers only"
            );
        }

        let message_id = uuid::Uuid::new_v4().to_string();
        let skip = context.history.len().saturating_sub(self.config.history_limit);
        let input = PipelineInput {
            message_id: message_id.clone(),
            tenant_id: context.tenant_id.clone(),
            conversation_id: context.conversation_id.clone(),
            channel: event.channel,
            text: event.text.clone(),
            content_type: event.content_type,
            sender_id: event.sender_id.clone(),
            sender_name: context
                .contact_name
                .clone()
                .or_else(|| event.sender_name.clone()),
            history: context.history[skip..].to_vec(),
            brand_voice,
            existing_lead: context.existing_lead.clone(),
        };

        // Step 3: run the pipeline. `process` is infallible; the spawn
        // boundary additionally contains a panicking component so a single
        // event can never take the worker down.
        let output = {
            let orchestrator = self.orchestrator.clone();
            let pipeline_input = input.clone();
            match tokio::spawn(async move { orchestrator.process(&pipeline_input).await }).await
            {
                Ok(output) => output,
                Err(e) => {
                    error!(
                        message_id = %message_id,
                        error = %e,
                        "Pipeline task failed, substituting safe fallback output"
                    );
                    fallback_output()
                }
            }
        };

        // Step 4/5 gating: a reply ships only when auto-reply is on, the
        // text is non-empty, no human is required, and inbound passed.
        let deliver = context.auto_reply_enabled
            && !output.reply.text.is_empty()
            && !output.reply.requires_human
            && output.guardrail_inbound.passed;

        // Step 4: persist the processed cycle.
        let cycle = ProcessedCycle {
            event: event.clone(),
            tenant_id: context.tenant_id.clone(),
            contact_id: context.contact_id.clone(),
            conversation_id: context.conversation_id.clone(),
            message_id: message_id.clone(),
            output: output.clone(),
            delivered_reply: deliver.then(|| output.reply.text.clone()),
            processed_at: Utc::now(),
        };
        self.store.persist(&cycle).await?;

        // Step 5a: delivery.
        if deliver {
            self.delivery
                .enqueue_reply(ReplyJob {
                    tenant_id: context.tenant_id.clone(),
                    conversation_id: context.conversation_id.clone(),
                    channel: event.channel,
                    recipient_id: event.sender_id.clone(),
                    text: output.reply.text.clone(),
                })
                .await?;
        }

        // Step 5b: CRM sync — best effort, the cycle is already persisted.
        let payload = CrmPayload::build(&event, &context, &output);
        if let Err(e) = self.crm.sync_lead(payload).await {
            warn!(tenant = %context.tenant_id, error = %e, "CRM sync enqueue failed");
        }

        // Step 5c: realtime notification — best effort.
        let preview: String = event.text.chars().take(100).collect();
        let notification = ConversationEvent {
            tenant_id: context.tenant_id.clone(),
            conversation_id: context.conversation_id.clone(),
            message_id,
            contact_name: input.sender_name.clone(),
            preview,
            channel: event.channel,
            lead_tag: output.lead_score.tag.label().to_string(),
            auto_replied: deliver,
        };
        if let Err(e) = self.notifier.publish(notification).await {
            warn!(tenant = %context.tenant_id, error = %e, "Realtime publish failed");
        }

        info!(
            platform_message_id = %event.platform_message_id,
            lead_tag = output.lead_score.tag.label(),
            lead_score = output.lead_score.score,
            disposition = output.disposition.label(),
            auto_replied = deliver,
            elapsed_ms = output.processing_time_ms,
            "Event processed"
        );

        Ok(IngestOutcome::Processed {
            disposition: output.disposition,
            requires_human: output.reply.requires_human,
            auto_replied: deliver,
            budget_exhausted,
            tokens_used: output.tokens_used,
        })
    }
}

/// Minimal safe output when the pipeline task itself dies. Everything is
/// typed, nothing ships, a human gets the conversation.
fn fallback_output() -> PipelineOutput {
    PipelineOutput {
        disposition: PipelineDisposition::Completed,
        guardrail_inbound: GuardrailVerdict {
            passed: true,
            flags: vec!["pipeline_fallback".to_string()],
            risk_score: 0.0,
            blocked_reason: None,
        },
        classification: ClassificationResult::suppressed("Processing failed"),
        sentiment: SentimentResult {
            urgency: Urgency::Medium,
            ..SentimentResult::neutral()
        },
        lead_score: LeadScore {
            intent: "unknown".to_string(),
            confidence: 0.3,
            score: 20,
            tag: LeadTag::Cold,
            signals: vec!["pipeline_fallback".to_string()],
            recommended_action: "monitor".to_string(),
        },
        reply: ReplyResult {
            text: String::new(),
            confidence: 0.0,
            requires_human: true,
            suggested_actions: vec!["escalate_to_human".to_string()],
            tokens_used: 0,
        },
        guardrail_outbound: GuardrailVerdict::clean(),
        processing_time_ms: 0,
        tokens_used: 0,
    }
}

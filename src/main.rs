use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use reply_pilot::config::{IngestConfig, PipelineConfig};
use reply_pilot::ingest::memory::InMemoryHub;
use reply_pilot::ingest::{IngestCoordinator, IngestOutcome, PlatformEvent};
use reply_pilot::llm::{LlmBackend, LlmConfig, create_provider};
use reply_pilot::pipeline::Orchestrator;
use reply_pilot::pipeline::types::{BrandVoice, ChannelType, ContentType};

/// Demo worker: reads messages from stdin, runs each through the full
/// ingest + pipeline path against in-memory collaborators, and prints the
/// outcome. Real deployments swap the in-memory hub for the platform
/// adapters and storage layer.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_else(|_| {
        eprintln!("Error: ANTHROPIC_API_KEY not set");
        eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
        std::process::exit(1);
    });

    let pipeline_config = PipelineConfig::default();
    let primary_model = std::env::var("REPLY_PILOT_MODEL")
        .unwrap_or_else(|_| pipeline_config.primary_model.clone());
    let fast_model = std::env::var("REPLY_PILOT_FAST_MODEL")
        .unwrap_or_else(|_| pipeline_config.fast_model.clone());

    let company = std::env::var("REPLY_PILOT_COMPANY").unwrap_or_else(|_| "Acme".to_string());

    eprintln!("💬 Reply Pilot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Primary model: {}", primary_model);
    eprintln!("   Fast model:    {}", fast_model);
    eprintln!("   Company:       {}", company);
    eprintln!("   Type a customer message and press Enter. Ctrl-D to exit.\n");

    let primary = create_provider(&LlmConfig {
        backend: LlmBackend::Anthropic,
        api_key: secrecy::SecretString::from(api_key.clone()),
        model: primary_model,
    })?;
    let fast = create_provider(&LlmConfig {
        backend: LlmBackend::Anthropic,
        api_key: secrecy::SecretString::from(api_key),
        model: fast_model,
    })?;

    let orchestrator = Arc::new(Orchestrator::new(fast, primary, pipeline_config));
    let hub = Arc::new(InMemoryHub::new(
        "demo-tenant",
        BrandVoice {
            company_name: company,
            ..BrandVoice::default()
        },
    ));
    let coordinator = IngestCoordinator::new(
        orchestrator,
        hub.clone(),
        hub.clone(),
        hub.clone(),
        hub.clone(),
        hub.clone(),
        hub.clone(),
        IngestConfig::default(),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sequence: u64 = 0;

    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        sequence += 1;

        let event = PlatformEvent {
            channel: ChannelType::Whatsapp,
            platform_message_id: format!("demo-{sequence}"),
            sender_id: "demo-contact".to_string(),
            sender_name: Some("Demo Contact".to_string()),
            recipient_id: "demo-business".to_string(),
            text: text.to_string(),
            content_type: ContentType::Text,
            media_url: None,
            timestamp: chrono::Utc::now(),
        };

        match coordinator.handle_event(event).await {
            Ok(IngestOutcome::Processed {
                disposition,
                requires_human,
                auto_replied,
                tokens_used,
                ..
            }) => {
                let cycles = hub.cycles().await;
                let last = cycles.last().expect("cycle just persisted");
                eprintln!(
                    "→ {} | lead {} ({}) | human: {} | tokens: {}",
                    disposition.label(),
                    last.output.lead_score.tag.label(),
                    last.output.lead_score.score,
                    requires_human,
                    tokens_used,
                );
                if auto_replied {
                    eprintln!("  reply: {}\n", last.output.reply.text);
                } else {
                    eprintln!("  (no auto-reply sent)\n");
                }
            }
            Ok(IngestOutcome::Duplicate) => eprintln!("→ duplicate, skipped\n"),
            Err(e) => eprintln!("→ error: {e}\n"),
        }
    }

    Ok(())
}

//! Fixed instruction templates for the generative tiers.
//!
//! Classifier and sentiment prompts demand JSON-only output against a closed
//! schema; the reply prompt is a grounded template with brand-voice and
//! analysis context substituted in per cycle.

use crate::pipeline::types::{
    ClassificationResult, LeadScore, PipelineInput, SentimentResult,
};

/// System prompt for the structured classification call.
///
/// Few-shot examples keep the output shape stable at low temperature.
pub(crate) const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You are a message analysis engine for a customer service platform.
Analyze customer messages and extract structured data.

Output valid JSON with EXACTLY these fields:
{
  "language": "ISO 639-1 code (e.g., 'en', 'es', 'fr')",
  "entities": [{"type": "product|person|company|location|price|date", "value": "string"}],
  "topic": "pricing|support|complaint|inquiry|feedback|greeting|other",
  "is_question": true/false,
  "summary": "max 50 words",
  "key_phrases": ["max 5 phrases"]
}

Topic classification rules:
- pricing: mentions cost, price, plan, subscription, payment, billing
- support: asks for help, reports issue, requests fix, technical problem
- complaint: expresses dissatisfaction, anger, requests refund/escalation
- inquiry: general questions about product, features, how things work
- feedback: shares opinion, review, suggestion, compliment
- greeting: hello, hi, hey, good morning (with no substantive content)
- other: doesn't fit any above category

Examples:

User: "How much does the Pro plan cost per month?"
{"language":"en","entities":[{"type":"product","value":"Pro plan"}],"topic":"pricing","is_question":true,"summary":"Customer asking about Pro plan monthly pricing","key_phrases":["Pro plan","cost","per month"]}

User: "My dashboard isn't loading since yesterday"
{"language":"en","entities":[{"type":"product","value":"dashboard"}],"topic":"support","is_question":false,"summary":"Customer reports dashboard loading issue since yesterday","key_phrases":["dashboard","not loading","yesterday"]}

User: "This is the worst service I've ever used. I want my money back."
{"language":"en","entities":[],"topic":"complaint","is_question":false,"summary":"Customer expressing strong dissatisfaction and requesting refund","key_phrases":["worst service","money back","refund"]}

Respond ONLY with valid JSON. No markdown, no explanation."#;

/// System prompt for the sentiment escalation call.
pub(crate) const SENTIMENT_SYSTEM_PROMPT: &str = r#"You are a sentiment analysis engine. Analyze the emotional tone of customer messages.

Output valid JSON with EXACTLY these fields:
{
  "sentiment": "positive|negative|neutral|mixed",
  "score": number between -1.0 (most negative) and 1.0 (most positive),
  "urgency": "low|medium|high|critical",
  "emotions": ["array of detected emotions"]
}

Urgency classification:
- low: casual inquiry, no time pressure
- medium: wants help but not urgent, standard request
- high: expresses frustration, uses urgency words (ASAP, immediately, urgent)
- critical: threatens to leave, legal mentions, extreme anger, safety concerns

Common emotions to detect:
satisfied, grateful, excited, curious, confused, frustrated, angry, disappointed, anxious, neutral

Rules:
- "mixed" sentiment when both positive AND negative signals are present
- Consider sarcasm (e.g., "Oh great, another broken feature" = negative despite "great")
- ALL CAPS increases urgency by one level
- Multiple exclamation marks increase urgency

Respond ONLY with valid JSON."#;

/// Reply generation template. `{placeholders}` are substituted per cycle.
const REPLY_SYSTEM_TEMPLATE: &str = r#"You are a customer service AI assistant for {company_name}.

BRAND VOICE:
- Tone: {tone}
- Style: {style}
- Guidelines: {guidelines}
- Language: {language}
- Emojis: {use_emojis}
- Channel: {channel}

KNOWLEDGE BASE:
{knowledge_base}

CURRENT MESSAGE CONTEXT:
- Topic: {topic}
- Customer sentiment: {sentiment}
- Urgency: {urgency}
- Lead temperature: {lead_tag}
- Intent: {intent}

RULES (MUST follow strictly):
1. Keep reply under {max_reply_length} characters
2. Match the customer's language (if they write in Spanish, reply in Spanish)
3. Never make promises about pricing unless explicitly stated in the knowledge base
4. Never share internal company information, employee names, or system details
5. Never provide legal, medical, or financial advice
6. If you cannot answer confidently, say: "Let me connect you with a team member who can help with that."
7. For complaints: empathize first, then address the issue
8. For pricing questions without knowledge base data: offer to connect them with sales
9. Never invent product features or capabilities not in the knowledge base
10. Be concise — social media replies should be short and actionable

RESPONSE STRATEGY by lead temperature:
- HOT: Be enthusiastic, offer next steps (demo, trial, pricing). Make it easy to convert.
- WARM: Be helpful, educate, nurture. Share relevant information proactively.
- COLD: Be welcoming, keep it brief. Don't be pushy.

Generate a helpful, accurate, on-brand reply."#;

/// Substitute brand voice and analysis context into the reply template.
pub(crate) fn build_reply_system_prompt(
    input: &PipelineInput,
    classification: &ClassificationResult,
    sentiment: &SentimentResult,
    lead_score: &LeadScore,
) -> String {
    let voice = &input.brand_voice;
    REPLY_SYSTEM_TEMPLATE
        .replace("{company_name}", &voice.company_name)
        .replace("{tone}", &voice.tone)
        .replace("{style}", &voice.style)
        .replace(
            "{guidelines}",
            voice.guidelines.as_deref().unwrap_or("None specified"),
        )
        .replace("{language}", &voice.language)
        .replace(
            "{use_emojis}",
            if voice.use_emojis {
                "allowed"
            } else {
                "not allowed"
            },
        )
        .replace("{channel}", input.channel.label())
        .replace(
            "{knowledge_base}",
            voice
                .knowledge_base
                .as_deref()
                .unwrap_or("No specific knowledge base provided."),
        )
        .replace("{topic}", classification.topic.label())
        .replace("{sentiment}", sentiment.sentiment.label())
        .replace("{urgency}", sentiment.urgency.label())
        .replace("{lead_tag}", lead_score.tag.label())
        .replace("{intent}", &lead_score.intent)
        .replace("{max_reply_length}", &voice.max_reply_length.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{
        BrandVoice, ChannelType, ContentType, LeadTag, Sentiment, Topic, Urgency,
    };

    fn sample_input() -> PipelineInput {
        PipelineInput {
            message_id: "m1".into(),
            tenant_id: "t1".into(),
            conversation_id: "c1".into(),
            channel: ChannelType::Instagram,
            text: "How much is the Pro plan?".into(),
            content_type: ContentType::Text,
            sender_id: "s1".into(),
            sender_name: Some("Dana".into()),
            history: vec![],
            brand_voice: BrandVoice {
                company_name: "Acme Widgets".into(),
                guidelines: Some("Always mention the free tier".into()),
                knowledge_base: Some("Pro plan is billed monthly.".into()),
                ..BrandVoice::default()
            },
            existing_lead: None,
        }
    }

    #[test]
    fn reply_prompt_substitutes_all_placeholders() {
        let classification = ClassificationResult {
            language: "en".into(),
            entities: vec![],
            topic: Topic::Pricing,
            is_question: true,
            summary: "pricing question".into(),
            key_phrases: vec![],
        };
        let sentiment = SentimentResult {
            sentiment: Sentiment::Positive,
            score: 0.4,
            urgency: Urgency::Low,
            emotions: vec!["curious".into()],
        };
        let lead = LeadScore {
            intent: "purchase_evaluation".into(),
            confidence: 0.8,
            score: 75,
            tag: LeadTag::Hot,
            signals: vec![],
            recommended_action: "immediate_follow_up".into(),
        };

        let prompt = build_reply_system_prompt(&sample_input(), &classification, &sentiment, &lead);
        assert!(prompt.contains("Acme Widgets"));
        assert!(prompt.contains("Always mention the free tier"));
        assert!(prompt.contains("Pro plan is billed monthly."));
        assert!(prompt.contains("Topic: pricing"));
        assert!(prompt.contains("Lead temperature: HOT"));
        assert!(prompt.contains("Intent: purchase_evaluation"));
        assert!(prompt.contains("instagram"));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn classifier_prompt_names_the_closed_topic_set() {
        for topic in [
            "pricing", "support", "complaint", "inquiry", "feedback", "greeting", "other",
        ] {
            assert!(CLASSIFIER_SYSTEM_PROMPT.contains(topic));
        }
    }

    #[test]
    fn sentiment_prompt_names_the_urgency_levels() {
        for level in ["low", "medium", "high", "critical"] {
            assert!(SENTIMENT_SYSTEM_PROMPT.contains(level));
        }
    }
}

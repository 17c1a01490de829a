//! Lead scorer — deterministic weighted rule engine.
//!
//! No generative call, ever. Scoring must be consistent, reproducible, and
//! auditable: every contribution appends a machine-readable signal, and the
//! signal list preserves rule evaluation order.

use regex::Regex;

use crate::pipeline::types::{
    ClassificationResult, EntityKind, LeadScore, LeadTag, PipelineInput, Sentiment,
    SentimentResult, Topic,
};

pub struct LeadScorer {
    purchase_intent: Regex,
    availability: Regex,
    urgency: Regex,
    comparison: Regex,
    opt_out: Regex,
    cancellation: Regex,
}

impl LeadScorer {
    pub fn new() -> Self {
        Self {
            purchase_intent: pattern(
                r"(?i)\b(buy|purchase|order|subscribe|sign up|get started|pricing|demo|trial)\b",
            ),
            availability: pattern(
                r"(?i)\b(available|in stock|how soon|when can|delivery|shipping)\b",
            ),
            urgency: pattern(r"(?i)\b(need|asap|urgent|today|right now|immediately)\b"),
            comparison: pattern(r"(?i)\b(compare|vs|versus|alternative|better than|difference)\b"),
            opt_out: pattern(r"(?i)\b(not interested|unsubscribe|stop|remove|spam)\b"),
            cancellation: pattern(r"(?i)\b(cancel|refund|return|exchange)\b"),
        }
    }

    /// Score a lead from message content, analysis output, and history.
    pub fn score(
        &self,
        input: &PipelineInput,
        classification: &ClassificationResult,
        sentiment: &SentimentResult,
    ) -> LeadScore {
        let mut score: i32 = 0;
        let mut signals: Vec<String> = Vec::new();
        let mut intent = "unknown".to_string();

        // Topic contribution.
        match classification.topic {
            Topic::Pricing => {
                score += 30;
                signals.push("pricing_inquiry".into());
                intent = "purchase_evaluation".into();
            }
            Topic::Inquiry => {
                score += 20;
                signals.push("product_inquiry".into());
                intent = "information_seeking".into();
            }
            Topic::Support => {
                score += 10;
                signals.push("support_request".into());
                intent = "support".into();
            }
            Topic::Complaint => {
                score -= 10;
                signals.push("complaint".into());
                intent = "complaint_resolution".into();
            }
            Topic::Feedback => {
                score += 15;
                signals.push("feedback".into());
                intent = "engagement".into();
            }
            Topic::Greeting => {
                score += 5;
                signals.push("initial_contact".into());
                intent = "initial_contact".into();
            }
            Topic::Other => {}
        }

        if classification.is_question {
            score += 5;
            signals.push("active_inquiry".into());
        }

        // Entity contribution — product and price mentions overwrite intent.
        for entity in &classification.entities {
            match entity.kind {
                EntityKind::Product => {
                    score += 15;
                    signals.push(format!("product_mention:{}", entity.value));
                    intent = "product_interest".into();
                }
                EntityKind::Price => {
                    score += 20;
                    signals.push("price_mention".into());
                    intent = "purchase_evaluation".into();
                }
                _ => {}
            }
        }

        // Keyword contribution against the raw lowercase text.
        let text = input.text.to_lowercase();

        if self.purchase_intent.is_match(&text) {
            score += 25;
            signals.push("high_intent_keyword".into());
            intent = "purchase_intent".into();
        }
        if self.availability.is_match(&text) {
            score += 15;
            signals.push("availability_inquiry".into());
        }
        if self.urgency.is_match(&text) {
            score += 15;
            signals.push("urgency_language".into());
        }
        if self.comparison.is_match(&text) {
            score += 10;
            signals.push("comparison_shopping".into());
            intent = "evaluation".into();
        }
        if self.opt_out.is_match(&text) {
            score -= 30;
            signals.push("negative_intent".into());
            intent = "opt_out".into();
        }
        if self.cancellation.is_match(&text) {
            score -= 15;
            signals.push("cancellation_signal".into());
            intent = "cancellation".into();
        }

        // Sentiment contribution.
        match sentiment.sentiment {
            Sentiment::Positive => {
                score += 10;
                signals.push("positive_sentiment".into());
            }
            Sentiment::Negative => {
                score -= 10;
                signals.push("negative_sentiment".into());
            }
            _ => {}
        }

        // Engagement — both thresholds can fire.
        let contact_turns = input.contact_turns();
        if contact_turns >= 3 {
            score += 15;
            signals.push("repeat_engagement".into());
        }
        if contact_turns >= 5 {
            score += 10;
            signals.push("high_engagement".into());
        }

        // Momentum: a previously-WARM lead showing fresh signal gets a bonus
        // before blending 70/30 with its prior score.
        if let Some(prior) = &input.existing_lead {
            if prior.tag == LeadTag::Warm && score > 30 {
                score += 10;
                signals.push("warming_up".into());
            }
            score = (score as f32 * 0.7 + prior.score as f32 * 0.3).round() as i32;
        }

        let score = score.clamp(0, 100) as u8;
        let tag = LeadTag::from_score(score);
        let recommended_action = match tag {
            LeadTag::Hot => "immediate_follow_up",
            LeadTag::Warm => "nurture_campaign",
            LeadTag::Cold => "monitor",
        };

        let confidence = (0.5 + 0.08 * signals.len() as f32).min(1.0);

        LeadScore {
            intent,
            confidence,
            score,
            tag,
            signals,
            recommended_action: recommended_action.to_string(),
        }
    }
}

impl Default for LeadScorer {
    fn default() -> Self {
        Self::new()
    }
}

fn pattern(p: &str) -> Regex {
    Regex::new(p).expect("static lead-scoring pattern")
}

//! Deterministic human-escalation rules.
//!
//! Evaluated after analysis but before reply generation; a match skips the
//! generative reply entirely, so legally sensitive content never gets an
//! automated answer.

use regex::Regex;

use crate::pipeline::types::{PipelineInput, Sentiment, SentimentResult, TurnRole, Urgency};

/// Contact turns in recent history that mark a thread stale and unresolved.
const STALE_THREAD_TURNS: usize = 4;

/// How many trailing contact turns count toward staleness.
const STALE_THREAD_WINDOW: usize = 5;

pub struct EscalationRules {
    human_request: Vec<Regex>,
    legal: Vec<Regex>,
}

impl EscalationRules {
    pub fn new() -> Self {
        Self {
            human_request: compile(&[
                r"(?i)speak.*(human|person|agent|someone|representative)",
                r"(?i)talk.*(human|person|agent|someone|representative)",
                r"(?i)real (person|human)",
                r"(?i)transfer.*agent",
                r"(?i)customer (service|support)",
            ]),
            legal: compile(&[
                r"(?i)\b(lawyer|attorney|legal|lawsuit|sue|court)\b",
                r"(?i)\b(gdpr|privacy)\b|data (deletion|removal)",
                r"(?i)\b(refund|chargeback|dispute)\b",
            ]),
        }
    }

    /// Check whether the cycle must be handed to a human.
    ///
    /// Returns the triggering rule's tag, or `None` to continue with reply
    /// generation.
    pub fn check(
        &self,
        input: &PipelineInput,
        sentiment: &SentimentResult,
    ) -> Option<&'static str> {
        if sentiment.urgency == Urgency::Critical && sentiment.sentiment == Sentiment::Negative {
            return Some("critical_negative_sentiment");
        }

        if self.human_request.iter().any(|p| p.is_match(&input.text)) {
            return Some("human_requested");
        }

        if self.legal.iter().any(|p| p.is_match(&input.text)) {
            return Some("legal_compliance");
        }

        // Long unresolved conversation: several customer messages in the
        // recent window without resolution.
        let recent_contact = input
            .history
            .iter()
            .rev()
            .filter(|t| t.role == TurnRole::Contact)
            .take(STALE_THREAD_WINDOW)
            .count();
        if recent_contact >= STALE_THREAD_TURNS {
            return Some("stale_unresolved_thread");
        }

        None
    }
}

impl Default for EscalationRules {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static escalation pattern"))
        .collect()
}

//! Guardrail evaluator — rule-based risk gate for inbound text and
//! outbound drafts.
//!
//! Pure text matching, no network calls. Risk is additive per category and
//! capped at 1.0. Inbound blocks at risk ≥ 0.7, outbound at ≥ 0.5; the
//! asymmetry is tuned, not accidental. Every input yields a verdict.

use regex::Regex;
use tracing::debug;

use crate::pipeline::types::{ChannelType, GuardrailVerdict, Topic};

/// Inbound risk needed to block.
pub const INBOUND_BLOCK_THRESHOLD: f32 = 0.7;

/// Outbound risk needed to block.
pub const OUTBOUND_BLOCK_THRESHOLD: f32 = 0.5;

/// A guardrail rule category: any pattern match raises the flag.
///
/// Non-compounding categories contribute `weight` once no matter how many
/// patterns match; compounding categories add `weight` per matching pattern.
struct RuleCategory {
    flag: &'static str,
    weight: f32,
    patterns: Vec<Regex>,
    compounding: bool,
}

impl RuleCategory {
    /// Risk contribution for `text`, with the triggered flag if any.
    fn score(&self, text: &str) -> Option<(f32, &'static str)> {
        if self.compounding {
            let hits = self.patterns.iter().filter(|p| p.is_match(text)).count();
            if hits > 0 {
                return Some((self.weight * hits as f32, self.flag));
            }
        } else if self.patterns.iter().any(|p| p.is_match(text)) {
            return Some((self.weight, self.flag));
        }
        None
    }
}

/// Rule-based risk gate. Construct once, evaluate per message.
pub struct GuardrailEvaluator {
    inbound_rules: Vec<RuleCategory>,
    outbound_rules: Vec<RuleCategory>,
}

impl GuardrailEvaluator {
    pub fn new() -> Self {
        let inbound_rules = vec![
            RuleCategory {
                flag: "prompt_injection",
                weight: 0.8,
                compounding: false,
                patterns: compile(&[
                    r"(?i)ignore\s+(all\s+)?previous\s+instructions",
                    r"(?i)ignore\s+(all\s+)?above\s+instructions",
                    r"(?i)system\s*:\s*",
                    r"(?i)you\s+are\s+now\s+",
                    r"(?i)pretend\s+you\s+are",
                    r"(?i)forget\s+(everything|all|your)",
                    r"(?i)new\s+instructions?\s*:",
                    r"(?i)override\s+(previous|your|all)",
                    r"(?i)jailbreak",
                    r"(?i)\[system\]",
                    r"(?i)\[instruction\]",
                    r"(?i)DAN\s+mode",
                ]),
            },
            RuleCategory {
                flag: "spam",
                weight: 0.5,
                compounding: false,
                patterns: compile(&[
                    // Multiple URLs
                    r"(?i)(https?://\S+\s*){3,}",
                    // URL shorteners
                    r"(?i)(bit\.ly|tinyurl|t\.co|goo\.gl)",
                    // Marketing keyword pairs
                    r"(?i)(buy|cheap|discount|free|click|winner|congratulations).*(buy|cheap|discount|free|click|winner)",
                    // ALL CAPS blocks
                    r"\b[A-Z\s]{20,}\b",
                ]),
            },
            RuleCategory {
                flag: "profanity",
                weight: 0.2,
                compounding: false,
                patterns: profanity_patterns(),
            },
        ];

        let outbound_rules = vec![
            RuleCategory {
                flag: "pii_leak",
                weight: 0.9,
                compounding: false,
                patterns: compile(&[
                    // SSN
                    r"\b\d{3}[-.]?\d{2}[-.]?\d{4}\b",
                    // Credit card
                    r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b",
                    // Email address
                    r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
                    // Phone number
                    r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b",
                ]),
            },
            // Promise patterns compound per match, unlike every other
            // category.
            RuleCategory {
                flag: "dangerous_promise",
                weight: 0.4,
                compounding: true,
                patterns: compile(&[
                    r"(?i)guarantee",
                    r"(?i)100%\s*(refund|money\s*back)",
                    r"(?i)lawsuit|legal\s*action",
                    r"(?i)free\s*(forever|lifetime)",
                    r"(?i)\$\d+.*(off|discount)",
                ]),
            },
            RuleCategory {
                flag: "profanity_in_output",
                weight: 0.8,
                compounding: false,
                patterns: profanity_patterns(),
            },
        ];

        Self {
            inbound_rules,
            outbound_rules,
        }
    }

    /// Gate an inbound customer message.
    pub fn evaluate_inbound(
        &self,
        text: &str,
        channel: ChannelType,
        sender_id: &str,
    ) -> GuardrailVerdict {
        let mut flags = Vec::new();
        let mut risk: f32 = 0.0;

        for category in &self.inbound_rules {
            if let Some((weight, flag)) = category.score(text) {
                flags.push(flag.to_string());
                risk += weight;
            }
        }

        // Repeated-character runs (regex crate has no backreferences).
        if has_repeated_run(text, 11) && !flags.iter().any(|f| f == "spam") {
            flags.push("spam".to_string());
            risk += 0.5;
        }

        if text.len() > 5000 {
            flags.push("excessive_length".to_string());
            risk += 0.3;
        }

        if text.trim().is_empty() {
            flags.push("empty_message".to_string());
            risk += 0.1;
        }

        let verdict = finish(flags, risk, INBOUND_BLOCK_THRESHOLD, "Blocked");
        if !verdict.passed {
            debug!(
                channel = %channel,
                sender = %sender_id,
                risk = verdict.risk_score,
                flags = ?verdict.flags,
                "Inbound message blocked"
            );
        }
        verdict
    }

    /// Gate a generated reply before it can ship.
    pub fn evaluate_outbound(&self, text: &str, topic: Topic) -> GuardrailVerdict {
        let mut flags = Vec::new();
        let mut risk: f32 = 0.0;

        for category in &self.outbound_rules {
            if let Some((weight, flag)) = category.score(text) {
                flags.push(flag.to_string());
                risk += weight;
            }
        }

        if text.len() > 2000 {
            flags.push("excessive_length".to_string());
            risk += 0.2;
        }

        if text.trim().is_empty() {
            flags.push("empty_response".to_string());
            risk += 1.0;
        }

        let verdict = finish(flags, risk, OUTBOUND_BLOCK_THRESHOLD, "Output blocked");
        if !verdict.passed {
            debug!(
                topic = topic.label(),
                risk = verdict.risk_score,
                flags = ?verdict.flags,
                "Generated reply failed outbound guardrail"
            );
        }
        verdict
    }
}

impl Default for GuardrailEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn finish(flags: Vec<String>, risk: f32, threshold: f32, prefix: &str) -> GuardrailVerdict {
    let risk_score = risk.min(1.0);
    let passed = risk_score < threshold;
    let blocked_reason = if passed {
        None
    } else {
        Some(format!("{}: {}", prefix, flags.join(", ")))
    };
    GuardrailVerdict {
        passed,
        flags,
        risk_score,
        blocked_reason,
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static guardrail pattern"))
        .collect()
}

/// Abbreviated list — production would use a comprehensive lexicon.
fn profanity_patterns() -> Vec<Regex> {
    compile(&[r"(?i)\b(fuck|shit|damn|bitch|ass(hole)?|bastard|crap)\b"])
}

/// True if `text` contains `run_len` or more identical consecutive chars.
fn has_repeated_run(text: &str, run_len: usize) -> bool {
    let mut last = None;
    let mut run = 0usize;
    for c in text.chars() {
        if Some(c) == last {
            run += 1;
            if run >= run_len {
                return true;
            }
        } else {
            last = Some(c);
            run = 1;
        }
    }
    false
}

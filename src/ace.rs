//! Adversarial Confidence Estimation (ACE) scoring. Ported directly from
//! the upstream ACE evaluator's weighted robustness model.

use crate::config::AceSettings;
use crate::market_context::{DebateTrace, RiskStatus};
use once_cell::sync::Lazy;
use regex::Regex;

static RESOLVED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(addressed|resolved|fixed)\b").unwrap());
static NEGATED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(not|never|un|failed to)\b").unwrap());

pub struct AceEvaluator {
    base_score: f64,
    settings: AceSettings,
}

impl AceEvaluator {
    pub fn new(settings: AceSettings) -> Self {
        AceEvaluator { base_score: 1.0, settings }
    }

    /// Computes the robustness score for a finished debate. Empty traces
    /// short-circuit: 1.0 if approved outright, 0.5 otherwise.
    pub fn calculate_score(&self, trace: &DebateTrace, final_status: &RiskStatus) -> f64 {
        if trace.is_empty() {
            return if *final_status == RiskStatus::Approved { 1.0 } else { 0.5 };
        }

        let mut score = self.base_score;
        let num_rebuttals = trace.len() as f64 - 1.0;
        score -= num_rebuttals * self.settings.turn_penalty;

        match final_status {
            RiskStatus::Blocked => score *= self.settings.block_factor,
            RiskStatus::Flagged => score *= self.settings.flag_factor,
            RiskStatus::Approved => {}
        }

        for turn in trace {
            let refutation = turn.refutation.to_lowercase();
            if RESOLVED_RE.is_match(&refutation) && !NEGATED_RE.is_match(&refutation) {
                score += self.settings.resolution_bonus;
            }
        }

        score.clamp(0.0, 1.0)
    }

    pub fn robustness_label(&self, score: f64) -> &'static str {
        if score >= 0.85 {
            "Battle-Tested"
        } else if score >= 0.70 {
            "Verified"
        } else if score >= 0.50 {
            "Cautionary"
        } else {
            "High-Entropy"
        }
    }
}

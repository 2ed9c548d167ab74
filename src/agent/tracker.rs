//! Context budget tracking
//!
//! Runs once at the end of a turn. Folds the token counts the completion
//! service reported for the final assistant turn into the thread totals and
//! writes an advisory turn when usage climbs into a warning band.

use serde::Serialize;

use crate::agent::state::{ConversationState, StatePatch, TokenTotals};
use crate::core::Message;

/// Usage band of the context window
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageBand {
    Normal,
    Informational,
    Warning,
    Critical,
}

impl UsageBand {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 95.0 {
            UsageBand::Critical
        } else if percentage >= 80.0 {
            UsageBand::Warning
        } else if percentage >= 60.0 {
            UsageBand::Informational
        } else {
            UsageBand::Normal
        }
    }

    /// Bands that write an advisory turn
    pub fn needs_advisory(&self) -> bool {
        matches!(self, UsageBand::Warning | UsageBand::Critical)
    }
}

/// Token accounting for one completed turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub interaction_tokens: u64,
    pub total_tokens: u64,
    pub context_limit: u64,
    pub usage_percentage: f64,
    pub remaining_tokens: u64,
    pub band: UsageBand,
    /// False when the service reported no counts for this turn
    pub available: bool,
}

impl UsageReport {
    /// Text bar such as `[████----] 12.5% (LOW)`
    pub fn progress_bar(&self, width: usize) -> String {
        let ratio = (self.usage_percentage / 100.0).clamp(0.0, 1.0);
        let filled = (ratio * width as f64) as usize;
        let label = if self.usage_percentage < 50.0 {
            "LOW"
        } else if self.usage_percentage < 80.0 {
            "MEDIUM"
        } else {
            "HIGH"
        };
        format!(
            "[{}{}] {:.1}% ({})",
            "█".repeat(filled),
            "-".repeat(width - filled),
            self.usage_percentage,
            label
        )
    }
}

fn percentage(total: u64, limit: u64) -> f64 {
    if limit == 0 {
        0.0
    } else {
        total as f64 * 100.0 / limit as f64
    }
}

pub struct ContextTracker {
    context_limit: u64,
}

impl ContextTracker {
    pub fn new(context_limit: u64) -> Self {
        Self { context_limit }
    }

    /// Graph node: accumulate counts and maybe write an advisory
    pub fn update(&self, state: &ConversationState) -> (StatePatch, UsageReport) {
        let limit = if state.context_limit > 0 {
            state.context_limit
        } else {
            self.context_limit
        };
        let previous_band = UsageBand::from_percentage(percentage(state.total_tokens, limit));

        let usage = state.last_assistant_message().and_then(|m| m.usage);
        let Some(usage) = usage.filter(|u| u.total_tokens() > 0) else {
            tracing::warn!(thread_id = %state.thread_id, "token tracking unavailable, no counts reported");
            let report = UsageReport {
                prompt_tokens: 0,
                completion_tokens: 0,
                interaction_tokens: 0,
                total_tokens: state.total_tokens,
                context_limit: limit,
                usage_percentage: percentage(state.total_tokens, limit),
                remaining_tokens: limit.saturating_sub(state.total_tokens),
                band: previous_band,
                available: false,
            };
            return (StatePatch::new(), report);
        };

        let totals = TokenTotals {
            prompt_tokens: state.total_prompt_tokens + usage.prompt_tokens,
            completion_tokens: state.total_completion_tokens + usage.completion_tokens,
            total_tokens: state.total_tokens + usage.total_tokens(),
        };
        let usage_percentage = percentage(totals.total_tokens, limit);
        let remaining_tokens = limit.saturating_sub(totals.total_tokens);
        let band = UsageBand::from_percentage(usage_percentage);

        let report = UsageReport {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            interaction_tokens: usage.total_tokens(),
            total_tokens: totals.total_tokens,
            context_limit: limit,
            usage_percentage,
            remaining_tokens,
            band,
            available: true,
        };

        tracing::debug!(
            thread_id = %state.thread_id,
            interaction = report.interaction_tokens,
            total = totals.total_tokens,
            percentage = usage_percentage,
            "tokens tracked"
        );

        let mut patch = StatePatch {
            totals: Some(totals),
            ..StatePatch::default()
        };

        // One advisory per band entered; staying in a band does not repeat it.
        if band.needs_advisory() && band > previous_band {
            tracing::warn!(thread_id = %state.thread_id, ?band, "context usage advisory");
            patch.append.push(Message::system(advisory(band, usage_percentage, remaining_tokens)));
        } else if band == UsageBand::Informational {
            tracing::info!(
                thread_id = %state.thread_id,
                "context usage is moderate ({:.1}%, {} tokens remaining)",
                usage_percentage,
                remaining_tokens
            );
        }

        (patch, report)
    }
}

fn advisory(band: UsageBand, usage_percentage: f64, remaining_tokens: u64) -> String {
    match band {
        UsageBand::Critical => format!(
            "CRITICAL: Context nearly full ({:.1}%, {} tokens remaining). Consider starting a new conversation.",
            usage_percentage, remaining_tokens
        ),
        _ => format!(
            "WARNING: Context usage is high ({:.1}%, {} tokens remaining).",
            usage_percentage, remaining_tokens
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Role, ThreadId, TokenUsage};

    fn state_after_answer(total_so_far: u64, usage: Option<TokenUsage>) -> ConversationState {
        let mut state = ConversationState::new(ThreadId::from("t"), 1000);
        state.total_tokens = total_so_far;
        state.total_prompt_tokens = total_so_far;
        state.begin_turn("question");
        state.messages.push(Message::assistant("answer").with_usage(usage));
        state
    }

    #[test]
    fn test_bands() {
        assert_eq!(UsageBand::from_percentage(10.0), UsageBand::Normal);
        assert_eq!(UsageBand::from_percentage(60.0), UsageBand::Informational);
        assert_eq!(UsageBand::from_percentage(79.9), UsageBand::Informational);
        assert_eq!(UsageBand::from_percentage(80.0), UsageBand::Warning);
        assert_eq!(UsageBand::from_percentage(94.9), UsageBand::Warning);
        assert_eq!(UsageBand::from_percentage(95.0), UsageBand::Critical);
    }

    #[test]
    fn test_accumulates_totals() {
        let tracker = ContextTracker::new(1000);
        let state = state_after_answer(100, Some(TokenUsage::new(150, 50)));
        let (patch, report) = tracker.update(&state);
        let totals = patch.totals.unwrap();
        assert_eq!(totals.total_tokens, 300);
        assert_eq!(totals.prompt_tokens, 250);
        assert_eq!(totals.completion_tokens, 50);
        assert_eq!(report.interaction_tokens, 200);
        assert!((report.usage_percentage - 30.0).abs() < 1e-9);
        assert_eq!(report.remaining_tokens, 700);
        assert!(patch.append.is_empty());
    }

    #[test]
    fn test_missing_usage_leaves_counters() {
        let tracker = ContextTracker::new(1000);
        let state = state_after_answer(100, None);
        let (patch, report) = tracker.update(&state);
        assert!(patch.is_empty());
        assert!(!report.available);
        assert_eq!(report.total_tokens, 100);
    }

    #[test]
    fn test_warning_then_critical() {
        let tracker = ContextTracker::new(1000);

        let (patch, report) = tracker.update(&state_after_answer(700, Some(TokenUsage::new(100, 20))));
        assert_eq!(report.band, UsageBand::Warning);
        assert_eq!(patch.append.len(), 1);
        assert_eq!(patch.append[0].role, Role::System);
        assert!(patch.append[0].content.starts_with("WARNING"));

        let (patch, report) = tracker.update(&state_after_answer(900, Some(TokenUsage::new(50, 10))));
        assert_eq!(report.band, UsageBand::Critical);
        assert_eq!(patch.append.len(), 1);
        assert!(patch.append[0].content.starts_with("CRITICAL"));
    }

    #[test]
    fn test_no_repeat_within_band() {
        let tracker = ContextTracker::new(1000);
        let (patch, _) = tracker.update(&state_after_answer(820, Some(TokenUsage::new(10, 10))));
        assert!(patch.append.is_empty());
    }

    #[test]
    fn test_progress_bar() {
        let report = UsageReport {
            prompt_tokens: 0,
            completion_tokens: 0,
            interaction_tokens: 0,
            total_tokens: 250,
            context_limit: 1000,
            usage_percentage: 25.0,
            remaining_tokens: 750,
            band: UsageBand::Normal,
            available: true,
        };
        assert_eq!(report.progress_bar(8), "[██------] 25.0% (LOW)");
    }
}

//! Pre-filter for small talk
//!
//! Whole-message pattern matching over a closed taxonomy of conversational
//! intents. A match answers with a canned reply and skips the model entirely,
//! so "hi, what is fuse 33 for?" still reaches the orchestrator.

use regex::Regex;

use crate::agent::state::{ConversationState, StatePatch};
use crate::core::{DocentError, Message, Result};

/// Conversational intents answered without the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    Thanks,
    Acknowledgment,
    Farewell,
    Affirmation,
    Negation,
}

/// Result of classifying one user turn
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: Option<Intent>,
    pub canned: Option<String>,
}

impl Classification {
    pub fn is_conversational(&self) -> bool {
        self.intent.is_some()
    }
}

// Order matters: "great thanks" must classify as thanks, not acknowledgment.
const PATTERNS: &[(Intent, &str)] = &[
    (Intent::Greeting, r"^(hi|hello|hey|sup|yo|howdy)[\s!.]*$"),
    (
        Intent::Thanks,
        r"^(thank you|thanks|thx|ty|thank u|tysm|appreciate it)[\s!.]*$",
    ),
    (
        Intent::Thanks,
        r"^(great|ok|okay|cool|nice|perfect|awesome)[\s,!.]*(thank you|thanks|thx)[\s!.]*$",
    ),
    (
        Intent::Acknowledgment,
        r"^(great|ok|okay|got it|cool|nice|perfect|awesome|excellent)[\s!.]*$",
    ),
    (
        Intent::Farewell,
        r"^(bye|goodbye|see you|later|cya|take care)[\s!.]*$",
    ),
    (Intent::Affirmation, r"^(yes|yeah|yep|yup|sure|alright)[\s!.]*$"),
    (Intent::Negation, r"^(no|nope|nah)[\s!.]*$"),
];

/// Small-talk filter parameterized by the document's short name
pub struct PreFilter {
    short_name: String,
    patterns: Vec<(Intent, Regex)>,
}

impl PreFilter {
    pub fn new(short_name: impl Into<String>) -> Result<Self> {
        let patterns = PATTERNS
            .iter()
            .map(|(intent, pattern)| {
                Regex::new(pattern)
                    .map(|re| (*intent, re))
                    .map_err(|e| DocentError::config(format!("Invalid pre-filter pattern: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            short_name: short_name.into(),
            patterns,
        })
    }

    /// Classify a single user turn. Pure.
    pub fn classify(&self, text: &str) -> Classification {
        let normalized = text.trim().to_lowercase();
        let intent = self
            .patterns
            .iter()
            .find(|(_, re)| re.is_match(&normalized))
            .map(|(intent, _)| *intent);

        Classification {
            intent,
            canned: intent.map(|i| self.canned_reply(i)),
        }
    }

    fn canned_reply(&self, intent: Intent) -> String {
        let name = &self.short_name;
        match intent {
            Intent::Greeting => format!("Hello! How can I help you with your {} today?", name),
            Intent::Thanks => format!(
                "You're welcome! Let me know if you have any other questions about your {}!",
                name
            ),
            Intent::Acknowledgment => {
                "Great! Let me know if there's anything else I can help with.".to_string()
            }
            Intent::Farewell => format!("Goodbye! Come back anytime you have {} questions!", name),
            Intent::Affirmation => "Got it! Anything else you'd like to know?".to_string(),
            Intent::Negation => "No problem! Let me know if you need anything.".to_string(),
        }
    }

    /// Graph node: answer small talk directly or let the turn through
    pub fn run(&self, state: &ConversationState) -> StatePatch {
        let classification = state
            .last_user_message()
            .map(|m| self.classify(&m.content));

        match classification {
            Some(Classification {
                intent: Some(intent),
                canned: Some(reply),
            }) => {
                tracing::info!(thread_id = %state.thread_id, ?intent, "conversational turn, bypassing agent");
                StatePatch {
                    bypass_agent: Some(true),
                    ..StatePatch::new().append(Message::assistant(reply))
                }
            }
            _ => {
                tracing::debug!(thread_id = %state.thread_id, "domain question, proceeding to agent");
                StatePatch {
                    bypass_agent: Some(false),
                    ..StatePatch::default()
                }
            }
        }
    }
}

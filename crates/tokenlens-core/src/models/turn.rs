//! Turn models for agent conversation logs
//!
//! A [`Turn`] is one message in a session: its role, ordered content
//! parts and, for assistant turns, an optional provider telemetry
//! snapshot. The engine only reads turns; it never mutates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Default for Role {
    fn default() -> Self {
        Self::User
    }
}

/// Completion status of a tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Completed,
    Error,
    Pending,
}

/// One content part inside a turn
///
/// Providers interleave free text, reasoning ("thinking") text and tool
/// invocation records inside a single message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        #[serde(default)]
        text: String,
    },
    Reasoning {
        #[serde(default)]
        text: String,
    },
    ToolCall {
        /// Tool name (e.g., "read", "bash", "edit")
        name: String,
        status: ToolStatus,
        /// Tool output, present for completed calls
        #[serde(default)]
        output: String,
    },
}

/// Provider-reported usage attached to an assistant turn
///
/// These figures are authoritative but partial: the provider reports
/// token buckets and cost, but never echoes the system prompt back, so
/// the system-prompt share of input has to be inferred downstream.
///
/// Field aliases accept the raw Anthropic JSONL spellings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Telemetry {
    /// Fresh input tokens, not served from any cache
    #[serde(default)]
    pub input_tokens: u64,

    #[serde(default)]
    pub output_tokens: u64,

    /// Reasoning ("thinking") tokens, billed as output
    #[serde(default)]
    pub reasoning_tokens: u64,

    /// Tokens read from cache (from cache_read_input_tokens in JSONL)
    #[serde(default, alias = "cache_read_input_tokens")]
    pub cache_read_tokens: u64,

    /// Tokens written to cache (from cache_creation_input_tokens in JSONL)
    #[serde(default, alias = "cache_creation_input_tokens")]
    pub cache_write_tokens: u64,

    /// Provider-reported cost in USD (0.0 on subscription plans)
    #[serde(default, alias = "cost")]
    pub cost_usd: f64,

    /// Provider identity (e.g., "anthropic", "openai", "openrouter")
    #[serde(default)]
    pub provider_id: Option<String>,

    /// Model identity, possibly provider-prefixed (e.g., "anthropic/claude-sonnet-4")
    #[serde(default)]
    pub model_id: Option<String>,
}

impl Telemetry {
    /// Sum of all token buckets
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens
            + self.output_tokens
            + self.reasoning_tokens
            + self.cache_read_tokens
            + self.cache_write_tokens
    }
}

/// A single conversation turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    #[serde(default)]
    pub role: Role,

    /// Ordered content parts
    #[serde(default)]
    pub parts: Vec<ContentPart>,

    /// Provider telemetry snapshot (assistant turns only)
    #[serde(default)]
    pub telemetry: Option<Telemetry>,

    /// System prompts attached to this turn by the agent runtime
    ///
    /// Some runtimes record the system-prompt array on the assistant
    /// turn that used it rather than as a separate system turn.
    #[serde(default)]
    pub system_prompts: Vec<String>,

    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Turn {
    /// Convenience constructor for a plain text turn
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![ContentPart::Text { text: text.into() }],
            ..Default::default()
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Concatenated free-text content of this turn
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let ContentPart::Text { text } = part {
                if !text.is_empty() {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
            }
        }
        out
    }

    /// Iterator over non-empty reasoning parts
    pub fn reasoning_parts(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            ContentPart::Reasoning { text } if !text.trim().is_empty() => Some(text.as_str()),
            _ => None,
        })
    }

    /// Iterator over completed tool calls as (name, output) pairs
    pub fn completed_tool_calls(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parts.iter().filter_map(|p| match p {
            ContentPart::ToolCall {
                name,
                status: ToolStatus::Completed,
                output,
            } => Some((name.as_str(), output.as_str())),
            _ => None,
        })
    }
}

//! Tokenizer policy selection and resolution
//!
//! Token counting is pluggable: the engine picks one [`TokenizerPolicy`]
//! per analysis (newest assistant turn wins), then counts every category
//! through the [`TokenResolver`], which caches encoder instances for the
//! process lifetime and falls back to a character heuristic on any
//! backend failure. Counting must never abort an analysis.

pub mod resolver;
pub mod selector;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use resolver::{ApproxEncoder, TokenEncoder, TokenResolver};
pub use selector::select_policy;

/// Tokenizer policy for a whole analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenizerPolicy {
    /// Exact BPE encoder for an OpenAI-style model name
    OpenAi { model: String },
    /// Transformer-hub tokenizer repo (e.g., "Xenova/claude-tokenizer")
    Hub { repo: String },
    /// Length-based approximation, used when nothing better matches
    Approximate,
}

impl TokenizerPolicy {
    /// Stable cache key for the encoder instance cache
    pub fn cache_key(&self) -> String {
        match self {
            Self::OpenAi { model } => format!("openai:{model}"),
            Self::Hub { repo } => format!("hub:{repo}"),
            Self::Approximate => "approx".to_string(),
        }
    }
}

impl fmt::Display for TokenizerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi { model } => write!(f, "tiktoken ({model})"),
            Self::Hub { repo } => write!(f, "hub ({repo})"),
            Self::Approximate => write!(f, "approximate (chars/4)"),
        }
    }
}

//! Token counting with cached encoders and a heuristic fallback
//!
//! Exact counting uses tiktoken BPE encoders. Hub policies count through
//! the closest tiktoken vocabulary (cl100k) unless the caller injects a
//! real backend through [`TokenResolver::register`]; modern BPE vocabs
//! are close enough for accounting purposes, and the reconciler corrects
//! against provider telemetry anyway.

use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use tracing::{debug, warn};

use super::TokenizerPolicy;

/// A pluggable token-counting backend
pub trait TokenEncoder: Send + Sync {
    /// Count tokens in `text`. May fail (e.g., lazy model data missing);
    /// the resolver absorbs failures with the approximate fallback.
    fn count(&self, text: &str) -> Result<usize>;
}

/// Length-based approximation: ceil(chars / 4)
pub struct ApproxEncoder;

impl TokenEncoder for ApproxEncoder {
    fn count(&self, text: &str) -> Result<usize> {
        Ok(approx_count(text))
    }
}

fn approx_count(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// tiktoken-backed exact encoder
struct TiktokenEncoder {
    bpe: tiktoken_rs::CoreBPE,
}

impl TiktokenEncoder {
    /// Build an encoder for an OpenAI-style model name, falling back to
    /// o200k for 4o/o-series names and cl100k otherwise.
    fn for_model(model: &str) -> Result<Self> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => {
                let lower = model.to_lowercase();
                if lower.contains("4o") || lower.starts_with("o1") || lower.starts_with("o3") {
                    tiktoken_rs::o200k_base()?
                } else {
                    tiktoken_rs::cl100k_base()?
                }
            }
        };
        Ok(Self { bpe })
    }

    /// cl100k stand-in for hub tokenizers
    fn cl100k() -> Result<Self> {
        Ok(Self {
            bpe: tiktoken_rs::cl100k_base()?,
        })
    }
}

impl TokenEncoder for TiktokenEncoder {
    fn count(&self, text: &str) -> Result<usize> {
        Ok(self.bpe.encode_with_special_tokens(text).len())
    }
}

/// Resolves (content, policy) pairs to token counts
///
/// Encoder instances are cached per policy identity for the process
/// lifetime. The cache is read-heavy; on a miss the encoder is fully
/// constructed before being published, so concurrent readers never see
/// a half-built entry.
pub struct TokenResolver {
    encoders: DashMap<String, Arc<dyn TokenEncoder>>,
}

impl Default for TokenResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenResolver {
    pub fn new() -> Self {
        Self {
            encoders: DashMap::new(),
        }
    }

    /// Register a custom backend for a policy (e.g., a real hub
    /// tokenizer), replacing the built-in stand-in.
    pub fn register(&self, policy: &TokenizerPolicy, encoder: Arc<dyn TokenEncoder>) {
        self.encoders.insert(policy.cache_key(), encoder);
    }

    /// Count tokens in `content` under `policy`
    ///
    /// Empty or whitespace-only content is 0 without touching a backend.
    /// Backend load or encode failures degrade to the approximation.
    pub fn count(&self, content: &str, policy: &TokenizerPolicy) -> u64 {
        if content.trim().is_empty() {
            return 0;
        }

        let encoder = self.encoder_for(policy);
        match encoder.count(content) {
            Ok(n) => n as u64,
            Err(e) => {
                warn!(policy = %policy, error = %e, "Encoder failed, using approximate count");
                approx_count(content) as u64
            }
        }
    }

    fn encoder_for(&self, policy: &TokenizerPolicy) -> Arc<dyn TokenEncoder> {
        let key = policy.cache_key();
        if let Some(existing) = self.encoders.get(&key) {
            return existing.clone();
        }

        let built = Self::build_encoder(policy);
        // entry() keeps this single-writer-on-miss: if another task won
        // the race, reuse its encoder instead of ours.
        self.encoders
            .entry(key)
            .or_insert_with(|| built)
            .value()
            .clone()
    }

    fn build_encoder(policy: &TokenizerPolicy) -> Arc<dyn TokenEncoder> {
        match policy {
            TokenizerPolicy::OpenAi { model } => match TiktokenEncoder::for_model(model) {
                Ok(enc) => {
                    debug!(model = %model, "Loaded tiktoken encoder");
                    Arc::new(enc)
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "Failed to load tiktoken encoder, using approximation");
                    Arc::new(ApproxEncoder)
                }
            },
            TokenizerPolicy::Hub { repo } => match TiktokenEncoder::cl100k() {
                Ok(enc) => {
                    debug!(repo = %repo, "Using cl100k stand-in for hub tokenizer");
                    Arc::new(enc)
                }
                Err(e) => {
                    warn!(repo = %repo, error = %e, "Failed to load cl100k, using approximation");
                    Arc::new(ApproxEncoder)
                }
            },
            TokenizerPolicy::Approximate => Arc::new(ApproxEncoder),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_content_is_zero() {
        let resolver = TokenResolver::new();
        assert_eq!(resolver.count("", &TokenizerPolicy::Approximate), 0);
        assert_eq!(resolver.count("   \n\t ", &TokenizerPolicy::Approximate), 0);
    }

    #[test]
    fn test_approximate_count() {
        let resolver = TokenResolver::new();
        // 8 chars -> ceil(8/4) = 2
        assert_eq!(resolver.count("12345678", &TokenizerPolicy::Approximate), 2);
        // 9 chars -> ceil(9/4) = 3
        assert_eq!(resolver.count("123456789", &TokenizerPolicy::Approximate), 3);
    }

    #[test]
    fn test_exact_count_positive() {
        let resolver = TokenResolver::new();
        let policy = TokenizerPolicy::OpenAi {
            model: "gpt-4o".to_string(),
        };
        let count = resolver.count("Hello, world!", &policy);
        assert!(count > 0);
        assert!(count < 10, "short greeting should be under 10 tokens");
    }

    #[test]
    fn test_unknown_model_does_not_abort() {
        let resolver = TokenResolver::new();
        let policy = TokenizerPolicy::OpenAi {
            model: "totally-made-up-model".to_string(),
        };
        // Falls back internally (cl100k or approximation), never panics
        assert!(resolver.count("some content here", &policy) > 0);
    }

    #[test]
    fn test_encoder_cached_across_calls() {
        let resolver = TokenResolver::new();
        let policy = TokenizerPolicy::Approximate;
        resolver.count("warm", &policy);
        assert_eq!(resolver.encoders.len(), 1);
        resolver.count("second call", &policy);
        assert_eq!(resolver.encoders.len(), 1);
    }

    #[test]
    fn test_registered_backend_wins() {
        struct Fixed;
        impl TokenEncoder for Fixed {
            fn count(&self, _text: &str) -> Result<usize> {
                Ok(42)
            }
        }

        let resolver = TokenResolver::new();
        let policy = TokenizerPolicy::Hub {
            repo: "Xenova/claude-tokenizer".to_string(),
        };
        resolver.register(&policy, Arc::new(Fixed));
        assert_eq!(resolver.count("anything", &policy), 42);
    }
}

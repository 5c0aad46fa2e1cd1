//! System-prompt sectioning
//!
//! Applies an ordered list of labeled content patterns to the raw
//! system prompt. Each pattern may claim one character range; a match
//! overlapping an already-claimed range is rejected, so no character is
//! ever attributed to two sections. Leftover spans above the thresholds
//! become catch-all "Other Instructions" sections.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::SystemPromptSection;
use crate::tokenizer::{TokenResolver, TokenizerPolicy};

/// Minimum characters for a leftover span to surface as a section
const MIN_REMAINDER_CHARS: usize = 80;

/// Minimum tokens for a leftover span to surface as a section
const MIN_REMAINDER_TOKENS: u64 = 20;

struct SectionRule {
    label: &'static str,
    pattern: Regex,
}

fn rule(label: &'static str, pattern: &str) -> SectionRule {
    SectionRule {
        label,
        pattern: Regex::new(pattern).expect("section rule regex"),
    }
}

/// Ordered section rules, highest priority first
static SECTION_RULES: Lazy<Vec<SectionRule>> = Lazy::new(|| {
    vec![
        // Header-based rules claim the header line plus every following
        // line that does not start a new header or tag block.
        rule("Identity & Role", r"(?i)you are [^\n]+(?:\n[^\n#<][^\n]*)*"),
        rule(
            "Tone & Style",
            r"(?i)#+[^\n]*(?:tone|style|output)[^\n]*\n(?:[^\n#<][^\n]*\n?|\n)*",
        ),
        rule(
            "Task Management",
            r"(?i)#+[^\n]*(?:task management|todo)[^\n]*\n(?:[^\n#<][^\n]*\n?|\n)*",
        ),
        rule(
            "Tool Usage Policy",
            r"(?i)#+[^\n]*(?:tool use|tool usage|tools)[^\n]*\n(?:[^\n#<][^\n]*\n?|\n)*",
        ),
        rule("Environment", r"(?is)<env>.*?</env>"),
        rule("File Listing", r"(?is)<(?:project|files)>.*?</(?:project|files)>"),
        rule(
            "Custom Instructions",
            r"(?is)<(?:user-instructions|instructions)>.*?</(?:user-instructions|instructions)>",
        ),
        rule(
            "Function Calling",
            r"(?i)#+[^\n]*function[^\n]*\n(?:[^\n#<][^\n]*\n?|\n)*",
        ),
        rule("Closing Instructions", r"(?im)^important:[^\n]*(?:\n[^\n#<][^\n]*)*"),
    ]
});

/// Half-open [start, end) ranges already attributed to a section
fn overlaps(claimed: &[(usize, usize)], start: usize, end: usize) -> bool {
    claimed.iter().any(|&(s, e)| start < e && s < end)
}

/// Decompose a raw system prompt into labeled, non-overlapping sections
///
/// Sections come back sorted descending by token count. The sum of all
/// section lengths plus unclaimed remainder always equals the prompt
/// length.
pub fn decompose_prompt(
    prompt: &str,
    resolver: &TokenResolver,
    policy: &TokenizerPolicy,
) -> Vec<SystemPromptSection> {
    let mut claimed: Vec<(usize, usize)> = Vec::new();
    let mut sections = Vec::new();

    for rule in SECTION_RULES.iter() {
        let Some(m) = rule.pattern.find(prompt) else {
            continue;
        };
        if m.start() == m.end() || overlaps(&claimed, m.start(), m.end()) {
            continue;
        }
        claimed.push((m.start(), m.end()));
        sections.push(SystemPromptSection {
            label: rule.label.to_string(),
            tokens: resolver.count(m.as_str(), policy),
            start: m.start(),
            end: m.end(),
        });
    }

    if sections.is_empty() {
        if prompt.trim().is_empty() {
            return Vec::new();
        }
        // Nothing matched: the whole prompt is one unlabeled section
        return vec![SystemPromptSection {
            label: "System Prompt".to_string(),
            tokens: resolver.count(prompt, policy),
            start: 0,
            end: prompt.len(),
        }];
    }

    // Leftover spans between claimed ranges
    claimed.sort_unstable();
    let mut cursor = 0usize;
    let mut gaps = Vec::new();
    for &(s, e) in &claimed {
        if s > cursor {
            gaps.push((cursor, s));
        }
        cursor = cursor.max(e);
    }
    if cursor < prompt.len() {
        gaps.push((cursor, prompt.len()));
    }

    for (s, e) in gaps {
        if e - s < MIN_REMAINDER_CHARS {
            continue;
        }
        let tokens = resolver.count(&prompt[s..e], policy);
        if tokens < MIN_REMAINDER_TOKENS {
            continue;
        }
        sections.push(SystemPromptSection {
            label: "Other Instructions".to_string(),
            tokens,
            start: s,
            end: e,
        });
    }

    sections.sort_by(|a, b| b.tokens.cmp(&a.tokens));
    sections
}

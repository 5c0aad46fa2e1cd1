//! Content classification
//!
//! Splits a turn sequence into five mutually exclusive content streams
//! (system, user, assistant, tool output, reasoning), tokenizes each
//! category concurrently and produces ranked [`CategorySummary`]s.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::warn;

use crate::models::{CategoryEntry, CategorySummary, Role, Turn};
use crate::tokenizer::{TokenResolver, TokenizerPolicy};

/// The five category summaries produced by classification
#[derive(Debug, Clone, Default)]
pub struct Classified {
    pub system: CategorySummary,
    pub user: CategorySummary,
    pub assistant: CategorySummary,
    pub tools: CategorySummary,
    pub reasoning: CategorySummary,
}

/// A labeled piece of content awaiting tokenization
#[derive(Debug, Clone)]
struct Draft {
    label: String,
    content: String,
}

/// Ordered labeling heuristics for system-prompt entries, first match wins
static SYSTEM_LABEL_RULES: &[(&str, &[&str])] = &[
    ("Role Definition", &["you are", "your role", "act as", "an interactive"]),
    ("Permissions & Tools", &["permission", "allowed tools", "tool use", "do not run", "never run"]),
    ("Formatting Rules", &["format", "markdown", "output style", "concise"]),
    ("Project Context", &["project", "repository", "codebase", "working directory"]),
    ("File References", &["file_path", "@file", "clickable", "line number"]),
];

fn label_system_entry(content: &str, index: usize) -> String {
    let lower = content.to_lowercase();
    for (label, needles) in SYSTEM_LABEL_RULES {
        if needles.iter().any(|n| lower.contains(n)) {
            return (*label).to_string();
        }
    }
    format!("System#{index}")
}

/// Collect system-category drafts: system-role turn text plus any
/// assistant-attached system-prompt arrays, deduplicated by exact
/// content so identical prompts across turns collapse to one entry.
fn system_drafts(turns: &[Turn]) -> Vec<Draft> {
    let mut seen = HashSet::new();
    let mut drafts = Vec::new();

    let mut push = |content: String, drafts: &mut Vec<Draft>| {
        if content.trim().is_empty() || !seen.insert(content.clone()) {
            return;
        }
        let label = label_system_entry(&content, drafts.len() + 1);
        drafts.push(Draft { label, content });
    };

    for turn in turns {
        if turn.role == Role::System {
            push(turn.text_content(), &mut drafts);
        }
        for prompt in &turn.system_prompts {
            push(prompt.clone(), &mut drafts);
        }
    }

    drafts
}

fn role_drafts(turns: &[Turn], role: Role, label_prefix: &str) -> Vec<Draft> {
    let mut drafts = Vec::new();
    for turn in turns.iter().filter(|t| t.role == role) {
        let content = turn.text_content();
        if content.trim().is_empty() {
            continue;
        }
        drafts.push(Draft {
            label: format!("{label_prefix}#{}", drafts.len() + 1),
            content,
        });
    }
    drafts
}

/// Group completed tool-call outputs by tool name, concatenating
/// multiple completions so the count is cumulative per tool.
fn tool_drafts(turns: &[Turn]) -> Vec<Draft> {
    let mut order: Vec<String> = Vec::new();
    let mut by_name: HashMap<String, String> = HashMap::new();

    for turn in turns {
        for (name, output) in turn.completed_tool_calls() {
            match by_name.get_mut(name) {
                Some(existing) => {
                    existing.push_str("\n\n");
                    existing.push_str(output);
                }
                None => {
                    order.push(name.to_string());
                    by_name.insert(name.to_string(), output.to_string());
                }
            }
        }
    }

    order
        .into_iter()
        .map(|name| {
            let content = by_name.remove(&name).unwrap_or_default();
            Draft {
                label: name,
                content,
            }
        })
        .collect()
}

fn reasoning_drafts(turns: &[Turn]) -> Vec<Draft> {
    let mut drafts = Vec::new();
    for turn in turns {
        for text in turn.reasoning_parts() {
            drafts.push(Draft {
                label: format!("Reasoning#{}", drafts.len() + 1),
                content: text.to_string(),
            });
        }
    }
    drafts
}

fn tokenize_drafts(
    resolver: &TokenResolver,
    policy: &TokenizerPolicy,
    drafts: &[Draft],
    top_n: usize,
) -> CategorySummary {
    let entries = drafts
        .iter()
        .map(|d| CategoryEntry::new(d.label.clone(), resolver.count(&d.content, policy)))
        .collect();
    CategorySummary::from_entries(entries, top_n)
}

async fn tokenize_category(
    resolver: Arc<TokenResolver>,
    policy: TokenizerPolicy,
    drafts: Vec<Draft>,
    top_n: usize,
) -> CategorySummary {
    let handle =
        tokio::task::spawn_blocking(move || tokenize_drafts(&resolver, &policy, &drafts, top_n));

    match handle.await {
        Ok(summary) => summary,
        Err(e) => {
            // A panicking backend surfaces as a JoinError; the category
            // degrades to empty rather than re-running the panic inline.
            warn!(error = %e, "Category tokenization task failed, reporting empty category");
            CategorySummary::default()
        }
    }
}

/// Partition turns into the five content categories and tokenize them
///
/// The five tokenizations run concurrently against the shared encoder
/// cache. Entries are ranked descending; zero-token entries are dropped.
pub async fn classify(
    turns: &[Turn],
    resolver: Arc<TokenResolver>,
    policy: &TokenizerPolicy,
    top_n: usize,
) -> Classified {
    let system = system_drafts(turns);
    let user = role_drafts(turns, Role::User, "User");
    let assistant = role_drafts(turns, Role::Assistant, "Assistant");
    let tools = tool_drafts(turns);
    let reasoning = reasoning_drafts(turns);

    let (system, user, assistant, tools, reasoning) = tokio::join!(
        tokenize_category(resolver.clone(), policy.clone(), system, top_n),
        tokenize_category(resolver.clone(), policy.clone(), user, top_n),
        tokenize_category(resolver.clone(), policy.clone(), assistant, top_n),
        tokenize_category(resolver.clone(), policy.clone(), tools, top_n),
        tokenize_category(resolver.clone(), policy.clone(), reasoning, top_n),
    );

    Classified {
        system,
        user,
        assistant,
        tools,
        reasoning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentPart, ToolStatus};

    fn resolver() -> Arc<TokenResolver> {
        Arc::new(TokenResolver::new())
    }

    #[tokio::test]
    async fn test_user_assistant_entries_in_turn_order() {
        let turns = vec![
            Turn::text(Role::User, "first user message here"),
            Turn::text(Role::Assistant, "assistant reply"),
            Turn::text(Role::User, "second"),
        ];

        let c = classify(&turns, resolver(), &TokenizerPolicy::Approximate, 10).await;
        assert_eq!(c.user.all_entries.len(), 2);
        let labels: Vec<_> = c.user.all_entries.iter().map(|e| e.label.as_str()).collect();
        assert!(labels.contains(&"User#1"));
        assert!(labels.contains(&"User#2"));
        assert_eq!(c.assistant.all_entries.len(), 1);
        assert_eq!(c.assistant.all_entries[0].label, "Assistant#1");
    }

    #[tokio::test]
    async fn test_identical_system_prompts_collapse() {
        let prompt = "You are a helpful coding agent with tool access.".to_string();
        let mut a1 = Turn::text(Role::Assistant, "ok");
        a1.system_prompts = vec![prompt.clone()];
        let mut a2 = Turn::text(Role::Assistant, "done");
        a2.system_prompts = vec![prompt.clone()];

        let turns = vec![Turn::text(Role::System, prompt.clone()), a1, a2];
        let c = classify(&turns, resolver(), &TokenizerPolicy::Approximate, 10).await;

        assert_eq!(c.system.all_entries.len(), 1);
        assert_eq!(c.system.all_entries[0].label, "Role Definition");
    }

    #[tokio::test]
    async fn test_tool_outputs_grouped_by_name() {
        let turn = Turn {
            role: Role::Assistant,
            parts: vec![
                ContentPart::ToolCall {
                    name: "bash".to_string(),
                    status: ToolStatus::Completed,
                    output: "line one output".to_string(),
                },
                ContentPart::ToolCall {
                    name: "read".to_string(),
                    status: ToolStatus::Completed,
                    output: "file contents".to_string(),
                },
                ContentPart::ToolCall {
                    name: "bash".to_string(),
                    status: ToolStatus::Completed,
                    output: "line two output".to_string(),
                },
                ContentPart::ToolCall {
                    name: "edit".to_string(),
                    status: ToolStatus::Error,
                    output: "failed".to_string(),
                },
            ],
            ..Default::default()
        };

        let c = classify(&[turn], resolver(), &TokenizerPolicy::Approximate, 10).await;
        assert_eq!(c.tools.all_entries.len(), 2);

        // Cumulative per tool: bash got both outputs concatenated
        let bash = c
            .tools
            .all_entries
            .iter()
            .find(|e| e.label == "bash")
            .unwrap();
        let read = c
            .tools
            .all_entries
            .iter()
            .find(|e| e.label == "read")
            .unwrap();
        assert!(bash.tokens > read.tokens);
    }

    #[tokio::test]
    async fn test_reasoning_entries_numbered() {
        let turn = Turn {
            role: Role::Assistant,
            parts: vec![
                ContentPart::Reasoning {
                    text: "let me think about this".to_string(),
                },
                ContentPart::Reasoning {
                    text: "   ".to_string(),
                },
                ContentPart::Reasoning {
                    text: "second thought stream".to_string(),
                },
            ],
            ..Default::default()
        };

        let c = classify(&[turn], resolver(), &TokenizerPolicy::Approximate, 10).await;
        assert_eq!(c.reasoning.all_entries.len(), 2);
        let labels: Vec<_> = c
            .reasoning
            .all_entries
            .iter()
            .map(|e| e.label.as_str())
            .collect();
        assert!(labels.contains(&"Reasoning#1"));
        assert!(labels.contains(&"Reasoning#2"));
    }

    #[tokio::test]
    async fn test_panicking_encoder_yields_empty_categories() {
        struct Exploding;
        impl crate::tokenizer::TokenEncoder for Exploding {
            fn count(&self, _text: &str) -> anyhow::Result<usize> {
                panic!("encoder exploded")
            }
        }

        let resolver = resolver();
        let policy = TokenizerPolicy::Hub {
            repo: "custom/broken".to_string(),
        };
        resolver.register(&policy, Arc::new(Exploding));

        let turns = vec![
            Turn::text(Role::User, "hello there"),
            Turn::text(Role::Assistant, "hi"),
        ];

        // The panic is contained in the tokenization tasks; categories
        // degrade to empty instead of aborting the caller.
        let c = classify(&turns, resolver, &policy, 10).await;
        assert!(c.user.is_empty());
        assert!(c.assistant.is_empty());
    }

    #[tokio::test]
    async fn test_empty_turns_yield_empty_summaries() {
        let turns = vec![Turn::text(Role::User, "   ")];
        let c = classify(&turns, resolver(), &TokenizerPolicy::Approximate, 10).await;
        assert!(c.user.is_empty());
        assert!(c.system.is_empty());
        assert_eq!(c.user.total_tokens, 0);
    }

    #[test]
    fn test_system_label_rules_first_match_wins() {
        assert_eq!(
            label_system_entry("You are a careful reviewer. Use markdown.", 3),
            "Role Definition"
        );
        assert_eq!(
            label_system_entry("Always ask for permission before tool use.", 3),
            "Permissions & Tools"
        );
        assert_eq!(label_system_entry("completely unrelated text", 3), "System#3");
    }
}

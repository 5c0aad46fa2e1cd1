//! End-to-end pipeline test over an in-memory session tree
//!
//! Drives the full analyzer (selection, classification, reconciliation,
//! cost, subtree aggregation, context snapshot) against a fake session
//! source with a deliberately failing child node.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use tokenlens_core::models::{Category, ContentPart, Role, Telemetry, ToolStatus};
use tokenlens_core::{
    AnalysisOptions, Analyzer, ChildSession, CoreError, SessionSource, ToolCatalog, ToolDefinition,
    Turn,
};

struct FakeTree {
    turns: HashMap<String, Vec<Turn>>,
    children: HashMap<String, Vec<ChildSession>>,
    failing: Vec<String>,
}

#[async_trait]
impl SessionSource for FakeTree {
    async fn get_turns(&self, session_id: &str) -> Result<Vec<Turn>, CoreError> {
        if self.failing.iter().any(|f| f == session_id) {
            return Err(CoreError::session_fetch(session_id, "synthetic outage"));
        }
        Ok(self.turns.get(session_id).cloned().unwrap_or_default())
    }

    async fn get_child_sessions(&self, session_id: &str) -> Result<Vec<ChildSession>, CoreError> {
        Ok(self.children.get(session_id).cloned().unwrap_or_default())
    }
}

struct FakeCatalog;

#[async_trait]
impl ToolCatalog for FakeCatalog {
    async fn get_tool_definitions(
        &self,
        _provider_id: &str,
        _model_id: &str,
    ) -> Result<Vec<ToolDefinition>, CoreError> {
        Ok(vec![
            ToolDefinition {
                id: "bash".to_string(),
                description: "Run a shell command and return its output".to_string(),
                parameter_schema: json!({
                    "type": "object",
                    "properties": {"command": {"type": "string"}}
                }),
            },
            ToolDefinition {
                id: "read".to_string(),
                description: "Read a file from disk".to_string(),
                parameter_schema: json!({
                    "type": "object",
                    "properties": {"path": {"type": "string"}}
                }),
            },
        ])
    }
}

fn assistant_turn(input: u64, output: u64, cache_read: u64) -> Turn {
    Turn {
        role: Role::Assistant,
        parts: vec![ContentPart::Text {
            text: "Here is what I found in the repository.".to_string(),
        }],
        telemetry: Some(Telemetry {
            input_tokens: input,
            output_tokens: output,
            cache_read_tokens: cache_read,
            provider_id: Some("anthropic".to_string()),
            model_id: Some("claude-sonnet-4-20250514".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn root_turns() -> Vec<Turn> {
    vec![
        Turn::text(
            Role::System,
            "You are an interactive coding agent.\n\n# Tool usage policy\nPrefer search tools over bash.\n",
        ),
        Turn::text(Role::User, "Please summarize the failing tests."),
        Turn {
            role: Role::Assistant,
            parts: vec![
                ContentPart::Reasoning {
                    text: "The user wants a summary of test failures.".to_string(),
                },
                ContentPart::ToolCall {
                    name: "bash".to_string(),
                    status: ToolStatus::Completed,
                    output: "test suite: 3 failed, 40 passed".to_string(),
                },
            ],
            telemetry: Some(Telemetry {
                input_tokens: 90,
                output_tokens: 55,
                reasoning_tokens: 12,
                cache_read_tokens: 4000,
                cache_write_tokens: 800,
                provider_id: Some("anthropic".to_string()),
                model_id: Some("claude-sonnet-4-20250514".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        },
        assistant_turn(60, 30, 4500),
    ]
}

fn fake_tree() -> FakeTree {
    let mut turns = HashMap::new();
    turns.insert("root".to_string(), root_turns());
    turns.insert("child-a".to_string(), vec![assistant_turn(100, 10, 0)]);
    turns.insert("grandchild".to_string(), vec![assistant_turn(25, 5, 0)]);
    turns.insert("child-c".to_string(), vec![assistant_turn(999, 999, 0)]);

    let mut children = HashMap::new();
    children.insert(
        "root".to_string(),
        vec![
            ChildSession {
                id: "child-a".to_string(),
                title: "@explore subagent".to_string(),
            },
            ChildSession {
                id: "child-c".to_string(),
                title: "doomed fetch".to_string(),
            },
        ],
    );
    children.insert(
        "child-a".to_string(),
        vec![ChildSession {
            id: "grandchild".to_string(),
            title: "format the patch".to_string(),
        }],
    );

    FakeTree {
        turns,
        children,
        failing: vec!["child-c".to_string()],
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn analyzer() -> Analyzer {
    init_tracing();
    Analyzer::new()
        .with_source(Arc::new(fake_tree()))
        .with_catalog(Arc::new(FakeCatalog))
}

#[tokio::test]
async fn full_pipeline_produces_consistent_analysis() {
    let opts = AnalysisOptions {
        include_subtree: true,
        ..Default::default()
    };
    let analysis = analyzer().analyze_session("root", &opts).await.unwrap();

    // Category invariants hold everywhere
    for category in Category::ALL {
        let summary = analysis.summary(category);
        let sum: u64 = summary.all_entries.iter().map(|e| e.tokens).sum();
        assert_eq!(summary.total_tokens, sum);
        assert!(summary.entries.len() <= summary.all_entries.len());
        assert!(summary.all_entries.iter().all(|e| e.tokens > 0));
    }

    // System was locally detected, so no inferred placeholder appears
    assert!(analysis
        .system
        .all_entries
        .iter()
        .all(|e| !e.label.contains("inferred")));

    // Telemetry sums across both assistant turns
    assert_eq!(analysis.usage.input_tokens, 150);
    assert_eq!(analysis.usage.output_tokens, 85);
    assert_eq!(analysis.usage.assistant_turns, 2);
    assert_eq!(analysis.usage.last_call.cache_read_tokens, 4500);

    // Zero reported cost with activity: subscription plan
    assert!(analysis.cost.is_subscription);
    assert!(analysis.cost.total_cost > 0.0);
}

#[tokio::test]
async fn subtree_tolerates_failing_child() {
    let opts = AnalysisOptions {
        include_subtree: true,
        ..Default::default()
    };
    let analysis = analyzer().analyze_session("root", &opts).await.unwrap();
    let subtree = analysis.subtree.unwrap();

    // child-c failed: skipped, its figures contribute nothing
    assert_eq!(subtree.failed_fetches, 1);
    assert_eq!(subtree.nodes.len(), 2);
    assert_eq!(subtree.totals.input_tokens, 125);
    assert_eq!(subtree.totals.output_tokens, 15);
    assert_eq!(subtree.totals.api_calls, 2);
    assert!(!subtree.truncated);

    let labels: Vec<_> = subtree.nodes.iter().map(|n| n.label.as_str()).collect();
    assert!(labels.contains(&"explore"));
    assert!(labels.contains(&"format"));
}

#[tokio::test]
async fn context_snapshot_covers_tools_and_sections() {
    let analysis = analyzer()
        .analyze_session("root", &AnalysisOptions::default())
        .await
        .unwrap();
    let context = analysis.context.unwrap();

    assert_eq!(context.tool_entries.len(), 2);
    assert!(context.tool_description_tokens > 0);
    assert!(context.tool_schema_tokens > 0);

    let labels: Vec<_> = context
        .prompt_sections
        .iter()
        .map(|s| s.label.as_str())
        .collect();
    assert!(labels.contains(&"Identity & Role"));
    assert!(labels.contains(&"Tool Usage Policy"));

    // Sections never overlap
    for (i, a) in context.prompt_sections.iter().enumerate() {
        for b in context.prompt_sections.iter().skip(i + 1) {
            assert!(a.end <= b.start || b.end <= a.start);
        }
    }

    // Cache was warm: hit rate strictly positive
    assert!(context.cache_efficiency.hit_rate > 0.0);
}

#[tokio::test]
async fn empty_session_is_the_only_hard_error() {
    init_tracing();
    let mut tree = fake_tree();
    tree.turns.insert("empty".to_string(), Vec::new());
    let analyzer = Analyzer::new().with_source(Arc::new(tree));

    let err = analyzer
        .analyze_session("empty", &AnalysisOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NoTurns { .. }));
}

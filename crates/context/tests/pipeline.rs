//! Engine-level integration tests for the context assembly pipeline.
//!
//! Every test wires its own fetchers into a fresh [`ContextEngine`], runs
//! `assemble` / `inspect` end to end, and checks the result, the warnings,
//! and the audit trail.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ctxloom_context::{ContextEngine, RETRIEVED_CHUNK_LIMIT_WARNING, RULES_OVERBUDGET_WARNING};
use ctxloom_core::{
    AssembleRequest, ConstraintItem, ConstraintSource, ContextError, FetchError, FnFetcher,
    InspectRequest, LayerChunk, LayerFetchResult, LayerFetcher, LayerId, StaticFetcher,
};
use ctxloom_security::{AuditEvent, AuditLogger, sha256_hex};
use tokio::sync::Semaphore;

// ── Helpers ──────────────────────────────────────────────────────────────

fn request() -> AssembleRequest {
    AssembleRequest::new("project-1", "document-1", "continue-writing").with_cursor(16.0)
}

fn failing(name: &'static str) -> Arc<dyn LayerFetcher> {
    Arc::new(FnFetcher::new(name, move |_req: AssembleRequest| async move {
        Err::<LayerFetchResult, _>(FetchError::Unavailable(format!("{name} offline")))
    }))
}

fn chunks(chunks: Vec<LayerChunk>) -> Arc<dyn LayerFetcher> {
    Arc::new(StaticFetcher::new(LayerFetchResult::from_chunks(chunks)))
}

fn constraint(
    id: &str,
    text: &str,
    source: ConstraintSource,
    priority: i64,
    updated_at: &str,
    degradable: bool,
) -> ConstraintItem {
    ConstraintItem {
        id: id.into(),
        text: text.into(),
        source,
        priority,
        updated_at: updated_at.parse().unwrap(),
        degradable,
    }
}

/// Counts calls, returns nothing.
struct CountingFetcher {
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl LayerFetcher for CountingFetcher {
    fn name(&self) -> &str {
        "counting"
    }

    async fn fetch(&self, _request: &AssembleRequest) -> Result<LayerFetchResult, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(LayerFetchResult::empty())
    }
}

fn engine_with_audit() -> (ContextEngine, Arc<AuditLogger>) {
    let audit = Arc::new(AuditLogger::new());
    (ContextEngine::new().with_audit(audit.clone()), audit)
}

// ── Layer order and degradation ──────────────────────────────────────────

#[tokio::test]
async fn all_fetchers_failing_still_yields_four_layers() {
    let engine = ContextEngine::new()
        .with_fetcher(LayerId::Rules, failing("kg"))
        .with_fetcher(LayerId::Settings, failing("memory"))
        .with_fetcher(LayerId::Retrieved, failing("rag"))
        .with_fetcher(LayerId::Immediate, failing("editor"));

    let result = engine.assemble(&request()).await.unwrap();

    assert_eq!(
        result.assembly_order,
        [LayerId::Rules, LayerId::Settings, LayerId::Retrieved, LayerId::Immediate]
    );
    let json = serde_json::to_value(&result).unwrap();
    let mut keys: Vec<&str> = json["layers"]
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    keys.sort();
    assert_eq!(keys, ["immediate", "retrieved", "rules", "settings"]);
    assert_eq!(
        json["assemblyOrder"],
        serde_json::json!(["rules", "settings", "retrieved", "immediate"])
    );

    assert_eq!(
        result.warnings,
        [
            "KG_UNAVAILABLE",
            "SETTINGS_UNAVAILABLE",
            "RAG_UNAVAILABLE",
            "IMMEDIATE_UNAVAILABLE"
        ]
    );
    assert_eq!(result.token_count, 0);
    assert_eq!(
        result.prompt,
        "## Rules\n(none)\n\n## Settings\n(none)\n\n## Retrieved\n(none)\n\n## Immediate\n(none)"
    );
}

#[tokio::test]
async fn one_failing_fetcher_degrades_only_its_layer() {
    let engine = ContextEngine::new()
        .with_fetcher(LayerId::Retrieved, failing("rag"))
        .with_fetcher(
            LayerId::Settings,
            chunks(vec![LayerChunk::new("memory:style", "冷峻的叙事语气")]),
        );

    let result = engine.assemble(&request()).await.unwrap();
    assert_eq!(result.warnings, ["RAG_UNAVAILABLE"]);
    assert_eq!(result.layers.retrieved.token_count, 0);
    assert!(result.layers.retrieved.source.is_empty());
    assert_eq!(result.layers.settings.source, ["memory:style"]);
    assert!(result.prompt.contains("## Settings\n冷峻的叙事语气"));
}

// ── Rules constraints ────────────────────────────────────────────────────

#[tokio::test]
async fn overbudget_rules_keep_hard_constraints_and_drop_soft_ones() {
    let hard_text = "主角始终以第一人称叙述".repeat(200);
    let mut items = vec![constraint(
        "u-hard",
        &hard_text,
        ConstraintSource::User,
        100,
        "2026-02-10T10:00:00Z",
        false,
    )];
    for i in 0..5 {
        items.push(constraint(
            &format!("k-soft-{i}"),
            &format!("可选风格提示{i}"),
            ConstraintSource::Kg,
            i,
            "2026-02-10T10:00:00Z",
            true,
        ));
    }
    let engine = ContextEngine::new().with_fetcher(
        LayerId::Rules,
        chunks(vec![LayerChunk::new("kg:rules", "项目规则").with_constraints(items)]),
    );

    let result = engine.assemble(&request()).await.unwrap();

    assert!(result.prompt.contains(&hard_text));
    for i in 0..5 {
        assert!(!result.prompt.contains(&format!("可选风格提示{i}")));
    }
    assert!(result.warnings.contains(&RULES_OVERBUDGET_WARNING.to_string()));
    assert!(result.layers.rules.truncated);
}

#[tokio::test]
async fn user_constraints_render_before_kg_whatever_the_priority() {
    let items = vec![
        constraint("k-1", "KG-ONE", ConstraintSource::Kg, 99, "2026-02-10T10:00:00Z", true),
        constraint("u-3", "USER-THREE", ConstraintSource::User, 50, "2026-02-09T10:00:00Z", false),
        constraint("u-2", "USER-TWO", ConstraintSource::User, 50, "2026-02-10T10:00:00Z", false),
        constraint("u-1", "USER-ONE", ConstraintSource::User, 50, "2026-02-10T10:00:00Z", false),
    ];
    let engine = ContextEngine::new().with_fetcher(
        LayerId::Rules,
        chunks(vec![LayerChunk::new("kg:rules", "").with_constraints(items)]),
    );

    let prompt = engine.assemble(&request()).await.unwrap().prompt;
    let position = |needle: &str| prompt.find(needle).unwrap();
    assert!(position("USER-ONE") < position("USER-TWO"));
    assert!(position("USER-TWO") < position("USER-THREE"));
    assert!(position("USER-THREE") < position("KG-ONE"));
    assert!(prompt.contains("1. USER-ONE  # source=user, priority=50"));
    assert!(prompt.contains("4. KG-ONE  # source=kg, priority=99"));
}

// ── Stable prefix ────────────────────────────────────────────────────────

const SETTINGS_A: &str = r#"{"style":{"tone":"冷峻","pov":"first"},
    "constraints":[{"id":"c-2","priority":1},{"id":"c-1","priority":5}],
    "timestamp":1700000000,"nonce":"n-1"}"#;

const SETTINGS_B: &str = r#"{"nonce":"n-2","requestId":"req-9",
    "constraints":[{"priority":5,"id":"c-1"},{"id":"c-2","priority":1}],
    "style":{"pov":"first","tone":"冷峻"},"timestamp":1800000000}"#;

#[tokio::test]
async fn equivalent_settings_hash_the_same_across_documents() {
    let settings = FnFetcher::new("memory", |req: AssembleRequest| async move {
        let content = if req.document_id == "document-a" {
            SETTINGS_A
        } else {
            SETTINGS_B
        };
        Ok::<_, FetchError>(LayerFetchResult::from_chunks(vec![LayerChunk::new(
            "memory:settings",
            content,
        )]))
    });
    let engine = ContextEngine::new().with_fetcher(LayerId::Settings, Arc::new(settings));

    let doc_a = AssembleRequest::new("project-1", "document-a", "continue-writing")
        .with_model("openai", "gpt-4.1", "1.0.0");
    let doc_b = AssembleRequest {
        document_id: "document-b".into(),
        ..doc_a.clone()
    };

    let first = engine.assemble(&doc_a).await.unwrap();
    let second = engine.assemble(&doc_b).await.unwrap();

    assert_ne!(first.prompt, second.prompt);
    assert_eq!(first.stable_prefix_hash, second.stable_prefix_hash);
    assert_eq!(first.stable_prefix_hash.len(), 64);
    assert!(!first.stable_prefix_unchanged);
    assert!(second.stable_prefix_unchanged);
}

/// Fetcher returning `a` for document-a and `b` for any other document.
fn per_document(a: Vec<LayerChunk>, b: Vec<LayerChunk>) -> Arc<dyn LayerFetcher> {
    Arc::new(FnFetcher::new("per-document", move |req: AssembleRequest| {
        let chunks = if req.document_id == "document-a" {
            a.clone()
        } else {
            b.clone()
        };
        async move { Ok::<_, FetchError>(LayerFetchResult::from_chunks(chunks)) }
    }))
}

fn document(id: &str) -> AssembleRequest {
    AssembleRequest::new("project-1", id, "continue-writing").with_model("openai", "gpt-4.1", "1.0.0")
}

#[tokio::test]
async fn several_json_settings_chunks_hash_by_content() {
    let engine = ContextEngine::new().with_fetcher(
        LayerId::Settings,
        per_document(
            vec![
                LayerChunk::new("memory:style", r#"{"tone":"冷峻","pov":"first"}"#),
                LayerChunk::new("memory:locale", r#"{"timezone":"Asia/Shanghai","nonce":"n-1"}"#),
            ],
            vec![
                LayerChunk::new("memory:style", r#"{"pov":"first","tone":"冷峻"}"#),
                LayerChunk::new("memory:locale", r#"{"nonce":"n-2","timezone":"Asia/Shanghai"}"#),
            ],
        ),
    );

    let first = engine.assemble(&document("document-a")).await.unwrap();
    let second = engine.assemble(&document("document-b")).await.unwrap();
    assert_ne!(first.prompt, second.prompt);
    assert_eq!(first.stable_prefix_hash, second.stable_prefix_hash);
    assert!(second.stable_prefix_unchanged);
}

#[tokio::test]
async fn json_rules_with_constraints_hash_by_content() {
    let item = |ts: &str| {
        constraint("c-1", "主角必须使用第一人称", ConstraintSource::User, 10, ts, false)
    };
    let engine = ContextEngine::new().with_fetcher(
        LayerId::Rules,
        per_document(
            vec![
                LayerChunk::new("kg:rules", r#"{"profile":{"style":"terse","timestamp":1}}"#)
                    .with_constraints(vec![item("2026-01-01T00:00:00Z")]),
            ],
            vec![
                LayerChunk::new("kg:rules", r#"{"profile":{"timestamp":2,"style":"terse"}}"#)
                    .with_constraints(vec![item("2026-02-01T00:00:00Z")]),
            ],
        ),
    );

    let first = engine.assemble(&document("document-a")).await.unwrap();
    let second = engine.assemble(&document("document-b")).await.unwrap();
    assert!(first.prompt.contains("主角必须使用第一人称"));
    assert_eq!(first.stable_prefix_hash, second.stable_prefix_hash);
    assert!(second.stable_prefix_unchanged);

    // a changed constraint text is a different prefix
    let edited = ContextEngine::new().with_fetcher(
        LayerId::Rules,
        chunks(vec![
            LayerChunk::new("kg:rules", r#"{"profile":{"style":"terse"}}"#).with_constraints(vec![
                constraint("c-1", "主角使用第三人称", ConstraintSource::User, 10, "2026-01-01T00:00:00Z", false),
            ]),
        ]),
    );
    let third = edited.assemble(&document("document-a")).await.unwrap();
    assert_ne!(third.stable_prefix_hash, first.stable_prefix_hash);
}

#[tokio::test]
async fn model_or_tokenizer_change_invalidates_prefix() {
    let engine = ContextEngine::new();
    let base = request().with_model("openai", "gpt-4.1", "1.0.0");

    let first = engine.assemble(&base).await.unwrap();
    let again = engine.assemble(&base).await.unwrap();
    assert!(again.stable_prefix_unchanged);

    let other_model = request().with_model("openai", "gpt-4.1-mini", "1.0.0");
    let changed = engine.assemble(&other_model).await.unwrap();
    assert_ne!(changed.stable_prefix_hash, first.stable_prefix_hash);
    assert!(!changed.stable_prefix_unchanged);

    let other_tokenizer = request().with_model("openai", "gpt-4.1", "2.0.0");
    let changed = engine.assemble(&other_tokenizer).await.unwrap();
    assert_ne!(changed.stable_prefix_hash, first.stable_prefix_hash);
    assert!(!changed.stable_prefix_unchanged);
}

// ── Capacity ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn retrieved_chunks_capped_at_two_hundred() {
    let retrieved = (0..250)
        .map(|i| LayerChunk::new(format!("rag:chunk-{i}"), format!("片段{i}")))
        .collect();
    let engine = ContextEngine::new().with_fetcher(LayerId::Retrieved, chunks(retrieved));

    let result = engine.assemble(&request()).await.unwrap();
    assert_eq!(result.layers.retrieved.source.len(), 200);
    assert_eq!(result.layers.retrieved.source[199], "rag:chunk-199");
    assert!(result.layers.retrieved.truncated);
    assert!(
        result
            .warnings
            .contains(&RETRIEVED_CHUNK_LIMIT_WARNING.to_string())
    );
}

#[tokio::test]
async fn oversized_input_rejected_before_any_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (mut engine, audit) = engine_with_audit();
    for layer in LayerId::ALL {
        engine = engine.with_fetcher(
            layer,
            Arc::new(CountingFetcher {
                calls: calls.clone(),
            }),
        );
    }

    let input = "长".repeat(64_000 * 4 / 3 + 1);
    let err = engine
        .assemble(&request().with_input(input.clone()))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "CONTEXT_INPUT_TOO_LARGE");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(engine.in_flight("project-1", "document-1"), 0);

    let entries = audit.entries_named("context_input_too_large");
    assert_eq!(entries.len(), 1);
    assert!(!serde_json::to_string(&entries).unwrap().contains(&input));

    // at the limit is fine
    engine
        .assemble(&request().with_input("a".repeat(64_000 * 4)))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn fifth_concurrent_request_is_rejected() {
    let gate = Arc::new(Semaphore::new(0));
    let fetch_gate = gate.clone();
    let gated = FnFetcher::new("gated-rag", move |_req: AssembleRequest| {
        let gate = fetch_gate.clone();
        async move {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| FetchError::Unavailable(e.to_string()))?;
            Ok::<_, FetchError>(LayerFetchResult::empty())
        }
    });
    let (engine, audit) = engine_with_audit();
    let engine = engine.with_fetcher(LayerId::Retrieved, Arc::new(gated));

    let secret = "尚未发布的第七章草稿：林远在雨夜离开了城市";
    let req = request().with_input(secret);
    let release = async {
        tokio::task::yield_now().await;
        gate.add_permits(4);
    };

    let (r1, r2, r3, r4, r5, ()) = tokio::join!(
        engine.assemble(&req),
        engine.assemble(&req),
        engine.assemble(&req),
        engine.assemble(&req),
        engine.assemble(&req),
        release,
    );
    let results = [r1, r2, r3, r4, r5];

    let rejected: Vec<&ContextError> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].code(), "CONTEXT_BACKPRESSURE");
    assert!(!rejected[0].to_string().contains(secret));
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 4);

    let entries = audit.entries_named("context_backpressure");
    assert_eq!(entries.len(), 1);
    assert!(matches!(
        &entries[0].event,
        AuditEvent::ContextBackpressure { in_flight: 4, limit: 4, .. }
    ));
    assert!(!serde_json::to_string(&entries).unwrap().contains(secret));

    assert_eq!(engine.in_flight("project-1", "document-1"), 0);
    engine.assemble(&req).await.unwrap();
}

#[tokio::test]
async fn other_documents_are_not_throttled() {
    let gate = Arc::new(Semaphore::new(0));
    let fetch_gate = gate.clone();
    let gated = FnFetcher::new("gated-rag", move |_req: AssembleRequest| {
        let gate = fetch_gate.clone();
        async move {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| FetchError::Unavailable(e.to_string()))?;
            Ok::<_, FetchError>(LayerFetchResult::empty())
        }
    });
    let engine = ContextEngine::new().with_fetcher(LayerId::Retrieved, Arc::new(gated));

    let doc_1 = request();
    let doc_2 = AssembleRequest::new("project-1", "document-2", "continue-writing");
    let release = async {
        tokio::task::yield_now().await;
        gate.add_permits(5);
    };

    let (a, b, c, d, e, ()) = tokio::join!(
        engine.assemble(&doc_1),
        engine.assemble(&doc_1),
        engine.assemble(&doc_1),
        engine.assemble(&doc_1),
        engine.assemble(&doc_2),
        release,
    );
    for result in [a, b, c, d, e] {
        result.unwrap();
    }
}

// ── Scope ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn foreign_project_chunk_is_a_scope_violation() {
    let (engine, audit) = engine_with_audit();
    let engine = engine.with_fetcher(
        LayerId::Retrieved,
        chunks(vec![
            LayerChunk::new("rag:chunk-1", "本项目片段").with_project("project-1"),
            LayerChunk::new("rag:chunk-2", "其他项目的秘密片段").with_project("project-2"),
        ]),
    );

    let err = engine.assemble(&request()).await.unwrap_err();
    assert_eq!(
        err,
        ContextError::ScopeViolation {
            layer: LayerId::Retrieved
        }
    );
    assert!(!err.to_string().contains("其他项目"));

    let entries = audit.entries_named("context_scope_violation");
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].event,
        AuditEvent::ContextScopeViolation {
            project_id: "project-1".into(),
            document_id: "document-1".into(),
            layer: LayerId::Retrieved,
            foreign_project_id: "project-2".into(),
        }
    );
    assert_eq!(engine.in_flight("project-1", "document-1"), 0);
}

#[tokio::test]
async fn foreign_chunk_past_the_retrieved_limit_is_still_a_violation() {
    let (engine, audit) = engine_with_audit();
    let mut retrieved: Vec<LayerChunk> = (0..200)
        .map(|i| LayerChunk::new(format!("rag:chunk-{i}"), format!("片段 {i}")).with_project("project-1"))
        .collect();
    retrieved.push(LayerChunk::new("rag:chunk-200", "其他项目的片段").with_project("project-2"));
    let engine = engine.with_fetcher(LayerId::Retrieved, chunks(retrieved));

    let err = engine.assemble(&request()).await.unwrap_err();
    assert_eq!(err.code(), "CONTEXT_SCOPE_VIOLATION");
    assert_eq!(audit.entries_named("context_scope_violation").len(), 1);
}

// ── Inspect ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn inspect_requires_debug_mode_and_role() {
    let (engine, audit) = engine_with_audit();
    let input = "主角的秘密身份";
    let base = request().with_input(input);

    let no_debug = InspectRequest::new(base.clone(), "qa-owner", "owner").with_debug_mode(false);
    assert_eq!(
        engine.inspect(&no_debug).await.unwrap_err(),
        ContextError::InspectForbidden
    );

    let viewer = InspectRequest::new(base.clone(), "qa-viewer", "viewer");
    assert_eq!(
        engine.inspect(&viewer).await.unwrap_err().code(),
        "CONTEXT_INSPECT_FORBIDDEN"
    );

    let entries = audit.entries_named("context_inspect_forbidden");
    assert_eq!(entries.len(), 2);
    match &entries[1].event {
        AuditEvent::ContextInspectForbidden {
            requested_by,
            caller_role,
            debug_mode,
            input_hash,
            input_token_count,
            ..
        } => {
            assert_eq!(requested_by, "qa-viewer");
            assert_eq!(caller_role, "viewer");
            assert!(*debug_mode);
            assert_eq!(input_hash, &sha256_hex(input));
            assert_eq!(*input_token_count, input.len().div_ceil(4));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(entries[1].actor, "qa-viewer");
    assert!(!serde_json::to_string(&entries).unwrap().contains(input));
    assert_eq!(engine.in_flight("project-1", "document-1"), 0);
}

#[tokio::test]
async fn owner_inspect_returns_full_layer_content() {
    let engine = ContextEngine::new()
        .with_fetcher(
            LayerId::Retrieved,
            chunks(vec![LayerChunk::new("rag:chunk-1", "林远与苏晴在图书馆相遇")]),
        )
        .with_fetcher(LayerId::Settings, failing("memory"));

    let mut inspect = InspectRequest::new(request(), "qa-owner", "owner");
    inspect.requested_at = Some(1_770_000_000_000);
    let result = engine.inspect(&inspect).await.unwrap();

    assert_eq!(
        result.layers_detail.retrieved.content,
        "林远与苏晴在图书馆相遇"
    );
    assert_eq!(result.layers_detail.retrieved.source, ["rag:chunk-1"]);
    assert_eq!(
        result.layers_detail.rules.content,
        "Skill continue-writing must follow project rules."
    );
    assert_eq!(result.layers_detail.immediate.content, "cursor=16");
    assert_eq!(result.totals.warnings_count, 1);
    assert_eq!(
        result.totals.token_count,
        result
            .layers_detail
            .iter()
            .map(|(_, d)| d.token_count)
            .sum::<usize>()
    );
    assert!(result.inspect_meta.debug_mode);
    assert_eq!(result.inspect_meta.requested_by, "qa-owner");
    assert_eq!(result.inspect_meta.requested_at, 1_770_000_000_000);
}

#[tokio::test]
async fn maintainer_role_is_case_insensitive() {
    let engine = ContextEngine::new();
    let inspect = InspectRequest::new(request(), "lead", " Maintainer ");
    assert!(engine.inspect(&inspect).await.is_ok());
}

// ── Budget profile ───────────────────────────────────────────────────────

#[tokio::test]
async fn budget_update_is_version_checked() {
    let engine = ContextEngine::new();
    let current = engine.budget_profile();
    assert_eq!(current.version, 1);

    let mut next = current.clone();
    next.total_budget_tokens = 8000;
    let updated = engine.update_budget_profile(next).unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(engine.budget_profile().total_budget_tokens, 8000);

    let mut stale = current;
    stale.total_budget_tokens = 1000;
    let err = engine.update_budget_profile(stale).unwrap_err();
    assert_eq!(err.code(), "CONTEXT_BUDGET_CONFLICT");
    assert_eq!(engine.budget_profile(), updated);
}

#[tokio::test]
async fn smaller_total_budget_cuts_retrieved_first() {
    let engine = ContextEngine::new().with_fetcher(
        LayerId::Retrieved,
        chunks(vec![LayerChunk::new("rag:chunk-1", "r".repeat(8000))]),
    );
    let mut profile = engine.budget_profile();
    profile.total_budget_tokens = 2000;
    profile.layers.immediate.minimum_tokens = 0;
    engine.update_budget_profile(profile).unwrap();

    let result = engine.assemble(&request()).await.unwrap();
    assert!(result.layers.retrieved.truncated);
    assert!(!result.layers.rules.truncated);
    assert!(!result.layers.immediate.truncated);
    assert_eq!(result.token_count, 2000);
}

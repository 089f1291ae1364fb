//! End-to-end scenarios over a temp-directory database.
//!
//! These run the facade in-process: every test gets its own store under a
//! fresh tempdir, embeddings disabled, so only subprocess-backed paths need
//! external binaries (`cat`, `false` — both POSIX).

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use emdx::config::Config;
use emdx::error::Error;
use emdx::exec;
use emdx::facade::{DelegateArgs, FindArgs, SaveArgs, SaveSource, Store};
use emdx::models::{DocType, ExecutionStatus, TaskStatus};
use emdx::search::SearchMode;
use emdx::tasks::AddTaskOpts;
use emdx::{db, migrate};

fn test_config(tmp: &TempDir) -> Config {
    let mut config = Config::default();
    config.db.path = Some(tmp.path().join("knowledge.db"));
    config.db.backup_dir = Some(tmp.path().join("backups"));
    config.db.log_dir = Some(tmp.path().join("logs"));
    config
}

async fn open_store(tmp: &TempDir) -> Store {
    Store::open(test_config(tmp)).await.unwrap()
}

fn text_save(title: &str, content: &str, tags: &[&str]) -> SaveArgs {
    SaveArgs {
        source: SaveSource::Text(content.to_string()),
        title: Some(title.to_string()),
        tags: tags.iter().map(|s| s.to_string()).collect(),
        project: None,
        doc_type: None,
        auto_link: true,
    }
}

// ============ Scenario: save + find + view ============

#[tokio::test]
async fn save_find_view_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let content = "Token refresh fails when clock skew > 30s";
    let saved = store
        .save(text_save("Auth Bug", content, &["bugfix"]))
        .await
        .unwrap();
    let id = saved.document.id;
    assert_eq!(saved.tags, vec!["bugfix"]);

    let items = store
        .find(FindArgs {
            query: Some("skew".to_string()),
            mode: SearchMode::Hybrid,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(!items.is_empty());
    assert_eq!(items[0].id, id);

    let view = store.view(id).await.unwrap();
    assert_eq!(view.document.content, content);
    assert_eq!(view.document.access_count, 1);

    store.shutdown().await;
}

#[tokio::test]
async fn content_hash_tracks_content() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let saved = store.save(text_save("Doc", "first body", &[])).await.unwrap();
    let expected = {
        use sha2::{Digest, Sha256};
        let mut h = Sha256::new();
        h.update(b"first body");
        format!("{:x}", h.finalize())
    };
    assert_eq!(saved.document.content_hash, expected);
    assert_eq!(saved.document.current_version, 1);

    // Edit bumps hash + version; identical edit is a no-op.
    let edited = store.edit(saved.document.id, "second body").await.unwrap();
    assert_eq!(edited.current_version, 2);
    assert_ne!(edited.content_hash, expected);

    let unchanged = store.edit(saved.document.id, "second body").await.unwrap();
    assert_eq!(unchanged.current_version, 2);
    assert_eq!(unchanged.updated_at, edited.updated_at);

    let versions = store.versions(saved.document.id).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].version_number, 1);
    assert_eq!(versions[1].version_number, 2);

    store.shutdown().await;
}

// ============ Scenario: delete / restore ============

#[tokio::test]
async fn delete_restore_preserves_tags_and_hides_from_search() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let saved = store
        .save(text_save("Zebra Notes", "the zebraword appears here", &["animals"]))
        .await
        .unwrap();
    let id = saved.document.id;

    store.delete(id).await.unwrap();

    // Invisible to every search mode.
    let items = store
        .find(FindArgs {
            query: Some("zebraword".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(items.is_empty());

    // Double-delete is a conflict, as is restoring a live doc.
    assert!(matches!(store.delete(id).await, Err(Error::Conflict(_))));

    let restored = store.restore(id).await.unwrap();
    assert!(!restored.is_deleted);
    assert_eq!(store.tag_list(id).await.unwrap(), vec!["animals"]);
    assert!(matches!(store.restore(id).await, Err(Error::Conflict(_))));

    // Back in search after restore.
    let items = store
        .find(FindArgs {
            query: Some("zebraword".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(items.len(), 1);

    store.shutdown().await;
}

#[tokio::test]
async fn purge_trash_only_removes_old_entries() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let saved = store.save(text_save("Old", "x", &[])).await.unwrap();
    store.delete(saved.document.id).await.unwrap();

    // Deleted just now; a 1-day cutoff keeps it.
    let report = store.maintain_compact(1).await.unwrap();
    assert_eq!(report.purged, 0);

    // Backdate the deletion, then compact again.
    sqlx::query("UPDATE documents SET deleted_at = deleted_at - 200000 WHERE id = ?")
        .bind(saved.document.id)
        .execute(store.pool())
        .await
        .unwrap();
    let report = store.maintain_compact(1).await.unwrap();
    assert_eq!(report.purged, 1);
    assert!(matches!(
        store.view(saved.document.id).await,
        Err(Error::NotFound(_))
    ));

    store.shutdown().await;
}

// ============ Search behaviours ============

#[tokio::test]
async fn empty_query_is_an_input_error() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let err = store
        .find(FindArgs {
            query: Some("   ".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Input(_)));

    store.shutdown().await;
}

#[tokio::test]
async fn operator_chars_are_quoted_to_literals() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .save(text_save("Hyphen Doc", "discussing foo-bar semantics", &[]))
        .await
        .unwrap();

    // Unquoted, `foo-bar` would be column-filter syntax and error out.
    let items = store
        .find(FindArgs {
            query: Some("foo-bar".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(items.len(), 1);

    store.shutdown().await;
}

#[tokio::test]
async fn qa_docs_hidden_unless_requested() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .save(SaveArgs {
            doc_type: Some(DocType::Qa),
            ..text_save("Q: what is flibber?", "flibber is a test token", &[])
        })
        .await
        .unwrap();

    let hidden = store
        .find(FindArgs {
            query: Some("flibber".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(hidden.is_empty());

    let mut args = FindArgs {
        query: Some("flibber".to_string()),
        ..Default::default()
    };
    args.filters.include_qa = true;
    let shown = store.find(args).await.unwrap();
    assert_eq!(shown.len(), 1);

    store.shutdown().await;
}

#[tokio::test]
async fn tag_filters_narrow_results() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .save(text_save("One", "gadget alpha", &["hardware"]))
        .await
        .unwrap();
    store
        .save(text_save("Two", "gadget beta", &["software"]))
        .await
        .unwrap();

    let mut args = FindArgs {
        query: Some("gadget".to_string()),
        ..Default::default()
    };
    args.filters.tags_all = vec!["hardware".to_string()];
    let items = store.find(args).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "One");

    let mut args = FindArgs {
        query: Some("gadget".to_string()),
        ..Default::default()
    };
    args.filters.tags_none = vec!["hardware".to_string()];
    let items = store.find(args).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Two");

    store.shutdown().await;
}

#[tokio::test]
async fn recent_returns_newest_first_without_ranking() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    for i in 0..5 {
        store
            .save(text_save(&format!("Doc {i}"), "body", &[]))
            .await
            .unwrap();
    }

    let items = store
        .find(FindArgs {
            recent: Some(3),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(items.len(), 3);
    // Same updated_at second is possible; ids break the tie newest-first.
    assert!(items[0].id > items[2].id);

    store.shutdown().await;
}

// ============ Tags ============

#[tokio::test]
async fn tag_names_canonicalise_to_one_tag() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let saved = store.save(text_save("Doc", "x", &[])).await.unwrap();
    let tags = store
        .tag_add(
            saved.document.id,
            &["Foo".to_string(), "foo".to_string(), "  foo  ".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(tags, vec!["foo"]);

    store.shutdown().await;
}

// ============ Scenario: dependency gating ============

#[tokio::test]
async fn dependency_gates_ready_until_blocker_done() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let a = store.task_add("A", AddTaskOpts::default()).await.unwrap();
    let b = store.task_add("B", AddTaskOpts::default()).await.unwrap();

    store
        .task_dep_add(&format!("#{}", b.id), &format!("#{}", a.id))
        .await
        .unwrap();

    let ready: Vec<i64> = store.task_ready().await.unwrap().iter().map(|t| t.id).collect();
    assert_eq!(ready, vec![a.id]);

    store
        .task_status(&format!("#{}", a.id), TaskStatus::Done)
        .await
        .unwrap();

    let ready: Vec<i64> = store.task_ready().await.unwrap().iter().map(|t| t.id).collect();
    assert_eq!(ready, vec![b.id]);

    store.shutdown().await;
}

// ============ Scenario: cycle rejection ============

#[tokio::test]
async fn dependency_cycles_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let t1 = store.task_add("one", AddTaskOpts::default()).await.unwrap();
    let t2 = store.task_add("two", AddTaskOpts::default()).await.unwrap();
    let t3 = store.task_add("three", AddTaskOpts::default()).await.unwrap();

    // 2 depends on 1, 3 depends on 2.
    store
        .task_dep_add(&format!("#{}", t2.id), &format!("#{}", t1.id))
        .await
        .unwrap();
    store
        .task_dep_add(&format!("#{}", t3.id), &format!("#{}", t2.id))
        .await
        .unwrap();

    // Closing the loop must fail and leave the graph unchanged.
    let err = store
        .task_dep_add(&format!("#{}", t1.id), &format!("#{}", t3.id))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let edges: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM task_dependencies")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(edges, 2);

    // Self-dependency is also a conflict.
    let err = store
        .task_dep_add(&format!("#{}", t1.id), &format!("#{}", t1.id))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    store.shutdown().await;
}

#[tokio::test]
async fn done_blocker_auto_unblocks_when_no_other_blocker_remains() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let a = store.task_add("A", AddTaskOpts::default()).await.unwrap();
    let b = store.task_add("B", AddTaskOpts::default()).await.unwrap();
    let c = store.task_add("C", AddTaskOpts::default()).await.unwrap();

    store
        .task_dep_add(&format!("#{}", c.id), &format!("#{}", a.id))
        .await
        .unwrap();
    store
        .task_dep_add(&format!("#{}", c.id), &format!("#{}", b.id))
        .await
        .unwrap();
    store
        .task_status(&format!("#{}", c.id), TaskStatus::Blocked)
        .await
        .unwrap();

    // One of two blockers done: still blocked.
    let change = store
        .task_status(&format!("#{}", a.id), TaskStatus::Done)
        .await
        .unwrap();
    assert!(change.unblocked.is_empty());

    // Last blocker done: auto-unblocked back to open.
    let change = store
        .task_status(&format!("#{}", b.id), TaskStatus::Done)
        .await
        .unwrap();
    assert_eq!(change.unblocked, vec![c.id]);
    let view = store.task_view(&format!("#{}", c.id)).await.unwrap();
    assert_eq!(view.task.status, TaskStatus::Open);

    store.shutdown().await;
}

// ============ Category identifiers & epics ============

#[tokio::test]
async fn category_tasks_get_sequential_display_ids() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let first = store
        .task_add(
            "fix the parser",
            AddTaskOpts {
                category: Some("fix".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let second = store
        .task_add(
            "fix the printer",
            AddTaskOpts {
                category: Some("FIX".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(first.display_id(), "FIX-1");
    assert_eq!(second.display_id(), "FIX-2");

    // Both identifier forms resolve.
    let by_cat = store.task_view("FIX-2").await.unwrap();
    assert_eq!(by_cat.task.id, second.id);
    let by_id = store.task_view(&format!("#{}", first.id)).await.unwrap();
    assert_eq!(by_id.task.display_id(), "FIX-1");

    assert!(matches!(
        store.task_view("FIX-99").await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        store.task_view("not an id").await,
        Err(Error::Input(_))
    ));

    store.shutdown().await;
}

#[tokio::test]
async fn epic_rollup_and_constraints() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let epic = store
        .task_add(
            "Big Refactor",
            AddTaskOpts {
                is_epic: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let epic_ref = format!("#{}", epic.id);

    for i in 0..3 {
        store
            .task_add(
                &format!("child {i}"),
                AddTaskOpts {
                    epic: Some(epic_ref.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let progress = store.task_epic_progress(&epic_ref).await.unwrap();
    assert_eq!(progress.total, 3);
    assert_eq!(progress.done, 0);

    // An epic cannot have an epic parent.
    let err = store
        .task_add(
            "nested epic",
            AddTaskOpts {
                is_epic: true,
                epic: Some(epic_ref.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Input(_)));

    // Completing the epic with open children yields a soft warning.
    let change = store.task_status(&epic_ref, TaskStatus::Done).await.unwrap();
    assert!(!change.warnings.is_empty());
    assert_eq!(change.task.status, TaskStatus::Done);

    store.shutdown().await;
}

// ============ Enrichment ============

#[tokio::test]
async fn title_match_enrichment_links_documents() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let target = store
        .save(text_save("Rate Limiting", "token bucket notes", &[]))
        .await
        .unwrap();
    let source = store
        .save(text_save(
            "Meeting Notes",
            "We discussed rate limiting at length today.",
            &[],
        ))
        .await
        .unwrap();

    let view = store.view(source.document.id).await.unwrap();
    assert!(
        view.links
            .iter()
            .any(|l| l.target_doc_id == target.document.id),
        "expected a title-match link, got {:?}",
        view.links
    );

    store.shutdown().await;
}

#[tokio::test]
async fn enrichment_skipped_when_auto_link_off() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .save(text_save("Shared Topic", "body", &[]))
        .await
        .unwrap();
    let doc = store
        .save(SaveArgs {
            auto_link: false,
            ..text_save("Other", "mentions Shared Topic explicitly", &[])
        })
        .await
        .unwrap();

    let view = store.view(doc.document.id).await.unwrap();
    assert!(view.links.is_empty());

    store.shutdown().await;
}

// ============ Events ============

#[tokio::test]
async fn every_mutation_appends_an_event() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let count = |pool: sqlx::SqlitePool| async move {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM knowledge_events")
            .fetch_one(&pool)
            .await
            .unwrap()
    };

    let before = count(store.pool().clone()).await;
    let saved = store
        .save(SaveArgs {
            auto_link: false,
            ..text_save("Doc", "body", &[])
        })
        .await
        .unwrap();
    let after_save = count(store.pool().clone()).await;
    assert_eq!(after_save, before + 1);

    store.edit(saved.document.id, "new body").await.unwrap();
    assert_eq!(count(store.pool().clone()).await, after_save + 1);

    store.delete(saved.document.id).await.unwrap();
    assert_eq!(count(store.pool().clone()).await, after_save + 2);

    store.shutdown().await;
}

// ============ Migrations ============

#[tokio::test]
async fn migrations_are_idempotent_and_monotonic() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);

    let pool = db::open(&config).await.unwrap();
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations_applied")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(applied as usize, migrate::MIGRATIONS.len());

    // Re-running applies nothing new and loses nothing.
    migrate::run_migrations(&pool).await.unwrap();
    let applied_again: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations_applied")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(applied, applied_again);
    pool.close().await;

    // A fresh process over the same file sees the same set.
    let pool = db::open(&config).await.unwrap();
    let applied_restart: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations_applied")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(applied, applied_restart);
    pool.close().await;
}

// ============ Executions ============

#[tokio::test]
async fn delegate_captures_output_as_tagged_document() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp);
    // `cat` echoes the prompt from stdin into the log.
    config.execution.agent_command = "cat".to_string();
    let store = Store::open(config).await.unwrap();

    let cancel = CancellationToken::new();
    let batch = store
        .delegate(
            DelegateArgs {
                prompts: vec!["# Findings\n\nclock skew was the culprit".to_string()],
                agent_type: "explore".to_string(),
                ..Default::default()
            },
            &cancel,
            |_| {},
        )
        .await
        .unwrap();

    assert_eq!(batch.outcomes.len(), 1);
    let execution = &batch.outcomes[0].execution;
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.exit_code, Some(0));
    let doc_id = execution.doc_id.expect("output doc saved");

    let view = store.view(doc_id).await.unwrap();
    assert_eq!(view.document.title, "Findings");
    assert!(view.tags.contains(&"subagent".to_string()));
    assert!(view.tags.contains(&"agent:explore".to_string()));
    // Output doc postdates the execution start.
    assert!(view.document.created_at >= execution.started_at);

    // collect is idempotent: no second document appears.
    let docs_before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(store.pool())
        .await
        .unwrap();
    exec::collect(store.pool(), store.config(), execution.id)
        .await
        .unwrap();
    let docs_after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(docs_before, docs_after);

    store.shutdown().await;
}

#[tokio::test]
async fn failed_child_records_exit_code_and_saves_nothing() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp);
    config.execution.agent_command = "false".to_string();
    let store = Store::open(config).await.unwrap();

    let cancel = CancellationToken::new();
    let batch = store
        .delegate(
            DelegateArgs {
                prompts: vec!["doomed".to_string()],
                ..Default::default()
            },
            &cancel,
            |_| {},
        )
        .await
        .unwrap();

    let execution = &batch.outcomes[0].execution;
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.exit_code, Some(1));
    assert!(execution.doc_id.is_none());

    store.shutdown().await;
}

#[tokio::test]
async fn spawn_failure_yields_one_failed_outcome_per_prompt() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp);
    // A binary that cannot resolve: the child never starts, which is a
    // distinct failure mode from a non-zero exit.
    config.execution.agent_command = "emdx-no-such-agent-binary".to_string();
    let store = Store::open(config).await.unwrap();

    let cancel = CancellationToken::new();
    let mut streamed = 0usize;
    let batch = store
        .delegate(
            DelegateArgs {
                prompts: vec!["first prompt".to_string(), "second prompt".to_string()],
                ..Default::default()
            },
            &cancel,
            |outcome| {
                streamed += 1;
                assert_eq!(outcome.execution.status, ExecutionStatus::Failed);
            },
        )
        .await
        .unwrap();

    // Every requested prompt is accounted for, both in the returned batch
    // and through the streaming callback.
    assert_eq!(batch.outcomes.len(), 2);
    assert_eq!(streamed, 2);
    for outcome in &batch.outcomes {
        assert_eq!(outcome.execution.status, ExecutionStatus::Failed);
        assert_eq!(outcome.execution.exit_code, Some(-1));
        assert!(outcome.execution.doc_id.is_none());
        assert!(outcome.output.is_none());
    }

    let failed = store
        .executions(Some(ExecutionStatus::Failed))
        .await
        .unwrap();
    assert_eq!(failed.len(), 2);

    store.shutdown().await;
}

#[tokio::test]
async fn stale_reaper_promotes_silent_runners_only() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let now = db::now();

    // A runner whose heartbeat went silent 31 minutes ago, and a live one.
    sqlx::query(
        "INSERT INTO executions (doc_title, status, started_at, log_file, agent_type, last_heartbeat)
         VALUES ('silent', 'running', ?, '/tmp/none.log', 'explore', ?)",
    )
    .bind(now - 3600)
    .bind(now - 31 * 60)
    .execute(store.pool())
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO executions (doc_title, status, started_at, log_file, agent_type, last_heartbeat)
         VALUES ('alive', 'running', ?, '/tmp/none.log', 'explore', ?)",
    )
    .bind(now - 60)
    .bind(now - 10)
    .execute(store.pool())
    .await
    .unwrap();

    let reaped = exec::reap_stale(store.pool(), now, 1800).await.unwrap();
    assert_eq!(reaped.len(), 1);

    let stale = store
        .executions(Some(ExecutionStatus::Stale))
        .await
        .unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].doc_title, "silent");

    let running = store
        .executions(Some(ExecutionStatus::Running))
        .await
        .unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].doc_title, "alive");

    store.shutdown().await;
}

// ============ Links ============

#[tokio::test]
async fn links_reject_self_and_duplicates() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let a = store.save(text_save("A", "a", &[])).await.unwrap().document.id;
    let b = store.save(text_save("B", "b", &[])).await.unwrap().document.id;

    use emdx::links;
    use emdx::models::LinkKind;

    links::link(store.pool(), a, b, LinkKind::Manual, None)
        .await
        .unwrap();
    let err = links::link(store.pool(), a, b, LinkKind::Manual, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    let err = links::link(store.pool(), a, a, LinkKind::Manual, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    // Same pair under a different kind is a distinct link.
    links::link(store.pool(), a, b, LinkKind::Semantic, Some(0.91))
        .await
        .unwrap();

    store.shutdown().await;
}

// ============ Digests ============

#[tokio::test]
async fn prime_digest_lists_recent_docs_and_ready_tasks() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store.save(text_save("Doc", "body", &[])).await.unwrap();
    store.task_add("todo", AddTaskOpts::default()).await.unwrap();

    let digest = store.prime().await.unwrap();
    assert_eq!(digest.recent_docs.len(), 1);
    assert_eq!(digest.ready_tasks.len(), 1);

    let briefing = store.briefing().await.unwrap();
    assert!(!briefing.recent_events.is_empty());

    store.shutdown().await;
}

#[tokio::test]
async fn status_counts_reflect_store_contents() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store.save(text_save("One", "x", &["t1"])).await.unwrap();
    let two = store.save(text_save("Two", "y", &[])).await.unwrap();
    store.delete(two.document.id).await.unwrap();
    store.task_add("task", AddTaskOpts::default()).await.unwrap();

    let report = store.status().await.unwrap();
    assert_eq!(report.documents_live, 1);
    assert_eq!(report.documents_trashed, 1);
    assert_eq!(report.tasks_open, 1);
    assert!(report.events >= 4);

    store.shutdown().await;
}

// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end pipeline behavior over the test-utils fakes.

use std::time::Duration;

use chrono::Utc;
use tally_config::RetrievalFailurePolicy;
use tally_core::{ExpenseAnalysis, ExpenseRecord, ExpenseUpdate, RecordStore, TallyError};
use tally_pipeline::session::parse_analysis;
use tally_pipeline::{SessionEvent, SessionState};
use tally_test_utils::{CallKind, ModelScript, TestHarness};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(2);

fn analysis(amount: f64, category: &str, note: &str, comment: &str) -> ExpenseAnalysis {
    ExpenseAnalysis {
        amount,
        category: category.into(),
        date: "2026-03-06 12:30:00".into(),
        note: note.into(),
        comment: comment.into(),
    }
}

fn deltas(events: &[SessionEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Delta(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

fn done(events: &[SessionEvent]) -> &ExpenseRecord {
    match events.last() {
        Some(SessionEvent::Done(record)) => record,
        other => panic!("expected a done event, got {other:?}"),
    }
}

async fn harness_with(scripts: Vec<ModelScript>) -> TestHarness {
    TestHarness::builder()
        .with_scripts(scripts)
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn deltas_concatenate_to_the_committed_analysis() {
    let expected = analysis(25.0, "Transport", "taxi", "Walking is free.");
    let harness = harness_with(vec![ModelScript::analysis(&expected, 5)]).await;

    let events = harness.analyze("u1", "taxi 25", None).await.unwrap();
    assert_eq!(events.len(), 6);
    assert!(events[..5].iter().all(|e| matches!(e, SessionEvent::Delta(_))));

    let reparsed = parse_analysis(&deltas(&events)).unwrap();
    assert_eq!(reparsed, expected);

    let record = done(&events);
    assert_eq!(record.owner_id, "u1");
    assert_eq!(record.amount, 25.0);
    assert_eq!(record.category, "Transport");
    assert_eq!(record.note, "taxi");
    assert_eq!(record.comment, "Walking is free.");

    let stored = harness.records.get("u1", record.id).await.unwrap();
    assert_eq!(&stored, record);
}

#[tokio::test]
async fn exactly_one_terminal_event_and_then_none() {
    let harness = harness_with(vec![ModelScript::analysis(
        &analysis(3.0, "Other", "gum", ""),
        2,
    )])
    .await;
    let mut session = harness.pipeline.start("u1", "gum 3", None).await.unwrap();
    let cancel = CancellationToken::new();

    let mut terminal = 0;
    while let Some(event) = session.next(&cancel).await {
        if !matches!(event, SessionEvent::Delta(_)) {
            terminal += 1;
        }
    }
    assert_eq!(terminal, 1);
    assert_eq!(session.state(), SessionState::Committed);
    assert!(session.next(&cancel).await.is_none());
}

#[tokio::test]
async fn search_failure_aborts_before_any_delta() {
    let harness = harness_with(vec![ModelScript::fragments(["{}"])]).await;
    harness.memory.set_fail_search(true);

    let err = harness
        .pipeline
        .start("u1", "lunch 12", None)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TallyError::StoreUnavailable { .. }));
    assert_eq!(harness.model.calls(), 0);
    assert_eq!(harness.record_count("u1").await.unwrap(), 0);
}

#[tokio::test]
async fn embedding_failure_aborts_before_any_delta() {
    let harness = harness_with(vec![ModelScript::fragments(["{}"])]).await;
    harness.embedder.set_failing(true);

    let err = harness
        .pipeline
        .start("u1", "lunch 12", None)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TallyError::EmbeddingUnavailable { .. }));
    assert_eq!(harness.memory.searches(), 0);
    assert_eq!(harness.model.calls(), 0);
}

#[tokio::test]
async fn degrade_policy_streams_without_history() {
    let harness = TestHarness::builder()
        .with_scripts(vec![ModelScript::analysis(
            &analysis(12.0, "Food & Dining", "lunch", ""),
            3,
        )])
        .with_retrieval_failure(RetrievalFailurePolicy::Degrade)
        .build()
        .await
        .unwrap();
    harness
        .seed_memory("u1", 99, "lunch at the canteen", "Food & Dining", TestHarness::now_ts())
        .await
        .unwrap();
    harness.memory.set_fail_search(true);

    let events = harness.analyze("u1", "lunch 12", None).await.unwrap();
    done(&events);
    let requests = harness.model.requests().await;
    assert!(requests[0].history.is_empty());
}

#[tokio::test]
async fn roast_off_forces_empty_comment() {
    let harness = harness_with(vec![ModelScript::analysis(
        &analysis(80.0, "Entertainment", "concert", "Hope it was worth it."),
        4,
    )])
    .await;

    let events = harness.analyze("u1", "concert 80", Some(false)).await.unwrap();
    assert_eq!(done(&events).comment, "");
    assert!(!harness.model.requests().await[0].roast);
}

#[tokio::test]
async fn roast_default_applies_when_unspecified() {
    let harness = TestHarness::builder()
        .with_scripts(vec![ModelScript::analysis(
            &analysis(80.0, "Entertainment", "concert", "Bold choice."),
            4,
        )])
        .with_roast_default(false)
        .build()
        .await
        .unwrap();

    let events = harness.analyze("u1", "concert 80", None).await.unwrap();
    assert_eq!(done(&events).comment, "");
}

#[tokio::test]
async fn history_is_owner_scoped_and_formatted() {
    let harness = harness_with(vec![ModelScript::analysis(
        &analysis(30.0, "Transport", "taxi", ""),
        2,
    )])
    .await;
    let now = TestHarness::now_ts();
    harness
        .seed_memory("u1", 1, "taxi to the airport", "Transport", now)
        .await
        .unwrap();
    harness
        .seed_memory("u1", 2, "taxi to the office", "Transport", now - 3 * 86_400)
        .await
        .unwrap();
    harness
        .seed_memory("u2", 3, "taxi to the station", "Travel", now)
        .await
        .unwrap();

    harness.analyze("u1", "taxi to the airport", None).await.unwrap();

    let history = &harness.model.requests().await[0].history;
    assert_eq!(
        history,
        &vec![
            "today [Transport] taxi to the airport".to_string(),
            "3 days ago [Transport] taxi to the office".to_string(),
        ]
    );
}

#[tokio::test]
async fn retrieval_respects_limit() {
    let harness = TestHarness::builder()
        .with_scripts(vec![ModelScript::analysis(&analysis(5.0, "Other", "x", ""), 1)])
        .with_retrieval_limit(1)
        .build()
        .await
        .unwrap();
    for id in 1..=3 {
        harness
            .seed_memory("u1", id, "snacks", "Food & Dining", TestHarness::now_ts())
            .await
            .unwrap();
    }

    harness.analyze("u1", "snacks", None).await.unwrap();
    assert_eq!(harness.model.requests().await[0].history.len(), 1);
}

#[tokio::test]
async fn commit_schedules_detached_reindex() {
    let harness = harness_with(vec![ModelScript::analysis(
        &analysis(4.5, "Food & Dining", "coffee", ""),
        3,
    )])
    .await;

    let events = harness.analyze("u1", "coffee 4.5", None).await.unwrap();
    let record = done(&events).clone();

    let indexed = harness
        .memory
        .wait_for(WAIT, |entries| {
            entries.iter().any(|e| {
                e.id == record.id
                    && e.owner_id == "u1"
                    && e.description == "coffee 4.5"
                    && e.category == "Food & Dining"
            })
        })
        .await;
    assert!(indexed, "memory entry was never written");
}

#[tokio::test]
async fn failed_reindex_does_not_affect_the_commit() {
    let harness = harness_with(vec![ModelScript::analysis(
        &analysis(4.5, "Food & Dining", "coffee", ""),
        3,
    )])
    .await;
    harness.memory.set_fail_upsert(true);

    let events = harness.analyze("u1", "coffee 4.5", None).await.unwrap();
    done(&events);
    assert!(harness.memory.wait_for_calls(CallKind::Upsert, 1, WAIT).await);
    assert!(harness.memory.entries().await.is_empty());
    assert_eq!(harness.record_count("u1").await.unwrap(), 1);
}

#[tokio::test]
async fn update_reembeds_under_the_same_identity() {
    let harness = harness_with(vec![ModelScript::analysis(
        &analysis(9.0, "Food & Dining", "sandwich", ""),
        2,
    )])
    .await;
    let events = harness.analyze("u1", "sandwich 9", None).await.unwrap();
    let id = done(&events).id;
    assert!(harness.memory.wait_for_calls(CallKind::Upsert, 1, WAIT).await);

    let update = ExpenseUpdate {
        category: Some("Transport".into()),
        amount: Some(12.0),
        note: Some("cab".into()),
        created_at: None,
    };
    harness
        .pipeline
        .update_expense("u1", id, update.clone())
        .await
        .unwrap();
    harness.pipeline.update_expense("u1", id, update).await.unwrap();
    assert!(harness.memory.wait_for_calls(CallKind::Upsert, 3, WAIT).await);

    let entries = harness.memory.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, id);
    assert_eq!(entries[0].description, "Expense: Transport, amount: 12.00, note: cab");
    assert_eq!(entries[0].category, "Transport");
}

#[tokio::test]
async fn update_ignores_blank_and_non_positive_fields() {
    let harness = harness_with(vec![ModelScript::analysis(
        &analysis(9.0, "Food & Dining", "sandwich", ""),
        2,
    )])
    .await;
    let events = harness.analyze("u1", "sandwich 9", None).await.unwrap();
    let id = done(&events).id;

    let updated = harness
        .pipeline
        .update_expense(
            "u1",
            id,
            ExpenseUpdate {
                category: Some("  ".into()),
                amount: Some(-4.0),
                note: Some("club sandwich".into()),
                created_at: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.category, "Food & Dining");
    assert_eq!(updated.amount, 9.0);
    assert_eq!(updated.note, "club sandwich");
}

#[tokio::test]
async fn foreign_owner_is_forbidden_and_changes_nothing() {
    let harness = harness_with(vec![ModelScript::analysis(
        &analysis(60.0, "Health & Medical", "dentist", ""),
        3,
    )])
    .await;
    let events = harness.analyze("alice", "dentist 60", None).await.unwrap();
    let record = done(&events).clone();
    assert!(harness.memory.wait_for_calls(CallKind::Upsert, 1, WAIT).await);
    let memory_before = harness.memory.get(record.id).await;

    let err = harness
        .pipeline
        .update_expense(
            "mallory",
            record.id,
            ExpenseUpdate {
                amount: Some(1.0),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TallyError::Forbidden));

    let err = harness
        .pipeline
        .delete_expense("mallory", record.id)
        .await
        .unwrap_err();
    assert!(matches!(err, TallyError::Forbidden));

    let err = harness.pipeline.get_expense("mallory", record.id).await.unwrap_err();
    assert!(matches!(err, TallyError::Forbidden));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.pipeline.get_expense("alice", record.id).await.unwrap(), record);
    assert_eq!(harness.memory.get(record.id).await, memory_before);
    assert_eq!(harness.memory.upserts(), 1);
    assert_eq!(harness.memory.deletes(), 0);
}

#[tokio::test]
async fn missing_record_is_not_found() {
    let harness = harness_with(Vec::new()).await;
    let err = harness.pipeline.delete_expense("u1", 4242).await.unwrap_err();
    assert!(matches!(err, TallyError::NotFound(_)));
}

#[tokio::test]
async fn delete_removes_memory_in_background() {
    let harness = harness_with(vec![ModelScript::analysis(
        &analysis(15.0, "Gifts & Social", "flowers", ""),
        2,
    )])
    .await;
    let events = harness.analyze("u1", "flowers 15", None).await.unwrap();
    let id = done(&events).id;
    assert!(
        harness
            .memory
            .wait_for(WAIT, |entries| entries.iter().any(|e| e.id == id))
            .await
    );

    harness.pipeline.delete_expense("u1", id).await.unwrap();
    assert!(matches!(
        harness.pipeline.get_expense("u1", id).await,
        Err(TallyError::NotFound(_))
    ));
    assert!(
        harness
            .memory
            .wait_for(WAIT, |entries| entries.iter().all(|e| e.id != id))
            .await
    );
}

#[tokio::test]
async fn cancel_after_two_fragments_commits_nothing() {
    let harness = harness_with(vec![ModelScript::analysis(
        &analysis(25.0, "Transport", "taxi", "Walk."),
        5,
    )])
    .await;
    let mut session = harness.pipeline.start("u1", "taxi 25", None).await.unwrap();
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        assert!(matches!(session.next(&cancel).await, Some(SessionEvent::Delta(_))));
    }
    cancel.cancel();
    assert!(session.next(&cancel).await.is_none());
    assert_eq!(session.state(), SessionState::Aborted);
    assert!(session.next(&cancel).await.is_none());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.record_count("u1").await.unwrap(), 0);
    assert_eq!(harness.memory.upserts(), 0);
}

#[tokio::test]
async fn disconnect_during_commit_still_reindexes() {
    let harness = TestHarness::builder()
        .with_scripts(vec![ModelScript::analysis(
            &analysis(25.0, "Transport", "taxi", "Walk."),
            2,
        )])
        .with_commit_delay(Duration::from_millis(300))
        .build()
        .await
        .unwrap();
    let mut session = harness.pipeline.start("u1", "taxi 25", None).await.unwrap();
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        assert!(matches!(session.next(&cancel).await, Some(SessionEvent::Delta(_))));
    }
    // The client goes away while the row is being written.
    let pending = tokio::time::timeout(Duration::from_millis(50), session.next(&cancel)).await;
    assert!(pending.is_err(), "commit should still be in flight");
    drop(session);

    assert!(harness.memory.wait_for(WAIT, |entries| entries.len() == 1).await);
    assert_eq!(harness.memory.upserts(), 1);
    assert_eq!(harness.record_count("u1").await.unwrap(), 1);
    let entries = harness.memory.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].description, "taxi 25");
    assert_eq!(entries[0].category, "Transport");
}

#[tokio::test]
async fn dropping_the_session_stops_the_model_stream() {
    let harness =
        harness_with(vec![ModelScript::fragments(["{\"amount\":"]).hanging_after(1)]).await;
    let session = harness.pipeline.start("u1", "taxi", None).await.unwrap();
    drop(session);

    let deadline = tokio::time::Instant::now() + WAIT;
    while harness.model.streams_dropped() == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(harness.model.streams_dropped(), 1);
    assert_eq!(harness.record_count("u1").await.unwrap(), 0);
}

#[tokio::test]
async fn model_failure_mid_stream_is_a_terminal_error() {
    let harness = harness_with(vec![
        ModelScript::fragments(["{\"amount\"", ": 5", ", \"category\""]).failing_after(2),
    ])
    .await;

    let events = harness.analyze("u1", "stuff 5", None).await.unwrap();
    assert_eq!(events.len(), 3);
    assert!(matches!(events[2], SessionEvent::Error(TallyError::Provider { .. })));
    assert_eq!(harness.record_count("u1").await.unwrap(), 0);
}

#[tokio::test]
async fn malformed_output_is_rejected_without_commit() {
    let harness = harness_with(vec![ModelScript::fragments([
        "{\"amount\": 3",
        ", \"category\": \"Other\"}",
    ])])
    .await;

    let events = harness.analyze("u1", "thing 3", None).await.unwrap();
    assert_eq!(deltas(&events), "{\"amount\": 3, \"category\": \"Other\"}");
    assert!(matches!(
        events.last(),
        Some(SessionEvent::Error(TallyError::MalformedModelOutput { .. }))
    ));
    assert_eq!(harness.record_count("u1").await.unwrap(), 0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.memory.upserts(), 0);
}

#[tokio::test]
async fn empty_fragments_are_not_relayed() {
    let json = serde_json::to_string(&analysis(2.0, "Other", "pen", "")).unwrap();
    let harness = harness_with(vec![ModelScript::fragments([
        String::new(),
        json.clone(),
        String::new(),
    ])])
    .await;

    let events = harness.analyze("u1", "pen 2", None).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(deltas(&events), json);
}

#[tokio::test(start_paused = true)]
async fn request_timeout_ends_the_stream() {
    let harness = TestHarness::builder()
        .with_scripts(vec![ModelScript::fragments(["{\"amount\":"]).hanging_after(1)])
        .with_request_timeout_secs(1)
        .build()
        .await
        .unwrap();

    let events = harness.analyze("u1", "slow", None).await.unwrap();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[1], SessionEvent::Error(TallyError::Timeout { .. })));
}

#[tokio::test]
async fn blank_description_is_rejected_before_retrieval() {
    let harness = harness_with(Vec::new()).await;
    let err = harness.pipeline.start("u1", "   ", None).await.err().unwrap();
    assert!(matches!(err, TallyError::InvalidInput(_)));
    assert_eq!(harness.embedder.calls(), 0);
}

#[tokio::test]
async fn model_start_failure_is_reported_before_streaming() {
    let harness = harness_with(Vec::new()).await;
    harness.model.set_fail_start(true);
    let err = harness.pipeline.start("u1", "bus 2", None).await.err().unwrap();
    assert!(matches!(err, TallyError::Provider { .. }));
}

#[tokio::test]
async fn unparseable_date_falls_back_to_now() {
    let mut odd = analysis(7.0, "Other", "socks", "");
    odd.date = "last tuesday".into();
    let harness = harness_with(vec![ModelScript::analysis(&odd, 2)]).await;

    let before = Utc::now();
    let events = harness.analyze("u1", "socks 7", None).await.unwrap();
    let created = done(&events).created_at;
    assert!(created >= before - chrono::Duration::seconds(1));
    assert!(created <= Utc::now() + chrono::Duration::seconds(1));
}

#[tokio::test]
async fn list_is_owner_scoped() {
    let harness = harness_with(vec![
        ModelScript::analysis(&analysis(1.0, "Other", "a", ""), 1),
        ModelScript::analysis(&analysis(2.0, "Other", "b", ""), 1),
        ModelScript::analysis(&analysis(3.0, "Other", "c", ""), 1),
    ])
    .await;
    harness.analyze("u1", "a", None).await.unwrap();
    harness.analyze("u1", "b", None).await.unwrap();
    harness.analyze("u2", "c", None).await.unwrap();

    let page = harness
        .pipeline
        .list_expenses(tally_core::ExpenseFilter::for_owner("u1"))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert!(page.items.iter().all(|r| r.owner_id == "u1"));
}

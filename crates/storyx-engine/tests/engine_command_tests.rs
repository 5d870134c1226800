// Integration tests for engine commands over an on-disk database.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{TimeZone, Utc};
use rusqlite::Connection;
use serde_json::json;
use storyx_core::model::{
    ChangeType, ConsistencyWarning, EntityState, EntityType, RawFinding, StateSnapshot,
    WarningStatus, WarningType,
};
use storyx_core::{CompactionPolicy, ExErrorKind, FieldChange, StateUpdate};
use storyx_core_types::correlation::{RequestContext, RequestId};
use storyx_engine::{
    apply_engine_command, apply_engine_command_with_context, apply_engine_query, EngineCommand,
    EngineCommandResult, EngineQuery, EngineQueryResult,
};
use tempfile::TempDir;

const PROJECT: &str = "novel-1";

fn setup_db() -> (TempDir, Connection) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let conn = storyx_store::db::open_and_migrate(&db_path).unwrap();
    (temp_dir, conn)
}

fn policy() -> CompactionPolicy {
    CompactionPolicy::default()
}

fn record(conn: &mut Connection, value: serde_json::Value) -> EngineCommandResult {
    let update = StateUpdate::new(
        "alice",
        EntityType::Character,
        ChangeType::Update,
        EntityState::from_json(&value),
    );
    apply_engine_command(EngineCommand::RecordState { update }, PROJECT, conn, &policy()).unwrap()
}

fn finding(id: &str, entity: &str) -> RawFinding {
    RawFinding {
        id: Some(id.to_string()),
        entity_id: entity.to_string(),
        entity_type: EntityType::Character,
        entity_name: "Alice".to_string(),
        warning_type: WarningType::NameConflict,
        severity: None,
        description: "Alice is called Alicia in chapter 2".to_string(),
        suggestion: Some("Pick one spelling".to_string()),
        expected_value: Some("Alice".to_string()),
        actual_value: Some("Alicia".to_string()),
    }
}

#[test]
fn test_record_state_writes_keyframe_then_delta() {
    let (_tmp, mut conn) = setup_db();

    let first = record(&mut conn, json!({"name": "Alice"}));
    let second = record(&mut conn, json!({"name": "Alice", "age": "30"}));
    let unchanged = record(&mut conn, json!({"name": "Alice", "age": "30"}));

    let EngineCommandResult::SnapshotWritten(first) = first else {
        panic!("expected a write");
    };
    let EngineCommandResult::SnapshotWritten(second) = second else {
        panic!("expected a write");
    };
    assert!(first.snapshot.is_keyframe());
    assert!(!second.snapshot.is_keyframe());
    assert_eq!(second.position, 1);
    assert_eq!(unchanged, EngineCommandResult::StateUnchanged);
}

#[test]
fn test_append_snapshot_rejects_out_of_order() {
    let (_tmp, mut conn) = setup_db();
    let at = |secs: i64| Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();

    let k0 = StateSnapshot::keyframe(
        "alice",
        EntityType::Character,
        ChangeType::Initial,
        EntityState::from_json(&json!({"name": "Alice"})),
    )
    .at(at(10));
    apply_engine_command(
        EngineCommand::AppendSnapshot { snapshot: k0, backfill: false },
        PROJECT,
        &mut conn,
        &policy(),
    )
    .unwrap();

    let early = StateSnapshot::delta(
        "alice",
        EntityType::Character,
        ChangeType::Update,
        vec![FieldChange::new("age", None, Some(json!("30")))],
    )
    .at(at(5));
    let err = apply_engine_command(
        EngineCommand::AppendSnapshot { snapshot: early, backfill: false },
        PROJECT,
        &mut conn,
        &policy(),
    )
    .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::OutOfOrder);
    assert_eq!(err.op(), Some("append_snapshot"));
}

#[test]
fn test_checkpoint_after_keeps_states() {
    let (_tmp, mut conn) = setup_db();
    record(&mut conn, json!({"name": "Alice"}));
    let EngineCommandResult::SnapshotWritten(d1) = record(&mut conn, json!({"name": "Alicia"})) else {
        panic!("expected a write");
    };

    let result = apply_engine_command(
        EngineCommand::CheckpointAfter {
            entity_id: "alice".into(),
            snapshot_id: d1.snapshot.id.clone(),
        },
        PROJECT,
        &mut conn,
        &policy(),
    )
    .unwrap();
    let EngineCommandResult::SnapshotWritten(checkpoint) = result else {
        panic!("expected a write");
    };
    assert!(checkpoint.snapshot.is_keyframe());

    let state = apply_engine_query(
        EngineQuery::Materialize {
            entity_id: "alice".into(),
            snapshot_id: checkpoint.snapshot.id.clone(),
        },
        PROJECT,
        &conn,
    )
    .unwrap();
    assert_eq!(
        state,
        EngineQueryResult::State(EntityState::from_json(&json!({"name": "Alicia"})))
    );
}

#[test]
fn test_warning_lifecycle_through_commands() {
    let (_tmp, mut conn) = setup_db();

    let ingested = apply_engine_command(
        EngineCommand::IngestFinding { finding: finding("w1", "alice") },
        PROJECT,
        &mut conn,
        &policy(),
    )
    .unwrap();
    let EngineCommandResult::Warning(warning) = ingested else {
        panic!("expected a warning");
    };
    assert_eq!(warning.project_id, PROJECT);
    assert_eq!(warning.status, WarningStatus::Pending);

    let dismissed = apply_engine_command(
        EngineCommand::DismissWarning { warning_id: "w1".into() },
        PROJECT,
        &mut conn,
        &policy(),
    )
    .unwrap();
    assert!(matches!(
        dismissed,
        EngineCommandResult::Warning(ref w) if w.status == WarningStatus::Dismissed
    ));

    let err = apply_engine_command(
        EngineCommand::ResolveWarning { warning_id: "w1".into(), note: None },
        PROJECT,
        &mut conn,
        &policy(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::AlreadyTerminal);
}

#[test]
fn test_delete_entity_cascades() {
    let (_tmp, mut conn) = setup_db();
    record(&mut conn, json!({"name": "Alice"}));
    record(&mut conn, json!({"name": "Alicia"}));
    apply_engine_command(
        EngineCommand::IngestFinding { finding: finding("w1", "alice") },
        PROJECT,
        &mut conn,
        &policy(),
    )
    .unwrap();
    apply_engine_command(
        EngineCommand::IngestFinding { finding: finding("w2", "bob") },
        PROJECT,
        &mut conn,
        &policy(),
    )
    .unwrap();

    let deleted = apply_engine_command(
        EngineCommand::DeleteEntity { entity_id: "alice".into() },
        PROJECT,
        &mut conn,
        &policy(),
    )
    .unwrap();
    let EngineCommandResult::Deleted(counts) = deleted else {
        panic!("expected deletion counts");
    };
    assert_eq!((counts.snapshots, counts.warnings), (2, 1));

    let remaining = apply_engine_query(EngineQuery::WarningCounts, PROJECT, &conn).unwrap();
    let EngineQueryResult::WarningCounts(remaining) = remaining else {
        panic!("expected counts");
    };
    assert_eq!(remaining.total, 1);
}

#[test]
fn test_context_without_project_is_rejected() {
    let (_tmp, mut conn) = setup_db();
    let ctx = RequestContext::with_request_id(RequestId::from_string("req-42"));

    let err = apply_engine_command_with_context(EngineCommand::DeleteProject, &mut conn, &policy(), &ctx)
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::InvalidInput);
    assert_eq!(err.request_id().map(|r| r.as_str()), Some("req-42"));
}

#[test]
fn test_insert_warning_must_start_pending() {
    let (_tmp, mut conn) = setup_db();
    let warning = ConsistencyWarning {
        status: WarningStatus::Dismissed,
        resolution: Some("note on a dismissed warning".into()),
        ..ConsistencyWarning::from_finding("other-project", finding("w1", "alice"))
    };

    let err = apply_engine_command(
        EngineCommand::InsertWarning { warning },
        PROJECT,
        &mut conn,
        &policy(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::InvalidInput);
    assert_eq!(err.warning_id(), Some("w1"));

    let counts = apply_engine_query(EngineQuery::WarningCounts, PROJECT, &conn).unwrap();
    assert!(matches!(counts, EngineQueryResult::WarningCounts(c) if c.total == 0));
}

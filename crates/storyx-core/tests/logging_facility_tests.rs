#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{delta, finding, keyframe};
use serde_json::json;
use storyx_core::errors::StoryXError;
use storyx_core::logging_facility::test_capture::init_test_capture;
use storyx_core::model::WarningType;
use storyx_core::{log_op_end, log_op_error, log_op_start, Store};
use storyx_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_START};

#[test]
fn test_log_op_start_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_start_unique_1";

    log_op_start!(op_name, entity_id = "char-1");

    let events = capture.events_for(op_name, EVENT_START);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].field("entity_id"), Some("char-1"));
}

#[test]
fn test_log_op_end_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_end_unique_2";

    log_op_end!(op_name, duration_ms = 42);

    let events = capture.events_for(op_name, EVENT_END);
    assert_eq!(events.len(), 1, "Should have exactly one end event");
    assert_eq!(events[0].fields.get("duration_ms"), Some(&"42".to_string()));
}

#[test]
fn test_log_op_error_includes_code() {
    let capture = init_test_capture();
    let op_name = "test_log_op_error_unique_3";

    let err = StoryXError::WarningNotFound {
        warning_id: "w1".to_string(),
    };
    log_op_error!(op_name, err, duration_ms = 10);

    let events = capture.events_for(op_name, EVENT_END_ERROR);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].field("err_code"), Some("ERR_NOT_FOUND"));
    assert_eq!(events[0].field("err_kind"), Some("NotFound"));
}

#[test]
fn test_store_append_emits_start_and_end() {
    let capture = init_test_capture();
    let store = Store::new("project-logging-append");

    store
        .append_snapshot(keyframe("log-e1", 0, json!({"name": "Alice"})), false)
        .unwrap();

    let starts: Vec<_> = capture
        .events_for("append_snapshot", EVENT_START)
        .into_iter()
        .filter(|e| e.field("project_id") == Some("project-logging-append"))
        .collect();
    assert_eq!(starts.len(), 1);
    assert!(!capture.events_for("append_snapshot", EVENT_END).is_empty());
}

#[test]
fn test_store_failure_emits_end_error_with_code() {
    let capture = init_test_capture();
    let store = Store::new("project-logging-error");

    // A delta cannot open a log
    let err = store
        .append_snapshot(delta("log-e2", 0, "name", None, Some(json!("Bob"))), false)
        .unwrap_err();
    assert_eq!(err.code(), "ERR_MISSING_KEYFRAME");
    assert_eq!(err.op(), Some("append_snapshot"));

    let errors = capture.events_for("append_snapshot", EVENT_END_ERROR);
    assert!(errors
        .iter()
        .any(|e| e.field("err_code") == Some("ERR_MISSING_KEYFRAME")));
}

#[test]
fn test_warning_transition_failure_is_logged() {
    let capture = init_test_capture();
    let store = Store::new("project-logging-warning");
    store
        .ingest_finding(finding("log-w1", WarningType::MissingField, Some("INFO")))
        .unwrap();
    store.dismiss_warning("log-w1").unwrap();

    let err = store.resolve_warning("log-w1", None).unwrap_err();
    assert_eq!(err.code(), "ERR_ALREADY_TERMINAL");

    let errors = capture.events_for("resolve_warning", EVENT_END_ERROR);
    assert!(errors
        .iter()
        .any(|e| e.field("err_code") == Some("ERR_ALREADY_TERMINAL")));
}

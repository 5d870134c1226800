#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Barrier};
use storyx_core::model::{
    ConsistencyWarning, EntityType, RawFinding, Severity, WarningStatus, WarningType,
    DEFAULT_RESOLUTION_NOTE,
};
use storyx_core::{ExErrorKind, WarningFilter};
use storyx_store::db::{open_and_migrate, open_in_memory_migrated};
use storyx_store::WarningRepo;

const PROJECT: &str = "project-1";

fn finding(id: &str, entity: &str, warning_type: WarningType, severity: Option<&str>) -> RawFinding {
    RawFinding {
        id: Some(id.to_string()),
        entity_id: entity.to_string(),
        entity_type: EntityType::Character,
        entity_name: entity.to_uppercase(),
        warning_type,
        severity: severity.map(String::from),
        description: format!("finding {}", id),
        suggestion: None,
        expected_value: None,
        actual_value: None,
    }
}

/// Scenario 2: resolve then dismiss the same warning
#[test]
fn test_resolve_then_dismiss_is_already_terminal() {
    // GIVEN
    let mut conn = open_in_memory_migrated().unwrap();
    WarningRepo::ingest(&conn, PROJECT, finding("w1", "alice", WarningType::NameConflict, None)).unwrap();

    // WHEN
    let resolved = WarningRepo::resolve(&mut conn, PROJECT, "w1", Some("renamed in ch. 4")).unwrap();
    let err = WarningRepo::dismiss(&mut conn, PROJECT, "w1").unwrap_err();

    // THEN
    assert_eq!(resolved.status, WarningStatus::Resolved);
    assert_eq!(resolved.resolution.as_deref(), Some("renamed in ch. 4"));
    assert!(resolved.resolved_at.is_some());
    assert_eq!(err.kind(), ExErrorKind::AlreadyTerminal);
    let stored = WarningRepo::get(&conn, PROJECT, "w1").unwrap();
    assert_eq!(stored, resolved);
}

#[test]
fn test_resolve_without_note_uses_default() {
    let mut conn = open_in_memory_migrated().unwrap();
    WarningRepo::ingest(&conn, PROJECT, finding("w1", "alice", WarningType::PlotHole, None)).unwrap();
    let resolved = WarningRepo::resolve(&mut conn, PROJECT, "w1", None).unwrap();
    assert_eq!(resolved.resolution.as_deref(), Some(DEFAULT_RESOLUTION_NOTE));
}

#[test]
fn test_unknown_warning_is_not_found() {
    let mut conn = open_in_memory_migrated().unwrap();
    let err = WarningRepo::dismiss(&mut conn, PROJECT, "nope").unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);

    // Warnings are scoped to their project
    WarningRepo::ingest(&conn, "other", finding("w1", "alice", WarningType::PlotHole, None)).unwrap();
    let err = WarningRepo::resolve(&mut conn, PROJECT, "w1", None).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);
}

#[test]
fn test_counts_cover_pending_only() {
    let mut conn = open_in_memory_migrated().unwrap();
    WarningRepo::ingest(&conn, PROJECT, finding("e1", "alice", WarningType::NameConflict, None)).unwrap();
    WarningRepo::ingest(&conn, PROJECT, finding("e2", "bob", WarningType::TimelineConflict, None)).unwrap();
    WarningRepo::ingest(&conn, PROJECT, finding("w1", "alice", WarningType::PlotHole, None)).unwrap();
    WarningRepo::ingest(&conn, PROJECT, finding("i1", "bob", WarningType::MissingField, None)).unwrap();
    WarningRepo::dismiss(&mut conn, PROJECT, "e2").unwrap();

    let counts = WarningRepo::counts(&conn, PROJECT).unwrap();
    assert_eq!((counts.error, counts.warning, counts.info, counts.total), (1, 1, 1, 3));
}

#[test]
fn test_list_orders_by_severity_then_creation() {
    let conn = open_in_memory_migrated().unwrap();
    WarningRepo::ingest(&conn, PROJECT, finding("i1", "alice", WarningType::MissingField, None)).unwrap();
    WarningRepo::ingest(&conn, PROJECT, finding("w1", "alice", WarningType::PlotHole, None)).unwrap();
    WarningRepo::ingest(&conn, PROJECT, finding("e1", "bob", WarningType::NameConflict, None)).unwrap();
    WarningRepo::ingest(&conn, PROJECT, finding("e2", "alice", WarningType::Other("X".into()), Some("critical")))
        .unwrap();

    let listed: Vec<String> = WarningRepo::list(&conn, PROJECT, &WarningFilter::default())
        .unwrap()
        .into_iter()
        .map(|w| w.id)
        .collect();
    assert_eq!(listed, vec!["e1", "e2", "w1", "i1"]);

    let alice_errors: Vec<String> = WarningRepo::list(
        &conn,
        PROJECT,
        &WarningFilter::pending().with_severity(Severity::Error).for_entity("alice"),
    )
    .unwrap()
    .into_iter()
    .map(|w| w.id)
    .collect();
    assert_eq!(alice_errors, vec!["e2"]);
}

#[test]
fn test_grouped_sections_follow_display_order() {
    let mut conn = open_in_memory_migrated().unwrap();
    WarningRepo::ingest(&conn, PROJECT, finding("i1", "alice", WarningType::MissingField, None)).unwrap();
    WarningRepo::ingest(&conn, PROJECT, finding("e1", "alice", WarningType::NameConflict, None)).unwrap();
    WarningRepo::ingest(&conn, PROJECT, finding("w1", "alice", WarningType::PlotHole, None)).unwrap();
    WarningRepo::resolve(&mut conn, PROJECT, "w1", None).unwrap();

    let groups = WarningRepo::grouped(&conn, PROJECT, &WarningFilter::default()).unwrap();
    let sections: Vec<(Severity, bool, usize)> = groups
        .iter()
        .map(|g| (g.severity, g.expanded, g.warnings.len()))
        .collect();
    assert_eq!(
        sections,
        vec![(Severity::Error, true, 1), (Severity::Info, false, 1)]
    );

    let everything = WarningRepo::list(&conn, PROJECT, &WarningFilter::all()).unwrap();
    assert_eq!(everything.len(), 3);
}

#[test]
fn test_delete_entity_cascades_to_its_warnings() {
    let conn = open_in_memory_migrated().unwrap();
    WarningRepo::ingest(&conn, PROJECT, finding("a1", "alice", WarningType::PlotHole, None)).unwrap();
    WarningRepo::ingest(&conn, PROJECT, finding("a2", "alice", WarningType::NameConflict, None)).unwrap();
    WarningRepo::ingest(&conn, PROJECT, finding("b1", "bob", WarningType::PlotHole, None)).unwrap();

    assert_eq!(WarningRepo::delete_entity(&conn, PROJECT, "alice").unwrap(), 2);
    assert_eq!(WarningRepo::counts(&conn, PROJECT).unwrap().total, 1);
    assert_eq!(WarningRepo::delete_project(&conn, PROJECT).unwrap(), 1);
}

#[test]
fn test_racing_connections_have_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storyx.db");
    {
        let conn = open_and_migrate(&path).unwrap();
        WarningRepo::ingest(&conn, PROJECT, finding("w1", "alice", WarningType::NameConflict, None)).unwrap();
    }

    let barrier = Arc::new(Barrier::new(2));
    let spawn = |resolve: bool| {
        let path = path.clone();
        let barrier = Arc::clone(&barrier);
        std::thread::spawn(move || {
            let mut conn = open_and_migrate(&path).unwrap();
            barrier.wait();
            let outcome = if resolve {
                WarningRepo::resolve(&mut conn, PROJECT, "w1", None)
            } else {
                WarningRepo::dismiss(&mut conn, PROJECT, "w1")
            };
            outcome.map_err(|e| e.kind())
        })
    };
    let resolver = spawn(true);
    let dismisser = spawn(false);
    let outcomes = [resolver.join().unwrap(), dismisser.join().unwrap()];

    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|o| o.as_ref().err() == Some(&ExErrorKind::AlreadyTerminal)));
}

#[test]
fn test_insert_rejects_non_pending_warning() {
    let conn = open_in_memory_migrated().unwrap();
    let pending = ConsistencyWarning::from_finding(PROJECT, finding("w1", "alice", WarningType::PlotHole, None));

    let dismissed = ConsistencyWarning {
        status: WarningStatus::Dismissed,
        ..pending.clone()
    };
    let err = WarningRepo::insert(&conn, dismissed).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::InvalidInput);
    assert_eq!(WarningRepo::get(&conn, PROJECT, "w1").unwrap_err().kind(), ExErrorKind::NotFound);

    let pre_resolved = ConsistencyWarning {
        resolution: Some("already handled".into()),
        resolved_at: Some(chrono::Utc::now()),
        ..pending.clone()
    };
    let err = WarningRepo::insert(&conn, pre_resolved).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::InvalidInput);

    let stored = WarningRepo::insert(&conn, pending).unwrap();
    assert_eq!(stored.status, WarningStatus::Pending);
    assert_eq!(WarningRepo::get(&conn, PROJECT, "w1").unwrap(), stored);
}

#[test]
fn test_counts_sum_many_per_severity() {
    let conn = open_in_memory_migrated().unwrap();
    for i in 0..5 {
        WarningRepo::ingest(&conn, PROJECT, finding(&format!("e{}", i), "alice", WarningType::NameConflict, None))
            .unwrap();
    }
    for i in 0..2 {
        WarningRepo::ingest(&conn, PROJECT, finding(&format!("i{}", i), "bob", WarningType::MissingField, None))
            .unwrap();
    }

    let counts = WarningRepo::counts(&conn, PROJECT).unwrap();
    assert_eq!((counts.error, counts.warning, counts.info, counts.total), (5, 0, 2, 7));
}

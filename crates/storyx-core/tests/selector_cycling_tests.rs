//! Comparison selector cycling and stale-result handling, driven through a
//! store-backed comparison.

mod common;

use common::{delta, keyframe};
use serde_json::json;
use storyx_core::{ComparisonSelector, Selection, Store};

#[test]
fn test_select_same_snapshot_twice_is_empty() {
    let mut selector = ComparisonSelector::new();
    selector.select("s1");
    selector.select("s1");
    assert_eq!(selector.selection(), &Selection::Empty);
}

#[test]
fn test_drop_rule_promotes_remaining_side() {
    // select(s1) → select(s2) → select(s1) keeps s2 as the new anchor
    let mut selector = ComparisonSelector::new();
    selector.select("s1");
    selector.select("s2");
    selector.select("s1");
    assert_eq!(selector.selection(), &Selection::OneSelected { from: "s2".into() });

    // Picking s1 again now compares s2 → s1
    let req = selector.select("s1").unwrap();
    assert_eq!((req.from.as_str(), req.to.as_str()), ("s2", "s1"));
}

#[test]
fn test_only_entering_two_selected_requests_a_diff() {
    let mut selector = ComparisonSelector::new();
    let requests: Vec<bool> = ["a", "b", "b", "c", "d", "a", "a"]
        .iter()
        .map(|id| selector.select(*id).is_some())
        .collect();
    // a:One, b:Two, b:One(a), c:Two(a,c), d:One(d), a:Two(d,a), a:One(d)
    assert_eq!(requests, vec![false, true, false, true, false, true, false]);
}

#[test]
fn test_selector_feeds_store_comparison() {
    let store = Store::new("project-1");
    let k0 = store
        .append_snapshot(keyframe("E", 0, json!({"name": "Alice"})), false)
        .unwrap();
    let d1 = store
        .append_snapshot(delta("E", 1, "name", Some(json!("Alice")), Some(json!("Alicia"))), false)
        .unwrap();

    let mut selector = ComparisonSelector::new();
    selector.select(k0.snapshot.id.clone());
    let req = selector.select(d1.snapshot.id.clone()).unwrap();

    let result = store.compare(&req.from, &req.to).unwrap();
    assert!(selector.accept(req.ticket, result));
    assert_eq!(selector.result().unwrap().counts().modified, 1);

    // Any transition drops the shown result
    selector.select(d1.snapshot.id.clone());
    assert!(selector.result().is_none());
}

#[test]
fn test_clear_discards_in_flight_result() {
    let store = Store::new("project-1");
    let k0 = store
        .append_snapshot(keyframe("E", 0, json!({"name": "Alice"})), false)
        .unwrap();
    let d1 = store
        .append_snapshot(delta("E", 1, "age", None, Some(json!("30"))), false)
        .unwrap();

    let mut selector = ComparisonSelector::new();
    selector.select(k0.snapshot.id.clone());
    let req = selector.select(d1.snapshot.id.clone()).unwrap();

    // The user clears before the diff arrives
    selector.clear();
    let late = store.compare(&req.from, &req.to).unwrap();
    assert!(!selector.accept(req.ticket, late));
    assert_eq!(selector.selection(), &Selection::Empty);
    assert!(selector.result().is_none());
}

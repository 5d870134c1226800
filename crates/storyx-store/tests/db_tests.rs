#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;
use storyx_core::ExErrorKind;
use storyx_store::db::{begin_immediate, open_and_migrate};

#[test]
fn test_writer_blocked_past_busy_timeout_is_retryable_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storyx.db");
    let mut holder = open_and_migrate(&path).unwrap();
    let mut waiter = open_and_migrate(&path).unwrap();
    waiter.busy_timeout(Duration::from_millis(10)).unwrap();

    let held = begin_immediate(&mut holder).unwrap();
    let err = begin_immediate(&mut waiter).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Concurrency);
    assert!(err.is_retryable());

    held.rollback().unwrap();
    assert!(begin_immediate(&mut waiter).is_ok());
}

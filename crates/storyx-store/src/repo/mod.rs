//! Repositories over the migrated schema
//!
//! Both repositories are stateless: every function takes the connection and
//! the owning project id. Writers that read before they write take
//! `&mut Connection` and run in an IMMEDIATE transaction.

mod codec;
mod snapshot_repo;
mod warning_repo;

pub use codec::{parse_time, sql_time};
pub use snapshot_repo::{SnapshotRepo, SnapshotRow};
pub use warning_repo::{WarningRepo, WarningRow};

//! Evolution snapshot engine: the append-only log, snapshot production and
//! reconstruction by replay.

pub mod log;
pub mod producer;
pub mod reconstruct;

pub use log::{Appended, CompactionPolicy, SnapshotLog};
pub use producer::StateUpdate;
pub use reconstruct::{annotate, materialize_from};

//! Pure rules shared by the snapshot engine and the warning queue.

pub mod classification;
pub mod validation;

pub use classification::{classify_severity, default_severity, ChangeKind};

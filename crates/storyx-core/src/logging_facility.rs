//! Structured logging facility for StoryX
//!
//! - Single initialization point via `init(profile)`
//! - Boundary macros (`log_op_start!`, `log_op_end!`, `log_op_error!`) that
//!   stamp every event with the canonical `component`/`op`/`event` fields
//! - In-memory capture layer for deterministic assertions in tests
//!
//! ```rust
//! use storyx_core::logging_facility::{init, Profile};
//!
//! init(Profile::Development);
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};

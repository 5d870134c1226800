//! Canonical event names for structured logging
//!
//! Field keys are tracing identifiers in the `log_op_*` macros and cannot be
//! taken from constants.

pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";

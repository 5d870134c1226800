//! Core types shared across StoryX facilities
//!
//! - **Correlation types**: RequestId, TraceId, SpanId, RequestContext
//! - **Schema constants**: canonical structured-logging event names

pub mod correlation;
pub mod schema;

pub use correlation::{RequestContext, RequestId, SpanId, TraceId};

//! Correlation identifiers for request tracking
//!
//! Every engine command or query can carry a [`RequestContext`] so that log
//! events and errors raised while serving it can be tied back together.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! correlation_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh, time-ordered identifier (UUIDv7)
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            /// Wrap an identifier received from a caller
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

correlation_id!(
    /// Identifies a single command or query served by the engine
    RequestId
);

correlation_id!(
    /// Identifies a chain of requests, e.g. one editing session in the UI
    TraceId
);

correlation_id!(
    /// Identifies one step inside a trace
    SpanId
);

/// Context carried through operation boundaries
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub trace_id: Option<TraceId>,
    /// Project the request is scoped to, when known
    pub project_id: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: RequestId::new(),
            trace_id: None,
            project_id: None,
        }
    }

    pub fn with_request_id(request_id: RequestId) -> Self {
        Self {
            request_id,
            trace_id: None,
            project_id: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    pub fn for_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

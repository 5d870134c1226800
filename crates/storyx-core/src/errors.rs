use storyx_core_types::{RequestContext, RequestId, TraceId};
use thiserror::Error;

/// Result type alias using StoryXError
pub type Result<T> = std::result::Result<T, StoryXError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that callers (the CLI, tests, any
/// outer API) can match on without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Validation
    InvalidInput,
    NotFound,
    AlreadyExists,

    // Snapshot log
    /// Append would precede the log tail without the backfill flag
    OutOfOrder,
    /// The first snapshot of an entity's log is not a keyframe
    MissingKeyframe,
    /// Same snapshot id re-appended with different content
    IdConflict,

    // Warning lifecycle
    /// Transition requested on a warning that already left PENDING
    AlreadyTerminal,

    // Integration/IO
    Io,
    Serialization,
    Persistence,
    Concurrency,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::AlreadyExists => "ERR_ALREADY_EXISTS",
            ExErrorKind::OutOfOrder => "ERR_OUT_OF_ORDER",
            ExErrorKind::MissingKeyframe => "ERR_MISSING_KEYFRAME",
            ExErrorKind::IdConflict => "ERR_ID_CONFLICT",
            ExErrorKind::AlreadyTerminal => "ERR_ALREADY_TERMINAL",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether a caller may retry the failed operation unchanged.
    ///
    /// Only transient storage failures qualify. Ordering, lookup and lifecycle
    /// violations need the caller to refresh its view first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExErrorKind::Io | ExErrorKind::Persistence | ExErrorKind::Concurrency
        )
    }
}

/// Canonical structured error type
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    snapshot_id: Option<String>,
    warning_id: Option<String>,
    request_id: Option<RequestId>,
    trace_id: Option<TraceId>,
    message: String,
}

impl ExError {
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            snapshot_id: None,
            warning_id: None,
            request_id: None,
            trace_id: None,
            message: String::new(),
        }
    }

    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    pub fn with_snapshot_id(mut self, id: impl Into<String>) -> Self {
        self.snapshot_id = Some(id.into());
        self
    }

    pub fn with_warning_id(mut self, id: impl Into<String>) -> Self {
        self.warning_id = Some(id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Attach the correlation ids of a request context
    pub fn with_context(mut self, ctx: &RequestContext) -> Self {
        self.request_id = Some(ctx.request_id.clone());
        self.trace_id = ctx.trace_id.clone();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn snapshot_id(&self) -> Option<&str> {
        self.snapshot_id.as_deref()
    }

    pub fn warning_id(&self) -> Option<&str> {
        self.warning_id.as_deref()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        if let Some(snapshot_id) = &self.snapshot_id {
            write!(f, " (snapshot_id: {})", snapshot_id)?;
        }
        if let Some(warning_id) = &self.warning_id {
            write!(f, " (warning_id: {})", warning_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {}

// ========== End Error Facility ==========

/// Domain error taxonomy for the snapshot engine and warning lifecycle
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoryXError {
    // ===== Snapshot Log =====
    /// Append precedes the current tail and was not flagged as a backfill
    #[error("Snapshot {snapshot_id} at {created_at} precedes log tail {tail_created_at} of entity {entity_id}")]
    OutOfOrder {
        entity_id: String,
        snapshot_id: String,
        created_at: String,
        tail_created_at: String,
    },

    /// Snapshot id is not part of the entity's log
    #[error("Snapshot {snapshot_id} not found in log of entity {entity_id}")]
    SnapshotNotFound {
        entity_id: String,
        snapshot_id: String,
    },

    /// The snapshot would open the log but is a delta
    #[error("First snapshot of entity {entity_id} must be a keyframe, got delta {snapshot_id}")]
    MissingBaseKeyframe {
        entity_id: String,
        snapshot_id: String,
    },

    /// Same id already stored with different content
    #[error("Snapshot id {snapshot_id} already stored with different content")]
    SnapshotIdConflict { snapshot_id: String },

    /// Delta payload is malformed
    #[error("Invalid delta in snapshot {snapshot_id}: {reason}")]
    InvalidDelta { snapshot_id: String, reason: String },

    /// AI confidence outside 0..=1
    #[error("AI confidence {value} of snapshot {snapshot_id} is outside 0..=1")]
    InvalidConfidence { snapshot_id: String, value: f64 },

    /// Two snapshots expected to share an entity do not
    #[error("Snapshots {from_id} and {to_id} belong to different entities")]
    EntityMismatch { from_id: String, to_id: String },

    // ===== Warning Lifecycle =====
    /// Warning id unknown to the queue
    #[error("Warning not found: {warning_id}")]
    WarningNotFound { warning_id: String },

    /// Warning already RESOLVED or DISMISSED
    #[error("Warning {warning_id} is already {status}")]
    AlreadyTerminal { warning_id: String, status: String },

    /// Detector inserted a warning id twice
    #[error("Warning already exists: {warning_id}")]
    WarningAlreadyExists { warning_id: String },

    /// A new warning must enter the queue PENDING with no resolution
    #[error("Invalid warning {warning_id}: {reason}")]
    InvalidWarning { warning_id: String, reason: String },

    // ===== Generic Errors =====
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<StoryXError> for ExError {
    fn from(err: StoryXError) -> Self {
        match err {
            StoryXError::OutOfOrder {
                entity_id,
                snapshot_id,
                created_at,
                tail_created_at,
            } => ExError::new(ExErrorKind::OutOfOrder)
                .with_entity_id(entity_id)
                .with_snapshot_id(snapshot_id)
                .with_message(format!(
                    "created_at {} precedes log tail {}",
                    created_at, tail_created_at
                )),

            StoryXError::SnapshotNotFound {
                entity_id,
                snapshot_id,
            } => ExError::new(ExErrorKind::NotFound)
                .with_entity_id(entity_id)
                .with_snapshot_id(snapshot_id)
                .with_message("Snapshot not found"),

            StoryXError::MissingBaseKeyframe {
                entity_id,
                snapshot_id,
            } => ExError::new(ExErrorKind::MissingKeyframe)
                .with_entity_id(entity_id)
                .with_snapshot_id(snapshot_id)
                .with_message("First snapshot of an entity must be a keyframe"),

            StoryXError::SnapshotIdConflict { snapshot_id } => {
                ExError::new(ExErrorKind::IdConflict)
                    .with_snapshot_id(snapshot_id)
                    .with_message("Snapshot id already stored with different content")
            }

            StoryXError::InvalidDelta {
                snapshot_id,
                reason,
            } => ExError::new(ExErrorKind::InvalidInput)
                .with_snapshot_id(snapshot_id)
                .with_message(format!("Invalid delta: {}", reason)),

            StoryXError::InvalidConfidence { snapshot_id, value } => {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_snapshot_id(snapshot_id)
                    .with_message(format!("AI confidence {} is outside 0..=1", value))
            }

            StoryXError::EntityMismatch { from_id, to_id } => {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_snapshot_id(from_id)
                    .with_message(format!("Snapshot {} belongs to a different entity", to_id))
            }

            StoryXError::WarningNotFound { warning_id } => ExError::new(ExErrorKind::NotFound)
                .with_warning_id(warning_id)
                .with_message("Warning not found"),

            StoryXError::AlreadyTerminal { warning_id, status } => {
                ExError::new(ExErrorKind::AlreadyTerminal)
                    .with_warning_id(warning_id)
                    .with_message(format!("Warning is already {}", status))
            }

            StoryXError::WarningAlreadyExists { warning_id } => {
                ExError::new(ExErrorKind::AlreadyExists)
                    .with_warning_id(warning_id)
                    .with_message("Warning already exists")
            }

            StoryXError::InvalidWarning { warning_id, reason } => {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_warning_id(warning_id)
                    .with_message(format!("Invalid warning: {}", reason))
            }

            StoryXError::Serialization { message } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }

            StoryXError::Internal { message } => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }
        }
    }
}

impl From<serde_json::Error> for StoryXError {
    fn from(err: serde_json::Error) -> Self {
        StoryXError::Serialization {
            message: err.to_string(),
        }
    }
}

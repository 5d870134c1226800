pub mod snapshot;
pub mod state;
pub mod tags;
pub mod warning;

pub use snapshot::{ChangeType, SnapshotPayload, StateSnapshot};
pub use state::EntityState;
pub use tags::{EntityType, WarningType};
pub use warning::{ConsistencyWarning, RawFinding, Severity, WarningStatus, DEFAULT_RESOLUTION_NOTE};

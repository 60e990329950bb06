pub mod conflicts;
pub mod engine;
pub mod triggers;

pub use conflicts::{Conflict, ConflictChoice, ConflictReason};
pub use engine::{EngineEvent, SyncEngine, SyncOutcome, SyncState};
pub use triggers::RemoteChange;

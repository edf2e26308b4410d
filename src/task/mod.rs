/// Task Management Layer
///
/// Runtime instances of templates: their data model, lifecycle state machine,
/// locked handles, storage and the manager that exposes every operation.

// Task data, approvals and audit records
pub mod types;

// Lifecycle states and transition table
pub mod state;

// Per-task locked handle
pub mod handle;

// Task membership storage
pub mod store;

// Lifecycle operations and graph advancement
pub mod manager;

pub use handle::Task;
pub use manager::TaskManager;
pub use state::{can_transition, transition, StateChange, TaskState};
pub use store::{MemoryTaskStore, TaskStore};
pub use types::{Approval, ApprovalRecord, DecisionInput, RecordAction, TaskData};

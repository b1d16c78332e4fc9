//! Data model shared by detection, merging and consolidation.

pub mod change;
pub mod conflict;
pub mod operation;
pub mod types;

pub use change::{
    Change, ChangeKind, Intention, Scope, SemanticContext, UNKNOWN_COMPATIBILITY,
    change_compatibility,
};
pub use conflict::{Conflict, ConflictKind, Severity};
pub use operation::{
    Capabilities, EXCLUSIVE_ACCESS_TAG, Operation, OperationMetadata, Priority,
    ResolutionStrategy,
};
pub use types::{
    AgentId, ChangeId, ConflictId, DocumentPath, IdentifierKind, LockId, OperationId,
    ValidationError,
};

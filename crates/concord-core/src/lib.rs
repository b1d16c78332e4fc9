//! Consolidation core for concord.
//!
//! Editing agents (a human typist, an AI assistant, a formatter, ...) submit
//! [`Operation`]s against shared documents. This crate decides when they must
//! be coordinated, classifies the conflicts between them, resolves those
//! conflicts and merges the survivors into one ordered change list.
//!
//! # Crate layout
//!
//! - [`model`]: operations, changes, conflicts and identifier newtypes.
//! - [`detect`]: the [`Detector`] seam and the five-check [`ConflictDetector`].
//! - [`merge`]: the [`Merger`] seam and the strategy-driven [`MergeEngine`].
//! - [`consolidate`]: the [`ConsolidationManager`] with its queues, locks,
//!   timers and event bus.
//! - [`config`]: TOML configuration ([`ConcordConfig`]).
//! - [`clock`]: injectable time ([`SystemClock`], [`ManualClock`]).
//! - [`error`]: the [`ConsolidationError`] taxonomy.

pub mod clock;
pub mod config;
pub mod consolidate;
pub mod detect;
pub mod error;
pub mod merge;
pub mod model;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConcordConfig, ConfigError, CoordinationConfig, DetectionConfig, MergeConfig};
pub use consolidate::{
    ConsolidationManager, ConsolidationResult, DocumentLock, EventKind, LifecycleEvent,
    ManagerMetrics, ResolutionRecord, SharedManager, StatusReport, SubscriptionId, UnlockReason,
};
pub use detect::{ConflictDetector, Detector};
pub use error::{ConsolidationError, Phase};
pub use merge::{MergeEngine, MergeResult, MergeStrategy, Merger};
pub use model::{
    AgentId, Change, ChangeId, ChangeKind, Conflict, ConflictId, ConflictKind, DocumentPath,
    Intention, LockId, Operation, OperationId, Priority, ResolutionStrategy, Scope,
    SemanticContext, Severity,
};

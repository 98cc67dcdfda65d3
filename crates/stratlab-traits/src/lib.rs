//! # StratLab Traits
//!
//! Trait definitions for the StratLab task orchestrator.
//!
//! This crate contains the seams between the orchestrator and its
//! collaborators, plus the records that cross them. Implementations live in
//! extension crates (`stratlab-ext-redb`, `stratlab-ext-json`) and in the
//! engine's in-memory backends.
//!
//! ## Module Structure
//!
//! - [`task`]: Task lifecycle state, records and outcomes
//! - [`store`]: [`TaskStore`](store::TaskStore), the shared result store
//! - [`queue`]: [`TaskQueue`](queue::TaskQueue), the message broker
//! - [`output`]: Transport-safe analysis results
//! - [`transport`]: [`Codec`](transport::Codec) for byte encoding

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod output;
pub mod queue;
pub mod store;
pub mod task;
pub mod transport;

// Re-export commonly used types
pub use error::TraitError;
pub use output::{AnalysisResult, PriorSummary, SymbolResult};
pub use queue::{TaskMessage, TaskQueue};
pub use store::{IdempotencyClaim, TaskStore};
pub use task::{
    FailureDetail, FailureKind, TaskOutcome, TaskRecord, TaskSnapshot, TaskStatus, Transition,
    DEFAULT_LEASE,
};
pub use transport::Codec;

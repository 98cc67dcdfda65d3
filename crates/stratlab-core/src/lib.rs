//! # StratLab Core
//!
//! Shared vocabulary for the StratLab risk analytics workspace.
//!
//! - [`ids`]: Symbol, task and idempotency identifiers
//! - [`table`]: Untyped tabular input as uploaded by a caller
//! - [`record`]: A coerced, typed price observation
//! - [`request`]: Analysis requests and the shrinkage parameter
//! - [`flags`]: Risk flags and omission states shared by the engine and the codec
//!
//! This crate has no runtime dependencies; everything here is plain data.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod flags;
pub mod ids;
pub mod record;
pub mod request;
pub mod table;

pub use error::{CoreError, CoreResult};
pub use flags::{Estimate, OmissionReason, RiskFlag};
pub use ids::{IdempotencyKey, Symbol, TaskId};
pub use record::RawRecord;
pub use request::{AnalysisRequest, Lambda, DEFAULT_BENCHMARK};
pub use table::{Cell, RawTable};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{CoreError, CoreResult};
    pub use crate::flags::{Estimate, OmissionReason, RiskFlag};
    pub use crate::ids::{IdempotencyKey, Symbol, TaskId};
    pub use crate::record::RawRecord;
    pub use crate::request::{AnalysisRequest, Lambda};
    pub use crate::table::{Cell, RawTable};
}

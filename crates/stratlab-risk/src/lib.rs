//! # stratlab-risk
//!
//! Risk analytics over normalized return series.
//!
//! This crate provides:
//!
//! - **VaR / ES**: Gaussian parametric Value-at-Risk and Expected Shortfall at 99%
//! - **Shrinkage**: Volatility blended toward a supplied or cross-sectional prior
//! - **CAPM beta**: OLS beta and residual volatility against a benchmark
//! - **Engine**: Per-symbol fan-out producing one [`RiskRecord`] per series
//!
//! ## Example
//!
//! ```ignore
//! use stratlab_risk::prelude::*;
//!
//! let dataset = stratlab_data::normalize(&table)?;
//! let report = RiskEngine::new().evaluate(&dataset.series, &benchmark, Shrinkage::none())?;
//! for (symbol, record) in &report.records {
//!     println!("{symbol}: VaR99 {:.4}", record.var_99);
//! }
//! ```
//!
//! Degenerate inputs never fail: they produce documented placeholder values
//! and a [`RiskFlag`](stratlab_core::RiskFlag).

pub mod beta;
pub mod engine;
pub mod shrinkage;
pub mod stats;
pub mod var;
mod error;

pub use engine::{RiskEngine, RiskRecord, RiskReport};
pub use error::RiskError;
pub use shrinkage::{Shrinkage, VolatilityPrior};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::beta::*;
    pub use crate::engine::*;
    pub use crate::shrinkage::*;
    pub use crate::var::*;
    pub use crate::RiskError;
}

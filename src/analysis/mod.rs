//! Analysis modules
//!
//! Three independent scorers, each returning a score in [0,100] plus a
//! narrative summary and a typed result record. The signal generator
//! combines them into the weighted composite.

pub mod fundamental;
pub mod indicators;
pub mod macro_context;
pub mod technical;

pub use fundamental::{FundamentalData, FundamentalResult};
pub use macro_context::MacroResult;
pub use technical::TechnicalResult;

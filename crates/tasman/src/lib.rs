#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tasman/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod universe;

// Re-export main types from sub-crates
pub use tasman_data as data;
pub use tasman_output as output;
pub use tasman_risk as risk;

// Re-export common universe types
pub use universe::{
    GicsSector, Membership, PeriodFailure, Universe, UniverseConfig, UniverseError, UniverseRun,
    UniverseSelector,
};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tasman/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod export;
pub mod frame;
pub mod summary;

pub use export::{
    AmbiguousRow, ExportError, ExportFormat, Exporter, ambiguous_rows, entity_list,
    write_entity_list,
};
pub use frame::{aggregate_frame, entity_volatility_frame, membership_frame, volatility_frame};
pub use summary::{IndexSummary, RunSummary, UniverseSummary, VolatilitySummary};

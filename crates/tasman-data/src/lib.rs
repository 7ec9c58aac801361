#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tasman/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod feed;
pub mod membership;
pub mod month;
pub mod observation;
pub mod panel;

pub use error::{DataError, Result};
pub use membership::{HoldingIndex, MembershipRecord};
pub use observation::{EntityId, Frequency, RawObservation, SecurityObservation};
pub use panel::SecurityPanel;

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

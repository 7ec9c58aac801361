#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tasman/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod aggregate;
pub mod entity_vol;
pub mod forecast;
pub mod garch;
pub mod stats;

// Re-export main types
pub use aggregate::{
    AggregateReturnBuilder, AggregateReturnPoint, AggregateSeries, AmbiguousIdentity,
};
pub use entity_vol::{
    EntityVolatilityBuilder, EntityVolatilityConfig, EntityVolatilityRecord, EntityVolatilityTable,
};
pub use forecast::{
    ForecastConfig, ForecastError, ForecastStatus, ForecastStep, VolatilityForecaster,
    VolatilityRecord, VolatilityTable,
};
pub use garch::{GarchFit, GarchModel, ModelFitError};

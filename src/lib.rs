//! Declarative metrics reporting for load test results.
//!
//! A [`Report`](report::Report) produced by the load test runner is turned into
//! time series points by a set of named measurement definitions. Each definition
//! resolves its fields and tags through the same fixed stages: queries,
//! defaults, mappers, reducers and scalar extraction. Points are then handed to a
//! [`PointWriter`](writer::PointWriter) implementation.
//!
//! ```rust
//! use profusion_influx::prelude::*;
//! use serde_json::json;
//!
//! let settings = RawSettings::from_json(r#"{
//!     "testName": "checkout",
//!     "influx": {"host": "localhost", "username": "u", "password": "p", "database": "db"}
//! }"#)
//! .unwrap()
//! .validate()
//! .unwrap();
//!
//! let measurement = settings.measurement("latency").unwrap();
//! assert_eq!(measurement.granularity(), Granularity::Sample);
//! ```
#![warn(missing_debug_implementations, unreachable_pub)]

pub mod clock;
pub mod config;
pub mod error;
pub mod error_count;
pub mod expression;
pub mod measurement;
pub mod point;
pub mod query;
pub mod report;
pub mod runner;
pub mod writer;

pub mod prelude {
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::config::{RawSettings, Settings};
    pub use crate::error::{ConfigError, EvaluationError, ReportError, WriteError};
    pub use crate::expression::{Expression, Scope};
    pub use crate::measurement::{Granularity, MeasurementDefinition, PropertySet};
    pub use crate::point::{Point, PointBatch, Tags};
    pub use crate::query::QueryPath;
    pub use crate::report::Report;
    pub use crate::runner::{PendingWrites, Reporter};
    pub use crate::writer::{LocalPointWriter, PointWriter};

    #[cfg(any(feature = "test_util", test))]
    pub use crate::clock::FixedClock;
    #[cfg(any(feature = "test_util", test))]
    pub use crate::writer::MemoryWriter;
}

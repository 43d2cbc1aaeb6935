//! Points handed to the storage writer

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field every emitted point carries
pub const PRIMARY_FIELD: &str = "value";
/// Field holding the point timestamp, when a measurement provides one
pub const TIME_FIELD: &str = "time";

/// Tags merged into every point
pub type Tags = IndexMap<String, Value>;

/// Single time series point
///
/// Holds scalars only: properties that resolved to nothing are never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    fields: IndexMap<String, Value>,
    tags: Tags,
}

impl Point {
    pub fn new(fields: IndexMap<String, Value>, tags: Tags) -> Self {
        Self { fields, tags }
    }

    pub fn fields(&self) -> &IndexMap<String, Value> {
        &self.fields
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn tag(&self, name: &str) -> Option<&Value> {
        self.tags.get(name)
    }

    pub fn value(&self) -> Option<&Value> {
        self.field(PRIMARY_FIELD)
    }
}

/// Points of a single measurement produced from one report
#[derive(Debug, Clone, PartialEq)]
pub struct PointBatch {
    measurement: String,
    points: Vec<Point>,
}

impl PointBatch {
    pub fn new(measurement: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            measurement: measurement.into(),
            points,
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn into_parts(self) -> (String, Vec<Point>) {
        (self.measurement, self.points)
    }
}

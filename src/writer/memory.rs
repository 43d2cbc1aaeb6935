use std::sync::Mutex;

use super::PointWriter;
use crate::error::WriteError;
use crate::point::{Point, PointBatch};

/// Writer keeping every written batch in memory
///
/// Can be switched into failing mode to exercise error reporting.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    batches: Mutex<Vec<PointBatch>>,
    failure: Option<String>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer rejecting every batch with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            batches: Mutex::default(),
            failure: Some(message.into()),
        }
    }

    /// Batches written so far, sorted by measurement name
    ///
    /// Writes complete in no particular order, so sorting keeps
    /// assertions stable.
    pub fn batches(&self) -> Vec<PointBatch> {
        let mut batches = self
            .batches
            .lock()
            .map(|batches| batches.clone())
            .unwrap_or_default();

        batches.sort_by(|left, right| left.measurement().cmp(right.measurement()));
        batches
    }

    pub fn points(&self, measurement: &str) -> Vec<Point> {
        self.batches()
            .into_iter()
            .filter(|batch| batch.measurement() == measurement)
            .flat_map(|batch| batch.into_parts().1)
            .collect()
    }
}

impl PointWriter for MemoryWriter {
    async fn write_points(&self, measurement: &str, points: Vec<Point>) -> Result<(), WriteError> {
        if let Some(message) = &self.failure {
            return Err(WriteError::Backend(message.clone()));
        }

        self.batches
            .lock()
            .map_err(|e| WriteError::Backend(e.to_string()))?
            .push(PointBatch::new(measurement, points));

        Ok(())
    }
}

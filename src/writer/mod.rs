/*
 * Copyright © 2024. EcomDev B.V.
 * All rights reserved.
 * See LICENSE for license details.
 */

//! Storage backend seam

#[cfg(any(feature = "test_util", test))]
mod memory;

#[cfg(any(feature = "test_util", test))]
pub use memory::MemoryWriter;

use crate::error::WriteError;
use crate::point::Point;

/// Persists point batches in a time series backend
///
/// The wire protocol is owned entirely by the implementation.
/// [`PointWriter`] is the `Send` variant required by [`Reporter`](crate::runner::Reporter).
#[trait_variant::make(PointWriter: Send)]
pub trait LocalPointWriter {
    async fn write_points(&self, measurement: &str, points: Vec<Point>) -> Result<(), WriteError>;
}

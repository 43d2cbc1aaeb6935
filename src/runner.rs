/*
 * Copyright © 2024. EcomDev B.V.
 * All rights reserved.
 * See LICENSE for license details.
 */

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::error::{ReportError, WriteError};
use crate::error_count::error_point;
use crate::expression::Scope;
use crate::measurement::PointAssembler;
use crate::point::PointBatch;
use crate::report::Report;
use crate::writer::PointWriter;

/// Turns reports into point batches and submits them to a writer
///
/// Each call handles a single report; nothing is kept between calls.
pub struct Reporter<W> {
    settings: Arc<Settings>,
    writer: Arc<W>,
    clock: Arc<dyn Clock>,
}

impl<W> Reporter<W>
where
    W: PointWriter + Send + Sync + 'static,
{
    pub fn new(settings: Settings, writer: W) -> Self {
        Self {
            settings: Arc::new(settings),
            writer: Arc::new(writer),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces clock used for `now` in snippets and error point timestamps
    pub fn with_clock(self, clock: impl Clock + 'static) -> Self {
        Self {
            clock: Arc::new(clock),
            ..self
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Builds every batch for `report` without writing anything
    ///
    /// Measurements come in declaration order, followed by the error count
    /// batch when the report carries errors. Measurements without points
    /// are left out.
    pub fn collect(&self, report: &Report) -> Result<Vec<PointBatch>, ReportError> {
        let now_millis = self.clock.now_millis();
        let static_tags = self.settings.static_tags();
        let assembler = PointAssembler::new(static_tags, Scope::new(now_millis));

        let mut batches = Vec::new();

        for (name, measurement) in self.settings.measurements() {
            let points = assembler
                .collect(measurement, report)
                .map_err(|source| ReportError::Evaluation {
                    measurement: name.to_owned(),
                    source,
                })?;

            if points.is_empty() {
                debug!(measurement = name, "No data for measurement, nothing sent");
                continue;
            }

            batches.push(PointBatch::new(name, points));
        }

        if let Some(point) = error_point(report, static_tags, now_millis) {
            batches.push(PointBatch::new(
                self.settings.error_measurement_name(),
                vec![point],
            ));
        }

        Ok(batches)
    }

    /// Submits every batch of `report` to the writer without waiting for completion
    ///
    /// Writes are spawned on the current tokio runtime, calling it outside
    /// of one is an error. Batches are only submitted once all of them were
    /// built, so an evaluation error writes nothing.
    pub fn report(&self, report: &Report) -> Result<PendingWrites, ReportError> {
        let runtime = Handle::try_current()?;
        let batches = self.collect(report)?;
        let mut tasks = Vec::with_capacity(batches.len());

        for batch in batches {
            let writer = Arc::clone(&self.writer);
            let (measurement, points) = batch.into_parts();

            tasks.push(runtime.spawn(async move {
                let count = points.len();
                let result = writer.write_points(&measurement, points).await;

                match &result {
                    Ok(()) => info!(measurement = %measurement, points = count, "Metrics reported"),
                    Err(error) => {
                        error!(measurement = %measurement, error = ?error, "Failed to write points")
                    }
                }

                result
            }));
        }

        Ok(PendingWrites { tasks })
    }

    /// Submits every batch of `report` and waits for all writes to finish
    pub async fn write(&self, report: &Report) -> Result<(), ReportError> {
        self.report(report)?.wait().await?;
        Ok(())
    }
}

impl<W> Clone for Reporter<W> {
    fn clone(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            writer: Arc::clone(&self.writer),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<W: fmt::Debug> fmt::Debug for Reporter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("settings", &self.settings)
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

/// Writes in flight for a single report
///
/// Writes keep running when the handle is dropped; waiting on it only
/// surfaces their outcome.
#[derive(Debug)]
#[must_use]
pub struct PendingWrites {
    tasks: Vec<JoinHandle<Result<(), WriteError>>>,
}

impl PendingWrites {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for every write, returning the first failure
    ///
    /// Remaining writes still run to completion after a failure.
    pub async fn wait(self) -> Result<(), WriteError> {
        let mut failure = None;

        for task in self.tasks {
            if let Err(error) = task.await.map_err(WriteError::from).and_then(|result| result) {
                failure.get_or_insert(error);
            }
        }

        failure.map_or(Ok(()), Err)
    }

    /// Lets writes complete without anyone waiting for them
    pub fn detach(self) {
        drop(self.tasks);
    }
}

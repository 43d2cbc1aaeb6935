use tracing::debug;

use super::{MeasurementDefinition, StageResult};
use crate::error::EvaluationError;
use crate::expression::Scope;
use crate::point::{Point, Tags, PRIMARY_FIELD};
use crate::report::{ExtractionContext, Report};

/// Builds points out of processed fields and tags
#[derive(Debug, Clone)]
pub struct PointAssembler<'a> {
    static_tags: &'a Tags,
    scope: Scope,
}

impl<'a> PointAssembler<'a> {
    pub fn new(static_tags: &'a Tags, scope: Scope) -> Self {
        Self { static_tags, scope }
    }

    /// Produces a point for a single context
    ///
    /// Returns `None` when the primary field resolved to nothing.
    /// Static tags override computed tags with the same name.
    pub fn assemble(
        &self,
        definition: &MeasurementDefinition,
        context: &ExtractionContext<'_>,
    ) -> Result<Option<Point>, EvaluationError> {
        let fields = StageResult::process(context, definition.fields(), &self.scope)?;

        if fields
            .get(PRIMARY_FIELD)
            .and_then(|value| value.as_scalar())
            .is_none()
        {
            debug!(context = ?context, "Skipping point without value");
            return Ok(None);
        }

        let mut tags = match definition.tags() {
            Some(set) => StageResult::process(context, set, &self.scope)?.into_scalars(),
            None => Tags::new(),
        };

        for (name, value) in self.static_tags {
            tags.insert(name.clone(), value.clone());
        }

        Ok(Some(Point::new(fields.into_scalars(), tags)))
    }

    /// Produces points for every context the measurement granularity yields
    pub fn collect(
        &self,
        definition: &MeasurementDefinition,
        report: &Report,
    ) -> Result<Vec<Point>, EvaluationError> {
        let mut points = Vec::new();

        for context in definition.granularity().contexts(report) {
            if let Some(point) = self.assemble(definition, &context)? {
                points.push(point);
            }
        }

        Ok(points)
    }
}

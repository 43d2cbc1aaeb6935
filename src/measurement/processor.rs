use indexmap::IndexMap;
use serde_json::Value;
use tracing::trace;

use super::{Extracted, PropertySet};
use crate::error::EvaluationError;
use crate::expression::Scope;
use crate::report::ExtractionContext;

/// Values of every property of a [`PropertySet`] for one context
///
/// Properties keep the order in which the stage maps first mention them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageResult(IndexMap<String, Extracted>);

impl StageResult {
    /// Runs every stage of `set` against `context`
    ///
    /// Stages are applied in fixed order: queries, defaults, mappers,
    /// reducers and finally scalar extraction.
    pub fn process(
        context: &ExtractionContext<'_>,
        set: &PropertySet,
        scope: &Scope,
    ) -> Result<Self, EvaluationError> {
        let mut result = Self::declared(set);

        result.apply_queries(context, set);
        trace!(stage = "queries", result = ?result.0);

        result.apply_defaults(set, scope)?;
        trace!(stage = "defaults", result = ?result.0);

        result.apply_mappers(set, scope)?;
        trace!(stage = "mappers", result = ?result.0);

        result.apply_reducers(set, scope)?;
        trace!(stage = "reducers", result = ?result.0);

        result.extract_scalars();
        trace!(stage = "scalars", result = ?result.0);

        Ok(result)
    }

    fn declared(set: &PropertySet) -> Self {
        let mut properties = IndexMap::new();

        let names = set
            .queries()
            .map(|(name, _)| name)
            .chain(set.defaults().map(|(name, _)| name))
            .chain(set.mappers().map(|(name, _)| name))
            .chain(set.reducers().map(|(name, _)| name));

        for name in names {
            properties
                .entry(name.clone())
                .or_insert(Extracted::Absent);
        }

        Self(properties)
    }

    fn apply_queries(&mut self, context: &ExtractionContext<'_>, set: &PropertySet) {
        for (name, query) in set.queries() {
            self.0
                .insert(name.clone(), Extracted::Series(query.evaluate(context)));
        }
    }

    fn apply_defaults(&mut self, set: &PropertySet, scope: &Scope) -> Result<(), EvaluationError> {
        for (name, default) in set.defaults() {
            let current = self.0.entry(name.clone()).or_default();

            if current.is_empty() {
                *current = Extracted::Series(vec![default.resolve(scope)?]);
            }
        }

        Ok(())
    }

    fn apply_mappers(&mut self, set: &PropertySet, scope: &Scope) -> Result<(), EvaluationError> {
        for (name, mapper) in set.mappers() {
            if let Some(Extracted::Series(values)) = self.0.get_mut(name) {
                let mapped = std::mem::take(values)
                    .into_iter()
                    .map(|value| mapper.call(&[value], scope))
                    .collect::<Result<Vec<_>, _>>()?;

                *values = mapped;
            }
        }

        Ok(())
    }

    fn apply_reducers(&mut self, set: &PropertySet, scope: &Scope) -> Result<(), EvaluationError> {
        for (name, reducer) in set.reducers() {
            let Some(current) = self.0.get_mut(name) else {
                continue;
            };

            let Extracted::Series(values) = current else {
                continue;
            };

            let mut values = std::mem::take(values).into_iter();
            let Some(seed) = values.next() else {
                continue;
            };

            let reduced = values.try_fold(seed, |accumulator, value| {
                reducer.call(&[accumulator, value], scope)
            })?;

            *current = Extracted::Scalar(reduced);
        }

        Ok(())
    }

    fn extract_scalars(&mut self) {
        for value in self.0.values_mut() {
            let first = match value {
                Extracted::Series(values) if !values.is_empty() => values.swap_remove(0),
                _ => continue,
            };

            *value = Extracted::Scalar(first);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Extracted> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Extracted)> {
        self.0.iter()
    }

    /// Resolved scalars, leaving out properties that resolved to nothing
    pub fn into_scalars(self) -> IndexMap<String, Value> {
        self.0
            .into_iter()
            .filter_map(|(name, value)| value.into_scalar().map(|value| (name, value)))
            .collect()
    }
}

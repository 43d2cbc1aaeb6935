//! Declarative measurement definitions and the pipeline turning
//! a report into points.

use indexmap::IndexMap;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{ConfigError, EvaluationError};
use crate::expression::{Expression, Scope};
use crate::point::PRIMARY_FIELD;
use crate::query::QueryPath;
use crate::report::{ExtractionContext, Report, REPORT_ROOTS, SAMPLE_ROOT};

pub use assembler::PointAssembler;
pub use processor::StageResult;
pub use value::Extracted;

mod assembler;
mod processor;
mod value;

/// How often a measurement is extracted from a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Once for every sample row of the report
    Sample,
    /// Once for the whole report
    Report,
}

impl Granularity {
    /// Builds the extraction contexts for `report`
    ///
    /// ```rust
    /// use profusion_influx::measurement::Granularity;
    /// use profusion_influx::report::Report;
    /// use serde_json::json;
    ///
    /// let report = Report::new(json!({"latencies": [[0, "a", 1, 200], [1, "b", 2, 200]]}));
    ///
    /// assert_eq!(Granularity::Sample.contexts(&report).len(), 2);
    /// assert_eq!(Granularity::Report.contexts(&report).len(), 1);
    /// ```
    pub fn contexts<'r>(&self, report: &'r Report) -> Vec<ExtractionContext<'r>> {
        match self {
            Self::Sample => report
                .samples()
                .iter()
                .map(|sample| ExtractionContext::sample(sample, report))
                .collect(),
            Self::Report => vec![ExtractionContext::report(report)],
        }
    }
}

/// Default of a property, used when nothing was queried
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// Non string configuration value, used as is
    Literal(Value),
    /// Snippet evaluated on every use
    Expression(Expression),
}

impl DefaultValue {
    pub fn resolve(&self, scope: &Scope) -> Result<Value, EvaluationError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Expression(expression) => expression.call(&[], scope),
        }
    }
}

impl From<Value> for DefaultValue {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<Expression> for DefaultValue {
    fn from(value: Expression) -> Self {
        Self::Expression(value)
    }
}

impl Serialize for DefaultValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Literal(value) => value.serialize(serializer),
            Self::Expression(expression) => expression.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for DefaultValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(source) => Expression::compile(&source)
                .map(Self::Expression)
                .map_err(D::Error::custom),
            literal => Ok(Self::Literal(literal)),
        }
    }
}

/// Stage configuration for a set of fields or tags
///
/// Each map is keyed by the property name; a property can appear in any
/// combination of the stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertySet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    queries: Option<IndexMap<String, QueryPath>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    defaults: Option<IndexMap<String, DefaultValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mappers: Option<IndexMap<String, Expression>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reducers: Option<IndexMap<String, Expression>>,
}

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, name: impl Into<String>, query: QueryPath) -> Self {
        self.queries
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), query);
        self
    }

    pub fn with_default(mut self, name: impl Into<String>, default: impl Into<DefaultValue>) -> Self {
        self.defaults
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), default.into());
        self
    }

    pub fn with_mapper(mut self, name: impl Into<String>, mapper: Expression) -> Self {
        self.mappers
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), mapper);
        self
    }

    pub fn with_reducer(mut self, name: impl Into<String>, reducer: Expression) -> Self {
        self.reducers
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), reducer);
        self
    }

    pub fn queries(&self) -> impl Iterator<Item = (&String, &QueryPath)> {
        self.queries.iter().flatten()
    }

    pub fn defaults(&self) -> impl Iterator<Item = (&String, &DefaultValue)> {
        self.defaults.iter().flatten()
    }

    pub fn mappers(&self) -> impl Iterator<Item = (&String, &Expression)> {
        self.mappers.iter().flatten()
    }

    pub fn reducers(&self) -> impl Iterator<Item = (&String, &Expression)> {
        self.reducers.iter().flatten()
    }

    pub fn query(&self, name: &str) -> Option<&QueryPath> {
        self.queries.as_ref().and_then(|queries| queries.get(name))
    }

    fn validate(&self, measurement: &str, set: &str) -> Result<(), ConfigError> {
        let stages = [
            ("queries", self.queries.as_ref().map(IndexMap::len)),
            ("defaults", self.defaults.as_ref().map(IndexMap::len)),
            ("mappers", self.mappers.as_ref().map(IndexMap::len)),
            ("reducers", self.reducers.as_ref().map(IndexMap::len)),
        ];

        if let Some((stage, _)) = stages.iter().find(|(_, len)| *len == Some(0)) {
            return Err(ConfigError::measurement(
                measurement,
                format!("{set}.{stage} should NOT have less than 1 properties"),
            ));
        }

        for (name, mapper) in self.mappers() {
            check_arity(measurement, set, "mappers", name, mapper, &[Some(1)])?;
        }

        for (name, reducer) in self.reducers() {
            check_arity(measurement, set, "reducers", name, reducer, &[Some(2)])?;
        }

        for (name, default) in self.defaults() {
            if let DefaultValue::Expression(expression) = default {
                check_arity(measurement, set, "defaults", name, expression, &[None, Some(0)])?;
            }
        }

        Ok(())
    }
}

fn check_arity(
    measurement: &str,
    set: &str,
    stage: &str,
    name: &str,
    expression: &Expression,
    allowed: &[Option<usize>],
) -> Result<(), ConfigError> {
    if allowed.contains(&expression.arity()) {
        return Ok(());
    }

    let expected = allowed
        .iter()
        .map(|arity| arity.map_or("a value".to_owned(), |n| format!("{n} argument(s)")))
        .collect::<Vec<_>>()
        .join(" or ");

    Err(ConfigError::measurement(
        measurement,
        format!(
            "{set}.{stage}.{name} must be {expected}: '{}'",
            expression.source()
        ),
    ))
}

/// Named mapping from a report to points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeasurementDefinition {
    granularity: Granularity,
    fields: PropertySet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tags: Option<PropertySet>,
}

impl MeasurementDefinition {
    pub fn new(granularity: Granularity, fields: PropertySet) -> Self {
        Self {
            granularity,
            fields,
            tags: None,
        }
    }

    pub fn with_tags(self, tags: PropertySet) -> Self {
        Self {
            tags: Some(tags),
            ..self
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn fields(&self) -> &PropertySet {
        &self.fields
    }

    pub fn tags(&self) -> Option<&PropertySet> {
        self.tags.as_ref()
    }

    /// Checks the definition can produce points
    ///
    /// The primary field must be queried from a sample or the report,
    /// tags need at least one query or default, and snippets must
    /// declare the arguments their stage passes.
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let value_query = self
            .fields
            .queries
            .as_ref()
            .ok_or_else(|| ConfigError::measurement(name, "fields should have required property 'queries'"))?
            .get(PRIMARY_FIELD)
            .ok_or_else(|| {
                ConfigError::measurement(
                    name,
                    format!("fields.queries should have required property '{PRIMARY_FIELD}'"),
                )
            })?;

        match value_query.root() {
            Some(root) if root == SAMPLE_ROOT || REPORT_ROOTS.contains(&root) => {}
            _ => {
                return Err(ConfigError::measurement(
                    name,
                    format!(
                        "fields.queries.{PRIMARY_FIELD} should match pattern \"^\\$\\.(sample|testReport|report)\": '{}'",
                        value_query.as_str()
                    ),
                ))
            }
        }

        self.fields.validate(name, "fields")?;

        if let Some(tags) = &self.tags {
            if tags == &PropertySet::default() {
                return Err(ConfigError::measurement(
                    name,
                    "tags should NOT have less than 1 properties",
                ));
            }

            if tags.queries.is_none() && tags.defaults.is_none() {
                return Err(ConfigError::measurement(
                    name,
                    "tags should have required property 'queries' or 'defaults'",
                ));
            }

            tags.validate(name, "tags")?;
        }

        Ok(())
    }
}

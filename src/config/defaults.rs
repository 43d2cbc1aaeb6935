use indexmap::IndexMap;

use crate::error::ConfigError;
use crate::expression::Expression;
use crate::measurement::{Granularity, MeasurementDefinition, PropertySet};
use crate::query::QueryPath;

pub const DEFAULT_MEASUREMENT_NAME: &str = "latency";
pub const DEFAULT_ERROR_MEASUREMENT_NAME: &str = "clientErrors";

const MATCHES_FIELD: &str = "matches";
const MATCHES_QUERY: &str = "$.testReport._matches";

/// Per sample latency in milliseconds tagged with the response status
///
/// With `matches` the report wide match count is added to every point.
pub(super) fn latency_measurement(matches: bool) -> Result<MeasurementDefinition, ConfigError> {
    let mut fields = PropertySet::new()
        .with_query("value", QueryPath::parse("$.sample[${constants.LATENCY}]")?)
        .with_query("time", QueryPath::parse("$.sample[${constants.TIMESTAMP}]")?)
        .with_mapper("value", Expression::compile("v => v / 1000000")?);

    if matches {
        fields = fields.with_query(MATCHES_FIELD, QueryPath::parse(MATCHES_QUERY)?);
    }

    let tags = PropertySet::new().with_query(
        "response",
        QueryPath::parse("$.sample[${constants.STATUS_CODE}]")?,
    );

    Ok(MeasurementDefinition::new(Granularity::Sample, fields).with_tags(tags))
}

pub(super) fn default_measurements(
    name: &str,
    matches: bool,
) -> Result<IndexMap<String, MeasurementDefinition>, ConfigError> {
    Ok(IndexMap::from([(name.to_owned(), latency_measurement(matches)?)]))
}

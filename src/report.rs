//! Load test reports as received from the test runner
//! and contexts that measurement queries are resolved against.

use serde_json::{Map, Value};

const SAMPLES: &str = "latencies";
const ERRORS: &str = "errors";
const LEGACY_SAMPLES: &str = "_entries";
const LEGACY_ERRORS: &str = "_errors";

/// Root name for the current sample row in a query path
pub const SAMPLE_ROOT: &str = "sample";
/// Root names for the whole report in a query path
pub const REPORT_ROOTS: [&str; 2] = ["report", "testReport"];

/// Statistics of a single reporting event
///
/// Wraps the JSON document produced by the test runner. Sample rows are
/// stored under `latencies` and the error map under `errors`; reports
/// in the older `_entries`/`_errors` layout are copied over on creation.
///
/// ```rust
/// use profusion_influx::report::Report;
/// use serde_json::json;
///
/// let report = Report::new(json!({
///     "_entries": [[1, "id", 999, 200]],
///     "_errors": {"ETIMEDOUT": 2}
/// }));
///
/// assert_eq!(report.samples().len(), 1);
/// assert_eq!(report.errors().map(|errors| errors.len()), Some(1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Report(Value);

impl Report {
    pub fn new(mut value: Value) -> Self {
        if let Value::Object(map) = &mut value {
            copy_key(map, LEGACY_SAMPLES, SAMPLES);
            copy_key(map, LEGACY_ERRORS, ERRORS);
        }

        Self(value)
    }

    /// Sample rows of the report, empty when the report carries none
    pub fn samples(&self) -> &[Value] {
        self.0
            .get(SAMPLES)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Error counts keyed by error kind
    pub fn errors(&self) -> Option<&Map<String, Value>> {
        self.0.get(ERRORS).and_then(Value::as_object)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for Report {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

fn copy_key(map: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(value) = map.get(from).cloned() {
        map.insert(to.to_owned(), value);
    }
}

/// Object a measurement is extracted from
#[derive(Debug, Clone, Copy)]
pub enum ExtractionContext<'a> {
    /// Single sample row together with the report it belongs to
    Sample { sample: &'a Value, report: &'a Report },
    /// Whole report
    Report { report: &'a Report },
}

impl<'a> ExtractionContext<'a> {
    pub fn sample(sample: &'a Value, report: &'a Report) -> Self {
        Self::Sample { sample, report }
    }

    pub fn report(report: &'a Report) -> Self {
        Self::Report { report }
    }

    /// Resolves a top level name of the context
    pub fn root(&self, name: &str) -> Option<&'a Value> {
        match (*self, name) {
            (Self::Sample { sample, .. }, SAMPLE_ROOT) => Some(sample),
            (Self::Sample { report, .. } | Self::Report { report }, name)
                if REPORT_ROOTS.contains(&name) =>
            {
                Some(report.as_value())
            }
            _ => None,
        }
    }

    /// Every top level value of the context
    pub fn roots(&self) -> Vec<&'a Value> {
        match *self {
            Self::Sample { sample, report } => vec![sample, report.as_value()],
            Self::Report { report } => vec![report.as_value()],
        }
    }

    /// Materializes the context as a JSON object
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();

        if let Self::Sample { sample, .. } = *self {
            map.insert(SAMPLE_ROOT.to_owned(), sample.clone());
        }

        let report = match *self {
            Self::Sample { report, .. } | Self::Report { report } => report,
        };

        map.insert(REPORT_ROOTS[1].to_owned(), report.as_value().clone());

        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn returns_empty_samples_when_report_has_none() {
        let report = Report::new(json!({"errors": {}}));

        assert!(report.samples().is_empty());
    }

    #[test]
    fn keeps_current_layout_untouched() {
        let value = json!({"latencies": [[1, "a", 10, 200]], "errors": {"E": 1}});

        assert_eq!(Report::new(value.clone()).as_value(), &value);
    }

    #[test]
    fn copies_legacy_layout_keys() {
        let report = Report::new(json!({"_entries": [[1, "a", 10, 200]], "_errors": {"E": 1}}));

        assert_eq!(report.samples(), &[json!([1, "a", 10, 200])]);
        assert_eq!(report.errors().and_then(|errors| errors.get("E")), Some(&json!(1)));
        assert_eq!(report.as_value()["_entries"], json!([[1, "a", 10, 200]]));
    }

    #[test]
    fn report_is_reachable_by_both_root_names() {
        let report = Report::new(json!({"_matches": 88}));
        let context = ExtractionContext::report(&report);

        assert_eq!(context.root("report"), Some(report.as_value()));
        assert_eq!(context.root("testReport"), Some(report.as_value()));
        assert_eq!(context.root("sample"), None);
    }

    #[test]
    fn sample_context_exposes_sample_row() {
        let report = Report::new(json!({}));
        let sample = json!([1, "id", 5, 200]);
        let context = ExtractionContext::sample(&sample, &report);

        assert_eq!(context.root("sample"), Some(&sample));
        assert_eq!(context.roots().len(), 2);
        assert_eq!(
            context.to_value(),
            json!({"sample": [1, "id", 5, 200], "testReport": {}})
        );
    }
}

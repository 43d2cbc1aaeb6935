//! Single error count point summarizing a report's error map

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::point::{Point, Tags, PRIMARY_FIELD, TIME_FIELD};
use crate::report::Report;

/// Sums every error count of `report` into one point tagged with `static_tags`
///
/// Returns `None` when the report has no error map or no static tags
/// are configured. Counts that are not integers are ignored.
///
/// ```rust
/// use profusion_influx::error_count::error_point;
/// use profusion_influx::point::Tags;
/// use profusion_influx::report::Report;
/// use serde_json::json;
///
/// let report = Report::new(json!({"errors": {"ETIMEDOUT": 2, "ECONNREFUSED": 1}}));
/// let tags = Tags::from([("run".to_owned(), json!("abc"))]);
///
/// let point = error_point(&report, &tags, 1_000).unwrap();
/// assert_eq!(point.value(), Some(&json!(3)));
/// ```
pub fn error_point(report: &Report, static_tags: &Tags, now_millis: i64) -> Option<Point> {
    let errors = report.errors()?;

    if static_tags.is_empty() {
        return None;
    }

    let count = errors
        .iter()
        .filter_map(|(kind, count)| match count.as_i64() {
            Some(count) => Some(count),
            None => {
                warn!(error_kind = %kind, count = ?count, "Ignoring non-integer error count");
                None
            }
        })
        .sum::<i64>();

    let fields = IndexMap::from([
        (TIME_FIELD.to_owned(), Value::from(now_millis)),
        (PRIMARY_FIELD.to_owned(), Value::from(count)),
    ]);

    Some(Point::new(fields, static_tags.clone()))
}

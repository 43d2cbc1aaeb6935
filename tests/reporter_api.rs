use std::sync::Mutex;
use std::time::Duration;

use profusion_influx::{
    clock::Clock,
    config::Settings,
    error::{ReportError, WriteError},
    point::{Point, PointBatch},
    report::Report,
    runner::Reporter,
    writer::PointWriter,
};
use serde_json::{json, Value};

#[derive(Debug, Default)]
struct WriterStub {
    batches: Mutex<Vec<PointBatch>>,
    fail_on: Option<&'static str>,
    delay: Duration,
}

impl WriterStub {
    fn failing_on(measurement: &'static str) -> Self {
        Self {
            fail_on: Some(measurement),
            ..Self::default()
        }
    }

    fn delayed(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn points(&self, measurement: &str) -> Vec<Point> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .filter(|batch| batch.measurement() == measurement)
            .flat_map(|batch| batch.points().to_vec())
            .collect()
    }
}

impl PointWriter for WriterStub {
    async fn write_points(&self, measurement: &str, points: Vec<Point>) -> Result<(), WriteError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.fail_on == Some(measurement) {
            return Err(WriteError::Backend(format!("{measurement} rejected")));
        }

        self.batches
            .lock()
            .unwrap()
            .push(PointBatch::new(measurement, points));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct ClockStub(i64);

impl Clock for ClockStub {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

fn script_config(plugin: Value) -> Value {
    let mut influxdb = json!({
        "testName": "reporter-api",
        "influx": {
            "host": "influx.local",
            "username": "a-user",
            "password": "p@ssw0rd",
            "database": "load-tests"
        }
    });

    if let (Some(target), Some(extra)) = (influxdb.as_object_mut(), plugin.as_object()) {
        target.extend(extra.clone());
    }

    json!({"target": "http://localhost", "plugins": {"influxdb": influxdb}})
}

fn reporter(plugin: Value, writer: WriterStub) -> Reporter<WriterStub> {
    let settings = Settings::from_script_config(&script_config(plugin)).unwrap();

    Reporter::new(settings, writer).with_clock(ClockStub(1_500_000_000_000))
}

#[tokio::test]
async fn reports_latency_in_milliseconds_for_every_sample() {
    let reporter = reporter(json!({}), WriterStub::default());

    reporter
        .write(&Report::new(json!({
            "latencies": [
                [1000, "a", 999000, 200],
                [1001, "b", 998000, 404]
            ]
        })))
        .await
        .unwrap();

    let points = reporter.writer().points("latency");

    assert_eq!(
        points
            .iter()
            .map(|point| (point.value().cloned(), point.tag("response").cloned()))
            .collect::<Vec<_>>(),
        vec![
            (Some(json!(0.999)), Some(json!(200))),
            (Some(json!(0.998)), Some(json!(404)))
        ]
    );
    assert_eq!(points[0].field("time"), Some(&json!(1000)));
    assert_eq!(points[0].tag("testName"), Some(&json!("reporter-api")));
    assert_eq!(
        points[0]
            .tag("testRunId")
            .and_then(Value::as_str)
            .map(str::len),
        Some(36)
    );
}

#[tokio::test]
async fn end_to_end_custom_measurement_scales_nanoseconds() {
    let reporter = reporter(
        json!({
            "measurements": {
                "latencySeconds": {
                    "granularity": "sample",
                    "fields": {
                        "queries": {"value": "$.sample[${constants.LATENCY}]"},
                        "mappers": {"value": "v => v/1000000"}
                    }
                }
            }
        }),
        WriterStub::default(),
    );

    reporter
        .write(&Report::new(json!({
            "latencies": [[0, "a", 999, 200], [0, "b", 998, 200]]
        })))
        .await
        .unwrap();

    assert_eq!(
        reporter
            .writer()
            .points("latencySeconds")
            .iter()
            .map(|point| point.value().cloned())
            .collect::<Vec<_>>(),
        vec![Some(json!(0.000999)), Some(json!(0.000998))]
    );
}

#[tokio::test]
async fn aggregates_errors_into_single_point() {
    let reporter = reporter(
        json!({"excludeTestRunId": true, "tags": {"run": "abc"}}),
        WriterStub::default(),
    );

    reporter
        .write(&Report::new(json!({
            "latencies": [],
            "errors": {"timeout": 2, "refused": 1}
        })))
        .await
        .unwrap();

    let points = reporter.writer().points("clientErrors");

    assert_eq!(points.len(), 1);
    assert_eq!(points[0].value(), Some(&json!(3)));
    assert_eq!(points[0].field("time"), Some(&json!(1_500_000_000_000i64)));
    assert_eq!(
        points[0].tags().keys().collect::<Vec<_>>(),
        vec!["run", "testName"]
    );
}

#[tokio::test]
async fn writes_errors_under_configured_name_from_legacy_report() {
    let reporter = reporter(
        json!({"errorMeasurementName": "failures", "measurementName": "requests"}),
        WriterStub::default(),
    );

    reporter
        .write(&Report::new(json!({
            "_entries": [[1, "a", 2000000, 200]],
            "_errors": {"ETIMEDOUT": 4}
        })))
        .await
        .unwrap();

    assert_eq!(reporter.writer().points("requests").len(), 1);
    assert_eq!(
        reporter.writer().points("failures")[0].value(),
        Some(&json!(4))
    );
    assert!(reporter.writer().points("latency").is_empty());
    assert!(reporter.writer().points("clientErrors").is_empty());
}

#[tokio::test]
async fn reports_matches_with_every_sample_when_enabled() {
    let reporter = reporter(json!({"matches": true}), WriterStub::default());

    reporter
        .write(&Report::new(json!({
            "_matches": 88,
            "latencies": [[1, "a", 1000000, 200]]
        })))
        .await
        .unwrap();

    assert_eq!(
        reporter.writer().points("latency")[0].field("matches"),
        Some(&json!(88))
    );
}

#[tokio::test]
async fn nothing_is_written_for_empty_report() {
    let reporter = reporter(json!({}), WriterStub::default());

    let pending = reporter.report(&Report::new(json!({"latencies": []}))).unwrap();

    assert!(pending.is_empty());
    pending.wait().await.unwrap();
}

#[tokio::test]
async fn surfaces_first_write_failure_after_all_writes_finish() {
    let reporter = reporter(json!({}), WriterStub::failing_on("clientErrors"));

    let error = reporter
        .write(&Report::new(json!({
            "latencies": [[1, "a", 1000000, 200]],
            "errors": {"ETIMEDOUT": 1}
        })))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        ReportError::Write(WriteError::Backend(ref message)) if message == "clientErrors rejected"
    ));
    assert_eq!(reporter.writer().points("latency").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn returns_before_writes_complete() {
    let reporter = reporter(json!({}), WriterStub::delayed(Duration::from_millis(50)));

    let pending = reporter
        .report(&Report::new(json!({"latencies": [[1, "a", 1000000, 200]]})))
        .unwrap();

    assert!(reporter.writer().points("latency").is_empty());

    pending.wait().await.unwrap();

    assert_eq!(reporter.writer().points("latency").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_pending_writes_does_not_cancel_them() {
    let reporter = reporter(json!({}), WriterStub::delayed(Duration::from_millis(50)));

    drop(
        reporter
            .report(&Report::new(json!({"latencies": [[1, "a", 1000000, 200]]})))
            .unwrap(),
    );

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(reporter.writer().points("latency").len(), 1);
}

#[test]
fn report_requires_tokio_runtime() {
    let reporter = reporter(json!({}), WriterStub::default());

    let error = reporter
        .report(&Report::new(json!({"latencies": [[1, "a", 1000000, 200]]})))
        .unwrap_err();

    assert!(matches!(error, ReportError::NoRuntime(_)));
}

#[test]
fn evaluation_failure_names_measurement() {
    let reporter = reporter(
        json!({
            "measurements": {
                "broken": {
                    "granularity": "report",
                    "fields": {
                        "queries": {"value": "$.testReport.latencies"},
                        "mappers": {"value": "v => v + unknown"}
                    }
                }
            }
        }),
        WriterStub::default(),
    );

    let error = reporter
        .collect(&Report::new(json!({"latencies": [[1, "a", 1, 200]]})))
        .unwrap_err();

    assert!(error.to_string().starts_with("Measurement 'broken' failed"));
}

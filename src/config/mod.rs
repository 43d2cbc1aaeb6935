/*
 * Copyright © 2024. EcomDev B.V.
 * All rights reserved.
 * See LICENSE for license details.
 */

//! Reporter configuration
//!
//! [`RawSettings`] mirrors the configuration document as written by the user,
//! [`Settings`] is the validated, immutable result handed to the
//! [`Reporter`](crate::runner::Reporter).

mod defaults;

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ConfigError;
use crate::measurement::MeasurementDefinition;
use crate::point::Tags;

pub use defaults::{DEFAULT_ERROR_MEASUREMENT_NAME, DEFAULT_MEASUREMENT_NAME};

/// Name of the reporter section inside host `plugins` configuration
pub const PLUGIN_NAME: &str = "influxdb";
pub const ENV_INFLUX_USERNAME: &str = "INFLUX_USERNAME";
pub const ENV_INFLUX_PASSWORD: &str = "INFLUX_PASSWORD";

const TEST_NAME_TAG: &str = "testName";
const TEST_RUN_ID_TAG: &str = "testRunId";

/// Connection parameters of the time series backend, as configured
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawInfluxSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

/// Configuration document before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_measurement_name: Option<String>,
    #[serde(default)]
    pub exclude_test_run_id: bool,
    #[serde(default)]
    pub matches: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    #[serde(default)]
    pub influx: RawInfluxSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurements: Option<IndexMap<String, MeasurementDefinition>>,
}

impl RawSettings {
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Reads settings from a `.toml` file or, for any other extension, a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = fs::read_to_string(path)?;

        match path.extension().and_then(|extension| extension.to_str()) {
            Some("toml") => Self::from_toml(&input),
            _ => Self::from_json(&input),
        }
    }

    /// Validates settings, falling back to process environment for credentials
    pub fn validate(self) -> Result<Settings, ConfigError> {
        self.validate_with(|name| std::env::var(name).ok())
    }

    /// Validates settings, resolving missing credentials through `env`
    pub fn validate_with<F>(self, env: F) -> Result<Settings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let influx = InfluxSettings::validate(self.influx, &env)?;

        let test_name = self
            .test_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ConfigError::MissingParameter(TEST_NAME_TAG.to_owned()))?;

        let measurement_name = self
            .measurement_name
            .unwrap_or_else(|| DEFAULT_MEASUREMENT_NAME.to_owned());

        let error_measurement_name = self
            .error_measurement_name
            .unwrap_or_else(|| DEFAULT_ERROR_MEASUREMENT_NAME.to_owned());

        let measurements = match self.measurements {
            Some(measurements) => measurements,
            None => defaults::default_measurements(&measurement_name, self.matches)?,
        };

        if measurements.is_empty() {
            return Err(ConfigError::measurement(
                "measurements",
                "should NOT have less than 1 properties",
            ));
        }

        for (name, measurement) in &measurements {
            measurement.validate(name)?;
        }

        let mut static_tags = self.tags.unwrap_or_default();
        static_tags.insert(TEST_NAME_TAG.to_owned(), Value::from(test_name.clone()));

        if !self.exclude_test_run_id && !static_tags.contains_key(TEST_RUN_ID_TAG) {
            static_tags.insert(
                TEST_RUN_ID_TAG.to_owned(),
                Value::from(Uuid::new_v4().to_string()),
            );
        }

        Ok(Settings {
            test_name,
            measurement_name,
            error_measurement_name,
            static_tags,
            influx,
            measurements,
        })
    }
}

/// Validated backend connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfluxSettings {
    host: String,
    port: Option<u16>,
    username: String,
    password: String,
    database: String,
}

impl InfluxSettings {
    fn validate<F>(raw: RawInfluxSettings, env: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = config_or_env(raw.username, "influx.username", ENV_INFLUX_USERNAME, env)?;
        let password = config_or_env(raw.password, "influx.password", ENV_INFLUX_PASSWORD, env)?;
        let host = required(raw.host, "influx.host")?;

        if host.contains([':', '/']) {
            return Err(ConfigError::HostNotHostname("influx.host".to_owned()));
        }

        let database = required(raw.database, "influx.database")?;

        Ok(Self {
            host,
            port: raw.port,
            username,
            password,
            database,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

fn required(value: Option<String>, param: &str) -> Result<String, ConfigError> {
    value
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError::MissingParameter(param.to_owned()))
}

fn config_or_env<F>(
    value: Option<String>,
    param: &str,
    env_name: &str,
    env: &F,
) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    value
        .filter(|value| !value.is_empty())
        .or_else(|| env(env_name).filter(|value| !value.is_empty()))
        .ok_or_else(|| ConfigError::MissingParameterOrEnv {
            param: param.to_owned(),
            env: env_name.to_owned(),
        })
}

/// Validated reporter configuration
#[derive(Debug, Clone)]
pub struct Settings {
    test_name: String,
    measurement_name: String,
    error_measurement_name: String,
    static_tags: Tags,
    influx: InfluxSettings,
    measurements: IndexMap<String, MeasurementDefinition>,
}

impl Settings {
    /// Extracts and validates the reporter section of a host script configuration
    ///
    /// The section is looked up at `plugins.influxdb`.
    pub fn from_script_config(config: &Value) -> Result<Self, ConfigError> {
        let plugin = config
            .get("plugins")
            .filter(|plugins| plugins.is_object())
            .ok_or(ConfigError::PluginsNotFound)?
            .get(PLUGIN_NAME)
            .filter(|plugin| !plugin.is_null())
            .ok_or_else(|| ConfigError::PluginConfigRequired(PLUGIN_NAME.to_owned()))?;

        RawSettings::deserialize(plugin)?.validate()
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Name of the default latency measurement
    pub fn measurement_name(&self) -> &str {
        &self.measurement_name
    }

    pub fn error_measurement_name(&self) -> &str {
        &self.error_measurement_name
    }

    /// Tags added to every point, always including the test name
    pub fn static_tags(&self) -> &Tags {
        &self.static_tags
    }

    pub fn influx(&self) -> &InfluxSettings {
        &self.influx
    }

    /// Measurements in declaration order
    pub fn measurements(&self) -> impl Iterator<Item = (&str, &MeasurementDefinition)> {
        self.measurements
            .iter()
            .map(|(name, measurement)| (name.as_str(), measurement))
    }

    pub fn measurement(&self, name: &str) -> Option<&MeasurementDefinition> {
        self.measurements.get(name)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn valid() -> Value {
        json!({
            "testName": "this is a valid test name",
            "influx": {
                "host": "my-test-host-name",
                "username": "a-user",
                "password": "p@ssw0rd",
                "database": "any-db-name"
            }
        })
    }

    fn with(mut base: Value, pointer: &str, value: Value) -> Value {
        if let Some(target) = base.pointer_mut(pointer) {
            *target = value;
        } else if let Some((parent, key)) = pointer.rsplit_once('/') {
            base.pointer_mut(parent)
                .and_then(Value::as_object_mut)
                .unwrap()
                .insert(key.to_owned(), value);
        }
        base
    }

    fn without(mut base: Value, pointer: &str) -> Value {
        let (parent, key) = pointer.rsplit_once('/').unwrap();
        let parent = if parent.is_empty() {
            Some(&mut base)
        } else {
            base.pointer_mut(parent)
        };
        parent.and_then(Value::as_object_mut).unwrap().remove(key);
        base
    }

    fn validate(value: Value) -> Result<Settings, ConfigError> {
        serde_json::from_value::<RawSettings>(value)
            .unwrap()
            .validate_with(no_env)
    }

    #[test]
    fn accepts_valid_configuration() {
        let settings = validate(valid()).unwrap();

        assert_eq!(settings.test_name(), "this is a valid test name");
        assert_eq!(settings.influx().host(), "my-test-host-name");
        assert_eq!(settings.influx().database(), "any-db-name");
        assert_eq!(settings.measurement_name(), DEFAULT_MEASUREMENT_NAME);
        assert_eq!(settings.error_measurement_name(), DEFAULT_ERROR_MEASUREMENT_NAME);
    }

    #[test]
    fn requires_test_name() {
        let error = validate(without(valid(), "/testName")).unwrap_err();

        assert!(error.to_string().contains("testName"));
    }

    #[test]
    fn requires_influx_host() {
        let error = validate(without(valid(), "/influx/host")).unwrap_err();

        assert_eq!(
            error.to_string(),
            "The configuration parameter influx.host is required."
        );
    }

    #[test]
    fn requires_influx_host_without_protocol_or_port() {
        for host in [
            "http://my-test-host-name",
            "http://my-test-host-name:8080",
            "my-test-host-name:8080",
        ] {
            let error = validate(with(valid(), "/influx/host", json!(host))).unwrap_err();

            assert!(
                matches!(error, ConfigError::HostNotHostname(ref param) if param == "influx.host"),
                "{host} must be rejected"
            );
        }
    }

    #[test]
    fn requires_influx_database() {
        let error = validate(without(valid(), "/influx/database")).unwrap_err();

        assert!(error.to_string().contains("influx.database"));
    }

    #[test]
    fn requires_username_in_configuration_or_environment() {
        let error = validate(without(valid(), "/influx/username")).unwrap_err();

        assert_eq!(
            error.to_string(),
            "The configuration parameter influx.username or environment variable INFLUX_USERNAME is required."
        );
    }

    #[test]
    fn requires_password_in_configuration_or_environment() {
        let error = validate(without(valid(), "/influx/password")).unwrap_err();

        assert!(error.to_string().contains("influx.password"));
    }

    #[test]
    fn reads_credentials_from_environment() {
        let raw: RawSettings = serde_json::from_value(without(
            without(valid(), "/influx/username"),
            "/influx/password",
        ))
        .unwrap();

        let settings = raw
            .validate_with(|name| match name {
                ENV_INFLUX_USERNAME => Some("env-user".to_owned()),
                ENV_INFLUX_PASSWORD => Some("env-pass".to_owned()),
                _ => None,
            })
            .unwrap();

        assert_eq!(settings.influx().username(), "env-user");
        assert_eq!(settings.influx().password(), "env-pass");
    }

    #[test]
    fn configured_credentials_take_precedence_over_environment() {
        let raw: RawSettings = serde_json::from_value(valid()).unwrap();

        let settings = raw
            .validate_with(|_| Some("from-env".to_owned()))
            .unwrap();

        assert_eq!(settings.influx().username(), "a-user");
    }

    #[test]
    fn generates_test_run_id() {
        let settings = validate(valid()).unwrap();

        let run_id = settings.static_tags().get(TEST_RUN_ID_TAG).unwrap();

        assert_eq!(run_id.as_str().map(str::len), Some(36));
    }

    #[test]
    fn keeps_configured_test_run_id() {
        let settings = validate(with(valid(), "/tags", json!({"testRunId": "run-1"}))).unwrap();

        assert_eq!(settings.static_tags().get(TEST_RUN_ID_TAG), Some(&json!("run-1")));
    }

    #[test]
    fn excludes_test_run_id_on_request() {
        let settings = validate(with(valid(), "/excludeTestRunId", json!(true))).unwrap();

        assert!(settings.static_tags().get(TEST_RUN_ID_TAG).is_none());
    }

    #[test]
    fn adds_test_name_to_static_tags() {
        let settings = validate(with(
            valid(),
            "/tags",
            json!({"testName": "overridden", "env": "prod"}),
        ))
        .unwrap();

        assert_eq!(
            settings.static_tags().get(TEST_NAME_TAG),
            Some(&json!("this is a valid test name"))
        );
        assert_eq!(settings.static_tags().get("env"), Some(&json!("prod")));
    }

    #[test]
    fn adds_matches_query_to_default_measurement() {
        let settings = validate(with(valid(), "/matches", json!(true))).unwrap();

        let query = settings
            .measurement(DEFAULT_MEASUREMENT_NAME)
            .and_then(|measurement| measurement.fields().query("matches"))
            .map(|query| query.as_str());

        assert_eq!(query, Some("$.testReport._matches"));
    }

    #[test]
    fn renames_default_measurement() {
        let settings = validate(with(valid(), "/measurementName", json!("myLatency"))).unwrap();

        assert_eq!(
            settings.measurements().map(|(name, _)| name).collect::<Vec<_>>(),
            vec!["myLatency"]
        );
    }

    #[test]
    fn renames_error_measurement() {
        let settings = validate(with(valid(), "/errorMeasurementName", json!("myErrors"))).unwrap();

        assert_eq!(settings.error_measurement_name(), "myErrors");
    }

    #[test]
    fn custom_measurements_replace_defaults() {
        let settings = validate(with(
            valid(),
            "/measurements",
            json!({
                "myMeasurement": {
                    "granularity": "report",
                    "fields": {"queries": {"value": "$.testReport._matches"}}
                }
            }),
        ))
        .unwrap();

        assert_eq!(
            settings.measurements().map(|(name, _)| name).collect::<Vec<_>>(),
            vec!["myMeasurement"]
        );
    }

    #[test]
    fn rejects_empty_measurement_set() {
        assert!(validate(with(valid(), "/measurements", json!({}))).is_err());
    }

    #[test]
    fn rejects_invalid_measurement() {
        let error = validate(with(
            valid(),
            "/measurements",
            json!({"broken": {"granularity": "report", "fields": {}}}),
        ))
        .unwrap_err();

        assert!(matches!(error, ConfigError::InvalidMeasurement { ref name, .. } if name == "broken"));
    }

    #[test]
    fn reads_toml_configuration() {
        let raw = RawSettings::from_toml(
            r#"
            testName = "toml test"
            excludeTestRunId = true

            [influx]
            host = "localhost"
            username = "user"
            password = "secret"
            database = "metrics"

            [measurements.matches]
            granularity = "report"

            [measurements.matches.fields.queries]
            value = "$.testReport._matches"
            "#,
        )
        .unwrap();

        let settings = raw.validate_with(no_env).unwrap();

        assert_eq!(settings.test_name(), "toml test");
        assert!(settings.measurement("matches").is_some());
        assert_eq!(settings.static_tags().len(), 1);
    }

    #[test]
    fn reports_malformed_json() {
        assert!(matches!(
            RawSettings::from_json("{"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn extracts_plugin_section_from_script_config() {
        let raw: RawSettings = serde_json::from_value(valid()).unwrap();
        let script = json!({"plugins": {"influxdb": serde_json::to_value(&raw).unwrap()}});

        let settings = Settings::from_script_config(&script).unwrap();

        assert_eq!(settings.test_name(), "this is a valid test name");
    }

    #[test]
    fn requires_plugins_in_script_config() {
        assert!(matches!(
            Settings::from_script_config(&json!({})),
            Err(ConfigError::PluginsNotFound)
        ));
        assert!(matches!(
            Settings::from_script_config(&json!({"plugins": {}})),
            Err(ConfigError::PluginConfigRequired(_))
        ));
    }
}

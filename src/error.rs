/*
 * Copyright © 2024. EcomDev B.V.
 * All rights reserved.
 * See LICENSE for license details.
 */
use std::error::Error;
use thiserror::Error;

/// Raised while building [`Settings`](crate::config::Settings).
///
/// Every variant is fatal: reporting never starts with invalid configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No \"plugins\" configuration found.")]
    PluginsNotFound,

    #[error("The configuration for {0} is required.")]
    PluginConfigRequired(String),

    #[error("The configuration parameter {0} is required.")]
    MissingParameter(String),

    #[error("The configuration parameter {param} or environment variable {env} is required.")]
    MissingParameterOrEnv { param: String, env: String },

    #[error("The {0} property must be a host name only, protocol and port cannot be used.")]
    HostNotHostname(String),

    #[error("Invalid measurement '{name}': {reason}")]
    InvalidMeasurement { name: String, reason: String },

    #[error("Invalid query '{path}': {reason}")]
    InvalidQuery { path: String, reason: String },

    #[error("Could not parse expression '{source_text}': {reason}")]
    InvalidExpression { source_text: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn measurement(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidMeasurement {
            name: name.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Raised while a snippet or conversion runs against a single context
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Could not evaluate expression '{source_text}': {reason}")]
    Execution { source_text: String, reason: String },

    #[error("Expression '{source_text}' expects {expected} argument(s), got {actual}")]
    Arity {
        source_text: String,
        expected: usize,
        actual: usize,
    },

    #[error("Value cannot be converted: {0}")]
    Conversion(String),
}

/// Raised by a [`PointWriter`](crate::writer::PointWriter) when points were not persisted
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("{0}")]
    Backend(String),

    #[error("Write task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),

    // Allows returning any error from a storage client
    #[error(transparent)]
    Dynamic(#[from] Box<dyn Error + Send + Sync>),
}

impl From<std::io::Error> for WriteError {
    fn from(value: std::io::Error) -> Self {
        WriteError::Dynamic(Box::new(value))
    }
}

/// Failure of a single reporting event
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Measurement '{measurement}' failed: {source}")]
    Evaluation {
        measurement: String,
        #[source]
        source: EvaluationError,
    },

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("Reports can only be submitted within a tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

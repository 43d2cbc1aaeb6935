use crate::error::ConfigError;

/// Index of the timestamp in a sample row
pub const TIMESTAMP: usize = 0;
/// Index of the request id in a sample row
pub const REQUEST_ID: usize = 1;
/// Index of the latency (nanoseconds) in a sample row
pub const LATENCY: usize = 2;
/// Index of the response status code in a sample row
pub const STATUS_CODE: usize = 3;

const CONSTANTS: [(&str, usize); 4] = [
    ("TIMESTAMP", TIMESTAMP),
    ("REQUEST_ID", REQUEST_ID),
    ("LATENCY", LATENCY),
    ("STATUS_CODE", STATUS_CODE),
];

const NAMESPACE: &str = "constants.";

/// Looks up a named constant available to query templates
pub fn constant(name: &str) -> Option<usize> {
    let name = name.strip_prefix(NAMESPACE).unwrap_or(name);

    CONSTANTS
        .iter()
        .find(|(constant, _)| *constant == name)
        .map(|(_, value)| *value)
}

/// Replaces every `${constants.NAME}` placeholder with its numeric value
///
/// ```rust
/// use profusion_influx::query::substitute;
///
/// assert_eq!(
///     substitute("$.sample[${constants.LATENCY}]").unwrap(),
///     "$.sample[2]"
/// );
/// ```
pub fn substitute(template: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let placeholder = &rest[start + 2..];
        let end = placeholder.find('}').ok_or_else(|| ConfigError::InvalidQuery {
            path: template.to_owned(),
            reason: "unterminated placeholder".into(),
        })?;

        let name = placeholder[..end].trim();
        let value = constant(name).ok_or_else(|| ConfigError::InvalidQuery {
            path: template.to_owned(),
            reason: format!("unknown constant `{name}`"),
        })?;

        output.push_str(&value.to_string());
        rest = &placeholder[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

//! Path queries resolving property values from an extraction context.
//!
//! A query is a template that may reference sample row constants
//! (`$.sample[${constants.LATENCY}]`). Placeholders are substituted and the
//! result is parsed once, when configuration is loaded. The path language is
//! JSONPath: `$`, `.name`, `.*`, `..name` (recursive descent), `['name']`,
//! `[n]` and `[-n]`, `[*]`, slices `[start:end:step]`, unions `[0,2]` or
//! `['a','b']` and filters such as `[?(@.status >= 400)]`.

use std::cmp::Ordering;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::ConfigError;
use crate::report::ExtractionContext;

pub use template::*;

mod template;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Child(String),
    /// Negative positions count from the end of the array
    Index(i64),
    Wildcard,
    Slice {
        start: Option<i64>,
        end: Option<i64>,
        step: usize,
    },
    /// Names and positions selected in listed order, only `Child` and `Index`
    Union(Vec<Segment>),
    Filter(Filter),
    /// Applies the inner segment to the current value and every descendant
    Descendants(Box<Segment>),
}

impl Segment {
    fn select<'v>(&self, value: &'v Value) -> Vec<&'v Value> {
        match (self, value) {
            (Self::Child(name), Value::Object(map)) => map.get(name).into_iter().collect(),
            (Self::Index(index), Value::Array(items)) => position(*index, items.len())
                .and_then(|index| items.get(index))
                .into_iter()
                .collect(),
            (Self::Wildcard, Value::Array(items)) => items.iter().collect(),
            (Self::Wildcard, Value::Object(map)) => map.values().collect(),
            (Self::Slice { start, end, step }, Value::Array(items)) => {
                let len = items.len();
                let start = start.map_or(0, |start| clamp(start, len));
                let end = end.map_or(len, |end| clamp(end, len));

                items
                    .get(start..end.max(start))
                    .unwrap_or_default()
                    .iter()
                    .step_by(*step)
                    .collect()
            }
            (Self::Union(members), _) => members
                .iter()
                .flat_map(|member| member.select(value))
                .collect(),
            (Self::Filter(filter), Value::Array(items)) => {
                items.iter().filter(|item| filter.matches(item)).collect()
            }
            (Self::Filter(filter), Value::Object(map)) => {
                map.values().filter(|item| filter.matches(item)).collect()
            }
            (Self::Descendants(inner), _) => {
                let mut nodes = Vec::new();
                descendants(value, &mut nodes);

                nodes.into_iter().flat_map(|node| inner.select(node)).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn position(index: i64, len: usize) -> Option<usize> {
    if index < 0 {
        len.checked_sub(usize::try_from(index.unsigned_abs()).ok()?)
    } else {
        usize::try_from(index).ok()
    }
}

fn clamp(bound: i64, len: usize) -> usize {
    if bound < 0 {
        position(bound, len).unwrap_or(0)
    } else {
        usize::try_from(bound).map_or(len, |bound| bound.min(len))
    }
}

fn descendants<'v>(value: &'v Value, nodes: &mut Vec<&'v Value>) {
    nodes.push(value);

    match value {
        Value::Array(items) => items.iter().for_each(|item| descendants(item, nodes)),
        Value::Object(map) => map.values().for_each(|item| descendants(item, nodes)),
        _ => {}
    }
}

fn walk<'v>(segments: &[Segment], value: &'v Value) -> Vec<&'v Value> {
    segments.iter().fold(vec![value], |matches, segment| {
        matches
            .into_iter()
            .flat_map(|value| segment.select(value))
            .collect()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    const OPERATORS: [(&'static str, Comparison); 6] = [
        ("==", Comparison::Eq),
        ("!=", Comparison::Ne),
        ("<=", Comparison::Le),
        (">=", Comparison::Ge),
        ("<", Comparison::Lt),
        (">", Comparison::Gt),
    ];

    fn holds(self, left: &Value, right: &Value) -> bool {
        let ordering = match (left, right) {
            (Value::Number(left), Value::Number(right)) => left
                .as_f64()
                .zip(right.as_f64())
                .and_then(|(left, right)| left.partial_cmp(&right)),
            (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
            _ if left == right => Some(Ordering::Equal),
            _ => None,
        };

        match (self, ordering) {
            (Self::Ne, ordering) => ordering != Some(Ordering::Equal),
            (_, None) => false,
            (Self::Eq, Some(ordering)) => ordering == Ordering::Equal,
            (Self::Lt, Some(ordering)) => ordering == Ordering::Less,
            (Self::Le, Some(ordering)) => ordering != Ordering::Greater,
            (Self::Gt, Some(ordering)) => ordering == Ordering::Greater,
            (Self::Ge, Some(ordering)) => ordering != Ordering::Less,
        }
    }
}

/// `?(@.path)` keeps elements where the path resolves to a truthy value,
/// `?(@.path <op> literal)` those where the comparison holds
#[derive(Debug, Clone, PartialEq, Eq)]
struct Filter {
    path: Vec<Segment>,
    condition: Option<(Comparison, Value)>,
}

impl Filter {
    fn parse(expression: &str, path: &str) -> Result<Self, String> {
        let expression = expression.trim();
        let operator = expression.char_indices().find_map(|(offset, _)| {
            Comparison::OPERATORS
                .iter()
                .find(|(symbol, _)| expression[offset..].starts_with(symbol))
                .map(|(symbol, comparison)| (offset, *symbol, *comparison))
        });

        let (target, condition) = match operator {
            Some((offset, symbol, comparison)) => {
                let literal = parse_literal(expression[offset + symbol.len()..].trim())
                    .ok_or_else(|| format!("invalid filter literal in path `{path}`"))?;

                (expression[..offset].trim_end(), Some((comparison, literal)))
            }
            None => (expression, None),
        };

        let relative = target
            .strip_prefix('@')
            .ok_or_else(|| format!("filter must start with `@` in path `{path}`"))?;

        Ok(Self {
            path: parse_relative(relative, path)?,
            condition,
        })
    }

    fn matches(&self, item: &Value) -> bool {
        let resolved = walk(&self.path, item);

        match &self.condition {
            None => resolved.into_iter().any(is_truthy),
            Some((comparison, literal)) => resolved
                .into_iter()
                .any(|value| comparison.holds(value, literal)),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|number| number != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn parse_literal(literal: &str) -> Option<Value> {
    if let Some(text) = literal
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return Some(Value::String(text.to_owned()));
    }

    serde_json::from_str(literal).ok()
}

/// Parsed path query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPath {
    template: String,
    segments: Vec<Segment>,
}

impl QueryPath {
    /// Substitutes constants in `template` and parses the resulting path
    ///
    /// ```rust
    /// use profusion_influx::query::QueryPath;
    ///
    /// let query = QueryPath::parse("$.sample[${constants.LATENCY}]").unwrap();
    /// assert_eq!(query.root(), Some("sample"));
    /// ```
    pub fn parse(template: &str) -> Result<Self, ConfigError> {
        let path = substitute(template)?;
        let segments = parse_segments(&path).map_err(|reason| ConfigError::InvalidQuery {
            path: template.to_owned(),
            reason,
        })?;

        Ok(Self {
            template: template.to_owned(),
            segments,
        })
    }

    /// Name of the context root the query starts from, if it names one
    pub fn root(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Child(name)) => Some(name),
            _ => None,
        }
    }

    /// Template the query was parsed from
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Returns every value matched by the query, in document order
    pub fn evaluate(&self, context: &ExtractionContext<'_>) -> Vec<Value> {
        let mut segments = self.segments.iter();
        let whole;

        let mut matches = match segments.next() {
            None => return vec![context.to_value()],
            Some(Segment::Child(name)) => context.root(name).into_iter().collect(),
            Some(Segment::Wildcard) => context.roots(),
            Some(segment) => {
                whole = context.to_value();
                segment.select(&whole)
            }
        };

        for segment in segments {
            if matches.is_empty() {
                break;
            }

            matches = matches
                .into_iter()
                .flat_map(|value| segment.select(value))
                .collect();
        }

        matches.into_iter().cloned().collect()
    }
}

fn parse_segments(path: &str) -> Result<Vec<Segment>, String> {
    let rest = path
        .strip_prefix('$')
        .ok_or_else(|| format!("path must start with `$`, got `{path}`"))?;

    parse_relative(rest, path)
}

fn parse_relative(mut rest: &str, path: &str) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();

    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix("..") {
            let (segment, after) = if let Some(bracket) = stripped.strip_prefix('[') {
                parse_bracket(bracket, path)?
            } else {
                parse_dotted(stripped, path)?
            };

            segments.push(Segment::Descendants(Box::new(segment)));
            rest = after;
            continue;
        }

        if let Some(stripped) = rest.strip_prefix('.') {
            let (segment, after) = parse_dotted(stripped, path)?;
            segments.push(segment);
            rest = after;
            continue;
        }

        if let Some(stripped) = rest.strip_prefix('[') {
            let (segment, after) = parse_bracket(stripped, path)?;
            segments.push(segment);
            rest = after;
            continue;
        }

        return Err(format!("invalid token in path `{path}` near `{rest}`"));
    }

    Ok(segments)
}

fn parse_dotted<'p>(input: &'p str, path: &str) -> Result<(Segment, &'p str), String> {
    if let Some(after) = input.strip_prefix('*') {
        return Ok((Segment::Wildcard, after));
    }

    let end = input.find(['.', '[']).unwrap_or(input.len());
    let key = &input[..end];
    if key.is_empty() {
        return Err(format!("invalid key segment in path `{path}`"));
    }

    Ok((Segment::Child(key.to_owned()), &input[end..]))
}

fn parse_bracket<'p>(input: &'p str, path: &str) -> Result<(Segment, &'p str), String> {
    if let Some(filter) = input.strip_prefix("?(") {
        let end = filter
            .find(")]")
            .ok_or_else(|| format!("missing `)]` after filter in path `{path}`"))?;

        return Ok((
            Segment::Filter(Filter::parse(&filter[..end], path)?),
            &filter[end + 2..],
        ));
    }

    let end = closing_bracket(input).ok_or_else(|| format!("missing `]` in path `{path}`"))?;
    let inner = input[..end].trim();
    let after = &input[end + 1..];

    if inner == "*" {
        return Ok((Segment::Wildcard, after));
    }

    if !inner.starts_with(['\'', '"']) && inner.contains(':') {
        return Ok((parse_slice(inner, path)?, after));
    }

    let mut members = split_members(inner)
        .into_iter()
        .map(|member| parse_member(member, path))
        .collect::<Result<Vec<_>, _>>()?;

    let segment = if members.len() == 1 {
        members.remove(0)
    } else {
        Segment::Union(members)
    };

    Ok((segment, after))
}

/// Position of the `]` closing a bracket, skipping quoted names
fn closing_bracket(input: &str) -> Option<usize> {
    let mut quote = None;

    for (offset, c) in input.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(open), c) if c == open => quote = None,
            (None, ']') => return Some(offset),
            _ => {}
        }
    }

    None
}

fn split_members(inner: &str) -> Vec<&str> {
    let mut members = Vec::new();
    let mut quote = None;
    let mut start = 0;

    for (offset, c) in inner.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(open), c) if c == open => quote = None,
            (None, ',') => {
                members.push(inner[start..offset].trim());
                start = offset + 1;
            }
            _ => {}
        }
    }

    members.push(inner[start..].trim());
    members
}

fn parse_member(member: &str, path: &str) -> Result<Segment, String> {
    for quote in ['\'', '"'] {
        if let Some(quoted) = member.strip_prefix(quote) {
            return quoted
                .strip_suffix(quote)
                .map(|name| Segment::Child(name.to_owned()))
                .ok_or_else(|| format!("missing closing quote in path `{path}`"));
        }
    }

    member
        .parse::<i64>()
        .map(Segment::Index)
        .map_err(|_| format!("invalid array index `{member}` in path `{path}`"))
}

fn parse_slice(inner: &str, path: &str) -> Result<Segment, String> {
    let bound = |part: &str| -> Result<Option<i64>, String> {
        let part = part.trim();
        if part.is_empty() {
            return Ok(None);
        }

        part.parse::<i64>()
            .map(Some)
            .map_err(|_| format!("invalid slice bound `{part}` in path `{path}`"))
    };

    let parts = inner.split(':').collect::<Vec<_>>();
    let (start, end, step) = match parts.as_slice() {
        [start, end] => (bound(start)?, bound(end)?, None),
        [start, end, step] => (bound(start)?, bound(end)?, bound(step)?),
        _ => return Err(format!("invalid slice `{inner}` in path `{path}`")),
    };

    let step = match step {
        None => 1,
        Some(step) => usize::try_from(step)
            .ok()
            .filter(|step| *step > 0)
            .ok_or_else(|| format!("slice step must be positive in path `{path}`"))?,
    };

    Ok(Segment::Slice { start, end, step })
}

impl Serialize for QueryPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.template)
    }
}

impl<'de> Deserialize<'de> for QueryPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let template = String::deserialize(deserializer)?;
        Self::parse(&template).map_err(D::Error::custom)
    }
}

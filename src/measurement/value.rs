use serde_json::Value;

/// Working value of a single property while it moves through the stages
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Extracted {
    /// Nothing was queried or defaulted
    #[default]
    Absent,
    /// Single value produced by a reducer or the scalar extraction
    Scalar(Value),
    /// Every match of a query, or a wrapped default
    Series(Vec<Value>),
}

impl Extracted {
    /// Whether a default should replace the value
    ///
    /// ```rust
    /// use profusion_influx::measurement::Extracted;
    /// use serde_json::{json, Value};
    ///
    /// assert!(Extracted::Absent.is_empty());
    /// assert!(Extracted::Scalar(Value::Null).is_empty());
    /// assert!(Extracted::Series(vec![]).is_empty());
    /// assert!(!Extracted::Series(vec![json!(0)]).is_empty());
    /// ```
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Absent | Self::Scalar(Value::Null) => true,
            Self::Scalar(_) => false,
            Self::Series(values) => values.is_empty(),
        }
    }

    /// Final scalar of the property, if it resolved to anything
    pub fn into_scalar(self) -> Option<Value> {
        match self {
            Self::Scalar(Value::Null) => None,
            Self::Scalar(value) => Some(value),
            Self::Absent | Self::Series(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(Value::Null) => None,
            Self::Scalar(value) => Some(value),
            Self::Absent | Self::Series(_) => None,
        }
    }
}

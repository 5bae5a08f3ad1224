use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DurationValue {
    pub raw: String,
    pub millis: u64,
}

impl DurationValue {
    pub fn zero() -> Self {
        Self {
            raw: "0s".to_string(),
            millis: 0,
        }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self {
            raw: format!("{millis}ms"),
            millis,
        }
    }

    /// Parses a duration literal of the form `{N}{ms|s|m|h}` with integer N.
    pub fn parse(raw: &str) -> Result<Self, crate::DurationParseError> {
        let trimmed = raw.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| crate::DurationParseError::MissingUnit(trimmed.to_string()))?;
        let (digits, unit) = trimmed.split_at(split);
        if digits.is_empty() {
            return Err(crate::DurationParseError::MissingValue(trimmed.to_string()));
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| crate::DurationParseError::MissingValue(trimmed.to_string()))?;
        let millis = match unit {
            "ms" => value,
            "s" => value * 1_000,
            "m" => value * 60_000,
            "h" => value * 3_600_000,
            other => {
                return Err(crate::DurationParseError::UnknownUnit(other.to_string()));
            }
        };
        Ok(Self {
            raw: trimmed.to_string(),
            millis,
        })
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.millis)
    }

    pub fn is_zero(&self) -> bool {
        self.millis == 0
    }
}

/// Dynamic parameter value carried by actions and assertions.
///
/// Parameter maps stay schemaless at the document level; drivers and
/// evaluators validate the shapes they accept.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Duration(DurationValue),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<&DurationValue> {
        match self {
            Self::Duration(value) => Some(value),
            _ => None,
        }
    }

    pub fn to_string_value(&self) -> String {
        match self {
            Self::String(value) => value.clone(),
            Self::Integer(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Boolean(value) => value.to_string(),
            Self::Duration(value) => value.raw.clone(),
            Self::List(_) | Self::Map(_) => String::new(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

//! Value types and the `is_of_type` predicate.
//!
//! Type names as they appear in `valueType` fields:
//! - primitives: `string`, `integer`, `number`, `boolean`, `url`, `targetId`
//! - `date-time`: ISO-8601 in explicit UTC, e.g. `2024-01-01T00:00:00Z`
//! - `quaternion` (4 numbers), `bbox` (4 or 6 numbers), `crs`
//! - GeoJSON geometry names (`Point`, `LineString`, ...)
//! - `array`, `array.<elem>`, `array[<N>].<elem>`
//! - `any`
//! - anything else names a node kind

use crate::error::{Result, XpjsonError};
use crate::types::NodeKind;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub const GEOMETRY_TYPES: &[&str] = &[
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
    "GeometryCollection",
];

static DATE_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?Z$").expect("date-time pattern")
});

static ARRAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^array(?:\[([^\]]*)\])?\.(.+)$").expect("array type pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum ValueType {
    String,
    Integer,
    Number,
    Boolean,
    DateTime,
    TargetId,
    Quaternion,
    BBox,
    Crs,
    Url,
    Geometry(String),
    Array {
        len: Option<usize>,
        item: Box<ValueType>,
    },
    Any,
    /// Object or typed node of the named kind.
    Kind(String),
}

impl ValueType {
    pub fn array_of(item: ValueType) -> Self {
        Self::Array {
            len: None,
            item: Box::new(item),
        }
    }

    pub fn kind(name: &str) -> Self {
        Self::Kind(name.to_string())
    }

    /// Check a plain JSON value against this type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String | Self::Url | Self::TargetId => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::DateTime => value.as_str().is_some_and(is_utc_date_time),
            Self::Quaternion => numeric_array_len(value).is_some_and(|n| n == 4),
            Self::BBox => numeric_array_len(value).is_some_and(|n| n == 4 || n == 6),
            Self::Crs => value
                .as_object()
                .is_some_and(|o| o.contains_key("type") && o.contains_key("properties")),
            Self::Geometry(name) => object_type(value) == Some(name.as_str()),
            Self::Array { len, item } => match value.as_array() {
                Some(items) => {
                    len.is_none_or(|n| items.len() == n) && items.iter().all(|v| item.matches(v))
                }
                None => false,
            },
            Self::Any => true,
            Self::Kind(name) => match object_type(value) {
                Some(t) if t == name => true,
                Some(t) => NodeKind::from_type_name(t).is_some_and(|k| k.is_a(name)),
                None => false,
            },
        }
    }
}

impl FromStr for ValueType {
    type Err = XpjsonError;

    fn from_str(name: &str) -> Result<Self> {
        let invalid = |reason: &str| XpjsonError::InvalidValueType {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let vt = match name {
            "" => return Err(invalid("empty type name")),
            "string" => Self::String,
            "integer" => Self::Integer,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "date-time" => Self::DateTime,
            "targetId" => Self::TargetId,
            "quaternion" => Self::Quaternion,
            "bbox" => Self::BBox,
            "crs" => Self::Crs,
            "url" => Self::Url,
            "any" => Self::Any,
            "array" => Self::array_of(Self::Any),
            g if GEOMETRY_TYPES.contains(&g) => Self::Geometry(g.to_string()),
            s if s.starts_with("array") => {
                let caps = ARRAY_RE
                    .captures(s)
                    .ok_or_else(|| invalid("expected array[<N>].<type> or array.<type>"))?;
                let len = match caps.get(1).map(|m| m.as_str().trim()) {
                    None | Some("") => None,
                    Some(n) => Some(
                        n.parse::<usize>()
                            .map_err(|_| invalid("array length must be a non-negative integer"))?,
                    ),
                };
                let item = caps
                    .get(2)
                    .map(|m| m.as_str())
                    .ok_or_else(|| invalid("missing element type"))?;
                Self::Array {
                    len,
                    item: Box::new(item.parse()?),
                }
            }
            other => Self::Kind(other.to_string()),
        };
        Ok(vt)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Integer => f.write_str("integer"),
            Self::Number => f.write_str("number"),
            Self::Boolean => f.write_str("boolean"),
            Self::DateTime => f.write_str("date-time"),
            Self::TargetId => f.write_str("targetId"),
            Self::Quaternion => f.write_str("quaternion"),
            Self::BBox => f.write_str("bbox"),
            Self::Crs => f.write_str("crs"),
            Self::Url => f.write_str("url"),
            Self::Any => f.write_str("any"),
            Self::Geometry(name) | Self::Kind(name) => f.write_str(name),
            Self::Array { len: None, item } if **item == Self::Any => f.write_str("array"),
            Self::Array { len: None, item } => write!(f, "array.{}", item),
            Self::Array { len: Some(n), item } => write!(f, "array[{}].{}", n, item),
        }
    }
}

impl TryFrom<String> for ValueType {
    type Error = XpjsonError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Check `value` against the type named `type_name`.
///
/// Unparseable type names never match.
pub fn is_of_type(value: &Value, type_name: &str) -> bool {
    type_name
        .parse::<ValueType>()
        .map(|vt| vt.matches(value))
        .unwrap_or(false)
}

fn is_utc_date_time(s: &str) -> bool {
    DATE_TIME_RE.is_match(s) && chrono::DateTime::parse_from_rfc3339(s).is_ok()
}

fn numeric_array_len(value: &Value) -> Option<usize> {
    let items = value.as_array()?;
    items.iter().all(Value::is_number).then_some(items.len())
}

fn object_type(value: &Value) -> Option<&str> {
    value.as_object()?.get("type")?.as_str()
}

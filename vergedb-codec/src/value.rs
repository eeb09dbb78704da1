//! The self-describing value model.

use crate::error::CodecError;
use crate::types::RecordId;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// String-keyed object. Decoding keeps the last writer on duplicate keys.
pub type Object = BTreeMap<String, Value>;

/// A wire value.
///
/// Plain variants map onto the base major types; the remaining variants carry
/// the custom tag semantics of the protocol. `Unknown` preserves a tagged
/// value whose tag number this codec does not know: it survives decoding but
/// refuses to encode.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The none sentinel (tag 6 wrapping null): "absent", as opposed to zero.
    None,
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Bytes(Bytes),
    String(String),
    Array(Vec<Value>),
    Object(Object),
    /// A bare table name (tag 7).
    Table(String),
    /// A record identifier (tag 8).
    RecordId(RecordId),
    /// A decimal number (tag 10). Carried as f64; see DESIGN.md for the
    /// precision caveat.
    Decimal(f64),
    /// A datetime (tag 12, `[secs, nanos]`).
    DateTime(DateTime<Utc>),
    /// A duration (tag 14, `[secs, nanos]`).
    Duration(Duration),
    /// A binary UUID (tag 37).
    Uuid(Uuid),
    /// A geometry (tags 88-94).
    Geometry(Geometry),
    /// A tagged value with an unrecognized tag number.
    Unknown { tag: u64, value: Box<Value> },
}

impl Value {
    /// Returns the none sentinel.
    pub fn none() -> Self {
        Value::None
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) | Value::Decimal(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Table(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Looks up a field on an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|fields| fields.get(key))
    }

    /// The name used in type-mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Bytes(_) => "bytes",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Table(_) => "table",
            Value::RecordId(_) => "record id",
            Value::Decimal(_) => "decimal",
            Value::DateTime(_) => "datetime",
            Value::Duration(_) => "duration",
            Value::Uuid(_) => "uuid",
            Value::Geometry(_) => "geometry",
            Value::Unknown { .. } => "unknown tag",
        }
    }

    pub(crate) fn coerce_f64(&self) -> Result<f64, CodecError> {
        match self {
            Value::Integer(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            other => Err(CodecError::TypeMismatch {
                expected: "number",
                actual: other.type_name(),
            }),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self {
        Value::Object(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl From<Duration> for Value {
    fn from(v: Duration) -> Self {
        Value::Duration(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<RecordId> for Value {
    fn from(v: RecordId) -> Self {
        Value::RecordId(v)
    }
}

impl From<Geometry> for Value {
    fn from(v: Geometry) -> Self {
        Value::Geometry(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

impl TryFrom<Value> for String {
    type Error = CodecError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) | Value::Table(s) => Ok(s),
            other => Err(CodecError::TypeMismatch {
                expected: "string",
                actual: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = CodecError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_i64().ok_or(CodecError::TypeMismatch {
            expected: "integer",
            actual: "non-integer",
        })
    }
}

impl TryFrom<Value> for f64 {
    type Error = CodecError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.coerce_f64()
    }
}

impl TryFrom<Value> for bool {
    type Error = CodecError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_bool().ok_or(CodecError::TypeMismatch {
            expected: "bool",
            actual: "non-bool",
        })
    }
}

/// A geometry value: a coordinate tree under one of the geometry tags.
///
/// Points are `[x, y]` pairs; the compound shapes nest them the way the
/// server does (a polygon is a list of closed lines, a collection nests any
/// geometry including other collections).
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point([f64; 2]),
    Line(Vec<[f64; 2]>),
    Polygon(Vec<Vec<[f64; 2]>>),
    MultiPoint(Vec<[f64; 2]>),
    MultiLine(Vec<Vec<[f64; 2]>>),
    MultiPolygon(Vec<Vec<Vec<[f64; 2]>>>),
    Collection(Vec<Geometry>),
}

impl Geometry {
    /// The tag number this geometry encodes under.
    pub fn tag(&self) -> u64 {
        match self {
            Geometry::Point(_) => crate::TAG_GEOMETRY_POINT,
            Geometry::Line(_) => crate::TAG_GEOMETRY_LINE,
            Geometry::Polygon(_) => crate::TAG_GEOMETRY_POLYGON,
            Geometry::MultiPoint(_) => crate::TAG_GEOMETRY_MULTI_POINT,
            Geometry::MultiLine(_) => crate::TAG_GEOMETRY_MULTI_LINE,
            Geometry::MultiPolygon(_) => crate::TAG_GEOMETRY_MULTI_POLYGON,
            Geometry::Collection(_) => crate::TAG_GEOMETRY_COLLECTION,
        }
    }

    /// Rebuilds a geometry from a decoded tag content value.
    pub(crate) fn from_tag(tag: u64, content: Value) -> Result<Self, CodecError> {
        match tag {
            crate::TAG_GEOMETRY_POINT => Ok(Geometry::Point(point(&content)?)),
            crate::TAG_GEOMETRY_LINE => Ok(Geometry::Line(points(&content)?)),
            crate::TAG_GEOMETRY_POLYGON => Ok(Geometry::Polygon(lines(&content)?)),
            crate::TAG_GEOMETRY_MULTI_POINT => Ok(Geometry::MultiPoint(points(&content)?)),
            crate::TAG_GEOMETRY_MULTI_LINE => Ok(Geometry::MultiLine(lines(&content)?)),
            crate::TAG_GEOMETRY_MULTI_POLYGON => {
                let rings = expect_array(&content)?
                    .iter()
                    .map(lines)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Geometry::MultiPolygon(rings))
            }
            crate::TAG_GEOMETRY_COLLECTION => {
                let geometries = expect_array(&content)?
                    .iter()
                    .map(|item| match item {
                        Value::Geometry(g) => Ok(g.clone()),
                        other => Err(CodecError::TypeMismatch {
                            expected: "geometry",
                            actual: other.type_name(),
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Geometry::Collection(geometries))
            }
            _ => Err(CodecError::UnknownTag(tag)),
        }
    }
}

fn expect_array(value: &Value) -> Result<&[Value], CodecError> {
    value.as_array().ok_or(CodecError::TypeMismatch {
        expected: "array",
        actual: value.type_name(),
    })
}

fn point(value: &Value) -> Result<[f64; 2], CodecError> {
    let items = expect_array(value)?;
    if items.len() != 2 {
        return Err(CodecError::invalid(format!(
            "point needs 2 coordinates, got {}",
            items.len()
        )));
    }
    Ok([items[0].coerce_f64()?, items[1].coerce_f64()?])
}

fn points(value: &Value) -> Result<Vec<[f64; 2]>, CodecError> {
    expect_array(value)?.iter().map(point).collect()
}

fn lines(value: &Value) -> Result<Vec<Vec<[f64; 2]>>, CodecError> {
    expect_array(value)?.iter().map(points).collect()
}

//! Domain types carried over the wire, and the RPC envelopes.

use crate::error::CodecError;
use crate::value::{Object, Value};
use bytes::Bytes;
use std::fmt;

const RECORD_SEPARATOR: char = ':';

/// Constructor used by the server to mint a fresh record key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdConstructor {
    Rand,
    Ulid,
    Uuid,
}

impl IdConstructor {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdConstructor::Rand => "rand()",
            IdConstructor::Ulid => "ulid()",
            IdConstructor::Uuid => "uuid()",
        }
    }
}

/// The key part of a concrete record identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordKey {
    String(String),
    Integer(i64),
    Array(Vec<Value>),
    Object(Object),
}

impl RecordKey {
    pub(crate) fn to_value(&self) -> Value {
        match self {
            RecordKey::String(s) => Value::String(s.clone()),
            RecordKey::Integer(i) => Value::Integer(*i),
            RecordKey::Array(items) => Value::Array(items.clone()),
            RecordKey::Object(fields) => Value::Object(fields.clone()),
        }
    }

    pub(crate) fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::String(s) => Ok(RecordKey::String(s)),
            Value::Integer(i) => Ok(RecordKey::Integer(i)),
            Value::Array(items) => Ok(RecordKey::Array(items)),
            Value::Object(fields) => Ok(RecordKey::Object(fields)),
            other => Err(CodecError::TypeMismatch {
                expected: "string, integer, array or object",
                actual: other.type_name(),
            }),
        }
    }
}

impl From<&str> for RecordKey {
    fn from(v: &str) -> Self {
        RecordKey::String(v.to_owned())
    }
}

impl From<String> for RecordKey {
    fn from(v: String) -> Self {
        RecordKey::String(v)
    }
}

impl From<i64> for RecordKey {
    fn from(v: i64) -> Self {
        RecordKey::Integer(v)
    }
}

impl From<i32> for RecordKey {
    fn from(v: i32) -> Self {
        RecordKey::Integer(v as i64)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::String(s) => write!(f, "{s}"),
            RecordKey::Integer(i) => write!(f, "{i}"),
            RecordKey::Array(_) => write!(f, "[..]"),
            RecordKey::Object(_) => write!(f, "{{..}}"),
        }
    }
}

/// A record identifier.
///
/// `New` asks the server to mint the key; it encodes as the string
/// `table:ctor()` under the record-id tag and never decodes. `Concrete`
/// names a record: `[table, key]` under the record-id tag, or a bare table
/// name under the table tag when the key is absent.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordId {
    New {
        table: String,
        constructor: IdConstructor,
    },
    Concrete {
        table: String,
        key: Option<RecordKey>,
    },
}

impl RecordId {
    /// A new record id with a server-generated random key.
    pub fn new(table: impl Into<String>) -> Self {
        RecordId::New {
            table: table.into(),
            constructor: IdConstructor::Rand,
        }
    }

    /// A new record id with a server-generated ULID key.
    pub fn ulid(table: impl Into<String>) -> Self {
        RecordId::New {
            table: table.into(),
            constructor: IdConstructor::Ulid,
        }
    }

    /// A new record id with a server-generated UUID key.
    pub fn uuid(table: impl Into<String>) -> Self {
        RecordId::New {
            table: table.into(),
            constructor: IdConstructor::Uuid,
        }
    }

    /// A key-less identifier addressing every record in a table.
    pub fn table(table: impl Into<String>) -> Self {
        RecordId::Concrete {
            table: table.into(),
            key: None,
        }
    }

    /// A concrete identifier for a single record.
    pub fn from_parts(table: impl Into<String>, key: impl Into<RecordKey>) -> Self {
        RecordId::Concrete {
            table: table.into(),
            key: Some(key.into()),
        }
    }

    /// Splits a `table:key` string on the first separator. The flag reports
    /// whether a separator was present.
    pub fn parse(record: &str) -> (Self, bool) {
        match record.split_once(RECORD_SEPARATOR) {
            Some((table, key)) => (RecordId::from_parts(table, key), true),
            None => (
                RecordId::Concrete {
                    table: record.to_owned(),
                    key: None,
                },
                false,
            ),
        }
    }

    pub fn table_name(&self) -> &str {
        match self {
            RecordId::New { table, .. } | RecordId::Concrete { table, .. } => table,
        }
    }

    pub fn key(&self) -> Option<&RecordKey> {
        match self {
            RecordId::Concrete { key, .. } => key.as_ref(),
            RecordId::New { .. } => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::New { table, constructor } => {
                write!(f, "{table}{RECORD_SEPARATOR}{}", constructor.as_str())
            }
            RecordId::Concrete {
                table,
                key: Some(key),
            } => write!(f, "{table}{RECORD_SEPARATOR}{key}"),
            RecordId::Concrete { table, key: None } => write!(f, "{table}"),
        }
    }
}

/// A JSON-Patch operation applied to the server's value tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub op: PatchOp,
    pub path: String,
    /// The new value, for ops that carry one.
    pub value: Option<Value>,
    /// The source path, for `copy` and `move`.
    pub from: Option<String>,
}

impl Patch {
    pub fn new(op: PatchOp, path: impl Into<String>) -> Self {
        Self {
            op,
            path: path.into(),
            value: None,
            from: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
    Copy,
    Move,
    Test,
}

impl PatchOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchOp::Add => "add",
            PatchOp::Remove => "remove",
            PatchOp::Replace => "replace",
            PatchOp::Copy => "copy",
            PatchOp::Move => "move",
            PatchOp::Test => "test",
        }
    }
}

impl From<Patch> for Value {
    fn from(patch: Patch) -> Self {
        let mut fields = Object::new();
        fields.insert("op".to_string(), Value::from(patch.op.as_str()));
        fields.insert("path".to_string(), Value::String(patch.path));
        if let Some(value) = patch.value {
            fields.insert("value".to_string(), value);
        }
        if let Some(from) = patch.from {
            fields.insert("from".to_string(), Value::String(from));
        }
        Value::Object(fields)
    }
}

/// Wrapper distinguishing "absent" from the zero value on the wire.
///
/// The zero value encodes under the none tag with a null payload; any other
/// value encodes plainly. Decoding the none tag yields the zero value back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZeroAsNone<T>(pub T);

impl<T> From<ZeroAsNone<T>> for Value
where
    T: Into<Value> + Default + PartialEq,
{
    fn from(wrapper: ZeroAsNone<T>) -> Self {
        if wrapper.0 == T::default() {
            Value::None
        } else {
            wrapper.0.into()
        }
    }
}

impl<T> ZeroAsNone<T>
where
    T: Default + TryFrom<Value, Error = CodecError>,
{
    /// Rebuilds the wrapped value from a decoded wire value.
    pub fn from_value(value: Value) -> Result<Self, CodecError> {
        if value.is_none() {
            Ok(ZeroAsNone(T::default()))
        } else {
            T::try_from(value).map(ZeroAsNone)
        }
    }
}

/// Request envelope: `{ id, method, params }`.
///
/// The id is minted by the pending-request registry right before the write;
/// it is empty only on server-initiated notifications.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: String,
    pub method: String,
    pub params: Vec<Value>,
}

impl Request {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            method: method.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }
}

/// Response envelope: `{ id, result, error }`.
///
/// `result` is kept as the raw encoded bytes of the result value, sliced out
/// of the inbound frame, so callers decode into their own shapes.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub id: String,
    pub result: Option<Bytes>,
    pub error: Option<ResponseError>,
}

/// Error payload inside a response envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
}

/// One statement result inside a `query` response.
#[derive(Debug, Clone, Default)]
pub struct BasicResponse {
    /// Statement status, `"OK"` on success.
    pub status: String,
    /// Raw encoded result value.
    pub result: Bytes,
    /// Server-reported execution time, as emitted (e.g. `"71.5µs"`).
    pub time: String,
}

impl BasicResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_display() {
        assert_eq!(RecordId::new("user").to_string(), "user:rand()");
        assert_eq!(RecordId::ulid("user").to_string(), "user:ulid()");
        assert_eq!(RecordId::from_parts("user", 42).to_string(), "user:42");
        assert_eq!(RecordId::table("user").to_string(), "user");
    }

    #[test]
    fn test_record_id_parse() {
        let (id, found) = RecordId::parse("user:tobie");
        assert!(found);
        assert_eq!(id.table_name(), "user");
        assert_eq!(id.key(), Some(&RecordKey::String("tobie".to_string())));

        let (id, found) = RecordId::parse("user");
        assert!(!found);
        assert_eq!(id.table_name(), "user");
        assert!(id.key().is_none());
    }

    #[test]
    fn test_patch_to_value() {
        let patch = Patch::new(PatchOp::Replace, "/name").with_value("bob");
        let value = Value::from(patch);
        assert_eq!(value.get("op").and_then(Value::as_str), Some("replace"));
        assert_eq!(value.get("path").and_then(Value::as_str), Some("/name"));
        assert_eq!(value.get("value").and_then(Value::as_str), Some("bob"));
        assert!(value.get("from").is_none());
    }

    #[test]
    fn test_zero_as_none() {
        assert_eq!(Value::from(ZeroAsNone(String::new())), Value::None);
        assert_eq!(
            Value::from(ZeroAsNone("1.2.0".to_string())),
            Value::String("1.2.0".to_string())
        );

        let zero: ZeroAsNone<String> = ZeroAsNone::from_value(Value::None).unwrap();
        assert_eq!(zero.0, "");
        let set: ZeroAsNone<String> =
            ZeroAsNone::from_value(Value::String("1.2.0".to_string())).unwrap();
        assert_eq!(set.0, "1.2.0");
    }

    #[test]
    fn test_basic_response_status() {
        let ok = BasicResponse {
            status: "OK".to_string(),
            ..Default::default()
        };
        assert!(ok.is_ok());

        let err = BasicResponse {
            status: "ERR".to_string(),
            ..Default::default()
        };
        assert!(!err.is_ok());
    }
}

//! Limit-enforcing decoder for the wire value format.
//!
//! Decoding is incremental over a byte slice. Envelope decoding captures the
//! `result` field as a raw sub-slice of the inbound frame so callers can
//! defer interpretation.

use crate::error::CodecError;
use crate::types::{BasicResponse, RecordId, RecordKey, Response, ResponseError};
use crate::value::{Geometry, Object, Value};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_MAX_NESTING_DEPTH: u32 = 32;
pub const MIN_MAX_NESTING_DEPTH: u32 = 4;
pub const MAX_MAX_NESTING_DEPTH: u32 = 65535;

pub const DEFAULT_MAX_ARRAY_ELEMENTS: u64 = 131072;
pub const MIN_MAX_ARRAY_ELEMENTS: u64 = 16;
pub const MAX_MAX_ARRAY_ELEMENTS: u64 = i32::MAX as u64;

pub const DEFAULT_MAX_MAP_PAIRS: u64 = 131072;
pub const MIN_MAX_MAP_PAIRS: u64 = 16;
pub const MAX_MAX_MAP_PAIRS: u64 = i32::MAX as u64;

/// Decoder limits. All values are clamped into their valid ranges.
#[derive(Debug, Clone)]
pub struct DecodeLimits {
    max_nesting_depth: u32,
    max_array_elements: u64,
    max_map_pairs: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            max_array_elements: DEFAULT_MAX_ARRAY_ELEMENTS,
            max_map_pairs: DEFAULT_MAX_MAP_PAIRS,
        }
    }
}

impl DecodeLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_nesting_depth(mut self, depth: u32) -> Self {
        self.max_nesting_depth = depth.clamp(MIN_MAX_NESTING_DEPTH, MAX_MAX_NESTING_DEPTH);
        self
    }

    pub fn with_max_array_elements(mut self, elements: u64) -> Self {
        self.max_array_elements = elements.clamp(MIN_MAX_ARRAY_ELEMENTS, MAX_MAX_ARRAY_ELEMENTS);
        self
    }

    pub fn with_max_map_pairs(mut self, pairs: u64) -> Self {
        self.max_map_pairs = pairs.clamp(MIN_MAX_MAP_PAIRS, MAX_MAX_MAP_PAIRS);
        self
    }

    pub fn max_nesting_depth(&self) -> u32 {
        self.max_nesting_depth
    }

    pub fn max_array_elements(&self) -> u64 {
        self.max_array_elements
    }

    pub fn max_map_pairs(&self) -> u64 {
        self.max_map_pairs
    }
}

/// Decodes a single value from `data`, rejecting trailing bytes.
pub fn from_slice(data: &[u8], limits: &DecodeLimits) -> Result<Value, CodecError> {
    let mut reader = Reader::new(data, limits);
    let value = reader.read_value(0)?;
    reader.finish()?;
    Ok(value)
}

/// Decodes a response envelope, slicing the raw result out of `frame`.
pub fn decode_response(frame: &Bytes, limits: &DecodeLimits) -> Result<Response, CodecError> {
    let mut reader = Reader::new(frame, limits);
    let len = reader.read_map_head()?;
    let mut response = Response::default();

    for _ in 0..len {
        let key = reader.read_key()?;
        match key.as_str() {
            "id" => match reader.read_value(1)? {
                Value::String(id) => response.id = id,
                Value::Null | Value::None => {}
                other => {
                    return Err(CodecError::TypeMismatch {
                        expected: "string",
                        actual: other.type_name(),
                    })
                }
            },
            "result" => {
                let start = reader.pos;
                reader.skip_item(1)?;
                response.result = Some(frame.slice(start..reader.pos));
            }
            "error" => match reader.read_value(1)? {
                Value::Null | Value::None => {}
                Value::Object(fields) => {
                    response.error = Some(ResponseError {
                        code: fields.get("code").and_then(Value::as_i64).unwrap_or(0),
                        message: fields
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    });
                }
                other => {
                    return Err(CodecError::TypeMismatch {
                        expected: "error object",
                        actual: other.type_name(),
                    })
                }
            },
            _ => reader.skip_item(1)?,
        }
    }

    reader.finish()?;
    Ok(response)
}

/// Decodes an array of statement results, keeping each raw result slice.
pub fn decode_basic_responses(
    frame: &Bytes,
    limits: &DecodeLimits,
) -> Result<Vec<BasicResponse>, CodecError> {
    let mut reader = Reader::new(frame, limits);

    if reader.peek()? == 0xf6 {
        return Ok(Vec::new());
    }

    let len = reader.read_array_head()?;
    let mut responses = Vec::new();

    for _ in 0..len {
        let pairs = reader.read_map_head()?;
        let mut basic = BasicResponse::default();

        for _ in 0..pairs {
            let key = reader.read_key()?;
            match key.as_str() {
                "status" => match reader.read_value(2)? {
                    Value::String(status) => basic.status = status,
                    other => {
                        return Err(CodecError::TypeMismatch {
                            expected: "string",
                            actual: other.type_name(),
                        })
                    }
                },
                "result" => {
                    let start = reader.pos;
                    reader.skip_item(2)?;
                    basic.result = frame.slice(start..reader.pos);
                }
                "time" => match reader.read_value(2)? {
                    Value::String(time) => basic.time = time,
                    Value::Null | Value::None => {}
                    other => {
                        return Err(CodecError::TypeMismatch {
                            expected: "string",
                            actual: other.type_name(),
                        })
                    }
                },
                _ => reader.skip_item(2)?,
            }
        }

        responses.push(basic);
    }

    reader.finish()?;
    Ok(responses)
}

/// Decodes a bare subscription id value (uuid, byte string or text).
pub fn decode_subscription_id(data: &[u8], limits: &DecodeLimits) -> Result<Vec<u8>, CodecError> {
    let mut reader = Reader::new(data, limits);
    let value = reader.read_value(0)?;
    id_bytes(value)
}

/// Extracts the subscription id out of a live notification payload
/// (`{ id, action, result }`), ignoring the other fields.
pub fn decode_notification_id(data: &[u8], limits: &DecodeLimits) -> Result<Vec<u8>, CodecError> {
    let mut reader = Reader::new(data, limits);
    let len = reader.read_map_head()?;
    let mut id = None;

    for _ in 0..len {
        let key = reader.read_key()?;
        if key == "id" {
            id = Some(id_bytes(reader.read_value(1)?)?);
        } else {
            reader.skip_item(1)?;
        }
    }

    id.ok_or_else(|| CodecError::invalid("notification payload without id"))
}

fn id_bytes(value: Value) -> Result<Vec<u8>, CodecError> {
    match value {
        Value::Uuid(uuid) => Ok(uuid.as_bytes().to_vec()),
        Value::Bytes(bytes) => Ok(bytes.to_vec()),
        Value::String(text) => Ok(text.into_bytes()),
        other => Err(CodecError::TypeMismatch {
            expected: "subscription id",
            actual: other.type_name(),
        }),
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    limits: &'a DecodeLimits,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], limits: &'a DecodeLimits) -> Self {
        Self {
            data,
            pos: 0,
            limits,
        }
    }

    fn finish(&self) -> Result<(), CodecError> {
        let remaining = self.data.len() - self.pos;
        if remaining > 0 {
            return Err(CodecError::TrailingBytes(remaining));
        }
        Ok(())
    }

    fn peek(&self) -> Result<u8, CodecError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(CodecError::UnexpectedEof)
    }

    fn take_u8(&mut self) -> Result<u8, CodecError> {
        let byte = self.peek()?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.data.len() - self.pos < n {
            return Err(CodecError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_uint_arg(&mut self, info: u8) -> Result<u64, CodecError> {
        match info {
            0..=23 => Ok(info as u64),
            24 => Ok(self.take_u8()? as u64),
            25 => {
                let bytes = self.take(2)?;
                Ok(u16::from_be_bytes([bytes[0], bytes[1]]) as u64)
            }
            26 => {
                let bytes = self.take(4)?;
                Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64)
            }
            27 => {
                let bytes = self.take(8)?;
                Ok(u64::from_be_bytes(bytes.try_into().expect("8 bytes")))
            }
            31 => Err(CodecError::IndefiniteLength),
            other => Err(CodecError::InvalidHead(other)),
        }
    }

    fn check_depth(&self, depth: u32) -> Result<(), CodecError> {
        if depth > self.limits.max_nesting_depth {
            return Err(CodecError::DepthLimitExceeded {
                limit: self.limits.max_nesting_depth,
            });
        }
        Ok(())
    }

    fn read_array_head(&mut self) -> Result<u64, CodecError> {
        let init = self.take_u8()?;
        if init >> 5 != 4 {
            return Err(CodecError::TypeMismatch {
                expected: "array",
                actual: "other",
            });
        }
        let len = self.read_uint_arg(init & 0x1f)?;
        if len > self.limits.max_array_elements {
            return Err(CodecError::ArrayTooLong {
                len,
                limit: self.limits.max_array_elements,
            });
        }
        Ok(len)
    }

    fn read_map_head(&mut self) -> Result<u64, CodecError> {
        let init = self.take_u8()?;
        if init >> 5 != 5 {
            return Err(CodecError::TypeMismatch {
                expected: "map",
                actual: "other",
            });
        }
        let len = self.read_uint_arg(init & 0x1f)?;
        if len > self.limits.max_map_pairs {
            return Err(CodecError::MapTooLong {
                len,
                limit: self.limits.max_map_pairs,
            });
        }
        Ok(len)
    }

    fn read_key(&mut self) -> Result<String, CodecError> {
        let init = self.take_u8()?;
        if init >> 5 != 3 {
            return Err(CodecError::TypeMismatch {
                expected: "text map key",
                actual: "other",
            });
        }
        let len = self.read_uint_arg(init & 0x1f)?;
        self.read_text(len)
    }

    fn read_text(&mut self, len: u64) -> Result<String, CodecError> {
        let bytes = self.take(len as usize)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    fn read_value(&mut self, depth: u32) -> Result<Value, CodecError> {
        self.check_depth(depth)?;

        let init = self.take_u8()?;
        let major = init >> 5;
        let info = init & 0x1f;

        match major {
            0 => {
                let n = self.read_uint_arg(info)?;
                if n > i64::MAX as u64 {
                    return Err(CodecError::IntegerOverflow);
                }
                Ok(Value::Integer(n as i64))
            }
            1 => {
                let n = self.read_uint_arg(info)?;
                if n > i64::MAX as u64 {
                    return Err(CodecError::IntegerOverflow);
                }
                Ok(Value::Integer(-1 - n as i64))
            }
            2 => {
                let len = self.read_uint_arg(info)?;
                let bytes = self.take(len as usize)?;
                Ok(Value::Bytes(Bytes::copy_from_slice(bytes)))
            }
            3 => {
                let len = self.read_uint_arg(info)?;
                Ok(Value::String(self.read_text(len)?))
            }
            4 => {
                let len = self.read_uint_arg(info)?;
                if len > self.limits.max_array_elements {
                    return Err(CodecError::ArrayTooLong {
                        len,
                        limit: self.limits.max_array_elements,
                    });
                }
                let mut items = Vec::new();
                for _ in 0..len {
                    items.push(self.read_value(depth + 1)?);
                }
                Ok(Value::Array(items))
            }
            5 => {
                let len = self.read_uint_arg(info)?;
                if len > self.limits.max_map_pairs {
                    return Err(CodecError::MapTooLong {
                        len,
                        limit: self.limits.max_map_pairs,
                    });
                }
                let mut fields = Object::new();
                for _ in 0..len {
                    let key = self.read_key()?;
                    let value = self.read_value(depth + 1)?;
                    // Duplicate keys: last writer wins.
                    fields.insert(key, value);
                }
                Ok(Value::Object(fields))
            }
            6 => {
                let tag = self.read_uint_arg(info)?;
                let content = self.read_value(depth + 1)?;
                self.apply_tag(tag, content)
            }
            _ => match info {
                20 => Ok(Value::Bool(false)),
                21 => Ok(Value::Bool(true)),
                22 | 23 => Ok(Value::Null),
                25 => {
                    let bytes = self.take(2)?;
                    Ok(Value::Float(f16_to_f64(u16::from_be_bytes([
                        bytes[0], bytes[1],
                    ]))))
                }
                26 => {
                    let bytes = self.take(4)?;
                    Ok(Value::Float(f32::from_be_bytes(
                        bytes.try_into().expect("4 bytes"),
                    ) as f64))
                }
                27 => {
                    let bytes = self.take(8)?;
                    Ok(Value::Float(f64::from_be_bytes(
                        bytes.try_into().expect("8 bytes"),
                    )))
                }
                31 => Err(CodecError::IndefiniteLength),
                other => Err(CodecError::InvalidHead(other)),
            },
        }
    }

    fn apply_tag(&mut self, tag: u64, content: Value) -> Result<Value, CodecError> {
        match tag {
            crate::TAG_NONE => match content {
                Value::Null => Ok(Value::None),
                other => Err(CodecError::invalid(format!(
                    "none tag with non-null content of type {}",
                    other.type_name()
                ))),
            },
            crate::TAG_STD_DATETIME => match content {
                Value::String(text) => DateTime::parse_from_rfc3339(&text)
                    .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                    .map_err(|err| CodecError::invalid(format!("invalid datetime text: {err}"))),
                other => Err(CodecError::TypeMismatch {
                    expected: "datetime text",
                    actual: other.type_name(),
                }),
            },
            crate::TAG_TABLE => match content {
                Value::String(name) => Ok(Value::Table(name)),
                other => Err(CodecError::TypeMismatch {
                    expected: "table name",
                    actual: other.type_name(),
                }),
            },
            crate::TAG_RECORD_ID => match content {
                Value::String(record) => {
                    // Constructor-form ids (`table:rand()`) are encode-only.
                    if record.ends_with("()") {
                        return Err(CodecError::UnmarshalNotSupported);
                    }
                    let (id, _) = RecordId::parse(&record);
                    Ok(Value::RecordId(id))
                }
                Value::Array(items) => {
                    if items.len() != 2 {
                        return Err(CodecError::invalid(format!(
                            "record id needs 2 elements, got {}",
                            items.len()
                        )));
                    }
                    let mut items = items.into_iter();
                    let table = match items.next().expect("2 elements") {
                        Value::String(table) => table,
                        other => {
                            return Err(CodecError::TypeMismatch {
                                expected: "string",
                                actual: other.type_name(),
                            })
                        }
                    };
                    let key = RecordKey::from_value(items.next().expect("2 elements"))?;
                    Ok(Value::RecordId(RecordId::Concrete {
                        table,
                        key: Some(key),
                    }))
                }
                other => Err(CodecError::TypeMismatch {
                    expected: "record id array",
                    actual: other.type_name(),
                }),
            },
            crate::TAG_DECIMAL => Ok(Value::Decimal(content.coerce_f64()?)),
            crate::TAG_DATETIME => {
                let items = int_items(&content)?;
                if items.is_empty() || items.len() > 2 {
                    return Err(CodecError::invalid(format!(
                        "datetime needs 1-2 elements, got {}",
                        items.len()
                    )));
                }
                let secs = items[0];
                let nanos = items.get(1).copied().unwrap_or(0);
                let nanos = u32::try_from(nanos)
                    .map_err(|_| CodecError::invalid("datetime nanoseconds out of range"))?;
                DateTime::from_timestamp(secs, nanos)
                    .map(Value::DateTime)
                    .ok_or_else(|| CodecError::invalid("datetime out of range"))
            }
            crate::TAG_DURATION => {
                let items = int_items(&content)?;
                if items.len() > 2 {
                    return Err(CodecError::invalid(format!(
                        "duration needs at most 2 elements, got {}",
                        items.len()
                    )));
                }
                let secs = items
                    .first()
                    .map(|&s| u64::try_from(s))
                    .transpose()
                    .map_err(|_| CodecError::invalid("negative duration seconds"))?
                    .unwrap_or(0);
                let nanos = items
                    .get(1)
                    .map(|&n| u64::try_from(n))
                    .transpose()
                    .map_err(|_| CodecError::invalid("negative duration nanoseconds"))?
                    .unwrap_or(0);
                Duration::from_secs(secs)
                    .checked_add(Duration::from_nanos(nanos))
                    .map(Value::Duration)
                    .ok_or_else(|| CodecError::invalid("duration out of range"))
            }
            crate::TAG_UUID => match content {
                Value::Bytes(bytes) => Uuid::from_slice(&bytes)
                    .map(Value::Uuid)
                    .map_err(|_| CodecError::invalid("uuid needs 16 bytes")),
                other => Err(CodecError::TypeMismatch {
                    expected: "uuid bytes",
                    actual: other.type_name(),
                }),
            },
            crate::TAG_GEOMETRY_POINT..=crate::TAG_GEOMETRY_COLLECTION => {
                Geometry::from_tag(tag, content).map(Value::Geometry)
            }
            _ => Ok(Value::Unknown {
                tag,
                value: Box::new(content),
            }),
        }
    }

    /// Skips one item without materializing it, honoring the same limits.
    fn skip_item(&mut self, depth: u32) -> Result<(), CodecError> {
        self.check_depth(depth)?;

        let init = self.take_u8()?;
        let major = init >> 5;
        let info = init & 0x1f;

        match major {
            0 | 1 => {
                self.read_uint_arg(info)?;
            }
            2 | 3 => {
                let len = self.read_uint_arg(info)?;
                self.take(len as usize)?;
            }
            4 => {
                let len = self.read_uint_arg(info)?;
                if len > self.limits.max_array_elements {
                    return Err(CodecError::ArrayTooLong {
                        len,
                        limit: self.limits.max_array_elements,
                    });
                }
                for _ in 0..len {
                    self.skip_item(depth + 1)?;
                }
            }
            5 => {
                let len = self.read_uint_arg(info)?;
                if len > self.limits.max_map_pairs {
                    return Err(CodecError::MapTooLong {
                        len,
                        limit: self.limits.max_map_pairs,
                    });
                }
                for _ in 0..len {
                    self.skip_item(depth + 1)?;
                    self.skip_item(depth + 1)?;
                }
            }
            6 => {
                self.read_uint_arg(info)?;
                self.skip_item(depth + 1)?;
            }
            _ => match info {
                20..=23 => {}
                25 => {
                    self.take(2)?;
                }
                26 => {
                    self.take(4)?;
                }
                27 => {
                    self.take(8)?;
                }
                31 => return Err(CodecError::IndefiniteLength),
                other => return Err(CodecError::InvalidHead(other)),
            },
        }
        Ok(())
    }
}

fn int_items(content: &Value) -> Result<Vec<i64>, CodecError> {
    let items = content.as_array().ok_or(CodecError::TypeMismatch {
        expected: "array",
        actual: content.type_name(),
    })?;
    items
        .iter()
        .map(|item| {
            item.as_i64().ok_or(CodecError::TypeMismatch {
                expected: "integer",
                actual: item.type_name(),
            })
        })
        .collect()
}

fn f16_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exp = ((bits >> 10) & 0x1f) as i32;
    let frac = (bits & 0x3ff) as f64;

    let magnitude = match exp {
        0 => frac * 2f64.powi(-24),
        31 => {
            if frac == 0.0 {
                f64::INFINITY
            } else {
                f64::NAN
            }
        }
        _ => (1.0 + frac / 1024.0) * 2f64.powi(exp - 15),
    };

    sign * magnitude
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::to_vec;
    use crate::types::ZeroAsNone;

    fn roundtrip(value: Value) -> Value {
        let encoded = to_vec(&value).unwrap();
        from_slice(&encoded, &DecodeLimits::default()).unwrap()
    }

    #[test]
    fn test_roundtrip_scalars() {
        for value in [
            Value::Null,
            Value::None,
            Value::Bool(true),
            Value::Bool(false),
            Value::Integer(0),
            Value::Integer(i64::MAX),
            Value::Integer(i64::MIN),
            Value::Float(1.5),
            Value::Float(-0.25),
            Value::String("hello".to_string()),
            Value::String(String::new()),
            Value::Bytes(Bytes::from_static(b"\x00\x01\x02")),
        ] {
            assert_eq!(roundtrip(value.clone()), value);
        }
    }

    #[test]
    fn test_roundtrip_containers() {
        let mut fields = Object::new();
        fields.insert("name".to_string(), Value::from("alice"));
        fields.insert("tags".to_string(), Value::Array(vec![
            Value::from("a"),
            Value::from("b"),
        ]));
        let value = Value::Object(fields);
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn test_roundtrip_tagged() {
        let dt = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        for value in [
            Value::DateTime(dt),
            Value::Duration(Duration::new(90, 500)),
            Value::Decimal(13.5626),
            Value::Uuid(Uuid::from_bytes([7; 16])),
            Value::RecordId(RecordId::from_parts("user", 42)),
            Value::RecordId(RecordId::from_parts("user", "tobie")),
            Value::Geometry(Geometry::Point([51.509865, -0.118092])),
            Value::Geometry(Geometry::Line(vec![[0.0, 0.0], [1.0, 1.0]])),
            Value::Geometry(Geometry::Polygon(vec![vec![
                [0.0, 0.0],
                [0.0, 1.0],
                [1.0, 1.0],
                [0.0, 0.0],
            ]])),
            Value::Geometry(Geometry::Collection(vec![
                Geometry::Point([1.0, 2.0]),
                Geometry::MultiPoint(vec![[3.0, 4.0]]),
            ])),
        ] {
            assert_eq!(roundtrip(value.clone()), value);
        }
    }

    #[test]
    fn test_constructed_record_id_never_decodes() {
        let encoded = to_vec(&Value::RecordId(RecordId::new("user"))).unwrap();
        assert!(matches!(
            from_slice(&encoded, &DecodeLimits::default()),
            Err(CodecError::UnmarshalNotSupported)
        ));
    }

    #[test]
    fn test_string_record_id_decodes_via_parse() {
        // Tag 8 wrapping "user:tobie".
        let mut data = vec![0xc8, 0x6a];
        data.extend_from_slice(b"user:tobie");
        let decoded = from_slice(&data, &DecodeLimits::default()).unwrap();
        assert_eq!(
            decoded,
            Value::RecordId(RecordId::from_parts("user", "tobie"))
        );
    }

    #[test]
    fn test_table_decodes_as_table_value() {
        let encoded = to_vec(&Value::RecordId(RecordId::table("user"))).unwrap();
        let decoded = from_slice(&encoded, &DecodeLimits::default()).unwrap();
        assert_eq!(decoded, Value::Table("user".to_string()));
    }

    #[test]
    fn test_none_roundtrips_to_zero() {
        let encoded = to_vec(&Value::from(ZeroAsNone(String::new()))).unwrap();
        assert_eq!(encoded, vec![0xc6, 0xf6]);
        let decoded = from_slice(&encoded, &DecodeLimits::default()).unwrap();
        let unwrapped: ZeroAsNone<String> = ZeroAsNone::from_value(decoded).unwrap();
        assert_eq!(unwrapped.0, "");
    }

    #[test]
    fn test_datetime_decode_tolerance() {
        let limits = DecodeLimits::default();

        // One element: seconds only.
        let one = [0xcc, 0x81, 0x1a, 0x65, 0x53, 0xf1, 0x00];
        let decoded = from_slice(&one, &limits).unwrap();
        assert!(matches!(decoded, Value::DateTime(_)));

        // Two elements: seconds and nanoseconds.
        let two = [0xcc, 0x82, 0x1a, 0x65, 0x53, 0xf1, 0x00, 0x18, 0x2a];
        let decoded = from_slice(&two, &limits).unwrap();
        assert!(matches!(decoded, Value::DateTime(_)));

        // Three elements: error.
        let three = [0xcc, 0x83, 0x00, 0x00, 0x00];
        assert!(from_slice(&three, &limits).is_err());
    }

    #[test]
    fn test_duration_decode_tolerance() {
        let limits = DecodeLimits::default();

        // Empty array decodes to zero.
        let empty = [0xce, 0x80];
        assert_eq!(
            from_slice(&empty, &limits).unwrap(),
            Value::Duration(Duration::ZERO)
        );

        // Single element: seconds only.
        let secs = [0xce, 0x81, 0x0a];
        assert_eq!(
            from_slice(&secs, &limits).unwrap(),
            Value::Duration(Duration::from_secs(10))
        );

        // Three elements: error.
        let three = [0xce, 0x83, 0x00, 0x00, 0x00];
        assert!(from_slice(&three, &limits).is_err());

        // Negative seconds: error.
        let negative = [0xce, 0x81, 0x20];
        assert!(from_slice(&negative, &limits).is_err());
    }

    #[test]
    fn test_std_datetime_tag_accepted() {
        // Tag 0 with an RFC 3339 string.
        let mut encoded = vec![0xc0, 0x74];
        encoded.extend_from_slice(b"2023-11-14T22:13:20Z");
        let decoded = from_slice(&encoded, &DecodeLimits::default()).unwrap();
        assert_eq!(
            decoded,
            Value::DateTime(DateTime::from_timestamp(1_700_000_000, 0).unwrap())
        );
    }

    #[test]
    fn test_unknown_tag_preserved() {
        // Tag 999 wrapping 7.
        let encoded = [0xd9, 0x03, 0xe7, 0x07];
        let decoded = from_slice(&encoded, &DecodeLimits::default()).unwrap();
        assert_eq!(
            decoded,
            Value::Unknown {
                tag: 999,
                value: Box::new(Value::Integer(7)),
            }
        );
        // And refuses to encode back.
        assert!(matches!(to_vec(&decoded), Err(CodecError::UnknownTag(999))));
    }

    #[test]
    fn test_depth_limit() {
        let limits = DecodeLimits::default().with_max_nesting_depth(0);
        assert_eq!(limits.max_nesting_depth(), MIN_MAX_NESTING_DEPTH);

        // Six nested arrays against a limit of four.
        let data = [0x81, 0x81, 0x81, 0x81, 0x81, 0x81, 0x01];
        assert!(matches!(
            from_slice(&data, &limits),
            Err(CodecError::DepthLimitExceeded { .. })
        ));

        // Four levels pass.
        let data = [0x81, 0x81, 0x81, 0x81, 0x01];
        assert!(from_slice(&data, &limits).is_ok());
    }

    #[test]
    fn test_array_limit() {
        let limits = DecodeLimits::default().with_max_array_elements(0);
        assert_eq!(limits.max_array_elements(), MIN_MAX_ARRAY_ELEMENTS);

        let mut data = vec![0x91];
        data.extend_from_slice(&[0x01; 17]);
        assert!(matches!(
            from_slice(&data, &limits),
            Err(CodecError::ArrayTooLong { len: 17, .. })
        ));
    }

    #[test]
    fn test_map_limit() {
        let limits = DecodeLimits::default().with_max_map_pairs(0);

        let mut data = vec![0xb1];
        for i in 0..17u8 {
            data.extend_from_slice(&[0x61, b'a' + i, 0x01]);
        }
        assert!(matches!(
            from_slice(&data, &limits),
            Err(CodecError::MapTooLong { len: 17, .. })
        ));
    }

    #[test]
    fn test_duplicate_map_keys_last_wins() {
        // {"a": 1, "a": 2}
        let data = [0xa2, 0x61, b'a', 0x01, 0x61, b'a', 0x02];
        let decoded = from_slice(&data, &DecodeLimits::default()).unwrap();
        assert_eq!(decoded.get("a").and_then(Value::as_i64), Some(2));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let data = [0x62, 0xff, 0xfe];
        assert!(matches!(
            from_slice(&data, &DecodeLimits::default()),
            Err(CodecError::InvalidUtf8)
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let data = [0x01, 0x02];
        assert!(matches!(
            from_slice(&data, &DecodeLimits::default()),
            Err(CodecError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_truncated_input() {
        let data = [0x82, 0x01];
        assert!(matches!(
            from_slice(&data, &DecodeLimits::default()),
            Err(CodecError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_indefinite_length_rejected() {
        let data = [0x9f, 0x01, 0xff];
        assert!(matches!(
            from_slice(&data, &DecodeLimits::default()),
            Err(CodecError::IndefiniteLength)
        ));
    }

    #[test]
    fn test_half_float_decode() {
        // 1.0 as f16.
        let data = [0xf9, 0x3c, 0x00];
        assert_eq!(
            from_slice(&data, &DecodeLimits::default()).unwrap(),
            Value::Float(1.0)
        );

        // -2.0 as f16.
        let data = [0xf9, 0xc0, 0x00];
        assert_eq!(
            from_slice(&data, &DecodeLimits::default()).unwrap(),
            Value::Float(-2.0)
        );
    }

    #[test]
    fn test_response_envelope_decode() {
        // {"id": "abc", "result": [1, 2], "error": null}
        let mut data = vec![0xa3];
        data.extend_from_slice(&[0x62, b'i', b'd', 0x63, b'a', b'b', b'c']);
        data.extend_from_slice(&[0x66, b'r', b'e', b's', b'u', b'l', b't', 0x82, 0x01, 0x02]);
        data.extend_from_slice(&[0x65, b'e', b'r', b'r', b'o', b'r', 0xf6]);

        let frame = Bytes::from(data);
        let response = decode_response(&frame, &DecodeLimits::default()).unwrap();
        assert_eq!(response.id, "abc");
        assert!(response.error.is_none());

        let raw = response.result.unwrap();
        assert_eq!(raw.as_ref(), &[0x82, 0x01, 0x02]);
        let result = from_slice(&raw, &DecodeLimits::default()).unwrap();
        assert_eq!(
            result,
            Value::Array(vec![Value::Integer(1), Value::Integer(2)])
        );
    }

    #[test]
    fn test_response_envelope_with_error() {
        // {"id": "abc", "error": {"code": -32000, "message": "boom"}}
        let mut data = vec![0xa2];
        data.extend_from_slice(&[0x62, b'i', b'd', 0x63, b'a', b'b', b'c']);
        data.extend_from_slice(&[0x65, b'e', b'r', b'r', b'o', b'r', 0xa2]);
        data.extend_from_slice(&[0x64, b'c', b'o', b'd', b'e', 0x39, 0x7c, 0xff]);
        data.extend_from_slice(&[0x67, b'm', b'e', b's', b's', b'a', b'g', b'e']);
        data.extend_from_slice(&[0x64, b'b', b'o', b'o', b'm']);

        let frame = Bytes::from(data);
        let response = decode_response(&frame, &DecodeLimits::default()).unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, -32000);
        assert_eq!(error.message, "boom");
    }

    #[test]
    fn test_basic_responses_decode() {
        // [{"status": "OK", "result": 7, "time": "1ms"}]
        let mut data = vec![0x81, 0xa3];
        data.extend_from_slice(&[0x66, b's', b't', b'a', b't', b'u', b's', 0x62, b'O', b'K']);
        data.extend_from_slice(&[0x66, b'r', b'e', b's', b'u', b'l', b't', 0x07]);
        data.extend_from_slice(&[0x64, b't', b'i', b'm', b'e', 0x63, b'1', b'm', b's']);

        let frame = Bytes::from(data);
        let responses = decode_basic_responses(&frame, &DecodeLimits::default()).unwrap();
        assert_eq!(responses.len(), 1);
        assert!(responses[0].is_ok());
        assert_eq!(responses[0].time, "1ms");
        assert_eq!(responses[0].result.as_ref(), &[0x07]);
    }

    #[test]
    fn test_notification_id_extraction() {
        // {"action": "CREATE", "id": h'0707...'} with the id under tag 37.
        let mut data = vec![0xa2];
        data.extend_from_slice(&[0x66, b'a', b'c', b't', b'i', b'o', b'n']);
        data.extend_from_slice(&[0x66, b'C', b'R', b'E', b'A', b'T', b'E']);
        data.extend_from_slice(&[0x62, b'i', b'd', 0xd8, 0x25, 0x50]);
        data.extend_from_slice(&[7; 16]);

        let id = decode_notification_id(&data, &DecodeLimits::default()).unwrap();
        assert_eq!(id, vec![7; 16]);
    }

    #[test]
    fn test_subscription_id_forms() {
        let limits = DecodeLimits::default();

        // Uuid under tag 37.
        let mut data = vec![0xd8, 0x25, 0x50];
        data.extend_from_slice(&[9; 16]);
        assert_eq!(decode_subscription_id(&data, &limits).unwrap(), vec![9; 16]);

        // Plain byte string.
        let data = [0x43, 1, 2, 3];
        assert_eq!(decode_subscription_id(&data, &limits).unwrap(), vec![1, 2, 3]);

        // Text string.
        let data = [0x62, b'o', b'k'];
        assert_eq!(decode_subscription_id(&data, &limits).unwrap(), b"ok".to_vec());
    }
}

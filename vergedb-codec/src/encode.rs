//! Manual encoder for the wire value format.
//!
//! Items are written with minimal-length heads and definite lengths only.

use crate::error::CodecError;
use crate::types::{RecordId, Request};
use crate::value::{Geometry, Value};
use bytes::{BufMut, BytesMut};

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_TAG: u8 = 6;

const SIMPLE_FALSE: u8 = 0xf4;
const SIMPLE_TRUE: u8 = 0xf5;
const SIMPLE_NULL: u8 = 0xf6;
const HEAD_F64: u8 = 0xfb;

/// Encodes a value into a fresh vector.
pub fn to_vec(value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut buf = BytesMut::with_capacity(64);
    write_value(&mut buf, value)?;
    Ok(buf.to_vec())
}

/// Encodes a request envelope into `buf` as a `{ id, method, params }` map.
pub fn encode_request(buf: &mut BytesMut, request: &Request) -> Result<(), CodecError> {
    write_head(buf, MAJOR_MAP, 3);
    write_text(buf, "id");
    write_text(buf, &request.id);
    write_text(buf, "method");
    write_text(buf, &request.method);
    write_text(buf, "params");
    write_head(buf, MAJOR_ARRAY, request.params.len() as u64);
    for param in &request.params {
        write_value(buf, param)?;
    }
    Ok(())
}

/// Appends the encoding of `value` to `buf`.
pub fn write_value(buf: &mut BytesMut, value: &Value) -> Result<(), CodecError> {
    match value {
        Value::None => {
            write_head(buf, MAJOR_TAG, crate::TAG_NONE);
            buf.put_u8(SIMPLE_NULL);
        }
        Value::Null => buf.put_u8(SIMPLE_NULL),
        Value::Bool(true) => buf.put_u8(SIMPLE_TRUE),
        Value::Bool(false) => buf.put_u8(SIMPLE_FALSE),
        Value::Integer(i) => write_i64(buf, *i),
        Value::Float(f) => write_f64(buf, *f),
        Value::Bytes(b) => {
            write_head(buf, MAJOR_BYTES, b.len() as u64);
            buf.put_slice(b);
        }
        Value::String(s) => write_text(buf, s),
        Value::Array(items) => {
            write_head(buf, MAJOR_ARRAY, items.len() as u64);
            for item in items {
                write_value(buf, item)?;
            }
        }
        Value::Object(fields) => {
            write_head(buf, MAJOR_MAP, fields.len() as u64);
            for (key, field) in fields {
                write_text(buf, key);
                write_value(buf, field)?;
            }
        }
        Value::Table(name) => {
            if name.is_empty() {
                return Err(CodecError::TableNameRequired);
            }
            write_head(buf, MAJOR_TAG, crate::TAG_TABLE);
            write_text(buf, name);
        }
        Value::RecordId(id) => write_record_id(buf, id)?,
        Value::Decimal(d) => {
            write_head(buf, MAJOR_TAG, crate::TAG_DECIMAL);
            write_f64(buf, *d);
        }
        Value::DateTime(dt) => {
            write_head(buf, MAJOR_TAG, crate::TAG_DATETIME);
            write_head(buf, MAJOR_ARRAY, 2);
            write_i64(buf, dt.timestamp());
            write_i64(buf, dt.timestamp_subsec_nanos() as i64);
        }
        Value::Duration(d) => {
            write_head(buf, MAJOR_TAG, crate::TAG_DURATION);
            write_head(buf, MAJOR_ARRAY, 2);
            write_head(buf, MAJOR_UNSIGNED, d.as_secs());
            write_head(buf, MAJOR_UNSIGNED, d.subsec_nanos() as u64);
        }
        Value::Uuid(u) => {
            write_head(buf, MAJOR_TAG, crate::TAG_UUID);
            write_head(buf, MAJOR_BYTES, 16);
            buf.put_slice(u.as_bytes());
        }
        Value::Geometry(g) => write_geometry(buf, g)?,
        Value::Unknown { tag, .. } => return Err(CodecError::UnknownTag(*tag)),
    }
    Ok(())
}

fn write_record_id(buf: &mut BytesMut, id: &RecordId) -> Result<(), CodecError> {
    if id.table_name().is_empty() {
        return Err(CodecError::TableNameRequired);
    }

    match id {
        RecordId::New { table, constructor } => {
            write_head(buf, MAJOR_TAG, crate::TAG_RECORD_ID);
            write_text(buf, &format!("{table}:{}", constructor.as_str()));
        }
        RecordId::Concrete { table, key: None } => {
            write_head(buf, MAJOR_TAG, crate::TAG_TABLE);
            write_text(buf, table);
        }
        RecordId::Concrete {
            table,
            key: Some(key),
        } => {
            write_head(buf, MAJOR_TAG, crate::TAG_RECORD_ID);
            write_head(buf, MAJOR_ARRAY, 2);
            write_text(buf, table);
            write_value(buf, &key.to_value())?;
        }
    }
    Ok(())
}

fn write_geometry(buf: &mut BytesMut, geometry: &Geometry) -> Result<(), CodecError> {
    write_head(buf, MAJOR_TAG, geometry.tag());
    match geometry {
        Geometry::Point(point) => write_point(buf, point),
        Geometry::Line(points) | Geometry::MultiPoint(points) => write_points(buf, points),
        Geometry::Polygon(lines) | Geometry::MultiLine(lines) => write_lines(buf, lines),
        Geometry::MultiPolygon(polygons) => {
            write_head(buf, MAJOR_ARRAY, polygons.len() as u64);
            for polygon in polygons {
                write_lines(buf, polygon);
            }
        }
        Geometry::Collection(geometries) => {
            write_head(buf, MAJOR_ARRAY, geometries.len() as u64);
            for geometry in geometries {
                write_geometry(buf, geometry)?;
            }
        }
    }
    Ok(())
}

fn write_point(buf: &mut BytesMut, point: &[f64; 2]) {
    write_head(buf, MAJOR_ARRAY, 2);
    write_f64(buf, point[0]);
    write_f64(buf, point[1]);
}

fn write_points(buf: &mut BytesMut, points: &[[f64; 2]]) {
    write_head(buf, MAJOR_ARRAY, points.len() as u64);
    for point in points {
        write_point(buf, point);
    }
}

fn write_lines(buf: &mut BytesMut, lines: &[Vec<[f64; 2]>]) {
    write_head(buf, MAJOR_ARRAY, lines.len() as u64);
    for line in lines {
        write_points(buf, line);
    }
}

fn write_text(buf: &mut BytesMut, text: &str) {
    write_head(buf, MAJOR_TEXT, text.len() as u64);
    buf.put_slice(text.as_bytes());
}

fn write_i64(buf: &mut BytesMut, value: i64) {
    if value >= 0 {
        write_head(buf, MAJOR_UNSIGNED, value as u64);
    } else {
        write_head(buf, MAJOR_NEGATIVE, (-(value + 1)) as u64);
    }
}

fn write_f64(buf: &mut BytesMut, value: f64) {
    buf.put_u8(HEAD_F64);
    buf.put_f64(value);
}

fn write_head(buf: &mut BytesMut, major: u8, value: u64) {
    let m = major << 5;
    if value < 24 {
        buf.put_u8(m | value as u8);
    } else if value <= u8::MAX as u64 {
        buf.put_u8(m | 24);
        buf.put_u8(value as u8);
    } else if value <= u16::MAX as u64 {
        buf.put_u8(m | 25);
        buf.put_u16(value as u16);
    } else if value <= u32::MAX as u64 {
        buf.put_u8(m | 26);
        buf.put_u32(value as u32);
    } else {
        buf.put_u8(m | 27);
        buf.put_u64(value);
    }
}

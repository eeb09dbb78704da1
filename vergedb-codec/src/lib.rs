//! # vergedb-codec
//!
//! Wire codec for the VergeDB RPC protocol.
//!
//! This crate provides:
//! - A self-describing tagged value model ([`Value`])
//! - Manual CBOR encoding and limit-enforcing decoding
//! - Domain types (record ids, patches, geometries, zero-as-none)
//! - Request/response envelope types with raw result capture

pub mod decode;
pub mod encode;
pub mod error;
pub mod types;
pub mod value;

pub use decode::{
    decode_basic_responses, decode_notification_id, decode_response, decode_subscription_id,
    from_slice, DecodeLimits,
};
pub use encode::{encode_request, to_vec, write_value};
pub use error::CodecError;
pub use types::{
    BasicResponse, IdConstructor, Patch, PatchOp, RecordId, RecordKey, Request, Response,
    ResponseError, ZeroAsNone,
};
pub use value::{Geometry, Object, Value};

// Standard tags (IANA CBOR tag registry).

/// RFC 3339 text datetime. Accepted on decode, never produced.
pub const TAG_STD_DATETIME: u64 = 0;
/// Binary UUID (adopted from the registry).
pub const TAG_UUID: u64 = 37;

// Custom tags.

pub const TAG_NONE: u64 = 6;
pub const TAG_TABLE: u64 = 7;
pub const TAG_RECORD_ID: u64 = 8;
pub const TAG_DECIMAL: u64 = 10;
pub const TAG_DATETIME: u64 = 12;
pub const TAG_DURATION: u64 = 14;

// Custom geometry tags.

pub const TAG_GEOMETRY_POINT: u64 = 88;
pub const TAG_GEOMETRY_LINE: u64 = 89;
pub const TAG_GEOMETRY_POLYGON: u64 = 90;
pub const TAG_GEOMETRY_MULTI_POINT: u64 = 91;
pub const TAG_GEOMETRY_MULTI_LINE: u64 = 92;
pub const TAG_GEOMETRY_MULTI_POLYGON: u64 = 93;
pub const TAG_GEOMETRY_COLLECTION: u64 = 94;

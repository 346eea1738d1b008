//! Batch decoding for frame payloads.
//!
//! A [`BatchDecoder`] turns a complete payload into a generic [`Value`]
//! tree. [`decode_batch`] then checks that the top level is a list of
//! items. The default decoder, [`PickleDecoder`], understands the Python
//! pickle encoding sent by Graphite clients.

use std::io;

use num_bigint::BigInt;
use serde_pickle::{DeOptions, Deserializer, ErrorCode, HashableValue, Value as PickleValue};
use thiserror::Error;

/// Generic value produced by a [`BatchDecoder`].
///
/// The set of variants is closed; callers coerce scalars with exhaustive
/// `match` arms.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Python `None`.
    None,
    /// Boolean.
    Bool(bool),
    /// Unicode text.
    Text(String),
    /// Raw byte string.
    Bytes(Vec<u8>),
    /// Signed fixed-width integer.
    Signed(i64),
    /// Unsigned fixed-width integer.
    Unsigned(u64),
    /// Arbitrary-precision integer.
    BigInt(BigInt),
    /// Floating-point number.
    Float(f64),
    /// Mutable ordered sequence.
    List(Vec<Value>),
    /// Fixed-size ordered sequence.
    Tuple(Vec<Value>),
    /// Unordered collection of unique values.
    Set(Vec<Value>),
    /// Key/value mapping.
    Dict(Vec<(Value, Value)>),
}

impl Value {
    /// Name of the variant, used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Signed(_) => "signed integer",
            Self::Unsigned(_) => "unsigned integer",
            Self::BigInt(_) => "big integer",
            Self::Float(_) => "float",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Set(_) => "set",
            Self::Dict(_) => "dict",
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self { Self::Text(value.to_owned()) }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self { Self::Signed(value) }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self { Self::Unsigned(value) }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self { Self::Float(value) }
}

/// Errors raised while decoding a frame payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The decoder ran out of input without hitting a structural error.
    ///
    /// The connection treats this like end of stream.
    #[error("ran out of input while decoding payload")]
    EndOfInput,

    /// The payload is not a valid encoding.
    #[error("error reading pickled data: {0}")]
    Malformed(String),

    /// The payload decoded, but its top level is not a list.
    #[error("unrecognized type {found} for pickled data")]
    Shape {
        /// Type name of the top-level value.
        found: &'static str,
    },
}

/// Decodes an opaque payload into a [`Value`] tree.
pub trait BatchDecoder: Send + Sync {
    /// Decode `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::EndOfInput`] if the payload is truncated and
    /// [`DecodeError::Malformed`] for any other decoding failure.
    fn decode(&self, payload: &[u8]) -> Result<Value, DecodeError>;
}

/// Decode `payload` and return its items.
///
/// Only a list is accepted at the top level; tuples, dicts and scalars are
/// shape errors.
///
/// # Errors
///
/// Propagates decoder errors and returns [`DecodeError::Shape`] when the
/// top-level value is not a list.
pub fn decode_batch<D>(decoder: &D, payload: &[u8]) -> Result<Vec<Value>, DecodeError>
where
    D: BatchDecoder + ?Sized,
{
    match decoder.decode(payload)? {
        Value::List(items) => Ok(items),
        other => Err(DecodeError::Shape {
            found: other.type_name(),
        }),
    }
}

/// [`BatchDecoder`] for the Python pickle format.
///
/// Python 2 byte strings are decoded as text, matching what Graphite
/// clients mean when they send them. Decoding stops at the first `STOP`
/// opcode; anything after it in the payload is ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct PickleDecoder;

impl BatchDecoder for PickleDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Value, DecodeError> {
        let mut de = Deserializer::new(payload, DeOptions::new().decode_strings());
        match de.deserialize_value() {
            Ok(value) => Ok(Value::from(value)),
            Err(serde_pickle::Error::Eval(ErrorCode::EOFWhileParsing, _)) => {
                Err(DecodeError::EndOfInput)
            }
            Err(serde_pickle::Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(DecodeError::EndOfInput)
            }
            Err(e) => Err(DecodeError::Malformed(e.to_string())),
        }
    }
}

impl From<PickleValue> for Value {
    fn from(value: PickleValue) -> Self {
        match value {
            PickleValue::None => Self::None,
            PickleValue::Bool(b) => Self::Bool(b),
            PickleValue::I64(i) => Self::Signed(i),
            PickleValue::Int(big) => Self::BigInt(big),
            PickleValue::F64(f) => Self::Float(f),
            PickleValue::Bytes(b) => Self::Bytes(b),
            PickleValue::String(s) => Self::Text(s),
            PickleValue::List(items) => Self::List(items.into_iter().map(Self::from).collect()),
            PickleValue::Tuple(items) => Self::Tuple(items.into_iter().map(Self::from).collect()),
            PickleValue::Set(items) | PickleValue::FrozenSet(items) => Self::Set(
                items
                    .into_iter()
                    .map(|item| Self::from(HashableValue::into_value(item)))
                    .collect(),
            ),
            PickleValue::Dict(entries) => Self::Dict(
                entries
                    .into_iter()
                    .map(|(k, v)| (Self::from(HashableValue::into_value(k)), Self::from(v)))
                    .collect(),
            ),
        }
    }
}

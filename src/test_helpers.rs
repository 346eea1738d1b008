#![cfg(any(test, feature = "test-helpers"))]
//! Test-only helpers for building pickle payloads and frames, and
//! collaborators that record what the pipeline hands them.
//!
//! The encoder writes protocol 2 opcodes in the same shape CPython's
//! `pickle.dumps(..., protocol=2)` produces for Graphite batches, minus the
//! memo bookkeeping.

use std::sync::{Arc, Mutex, PoisonError};

use num_bigint::BigInt;

use crate::{decode::Value, dispatch::Dispatcher, quarantine::QuarantineSink};

/// A call made to [`RecordingDispatcher`].
#[derive(Clone, Debug, PartialEq)]
pub struct Dispatched {
    /// Line as UTF-8 text.
    pub line: String,
    /// Value passed to the dispatcher.
    pub value: f64,
    /// Timestamp passed to the dispatcher.
    pub timestamp: u32,
}

/// [`Dispatcher`] that records every call.
#[derive(Clone, Debug, Default)]
pub struct RecordingDispatcher {
    calls: Arc<Mutex<Vec<Dispatched>>>,
}

impl RecordingDispatcher {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Dispatched> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded lines only.
    #[must_use]
    pub fn lines(&self) -> Vec<String> { self.calls().into_iter().map(|c| c.line).collect() }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&self, line: &[u8], value: f64, timestamp: u32) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Dispatched {
                line: String::from_utf8_lossy(line).into_owned(),
                value,
                timestamp,
            });
    }
}

/// A call made to [`RecordingQuarantine`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Quarantined {
    /// Key passed to the sink.
    pub key: String,
    /// Line as UTF-8 text.
    pub line: String,
    /// Rendered error.
    pub error: String,
}

/// [`QuarantineSink`] that records every call.
#[derive(Clone, Debug, Default)]
pub struct RecordingQuarantine {
    calls: Arc<Mutex<Vec<Quarantined>>>,
}

impl RecordingQuarantine {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Quarantined> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl QuarantineSink for RecordingQuarantine {
    fn record(&self, key: &str, line: &[u8], error: &(dyn std::error::Error + Send + Sync)) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Quarantined {
                key: key.to_owned(),
                line: String::from_utf8_lossy(line).into_owned(),
                error: error.to_string(),
            });
    }
}

const PROTO: u8 = 0x80;
const STOP: u8 = b'.';
const MARK: u8 = b'(';
const EMPTY_LIST: u8 = b']';
const APPENDS: u8 = b'e';
const EMPTY_TUPLE: u8 = b')';
const TUPLE: u8 = b't';
const TUPLE1: u8 = 0x85;
const TUPLE2: u8 = 0x86;
const TUPLE3: u8 = 0x87;
const NONE: u8 = b'N';
const NEWTRUE: u8 = 0x88;
const NEWFALSE: u8 = 0x89;
const BININT: u8 = b'J';
const LONG1: u8 = 0x8a;
const BINFLOAT: u8 = b'G';
const BINUNICODE: u8 = b'X';
const SHORT_BINSTRING: u8 = b'U';
const EMPTY_DICT: u8 = b'}';
const SETITEMS: u8 = b'u';

/// Encode `value` as a protocol 2 pickle.
///
/// # Panics
///
/// Panics for values the helper does not encode (sets, and byte strings
/// longer than 255 bytes).
#[must_use]
pub fn encode_pickle(value: &Value) -> Vec<u8> {
    let mut out = vec![PROTO, 2];
    write_value(&mut out, value);
    out.push(STOP);
    out
}

/// Prefix `payload` with its big-endian length.
///
/// # Panics
///
/// Panics if `payload` is longer than `u32::MAX` bytes.
#[must_use]
pub fn frame_bytes(payload: &[u8]) -> Vec<u8> {
    let len = u32::try_from(payload.len()).expect("payload fits in a u32 length");
    let mut out = len.to_be_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

/// Encode `batch` and wrap it in a frame.
#[must_use]
pub fn pickle_frame(batch: &Value) -> Vec<u8> { frame_bytes(&encode_pickle(batch)) }

/// Build the `(path, (timestamp, value))` tuple Graphite clients send.
#[must_use]
pub fn metric_item(path: &str, timestamp: Value, value: Value) -> Value {
    Value::Tuple(vec![
        Value::from(path),
        Value::Tuple(vec![timestamp, value]),
    ])
}

fn write_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::None => out.push(NONE),
        Value::Bool(true) => out.push(NEWTRUE),
        Value::Bool(false) => out.push(NEWFALSE),
        Value::Text(s) => {
            out.push(BINUNICODE);
            let len = u32::try_from(s.len()).expect("text fits in a u32 length");
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            out.push(SHORT_BINSTRING);
            out.push(u8::try_from(b.len()).expect("short byte string"));
            out.extend_from_slice(b);
        }
        Value::Signed(i) => write_int(out, &BigInt::from(*i)),
        Value::Unsigned(u) => write_int(out, &BigInt::from(*u)),
        Value::BigInt(big) => write_int(out, big),
        Value::Float(f) => {
            out.push(BINFLOAT);
            // BINFLOAT is the one big-endian opcode in the format.
            out.extend_from_slice(&f.to_be_bytes());
        }
        Value::List(items) => {
            out.push(EMPTY_LIST);
            if !items.is_empty() {
                out.push(MARK);
                for item in items {
                    write_value(out, item);
                }
                out.push(APPENDS);
            }
        }
        Value::Tuple(items) => write_tuple(out, items),
        Value::Dict(entries) => {
            out.push(EMPTY_DICT);
            if !entries.is_empty() {
                out.push(MARK);
                for (k, v) in entries {
                    write_value(out, k);
                    write_value(out, v);
                }
                out.push(SETITEMS);
            }
        }
        Value::Set(_) => panic!("set encoding is not supported by the test encoder"),
    }
}

fn write_tuple(out: &mut Vec<u8>, items: &[Value]) {
    let opcode = match items.len() {
        0 => {
            out.push(EMPTY_TUPLE);
            return;
        }
        1 => TUPLE1,
        2 => TUPLE2,
        3 => TUPLE3,
        _ => {
            out.push(MARK);
            for item in items {
                write_value(out, item);
            }
            out.push(TUPLE);
            return;
        }
    };
    for item in items {
        write_value(out, item);
    }
    out.push(opcode);
}

fn write_int(out: &mut Vec<u8>, value: &BigInt) {
    if let Ok(small) = i32::try_from(value) {
        out.push(BININT);
        out.extend_from_slice(&small.to_le_bytes());
        return;
    }
    let bytes = value.to_signed_bytes_le();
    out.push(LONG1);
    out.push(u8::try_from(bytes.len()).expect("LONG1 holds at most 255 bytes"));
    out.extend_from_slice(&bytes);
}

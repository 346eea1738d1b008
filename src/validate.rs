//! Metric packet validation.
//!
//! A [`Validator`] parses a `"<key> <value> <timestamp>"` line and applies
//! naming policy. [`PacketValidator`] implements the carbon rules: legacy
//! keys are checked against a [`LegacyLevel`], metrics 2.0 keys (those
//! carrying `tag=value` nodes) additionally against an [`M20Level`].

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Strictness applied to plain dotted keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LegacyLevel {
    /// Printable ASCII only, no empty nodes.
    Strict,
    /// No NUL or control bytes.
    #[default]
    Medium,
    /// No key checks.
    None,
}

/// Strictness applied to metrics 2.0 keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum M20Level {
    /// Every node is `tag=value` and `unit` and `mtype` are present.
    Strict,
    /// Tag nodes are well formed and `unit`/`mtype` are not repeated.
    #[default]
    Medium,
    /// No metrics 2.0 checks.
    None,
}

/// A line that passed validation.
#[derive(Clone, Debug, PartialEq)]
pub struct Validated {
    /// Canonical metric key.
    pub key: String,
    /// Parsed value.
    pub value: f64,
    /// Parsed unix timestamp.
    pub timestamp: u32,
}

/// Why a line was rejected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// The line does not split into exactly three fields.
    #[error("packet must consist of 3 fields, got {0}")]
    FieldCount(usize),
    /// The line is not valid UTF-8.
    #[error("packet is not valid UTF-8")]
    Encoding,
    /// The key is empty or contains an empty node.
    #[error("metric key contains an empty node")]
    EmptyNode,
    /// The key contains a byte the active level forbids.
    #[error("metric key contains invalid byte {0:#04x}")]
    InvalidByte(u8),
    /// A metrics 2.0 node is malformed.
    #[error("invalid metrics 2.0 node: {0}")]
    InvalidTag(String),
    /// A required metrics 2.0 tag is missing.
    #[error("metrics 2.0 key is missing the {0} tag")]
    MissingTag(&'static str),
    /// A metrics 2.0 tag that must be unique appears more than once.
    #[error("metrics 2.0 key repeats the {0} tag")]
    DuplicateTag(&'static str),
    /// The value is not a number.
    #[error("value is not a valid number: {0}")]
    Value(String),
    /// The timestamp is not an unsigned 32-bit integer.
    #[error("timestamp is not a valid unix time: {0}")]
    Timestamp(String),
}

/// Validation failure, carrying whatever key could be extracted.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind}")]
pub struct ValidationError {
    /// Key extracted before the failure, possibly empty.
    pub key: String,
    /// What went wrong.
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    fn new(key: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            key: key.into(),
            kind,
        }
    }
}

/// Parses and polices metric lines.
pub trait Validator: Send + Sync {
    /// Validate `line`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the line is malformed or violates
    /// policy.
    fn validate(
        &self,
        line: &[u8],
        legacy: LegacyLevel,
        m20: M20Level,
    ) -> Result<Validated, ValidationError>;
}

/// The default carbon packet validator.
#[derive(Clone, Copy, Debug, Default)]
pub struct PacketValidator;

impl Validator for PacketValidator {
    fn validate(
        &self,
        line: &[u8],
        legacy: LegacyLevel,
        m20: M20Level,
    ) -> Result<Validated, ValidationError> {
        let fields: Vec<&[u8]> = line
            .split(u8::is_ascii_whitespace)
            .filter(|f| !f.is_empty())
            .collect();
        let [key, value, timestamp] = fields[..] else {
            return Err(ValidationError::new("", ValidationErrorKind::FieldCount(fields.len())));
        };
        let key = std::str::from_utf8(key)
            .map_err(|_| ValidationError::new("", ValidationErrorKind::Encoding))?;

        check_legacy(key, legacy).map_err(|kind| ValidationError::new(key, kind))?;
        if key.contains('=') {
            check_m20(key, m20).map_err(|kind| ValidationError::new(key, kind))?;
        }

        let value = parse_field::<f64>(value)
            .ok_or_else(|| ValidationError::new(key, ValidationErrorKind::Value(lossy(value))))?;
        let timestamp = parse_field::<u32>(timestamp).ok_or_else(|| {
            ValidationError::new(key, ValidationErrorKind::Timestamp(lossy(timestamp)))
        })?;

        Ok(Validated {
            key: key.to_owned(),
            value,
            timestamp,
        })
    }
}

fn parse_field<T: FromStr>(field: &[u8]) -> Option<T> {
    std::str::from_utf8(field).ok()?.parse().ok()
}

fn lossy(field: &[u8]) -> String { String::from_utf8_lossy(field).into_owned() }

fn check_legacy(key: &str, level: LegacyLevel) -> Result<(), ValidationErrorKind> {
    match level {
        LegacyLevel::None => Ok(()),
        LegacyLevel::Medium => match key.bytes().find(u8::is_ascii_control) {
            Some(b) => Err(ValidationErrorKind::InvalidByte(b)),
            None => Ok(()),
        },
        LegacyLevel::Strict => {
            if let Some(b) = key.bytes().find(|b| !b.is_ascii_graphic()) {
                return Err(ValidationErrorKind::InvalidByte(b));
            }
            if key.split('.').any(str::is_empty) {
                return Err(ValidationErrorKind::EmptyNode);
            }
            Ok(())
        }
    }
}

fn check_m20(key: &str, level: M20Level) -> Result<(), ValidationErrorKind> {
    if level == M20Level::None {
        return Ok(());
    }
    let mut unit = 0;
    let mut mtype = 0;
    for node in key.split('.') {
        let Some((tag, value)) = node.split_once('=') else {
            if level == M20Level::Strict {
                return Err(ValidationErrorKind::InvalidTag(node.to_owned()));
            }
            continue;
        };
        if tag.is_empty() || value.is_empty() {
            return Err(ValidationErrorKind::InvalidTag(node.to_owned()));
        }
        match tag {
            "unit" => unit += 1,
            "mtype" => mtype += 1,
            _ => {}
        }
    }
    for (name, count) in [("unit", unit), ("mtype", mtype)] {
        if count > 1 {
            return Err(ValidationErrorKind::DuplicateTag(name));
        }
        if count == 0 && level == M20Level::Strict {
            return Err(ValidationErrorKind::MissingTag(name));
        }
    }
    Ok(())
}

impl fmt::Display for LegacyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "strict",
            Self::Medium => "medium",
            Self::None => "none",
        })
    }
}

impl fmt::Display for M20Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "strict",
            Self::Medium => "medium",
            Self::None => "none",
        })
    }
}

//! Item normalisation.
//!
//! Turns one decoded `(path, (timestamp, value))` item into an
//! [`Observation`] whose value and timestamp are canonical decimal text.
//! Downstream consumers compare these strings byte for byte, so the
//! formatting rules here are part of the wire contract:
//!
//! | scalar           | value          | timestamp   |
//! |------------------|----------------|-------------|
//! | text             | unchanged      | unchanged   |
//! | signed/unsigned  | base 10        | base 10     |
//! | big integer      | rejected       | base 10     |
//! | float            | six decimals   | no decimals |
//!
//! Non-finite floats render as `+Inf`, `-Inf` and `NaN`.

use thiserror::Error;

use crate::decode::Value;

/// Reasons an item is rejected before validation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ItemError {
    /// The item, or its data, is not a two-element tuple.
    #[error("{part} must be a pair, got {found}")]
    Shape {
        /// Which part of the item failed (`item` or `item data`).
        part: &'static str,
        /// Description of what was found instead.
        found: String,
    },

    /// The metric path is not text.
    #[error("item metric must be a string, got {0}")]
    PathType(&'static str),

    /// The value scalar has an unsupported type.
    #[error("unrecognized type {0} for value")]
    ValueType(&'static str),

    /// The timestamp scalar has an unsupported type.
    #[error("unrecognized type {0} for timestamp")]
    TimestampType(&'static str),
}

/// A normalised metric observation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Observation {
    /// Metric path, exactly as sent.
    pub path: String,
    /// Canonical value text.
    pub value: String,
    /// Canonical timestamp text.
    pub timestamp: String,
}

impl Observation {
    /// Join the observation into the `"<path> <value> <timestamp>"` line
    /// handed to the validator.
    ///
    /// No escaping is applied; embedded spaces are left for the validator
    /// to reject.
    ///
    /// # Examples
    ///
    /// ```
    /// use pickle_ingest::normalize::Observation;
    ///
    /// let obs = Observation {
    ///     path: "host.cpu.load".into(),
    ///     value: "0.420000".into(),
    ///     timestamp: "1500000000".into(),
    /// };
    /// assert_eq!(obs.line(), b"host.cpu.load 0.420000 1500000000");
    /// ```
    #[must_use]
    pub fn line(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(self.path.len() + self.value.len() + self.timestamp.len() + 2);
        buf.extend_from_slice(self.path.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.value.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.timestamp.as_bytes());
        buf
    }
}

/// Normalise a decoded item.
///
/// The value is coerced before the timestamp, so an item with two bad
/// scalars reports [`ItemError::ValueType`].
///
/// # Errors
///
/// Returns an [`ItemError`] describing the first problem found.
pub fn normalize(item: &Value) -> Result<Observation, ItemError> {
    let [path, data] = pair(item, "item")?;
    let Value::Text(path) = path else {
        return Err(ItemError::PathType(path.type_name()));
    };
    let [timestamp, value] = pair(data, "item data")?;

    let value = format_value(value)?;
    let timestamp = format_timestamp(timestamp)?;
    Ok(Observation {
        path: path.clone(),
        value,
        timestamp,
    })
}

fn pair<'a>(value: &'a Value, part: &'static str) -> Result<&'a [Value; 2], ItemError> {
    let Value::Tuple(items) = value else {
        return Err(ItemError::Shape {
            part,
            found: value.type_name().to_owned(),
        });
    };
    items.as_slice().try_into().map_err(|_| ItemError::Shape {
        part,
        found: format!("tuple of length {}", items.len()),
    })
}

/// Canonical text for a value scalar.
///
/// # Errors
///
/// Returns [`ItemError::ValueType`] for big integers and non-scalars.
///
/// # Examples
///
/// ```
/// use pickle_ingest::{decode::Value, normalize::format_value};
///
/// assert_eq!(format_value(&Value::Signed(42)).unwrap(), "42");
/// assert_eq!(format_value(&Value::Float(3.5)).unwrap(), "3.500000");
/// ```
pub fn format_value(value: &Value) -> Result<String, ItemError> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        Value::Signed(i) => Ok(i.to_string()),
        Value::Unsigned(u) => Ok(u.to_string()),
        Value::Float(f) => Ok(fixed_point(*f, 6)),
        other => Err(ItemError::ValueType(other.type_name())),
    }
}

/// Canonical text for a timestamp scalar.
///
/// Floats are rounded to the nearest integer, ties to even.
///
/// # Errors
///
/// Returns [`ItemError::TimestampType`] for non-scalars.
///
/// # Examples
///
/// ```
/// use pickle_ingest::{decode::Value, normalize::format_timestamp};
///
/// assert_eq!(
///     format_timestamp(&Value::Float(1_500_000_000.0)).unwrap(),
///     "1500000000"
/// );
/// ```
pub fn format_timestamp(timestamp: &Value) -> Result<String, ItemError> {
    match timestamp {
        Value::Text(s) => Ok(s.clone()),
        Value::Signed(i) => Ok(i.to_string()),
        Value::Unsigned(u) => Ok(u.to_string()),
        Value::BigInt(big) => Ok(big.to_string()),
        Value::Float(f) => Ok(fixed_point(*f, 0)),
        other => Err(ItemError::TimestampType(other.type_name())),
    }
}

/// Fixed-point rendering with `+Inf`, `-Inf` and `NaN` spelled the way
/// carbon consumers parse them.
fn fixed_point(f: f64, decimals: usize) -> String {
    if f.is_nan() {
        "NaN".to_owned()
    } else if f.is_infinite() {
        if f.is_sign_positive() { "+Inf" } else { "-Inf" }.to_owned()
    } else {
        format!("{f:.decimals$}")
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;
    use crate::test_helpers::metric_item;

    #[rstest]
    #[case::signed(Value::Signed(42), "42")]
    #[case::negative(Value::Signed(-7), "-7")]
    #[case::unsigned(Value::Unsigned(u64::MAX), "18446744073709551615")]
    #[case::float(Value::Float(3.5), "3.500000")]
    #[case::small_float(Value::Float(0.42), "0.420000")]
    #[case::text(Value::from("12.5e3"), "12.5e3")]
    #[case::positive_infinity(Value::Float(f64::INFINITY), "+Inf")]
    #[case::negative_infinity(Value::Float(f64::NEG_INFINITY), "-Inf")]
    #[case::nan(Value::Float(f64::NAN), "NaN")]
    fn values_are_canonical(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(format_value(&value).expect("format value"), expected);
    }

    #[rstest]
    #[case::signed(Value::Signed(1_500_000_000), "1500000000")]
    #[case::unsigned(Value::Unsigned(7), "7")]
    #[case::float(Value::Float(1_500_000_000.0), "1500000000")]
    #[case::rounds_down(Value::Float(99.4), "99")]
    #[case::rounds_up(Value::Float(99.6), "100")]
    #[case::tie_to_even(Value::Float(2.5), "2")]
    #[case::text(Value::from("now"), "now")]
    #[case::infinity(Value::Float(f64::INFINITY), "+Inf")]
    fn timestamps_are_canonical(#[case] timestamp: Value, #[case] expected: &str) {
        assert_eq!(
            format_timestamp(&timestamp).expect("format timestamp"),
            expected
        );
    }

    #[test]
    fn big_integer_timestamps_format_in_full() {
        let big = BigInt::from(u64::MAX) * 10_u32;
        assert_eq!(
            format_timestamp(&Value::BigInt(big)).expect("format timestamp"),
            "184467440737095516150"
        );
    }

    #[test]
    fn big_integer_values_are_rejected() {
        let err = format_value(&Value::BigInt(BigInt::from(1))).expect_err("big value");
        assert_eq!(err, ItemError::ValueType("big integer"));
    }

    #[test]
    fn normalizes_a_graphite_item() {
        let item = metric_item(
            "host.cpu.load",
            Value::Signed(1_500_000_000),
            Value::Float(0.42),
        );
        let obs = normalize(&item).expect("normalize");
        assert_eq!(obs.line(), b"host.cpu.load 0.420000 1500000000".to_vec());
    }

    #[rstest]
    #[case::list_item(
        Value::List(vec![
            Value::from("a.b"),
            Value::Tuple(vec![Value::Signed(1), Value::Signed(2)]),
        ]),
        "item",
        "list"
    )]
    #[case::list_data(
        Value::Tuple(vec![
            Value::from("a.b"),
            Value::List(vec![Value::Signed(1), Value::Signed(2)]),
        ]),
        "item data",
        "list"
    )]
    fn lists_are_not_pairs(
        #[case] item: Value,
        #[case] part: &'static str,
        #[case] found: &str,
    ) {
        assert_eq!(
            normalize(&item).expect_err("list rejected"),
            ItemError::Shape {
                part,
                found: found.to_owned(),
            }
        );
    }

    #[test]
    fn embedded_spaces_pass_through() {
        let item = metric_item("a b", Value::Signed(1), Value::from("x y"));
        assert_eq!(normalize(&item).expect("normalize").line(), b"a b x y 1");
    }

    #[rstest]
    #[case::not_a_tuple(Value::from("a.b"), "item")]
    #[case::triple(
        Value::Tuple(vec![Value::from("a"), Value::None, Value::None]),
        "item"
    )]
    #[case::data_not_a_tuple(
        Value::Tuple(vec![Value::from("a"), Value::Signed(1)]),
        "item data"
    )]
    #[case::data_single(
        Value::Tuple(vec![Value::from("a"), Value::Tuple(vec![Value::Signed(1)])]),
        "item data"
    )]
    fn malformed_shapes_are_rejected(#[case] item: Value, #[case] expected_part: &str) {
        let err = normalize(&item).expect_err("shape error");
        assert!(
            matches!(&err, ItemError::Shape { part, .. } if *part == expected_part),
            "got {err:?}"
        );
    }

    #[test]
    fn non_text_path_is_rejected() {
        let item = Value::Tuple(vec![
            Value::Signed(1),
            Value::Tuple(vec![Value::Signed(1), Value::Signed(2)]),
        ]);
        assert_eq!(
            normalize(&item).expect_err("path error"),
            ItemError::PathType("signed integer")
        );
    }

    #[test]
    fn value_is_checked_before_timestamp() {
        let item = metric_item("a", Value::None, Value::Bool(true));
        assert_eq!(
            normalize(&item).expect_err("value error"),
            ItemError::ValueType("bool")
        );
    }

    #[test]
    fn bad_timestamp_is_rejected() {
        let item = metric_item("a", Value::List(vec![]), Value::Signed(1));
        assert_eq!(
            normalize(&item).expect_err("timestamp error"),
            ItemError::TimestampType("list")
        );
    }

    proptest! {
        #[test]
        fn integers_format_like_display(n in any::<i64>()) {
            prop_assert_eq!(format_value(&Value::Signed(n)).unwrap(), n.to_string());
            prop_assert_eq!(format_timestamp(&Value::Signed(n)).unwrap(), n.to_string());
        }

        #[test]
        fn float_values_have_six_decimals(f in -1.0e12_f64..1.0e12) {
            let text = format_value(&Value::Float(f)).unwrap();
            let (_, decimals) = text.split_once('.').expect("decimal point");
            prop_assert_eq!(decimals.len(), 6);
        }

        #[test]
        fn whole_float_timestamps_match_integers(n in 0_u32..u32::MAX) {
            prop_assert_eq!(
                format_timestamp(&Value::Float(f64::from(n))).unwrap(),
                n.to_string()
            );
        }
    }
}

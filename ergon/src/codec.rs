//! Conversion between typed records ([`crate::job::Job`], [`crate::schedule::Schedule`]) and the
//! flat JSON objects spoken by the Ergon service.
//!
//! Every record carries a static schema, [`Record::SCHEMA`], mapping each field name to its
//! [`FieldKind`]. The schema is derived at compile time from the field types by the
//! `wire_record!` macro, so adding a new temporal field to a record is all it takes for it to be
//! encoded as an RFC 3339 string and parsed back on decode.
//!
//! # Example
//!
//! ```
//! # use ergon::prelude::*;
//! # use ergon::codec;
//! # use chrono::{TimeZone, Utc};
//! let run_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
//! let job = Job::builder("emails", "email.send").run_at(run_at).build();
//!
//! let encoded = codec::encode(&job).unwrap();
//! assert_eq!(encoded["run_at"], "2024-05-01T12:30:00+00:00");
//! assert!(encoded["id"].is_null());
//!
//! let decoded: Job = codec::decode(encoded).unwrap();
//! assert_eq!(decoded, job);
//! ```
use std::fmt::Display;

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// The semantic type of a record field as seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    OptionalText,
    Integer,
    OptionalInteger,
    /// A point in time, encoded as an RFC 3339 string with a timezone offset.
    Temporal,
    OptionalTemporal,
    /// Arbitrary JSON passed through verbatim. `null` is an ordinary value of this kind, so it
    /// has no separate nullable counterpart.
    Opaque,
}

impl FieldKind {
    /// The nullable counterpart of this kind.
    pub const fn nullable(self) -> Self {
        match self {
            Self::Text | Self::OptionalText => Self::OptionalText,
            Self::Integer | Self::OptionalInteger => Self::OptionalInteger,
            Self::Temporal | Self::OptionalTemporal => Self::OptionalTemporal,
            Self::Opaque => Self::Opaque,
        }
    }

    pub const fn is_nullable(self) -> bool {
        matches!(
            self,
            Self::OptionalText | Self::OptionalInteger | Self::OptionalTemporal
        )
    }

    pub const fn is_temporal(self) -> bool {
        matches!(self, Self::Temporal | Self::OptionalTemporal)
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let val = match self {
            Self::Text => "string",
            Self::OptionalText => "nullable string",
            Self::Integer => "integer",
            Self::OptionalInteger => "nullable integer",
            Self::Temporal => "timestamp",
            Self::OptionalTemporal => "nullable timestamp",
            Self::Opaque => "JSON value",
        };
        write!(f, "{val}")
    }
}

/// An entry in a record's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// A field value after it has been checked against its [`FieldKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Text(String),
    Integer(i64),
    Temporal(DateTime<Utc>),
    Opaque(Value),
}

impl WireValue {
    fn read(field: &Field, value: Value) -> Result<Self, CodecError> {
        let unexpected = || CodecError::UnexpectedType {
            field: field.name,
            expected: field.kind,
        };
        if value.is_null() {
            return Ok(Self::Null);
        }
        match field.kind {
            FieldKind::Text | FieldKind::OptionalText => match value {
                Value::String(text) => Ok(Self::Text(text)),
                _ => Err(unexpected()),
            },
            FieldKind::Integer | FieldKind::OptionalInteger => {
                value.as_i64().map(Self::Integer).ok_or_else(unexpected)
            }
            FieldKind::Temporal | FieldKind::OptionalTemporal => {
                let text = value.as_str().ok_or_else(unexpected)?;
                DateTime::parse_from_rfc3339(text)
                    .map(|timestamp| Self::Temporal(timestamp.with_timezone(&Utc)))
                    .map_err(|source| CodecError::InvalidTimestamp {
                        field: field.name,
                        source,
                    })
            }
            FieldKind::Opaque => Ok(Self::Opaque(value)),
        }
    }

    /// Only timestamps within the four digit years of RFC 3339 are written, anything else could
    /// not be read back.
    fn write(self, field: &Field) -> Result<Value, CodecError> {
        Ok(match self {
            Self::Null => Value::Null,
            Self::Text(text) => Value::String(text),
            Self::Integer(integer) => Value::from(integer),
            Self::Temporal(timestamp) => {
                if !(0..=9999).contains(&timestamp.year()) {
                    return Err(CodecError::TimestampOutOfRange {
                        field: field.name,
                        timestamp,
                    });
                }
                Value::String(timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, false))
            }
            Self::Opaque(value) => value,
        })
    }
}

/// A Rust type that can be stored in a record field.
pub trait WireField: Sized {
    const KIND: FieldKind;

    fn to_wire(&self) -> WireValue;

    /// Returns [`None`] when `value` does not fit this type.
    fn from_wire(value: WireValue) -> Option<Self>;
}

impl WireField for String {
    const KIND: FieldKind = FieldKind::Text;

    fn to_wire(&self) -> WireValue {
        WireValue::Text(self.clone())
    }

    fn from_wire(value: WireValue) -> Option<Self> {
        match value {
            WireValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl WireField for u32 {
    const KIND: FieldKind = FieldKind::Integer;

    fn to_wire(&self) -> WireValue {
        WireValue::Integer((*self).into())
    }

    fn from_wire(value: WireValue) -> Option<Self> {
        match value {
            WireValue::Integer(integer) => integer.try_into().ok(),
            _ => None,
        }
    }
}

impl WireField for DateTime<Utc> {
    const KIND: FieldKind = FieldKind::Temporal;

    fn to_wire(&self) -> WireValue {
        WireValue::Temporal(*self)
    }

    fn from_wire(value: WireValue) -> Option<Self> {
        match value {
            WireValue::Temporal(timestamp) => Some(timestamp),
            _ => None,
        }
    }
}

/// `null` is kept as is, so a `Value` field needs no `Option` to be absent.
impl WireField for Value {
    const KIND: FieldKind = FieldKind::Opaque;

    fn to_wire(&self) -> WireValue {
        WireValue::Opaque(self.clone())
    }

    fn from_wire(value: WireValue) -> Option<Self> {
        match value {
            WireValue::Null => Some(Value::Null),
            WireValue::Opaque(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> WireField for Option<T>
where
    T: WireField,
{
    const KIND: FieldKind = T::KIND.nullable();

    fn to_wire(&self) -> WireValue {
        self.as_ref().map_or(WireValue::Null, WireField::to_wire)
    }

    fn from_wire(value: WireValue) -> Option<Self> {
        match value {
            WireValue::Null => Some(None),
            value => T::from_wire(value).map(Some),
        }
    }
}

/// A typed record with a static wire schema.
///
/// Implemented through the `wire_record!` macro rather than by hand.
pub trait Record: Default {
    /// Every declared field, in declaration order.
    const SCHEMA: &'static [Field];

    fn field(&self, name: &str) -> WireValue;

    fn set_field(&mut self, field: &Field, value: WireValue) -> Result<(), CodecError>;
}

/// Declares a record struct together with its [`Record`] implementation.
macro_rules! wire_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident: $ty:ty,
            )*
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl $crate::codec::Record for $name {
            const SCHEMA: &'static [$crate::codec::Field] = &[
                $(
                    $crate::codec::Field {
                        name: stringify!($field),
                        kind: <$ty as $crate::codec::WireField>::KIND,
                    },
                )*
            ];

            fn field(&self, name: &str) -> $crate::codec::WireValue {
                match name {
                    $(stringify!($field) => $crate::codec::WireField::to_wire(&self.$field),)*
                    _ => $crate::codec::WireValue::Null,
                }
            }

            fn set_field(
                &mut self,
                field: &$crate::codec::Field,
                value: $crate::codec::WireValue,
            ) -> Result<(), $crate::codec::CodecError> {
                match field.name {
                    $(
                        stringify!($field) => {
                            self.$field = <$ty as $crate::codec::WireField>::from_wire(value)
                                .ok_or($crate::codec::CodecError::UnexpectedType {
                                    field: field.name,
                                    expected: field.kind,
                                })?;
                        }
                    )*
                    _ => {}
                }
                Ok(())
            }
        }
    };
}

pub(crate) use wire_record;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Body is not valid JSON")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Expected a JSON object, found {found}")]
    NotAnObject { found: &'static str },
    #[error("Field `{field}` does not hold a {expected}")]
    UnexpectedType {
        field: &'static str,
        expected: FieldKind,
    },
    #[error("Field `{field}` is not a valid RFC 3339 timestamp")]
    InvalidTimestamp {
        field: &'static str,
        #[source]
        source: chrono::ParseError,
    },
    #[error("Field `{field}` holds {timestamp}, outside the years 0000 to 9999")]
    TimestampOutOfRange {
        field: &'static str,
        timestamp: DateTime<Utc>,
    },
}

/// Encodes `record` as a flat JSON object holding every declared field, nulls included.
///
/// Fails with [`CodecError::TimestampOutOfRange`] for a timestamp RFC 3339 cannot express.
pub fn encode<R: Record>(record: &R) -> Result<Map<String, Value>, CodecError> {
    R::SCHEMA
        .iter()
        .map(|field| Ok((field.name.to_owned(), record.field(field.name).write(field)?)))
        .collect()
}

/// Decodes a single JSON object into `R`.
///
/// Keys not in [`Record::SCHEMA`] are ignored and declared fields missing from `object` keep
/// their default. A `null` under a non-nullable field also leaves the default in place.
pub fn decode<R: Record>(mut object: Map<String, Value>) -> Result<R, CodecError> {
    let mut record = R::default();
    for field in R::SCHEMA {
        let Some(value) = object.remove(field.name) else {
            continue;
        };
        let value = WireValue::read(field, value)?;
        if value == WireValue::Null && !field.kind.is_nullable() {
            continue;
        }
        record.set_field(field, value)?;
    }
    Ok(record)
}

/// Decodes a value that is either `null`, meaning no record, or a single object.
pub fn decode_one<R: Record>(value: Value) -> Result<Option<R>, CodecError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(object) => decode(object).map(Some),
        other => Err(CodecError::NotAnObject {
            found: json_type(&other),
        }),
    }
}

/// Decodes `null` (no records), an array of objects, or a lone object into a list of records.
///
/// The output preserves the order of the input array.
pub fn decode_many<R: Record>(value: Value) -> Result<Vec<R>, CodecError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(values) => values
            .into_iter()
            .map(|value| match value {
                Value::Object(object) => decode(object),
                other => Err(CodecError::NotAnObject {
                    found: json_type(&other),
                }),
            })
            .collect(),
        Value::Object(object) => Ok(vec![decode(object)?]),
        other => Err(CodecError::NotAnObject {
            found: json_type(&other),
        }),
    }
}

/// Parses a response body, treating an empty body as `null`.
pub fn parse_body(body: &[u8]) -> Result<Value, CodecError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(body)?)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use chrono::{TimeDelta, TimeZone};
    use serde_json::json;

    use super::*;

    wire_record! {
        #[derive(Debug, Default, Clone, PartialEq)]
        struct Sample {
            name: String,
            label: Option<String>,
            count: u32,
            total: Option<u32>,
            at: DateTime<Utc>,
            seen_at: Option<DateTime<Utc>>,
            data: Value,
        }
    }

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    fn full_sample() -> Sample {
        Sample {
            name: "name".to_owned(),
            label: Some("label".to_owned()),
            count: 7,
            total: Some(9),
            at: timestamp(),
            seen_at: Some(timestamp() + TimeDelta::milliseconds(250)),
            data: json!({"nested": [1, 2, 3]}),
        }
    }

    #[test]
    fn schema_is_derived_from_field_types() {
        let kinds: Vec<_> = Sample::SCHEMA.iter().map(|f| (f.name, f.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("name", FieldKind::Text),
                ("label", FieldKind::OptionalText),
                ("count", FieldKind::Integer),
                ("total", FieldKind::OptionalInteger),
                ("at", FieldKind::Temporal),
                ("seen_at", FieldKind::OptionalTemporal),
                ("data", FieldKind::Opaque),
            ]
        );
    }

    #[test]
    fn encode_emits_every_field() {
        let encoded = encode(&Sample::default()).unwrap();

        assert_eq!(encoded.len(), Sample::SCHEMA.len());
        assert_eq!(encoded["label"], Value::Null);
        assert_eq!(encoded["seen_at"], Value::Null);
        assert_eq!(encoded["at"], json!("1970-01-01T00:00:00+00:00"));
    }

    #[test]
    fn encode_formats_timestamps_and_passes_opaque_values_through() {
        let encoded = encode(&full_sample()).unwrap();

        assert_eq!(encoded["at"], json!("2024-01-02T03:04:05+00:00"));
        assert_eq!(encoded["seen_at"], json!("2024-01-02T03:04:05.250+00:00"));
        assert_eq!(encoded["data"], json!({"nested": [1, 2, 3]}));
        assert_eq!(encoded["count"], json!(7));
    }

    #[test]
    fn round_trip() {
        let sample = full_sample();
        assert_eq!(decode::<Sample>(encode(&sample).unwrap()).unwrap(), sample);

        let sample = Sample::default();
        assert_eq!(decode::<Sample>(encode(&sample).unwrap()).unwrap(), sample);
    }

    #[test]
    fn round_trip_edge_values() {
        let earliest = Utc.with_ymd_and_hms(0, 1, 1, 0, 0, 0).unwrap();
        let latest = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap()
            + TimeDelta::nanoseconds(999_999_999);
        let samples = [
            Sample {
                name: String::new(),
                label: Some(String::new()),
                count: u32::MAX,
                total: Some(0),
                at: earliest,
                seen_at: Some(latest),
                data: Value::Null,
            },
            Sample {
                name: "ünïcödé \"quoted\"".to_owned(),
                count: 0,
                total: Some(u32::MAX),
                at: latest,
                seen_at: Some(timestamp() + TimeDelta::nanoseconds(1)),
                data: json!([null, {"": ""}, 1.5, false]),
                ..Default::default()
            },
            Sample {
                data: json!(""),
                ..Default::default()
            },
        ];

        for sample in samples {
            assert_eq!(decode::<Sample>(encode(&sample).unwrap()).unwrap(), sample);
        }
    }

    #[test]
    fn encode_rejects_timestamps_without_rfc3339_form() {
        let sample = Sample {
            at: Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap(),
            ..Default::default()
        };
        assert_matches!(
            encode(&sample),
            Err(CodecError::TimestampOutOfRange { field: "at", .. })
        );

        let sample = Sample {
            seen_at: Some(Utc.with_ymd_and_hms(-1, 12, 31, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        assert_matches!(
            encode(&sample),
            Err(CodecError::TimestampOutOfRange {
                field: "seen_at",
                ..
            })
        );
    }

    #[test]
    fn decode_ignores_unknown_keys_and_defaults_missing_ones() {
        let value = json!({"name": "x", "unknown": {"a": 1}});
        let Value::Object(object) = value else {
            unreachable!()
        };

        let decoded: Sample = decode(object).unwrap();
        assert_eq!(
            decoded,
            Sample {
                name: "x".to_owned(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn decode_converts_offsets_to_utc() {
        let decoded: Option<Sample> =
            decode_one(json!({"seen_at": "2024-01-02T05:04:05+02:00"})).unwrap();

        assert_eq!(decoded.unwrap().seen_at, Some(timestamp()));
    }

    #[test]
    fn decode_null_for_non_nullable_field_keeps_default() {
        let decoded: Option<Sample> = decode_one(json!({"count": null, "at": null})).unwrap();

        assert_eq!(decoded, Some(Sample::default()));
    }

    #[test]
    fn decode_invalid_timestamp() {
        let result = decode_one::<Sample>(json!({"seen_at": "yesterday"}));

        assert_matches!(
            result,
            Err(CodecError::InvalidTimestamp {
                field: "seen_at",
                ..
            })
        );
    }

    #[test]
    fn decode_wrong_type() {
        assert_matches!(
            decode_one::<Sample>(json!({"count": "seven"})),
            Err(CodecError::UnexpectedType {
                field: "count",
                expected: FieldKind::Integer
            })
        );
        assert_matches!(
            decode_one::<Sample>(json!({"count": -1})),
            Err(CodecError::UnexpectedType { field: "count", .. })
        );
        assert_matches!(
            decode_one::<Sample>(json!({"at": 12})),
            Err(CodecError::UnexpectedType { field: "at", .. })
        );
    }

    #[test]
    fn decode_null_is_empty() {
        assert_eq!(decode_one::<Sample>(Value::Null).unwrap(), None);
        assert!(decode_many::<Sample>(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn decode_many_keeps_order() {
        let decoded: Vec<Sample> =
            decode_many(json!([{"name": "a"}, {"name": "b"}, {"name": "c"}])).unwrap();

        let names: Vec<_> = decoded.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn decode_many_accepts_single_object() {
        let decoded: Vec<Sample> = decode_many(json!({"name": "a"})).unwrap();

        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn decode_rejects_non_objects() {
        assert_matches!(
            decode_one::<Sample>(json!([1])),
            Err(CodecError::NotAnObject { found: "array" })
        );
        assert_matches!(
            decode_many::<Sample>(json!([{"name": "a"}, 3])),
            Err(CodecError::NotAnObject { found: "number" })
        );
    }

    #[test]
    fn parse_empty_body_is_null() {
        assert_eq!(parse_body(b"").unwrap(), Value::Null);
        assert_eq!(parse_body(b" \n").unwrap(), Value::Null);
        assert_matches!(parse_body(b"{"), Err(CodecError::InvalidJson(_)));
    }
}

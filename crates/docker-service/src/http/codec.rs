//! JSON and property-list codecs.
//!
//! [`Timestamp`] and [`Binary`] follow the date and data strategies of the
//! encoder or decoder that is currently running on this thread. Outside of one
//! of the configs below they fall back to RFC 3339 strings and raw bytes.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{self, DeserializeOwned, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::cell::Cell;
use std::fmt;
use std::ops::Deref;

/// How dates are written to and read from JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateStrategy {
    /// Numeric seconds since the Unix epoch
    #[default]
    SecondsSince1970,
    /// Numeric milliseconds since the Unix epoch
    MillisecondsSince1970,
    /// RFC 3339 / ISO 8601 string
    Iso8601,
}

/// How binary data is written to and read from JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataStrategy {
    /// Standard base64 string
    #[default]
    Base64,
    /// Array of byte values
    Bytes,
}

#[derive(Debug, Clone, Copy)]
struct Strategies {
    date: DateStrategy,
    data: DataStrategy,
}

thread_local! {
    static ACTIVE: Cell<Option<Strategies>> = const { Cell::new(None) };
}

/// Installs strategies for the current thread and restores the previous ones on drop
struct StrategyScope {
    previous: Option<Strategies>,
}

impl StrategyScope {
    fn enter(strategies: Option<Strategies>) -> Self {
        let previous = ACTIVE.with(|cell| cell.replace(strategies));
        Self { previous }
    }
}

impl Drop for StrategyScope {
    fn drop(&mut self) {
        ACTIVE.with(|cell| cell.set(self.previous));
    }
}

fn active() -> Option<Strategies> {
    ACTIVE.with(|cell| cell.get())
}

/// JSON body encoder settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonEncoderConfig {
    pub date_strategy: DateStrategy,
    pub data_strategy: DataStrategy,
    pub pretty: bool,
}

impl JsonEncoderConfig {
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    pub fn with_date_strategy(mut self, strategy: DateStrategy) -> Self {
        self.date_strategy = strategy;
        self
    }

    pub fn with_data_strategy(mut self, strategy: DataStrategy) -> Self {
        self.data_strategy = strategy;
        self
    }

    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, serde_json::Error> {
        let _scope = StrategyScope::enter(Some(Strategies {
            date: self.date_strategy,
            data: self.data_strategy,
        }));
        if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        }
    }
}

/// JSON response decoder settings, mirroring [`JsonEncoderConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonDecoderConfig {
    pub date_strategy: DateStrategy,
    pub data_strategy: DataStrategy,
}

impl JsonDecoderConfig {
    pub fn with_date_strategy(mut self, strategy: DateStrategy) -> Self {
        self.date_strategy = strategy;
        self
    }

    pub fn with_data_strategy(mut self, strategy: DataStrategy) -> Self {
        self.data_strategy = strategy;
        self
    }

    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, serde_json::Error> {
        let _scope = StrategyScope::enter(Some(Strategies {
            date: self.date_strategy,
            data: self.data_strategy,
        }));
        serde_json::from_slice(data)
    }
}

impl From<JsonEncoderConfig> for JsonDecoderConfig {
    fn from(config: JsonEncoderConfig) -> Self {
        Self {
            date_strategy: config.date_strategy,
            data_strategy: config.data_strategy,
        }
    }
}

/// Property list output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlistFormat {
    #[default]
    Xml,
    Binary,
}

/// Property list body encoder settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyListEncoderConfig {
    pub format: PlistFormat,
}

impl PropertyListEncoderConfig {
    pub fn binary() -> Self {
        Self {
            format: PlistFormat::Binary,
        }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, plist::Error> {
        let _scope = StrategyScope::enter(None);
        let mut buffer = Vec::new();
        match self.format {
            PlistFormat::Xml => plist::to_writer_xml(&mut buffer, value)?,
            PlistFormat::Binary => plist::to_writer_binary(&mut buffer, value)?,
        }
        Ok(buffer)
    }
}

/// Decode a property list in either XML or binary form
pub fn decode_property_list<T: DeserializeOwned>(data: &[u8]) -> Result<T, plist::Error> {
    let _scope = StrategyScope::enter(None);
    plist::from_bytes(data)
}

/// A UTC date whose wire form follows the active [`DateStrategy`]
///
/// Numeric forms carry at most microsecond precision. Nanoseconds below a
/// microsecond are dropped on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub DateTime<Utc>);

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl Deref for Timestamp {
    type Target = DateTime<Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let date = self.0;
        match active().map(|s| s.date) {
            Some(DateStrategy::SecondsSince1970) => {
                let micros = date.timestamp_subsec_micros();
                if micros == 0 {
                    serializer.serialize_i64(date.timestamp())
                } else {
                    serializer.serialize_f64(date.timestamp() as f64 + f64::from(micros) / 1e6)
                }
            }
            Some(DateStrategy::MillisecondsSince1970) => {
                let sub_milli_micros = date.timestamp_subsec_micros() % 1_000;
                if sub_milli_micros == 0 {
                    serializer.serialize_i64(date.timestamp_millis())
                } else {
                    serializer.serialize_f64(
                        date.timestamp_millis() as f64 + f64::from(sub_milli_micros) / 1e3,
                    )
                }
            }
            Some(DateStrategy::Iso8601) | None => {
                serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

fn timestamp_from_seconds<E: de::Error>(seconds: f64) -> Result<Timestamp, E> {
    if !seconds.is_finite() {
        return Err(E::custom("timestamp is not a finite number"));
    }
    let mut whole = seconds.floor() as i64;
    // f64 cannot hold present-day epochs below a microsecond.
    let mut micros = ((seconds - seconds.floor()) * 1e6).round() as u32;
    if micros >= 1_000_000 {
        whole += 1;
        micros = 0;
    }
    DateTime::from_timestamp(whole, micros * 1_000)
        .map(Timestamp)
        .ok_or_else(|| E::custom(format!("timestamp {} is out of range", seconds)))
}

struct TimestampVisitor;

impl TimestampVisitor {
    fn from_number<E: de::Error>(value: f64) -> Result<Timestamp, E> {
        match active().map(|s| s.date) {
            Some(DateStrategy::MillisecondsSince1970) => timestamp_from_seconds(value / 1000.0),
            _ => timestamp_from_seconds(value),
        }
    }

    fn from_integer<E: de::Error>(value: i64) -> Result<Timestamp, E> {
        let parsed = match active().map(|s| s.date) {
            Some(DateStrategy::MillisecondsSince1970) => DateTime::from_timestamp_millis(value),
            _ => DateTime::from_timestamp(value, 0),
        };
        parsed
            .map(Timestamp)
            .ok_or_else(|| E::custom(format!("timestamp {} is out of range", value)))
    }
}

impl<'de> Visitor<'de> for TimestampVisitor {
    type Value = Timestamp;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a numeric timestamp or an RFC 3339 date string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Self::from_integer(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        let v = i64::try_from(v).map_err(|_| E::custom("timestamp is out of range"))?;
        Self::from_integer(v)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Self::from_number(v)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        DateTime::parse_from_rfc3339(v)
            .map(|date| Timestamp(date.with_timezone(&Utc)))
            .map_err(|e| E::custom(format!("invalid date '{}': {}", v, e)))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TimestampVisitor)
    }
}

/// Binary data whose wire form follows the active [`DataStrategy`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Binary(pub Vec<u8>);

impl From<Vec<u8>> for Binary {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for Binary {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl Deref for Binary {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Serialize for Binary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match active().map(|s| s.data) {
            Some(DataStrategy::Base64) => {
                serializer.serialize_str(&general_purpose::STANDARD.encode(&self.0))
            }
            Some(DataStrategy::Bytes) | None => serializer.serialize_bytes(&self.0),
        }
    }
}

struct BinaryVisitor;

impl<'de> Visitor<'de> for BinaryVisitor {
    type Value = Binary;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a base64 string or a sequence of bytes")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        general_purpose::STANDARD
            .decode(v)
            .map(Binary)
            .map_err(|e| E::custom(format!("invalid base64 data: {}", e)))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(Binary(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        Ok(Binary(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Ok(Binary(bytes))
    }
}

impl<'de> Deserialize<'de> for Binary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(BinaryVisitor)
    }
}

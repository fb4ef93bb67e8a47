//! Restricted CBOR codec
//!
//! Covers the subset needed by token and payment request envelopes: unsigned
//! and negative integers up to 64 bits, byte strings, text strings, arrays,
//! text-keyed maps, booleans and null. Floats, tags and indefinite-length
//! items are rejected.
//!
//! See <https://www.rfc-editor.org/rfc/rfc8949.html>

use bitcoin::hex::DisplayHex;
use thiserror::Error;

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_TAG: u8 = 6;
const MAJOR_SIMPLE: u8 = 7;

const SIMPLE_FALSE: u8 = 0xf4;
const SIMPLE_TRUE: u8 = 0xf5;
const SIMPLE_NULL: u8 = 0xf6;

const INDEFINITE: u8 = 31;

/// Maximum nesting of arrays and maps accepted by the decoder
pub const MAX_DEPTH: usize = 64;

/// CBOR encode error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// Only non-negative integers are emitted
    #[error("Cannot encode negative number: {0}")]
    NegativeInteger(i128),
    /// Integer does not fit in 64 bits
    #[error("Integer too large: {0}")]
    IntegerTooLarge(i128),
    /// Floats are not part of the supported subset
    #[error("Cannot encode float: {0}")]
    Float(String),
}

/// CBOR decode error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended before the item was complete
    #[error("Unexpected end of data")]
    UnexpectedEnd,
    /// Indefinite-length strings, arrays or maps
    #[error("Unsupported: indefinite length (byte 0x{0:02x})")]
    IndefiniteLength(u8),
    /// Tags and other unsupported major types
    #[error("Unsupported major type (byte 0x{0:02x})")]
    UnsupportedMajorType(u8),
    /// Floats and simple values other than false, true and null
    #[error("Unsupported simple value (byte 0x{0:02x})")]
    UnsupportedSimpleValue(u8),
    /// Additional info 28..=30 is reserved
    #[error("Reserved additional info (byte 0x{0:02x})")]
    ReservedAdditionalInfo(u8),
    /// Text string is not valid UTF-8
    #[error("Invalid UTF-8 in text string")]
    InvalidUtf8,
    /// Map key is not a text string
    #[error("Invalid map key (byte 0x{0:02x})")]
    InvalidMapKey(u8),
    /// Arrays or maps nested beyond [`MAX_DEPTH`]
    #[error("Nesting too deep")]
    NestingTooDeep,
}

/// Value in the supported CBOR subset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `null`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// Integer, negative values are decode-only
    Integer(i128),
    /// Byte string
    Bytes(Vec<u8>),
    /// UTF-8 text string
    Text(String),
    /// Array
    Array(Vec<Value>),
    /// Map with text keys, in insertion order
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Build a map from key/value pairs keeping their order
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Look up a key in a map value
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Text content
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Byte content
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Non-negative integer content
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Integer(i) => u64::try_from(*i).ok(),
            _ => None,
        }
    }

    /// Boolean content
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Array content
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Convert into JSON, byte strings become lowercase hex
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Integer(i) => match (u64::try_from(i), i64::try_from(i)) {
                (Ok(u), _) => serde_json::Value::from(u),
                (_, Ok(n)) => serde_json::Value::from(n),
                _ => serde_json::Value::String(i.to_string()),
            },
            Value::Bytes(b) => serde_json::Value::String(b.to_lower_hex_string()),
            Value::Text(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Value::into_json).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, v.into_json()))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Integer(value.into())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl TryFrom<f64> for Value {
    type Error = EncodeError;

    /// Numbers are only accepted when they are finite, integral and non-negative
    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || value.fract() != 0.0 {
            return Err(EncodeError::Float(value.to_string()));
        }
        if value < 0.0 {
            return Err(EncodeError::NegativeInteger(value as i128));
        }
        if value >= u64::MAX as f64 {
            return Err(EncodeError::IntegerTooLarge(value as i128));
        }
        Ok(Value::Integer(value as i128))
    }
}

/// Encode a value
pub fn encode(value: &Value) -> Result<Vec<u8>, EncodeError> {
    let mut writer = Writer::default();
    writer.write_value(value)?;
    Ok(writer.buf)
}

/// Decode a single value from the start of `data`
///
/// Bytes following the first complete item are ignored.
pub fn decode(data: &[u8]) -> Result<Value, DecodeError> {
    Reader::new(data).read_value(0)
}

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn write_head(&mut self, major: u8, argument: u64) {
        let major = major << 5;
        if argument < 24 {
            self.buf.push(major | argument as u8);
        } else if let Ok(arg) = u8::try_from(argument) {
            self.buf.push(major | 24);
            self.buf.push(arg);
        } else if let Ok(arg) = u16::try_from(argument) {
            self.buf.push(major | 25);
            self.buf.extend_from_slice(&arg.to_be_bytes());
        } else if let Ok(arg) = u32::try_from(argument) {
            self.buf.push(major | 26);
            self.buf.extend_from_slice(&arg.to_be_bytes());
        } else {
            self.buf.push(major | 27);
            self.buf.extend_from_slice(&argument.to_be_bytes());
        }
    }

    fn write_value(&mut self, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Null => self.buf.push(SIMPLE_NULL),
            Value::Bool(false) => self.buf.push(SIMPLE_FALSE),
            Value::Bool(true) => self.buf.push(SIMPLE_TRUE),
            Value::Integer(i) => {
                if *i < 0 {
                    return Err(EncodeError::NegativeInteger(*i));
                }
                let n = u64::try_from(*i).map_err(|_| EncodeError::IntegerTooLarge(*i))?;
                self.write_head(MAJOR_UNSIGNED, n);
            }
            Value::Bytes(b) => {
                self.write_head(MAJOR_BYTES, b.len() as u64);
                self.buf.extend_from_slice(b);
            }
            Value::Text(s) => {
                self.write_head(MAJOR_TEXT, s.len() as u64);
                self.buf.extend_from_slice(s.as_bytes());
            }
            Value::Array(items) => {
                self.write_head(MAJOR_ARRAY, items.len() as u64);
                for item in items {
                    self.write_value(item)?;
                }
            }
            Value::Map(entries) => {
                self.write_head(MAJOR_MAP, entries.len() as u64);
                for (key, item) in entries {
                    self.write_head(MAJOR_TEXT, key.len() as u64);
                    self.buf.extend_from_slice(key.as_bytes());
                    self.write_value(item)?;
                }
            }
        }
        Ok(())
    }
}

struct Reader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .data
            .get(self.position)
            .ok_or(DecodeError::UnexpectedEnd)?;
        self.position += 1;
        Ok(byte)
    }

    fn read_slice(&mut self, len: u64) -> Result<&'a [u8], DecodeError> {
        let len = usize::try_from(len).map_err(|_| DecodeError::UnexpectedEnd)?;
        if len > self.remaining() {
            return Err(DecodeError::UnexpectedEnd);
        }
        let slice = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    fn read_argument(&mut self, initial: u8) -> Result<u64, DecodeError> {
        let info = initial & 0x1f;
        match info {
            0..=23 => Ok(info as u64),
            24 => Ok(self.read_u8()? as u64),
            25 => {
                let b = self.read_slice(2)?;
                Ok(u16::from_be_bytes([b[0], b[1]]) as u64)
            }
            26 => {
                let b = self.read_slice(4)?;
                Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as u64)
            }
            27 => {
                let b = self.read_slice(8)?;
                let mut arr = [0u8; 8];
                arr.copy_from_slice(b);
                Ok(u64::from_be_bytes(arr))
            }
            INDEFINITE => Err(DecodeError::IndefiniteLength(initial)),
            _ => Err(DecodeError::ReservedAdditionalInfo(initial)),
        }
    }

    /// Element counts must be coverable by the remaining input, one byte per item at least
    fn check_count(&self, count: u64, per_item: u64) -> Result<usize, DecodeError> {
        let needed = count.saturating_mul(per_item);
        if needed > self.remaining() as u64 {
            return Err(DecodeError::UnexpectedEnd);
        }
        usize::try_from(count).map_err(|_| DecodeError::UnexpectedEnd)
    }

    fn read_text(&mut self, initial: u8) -> Result<String, DecodeError> {
        let len = self.read_argument(initial)?;
        let bytes = self.read_slice(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    fn read_value(&mut self, depth: usize) -> Result<Value, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::NestingTooDeep);
        }

        let initial = self.read_u8()?;
        match initial >> 5 {
            MAJOR_UNSIGNED => Ok(Value::Integer(self.read_argument(initial)?.into())),
            MAJOR_NEGATIVE => {
                let n = self.read_argument(initial)?;
                Ok(Value::Integer(-1 - i128::from(n)))
            }
            MAJOR_BYTES => {
                let len = self.read_argument(initial)?;
                Ok(Value::Bytes(self.read_slice(len)?.to_vec()))
            }
            MAJOR_TEXT => Ok(Value::Text(self.read_text(initial)?)),
            MAJOR_ARRAY => {
                let count = self.read_argument(initial)?;
                let count = self.check_count(count, 1)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.read_value(depth + 1)?);
                }
                Ok(Value::Array(items))
            }
            MAJOR_MAP => {
                let count = self.read_argument(initial)?;
                let count = self.check_count(count, 2)?;
                let mut entries: Vec<(String, Value)> = Vec::with_capacity(count);
                for _ in 0..count {
                    let key_initial = self.read_u8()?;
                    if key_initial >> 5 != MAJOR_TEXT {
                        return Err(DecodeError::InvalidMapKey(key_initial));
                    }
                    let key = self.read_text(key_initial)?;
                    let value = self.read_value(depth + 1)?;
                    match entries.iter_mut().find(|(k, _)| *k == key) {
                        Some(entry) => entry.1 = value,
                        None => entries.push((key, value)),
                    }
                }
                Ok(Value::Map(entries))
            }
            MAJOR_TAG => Err(DecodeError::UnsupportedMajorType(initial)),
            MAJOR_SIMPLE => match initial {
                SIMPLE_FALSE => Ok(Value::Bool(false)),
                SIMPLE_TRUE => Ok(Value::Bool(true)),
                SIMPLE_NULL => Ok(Value::Null),
                0xff => Err(DecodeError::IndefiniteLength(initial)),
                _ => Err(DecodeError::UnsupportedSimpleValue(initial)),
            },
            _ => Err(DecodeError::UnsupportedMajorType(initial)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Value) {
        let encoded = encode(&value).unwrap();
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_integer_length_boundaries() {
        assert_eq!(encode(&Value::from(23)).unwrap(), vec![0x17]);
        assert_eq!(encode(&Value::from(24)).unwrap(), vec![0x18, 0x18]);
        assert_eq!(encode(&Value::from(256)).unwrap(), vec![0x19, 0x01, 0x00]);
        assert_eq!(
            encode(&Value::from(65_536)).unwrap(),
            vec![0x1a, 0x00, 0x01, 0x00, 0x00]
        );
        assert_eq!(
            encode(&Value::from(1u64 << 32)).unwrap(),
            vec![0x1b, 0, 0, 0, 1, 0, 0, 0, 0]
        );

        for n in [0, 23, 24, 255, 256, 65_535, 65_536, u32::MAX as u64 + 1, u64::MAX] {
            round_trip(Value::from(n));
        }
    }

    #[test]
    fn test_nested_round_trip() {
        let value = Value::map([
            ("z", Value::from("last key first")),
            ("a", Value::Array(vec![Value::Null, true.into(), false.into()])),
            ("b", Value::from(vec![0u8, 1, 2, 255])),
            ("m", Value::map([("inner", Value::from(1_000_000u64))])),
        ]);
        round_trip(value.clone());

        // Key order follows insertion
        let Value::Map(entries) = decode(&encode(&value).unwrap()).unwrap() else {
            panic!("expected map");
        };
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["z", "a", "b", "m"]);
    }

    #[test]
    fn test_negative_decode_only() {
        // -1 and -500
        assert_eq!(decode(&[0x20]).unwrap(), Value::Integer(-1));
        assert_eq!(decode(&[0x39, 0x01, 0xf3]).unwrap(), Value::Integer(-500));

        assert_eq!(
            encode(&Value::Integer(-1)),
            Err(EncodeError::NegativeInteger(-1))
        );
    }

    #[test]
    fn test_float_rejected() {
        assert!(matches!(Value::try_from(1.5), Err(EncodeError::Float(_))));
        assert!(matches!(Value::try_from(f64::NAN), Err(EncodeError::Float(_))));
        assert!(matches!(
            Value::try_from(-3.0),
            Err(EncodeError::NegativeInteger(-3))
        ));
        assert_eq!(Value::try_from(42.0).unwrap(), Value::Integer(42));

        // Half precision float on the wire
        assert_eq!(
            decode(&[0xf9, 0x3c, 0x00]),
            Err(DecodeError::UnsupportedSimpleValue(0xf9))
        );
    }

    #[test]
    fn test_truncated_input() {
        let encoded = encode(&Value::map([("key", Value::from("value"))])).unwrap();
        for len in 0..encoded.len() {
            assert_eq!(
                decode(&encoded[..len]),
                Err(DecodeError::UnexpectedEnd),
                "prefix of length {len}"
            );
        }
    }

    #[test]
    fn test_declared_length_larger_than_input() {
        // Byte string claiming u32::MAX bytes
        assert_eq!(
            decode(&[0x5a, 0xff, 0xff, 0xff, 0xff, 0x00]),
            Err(DecodeError::UnexpectedEnd)
        );
        // Array claiming u64::MAX items
        assert_eq!(
            decode(&[0x9b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]),
            Err(DecodeError::UnexpectedEnd)
        );
    }

    #[test]
    fn test_unsupported_items() {
        assert_eq!(decode(&[0x9f, 0xff]), Err(DecodeError::IndefiniteLength(0x9f)));
        assert_eq!(decode(&[0xbf, 0xff]), Err(DecodeError::IndefiniteLength(0xbf)));
        assert_eq!(decode(&[0x5f]), Err(DecodeError::IndefiniteLength(0x5f)));
        assert_eq!(
            decode(&[0xc2, 0x41, 0x01]),
            Err(DecodeError::UnsupportedMajorType(0xc2))
        );
        assert_eq!(decode(&[0xf7]), Err(DecodeError::UnsupportedSimpleValue(0xf7)));
        assert_eq!(decode(&[0x1c]), Err(DecodeError::ReservedAdditionalInfo(0x1c)));
        assert_eq!(decode(&[0x62, 0xc3, 0x28]), Err(DecodeError::InvalidUtf8));
        // Map with integer key
        assert_eq!(
            decode(&[0xa1, 0x01, 0x02]),
            Err(DecodeError::InvalidMapKey(0x01))
        );
    }

    #[test]
    fn test_nesting_limit() {
        let mut data = vec![0x81; MAX_DEPTH + 2];
        data.push(0xf6);
        assert_eq!(decode(&data), Err(DecodeError::NestingTooDeep));

        let mut data = vec![0x81; MAX_DEPTH];
        data.push(0xf6);
        assert!(decode(&data).is_ok());
    }

    #[test]
    fn test_duplicate_key_replaces_value() {
        // {"a": 1, "b": 2, "a": 3}
        let data = [0xa3, 0x61, b'a', 0x01, 0x61, b'b', 0x02, 0x61, b'a', 0x03];
        assert_eq!(
            decode(&data).unwrap(),
            Value::map([("a", Value::from(3)), ("b", Value::from(2))])
        );
    }

    #[test]
    fn test_interop_with_ciborium() {
        use ciborium::value::Value as CValue;

        let ours = Value::map([
            ("i", Value::from("b7a90176")),
            ("a", Value::from(10)),
            ("s", Value::from(true)),
            ("p", Value::from(vec![0xde, 0xad])),
        ]);
        let bytes = encode(&ours).unwrap();
        let theirs: CValue = ciborium::de::from_reader(bytes.as_slice()).unwrap();
        let map = theirs.as_map().unwrap();
        assert_eq!(map.len(), 4);
        assert_eq!(map[0].0.as_text(), Some("i"));
        assert_eq!(map[1].1.as_integer(), Some(10.into()));

        let mut buf = Vec::new();
        ciborium::ser::into_writer(&theirs, &mut buf).unwrap();
        assert_eq!(decode(&buf).unwrap(), ours);
    }

    #[test]
    fn test_into_json() {
        let value = Value::map([
            ("c", Value::from(vec![0x02, 0xab])),
            ("n", Value::Integer(-4)),
            ("t", Value::from("x")),
        ]);
        assert_eq!(
            value.into_json(),
            serde_json::json!({"c": "02ab", "n": -4, "t": "x"})
        );
    }
}

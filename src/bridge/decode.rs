//! Per-format payload decoding.
//!
//! All four wire formats are normalized into one owned value tree so the
//! projection loop in `bridge` is format-agnostic. Only shapes the
//! schema can use survive the conversion; everything else collapses to
//! `Value::Other` and will be marked undefined downstream.

use crate::core::config::BinaryFormat;
use flexbuffers::FlexBufferType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload root is not a map")]
    NotAMap,
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// One decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    /// Null, nested maps, binary blobs, integers outside the i64 range -
    /// anything no schema type accepts.
    Other,
}

/// Decode a payload under `format` into its root map's fields, in the
/// order the decoder exposes them.
pub fn decode_map(
    format: BinaryFormat,
    payload: &[u8],
) -> Result<Vec<(String, Value)>, DecodeError> {
    match format {
        BinaryFormat::MsgPack => decode_msgpack(payload),
        BinaryFormat::Cbor => decode_cbor(payload),
        BinaryFormat::FlexBuffers => decode_flexbuffers(payload),
        BinaryFormat::Json => decode_json(payload),
    }
}

fn decode_msgpack(payload: &[u8]) -> Result<Vec<(String, Value)>, DecodeError> {
    let value = rmpv::decode::read_value(&mut &payload[..])
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let rmpv::Value::Map(entries) = value else {
        return Err(DecodeError::NotAMap);
    };
    Ok(entries
        .into_iter()
        .filter_map(|(key, value)| {
            let key = key.as_str()?.to_string();
            Some((key, convert_msgpack(value)))
        })
        .collect())
}

fn convert_msgpack(value: rmpv::Value) -> Value {
    match value {
        rmpv::Value::Boolean(b) => Value::Bool(b),
        rmpv::Value::Integer(i) => i.as_i64().map_or(Value::Other, Value::Int),
        rmpv::Value::F32(f) => Value::Float(f64::from(f)),
        rmpv::Value::F64(f) => Value::Float(f),
        rmpv::Value::String(s) => s.into_str().map_or(Value::Other, Value::Str),
        rmpv::Value::Array(items) => {
            Value::Array(items.into_iter().map(convert_msgpack).collect())
        }
        _ => Value::Other,
    }
}

fn decode_cbor(payload: &[u8]) -> Result<Vec<(String, Value)>, DecodeError> {
    let value: ciborium::Value =
        ciborium::from_reader(payload).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let ciborium::Value::Map(entries) = value else {
        return Err(DecodeError::NotAMap);
    };
    Ok(entries
        .into_iter()
        .filter_map(|(key, value)| {
            let key = key.into_text().ok()?;
            Some((key, convert_cbor(value)))
        })
        .collect())
}

fn convert_cbor(value: ciborium::Value) -> Value {
    match value {
        ciborium::Value::Bool(b) => Value::Bool(b),
        ciborium::Value::Integer(i) => i64::try_from(i).map_or(Value::Other, Value::Int),
        ciborium::Value::Float(f) => Value::Float(f),
        ciborium::Value::Text(s) => Value::Str(s),
        ciborium::Value::Array(items) => {
            Value::Array(items.into_iter().map(convert_cbor).collect())
        }
        _ => Value::Other,
    }
}

fn decode_flexbuffers(payload: &[u8]) -> Result<Vec<(String, Value)>, DecodeError> {
    let root = flexbuffers::Reader::get_root(payload)
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    if root.flexbuffer_type() != FlexBufferType::Map {
        return Err(DecodeError::NotAMap);
    }
    let map = root.as_map();
    let mut fields = Vec::with_capacity(map.len());
    for key in map.iter_keys() {
        let value = map
            .index(key)
            .map(convert_flexbuffers)
            .unwrap_or(Value::Other);
        fields.push((key.to_string(), value));
    }
    Ok(fields)
}

fn convert_flexbuffers(reader: flexbuffers::Reader<&[u8]>) -> Value {
    match reader.flexbuffer_type() {
        FlexBufferType::Bool => Value::Bool(reader.as_bool()),
        FlexBufferType::Int | FlexBufferType::IndirectInt => Value::Int(reader.as_i64()),
        FlexBufferType::UInt | FlexBufferType::IndirectUInt => {
            i64::try_from(reader.as_u64()).map_or(Value::Other, Value::Int)
        }
        FlexBufferType::Float | FlexBufferType::IndirectFloat => Value::Float(reader.as_f64()),
        FlexBufferType::String | FlexBufferType::Key => Value::Str(reader.as_str().to_string()),
        FlexBufferType::Map => Value::Other,
        t if t.is_vector() => {
            Value::Array(reader.as_vector().iter().map(convert_flexbuffers).collect())
        }
        _ => Value::Other,
    }
}

fn decode_json(payload: &[u8]) -> Result<Vec<(String, Value)>, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let serde_json::Value::Object(entries) = value else {
        return Err(DecodeError::NotAMap);
    };
    Ok(entries
        .into_iter()
        .map(|(key, value)| (key, convert_json(value)))
        .collect())
}

fn convert_json(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::Other
            }
        }
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(convert_json).collect())
        }
        _ => Value::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field<'a>(fields: &'a [(String, Value)], name: &str) -> &'a Value {
        &fields.iter().find(|(k, _)| k == name).unwrap().1
    }

    #[test]
    fn msgpack_map_decodes_every_shape() {
        let value = rmpv::Value::Map(vec![
            ("active".into(), rmpv::Value::Boolean(true)),
            ("severity".into(), rmpv::Value::from(5)),
            ("temperature".into(), rmpv::Value::F64(42.5)),
            ("location".into(), rmpv::Value::from("warehouse")),
            (
                "tags".into(),
                rmpv::Value::Array(vec![rmpv::Value::from("a"), rmpv::Value::from(1)]),
            ),
            ("blob".into(), rmpv::Value::Binary(vec![1, 2, 3])),
        ]);
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &value).unwrap();

        let fields = decode_map(BinaryFormat::MsgPack, &buf).unwrap();
        assert_eq!(field(&fields, "active"), &Value::Bool(true));
        assert_eq!(field(&fields, "severity"), &Value::Int(5));
        assert_eq!(field(&fields, "temperature"), &Value::Float(42.5));
        assert_eq!(
            field(&fields, "location"),
            &Value::Str("warehouse".to_string())
        );
        assert_eq!(
            field(&fields, "tags"),
            &Value::Array(vec![Value::Str("a".to_string()), Value::Int(1)])
        );
        assert_eq!(field(&fields, "blob"), &Value::Other);
    }

    #[test]
    fn msgpack_non_map_root_is_rejected() {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &rmpv::Value::Array(vec![rmpv::Value::from(1)]))
            .unwrap();
        assert!(matches!(
            decode_map(BinaryFormat::MsgPack, &buf),
            Err(DecodeError::NotAMap)
        ));
    }

    #[test]
    fn garbage_bytes_are_malformed() {
        assert!(matches!(
            decode_map(BinaryFormat::MsgPack, &[0xc1, 0xff]),
            Err(DecodeError::Malformed(_))
        ));
        assert!(decode_map(BinaryFormat::Json, b"{not json").is_err());
        assert!(decode_map(BinaryFormat::FlexBuffers, &[]).is_err());
    }

    #[test]
    fn cbor_map_decodes() {
        let value = ciborium::Value::Map(vec![
            (
                ciborium::Value::Text("severity".to_string()),
                ciborium::Value::Integer(7.into()),
            ),
            (
                ciborium::Value::Text("ratio".to_string()),
                ciborium::Value::Float(0.5),
            ),
        ]);
        let mut buf = Vec::new();
        ciborium::into_writer(&value, &mut buf).unwrap();

        let fields = decode_map(BinaryFormat::Cbor, &buf).unwrap();
        assert_eq!(field(&fields, "severity"), &Value::Int(7));
        assert_eq!(field(&fields, "ratio"), &Value::Float(0.5));
    }

    #[test]
    fn json_map_decodes() {
        let buf = br#"{"severity": 5, "temperature": 42.5, "tags": ["a", "b"], "extra": null}"#;
        let fields = decode_map(BinaryFormat::Json, buf).unwrap();
        assert_eq!(field(&fields, "severity"), &Value::Int(5));
        assert_eq!(field(&fields, "temperature"), &Value::Float(42.5));
        assert_eq!(
            field(&fields, "tags"),
            &Value::Array(vec![
                Value::Str("a".to_string()),
                Value::Str("b".to_string())
            ])
        );
        assert_eq!(field(&fields, "extra"), &Value::Other);

        assert!(matches!(
            decode_map(BinaryFormat::Json, b"[1, 2]"),
            Err(DecodeError::NotAMap)
        ));
    }

    #[test]
    fn flexbuffers_map_decodes() {
        let mut builder = flexbuffers::Builder::default();
        let mut map = builder.start_map();
        map.push("severity", 5i64);
        map.push("temperature", 42.5f64);
        map.push("location", "warehouse");
        let mut tags = map.start_vector("tags");
        tags.push("a");
        tags.push(9i64);
        tags.end_vector();
        map.end_map();

        let fields = decode_map(BinaryFormat::FlexBuffers, builder.view()).unwrap();
        assert_eq!(field(&fields, "severity"), &Value::Int(5));
        assert_eq!(field(&fields, "temperature"), &Value::Float(42.5));
        assert_eq!(
            field(&fields, "location"),
            &Value::Str("warehouse".to_string())
        );
        assert_eq!(
            field(&fields, "tags"),
            &Value::Array(vec![Value::Str("a".to_string()), Value::Int(9)])
        );
    }

    #[test]
    fn oversized_unsigned_integers_are_other() {
        let value = rmpv::Value::Map(vec![("big".into(), rmpv::Value::from(u64::MAX))]);
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &value).unwrap();
        let fields = decode_map(BinaryFormat::MsgPack, &buf).unwrap();
        assert_eq!(field(&fields, "big"), &Value::Other);
    }
}

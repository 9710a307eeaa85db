//! Value encoding for chunked files: text (UTF-8), binary (bytes + optional MIME
//! type) and typed numeric arrays (little-endian elements).

use serde_json::Value as JsonValue;

use super::types::{ElementType, ValueKind, ValueMeta};
use crate::error::{VaultError, VaultResult};

macro_rules! typed_arrays {
    ($($variant:ident($t:ty)),* $(,)?) => {
        /// Numeric array tagged with its element type.
        #[derive(Debug, Clone, PartialEq)]
        pub enum TypedArray { $($variant(Vec<$t>)),* }

        impl TypedArray {
            pub fn element_type(&self) -> ElementType {
                match self { $(TypedArray::$variant(_) => ElementType::$variant),* }
            }

            pub fn len(&self) -> usize {
                match self { $(TypedArray::$variant(v) => v.len()),* }
            }

            pub fn is_empty(&self) -> bool { self.len() == 0 }

            pub fn to_le_bytes(&self) -> Vec<u8> {
                match self { $(TypedArray::$variant(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect()),* }
            }

            pub fn from_le_bytes(element_type: ElementType, bytes: &[u8]) -> VaultResult<Self> {
                let width = element_type.byte_width();
                if bytes.len() % width != 0 {
                    return Err(VaultError::corrupt(format!(
                        "{} bytes is not a whole number of {:?} elements", bytes.len(), element_type)));
                }
                match element_type {
                    $(ElementType::$variant => Ok(TypedArray::$variant(
                        bytes.chunks_exact(width).map(|c| {
                            let mut raw = [0u8; std::mem::size_of::<$t>()];
                            raw.copy_from_slice(c);
                            <$t>::from_le_bytes(raw)
                        }).collect()
                    ))),*
                }
            }
        }

        $(impl From<Vec<$t>> for TypedArray {
            fn from(v: Vec<$t>) -> Self { TypedArray::$variant(v) }
        })*
    };
}

typed_arrays! {
    I8(i8), U8(u8), I16(i16), U16(u16), I32(i32), U32(u32), I64(i64), U64(u64), F32(f32), F64(f64),
}

/// A value stored in one vault file.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Binary { bytes: Vec<u8>, mime_type: Option<String> },
    Typed(TypedArray),
}

impl Value {
    pub fn binary(bytes: Vec<u8>, mime_type: Option<&str>) -> Self {
        Value::Binary { bytes, mime_type: mime_type.map(str::to_string) }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Text(_) => ValueKind::Text,
            Value::Binary { .. } => ValueKind::Binary,
            Value::Typed(_) => ValueKind::Typed,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self { Value::Text(s) => Some(s), _ => None }
    }

    pub fn into_text(self) -> Option<String> {
        match self { Value::Text(s) => Some(s), _ => None }
    }
}

impl From<&str> for Value { fn from(s: &str) -> Self { Value::Text(s.to_string()) } }
impl From<String> for Value { fn from(s: String) -> Self { Value::Text(s) } }
impl From<Vec<u8>> for Value { fn from(b: Vec<u8>) -> Self { Value::Binary { bytes: b, mime_type: None } } }
impl From<TypedArray> for Value { fn from(t: TypedArray) -> Self { Value::Typed(t) } }

/// Untyped input: strings become text, numeric arrays become typed arrays
/// (i64 when every element is an integer that fits, f64 otherwise).
impl TryFrom<JsonValue> for Value {
    type Error = VaultError;

    fn try_from(v: JsonValue) -> Result<Self, Self::Error> {
        match v {
            JsonValue::String(s) => Ok(Value::Text(s)),
            JsonValue::Array(items) => {
                if let Some(ints) = items.iter().map(JsonValue::as_i64).collect::<Option<Vec<i64>>>() {
                    return Ok(Value::Typed(TypedArray::I64(ints)));
                }
                items.iter().map(JsonValue::as_f64).collect::<Option<Vec<f64>>>()
                    .map(|f| Value::Typed(TypedArray::F64(f)))
                    .ok_or_else(|| VaultError::unsupported("array elements must all be numbers"))
            }
            other => Err(VaultError::unsupported(format!("expected a string or a numeric array, got {}", json_type_name(&other)))),
        }
    }
}

fn json_type_name(v: &JsonValue) -> &'static str {
    match v {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Serialize a value into raw payload bytes plus the metadata needed to decode them.
pub fn encode(value: Value) -> (Vec<u8>, ValueMeta) {
    match value {
        Value::Text(s) => (s.into_bytes(), ValueMeta {
            kind: ValueKind::Text, encoding: Some("utf-8".into()), mime_type: None,
            element_type: None, element_count: None, byte_offset: None,
        }),
        Value::Binary { bytes, mime_type } => (bytes, ValueMeta {
            kind: ValueKind::Binary, encoding: None, mime_type,
            element_type: None, element_count: None, byte_offset: None,
        }),
        Value::Typed(arr) => {
            let meta = ValueMeta {
                kind: ValueKind::Typed, encoding: None, mime_type: None,
                element_type: Some(arr.element_type()), element_count: Some(arr.len() as u64), byte_offset: Some(0),
            };
            (arr.to_le_bytes(), meta)
        }
    }
}

/// Rebuild a value from the concatenated payload of all chunks.
pub fn decode(bytes: Vec<u8>, meta: &ValueMeta) -> VaultResult<Value> {
    match meta.kind {
        ValueKind::Text => String::from_utf8(bytes)
            .map(Value::Text)
            .map_err(|e| VaultError::corrupt(format!("text file is not valid UTF-8: {e}"))),
        ValueKind::Binary => Ok(Value::Binary { bytes, mime_type: meta.mime_type.clone() }),
        ValueKind::Typed => {
            let et = meta.element_type
                .ok_or_else(|| VaultError::corrupt("typed file without element_type"))?;
            let start = (meta.byte_offset.unwrap_or(0) as usize).min(bytes.len());
            Ok(Value::Typed(TypedArray::from_le_bytes(et, &bytes[start..])?))
        }
    }
}

/// Metadata for a file after appending `incoming` to `existing`; `total_len` is the new
/// payload size. Kinds (and element types) must match.
pub fn merged_meta(existing: &ValueMeta, incoming: &ValueMeta, total_len: usize) -> VaultResult<ValueMeta> {
    if existing.kind != incoming.kind {
        return Err(VaultError::unsupported(format!(
            "cannot append {:?} data to a {:?} file", incoming.kind, existing.kind)));
    }
    let mut out = existing.clone();
    if existing.kind == ValueKind::Typed {
        if existing.element_type != incoming.element_type {
            return Err(VaultError::unsupported(format!(
                "cannot append {:?} elements to a {:?} array", incoming.element_type, existing.element_type)));
        }
        let width = existing.element_type.map(|e| e.byte_width()).unwrap_or(1);
        let offset = existing.byte_offset.unwrap_or(0) as usize;
        out.element_count = Some((total_len.saturating_sub(offset) / width) as u64);
    }
    Ok(out)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod codec_tests;

//! Loosely typed msgpack values making up an assembled-chunk container.
//!
//! The container is a flat msgpack array whose element types depend on the
//! position and the format version, so elements are first read as [`Field`]
//! and then checked against the layout by [`FieldReader`].

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::ser::{Serialize, Serializer};

use crate::utils::errors::FormatError;

/// One element of the container array.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Nil,
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float(f64),
    Str(String),
    Bin(Vec<u8>),
}

impl Field {
    pub fn type_name(&self) -> &'static str {
        match self {
            Field::Nil => "nil",
            Field::Bool(_) => "bool",
            Field::UInt(_) => "uint",
            Field::Int(_) => "int",
            Field::Float(_) => "float",
            Field::Str(_) => "str",
            Field::Bin(_) => "bin",
        }
    }
}

struct FieldVisitor;

impl<'de> Visitor<'de> for FieldVisitor {
    type Value = Field;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a msgpack scalar, string or binary value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Field, E> {
        Ok(Field::Nil)
    }

    fn visit_none<E: de::Error>(self) -> Result<Field, E> {
        Ok(Field::Nil)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Field, E> {
        Ok(Field::Bool(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Field, E> {
        Ok(Field::UInt(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Field, E> {
        // msgpack encoders may use signed markers for small non-negative values
        Ok(u64::try_from(v).map_or(Field::Int(v), Field::UInt))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Field, E> {
        Ok(Field::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Field, E> {
        Ok(Field::Str(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Field, E> {
        Ok(Field::Str(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Field, E> {
        Ok(Field::Bin(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Field, E> {
        Ok(Field::Bin(v))
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FieldVisitor)
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Nil => serializer.serialize_unit(),
            Field::Bool(v) => serializer.serialize_bool(*v),
            Field::UInt(v) => serializer.serialize_u64(*v),
            Field::Int(v) => serializer.serialize_i64(*v),
            Field::Float(v) => serializer.serialize_f64(*v),
            Field::Str(v) => serializer.serialize_str(v),
            Field::Bin(v) => serializer.serialize_bytes(v),
        }
    }
}

/// Reads the top-level container array.
///
/// Anything after the array is rejected so that concatenated or padded
/// files are not mistaken for a single chunk.
pub fn read_fields(bytes: &[u8]) -> Result<Vec<Field>, FormatError> {
    let mut cursor = std::io::Cursor::new(bytes);
    let fields = {
        let mut de = rmp_serde::Deserializer::new(&mut cursor);
        Vec::<Field>::deserialize(&mut de).map_err(|e| FormatError::Container(e.to_string()))?
    };

    let consumed = cursor.position() as usize;
    if consumed != bytes.len() {
        return Err(FormatError::TrailingBytes(bytes.len() - consumed));
    }

    Ok(fields)
}

/// Typed, position-checked access to container fields.
///
/// Binary fields are moved out of the reader, so every index is meant to be
/// read once.
pub struct FieldReader {
    fields: Vec<Field>,
}

impl FieldReader {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn get(&self, index: usize, name: &'static str, expected: &'static str) -> Result<&Field, FormatError> {
        self.fields.get(index).ok_or(FormatError::FieldType {
            index,
            name,
            expected,
            found: "nothing",
        })
    }

    pub fn uint(&self, index: usize, name: &'static str) -> Result<u64, FormatError> {
        match self.get(index, name, "uint")? {
            Field::UInt(v) => Ok(*v),
            other => Err(FormatError::FieldType {
                index,
                name,
                expected: "uint",
                found: other.type_name(),
            }),
        }
    }

    pub fn usize(&self, index: usize, name: &'static str) -> Result<usize, FormatError> {
        let value = self.uint(index, name)?;
        usize::try_from(value).map_err(|_| FormatError::InvalidField {
            name,
            value,
            reason: "does not fit the address space",
        })
    }

    pub fn boolean(&self, index: usize, name: &'static str) -> Result<bool, FormatError> {
        match self.get(index, name, "bool")? {
            Field::Bool(v) => Ok(*v),
            other => Err(FormatError::FieldType {
                index,
                name,
                expected: "bool",
                found: other.type_name(),
            }),
        }
    }

    pub fn string(&self, index: usize, name: &'static str) -> Result<String, FormatError> {
        match self.get(index, name, "str")? {
            Field::Str(v) => Ok(v.clone()),
            other => Err(FormatError::FieldType {
                index,
                name,
                expected: "str",
                found: other.type_name(),
            }),
        }
    }

    pub fn take_bin(&mut self, index: usize, name: &'static str) -> Result<Vec<u8>, FormatError> {
        match self.fields.get_mut(index) {
            Some(Field::Bin(v)) => Ok(std::mem::take(v)),
            Some(other) => Err(FormatError::FieldType {
                index,
                name,
                expected: "bin",
                found: other.type_name(),
            }),
            None => Err(FormatError::FieldType {
                index,
                name,
                expected: "bin",
                found: "nothing",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_mixed_array() -> anyhow::Result<()> {
        let fields = vec![
            Field::Str("hdr".into()),
            Field::UInt(2),
            Field::Bool(false),
            Field::Bin(b"abc".to_vec()),
            Field::Int(-3),
            Field::Nil,
        ];
        let bytes = rmp_serde::to_vec(&fields)?;
        assert_eq!(read_fields(&bytes)?, fields);
        Ok(())
    }

    #[test]
    fn ascii_binary_stays_binary() -> anyhow::Result<()> {
        let fields = vec![Field::Bin(b"plain text".to_vec())];
        let bytes = rmp_serde::to_vec(&fields)?;
        assert_eq!(read_fields(&bytes)?, fields);
        Ok(())
    }

    #[test]
    fn rejects_trailing_bytes() -> anyhow::Result<()> {
        let mut bytes = rmp_serde::to_vec(&vec![Field::UInt(1)])?;
        bytes.push(0xC0);
        assert!(matches!(read_fields(&bytes), Err(FormatError::TrailingBytes(1))));
        Ok(())
    }

    #[test]
    fn rejects_non_array() -> anyhow::Result<()> {
        let bytes = rmp_serde::to_vec(&Field::UInt(7))?;
        assert!(matches!(read_fields(&bytes), Err(FormatError::Container(_))));
        assert!(matches!(read_fields(&[]), Err(FormatError::Container(_))));
        Ok(())
    }

    #[test]
    fn typed_access_reports_position() {
        let mut reader = FieldReader::new(vec![Field::Str("x".into()), Field::UInt(5)]);
        assert_eq!(reader.uint(1, "beam").ok(), Some(5));

        match reader.uint(0, "version") {
            Err(FormatError::FieldType {
                index: 0,
                name: "version",
                found: "str",
                ..
            }) => {}
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            reader.take_bin(4, "data"),
            Err(FormatError::FieldType { found: "nothing", .. })
        ));
    }
}

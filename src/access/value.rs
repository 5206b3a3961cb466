use crate::storage::error::{StorageError, StorageResult};
use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;

/// Maximum number of payload bytes stored for a string field.
pub const STRING_LEN: usize = 128;

/// Field types supported by the page layout. Every type has a fixed width.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Int = 1,
    String = 2,
}

impl Type {
    pub fn from_u8(value: u8) -> StorageResult<Self> {
        match value {
            1 => Ok(Type::Int),
            2 => Ok(Type::String),
            _ => Err(StorageError::invalid(format!("Unknown field type: {}", value))),
        }
    }

    /// Encoded width of a field of this type, in bytes.
    pub fn len(&self) -> usize {
        match self {
            Type::Int => 4,
            Type::String => STRING_LEN + 4,
        }
    }

    /// Decodes one field of this type from `reader`.
    pub fn parse<R: Read>(&self, reader: &mut R) -> StorageResult<Field> {
        match self {
            Type::Int => Ok(Field::Int(reader.read_i32::<BigEndian>()?)),
            Type::String => {
                let len = reader.read_i32::<BigEndian>()?;
                if len < 0 || len as usize > STRING_LEN {
                    return Err(StorageError::invalid(format!(
                        "Invalid string length: {}",
                        len
                    )));
                }
                let mut payload = [0u8; STRING_LEN];
                reader.read_exact(&mut payload)?;
                let s = String::from_utf8_lossy(&payload[..len as usize]).into_owned();
                Ok(Field::String(s))
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "INT"),
            Type::String => write!(f, "STRING"),
        }
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Int(i32),
    String(String),
}

impl Field {
    pub fn field_type(&self) -> Type {
        match self {
            Field::Int(_) => Type::Int,
            Field::String(_) => Type::String,
        }
    }

    /// Writes the fixed-width encoding of this field.
    ///
    /// Strings longer than `STRING_LEN` bytes are cut at the last character
    /// boundary that fits.
    pub fn serialize<B: BufMut>(&self, buf: &mut B) {
        match self {
            Field::Int(v) => buf.put_i32(*v),
            Field::String(s) => {
                let mut end = s.len().min(STRING_LEN);
                while !s.is_char_boundary(end) {
                    end -= 1;
                }
                let bytes = &s.as_bytes()[..end];
                buf.put_i32(bytes.len() as i32);
                buf.put_slice(bytes);
                buf.put_bytes(0, STRING_LEN - bytes.len());
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::String(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_type_conversion() -> StorageResult<()> {
        assert_eq!(Type::from_u8(1)?, Type::Int);
        assert_eq!(Type::from_u8(2)?, Type::String);
        assert!(Type::from_u8(99).is_err());
        Ok(())
    }

    #[test]
    fn test_fixed_widths() {
        let mut buf = Vec::new();
        Field::Int(-5).serialize(&mut buf);
        assert_eq!(buf.len(), Type::Int.len());
        assert_eq!(buf, vec![0xFF, 0xFF, 0xFF, 0xFB]);

        let mut buf = Vec::new();
        Field::String("abc".to_string()).serialize(&mut buf);
        assert_eq!(buf.len(), Type::String.len());
        assert_eq!(&buf[..7], &[0, 0, 0, 3, b'a', b'b', b'c']);
        assert!(buf[7..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_parse_string() -> StorageResult<()> {
        let mut buf = Vec::new();
        Field::String("Alice".to_string()).serialize(&mut buf);
        Field::Int(42).serialize(&mut buf);

        let mut cursor = Cursor::new(buf);
        assert_eq!(
            Type::String.parse(&mut cursor)?,
            Field::String("Alice".to_string())
        );
        assert_eq!(Type::Int.parse(&mut cursor)?, Field::Int(42));
        Ok(())
    }

    #[test]
    fn test_long_string_truncated_on_char_boundary() -> StorageResult<()> {
        let long = "é".repeat(100); // 200 bytes
        let mut buf = Vec::new();
        Field::String(long).serialize(&mut buf);
        assert_eq!(buf.len(), Type::String.len());

        match Type::String.parse(&mut Cursor::new(buf))? {
            Field::String(s) => assert_eq!(s, "é".repeat(64)),
            other => panic!("unexpected field {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_parse_rejects_bad_length() {
        let mut buf = vec![0u8; Type::String.len()];
        buf[..4].copy_from_slice(&500i32.to_be_bytes());
        assert!(matches!(
            Type::String.parse(&mut Cursor::new(buf)),
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_parse_short_input_is_io_error() {
        assert!(matches!(
            Type::Int.parse(&mut Cursor::new(vec![0u8; 2])),
            Err(StorageError::Io(_))
        ));
    }
}

use thiserror::Error;

use crate::encoding::value::{
    Field,
    Map,
    Struct,
    TypeCode,
    Value,
    ValueList,
};

/// Maximum nesting depth accepted while decoding, bounding stack use on
/// adversarial input.
pub const MAX_DEPTH: usize = 64;

/// An error produced while decoding the binary wire format.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input: needed {needed} more bytes")]
    UnexpectedEof { needed: usize },
    #[error("unknown type code: {0}")]
    UnknownTypeCode(u8),
    #[error("negative length: {0}")]
    NegativeLength(i32),
    #[error("length {length} exceeds remaining input of {remaining} bytes")]
    LengthTooLarge { length: usize, remaining: usize },
    #[error("value nesting exceeds the depth limit of {0}")]
    DepthLimitExceeded(usize),
    #[error("expected envelope version 0x8001, got {0:#06x}")]
    BadEnvelopeVersion(u16),
    #[error("unknown envelope kind: {0}")]
    UnknownEnvelopeKind(u8),
    #[error("envelope name is not valid UTF-8")]
    InvalidEnvelopeName,
    #[error("{found} trailing bytes after the decoded value")]
    TrailingBytes { found: usize },
}

/// A cursor over input bytes that reports truncation as typed errors.
#[derive(Debug)]
pub struct BytesReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BytesReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof {
                needed: len - self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(u64::from_be_bytes(
            self.take(8)?.try_into().unwrap(),
        )))
    }

    /// Reads a signed 32-bit length and validates it against the remaining
    /// input, treating each pending element as at least one byte.
    pub fn read_length(&mut self) -> Result<usize, DecodeError> {
        let length = self.read_i32()?;
        if length < 0 {
            return Err(DecodeError::NegativeLength(length));
        }
        let length = length as usize;
        if length > self.remaining() {
            return Err(DecodeError::LengthTooLarge {
                length,
                remaining: self.remaining(),
            });
        }
        Ok(length)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.take(len)
    }
}

/// Encodes a value in the binary wire format.
pub fn write_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Bool(value) => out.push(u8::from(*value)),
        Value::I8(value) => out.push(*value as u8),
        Value::Double(value) => out.extend_from_slice(&value.to_bits().to_be_bytes()),
        Value::I16(value) => out.extend_from_slice(&value.to_be_bytes()),
        Value::I32(value) => out.extend_from_slice(&value.to_be_bytes()),
        Value::I64(value) => out.extend_from_slice(&value.to_be_bytes()),
        Value::Binary(bytes) => {
            out.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
            out.extend_from_slice(bytes);
        }
        Value::Struct(value) => {
            for field in &value.fields {
                out.push(field.value.type_code().byte());
                out.extend_from_slice(&field.id.to_be_bytes());
                write_value(&field.value, out);
            }
            out.push(0);
        }
        Value::Map(map) => {
            out.push(map.key_type.byte());
            out.push(map.value_type.byte());
            out.extend_from_slice(&(map.entries.len() as i32).to_be_bytes());
            for (key, value) in &map.entries {
                write_value(key, out);
                write_value(value, out);
            }
        }
        Value::Set(list) | Value::List(list) => {
            out.push(list.value_type.byte());
            out.extend_from_slice(&(list.values.len() as i32).to_be_bytes());
            for value in &list.values {
                write_value(value, out);
            }
        }
    }
}

fn read_type_code(reader: &mut BytesReader) -> Result<TypeCode, DecodeError> {
    let byte = reader.read_u8()?;
    TypeCode::from_byte(byte).ok_or(DecodeError::UnknownTypeCode(byte))
}

/// Decodes a value of the given type from the binary wire format.
pub fn read_value(
    reader: &mut BytesReader,
    type_code: TypeCode,
    depth: usize,
) -> Result<Value, DecodeError> {
    if depth >= MAX_DEPTH {
        return Err(DecodeError::DepthLimitExceeded(MAX_DEPTH));
    }
    match type_code {
        TypeCode::Bool => Ok(Value::Bool(reader.read_u8()? != 0)),
        TypeCode::I8 => Ok(Value::I8(reader.read_u8()? as i8)),
        TypeCode::Double => Ok(Value::Double(reader.read_f64()?)),
        TypeCode::I16 => Ok(Value::I16(reader.read_i16()?)),
        TypeCode::I32 => Ok(Value::I32(reader.read_i32()?)),
        TypeCode::I64 => Ok(Value::I64(reader.read_i64()?)),
        TypeCode::Binary => {
            let length = reader.read_length()?;
            Ok(Value::Binary(reader.read_bytes(length)?.to_vec()))
        }
        TypeCode::Struct => {
            let mut fields = Vec::new();
            loop {
                let byte = reader.read_u8()?;
                if byte == 0 {
                    break;
                }
                let field_type =
                    TypeCode::from_byte(byte).ok_or(DecodeError::UnknownTypeCode(byte))?;
                let id = reader.read_i16()?;
                let value = read_value(reader, field_type, depth + 1)?;
                fields.push(Field { id, value });
            }
            Ok(Value::Struct(Struct { fields }))
        }
        TypeCode::Map => {
            let key_type = read_type_code(reader)?;
            let value_type = read_type_code(reader)?;
            let length = reader.read_length()?;
            let mut entries = Vec::with_capacity(length.min(reader.remaining()));
            for _ in 0..length {
                let key = read_value(reader, key_type, depth + 1)?;
                let value = read_value(reader, value_type, depth + 1)?;
                entries.push((key, value));
            }
            Ok(Value::Map(Map {
                key_type,
                value_type,
                entries,
            }))
        }
        TypeCode::Set | TypeCode::List => {
            let value_type = read_type_code(reader)?;
            let length = reader.read_length()?;
            let mut values = Vec::with_capacity(length.min(reader.remaining()));
            for _ in 0..length {
                values.push(read_value(reader, value_type, depth + 1)?);
            }
            let list = ValueList { value_type, values };
            Ok(match type_code {
                TypeCode::Set => Value::Set(list),
                _ => Value::List(list),
            })
        }
    }
}

/// Decodes a top-level struct, the shape of every request and response body.
pub fn read_struct(reader: &mut BytesReader) -> Result<Value, DecodeError> {
    read_value(reader, TypeCode::Struct, 0)
}

#[cfg(test)]
mod binary_test {
    use pretty_assertions::assert_eq;

    use crate::encoding::{
        binary::{
            BytesReader,
            DecodeError,
            read_struct,
            read_value,
            write_value,
        },
        value::{
            Map,
            Struct,
            TypeCode,
            Value,
            ValueList,
        },
    };

    fn round_trip(value: Value) {
        let mut out = Vec::new();
        write_value(&value, &mut out);
        let mut reader = BytesReader::new(&out);
        let decoded = read_value(&mut reader, value.type_code(), 0).unwrap();
        assert_eq!(reader.remaining(), 0);
        assert_eq!(decoded, value);
    }

    #[test]
    fn round_trips_scalars() {
        round_trip(Value::Bool(true));
        round_trip(Value::I8(-4));
        round_trip(Value::Double(6.25));
        round_trip(Value::I16(-513));
        round_trip(Value::I32(1 << 30));
        round_trip(Value::I64(-(1 << 40)));
        round_trip(Value::string("hello"));
    }

    #[test]
    fn round_trips_containers() {
        round_trip(Value::Struct(
            Struct::new()
                .with_field(1, Value::string("great sadness"))
                .with_field(
                    2,
                    Value::List(ValueList {
                        value_type: TypeCode::I32,
                        values: vec![Value::I32(1), Value::I32(2)],
                    }),
                )
                .with_field(
                    3,
                    Value::Map(Map {
                        key_type: TypeCode::Binary,
                        value_type: TypeCode::I64,
                        entries: vec![(Value::string("k"), Value::I64(9))],
                    }),
                ),
        ));
    }

    #[test]
    fn empty_containers_keep_their_element_types() {
        round_trip(Value::Set(ValueList {
            value_type: TypeCode::Double,
            values: Vec::new(),
        }));
        round_trip(Value::Map(Map {
            key_type: TypeCode::I16,
            value_type: TypeCode::Struct,
            entries: Vec::new(),
        }));
    }

    #[test]
    fn empty_struct_is_a_single_stop_byte() {
        let mut out = Vec::new();
        write_value(&Value::Struct(Struct::new()), &mut out);
        assert_eq!(out, vec![0x00]);
    }

    #[test]
    fn truncated_input_fails_without_panicking() {
        let mut out = Vec::new();
        write_value(
            &Value::Struct(Struct::new().with_field(1, Value::I64(42))),
            &mut out,
        );
        for len in 0..out.len() {
            let mut reader = BytesReader::new(&out[..len]);
            assert_matches::assert_matches!(
                read_struct(&mut reader),
                Err(DecodeError::UnexpectedEof { .. })
            );
        }
    }

    #[test]
    fn rejects_unknown_type_codes() {
        let mut reader = BytesReader::new(&[0x63, 0x00, 0x01, 0x00]);
        assert_matches::assert_matches!(
            read_struct(&mut reader),
            Err(DecodeError::UnknownTypeCode(0x63))
        );
    }

    #[test]
    fn rejects_oversized_lengths() {
        // Binary field claiming 1000 bytes with none following.
        let bytes = [0x0b, 0x00, 0x01, 0x00, 0x00, 0x03, 0xe8];
        let mut reader = BytesReader::new(&bytes);
        assert_matches::assert_matches!(
            read_struct(&mut reader),
            Err(DecodeError::LengthTooLarge {
                length: 1000,
                remaining: 0
            })
        );
    }

    #[test]
    fn rejects_negative_lengths() {
        let bytes = [0x0b, 0x00, 0x01, 0xff, 0xff, 0xff, 0xff];
        let mut reader = BytesReader::new(&bytes);
        assert_matches::assert_matches!(
            read_struct(&mut reader),
            Err(DecodeError::NegativeLength(-1))
        );
    }

    #[test]
    fn bounds_nesting_depth() {
        // A struct nested deeper than the decoder allows.
        let mut bytes = Vec::new();
        for _ in 0..100 {
            bytes.extend_from_slice(&[0x0c, 0x00, 0x01]);
        }
        let mut reader = BytesReader::new(&bytes);
        assert_matches::assert_matches!(
            read_struct(&mut reader),
            Err(DecodeError::DepthLimitExceeded(_))
        );
    }
}

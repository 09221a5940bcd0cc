/// Wire type codes of the structural binary protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Bool,
    I8,
    Double,
    I16,
    I32,
    I64,
    Binary,
    Struct,
    Map,
    Set,
    List,
}

impl TypeCode {
    /// The on-wire byte for this type.
    pub fn byte(self) -> u8 {
        match self {
            Self::Bool => 2,
            Self::I8 => 3,
            Self::Double => 4,
            Self::I16 => 6,
            Self::I32 => 8,
            Self::I64 => 10,
            Self::Binary => 11,
            Self::Struct => 12,
            Self::Map => 13,
            Self::Set => 14,
            Self::List => 15,
        }
    }

    /// Decodes an on-wire type byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            2 => Some(Self::Bool),
            3 => Some(Self::I8),
            4 => Some(Self::Double),
            6 => Some(Self::I16),
            8 => Some(Self::I32),
            10 => Some(Self::I64),
            11 => Some(Self::Binary),
            12 => Some(Self::Struct),
            13 => Some(Self::Map),
            14 => Some(Self::Set),
            15 => Some(Self::List),
            _ => None,
        }
    }
}

/// A single field of a [`Struct`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub id: i16,
    pub value: Value,
}

/// A structural value made of identified fields.
///
/// Field order is preserved for encoding; lookups scan, since structs on the
/// wire are small.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Struct {
    pub fields: Vec<Field>,
}

impl Struct {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field, builder style.
    pub fn with_field(mut self, id: i16, value: Value) -> Self {
        self.fields.push(Field { id, value });
        self
    }

    /// The value of the field with the given ID, if present.
    pub fn field(&self, id: i16) -> Option<&Value> {
        self.fields
            .iter()
            .find(|field| field.id == id)
            .map(|field| &field.value)
    }
}

/// A map value, carrying its declared key and value types so empty maps
/// round-trip exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct Map {
    pub key_type: TypeCode,
    pub value_type: TypeCode,
    pub entries: Vec<(Value, Value)>,
}

/// A list or set value, carrying its declared element type so empty
/// collections round-trip exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueList {
    pub value_type: TypeCode,
    pub values: Vec<Value>,
}

/// A value of the structural binary protocol.
///
/// Strings are represented as [`Value::Binary`]; the wire format does not
/// distinguish text from bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    Double(f64),
    I16(i16),
    I32(i32),
    I64(i64),
    Binary(Vec<u8>),
    Struct(Struct),
    Map(Map),
    Set(ValueList),
    List(ValueList),
}

impl Value {
    /// The wire type of this value.
    pub fn type_code(&self) -> TypeCode {
        match self {
            Self::Bool(_) => TypeCode::Bool,
            Self::I8(_) => TypeCode::I8,
            Self::Double(_) => TypeCode::Double,
            Self::I16(_) => TypeCode::I16,
            Self::I32(_) => TypeCode::I32,
            Self::I64(_) => TypeCode::I64,
            Self::Binary(_) => TypeCode::Binary,
            Self::Struct(_) => TypeCode::Struct,
            Self::Map(_) => TypeCode::Map,
            Self::Set(_) => TypeCode::Set,
            Self::List(_) => TypeCode::List,
        }
    }

    /// A binary value holding UTF-8 text.
    pub fn string<S>(value: S) -> Self
    where
        S: Into<String>,
    {
        Self::Binary(value.into().into_bytes())
    }

    /// Interprets a binary value as UTF-8 text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Binary(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I32(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod value_test {
    use crate::encoding::value::{
        Struct,
        TypeCode,
        Value,
    };

    #[test]
    fn type_bytes_round_trip() {
        for code in [
            TypeCode::Bool,
            TypeCode::I8,
            TypeCode::Double,
            TypeCode::I16,
            TypeCode::I32,
            TypeCode::I64,
            TypeCode::Binary,
            TypeCode::Struct,
            TypeCode::Map,
            TypeCode::Set,
            TypeCode::List,
        ] {
            assert_eq!(TypeCode::from_byte(code.byte()), Some(code));
        }
        assert_eq!(TypeCode::from_byte(0), None);
        assert_eq!(TypeCode::from_byte(255), None);
    }

    #[test]
    fn struct_field_lookup() {
        let value = Struct::new()
            .with_field(1, Value::string("great sadness"))
            .with_field(2, Value::I32(7));
        assert_eq!(value.field(1).and_then(Value::as_str), Some("great sadness"));
        assert_eq!(value.field(2).and_then(Value::as_i32), Some(7));
        assert_eq!(value.field(3), None);
    }
}

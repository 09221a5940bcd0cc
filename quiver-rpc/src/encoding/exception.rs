use std::fmt::Display;

use crate::encoding::value::{
    Struct,
    Value,
};

/// Protocol-level exception kinds carried in an Exception envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    Unknown,
    UnknownMethod,
    InvalidMessageType,
    WrongMethodName,
    BadSequenceID,
    MissingResult,
    InternalError,
    ProtocolError,
    InvalidTransform,
    InvalidProtocol,
    UnsupportedClientType,
}

impl ExceptionKind {
    /// The on-wire value of this kind.
    pub fn wire_value(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::UnknownMethod => 1,
            Self::InvalidMessageType => 2,
            Self::WrongMethodName => 3,
            Self::BadSequenceID => 4,
            Self::MissingResult => 5,
            Self::InternalError => 6,
            Self::ProtocolError => 7,
            Self::InvalidTransform => 8,
            Self::InvalidProtocol => 9,
            Self::UnsupportedClientType => 10,
        }
    }

    /// Decodes an on-wire value. Unrecognized values classify as
    /// [`ExceptionKind::Unknown`] so new remote kinds do not fail decoding.
    pub fn from_wire_value(value: i32) -> Self {
        match value {
            1 => Self::UnknownMethod,
            2 => Self::InvalidMessageType,
            3 => Self::WrongMethodName,
            4 => Self::BadSequenceID,
            5 => Self::MissingResult,
            6 => Self::InternalError,
            7 => Self::ProtocolError,
            8 => Self::InvalidTransform,
            9 => Self::InvalidProtocol,
            10 => Self::UnsupportedClientType,
            _ => Self::Unknown,
        }
    }
}

impl Display for ExceptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown",
            Self::UnknownMethod => "UnknownMethod",
            Self::InvalidMessageType => "InvalidMessageType",
            Self::WrongMethodName => "WrongMethodName",
            Self::BadSequenceID => "BadSequenceID",
            Self::MissingResult => "MissingResult",
            Self::InternalError => "InternalError",
            Self::ProtocolError => "ProtocolError",
            Self::InvalidTransform => "InvalidTransform",
            Self::InvalidProtocol => "InvalidProtocol",
            Self::UnsupportedClientType => "UnsupportedClientType",
        };
        f.write_str(name)
    }
}

/// The exception structure carried as the payload of an Exception envelope.
///
/// Field 1 is the optional message, field 2 the optional kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationException {
    pub message: Option<String>,
    pub kind: Option<ExceptionKind>,
}

impl ApplicationException {
    /// Encodes the exception as its wire struct.
    pub fn to_value(&self) -> Value {
        let mut value = Struct::new();
        if let Some(message) = &self.message {
            value = value.with_field(1, Value::string(message.clone()));
        }
        if let Some(kind) = self.kind {
            value = value.with_field(2, Value::I32(kind.wire_value()));
        }
        Value::Struct(value)
    }

    /// Decodes the exception from its wire struct.
    ///
    /// Unknown fields are ignored; both known fields are optional.
    pub fn from_value(value: &Value) -> Self {
        let mut exception = Self::default();
        if let Some(fields) = value.as_struct() {
            exception.message = fields
                .field(1)
                .and_then(Value::as_str)
                .map(str::to_owned);
            exception.kind = fields
                .field(2)
                .and_then(Value::as_i32)
                .map(ExceptionKind::from_wire_value);
        }
        exception
    }
}

impl Display for ApplicationException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(message) = &self.message {
            parts.push(format!("Message: {message}"));
        }
        if let Some(kind) = self.kind {
            parts.push(format!("Type: {kind}"));
        }
        write!(f, "TApplicationException{{{}}}", parts.join(", "))
    }
}

impl std::error::Error for ApplicationException {}

#[cfg(test)]
mod exception_test {
    use crate::encoding::exception::{
        ApplicationException,
        ExceptionKind,
    };

    #[test]
    fn displays_present_fields_only() {
        assert_eq!(
            ApplicationException {
                message: Some("great sadness".to_owned()),
                kind: Some(ExceptionKind::ProtocolError),
            }
            .to_string(),
            "TApplicationException{Message: great sadness, Type: ProtocolError}",
        );
        assert_eq!(
            ApplicationException {
                message: None,
                kind: Some(ExceptionKind::UnknownMethod),
            }
            .to_string(),
            "TApplicationException{Type: UnknownMethod}",
        );
        assert_eq!(
            ApplicationException::default().to_string(),
            "TApplicationException{}",
        );
    }

    #[test]
    fn wire_values_round_trip() {
        for value in 0..=10 {
            let kind = ExceptionKind::from_wire_value(value);
            assert_eq!(kind.wire_value(), value);
        }
        assert_eq!(ExceptionKind::from_wire_value(99), ExceptionKind::Unknown);
    }

    #[test]
    fn struct_codec_round_trips() {
        let exception = ApplicationException {
            message: Some("great sadness".to_owned()),
            kind: Some(ExceptionKind::ProtocolError),
        };
        let decoded = ApplicationException::from_value(&exception.to_value());
        assert_eq!(decoded, exception);
    }
}

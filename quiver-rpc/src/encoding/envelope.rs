use std::fmt::Display;

use crate::encoding::{
    binary::{
        BytesReader,
        DecodeError,
        read_struct,
        write_value,
    },
    value::Value,
};

/// The kind of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    /// A request expecting a reply.
    Call,
    /// A successful response to a call.
    Reply,
    /// A protocol-level failure response to a call.
    Exception,
    /// A request expecting no reply.
    OneWay,
}

impl EnvelopeKind {
    pub fn byte(self) -> u8 {
        match self {
            Self::Call => 1,
            Self::Reply => 2,
            Self::Exception => 3,
            Self::OneWay => 4,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Call),
            2 => Some(Self::Reply),
            3 => Some(Self::Exception),
            4 => Some(Self::OneWay),
            _ => None,
        }
    }
}

impl Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Call => "Call",
            Self::Reply => "Reply",
            Self::Exception => "Exception",
            Self::OneWay => "OneWay",
        };
        f.write_str(name)
    }
}

/// A framed payload carrying its procedure name, sequence id, and kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The method name; with multiplexing, prefixed by `"<service>:"`.
    pub name: String,
    /// Correlates replies with calls on multiplexed connections.
    pub seq_id: i32,
    pub kind: EnvelopeKind,
    pub value: Value,
}

/// The version word of the strict envelope layout, packed with the kind in
/// the low byte.
pub const ENVELOPE_VERSION_1: u16 = 0x8001;

/// Whether the input begins with the strict envelope magic.
///
/// The peek is bounded: only the first two bytes are examined, and inputs
/// shorter than that are not enveloped. A bare struct can never begin with
/// `0x80` since that is not a field type code.
pub fn is_enveloped(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x80 && bytes[1] == 0x01
}

/// Writes the strict envelope framing around the payload.
pub fn write_envelope(envelope: &Envelope, out: &mut Vec<u8>) {
    write_envelope_parts(
        &envelope.name,
        envelope.seq_id,
        envelope.kind,
        &envelope.value,
        out,
    );
}

/// Writes the strict envelope framing from its individual parts.
pub fn write_envelope_parts(
    name: &str,
    seq_id: i32,
    kind: EnvelopeKind,
    value: &Value,
    out: &mut Vec<u8>,
) {
    out.extend_from_slice(&ENVELOPE_VERSION_1.to_be_bytes());
    out.push(0);
    out.push(kind.byte());
    out.extend_from_slice(&(name.len() as i32).to_be_bytes());
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(&seq_id.to_be_bytes());
    write_value(value, out);
}

/// Reads a strict envelope and its payload struct.
pub fn read_envelope(reader: &mut BytesReader) -> Result<Envelope, DecodeError> {
    let version = u16::from_be_bytes([reader.read_u8()?, reader.read_u8()?]);
    if version != ENVELOPE_VERSION_1 {
        return Err(DecodeError::BadEnvelopeVersion(version));
    }
    // Reserved byte, then the kind.
    reader.read_u8()?;
    let kind_byte = reader.read_u8()?;
    let kind =
        EnvelopeKind::from_byte(kind_byte).ok_or(DecodeError::UnknownEnvelopeKind(kind_byte))?;
    let name_length = reader.read_length()?;
    let name = std::str::from_utf8(reader.read_bytes(name_length)?)
        .map_err(|_| DecodeError::InvalidEnvelopeName)?
        .to_owned();
    let seq_id = reader.read_i32()?;
    let value = read_struct(reader)?;
    Ok(Envelope {
        name,
        seq_id,
        kind,
        value,
    })
}

/// Prepends the multiplex prefix to an envelope name.
pub fn multiplex_name(service: &str, name: &str) -> String {
    format!("{service}:{name}")
}

/// Strips a multiplex prefix from an envelope name, if one is present.
pub fn strip_multiplex_name(name: &str) -> &str {
    match name.split_once(':') {
        Some((_, method)) => method,
        None => name,
    }
}

#[cfg(test)]
mod envelope_test {
    use pretty_assertions::assert_eq;

    use crate::encoding::{
        binary::{
            BytesReader,
            DecodeError,
        },
        envelope::{
            Envelope,
            EnvelopeKind,
            is_enveloped,
            multiplex_name,
            read_envelope,
            strip_multiplex_name,
            write_envelope,
        },
        value::{
            Struct,
            Value,
        },
    };

    #[test]
    fn encodes_the_documented_byte_layout() {
        let envelope = Envelope {
            name: "someMethod".to_owned(),
            seq_id: 1,
            kind: EnvelopeKind::Call,
            value: Value::Struct(Struct::new()),
        };
        let mut out = Vec::new();
        write_envelope(&envelope, &mut out);

        let mut expected = vec![0x80, 0x01, 0x00, 0x01];
        expected.extend_from_slice(&[0x00, 0x00, 0x00, 0x0A]);
        expected.extend_from_slice(b"someMethod");
        expected.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        expected.push(0x00);
        assert_eq!(out, expected);
    }

    #[test]
    fn round_trips_all_kinds() {
        for kind in [
            EnvelopeKind::Call,
            EnvelopeKind::Reply,
            EnvelopeKind::Exception,
            EnvelopeKind::OneWay,
        ] {
            let envelope = Envelope {
                name: "Store:put".to_owned(),
                seq_id: -7,
                kind,
                value: Value::Struct(Struct::new().with_field(1, Value::I32(3))),
            };
            let mut out = Vec::new();
            write_envelope(&envelope, &mut out);
            assert!(is_enveloped(&out));
            let decoded = read_envelope(&mut BytesReader::new(&out)).unwrap();
            assert_eq!(decoded, envelope);
        }
    }

    #[test]
    fn peek_is_bounded_and_exact() {
        assert!(!is_enveloped(&[]));
        assert!(!is_enveloped(&[0x80]));
        assert!(!is_enveloped(&[0x00]));
        // A bare struct with one bool field does not look like an envelope.
        assert!(!is_enveloped(&[0x02, 0x00, 0x01, 0x01, 0x00]));
        assert!(is_enveloped(&[0x80, 0x01]));
    }

    #[test]
    fn rejects_foreign_versions() {
        let bytes = [0x70, 0x01, 0x00, 0x01];
        assert_matches::assert_matches!(
            read_envelope(&mut BytesReader::new(&bytes)),
            Err(DecodeError::BadEnvelopeVersion(0x7001))
        );
    }

    #[test]
    fn multiplex_prefix_round_trips() {
        let name = multiplex_name("Store", "put");
        assert_eq!(name, "Store:put");
        assert_eq!(strip_multiplex_name(&name), "put");
        assert_eq!(strip_multiplex_name("put"), "put");
    }
}

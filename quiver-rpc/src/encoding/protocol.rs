use std::fmt::Debug;

use anyhow::{
    Error,
    Result,
};

use crate::encoding::{
    binary::{
        BytesReader,
        read_struct,
        write_value,
    },
    envelope::{
        Envelope,
        EnvelopeKind,
        is_enveloped,
        read_envelope,
        write_envelope,
        write_envelope_parts,
    },
    errors::UnexpectedEnvelopeKind,
    value::Value,
};

/// A protocol over the structural binary wire format.
///
/// The capability set covers both framings: bare top-level values and
/// enveloped payloads.
pub trait Protocol: Send + Sync + Debug {
    /// Encodes a bare value.
    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> Result<()>;

    /// Decodes a bare top-level struct.
    fn decode(&self, bytes: &[u8]) -> Result<Value>;

    /// Encodes an enveloped payload.
    fn encode_enveloped(&self, envelope: &Envelope, out: &mut Vec<u8>) -> Result<()>;

    /// Decodes an enveloped payload.
    fn decode_enveloped(&self, bytes: &[u8]) -> Result<Envelope>;
}

/// The plain binary protocol: what is written is exactly what is read.
#[derive(Debug, Default, Clone, Copy)]
pub struct Binary {}

impl Protocol for Binary {
    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> Result<()> {
        write_value(value, out);
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        let mut reader = BytesReader::new(bytes);
        let value = read_struct(&mut reader)?;
        Ok(value)
    }

    fn encode_enveloped(&self, envelope: &Envelope, out: &mut Vec<u8>) -> Result<()> {
        write_envelope(envelope, out);
        Ok(())
    }

    fn decode_enveloped(&self, bytes: &[u8]) -> Result<Envelope> {
        let mut reader = BytesReader::new(bytes);
        let envelope = read_envelope(&mut reader)?;
        Ok(envelope)
    }
}

/// A protocol for peers that always write enveloped payloads while the local
/// layer works with bare values: decoding strips the envelope, encoding is
/// identical to [`Binary`].
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvelopeStripping {}

impl Protocol for EnvelopeStripping {
    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> Result<()> {
        write_value(value, out);
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        let mut reader = BytesReader::new(bytes);
        let envelope = read_envelope(&mut reader)?;
        Ok(envelope.value)
    }

    fn encode_enveloped(&self, envelope: &Envelope, out: &mut Vec<u8>) -> Result<()> {
        write_envelope(envelope, out);
        Ok(())
    }

    fn decode_enveloped(&self, bytes: &[u8]) -> Result<Envelope> {
        let mut reader = BytesReader::new(bytes);
        let envelope = read_envelope(&mut reader)?;
        Ok(envelope)
    }
}

/// Frames the response to a request whose own framing was discovered at
/// decode time, so replies always match what the peer sent.
pub trait Responder: Send + Sync + Debug {
    fn encode_response(&self, value: &Value, kind: EnvelopeKind, out: &mut Vec<u8>) -> Result<()>;
}

/// Responder for requests that arrived inside a strict envelope; replies are
/// framed with the remembered name and sequence id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeV1Responder {
    pub name: String,
    pub seq_id: i32,
}

impl Responder for EnvelopeV1Responder {
    fn encode_response(&self, value: &Value, kind: EnvelopeKind, out: &mut Vec<u8>) -> Result<()> {
        write_envelope_parts(&self.name, self.seq_id, kind, value, out);
        Ok(())
    }
}

/// Responder for requests that arrived as bare structs; replies are bare
/// structs as well.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NoEnvelopeResponder {}

impl Responder for NoEnvelopeResponder {
    fn encode_response(&self, value: &Value, _: EnvelopeKind, out: &mut Vec<u8>) -> Result<()> {
        write_value(value, out);
        Ok(())
    }
}

/// Decodes a request body whose framing is unknown ahead of time.
///
/// Input beginning with the strict envelope magic is consumed as an envelope
/// whose kind must match `expected`; anything else is decoded as a bare
/// struct. The returned responder frames the reply to match.
pub fn decode_request(
    expected: EnvelopeKind,
    bytes: &[u8],
) -> Result<(Value, Box<dyn Responder>)> {
    if is_enveloped(bytes) {
        let mut reader = BytesReader::new(bytes);
        let envelope = read_envelope(&mut reader)?;
        if envelope.kind != expected {
            return Err(Error::new(UnexpectedEnvelopeKind(envelope.kind)));
        }
        Ok((
            envelope.value,
            Box::new(EnvelopeV1Responder {
                name: envelope.name,
                seq_id: envelope.seq_id,
            }),
        ))
    } else {
        let mut reader = BytesReader::new(bytes);
        let value = read_struct(&mut reader)?;
        Ok((value, Box::new(NoEnvelopeResponder {})))
    }
}

#[cfg(test)]
mod protocol_test {
    use crate::encoding::{
        envelope::{
            Envelope,
            EnvelopeKind,
        },
        errors::UnexpectedEnvelopeKind,
        protocol::{
            Binary,
            EnvelopeStripping,
            Protocol,
            decode_request,
        },
        value::{
            Struct,
            Value,
        },
    };

    fn payload() -> Value {
        Value::Struct(Struct::new().with_field(1, Value::string("body")))
    }

    #[test]
    fn binary_round_trips_both_framings() {
        let protocol = Binary::default();

        let mut bare = Vec::new();
        protocol.encode(&payload(), &mut bare).unwrap();
        assert_eq!(protocol.decode(&bare).unwrap(), payload());

        let envelope = Envelope {
            name: "someMethod".to_owned(),
            seq_id: 42,
            kind: EnvelopeKind::Call,
            value: payload(),
        };
        let mut enveloped = Vec::new();
        protocol.encode_enveloped(&envelope, &mut enveloped).unwrap();
        assert_eq!(protocol.decode_enveloped(&enveloped).unwrap(), envelope);
    }

    #[test]
    fn stripping_protocol_exposes_the_payload() {
        let envelope = Envelope {
            name: "someMethod".to_owned(),
            seq_id: 1,
            kind: EnvelopeKind::Reply,
            value: payload(),
        };
        let mut enveloped = Vec::new();
        EnvelopeStripping::default()
            .encode_enveloped(&envelope, &mut enveloped)
            .unwrap();
        assert_eq!(
            EnvelopeStripping::default().decode(&enveloped).unwrap(),
            payload(),
        );
    }

    #[test]
    fn agnostic_decode_detects_envelopes() {
        let envelope = Envelope {
            name: "someMethod".to_owned(),
            seq_id: 7,
            kind: EnvelopeKind::Call,
            value: payload(),
        };
        let mut enveloped = Vec::new();
        Binary::default()
            .encode_enveloped(&envelope, &mut enveloped)
            .unwrap();

        let (value, responder) = decode_request(EnvelopeKind::Call, &enveloped).unwrap();
        assert_eq!(value, payload());

        // The reply is framed with the remembered name and sequence id.
        let mut reply = Vec::new();
        responder
            .encode_response(&payload(), EnvelopeKind::Reply, &mut reply)
            .unwrap();
        let decoded = Binary::default().decode_enveloped(&reply).unwrap();
        assert_eq!(decoded.name, "someMethod");
        assert_eq!(decoded.seq_id, 7);
        assert_eq!(decoded.kind, EnvelopeKind::Reply);
    }

    #[test]
    fn agnostic_decode_handles_bare_structs() {
        let mut bare = Vec::new();
        Binary::default().encode(&payload(), &mut bare).unwrap();

        let (value, responder) = decode_request(EnvelopeKind::Call, &bare).unwrap();
        assert_eq!(value, payload());

        let mut reply = Vec::new();
        responder
            .encode_response(&payload(), EnvelopeKind::Reply, &mut reply)
            .unwrap();
        assert_eq!(Binary::default().decode(&reply).unwrap(), payload());
    }

    #[test]
    fn agnostic_decode_rejects_unexpected_kinds() {
        let envelope = Envelope {
            name: "someMethod".to_owned(),
            seq_id: 1,
            kind: EnvelopeKind::Reply,
            value: payload(),
        };
        let mut enveloped = Vec::new();
        Binary::default()
            .encode_enveloped(&envelope, &mut enveloped)
            .unwrap();
        assert_matches::assert_matches!(
            decode_request(EnvelopeKind::Call, &enveloped),
            Err(err) => {
                assert_matches::assert_matches!(
                    err.downcast_ref::<UnexpectedEnvelopeKind>(),
                    Some(UnexpectedEnvelopeKind(EnvelopeKind::Reply))
                );
            }
        );
    }
}

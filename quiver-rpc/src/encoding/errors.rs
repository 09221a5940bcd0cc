use std::fmt::Display;

use thiserror::Error;

use crate::{
    core::{
        error::RpcError,
        request::Request,
    },
    encoding::{
        ENCODING,
        envelope::EnvelopeKind,
        exception::ApplicationException,
    },
};

/// A body carried an envelope kind that is not valid in its position.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("unexpected envelope type: {0}")]
pub struct UnexpectedEnvelopeKind(pub EnvelopeKind);

/// A remote responded with a protocol-level exception envelope.
#[derive(Debug, Error, PartialEq, Eq)]
#[error(
    "thrift request to procedure \"{procedure}\" of service \"{service}\" encountered an internal failure: {exception}"
)]
pub struct ApplicationExceptionError {
    pub service: String,
    pub procedure: String,
    pub exception: ApplicationException,
}

fn body_error<E>(op: &str, entity: &str, request: &Request, cause: E) -> RpcError
where
    E: Display,
{
    RpcError::invalid_argument(format!(
        "failed to {op} \"{ENCODING}\" {entity} body for procedure \"{procedure}\" of service \"{service}\": {cause}",
        procedure = request.procedure,
        service = request.service,
    ))
}

/// The request body could not be encoded for the wire.
pub fn request_body_encode_error<E: Display>(request: &Request, cause: E) -> RpcError {
    body_error("encode", "request", request, cause)
}

/// The request body could not be decoded from the wire.
pub fn request_body_decode_error<E: Display>(request: &Request, cause: E) -> RpcError {
    body_error("decode", "request", request, cause)
}

/// The response body could not be encoded for the wire.
pub fn response_body_encode_error<E: Display>(request: &Request, cause: E) -> RpcError {
    RpcError::internal(format!(
        "failed to encode \"{ENCODING}\" response body for procedure \"{procedure}\" of service \"{service}\": {cause}",
        procedure = request.procedure,
        service = request.service,
    ))
}

/// The response body could not be decoded from the wire.
pub fn response_body_decode_error<E: Display>(request: &Request, cause: E) -> RpcError {
    RpcError::internal(format!(
        "failed to decode \"{ENCODING}\" response body for procedure \"{procedure}\" of service \"{service}\": {cause}",
        procedure = request.procedure,
        service = request.service,
    ))
}

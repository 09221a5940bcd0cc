use std::fmt::Display;

use anyhow::Result;

use crate::core::{
    error::{
        Code,
        RpcError,
    },
    headers::Headers,
};

/// The encoding tag of a request body, such as `"thrift"` or `"json"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Encoding(String);

impl Encoding {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Encoding {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Encoding {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// An RPC request passed to outbounds and inbound handlers.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Name of the service making the request.
    pub caller: String,
    /// Name of the service being called.
    pub service: String,
    /// Encoding of the request body.
    pub encoding: Encoding,
    /// Name of the procedure being called.
    pub procedure: String,
    /// Application headers.
    pub headers: Headers,
    /// Raw request body.
    pub body: Vec<u8>,
    /// Size of the body, when known ahead of reading it.
    pub body_size_hint: Option<usize>,
}

impl Request {
    /// Validates the request for issuing an outbound call.
    pub fn validate(&self) -> Result<()> {
        if self.service.is_empty() {
            return Err(RpcError::new(Code::InvalidArgument, "service name is required").into());
        }
        if self.procedure.is_empty() {
            return Err(RpcError::new(Code::InvalidArgument, "procedure name is required").into());
        }
        Ok(())
    }

    /// Validates the request for dispatch to an inbound handler.
    ///
    /// Inbound requests additionally require an encoding tag so the router
    /// can resolve the handler.
    pub fn validate_for_inbound(&self) -> Result<()> {
        self.validate()?;
        if self.encoding.is_empty() {
            return Err(RpcError::new(Code::InvalidArgument, "encoding is required").into());
        }
        Ok(())
    }
}

/// Application-level error metadata carried on a response.
///
/// A response with this metadata set still has a well-formed body; the flag
/// marks the call as failed at the application layer rather than the
/// transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationErrorMeta {
    /// Name of the application error type.
    pub name: Option<String>,
    /// RPC code the application error maps to.
    pub code: Option<Code>,
    /// Free-form details for logging.
    pub details: Option<String>,
}

/// An RPC response returned from handlers and outbounds.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// Application headers.
    pub headers: Headers,
    /// Raw response body.
    pub body: Vec<u8>,
    /// Set when the response carries an application-level error.
    pub application_error: Option<ApplicationErrorMeta>,
}

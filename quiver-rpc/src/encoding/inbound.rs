use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    core::{
        context::Context,
        error::RpcError,
        headers::Headers,
        procedure::procedure_name,
        request::{
            ApplicationErrorMeta,
            Request,
            Response,
        },
    },
    encoding::{
        ENCODING,
        envelope::{
            Envelope,
            EnvelopeKind,
        },
        errors::{
            UnexpectedEnvelopeKind,
            request_body_decode_error,
            response_body_encode_error,
        },
        protocol::decode_request,
        value::Value,
    },
    router::{
        HandlerSpec,
        Procedure,
    },
    transport::transport::{
        OnewayHandler,
        UnaryHandler,
    },
};

/// Per-call state exposed to handler functions: the identity of the call and
/// its headers, plus a sink for response headers.
#[derive(Debug, Clone)]
pub struct InboundCall {
    caller: String,
    service: String,
    procedure: String,
    headers: Headers,
    response_headers: Headers,
}

impl InboundCall {
    fn new(request: &Request) -> Self {
        Self {
            caller: request.caller.clone(),
            service: request.service.clone(),
            procedure: request.procedure.clone(),
            headers: request.headers.clone(),
            response_headers: Headers::new(),
        }
    }

    /// Name of the service that made the call.
    pub fn caller(&self) -> &str {
        &self.caller
    }

    /// Name of the service being called.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Wire name of the procedure being called.
    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    /// Reads a request header by case-insensitive name.
    pub fn header<K>(&self, name: K) -> Option<&str>
    where
        K: AsRef<str>,
    {
        self.headers.get(name)
    }

    /// Stages a header to be sent back on the response.
    pub fn write_response_header<K, V>(&mut self, name: K, value: V)
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        self.response_headers.set(name, value);
    }

    fn into_response_headers(self) -> Headers {
        self.response_headers
    }
}

/// The value a unary handler function produces: the reply body plus optional
/// application-error metadata to stamp on the response.
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    pub body: Envelope,
    pub application_error: Option<ApplicationErrorMeta>,
}

impl HandlerResponse {
    /// A plain successful reply carrying the given value.
    ///
    /// The envelope name and sequence id are filled by the responder that
    /// decoded the request, so they are left empty here.
    pub fn reply(value: Value) -> Self {
        Self {
            body: Envelope {
                name: String::new(),
                seq_id: 0,
                kind: EnvelopeKind::Reply,
                value,
            },
            application_error: None,
        }
    }

    /// Marks the response as an application-level error.
    pub fn with_application_error(mut self, meta: ApplicationErrorMeta) -> Self {
        self.application_error = Some(meta);
        self
    }
}

/// A user-provided function handling unary calls with decoded bodies.
#[async_trait]
pub trait UnaryFunction: Send + Sync {
    async fn handle(&self, call: &mut InboundCall, body: Value) -> Result<HandlerResponse>;
}

/// A user-provided function handling oneway calls with decoded bodies.
#[async_trait]
pub trait OnewayFunction: Send + Sync {
    async fn handle_oneway(&self, call: &mut InboundCall, body: Value) -> Result<()>;
}

fn expect_thrift_encoding(request: &Request) -> Result<()> {
    if request.encoding.as_str() != ENCODING {
        return Err(RpcError::invalid_argument(format!(
            "expected encoding \"{ENCODING}\" but got \"{}\"",
            request.encoding,
        ))
        .into());
    }
    Ok(())
}

/// Adapts a [`UnaryFunction`] to the transport-level [`UnaryHandler`],
/// decoding the request envelope-agnostically and framing the reply to
/// match.
pub struct ThriftUnaryHandler {
    function: Arc<dyn UnaryFunction>,
}

impl ThriftUnaryHandler {
    pub fn new(function: Arc<dyn UnaryFunction>) -> Self {
        Self { function }
    }
}

#[async_trait]
impl UnaryHandler for ThriftUnaryHandler {
    async fn handle(&self, _: &Context, request: &Request) -> Result<Response> {
        expect_thrift_encoding(request)?;
        let mut call = InboundCall::new(request);
        let (value, responder) = decode_request(EnvelopeKind::Call, &request.body)
            .map_err(|cause| request_body_decode_error(request, cause))?;

        let handler_response = self.function.handle(&mut call, value).await?;

        if handler_response.body.kind != EnvelopeKind::Reply {
            return Err(response_body_encode_error(
                request,
                UnexpectedEnvelopeKind(handler_response.body.kind),
            )
            .into());
        }
        let mut body = Vec::new();
        responder
            .encode_response(&handler_response.body.value, handler_response.body.kind, &mut body)
            .map_err(|cause| response_body_encode_error(request, cause))?;
        Ok(Response {
            headers: call.into_response_headers(),
            body,
            application_error: handler_response.application_error,
        })
    }
}

/// Adapts a [`OnewayFunction`] to the transport-level [`OnewayHandler`].
pub struct ThriftOnewayHandler {
    function: Arc<dyn OnewayFunction>,
}

impl ThriftOnewayHandler {
    pub fn new(function: Arc<dyn OnewayFunction>) -> Self {
        Self { function }
    }
}

#[async_trait]
impl OnewayHandler for ThriftOnewayHandler {
    async fn handle_oneway(&self, _: &Context, request: &Request) -> Result<()> {
        expect_thrift_encoding(request)?;
        let mut call = InboundCall::new(request);
        let (value, _) = decode_request(EnvelopeKind::OneWay, &request.body)
            .map_err(|cause| request_body_decode_error(request, cause))?;
        self.function.handle_oneway(&mut call, value).await
    }
}

/// Builds a routable unary procedure for a service method.
pub fn unary_procedure<S>(
    service: S,
    thrift_service: &str,
    method: &str,
    function: Arc<dyn UnaryFunction>,
) -> Procedure
where
    S: Into<String>,
{
    Procedure {
        service: service.into(),
        name: procedure_name(thrift_service, method),
        encoding: ENCODING.into(),
        handler: HandlerSpec::Unary(Arc::new(ThriftUnaryHandler::new(function))),
    }
}

/// Builds a routable oneway procedure for a service method.
pub fn oneway_procedure<S>(
    service: S,
    thrift_service: &str,
    method: &str,
    function: Arc<dyn OnewayFunction>,
) -> Procedure
where
    S: Into<String>,
{
    Procedure {
        service: service.into(),
        name: procedure_name(thrift_service, method),
        encoding: ENCODING.into(),
        handler: HandlerSpec::Oneway(Arc::new(ThriftOnewayHandler::new(function))),
    }
}

use std::sync::Arc;

use anyhow::Result;

use crate::{
    core::{
        context::Context,
        error::RpcError,
        headers::Headers,
        pool::BufferPool,
        procedure::procedure_name,
        request::{
            ApplicationErrorMeta,
            Request,
            Response,
        },
    },
    encoding::{
        ENCODING,
        binary::write_value,
        envelope::{
            Envelope,
            EnvelopeKind,
            multiplex_name,
            write_envelope_parts,
        },
        errors::{
            ApplicationExceptionError,
            UnexpectedEnvelopeKind,
            request_body_encode_error,
            response_body_decode_error,
        },
        exception::ApplicationException,
        protocol::{
            Binary,
            Protocol,
        },
        value::Value,
    },
    transport::transport::ClientConfig,
};

/// Framing options for a [`Client`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientOptions {
    /// Wrap request bodies in a strict envelope and expect enveloped
    /// responses. Required for interop with legacy multiplexed servers.
    pub enveloped: bool,
    /// Prefix envelope names with `"<service>:"`. Only meaningful together
    /// with `enveloped`.
    pub multiplexed: bool,
}

/// The decoded result of a successful call.
#[derive(Debug, Clone)]
pub struct CallResponse {
    pub value: Value,
    pub headers: Headers,
    pub application_error: Option<ApplicationErrorMeta>,
}

/// A client issuing structural-binary calls to one remote service through
/// the configured outbounds.
pub struct Client {
    thrift_service: String,
    config: ClientConfig,
    options: ClientOptions,
    pool: Arc<BufferPool>,
}

impl Client {
    /// Creates a client for methods of `thrift_service`, called over the
    /// outbounds in `config`.
    pub fn new<S>(thrift_service: S, config: ClientConfig, options: ClientOptions) -> Self
    where
        S: Into<String>,
    {
        Self {
            thrift_service: thrift_service.into(),
            config,
            options,
            pool: Arc::new(BufferPool::default()),
        }
    }

    /// Shares an explicit buffer pool instead of a client-private one.
    pub fn with_buffer_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = pool;
        self
    }

    fn request_for(&self, body: &Envelope, headers: Headers) -> Request {
        Request {
            caller: self.config.caller.clone(),
            service: self.config.service.clone(),
            encoding: ENCODING.into(),
            procedure: procedure_name(&self.thrift_service, &body.name),
            headers,
            body: Vec::new(),
            body_size_hint: None,
        }
    }

    fn encode_body(&self, body: &Envelope, request: &mut Request) -> Result<()> {
        if !matches!(body.kind, EnvelopeKind::Call | EnvelopeKind::OneWay) {
            return Err(
                request_body_encode_error(request, UnexpectedEnvelopeKind(body.kind)).into(),
            );
        }
        let mut buffer = self.pool.acquire();
        if self.options.enveloped {
            let name = if self.options.multiplexed {
                multiplex_name(&self.thrift_service, &body.name)
            } else {
                body.name.clone()
            };
            write_envelope_parts(&name, body.seq_id, body.kind, &body.value, &mut buffer);
        } else {
            write_value(&body.value, &mut buffer);
        }
        request.body_size_hint = Some(buffer.len());
        request.body = buffer;
        Ok(())
    }

    fn decode_response(&self, request: &Request, response: Response) -> Result<CallResponse> {
        let protocol = Binary::default();
        let value = if self.options.enveloped {
            let envelope = protocol
                .decode_enveloped(&response.body)
                .map_err(|cause| response_body_decode_error(request, cause))?;
            match envelope.kind {
                EnvelopeKind::Reply => envelope.value,
                EnvelopeKind::Exception => {
                    let exception = ApplicationException::from_value(&envelope.value);
                    return Err(ApplicationExceptionError {
                        service: request.service.clone(),
                        procedure: request.procedure.clone(),
                        exception,
                    }
                    .into());
                }
                kind => {
                    return Err(
                        response_body_decode_error(request, UnexpectedEnvelopeKind(kind)).into(),
                    );
                }
            }
        } else {
            protocol
                .decode(&response.body)
                .map_err(|cause| response_body_decode_error(request, cause))?
        };
        Ok(CallResponse {
            value,
            headers: response.headers,
            application_error: response.application_error,
        })
    }

    /// Issues a unary call with the given body and waits for its decoded
    /// response.
    pub async fn call(
        &self,
        ctx: &Context,
        headers: Headers,
        body: &Envelope,
    ) -> Result<CallResponse> {
        let outbound = self.config.unary.clone().ok_or_else(|| {
            RpcError::failed_precondition(format!(
                "no unary outbound configured for service \"{}\"",
                self.config.service,
            ))
        })?;
        let mut request = self.request_for(body, headers);
        request.validate()?;
        self.encode_body(body, &mut request)?;

        let result = outbound.call(ctx, &request).await;
        self.pool.release(std::mem::take(&mut request.body));
        self.decode_response(&request, result?)
    }

    /// Issues a oneway call with the given body.
    pub async fn call_oneway(&self, ctx: &Context, headers: Headers, body: &Envelope) -> Result<()> {
        let outbound = self.config.oneway.clone().ok_or_else(|| {
            RpcError::failed_precondition(format!(
                "no oneway outbound configured for service \"{}\"",
                self.config.service,
            ))
        })?;
        let mut request = self.request_for(body, headers);
        request.validate()?;
        self.encode_body(body, &mut request)?;

        let result = outbound.call_oneway(ctx, &request).await;
        self.pool.release(std::mem::take(&mut request.body));
        result
    }
}

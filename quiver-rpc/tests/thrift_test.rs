use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use quiver_rpc::{
    core::{
        context::Context,
        headers::Headers,
        request::{
            Request,
            Response,
        },
    },
    encoding::{
        envelope::{
            Envelope,
            EnvelopeKind,
        },
        errors::ApplicationExceptionError,
        exception::{
            ApplicationException,
            ExceptionKind,
        },
        inbound::{
            HandlerResponse,
            InboundCall,
            ThriftUnaryHandler,
            UnaryFunction,
        },
        outbound::{
            Client,
            ClientOptions,
        },
        protocol::{
            Binary,
            Protocol,
        },
        value::{
            Struct,
            Value,
        },
    },
    transport::transport::{
        ClientConfig,
        Lifecycle,
        Transport,
        UnaryHandler,
        UnaryOutbound,
    },
};

/// An outbound that dispatches directly into a handler, standing in for a
/// full transport round trip.
struct LoopbackOutbound {
    handler: Arc<ThriftUnaryHandler>,
}

impl std::fmt::Debug for LoopbackOutbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackOutbound").finish()
    }
}

#[async_trait]
impl Lifecycle for LoopbackOutbound {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl UnaryOutbound for LoopbackOutbound {
    async fn call(&self, ctx: &Context, request: &Request) -> Result<Response> {
        self.handler.handle(ctx, request).await
    }

    fn transports(&self) -> Vec<Arc<dyn Transport>> {
        Vec::new()
    }
}

/// An outbound that replies with fixed response bytes.
#[derive(Debug)]
struct CannedOutbound {
    body: Vec<u8>,
}

#[async_trait]
impl Lifecycle for CannedOutbound {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl UnaryOutbound for CannedOutbound {
    async fn call(&self, _: &Context, _: &Request) -> Result<Response> {
        Ok(Response {
            body: self.body.clone(),
            ..Default::default()
        })
    }

    fn transports(&self) -> Vec<Arc<dyn Transport>> {
        Vec::new()
    }
}

struct EchoFunction {}

#[async_trait]
impl UnaryFunction for EchoFunction {
    async fn handle(&self, call: &mut InboundCall, body: Value) -> Result<HandlerResponse> {
        call.write_response_header("echoed-by", call.procedure().to_owned());
        Ok(HandlerResponse::reply(body))
    }
}

fn client_config(outbound: Arc<dyn UnaryOutbound>) -> ClientConfig {
    ClientConfig {
        caller: "caller".to_owned(),
        service: "service".to_owned(),
        unary: Some(outbound),
        ..Default::default()
    }
}

fn call_body(kind: EnvelopeKind) -> Envelope {
    Envelope {
        name: "someMethod".to_owned(),
        seq_id: 1,
        kind,
        value: Value::Struct(Struct::new().with_field(1, Value::string("payload"))),
    }
}

#[tokio::test]
async fn enveloped_call_round_trips_through_a_handler() {
    test_utils::setup::setup_test_environment();

    let handler = Arc::new(ThriftUnaryHandler::new(Arc::new(EchoFunction {})));
    let client = Client::new(
        "MyService",
        client_config(Arc::new(LoopbackOutbound { handler })),
        ClientOptions {
            enveloped: true,
            multiplexed: false,
        },
    );

    let response = client
        .call(&Context::background(), Headers::new(), &call_body(EnvelopeKind::Call))
        .await
        .unwrap();
    assert_eq!(response.value, call_body(EnvelopeKind::Call).value);
    assert_eq!(
        response.headers.get("echoed-by"),
        Some("MyService::someMethod"),
    );
}

#[tokio::test]
async fn unenveloped_call_round_trips_through_a_handler() {
    test_utils::setup::setup_test_environment();

    let handler = Arc::new(ThriftUnaryHandler::new(Arc::new(EchoFunction {})));
    let client = Client::new(
        "MyService",
        client_config(Arc::new(LoopbackOutbound { handler })),
        ClientOptions::default(),
    );

    let response = client
        .call(&Context::background(), Headers::new(), &call_body(EnvelopeKind::Call))
        .await
        .unwrap();
    assert_eq!(response.value, call_body(EnvelopeKind::Call).value);
}

#[tokio::test]
async fn rejects_request_bodies_with_unexpected_envelope_kinds() {
    test_utils::setup::setup_test_environment();

    let handler = Arc::new(ThriftUnaryHandler::new(Arc::new(EchoFunction {})));
    let client = Client::new(
        "MyService",
        client_config(Arc::new(LoopbackOutbound { handler })),
        ClientOptions {
            enveloped: true,
            multiplexed: false,
        },
    );

    assert_matches::assert_matches!(
        client
            .call(&Context::background(), Headers::new(), &call_body(EnvelopeKind::Reply))
            .await,
        Err(err) => {
            assert!(err.to_string().contains(
                "failed to encode \"thrift\" request body for procedure \"MyService::someMethod\" of service \"service\": unexpected envelope type: Reply"
            ), "unexpected error text: {err}");
        }
    );
}

#[tokio::test]
async fn surfaces_exception_envelopes_as_typed_errors() {
    test_utils::setup::setup_test_environment();

    let exception = ApplicationException {
        message: Some("great sadness".to_owned()),
        kind: Some(ExceptionKind::ProtocolError),
    };
    let mut body = Vec::new();
    Binary::default()
        .encode_enveloped(
            &Envelope {
                name: "someMethod".to_owned(),
                seq_id: 1,
                kind: EnvelopeKind::Exception,
                value: exception.to_value(),
            },
            &mut body,
        )
        .unwrap();

    let client = Client::new(
        "MyService",
        client_config(Arc::new(CannedOutbound { body })),
        ClientOptions {
            enveloped: true,
            multiplexed: false,
        },
    );

    assert_matches::assert_matches!(
        client
            .call(&Context::background(), Headers::new(), &call_body(EnvelopeKind::Call))
            .await,
        Err(err) => {
            assert!(err.to_string().contains(
                "thrift request to procedure \"MyService::someMethod\" of service \"service\" encountered an internal failure: TApplicationException{Message: great sadness, Type: ProtocolError}"
            ), "unexpected error text: {err}");
            let error = err.downcast_ref::<ApplicationExceptionError>().unwrap();
            assert_eq!(error.exception.kind, Some(ExceptionKind::ProtocolError));
        }
    );
}

#[tokio::test]
async fn rejects_reply_envelopes_of_unexpected_kind() {
    test_utils::setup::setup_test_environment();

    let mut body = Vec::new();
    Binary::default()
        .encode_enveloped(&call_body(EnvelopeKind::Call), &mut body)
        .unwrap();
    let client = Client::new(
        "MyService",
        client_config(Arc::new(CannedOutbound { body })),
        ClientOptions {
            enveloped: true,
            multiplexed: false,
        },
    );

    assert_matches::assert_matches!(
        client
            .call(&Context::background(), Headers::new(), &call_body(EnvelopeKind::Call))
            .await,
        Err(err) => {
            assert!(err.to_string().contains(
                "failed to decode \"thrift\" response body for procedure \"MyService::someMethod\" of service \"service\": unexpected envelope type: Call"
            ), "unexpected error text: {err}");
        }
    );
}

#[tokio::test]
async fn multiplexed_calls_prefix_the_envelope_name() {
    test_utils::setup::setup_test_environment();

    /// Captures the envelope name that went over the wire.
    #[derive(Debug)]
    struct CapturingOutbound {}

    #[async_trait]
    impl Lifecycle for CapturingOutbound {
        async fn start(&self) -> Result<()> {
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl UnaryOutbound for CapturingOutbound {
        async fn call(&self, _: &Context, request: &Request) -> Result<Response> {
            let envelope = Binary::default().decode_enveloped(&request.body)?;
            assert_eq!(envelope.name, "MyService:someMethod");
            // Echo back a reply with the same framing.
            let mut body = Vec::new();
            Binary::default().encode_enveloped(
                &Envelope {
                    kind: EnvelopeKind::Reply,
                    ..envelope
                },
                &mut body,
            )?;
            Ok(Response {
                body,
                ..Default::default()
            })
        }

        fn transports(&self) -> Vec<Arc<dyn Transport>> {
            Vec::new()
        }
    }

    let client = Client::new(
        "MyService",
        client_config(Arc::new(CapturingOutbound {})),
        ClientOptions {
            enveloped: true,
            multiplexed: true,
        },
    );
    let response = client
        .call(&Context::background(), Headers::new(), &call_body(EnvelopeKind::Call))
        .await
        .unwrap();
    assert_eq!(response.value, call_body(EnvelopeKind::Call).value);
}

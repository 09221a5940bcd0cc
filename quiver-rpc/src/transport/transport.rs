use std::{
    fmt::Debug,
    sync::Arc,
};

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    core::{
        context::Context,
        request::{
            Request,
            Response,
        },
    },
    router::Router,
    transport::stream::{
        ClientStream,
        ServerStream,
    },
};

/// A component with an explicit start/stop lifecycle.
///
/// Both operations are idempotent; the dispatcher orders them across every
/// transport it manages.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}

/// The shared object underlying one or more inbounds and outbounds, such as
/// a connection manager for a specific wire protocol.
///
/// The dispatcher starts every unique transport exactly once before any
/// inbound, and stops it exactly once after all of them.
pub trait Transport: Lifecycle + Debug {}

/// A server-side entry point that receives requests and dispatches them into
/// the router.
pub trait Inbound: Lifecycle {
    /// Installs the router used to resolve handlers.
    ///
    /// Called by the dispatcher before [`Lifecycle::start`].
    fn set_router(&self, router: Arc<dyn Router>);

    /// The transports this inbound depends on.
    fn transports(&self) -> Vec<Arc<dyn Transport>>;
}

/// A client-side port for unary (request/response) calls.
#[async_trait]
pub trait UnaryOutbound: Lifecycle + Debug {
    /// Issues a unary call and waits for its response.
    async fn call(&self, ctx: &Context, request: &Request) -> Result<Response>;

    /// The transports this outbound depends on.
    fn transports(&self) -> Vec<Arc<dyn Transport>>;
}

/// A client-side port for oneway (fire and forget) calls.
#[async_trait]
pub trait OnewayOutbound: Lifecycle + Debug {
    /// Issues a oneway call, returning once the request is accepted for
    /// delivery.
    async fn call_oneway(&self, ctx: &Context, request: &Request) -> Result<()>;

    /// The transports this outbound depends on.
    fn transports(&self) -> Vec<Arc<dyn Transport>>;
}

/// A client-side port for streaming calls.
#[async_trait]
pub trait StreamOutbound: Lifecycle + Debug {
    /// Opens a stream to the remote procedure.
    async fn call_stream(&self, ctx: &Context, request: &Request) -> Result<ClientStream>;

    /// The transports this outbound depends on.
    fn transports(&self) -> Vec<Arc<dyn Transport>>;
}

/// A server-side handler for unary calls.
#[async_trait]
pub trait UnaryHandler: Send + Sync {
    async fn handle(&self, ctx: &Context, request: &Request) -> Result<Response>;
}

/// A server-side handler for oneway calls.
#[async_trait]
pub trait OnewayHandler: Send + Sync {
    async fn handle_oneway(&self, ctx: &Context, request: &Request) -> Result<()>;
}

/// A server-side handler for streaming calls.
#[async_trait]
pub trait StreamHandler: Send + Sync {
    async fn handle_stream(&self, stream: ServerStream) -> Result<()>;
}

/// The per-service outbound bundle the dispatcher hands to encoding clients.
#[derive(Clone, Default)]
pub struct ClientConfig {
    /// Name of the local service, stamped as the caller on requests.
    pub caller: String,
    /// Name of the remote service being called.
    pub service: String,
    pub unary: Option<Arc<dyn UnaryOutbound>>,
    pub oneway: Option<Arc<dyn OnewayOutbound>>,
    pub stream: Option<Arc<dyn StreamOutbound>>,
}

impl Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("caller", &self.caller)
            .field("service", &self.service)
            .field("unary", &self.unary.is_some())
            .field("oneway", &self.oneway.is_some())
            .field("stream", &self.stream.is_some())
            .finish()
    }
}

use std::{
    fmt::Debug,
    sync::Arc,
};

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    core::{
        context::Context,
        request::Request,
    },
    transport::{
        stream::{
            ClientStream,
            ServerStream,
        },
        transport::{
            Lifecycle,
            StreamHandler,
            StreamOutbound,
            Transport,
        },
    },
};

/// Middleware wrapping server-side stream dispatch.
#[async_trait]
pub trait StreamInboundMiddleware: Send + Sync {
    async fn handle_stream(
        &self,
        stream: ServerStream,
        next: Arc<dyn StreamHandler>,
    ) -> Result<()>;
}

/// Middleware wrapping client-side stream opening.
#[async_trait]
pub trait StreamOutboundMiddleware: Send + Sync {
    async fn call_stream(
        &self,
        ctx: &Context,
        request: &Request,
        next: Arc<dyn StreamOutbound>,
    ) -> Result<ClientStream>;
}

/// An ordered chain of stream inbound middleware, composed left to right.
#[derive(Clone, Default)]
pub struct StreamInboundChain {
    middleware: Vec<Arc<dyn StreamInboundMiddleware>>,
}

impl StreamInboundChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, middleware: Arc<dyn StreamInboundMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn and(mut self, other: Self) -> Self {
        self.middleware.extend(other.middleware);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Wraps a handler with every middleware in the chain.
    pub fn apply(&self, handler: Arc<dyn StreamHandler>) -> Arc<dyn StreamHandler> {
        self.middleware.iter().rev().fold(handler, |next, middleware| {
            Arc::new(AppliedStreamHandler {
                middleware: middleware.clone(),
                next,
            })
        })
    }
}

struct AppliedStreamHandler {
    middleware: Arc<dyn StreamInboundMiddleware>,
    next: Arc<dyn StreamHandler>,
}

#[async_trait]
impl StreamHandler for AppliedStreamHandler {
    async fn handle_stream(&self, stream: ServerStream) -> Result<()> {
        self.middleware.handle_stream(stream, self.next.clone()).await
    }
}

/// An ordered chain of stream outbound middleware, composed left to right.
#[derive(Clone, Default)]
pub struct StreamOutboundChain {
    middleware: Vec<Arc<dyn StreamOutboundMiddleware>>,
}

impl StreamOutboundChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, middleware: Arc<dyn StreamOutboundMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn and(mut self, other: Self) -> Self {
        self.middleware.extend(other.middleware);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Wraps an outbound with every middleware in the chain.
    pub fn apply(&self, outbound: Arc<dyn StreamOutbound>) -> Arc<dyn StreamOutbound> {
        self.middleware.iter().rev().fold(outbound, |next, middleware| {
            Arc::new(AppliedStreamOutbound {
                middleware: middleware.clone(),
                next,
            })
        })
    }
}

struct AppliedStreamOutbound {
    middleware: Arc<dyn StreamOutboundMiddleware>,
    next: Arc<dyn StreamOutbound>,
}

impl Debug for AppliedStreamOutbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppliedStreamOutbound")
            .field("next", &self.next)
            .finish()
    }
}

#[async_trait]
impl Lifecycle for AppliedStreamOutbound {
    async fn start(&self) -> Result<()> {
        self.next.start().await
    }

    async fn stop(&self) -> Result<()> {
        self.next.stop().await
    }
}

#[async_trait]
impl StreamOutbound for AppliedStreamOutbound {
    async fn call_stream(&self, ctx: &Context, request: &Request) -> Result<ClientStream> {
        self.middleware
            .call_stream(ctx, request, self.next.clone())
            .await
    }

    fn transports(&self) -> Vec<Arc<dyn Transport>> {
        self.next.transports()
    }
}

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
    transport::transport::{
        Lifecycle,
        OnewayHandler,
        OnewayOutbound,
        Transport,
    },
};

/// Middleware wrapping server-side oneway dispatch.
#[async_trait]
pub trait OnewayInboundMiddleware: Send + Sync {
    async fn handle_oneway(
        &self,
        ctx: &Context,
        request: &Request,
        next: Arc<dyn OnewayHandler>,
    ) -> Result<()>;
}

/// Middleware wrapping client-side oneway calls.
#[async_trait]
pub trait OnewayOutboundMiddleware: Send + Sync {
    async fn call_oneway(
        &self,
        ctx: &Context,
        request: &Request,
        next: Arc<dyn OnewayOutbound>,
    ) -> Result<()>;
}

/// An ordered chain of oneway inbound middleware, composed left to right.
#[derive(Clone, Default)]
pub struct OnewayInboundChain {
    middleware: Vec<Arc<dyn OnewayInboundMiddleware>>,
}

impl OnewayInboundChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, middleware: Arc<dyn OnewayInboundMiddleware>) -> Self {
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
    pub fn apply(&self, handler: Arc<dyn OnewayHandler>) -> Arc<dyn OnewayHandler> {
        self.middleware.iter().rev().fold(handler, |next, middleware| {
            Arc::new(AppliedOnewayHandler {
                middleware: middleware.clone(),
                next,
            })
        })
    }
}

struct AppliedOnewayHandler {
    middleware: Arc<dyn OnewayInboundMiddleware>,
    next: Arc<dyn OnewayHandler>,
}

#[async_trait]
impl OnewayHandler for AppliedOnewayHandler {
    async fn handle_oneway(&self, ctx: &Context, request: &Request) -> Result<()> {
        self.middleware
            .handle_oneway(ctx, request, self.next.clone())
            .await
    }
}

/// An ordered chain of oneway outbound middleware, composed left to right.
#[derive(Clone, Default)]
pub struct OnewayOutboundChain {
    middleware: Vec<Arc<dyn OnewayOutboundMiddleware>>,
}

impl OnewayOutboundChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, middleware: Arc<dyn OnewayOutboundMiddleware>) -> Self {
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
    pub fn apply(&self, outbound: Arc<dyn OnewayOutbound>) -> Arc<dyn OnewayOutbound> {
        self.middleware.iter().rev().fold(outbound, |next, middleware| {
            Arc::new(AppliedOnewayOutbound {
                middleware: middleware.clone(),
                next,
            })
        })
    }
}

struct AppliedOnewayOutbound {
    middleware: Arc<dyn OnewayOutboundMiddleware>,
    next: Arc<dyn OnewayOutbound>,
}

impl Debug for AppliedOnewayOutbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppliedOnewayOutbound")
            .field("next", &self.next)
            .finish()
    }
}

#[async_trait]
impl Lifecycle for AppliedOnewayOutbound {
    async fn start(&self) -> Result<()> {
        self.next.start().await
    }

    async fn stop(&self) -> Result<()> {
        self.next.stop().await
    }
}

#[async_trait]
impl OnewayOutbound for AppliedOnewayOutbound {
    async fn call_oneway(&self, ctx: &Context, request: &Request) -> Result<()> {
        self.middleware
            .call_oneway(ctx, request, self.next.clone())
            .await
    }

    fn transports(&self) -> Vec<Arc<dyn Transport>> {
        self.next.transports()
    }
}

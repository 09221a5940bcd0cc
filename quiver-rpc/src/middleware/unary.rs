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
    transport::transport::{
        Lifecycle,
        Transport,
        UnaryHandler,
        UnaryOutbound,
    },
};

/// Middleware wrapping server-side unary dispatch.
///
/// Middleware may short-circuit by not invoking `next`, retry by invoking it
/// more than once, or transform the request and response. Implementations
/// must be re-entrant and must not retain the request body past their
/// return.
#[async_trait]
pub trait UnaryInboundMiddleware: Send + Sync {
    async fn handle(
        &self,
        ctx: &Context,
        request: &Request,
        next: Arc<dyn UnaryHandler>,
    ) -> Result<Response>;
}

/// Middleware wrapping client-side unary calls.
#[async_trait]
pub trait UnaryOutboundMiddleware: Send + Sync {
    async fn call(
        &self,
        ctx: &Context,
        request: &Request,
        next: Arc<dyn UnaryOutbound>,
    ) -> Result<Response>;
}

/// An ordered chain of unary inbound middleware, composed left to right.
///
/// An empty chain is the identity; concatenating chains flattens them, so
/// composition is associative.
#[derive(Clone, Default)]
pub struct UnaryInboundChain {
    middleware: Vec<Arc<dyn UnaryInboundMiddleware>>,
}

impl UnaryInboundChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one middleware, builder style.
    pub fn with(mut self, middleware: Arc<dyn UnaryInboundMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Concatenates another chain onto this one.
    pub fn and(mut self, other: Self) -> Self {
        self.middleware.extend(other.middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Wraps a handler with every middleware in the chain. The first
    /// middleware sees the request first.
    pub fn apply(&self, handler: Arc<dyn UnaryHandler>) -> Arc<dyn UnaryHandler> {
        self.middleware.iter().rev().fold(handler, |next, middleware| {
            Arc::new(AppliedUnaryHandler {
                middleware: middleware.clone(),
                next,
            })
        })
    }
}

impl FromIterator<Arc<dyn UnaryInboundMiddleware>> for UnaryInboundChain {
    fn from_iter<T: IntoIterator<Item = Arc<dyn UnaryInboundMiddleware>>>(iter: T) -> Self {
        Self {
            middleware: iter.into_iter().collect(),
        }
    }
}

struct AppliedUnaryHandler {
    middleware: Arc<dyn UnaryInboundMiddleware>,
    next: Arc<dyn UnaryHandler>,
}

#[async_trait]
impl UnaryHandler for AppliedUnaryHandler {
    async fn handle(&self, ctx: &Context, request: &Request) -> Result<Response> {
        self.middleware.handle(ctx, request, self.next.clone()).await
    }
}

/// An ordered chain of unary outbound middleware, composed left to right.
#[derive(Clone, Default)]
pub struct UnaryOutboundChain {
    middleware: Vec<Arc<dyn UnaryOutboundMiddleware>>,
}

impl UnaryOutboundChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, middleware: Arc<dyn UnaryOutboundMiddleware>) -> Self {
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
    pub fn apply(&self, outbound: Arc<dyn UnaryOutbound>) -> Arc<dyn UnaryOutbound> {
        self.middleware.iter().rev().fold(outbound, |next, middleware| {
            Arc::new(AppliedUnaryOutbound {
                middleware: middleware.clone(),
                next,
            })
        })
    }
}

impl FromIterator<Arc<dyn UnaryOutboundMiddleware>> for UnaryOutboundChain {
    fn from_iter<T: IntoIterator<Item = Arc<dyn UnaryOutboundMiddleware>>>(iter: T) -> Self {
        Self {
            middleware: iter.into_iter().collect(),
        }
    }
}

struct AppliedUnaryOutbound {
    middleware: Arc<dyn UnaryOutboundMiddleware>,
    next: Arc<dyn UnaryOutbound>,
}

impl Debug for AppliedUnaryOutbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppliedUnaryOutbound")
            .field("next", &self.next)
            .finish()
    }
}

#[async_trait]
impl Lifecycle for AppliedUnaryOutbound {
    async fn start(&self) -> Result<()> {
        self.next.start().await
    }

    async fn stop(&self) -> Result<()> {
        self.next.stop().await
    }
}

#[async_trait]
impl UnaryOutbound for AppliedUnaryOutbound {
    async fn call(&self, ctx: &Context, request: &Request) -> Result<Response> {
        self.middleware.call(ctx, request, self.next.clone()).await
    }

    fn transports(&self) -> Vec<Arc<dyn Transport>> {
        self.next.transports()
    }
}

#[cfg(test)]
mod unary_test {
    use std::sync::{
        Arc,
        atomic::{
            AtomicUsize,
            Ordering,
        },
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
        middleware::{
            UnaryInboundChain,
            UnaryInboundMiddleware,
        },
        transport::transport::UnaryHandler,
    };

    struct Terminal {}

    #[async_trait]
    impl UnaryHandler for Terminal {
        async fn handle(&self, _: &Context, request: &Request) -> Result<Response> {
            let mut response = Response::default();
            response.headers.extend(&request.headers);
            response.headers.set("order", request.headers.get("order").unwrap_or("").to_owned());
            Ok(response)
        }
    }

    struct Tag {
        tag: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl UnaryInboundMiddleware for Tag {
        async fn handle(
            &self,
            ctx: &Context,
            request: &Request,
            next: Arc<dyn UnaryHandler>,
        ) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut request = request.clone();
            let order = format!("{}{}", request.headers.get("order").unwrap_or(""), self.tag);
            request.headers.set("order", order);
            next.handle(ctx, &request).await
        }
    }

    fn tag(tag: &'static str, calls: &Arc<AtomicUsize>) -> Arc<Tag> {
        Arc::new(Tag {
            tag,
            calls: calls.clone(),
        })
    }

    #[tokio::test]
    async fn composes_left_to_right() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = UnaryInboundChain::new()
            .with(tag("a", &calls))
            .with(tag("b", &calls))
            .with(tag("c", &calls));
        let handler = chain.apply(Arc::new(Terminal {}));
        let response = handler
            .handle(&Context::background(), &Request::default())
            .await
            .unwrap();
        assert_eq!(response.headers.get("order"), Some("abc"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn concatenation_is_associative() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (a, b, c) = (tag("a", &calls), tag("b", &calls), tag("c", &calls));

        let left = UnaryInboundChain::new()
            .with(a.clone())
            .and(UnaryInboundChain::new().with(b.clone()))
            .and(UnaryInboundChain::new().with(c.clone()));
        let right = UnaryInboundChain::new()
            .with(a)
            .and(UnaryInboundChain::new().with(b).and(UnaryInboundChain::new().with(c)));

        for chain in [left, right] {
            let handler = chain.apply(Arc::new(Terminal {}));
            let response = handler
                .handle(&Context::background(), &Request::default())
                .await
                .unwrap();
            assert_eq!(response.headers.get("order"), Some("abc"));
        }
    }

    #[tokio::test]
    async fn empty_chain_is_identity() {
        let handler = UnaryInboundChain::new().apply(Arc::new(Terminal {}));
        let response = handler
            .handle(&Context::background(), &Request::default())
            .await
            .unwrap();
        assert_eq!(response.headers.get("order"), Some(""));
    }
}

use std::{
    any::Any,
    sync::Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use futures_util::FutureExt;
use log::error;

use crate::{
    core::{
        context::Context,
        error::RpcError,
        request::{
            Request,
            Response,
        },
    },
    middleware::{
        OnewayInboundMiddleware,
        UnaryInboundMiddleware,
    },
    transport::transport::{
        OnewayHandler,
        UnaryHandler,
    },
};

fn panic_message(panic: &Box<dyn Any + Send>) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Converts handler panics into Unknown errors at the inbound entry, so one
/// misbehaving handler cannot take down the worker serving it.
#[derive(Debug, Default)]
pub struct Recovery {}

#[async_trait]
impl UnaryInboundMiddleware for Recovery {
    async fn handle(
        &self,
        ctx: &Context,
        request: &Request,
        next: Arc<dyn UnaryHandler>,
    ) -> Result<Response> {
        match std::panic::AssertUnwindSafe(next.handle(ctx, request))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(&panic);
                error!(
                    "Handler for procedure {} of service {} panicked: {message}",
                    request.procedure, request.service,
                );
                Err(RpcError::unknown(format!("handler panicked: {message}")).into())
            }
        }
    }
}

#[async_trait]
impl OnewayInboundMiddleware for Recovery {
    async fn handle_oneway(
        &self,
        ctx: &Context,
        request: &Request,
        next: Arc<dyn OnewayHandler>,
    ) -> Result<()> {
        match std::panic::AssertUnwindSafe(next.handle_oneway(ctx, request))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(&panic);
                error!(
                    "Oneway handler for procedure {} of service {} panicked: {message}",
                    request.procedure, request.service,
                );
                Err(RpcError::unknown(format!("handler panicked: {message}")).into())
            }
        }
    }
}

#[cfg(test)]
mod recovery_test {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;

    use crate::{
        core::{
            context::Context,
            error::{
                Code,
                RpcError,
            },
            request::{
                Request,
                Response,
            },
        },
        middleware::{
            Recovery,
            UnaryInboundChain,
        },
        transport::transport::UnaryHandler,
    };

    struct Panics {}

    #[async_trait]
    impl UnaryHandler for Panics {
        async fn handle(&self, _: &Context, _: &Request) -> Result<Response> {
            panic!("great sadness");
        }
    }

    #[tokio::test]
    async fn converts_panics_to_unknown_errors() {
        let handler = UnaryInboundChain::new()
            .with(Arc::new(Recovery::default()))
            .apply(Arc::new(Panics {}));
        assert_matches::assert_matches!(
            handler.handle(&Context::background(), &Request::default()).await,
            Err(err) => {
                let error = err.downcast_ref::<RpcError>().unwrap();
                assert_eq!(error.code(), Code::Unknown);
                assert_eq!(error.to_string(), "handler panicked: great sadness");
            }
        );
    }
}

use std::sync::Arc;

use anyhow::Result;
use futures_util::lock::Mutex;
use log::{
    debug,
    info,
};

use crate::{
    core::{
        error::RpcError,
        hash::HashMap,
    },
    middleware::{
        OnewayInboundChain,
        OnewayOutboundChain,
        Recovery,
        StreamInboundChain,
        StreamOutboundChain,
        UnaryInboundChain,
        UnaryOutboundChain,
    },
    router::{
        HandlerSpec,
        MapRouter,
        Procedure,
        Router,
    },
    transport::transport::{
        ClientConfig,
        Inbound,
        OnewayOutbound,
        StreamOutbound,
        Transport,
        UnaryOutbound,
    },
};

/// The outbounds configured for one remote service, keyed by the name the
/// local service uses for it.
#[derive(Clone, Default)]
pub struct Outbounds {
    /// Overrides the remote service name stamped on requests when it differs
    /// from the outbound key.
    pub service_name: Option<String>,
    pub unary: Option<Arc<dyn UnaryOutbound>>,
    pub oneway: Option<Arc<dyn OnewayOutbound>>,
    pub stream: Option<Arc<dyn StreamOutbound>>,
}

/// The middleware chains a dispatcher threads around handlers and outbounds.
#[derive(Clone, Default)]
pub struct MiddlewareConfig {
    pub unary_inbound: UnaryInboundChain,
    pub oneway_inbound: OnewayInboundChain,
    pub stream_inbound: StreamInboundChain,
    pub unary_outbound: UnaryOutboundChain,
    pub oneway_outbound: OnewayOutboundChain,
    pub stream_outbound: StreamOutboundChain,
}

/// Configuration for a [`Dispatcher`].
#[derive(Default)]
pub struct DispatcherConfig {
    /// Name of the local service; stamped as the caller on outbound
    /// requests.
    pub name: String,
    pub inbounds: Vec<Arc<dyn Inbound>>,
    pub outbounds: HashMap<String, Outbounds>,
    pub middleware: MiddlewareConfig,
}

enum LifecycleState {
    Idle,
    Running,
}

/// The lifecycle container of an RPC service.
///
/// A dispatcher binds inbounds, outbounds, middleware, and the router
/// together: it deduplicates the transports underlying all of them, starts
/// and stops everything in dependency order, and installs registered
/// procedures behind the inbound middleware chains.
pub struct Dispatcher {
    name: String,
    router: Arc<MapRouter>,
    inbounds: Vec<Arc<dyn Inbound>>,
    outbounds: HashMap<String, Outbounds>,
    transports: Vec<Arc<dyn Transport>>,
    unary_inbound: UnaryInboundChain,
    oneway_inbound: OnewayInboundChain,
    stream_inbound: StreamInboundChain,
    state: Mutex<LifecycleState>,
}

fn push_unique(transports: &mut Vec<Arc<dyn Transport>>, candidate: Arc<dyn Transport>) {
    if !transports
        .iter()
        .any(|existing| Arc::ptr_eq(existing, &candidate))
    {
        transports.push(candidate);
    }
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        if config.name.is_empty() {
            return Err(RpcError::invalid_argument("dispatcher name is required").into());
        }

        let mut outbounds = HashMap::default();
        for (key, bundle) in config.outbounds {
            outbounds.insert(
                key,
                Outbounds {
                    service_name: bundle.service_name,
                    unary: bundle
                        .unary
                        .map(|outbound| config.middleware.unary_outbound.apply(outbound)),
                    oneway: bundle
                        .oneway
                        .map(|outbound| config.middleware.oneway_outbound.apply(outbound)),
                    stream: bundle
                        .stream
                        .map(|outbound| config.middleware.stream_outbound.apply(outbound)),
                },
            );
        }

        // Every unique underlying transport, by identity: shared transports
        // are managed exactly once.
        let mut transports = Vec::new();
        for inbound in &config.inbounds {
            for transport in inbound.transports() {
                push_unique(&mut transports, transport);
            }
        }
        for bundle in outbounds.values() {
            for transport in bundle
                .unary
                .iter()
                .flat_map(|outbound| outbound.transports())
                .chain(bundle.oneway.iter().flat_map(|outbound| outbound.transports()))
                .chain(bundle.stream.iter().flat_map(|outbound| outbound.transports()))
            {
                push_unique(&mut transports, transport);
            }
        }

        // Panics are recovered before any user-configured middleware runs.
        let recovery = Arc::new(Recovery::default());
        let unary_inbound = UnaryInboundChain::new()
            .with(recovery.clone())
            .and(config.middleware.unary_inbound);
        let oneway_inbound = OnewayInboundChain::new()
            .with(recovery)
            .and(config.middleware.oneway_inbound);

        Ok(Self {
            name: config.name,
            router: Arc::new(MapRouter::new()),
            inbounds: config.inbounds,
            outbounds,
            transports,
            unary_inbound,
            oneway_inbound,
            stream_inbound: config.middleware.stream_inbound,
            state: Mutex::new(LifecycleState::Idle),
        })
    }

    /// Name of the local service.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The router handlers are installed into.
    pub fn router(&self) -> Arc<dyn Router> {
        self.router.clone()
    }

    /// Registers procedures, wrapping their handlers with the inbound
    /// middleware chains.
    pub fn register(&self, procedures: Vec<Procedure>) -> Result<()> {
        let mut wrapped = Vec::with_capacity(procedures.len());
        for mut procedure in procedures {
            if procedure.service.is_empty() {
                return Err(RpcError::invalid_argument(
                    "service name is required to register a procedure",
                )
                .into());
            }
            if procedure.name.is_empty() {
                return Err(RpcError::invalid_argument(
                    "procedure name is required to register a procedure",
                )
                .into());
            }
            procedure.handler = match procedure.handler {
                HandlerSpec::Unary(handler) => {
                    HandlerSpec::Unary(self.unary_inbound.apply(handler))
                }
                HandlerSpec::Oneway(handler) => {
                    HandlerSpec::Oneway(self.oneway_inbound.apply(handler))
                }
                HandlerSpec::Stream(handler) => {
                    HandlerSpec::Stream(self.stream_inbound.apply(handler))
                }
            };
            debug!(
                "Registering {} procedure {} for service {}",
                procedure.handler.rpc_type(),
                procedure.name,
                procedure.service,
            );
            wrapped.push(procedure);
        }
        self.router.register(wrapped)
    }

    /// The outbound bundle for a remote service, for building encoding
    /// clients.
    pub fn client_config(&self, key: &str) -> Option<ClientConfig> {
        self.outbounds.get(key).map(|bundle| ClientConfig {
            caller: self.name.clone(),
            service: bundle
                .service_name
                .clone()
                .unwrap_or_else(|| key.to_owned()),
            unary: bundle.unary.clone(),
            oneway: bundle.oneway.clone(),
            stream: bundle.stream.clone(),
        })
    }

    pub fn unary_outbound(&self, key: &str) -> Option<Arc<dyn UnaryOutbound>> {
        self.outbounds.get(key).and_then(|bundle| bundle.unary.clone())
    }

    pub fn oneway_outbound(&self, key: &str) -> Option<Arc<dyn OnewayOutbound>> {
        self.outbounds.get(key).and_then(|bundle| bundle.oneway.clone())
    }

    pub fn stream_outbound(&self, key: &str) -> Option<Arc<dyn StreamOutbound>> {
        self.outbounds.get(key).and_then(|bundle| bundle.stream.clone())
    }

    /// Starts every transport exactly once, then every inbound.
    ///
    /// Idempotent.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if matches!(*state, LifecycleState::Running) {
            return Ok(());
        }
        for inbound in &self.inbounds {
            inbound.set_router(self.router.clone());
        }
        for transport in &self.transports {
            transport.start().await?;
        }
        for inbound in &self.inbounds {
            inbound.start().await?;
        }
        *state = LifecycleState::Running;
        info!("Dispatcher {} started", self.name);
        Ok(())
    }

    /// Stops every inbound, then every transport, in reverse start order,
    /// waiting for each to drain.
    ///
    /// Idempotent.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if matches!(*state, LifecycleState::Idle) {
            return Ok(());
        }
        for inbound in self.inbounds.iter().rev() {
            inbound.stop().await?;
        }
        for transport in self.transports.iter().rev() {
            transport.stop().await?;
        }
        *state = LifecycleState::Idle;
        info!("Dispatcher {} stopped", self.name);
        Ok(())
    }
}

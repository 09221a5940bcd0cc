use std::{
    collections::hash_map::Entry,
    fmt::Debug,
    sync::{
        Arc,
        RwLock,
    },
};

use anyhow::Result;

use crate::{
    core::{
        context::Context,
        error::RpcError,
        hash::HashMap,
        request::{
            Encoding,
            Request,
        },
    },
    transport::transport::{
        OnewayHandler,
        StreamHandler,
        UnaryHandler,
    },
};

/// The handler half of a registered procedure.
#[derive(Clone)]
pub enum HandlerSpec {
    Unary(Arc<dyn UnaryHandler>),
    Oneway(Arc<dyn OnewayHandler>),
    Stream(Arc<dyn StreamHandler>),
}

impl HandlerSpec {
    /// The RPC type of the handler, for logging.
    pub fn rpc_type(&self) -> &'static str {
        match self {
            Self::Unary(_) => "unary",
            Self::Oneway(_) => "oneway",
            Self::Stream(_) => "stream",
        }
    }
}

impl Debug for HandlerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HandlerSpec").field(&self.rpc_type()).finish()
    }
}

/// A procedure that can be routed to: the (service, name, encoding) triple
/// plus its handler.
#[derive(Debug, Clone)]
pub struct Procedure {
    /// Name of the service the procedure belongs to.
    pub service: String,
    /// Wire name of the procedure, canonically `"<service>::<method>"` for
    /// structural encodings.
    pub name: String,
    /// Encoding the handler accepts. An empty encoding matches requests of
    /// any encoding.
    pub encoding: Encoding,
    /// The handler to dispatch to.
    pub handler: HandlerSpec,
}

/// Resolves inbound requests to their registered handlers.
pub trait Router: Send + Sync {
    /// Every registered procedure, sorted by (service, name, encoding).
    fn procedures(&self) -> Vec<Procedure>;

    /// Resolves the handler for a request.
    fn choose(&self, ctx: &Context, request: &Request) -> Result<HandlerSpec>;
}

type RouteKey = (String, String, String);

/// A [`Router`] over a hash map of procedure triples.
#[derive(Debug, Default)]
pub struct MapRouter {
    procedures: RwLock<HashMap<RouteKey, Procedure>>,
}

impl MapRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers procedures, validating that at most one handler exists per
    /// (service, procedure, encoding) triple.
    pub fn register(&self, procedures: Vec<Procedure>) -> Result<()> {
        let mut registered = self
            .procedures
            .write()
            .expect("router lock poisoned");
        for procedure in procedures {
            let key = (
                procedure.service.clone(),
                procedure.name.clone(),
                procedure.encoding.as_str().to_owned(),
            );
            match registered.entry(key) {
                Entry::Occupied(_) => {
                    return Err(RpcError::invalid_argument(format!(
                        "duplicate registration for procedure \"{}\" of service \"{}\" with encoding \"{}\"",
                        procedure.name, procedure.service, procedure.encoding,
                    ))
                    .into());
                }
                Entry::Vacant(entry) => {
                    entry.insert(procedure);
                }
            }
        }
        Ok(())
    }

    fn unrecognized(request: &Request) -> RpcError {
        RpcError::unimplemented(format!(
            "unrecognized procedure \"{}\" for service \"{}\" with encoding \"{}\"",
            request.procedure, request.service, request.encoding,
        ))
    }
}

impl Router for MapRouter {
    fn procedures(&self) -> Vec<Procedure> {
        let registered = self.procedures.read().expect("router lock poisoned");
        let mut procedures = registered.values().cloned().collect::<Vec<_>>();
        procedures.sort_by(|a, b| {
            (&a.service, &a.name, a.encoding.as_str()).cmp(&(
                &b.service,
                &b.name,
                b.encoding.as_str(),
            ))
        });
        procedures
    }

    fn choose(&self, _: &Context, request: &Request) -> Result<HandlerSpec> {
        let registered = self.procedures.read().expect("router lock poisoned");
        let exact = (
            request.service.clone(),
            request.procedure.clone(),
            request.encoding.as_str().to_owned(),
        );
        if let Some(procedure) = registered.get(&exact) {
            return Ok(procedure.handler.clone());
        }
        // Procedures registered without an encoding accept any encoding.
        let wildcard = (
            request.service.clone(),
            request.procedure.clone(),
            String::new(),
        );
        if let Some(procedure) = registered.get(&wildcard) {
            return Ok(procedure.handler.clone());
        }
        Err(Self::unrecognized(request).into())
    }
}

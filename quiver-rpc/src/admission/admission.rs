use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
};

use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::join_all;
use log::{
    debug,
    error,
};
use tokio::{
    sync::{
        Notify,
        broadcast,
        oneshot,
    },
    task::JoinHandle,
    time::Instant,
};

use crate::{
    admission::buffer::Buffer,
    core::{
        context::Context,
        error::RpcError,
        request::{
            Request,
            Response,
        },
    },
    middleware::UnaryInboundMiddleware,
    transport::transport::UnaryHandler,
};

/// Derives an admission priority from a call's context and request metadata.
///
/// Lower numeric values take precedence, both for dispatch order and for
/// surviving eviction under overload.
pub trait Prioritizer: Send + Sync {
    fn priority(&self, ctx: &Context, request: &Request) -> u32;
}

/// A prioritizer assigning every request the same priority.
#[derive(Debug)]
pub struct ConstantPrioritizer {
    pub priority: u32,
}

impl Default for ConstantPrioritizer {
    /// Defaults to the lowest precedence, so explicit prioritizers always
    /// win over unprioritized traffic.
    fn default() -> Self {
        Self { priority: u32::MAX }
    }
}

impl Prioritizer for ConstantPrioritizer {
    fn priority(&self, _: &Context, _: &Request) -> u32 {
        self.priority
    }
}

/// Configuration for an [`Admission`] buffer.
pub struct AdmissionConfig {
    /// Number of entity slots in the buffer.
    pub capacity: usize,
    /// Number of workers dispatching admitted requests.
    pub concurrency: usize,
    /// Priority derivation for inbound requests.
    pub prioritizer: Arc<dyn Prioritizer>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            concurrency: 8,
            prioritizer: Arc::new(ConstantPrioritizer::default()),
        }
    }
}

struct Entity {
    ctx: Context,
    request: Request,
    next: Arc<dyn UnaryHandler>,
    completion_tx: oneshot::Sender<Result<Response>>,
}

impl Entity {
    fn complete_with_error(self, error: RpcError) {
        // The caller may already have abandoned the wait.
        self.completion_tx.send(Err(error.into())).ok();
    }
}

struct Shared {
    buffer: Mutex<Buffer<Entity>>,
    prioritizer: Arc<dyn Prioritizer>,
    /// Capacity-one wake signal for idle workers.
    availability: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Buffer<Entity>> {
        self.buffer.lock().expect("admission buffer lock poisoned")
    }
}

/// A bounded admission buffer shaping inbound load.
///
/// Installed as unary inbound middleware, it parks each request in a
/// priority buffer and dispatches from a worker pool of fixed concurrency.
/// Under overload it shields high-priority traffic: expired requests are
/// shed first, then lower-priority entities are evicted in favor of
/// higher-priority arrivals, and only then are new requests rejected.
pub struct Admission {
    shared: Arc<Shared>,
    concurrency: usize,
    stop_tx: broadcast::Sender<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Admission {
    pub fn new(config: AdmissionConfig) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            shared: Arc::new(Shared {
                buffer: Mutex::new(Buffer::new(config.capacity)),
                prioritizer: config.prioritizer,
                availability: Notify::new(),
            }),
            concurrency: config.concurrency,
            stop_tx,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Number of requests currently parked in the buffer.
    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().is_empty()
    }

    /// Spawns the worker pool. Idempotent.
    pub fn start(&self) {
        let mut workers = self.workers.lock().expect("admission worker lock poisoned");
        if !workers.is_empty() {
            return;
        }
        for worker in 0..self.concurrency {
            let shared = self.shared.clone();
            let stop_rx = self.stop_tx.subscribe();
            workers.push(tokio::spawn(worker_loop(worker, shared, stop_rx)));
        }
    }

    /// Signals every worker to exit and waits for them, bounded by the
    /// context deadline. Idempotent.
    pub async fn stop(&self, ctx: &Context) -> Result<()> {
        let workers = {
            let mut workers = self.workers.lock().expect("admission worker lock poisoned");
            std::mem::take(&mut *workers)
        };
        if workers.is_empty() {
            return Ok(());
        }
        // Errors only when there are no workers left to hear it.
        self.stop_tx.send(()).ok();
        let drained = join_all(workers);
        match ctx.deadline() {
            Some(deadline) => {
                tokio::select! {
                    _ = drained => Ok(()),
                    _ = tokio::time::sleep_until(deadline) => {
                        Err(RpcError::deadline_exceeded(
                            "timed out waiting for admission workers to stop",
                        )
                        .into())
                    }
                }
            }
            None => {
                drained.await;
                Ok(())
            }
        }
    }
}

async fn worker_loop(worker: usize, shared: Arc<Shared>, mut stop_rx: broadcast::Receiver<()>) {
    debug!("Admission worker {worker} started");
    loop {
        let entity = shared.lock().pop();
        match entity {
            Some(entity) => {
                // Relay the wake so another idle worker checks for more.
                shared.availability.notify_one();
                if entity.ctx.is_cancelled() {
                    entity.complete_with_error(RpcError::cancelled("context cancelled"));
                    continue;
                }
                let result = entity.next.handle(&entity.ctx, &entity.request).await;
                if let Err(error) = &result {
                    debug!(
                        "Admission worker {worker} dispatch for procedure {} failed: {error}",
                        entity.request.procedure,
                    );
                }
                entity.completion_tx.send(result).ok();
            }
            None => {
                let available = shared.availability.notified();
                tokio::select! {
                    result = stop_rx.recv() => {
                        if let Err(broadcast::error::RecvError::Lagged(_)) = result {
                            continue;
                        }
                        break;
                    }
                    _ = available => {}
                }
            }
        }
    }
    debug!("Admission worker {worker} exited");
}

#[async_trait]
impl UnaryInboundMiddleware for Admission {
    async fn handle(
        &self,
        ctx: &Context,
        request: &Request,
        next: Arc<dyn UnaryHandler>,
    ) -> Result<Response> {
        let priority = self.shared.prioritizer.priority(ctx, request);
        let deadline = ctx
            .deadline()
            .unwrap_or_else(|| Instant::now() + std::time::Duration::from_secs(86_400 * 365 * 30));
        let (completion_tx, completion_rx) = oneshot::channel();
        {
            let mut buffer = self.shared.lock();
            let now = Instant::now();
            while let Some((_, expired)) = buffer.evict_expired(now) {
                expired.complete_with_error(RpcError::deadline_exceeded(
                    "deadline expired while waiting for admission",
                ));
            }
            if buffer.is_full() {
                match buffer.evict_lower_priority(priority) {
                    Some((_, evicted)) => {
                        evicted.complete_with_error(RpcError::resource_exhausted(
                            "evicted in favor of a higher priority request",
                        ));
                    }
                    None => {
                        return Err(RpcError::resource_exhausted(
                            "too busy and insufficient priority",
                        )
                        .into());
                    }
                }
            }
            let entity = Entity {
                ctx: ctx.clone(),
                request: request.clone(),
                next,
                completion_tx,
            };
            if buffer.insert(deadline, priority, entity).is_none() {
                // Unreachable given the eviction above; surface rather than
                // drop the request silently.
                error!("Admission buffer rejected an insert after making room");
                return Err(
                    RpcError::resource_exhausted("too busy and insufficient priority").into(),
                );
            }
        }
        self.shared.availability.notify_one();

        tokio::select! {
            result = completion_rx => {
                match result {
                    Ok(result) => result,
                    Err(_) => {
                        Err(RpcError::internal("admission entity dropped without completion").into())
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                Err(RpcError::deadline_exceeded("deadline expired while waiting for admission").into())
            }
            _ = ctx.done() => Err(RpcError::cancelled("context cancelled").into()),
        }
    }
}

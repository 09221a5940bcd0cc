use std::{
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
    time::Duration,
};

use anyhow::Result;
use itertools::Itertools;
use log::debug;
use rand::{
    SeedableRng,
    rngs::StdRng,
    seq::SliceRandom,
};
use thiserror::Error;
use tokio::{
    sync::Notify,
    time::Instant,
};

use crate::{
    core::{
        context::Context,
        error::RpcError,
        hash::{
            HashMap,
            HashSet,
        },
        request::Request,
    },
    peer::{
        chooser::Chooser,
        facade::PeerFacade,
    },
    transport::peer::{
        ConnectionStatus,
        Peer,
        PeerIdentifier,
        PeerTransport,
        Subscriber,
    },
};

/// Configuration for a [`List`].
#[derive(Debug, Clone)]
pub struct ListConfig {
    /// Name of the list, used in error messages and logs.
    pub name: String,
    /// Fail immediately when no peer is available instead of waiting for one
    /// to open.
    pub fail_fast: bool,
    /// Keep additions in their given order instead of shuffling them.
    pub no_shuffle: bool,
    /// Seed for the shuffle source, for deterministic tests.
    pub seed: Option<u64>,
    /// Bound on the wait in [`List::choose`] when the context carries no
    /// deadline.
    pub default_choose_timeout: Duration,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            name: "peer-list".to_owned(),
            fail_fast: false,
            no_shuffle: false,
            seed: None,
            default_choose_timeout: Duration::from_millis(500),
        }
    }
}

/// A batch of membership changes for [`List::update`].
#[derive(Debug, Clone, Default)]
pub struct ListUpdates {
    pub additions: Vec<PeerIdentifier>,
    pub removals: Vec<PeerIdentifier>,
}

/// Accumulated failures from one [`List::update`] call.
///
/// Valid entries of the batch are applied even when others fail.
#[derive(Debug, Error)]
#[error("{}", .errors.iter().map(|error| error.to_string()).join("; "))]
pub struct ListUpdateError {
    pub errors: Vec<anyhow::Error>,
}

fn combine_errors(errors: Vec<anyhow::Error>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ListUpdateError { errors }.into())
    }
}

/// Completion callback returned by [`List::choose`].
///
/// Invoking it ends the request against the chosen peer: the pending count
/// is decremented and the list's chooser is informed so load-aware
/// strategies can reweigh the peer.
pub struct OnFinish(Box<dyn FnOnce(Option<&anyhow::Error>) + Send>);

impl std::fmt::Debug for OnFinish {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnFinish").finish()
    }
}

impl OnFinish {
    /// Reports the end of the request, with the error it failed with, if
    /// any.
    pub fn finish(self, error: Option<&anyhow::Error>) {
        (self.0)(error)
    }
}

struct State {
    running: bool,
    online: HashMap<PeerIdentifier, Arc<PeerFacade>>,
    offline: HashSet<PeerIdentifier>,
    chooser: Box<dyn Chooser>,
    num_available: usize,
    rng: StdRng,
}

pub(crate) struct ListCore {
    name: String,
    fail_fast: bool,
    no_shuffle: bool,
    default_choose_timeout: Duration,
    transport: Arc<dyn PeerTransport>,
    state: Mutex<State>,
    /// Capacity-one wake signal for choosers waiting on availability.
    availability: Notify,
    /// Wakes choosers waiting for the list to start.
    started: Notify,
}

impl ListCore {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("peer list lock poisoned")
    }

    /// Entry point for transport status pushes, forwarded by facades.
    ///
    /// Compares the facade's cached status to the transport-reported status
    /// and moves the facade in or out of the chooser when they differ.
    pub(crate) fn notify_status_changed(&self, id: &PeerIdentifier) {
        let mut state = self.lock();
        let Some(facade) = state.online.get(id).cloned() else {
            return;
        };
        let reported = facade.transport_status();
        let cached = facade.cached_status();
        if reported == cached {
            return;
        }
        facade.set_cached_status(reported);
        let was_available = cached == ConnectionStatus::Available;
        let is_available = reported == ConnectionStatus::Available;
        if !was_available && is_available {
            state.chooser.add(facade);
            state.num_available += 1;
            drop(state);
            debug!("Peer {id} became available in list \"{}\"", self.name);
            self.availability.notify_one();
        } else if was_available && !is_available {
            state.chooser.remove(id);
            state.num_available -= 1;
            debug!("Peer {id} became unavailable in list \"{}\"", self.name);
        }
    }
}

/// A dynamic pool of remote peers with a pluggable selection strategy.
///
/// The list maintains two partitions: online facades, retained from the
/// transport while the list is running, and offline identifiers, remembered
/// so configuration survives a stop/start cycle. Membership updates,
/// chooser consultation, and transport status pushes all serialize through
/// one write lock; [`List::choose`] releases that lock before waiting for
/// availability.
pub struct List {
    core: Arc<ListCore>,
}

impl List {
    /// Creates a list selecting peers of `transport` with `chooser`.
    pub fn new(
        config: ListConfig,
        transport: Arc<dyn PeerTransport>,
        chooser: Box<dyn Chooser>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            core: Arc::new(ListCore {
                name: config.name,
                fail_fast: config.fail_fast,
                no_shuffle: config.no_shuffle,
                default_choose_timeout: config.default_choose_timeout,
                transport,
                state: Mutex::new(State {
                    running: false,
                    online: HashMap::default(),
                    offline: HashSet::default(),
                    chooser,
                    num_available: 0,
                    rng,
                }),
                availability: Notify::new(),
                started: Notify::new(),
            }),
        }
    }

    /// Name of the list.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Number of peers the list currently retains or remembers.
    pub fn num_peers(&self) -> usize {
        let state = self.core.lock();
        state.online.len() + state.offline.len()
    }

    /// Number of retained peers currently available for choosing.
    pub fn num_available(&self) -> usize {
        self.core.lock().num_available
    }

    fn add_running(core: &Arc<ListCore>, state: &mut State, id: PeerIdentifier) -> Result<()> {
        let facade = Arc::new(PeerFacade::new(id.clone(), Arc::downgrade(core)));
        let subscriber: Arc<dyn Subscriber> = facade.clone();
        let peer = core.transport.retain_peer(&id, subscriber)?;
        facade.bind_peer(peer);
        let status = facade.transport_status();
        facade.set_cached_status(status);
        state.online.insert(id, facade.clone());
        if status == ConnectionStatus::Available {
            state.chooser.add(facade);
            state.num_available += 1;
            core.availability.notify_one();
        }
        Ok(())
    }

    fn remove_running(core: &Arc<ListCore>, state: &mut State, id: &PeerIdentifier) -> Result<()> {
        let Some(facade) = state.online.remove(id) else {
            return Ok(());
        };
        if facade.cached_status() == ConnectionStatus::Available {
            state.chooser.remove(id);
            state.num_available -= 1;
        }
        let subscriber: Arc<dyn Subscriber> = facade;
        core.transport.release_peer(id, &subscriber)
    }

    /// Applies a batch of membership changes.
    ///
    /// A peer may be added only if absent and removed only if present;
    /// violations are accumulated into a [`ListUpdateError`] while the valid
    /// entries still apply. While the list is stopped, updates modify only
    /// the offline partition.
    pub fn update(&self, updates: ListUpdates) -> Result<()> {
        let core = &self.core;
        let mut state = core.lock();
        let mut errors = Vec::new();

        for id in updates.removals {
            if !state.online.contains_key(&id) && !state.offline.contains(&id) {
                errors.push(RpcError::not_found(format!(
                    "could not remove peer \"{id}\": not in list"
                ))
                .into());
                continue;
            }
            if state.running {
                if let Err(error) = Self::remove_running(core, &mut state, &id) {
                    errors.push(error);
                }
            } else {
                state.offline.remove(&id);
            }
        }

        let mut additions = Vec::with_capacity(updates.additions.len());
        for id in updates.additions {
            if state.online.contains_key(&id) || state.offline.contains(&id) {
                errors.push(RpcError::invalid_argument(format!(
                    "could not add peer \"{id}\": already in list"
                ))
                .into());
                continue;
            }
            additions.push(id);
        }
        if !core.no_shuffle {
            additions.shuffle(&mut state.rng);
        }
        for id in additions {
            if state.running {
                if let Err(error) = Self::add_running(core, &mut state, id) {
                    errors.push(error);
                }
            } else {
                state.offline.insert(id);
            }
        }
        combine_errors(errors)
    }

    /// Starts the list, promoting every offline peer to online.
    ///
    /// Idempotent.
    pub fn start(&self) -> Result<()> {
        let core = &self.core;
        let mut state = core.lock();
        if state.running {
            return Ok(());
        }
        state.running = true;
        let ids = state.offline.drain().collect::<Vec<_>>();
        let mut errors = Vec::new();
        for id in ids {
            if let Err(error) = Self::add_running(core, &mut state, id) {
                errors.push(error);
            }
        }
        drop(state);
        debug!("Peer list \"{}\" started", core.name);
        core.started.notify_waiters();
        combine_errors(errors)
    }

    /// Stops the list, demoting online peers to the offline partition so a
    /// later start restores them.
    ///
    /// Idempotent.
    pub fn stop(&self) -> Result<()> {
        let core = &self.core;
        let mut state = core.lock();
        if !state.running {
            return Ok(());
        }
        state.running = false;
        let entries = state.online.drain().collect::<Vec<_>>();
        let mut errors = Vec::new();
        for (id, facade) in entries {
            if facade.cached_status() == ConnectionStatus::Available {
                state.chooser.remove(&id);
                state.num_available -= 1;
            }
            let subscriber: Arc<dyn Subscriber> = facade;
            if let Err(error) = core.transport.release_peer(&id, &subscriber) {
                errors.push(error);
            }
            state.offline.insert(id);
        }
        drop(state);
        debug!("Peer list \"{}\" stopped", core.name);
        combine_errors(errors)
    }

    async fn wait_until_running(&self, ctx: &Context, deadline: Instant) -> Result<()> {
        let core = &self.core;
        loop {
            // Register interest before checking the flag, so a start between
            // the check and the wait is not lost.
            let mut started = std::pin::pin!(core.started.notified());
            started.as_mut().enable();
            if core.lock().running {
                return Ok(());
            }
            tokio::select! {
                _ = &mut started => {}
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(RpcError::unavailable(format!(
                        "\"{}\" peer list timed out waiting for the list to start",
                        core.name,
                    ))
                    .into());
                }
                _ = ctx.done() => {
                    return Err(RpcError::unavailable(format!(
                        "\"{}\" peer list context cancelled while waiting for the list to start",
                        core.name,
                    ))
                    .with_source(ctx.error())
                    .into());
                }
            }
        }
    }

    fn unavailable_error(&self, waited: &'static str, ctx: Option<&Context>) -> anyhow::Error {
        let state = self.core.lock();
        let condition = match state.online.len() {
            0 => "has no peers".to_owned(),
            1 => "has 1 peer but it is not responsive".to_owned(),
            n => format!("has {n} peers but none are responsive"),
        };
        drop(state);
        let error = RpcError::unavailable(format!(
            "\"{}\" peer list {condition}, {waited}",
            self.core.name,
        ));
        match ctx {
            Some(ctx) => error.with_source(ctx.error()).into(),
            None => error.into(),
        }
    }

    /// Chooses an available peer for the request.
    ///
    /// Blocks until the list is running and a peer is available, bounded by
    /// the context deadline or, when it has none, the configured default
    /// choose timeout. The returned [`OnFinish`] must be invoked when the
    /// request against the peer ends.
    pub async fn choose(
        &self,
        ctx: &Context,
        request: &Request,
    ) -> Result<(Arc<dyn Peer>, OnFinish)> {
        let core = &self.core;
        let deadline = ctx
            .deadline()
            .unwrap_or_else(|| Instant::now() + core.default_choose_timeout);
        self.wait_until_running(ctx, deadline).await?;

        loop {
            let available = core.availability.notified();
            {
                let mut state = core.lock();
                if let Some(facade) = state.chooser.choose(request) {
                    let pending = facade.increment_pending();
                    let id = facade.identifier().clone();
                    state.chooser.update_pending_request_count(&id, pending);
                    drop(state);
                    // Relay the wake so other waiting choosers also retry.
                    core.availability.notify_one();
                    let on_finish = {
                        let core = core.clone();
                        OnFinish(Box::new(move |_| {
                            let mut state = core.lock();
                            if let Some(facade) = state.online.get(&id).cloned() {
                                let pending = facade.decrement_pending();
                                state.chooser.update_pending_request_count(&id, pending);
                            }
                        }))
                    };
                    return Ok((facade.peer(), on_finish));
                }
                if core.fail_fast {
                    drop(state);
                    return Err(self.unavailable_error(
                        "did not wait for a connection to open (fail-fast is enabled)",
                        None,
                    ));
                }
            }
            tokio::select! {
                _ = available => {}
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(
                        self.unavailable_error("timed out waiting for a connection to open", None)
                    );
                }
                _ = ctx.done() => {
                    return Err(self.unavailable_error(
                        "context cancelled while waiting for a connection to open",
                        Some(ctx),
                    ));
                }
            }
        }
    }
}

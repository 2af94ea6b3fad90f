//! Pool of connections to multiple Tarantool instances with
//! role-aware request routing.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use rmpv::Value;
use serde::de::DeserializeOwned;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    client::{Connection, ExecutorExt},
    codec::{consts::IteratorType, request::Request},
    errors::Error,
    tuple::Tuple,
    DmoResponse, Result, TupleResponse,
};

pub use self::{builder::PoolBuilder, info::InstanceInfo, mode::Mode};

mod builder;
mod info;
mod mode;

/// Replication role of an instance, as seen by the last successful probe.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
enum InstanceRole {
    Unknown = 0,
    Rw = 1,
    Ro = 2,
}

impl From<u8> for InstanceRole {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Rw,
            2 => Self::Ro,
            _ => Self::Unknown,
        }
    }
}

struct PoolInstance {
    addr: String,
    conn: Connection,
    /// Whether the last probe succeeded.
    status: AtomicBool,
    role: AtomicU8,
}

impl PoolInstance {
    fn new(addr: String, conn: Connection, reachable: bool) -> Arc<Self> {
        Arc::new(Self {
            addr,
            conn,
            status: AtomicBool::new(reachable),
            role: AtomicU8::new(InstanceRole::Unknown as u8),
        })
    }

    fn status(&self) -> bool {
        self.status.load(Ordering::SeqCst)
    }

    fn role(&self) -> InstanceRole {
        self.role.load(Ordering::SeqCst).into()
    }

    /// Call `box.info` on the instance and refresh role and status.
    ///
    /// A failed probe marks the instance unhealthy but keeps its last
    /// known role until a fresh probe succeeds.
    async fn probe(&self, probe_timeout: Duration) {
        match timeout(probe_timeout, self.conn.call("box.info", ())).await {
            Ok(Ok(resp)) => match resp.decode_first::<InstanceInfo>() {
                Ok(info) => {
                    let role = if info.ro {
                        InstanceRole::Ro
                    } else {
                        InstanceRole::Rw
                    };
                    trace!("Probe of {}: role {:?}", self.addr, role);
                    self.role.store(role as u8, Ordering::SeqCst);
                    self.status.store(true, Ordering::SeqCst);
                }
                Err(err) => {
                    warn!("Malformed box.info response from {}: {:#}", self.addr, err);
                    self.status.store(false, Ordering::SeqCst);
                }
            },
            Ok(Err(err)) => {
                debug!("Probe of {} failed: {:#}", self.addr, err);
                self.status.store(false, Ordering::SeqCst);
            }
            Err(_) => {
                debug!("Probe of {} timed out", self.addr);
                self.status.store(false, Ordering::SeqCst);
            }
        }
    }
}

/// Periodically probe the instance role, reacting early to
/// connectivity transitions of the underlying connection.
async fn run_prober(
    instance: Arc<PoolInstance>,
    check_timeout: Duration,
    close_token: CancellationToken,
) {
    let mut state_rx = instance.conn.state_watch();
    // Transitions before the prober started are not interesting
    let _ = state_rx.borrow_and_update();
    // The pool builder probed before spawning, so the first periodic
    // probe is due one period from now
    let mut probe_interval = interval_at(Instant::now() + check_timeout, check_timeout);
    probe_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = close_token.cancelled() => return,
            _ = probe_interval.tick() => {}
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                if !*state_rx.borrow() {
                    trace!("Instance {} disconnected", instance.addr);
                    instance.status.store(false, Ordering::SeqCst);
                    continue;
                }
            }
        }
        instance.probe(check_timeout).await;
    }
}

/// Pick instances eligible for the mode, in address order.
///
/// Returns an error if the mode cannot be served by the current
/// role/health layout.
fn candidates(mode: Mode, states: &[(bool, InstanceRole)]) -> Result<Vec<usize>> {
    let filter = |role: Option<InstanceRole>| -> Vec<usize> {
        states
            .iter()
            .enumerate()
            .filter(|(_, (healthy, r))| *healthy && role.map_or(true, |x| *r == x))
            .map(|(idx, _)| idx)
            .collect()
    };
    let non_empty = |x: Vec<usize>| if x.is_empty() { None } else { Some(x) };
    match mode {
        Mode::Any => non_empty(filter(None)).ok_or(Error::NoActiveConnections),
        Mode::Rw => non_empty(filter(Some(InstanceRole::Rw))).ok_or(Error::NoRwInstance),
        Mode::Ro => non_empty(filter(Some(InstanceRole::Ro))).ok_or(Error::NoRoInstance),
        Mode::PreferRw => non_empty(filter(Some(InstanceRole::Rw)))
            .or_else(|| non_empty(filter(Some(InstanceRole::Ro))))
            .ok_or(Error::NoActiveConnections),
        Mode::PreferRo => non_empty(filter(Some(InstanceRole::Ro)))
            .or_else(|| non_empty(filter(Some(InstanceRole::Rw))))
            .ok_or(Error::NoActiveConnections),
    }
}

/// Pool of connections to multiple Tarantool instances.
///
/// Every operation takes a [`Mode`] which selects the target instance
/// by its currently known replication role; selection within a mode is
/// round-robin. Roles are refreshed in the background by per-instance
/// probers.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    instances: Vec<Arc<PoolInstance>>,
    cursors: [AtomicUsize; Mode::COUNT],
    close_token: CancellationToken,
    closed: AtomicBool,
}

impl Pool {
    /// Create new [`PoolBuilder`].
    pub fn builder() -> PoolBuilder {
        PoolBuilder::default()
    }

    fn new(instances: Vec<Arc<PoolInstance>>, close_token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                instances,
                cursors: std::array::from_fn(|_| AtomicUsize::new(0)),
                close_token,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Pick a connection for the mode.
    ///
    /// The per-mode round-robin cursor advances on every call,
    /// successful or not.
    pub fn get(&self, mode: Mode) -> Result<Connection> {
        if self.is_closed() {
            return Err(Error::ClientClosed);
        }
        let states: Vec<_> = self
            .inner
            .instances
            .iter()
            .map(|x| (x.status(), x.role()))
            .collect();
        let eligible = candidates(mode, &states)?;
        let cursor = self.inner.cursors[mode.index()].fetch_add(1, Ordering::Relaxed);
        let idx = eligible[cursor % eligible.len()];
        Ok(self.inner.instances[idx].conn.clone())
    }

    /// Health of every instance: address to whether the last probe
    /// succeeded.
    pub fn statuses(&self) -> HashMap<String, bool> {
        self.inner
            .instances
            .iter()
            .map(|x| (x.addr.clone(), x.status()))
            .collect()
    }

    /// Close the pool: stop probers and close every connection.
    ///
    /// Idempotent.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!("Closing pool on client request");
            self.inner.close_token.cancel();
            for instance in &self.inner.instances {
                instance.conn.close();
                instance.status.store(false, Ordering::SeqCst);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Send an arbitrary preconstructed request to an instance
    /// selected by the mode.
    pub async fn send_request<R>(&self, body: R, mode: Mode) -> Result<Value>
    where
        R: Request,
    {
        self.get(mode)?.send_request(body).await
    }

    /// Ping an instance selected by the mode.
    pub async fn ping(&self, mode: Mode) -> Result<()> {
        self.get(mode)?.ping().await
    }

    /// Evaluate Lua expression on an instance selected by the mode.
    pub async fn eval<A, I>(&self, expr: I, args: A, mode: Mode) -> Result<TupleResponse>
    where
        A: Tuple + Send,
        I: AsRef<str> + Send + Sync,
    {
        self.get(mode)?.eval(expr, args).await
    }

    /// Call function on an instance selected by the mode.
    pub async fn call<A, I>(&self, function_name: I, args: A, mode: Mode) -> Result<TupleResponse>
    where
        A: Tuple + Send,
        I: AsRef<str> + Send + Sync,
    {
        self.get(mode)?.call(function_name, args).await
    }

    /// Call function using the legacy request on an instance selected
    /// by the mode.
    pub async fn call_16<A, I>(
        &self,
        function_name: I,
        args: A,
        mode: Mode,
    ) -> Result<TupleResponse>
    where
        A: Tuple + Send,
        I: AsRef<str> + Send + Sync,
    {
        self.get(mode)?.call_16(function_name, args).await
    }

    /// Select tuples from space on an instance selected by the mode.
    #[allow(clippy::too_many_arguments)]
    pub async fn select<T, A>(
        &self,
        space_id: u32,
        index_id: u32,
        limit: Option<u32>,
        offset: Option<u32>,
        iterator: Option<IteratorType>,
        keys: A,
        mode: Mode,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        A: Tuple + Send,
    {
        self.get(mode)?
            .select(space_id, index_id, limit, offset, iterator, keys)
            .await
    }

    /// Insert tuple on an instance selected by the mode.
    pub async fn insert<T>(&self, space_id: u32, tuple: T, mode: Mode) -> Result<DmoResponse>
    where
        T: Tuple + Send,
    {
        self.get(mode)?.insert(space_id, tuple).await
    }

    /// Replace tuple on an instance selected by the mode.
    pub async fn replace<T>(&self, space_id: u32, tuple: T, mode: Mode) -> Result<DmoResponse>
    where
        T: Tuple + Send,
    {
        self.get(mode)?.replace(space_id, tuple).await
    }

    /// Update tuple on an instance selected by the mode.
    pub async fn update<K, O>(
        &self,
        space_id: u32,
        index_id: u32,
        keys: K,
        ops: O,
        mode: Mode,
    ) -> Result<DmoResponse>
    where
        K: Tuple + Send,
        O: Tuple + Send,
    {
        self.get(mode)?.update(space_id, index_id, keys, ops).await
    }

    /// Update or insert tuple on an instance selected by the mode.
    pub async fn upsert<T, O>(&self, space_id: u32, tuple: T, ops: O, mode: Mode) -> Result<()>
    where
        T: Tuple + Send,
        O: Tuple + Send,
    {
        self.get(mode)?.upsert(space_id, tuple, ops).await
    }

    /// Delete tuple on an instance selected by the mode.
    pub async fn delete<T>(
        &self,
        space_id: u32,
        index_id: u32,
        keys: T,
        mode: Mode,
    ) -> Result<DmoResponse>
    where
        T: Tuple + Send,
    {
        self.get(mode)?.delete(space_id, index_id, keys).await
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("instances", &self.inner.instances.len())
            .finish()
    }
}

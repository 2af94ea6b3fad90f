use std::{fmt::Display, future::Future, pin::Pin, time::Duration};

use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use tokio::{
    net::ToSocketAddrs,
    sync::{mpsc, oneshot, watch},
};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::connection::Connection;
use crate::{
    codec::{request::EncodedRequest, response::Response},
    Error, ReconnectInterval,
};

pub(crate) type DispatcherRequest = (EncodedRequest, DispatcherResponseSender);

#[repr(transparent)]
pub(crate) struct DispatcherResponseSender(oneshot::Sender<Result<Response, Error>>);

impl DispatcherResponseSender {
    #[inline]
    pub(crate) fn send(
        self,
        value: Result<Response, Error>,
    ) -> Result<(), Result<Response, Error>> {
        self.0.send(value)
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// Client half of the request channel.
///
/// Submitting blocks only while the bounded channel is full.
pub(crate) struct DispatcherSender {
    tx: mpsc::Sender<DispatcherRequest>,
}

impl DispatcherSender {
    pub(crate) async fn send(&self, request: EncodedRequest) -> Result<Response, Error> {
        let (tx, rx) = oneshot::channel();
        let tx = DispatcherResponseSender(tx);
        if self.tx.send((request, tx)).await.is_err() {
            return Err(Error::ClientClosed);
        }
        match rx.await {
            Ok(x) => x,
            Err(_) => Err(Error::ClientClosed),
        }
    }
}

type ConnectDynFuture = dyn Future<Output = Result<Connection, Error>> + Send;

/// Dispatching messages from client to connection.
///
/// Owns the request channel and the connection lifecycle: (re)dials
/// according to the configured interval and feeds the live connection
/// until it errors or the client closes.
pub(crate) struct Dispatcher {
    rx: ReceiverStream<DispatcherRequest>,
    conn: Option<Connection>,
    conn_factory: Box<dyn Fn() -> Pin<Box<ConnectDynFuture>> + Send + Sync>,
    reconnect_interval: Option<ReconnectInterval>,
    state_tx: watch::Sender<bool>,
    close_token: CancellationToken,
}

/// Handles returned to the client side along with the dispatcher.
pub(crate) struct DispatcherHandles {
    pub(crate) sender: DispatcherSender,
    pub(crate) state_rx: watch::Receiver<bool>,
    pub(crate) close_token: CancellationToken,
}

impl Dispatcher {
    /// Prepare dispatcher, performing the first connect in place.
    pub(crate) async fn prepare<A>(
        addr: A,
        user: Option<&str>,
        password: Option<&str>,
        connect_timeout: Option<Duration>,
        reconnect_interval: Option<ReconnectInterval>,
        internal_simultaneous_requests_threshold: usize,
    ) -> Result<(impl Future<Output = ()>, DispatcherHandles), Error>
    where
        A: ToSocketAddrs + Display + Clone + Send + Sync + 'static,
    {
        let conn_factory = Self::conn_factory(addr, user, password, connect_timeout);
        let conn = conn_factory().await?;
        Ok(Self::into_parts(
            Some(conn),
            conn_factory,
            reconnect_interval,
            internal_simultaneous_requests_threshold,
        ))
    }

    /// Prepare dispatcher without connecting; the first dial happens
    /// in the background and early requests wait in the queue.
    pub(crate) fn prepare_lazy<A>(
        addr: A,
        user: Option<&str>,
        password: Option<&str>,
        connect_timeout: Option<Duration>,
        reconnect_interval: Option<ReconnectInterval>,
        internal_simultaneous_requests_threshold: usize,
    ) -> (impl Future<Output = ()>, DispatcherHandles)
    where
        A: ToSocketAddrs + Display + Clone + Send + Sync + 'static,
    {
        let conn_factory = Self::conn_factory(addr, user, password, connect_timeout);
        Self::into_parts(
            None,
            conn_factory,
            reconnect_interval,
            internal_simultaneous_requests_threshold,
        )
    }

    fn conn_factory<A>(
        addr: A,
        user: Option<&str>,
        password: Option<&str>,
        connect_timeout: Option<Duration>,
    ) -> Box<dyn Fn() -> Pin<Box<ConnectDynFuture>> + Send + Sync>
    where
        A: ToSocketAddrs + Display + Clone + Send + Sync + 'static,
    {
        let user: Option<String> = user.map(Into::into);
        let password: Option<String> = password.map(Into::into);
        Box::new(move || {
            let addr = addr.clone();
            let user = user.clone();
            let password = password.clone();
            Box::pin(async move {
                Connection::new(addr, user.as_deref(), password.as_deref(), connect_timeout).await
            }) as Pin<Box<ConnectDynFuture>>
        })
    }

    fn into_parts(
        conn: Option<Connection>,
        conn_factory: Box<dyn Fn() -> Pin<Box<ConnectDynFuture>> + Send + Sync>,
        reconnect_interval: Option<ReconnectInterval>,
        internal_simultaneous_requests_threshold: usize,
    ) -> (impl Future<Output = ()>, DispatcherHandles) {
        let (tx, rx) = mpsc::channel(internal_simultaneous_requests_threshold);
        let (state_tx, state_rx) = watch::channel(conn.is_some());
        let close_token = CancellationToken::new();
        let this = Self {
            rx: ReceiverStream::new(rx),
            conn,
            conn_factory,
            reconnect_interval,
            state_tx,
            close_token: close_token.clone(),
        };
        (
            this.run(),
            DispatcherHandles {
                sender: DispatcherSender { tx },
                state_rx,
                close_token,
            },
        )
    }

    /// Dial until connected, closed or (with reconnection disabled)
    /// the first failure.
    ///
    /// `Err` means the dispatcher should quit.
    async fn reconnect(&mut self) -> Result<(), ()> {
        let mut reconn_int_state = self
            .reconnect_interval
            .as_ref()
            .map(ReconnectIntervalState::from);
        loop {
            let connect = (self.conn_factory)();
            let res = tokio::select! {
                x = connect => x,
                _ = self.close_token.cancelled() => return Err(()),
            };
            match res {
                Ok(conn) => {
                    self.conn = Some(conn);
                    return Ok(());
                }
                Err(err) => {
                    error!("Failed to reconnect to Tarantool: {:#}", err);
                    let Some(ref mut int_state) = reconn_int_state else {
                        return Err(());
                    };
                    tokio::select! {
                        _ = tokio::time::sleep(int_state.next_timeout()) => {}
                        _ = self.close_token.cancelled() => return Err(()),
                    }
                }
            }
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("Starting dispatcher");
        loop {
            if let Some(conn) = self.conn.take() {
                let _ = self.state_tx.send(true);
                let res = conn.run(&mut self.rx, &self.close_token).await;
                let _ = self.state_tx.send(false);
                if res.is_ok() {
                    return;
                }
            } else if self.reconnect().await.is_err() {
                return;
            }
        }
    }
}

/// Get interval before next reconnect attempt.
#[derive(Debug)]
enum ReconnectIntervalState {
    Fixed(Duration),
    ExponentialBackoff {
        state: ExponentialBackoff,
        max: Duration,
    },
}

impl ReconnectIntervalState {
    fn next_timeout(&mut self) -> Duration {
        match self {
            ReconnectIntervalState::Fixed(x) => *x,
            ReconnectIntervalState::ExponentialBackoff { ref mut state, max } => {
                state.next_backoff().unwrap_or(*max)
            }
        }
    }
}

impl From<&ReconnectInterval> for ReconnectIntervalState {
    fn from(value: &ReconnectInterval) -> Self {
        match value {
            ReconnectInterval::Fixed(x) => Self::Fixed(*x),
            ReconnectInterval::ExponentialBackoff {
                min,
                max,
                randomization_factor,
                multiplier,
            } => {
                let state = ExponentialBackoffBuilder::new()
                    .with_initial_interval(*min)
                    .with_max_interval(*max)
                    .with_randomization_factor(*randomization_factor)
                    .with_multiplier(*multiplier)
                    .with_max_elapsed_time(None)
                    .build();
                Self::ExponentialBackoff { state, max: *max }
            }
        }
    }
}

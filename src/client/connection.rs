use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use rmpv::Value;
use tokio::{sync::watch, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    builder::ConnectionBuilder,
    client::Executor,
    codec::{request::EncodedRequest, response::ResponseBody},
    errors::Error,
    transport::DispatcherSender,
    Result,
};

/// Connection to a Tarantool instance.
///
/// This type doesn't represent a single TCP connection, but rather an
/// abstraction for interaction with a Tarantool instance: the underlying
/// implementation reconnects automatically (depending on builder
/// configuration), parking requests which arrive while disconnected.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    dispatcher_sender: DispatcherSender,
    timeout: Option<Duration>,
    closed: AtomicBool,
    close_token: CancellationToken,
    state_rx: watch::Receiver<bool>,
}

impl Connection {
    /// Create new [`ConnectionBuilder`].
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::default()
    }

    pub(crate) fn new(
        dispatcher_sender: DispatcherSender,
        state_rx: watch::Receiver<bool>,
        close_token: CancellationToken,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                dispatcher_sender,
                timeout,
                closed: AtomicBool::new(false),
                close_token,
                state_rx,
            }),
        }
    }

    /// Close the connection.
    ///
    /// Idempotent. Every request which was in flight or queued is
    /// completed with [`Error::ClientClosed`](crate::errors::Error::ClientClosed),
    /// and so is every request submitted afterwards.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!("Closing connection on client request");
            self.inner.close_token.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Whether the underlying TCP connection is currently established.
    pub fn is_connected(&self) -> bool {
        !self.is_closed() && *self.inner.state_rx.borrow()
    }

    /// Watch channel, tracking [`Connection::is_connected`] transitions.
    pub(crate) fn state_watch(&self) -> watch::Receiver<bool> {
        self.inner.state_rx.clone()
    }
}

#[async_trait]
impl Executor for Connection {
    async fn send_encoded_request(&self, request: EncodedRequest) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::ClientClosed);
        }
        let fut = self.inner.dispatcher_sender.send(request);
        let resp = match self.inner.timeout {
            Some(x) => timeout(x, fut).await.map_err(|_| Error::Timeout)??,
            None => fut.await?,
        };
        match resp.body {
            ResponseBody::Ok(x) => Ok(x),
            ResponseBody::Error(x) => Err(x.into()),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection")
    }
}

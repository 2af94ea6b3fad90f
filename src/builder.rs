use std::{cmp::max, fmt::Display, time::Duration};

use tokio::net::ToSocketAddrs;

use crate::{client::Connection, errors::Error, transport::Dispatcher};

const DEFAULT_SIMULTANEOUS_REQUESTS_THRESHOLD: usize = 500;

/// Interval parameters for background reconnection.
#[derive(Clone, Debug, PartialEq)]
pub enum ReconnectInterval {
    Fixed(Duration),
    ExponentialBackoff {
        min: Duration,
        max: Duration,
        randomization_factor: f64,
        multiplier: f64,
    },
}

impl Default for ReconnectInterval {
    fn default() -> Self {
        Self::exponential_backoff(Duration::from_millis(1), Duration::from_secs(1), 0.5, 5.0)
    }
}

impl ReconnectInterval {
    /// Fixed interval between reconnection attempts.
    pub fn fixed(interval: Duration) -> Self {
        Self::Fixed(interval)
    }

    /// Interval between reconnection attempts calculated as
    /// exponentially growing period.
    ///
    /// For details on this values check [`backoff::ExponentialBackoff`] docs.
    pub fn exponential_backoff(
        min_interval: Duration,
        max_interval: Duration,
        randomization_factor: f64,
        multiplier: f64,
    ) -> Self {
        Self::ExponentialBackoff {
            min: max(min_interval, Duration::from_micros(1)),
            max: max_interval,
            randomization_factor,
            multiplier,
        }
    }
}

/// Build connection to Tarantool.
#[derive(Debug)]
pub struct ConnectionBuilder {
    user: Option<String>,
    password: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    reconnect_interval: Option<ReconnectInterval>,
    internal_simultaneous_requests_threshold: usize,
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self {
            user: None,
            password: None,
            timeout: None,
            connect_timeout: None,
            reconnect_interval: Some(ReconnectInterval::default()),
            internal_simultaneous_requests_threshold: DEFAULT_SIMULTANEOUS_REQUESTS_THRESHOLD,
        }
    }
}

impl ConnectionBuilder {
    /// Create connection to Tarantool using provided address.
    ///
    /// Returns after the first dial, greeting and (if configured)
    /// authentication succeeded, or with the error of that first attempt.
    pub async fn build<A>(&self, addr: A) -> Result<Connection, Error>
    where
        A: ToSocketAddrs + Display + Clone + Send + Sync + 'static,
    {
        let (dispatcher_fut, handles) = Dispatcher::prepare(
            addr,
            self.user.as_deref(),
            self.password.as_deref(),
            self.connect_timeout,
            self.reconnect_interval.clone(),
            self.internal_simultaneous_requests_threshold,
        )
        .await?;

        tokio::spawn(dispatcher_fut);
        Ok(Connection::new(
            handles.sender,
            handles.state_rx,
            handles.close_token,
            self.timeout,
        ))
    }

    /// Create connection to Tarantool without waiting for the first dial.
    ///
    /// The connection is established in the background; requests
    /// submitted before that wait in the outgoing queue. Must be called
    /// within a tokio runtime.
    pub fn build_lazy<A>(&self, addr: A) -> Connection
    where
        A: ToSocketAddrs + Display + Clone + Send + Sync + 'static,
    {
        let (dispatcher_fut, handles) = Dispatcher::prepare_lazy(
            addr,
            self.user.as_deref(),
            self.password.as_deref(),
            self.connect_timeout,
            self.reconnect_interval.clone(),
            self.internal_simultaneous_requests_threshold,
        );

        tokio::spawn(dispatcher_fut);
        Connection::new(
            handles.sender,
            handles.state_rx,
            handles.close_token,
            self.timeout,
        )
    }

    /// Sets user login and, optionally, password, used for this connection.
    ///
    /// AUTH message sent upon connecting to server.
    pub fn auth<'a>(&mut self, user: &str, password: impl Into<Option<&'a str>>) -> &mut Self {
        self.user = Some(user.into());
        self.password = password.into().map(Into::into);
        self
    }

    /// Sets timeout for a single request.
    ///
    /// By default disabled.
    pub fn timeout(&mut self, timeout: impl Into<Option<Duration>>) -> &mut Self {
        self.timeout = timeout.into();
        self
    }

    /// Sets timeout for connect.
    ///
    /// By default disabled.
    pub fn connect_timeout(&mut self, connect_timeout: impl Into<Option<Duration>>) -> &mut Self {
        self.connect_timeout = connect_timeout.into();
        self
    }

    /// Sets interval between reconnection attempts.
    ///
    /// If set to `None`, reconnection is disabled entirely: the first
    /// transport failure kills the connection and requests fail fast.
    ///
    /// By default set to `ReconnectInterval::exponential_backoff(Duration::from_millis(1), Duration::from_secs(1), 0.5, 5.0)`.
    pub fn reconnect_interval(
        &mut self,
        reconnect_interval: impl Into<Option<ReconnectInterval>>,
    ) -> &mut Self {
        self.reconnect_interval = reconnect_interval.into();
        self
    }

    /// Sets the capacity of the outgoing request queue.
    ///
    /// Submission blocks while the queue is full. By default 500.
    pub fn internal_simultaneous_requests_threshold(&mut self, threshold: usize) -> &mut Self {
        self.internal_simultaneous_requests_threshold = max(threshold, 1);
        self
    }
}

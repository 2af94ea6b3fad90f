use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{run_prober, Pool, PoolInstance};
use crate::{builder::ConnectionBuilder, errors::Error, ReconnectInterval};

const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(1);

/// Build [`Pool`] of connections to multiple Tarantool instances.
#[derive(Debug)]
pub struct PoolBuilder {
    addrs: Vec<String>,
    conn_builder: ConnectionBuilder,
    check_timeout: Duration,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self {
            addrs: Vec::new(),
            conn_builder: ConnectionBuilder::default(),
            check_timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }
}

impl PoolBuilder {
    /// Build pool, connecting to every address.
    ///
    /// Addresses which could not be reached stay in the pool as
    /// unhealthy and keep dialing in the background; if none of them
    /// responded, the pool is not created.
    pub async fn build(&self) -> Result<Pool, Error> {
        if self.addrs.is_empty() {
            return Err(Error::EmptyAddrs);
        }
        if self.check_timeout.is_zero() {
            return Err(Error::WrongCheckTimeout);
        }

        let mut instances = Vec::with_capacity(self.addrs.len());
        let mut connected_any = false;
        for addr in &self.addrs {
            let (conn, reachable) = match self.conn_builder.build(addr.clone()).await {
                Ok(conn) => {
                    connected_any = true;
                    (conn, true)
                }
                Err(err) => {
                    warn!("Failed to connect to {}: {:#}", addr, err);
                    (self.conn_builder.build_lazy(addr.clone()), false)
                }
            };
            instances.push(PoolInstance::new(addr.clone(), conn, reachable));
        }

        if !connected_any {
            for instance in &instances {
                instance.conn.close();
            }
            return Err(Error::NoActiveConnections);
        }

        // Learn initial roles before handing the pool out, so the first
        // routed operation doesn't race the first probe
        join_all(
            instances
                .iter()
                .filter(|x| x.status())
                .map(|x| x.probe(self.check_timeout)),
        )
        .await;
        for instance in &instances {
            debug!(
                "Pool instance {}: healthy {}, role {:?}",
                instance.addr,
                instance.status(),
                instance.role()
            );
        }

        let close_token = CancellationToken::new();
        for instance in &instances {
            tokio::spawn(run_prober(
                instance.clone(),
                self.check_timeout,
                close_token.clone(),
            ));
        }

        Ok(Pool::new(instances, close_token))
    }

    /// Add a single address.
    pub fn addr(&mut self, addr: impl Into<String>) -> &mut Self {
        self.addrs.push(addr.into());
        self
    }

    /// Add several addresses.
    pub fn addrs<I>(&mut self, addrs: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.addrs.extend(addrs.into_iter().map(Into::into));
        self
    }

    /// Sets period of the role probe, also used as the probe timeout.
    ///
    /// Must be greater than zero. By default 1 second.
    pub fn check_timeout(&mut self, check_timeout: Duration) -> &mut Self {
        self.check_timeout = check_timeout;
        self
    }

    /// Sets user login and, optionally, password, used for every
    /// connection of the pool.
    pub fn auth<'a>(&mut self, user: &str, password: impl Into<Option<&'a str>>) -> &mut Self {
        self.conn_builder.auth(user, password);
        self
    }

    /// Sets timeout for a single request.
    pub fn timeout(&mut self, timeout: impl Into<Option<Duration>>) -> &mut Self {
        self.conn_builder.timeout(timeout);
        self
    }

    /// Sets timeout for connect.
    pub fn connect_timeout(&mut self, connect_timeout: impl Into<Option<Duration>>) -> &mut Self {
        self.conn_builder.connect_timeout(connect_timeout);
        self
    }

    /// Sets interval between reconnection attempts of every connection.
    pub fn reconnect_interval(
        &mut self,
        reconnect_interval: impl Into<Option<ReconnectInterval>>,
    ) -> &mut Self {
        self.conn_builder.reconnect_interval(reconnect_interval);
        self
    }

    /// Sets the capacity of the outgoing request queue of every connection.
    pub fn internal_simultaneous_requests_threshold(&mut self, threshold: usize) -> &mut Self {
        self.conn_builder
            .internal_simultaneous_requests_threshold(threshold);
        self
    }
}

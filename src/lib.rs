//! Asynchronous tokio-based client for the Tarantool in-memory database.
//!
//! Single-instance access goes through [`Connection`], built with
//! [`ConnectionBuilder`]: one TCP connection, multiplexing any number of
//! in-flight requests and transparently reconnecting in the background.
//! Multi-instance access goes through [`Pool`]: per-address connections,
//! periodic replication-role probes and round-robin routing of each
//! request to an instance matching the requested [`Mode`].
//!
//! ```no_run
//! use tarantool_client::{Connection, ExecutorExt, IteratorType};
//!
//! # async fn run() -> Result<(), tarantool_client::Error> {
//! let conn = Connection::builder().build("127.0.0.1:3301").await?;
//! conn.insert(512, (12, "Hello World", "Olga")).await?;
//! let rows: Vec<(u32, String, String)> = conn
//!     .select(512, 0, None, None, Some(IteratorType::All), (12,))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub use rmpv::Value;

pub use self::{
    builder::{ConnectionBuilder, ReconnectInterval},
    client::{Connection, DmoResponse, Executor, ExecutorExt, TupleResponse},
    codec::consts::IteratorType,
    errors::Error,
    pool::{InstanceInfo, Mode, Pool, PoolBuilder},
    tuple::{Tuple, TupleElement},
};

pub mod codec;
pub mod errors;
pub mod pool;

mod builder;
mod client;
mod transport;
mod tuple;
mod utils;

/// Alias for `Result<T, tarantool_client::Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

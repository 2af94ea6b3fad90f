use std::{collections::HashMap, fmt::Display, future::ready};

use futures::{
    future::{Fuse, FusedFuture},
    FutureExt, SinkExt, StreamExt, TryStreamExt,
};
use tokio::{
    io::AsyncReadExt,
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream, ToSocketAddrs,
    },
    pin,
};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};
use tracing::{debug, trace, warn};

use super::dispatcher::{DispatcherRequest, DispatcherResponseSender};
use crate::{
    codec::{
        request::{Auth, EncodedRequest},
        response::{Response, ResponseBody},
        ClientCodec, Greeting,
    },
    errors::{CodecDecodeError, CodecEncodeError, Error},
};

/// In-flight request table and sync allocator, owned by
/// the connection task.
struct ConnectionData {
    in_flights: HashMap<u32, DispatcherResponseSender>,
    next_sync: u32,
}

impl Default for ConnectionData {
    fn default() -> Self {
        Self {
            in_flights: HashMap::with_capacity(5),
            next_sync: 0,
        }
    }
}

impl ConnectionData {
    #[inline]
    fn next_sync(&mut self) -> u32 {
        let next = self.next_sync;
        self.next_sync = self.next_sync.wrapping_add(1);
        next
    }

    /// Prepare request for sending to server.
    ///
    /// Set `sync` value and attempt to store this message in the in-flight
    /// table.
    ///
    /// `Err` means that message was not prepared and should not be sent.
    /// This function also takes care of reporting error through `tx`.
    #[inline]
    fn try_prepare_request(
        &mut self,
        request: &mut EncodedRequest,
        tx: DispatcherResponseSender,
    ) -> Result<(), ()> {
        let sync = self.next_sync();
        *request.sync_mut() = sync;
        trace!("Sending request with sync {}", request.sync);
        // If sync is already assigned to another in-flight request,
        // report an error for the current request and keep the old one
        if let Some(old) = self.in_flights.insert(request.sync, tx) {
            let new = self
                .in_flights
                .insert(request.sync, old)
                .expect("Shouldn't panic, value was just inserted");
            if new.send(Err(Error::DuplicatedSync(request.sync))).is_err() {
                warn!(
                    "Failed to pass error to sync {}, receiver dropped",
                    request.sync
                );
            }
            return Err(());
        }
        Ok(())
    }

    /// Send result of processing request (by sync) to client.
    #[inline]
    fn respond_to_client(&mut self, sync: u32, result: Result<Response, Error>) {
        if let Some(tx) = self.in_flights.remove(&sync) {
            if tx.send(result).is_err() {
                warn!("Failed to pass response sync {}, receiver dropped", sync);
            }
        } else {
            warn!("Unknown sync {}", sync);
        }
    }

    /// Send error to all in-flight requests and drop them.
    #[inline]
    fn send_error_to_all_in_flights(&mut self, err: Error) {
        for (_, tx) in self.in_flights.drain() {
            let _ = tx.send(Err(err.clone()));
        }
    }
}

pub(crate) struct Connection {
    read_stream: FramedRead<OwnedReadHalf, ClientCodec>,
    write_stream: FramedWrite<OwnedWriteHalf, ClientCodec>,
    data: ConnectionData,
}

impl Connection {
    async fn new_inner<A>(addr: A, user: Option<&str>, password: Option<&str>) -> Result<Self, Error>
    where
        A: ToSocketAddrs + Display,
    {
        debug!("Starting connection to Tarantool {}", addr);
        let mut tcp = TcpStream::connect(&addr).await?;
        trace!("Connection established to {}", addr);

        let mut greeting_buffer = [0u8; Greeting::SIZE];
        tcp.read_exact(&mut greeting_buffer).await?;
        let greeting = Greeting::decode(greeting_buffer)?;
        debug!("Server: {}", greeting.server);
        trace!("Salt: {:?}", greeting.salt);

        let (read_tcp_stream, write_tcp_stream) = tcp.into_split();
        let mut read_stream = FramedRead::new(read_tcp_stream, ClientCodec::default());
        let mut write_stream = FramedWrite::new(write_tcp_stream, ClientCodec::default());

        let mut conn_data = ConnectionData::default();

        if let Some(user) = user {
            Self::auth(
                &mut read_stream,
                &mut write_stream,
                conn_data.next_sync(),
                user,
                password,
                &greeting.salt,
            )
            .await?;
        }

        Ok(Self {
            read_stream,
            write_stream,
            data: conn_data,
        })
    }

    pub(super) async fn new<A>(
        addr: A,
        user: Option<&str>,
        password: Option<&str>,
        timeout: Option<std::time::Duration>,
    ) -> Result<Self, Error>
    where
        A: ToSocketAddrs + Display,
    {
        match timeout {
            Some(dur) => tokio::time::timeout(dur, Self::new_inner(addr, user, password))
                .await
                .map_err(|_| Error::ConnectTimeout)
                .and_then(|x| x),
            None => Self::new_inner(addr, user, password).await,
        }
    }

    async fn auth(
        read_stream: &mut FramedRead<OwnedReadHalf, ClientCodec>,
        write_stream: &mut FramedWrite<OwnedWriteHalf, ClientCodec>,
        sync: u32,
        user: &str,
        password: Option<&str>,
        salt: &[u8],
    ) -> Result<(), Error> {
        let mut request = EncodedRequest::new(Auth::new(user, password, salt))?;
        *request.sync_mut() = sync;

        trace!("Sending auth request");
        write_stream.send(request).await.map_err(Error::from)?;

        let resp = Self::get_next_stream_value(read_stream).await?;
        match resp.body {
            ResponseBody::Ok(_) => Ok(()),
            ResponseBody::Error(err) => Err(Error::Auth(err)),
        }
    }

    #[inline]
    fn handle_send_result(
        connection_data: &mut ConnectionData,
        sync: u32,
        result: Result<(), CodecEncodeError>,
    ) -> Result<(), tokio::io::Error> {
        match result {
            Ok(x) => Ok(x),
            Err(CodecEncodeError::Encode(err)) => {
                connection_data.respond_to_client(sync, Err(err.into()));
                Ok(())
            }
            Err(CodecEncodeError::Io(err)) => Err(err),
        }
    }

    #[inline]
    async fn get_next_stream_value(
        read_stream: &mut FramedRead<OwnedReadHalf, ClientCodec>,
    ) -> Result<Response, CodecDecodeError> {
        match read_stream.try_next().await {
            Ok(Some(x)) => Ok(x),
            Ok(None) => Err(CodecDecodeError::Closed),
            Err(e) => Err(e),
        }
    }

    #[inline]
    fn handle_response(connection_data: &mut ConnectionData, response: Response) {
        trace!(
            "Received response for sync {}, schema version {}",
            response.sync,
            response.schema_version
        );
        connection_data.respond_to_client(response.sync, Ok(response));
    }

    /// Run connection until an error or a close request.
    ///
    /// `Ok` means the connection should not be restarted: either `rx`
    /// was closed or the client requested close. `Err` means connection
    /// was dropped due to a transport error.
    pub(crate) async fn run(
        self,
        client_rx: &mut ReceiverStream<DispatcherRequest>,
        close_token: &CancellationToken,
    ) -> Result<(), ()> {
        let Self {
            mut read_stream,
            mut write_stream,
            mut data,
        } = self;

        // Skip requests which were cancelled while waiting in the queue
        let client_rx_filtered = client_rx.filter(|(_, tx)| ready(!tx.is_closed()));
        pin!(client_rx_filtered);

        let mut send_future = Fuse::terminated();

        let err = loop {
            tokio::select! {
                // Read value from TCP stream
                next = Connection::get_next_stream_value(&mut read_stream) => {
                    match next {
                        Ok(x) => Connection::handle_response(&mut data, x),
                        Err(err) => break err.into(),
                    }
                }
                // Read value from internal queue
                next = client_rx_filtered.next(), if send_future.is_terminated() => {
                    if let Some((mut request, tx)) = next {
                        // If failed to prepare request - just go to next
                        if data
                            .try_prepare_request(&mut request, tx)
                            .is_err()
                        {
                            continue;
                        }

                        let sync = request.sync;
                        send_future = write_stream.send(request).map(move |res| (sync, res)).fuse();
                    } else {
                        debug!("All senders dropped");
                        return Ok(());
                    }
                }
                (sync, res) = &mut send_future => {
                    if let Err(err) = Connection::handle_send_result(&mut data, sync, res) {
                        break Error::from(err);
                    }
                }
                _ = close_token.cancelled() => {
                    debug!("Closing connection on client request");
                    data.send_error_to_all_in_flights(Error::ClientClosed);
                    return Ok(());
                }
            }
        };

        data.send_error_to_all_in_flights(err);
        Err(())
    }
}

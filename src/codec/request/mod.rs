use std::io::Write;

use super::consts::{keys, RequestType};
use crate::errors::EncodingError;

pub use self::{
    auth::Auth,
    call::{Call, Call16},
    delete::Delete,
    eval::Eval,
    insert::Insert,
    ping::Ping,
    replace::Replace,
    select::Select,
    update::Update,
    upsert::Upsert,
};

mod auth;
mod call;
mod delete;
mod eval;
mod insert;
mod ping;
mod replace;
mod select;
mod update;
mod upsert;

/// Request body, which can be encoded into a MessagePack body map.
///
/// Implementing this trait for your own type allows sending
/// arbitrary preconstructed requests through
/// [`ExecutorExt::send_request`](crate::ExecutorExt::send_request).
pub trait Request: Send {
    /// Return type of this request.
    fn request_type() -> RequestType
    where
        Self: Sized;

    /// Encode body into MessagePack and write it to the provided [`Write`].
    fn encode(&self, buf: &mut dyn Write) -> Result<(), EncodingError>;
}

/// Request with the body already encoded.
///
/// `sync` is assigned by the transport right before the frame
/// hits the wire.
pub struct EncodedRequest {
    pub(crate) request_type: RequestType,
    pub(crate) sync: u32,
    body: Vec<u8>,
}

impl EncodedRequest {
    pub fn new<T: Request>(request: T) -> Result<Self, EncodingError> {
        let mut body = Vec::with_capacity(32);
        request.encode(&mut body)?;
        Ok(Self {
            request_type: T::request_type(),
            sync: 0,
            body,
        })
    }

    pub(crate) fn sync_mut(&mut self) -> &mut u32 {
        &mut self.sync
    }

    /// Write header map and pre-encoded body.
    pub(crate) fn encode(&self, mut buf: impl Write) -> Result<(), EncodingError> {
        rmp::encode::write_map_len(&mut buf, 2)?;
        rmp::encode::write_pfix(&mut buf, keys::REQUEST_TYPE)?;
        rmp::encode::write_u8(&mut buf, self.request_type as u8)?;
        rmp::encode::write_pfix(&mut buf, keys::SYNC)?;
        rmp::encode::write_u32(&mut buf, self.sync)?;
        buf.write_all(&self.body)
            .map_err(EncodingError::new)?;
        Ok(())
    }
}

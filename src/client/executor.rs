use async_trait::async_trait;
use rmpv::Value;

use super::private::Sealed;
use crate::{codec::request::EncodedRequest, Result};

/// Type, which can send encoded requests to a Tarantool instance.
#[async_trait]
pub trait Executor: Sealed + Send + Sync {
    /// Send encoded request.
    async fn send_encoded_request(&self, request: EncodedRequest) -> Result<Value>;
}

#[async_trait]
impl<E: Executor + Sealed + Sync> Executor for &E {
    async fn send_encoded_request(&self, request: EncodedRequest) -> Result<Value> {
        (**self).send_encoded_request(request).await
    }
}

#[async_trait]
impl<E: Executor + Sealed + Sync> Executor for &mut E {
    async fn send_encoded_request(&self, request: EncodedRequest) -> Result<Value> {
        (**self).send_encoded_request(request).await
    }
}
